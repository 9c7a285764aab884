//! Secure Messaging — Double Ratchet
//!
//! Этот модуль содержит ratchet-машину для защищённого обмена
//! сообщениями внутри одной беседы.
//!
//! Цель: конфиденциальность, аутентичность и forward secrecy при
//! обмене сообщениями между двумя сторонами.
//!
//! ## Dataflow
//! ```text
//! После успешного key exchange (crypto::agreement):
//!
//! Initiator                                  Responder
//! =========                                  =========
//!
//! 1. state = RatchetState::initialize(seed)
//!    - из shared secret деривируются ДВЕ пары (root, chain):
//!      sending у инициатора == receiving у получателя и наоборот
//!
//! 2. envelope = state.encrypt(plaintext)
//!    - message key из sending chain (KDF_CK, one-way)
//!    - счётчик++, chain key перезаписывается
//!
//! 3. envelope → transport →
//!                                            1. state = RatchetState::initialize(seed)
//!                                            2. plaintext = state.decrypt(envelope)
//!                                               - по chain_length/message_number
//!                                                 выбирается обычный путь, skipped
//!                                                 key или mirror DH-step
//!
//! 4. Каждые K сообщений (default 100) отправитель делает DH ratchet
//!    step: свежая ephemeral пара + DH с последним известным ключом
//!    собеседника (+ KEM encapsulation в гибридном режиме), rederive
//!    root/chain, chain_length++, счётчик = 0.
//!    Получатель зеркалит шаг при первом аутентифицировавшемся
//!    сообщении новой цепочки — до этого момента состояние не
//!    мутируется (all-or-nothing).
//! ```
//!
//! ## Security Properties
//!
//! ### Forward Secrecy
//! Компрометация текущих ключей НЕ раскрывает прошлые сообщения:
//! chain keys перезаписываются one-way KDF, DH step вводит свежий
//! ephemeral материал.
//!
//! ### Out-of-Order Messages
//! Сообщения расшифровываются в произвольном порядке через bounded
//! store пропущенных message keys (default 1000, старейшие вытесняются).
//!
//! ### DoS Protection
//! Скачок счётчика больше MAX_SKIP и регресс chain length отклоняются
//! с `ReplayError` до какой-либо деривации.

pub mod engine;
pub mod ratchet;

pub use engine::RatchetEngine;
pub use ratchet::{MessageEnvelope, RatchetPhase, RatchetState, SerializableRatchetState};
