//! Выбор алгоритмического режима для беседы
//!
//! Negotiator сводит возможности двух сторон к общему режиму:
//! гибрид, если обе стороны его объявили; иначе классика; иначе —
//! явный static fallback, если обе стороны его разрешили.
//!
//! Результат детерминирован: одинаковые capability с обеих сторон дают
//! одинаковый режим независимо от того, кто считает.

use crate::crypto::suites::hkdf_expand;
use crate::crypto::{AlgorithmMode, SuiteID, CLASSIC_SUITE_ID, PQ_HYBRID_SUITE_ID};
use crate::error::{CryptoError, Result};
use serde::{Deserialize, Serialize};

/// Domain separation label для static fallback ключа
const STATIC_CONVERSATION_INFO: &[u8] = b"Meridian-Static-Conversation-Key-v1";

/// Объявляемые устройством возможности
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlgorithmCapabilities {
    pub supported_suites: Vec<SuiteID>,
    /// Разрешён ли менее безопасный режим с одним статическим ключом на
    /// беседу (multi-recipient сценарии без ratchet)
    pub allow_static_fallback: bool,
}

impl AlgorithmCapabilities {
    /// Возможности по умолчанию для собранного ядра
    pub fn local() -> Self {
        Self {
            #[cfg(feature = "post-quantum")]
            supported_suites: vec![PQ_HYBRID_SUITE_ID, CLASSIC_SUITE_ID],
            #[cfg(not(feature = "post-quantum"))]
            supported_suites: vec![CLASSIC_SUITE_ID],
            allow_static_fallback: false,
        }
    }

    fn supports(&self, suite: SuiteID) -> bool {
        self.supported_suites.contains(&suite)
    }
}

/// Итог негоциации
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NegotiatedAlgorithms {
    pub mode: AlgorithmMode,
    pub suite_id: SuiteID,
}

/// Negotiator — чистая функция над capability двух сторон
pub struct AlgorithmNegotiator;

impl AlgorithmNegotiator {
    /// Выбрать общий режим для беседы.
    ///
    /// # Errors
    ///
    /// `StateError`, если пересечение возможностей пусто.
    pub fn negotiate(
        local: &AlgorithmCapabilities,
        remote: &AlgorithmCapabilities,
    ) -> Result<NegotiatedAlgorithms> {
        use tracing::debug;

        let negotiated = if local.supports(PQ_HYBRID_SUITE_ID) && remote.supports(PQ_HYBRID_SUITE_ID)
        {
            NegotiatedAlgorithms {
                mode: AlgorithmMode::Hybrid,
                suite_id: PQ_HYBRID_SUITE_ID,
            }
        } else if local.supports(CLASSIC_SUITE_ID) && remote.supports(CLASSIC_SUITE_ID) {
            NegotiatedAlgorithms {
                mode: AlgorithmMode::Classical,
                suite_id: CLASSIC_SUITE_ID,
            }
        } else if local.allow_static_fallback && remote.allow_static_fallback {
            NegotiatedAlgorithms {
                mode: AlgorithmMode::StaticFallback,
                suite_id: CLASSIC_SUITE_ID,
            }
        } else {
            return Err(CryptoError::StateError(
                "no mutually supported algorithm suite".to_string(),
            ));
        };

        debug!(
            target: "crypto::negotiation",
            mode = ?negotiated.mode,
            suite_id = %negotiated.suite_id,
            "Algorithm mode negotiated"
        );

        Ok(negotiated)
    }

    /// Детерминированный ключ беседы для режима `StaticFallback`.
    ///
    /// Один общий ключ на беседу, известный всем участникам — упрощает
    /// multi-recipient расшифровку ценой потери forward secrecy. Никогда
    /// не используется ratchet-режимами; domain label отделяет его от
    /// всех ratchet-ключей.
    pub fn derive_static_conversation_key(
        conversation_id: &str,
        base_secret: &[u8],
    ) -> Result<Vec<u8>> {
        if base_secret.len() < 32 {
            return Err(CryptoError::InputLengthError {
                expected: 32,
                actual: base_secret.len(),
            });
        }

        let mut info = STATIC_CONVERSATION_INFO.to_vec();
        info.extend_from_slice(conversation_id.as_bytes());
        hkdf_expand(b"", base_secret, &info, 32)
    }
}
