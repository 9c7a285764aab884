//! Криптографический модуль
//!
//! # Архитектура
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │              CrossDeviceSyncService / Transport             │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 RatchetEngine (Double Ratchet)              │
//! │  - Symmetric chain step на каждое сообщение                 │
//! │  - DH ratchet step каждые K сообщений                       │
//! │  - Skipped message keys для out-of-order доставки           │
//! └─────────────────────────────────────────────────────────────┘
//!                │                           │
//!                ▼                           ▼
//! ┌───────────────────────────┐  ┌──────────────────────────┐
//! │   KeyAgreementEngine      │  │  MessageCipher (AEAD)    │
//! │  - X25519 DH              │  │  - ChaCha20-Poly1305     │
//! │  - ML-KEM encapsulation   │  │  - Unique nonce per call │
//! │  - Hybrid combine (HKDF)  │  │  - Atomic tag failure    │
//! └───────────────────────────┘  └──────────────────────────┘
//!                │                           │
//!                └─────────────┬─────────────┘
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │     Capability traits (Crypto-Agility, strategy objects)    │
//! │  - KeyAgreementProvider (X25519, X25519+ML-KEM)             │
//! │  - SignatureProvider (Ed25519, Ed25519+ML-DSA)              │
//! │  - AeadProvider (ChaCha20-Poly1305 + HKDF-SHA256)           │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Модули
//!
//! ### Core Traits
//! - [`provider`]: capability traits для crypto-agility
//!
//! ### Implementations
//! - [`suites`]: Реализации наборов (Classic, Hybrid)
//!
//! ### Engines
//! - [`agreement`]: KeyAgreementEngine + key-exchange handshake
//! - [`cipher`]: MessageCipher (AEAD)
//! - [`messaging`]: RatchetEngine (Double Ratchet)
//! - [`negotiation`]: AlgorithmNegotiator (выбор режима для беседы)

// ============================================================================
// Core Traits
// ============================================================================

/// Capability traits для crypto-agility
pub mod provider;

// ============================================================================
// Implementations
// ============================================================================

/// Криптографические наборы (Classic, Hybrid)
pub mod suites;

// ============================================================================
// Engines
// ============================================================================

/// Key agreement + hybrid combine + handshake attempts
pub mod agreement;

/// AEAD шифрование сообщений
pub mod cipher;

/// Secure Messaging (Double Ratchet)
pub mod messaging;

/// Выбор алгоритмического режима для беседы
pub mod negotiation;

// ============================================================================
// Re-exports для удобства
// ============================================================================

pub use provider::{AeadProvider, CipherSuite, KeyAgreementProvider, SignatureProvider};

pub type SuiteID = u16;

/// Suite ID for the classic suite
pub const CLASSIC_SUITE_ID: SuiteID = 1;
/// Suite ID for the Post-Quantum hybrid suite
pub const PQ_HYBRID_SUITE_ID: SuiteID = 2;

/// Алгоритмический режим беседы
///
/// `StaticFallback` — явно отдельный, менее безопасный режим с одним
/// детерминированным ключом на беседу (для multi-recipient сценариев,
/// где ratchet невозможен). Никогда не смешивается с ratchet-режимами.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum AlgorithmMode {
    Classical,
    Hybrid,
    StaticFallback,
}
