// SPDX-FileCopyrightText: 2026 Secretsync Contributors
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Device Decryption Capabilities
//!
//! Every bundle entry is sealed to the device's P-256 key. Where that key
//! lives is hidden behind [`CryptoCapability`]:
//! - [`SoftwareKey`]: private key parsed from a PEM file, held in memory
//! - [`HardwareToken`]: key agreement performed inside a PKCS#11 token
//!
//! A capability is opened for one synchronization cycle and closed at its
//! end. Token sessions are a scarce resource, so `close` must run on every
//! exit path; both backends also close on drop.

mod ecies;
#[cfg(feature = "pkcs11")]
mod pkcs11;
mod software;
mod token;

use thiserror::Error;

pub use ecies::seal;
#[cfg(feature = "pkcs11")]
pub use pkcs11::Pkcs11Session;
pub use software::SoftwareKey;
pub use token::{
    parse_key_id, HardwareToken, SharedSession, SimulatedToken, TokenSession, TokenSettings,
};

/// Decrypts values sealed to the device key.
pub trait CryptoCapability {
    /// Decrypts one base64 encoded ECIES value.
    fn decrypt(&self, ciphertext: &str) -> Result<Vec<u8>, CryptoError>;

    /// Releases the key material or token session.
    ///
    /// Idempotent. Decrypting after `close` fails with
    /// [`CryptoError::Closed`].
    fn close(&mut self);
}

/// Crypto error types.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    #[error("Ciphertext is not valid base64")]
    InvalidEncoding,

    #[error("Ciphertext too short")]
    CiphertextTooShort,

    #[error("Invalid ephemeral public key")]
    InvalidPublicKey,

    #[error("Key derivation failed")]
    KeyDerivation,

    #[error("Decryption failed: data may be corrupted or sealed to another key")]
    DecryptionFailed,

    #[error("Encryption failed")]
    EncryptionFailed,

    #[error("Unsupported private key (expected a P-256 key in PKCS#8 or SEC1 PEM)")]
    UnsupportedKey,

    #[error("Invalid key id {0:?}: expected decimal digits")]
    InvalidKeyId(String),

    #[error("Capability already closed")]
    Closed,

    #[error("Token error: {0}")]
    Token(String),
}
