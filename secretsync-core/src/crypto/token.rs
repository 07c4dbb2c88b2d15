// SPDX-FileCopyrightText: 2026 Secretsync Contributors
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Hardware Token Capability
//!
//! The private key never leaves the token. Decryption asks the token for the
//! ECDH shared secret and finishes the KDF/AEAD steps on the host; the TLS
//! client signs its handshake through the same session.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use p256::ecdsa::signature::hazmat::PrehashSigner;
use p256::ecdsa::{Signature, SigningKey};
use p256::{PublicKey, SecretKey};
use ring::rand::SystemRandom;

use super::ecies;
use super::{CryptoCapability, CryptoError};

/// Operations the agent needs from an open token session.
pub trait TokenSession: Send {
    /// Performs ECDH between the token's private key and a SEC1 encoded peer key.
    ///
    /// Returns the raw shared secret (x-coordinate).
    fn derive_shared_secret(&self, peer_public: &[u8]) -> Result<Vec<u8>, CryptoError>;

    /// Signs a SHA-256 digest with the token's private key.
    ///
    /// Returns the raw `r || s` signature.
    fn sign_digest(&self, digest: &[u8]) -> Result<Vec<u8>, CryptoError>;

    /// DER encoded client certificate stored on the token.
    fn certificate_der(&self) -> Vec<u8>;

    /// Logs out and closes the session.
    fn close(&mut self);
}

/// Session shared between the decryption capability and the TLS signer.
///
/// `None` once the capability was closed.
pub type SharedSession = Arc<Mutex<Option<Box<dyn TokenSession>>>>;

/// Settings for opening a PKCS#11 token.
#[derive(Clone, PartialEq, Eq)]
pub struct TokenSettings {
    /// Path of the PKCS#11 module (shared library).
    pub module: PathBuf,
    /// User PIN.
    pub pin: String,
    /// Token label to select the slot.
    pub label: String,
    /// CKA_ID of the private key.
    pub key_id: Vec<u8>,
    /// CKA_ID of the client certificate.
    pub cert_id: Vec<u8>,
}

impl std::fmt::Debug for TokenSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenSettings")
            .field("module", &self.module)
            .field("pin", &"[REDACTED]")
            .field("label", &self.label)
            .field("key_id", &self.key_id)
            .field("cert_id", &self.cert_id)
            .finish()
    }
}

/// Converts a textual object id into the token's compact byte encoding.
///
/// Each decimal digit becomes one byte holding its value and leading zero
/// digits are stripped: `"01"` is `[1]`, `"10"` is `[1, 0]`, `"00"` is empty.
pub fn parse_key_id(id: &str) -> Result<Vec<u8>, CryptoError> {
    let digits = id
        .bytes()
        .map(|b| {
            if b.is_ascii_digit() {
                Ok(b - b'0')
            } else {
                Err(CryptoError::InvalidKeyId(id.to_string()))
            }
        })
        .collect::<Result<Vec<u8>, _>>()?;

    Ok(digits.into_iter().skip_while(|&d| d == 0).collect())
}

/// Device key stored in a hardware token.
pub struct HardwareToken {
    session: SharedSession,
}

impl std::fmt::Debug for HardwareToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HardwareToken")
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl HardwareToken {
    /// Wraps an already opened session.
    pub fn new(session: Box<dyn TokenSession>) -> Self {
        HardwareToken {
            session: Arc::new(Mutex::new(Some(session))),
        }
    }

    /// Opens a PKCS#11 session, logs in and resolves the key and certificate.
    #[cfg(feature = "pkcs11")]
    pub fn open(settings: &TokenSettings) -> Result<Self, CryptoError> {
        let session = super::Pkcs11Session::open(settings)?;
        Ok(Self::new(Box::new(session)))
    }

    /// Handle to the session for the TLS client signer.
    pub fn shared_session(&self) -> SharedSession {
        Arc::clone(&self.session)
    }

    /// Client certificate from the token, `None` once closed.
    pub fn certificate_der(&self) -> Option<Vec<u8>> {
        let guard = self.session.lock().ok()?;
        guard.as_ref().map(|session| session.certificate_der())
    }

    /// Returns true once the session was closed.
    pub fn is_closed(&self) -> bool {
        self.session
            .lock()
            .map(|guard| guard.is_none())
            .unwrap_or(true)
    }
}

impl CryptoCapability for HardwareToken {
    fn decrypt(&self, ciphertext: &str) -> Result<Vec<u8>, CryptoError> {
        let guard = self.session.lock().map_err(|_| CryptoError::Closed)?;
        let session = guard.as_ref().ok_or(CryptoError::Closed)?;
        ecies::open_with(ciphertext, |peer| session.derive_shared_secret(peer))
    }

    fn close(&mut self) {
        let mut guard = match self.session.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(mut session) = guard.take() {
            session.close();
        }
    }
}

impl Drop for HardwareToken {
    fn drop(&mut self) {
        self.close();
    }
}

/// In-process stand-in for a PKCS#11 token.
///
/// Behaves like a token holding one P-256 key and one certificate. The open
/// flag is shared so callers can observe that the session got closed.
pub struct SimulatedToken {
    secret: SecretKey,
    certificate: Vec<u8>,
    open: Arc<AtomicBool>,
}

impl SimulatedToken {
    /// Creates a token holding `secret` and `certificate`.
    pub fn new(secret: SecretKey, certificate: Vec<u8>) -> Self {
        SimulatedToken {
            secret,
            certificate,
            open: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Creates a token with a fresh random key.
    pub fn generate(certificate: Vec<u8>) -> Result<Self, CryptoError> {
        let secret = ecies::random_secret_key(&SystemRandom::new())?;
        Ok(Self::new(secret, certificate))
    }

    /// Public half of the token key.
    pub fn public_key(&self) -> PublicKey {
        self.secret.public_key()
    }

    /// Flag that stays true until the session is closed.
    pub fn open_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.open)
    }

    fn ensure_open(&self) -> Result<(), CryptoError> {
        if self.open.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(CryptoError::Closed)
        }
    }
}

impl TokenSession for SimulatedToken {
    fn derive_shared_secret(&self, peer_public: &[u8]) -> Result<Vec<u8>, CryptoError> {
        self.ensure_open()?;
        ecies::agree(&self.secret, peer_public)
    }

    fn sign_digest(&self, digest: &[u8]) -> Result<Vec<u8>, CryptoError> {
        self.ensure_open()?;
        let signing_key = SigningKey::from(&self.secret);
        let signature: Signature = signing_key
            .sign_prehash(digest)
            .map_err(|e| CryptoError::Token(e.to_string()))?;
        Ok(signature.to_bytes().to_vec())
    }

    fn certificate_der(&self) -> Vec<u8> {
        self.certificate.clone()
    }

    fn close(&mut self) {
        self.open.store(false, Ordering::SeqCst);
    }
}
