// SPDX-FileCopyrightText: 2026 Secretsync Contributors
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! PKCS#11 token session backed by `cryptoki`.

use cryptoki::context::{CInitializeArgs, Pkcs11};
use cryptoki::mechanism::elliptic_curve::{EcKdf, Ecdh1DeriveParams};
use cryptoki::mechanism::Mechanism;
use cryptoki::object::{Attribute, AttributeType, KeyType, ObjectClass, ObjectHandle};
use cryptoki::session::{Session, UserType};
use cryptoki::types::{AuthPin, Ulong};
use tracing::{debug, warn};

use super::token::{TokenSession, TokenSettings};
use super::CryptoError;

/// Length of a P-256 ECDH shared secret.
const SHARED_SECRET_LEN: u64 = 32;

fn token_error(action: &str) -> impl Fn(cryptoki::error::Error) -> CryptoError + '_ {
    move |e| CryptoError::Token(format!("{}: {}", action, e))
}

/// Logged-in session on a PKCS#11 token.
///
/// Dropping the session object closes it; dropping the context finalizes the
/// module, so a partially constructed value releases everything it opened.
pub struct Pkcs11Session {
    // Field order matters: the session must close before the context finalizes
    session: Option<Session>,
    key: ObjectHandle,
    certificate: Vec<u8>,
    _context: Pkcs11,
}

impl Pkcs11Session {
    /// Loads the module, selects the token by label, logs in and resolves the
    /// private key and certificate handles.
    pub fn open(settings: &TokenSettings) -> Result<Self, CryptoError> {
        let context = Pkcs11::new(&settings.module).map_err(token_error("load module"))?;
        context
            .initialize(CInitializeArgs::OsThreads)
            .map_err(token_error("initialize module"))?;

        let slot = context
            .get_slots_with_token()
            .map_err(token_error("list slots"))?
            .into_iter()
            .find(|slot| {
                context
                    .get_token_info(*slot)
                    .map(|info| info.label().trim() == settings.label)
                    .unwrap_or(false)
            })
            .ok_or_else(|| CryptoError::Token(format!("no token labelled {}", settings.label)))?;

        let session = context
            .open_ro_session(slot)
            .map_err(token_error("open session"))?;
        session
            .login(UserType::User, Some(&AuthPin::new(settings.pin.clone().into())))
            .map_err(token_error("login"))?;

        let key = find_object(&session, ObjectClass::PRIVATE_KEY, &settings.key_id)?;
        let cert_handle = find_object(&session, ObjectClass::CERTIFICATE, &settings.cert_id)?;
        let certificate = read_value(&session, cert_handle)?;
        debug!(label = %settings.label, "Opened token session");

        Ok(Pkcs11Session {
            session: Some(session),
            key,
            certificate,
            _context: context,
        })
    }

    fn session(&self) -> Result<&Session, CryptoError> {
        self.session.as_ref().ok_or(CryptoError::Closed)
    }
}

fn find_object(session: &Session, class: ObjectClass, id: &[u8]) -> Result<ObjectHandle, CryptoError> {
    let template = [Attribute::Class(class), Attribute::Id(id.to_vec())];
    session
        .find_objects(&template)
        .map_err(token_error("find object"))?
        .into_iter()
        .next()
        .ok_or_else(|| CryptoError::Token(format!("no {:?} with id {:?}", class, id)))
}

fn read_value(session: &Session, handle: ObjectHandle) -> Result<Vec<u8>, CryptoError> {
    session
        .get_attributes(handle, &[AttributeType::Value])
        .map_err(token_error("read attribute"))?
        .into_iter()
        .find_map(|attribute| match attribute {
            Attribute::Value(value) => Some(value),
            _ => None,
        })
        .ok_or_else(|| CryptoError::Token("object has no value".into()))
}

impl TokenSession for Pkcs11Session {
    fn derive_shared_secret(&self, peer_public: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let session = self.session()?;
        let params = Ecdh1DeriveParams::new(EcKdf::null(), peer_public);
        let template = [
            Attribute::Class(ObjectClass::SECRET_KEY),
            Attribute::KeyType(KeyType::GENERIC_SECRET),
            Attribute::ValueLen(Ulong::from(SHARED_SECRET_LEN)),
            Attribute::Token(false),
            Attribute::Sensitive(false),
            Attribute::Extractable(true),
        ];

        let derived = session
            .derive_key(&Mechanism::Ecdh1Derive(params), self.key, &template)
            .map_err(token_error("derive"))?;
        let shared = read_value(session, derived);
        if let Err(e) = session.destroy_object(derived) {
            warn!("Unable to destroy derived key: {}", e);
        }
        shared
    }

    fn sign_digest(&self, digest: &[u8]) -> Result<Vec<u8>, CryptoError> {
        self.session()?
            .sign(&Mechanism::Ecdsa, self.key, digest)
            .map_err(token_error("sign"))
    }

    fn certificate_der(&self) -> Vec<u8> {
        self.certificate.clone()
    }

    fn close(&mut self) {
        if let Some(session) = self.session.take() {
            if let Err(e) = session.logout() {
                debug!("Token logout failed: {}", e);
            }
            // Session closes on drop
        }
    }
}
