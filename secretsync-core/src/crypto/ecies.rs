// SPDX-FileCopyrightText: 2026 Secretsync Contributors
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! ECIES over P-256 (ECDH + HKDF-SHA256 + AES-256-GCM)
//!
//! Sealed value format (base64, standard alphabet):
//! `ephemeral_public (65 bytes, SEC1 uncompressed) || nonce (12 bytes) || ciphertext || tag (16 bytes)`
//!
//! The AES key is `HKDF-SHA256(ikm = ECDH x-coordinate, salt = empty,
//! info = ECIES_INFO || ephemeral_public)`.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use p256::elliptic_curve::sec1::ToEncodedPoint;
use p256::{PublicKey, SecretKey};
use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM};
use ring::hkdf;
use ring::rand::{SecureRandom, SystemRandom};
use zeroize::Zeroizing;

use super::CryptoError;

/// Size of an uncompressed SEC1 P-256 point.
pub(crate) const EPHEMERAL_KEY_SIZE: usize = 65;
/// Nonce size for AES-256-GCM (96 bits = 12 bytes).
const NONCE_SIZE: usize = 12;
/// Maximum attempts at drawing a valid ephemeral scalar.
const MAX_KEYGEN_ATTEMPTS: usize = 4;

/// KDF info for domain separation.
const ECIES_INFO: &[u8] = b"secretsync-ecies-v1";

/// Seals `plaintext` to `recipient`, returning the base64 encoded value.
///
/// This is the operation the config server performs for every entry; the
/// agent only ever opens values.
pub fn seal(recipient: &PublicKey, plaintext: &[u8]) -> Result<String, CryptoError> {
    let rng = SystemRandom::new();
    let ephemeral = random_secret_key(&rng)?;
    let ephemeral_public = ephemeral.public_key().to_encoded_point(false);

    let shared = p256::ecdh::diffie_hellman(ephemeral.to_nonzero_scalar(), recipient.as_affine());
    let key = derive_key(shared.raw_secret_bytes(), ephemeral_public.as_bytes())
        .map_err(|_| CryptoError::EncryptionFailed)?;

    let mut nonce_bytes = [0u8; NONCE_SIZE];
    rng.fill(&mut nonce_bytes)
        .map_err(|_| CryptoError::EncryptionFailed)?;

    let mut in_out = plaintext.to_vec();
    key.seal_in_place_append_tag(
        Nonce::assume_unique_for_key(nonce_bytes),
        Aad::empty(),
        &mut in_out,
    )
    .map_err(|_| CryptoError::EncryptionFailed)?;

    let mut output = Vec::with_capacity(EPHEMERAL_KEY_SIZE + NONCE_SIZE + in_out.len());
    output.extend_from_slice(ephemeral_public.as_bytes());
    output.extend_from_slice(&nonce_bytes);
    output.extend_from_slice(&in_out);

    Ok(BASE64.encode(output))
}

/// Opens a sealed value.
///
/// `agree` receives the SEC1 encoded ephemeral public key and returns the raw
/// ECDH shared secret. Software keys compute it in process; tokens compute it
/// inside the module.
pub(crate) fn open_with<F>(ciphertext: &str, agree: F) -> Result<Vec<u8>, CryptoError>
where
    F: FnOnce(&[u8]) -> Result<Vec<u8>, CryptoError>,
{
    let data = BASE64
        .decode(ciphertext.trim())
        .map_err(|_| CryptoError::InvalidEncoding)?;

    let min_size = EPHEMERAL_KEY_SIZE + NONCE_SIZE + AES_256_GCM.tag_len();
    if data.len() < min_size {
        return Err(CryptoError::CiphertextTooShort);
    }

    let (ephemeral_public, rest) = data.split_at(EPHEMERAL_KEY_SIZE);
    let (nonce_bytes, sealed) = rest.split_at(NONCE_SIZE);

    let shared = Zeroizing::new(agree(ephemeral_public)?);
    let key = derive_key(&shared, ephemeral_public)?;

    let nonce = Nonce::try_assume_unique_for_key(nonce_bytes)
        .map_err(|_| CryptoError::DecryptionFailed)?;

    let mut buffer = sealed.to_vec();
    let plaintext_len = key
        .open_in_place(nonce, Aad::empty(), &mut buffer)
        .map_err(|_| CryptoError::DecryptionFailed)?
        .len();
    buffer.truncate(plaintext_len);

    Ok(buffer)
}

/// Computes the ECDH shared secret between a local key and a SEC1 encoded peer key.
pub(crate) fn agree(secret: &SecretKey, peer_public: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let peer = PublicKey::from_sec1_bytes(peer_public).map_err(|_| CryptoError::InvalidPublicKey)?;
    let shared = p256::ecdh::diffie_hellman(secret.to_nonzero_scalar(), peer.as_affine());
    Ok(shared.raw_secret_bytes().to_vec())
}

/// Draws a random P-256 secret key from the system RNG.
pub(crate) fn random_secret_key(rng: &SystemRandom) -> Result<SecretKey, CryptoError> {
    for _ in 0..MAX_KEYGEN_ATTEMPTS {
        let bytes = Zeroizing::new(
            ring::rand::generate::<[u8; 32]>(rng)
                .map_err(|_| CryptoError::EncryptionFailed)?
                .expose(),
        );
        // Rejects zero and values above the group order
        if let Ok(key) = SecretKey::from_bytes((&*bytes).into()) {
            return Ok(key);
        }
    }
    Err(CryptoError::EncryptionFailed)
}

fn derive_key(shared: &[u8], ephemeral_public: &[u8]) -> Result<LessSafeKey, CryptoError> {
    let salt = hkdf::Salt::new(hkdf::HKDF_SHA256, &[]);
    let prk = salt.extract(shared);
    let info = [ECIES_INFO, ephemeral_public];
    let okm = prk
        .expand(&info, &AES_256_GCM)
        .map_err(|_| CryptoError::KeyDerivation)?;
    Ok(LessSafeKey::new(UnboundKey::from(okm)))
}
