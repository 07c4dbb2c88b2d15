// SPDX-FileCopyrightText: 2026 Secretsync Contributors
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Encrypted Config Bundle
//!
//! The server delivers one JSON object per device:
//!
//! ```json
//! {
//!   "mqtt.conf": { "Value": "<base64 ECIES>", "OnChanged": ["/usr/bin/systemctl", "restart", "mqtt"] },
//!   "token":     { "Value": "<base64 ECIES>" }
//! }
//! ```
//!
//! Decoding either decrypts every value in place ([`DecodeMode::Decrypt`]) or
//! leaves them untouched ([`DecodeMode::NamesOnly`]). The latter is used for
//! the previously persisted bundle, where only the file names matter, so no
//! token operations are spent on it.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::de::{self, MapAccess, Visitor};
use serde::{Deserialize, Deserializer};
use thiserror::Error;
use zeroize::Zeroize;

use crate::crypto::{CryptoCapability, CryptoError};
use crate::materialize::TEMP_SUFFIX;

/// One named secret file.
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct SecretEntry {
    /// Ciphertext as received, or plaintext after a decrypting decode.
    #[serde(rename = "Value", alias = "value", deserialize_with = "string_bytes")]
    pub value: Vec<u8>,

    /// Command (program followed by arguments) run when the file changes.
    #[serde(
        rename = "OnChanged",
        alias = "onChanged",
        default,
        deserialize_with = "optional_command"
    )]
    pub on_changed: Vec<String>,
}

impl SecretEntry {
    /// Creates an entry without a change hook.
    pub fn new(value: impl Into<Vec<u8>>) -> Self {
        SecretEntry {
            value: value.into(),
            on_changed: Vec::new(),
        }
    }

    /// Sets the change hook.
    pub fn with_on_changed<I, S>(mut self, command: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.on_changed = command.into_iter().map(Into::into).collect();
        self
    }
}

impl fmt::Debug for SecretEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretEntry")
            .field("value", &format_args!("[{} bytes]", self.value.len()))
            .field("on_changed", &self.on_changed)
            .finish()
    }
}

impl Drop for SecretEntry {
    fn drop(&mut self) {
        self.value.zeroize();
    }
}

fn string_bytes<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
where
    D: Deserializer<'de>,
{
    String::deserialize(deserializer).map(String::into_bytes)
}

fn optional_command<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<String>>::deserialize(deserializer)?.unwrap_or_default())
}

/// Set of secret files keyed by file name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigSnapshot {
    entries: BTreeMap<String, SecretEntry>,
}

impl ConfigSnapshot {
    /// Creates an empty snapshot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an entry, rejecting invalid or duplicate names.
    pub fn insert(&mut self, name: impl Into<String>, entry: SecretEntry) -> Result<(), BundleError> {
        let name = name.into();
        validate_name(&name).map_err(BundleError::InvalidName)?;
        if self.entries.contains_key(&name) {
            return Err(BundleError::DuplicateName(name));
        }
        self.entries.insert(name, entry);
        Ok(())
    }

    /// Builder form of [`insert`](Self::insert).
    pub fn with_entry(mut self, name: impl Into<String>, entry: SecretEntry) -> Result<Self, BundleError> {
        self.insert(name, entry)?;
        Ok(self)
    }

    pub fn get(&self, name: &str) -> Option<&SecretEntry> {
        self.entries.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// File names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &SecretEntry)> {
        self.entries.iter().map(|(name, entry)| (name.as_str(), entry))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Checks that a file name stays inside the secrets directory and cannot
/// collide with a temp file of another entry.
fn validate_name(name: &str) -> Result<(), String> {
    if name.is_empty() || name == "." || name == ".." {
        return Err(name.to_string());
    }
    if name.ends_with(TEMP_SUFFIX) {
        return Err(name.to_string());
    }
    if name.contains('/') || name.contains('\\') || name.contains('\0') {
        return Err(name.to_string());
    }
    Ok(())
}

impl<'de> Deserialize<'de> for ConfigSnapshot {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct SnapshotVisitor;

        impl<'de> Visitor<'de> for SnapshotVisitor {
            type Value = ConfigSnapshot;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of file names to secret entries")
            }

            fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut snapshot = ConfigSnapshot::new();
                while let Some(name) = map.next_key::<String>()? {
                    if snapshot.contains(&name) {
                        return Err(de::Error::custom(format!("duplicate file name {:?}", name)));
                    }
                    validate_name(&name)
                        .map_err(|name| de::Error::custom(format!("invalid file name {:?}", name)))?;
                    let entry: SecretEntry = map.next_value()?;
                    snapshot.entries.insert(name, entry);
                }
                Ok(snapshot)
            }
        }

        deserializer.deserialize_map(SnapshotVisitor)
    }
}

/// How [`decode`] treats entry values.
#[derive(Clone, Copy)]
pub enum DecodeMode<'a> {
    /// Decrypt every value in place.
    Decrypt(&'a dyn CryptoCapability),
    /// Leave values encrypted; only structure and names are needed.
    NamesOnly,
}

impl fmt::Debug for DecodeMode<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeMode::Decrypt(_) => f.write_str("Decrypt"),
            DecodeMode::NamesOnly => f.write_str("NamesOnly"),
        }
    }
}

/// Parses a bundle.
///
/// With [`DecodeMode::Decrypt`] a single undecryptable entry fails the whole
/// decode; no partially decrypted snapshot is ever returned.
pub fn decode(raw: &[u8], mode: DecodeMode<'_>) -> Result<ConfigSnapshot, BundleError> {
    let mut snapshot: ConfigSnapshot = serde_json::from_slice(raw)?;

    if let DecodeMode::Decrypt(crypto) = mode {
        for (name, entry) in snapshot.entries.iter_mut() {
            let ciphertext = std::str::from_utf8(&entry.value).map_err(|_| BundleError::Decrypt {
                name: name.clone(),
                source: CryptoError::InvalidEncoding,
            })?;
            let plaintext = crypto
                .decrypt(ciphertext)
                .map_err(|source| BundleError::Decrypt {
                    name: name.clone(),
                    source,
                })?;
            entry.value = plaintext;
        }
    }

    Ok(snapshot)
}

/// Reads and parses a bundle file.
pub fn decode_file(path: &Path, mode: DecodeMode<'_>) -> Result<ConfigSnapshot, BundleError> {
    let raw = fs::read(path).map_err(|source| BundleError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    decode(&raw, mode)
}

/// Bundle error types.
#[derive(Error, Debug)]
pub enum BundleError {
    #[error("Malformed bundle: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Invalid file name {0:?}")]
    InvalidName(String),

    #[error("Duplicate file name {0:?}")]
    DuplicateName(String),

    #[error("Unable to decrypt {name}: {source}")]
    Decrypt {
        name: String,
        #[source]
        source: CryptoError,
    },

    #[error("Unable to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl BundleError {
    /// True when the bundle file simply does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, BundleError::Io { source, .. } if source.kind() == io::ErrorKind::NotFound)
    }
}
