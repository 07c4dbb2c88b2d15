// SPDX-FileCopyrightText: 2026 Secretsync Contributors
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Secretsync Core Library
//!
//! Delivers encrypted secret files from a config server to an unattended
//! device. Each entry of the server bundle is encrypted to the device key,
//! which lives either in a PEM file or inside a PKCS#11 token.
//!
//! One synchronization cycle:
//! - opens the device key and a mutual-TLS HTTP client
//! - runs pending one-shot init hooks
//! - fetches the bundle conditionally (`If-Modified-Since`)
//! - decrypts it and materializes each entry atomically under the secrets dir
//! - persists the accepted bundle stamped with the server's `Date`

pub mod bundle;
pub mod config;
pub mod crypto;
pub mod device;
pub mod error;
pub mod hooks;
pub mod materialize;
pub mod mock;
pub mod sync;
pub mod tls;
pub mod transport;

pub use bundle::{decode, decode_file, BundleError, ConfigSnapshot, DecodeMode, SecretEntry};
pub use config::{AgentConfig, ConfigError, KeySource, CONFIG_URL_ENV};
pub use crypto::{
    parse_key_id, seal, CryptoCapability, CryptoError, HardwareToken, SimulatedToken,
    SoftwareKey, TokenSession, TokenSettings,
};
pub use device::DeviceResources;
pub use error::{NotModified, SyncError};
pub use hooks::{HookContext, HookError, InitHookRegistry};
pub use materialize::{
    atomic_write, ApplyReport, CommandHookRunner, HookRunner, MaterializeError, Materializer,
    CONFIG_FILE_ENV, TEMP_SUFFIX,
};
pub use mock::MockTransport;
pub use sync::{
    format_http_date, parse_http_date, Agent, CycleResources, CycleSession, ENCRYPTED_CONFIG_FILE,
};
pub use transport::{HttpRequest, HttpResponse, HttpTransport, ReqwestTransport, TransportError};
