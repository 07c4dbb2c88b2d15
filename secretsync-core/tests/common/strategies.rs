// SPDX-FileCopyrightText: 2026 Secretsync Contributors
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Proptest Strategies
//!
//! Reusable proptest strategies for property-based testing.

use std::collections::BTreeMap;

use proptest::prelude::*;

use secretsync_core::{ConfigSnapshot, SecretEntry};

/// Strategy for file names drawn from a small pool, so snapshots overlap.
pub fn file_name_strategy() -> impl Strategy<Value = String> {
    "[a-f]\\.conf"
}

/// Strategy for secret contents (possibly empty).
pub fn content_strategy() -> impl Strategy<Value = String> {
    "[a-z0-9]{0,12}"
}

/// Strategy for snapshot layouts: name -> (content, has hook).
pub fn snapshot_layout_strategy() -> impl Strategy<Value = BTreeMap<String, (String, bool)>> {
    prop::collection::btree_map(
        file_name_strategy(),
        (content_strategy(), any::<bool>()),
        0..6,
    )
}

/// Strategy for textual key ids.
pub fn key_id_strategy() -> impl Strategy<Value = String> {
    "[0-9]{0,8}"
}

/// Builds a decrypted snapshot from a layout.
pub fn snapshot_from_layout(layout: &BTreeMap<String, (String, bool)>) -> ConfigSnapshot {
    let mut snapshot = ConfigSnapshot::new();
    for (name, (content, has_hook)) in layout {
        let mut entry = SecretEntry::new(content.as_bytes());
        if *has_hook {
            entry = entry.with_on_changed(["/bin/true"]);
        }
        snapshot.insert(name.clone(), entry).unwrap();
    }
    snapshot
}
