// SPDX-FileCopyrightText: 2026 Secretsync Contributors
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Integration Tests for Secretsync Core
//!
//! These tests drive the agent through several consecutive cycles the way a
//! device experiences them.
//!
//! Run with: cargo test --test integration

#[path = "../common/mod.rs"]
mod common;

mod check_in_workflow_test;
