// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Status condition types and reasons for `CloudflareTunnelIngress`.
//!
//! Every resource carries exactly one condition, `type: Ready`, derived
//! from its phase:
//!
//! | Phase              | status    | reason       |
//! |--------------------|-----------|--------------|
//! | `Ready`            | `True`    | `Synced`     |
//! | `Failed`           | `False`   | `SyncFailed` |
//! | `Pending`/`Syncing`| `Unknown` | `Syncing`    |
//!
//! # Example Status
//!
//! ```yaml
//! status:
//!   phase: Ready
//!   currentEndpoint: http://app.web.svc.cluster.local:8080
//!   conditions:
//!     - type: Ready
//!       status: "True"
//!       reason: Synced
//!       message: "Published http://app.web.svc.cluster.local:8080"
//! ```

use crate::crd::Phase;

/// The single condition type maintained on each resource.
pub const CONDITION_TYPE_READY: &str = "Ready";

pub const CONDITION_STATUS_TRUE: &str = "True";
pub const CONDITION_STATUS_FALSE: &str = "False";
pub const CONDITION_STATUS_UNKNOWN: &str = "Unknown";

/// The hostname is published and verified.
pub const REASON_SYNCED: &str = "Synced";

/// The last synchronization pass failed.
pub const REASON_SYNC_FAILED: &str = "SyncFailed";

/// Waiting for a backend or a synchronization pass in progress.
pub const REASON_SYNCING: &str = "Syncing";

/// Ready condition status and reason for a phase.
#[must_use]
pub fn ready_condition_for(phase: Phase) -> (&'static str, &'static str) {
    match phase {
        Phase::Ready => (CONDITION_STATUS_TRUE, REASON_SYNCED),
        Phase::Failed => (CONDITION_STATUS_FALSE, REASON_SYNC_FAILED),
        Phase::Pending | Phase::Syncing => (CONDITION_STATUS_UNKNOWN, REASON_SYNCING),
    }
}

#[cfg(test)]
#[path = "status_reasons_tests.rs"]
mod status_reasons_tests;
