// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Kubernetes reconciliation for tunnel ingress resources.
//!
//! # Reconciliation Architecture
//!
//! Each pass over a `CloudflareTunnelIngress` runs the same pipeline:
//!
//! 1. **Resolve** - turn the Service reference into a stable backend address ([`resolver`])
//! 2. **Aggregate** - collect the intent of every enabled resource ([`aggregator`])
//! 3. **Synchronize** - merge and write the shared tunnel configuration under a global lock ([`sync`])
//! 4. **Verify** - read back, classify and retry until consistent ([`verify`], [`retry`])
//! 5. **DNS** - upsert the CNAME for the hostname ([`dns`])
//! 6. **Status** - report the phase back to Kubernetes ([`status`])
//!
//! [`reconcile_tunnel_ingress`] drives the pipeline.

pub mod aggregator;
pub mod cluster;
pub mod dns;
pub mod resolver;
pub mod retry;
pub mod status;
pub mod sync;
pub mod tunnel_ingress;
pub mod verify;

#[cfg(test)]
pub(crate) mod fakes;

pub use tunnel_ingress::{reconcile_tunnel_ingress, ReconcileOutcome};
