// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! # tunnelsync - Cloudflare Tunnel Ingress Operator for Kubernetes
//!
//! tunnelsync publishes in-cluster Services through a Cloudflare tunnel.
//! Each `CloudflareTunnelIngress` maps one public hostname to one Service;
//! the operator keeps the tunnel's shared ingress configuration and the
//! hostname's CNAME in line with those mappings.
//!
//! ## Guarantees
//!
//! - Pod addresses in the configured ephemeral networks are never published
//! - Concurrent reconciles never overwrite each other's tunnel changes
//! - Rules the operator does not own are preserved
//! - Stale or inconsistent reads of the tunnel configuration are detected and repaired
//!
//! ## Modules
//!
//! - [`crd`] - Custom Resource Definition types
//! - [`reconcilers`] - Reconciliation pipeline
//! - [`cloudflare`] - Cloudflare API client
//! - [`context`] - Collaborators shared by all reconciles
//! - [`ephemeral`] - Ephemeral address detection
//! - [`metrics`] - Prometheus metrics
//!
//! ## Example
//!
//! ```rust,no_run
//! use tunnelsync::ephemeral::EphemeralAddressFilter;
//!
//! let filter: EphemeralAddressFilter = "10.99.0.0/16".parse().unwrap();
//! assert!(filter.is_ephemeral_endpoint("http://10.99.4.2:8080"));
//! assert!(!filter.is_ephemeral_endpoint("http://web.default.svc.cluster.local:80"));
//! ```

pub mod cloudflare;
pub mod config;
pub mod constants;
pub mod context;
pub mod crd;
pub mod duration;
pub mod ephemeral;
pub mod errors;
pub mod metrics;
pub mod reconcilers;
pub mod status_reasons;
