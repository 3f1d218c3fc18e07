// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Cluster-wide desired state of the tunnel configuration.
//!
//! The tunnel configuration is shared, so every write must carry the intent
//! of every enabled `CloudflareTunnelIngress`, not only the one being
//! reconciled. The aggregator lists all resources and resolves each of them.
//!
//! - `managed` holds every hostname owned by an enabled resource. Rules for
//!   these hostnames are always rewritten by the synchronizer.
//! - `known_correct` holds the subset that resolved this pass. A managed
//!   hostname that failed to resolve is left unpublished rather than kept
//!   at a possibly stale address.

use kube::ResourceExt;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

use crate::reconcilers::cluster::IngressStore;
use crate::reconcilers::resolver::{EndpointResolver, ResolvedEndpoint};

/// Hostnames owned by the operator and the endpoints they should publish.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DesiredState {
    /// Managed hostnames that resolved this pass.
    pub known_correct: BTreeMap<String, ResolvedEndpoint>,
    /// Every managed hostname, resolved or not.
    pub managed: BTreeSet<String>,
}

impl DesiredState {
    /// State holding only one already resolved hostname.
    #[must_use]
    pub fn seeded(hostname: &str, endpoint: ResolvedEndpoint) -> Self {
        let mut state = Self::default();
        state.managed.insert(hostname.to_string());
        state.known_correct.insert(hostname.to_string(), endpoint);
        state
    }
}

/// Build the desired state around the hostname under reconciliation.
///
/// `endpoint` was resolved earlier in this pass and is used as-is for
/// `current_hostname`. Resources being deleted still count as long as they
/// are enabled. A failure to list resources degrades to the seeded state.
pub async fn build_desired_state(
    current_hostname: &str,
    endpoint: &ResolvedEndpoint,
    store: &dyn IngressStore,
    resolver: &EndpointResolver,
) -> DesiredState {
    let mut state = DesiredState::seeded(current_hostname, endpoint.clone());

    let ingresses = match store.list_tunnel_ingresses().await {
        Ok(ingresses) => ingresses,
        Err(e) => {
            warn!(
                hostname = %current_hostname,
                error = %format!("{e:#}"),
                "Failed to list tunnel ingresses, synchronizing only the current hostname"
            );
            return state;
        }
    };

    for ingress in &ingresses {
        let hostname = ingress.spec.hostname.as_str();
        if hostname.is_empty() || hostname == current_hostname || !ingress.spec.is_enabled() {
            continue;
        }
        state.managed.insert(hostname.to_string());
        if state.known_correct.contains_key(hostname) {
            continue;
        }

        let namespace = ingress.namespace().unwrap_or_default();
        match resolver.resolve(&ingress.spec, &namespace).await {
            Ok(resolved) => {
                state.known_correct.insert(hostname.to_string(), resolved);
            }
            Err(e) => {
                debug!(
                    hostname = %hostname,
                    resource = %format!("{namespace}/{}", ingress.name_any()),
                    error = %e,
                    "Managed hostname did not resolve, leaving it unpublished"
                );
            }
        }
    }

    debug!(
        managed = state.managed.len(),
        resolved = state.known_correct.len(),
        "Built desired tunnel state"
    );
    state
}

#[cfg(test)]
#[path = "aggregator_tests.rs"]
mod aggregator_tests;
