// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Status reporting for `CloudflareTunnelIngress` resources.
//!
//! Status changes are collected in memory by [`TunnelIngressStatusUpdater`]
//! and written with a single merge patch on the status subresource, and only
//! when something a user would notice changed. Writing an identical status
//! would trigger another watch event and another reconcile.
//!
//! # Condition Format
//!
//! Kubernetes conditions follow a standard format:
//! - `type`: The aspect of the resource being reported (always "Ready" here)
//! - `status`: "True", "False", or "Unknown"
//! - `reason`: A programmatic identifier (CamelCase)
//! - `message`: A human-readable explanation
//! - `lastTransitionTime`: RFC3339 timestamp when the condition changed
//!
//! # Example
//!
//! ```rust,no_run
//! use tunnelsync::reconcilers::status::create_condition;
//!
//! let condition = create_condition("Ready", "True", "Synced", "Published");
//! assert_eq!(condition.status, "True");
//! ```

use anyhow::Result;
use chrono::Utc;
use kube::ResourceExt;
use tracing::debug;

use crate::crd::{CloudflareTunnelIngress, CloudflareTunnelIngressStatus, Condition, Phase};
use crate::reconcilers::cluster::IngressStore;
use crate::status_reasons::{ready_condition_for, CONDITION_TYPE_READY};

/// Create a new Kubernetes condition with the current timestamp.
///
/// # Arguments
///
/// * `condition_type` - The type of condition (e.g., "Ready")
/// * `status` - The status: "True", "False", or "Unknown"
/// * `reason` - A programmatic identifier in `CamelCase` (e.g., "`Synced`")
/// * `message` - A human-readable explanation
#[must_use]
pub fn create_condition(
    condition_type: &str,
    status: &str,
    reason: &str,
    message: &str,
) -> Condition {
    Condition {
        r#type: condition_type.to_string(),
        status: status.to_string(),
        reason: Some(reason.to_string()),
        message: Some(message.to_string()),
        last_transition_time: Some(Utc::now().to_rfc3339()),
    }
}

/// Find a condition by type in a list of conditions.
#[must_use]
pub fn find_condition<'a>(
    conditions: &'a [Condition],
    condition_type: &str,
) -> Option<&'a Condition> {
    conditions.iter().find(|c| c.r#type == condition_type)
}

/// Update or add a condition in a mutable conditions list (in-memory, no API call).
///
/// The `lastTransitionTime` is preserved when the status value does not
/// change, and reset to now when it does.
pub fn update_condition_in_memory(
    conditions: &mut Vec<Condition>,
    condition_type: &str,
    status: &str,
    reason: &str,
    message: &str,
) {
    if let Some(existing) = conditions.iter_mut().find(|c| c.r#type == condition_type) {
        let last_transition_time = if existing.status == status {
            existing
                .last_transition_time
                .clone()
                .unwrap_or_else(|| Utc::now().to_rfc3339())
        } else {
            Utc::now().to_rfc3339()
        };

        existing.status = status.to_string();
        existing.reason = Some(reason.to_string());
        existing.message = Some(message.to_string());
        existing.last_transition_time = Some(last_transition_time);
    } else {
        conditions.push(create_condition(condition_type, status, reason, message));
    }
}

/// Compare two condition lists ignoring `lastTransitionTime`.
#[must_use]
pub fn conditions_equal(current: &[Condition], new: &[Condition]) -> bool {
    if current.len() != new.len() {
        return false;
    }

    new.iter().all(|new_cond| {
        current.iter().any(|curr_cond| {
            curr_cond.r#type == new_cond.r#type
                && curr_cond.status == new_cond.status
                && curr_cond.reason == new_cond.reason
                && curr_cond.message == new_cond.message
        })
    })
}

/// Collects status changes for one `CloudflareTunnelIngress` and writes them.
///
/// ```rust,ignore
/// let mut status = TunnelIngressStatusUpdater::new(&ingress);
/// status.set_phase(Phase::Syncing, "Updating tunnel configuration", None);
/// status.apply(store).await?;
/// ```
pub struct TunnelIngressStatusUpdater {
    namespace: String,
    name: String,
    generation: Option<i64>,
    current_status: Option<CloudflareTunnelIngressStatus>,
    new_status: CloudflareTunnelIngressStatus,
}

impl TunnelIngressStatusUpdater {
    #[must_use]
    pub fn new(ingress: &CloudflareTunnelIngress) -> Self {
        let current_status = ingress.status.clone();
        let new_status = current_status.clone().unwrap_or_default();

        Self {
            namespace: ingress.namespace().unwrap_or_default(),
            name: ingress.name_any(),
            generation: ingress.metadata.generation,
            current_status,
            new_status,
        }
    }

    /// Move to `phase` (in-memory only, no API call).
    ///
    /// A missing or empty `endpoint` keeps the currently published one.
    /// `lastSyncTime` is refreshed when the phase or the endpoint changes.
    pub fn set_phase(&mut self, phase: Phase, message: &str, endpoint: Option<&str>) {
        let endpoint = endpoint.filter(|e| !e.is_empty());
        let endpoint_changed =
            endpoint.is_some_and(|e| self.new_status.current_endpoint.as_deref() != Some(e));
        let phase_changed = self.new_status.phase != Some(phase);

        if let Some(endpoint) = endpoint {
            self.new_status.current_endpoint = Some(endpoint.to_string());
        }
        if phase_changed || endpoint_changed || self.new_status.last_sync_time.is_none() {
            self.new_status.last_sync_time = Some(Utc::now().to_rfc3339());
        }

        self.new_status.phase = Some(phase);
        self.new_status.message = Some(message.to_string());
        self.new_status.observed_generation = self.generation;

        let (status, reason) = ready_condition_for(phase);
        update_condition_in_memory(
            &mut self.new_status.conditions,
            CONDITION_TYPE_READY,
            status,
            reason,
            message,
        );
    }

    #[must_use]
    pub fn status(&self) -> &CloudflareTunnelIngressStatus {
        &self.new_status
    }

    #[must_use]
    pub fn ready_condition(&self) -> Option<&Condition> {
        find_condition(&self.new_status.conditions, CONDITION_TYPE_READY)
    }

    /// True when the pending status differs from the last written one.
    #[must_use]
    pub fn has_changes(&self) -> bool {
        match &self.current_status {
            None => true,
            Some(current) => {
                current.phase != self.new_status.phase
                    || current.message != self.new_status.message
                    || current.current_endpoint != self.new_status.current_endpoint
                    || current.observed_generation != self.new_status.observed_generation
                    || !conditions_equal(&current.conditions, &self.new_status.conditions)
            }
        }
    }

    /// Write the collected status if it changed. Returns whether a patch was sent.
    ///
    /// # Errors
    ///
    /// Returns an error if the Kubernetes API call fails.
    pub async fn apply(&mut self, store: &dyn IngressStore) -> Result<bool> {
        if !self.has_changes() {
            debug!(
                "CloudflareTunnelIngress {}/{} status unchanged, skipping update",
                self.namespace, self.name
            );
            return Ok(false);
        }

        store
            .patch_tunnel_ingress_status(&self.namespace, &self.name, &self.new_status)
            .await?;

        debug!(
            "Updated CloudflareTunnelIngress {}/{} status: phase {}",
            self.namespace,
            self.name,
            self.new_status.phase.unwrap_or_default()
        );
        self.current_status = Some(self.new_status.clone());
        Ok(true)
    }
}

#[cfg(test)]
#[path = "status_tests.rs"]
mod status_tests;
