// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! `CloudflareTunnelIngress` reconciliation logic.
//!
//! One pass resolves the backend of the resource, aggregates the intent of
//! every other enabled resource, rewrites and verifies the shared tunnel
//! configuration, upserts the CNAME and reports status. Only status
//! patches can fail the pass; everything else is reported on the resource
//! and requeued.
//!
//! Status patches come back as watch events. A pass is skipped while the
//! spec generation has already been observed and the last Ready or Failed
//! pass is younger than its requeue interval, so a pass never triggers the
//! next one.

use anyhow::Result;
use chrono::{DateTime, Utc};
use kube::ResourceExt;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::constants::ERROR_REQUEUE_DURATION_SECS;
use crate::context::Context;
use crate::crd::{CloudflareTunnelIngress, Phase};
use crate::reconcilers::aggregator::build_desired_state;
use crate::reconcilers::status::TunnelIngressStatusUpdater;

/// Message reported while the tunnel configuration is being written.
pub const MESSAGE_SYNCING: &str = "Updating tunnel configuration";

/// Message reported for disabled resources.
pub const MESSAGE_DISABLED: &str = "disabled";

/// How a reconcile pass ended and when to run the next one.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReconcileOutcome {
    pub phase: Phase,
    /// `None` means wait for the next change event.
    pub requeue_after: Option<Duration>,
    /// Metrics label: `ready`, `pending`, `disabled`, `failed` or `skipped`.
    pub label: &'static str,
}

impl ReconcileOutcome {
    fn new(phase: Phase, requeue_after: Option<Duration>, label: &'static str) -> Self {
        Self {
            phase,
            requeue_after,
            label,
        }
    }
}

/// Time left before an already observed resource is due for another pass.
///
/// Returns `None` when a pass should run now: the generation changed, the
/// status is missing or unparseable, the last pass ended Pending or Syncing,
/// or the requeue interval of the last Ready or Failed pass has run out.
#[must_use]
pub fn time_until_resync(
    ingress: &CloudflareTunnelIngress,
    now: DateTime<Utc>,
) -> Option<Duration> {
    let status = ingress.status.as_ref()?;
    let generation = ingress.metadata.generation?;
    if status.observed_generation != Some(generation) {
        return None;
    }

    let interval = match status.phase? {
        Phase::Ready => ingress.spec.sync_interval(),
        Phase::Failed => Duration::from_secs(ERROR_REQUEUE_DURATION_SECS),
        Phase::Pending | Phase::Syncing => return None,
    };

    let last_sync = DateTime::parse_from_rfc3339(status.last_sync_time.as_deref()?).ok()?;
    let elapsed = now
        .signed_duration_since(last_sync.with_timezone(&Utc))
        .to_std()
        .ok()?;
    interval.checked_sub(elapsed).filter(|left| !left.is_zero())
}

/// Reconcile one `CloudflareTunnelIngress`.
///
/// # Errors
///
/// Returns an error only when the status subresource cannot be patched.
pub async fn reconcile_tunnel_ingress(
    ctx: &Context,
    ingress: &CloudflareTunnelIngress,
) -> Result<ReconcileOutcome> {
    let namespace = ingress.namespace().unwrap_or_default();
    let name = ingress.name_any();
    let spec = &ingress.spec;
    let hostname = spec.hostname.as_str();
    let retry_after = Some(Duration::from_secs(ERROR_REQUEUE_DURATION_SECS));

    debug!(
        resource = %format!("{namespace}/{name}"),
        hostname = %hostname,
        generation = ?ingress.metadata.generation,
        "Reconciling CloudflareTunnelIngress"
    );

    if let Some(remaining) = time_until_resync(ingress, Utc::now()) {
        let phase = ingress
            .status
            .as_ref()
            .and_then(|s| s.phase)
            .unwrap_or_default();
        debug!(
            hostname = %hostname,
            phase = %phase,
            resync_in = ?remaining,
            "Generation already observed, waiting for resync"
        );
        return Ok(ReconcileOutcome::new(phase, Some(remaining), "skipped"));
    }

    let mut status = TunnelIngressStatusUpdater::new(ingress);

    if !spec.is_enabled() {
        info!(hostname = %hostname, "Tunnel ingress disabled, skipping synchronization");
        status.set_phase(Phase::Pending, MESSAGE_DISABLED, None);
        status.apply(ctx.store.as_ref()).await?;
        return Ok(ReconcileOutcome::new(Phase::Pending, None, "disabled"));
    }

    let endpoint = match ctx.resolver.resolve(spec, &namespace).await {
        Ok(endpoint) => endpoint,
        Err(e) => {
            warn!(hostname = %hostname, error = %e, "Failed to resolve backend");
            status.set_phase(Phase::Pending, &e.to_string(), None);
            status.apply(ctx.store.as_ref()).await?;
            return Ok(ReconcileOutcome::new(Phase::Pending, retry_after, "pending"));
        }
    };

    let desired =
        build_desired_state(hostname, &endpoint, ctx.store.as_ref(), &ctx.resolver).await;

    status.set_phase(Phase::Syncing, MESSAGE_SYNCING, None);
    status.apply(ctx.store.as_ref()).await?;

    let report = match ctx.synchronizer.sync(&desired).await {
        Ok(report) => report,
        Err(e) => {
            status.set_phase(Phase::Failed, &e.to_string(), None);
            status.apply(ctx.store.as_ref()).await?;
            return Ok(ReconcileOutcome::new(Phase::Failed, retry_after, "failed"));
        }
    };

    match ctx.dns.upsert_cname(hostname).await {
        Ok(outcome) => debug!(hostname = %hostname, outcome = %outcome, "CNAME upsert finished"),
        Err(e) => warn!(hostname = %hostname, error = %e, "Failed to upsert CNAME record, continuing"),
    }

    let message = if report.drift_accepted {
        format!("Published {endpoint} (remote configuration still converging)")
    } else {
        format!("Published {endpoint}")
    };
    status.set_phase(Phase::Ready, &message, Some(endpoint.as_str()));
    status.apply(ctx.store.as_ref()).await?;

    info!(
        hostname = %hostname,
        endpoint = %endpoint,
        attempts = report.attempts,
        "Tunnel ingress ready"
    );

    Ok(ReconcileOutcome::new(
        Phase::Ready,
        Some(spec.sync_interval()),
        "ready",
    ))
}

#[cfg(test)]
#[path = "tunnel_ingress_tests.rs"]
mod tunnel_ingress_tests;
