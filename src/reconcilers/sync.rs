// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Synchronization of the shared tunnel ingress configuration.
//!
//! The tunnel configuration is one document shared by every
//! `CloudflareTunnelIngress` in the cluster. Each synchronization re-reads
//! it, merges in the desired state and writes the whole document back,
//! then verifies the result. The complete read-merge-write-verify sequence,
//! including backoff sleeps, runs under a single process-wide lock so two
//! reconciles never overwrite each other's changes.
//!
//! # Merge order
//!
//! 1. One rule per resolved managed hostname, in hostname order
//! 2. Unmanaged rules, in their original order, minus ephemeral ones
//! 3. The catch-all rule

use rand::Rng;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::cloudflare::{IngressRule, TunnelConfigApi};
use crate::ephemeral::EphemeralAddressFilter;
use crate::errors::SyncError;
use crate::metrics;
use crate::reconcilers::aggregator::DesiredState;
use crate::reconcilers::retry::{write_verify_settle, WriteVerifyError, WriteVerifyPolicy};
use crate::reconcilers::verify::{verify_rules, RuleVerdict};

/// The rule list to write plus what a read-back must show for it.
#[derive(Clone, Debug, PartialEq)]
pub struct MergePlan {
    /// Complete rule list, catch-all last.
    pub rules: Vec<IngressRule>,
    /// Every managed hostname mapped to its intended service, `None` when it must be absent.
    pub expected: BTreeMap<String, Option<String>>,
    /// Unmanaged hostnames dropped because their service is ephemeral.
    pub dropped_ephemeral: Vec<String>,
}

/// Merge the desired state into the current rule list.
#[must_use]
pub fn merge_rules(
    current: &[IngressRule],
    desired: &DesiredState,
    filter: &EphemeralAddressFilter,
) -> MergePlan {
    let mut rules = Vec::with_capacity(current.len() + desired.known_correct.len() + 1);
    let mut expected: BTreeMap<String, Option<String>> = desired
        .managed
        .iter()
        .map(|hostname| (hostname.clone(), None))
        .collect();

    for (hostname, endpoint) in &desired.known_correct {
        if filter.is_ephemeral_endpoint(endpoint.as_str()) {
            warn!(
                hostname = %hostname,
                endpoint = %endpoint,
                "Refusing to publish ephemeral endpoint, leaving hostname unpublished"
            );
            expected.insert(hostname.clone(), None);
            continue;
        }
        rules.push(IngressRule::new(hostname.as_str(), endpoint.as_str()));
        expected.insert(hostname.clone(), Some(endpoint.as_str().to_string()));
    }

    let mut dropped_ephemeral = Vec::new();
    for rule in current {
        let Some(hostname) = rule.hostname() else {
            continue;
        };
        if expected.contains_key(hostname) {
            continue;
        }
        if filter.is_ephemeral_endpoint(&rule.service) {
            warn!(
                hostname = %hostname,
                service = %rule.service,
                "Dropping unmanaged rule with ephemeral service"
            );
            dropped_ephemeral.push(hostname.to_string());
            continue;
        }
        rules.push(rule.clone());
    }

    rules.push(IngressRule::catch_all());

    MergePlan {
        rules,
        expected,
        dropped_ephemeral,
    }
}

/// Result of a successful synchronization.
#[derive(Clone, Debug, PartialEq)]
pub struct SyncReport {
    /// Write cycles used.
    pub attempts: u32,
    /// True when drift remained after the last cycle and was accepted.
    pub drift_accepted: bool,
    /// Number of rules written, catch-all included.
    pub rules_written: usize,
    pub dropped_ephemeral: Vec<String>,
}

/// Serialized writer of the shared tunnel configuration.
pub struct TunnelSynchronizer {
    api: Arc<dyn TunnelConfigApi>,
    filter: EphemeralAddressFilter,
    policy: WriteVerifyPolicy,
    write_lock: Mutex<()>,
}

impl TunnelSynchronizer {
    #[must_use]
    pub fn new(
        api: Arc<dyn TunnelConfigApi>,
        filter: EphemeralAddressFilter,
        policy: WriteVerifyPolicy,
    ) -> Self {
        Self {
            api,
            filter,
            policy,
            write_lock: Mutex::new(()),
        }
    }

    /// Publish `desired` and verify it.
    ///
    /// Every call runs in its own `tunnel_sync` span with a random trace id so
    /// interleaved reconciles can be told apart in the logs.
    ///
    /// # Errors
    ///
    /// - [`SyncError::RemoteRead`] when the configuration could not be read
    /// - [`SyncError::RemoteWrite`] when it could not be written
    /// - [`SyncError::VerificationFailure`] when ephemeral endpoints stayed published
    pub async fn sync(&self, desired: &DesiredState) -> Result<SyncReport, SyncError> {
        let trace_id = format!("{:08x}", rand::rng().random::<u32>());
        let span = info_span!("tunnel_sync", trace_id = %trace_id);
        self.sync_locked(desired).instrument(span).await
    }

    async fn sync_locked(&self, desired: &DesiredState) -> Result<SyncReport, SyncError> {
        let wait_start = Instant::now();
        let _guard = self.write_lock.lock().await;
        let waited = wait_start.elapsed();
        metrics::record_lock_wait(waited);
        debug!(waited = ?waited, managed = desired.managed.len(), "Acquired tunnel configuration lock");

        let mut last_leaked: Vec<String> = Vec::new();

        let result = write_verify_settle(
            &self.policy,
            |attempt| async move {
                let current = self
                    .api
                    .get_ingress_rules()
                    .await
                    .map_err(SyncError::RemoteRead)?;
                let plan = merge_rules(&current, desired, &self.filter);
                debug!(
                    attempt,
                    rules = plan.rules.len(),
                    previous = current.len(),
                    "Writing tunnel configuration"
                );
                let written = self.api.put_ingress_rules(&plan.rules).await;
                metrics::record_remote_write(written.is_ok());
                written.map_err(SyncError::RemoteWrite)?;
                Ok(plan)
            },
            || async move {
                self.api
                    .get_ingress_rules()
                    .await
                    .map_err(SyncError::RemoteRead)
            },
            |plan: &MergePlan, observed: &Vec<IngressRule>, stage| {
                let report = verify_rules(&plan.expected, observed, &self.filter);
                for (hostname, verdict) in &report.verdicts {
                    metrics::record_verification_verdict(verdict.label());
                    match verdict {
                        RuleVerdict::Ok => debug!(hostname = %hostname, ?stage, "Verified"),
                        RuleVerdict::EphemeralAddressLeaked { .. } => {
                            error!(hostname = %hostname, ?stage, verdict = %verdict, "Verification found leaked ephemeral address");
                        }
                        RuleVerdict::Mismatch { .. } | RuleVerdict::Missing => {
                            warn!(hostname = %hostname, ?stage, verdict = %verdict, "Verification mismatch");
                        }
                    }
                }
                last_leaked = report.leaked();
                report.consistency(stage)
            },
            SyncError::is_retryable,
        )
        .await;

        match result {
            Ok(outcome) => {
                let label = if outcome.drift_accepted {
                    "drift_accepted"
                } else {
                    "consistent"
                };
                metrics::record_write_cycles(label, outcome.attempts);
                if outcome.drift_accepted {
                    warn!(
                        attempts = outcome.attempts,
                        "Tunnel configuration still drifts from desired state, continuing"
                    );
                } else {
                    info!(
                        attempts = outcome.attempts,
                        rules = outcome.plan.rules.len(),
                        "Tunnel configuration synchronized and verified"
                    );
                }
                Ok(SyncReport {
                    attempts: outcome.attempts,
                    drift_accepted: outcome.drift_accepted,
                    rules_written: outcome.plan.rules.len(),
                    dropped_ephemeral: outcome.plan.dropped_ephemeral,
                })
            }
            Err(err) => {
                let (attempts, sync_error) = match err {
                    WriteVerifyError::Write { attempts, source }
                    | WriteVerifyError::ReadBack { attempts, source } => (attempts, source),
                    WriteVerifyError::Leaked { attempts } => (
                        attempts,
                        SyncError::VerificationFailure {
                            attempts,
                            hostnames: last_leaked,
                        },
                    ),
                };
                metrics::record_write_cycles("failed", attempts);
                error!(attempts, error = %sync_error, "Tunnel configuration sync failed");
                Err(sync_error)
            }
        }
    }
}

#[cfg(test)]
#[path = "sync_tests.rs"]
mod sync_tests;
