// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Read-back verification of the tunnel ingress rules.
//!
//! After a write, every managed hostname is compared against what the
//! synchronizer intended for it. Hostnames with a resolved endpoint must be
//! published with exactly that endpoint. Managed hostnames that could not be
//! resolved this pass must be absent.

use std::collections::BTreeMap;
use std::fmt;

use crate::cloudflare::IngressRule;
use crate::ephemeral::EphemeralAddressFilter;
use crate::reconcilers::retry::{Consistency, VerificationStage};

/// Classification of one managed hostname in a read-back.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RuleVerdict {
    /// Published as intended (or absent as intended).
    Ok,
    /// Published with an ephemeral address.
    EphemeralAddressLeaked { actual: String },
    /// Published with a different, non-ephemeral value.
    Mismatch {
        expected: Option<String>,
        actual: String,
    },
    /// Expected but not published.
    Missing,
}

impl RuleVerdict {
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::EphemeralAddressLeaked { .. } => "ephemeral_address_leaked",
            Self::Mismatch { .. } => "mismatch",
            Self::Missing => "missing",
        }
    }
}

impl fmt::Display for RuleVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ok => f.write_str("ok"),
            Self::EphemeralAddressLeaked { actual } => write!(f, "ephemeral address leaked ({actual})"),
            Self::Mismatch {
                expected: Some(expected),
                actual,
            } => write!(f, "expected {expected}, found {actual}"),
            Self::Mismatch {
                expected: None,
                actual,
            } => write!(f, "expected no rule, found {actual}"),
            Self::Missing => f.write_str("missing"),
        }
    }
}

/// Per-hostname verdicts of one read-back.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct VerificationReport {
    pub verdicts: BTreeMap<String, RuleVerdict>,
}

impl VerificationReport {
    /// Hostnames whose published rule is ephemeral.
    #[must_use]
    pub fn leaked(&self) -> Vec<String> {
        self.hostnames_where(|v| matches!(v, RuleVerdict::EphemeralAddressLeaked { .. }))
    }

    /// Hostnames that are wrong or missing without being unsafe.
    #[must_use]
    pub fn drifted(&self) -> Vec<String> {
        self.hostnames_where(|v| matches!(v, RuleVerdict::Mismatch { .. } | RuleVerdict::Missing))
    }

    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.verdicts.values().all(|v| *v == RuleVerdict::Ok)
    }

    /// Collapse the report for the retry engine.
    ///
    /// The settled read-back only guards against leaks resurfacing, so drift
    /// found there does not trigger another cycle.
    #[must_use]
    pub fn consistency(&self, stage: VerificationStage) -> Consistency {
        if !self.leaked().is_empty() {
            Consistency::Leaked
        } else if stage == VerificationStage::Immediate && !self.drifted().is_empty() {
            Consistency::Drifted
        } else {
            Consistency::Consistent
        }
    }

    fn hostnames_where(&self, pred: impl Fn(&RuleVerdict) -> bool) -> Vec<String> {
        self.verdicts
            .iter()
            .filter(|(_, v)| pred(v))
            .map(|(h, _)| h.clone())
            .collect()
    }
}

/// Compare a read-back against the intended state of every managed hostname.
///
/// `expected` maps each managed hostname to its intended service, or `None`
/// when the hostname must not be published. A hostname published more than
/// once is judged by its worst rule: any ephemeral copy is a leak.
#[must_use]
pub fn verify_rules(
    expected: &BTreeMap<String, Option<String>>,
    actual: &[IngressRule],
    filter: &EphemeralAddressFilter,
) -> VerificationReport {
    let mut verdicts = BTreeMap::new();

    for (hostname, intended) in expected {
        let published: Vec<&str> = actual
            .iter()
            .filter(|r| r.hostname() == Some(hostname.as_str()))
            .map(|r| r.service.as_str())
            .collect();

        let verdict = if let Some(leak) = published
            .iter()
            .find(|service| filter.is_ephemeral_endpoint(service))
        {
            RuleVerdict::EphemeralAddressLeaked {
                actual: (*leak).to_string(),
            }
        } else {
            match (intended.as_deref(), published.as_slice()) {
                (None, []) => RuleVerdict::Ok,
                (Some(_), []) => RuleVerdict::Missing,
                (Some(want), [only]) if *only == want => RuleVerdict::Ok,
                (want, [first, ..]) => RuleVerdict::Mismatch {
                    expected: want.map(str::to_string),
                    actual: published
                        .iter()
                        .find(|s| Some(**s) != want)
                        .unwrap_or(first)
                        .to_string(),
                },
            }
        };

        verdicts.insert(hostname.clone(), verdict);
    }

    VerificationReport { verdicts }
}

#[cfg(test)]
#[path = "verify_tests.rs"]
mod verify_tests;
