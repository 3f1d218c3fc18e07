// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! CNAME publication for tunnel hostnames.
//!
//! Every published hostname needs a proxied CNAME pointing at
//! `<tunnel-id>.cfargotunnel.com` in its parent zone. The upsert is best
//! effort: the caller logs failures and carries on.

use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::cloudflare::{DnsApi, DnsRecord};
use crate::errors::DnsSyncError;
use crate::metrics;

/// What an upsert did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DnsUpsert {
    Created,
    Updated,
    Unchanged,
}

impl DnsUpsert {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Unchanged => "unchanged",
        }
    }
}

impl fmt::Display for DnsUpsert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parent zone of a hostname: its last two labels.
///
/// Returns `None` when the hostname has fewer than two non-empty labels.
#[must_use]
pub fn parent_zone(hostname: &str) -> Option<String> {
    let labels: Vec<&str> = hostname.trim_end_matches('.').split('.').collect();
    if labels.len() < 2 || labels.iter().any(|l| l.is_empty()) {
        return None;
    }
    Some(labels[labels.len() - 2..].join("."))
}

/// Upserts tunnel CNAMEs through a [`DnsApi`].
#[derive(Clone)]
pub struct DnsRecordManager {
    api: Arc<dyn DnsApi>,
    tunnel_target: String,
}

impl DnsRecordManager {
    #[must_use]
    pub fn new(api: Arc<dyn DnsApi>, tunnel_target: impl Into<String>) -> Self {
        Self {
            api,
            tunnel_target: tunnel_target.into(),
        }
    }

    #[must_use]
    pub fn tunnel_target(&self) -> &str {
        &self.tunnel_target
    }

    /// Make sure `hostname` is a proxied CNAME to the tunnel.
    ///
    /// # Errors
    ///
    /// Returns [`DnsSyncError`] when the hostname has no parent zone, the
    /// zone is not on the account, or an API call fails.
    pub async fn upsert_cname(&self, hostname: &str) -> Result<DnsUpsert, DnsSyncError> {
        let result = self.upsert(hostname).await;
        match &result {
            Ok(outcome) => metrics::record_dns_upsert(outcome.as_str()),
            Err(_) => metrics::record_dns_upsert("error"),
        }
        result
    }

    async fn upsert(&self, hostname: &str) -> Result<DnsUpsert, DnsSyncError> {
        let api_error = |source| DnsSyncError::Api {
            hostname: hostname.to_string(),
            source,
        };

        let zone = parent_zone(hostname).ok_or_else(|| DnsSyncError::InvalidHostname {
            hostname: hostname.to_string(),
        })?;

        let zone_id = self
            .api
            .find_zone_id(&zone)
            .await
            .map_err(api_error)?
            .ok_or_else(|| DnsSyncError::ZoneNotFound {
                hostname: hostname.to_string(),
                zone: zone.clone(),
            })?;

        let desired = DnsRecord::proxied_cname(hostname, &self.tunnel_target);
        let existing = self
            .api
            .find_cname_record(&zone_id, hostname)
            .await
            .map_err(api_error)?;

        match existing {
            None => {
                self.api
                    .create_dns_record(&zone_id, &desired)
                    .await
                    .map_err(api_error)?;
                info!(hostname = %hostname, target = %self.tunnel_target, "Created CNAME record");
                Ok(DnsUpsert::Created)
            }
            Some(record) if record.content == self.tunnel_target => {
                debug!(hostname = %hostname, "CNAME record already points at the tunnel");
                Ok(DnsUpsert::Unchanged)
            }
            Some(record) => {
                let Some(record_id) = record.id.as_deref() else {
                    warn!(hostname = %hostname, "Existing CNAME record has no id, creating a new one");
                    self.api
                        .create_dns_record(&zone_id, &desired)
                        .await
                        .map_err(api_error)?;
                    return Ok(DnsUpsert::Created);
                };
                self.api
                    .update_dns_record(&zone_id, record_id, &desired)
                    .await
                    .map_err(api_error)?;
                info!(
                    hostname = %hostname,
                    previous = %record.content,
                    target = %self.tunnel_target,
                    "Updated CNAME record"
                );
                Ok(DnsUpsert::Updated)
            }
        }
    }
}

#[cfg(test)]
#[path = "dns_tests.rs"]
mod dns_tests;
