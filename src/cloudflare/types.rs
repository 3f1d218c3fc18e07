// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Wire types of the Cloudflare v4 API.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::constants::{CATCH_ALL_SERVICE, DNS_AUTO_TTL, DNS_RECORD_TYPE_CNAME};

/// One ingress rule of a tunnel configuration.
///
/// Fields other than `hostname` and `service` (`path`, `originRequest`, ...)
/// are carried through untouched so rules owned by someone else survive a
/// rewrite unchanged.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct IngressRule {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,

    #[serde(default)]
    pub service: String,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl IngressRule {
    #[must_use]
    pub fn new(hostname: impl Into<String>, service: impl Into<String>) -> Self {
        Self {
            hostname: Some(hostname.into()),
            service: service.into(),
            extra: Map::new(),
        }
    }

    /// The trailing rule that answers every unmatched hostname with 404.
    #[must_use]
    pub fn catch_all() -> Self {
        Self {
            hostname: None,
            service: CATCH_ALL_SERVICE.to_string(),
            extra: Map::new(),
        }
    }

    /// Hostname of the rule, `None` for the catch-all.
    #[must_use]
    pub fn hostname(&self) -> Option<&str> {
        self.hostname.as_deref().filter(|h| !h.is_empty())
    }

    #[must_use]
    pub fn is_catch_all(&self) -> bool {
        self.hostname().is_none()
    }
}

/// `config` object of a tunnel configuration document.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TunnelConfig {
    #[serde(default)]
    pub ingress: Vec<IngressRule>,
}

/// Result of `GET accounts/{account}/cfd_tunnel/{tunnel}/configurations`.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct TunnelConfiguration {
    #[serde(default)]
    pub config: Option<TunnelConfig>,
}

/// Body of `PUT accounts/{account}/cfd_tunnel/{tunnel}/configurations`.
#[derive(Debug, Serialize)]
pub struct TunnelConfigurationUpdate<'a> {
    pub config: TunnelConfigUpdate<'a>,
}

#[derive(Debug, Serialize)]
pub struct TunnelConfigUpdate<'a> {
    pub ingress: &'a [IngressRule],
}

/// Standard response wrapper of every Cloudflare v4 call.
#[derive(Debug, Deserialize)]
pub struct ApiEnvelope<T> {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub errors: Vec<ApiMessage>,
    pub result: Option<T>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ApiMessage {
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub message: String,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Zone {
    pub id: String,
    #[serde(default)]
    pub name: String,
}

/// A DNS record as read from or written to a zone.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct DnsRecord {
    #[serde(default, skip_serializing)]
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub record_type: String,
    pub name: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxied: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl: Option<u32>,
}

impl DnsRecord {
    /// Proxied CNAME with automatic TTL.
    #[must_use]
    pub fn proxied_cname(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            id: None,
            record_type: DNS_RECORD_TYPE_CNAME.to_string(),
            name: name.into(),
            content: target.into(),
            proxied: Some(true),
            ttl: Some(DNS_AUTO_TTL),
        }
    }
}

#[cfg(test)]
#[path = "types_tests.rs"]
mod types_tests;
