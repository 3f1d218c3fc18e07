// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Custom Resource Definitions (CRDs) for tunnel ingress management.
//!
//! This module defines the [`CloudflareTunnelIngress`] resource: a declared
//! mapping from one public hostname to one in-cluster Service. The operator
//! resolves each mapping to a stable backend address and publishes it as an
//! ingress rule of the shared Cloudflare tunnel configuration.
//!
//! # Example
//!
//! ```rust,no_run
//! use tunnelsync::crd::{CloudflareTunnelIngressSpec, ServiceReference};
//!
//! let spec = CloudflareTunnelIngressSpec {
//!     hostname: "app.example.com".to_string(),
//!     service: ServiceReference {
//!         name: "app".to_string(),
//!         namespace: None,
//!         port: Some(8080),
//!         protocol: None,
//!     },
//!     sync_interval: Some("10m".to_string()),
//!     enabled: None,
//! };
//! assert!(spec.is_enabled());
//! ```

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::constants::DEFAULT_PROTOCOL;
use crate::duration::effective_sync_interval;

/// Condition represents an observation of a resource's current state.
///
/// The operator maintains exactly one condition of type `Ready` on every
/// `CloudflareTunnelIngress`.
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Type of condition. Always `Ready` for this resource.
    pub r#type: String,

    /// Status of the condition: True, False, or Unknown.
    pub status: String,

    /// Brief CamelCase reason for the condition's last transition.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    /// Human-readable message indicating details about the transition.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Last time the condition transitioned from one status to another (RFC3339 format).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<String>,
}

/// Reference to the in-cluster Service that backs a public hostname.
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ServiceReference {
    /// Name of the Service.
    pub name: String,

    /// Namespace of the Service. Defaults to the namespace of the resource.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,

    /// Service port to route to.
    ///
    /// Defaults to the first port of the Service. For headless Services the
    /// matching `nodePort` is published instead.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(range(min = 1, max = 65535))]
    pub port: Option<i32>,

    /// Backend protocol, `http` (default) or `https`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(regex(pattern = r"^(http|https)$"))]
    pub protocol: Option<String>,
}

/// `CloudflareTunnelIngress` publishes one hostname through the Cloudflare tunnel.
///
/// # Example
///
/// ```yaml
/// apiVersion: tunnel.cloudflare.io/v1alpha1
/// kind: CloudflareTunnelIngress
/// metadata:
///   name: app
///   namespace: web
/// spec:
///   hostname: app.example.com
///   service:
///     name: app
///     port: 8080
///     protocol: http
///   syncInterval: 5m
/// ```
#[derive(CustomResource, Clone, Debug, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "tunnel.cloudflare.io",
    version = "v1alpha1",
    kind = "CloudflareTunnelIngress",
    plural = "cloudflaretunnelingresses",
    shortname = "cfti",
    shortname = "cftunnel",
    namespaced,
    status = "CloudflareTunnelIngressStatus",
    doc = "CloudflareTunnelIngress maps a public hostname to an in-cluster Service through a Cloudflare tunnel.",
    printcolumn = r#"{"name":"Hostname", "type":"string", "jsonPath":".spec.hostname"}"#,
    printcolumn = r#"{"name":"Service", "type":"string", "jsonPath":".spec.service.name"}"#,
    printcolumn = r#"{"name":"Phase", "type":"string", "jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"Endpoint", "type":"string", "jsonPath":".status.currentEndpoint"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct CloudflareTunnelIngressSpec {
    /// Public hostname served through the tunnel (e.g., "app.example.com").
    ///
    /// Hostnames are unique across all resources in the cluster.
    #[schemars(regex(
        pattern = r"^([a-zA-Z0-9]([a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?\.)+[a-zA-Z]{2,}$"
    ))]
    pub hostname: String,

    /// Service that backs the hostname.
    pub service: ServiceReference,

    /// How often the mapping is re-synchronized (e.g., "5m", "1h").
    ///
    /// Defaults to 5m and is clamped to the range 1m..1h.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sync_interval: Option<String>,

    /// Whether the mapping is published. Defaults to true.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
}

impl CloudflareTunnelIngressSpec {
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled.unwrap_or(true)
    }

    /// Backend protocol, falling back to `http`.
    #[must_use]
    pub fn protocol(&self) -> &str {
        self.service
            .protocol
            .as_deref()
            .filter(|p| !p.is_empty())
            .unwrap_or(DEFAULT_PROTOCOL)
    }

    /// Namespace of the backing Service, falling back to `default_namespace`.
    #[must_use]
    pub fn service_namespace<'a>(&'a self, default_namespace: &'a str) -> &'a str {
        self.service
            .namespace
            .as_deref()
            .filter(|ns| !ns.is_empty())
            .unwrap_or(default_namespace)
    }

    /// Effective resync period after defaulting and clamping.
    #[must_use]
    pub fn sync_interval(&self) -> Duration {
        effective_sync_interval(self.sync_interval.as_deref())
    }
}

/// Lifecycle phase of a tunnel ingress.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub enum Phase {
    /// Not yet published, or waiting for a resolvable backend.
    #[default]
    Pending,
    /// A synchronization pass is writing the tunnel configuration.
    Syncing,
    /// The hostname is published with the current endpoint.
    Ready,
    /// The last synchronization pass failed.
    Failed,
}

impl Phase {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::Syncing => "Syncing",
            Self::Ready => "Ready",
            Self::Failed => "Failed",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `CloudflareTunnelIngress` status
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CloudflareTunnelIngressStatus {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase: Option<Phase>,

    /// Last time the phase or endpoint changed (RFC3339 format).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_sync_time: Option<String>,

    /// Backend address currently published for the hostname.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_endpoint: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    #[serde(default)]
    pub conditions: Vec<Condition>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

#[cfg(test)]
#[path = "crd_tests.rs"]
mod crd_tests;
