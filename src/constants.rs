// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Global constants for the tunnel ingress operator.
//!
//! This module contains all numeric and string constants used throughout the codebase.
//! Constants are organized by category for easy maintenance.

// ============================================================================
// API Constants
// ============================================================================

/// API group for the tunnel ingress CRD
pub const API_GROUP: &str = "tunnel.cloudflare.io";

/// API version for the tunnel ingress CRD
pub const API_VERSION: &str = "v1alpha1";

/// Kind name for the `CloudflareTunnelIngress` resource
pub const KIND_TUNNEL_INGRESS: &str = "CloudflareTunnelIngress";

// ============================================================================
// Cloudflare API Constants
// ============================================================================

/// Default base URL of the Cloudflare v4 API
pub const DEFAULT_CLOUDFLARE_API_URL: &str = "https://api.cloudflare.com/client/v4";

/// Header carrying the account email on every Cloudflare call (`X-Auth-Email`)
pub const HEADER_AUTH_EMAIL: &str = "x-auth-email";

/// Header carrying the global API key on every Cloudflare call (`X-Auth-Key`)
pub const HEADER_AUTH_KEY: &str = "x-auth-key";

/// Suffix of the stable external hostname of a tunnel (`<tunnel-id>.cfargotunnel.com`)
pub const TUNNEL_TARGET_SUFFIX: &str = "cfargotunnel.com";

/// Service of the trailing catch-all ingress rule
pub const CATCH_ALL_SERVICE: &str = "http_status:404";

/// Record type managed by the DNS record manager
pub const DNS_RECORD_TYPE_CNAME: &str = "CNAME";

/// TTL value meaning "automatic" for proxied Cloudflare records
pub const DNS_AUTO_TTL: u32 = 1;

/// Timeout applied to every Cloudflare HTTP request (30 seconds)
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

// ============================================================================
// Kubernetes Service Resolution Constants
// ============================================================================

/// Default cluster DNS domain used to build stable service names
pub const DEFAULT_CLUSTER_DOMAIN: &str = "cluster.local";

/// Default ephemeral (pod) networks that must never be published
pub const DEFAULT_EPHEMERAL_NETWORKS: &str = "10.99.0.0/16,10.246.0.0/16";

/// Default backend protocol when the intent does not specify one
pub const DEFAULT_PROTOCOL: &str = "http";

/// Port used when a non-headless Service declares no ports at all
pub const DEFAULT_SERVICE_PORT: i32 = 80;

/// `clusterIP` value marking a headless Service
pub const HEADLESS_CLUSTER_IP: &str = "None";

/// Node address type preferred for the NodePort fallback
pub const NODE_ADDRESS_INTERNAL_IP: &str = "InternalIP";

/// Node address type used when no internal address qualifies
pub const NODE_ADDRESS_EXTERNAL_IP: &str = "ExternalIP";

// ============================================================================
// Sync Interval Constants
// ============================================================================

/// Default periodic re-synchronization interval (5 minutes)
pub const DEFAULT_SYNC_INTERVAL_SECS: u64 = 300;

/// Lower clamp for `syncInterval` (1 minute)
pub const MIN_SYNC_INTERVAL_SECS: u64 = 60;

/// Upper clamp for `syncInterval` (1 hour)
pub const MAX_SYNC_INTERVAL_SECS: u64 = 3600;

// ============================================================================
// Write / Verify Constants
// ============================================================================

/// Maximum number of write-verify cycles per reconcile pass
pub const VERIFY_MAX_ATTEMPTS: u32 = 5;

/// Backoff before the second write-verify cycle (2 seconds)
pub const VERIFY_INITIAL_BACKOFF_MILLIS: u64 = 2000;

/// Cap on the backoff between write-verify cycles (30 seconds)
pub const VERIFY_MAX_BACKOFF_SECS: u64 = 30;

/// Growth factor of the write-verify backoff
pub const VERIFY_BACKOFF_MULTIPLIER: f64 = 2.0;

/// Pause before the final read-back of a clean write (3 seconds)
pub const VERIFY_SETTLE_DELAY_MILLIS: u64 = 3000;

// ============================================================================
// Controller Error Handling Constants
// ============================================================================

/// Requeue duration for controller errors (30 seconds)
pub const ERROR_REQUEUE_DURATION_SECS: u64 = 30;

// ============================================================================
// Runtime Constants
// ============================================================================

/// Number of worker threads for Tokio runtime
pub const TOKIO_WORKER_THREADS: usize = 4;

// ============================================================================
// Metrics Server Constants
// ============================================================================

/// Port for Prometheus metrics HTTP server
pub const METRICS_SERVER_PORT: u16 = 8080;

/// Path for Prometheus metrics endpoint
pub const METRICS_SERVER_PATH: &str = "/metrics";

/// Bind address for metrics HTTP server
pub const METRICS_SERVER_BIND_ADDRESS: &str = "0.0.0.0";
