// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Command-line and environment configuration.
//!
//! Credentials are normally injected from a Secret through the
//! `CLOUDFLARE_*` environment variables; every other option has a default.

use anyhow::Result;
use clap::Parser;
use std::net::SocketAddr;
use std::time::Duration;

use crate::constants::{
    DEFAULT_CLOUDFLARE_API_URL, DEFAULT_CLUSTER_DOMAIN, DEFAULT_EPHEMERAL_NETWORKS,
    DEFAULT_REQUEST_TIMEOUT_SECS, METRICS_SERVER_BIND_ADDRESS, METRICS_SERVER_PORT,
    VERIFY_BACKOFF_MULTIPLIER, VERIFY_INITIAL_BACKOFF_MILLIS, VERIFY_MAX_ATTEMPTS,
    VERIFY_MAX_BACKOFF_SECS, VERIFY_SETTLE_DELAY_MILLIS,
};
use crate::ephemeral::EphemeralAddressFilter;
use crate::reconcilers::retry::WriteVerifyPolicy;

/// Publish Kubernetes Services through a Cloudflare tunnel
#[derive(Parser, Clone)]
#[command(version, about)]
pub struct Args {
    /// Cloudflare account email
    #[arg(long, env = "CLOUDFLARE_EMAIL")]
    pub email: String,

    /// Cloudflare global API key
    #[arg(long, env = "CLOUDFLARE_API_KEY", hide_env_values = true)]
    pub api_key: String,

    /// Tunnel token as issued by Cloudflare (base64 JSON)
    #[arg(long, env = "CLOUDFLARE_TUNNEL_TOKEN", hide_env_values = true)]
    pub tunnel_token: String,

    #[arg(long, env = "CLOUDFLARE_API_URL", default_value = DEFAULT_CLOUDFLARE_API_URL)]
    pub api_url: String,

    /// Comma-separated CIDRs whose addresses must never be published
    #[arg(long, env = "EPHEMERAL_NETWORKS", default_value = DEFAULT_EPHEMERAL_NETWORKS)]
    pub ephemeral_networks: String,

    #[arg(long, env = "CLUSTER_DOMAIN", default_value = DEFAULT_CLUSTER_DOMAIN)]
    pub cluster_domain: String,

    /// Timeout of every Cloudflare API request, in seconds
    #[arg(long, env = "REQUEST_TIMEOUT_SECS", default_value_t = DEFAULT_REQUEST_TIMEOUT_SECS)]
    pub request_timeout_secs: u64,

    /// Write-verify cycles per synchronization
    #[arg(long, env = "VERIFY_MAX_ATTEMPTS", default_value_t = VERIFY_MAX_ATTEMPTS)]
    pub verify_max_attempts: u32,

    #[arg(long, env = "VERIFY_INITIAL_BACKOFF_MS", default_value_t = VERIFY_INITIAL_BACKOFF_MILLIS)]
    pub verify_initial_backoff_ms: u64,

    /// Pause between a clean read-back and the confirming read, in milliseconds
    #[arg(long, env = "VERIFY_SETTLE_DELAY_MS", default_value_t = VERIFY_SETTLE_DELAY_MILLIS)]
    pub verify_settle_delay_ms: u64,

    #[arg(long, env = "METRICS_BIND_ADDRESS", default_value_t = default_metrics_address())]
    pub metrics_bind_address: SocketAddr,
}

fn default_metrics_address() -> SocketAddr {
    SocketAddr::new(
        METRICS_SERVER_BIND_ADDRESS
            .parse()
            .unwrap_or(std::net::Ipv4Addr::UNSPECIFIED.into()),
        METRICS_SERVER_PORT,
    )
}

impl Args {
    /// Parse the configured ephemeral networks.
    ///
    /// # Errors
    ///
    /// Returns an error naming the first CIDR that does not parse.
    pub fn ephemeral_filter(&self) -> Result<EphemeralAddressFilter> {
        self.ephemeral_networks.parse()
    }

    #[must_use]
    pub fn write_verify_policy(&self) -> WriteVerifyPolicy {
        WriteVerifyPolicy {
            max_attempts: self.verify_max_attempts,
            initial_backoff: Duration::from_millis(self.verify_initial_backoff_ms),
            backoff_multiplier: VERIFY_BACKOFF_MULTIPLIER,
            max_backoff: Duration::from_secs(VERIFY_MAX_BACKOFF_SECS),
            settle_delay: Duration::from_millis(self.verify_settle_delay_ms),
        }
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod config_tests;
