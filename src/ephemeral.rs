// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Ephemeral address detection.
//!
//! Pod addresses change on every restart and must never be published as a
//! tunnel backend. The filter holds the configured pod networks and answers
//! range-containment questions for bare IPs, hosts and backend URLs.
//! Hostnames are never ephemeral; only literal IP addresses can fall inside
//! a pod network.

use anyhow::{Context, Result};
use ipnet::IpNet;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use url::Url;

use crate::constants::DEFAULT_EPHEMERAL_NETWORKS;

/// Set of CIDR ranges whose addresses are considered ephemeral.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EphemeralAddressFilter {
    networks: Vec<IpNet>,
}

impl EphemeralAddressFilter {
    #[must_use]
    pub fn new(networks: Vec<IpNet>) -> Self {
        Self { networks }
    }

    #[must_use]
    pub fn networks(&self) -> &[IpNet] {
        &self.networks
    }

    #[must_use]
    pub fn is_ephemeral_ip(&self, ip: IpAddr) -> bool {
        self.networks.iter().any(|net| net.contains(&ip))
    }

    /// Returns true when `host` is a literal IP inside a configured network.
    ///
    /// Accepts bracketed IPv6 literals (`[fd00::1]`).
    #[must_use]
    pub fn is_ephemeral_host(&self, host: &str) -> bool {
        let host = host.trim_start_matches('[').trim_end_matches(']');
        host.parse::<IpAddr>()
            .is_ok_and(|ip| self.is_ephemeral_ip(ip))
    }

    /// Returns true when the host part of a backend address is ephemeral.
    ///
    /// `endpoint` may be a full URL (`http://10.99.0.5:8080`), a socket
    /// address (`10.99.0.5:8080`) or a bare host. Anything that does not
    /// parse to an IP is treated as a hostname and therefore not ephemeral.
    #[must_use]
    pub fn is_ephemeral_endpoint(&self, endpoint: &str) -> bool {
        let endpoint = endpoint.trim();
        if endpoint.contains("://") {
            return Url::parse(endpoint)
                .ok()
                .and_then(|url| url.host_str().map(str::to_string))
                .is_some_and(|host| self.is_ephemeral_host(&host));
        }
        if let Ok(addr) = endpoint.parse::<SocketAddr>() {
            return self.is_ephemeral_ip(addr.ip());
        }
        if let Ok(ip) = endpoint.parse::<IpAddr>() {
            return self.is_ephemeral_ip(ip);
        }
        let host = endpoint
            .rsplit_once(':')
            .filter(|(_, port)| port.chars().all(|c| c.is_ascii_digit()))
            .map_or(endpoint, |(host, _)| host);
        self.is_ephemeral_host(host)
    }
}

impl FromStr for EphemeralAddressFilter {
    type Err = anyhow::Error;

    /// Parses a comma-separated CIDR list such as `10.99.0.0/16,10.246.0.0/16`.
    fn from_str(s: &str) -> Result<Self> {
        s.split(',')
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(|n| {
                n.parse::<IpNet>()
                    .with_context(|| format!("invalid ephemeral network CIDR '{n}'"))
            })
            .collect::<Result<Vec<IpNet>>>()
            .map(Self::new)
    }
}

impl Default for EphemeralAddressFilter {
    fn default() -> Self {
        Self::new(
            DEFAULT_EPHEMERAL_NETWORKS
                .split(',')
                .filter_map(|n| n.parse::<IpNet>().ok())
                .collect(),
        )
    }
}

#[cfg(test)]
#[path = "ephemeral_tests.rs"]
mod ephemeral_tests;
