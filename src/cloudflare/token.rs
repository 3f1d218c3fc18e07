// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Tunnel token decoding.
//!
//! A tunnel token is base64-encoded JSON of the form
//! `{"a": "<account id>", "t": "<tunnel id>", "s": "<secret>"}`. Only the
//! account and tunnel ids are used; the secret is kept private and never
//! printed.

use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD};
use base64::Engine;
use serde::Deserialize;
use std::fmt;
use std::str::FromStr;

use crate::constants::TUNNEL_TARGET_SUFFIX;
use crate::errors::ClientConstructionError;

#[derive(Deserialize)]
struct RawTunnelToken {
    #[serde(default)]
    a: String,
    #[serde(default)]
    t: String,
    #[serde(default)]
    s: String,
}

/// Decoded tunnel token.
#[derive(Clone, PartialEq, Eq)]
pub struct TunnelToken {
    account_id: String,
    tunnel_id: String,
    secret: String,
}

impl TunnelToken {
    /// Decode a base64 tunnel token.
    ///
    /// # Errors
    ///
    /// Returns an error if the token is not base64, not JSON, or lacks any of its fields.
    pub fn decode(encoded: &str) -> Result<Self, ClientConstructionError> {
        let encoded = encoded.trim();
        let bytes = STANDARD
            .decode(encoded)
            .or_else(|_| STANDARD_NO_PAD.decode(encoded.trim_end_matches('=')))?;
        let raw: RawTunnelToken = serde_json::from_slice(&bytes)?;

        let require = |value: String, field: &'static str| {
            if value.is_empty() {
                Err(ClientConstructionError::TokenMissingField { field })
            } else {
                Ok(value)
            }
        };

        Ok(Self {
            account_id: require(raw.a, "a")?,
            tunnel_id: require(raw.t, "t")?,
            secret: require(raw.s, "s")?,
        })
    }

    #[must_use]
    pub fn account_id(&self) -> &str {
        &self.account_id
    }

    #[must_use]
    pub fn tunnel_id(&self) -> &str {
        &self.tunnel_id
    }

    /// Stable external hostname of the tunnel, used as the CNAME target.
    #[must_use]
    pub fn tunnel_target(&self) -> String {
        format!("{}.{TUNNEL_TARGET_SUFFIX}", self.tunnel_id)
    }
}

impl FromStr for TunnelToken {
    type Err = ClientConstructionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::decode(s)
    }
}

impl fmt::Debug for TunnelToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TunnelToken")
            .field("account_id", &self.account_id)
            .field("tunnel_id", &self.tunnel_id)
            .field("secret", &"<redacted>")
            .finish()
    }
}

#[cfg(test)]
#[path = "token_tests.rs"]
mod token_tests;
