// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Error types for tunnel ingress synchronization.
//!
//! This module provides specialized error types for:
//! - Resolving a Service into a publishable backend address
//! - Building the Cloudflare client from credentials
//! - Talking to the Cloudflare API
//! - Synchronizing the shared tunnel configuration
//! - Upserting DNS records
//!
//! Every error raised during a reconcile pass is recoverable: it is reported
//! in the resource status and the resource is requeued.

use reqwest::StatusCode;
use thiserror::Error;

use crate::reconcilers::retry::is_retryable_http_status;

/// Errors raised while turning a Service reference into a backend address.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    /// The referenced Service does not exist.
    #[error("Service {namespace}/{name} not found")]
    ServiceNotFound {
        /// Namespace that was searched
        namespace: String,
        /// Name of the missing Service
        name: String,
    },

    /// The Service exists but no stable address could be derived from it.
    ///
    /// Covers headless Services without usable nodes or node ports, Services
    /// without ports, and Kubernetes API failures while looking them up.
    #[error("No usable address for Service {namespace}/{name}: {reason}")]
    NoUsableAddress {
        /// Namespace of the Service
        namespace: String,
        /// Name of the Service
        name: String,
        /// Why no address qualified
        reason: String,
    },

    /// The derived address falls inside an ephemeral pod network.
    #[error("Endpoint {endpoint} is in an ephemeral network and cannot be published")]
    EndpointRejectedAsEphemeral {
        /// The rejected endpoint
        endpoint: String,
    },
}

/// Errors raised while building the Cloudflare client. These abort startup.
#[derive(Error, Debug)]
pub enum ClientConstructionError {
    #[error("Tunnel token is not valid base64: {0}")]
    TokenEncoding(#[from] base64::DecodeError),

    #[error("Tunnel token payload is not valid JSON: {0}")]
    TokenPayload(#[from] serde_json::Error),

    /// A required field of the decoded token is missing or empty.
    #[error("Tunnel token is missing the '{field}' field")]
    TokenMissingField {
        /// Short JSON key of the field (`a`, `t` or `s`)
        field: &'static str,
    },

    #[error("Invalid value for header {header}")]
    InvalidHeader {
        /// Header name
        header: &'static str,
    },

    #[error("Invalid Cloudflare API URL '{url}': {reason}")]
    InvalidBaseUrl {
        /// The URL as configured
        url: String,
        /// Parser error or constraint violated
        reason: String,
    },

    #[error("Failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),
}

/// Errors raised by a single Cloudflare API call.
#[derive(Error, Debug)]
pub enum CloudflareError {
    /// The request never produced a response (timeout, connect, TLS, body read).
    #[error("Cloudflare request '{operation}' failed: {source}")]
    Transport {
        /// Method and path of the call
        operation: String,
        #[source]
        source: reqwest::Error,
    },

    /// The API answered with a non-success HTTP status.
    #[error("Cloudflare request '{operation}' returned HTTP {status}: {body}")]
    Status {
        /// Method and path of the call
        operation: String,
        /// HTTP status code
        status: StatusCode,
        /// Response body, truncated
        body: String,
    },

    /// The API answered 2xx but flagged the call as unsuccessful.
    #[error("Cloudflare request '{operation}' was rejected: {message}")]
    Api {
        /// Method and path of the call
        operation: String,
        /// Joined API error messages
        message: String,
    },

    /// The response body could not be decoded.
    #[error("Failed to decode Cloudflare response for '{operation}': {reason}")]
    Decode {
        /// Method and path of the call
        operation: String,
        /// Decoder error
        reason: String,
    },

    /// The envelope reported success without a result.
    #[error("Cloudflare response for '{operation}' carried no result")]
    MissingResult {
        /// Method and path of the call
        operation: String,
    },
}

impl CloudflareError {
    /// Transport failures and 429/5xx answers are transient; everything else is permanent.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport { .. } => true,
            Self::Status { status, .. } => is_retryable_http_status(*status),
            Self::Api { .. } | Self::Decode { .. } | Self::MissingResult { .. } => false,
        }
    }
}

/// Errors raised while synchronizing the shared tunnel configuration.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Failed to read tunnel configuration: {0}")]
    RemoteRead(#[source] CloudflareError),

    #[error("Failed to write tunnel configuration: {0}")]
    RemoteWrite(#[source] CloudflareError),

    /// Ephemeral addresses were still published after every write attempt.
    #[error(
        "Tunnel configuration still exposes ephemeral endpoints after {attempts} attempts: {}",
        hostnames.join(", ")
    )]
    VerificationFailure {
        /// Write cycles used
        attempts: u32,
        /// Hostnames whose published rules are ephemeral
        hostnames: Vec<String>,
    },
}

impl SyncError {
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::RemoteRead(e) | Self::RemoteWrite(e) => e.is_retryable(),
            Self::VerificationFailure { .. } => false,
        }
    }
}

/// Errors raised while upserting the CNAME of a hostname. Never fatal to a pass.
#[derive(Error, Debug)]
pub enum DnsSyncError {
    /// No Cloudflare zone matches the parent domain of the hostname.
    #[error("No Cloudflare zone '{zone}' found for hostname {hostname}")]
    ZoneNotFound {
        /// Hostname being published
        hostname: String,
        /// Zone that was looked up
        zone: String,
    },

    /// The hostname has fewer than two labels.
    #[error("Hostname {hostname} has no parent zone")]
    InvalidHostname {
        /// Hostname being published
        hostname: String,
    },

    #[error("DNS API call failed for {hostname}: {source}")]
    Api {
        /// Hostname being published
        hostname: String,
        #[source]
        source: CloudflareError,
    },
}

#[cfg(test)]
#[path = "errors_tests.rs"]
mod errors_tests;
