// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Cloudflare API access.
//!
//! - [`client`] - HTTP client plus the [`TunnelConfigApi`] and [`DnsApi`] seams
//! - [`token`] - tunnel token decoding
//! - [`types`] - request and response bodies

pub mod client;
pub mod token;
pub mod types;

pub use client::{CloudflareClient, DnsApi, TunnelConfigApi};
pub use token::TunnelToken;
pub use types::{DnsRecord, IngressRule};
