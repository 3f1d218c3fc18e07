// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! HTTP client for the Cloudflare v4 API.
//!
//! Every call carries the account email and global API key headers and is
//! bounded by a client-level timeout. Responses are unwrapped from the
//! standard `{success, errors, result}` envelope.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Client as HttpClient, Method, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;
use url::Url;

use super::token::TunnelToken;
use super::types::{
    ApiEnvelope, DnsRecord, IngressRule, TunnelConfigUpdate, TunnelConfiguration,
    TunnelConfigurationUpdate, Zone,
};
use crate::constants::{DNS_RECORD_TYPE_CNAME, HEADER_AUTH_EMAIL, HEADER_AUTH_KEY};
use crate::errors::{ClientConstructionError, CloudflareError};

/// Longest response body kept in an error message.
const MAX_ERROR_BODY_CHARS: usize = 512;

/// Read and whole-document write access to the tunnel ingress rules.
#[async_trait]
pub trait TunnelConfigApi: Send + Sync {
    /// Current ingress rules, in stored order. An unconfigured tunnel has none.
    async fn get_ingress_rules(&self) -> Result<Vec<IngressRule>, CloudflareError>;

    /// Replace the whole ingress rule list.
    async fn put_ingress_rules(&self, rules: &[IngressRule]) -> Result<(), CloudflareError>;
}

/// Zone and DNS record access needed to publish CNAMEs.
#[async_trait]
pub trait DnsApi: Send + Sync {
    async fn find_zone_id(&self, zone_name: &str) -> Result<Option<String>, CloudflareError>;

    async fn find_cname_record(
        &self,
        zone_id: &str,
        hostname: &str,
    ) -> Result<Option<DnsRecord>, CloudflareError>;

    async fn create_dns_record(
        &self,
        zone_id: &str,
        record: &DnsRecord,
    ) -> Result<(), CloudflareError>;

    async fn update_dns_record(
        &self,
        zone_id: &str,
        record_id: &str,
        record: &DnsRecord,
    ) -> Result<(), CloudflareError>;
}

/// Cloudflare API client bound to one account and tunnel.
#[derive(Clone, Debug)]
pub struct CloudflareClient {
    http: HttpClient,
    base_url: Url,
    token: TunnelToken,
}

impl CloudflareClient {
    /// Build a client.
    ///
    /// # Errors
    ///
    /// Returns an error if a credential is not a valid header value, the base
    /// URL does not parse, or the HTTP client cannot be built.
    pub fn new(
        email: &str,
        api_key: &str,
        token: TunnelToken,
        base_url: &str,
        timeout: Duration,
    ) -> Result<Self, ClientConstructionError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            HEADER_AUTH_EMAIL,
            HeaderValue::from_str(email).map_err(|_| ClientConstructionError::InvalidHeader {
                header: HEADER_AUTH_EMAIL,
            })?,
        );
        let mut key = HeaderValue::from_str(api_key).map_err(|_| {
            ClientConstructionError::InvalidHeader {
                header: HEADER_AUTH_KEY,
            }
        })?;
        key.set_sensitive(true);
        headers.insert(HEADER_AUTH_KEY, key);

        let base_url = Url::parse(base_url.trim_end_matches('/')).map_err(|e| {
            ClientConstructionError::InvalidBaseUrl {
                url: base_url.to_string(),
                reason: e.to_string(),
            }
        })?;
        if base_url.cannot_be_a_base() {
            return Err(ClientConstructionError::InvalidBaseUrl {
                url: base_url.to_string(),
                reason: "URL cannot carry a path".to_string(),
            });
        }

        let http = HttpClient::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()?;

        Ok(Self {
            http,
            base_url,
            token,
        })
    }

    #[must_use]
    pub fn token(&self) -> &TunnelToken {
        &self.token
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn tunnel_configuration_url(&self) -> Url {
        self.endpoint(&[
            "accounts",
            self.token.account_id(),
            "cfd_tunnel",
            self.token.tunnel_id(),
            "configurations",
        ])
    }

    /// Send a request and unwrap the envelope, tolerating a missing `result`.
    async fn send<T: DeserializeOwned>(
        &self,
        method: Method,
        url: Url,
        body: Option<&(impl Serialize + Sync)>,
    ) -> Result<Option<T>, CloudflareError> {
        let operation = format!("{method} {}", url.path());
        let mut request: RequestBuilder = self.http.request(method, url);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|source| CloudflareError::Transport {
                operation: operation.clone(),
                source,
            })?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|source| CloudflareError::Transport {
                operation: operation.clone(),
                source,
            })?;

        if !status.is_success() {
            return Err(CloudflareError::Status {
                operation,
                status,
                body: text.chars().take(MAX_ERROR_BODY_CHARS).collect(),
            });
        }

        let envelope: ApiEnvelope<T> =
            serde_json::from_str(&text).map_err(|e| CloudflareError::Decode {
                operation: operation.clone(),
                reason: e.to_string(),
            })?;

        if !envelope.success {
            let message = envelope
                .errors
                .iter()
                .map(|e| format!("{} ({})", e.message, e.code))
                .collect::<Vec<_>>()
                .join("; ");
            return Err(CloudflareError::Api { operation, message });
        }

        debug!(operation = %operation, "Cloudflare API call succeeded");
        Ok(envelope.result)
    }

    /// Like [`Self::send`] but the envelope must carry a result.
    async fn fetch<T: DeserializeOwned>(&self, url: Url) -> Result<T, CloudflareError> {
        let operation = format!("GET {}", url.path());
        self.send::<T>(Method::GET, url, None::<&Value>)
            .await?
            .ok_or(CloudflareError::MissingResult { operation })
    }
}

#[async_trait]
impl TunnelConfigApi for CloudflareClient {
    async fn get_ingress_rules(&self) -> Result<Vec<IngressRule>, CloudflareError> {
        let configuration: Option<TunnelConfiguration> = self
            .send(Method::GET, self.tunnel_configuration_url(), None::<&Value>)
            .await?;
        Ok(configuration
            .and_then(|c| c.config)
            .map(|c| c.ingress)
            .unwrap_or_default())
    }

    async fn put_ingress_rules(&self, rules: &[IngressRule]) -> Result<(), CloudflareError> {
        let body = TunnelConfigurationUpdate {
            config: TunnelConfigUpdate { ingress: rules },
        };
        self.send::<Value>(Method::PUT, self.tunnel_configuration_url(), Some(&body))
            .await?;
        Ok(())
    }
}

#[async_trait]
impl DnsApi for CloudflareClient {
    async fn find_zone_id(&self, zone_name: &str) -> Result<Option<String>, CloudflareError> {
        let mut url = self.endpoint(&["zones"]);
        url.query_pairs_mut().append_pair("name", zone_name);
        let zones: Vec<Zone> = self.fetch(url).await?;
        Ok(zones.into_iter().next().map(|z| z.id))
    }

    async fn find_cname_record(
        &self,
        zone_id: &str,
        hostname: &str,
    ) -> Result<Option<DnsRecord>, CloudflareError> {
        let mut url = self.endpoint(&["zones", zone_id, "dns_records"]);
        url.query_pairs_mut()
            .append_pair("type", DNS_RECORD_TYPE_CNAME)
            .append_pair("name", hostname);
        let records: Vec<DnsRecord> = self.fetch(url).await?;
        Ok(records.into_iter().next())
    }

    async fn create_dns_record(
        &self,
        zone_id: &str,
        record: &DnsRecord,
    ) -> Result<(), CloudflareError> {
        let url = self.endpoint(&["zones", zone_id, "dns_records"]);
        self.send::<Value>(Method::POST, url, Some(record)).await?;
        Ok(())
    }

    async fn update_dns_record(
        &self,
        zone_id: &str,
        record_id: &str,
        record: &DnsRecord,
    ) -> Result<(), CloudflareError> {
        let url = self.endpoint(&["zones", zone_id, "dns_records", record_id]);
        self.send::<Value>(Method::PUT, url, Some(record)).await?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "client_tests.rs"]
mod client_tests;
