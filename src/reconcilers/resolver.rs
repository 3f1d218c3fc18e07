// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Resolution of a Service reference into a publishable backend address.
//!
//! # Resolution Rules
//!
//! - **ClusterIP Services** publish the stable cluster DNS name
//!   `protocol://<name>.<namespace>.svc.<cluster-domain>:<port>`. The Service
//!   is rejected when its cluster IP lies in an ephemeral network.
//! - **Headless Services** have no stable virtual IP, so the resolver falls
//!   back to `protocol://<node-ip>:<node-port>`. Internal node addresses are
//!   preferred over external ones and ephemeral addresses are skipped.
//!
//! Whatever path is taken, the final address is checked once more against
//! the ephemeral filter before it is handed out.

use k8s_openapi::api::core::v1::{Node, ServicePort};
use std::fmt;
use std::net::IpAddr;
use std::sync::Arc;
use tracing::{debug, warn};
use url::Url;

use crate::constants::{
    DEFAULT_SERVICE_PORT, HEADLESS_CLUSTER_IP, NODE_ADDRESS_EXTERNAL_IP, NODE_ADDRESS_INTERNAL_IP,
};
use crate::crd::CloudflareTunnelIngressSpec;
use crate::ephemeral::EphemeralAddressFilter;
use crate::errors::ResolveError;
use crate::reconcilers::cluster::BackendRegistry;

/// A backend address in `protocol://host:port` form.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ResolvedEndpoint(String);

impl ResolvedEndpoint {
    /// Build an endpoint, bracketing IPv6 literals.
    #[must_use]
    pub fn new(protocol: &str, host: &str, port: i32) -> Self {
        let host = match host.parse::<IpAddr>() {
            Ok(IpAddr::V6(v6)) => format!("[{v6}]"),
            _ => host.to_string(),
        };
        Self(format!("{protocol}://{host}:{port}"))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Host part of the address, without IPv6 brackets.
    #[must_use]
    pub fn host(&self) -> Option<String> {
        let url = Url::parse(&self.0).ok()?;
        let host = url.host_str()?;
        Some(host.trim_start_matches('[').trim_end_matches(']').to_string())
    }
}

impl fmt::Display for ResolvedEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Stable in-cluster DNS name of a Service.
#[must_use]
pub fn service_dns_name(name: &str, namespace: &str, cluster_domain: &str) -> String {
    format!("{name}.{namespace}.svc.{cluster_domain}")
}

/// Pick a node address, preferring `InternalIP` on any node over `ExternalIP`.
///
/// Ephemeral addresses are skipped.
#[must_use]
pub fn select_node_address(nodes: &[Node], filter: &EphemeralAddressFilter) -> Option<String> {
    [NODE_ADDRESS_INTERNAL_IP, NODE_ADDRESS_EXTERNAL_IP]
        .into_iter()
        .find_map(|address_type| {
            nodes
                .iter()
                .filter_map(|node| node.status.as_ref()?.addresses.as_ref())
                .flatten()
                .filter(|addr| addr.type_ == address_type)
                .map(|addr| addr.address.trim())
                .find(|addr| !addr.is_empty() && !filter.is_ephemeral_host(addr))
                .map(str::to_string)
        })
}

/// Node port of the requested Service port, or of the first port when no
/// port was requested. A requested port the Service does not expose yields `None`.
#[must_use]
pub fn select_node_port(ports: &[ServicePort], requested: Option<i32>) -> Option<i32> {
    let selected = match requested {
        Some(want) => ports.iter().find(|p| p.port == want)?,
        None => ports.first()?,
    };
    selected.node_port.filter(|p| *p > 0)
}

/// Resolves Service references through a [`BackendRegistry`].
#[derive(Clone)]
pub struct EndpointResolver {
    registry: Arc<dyn BackendRegistry>,
    filter: EphemeralAddressFilter,
    cluster_domain: String,
}

impl EndpointResolver {
    #[must_use]
    pub fn new(
        registry: Arc<dyn BackendRegistry>,
        filter: EphemeralAddressFilter,
        cluster_domain: impl Into<String>,
    ) -> Self {
        Self {
            registry,
            filter,
            cluster_domain: cluster_domain.into(),
        }
    }

    #[must_use]
    pub fn filter(&self) -> &EphemeralAddressFilter {
        &self.filter
    }

    /// Resolve the backend of `spec` for a resource living in `namespace`.
    ///
    /// # Errors
    ///
    /// - [`ResolveError::ServiceNotFound`] when the Service does not exist
    /// - [`ResolveError::NoUsableAddress`] when no stable address qualifies or
    ///   the Kubernetes API cannot be reached
    /// - [`ResolveError::EndpointRejectedAsEphemeral`] when the only address
    ///   available is a pod address
    pub async fn resolve(
        &self,
        spec: &CloudflareTunnelIngressSpec,
        namespace: &str,
    ) -> Result<ResolvedEndpoint, ResolveError> {
        let name = spec.service.name.as_str();
        let namespace = spec.service_namespace(namespace);
        let no_address = |reason: String| ResolveError::NoUsableAddress {
            namespace: namespace.to_string(),
            name: name.to_string(),
            reason,
        };

        let service = self
            .registry
            .get_service(namespace, name)
            .await
            .map_err(|e| no_address(format!("failed to get service: {e:#}")))?
            .ok_or_else(|| ResolveError::ServiceNotFound {
                namespace: namespace.to_string(),
                name: name.to_string(),
            })?;

        let service_spec = service.spec.unwrap_or_default();
        let ports = service_spec.ports.unwrap_or_default();
        let cluster_ip = service_spec
            .cluster_ip
            .filter(|ip| !ip.is_empty() && ip != HEADLESS_CLUSTER_IP);

        let endpoint = if let Some(cluster_ip) = cluster_ip {
            if self.filter.is_ephemeral_host(&cluster_ip) {
                warn!(
                    service = %format!("{namespace}/{name}"),
                    cluster_ip = %cluster_ip,
                    "Service cluster IP is in an ephemeral network"
                );
                return Err(ResolveError::EndpointRejectedAsEphemeral {
                    endpoint: cluster_ip,
                });
            }
            let port = spec
                .service
                .port
                .or_else(|| ports.first().map(|p| p.port))
                .unwrap_or(DEFAULT_SERVICE_PORT);
            ResolvedEndpoint::new(
                spec.protocol(),
                &service_dns_name(name, namespace, &self.cluster_domain),
                port,
            )
        } else {
            debug!(service = %format!("{namespace}/{name}"), "Headless service, falling back to node address");
            if ports.is_empty() {
                return Err(no_address("headless service declares no ports".to_string()));
            }
            let nodes = self
                .registry
                .list_nodes()
                .await
                .map_err(|e| no_address(format!("failed to list nodes: {e:#}")))?;
            let node_ip = select_node_address(&nodes, &self.filter)
                .ok_or_else(|| no_address("no node has a non-ephemeral address".to_string()))?;
            let node_port = select_node_port(&ports, spec.service.port).ok_or_else(|| {
                no_address(match spec.service.port {
                    Some(port) => format!("service has no node port for port {port}"),
                    None => "selected port has no node port".to_string(),
                })
            })?;
            ResolvedEndpoint::new(spec.protocol(), &node_ip, node_port)
        };

        if self.filter.is_ephemeral_endpoint(endpoint.as_str()) {
            return Err(ResolveError::EndpointRejectedAsEphemeral {
                endpoint: endpoint.to_string(),
            });
        }

        debug!(hostname = %spec.hostname, endpoint = %endpoint, "Resolved backend endpoint");
        Ok(endpoint)
    }
}

#[cfg(test)]
#[path = "resolver_tests.rs"]
mod resolver_tests;
