// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! In-memory collaborators for reconciler tests.
//!
//! [`FakeTunnel`] behaves like the shared tunnel configuration endpoint and
//! can be scripted to serve stale reads or fail specific calls, which is how
//! eventual consistency is simulated.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{
    Node, NodeAddress, NodeStatus, Service, ServicePort, ServiceSpec,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use reqwest::StatusCode;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::cloudflare::{DnsApi, DnsRecord, IngressRule, TunnelConfigApi};
use crate::context::Context;
use crate::crd::{
    CloudflareTunnelIngress, CloudflareTunnelIngressSpec, CloudflareTunnelIngressStatus,
    ServiceReference,
};
use crate::ephemeral::EphemeralAddressFilter;
use crate::errors::CloudflareError;
use crate::reconcilers::cluster::{BackendRegistry, IngressStore};
use crate::reconcilers::dns::DnsRecordManager;
use crate::reconcilers::resolver::EndpointResolver;
use crate::reconcilers::retry::WriteVerifyPolicy;
use crate::reconcilers::sync::TunnelSynchronizer;

pub const TUNNEL_TARGET: &str = "6ff42ae2-765d-4adf-8112-31c55c1551ef.cfargotunnel.com";

pub fn status_error(operation: &str, status: StatusCode) -> CloudflareError {
    CloudflareError::Status {
        operation: operation.to_string(),
        status,
        body: String::new(),
    }
}

/// Policy with the production budget but no waiting.
pub fn instant_policy() -> WriteVerifyPolicy {
    WriteVerifyPolicy {
        initial_backoff: Duration::ZERO,
        max_backoff: Duration::ZERO,
        settle_delay: Duration::ZERO,
        ..WriteVerifyPolicy::default()
    }
}

// ============================================================================
// Tunnel configuration
// ============================================================================

#[derive(Default)]
struct TunnelState {
    rules: Vec<IngressRule>,
    gets: u32,
    puts: u32,
    read_overrides: HashMap<u32, Vec<IngressRule>>,
    get_failures: HashMap<u32, StatusCode>,
    put_failures: HashMap<u32, StatusCode>,
    history: Vec<Vec<IngressRule>>,
}

/// Scriptable tunnel configuration store.
///
/// Calls are numbered from 1. A read override for call `n` is served
/// instead of the stored rules; a failure for call `n` fails that call.
#[derive(Default)]
pub struct FakeTunnel {
    state: Mutex<TunnelState>,
}

impl FakeTunnel {
    pub fn new(rules: Vec<IngressRule>) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(TunnelState {
                rules,
                ..TunnelState::default()
            }),
        })
    }

    pub fn serve_on_get(&self, call: u32, rules: Vec<IngressRule>) {
        self.state.lock().unwrap().read_overrides.insert(call, rules);
    }

    pub fn fail_get(&self, call: u32, status: StatusCode) {
        self.state.lock().unwrap().get_failures.insert(call, status);
    }

    pub fn fail_put(&self, call: u32, status: StatusCode) {
        self.state.lock().unwrap().put_failures.insert(call, status);
    }

    pub fn rules(&self) -> Vec<IngressRule> {
        self.state.lock().unwrap().rules.clone()
    }

    pub fn gets(&self) -> u32 {
        self.state.lock().unwrap().gets
    }

    pub fn puts(&self) -> u32 {
        self.state.lock().unwrap().puts
    }

    /// Every successfully written rule list, oldest first.
    pub fn history(&self) -> Vec<Vec<IngressRule>> {
        self.state.lock().unwrap().history.clone()
    }
}

#[async_trait]
impl TunnelConfigApi for FakeTunnel {
    async fn get_ingress_rules(&self) -> Result<Vec<IngressRule>, CloudflareError> {
        tokio::task::yield_now().await;
        let mut state = self.state.lock().unwrap();
        state.gets += 1;
        let call = state.gets;
        if let Some(status) = state.get_failures.get(&call) {
            return Err(status_error("GET configurations", *status));
        }
        Ok(state
            .read_overrides
            .get(&call)
            .cloned()
            .unwrap_or_else(|| state.rules.clone()))
    }

    async fn put_ingress_rules(&self, rules: &[IngressRule]) -> Result<(), CloudflareError> {
        tokio::task::yield_now().await;
        let mut state = self.state.lock().unwrap();
        state.puts += 1;
        let call = state.puts;
        if let Some(status) = state.put_failures.get(&call) {
            return Err(status_error("PUT configurations", *status));
        }
        state.rules = rules.to_vec();
        state.history.push(rules.to_vec());
        Ok(())
    }
}

// ============================================================================
// Kubernetes
// ============================================================================

/// Services and Nodes held in memory.
#[derive(Default)]
pub struct FakeRegistry {
    services: HashMap<(String, String), Service>,
    nodes: Vec<Node>,
    unavailable: bool,
}

impl FakeRegistry {
    pub fn with_service(mut self, service: Service) -> Self {
        let key = (
            service.metadata.namespace.clone().unwrap_or_default(),
            service.metadata.name.clone().unwrap_or_default(),
        );
        self.services.insert(key, service);
        self
    }

    pub fn with_node(mut self, node: Node) -> Self {
        self.nodes.push(node);
        self
    }

    /// Every call fails as if the API server were unreachable.
    pub fn unavailable(mut self) -> Self {
        self.unavailable = true;
        self
    }
}

#[async_trait]
impl BackendRegistry for FakeRegistry {
    async fn get_service(&self, namespace: &str, name: &str) -> Result<Option<Service>> {
        if self.unavailable {
            return Err(anyhow!("connection refused"));
        }
        Ok(self
            .services
            .get(&(namespace.to_string(), name.to_string()))
            .cloned())
    }

    async fn list_nodes(&self) -> Result<Vec<Node>> {
        if self.unavailable {
            return Err(anyhow!("connection refused"));
        }
        Ok(self.nodes.clone())
    }
}

/// Tunnel ingress resources plus a log of status patches.
#[derive(Default)]
pub struct FakeIngressStore {
    ingresses: Mutex<Vec<CloudflareTunnelIngress>>,
    patches: Mutex<Vec<(String, CloudflareTunnelIngressStatus)>>,
    list_fails: AtomicBool,
}

impl FakeIngressStore {
    pub fn new(ingresses: Vec<CloudflareTunnelIngress>) -> Arc<Self> {
        Arc::new(Self {
            ingresses: Mutex::new(ingresses),
            ..Self::default()
        })
    }

    pub fn fail_list(&self) {
        self.list_fails.store(true, Ordering::SeqCst);
    }

    /// Status patches as `(namespace/name, status)`, oldest first.
    pub fn patches(&self) -> Vec<(String, CloudflareTunnelIngressStatus)> {
        self.patches.lock().unwrap().clone()
    }
}

#[async_trait]
impl IngressStore for FakeIngressStore {
    async fn list_tunnel_ingresses(&self) -> Result<Vec<CloudflareTunnelIngress>> {
        if self.list_fails.load(Ordering::SeqCst) {
            return Err(anyhow!("list forbidden"));
        }
        Ok(self.ingresses.lock().unwrap().clone())
    }

    async fn patch_tunnel_ingress_status(
        &self,
        namespace: &str,
        name: &str,
        status: &CloudflareTunnelIngressStatus,
    ) -> Result<()> {
        self.patches
            .lock()
            .unwrap()
            .push((format!("{namespace}/{name}"), status.clone()));
        Ok(())
    }
}

// ============================================================================
// DNS
// ============================================================================

#[derive(Default)]
struct DnsState {
    records: Vec<(String, DnsRecord)>,
    calls: Vec<String>,
}

/// Zones and records held in memory. Records get ids `rec-1`, `rec-2`, ...
#[derive(Default)]
pub struct FakeDns {
    zones: HashMap<String, String>,
    state: Mutex<DnsState>,
    failure: Option<StatusCode>,
}

impl FakeDns {
    pub fn with_zone(mut self, name: &str, id: &str) -> Self {
        self.zones.insert(name.to_string(), id.to_string());
        self
    }

    pub fn with_record(self, zone_id: &str, name: &str, content: &str) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            let mut record = DnsRecord::proxied_cname(name, content);
            record.id = Some(format!("rec-{}", state.records.len() + 1));
            state.records.push((zone_id.to_string(), record));
        }
        self
    }

    pub fn failing(mut self, status: StatusCode) -> Self {
        self.failure = Some(status);
        self
    }

    pub fn records(&self) -> Vec<(String, DnsRecord)> {
        self.state.lock().unwrap().records.clone()
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    fn record_call(&self, call: String) -> Result<(), CloudflareError> {
        self.state.lock().unwrap().calls.push(call.clone());
        match self.failure {
            Some(status) => Err(status_error(&call, status)),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl DnsApi for FakeDns {
    async fn find_zone_id(&self, zone_name: &str) -> Result<Option<String>, CloudflareError> {
        self.record_call(format!("find_zone {zone_name}"))?;
        Ok(self.zones.get(zone_name).cloned())
    }

    async fn find_cname_record(
        &self,
        zone_id: &str,
        hostname: &str,
    ) -> Result<Option<DnsRecord>, CloudflareError> {
        self.record_call(format!("find_cname {hostname}"))?;
        Ok(self
            .state
            .lock()
            .unwrap()
            .records
            .iter()
            .find(|(zone, r)| zone == zone_id && r.name == hostname && r.record_type == "CNAME")
            .map(|(_, r)| r.clone()))
    }

    async fn create_dns_record(
        &self,
        zone_id: &str,
        record: &DnsRecord,
    ) -> Result<(), CloudflareError> {
        self.record_call(format!("create {}", record.name))?;
        let mut state = self.state.lock().unwrap();
        let mut created = record.clone();
        created.id = Some(format!("rec-{}", state.records.len() + 1));
        state.records.push((zone_id.to_string(), created));
        Ok(())
    }

    async fn update_dns_record(
        &self,
        zone_id: &str,
        record_id: &str,
        record: &DnsRecord,
    ) -> Result<(), CloudflareError> {
        self.record_call(format!("update {record_id}"))?;
        let mut state = self.state.lock().unwrap();
        if let Some((_, existing)) = state
            .records
            .iter_mut()
            .find(|(zone, r)| zone == zone_id && r.id.as_deref() == Some(record_id))
        {
            let id = existing.id.take();
            *existing = record.clone();
            existing.id = id;
        }
        Ok(())
    }
}

// ============================================================================
// Builders
// ============================================================================

pub fn cluster_ip_service(namespace: &str, name: &str, cluster_ip: &str, ports: &[i32]) -> Service {
    Service {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            ..ObjectMeta::default()
        },
        spec: Some(ServiceSpec {
            cluster_ip: Some(cluster_ip.to_string()),
            ports: Some(
                ports
                    .iter()
                    .map(|port| ServicePort {
                        port: *port,
                        ..ServicePort::default()
                    })
                    .collect(),
            ),
            ..ServiceSpec::default()
        }),
        ..Service::default()
    }
}

/// Headless Service with `(port, nodePort)` pairs.
pub fn headless_service(namespace: &str, name: &str, ports: &[(i32, Option<i32>)]) -> Service {
    let mut service = cluster_ip_service(namespace, name, "None", &[]);
    if let Some(spec) = service.spec.as_mut() {
        spec.ports = Some(
            ports
                .iter()
                .map(|(port, node_port)| ServicePort {
                    port: *port,
                    node_port: *node_port,
                    ..ServicePort::default()
                })
                .collect(),
        );
    }
    service
}

/// Node with `(type, address)` pairs.
pub fn node(name: &str, addresses: &[(&str, &str)]) -> Node {
    Node {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            ..ObjectMeta::default()
        },
        status: Some(NodeStatus {
            addresses: Some(
                addresses
                    .iter()
                    .map(|(kind, address)| NodeAddress {
                        type_: (*kind).to_string(),
                        address: (*address).to_string(),
                    })
                    .collect(),
            ),
            ..NodeStatus::default()
        }),
        ..Node::default()
    }
}

pub fn tunnel_ingress(
    namespace: &str,
    name: &str,
    hostname: &str,
    service: &str,
    port: Option<i32>,
) -> CloudflareTunnelIngress {
    let mut ingress = CloudflareTunnelIngress::new(
        name,
        CloudflareTunnelIngressSpec {
            hostname: hostname.to_string(),
            service: ServiceReference {
                name: service.to_string(),
                namespace: None,
                port,
                protocol: None,
            },
            sync_interval: None,
            enabled: None,
        },
    );
    ingress.metadata.namespace = Some(namespace.to_string());
    ingress.metadata.generation = Some(1);
    ingress
}

/// Context over fakes with the default ephemeral networks and no waiting.
pub fn test_context(
    tunnel: Arc<FakeTunnel>,
    registry: FakeRegistry,
    store: Arc<FakeIngressStore>,
    dns: Arc<FakeDns>,
) -> Context {
    let filter = EphemeralAddressFilter::default();
    Context {
        store,
        resolver: EndpointResolver::new(Arc::new(registry), filter.clone(), "cluster.local"),
        synchronizer: TunnelSynchronizer::new(tunnel, filter, instant_policy()),
        dns: DnsRecordManager::new(dns, TUNNEL_TARGET),
    }
}
