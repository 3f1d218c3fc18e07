// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Kubernetes access used by the tunnel ingress reconciler.
//!
//! Reads go through two traits so the resolver, aggregator and status
//! reporter can be exercised against in-memory fakes:
//!
//! - [`BackendRegistry`] - Services and Nodes that back a hostname
//! - [`IngressStore`] - the `CloudflareTunnelIngress` resources themselves
//!
//! [`KubeCluster`] implements both on top of a [`kube::Client`], retrying
//! transient API errors with [`retry_api_call`].

use anyhow::{Context as _, Result};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Node, Service};
use kube::api::{ListParams, Patch, PatchParams};
use kube::{Api, Client};
use serde_json::json;
use tracing::debug;

use crate::crd::{CloudflareTunnelIngress, CloudflareTunnelIngressStatus};
use crate::reconcilers::retry::retry_api_call;

/// Source of the Services and Nodes a backend address is derived from.
#[async_trait]
pub trait BackendRegistry: Send + Sync {
    /// Fetch a Service, `None` when it does not exist.
    async fn get_service(&self, namespace: &str, name: &str) -> Result<Option<Service>>;

    async fn list_nodes(&self) -> Result<Vec<Node>>;
}

/// Access to the `CloudflareTunnelIngress` resources.
#[async_trait]
pub trait IngressStore: Send + Sync {
    /// Every tunnel ingress in every namespace.
    async fn list_tunnel_ingresses(&self) -> Result<Vec<CloudflareTunnelIngress>>;

    /// Merge-patch the status subresource of one tunnel ingress.
    async fn patch_tunnel_ingress_status(
        &self,
        namespace: &str,
        name: &str,
        status: &CloudflareTunnelIngressStatus,
    ) -> Result<()>;
}

/// [`BackendRegistry`] and [`IngressStore`] backed by the Kubernetes API.
#[derive(Clone)]
pub struct KubeCluster {
    client: Client,
}

impl KubeCluster {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl BackendRegistry for KubeCluster {
    async fn get_service(&self, namespace: &str, name: &str) -> Result<Option<Service>> {
        let api: Api<Service> = Api::namespaced(self.client.clone(), namespace);
        retry_api_call(
            || async { api.get_opt(name).await },
            &format!("get service {namespace}/{name}"),
        )
        .await
    }

    async fn list_nodes(&self) -> Result<Vec<Node>> {
        let api: Api<Node> = Api::all(self.client.clone());
        let nodes = retry_api_call(
            || async { api.list(&ListParams::default()).await },
            "list nodes",
        )
        .await?;
        Ok(nodes.items)
    }
}

#[async_trait]
impl IngressStore for KubeCluster {
    async fn list_tunnel_ingresses(&self) -> Result<Vec<CloudflareTunnelIngress>> {
        let api: Api<CloudflareTunnelIngress> = Api::all(self.client.clone());
        let list = retry_api_call(
            || async { api.list(&ListParams::default()).await },
            "list cloudflaretunnelingresses",
        )
        .await?;
        debug!(count = list.items.len(), "Listed tunnel ingresses");
        Ok(list.items)
    }

    async fn patch_tunnel_ingress_status(
        &self,
        namespace: &str,
        name: &str,
        status: &CloudflareTunnelIngressStatus,
    ) -> Result<()> {
        let api: Api<CloudflareTunnelIngress> = Api::namespaced(self.client.clone(), namespace);
        let patch = json!({ "status": status });

        api.patch_status(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .with_context(|| format!("Failed to patch status of {namespace}/{name}"))?;
        Ok(())
    }
}
