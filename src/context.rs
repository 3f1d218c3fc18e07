// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Shared context for the tunnel ingress controller.
//!
//! The controller hands an `Arc<Context>` to every reconcile. It owns the
//! single [`TunnelSynchronizer`], so its write lock is shared by all
//! concurrent reconciles in the process.

use anyhow::{Context as _, Result};
use kube::Client;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::cloudflare::{CloudflareClient, TunnelToken};
use crate::config::Args;
use crate::reconcilers::cluster::{IngressStore, KubeCluster};
use crate::reconcilers::dns::DnsRecordManager;
use crate::reconcilers::resolver::EndpointResolver;
use crate::reconcilers::sync::TunnelSynchronizer;

/// Collaborators of a reconcile pass.
pub struct Context {
    /// Tunnel ingress resources and their status subresource
    pub store: Arc<dyn IngressStore>,

    /// Service reference to backend address resolution
    pub resolver: EndpointResolver,

    /// Serialized writer of the shared tunnel configuration
    pub synchronizer: TunnelSynchronizer,

    /// Best-effort CNAME publication
    pub dns: DnsRecordManager,
}

impl Context {
    /// Wire a context against a live cluster and the Cloudflare API.
    ///
    /// # Errors
    ///
    /// Fails when the tunnel token cannot be decoded, the ephemeral network
    /// list does not parse, or the HTTP client cannot be built.
    pub fn from_args(client: Client, args: &Args) -> Result<Self> {
        let token = TunnelToken::decode(&args.tunnel_token).context("Invalid tunnel token")?;
        let filter = args.ephemeral_filter()?;

        info!(
            account_id = %token.account_id(),
            tunnel_id = %token.tunnel_id(),
            ephemeral_networks = ?filter.networks(),
            "Configured Cloudflare tunnel"
        );

        let tunnel_target = token.tunnel_target();
        let cloudflare = Arc::new(
            CloudflareClient::new(
                &args.email,
                &args.api_key,
                token,
                &args.api_url,
                Duration::from_secs(args.request_timeout_secs),
            )
            .context("Failed to build Cloudflare client")?,
        );
        let cluster = Arc::new(KubeCluster::new(client));

        Ok(Self {
            store: cluster.clone(),
            resolver: EndpointResolver::new(cluster, filter.clone(), &args.cluster_domain),
            synchronizer: TunnelSynchronizer::new(cloudflare.clone(), filter, args.write_verify_policy()),
            dns: DnsRecordManager::new(cloudflare, tunnel_target),
        })
    }
}
