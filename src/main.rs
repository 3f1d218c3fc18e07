// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

use anyhow::{Context as _, Result};
use axum::{http::StatusCode, response::IntoResponse, routing::get, Router};
use clap::Parser;
use futures::StreamExt;
use kube::{
    runtime::{controller::Action, watcher::Config, Controller},
    Api, Client, ResourceExt,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info};
use tunnelsync::{
    config::Args,
    constants::{ERROR_REQUEUE_DURATION_SECS, METRICS_SERVER_PATH, TOKIO_WORKER_THREADS},
    context::Context,
    crd::CloudflareTunnelIngress,
    metrics,
    reconcilers::reconcile_tunnel_ingress,
};

#[derive(Debug, thiserror::Error)]
#[error(transparent)]
struct ReconcileError(#[from] anyhow::Error);

fn main() -> Result<()> {
    let args = Args::parse();

    // Build Tokio runtime with custom thread names
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(TOKIO_WORKER_THREADS)
        .thread_name("tunnelsync-controller")
        .enable_all()
        .build()?;

    runtime.block_on(async_main(args))
}

async fn async_main(args: Args) -> Result<()> {
    // Respects RUST_LOG environment variable if set, otherwise defaults to INFO level
    // Respects RUST_LOG_FORMAT environment variable for output format (json or text)
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let log_format = std::env::var("RUST_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    match log_format.to_lowercase().as_str() {
        "json" => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_file(true)
                .with_line_number(true)
                .with_thread_names(true)
                .with_target(false)
                .json()
                .init();
        }
        _ => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_file(true)
                .with_line_number(true)
                .with_thread_names(true)
                .with_target(false)
                .with_ansi(true)
                .compact()
                .init();
        }
    }

    info!("Starting Cloudflare tunnel ingress controller");

    debug!("Initializing Kubernetes client");
    let client = Client::try_default().await?;
    debug!("Kubernetes client initialized successfully");

    let ctx = Arc::new(Context::from_args(client.clone(), &args)?);

    // Controller and metrics server should never exit
    tokio::select! {
        result = run_tunnel_ingress_controller(client, ctx) => {
            error!("CRITICAL: CloudflareTunnelIngress controller exited unexpectedly: {:?}", result);
            result?;
            anyhow::bail!("CloudflareTunnelIngress controller exited unexpectedly without error")
        }
        result = run_metrics_server(args.metrics_bind_address) => {
            error!("CRITICAL: Metrics server exited unexpectedly: {:?}", result);
            result?;
            anyhow::bail!("Metrics server exited unexpectedly without error")
        }
    }
}

/// Run the `CloudflareTunnelIngress` controller
async fn run_tunnel_ingress_controller(client: Client, ctx: Arc<Context>) -> Result<()> {
    info!("Starting CloudflareTunnelIngress controller");

    let api = Api::<CloudflareTunnelIngress>::all(client);

    Controller::new(api, Config::default())
        .run(reconcile_tunnel_ingress_wrapper, error_policy, ctx)
        .for_each(|_| futures::future::ready(()))
        .await;

    Ok(())
}

/// Reconcile wrapper for `CloudflareTunnelIngress`
async fn reconcile_tunnel_ingress_wrapper(
    ingress: Arc<CloudflareTunnelIngress>,
    ctx: Arc<Context>,
) -> Result<Action, ReconcileError> {
    let start = Instant::now();

    match reconcile_tunnel_ingress(&ctx, &ingress).await {
        Ok(outcome) => {
            metrics::record_reconciliation(outcome.label, start.elapsed());
            info!(
                "Reconciled CloudflareTunnelIngress {}: {}",
                ingress.name_any(),
                outcome.phase
            );
            Ok(outcome
                .requeue_after
                .map_or_else(Action::await_change, Action::requeue))
        }
        Err(e) => {
            metrics::record_reconciliation("error", start.elapsed());
            error!("Failed to reconcile CloudflareTunnelIngress: {:#}", e);
            Err(e.into())
        }
    }
}

fn error_policy(
    _resource: Arc<CloudflareTunnelIngress>,
    _err: &ReconcileError,
    _ctx: Arc<Context>,
) -> Action {
    Action::requeue(Duration::from_secs(ERROR_REQUEUE_DURATION_SECS))
}

async fn metrics_handler() -> impl IntoResponse {
    match metrics::gather_metrics() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(e) => {
            error!("Failed to encode metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to encode metrics: {e}"),
            )
                .into_response()
        }
    }
}

/// Serve Prometheus metrics
async fn run_metrics_server(addr: SocketAddr) -> Result<()> {
    let app = Router::new().route(METRICS_SERVER_PATH, get(metrics_handler));

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("failed to bind metrics server")?;

    info!(addr = %addr, "Metrics HTTP server listening");

    axum::serve(listener, app)
        .await
        .context("metrics server error")?;

    Ok(())
}
