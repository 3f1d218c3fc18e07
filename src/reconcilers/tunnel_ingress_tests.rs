// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `tunnel_ingress.rs`

#[cfg(test)]
mod tests {
    use super::super::{
        reconcile_tunnel_ingress, time_until_resync, MESSAGE_DISABLED, MESSAGE_SYNCING,
    };
    use crate::cloudflare::IngressRule;
    use crate::crd::{CloudflareTunnelIngress, CloudflareTunnelIngressStatus, Phase};
    use crate::reconcilers::fakes::{
        cluster_ip_service, headless_service, node, test_context, tunnel_ingress, FakeDns,
        FakeIngressStore, FakeRegistry, FakeTunnel, TUNNEL_TARGET,
    };
    use chrono::{DateTime, Utc};
    use reqwest::StatusCode;
    use std::sync::Arc;
    use std::time::Duration;

    const GRAFANA: &str = "grafana.example.com";
    const GRAFANA_SVC: &str = "http://grafana.monitoring.svc.cluster.local:3000";

    fn grafana_ingress() -> CloudflareTunnelIngress {
        tunnel_ingress("monitoring", "grafana", GRAFANA, "grafana", Some(3000))
    }

    fn grafana_registry() -> FakeRegistry {
        FakeRegistry::default().with_service(cluster_ip_service(
            "monitoring",
            "grafana",
            "172.20.4.9",
            &[3000],
        ))
    }

    fn observed(phase: Phase, last_sync_time: &str) -> CloudflareTunnelIngress {
        let mut ingress = grafana_ingress();
        ingress.status = Some(CloudflareTunnelIngressStatus {
            phase: Some(phase),
            last_sync_time: Some(last_sync_time.to_string()),
            current_endpoint: Some(GRAFANA_SVC.to_string()),
            observed_generation: Some(1),
            ..CloudflareTunnelIngressStatus::default()
        });
        ingress
    }

    fn at(timestamp: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(timestamp)
            .unwrap()
            .with_timezone(&Utc)
    }

    fn dns() -> Arc<FakeDns> {
        Arc::new(FakeDns::default().with_zone("example.com", "zone-1"))
    }

    #[tokio::test]
    async fn test_cluster_ip_service_is_published() {
        let tunnel = FakeTunnel::new(vec![]);
        let store = FakeIngressStore::new(vec![grafana_ingress()]);
        let dns = dns();
        let ctx = test_context(tunnel.clone(), grafana_registry(), store.clone(), dns.clone());

        let outcome = reconcile_tunnel_ingress(&ctx, &grafana_ingress()).await.unwrap();

        assert_eq!(outcome.phase, Phase::Ready);
        assert_eq!(outcome.requeue_after, Some(Duration::from_secs(300)));
        assert_eq!(
            tunnel.rules(),
            vec![IngressRule::new(GRAFANA, GRAFANA_SVC), IngressRule::catch_all()]
        );
        assert_eq!(dns.records()[0].1.content, TUNNEL_TARGET);

        let patches = store.patches();
        assert_eq!(patches.len(), 2);
        assert_eq!(patches[0].1.phase, Some(Phase::Syncing));
        assert_eq!(patches[0].1.message.as_deref(), Some(MESSAGE_SYNCING));
        let ready = &patches[1].1;
        assert_eq!(ready.phase, Some(Phase::Ready));
        assert_eq!(ready.current_endpoint.as_deref(), Some(GRAFANA_SVC));
        assert_eq!(ready.observed_generation, Some(1));
    }

    #[tokio::test]
    async fn test_headless_service_publishes_node_port() {
        let tunnel = FakeTunnel::new(vec![IngressRule::new(GRAFANA, GRAFANA_SVC)]);
        let registry = FakeRegistry::default()
            .with_service(headless_service("monitoring", "grafana", &[(3000, Some(31080))]))
            .with_node(node("worker-1", &[("InternalIP", "192.168.1.10")]));
        let ctx = test_context(
            tunnel.clone(),
            registry,
            FakeIngressStore::new(vec![grafana_ingress()]),
            dns(),
        );

        let outcome = reconcile_tunnel_ingress(&ctx, &grafana_ingress()).await.unwrap();

        assert_eq!(outcome.phase, Phase::Ready);
        assert_eq!(tunnel.rules()[0], IngressRule::new(GRAFANA, "http://192.168.1.10:31080"));
    }

    #[tokio::test]
    async fn test_disabled_intent_is_not_written() {
        let tunnel = FakeTunnel::new(vec![]);
        let store = FakeIngressStore::new(vec![]);
        let ctx = test_context(tunnel.clone(), grafana_registry(), store.clone(), dns());
        let mut ingress = grafana_ingress();
        ingress.spec.enabled = Some(false);

        let outcome = reconcile_tunnel_ingress(&ctx, &ingress).await.unwrap();

        assert_eq!(outcome.phase, Phase::Pending);
        assert_eq!(outcome.requeue_after, None);
        assert_eq!(tunnel.puts(), 0);
        assert_eq!(tunnel.gets(), 0);
        let patches = store.patches();
        assert_eq!(patches.len(), 1);
        assert_eq!(patches[0].1.phase, Some(Phase::Pending));
        assert_eq!(patches[0].1.message.as_deref(), Some(MESSAGE_DISABLED));
    }

    #[tokio::test]
    async fn test_unresolvable_service_stays_pending() {
        let tunnel = FakeTunnel::new(vec![]);
        let store = FakeIngressStore::new(vec![]);
        let ctx = test_context(tunnel.clone(), FakeRegistry::default(), store.clone(), dns());

        let outcome = reconcile_tunnel_ingress(&ctx, &grafana_ingress()).await.unwrap();

        assert_eq!(outcome.phase, Phase::Pending);
        assert_eq!(outcome.requeue_after, Some(Duration::from_secs(30)));
        assert_eq!(tunnel.puts(), 0);
        assert!(store.patches()[0]
            .1
            .message
            .as_deref()
            .is_some_and(|m| m.contains("not found")));
    }

    #[tokio::test]
    async fn test_remote_write_failure_marks_failed() {
        let tunnel = FakeTunnel::new(vec![]);
        tunnel.fail_put(1, StatusCode::FORBIDDEN);
        let store = FakeIngressStore::new(vec![]);
        let ctx = test_context(tunnel.clone(), grafana_registry(), store.clone(), dns());

        let outcome = reconcile_tunnel_ingress(&ctx, &grafana_ingress()).await.unwrap();

        assert_eq!(outcome.phase, Phase::Failed);
        assert_eq!(outcome.requeue_after, Some(Duration::from_secs(30)));
        let last = store.patches().last().cloned().unwrap().1;
        assert_eq!(last.phase, Some(Phase::Failed));
        let ready = last.conditions.iter().find(|c| c.r#type == "Ready").unwrap();
        assert_eq!(ready.status, "False");
    }

    #[tokio::test]
    async fn test_dns_failure_does_not_change_phase() {
        let tunnel = FakeTunnel::new(vec![]);
        let dns = Arc::new(
            FakeDns::default()
                .with_zone("example.com", "zone-1")
                .failing(StatusCode::INTERNAL_SERVER_ERROR),
        );
        let ctx = test_context(tunnel, grafana_registry(), FakeIngressStore::new(vec![]), dns);

        let outcome = reconcile_tunnel_ingress(&ctx, &grafana_ingress()).await.unwrap();

        assert_eq!(outcome.phase, Phase::Ready);
    }

    #[tokio::test]
    async fn test_other_intents_are_republished_and_unmanaged_rules_kept() {
        let loki = tunnel_ingress("logging", "loki", "loki.example.com", "loki", None);
        let registry = grafana_registry().with_service(cluster_ip_service(
            "logging",
            "loki",
            "172.20.1.1",
            &[3100],
        ));
        let tunnel = FakeTunnel::new(vec![
            IngressRule::new("legacy.example.com", "http://legacy:80"),
            IngressRule::new("loki.example.com", "http://10.99.7.7:3100"),
            IngressRule::catch_all(),
        ]);
        let store = FakeIngressStore::new(vec![grafana_ingress(), loki]);
        let ctx = test_context(tunnel.clone(), registry, store, dns());

        reconcile_tunnel_ingress(&ctx, &grafana_ingress()).await.unwrap();

        assert_eq!(
            tunnel.rules(),
            vec![
                IngressRule::new(GRAFANA, GRAFANA_SVC),
                IngressRule::new("loki.example.com", "http://loki.logging.svc.cluster.local:3100"),
                IngressRule::new("legacy.example.com", "http://legacy:80"),
                IngressRule::catch_all(),
            ]
        );
    }

    #[tokio::test]
    async fn test_reconcile_twice_writes_identical_rules() {
        let tunnel = FakeTunnel::new(vec![]);
        let ctx = test_context(
            tunnel.clone(),
            grafana_registry(),
            FakeIngressStore::new(vec![grafana_ingress()]),
            dns(),
        );

        reconcile_tunnel_ingress(&ctx, &grafana_ingress()).await.unwrap();
        reconcile_tunnel_ingress(&ctx, &grafana_ingress()).await.unwrap();

        let history = tunnel.history();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0], history[1]);
    }

    #[test]
    fn test_time_until_resync_for_observed_ready() {
        let ingress = observed(Phase::Ready, "2025-06-01T12:00:00+00:00");

        assert_eq!(
            time_until_resync(&ingress, at("2025-06-01T12:01:00Z")),
            Some(Duration::from_secs(240))
        );
        assert_eq!(time_until_resync(&ingress, at("2025-06-01T12:05:00Z")), None);
        assert_eq!(time_until_resync(&ingress, at("2025-06-01T13:00:00Z")), None);
    }

    #[test]
    fn test_time_until_resync_for_observed_failed() {
        let ingress = observed(Phase::Failed, "2025-06-01T12:00:00+00:00");

        assert_eq!(
            time_until_resync(&ingress, at("2025-06-01T12:00:10Z")),
            Some(Duration::from_secs(20))
        );
        assert_eq!(time_until_resync(&ingress, at("2025-06-01T12:00:30Z")), None);
    }

    #[test]
    fn test_time_until_resync_runs_when_pass_is_due() {
        let now = at("2025-06-01T12:00:10Z");

        assert_eq!(time_until_resync(&grafana_ingress(), now), None, "no status yet");

        let mut bumped = observed(Phase::Ready, "2025-06-01T12:00:00+00:00");
        bumped.metadata.generation = Some(2);
        assert_eq!(time_until_resync(&bumped, now), None, "spec changed");

        let pending = observed(Phase::Pending, "2025-06-01T12:00:00+00:00");
        assert_eq!(time_until_resync(&pending, now), None);
        let syncing = observed(Phase::Syncing, "2025-06-01T12:00:00+00:00");
        assert_eq!(time_until_resync(&syncing, now), None);

        let garbled = observed(Phase::Ready, "yesterday");
        assert_eq!(time_until_resync(&garbled, now), None);
    }

    #[tokio::test]
    async fn test_status_only_change_does_not_rewrite_tunnel() {
        let tunnel = FakeTunnel::new(vec![]);
        let store = FakeIngressStore::new(vec![grafana_ingress()]);
        let ctx = test_context(tunnel.clone(), grafana_registry(), store.clone(), dns());

        let first = reconcile_tunnel_ingress(&ctx, &grafana_ingress()).await.unwrap();
        assert_eq!(first.phase, Phase::Ready);

        // The watch event produced by the Ready patch
        let mut echoed = grafana_ingress();
        echoed.status = Some(store.patches().last().cloned().unwrap().1);
        let second = reconcile_tunnel_ingress(&ctx, &echoed).await.unwrap();

        assert_eq!(second.phase, Phase::Ready);
        assert_eq!(second.label, "skipped");
        let remaining = second.requeue_after.unwrap();
        assert!(remaining <= Duration::from_secs(300));
        assert!(remaining > Duration::from_secs(240));
        assert_eq!(tunnel.puts(), 1);
        assert_eq!(store.patches().len(), 2);
    }

    #[tokio::test]
    async fn test_due_resync_rewrites_tunnel() {
        let tunnel = FakeTunnel::new(vec![]);
        let store = FakeIngressStore::new(vec![]);
        let ctx = test_context(tunnel.clone(), grafana_registry(), store.clone(), dns());
        let stale = observed(Phase::Ready, "2025-01-01T00:00:00+00:00");

        let outcome = reconcile_tunnel_ingress(&ctx, &stale).await.unwrap();

        assert_eq!(outcome.label, "ready");
        assert_eq!(outcome.requeue_after, Some(Duration::from_secs(300)));
        assert_eq!(tunnel.puts(), 1);
    }

    #[tokio::test]
    async fn test_failed_pass_echo_waits_for_retry_interval() {
        let tunnel = FakeTunnel::new(vec![]);
        tunnel.fail_put(1, StatusCode::FORBIDDEN);
        let store = FakeIngressStore::new(vec![]);
        let ctx = test_context(tunnel.clone(), grafana_registry(), store.clone(), dns());

        let first = reconcile_tunnel_ingress(&ctx, &grafana_ingress()).await.unwrap();
        assert_eq!(first.phase, Phase::Failed);

        let mut echoed = grafana_ingress();
        echoed.status = Some(store.patches().last().cloned().unwrap().1);
        let second = reconcile_tunnel_ingress(&ctx, &echoed).await.unwrap();

        assert_eq!(second.phase, Phase::Failed);
        assert_eq!(second.label, "skipped");
        assert!(second.requeue_after.unwrap() <= Duration::from_secs(30));
        assert_eq!(tunnel.puts(), 1);
    }
}
