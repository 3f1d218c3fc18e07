// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `config.rs`

#[cfg(test)]
mod tests {
    use crate::config::Args;
    use clap::Parser;
    use std::time::Duration;

    fn parse(extra: &[&str]) -> Args {
        let mut argv = vec![
            "tunnelsync",
            "--email",
            "ops@example.com",
            "--api-key",
            "key",
            "--tunnel-token",
            "token",
        ];
        argv.extend_from_slice(extra);
        Args::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_defaults() {
        let args = parse(&[]);
        assert_eq!(args.api_url, "https://api.cloudflare.com/client/v4");
        assert_eq!(args.cluster_domain, "cluster.local");
        assert_eq!(args.request_timeout_secs, 30);
        assert_eq!(args.metrics_bind_address.port(), 8080);

        let policy = args.write_verify_policy();
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.initial_backoff, Duration::from_secs(2));
        assert_eq!(policy.settle_delay, Duration::from_secs(3));
        assert_eq!(policy.max_backoff, Duration::from_secs(30));
    }

    #[test]
    fn test_ephemeral_networks_override() {
        let args = parse(&["--ephemeral-networks", "10.42.0.0/16, fd00::/8"]);
        let filter = args.ephemeral_filter().unwrap();
        assert_eq!(filter.networks().len(), 2);
        assert!(filter.is_ephemeral_host("10.42.3.4"));
        assert!(!filter.is_ephemeral_host("10.99.0.1"));
    }

    #[test]
    fn test_invalid_ephemeral_network() {
        let args = parse(&["--ephemeral-networks", "10.99.0.0/99"]);
        let err = args.ephemeral_filter().unwrap_err();
        assert!(err.to_string().contains("10.99.0.0/99"));
    }

    #[test]
    fn test_verify_overrides() {
        let args = parse(&[
            "--verify-max-attempts",
            "3",
            "--verify-initial-backoff-ms",
            "500",
            "--verify-settle-delay-ms",
            "0",
        ]);
        let policy = args.write_verify_policy();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.initial_backoff, Duration::from_millis(500));
        assert_eq!(policy.settle_delay, Duration::ZERO);
    }

    #[test]
    fn test_missing_credentials_rejected() {
        if std::env::var_os("CLOUDFLARE_TUNNEL_TOKEN").is_some() {
            return;
        }
        assert!(Args::try_parse_from(["tunnelsync", "--email", "a", "--api-key", "b"]).is_err());
    }
}
