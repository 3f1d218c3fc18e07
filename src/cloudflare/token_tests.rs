// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

#[cfg(test)]
mod tests {
    use super::super::TunnelToken;
    use crate::errors::ClientConstructionError;
    use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD};
    use base64::Engine;

    fn encode(json: &str) -> String {
        STANDARD.encode(json)
    }

    #[test]
    fn test_decode_valid_token() {
        let token =
            TunnelToken::decode(&encode(r#"{"a":"acct-1","t":"tunnel-1","s":"c2VjcmV0"}"#)).unwrap();
        assert_eq!(token.account_id(), "acct-1");
        assert_eq!(token.tunnel_id(), "tunnel-1");
        assert_eq!(token.tunnel_target(), "tunnel-1.cfargotunnel.com");
    }

    #[test]
    fn test_decode_unpadded_token() {
        let encoded = STANDARD_NO_PAD.encode(r#"{"a":"acct","t":"tun","s":"x"}"#);
        let token: TunnelToken = encoded.parse().unwrap();
        assert_eq!(token.tunnel_id(), "tun");
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(matches!(
            TunnelToken::decode("%%%not-base64%%%"),
            Err(ClientConstructionError::TokenEncoding(_))
        ));
        assert!(matches!(
            TunnelToken::decode(&encode("not json")),
            Err(ClientConstructionError::TokenPayload(_))
        ));
    }

    #[test]
    fn test_decode_requires_every_field() {
        let err = TunnelToken::decode(&encode(r#"{"a":"acct","s":"x"}"#)).unwrap_err();
        assert!(matches!(
            err,
            ClientConstructionError::TokenMissingField { field: "t" }
        ));
    }

    #[test]
    fn test_debug_redacts_secret() {
        let token = TunnelToken::decode(&encode(r#"{"a":"acct","t":"tun","s":"topsecret"}"#)).unwrap();
        let printed = format!("{token:?}");
        assert!(!printed.contains("topsecret"));
        assert!(printed.contains("<redacted>"));
    }
}
