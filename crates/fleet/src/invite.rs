// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Invite codes: a portable, URL-safe bundle of connection endpoint and
//! credential for out-of-band delivery to an end user.
//!
//! Serialize-then-encode, no encryption: the token is an obfuscated
//! bearer credential, and the transport channel (not the token itself)
//! is the security boundary. The wire structure is stable for
//! compatibility with consuming client software.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::seq::IndexedRandom;
use serde::{Deserialize, Serialize};

use crate::store::{ProxyServer, User};

/// Network identifier the consuming client expects.
const NETWORK_NAME: &str = "Cloud";

/// Prefix turning a raw invite code into a clickable invite link.
pub const INVITE_URL_PREFIX: &str = "https://uproxy.org/invite#";

/// Decoded invite token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InviteCode {
    pub network_name: String,
    pub network_data: InviteData,
}

/// Connection endpoint plus credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InviteData {
    /// Proxy server to connect to.
    pub host: String,
    /// Principal to connect as (the user's email).
    pub principal: String,
    /// The user's private key.
    pub secret: String,
}

/// Build an invite code for `user` against a uniformly-random server
/// from `servers`.
///
/// Returns `None` when the fleet is empty: with no endpoint to connect
/// to there is nothing meaningful to encode. Never mutates state and
/// never talks to the fleet.
pub fn make_invite_code(user: &User, servers: &[ProxyServer]) -> Option<String> {
    let server = servers.choose(&mut rand::rng())?;
    let invite = InviteCode {
        network_name: NETWORK_NAME.to_owned(),
        network_data: InviteData {
            host: server.ip_address.clone(),
            principal: user.email.clone(),
            secret: user.private_key.clone(),
        },
    };
    // Serialization of a plain struct cannot fail.
    let json = serde_json::to_string(&invite).ok()?;
    Some(URL_SAFE_NO_PAD.encode(json))
}

/// Decode an invite code back into its structure.
pub fn decode_invite_code(token: &str) -> anyhow::Result<InviteCode> {
    let json = URL_SAFE_NO_PAD.decode(token)?;
    Ok(serde_json::from_slice(&json)?)
}

/// Render an invite code as a shareable link.
pub fn invite_url(token: &str) -> String {
    format!("{INVITE_URL_PREFIX}{token}")
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;

    fn test_user() -> User {
        User {
            id: Uuid::new_v4(),
            email: "alice@example.com".to_owned(),
            name: "Alice".to_owned(),
            domain: None,
            public_key: "ssh-ed25519 AAAA alice@example.com".to_owned(),
            private_key: "c2VjcmV0LWtleQ".to_owned(),
            key_generated_at: 0,
            is_key_revoked: false,
            needs_redistribution: false,
            pending_delete: false,
        }
    }

    fn test_server(ip: &str) -> ProxyServer {
        ProxyServer { id: Uuid::new_v4(), ip_address: ip.to_owned(), name: None }
    }

    #[test]
    fn round_trip_preserves_structure() -> anyhow::Result<()> {
        let user = test_user();
        let servers = vec![test_server("178.62.123.172")];
        let token = make_invite_code(&user, &servers).ok_or_else(|| anyhow::anyhow!("no token"))?;

        let decoded = decode_invite_code(&token)?;
        assert_eq!(decoded.network_name, "Cloud");
        assert_eq!(decoded.network_data.host, "178.62.123.172");
        assert_eq!(decoded.network_data.principal, "alice@example.com");
        assert_eq!(decoded.network_data.secret, "c2VjcmV0LWtleQ");
        Ok(())
    }

    #[test]
    fn empty_fleet_yields_no_code() {
        assert!(make_invite_code(&test_user(), &[]).is_none());
    }

    #[test]
    fn host_is_one_of_the_registered_servers() -> anyhow::Result<()> {
        let user = test_user();
        let servers: Vec<ProxyServer> =
            (1..=5).map(|i| test_server(&format!("10.0.0.{i}"))).collect();
        for _ in 0..20 {
            let token =
                make_invite_code(&user, &servers).ok_or_else(|| anyhow::anyhow!("no token"))?;
            let decoded = decode_invite_code(&token)?;
            assert!(servers.iter().any(|s| s.ip_address == decoded.network_data.host));
        }
        Ok(())
    }

    #[test]
    fn token_is_url_safe() -> anyhow::Result<()> {
        let user = test_user();
        let servers = vec![test_server("10.0.0.1")];
        let token = make_invite_code(&user, &servers).ok_or_else(|| anyhow::anyhow!("no token"))?;
        assert!(token.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
        Ok(())
    }

    #[test]
    fn invite_url_uses_stable_prefix() {
        assert_eq!(invite_url("abc"), "https://uproxy.org/invite#abc");
    }

    #[test]
    fn garbage_token_fails_to_decode() {
        assert!(decode_invite_code("not!valid!base64!").is_err());
        // Valid base64, invalid payload.
        let junk = URL_SAFE_NO_PAD.encode("{\"nope\": true}");
        assert!(decode_invite_code(&junk).is_err());
    }
}
