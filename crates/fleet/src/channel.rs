// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Remote execution channel to a proxy server's administrative endpoint.

use std::future::Future;

/// The fleet seam: append or remove one public key on one server.
///
/// Implementations must be usable concurrently across servers; the
/// executor serializes calls targeting the same server itself.
pub trait KeyChannel: Send + Sync {
    /// Append `public_key` to the authorized keys on `server_addr`.
    fn push_key(
        &self,
        server_addr: &str,
        public_key: &str,
    ) -> impl Future<Output = anyhow::Result<()>> + Send;

    /// Remove any authorized-keys entry matching `public_key` on `server_addr`.
    fn remove_key(
        &self,
        server_addr: &str,
        public_key: &str,
    ) -> impl Future<Output = anyhow::Result<()>> + Send;
}

/// HTTP implementation of [`KeyChannel`] against each server's
/// administrative endpoint.
pub struct HttpKeyChannel {
    admin_port: u16,
    auth_token: Option<String>,
    client: reqwest::Client,
}

impl HttpKeyChannel {
    pub fn new(admin_port: u16, auth_token: Option<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Self { admin_port, auth_token, client }
    }

    fn url(&self, server_addr: &str, path: &str) -> String {
        format!("http://{}:{}{}", server_addr, self.admin_port, path)
    }

    fn apply_auth(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.auth_token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    async fn post_key(&self, server_addr: &str, path: &str, public_key: &str) -> anyhow::Result<()> {
        let body = serde_json::json!({ "public_key": public_key });
        let req = self.client.post(self.url(server_addr, path)).json(&body);
        self.apply_auth(req).send().await?.error_for_status()?;
        Ok(())
    }
}

impl KeyChannel for HttpKeyChannel {
    async fn push_key(&self, server_addr: &str, public_key: &str) -> anyhow::Result<()> {
        self.post_key(server_addr, "/api/v1/keys", public_key).await
    }

    async fn remove_key(&self, server_addr: &str, public_key: &str) -> anyhow::Result<()> {
        self.post_key(server_addr, "/api/v1/keys/remove", public_key).await
    }
}
