// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Directory lookup client for importing candidate users.
//!
//! The directory speaks loosely-shaped JSON (`{"name": {"fullName": ..},
//! "primaryEmail": ..}` entries). Responses are validated at this
//! boundary into the fixed [`DirectoryUser`] record; malformed entries
//! are logged and dropped rather than propagated inward. Transport and
//! HTTP failures surface as errors, distinct from a valid empty result.

use reqwest::Client;
use serde::{Deserialize, Serialize};

/// The fixed-shape record the rest of the system sees.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryUser {
    pub full_name: String,
    pub primary_email: String,
}

/// HTTP client for the directory lookup service.
pub struct DirectoryClient {
    base_url: String,
    auth_token: Option<String>,
    client: Client,
}

impl DirectoryClient {
    pub fn new(base_url: String, auth_token: Option<String>) -> Self {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Self { base_url, auth_token, client }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn apply_auth(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.auth_token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    /// List every user in the directory's domain.
    pub async fn get_users(&self) -> anyhow::Result<Vec<DirectoryUser>> {
        self.fetch_users("/users").await
    }

    /// List the members of a group (and nested groups, per the service).
    pub async fn get_users_by_group(&self, group_key: &str) -> anyhow::Result<Vec<DirectoryUser>> {
        self.fetch_users(&format!("/groups/{group_key}/members")).await
    }

    /// Look up a single user; returned as a list for uniformity with the
    /// other lookups (empty when unknown).
    pub async fn get_user_by_key(&self, user_key: &str) -> anyhow::Result<Vec<DirectoryUser>> {
        self.fetch_users(&format!("/users/{user_key}")).await
    }

    async fn fetch_users(&self, path: &str) -> anyhow::Result<Vec<DirectoryUser>> {
        let req = self.client.get(self.url(path));
        let resp = self.apply_auth(req).send().await?.error_for_status()?;
        let body: serde_json::Value = resp.json().await?;
        Ok(parse_directory_users(&body))
    }
}

/// Map a directory response body to validated records.
///
/// Accepts `{"users": [..]}`, a bare array, or a single entry object.
pub fn parse_directory_users(body: &serde_json::Value) -> Vec<DirectoryUser> {
    let entries: Vec<&serde_json::Value> = match body.get("users").and_then(|u| u.as_array()) {
        Some(list) => list.iter().collect(),
        None => match body.as_array() {
            Some(list) => list.iter().collect(),
            None if body.is_object() => vec![body],
            None => Vec::new(),
        },
    };

    entries
        .into_iter()
        .filter_map(|entry| {
            let user = parse_directory_user(entry);
            if user.is_none() {
                tracing::warn!(entry = %entry, "dropping malformed directory entry");
            }
            user
        })
        .collect()
}

fn parse_directory_user(entry: &serde_json::Value) -> Option<DirectoryUser> {
    let full_name = entry.get("name")?.get("fullName")?.as_str()?;
    let primary_email = entry.get("primaryEmail")?.as_str()?;
    if primary_email.is_empty() {
        return None;
    }
    Some(DirectoryUser {
        full_name: full_name.to_owned(),
        primary_email: primary_email.to_owned(),
    })
}
