// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Credential store: user and proxy server records with CRUD and search.
//!
//! In-process registry backed by `tokio::sync::RwLock` maps, optionally
//! persisted to a JSON file after every mutation. Enforces the two
//! uniqueness invariants (user email, server address) at save time and
//! surfaces them as typed [`StoreError`] variants so administrative
//! callers can distinguish them from not-found outcomes.

pub mod persist;

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::store::persist::PersistedRegistry;

/// A managed user and their current key pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    /// Unique business key.
    pub email: String,
    pub name: String,
    /// Owning domain for directory-imported users; `None` for manual adds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    /// OpenSSH `authorized_keys` line for the current key pair.
    pub public_key: String,
    /// Base64-encoded PKCS#8 private half. Leaves the store only inside
    /// an invite token.
    pub private_key: String,
    /// Epoch seconds of the last key (re)generation.
    pub key_generated_at: u64,
    /// Administrator-controlled intent: revoked users get their key
    /// removed from every server instead of pushed.
    #[serde(default)]
    pub is_key_revoked: bool,
    /// Set whenever key material or revocation state changes; cleared
    /// only after a cycle in which every server confirmed the update.
    #[serde(default)]
    pub needs_redistribution: bool,
    /// Deletion is deferred until the key has been removed fleet-wide;
    /// this marks a user whose record should be dropped once that
    /// removal fan-out fully succeeds.
    #[serde(default)]
    pub pending_delete: bool,
}

/// A registered proxy server. Pure distribution target: it holds no
/// credential state of its own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyServer {
    pub id: Uuid,
    /// Unique endpoint address (IP or hostname).
    pub ip_address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Typed store outcomes for administrative operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreError {
    UserNotFound,
    ServerNotFound,
    /// Another user already owns this email.
    DuplicateEmail,
    /// Another server already owns this address.
    DuplicateAddress,
}

impl StoreError {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UserNotFound => "USER_NOT_FOUND",
            Self::ServerNotFound => "SERVER_NOT_FOUND",
            Self::DuplicateEmail => "DUPLICATE_EMAIL",
            Self::DuplicateAddress => "DUPLICATE_ADDRESS",
        }
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::error::Error for StoreError {}

/// Combined result of a substring search over both record types.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SearchResults {
    pub users: Vec<User>,
    pub servers: Vec<ProxyServer>,
}

/// The credential registry.
pub struct Store {
    users: RwLock<HashMap<Uuid, User>>,
    servers: RwLock<HashMap<Uuid, ProxyServer>>,
    /// JSON snapshot path; `None` disables persistence (tests).
    persist_path: Option<PathBuf>,
}

impl Store {
    /// Create an empty, non-persistent store.
    pub fn new() -> Self {
        Self { users: RwLock::new(HashMap::new()), servers: RwLock::new(HashMap::new()), persist_path: None }
    }

    /// Open a store persisted at `path`, loading any existing snapshot.
    pub fn open(path: PathBuf) -> anyhow::Result<Self> {
        let registry = if path.exists() { persist::load(&path)? } else { PersistedRegistry::default() };
        let users = registry.users.into_iter().map(|u| (u.id, u)).collect();
        let servers = registry.servers.into_iter().map(|s| (s.id, s)).collect();
        Ok(Self { users: RwLock::new(users), servers: RwLock::new(servers), persist_path: Some(path) })
    }

    /// Insert or update a user, enforcing email uniqueness.
    pub async fn save_user(&self, user: User) -> Result<(), StoreError> {
        let mut users = self.users.write().await;
        let duplicate = users.values().any(|u| u.id != user.id && u.email == user.email);
        if duplicate {
            return Err(StoreError::DuplicateEmail);
        }
        users.insert(user.id, user);
        self.persist(&users, &*self.servers.read().await);
        Ok(())
    }

    pub async fn delete_user(&self, id: &Uuid) -> Result<(), StoreError> {
        let mut users = self.users.write().await;
        if users.remove(id).is_none() {
            return Err(StoreError::UserNotFound);
        }
        self.persist(&users, &*self.servers.read().await);
        Ok(())
    }

    pub async fn find_user(&self, id: &Uuid) -> Result<User, StoreError> {
        self.users.read().await.get(id).cloned().ok_or(StoreError::UserNotFound)
    }

    pub async fn find_user_by_email(&self, email: &str) -> Result<User, StoreError> {
        let users = self.users.read().await;
        users.values().find(|u| u.email == email).cloned().ok_or(StoreError::UserNotFound)
    }

    /// Full-table scan, ordered by email for stable output.
    pub async fn list_users(&self) -> Vec<User> {
        let mut users: Vec<User> = self.users.read().await.values().cloned().collect();
        users.sort_by(|a, b| a.email.cmp(&b.email));
        users
    }

    /// Insert or update a proxy server, enforcing address uniqueness.
    pub async fn save_server(&self, server: ProxyServer) -> Result<(), StoreError> {
        // Lock order is always users before servers.
        let users = self.users.read().await;
        let mut servers = self.servers.write().await;
        let duplicate = servers.values().any(|s| s.id != server.id && s.ip_address == server.ip_address);
        if duplicate {
            return Err(StoreError::DuplicateAddress);
        }
        servers.insert(server.id, server);
        self.persist(&users, &servers);
        Ok(())
    }

    pub async fn delete_server(&self, id: &Uuid) -> Result<(), StoreError> {
        let users = self.users.read().await;
        let mut servers = self.servers.write().await;
        if servers.remove(id).is_none() {
            return Err(StoreError::ServerNotFound);
        }
        self.persist(&users, &servers);
        Ok(())
    }

    pub async fn find_server(&self, id: &Uuid) -> Result<ProxyServer, StoreError> {
        self.servers.read().await.get(id).cloned().ok_or(StoreError::ServerNotFound)
    }

    /// Full-table scan, ordered by address for stable output.
    pub async fn list_servers(&self) -> Vec<ProxyServer> {
        let mut servers: Vec<ProxyServer> = self.servers.read().await.values().cloned().collect();
        servers.sort_by(|a, b| a.ip_address.cmp(&b.ip_address));
        servers
    }

    /// Case-insensitive substring search over user name/email and server
    /// name/address.
    pub async fn search(&self, term: &str) -> SearchResults {
        let needle = term.to_lowercase();
        let users = self
            .list_users()
            .await
            .into_iter()
            .filter(|u| {
                u.email.to_lowercase().contains(&needle) || u.name.to_lowercase().contains(&needle)
            })
            .collect();
        let servers = self
            .list_servers()
            .await
            .into_iter()
            .filter(|s| {
                s.ip_address.to_lowercase().contains(&needle)
                    || s.name.as_deref().is_some_and(|n| n.to_lowercase().contains(&needle))
            })
            .collect();
        SearchResults { users, servers }
    }

    /// Write a snapshot to disk if persistence is enabled.
    ///
    /// Persistence failures are logged, not propagated: the in-memory
    /// registry is authoritative for the current process.
    fn persist(&self, users: &HashMap<Uuid, User>, servers: &HashMap<Uuid, ProxyServer>) {
        let Some(ref path) = self.persist_path else {
            return;
        };
        let registry = PersistedRegistry {
            users: users.values().cloned().collect(),
            servers: servers.values().cloned().collect(),
        };
        if let Err(e) = persist::save(path, &registry) {
            tracing::warn!(err = %e, "failed to persist registry");
        }
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
