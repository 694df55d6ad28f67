// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Administrative operations over the credential store.
//!
//! These only mutate records and flags; none of them talks to the
//! fleet. Distribution happens exclusively on the scheduler's next
//! tick, driven by the flags set here.

use uuid::Uuid;

use crate::directory::DirectoryUser;
use crate::invite;
use crate::keypair;
use crate::store::{ProxyServer, Store, StoreError, User};

/// Add a single user and generate their first key pair.
///
/// `domain` is `None` for manually-added users and the owning domain
/// for directory imports.
pub async fn add_user(
    store: &Store,
    name: &str,
    email: &str,
    domain: Option<String>,
) -> anyhow::Result<User> {
    let pair = keypair::generate_key_pair(email)?;
    let user = User {
        id: Uuid::new_v4(),
        email: email.to_owned(),
        name: name.to_owned(),
        domain,
        public_key: pair.public_key,
        private_key: pair.private_key,
        key_generated_at: keypair::epoch_secs(),
        is_key_revoked: false,
        needs_redistribution: true,
        pending_delete: false,
    };
    store.save_user(user.clone()).await?;
    tracing::info!(user = %user.email, "user added");
    Ok(user)
}

/// Import users fetched from the directory service.
///
/// Saves one user at a time so a single duplicate email skips that
/// entry instead of failing the whole batch. Returns the users
/// actually added.
pub async fn import_directory_users(
    store: &Store,
    entries: &[DirectoryUser],
    domain: Option<&str>,
) -> anyhow::Result<Vec<User>> {
    let mut added = Vec::new();
    for entry in entries {
        match add_user(store, &entry.full_name, &entry.primary_email, domain.map(str::to_owned))
            .await
        {
            Ok(user) => added.push(user),
            Err(e) if e.downcast_ref::<StoreError>() == Some(&StoreError::DuplicateEmail) => {
                tracing::warn!(user = %entry.primary_email, "already registered, skipping import");
            }
            Err(e) => return Err(e),
        }
    }
    Ok(added)
}

/// Flip a user's revocation state.
///
/// Either direction re-arms redistribution: revoking fans out key
/// removal, un-revoking fans the key back out.
pub async fn toggle_revoked(store: &Store, user_id: &Uuid) -> Result<User, StoreError> {
    let mut user = store.find_user(user_id).await?;
    user.is_key_revoked = !user.is_key_revoked;
    user.needs_redistribution = true;
    store.save_user(user.clone()).await?;
    tracing::info!(user = %user.email, revoked = user.is_key_revoked, "revocation toggled");
    Ok(user)
}

/// Delete a user.
///
/// Deletion triggers a removal action rather than a push: the record is
/// marked pending-delete and dropped only after the next cycle removes
/// the key from every server. With no servers registered there is
/// nothing to remove, so the record is dropped immediately.
pub async fn delete_user(store: &Store, user_id: &Uuid) -> Result<(), StoreError> {
    let mut user = store.find_user(user_id).await?;

    if store.list_servers().await.is_empty() {
        store.delete_user(user_id).await?;
        tracing::info!(user = %user.email, "user deleted (no servers registered)");
        return Ok(());
    }

    user.pending_delete = true;
    user.is_key_revoked = true;
    user.needs_redistribution = true;
    store.save_user(user.clone()).await?;
    tracing::info!(user = %user.email, "user marked for deletion, key removal scheduled");
    Ok(())
}

/// Register a proxy server as a distribution target.
pub async fn add_server(store: &Store, ip_address: &str, name: Option<String>) -> anyhow::Result<ProxyServer> {
    if ip_address.trim().is_empty() {
        anyhow::bail!("server address must not be empty");
    }
    let server = ProxyServer { id: Uuid::new_v4(), ip_address: ip_address.trim().to_owned(), name };
    store.save_server(server.clone()).await?;
    tracing::info!(server = %server.ip_address, "proxy server added");
    Ok(server)
}

/// Remove a proxy server from the distribution pool.
pub async fn delete_server(store: &Store, server_id: &Uuid) -> Result<(), StoreError> {
    let server = store.find_server(server_id).await?;
    store.delete_server(server_id).await?;
    tracing::info!(server = %server.ip_address, "proxy server deleted");
    Ok(())
}

/// Build an invite link for a user against a random registered server.
///
/// `None` when the fleet is empty.
pub async fn get_invite_url(store: &Store, user_id: &Uuid) -> anyhow::Result<Option<String>> {
    let user = store.find_user(user_id).await?;
    let servers = store.list_servers().await;
    Ok(invite::make_invite_code(&user, &servers).map(|token| invite::invite_url(&token)))
}

#[cfg(test)]
#[path = "admin_tests.rs"]
mod tests;
