// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Keyfleet: credential lifecycle and distribution core for a proxy
//! server fleet.
//!
//! Manages per-user key pairs, packages invite codes, and keeps every
//! registered proxy server's authorized-key state reconciled with the
//! central registry on a fixed interval.

pub mod admin;
pub mod channel;
pub mod config;
pub mod directory;
pub mod distribute;
pub mod invite;
pub mod keypair;
pub mod plan;
pub mod scheduler;
pub mod store;
pub mod test_support;

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::channel::HttpKeyChannel;
use crate::config::FleetConfig;
use crate::scheduler::Scheduler;
use crate::store::Store;

/// Run the daemon until interrupted.
pub async fn run(config: FleetConfig) -> anyhow::Result<()> {
    // Install the ring crypto provider for reqwest/rustls.
    let _ = rustls::crypto::ring::default_provider().install_default();

    let registry = config.registry_path();
    let store = Arc::new(Store::open(registry.clone())?);
    let channel = Arc::new(HttpKeyChannel::new(config.admin_port, config.admin_token.clone()));
    let shutdown = CancellationToken::new();

    let scheduler = Scheduler::new(Arc::clone(&store), channel, config.cycle_options());
    let handle = scheduler.spawn(config.cycle_interval(), shutdown.clone());

    let users = store.list_users().await.len();
    let servers = store.list_servers().await.len();
    tracing::info!(
        registry = %registry.display(),
        interval_ms = config.cycle_interval_ms,
        users,
        servers,
        "keyfleetd running"
    );

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down");
    shutdown.cancel();
    handle.await?;

    Ok(())
}
