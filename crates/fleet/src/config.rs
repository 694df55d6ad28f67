// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;
use std::time::Duration;

use crate::distribute::{CycleOptions, RetryPolicy};

/// Configuration for the keyfleet daemon.
#[derive(Debug, Clone, clap::Parser)]
#[command(name = "keyfleetd", about = "Key distribution control plane for a proxy server fleet")]
pub struct FleetConfig {
    /// Reconciliation cycle interval in milliseconds.
    #[arg(long, default_value_t = 15_000, env = "KEYFLEET_CYCLE_INTERVAL_MS")]
    pub cycle_interval_ms: u64,

    /// Max servers contacted concurrently within one cycle.
    #[arg(long, default_value_t = 8, env = "KEYFLEET_MAX_CONCURRENT_SERVERS")]
    pub max_concurrent_servers: usize,

    /// Max retries per distribution job.
    #[arg(long, default_value_t = 3, env = "KEYFLEET_MAX_RETRIES")]
    pub max_retries: u32,

    /// Initial per-job retry backoff in milliseconds (doubles per retry).
    #[arg(long, default_value_t = 500, env = "KEYFLEET_RETRY_BACKOFF_MS")]
    pub retry_backoff_ms: u64,

    /// Maximum per-job retry backoff in milliseconds.
    #[arg(long, default_value_t = 5_000, env = "KEYFLEET_MAX_BACKOFF_MS")]
    pub max_backoff_ms: u64,

    /// Administrative endpoint port on each proxy server.
    #[arg(long, default_value_t = 9821, env = "KEYFLEET_ADMIN_PORT")]
    pub admin_port: u16,

    /// Bearer token for proxy server admin endpoints. If unset, auth is disabled.
    #[arg(long, env = "KEYFLEET_ADMIN_TOKEN")]
    pub admin_token: Option<String>,

    /// Registry snapshot path. Defaults to `<state-dir>/registry.json`.
    #[arg(long, env = "KEYFLEET_REGISTRY")]
    pub registry: Option<PathBuf>,

    /// Base URL of the directory lookup service (enables user import).
    #[arg(long, env = "KEYFLEET_DIRECTORY_URL")]
    pub directory_url: Option<String>,

    /// Bearer token for the directory lookup service.
    #[arg(long, env = "KEYFLEET_DIRECTORY_TOKEN")]
    pub directory_token: Option<String>,

    /// Owning domain stamped on directory-imported users.
    #[arg(long, env = "KEYFLEET_DOMAIN")]
    pub domain: Option<String>,
}

impl FleetConfig {
    pub fn cycle_interval(&self) -> Duration {
        Duration::from_millis(self.cycle_interval_ms)
    }

    pub fn registry_path(&self) -> PathBuf {
        match &self.registry {
            Some(path) => path.clone(),
            None => crate::store::persist::state_dir().join("registry.json"),
        }
    }

    pub fn cycle_options(&self) -> CycleOptions {
        CycleOptions {
            max_concurrent_servers: self.max_concurrent_servers,
            retry: RetryPolicy {
                max_retries: self.max_retries,
                initial_backoff: Duration::from_millis(self.retry_backoff_ms),
                max_backoff: Duration::from_millis(self.max_backoff_ms),
            },
        }
    }
}
