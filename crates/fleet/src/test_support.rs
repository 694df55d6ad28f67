// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test infrastructure: record builders and a mock key channel.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use uuid::Uuid;

use crate::channel::KeyChannel;
use crate::plan::JobAction;
use crate::store::{ProxyServer, User};

/// Build a user that needs its first distribution.
pub fn dirty_user(email: &str) -> User {
    User {
        id: Uuid::new_v4(),
        email: email.to_owned(),
        name: email.to_owned(),
        domain: None,
        public_key: format!("ssh-ed25519 AAAA {email}"),
        private_key: "cGtleQ".to_owned(),
        key_generated_at: 0,
        is_key_revoked: false,
        needs_redistribution: true,
        pending_delete: false,
    }
}

pub fn test_server(ip: &str) -> ProxyServer {
    ProxyServer { id: Uuid::new_v4(), ip_address: ip.to_owned(), name: None }
}

/// One recorded remote operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockCall {
    pub server: String,
    pub action: JobAction,
    pub public_key: String,
}

/// In-memory [`KeyChannel`] with failure injection and overlap tracking.
///
/// Every operation holds a per-server in-flight marker across an await
/// point, so two operations racing on the same server are observable as
/// an overlap.
pub struct MockChannel {
    calls: Mutex<Vec<MockCall>>,
    /// Remaining injected failures per server (`u32::MAX` = always fail).
    failures: Mutex<HashMap<String, u32>>,
    in_flight: Mutex<HashMap<String, usize>>,
    same_server_overlap: AtomicBool,
    current: AtomicUsize,
    max_concurrent: AtomicUsize,
    op_delay: Duration,
}

impl Default for MockChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl MockChannel {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            failures: Mutex::new(HashMap::new()),
            in_flight: Mutex::new(HashMap::new()),
            same_server_overlap: AtomicBool::new(false),
            current: AtomicUsize::new(0),
            max_concurrent: AtomicUsize::new(0),
            op_delay: Duration::from_millis(10),
        }
    }

    /// Make every operation against `server` fail.
    pub fn fail_always(&self, server: &str) {
        if let Ok(mut failures) = self.failures.lock() {
            failures.insert(server.to_owned(), u32::MAX);
        }
    }

    /// Make the next `n` operations against `server` fail.
    pub fn fail_times(&self, server: &str, n: u32) {
        if let Ok(mut failures) = self.failures.lock() {
            failures.insert(server.to_owned(), n);
        }
    }

    pub fn calls(&self) -> Vec<MockCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// Whether two operations ever overlapped on the same server.
    pub fn saw_same_server_overlap(&self) -> bool {
        self.same_server_overlap.load(Ordering::Relaxed)
    }

    /// High-water mark of concurrently running operations overall.
    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent.load(Ordering::Relaxed)
    }

    async fn operate(&self, server: &str, action: JobAction, public_key: &str) -> anyhow::Result<()> {
        let current = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_concurrent.fetch_max(current, Ordering::SeqCst);
        if let Ok(mut in_flight) = self.in_flight.lock() {
            let slot = in_flight.entry(server.to_owned()).or_insert(0);
            *slot += 1;
            if *slot > 1 {
                self.same_server_overlap.store(true, Ordering::Relaxed);
            }
        }

        // Hold the in-flight marker across an await point so racing
        // operations actually interleave.
        tokio::time::sleep(self.op_delay).await;

        if let Ok(mut in_flight) = self.in_flight.lock() {
            if let Some(slot) = in_flight.get_mut(server) {
                *slot = slot.saturating_sub(1);
            }
        }
        self.current.fetch_sub(1, Ordering::SeqCst);

        if let Ok(mut calls) = self.calls.lock() {
            calls.push(MockCall {
                server: server.to_owned(),
                action,
                public_key: public_key.to_owned(),
            });
        }

        let should_fail = self
            .failures
            .lock()
            .ok()
            .map(|mut failures| match failures.get_mut(server) {
                Some(0) | None => false,
                Some(n) if *n == u32::MAX => true,
                Some(n) => {
                    *n -= 1;
                    true
                }
            })
            .unwrap_or(false);
        if should_fail {
            anyhow::bail!("injected failure for {server}");
        }
        Ok(())
    }
}

impl KeyChannel for MockChannel {
    async fn push_key(&self, server_addr: &str, public_key: &str) -> anyhow::Result<()> {
        self.operate(server_addr, JobAction::Push, public_key).await
    }

    async fn remove_key(&self, server_addr: &str, public_key: &str) -> anyhow::Result<()> {
        self.operate(server_addr, JobAction::Remove, public_key).await
    }
}
