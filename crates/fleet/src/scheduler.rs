// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cycle scheduler: fires reconciliation + distribution on a fixed
//! interval, at most one cycle at a time.
//!
//! The single-slot guard is an explicit atomic flag: a tick arriving
//! while a cycle is in flight is dropped, not queued. A dropped tick is
//! absorbed by the next tick's fresh full scan, so there is nothing to
//! replay.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::channel::KeyChannel;
use crate::distribute::{execute_cycle, CycleOptions, CycleSummary};
use crate::plan::plan_cycle;
use crate::store::Store;

/// Drives reconciliation cycles over one store and one fleet channel.
pub struct Scheduler<C> {
    store: Arc<Store>,
    channel: Arc<C>,
    opts: CycleOptions,
    /// IDLE (false) / RUNNING (true).
    running: AtomicBool,
}

impl<C: KeyChannel + 'static> Scheduler<C> {
    pub fn new(store: Arc<Store>, channel: Arc<C>, opts: CycleOptions) -> Arc<Self> {
        Arc::new(Self { store, channel, opts, running: AtomicBool::new(false) })
    }

    /// Run one cycle unless one is already in flight.
    ///
    /// Returns `None` for a dropped tick. Never fails: distribution
    /// errors are recorded in the summary and retried on later ticks.
    pub async fn run_cycle(&self) -> Option<CycleSummary> {
        if self.running.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire).is_err() {
            tracing::debug!("cycle already running, tick dropped");
            return None;
        }
        let summary = self.cycle().await;
        self.running.store(false, Ordering::Release);
        Some(summary)
    }

    async fn cycle(&self) -> CycleSummary {
        let users = self.store.list_users().await;
        let servers = self.store.list_servers().await;

        let mut summary = CycleSummary::default();
        if servers.is_empty() {
            // No servers means no keys left to remove: pending-delete
            // records would otherwise wait forever for a removal
            // fan-out that can never run.
            for user in users.iter().filter(|u| u.pending_delete) {
                match self.store.delete_user(&user.id).await {
                    Ok(()) => {
                        tracing::info!(user = %user.email, "user deleted (no servers registered)");
                        summary.users_deleted += 1;
                    }
                    Err(e) => {
                        tracing::warn!(user = %user.email, err = %e, "failed to drop pending-delete user");
                    }
                }
            }
        }

        let jobs = plan_cycle(&users, &servers);
        if jobs.is_empty() {
            tracing::debug!("nothing to distribute");
            return summary;
        }

        tracing::info!(jobs = jobs.len(), servers = servers.len(), "starting distribution cycle");
        let summary = execute_cycle(self.store.as_ref(), self.channel.as_ref(), jobs, &self.opts).await;

        if summary.failed > 0 {
            tracing::warn!(
                planned = summary.planned,
                succeeded = summary.succeeded,
                failed = summary.failed,
                users_synced = summary.users_synced,
                "distribution cycle completed with failures"
            );
        } else {
            tracing::info!(
                planned = summary.planned,
                users_synced = summary.users_synced,
                users_deleted = summary.users_deleted,
                "distribution cycle completed"
            );
        }
        summary
    }

    /// Spawn the interval loop. Runs until `shutdown` is cancelled.
    pub fn spawn(
        self: Arc<Self>,
        interval: Duration,
        shutdown: CancellationToken,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut timer = tokio::time::interval(interval);
            timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = timer.tick() => {}
                }
                let _ = self.run_cycle().await;
            }
        })
    }
}
