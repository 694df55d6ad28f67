// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Distribution executor: runs one cycle's jobs against the live fleet.
//!
//! Jobs are grouped by target server. Each server's jobs run strictly
//! in sequence (two jobs must never race on the same server's key
//! file); distinct servers run concurrently up to a fixed width. Each
//! job retries with exponential backoff before being marked failed.
//!
//! A user's `needs_redistribution` flag clears only when every one of
//! that user's jobs succeeded this cycle. Partial success leaves the
//! flag set, so the next cycle redoes the whole fan-out against the
//! fleet as it then stands.

use std::collections::HashMap;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::channel::KeyChannel;
use crate::plan::{DistributionJob, JobAction};
use crate::store::{Store, StoreError};

/// Maximum concurrently-contacted servers per cycle.
pub const MAX_CONCURRENT_SERVERS: usize = 8;

/// Maximum retries per job before it is marked failed.
pub const MAX_RETRIES: u32 = 3;

/// Initial backoff duration for job retries.
pub const INITIAL_BACKOFF: Duration = Duration::from_millis(500);

/// Maximum backoff duration for job retries.
pub const MAX_BACKOFF: Duration = Duration::from_secs(5);

/// Per-job retry behavior.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_retries: MAX_RETRIES, initial_backoff: INITIAL_BACKOFF, max_backoff: MAX_BACKOFF }
    }
}

/// Executor tuning for one cycle.
#[derive(Debug, Clone)]
pub struct CycleOptions {
    pub max_concurrent_servers: usize,
    pub retry: RetryPolicy,
}

impl Default for CycleOptions {
    fn default() -> Self {
        Self { max_concurrent_servers: MAX_CONCURRENT_SERVERS, retry: RetryPolicy::default() }
    }
}

/// Aggregate outcome of one cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleSummary {
    pub planned: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Users whose redistribution flag was cleared this cycle.
    pub users_synced: usize,
    /// Pending-delete users whose records were dropped after a complete
    /// removal fan-out.
    pub users_deleted: usize,
}

/// Execute a planned job batch and persist per-user outcomes.
///
/// Per-job failures never abort the batch: one unreachable server does
/// not block other users or other servers.
pub async fn execute_cycle<C: KeyChannel>(
    store: &Store,
    channel: &C,
    jobs: Vec<DistributionJob>,
    opts: &CycleOptions,
) -> CycleSummary {
    let planned = jobs.len();
    if planned == 0 {
        return CycleSummary::default();
    }

    // Group by target server; each group runs sequentially.
    let mut by_server: HashMap<Uuid, Vec<DistributionJob>> = HashMap::new();
    for job in jobs {
        by_server.entry(job.server_id).or_default().push(job);
    }

    let completed: Mutex<Vec<DistributionJob>> = Mutex::new(Vec::with_capacity(planned));

    futures_util::stream::iter(by_server.into_values())
        .for_each_concurrent(opts.max_concurrent_servers, |batch| {
            let completed = &completed;
            async move {
                for mut job in batch {
                    run_job(channel, &mut job, &opts.retry).await;
                    completed.lock().await.push(job);
                }
            }
        })
        .await;

    let completed = completed.into_inner();
    let succeeded = completed.iter().filter(|j| j.last_error.is_none()).count();
    let failed = planned - succeeded;

    // Aggregate per user: the flag clears only on a fully-successful
    // fan-out across every server this cycle touched.
    let mut per_user: HashMap<Uuid, UserOutcome> = HashMap::new();
    for job in &completed {
        let outcome = per_user.entry(job.user_id).or_insert_with(|| UserOutcome {
            email: job.email.clone(),
            public_key: job.public_key.clone(),
            action: job.action,
            all_ok: true,
        });
        outcome.all_ok &= job.last_error.is_none();
    }

    let mut users_synced = 0;
    let mut users_deleted = 0;
    for (user_id, outcome) in per_user {
        if !outcome.all_ok {
            tracing::warn!(
                user = %outcome.email,
                "partial distribution failure, full fan-out will be retried next cycle"
            );
            continue;
        }
        match settle_user(store, &user_id, &outcome).await {
            Ok(Settled::FlagCleared) => users_synced += 1,
            Ok(Settled::Deleted) => users_deleted += 1,
            Ok(Settled::LeftDirty) => {}
            Err(e) => {
                // Flag stays set; next cycle retries.
                tracing::warn!(user = %outcome.email, err = %e, "failed to persist cycle outcome");
            }
        }
    }

    CycleSummary { planned, succeeded, failed, users_synced, users_deleted }
}

struct UserOutcome {
    email: String,
    public_key: String,
    action: JobAction,
    all_ok: bool,
}

enum Settled {
    FlagCleared,
    Deleted,
    /// The record changed under us mid-cycle; leave it for replanning.
    LeftDirty,
}

/// Persist the outcome for one fully-successful user fan-out.
async fn settle_user(
    store: &Store,
    user_id: &Uuid,
    outcome: &UserOutcome,
) -> Result<Settled, StoreError> {
    let mut user = match store.find_user(user_id).await {
        Ok(user) => user,
        // Record vanished mid-cycle; nothing left to settle.
        Err(StoreError::UserNotFound) => return Ok(Settled::LeftDirty),
        Err(e) => return Err(e),
    };

    if user.pending_delete && outcome.action == JobAction::Remove {
        store.delete_user(user_id).await?;
        tracing::info!(user = %outcome.email, "key removed fleet-wide, record deleted");
        return Ok(Settled::Deleted);
    }

    // Administrative intent can flip while the batch is in flight
    // (revoke, delete, un-revoke). If the record's desired action no
    // longer matches what this cycle executed, the flag must stay set
    // so the new intent fans out next tick.
    let wants_remove = user.is_key_revoked || user.pending_delete;
    let stale_action = match outcome.action {
        JobAction::Push => wants_remove,
        JobAction::Remove => !wants_remove,
    };
    if stale_action {
        tracing::debug!(user = %outcome.email, "desired action changed mid-cycle, leaving redistribution flag set");
        return Ok(Settled::LeftDirty);
    }

    // A rotation mid-cycle means the pushed key is already stale; keep
    // the flag set so the fresh key fans out next tick.
    if outcome.action == JobAction::Push && user.public_key != outcome.public_key {
        tracing::debug!(user = %outcome.email, "key rotated mid-cycle, leaving redistribution flag set");
        return Ok(Settled::LeftDirty);
    }

    user.needs_redistribution = false;
    store.save_user(user).await?;
    tracing::info!(user = %outcome.email, action = ?outcome.action, "distribution confirmed fleet-wide");
    Ok(Settled::FlagCleared)
}

/// Run one job to completion, retrying with exponential backoff.
///
/// On success `last_error` is `None`; after exhausted retries it holds
/// the final error.
async fn run_job<C: KeyChannel>(channel: &C, job: &mut DistributionJob, retry: &RetryPolicy) {
    let mut backoff = retry.initial_backoff;
    for attempt in 0..=retry.max_retries {
        job.attempts = attempt + 1;
        let result = match job.action {
            JobAction::Push => channel.push_key(&job.server_ip, &job.public_key).await,
            JobAction::Remove => channel.remove_key(&job.server_ip, &job.public_key).await,
        };
        match result {
            Ok(()) => {
                job.last_error = None;
                return;
            }
            Err(e) => {
                if attempt == retry.max_retries {
                    tracing::warn!(
                        user = %job.email,
                        server = %job.server_ip,
                        action = ?job.action,
                        attempts = job.attempts,
                        err = %e,
                        "distribution job failed after retries"
                    );
                    job.last_error = Some(e.to_string());
                    return;
                }
                tracing::debug!(
                    user = %job.email,
                    server = %job.server_ip,
                    attempt,
                    err = %e,
                    "distribution job failed, retrying"
                );
                tokio::time::sleep(backoff).await;
                backoff = (backoff * 2).min(retry.max_backoff);
            }
        }
    }
}

#[cfg(test)]
#[path = "distribute_tests.rs"]
mod tests;
