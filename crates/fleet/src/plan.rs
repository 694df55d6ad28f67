// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Reconciliation planner: computes the distribution jobs one cycle needs.
//!
//! Jobs are derived state, recomputed fresh from a snapshot of users and
//! servers every cycle and never persisted; a crashed cycle simply
//! replans on the next tick.

use uuid::Uuid;

use crate::store::{ProxyServer, User};

/// What a job does to the target server's key file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobAction {
    /// Append the user's current public key.
    Push,
    /// Remove any entry matching the user's public key.
    Remove,
}

/// One unit of work: one user delta against one proxy server.
#[derive(Debug, Clone)]
pub struct DistributionJob {
    pub action: JobAction,
    pub user_id: Uuid,
    pub email: String,
    pub public_key: String,
    pub server_id: Uuid,
    pub server_ip: String,
    pub attempts: u32,
    pub last_error: Option<String>,
}

/// Plan the full job list for one cycle.
///
/// Users not marked for redistribution are skipped (in sync everywhere
/// by the invariant a prior successful cycle established). Revoked and
/// pending-delete users fan out as Remove, everyone else as Push, one
/// job per registered server. Jobs carry no ordering requirements
/// across users or servers.
pub fn plan_cycle(users: &[User], servers: &[ProxyServer]) -> Vec<DistributionJob> {
    let mut jobs = Vec::new();

    for user in users {
        if !user.needs_redistribution {
            continue;
        }
        if user.public_key.is_empty() {
            // Pre-generation record; nothing to push or remove yet.
            tracing::warn!(user = %user.email, "user marked for redistribution has no public key, skipping");
            continue;
        }

        let action = if user.is_key_revoked || user.pending_delete {
            JobAction::Remove
        } else {
            JobAction::Push
        };

        for server in servers {
            jobs.push(DistributionJob {
                action,
                user_id: user.id,
                email: user.email.clone(),
                public_key: user.public_key.clone(),
                server_id: server.id,
                server_ip: server.ip_address.clone(),
                attempts: 0,
                last_error: None,
            });
        }
    }

    jobs
}

#[cfg(test)]
#[path = "plan_tests.rs"]
mod tests;
