// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end lifecycle tests: administrative operations driving
//! reconciliation cycles against a mock fleet channel.

use std::sync::Arc;
use std::time::Duration;

use keyfleet::distribute::{CycleOptions, RetryPolicy};
use keyfleet::invite;
use keyfleet::keypair;
use keyfleet::plan::JobAction;
use keyfleet::scheduler::Scheduler;
use keyfleet::store::Store;
use keyfleet::admin;
use keyfleet::test_support::MockChannel;

fn fast_opts() -> CycleOptions {
    CycleOptions {
        max_concurrent_servers: 8,
        retry: RetryPolicy {
            max_retries: 1,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(2),
        },
    }
}

fn fixture() -> (Arc<Store>, Arc<MockChannel>, Arc<Scheduler<MockChannel>>) {
    let store = Arc::new(Store::new());
    let channel = Arc::new(MockChannel::new());
    let scheduler = Scheduler::new(Arc::clone(&store), Arc::clone(&channel), fast_opts());
    (store, channel, scheduler)
}

async fn run_cycle(scheduler: &Scheduler<MockChannel>) -> anyhow::Result<keyfleet::distribute::CycleSummary> {
    scheduler.run_cycle().await.ok_or_else(|| anyhow::anyhow!("tick dropped"))
}

#[tokio::test]
async fn new_user_reaches_every_server_then_stays_quiet() -> anyhow::Result<()> {
    let (store, channel, scheduler) = fixture();
    admin::add_server(&store, "10.0.0.1", None).await?;
    admin::add_server(&store, "10.0.0.2", Some("eu-west".to_owned())).await?;
    let user = admin::add_user(&store, "Alice", "alice@example.com", None).await?;

    let summary = run_cycle(&scheduler).await?;
    assert_eq!(summary.planned, 2);
    assert_eq!(summary.users_synced, 1);

    let calls = channel.calls();
    assert_eq!(calls.len(), 2);
    assert!(calls.iter().all(|c| c.action == JobAction::Push && c.public_key == user.public_key));

    // Nothing changed: the next cycle plans no work at all.
    let summary = run_cycle(&scheduler).await?;
    assert_eq!(summary.planned, 0);
    assert_eq!(channel.calls().len(), 2);
    Ok(())
}

#[tokio::test]
async fn rotation_fans_out_the_new_key_only() -> anyhow::Result<()> {
    let (store, channel, scheduler) = fixture();
    admin::add_server(&store, "10.0.0.1", None).await?;
    let user = admin::add_user(&store, "Alice", "alice@example.com", None).await?;
    run_cycle(&scheduler).await?;
    let old_key = user.public_key.clone();

    let rotated = keypair::rotate_key_pair(&store, &user.id).await?;
    assert_ne!(rotated.public_key, old_key);

    let summary = run_cycle(&scheduler).await?;
    assert_eq!(summary.planned, 1);

    let pushes: Vec<_> = channel
        .calls()
        .into_iter()
        .skip(1) // initial distribution of the old key
        .collect();
    assert_eq!(pushes.len(), 1);
    assert_eq!(pushes[0].public_key, rotated.public_key);
    assert!(!store.find_user(&user.id).await?.needs_redistribution);
    Ok(())
}

#[tokio::test]
async fn revocation_removes_the_key_fleet_wide() -> anyhow::Result<()> {
    let (store, channel, scheduler) = fixture();
    admin::add_server(&store, "10.0.0.1", None).await?;
    admin::add_server(&store, "10.0.0.2", None).await?;
    let user = admin::add_user(&store, "Alice", "alice@example.com", None).await?;
    run_cycle(&scheduler).await?;

    admin::toggle_revoked(&store, &user.id).await?;
    let summary = run_cycle(&scheduler).await?;
    assert_eq!(summary.planned, 2);

    let removes: Vec<_> =
        channel.calls().into_iter().filter(|c| c.action == JobAction::Remove).collect();
    assert_eq!(removes.len(), 2);

    // The record survives revocation; only the fleet state changed.
    let settled = store.find_user(&user.id).await?;
    assert!(settled.is_key_revoked);
    assert!(!settled.needs_redistribution);
    Ok(())
}

#[tokio::test]
async fn deletion_completes_only_after_removal_succeeds() -> anyhow::Result<()> {
    let (store, channel, scheduler) = fixture();
    admin::add_server(&store, "10.0.0.1", None).await?;
    admin::add_server(&store, "10.0.0.2", None).await?;
    let user = admin::add_user(&store, "Alice", "alice@example.com", None).await?;
    run_cycle(&scheduler).await?;

    admin::delete_user(&store, &user.id).await?;
    assert!(store.find_user(&user.id).await.is_ok());

    // First removal attempt: one server is down, record must survive.
    channel.fail_always("10.0.0.2");
    let summary = run_cycle(&scheduler).await?;
    assert_eq!(summary.users_deleted, 0);
    assert!(store.find_user(&user.id).await.is_ok());

    // Server recovers; the next full fan-out finishes the deletion.
    channel.fail_times("10.0.0.2", 0);
    let summary = run_cycle(&scheduler).await?;
    assert_eq!(summary.users_deleted, 1);
    assert!(store.find_user(&user.id).await.is_err());
    Ok(())
}

#[tokio::test]
async fn partial_failure_retries_the_whole_fan_out() -> anyhow::Result<()> {
    let (store, channel, scheduler) = fixture();
    admin::add_server(&store, "10.0.0.1", None).await?;
    admin::add_server(&store, "10.0.0.2", None).await?;
    admin::add_user(&store, "Alice", "alice@example.com", None).await?;

    channel.fail_always("10.0.0.2");
    let summary = run_cycle(&scheduler).await?;
    assert_eq!(summary.succeeded, 1);
    assert_eq!(summary.users_synced, 0);

    // Recovery: the retry targets both servers, including the one that
    // already succeeded.
    channel.fail_times("10.0.0.2", 0);
    let calls_before = channel.calls().len();
    let summary = run_cycle(&scheduler).await?;
    assert_eq!(summary.planned, 2);
    assert_eq!(summary.users_synced, 1);
    assert_eq!(channel.calls().len(), calls_before + 2);
    Ok(())
}

#[tokio::test]
async fn server_added_later_picks_up_pending_users() -> anyhow::Result<()> {
    let (store, channel, scheduler) = fixture();
    let user = admin::add_user(&store, "Alice", "alice@example.com", None).await?;

    // No fleet yet: nothing planned, flag stays set, no error.
    let summary = run_cycle(&scheduler).await?;
    assert_eq!(summary.planned, 0);
    assert!(store.find_user(&user.id).await?.needs_redistribution);

    admin::add_server(&store, "10.0.0.1", None).await?;
    let summary = run_cycle(&scheduler).await?;
    assert_eq!(summary.planned, 1);
    assert!(!store.find_user(&user.id).await?.needs_redistribution);
    assert_eq!(channel.calls().len(), 1);
    Ok(())
}

#[tokio::test]
async fn invite_decodes_to_live_credential_data() -> anyhow::Result<()> {
    let (store, _channel, _scheduler) = fixture();
    admin::add_server(&store, "178.62.123.172", None).await?;
    let user = admin::add_user(&store, "Alice", "alice@example.com", None).await?;

    let url = admin::get_invite_url(&store, &user.id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("expected invite"))?;
    let token = url
        .strip_prefix(invite::INVITE_URL_PREFIX)
        .ok_or_else(|| anyhow::anyhow!("unexpected prefix"))?;

    let decoded = invite::decode_invite_code(token)?;
    assert_eq!(decoded.network_data.host, "178.62.123.172");
    assert_eq!(decoded.network_data.principal, user.email);
    assert_eq!(decoded.network_data.secret, user.private_key);
    Ok(())
}

#[tokio::test]
async fn fan_out_respects_per_server_serialization() -> anyhow::Result<()> {
    let (store, channel, scheduler) = fixture();
    for i in 1..=3 {
        admin::add_server(&store, &format!("10.0.0.{i}"), None).await?;
    }
    for i in 0..4 {
        admin::add_user(&store, &format!("user{i}"), &format!("user{i}@example.com"), None).await?;
    }

    let summary = run_cycle(&scheduler).await?;
    assert_eq!(summary.planned, 12);
    assert!(!channel.saw_same_server_overlap());
    assert!(channel.max_concurrent() > 1);
    Ok(())
}

#[tokio::test]
async fn directory_import_feeds_the_next_cycle() -> anyhow::Result<()> {
    let (store, channel, scheduler) = fixture();
    admin::add_server(&store, "10.0.0.1", None).await?;

    let body = serde_json::json!({
        "users": [
            { "name": { "fullName": "Alice A" }, "primaryEmail": "alice@example.com" },
            { "name": { "fullName": "Bob B" }, "primaryEmail": "bob@example.com" },
            { "bogus": true },
        ]
    });
    let entries = keyfleet::directory::parse_directory_users(&body);
    let added = admin::import_directory_users(&store, &entries, Some("example.com")).await?;
    assert_eq!(added.len(), 2);

    let summary = run_cycle(&scheduler).await?;
    assert_eq!(summary.planned, 2);
    assert_eq!(summary.users_synced, 2);
    assert_eq!(channel.calls().len(), 2);
    Ok(())
}
