/// Expiry sweeper tests: staleness reclamation, lock release, revocation,
/// idempotence, and the end-to-end portal scenario.
mod common;

use common::{count_with_status, test_context};
use econet_portal::{db::session::SessionStatus, error::PortalError, sweeper::Sweeper};
use std::sync::Arc;

const DEV_A: &str = "aa:aa:aa:aa:aa:01";
const DEV_B: &str = "bb:bb:bb:bb:bb:02";
const IP_A: &str = "10.0.0.1";
const IP_B: &str = "10.0.0.2";

#[tokio::test]
async fn sweep_expires_stale_awaiting_sessions() {
    let (ctx, clock) = test_context().await;
    ctx.sessions.find_or_create(DEV_A, Some(IP_A)).await.unwrap();

    // Just under the threshold: untouched.
    clock.advance(599);
    let report = Sweeper::run_pass(&ctx).await.unwrap();
    assert_eq!(report.total(), 0);

    clock.advance(2);
    let report = Sweeper::run_pass(&ctx).await.unwrap();
    assert_eq!(report.stale_awaiting, 1);
    assert_eq!(count_with_status(&ctx, "expired").await, 1);
}

#[tokio::test]
async fn sweep_reclaims_an_abandoned_insertion_lock() {
    let (ctx, clock) = test_context().await;
    let session = ctx.sessions.acquire(DEV_A, Some(IP_A)).await.unwrap();

    // The holder walks away; until the timeout the slot stays taken.
    clock.advance(179);
    let err = ctx.sessions.acquire(DEV_B, Some(IP_B)).await.unwrap_err();
    assert!(matches!(err, PortalError::Busy));

    clock.advance(2);
    let report = Sweeper::run_pass(&ctx).await.unwrap();
    assert_eq!(report.stale_inserting, 1);

    let expired = ctx.sessions.get(session.id).await.unwrap();
    assert_eq!(expired.status, SessionStatus::Expired);

    // Expiring the row frees the machine-wide lock.
    let other = ctx.sessions.acquire(DEV_B, Some(IP_B)).await.unwrap();
    assert_eq!(other.status, SessionStatus::Inserting);
}

#[tokio::test]
async fn sweep_expires_finished_active_sessions_and_revokes_access() {
    let (ctx, clock) = test_context().await;
    let session = ctx.sessions.acquire(DEV_A, Some(IP_A)).await.unwrap();
    ctx.sessions.credit(session.id, 1).await.unwrap();
    let active = ctx.sessions.activate(session.id).await.unwrap();
    assert!(ctx.access.is_allowed(IP_A));

    clock.set(active.session_end.unwrap() + 1);
    let report = Sweeper::run_pass(&ctx).await.unwrap();
    assert_eq!(report.finished_active, 1);
    assert!(!ctx.access.is_allowed(IP_A));

    let expired = ctx.sessions.get(session.id).await.unwrap();
    assert_eq!(expired.status, SessionStatus::Expired);
}

#[tokio::test]
async fn sweep_is_idempotent() {
    let (ctx, clock) = test_context().await;

    // One candidate per category.
    ctx.sessions
        .find_or_create("cc:cc:cc:cc:cc:03", Some("10.0.0.3"))
        .await
        .unwrap();
    let held = ctx.sessions.acquire(DEV_A, Some(IP_A)).await.unwrap();
    ctx.sessions.credit(held.id, 1).await.unwrap();
    ctx.sessions.release(DEV_A).await.unwrap();
    let abandoned = ctx.sessions.acquire(DEV_B, Some(IP_B)).await.unwrap();
    assert_eq!(abandoned.status, SessionStatus::Inserting);

    clock.advance(10_000);
    let first = Sweeper::run_pass(&ctx).await.unwrap();
    assert!(first.total() > 0);

    // Immediately repeating the sweep with no intervening writes moves
    // nothing.
    let second = Sweeper::run_pass(&ctx).await.unwrap();
    assert_eq!(second.total(), 0);
}

#[tokio::test]
async fn sweep_leaves_live_sessions_alone() {
    let (ctx, clock) = test_context().await;

    let active = ctx.sessions.acquire(DEV_A, Some(IP_A)).await.unwrap();
    ctx.sessions.credit(active.id, 10).await.unwrap();
    ctx.sessions.release(DEV_A).await.unwrap();
    let fresh = ctx.sessions.acquire(DEV_B, Some(IP_B)).await.unwrap();

    clock.advance(60);
    let report = Sweeper::run_pass(&ctx).await.unwrap();
    assert_eq!(report.total(), 0);
    assert_eq!(
        ctx.sessions.get(active.id).await.unwrap().status,
        SessionStatus::Active
    );
    assert_eq!(
        ctx.sessions.get(fresh.id).await.unwrap().status,
        SessionStatus::Inserting
    );
}

#[tokio::test]
async fn full_portal_scenario() {
    let (ctx, clock) = test_context().await;

    // Device A takes the slot; device B is refused.
    let s1 = ctx.sessions.acquire(DEV_A, Some(IP_A)).await.unwrap();
    assert_eq!(s1.status, SessionStatus::Inserting);
    let err = ctx.sessions.acquire(DEV_B, Some(IP_B)).await.unwrap_err();
    assert!(matches!(err, PortalError::Busy));

    // A deposits three bottles at 120 seconds each.
    let s1 = ctx.sessions.credit(s1.id, 3).await.unwrap();
    assert_eq!(s1.bottles_inserted, 3);
    assert_eq!(s1.seconds_earned, 360);

    // A activates and the window opens.
    let s1 = ctx.sessions.activate(s1.id).await.unwrap();
    assert_eq!(s1.status, SessionStatus::Active);
    assert_eq!(
        s1.session_end.unwrap(),
        s1.session_start.unwrap() + 360
    );
    assert!(ctx.access.is_allowed(IP_A));

    // A releases after activation: nothing held, silent success.
    assert!(ctx.sessions.release(DEV_A).await.unwrap().is_none());

    // Time passes the deadline; the sweep reclaims the session.
    clock.set(s1.session_end.unwrap() + 1);
    let report = Sweeper::run_pass(&ctx).await.unwrap();
    assert_eq!(report.finished_active, 1);
    assert!(!ctx.access.is_allowed(IP_A));

    // B can now take the slot with a brand-new session.
    let s2 = ctx.sessions.acquire(DEV_B, Some(IP_B)).await.unwrap();
    assert_ne!(s2.id, s1.id);
    assert_eq!(s2.status, SessionStatus::Inserting);
}

#[tokio::test]
async fn sweeper_loop_stops_deterministically() {
    let (ctx, _clock) = test_context().await;
    let handle = Sweeper::new(Arc::new(ctx)).start();
    handle.shutdown().await;
}
