//! Scheduled jobs against static funding sources
//!
//! Run with: cargo test -p fundcore --test scheduler_test

mod common;

use common::{market_with, temp_pool, StaticSource};
use fundcore::scheduler::{periodic_job, threshold_job, JobTiming, NotificationKind, UserJobs};
use fundcore::storage::{ensure_user, get_connection, set_active, set_threshold, set_volume_filter, toggle_spot_filter};
use fundcore::{DbPool, Exchange, MarketService};
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::Duration;
use wiremock::MockServer;

fn sources() -> Vec<Arc<StaticSource>> {
    vec![
        StaticSource::with(
            Exchange::Bybit,
            &[
                ("BTC/USDT:USDT", 0.01, 5_000_000.0),
                ("HOT/USDT:USDT", 0.35, 2_000_000.0),
                ("THIN/USDT:USDT", -0.8, 10.0),
            ],
        ),
        StaticSource::with(Exchange::Okx, &[("COLD/USDT:USDT", -0.25, 3_000_000.0)]),
    ]
}

/// A user with alerts on and the spot filter off, so no spot lookups happen.
fn add_user(pool: &DbPool, user_id: i64) {
    let conn = get_connection(pool).unwrap();
    ensure_user(&conn, user_id).unwrap();
    toggle_spot_filter(&conn, user_id).unwrap();
}

async fn setup() -> (tempfile::TempDir, Arc<DbPool>, Arc<MarketService>, MockServer) {
    let server = MockServer::start().await;
    let (dir, pool) = temp_pool();
    let market = Arc::new(market_with(sources(), &server.uri()));
    (dir, pool, market, server)
}

#[tokio::test]
async fn test_periodic_job_builds_top5_report() {
    let (_dir, pool, market, _server) = setup().await;
    add_user(&pool, 10);

    let notifications = periodic_job(&pool, &market, 10).await.unwrap();

    assert_eq!(notifications.len(), 1);
    let report = &notifications[0];
    assert_eq!(report.chat_id, 10);
    assert_eq!(report.kind, NotificationKind::Report);
    assert!(report.text.contains("BYBIT 양수 펀비 TOP5"));
    assert!(report.text.contains("• HOT: +0.350%"));
    assert!(report.text.contains("• COLD: -0.250%"));
}

#[tokio::test]
async fn test_threshold_job_applies_threshold_and_volume() {
    let (_dir, pool, market, _server) = setup().await;
    add_user(&pool, 11);
    {
        let conn = get_connection(&pool).unwrap();
        set_threshold(&conn, 11, 0.2).unwrap();
        set_volume_filter(&conn, 11, 1_000_000.0).unwrap();
    }

    let notifications = threshold_job(&pool, &market, 11, 0).await.unwrap();

    assert_eq!(notifications.len(), 1);
    let text = &notifications[0].text;
    assert_eq!(notifications[0].kind, NotificationKind::Alert);
    assert!(text.contains("[BYBIT] HOT"));
    assert!(text.contains("[OKX] COLD"));
    // Below the volume filter
    assert!(!text.contains("THIN"));
    // Below the threshold
    assert!(!text.contains("BTC"));
}

#[tokio::test]
async fn test_threshold_job_without_hits_is_silent() {
    let (_dir, pool, market, _server) = setup().await;
    add_user(&pool, 12);
    {
        let conn = get_connection(&pool).unwrap();
        set_threshold(&conn, 12, 5.0).unwrap();
    }

    assert!(threshold_job(&pool, &market, 12, 0).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_inactive_user_gets_nothing() {
    let (_dir, pool, market, _server) = setup().await;
    add_user(&pool, 13);
    {
        let conn = get_connection(&pool).unwrap();
        set_active(&conn, 13, false).unwrap();
    }

    assert!(periodic_job(&pool, &market, 13).await.unwrap().is_empty());
    assert!(threshold_job(&pool, &market, 13, 0).await.unwrap().is_empty());
}

fn fast_timing() -> JobTiming {
    JobTiming {
        periodic_first: Duration::from_millis(10),
        periodic_every: Duration::from_secs(3600),
        threshold_first: Duration::from_millis(300),
        threshold_every: Duration::from_secs(3600),
    }
}

#[tokio::test]
async fn test_scheduled_jobs_emit_notifications() {
    let (_dir, pool, market, _server) = setup().await;
    add_user(&pool, 20);

    let (jobs, mut rx) = UserJobs::new(Arc::clone(&pool), market);
    let jobs = jobs.with_timing(fast_timing());
    jobs.schedule(20);

    let mut kinds = Vec::new();
    for _ in 0..2 {
        let notification = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for a notification")
            .expect("channel closed");
        assert_eq!(notification.chat_id, 20);
        kinds.push(notification.kind);
    }
    assert_eq!(kinds, vec![NotificationKind::Report, NotificationKind::Alert]);
}

#[tokio::test]
async fn test_schedule_replaces_and_unschedule_stops() {
    let (_dir, pool, market, _server) = setup().await;
    let (jobs, _rx) = UserJobs::new(Arc::clone(&pool), market);

    jobs.schedule(30);
    jobs.schedule(30);
    assert_eq!(jobs.scheduled_users(), 1);
    assert!(jobs.is_scheduled(30));

    assert!(jobs.unschedule(30));
    assert!(!jobs.unschedule(30));
    assert!(!jobs.is_scheduled(30));
}

#[tokio::test]
async fn test_restore_all_schedules_active_users() {
    let (_dir, pool, market, _server) = setup().await;
    for user_id in [1, 2, 3] {
        add_user(&pool, user_id);
    }
    {
        let conn = get_connection(&pool).unwrap();
        set_active(&conn, 2, false).unwrap();
    }

    let (jobs, _rx) = UserJobs::new(Arc::clone(&pool), market);

    assert_eq!(jobs.restore_all().unwrap(), 2);
    assert!(jobs.is_scheduled(1));
    assert!(!jobs.is_scheduled(2));
    assert!(jobs.is_scheduled(3));
}
