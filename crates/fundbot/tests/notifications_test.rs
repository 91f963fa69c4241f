//! Notification delivery against a mocked Bot API
//!
//! Run with: cargo test -p fundbot --test notifications_test

use std::sync::Arc;
use std::time::Duration;

use fundbot::telegram::start_notification_dispatcher;
use fundcore::core::retry::RetryConfig;
use fundcore::market::http::HttpClient;
use fundcore::market::{Endpoints, SourceRegistry, SpotSymbolCache};
use fundcore::scheduler::{Notification, NotificationKind, UserJobs};
use fundcore::storage::{create_pool, ensure_user, get_connection, get_user_settings};
use fundcore::{DbPool, MarketService};
use serde_json::json;
use teloxide::Bot;
use tokio::sync::mpsc;
use wiremock::matchers::{method, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn bot_for(server: &MockServer) -> Bot {
    Bot::new("test_token_12345:ABCDEF").set_api_url(server.uri().parse().unwrap())
}

fn empty_market(server: &MockServer) -> Arc<MarketService> {
    let http = HttpClient::new().unwrap().with_retry(RetryConfig::none());
    let spot = SpotSymbolCache::new(http, Endpoints::with_rest_base(&server.uri()));
    Arc::new(MarketService::new(SourceRegistry::new(), spot))
}

fn setup(server: &MockServer) -> (tempfile::TempDir, Arc<DbPool>, Arc<UserJobs>) {
    let dir = tempfile::tempdir().unwrap();
    let pool = Arc::new(create_pool(dir.path().join("bot.db").to_str().unwrap()).unwrap());
    let (jobs, _rx) = UserJobs::new(Arc::clone(&pool), empty_market(server));
    (dir, pool, Arc::new(jobs))
}

fn sent_message(chat_id: i64) -> serde_json::Value {
    json!({"ok": true, "result": {
        "message_id": 1,
        "date": 0,
        "chat": {"id": chat_id, "type": "private", "first_name": "Test"},
        "text": "ok"
    }})
}

fn alert(chat_id: i64) -> Notification {
    Notification {
        chat_id,
        text: "🚨 <b>펀딩비 알림</b>\n\n<b>[OKX] BTC</b>".to_string(),
        kind: NotificationKind::Alert,
    }
}

async fn wait_until<F: Fn() -> bool>(condition: F) -> bool {
    for _ in 0..50 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    false
}

#[tokio::test]
async fn test_notifications_are_sent_as_html_without_previews() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path_regex(r"/sendMessage$"))
        .respond_with(ResponseTemplate::new(200).set_body_json(sent_message(42)))
        .mount(&server)
        .await;

    let (_dir, pool, jobs) = setup(&server);
    let (tx, rx) = mpsc::unbounded_channel();
    start_notification_dispatcher(bot_for(&server), pool, jobs, rx);

    tx.send(alert(42)).unwrap();

    let mut body = None;
    for _ in 0..50 {
        if let Some(request) = server.received_requests().await.unwrap_or_default().into_iter().next() {
            body = Some(serde_json::from_slice::<serde_json::Value>(&request.body).unwrap());
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    let body = body.expect("no sendMessage request");

    assert_eq!(body["chat_id"], json!(42));
    assert_eq!(body["parse_mode"], json!("HTML"));
    assert_eq!(body["link_preview_options"]["is_disabled"], json!(true));
    assert!(body["text"].as_str().unwrap().contains("[OKX] BTC"));
}

#[tokio::test]
async fn test_blocked_user_is_deactivated() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path_regex(r"/sendMessage$"))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({
            "ok": false,
            "error_code": 403,
            "description": "Forbidden: bot was blocked by the user"
        })))
        .mount(&server)
        .await;

    let (_dir, pool, jobs) = setup(&server);
    {
        let conn = get_connection(&pool).unwrap();
        ensure_user(&conn, 7).unwrap();
    }
    jobs.schedule(7);

    let (tx, rx) = mpsc::unbounded_channel();
    start_notification_dispatcher(bot_for(&server), Arc::clone(&pool), Arc::clone(&jobs), rx);
    tx.send(alert(7)).unwrap();

    let pool_check = Arc::clone(&pool);
    let deactivated = wait_until(move || {
        let conn = get_connection(&pool_check).unwrap();
        !get_user_settings(&conn, 7).unwrap().active
    })
    .await;

    assert!(deactivated, "user was not deactivated");
    assert!(!jobs.is_scheduled(7));
}

#[tokio::test]
async fn test_rate_limited_notification_is_resent() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path_regex(r"/sendMessage$"))
        .respond_with(ResponseTemplate::new(429).set_body_json(json!({
            "ok": false,
            "error_code": 429,
            "description": "Too Many Requests: retry after 1",
            "parameters": {"retry_after": 1}
        })))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path_regex(r"/sendMessage$"))
        .respond_with(ResponseTemplate::new(200).set_body_json(sent_message(9)))
        .mount(&server)
        .await;

    let (_dir, pool, jobs) = setup(&server);
    {
        let conn = get_connection(&pool).unwrap();
        ensure_user(&conn, 9).unwrap();
    }
    jobs.schedule(9);

    let (tx, rx) = mpsc::unbounded_channel();
    start_notification_dispatcher(bot_for(&server), Arc::clone(&pool), Arc::clone(&jobs), rx);
    tx.send(alert(9)).unwrap();

    let mut requests = Vec::new();
    for _ in 0..50 {
        requests = server.received_requests().await.unwrap_or_default();
        if requests.len() >= 2 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    assert_eq!(requests.len(), 2, "alert was not resent after the rate limit");
    let resent: serde_json::Value = serde_json::from_slice(&requests[1].body).unwrap();
    assert_eq!(resent["chat_id"], json!(9));
    assert!(resent["text"].as_str().unwrap().contains("[OKX] BTC"));

    let conn = get_connection(&pool).unwrap();
    assert!(get_user_settings(&conn, 9).unwrap().active);
    assert!(jobs.is_scheduled(9));
}
