use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::routing::{get, post};
use axum::Router;
use chrono::{Duration, Local};
use tower::ServiceExt;

use slotkeeper::config::AppConfig;
use slotkeeper::db;
use slotkeeper::handlers;
use slotkeeper::services::context_store::{ContextStore, SqliteContextPersistence};
use slotkeeper::services::executor::ActionExecutor;
use slotkeeper::services::nlu::{ExtractionStrategy, IntentExtractor};
use slotkeeper::services::pipeline::Assistant;
use slotkeeper::services::planner::DecisionPlanner;
use slotkeeper::services::slots::SlotStore;
use slotkeeper::services::system::{OpenTarget, SystemBridge};
use slotkeeper::state::AppState;

// ── Mock Bridge ──

struct MockBridge {
    opened: Arc<Mutex<Vec<OpenTarget>>>,
}

#[async_trait]
impl SystemBridge for MockBridge {
    async fn open(&self, target: &OpenTarget) -> anyhow::Result<()> {
        self.opened.lock().unwrap().push(target.clone());
        Ok(())
    }

    async fn notify(&self, _title: &str, _message: &str) -> anyhow::Result<()> {
        Ok(())
    }
}

// ── Helpers ──

fn test_config(artifacts_dir: &str) -> AppConfig {
    AppConfig {
        port: 3000,
        database_url: ":memory:".to_string(),
        artifacts_dir: artifacts_dir.to_string(),
        slot_start: "09:00".to_string(),
        slot_count: Some(6),
        slot_end: "17:00".to_string(),
        slot_minutes: 30,
        extraction_strategy: ExtractionStrategy::Rules,
        context_retention_hours: 0,
    }
}

struct TestEnv {
    state: Arc<AppState>,
    opened: Arc<Mutex<Vec<OpenTarget>>>,
    _artifacts: tempfile::TempDir,
}

fn test_env() -> TestEnv {
    let artifacts = tempfile::tempdir().unwrap();
    let config = test_config(&artifacts.path().display().to_string());
    let db = Arc::new(Mutex::new(db::init_db(":memory:").unwrap()));

    let slots = SlotStore::open(db.clone(), &config.seed_slot_config()).unwrap();
    let contexts = Arc::new(ContextStore::new(
        Arc::new(SqliteContextPersistence::new(db)),
        config.context_retention(),
    ));
    let opened = Arc::new(Mutex::new(vec![]));
    let bridge = MockBridge {
        opened: Arc::clone(&opened),
    };
    let executor = ActionExecutor::new(slots.clone(), Arc::new(bridge), &config.artifacts_dir);
    let assistant = Assistant::new(
        IntentExtractor::new(config.extraction_strategy),
        DecisionPlanner::new(contexts),
        executor,
    );

    TestEnv {
        state: Arc::new(AppState { slots, assistant }),
        opened,
        _artifacts: artifacts,
    }
}

fn test_app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(handlers::health::health))
        .route("/api/process", post(handlers::assistant::process))
        .route("/api/confirm", post(handlers::assistant::confirm))
        .route(
            "/api/context/:user_id",
            get(handlers::assistant::get_context).delete(handlers::assistant::clear_context),
        )
        .route("/api/slots", get(handlers::slots::list_slots))
        .route("/api/bookings", get(handlers::slots::list_bookings))
        .route("/api/book", post(handlers::slots::book))
        .with_state(state)
}

fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("Content-Type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn send(state: &Arc<AppState>, req: Request<Body>) -> (StatusCode, serde_json::Value) {
    let res = test_app(state.clone()).oneshot(req).await.unwrap();
    let status = res.status();
    let body = axum::body::to_bytes(res.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null);
    (status, json)
}

fn tomorrow() -> String {
    (Local::now().date_naive() + Duration::days(1)).to_string()
}

// ── Health ──

#[tokio::test]
async fn test_health() {
    let env = test_env();
    let res = test_app(env.state)
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body = axum::body::to_bytes(res.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(&body[..], b"ok");
}

// ── Conversation Flow ──

#[tokio::test]
async fn test_book_then_confirm() {
    let env = test_env();
    let date = tomorrow();

    let (status, json) = send(
        &env.state,
        json_request(
            "POST",
            "/api/process",
            serde_json::json!({"user_id": "alice", "text": "book a slot tomorrow at 11:00"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["intent_name"], "book");
    assert_eq!(json["entities"]["time"], "11:00");
    assert_eq!(json["entities"]["date"], date.as_str());
    assert_eq!(json["proposed_actions"][0]["name"], "book_slot");
    assert_eq!(json["proposed_actions"][0]["requires_confirmation"], true);
    assert!(json["reply_text"].as_str().unwrap().contains("11:00"));

    let (_, json) = send(
        &env.state,
        json_request(
            "POST",
            "/api/confirm",
            serde_json::json!({"user_id": "alice", "action": "book_slot", "confirmed": true}),
        ),
    )
    .await;
    assert_eq!(json["message"], "Confirmed! Executing book_slot.");
    assert_eq!(json["executed_result"]["success"], true);
    assert_eq!(json["executed_result"]["files_created"].as_array().unwrap().len(), 1);

    let (_, json) = send(
        &env.state,
        Request::builder()
            .uri(format!("/api/slots?date={date}"))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    let available: Vec<&str> = json["available_slots"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|v| v.as_str())
        .collect();
    assert_eq!(available, vec!["09:00", "09:30", "10:00", "10:30", "11:30"]);
}

#[tokio::test]
async fn test_confirm_without_pending_action() {
    let env = test_env();
    let (status, json) = send(
        &env.state,
        json_request(
            "POST",
            "/api/confirm",
            serde_json::json!({"user_id": "nobody", "action": "book_slot", "confirmed": true}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["message"], "I don't have any pending actions for you.");
    assert!(json.get("executed_result").is_none());
}

#[tokio::test]
async fn test_empty_text() {
    let env = test_env();
    let (_, json) = send(
        &env.state,
        json_request("POST", "/api/process", serde_json::json!({"text": ""})),
    )
    .await;
    assert_eq!(json["reply_text"], "Please say something.");
    assert_eq!(json["intent_name"], "unknown");
    assert_eq!(json["proposed_actions"], serde_json::json!([]));
}

#[tokio::test]
async fn test_destructive_command_is_refused() {
    let env = test_env();
    send(
        &env.state,
        json_request(
            "POST",
            "/api/process",
            serde_json::json!({"user_id": "root", "text": "please restart the machine"}),
        ),
    )
    .await;

    let (_, json) = send(
        &env.state,
        json_request(
            "POST",
            "/api/confirm",
            serde_json::json!({"user_id": "root", "action": "system_control", "confirmed": true}),
        ),
    )
    .await;
    assert_eq!(json["executed_result"]["success"], true);
    assert!(json["executed_result"]["message"]
        .as_str()
        .unwrap()
        .contains("can't execute restart"));
    assert!(env.opened.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_open_calculator_goes_through_bridge() {
    let env = test_env();
    send(
        &env.state,
        json_request(
            "POST",
            "/api/process",
            serde_json::json!({"user_id": "u", "text": "open calculator"}),
        ),
    )
    .await;
    let (_, json) = send(
        &env.state,
        json_request(
            "POST",
            "/api/confirm",
            serde_json::json!({"user_id": "u", "action": "system_open", "confirmed": true}),
        ),
    )
    .await;
    assert_eq!(json["executed_result"]["success"], true);
    assert_eq!(env.opened.lock().unwrap().as_slice(), &[OpenTarget::Calculator]);
}

// ── Context ──

#[tokio::test]
async fn test_context_snapshot_and_clear() {
    let env = test_env();
    send(
        &env.state,
        json_request(
            "POST",
            "/api/process",
            serde_json::json!({"user_id": "carol", "text": "hello"}),
        ),
    )
    .await;

    let (status, json) = send(
        &env.state,
        Request::builder()
            .uri("/api/context/carol")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["current_intent"], "greet");
    assert_eq!(json["history"].as_array().unwrap().len(), 1);

    let (_, json) = send(
        &env.state,
        Request::builder()
            .method("DELETE")
            .uri("/api/context/carol")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(json["cleared"], true);

    let (status, _) = send(
        &env.state,
        Request::builder()
            .uri("/api/context/carol")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// ── Direct Booking Surface ──

#[tokio::test]
async fn test_direct_booking() {
    let env = test_env();
    let (status, json) = send(
        &env.state,
        json_request(
            "POST",
            "/api/book",
            serde_json::json!({"date": "2030-03-04", "time": "9:30"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["success"], true);
    assert_eq!(json["booking"]["booking_id"], "2030-03-04_0930");
    assert!(json["ics"].as_str().unwrap().contains("DTSTART:20300304T093000"));

    let (_, json) = send(
        &env.state,
        json_request(
            "POST",
            "/api/book",
            serde_json::json!({"date": "2030-03-04", "time": "09:30"}),
        ),
    )
    .await;
    assert_eq!(json["success"], false);
    assert_eq!(json["message"], "Slot 09:30 is not available on 2030-03-04");

    let (_, json) = send(
        &env.state,
        Request::builder()
            .uri("/api/bookings?date=2030-03-04")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(json["bookings"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_direct_booking_requires_time() {
    let env = test_env();
    let (status, json) = send(
        &env.state,
        json_request("POST", "/api/book", serde_json::json!({"date": "2030-03-04"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].as_str().unwrap().contains("time is required"));
}

#[tokio::test]
async fn test_invalid_date_rejected() {
    let env = test_env();
    let (status, _) = send(
        &env.state,
        Request::builder()
            .uri("/api/slots?date=tomorrowish")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
