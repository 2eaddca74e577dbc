use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use slotkeeper::config::AppConfig;
use slotkeeper::db;
use slotkeeper::handlers;
use slotkeeper::services::context_store::{ContextStore, SqliteContextPersistence};
use slotkeeper::services::executor::ActionExecutor;
use slotkeeper::services::nlu::IntentExtractor;
use slotkeeper::services::pipeline::Assistant;
use slotkeeper::services::planner::DecisionPlanner;
use slotkeeper::services::slots::SlotStore;
use slotkeeper::services::system::desktop::DesktopBridge;
use slotkeeper::state::AppState;

const RETENTION_SWEEP_INTERVAL: Duration = Duration::from_secs(60 * 60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = AppConfig::from_env();

    let conn = db::init_db(&config.database_url)?;
    let db = Arc::new(Mutex::new(conn));

    let slots = SlotStore::open(db.clone(), &config.seed_slot_config())?;

    let contexts = Arc::new(ContextStore::new(
        Arc::new(SqliteContextPersistence::new(db.clone())),
        config.context_retention(),
    ));
    contexts.load()?;

    if config.context_retention().is_some() {
        let contexts = contexts.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(RETENTION_SWEEP_INTERVAL);
            interval.tick().await;
            loop {
                interval.tick().await;
                if let Err(e) = contexts.evict_idle() {
                    tracing::warn!(error = %e, "context retention sweep failed");
                }
            }
        });
    }

    tracing::info!(
        strategy = ?config.extraction_strategy,
        artifacts = %config.artifacts_dir,
        "pipeline ready"
    );
    let executor = ActionExecutor::new(
        slots.clone(),
        Arc::new(DesktopBridge::new()),
        &config.artifacts_dir,
    );
    let assistant = Assistant::new(
        IntentExtractor::new(config.extraction_strategy),
        DecisionPlanner::new(contexts),
        executor,
    );

    let state = Arc::new(AppState {
        slots,
        assistant,
    });

    let app = Router::new()
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
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("starting server on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
