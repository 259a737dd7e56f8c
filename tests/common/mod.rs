use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, Response},
    Router,
};
use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use sea_orm_migration::MigratorTrait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tower::ServiceExt;

use storefront_api::{
    config::AppConfig, events::EventSender, handlers::AppServices, migrator::Migrator, AppState,
};

pub const TEST_GATEWAY_SECRET: &str = "storefront_test_gateway_secret";

/// Connects an in-memory SQLite database pinned to a single pooled
/// connection so the schema survives across queries.
pub async fn test_db() -> DatabaseConnection {
    let mut opt = ConnectOptions::new("sqlite::memory:".to_string());
    opt.max_connections(1)
        .min_connections(1)
        .idle_timeout(Duration::from_secs(3600))
        .sqlx_logging(false);
    let db = Database::connect(opt).await.expect("sqlite connect");
    Migrator::up(&db, None).await.expect("migrations");
    db
}

pub fn test_config() -> AppConfig {
    let mut cfg = AppConfig::for_tests();
    cfg.gateway_key_secret = Some(TEST_GATEWAY_SECRET.to_string());
    cfg
}

pub async fn test_state() -> AppState {
    test_state_with_config(test_config()).await
}

pub async fn test_state_with_config(cfg: AppConfig) -> AppState {
    let db = Arc::new(test_db().await);
    let (event_tx, mut event_rx) = mpsc::channel(64);
    // Drain events so senders never block.
    tokio::spawn(async move { while event_rx.recv().await.is_some() {} });
    let event_sender = EventSender::new(event_tx);
    let services = AppServices::new(db.clone(), &cfg, Arc::new(event_sender.clone()));
    AppState {
        db,
        config: cfg,
        event_sender,
        services,
    }
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .nest("/api/v1", storefront_api::api_v1_routes())
        .with_state(state)
}

pub async fn request(
    app: &Router,
    method: Method,
    uri: &str,
    body: Option<Value>,
    bearer: Option<&str>,
) -> Response<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = bearer {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    let request = match body {
        Some(json) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(serde_json::to_vec(&json).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    app.clone().oneshot(request).await.expect("request")
}

pub async fn response_json(response: Response<Body>) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("response body bytes");
    serde_json::from_slice(&bytes).expect("json response")
}
