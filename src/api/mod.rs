// src/api/mod.rs

//! HTTP surface: current records, notification history and a live stream.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::stream;
use serde::Serialize;

use crate::error::Result;
use crate::models::{InjuryNotification, InjuryRecord, ServerConfig};
use crate::pipeline::InjuryService;
use crate::services::ReportSource;

struct ApiState<S> {
    service: Arc<InjuryService<S>>,
    heartbeat: Duration,
}

impl<S> Clone for ApiState<S> {
    fn clone(&self) -> Self {
        Self {
            service: Arc::clone(&self.service),
            heartbeat: self.heartbeat,
        }
    }
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    records: usize,
    subscribers: usize,
}

/// Build the router over a shared service.
pub fn router<S: ReportSource + 'static>(service: Arc<InjuryService<S>>, heartbeat: Duration) -> Router {
    let state = ApiState { service, heartbeat };

    Router::new()
        .route("/health", get(health::<S>))
        .route("/injuries", get(list_injuries::<S>))
        .route("/injuries/notifications", get(list_notifications::<S>))
        .route("/injuries/stream", get(stream_notifications::<S>))
        .route("/injuries/test-notification", post(send_test_notification::<S>))
        .with_state(state)
}

/// Bind and serve until Ctrl-C.
pub async fn serve<S: ReportSource + 'static>(
    service: Arc<InjuryService<S>>,
    config: &ServerConfig,
) -> Result<()> {
    let app = router(service, Duration::from_secs(config.heartbeat_secs));
    let listener = tokio::net::TcpListener::bind(&config.bind).await?;
    log::info!("Listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    log::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}

async fn health<S: ReportSource + 'static>(State(state): State<ApiState<S>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        records: state.service.record_count().await,
        subscribers: state.service.subscriber_count(),
    })
}

async fn list_injuries<S: ReportSource + 'static>(
    State(state): State<ApiState<S>>,
) -> Json<Vec<InjuryRecord>> {
    Json(state.service.records().await)
}

async fn list_notifications<S: ReportSource + 'static>(
    State(state): State<ApiState<S>>,
) -> Json<Vec<InjuryNotification>> {
    Json(state.service.history().await)
}

async fn send_test_notification<S: ReportSource + 'static>(
    State(state): State<ApiState<S>>,
) -> Json<InjuryNotification> {
    let notification = state.service.test_notification().await;
    log::info!("Sent test notification for {}", notification.key());
    Json(notification)
}

/// One `data:` event per notification; the subscription ends with the connection.
async fn stream_notifications<S: ReportSource + 'static>(
    State(state): State<ApiState<S>>,
) -> impl IntoResponse {
    let subscription = state.service.subscribe();
    log::info!("Stream client {} connected", subscription.id());

    let events = stream::unfold(subscription, |mut subscription| async move {
        let notification = subscription.recv().await?;
        let event = Event::default().json_data(&notification).unwrap_or_else(|e| {
            log::warn!("Could not encode notification: {}", e);
            Event::default().comment("encoding error")
        });
        Some((Ok::<_, Infallible>(event), subscription))
    });

    let sse = Sse::new(events).keep_alive(KeepAlive::new().interval(state.heartbeat));
    // Reverse proxies must not buffer the stream.
    ([("X-Accel-Buffering", "no")], sse)
}
