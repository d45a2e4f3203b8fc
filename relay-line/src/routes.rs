//! HTTP routes for the relay.
//!
//! - `GET /`: endpoint banner
//! - `GET /health`, `GET /ready`: probes
//! - `POST /callback`: LINE webhook

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::line::{LineChannel, SIGNATURE_HEADER};
use crate::message::TextEvent;
use relay_common::Error;

// ============================================================================
// State
// ============================================================================

/// Shared state for the relay HTTP server.
pub struct RelayState {
    /// LINE channel (signature verification and payload parsing)
    pub line: Arc<LineChannel>,
    /// Queue feeding the relay processor
    pub event_tx: mpsc::Sender<TextEvent>,
}

// ============================================================================
// Response Types
// ============================================================================

#[derive(Debug, Serialize)]
struct IndexResponse {
    ok: bool,
    note: &'static str,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    service: &'static str,
    version: &'static str,
}

// ============================================================================
// Health Routes
// ============================================================================

async fn index() -> impl IntoResponse {
    Json(IndexResponse {
        ok: true,
        note: "LINE webhook endpoint",
    })
}

async fn health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy",
        service: "line-relay",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn ready(State(state): State<Arc<RelayState>>) -> impl IntoResponse {
    if state.event_tx.is_closed() {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(HealthResponse {
                status: "not_ready",
                service: "line-relay",
                version: env!("CARGO_PKG_VERSION"),
            }),
        );
    }

    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "ready",
            service: "line-relay",
            version: env!("CARGO_PKG_VERSION"),
        }),
    )
}

// ============================================================================
// LINE Webhook
// ============================================================================

/// Verify, parse, and enqueue one webhook delivery.
async fn accept_webhook(
    state: &RelayState,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<usize, Error> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    if !state.line.verify_signature(body, signature) {
        tracing::warn!(
            "LINE webhook signature verification failed (signature: {})",
            if signature.is_empty() { "missing" } else { "invalid" }
        );
        return Err(Error::SignatureInvalid);
    }

    let events = state.line.parse_webhook_payload(body)?;
    let count = events.len();

    for event in events {
        state
            .event_tx
            .send(event)
            .await
            .map_err(|e| Error::Internal(format!("Failed to forward event: {e}")))?;
    }

    Ok(count)
}

/// POST /callback: LINE webhook
async fn callback(
    State(state): State<Arc<RelayState>>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    match accept_webhook(&state, &headers, &body).await {
        Ok(count) => {
            tracing::debug!(events = count, "LINE webhook accepted");
            (StatusCode::OK, "OK")
        }
        Err(e) => {
            let status =
                StatusCode::from_u16(e.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            if e.is_signature_invalid() {
                return (status, "Invalid signature");
            }
            tracing::error!("LINE webhook handling failed: {}", e);
            (status, "Internal Server Error")
        }
    }
}

// ============================================================================
// Router Builder
// ============================================================================

/// Build the relay HTTP router.
pub fn build_router(state: Arc<RelayState>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/ready", get(ready))
        .route("/callback", post(callback))
        .with_state(state)
}

/// Create relay state with an event receiver.
pub fn create_state(line: Arc<LineChannel>) -> (Arc<RelayState>, mpsc::Receiver<TextEvent>) {
    let (tx, rx) = mpsc::channel(100);

    let state = Arc::new(RelayState { line, event_tx: tx });

    (state, rx)
}
