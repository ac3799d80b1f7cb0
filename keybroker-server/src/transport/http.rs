//! HTTP/JSON surface of the broker.
//!
//! # API Endpoints
//!
//! ## GET /key/available
//!
//! Non-blocking reservation. Returns the reserved key, or a wait hint when
//! every key is cooling down:
//!
//! ```json
//! {"status": "ok", "key": {"subscriptionId": "sub_abc", "plan": "pro", ...}}
//! {"status": "wait", "waitMs": 170}
//! ```
//!
//! ## GET /key/available/queued
//!
//! Blocking reservation through the fair wait queue. Returns the same
//! success envelope, or `429 {"status": "wait", "waitMs": ...}` when the
//! wait timed out.
//!
//! ## GET /status
//!
//! Every key with its full metadata.
//!
//! ## GET /limits
//!
//! Limits-only projection of the same keys.
//!
//! ## POST /keys
//!
//! Register a key or update its plan. Body:
//! `{"subscriptionId": "sub_abc", "plan": "pro"}` (`id` is accepted as an
//! alias). Returns 201 on success, 400 on bad input.
//!
//! ## DELETE /keys/{id}
//!
//! Remove a key. Removing an absent key succeeds.
//!
//! ## GET /health
//!
//! Liveness check. Returns `{"status": "ok"}`.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use keybroker::{
    BrokerError, KeyRegistry, KeyStore, Registered, ReservationEngine, WaitQueue,
};

use crate::types::{
    ErrorResponse, MessageResponse, RegisterKeyRequest, ReservedResponse, WaitResponse,
};

/// Shared state behind every handler.
#[derive(Clone)]
pub struct AppState<S: KeyStore + Clone> {
    pub engine: Arc<ReservationEngine<S>>,
    pub registry: Arc<KeyRegistry<S>>,
    pub queue: WaitQueue,
    /// Wait hint surfaced when no key is free.
    pub wait_hint_ms: u64,
    /// Caller-side deadline for queued reservations.
    pub request_timeout: Option<Duration>,
}

/// HTTP transport implementation.
pub struct HttpTransport {
    addr: SocketAddr,
}

impl HttpTransport {
    pub fn new(host: &str, port: u16) -> Self {
        let addr = format!("{host}:{port}").parse().expect("Invalid address");
        Self { addr }
    }

    pub async fn start<S: KeyStore + Clone>(self, state: AppState<S>) -> anyhow::Result<()> {
        let app = router(state);

        tracing::info!("HTTP server listening on {}", self.addr);

        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        axum::serve(listener, app).await?;

        Ok(())
    }
}

pub fn router<S: KeyStore + Clone>(state: AppState<S>) -> Router {
    Router::new()
        .route("/key/available", get(available::<S>))
        .route("/key/available/queued", get(available_queued::<S>))
        .route("/status", get(status::<S>))
        .route("/limits", get(limits::<S>))
        .route("/keys", post(register_key::<S>))
        .route("/keys/{id}", delete(delete_key::<S>))
        .route("/health", get(health))
        .with_state(state)
}

pub async fn available<S: KeyStore + Clone>(State(state): State<AppState<S>>) -> Response {
    match state.engine.reserve().await {
        Ok(Some(reservation)) => {
            (StatusCode::OK, Json(ReservedResponse::new(reservation))).into_response()
        }
        Ok(None) => (StatusCode::OK, Json(WaitResponse::new(state.wait_hint_ms))).into_response(),
        Err(err) => internal_error(err),
    }
}

pub async fn available_queued<S: KeyStore + Clone>(
    State(state): State<AppState<S>>,
) -> Response {
    match state.queue.reserve_blocking(state.request_timeout).await {
        Ok(Some(reservation)) => {
            (StatusCode::OK, Json(ReservedResponse::new(reservation))).into_response()
        }
        Ok(None) => (
            StatusCode::TOO_MANY_REQUESTS,
            Json(WaitResponse::new(state.wait_hint_ms)),
        )
            .into_response(),
        Err(err) => internal_error(err),
    }
}

pub async fn status<S: KeyStore + Clone>(State(state): State<AppState<S>>) -> Response {
    match state.registry.list_status().await {
        Ok(keys) => (StatusCode::OK, Json(keys)).into_response(),
        Err(err) => internal_error(err),
    }
}

pub async fn limits<S: KeyStore + Clone>(State(state): State<AppState<S>>) -> Response {
    match state.registry.list_limits().await {
        Ok(keys) => (StatusCode::OK, Json(keys)).into_response(),
        Err(err) => internal_error(err),
    }
}

pub async fn register_key<S: KeyStore + Clone>(
    State(state): State<AppState<S>>,
    payload: Result<Json<RegisterKeyRequest>, JsonRejection>,
) -> Response {
    let Json(req) = match payload {
        Ok(payload) => payload,
        Err(rejection) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse {
                    error: rejection.body_text(),
                }),
            )
                .into_response();
        }
    };

    let subscription_id = req.subscription_id.unwrap_or_default();
    let plan = req.plan.unwrap_or_default();

    match state.registry.register(&subscription_id, &plan).await {
        Ok(registered) => {
            let message = match registered {
                Registered::Created => format!("key {subscription_id} registered"),
                Registered::Updated => format!("key {subscription_id} updated"),
            };
            (StatusCode::CREATED, Json(MessageResponse { message })).into_response()
        }
        Err(BrokerError::InvalidArgument(reason)) => {
            (StatusCode::BAD_REQUEST, Json(ErrorResponse { error: reason })).into_response()
        }
        Err(err) => internal_error(err),
    }
}

pub async fn delete_key<S: KeyStore + Clone>(
    State(state): State<AppState<S>>,
    Path(id): Path<String>,
) -> Response {
    match state.registry.delete(&id).await {
        Ok(removed) => {
            let message = if removed {
                format!("key {id} deleted")
            } else {
                format!("key {id} not found")
            };
            (StatusCode::OK, Json(MessageResponse { message })).into_response()
        }
        Err(BrokerError::InvalidArgument(reason)) => {
            (StatusCode::BAD_REQUEST, Json(ErrorResponse { error: reason })).into_response()
        }
        Err(err) => internal_error(err),
    }
}

pub async fn health() -> Response {
    (StatusCode::OK, Json(serde_json::json!({"status": "ok"}))).into_response()
}

fn internal_error(err: BrokerError) -> Response {
    tracing::error!("broker error: {err}");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse {
            error: format!("Internal server error: {err}"),
        }),
    )
        .into_response()
}
