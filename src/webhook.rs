//! The rollback webhook: HTTP entry point for external alert delivery.
//!
//! `POST /rollback` is what the external monitoring system calls when a
//! degradation alert fires. The handler validates the payload, runs the
//! (blocking) rollback on a blocking task, and bounds its own wait: past
//! the SLA it answers `pending` instead of holding the connection open for
//! the full health-poll window. The deploy keeps running and its result
//! lands in the idempotency cache, so a redelivered alert observes it.
//!
//! Supporting endpoints mirror the operational surface an alert target
//! needs: `GET /health`, `GET /status`, and `GET /`.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use jiff::Timestamp;
use serde::{Deserialize, Serialize};

use crate::model::{RollbackRequest, RollbackResult, RollbackStatus};
use crate::rollback::Controller;

/// Shared handler state.
pub struct ServerState {
    pub controller: Arc<Controller>,

    /// How long a handler waits for the rollback before answering pending.
    pub handler_sla: Duration,

    started_at: Instant,
}

impl ServerState {
    pub fn new(controller: Arc<Controller>, handler_sla: Duration) -> Arc<Self> {
        Arc::new(Self {
            controller,
            handler_sla,
            started_at: Instant::now(),
        })
    }
}

/// Builds the webhook router.
pub fn router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route("/rollback", post(trigger_rollback))
        .route("/health", get(health))
        .route("/status", get(status))
        .route("/", get(info))
        .with_state(state)
}

/// Serves the webhook on an already-bound listener until the task is
/// dropped or the listener fails.
pub async fn serve(listener: tokio::net::TcpListener, state: Arc<ServerState>) -> std::io::Result<()> {
    axum::serve(listener, router(state)).await
}

// ── Request/response bodies ──

/// Webhook payload from the external alerting system.
///
/// Superset of the controller's `RollbackRequest`: `alert_name` is logged
/// but carries no semantics.
#[derive(Debug, Deserialize)]
struct RollbackBody {
    service: String,
    target_version: Option<String>,
    alert_id: String,
    alert_name: Option<String>,
    #[serde(default)]
    reason: String,
    triggered_at: Option<Timestamp>,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    runtime_available: bool,
}

#[derive(Serialize)]
struct StatusResponse {
    last_rollback: Option<RollbackResult>,
    total_rollbacks: u64,
    uptime_seconds: u64,
}

#[derive(Serialize)]
struct InfoResponse {
    service: &'static str,
    version: &'static str,
    endpoints: &'static [&'static str],
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

/// Handler-level failures, mapped to 4xx/5xx with a JSON body.
enum ApiError {
    Validation(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (code, error) = match self {
            Self::Validation(error) => (StatusCode::UNPROCESSABLE_ENTITY, error),
            Self::Internal(error) => (StatusCode::INTERNAL_SERVER_ERROR, error),
        };
        (code, Json(ErrorBody { error })).into_response()
    }
}

// ── Handlers ──

async fn trigger_rollback(
    State(state): State<Arc<ServerState>>,
    Json(body): Json<RollbackBody>,
) -> Result<(StatusCode, Json<RollbackResult>), ApiError> {
    tracing::info!(
        service = body.service,
        alert_id = body.alert_id,
        alert_name = body.alert_name,
        reason = body.reason,
        "rollback webhook received"
    );

    // Schema-level validation: reject unknown services and versions before
    // anything is touched.
    let Some(spec) = state.controller.service(&body.service) else {
        return Err(ApiError::Validation(format!(
            "unknown service: {}",
            body.service
        )));
    };
    if let Some(target) = &body.target_version {
        if !spec.knows_version(target) {
            return Err(ApiError::Validation(format!(
                "unknown version {target} for {}",
                body.service
            )));
        }
    }

    let request = RollbackRequest {
        service: body.service.clone(),
        target_version: body.target_version.clone(),
        alert_id: body.alert_id.clone(),
        reason: if body.reason.is_empty() {
            "external alert".to_string()
        } else {
            body.reason.clone()
        },
        triggered_at: body.triggered_at,
    };
    let resolved_target = body
        .target_version
        .clone()
        .unwrap_or_else(|| spec.healthy_version.clone());

    let controller = Arc::clone(&state.controller);
    let task = tokio::task::spawn_blocking(move || controller.rollback(&request));

    match tokio::time::timeout(state.handler_sla, task).await {
        Ok(Ok(result)) => Ok((StatusCode::OK, Json(result))),
        Ok(Err(e)) => Err(ApiError::Internal(format!("rollback task failed: {e}"))),
        Err(_) => {
            // SLA exceeded: the blocking task keeps running detached and the
            // idempotency cache absorbs its result.
            tracing::warn!(
                service = body.service,
                alert_id = body.alert_id,
                "rollback exceeded handler SLA, answering pending"
            );
            Ok((
                StatusCode::OK,
                Json(RollbackResult {
                    status: RollbackStatus::Pending,
                    service: body.service,
                    previous_version: None,
                    new_version: resolved_target,
                    rollback_id: format!("pending-{}", body.alert_id),
                    started_at: Timestamp::now(),
                    completed_at: None,
                    error: None,
                }),
            ))
        }
    }
}

async fn health(State(state): State<Arc<ServerState>>) -> Json<HealthResponse> {
    let runtime_available = state.controller.executor().runtime_available();
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        runtime_available,
    })
}

async fn status(State(state): State<Arc<ServerState>>) -> Json<StatusResponse> {
    Json(StatusResponse {
        last_rollback: state.controller.last(),
        total_rollbacks: state.controller.total(),
        uptime_seconds: state.started_at.elapsed().as_secs(),
    })
}

async fn info() -> Json<InfoResponse> {
    Json(InfoResponse {
        service: "rollout",
        version: env!("CARGO_PKG_VERSION"),
        endpoints: &["POST /rollback", "GET /health", "GET /status", "GET /"],
    })
}
