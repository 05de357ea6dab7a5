// ABOUTME: HTTP surface - one GET action that fires the trigger
// ABOUTME: 401 on auth/config failure, 500 on fatal sync errors, JSON report on success

use anyhow::{Context, Result};
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::report::SyncReport;
use crate::trigger::{Trigger, TriggerError};

#[derive(Clone)]
pub struct AppState {
    trigger: Arc<Trigger>,
    // Serializes runs within this process.
    running: Arc<Mutex<()>>,
}

#[derive(Debug, Deserialize)]
pub struct TriggerQuery {
    pub auth: Option<String>,
}

impl IntoResponse for TriggerError {
    fn into_response(self) -> Response {
        match self {
            TriggerError::Unauthorized => StatusCode::UNAUTHORIZED.into_response(),
            other => {
                let body = serde_json::json!({
                    "error": other.to_string(),
                    "code": StatusCode::INTERNAL_SERVER_ERROR.as_u16(),
                });
                (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
            }
        }
    }
}

pub fn router(trigger: Trigger) -> Router {
    let state = AppState {
        trigger: Arc::new(trigger),
        running: Arc::new(Mutex::new(())),
    };
    Router::new().route("/", get(run_trigger)).with_state(state)
}

async fn run_trigger(
    State(state): State<AppState>,
    Query(query): Query<TriggerQuery>,
) -> Result<Json<SyncReport>, TriggerError> {
    // Reject before queueing behind a running sync.
    state.trigger.authorize(query.auth.as_deref()).await?;

    let _guard = state.running.lock().await;
    let report = state.trigger.run(query.auth.as_deref()).await?;
    Ok(Json(report))
}

/// Serve the trigger until the process is stopped.
pub async fn serve(addr: SocketAddr, trigger: Trigger) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    tracing::info!("Listening on {} (config {:?})", addr, trigger.config_path());
    axum::serve(listener, router(trigger))
        .await
        .context("HTTP server failed")?;
    Ok(())
}
