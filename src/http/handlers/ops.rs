use crate::health::monitor::LAST_REFRESH_KEY;
use crate::AppState;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Json;

/// Cached processor health as last published by the monitor. Never probes.
pub async fn service_health(State(state): State<AppState>) -> impl IntoResponse {
    let snapshot = match state.monitor.health_snapshot().await {
        Ok(snapshot) => snapshot,
        Err(err) => {
            tracing::warn!("health snapshot unavailable: {:#}", err);
            Default::default()
        }
    };
    let active = state.monitor.active_decision().await;

    (
        StatusCode::OK,
        Json(serde_json::json!({
            "default": snapshot.default,
            "fallback": snapshot.fallback,
            "active": active,
        })),
    )
        .into_response()
}

pub async fn readiness(State(state): State<AppState>) -> impl IntoResponse {
    let store_ok = state.coordination.get(LAST_REFRESH_KEY).await.is_ok();
    let status = if store_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(serde_json::json!({
            "ready": store_ok,
            "coordination_store": store_ok,
        })),
    )
        .into_response()
}

pub async fn liveness() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({"alive": true}))).into_response()
}

pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    match state.payment_service.queue.len().await {
        Ok(depth) => state.metrics.queue_depth.set(depth as i64),
        Err(err) => tracing::warn!("queue depth unavailable: {:#}", err),
    }

    match state.metrics.render() {
        Ok(text) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            text,
        )
            .into_response(),
        Err(err) => {
            tracing::error!("metrics render failed: {:#}", err);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
