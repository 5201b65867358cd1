use crate::http::handlers::{ops, payments};
use crate::AppState;
use axum::routing::{get, post};
use axum::Router;

pub fn build(state: AppState) -> Router {
    Router::new()
        .route("/payments", post(payments::create_payment))
        .route("/payments-summary", get(payments::payments_summary))
        .route("/purge-payments", post(payments::purge_payments))
        .route("/payments/service-health", get(ops::service_health))
        .route("/health", get(ops::service_health))
        .route("/ops/readiness", get(ops::readiness))
        .route("/ops/liveness", get(ops::liveness))
        .route("/metrics", get(ops::metrics))
        .with_state(state)
}
