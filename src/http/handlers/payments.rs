use crate::domain::payment::{CreatePaymentRequest, ErrorEnvelope, ErrorPayload, SummaryQuery};
use crate::AppState;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;

pub async fn create_payment(
    State(state): State<AppState>,
    payload: Result<Json<CreatePaymentRequest>, JsonRejection>,
) -> impl IntoResponse {
    let Json(req) = match payload {
        Ok(req) => req,
        Err(rejection) => {
            let body = ErrorEnvelope {
                error: ErrorPayload {
                    code: "INVALID_BODY".to_string(),
                    message: "payment body could not be parsed".to_string(),
                    details: Some(rejection.body_text()),
                },
            };
            return (StatusCode::BAD_REQUEST, Json(body)).into_response();
        }
    };

    match state.payment_service.enqueue_payment(req) {
        Ok(_) => StatusCode::ACCEPTED.into_response(),
        Err((status, body)) => (status, Json(body)).into_response(),
    }
}

pub async fn payments_summary(
    State(state): State<AppState>,
    Query(query): Query<SummaryQuery>,
) -> impl IntoResponse {
    match state
        .payment_service
        .summary(query.from.as_deref(), query.to.as_deref())
        .await
    {
        Ok(resp) => (StatusCode::OK, Json(resp)).into_response(),
        Err((status, body)) => (status, Json(body)).into_response(),
    }
}

pub async fn purge_payments(State(state): State<AppState>) -> impl IntoResponse {
    match state.payment_service.purge().await {
        Ok(()) => (StatusCode::OK, Json(serde_json::json!({"purged": true}))).into_response(),
        Err((status, body)) => (status, Json(body)).into_response(),
    }
}
