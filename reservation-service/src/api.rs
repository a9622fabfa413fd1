use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use serde::Deserialize;

use crate::handlers::{DbPool, ReservationHandler};
use shared::{
    CancelReservationRequest, CancelReservationResponse, CompleteReservationRequest,
    CompleteReservationResponse, CreateReservationRequest, CreateReservationResponse,
    ErrorResponse, ReservationError, ReservationStatus, ReservationStatusResponse,
    UpdateShareCountRequest, UpdateShareCountResponse,
};

#[derive(Clone)]
pub struct AppState {
    pub pool: DbPool,
}

type ApiResult<T> = Result<Json<T>, (StatusCode, Json<ErrorResponse>)>;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/create-reservation", post(create_reservation))
        .route("/api/update-share-count", post(update_share_count))
        .route("/api/cancel-reservation", post(cancel_reservation))
        .route("/api/timeout-reservation", post(timeout_reservation))
        .route("/api/expire-reservation", post(expire_reservation))
        .route("/api/complete-reservation", post(complete_reservation))
        .route("/api/check-reservation-status", get(check_reservation_status))
        .route("/health", get(health_check))
        .with_state(state)
        .layer(
            tower_http::cors::CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods(tower_http::cors::Any)
                .allow_headers(tower_http::cors::Any),
        )
}

async fn create_reservation(
    State(state): State<AppState>,
    Json(request): Json<CreateReservationRequest>,
) -> ApiResult<CreateReservationResponse> {
    let handler = ReservationHandler::new(state.pool);
    handler
        .create_reservation(request)
        .await
        .map(Json)
        .map_err(into_response)
}

async fn update_share_count(
    State(state): State<AppState>,
    Json(request): Json<UpdateShareCountRequest>,
) -> ApiResult<UpdateShareCountResponse> {
    let handler = ReservationHandler::new(state.pool);
    handler
        .update_share_count(request)
        .await
        .map(Json)
        .map_err(into_response)
}

async fn cancel_reservation(
    State(state): State<AppState>,
    Json(request): Json<CancelReservationRequest>,
) -> ApiResult<CancelReservationResponse> {
    let handler = ReservationHandler::new(state.pool);
    handler
        .release_reservation(request.transaction_id, ReservationStatus::Cancelled)
        .await
        .map(Json)
        .map_err(into_response)
}

async fn timeout_reservation(
    State(state): State<AppState>,
    Json(request): Json<CancelReservationRequest>,
) -> ApiResult<CancelReservationResponse> {
    let handler = ReservationHandler::new(state.pool);
    handler
        .release_reservation(request.transaction_id, ReservationStatus::Expired)
        .await
        .map(Json)
        .map_err(into_response)
}

// Same semantics as timeout-reservation; the countdown controller calls
// this route when it hits zero.
async fn expire_reservation(
    State(state): State<AppState>,
    Json(request): Json<CancelReservationRequest>,
) -> ApiResult<CancelReservationResponse> {
    let handler = ReservationHandler::new(state.pool);
    handler
        .release_reservation(request.transaction_id, ReservationStatus::Expired)
        .await
        .map(Json)
        .map_err(into_response)
}

async fn complete_reservation(
    State(state): State<AppState>,
    Json(request): Json<CompleteReservationRequest>,
) -> ApiResult<CompleteReservationResponse> {
    let handler = ReservationHandler::new(state.pool);
    handler
        .complete_reservation(request)
        .await
        .map(Json)
        .map_err(into_response)
}

#[derive(Debug, Deserialize)]
struct StatusQuery {
    transaction_id: Option<String>,
}

async fn check_reservation_status(
    State(state): State<AppState>,
    Query(query): Query<StatusQuery>,
) -> ApiResult<ReservationStatusResponse> {
    let handler = ReservationHandler::new(state.pool);
    handler
        .check_status(query.transaction_id)
        .await
        .map(Json)
        .map_err(into_response)
}

async fn health_check() -> &'static str {
    "OK"
}

fn into_response(err: ReservationError) -> (StatusCode, Json<ErrorResponse>) {
    let status = match &err {
        ReservationError::InvalidTransactionId { .. }
        | ReservationError::MissingTransactionId
        | ReservationError::InvalidShareCount { .. }
        | ReservationError::OperationMismatch { .. }
        | ReservationError::InvalidShareholder { .. } => StatusCode::BAD_REQUEST,
        ReservationError::NotFound | ReservationError::AnimalNotFound => StatusCode::NOT_FOUND,
        ReservationError::InsufficientShares { .. }
        | ReservationError::DuplicateTransaction
        | ReservationError::NotPending { .. }
        | ReservationError::ShareholderCountMismatch { .. }
        | ReservationError::ConcurrentUpdate => StatusCode::CONFLICT,
        ReservationError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status == StatusCode::INTERNAL_SERVER_ERROR {
        tracing::error!("reservation operation failed: {}", err);
    }
    (status, Json(ErrorResponse { error: err.to_string() }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_errors_map_to_bad_request() {
        let (status, _) = into_response(ReservationError::InvalidTransactionId {
            expected: 16,
            actual: 10,
        });
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, _) = into_response(ReservationError::MissingTransactionId);
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[test]
    fn capacity_races_map_to_conflict() {
        let (status, body) = into_response(ReservationError::InsufficientShares {
            available: 2,
            requested: 3,
        });
        assert_eq!(status, StatusCode::CONFLICT);
        assert!(body.error.contains("2 available"));

        let (status, _) = into_response(ReservationError::ConcurrentUpdate);
        assert_eq!(status, StatusCode::CONFLICT);
        let (status, _) = into_response(ReservationError::ShareholderCountMismatch {
            given: 3,
            reserved: 2,
        });
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[test]
    fn unknown_reservations_map_to_not_found() {
        let (status, _) = into_response(ReservationError::NotFound);
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
