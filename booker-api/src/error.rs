use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use booker_core::ReservationError;
use serde_json::json;

#[derive(Debug)]
pub enum AppError {
    Unauthorized(String),
    Validation(String),
    Forbidden(String),
    NotFound(String),
    /// 409 with a machine-readable code the client can branch on.
    Conflict { code: &'static str, message: String },
    Unavailable(String),
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, error_message) = match self {
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "unauthorized", msg),
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, "validation", msg),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, "forbidden", msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg),
            AppError::Conflict { code, message } => (StatusCode::CONFLICT, code, message),
            AppError::Unavailable(msg) => {
                tracing::error!("Storage unavailable: {}", msg);
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "unavailable",
                    "Service temporarily unavailable".to_string(),
                )
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal Server Error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal",
                    "Internal Server Error".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": error_message,
            "code": code,
        }));

        (status, body).into_response()
    }
}

impl From<ReservationError> for AppError {
    fn from(err: ReservationError) -> Self {
        let message = err.to_string();
        match err {
            ReservationError::Validation(msg) => AppError::Validation(msg),
            ReservationError::EventNotFound(_) | ReservationError::NotFound(_) => {
                AppError::NotFound(message)
            }
            ReservationError::Forbidden(_) => AppError::Forbidden(message),
            ReservationError::SoldOut { .. } => AppError::Conflict {
                code: "sold_out",
                message,
            },
            ReservationError::Expired(_) => AppError::Conflict {
                code: "expired",
                message,
            },
            ReservationError::StaleState { .. } => AppError::Conflict {
                code: "stale_state",
                message,
            },
            ReservationError::StorageUnavailable(msg) => AppError::Unavailable(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use booker_shared::HoldStatus;
    use uuid::Uuid;

    fn status_of(err: ReservationError) -> StatusCode {
        AppError::from(err).into_response().status()
    }

    #[test]
    fn test_reservation_errors_map_to_statuses() {
        let id = Uuid::new_v4();
        assert_eq!(status_of(ReservationError::Validation("x".into())), StatusCode::BAD_REQUEST);
        assert_eq!(status_of(ReservationError::EventNotFound(id)), StatusCode::NOT_FOUND);
        assert_eq!(status_of(ReservationError::NotFound(id)), StatusCode::NOT_FOUND);
        assert_eq!(status_of(ReservationError::Forbidden(id)), StatusCode::FORBIDDEN);
        assert_eq!(
            status_of(ReservationError::SoldOut { requested: 2, available: 1 }),
            StatusCode::CONFLICT
        );
        assert_eq!(status_of(ReservationError::Expired(id)), StatusCode::CONFLICT);
        assert_eq!(
            status_of(ReservationError::StaleState {
                hold_id: id,
                expected: HoldStatus::Unpaid,
                actual: HoldStatus::Paid,
            }),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(ReservationError::StorageUnavailable("down".into())),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn test_conflicts_carry_distinct_codes() {
        let codes: Vec<&str> = [
            ReservationError::SoldOut { requested: 1, available: 0 },
            ReservationError::Expired(Uuid::nil()),
            ReservationError::StaleState {
                hold_id: Uuid::nil(),
                expected: HoldStatus::Unpaid,
                actual: HoldStatus::Cancelled,
            },
        ]
        .into_iter()
        .map(|e| match AppError::from(e) {
            AppError::Conflict { code, .. } => code,
            other => panic!("expected conflict, got {:?}", other),
        })
        .collect();

        assert_eq!(codes, vec!["sold_out", "expired", "stale_state"]);
    }
}
