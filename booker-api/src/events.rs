use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    routing::{get, post},
    Extension, Json, Router,
};
use booker_core::ReservationError;
use booker_shared::{BookingRequest, Event, EventDetail, Hold};
use uuid::Uuid;

use crate::error::AppError;
use crate::middleware::Caller;
use crate::state::AppState;

pub fn public_routes() -> Router<AppState> {
    Router::new().route("/events", get(list_events))
}

pub fn identified_routes() -> Router<AppState> {
    Router::new()
        .route("/events/{id}", get(event_detail))
        .route("/events/{id}/book", post(book_event))
}

async fn list_events(State(state): State<AppState>) -> Result<Json<Vec<Event>>, AppError> {
    let events = state.engine.list_events().await?;
    Ok(Json(events))
}

/// Admin view: the event with live availability and its non-terminal holds.
async fn event_detail(
    State(state): State<AppState>,
    Path(event_id): Path<Uuid>,
) -> Result<Json<EventDetail>, AppError> {
    let detail = state.engine.event_detail(event_id).await?;
    Ok(Json(detail))
}

async fn book_event(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(event_id): Path<Uuid>,
    payload: Result<Json<BookingRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Hold>), AppError> {
    let Json(req) = payload.map_err(|e| AppError::Validation(e.body_text()))?;

    match state.engine.create_hold(event_id, caller.id(), req.seats_count).await {
        Ok(hold) => {
            state.metrics.holds_created.inc();
            Ok((StatusCode::CREATED, Json(hold)))
        }
        Err(err) => {
            if matches!(err, ReservationError::SoldOut { .. }) {
                state.metrics.sold_out.inc();
            }
            Err(err.into())
        }
    }
}
