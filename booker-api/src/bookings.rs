use axum::{
    extract::{Path, State},
    routing::{get, post},
    Extension, Json, Router,
};
use booker_shared::Hold;
use uuid::Uuid;

use crate::error::AppError;
use crate::middleware::Caller;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/bookings", get(list_bookings))
        .route("/bookings/{id}", get(get_booking))
        .route("/bookings/{id}/confirm", post(confirm_booking))
        .route("/bookings/{id}/cancel", post(cancel_booking))
}

async fn list_bookings(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
) -> Result<Json<Vec<Hold>>, AppError> {
    let holds = state.engine.list_user_holds(caller.id()).await?;
    Ok(Json(holds))
}

async fn get_booking(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(hold_id): Path<Uuid>,
) -> Result<Json<Hold>, AppError> {
    let hold = state.engine.get_hold(hold_id, caller.id()).await?;
    Ok(Json(hold))
}

// Payment itself happens elsewhere; this only records that it succeeded.
async fn confirm_booking(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(hold_id): Path<Uuid>,
) -> Result<Json<Hold>, AppError> {
    let hold = state.engine.confirm_hold(hold_id, caller.id()).await?;
    state.metrics.confirmed.inc();
    Ok(Json(hold))
}

async fn cancel_booking(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(hold_id): Path<Uuid>,
) -> Result<Json<Hold>, AppError> {
    let hold = state.engine.cancel_hold(hold_id, caller.id()).await?;
    state.metrics.cancelled.inc();
    Ok(Json(hold))
}
