use axum::{
    http::Method,
    routing::get,
    Json, Router,
};
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub mod bookings;
pub mod error;
pub mod events;
pub mod metrics;
pub mod middleware;
pub mod state;
pub mod worker;

pub use state::AppState;

pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            axum::http::header::CONTENT_TYPE,
            axum::http::header::USER_AGENT,
            axum::http::HeaderName::from_static(middleware::USER_ID_HEADER),
        ]);

    // Everything that acts on behalf of a caller needs the gateway-supplied id.
    let identified = Router::new()
        .merge(events::identified_routes())
        .merge(bookings::routes())
        .route_layer(axum::middleware::from_fn(middleware::require_caller));

    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics::scrape))
        .merge(events::public_routes())
        .merge(identified)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
