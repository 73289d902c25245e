// routes.rs
use axum::{
    routing::{get, post},
    Router,
};

use crate::handlers;
use crate::state::AppState;

pub fn create_routes(state: AppState) -> Router {
    let api = Router::new()
        .route("/analytics/dashboard", get(handlers::get_dashboard))
        .route("/analytics/shares", post(handlers::track_share))
        .route(
            "/polls/{poll_id}/options/{option_id}/vote",
            post(handlers::vote),
        );

    Router::new()
        .route("/health", get(handlers::health))
        .nest("/api", api)
        .with_state(state)
}
