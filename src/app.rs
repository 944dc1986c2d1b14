use crate::handlers;
use crate::state::AppState;
use axum::{routing::get, Router};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::dashboard))
        .route("/sales", get(handlers::sales))
        .route("/stock", get(handlers::stock))
        .route("/api/sales", get(handlers::api_sales))
        .route("/api/stores", get(handlers::api_stores))
        .route("/api/health", get(handlers::api_health))
        .fallback(handlers::not_found)
        .with_state(state)
}
