use axum::{routing::get, Router};

use crate::{error::AppError, state::AppState};

pub mod finance;
pub mod health;
pub mod jobs;

pub fn v1_router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health::health))
        .merge(finance::router())
        .merge(jobs::router())
        .fallback(route_not_found)
}

async fn route_not_found() -> AppError {
    AppError::NotFound("Route not found.".to_string())
}
