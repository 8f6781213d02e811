//! API routes

pub mod contracts;
pub mod form;
pub mod users;

use crate::error::ApiError;
use crate::AppState;
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post, put},
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Ids that do not parse cannot name an existing record.
pub(crate) fn parse_id(raw: &str, not_found: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw).map_err(|_| ApiError::NotFound(not_found.to_string()))
}

pub fn app(state: Arc<AppState>) -> Router {
    let uploads = ServeDir::new(state.uploads.root());
    let body_limit = state.config.max_upload_size;

    Router::new()
        // Health check
        .route("/health", get(health_check))

        // Accounts
        .route("/api/users/register", post(users::register))
        .route("/api/users/login", post(users::login))
        .route("/api/users/add", post(users::add))
        .route("/api/users/current", get(users::current))
        .route("/api/users/all", get(users::list))
        .route("/api/users/:id", put(users::update).delete(users::delete_user))

        // Contracts
        .route("/api/contracts/create", post(contracts::create))
        .route("/api/contracts/agent", get(contracts::list_agent))
        .route("/api/contracts/all", get(contracts::list_all))
        .route("/api/contracts/client", get(contracts::list_client))
        .route("/api/contracts/available", get(contracts::list_available))
        .route("/api/contracts/:id", get(contracts::get_contract))
        .route("/api/contracts/:id/sign", post(contracts::sign))

        // Uploaded images and generated documents
        .nest_service("/uploads", uploads)

        .layer(DefaultBodyLimit::max(body_limit))

        // CORS
        .layer(CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any))

        // Tracing
        .layer(TraceLayer::new_for_http())

        // State
        .with_state(state)
}
