//! Read-only HTTP status surface over the service registry

use crate::model::ServiceDefinition;
use crate::registry::ServiceRegistry;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub services: Vec<String>,
}

/// Creates the status router: `/health`, `/names` and `/services`.
pub fn status_router(registry: Arc<ServiceRegistry>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/names", get(names))
        .route("/services", get(services))
        .fallback(not_found)
        .with_state(registry)
}

async fn health(State(registry): State<Arc<ServiceRegistry>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        services: registry.names(),
    })
}

async fn names(State(registry): State<Arc<ServiceRegistry>>) -> Json<Vec<String>> {
    Json(registry.names())
}

async fn services(
    State(registry): State<Arc<ServiceRegistry>>,
) -> Json<Vec<(String, ServiceDefinition)>> {
    let snapshot = registry.snapshot();
    Json(
        snapshot
            .iter()
            .map(|(name, definition)| (name.clone(), definition.clone()))
            .collect(),
    )
}

async fn not_found() -> (StatusCode, &'static str) {
    (StatusCode::NOT_FOUND, "Not found")
}
