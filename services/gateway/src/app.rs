//! Gateway HTTP application wiring.
//!
//! # Purpose
//! Builds the Axum router, configures middleware, and defines the shared
//! application state injected into handlers.
//!
//! # Notes
//! This module centralizes route composition so `main` stays small and the
//! integration tests can drive the exact router the binary serves.
use crate::api;
use crate::api::openapi::ApiDoc;
use crate::auth::Verifier;
use axum::Router;
use portico_backend::{Client, RequestManager};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;

#[derive(Clone)]
pub struct AppState {
    /// Broker for the async operations; owns the mailbox handle.
    pub manager: Arc<RequestManager>,
    /// Backend client used directly by the synchronous lookups.
    pub client: Arc<dyn Client>,
    /// AAD verifier run over deploy/execute payloads.
    pub verifier: Arc<dyn Verifier>,
}

pub fn build_router(state: AppState) -> Router {
    let trace_layer =
        TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
            tracing::info_span!(
                "http.request",
                method = %request.method(),
                uri = %request.uri(),
                version = ?request.version()
            )
        });

    Router::new()
        .route("/v0/api/health", axum::routing::get(api::system::health))
        .route(
            "/v0/api/service/deploy",
            axum::routing::post(api::service::deploy_service),
        )
        .route(
            "/v0/api/service/execute",
            axum::routing::post(api::service::execute_service),
        )
        .route(
            "/v0/api/service/poll",
            axum::routing::post(api::service::poll_service),
        )
        .route(
            "/v0/api/service/getCode",
            axum::routing::get(api::service::get_code),
        )
        .route(
            "/v0/api/service/getExpiry",
            axum::routing::get(api::service::get_expiry),
        )
        .route(
            "/v0/api/service/getPublicKey",
            axum::routing::get(api::service::get_public_key),
        )
        .merge(
            utoipa_swagger_ui::SwaggerUi::new("/docs").url("/v0/openapi.json", ApiDoc::openapi()),
        )
        .layer(trace_layer)
        .with_state(state)
}
