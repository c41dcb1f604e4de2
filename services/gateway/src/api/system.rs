//! System endpoints.
use crate::api::error::{api_internal, ApiError};
use crate::api::types::HealthStatus;
use crate::app::AppState;
use axum::extract::State;
use axum::Json;

// Liveness endpoint. Probes the mailbox backing store, since that is the
// only dependency the gateway cannot function without.
#[utoipa::path(
    get,
    path = "/v0/api/health",
    tag = "system",
    responses(
        (status = 200, description = "Gateway health", body = HealthStatus),
        (status = 500, description = "Mailbox store unreachable", body = crate::api::types::ErrorResponse)
    )
)]
pub(crate) async fn health(State(state): State<AppState>) -> Result<Json<HealthStatus>, ApiError> {
    if let Err(err) = state.manager.health_check().await {
        return Err(api_internal("mailbox store unavailable", &err));
    }
    Ok(Json(HealthStatus {
        status: "ok".to_string(),
    }))
}
