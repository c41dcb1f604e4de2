//! Service API handlers.
//!
//! # Purpose
//! Implements the async deploy/execute/poll operations and the synchronous
//! lookups. Every handler extracts the authenticated session data first,
//! verifies or validates the payload, and only then reaches the request
//! manager or the backend client.
use crate::api::error::{api_forbidden, api_invalid_address, ApiError};
use crate::api::types::{
    AsyncResponse, DeployServiceRequest, Event, ExecuteServiceRequest, GetCodeRequest,
    GetCodeResponse, GetExpiryRequest, GetExpiryResponse, GetPublicKeyRequest,
    GetPublicKeyResponse, PollServiceRequest, PollServiceResponse,
};
use crate::app::AppState;
use crate::auth::AuthData;
use axum::extract::State;
use axum::Json;
use portico_backend as backend;

/// Count applied when a poll asks for 0 events.
pub const DEFAULT_POLL_COUNT: u64 = 10;

fn require_address(address: &str) -> Result<(), ApiError> {
    if address.is_empty() {
        return Err(api_invalid_address());
    }
    Ok(())
}

fn verify_payload(state: &AppState, auth: &AuthData, data: &str) -> Result<(), ApiError> {
    state.verifier.verify(data, &auth.expected_aad).map_err(|err| {
        tracing::debug!(error = %err, expected_aad = %auth.expected_aad, "failed to verify AAD");
        api_forbidden(
            "failed_aad_verification",
            "failed to verify AAD against the request payload",
        )
    })
}

#[utoipa::path(
    post,
    path = "/v0/api/service/deploy",
    tag = "service",
    request_body = DeployServiceRequest,
    responses(
        (status = 200, description = "Deploy accepted; poll for the result event", body = AsyncResponse),
        (status = 401, description = "Missing session", body = crate::api::types::ErrorResponse),
        (status = 403, description = "AAD verification failed", body = crate::api::types::ErrorResponse),
        (status = 503, description = "Mailbox store unavailable", body = crate::api::types::ErrorResponse)
    )
)]
pub(crate) async fn deploy_service(
    State(state): State<AppState>,
    auth: AuthData,
    Json(body): Json<DeployServiceRequest>,
) -> Result<Json<AsyncResponse>, ApiError> {
    verify_payload(&state, &auth, &body.data)?;
    let id = state
        .manager
        .deploy_service_async(
            &auth.session_key,
            backend::DeployServiceRequest { data: body.data },
        )
        .await?;
    Ok(Json(AsyncResponse { id }))
}

#[utoipa::path(
    post,
    path = "/v0/api/service/execute",
    tag = "service",
    request_body = ExecuteServiceRequest,
    responses(
        (status = 200, description = "Execution accepted; poll for the result event", body = AsyncResponse),
        (status = 400, description = "Empty address", body = crate::api::types::ErrorResponse),
        (status = 401, description = "Missing session", body = crate::api::types::ErrorResponse),
        (status = 403, description = "AAD verification failed", body = crate::api::types::ErrorResponse),
        (status = 503, description = "Mailbox store unavailable", body = crate::api::types::ErrorResponse)
    )
)]
pub(crate) async fn execute_service(
    State(state): State<AppState>,
    auth: AuthData,
    Json(body): Json<ExecuteServiceRequest>,
) -> Result<Json<AsyncResponse>, ApiError> {
    // Cheap validation first: no id is allocated for a rejected request.
    require_address(&body.address)?;
    verify_payload(&state, &auth, &body.data)?;
    let id = state
        .manager
        .execute_service_async(
            &auth.session_key,
            backend::ExecuteServiceRequest {
                data: body.data,
                address: body.address,
            },
        )
        .await?;
    Ok(Json(AsyncResponse { id }))
}

#[utoipa::path(
    post,
    path = "/v0/api/service/poll",
    tag = "service",
    request_body = PollServiceRequest,
    responses(
        (status = 200, description = "Ordered events at the requested offset", body = PollServiceResponse),
        (status = 401, description = "Missing session", body = crate::api::types::ErrorResponse),
        (status = 503, description = "Mailbox store unavailable", body = crate::api::types::ErrorResponse)
    )
)]
pub(crate) async fn poll_service(
    State(state): State<AppState>,
    auth: AuthData,
    Json(body): Json<PollServiceRequest>,
) -> Result<Json<PollServiceResponse>, ApiError> {
    let count = if body.count == 0 {
        DEFAULT_POLL_COUNT
    } else {
        body.count
    };
    let events = state
        .manager
        .poll_service(
            &auth.session_key,
            backend::PollServiceRequest {
                offset: body.offset,
                count: count as usize,
                discard_previous: body.discard_previous,
            },
        )
        .await?;
    Ok(Json(PollServiceResponse {
        offset: events.offset,
        events: events.events.into_iter().map(Event::from).collect(),
    }))
}

#[utoipa::path(
    get,
    path = "/v0/api/service/getCode",
    tag = "service",
    request_body = GetCodeRequest,
    responses(
        (status = 200, description = "Code stored at the address", body = GetCodeResponse),
        (status = 400, description = "Empty address", body = crate::api::types::ErrorResponse),
        (status = 401, description = "Missing session", body = crate::api::types::ErrorResponse)
    )
)]
pub(crate) async fn get_code(
    State(state): State<AppState>,
    _auth: AuthData,
    Json(body): Json<GetCodeRequest>,
) -> Result<Json<GetCodeResponse>, ApiError> {
    require_address(&body.address)?;
    let response = state
        .client
        .get_code(backend::GetCodeRequest {
            address: body.address,
        })
        .await?;
    Ok(Json(GetCodeResponse {
        address: response.address,
        code: response.code,
    }))
}

#[utoipa::path(
    get,
    path = "/v0/api/service/getExpiry",
    tag = "service",
    request_body = GetExpiryRequest,
    responses(
        (status = 200, description = "Expiry timestamp of the service", body = GetExpiryResponse),
        (status = 400, description = "Empty address", body = crate::api::types::ErrorResponse),
        (status = 401, description = "Missing session", body = crate::api::types::ErrorResponse)
    )
)]
pub(crate) async fn get_expiry(
    State(state): State<AppState>,
    _auth: AuthData,
    Json(body): Json<GetExpiryRequest>,
) -> Result<Json<GetExpiryResponse>, ApiError> {
    require_address(&body.address)?;
    let response = state
        .client
        .get_expiry(backend::GetExpiryRequest {
            address: body.address,
        })
        .await?;
    Ok(Json(GetExpiryResponse {
        address: response.address,
        expiry: response.expiry,
    }))
}

#[utoipa::path(
    get,
    path = "/v0/api/service/getPublicKey",
    tag = "service",
    request_body = GetPublicKeyRequest,
    responses(
        (status = 200, description = "Public key bound to the service", body = GetPublicKeyResponse),
        (status = 400, description = "Empty address", body = crate::api::types::ErrorResponse),
        (status = 401, description = "Missing session", body = crate::api::types::ErrorResponse)
    )
)]
pub(crate) async fn get_public_key(
    State(state): State<AppState>,
    _auth: AuthData,
    Json(body): Json<GetPublicKeyRequest>,
) -> Result<Json<GetPublicKeyResponse>, ApiError> {
    require_address(&body.address)?;
    let response = state
        .client
        .get_public_key(backend::GetPublicKeyRequest {
            address: body.address,
        })
        .await?;
    Ok(Json(GetPublicKeyResponse {
        timestamp: response.timestamp,
        address: response.address,
        public_key: response.public_key,
        signature: response.signature,
    }))
}
