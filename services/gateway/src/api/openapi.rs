//! OpenAPI schema aggregation for the gateway API.
//!
//! # Purpose
//! Collects all routes and schema types into a single OpenAPI document for
//! docs and client generation.
use crate::api::{
    service, system,
    types::{
        AsyncResponse, DeployServiceEvent, DeployServiceRequest, ErrorEvent, ErrorResponse,
        Event, ExecuteServiceEvent, ExecuteServiceRequest, GetCodeRequest, GetCodeResponse,
        GetExpiryRequest, GetExpiryResponse, GetPublicKeyRequest, GetPublicKeyResponse,
        HealthStatus, PollServiceRequest, PollServiceResponse, RpcError,
    },
};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "portico-gateway",
        version = "v0",
        description = "Portico developer gateway HTTP API"
    ),
    paths(
        system::health,
        service::deploy_service,
        service::execute_service,
        service::poll_service,
        service::get_code,
        service::get_expiry,
        service::get_public_key
    ),
    components(schemas(
        HealthStatus,
        ErrorResponse,
        AsyncResponse,
        DeployServiceRequest,
        ExecuteServiceRequest,
        PollServiceRequest,
        PollServiceResponse,
        Event,
        DeployServiceEvent,
        ExecuteServiceEvent,
        ErrorEvent,
        RpcError,
        GetCodeRequest,
        GetCodeResponse,
        GetExpiryRequest,
        GetExpiryResponse,
        GetPublicKeyRequest,
        GetPublicKeyResponse
    )),
    tags(
        (name = "system", description = "Health and discovery endpoints"),
        (name = "service", description = "Service deployment, execution, and polling")
    )
)]
pub struct ApiDoc;
