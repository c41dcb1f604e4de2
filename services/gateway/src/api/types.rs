//! Wire types for the service API.
//!
//! # Purpose
//! Defines the JSON payload shapes clients exchange with the gateway and the
//! mapping from backend-layer events to their client-visible variants.
//!
//! # Notes
//! Polled events are serialized untagged: clients recognize an error event by
//! the `errorCode` field inside `cause`, and the remaining variants by their
//! field sets. Deserialization tries the variants in that order.
use portico_backend::BackendEvent;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Response to an asynchronous submission. The id uniquely identifies the
/// eventual event and orders it within the session's event sequence.
#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct AsyncResponse {
    pub id: u64,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct DeployServiceRequest {
    /// Payload passed to the backend as the service deployment argument.
    pub data: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct ExecuteServiceRequest {
    /// Payload passed to the service as its execution argument.
    pub data: String,
    /// Address of the deployed service to execute.
    pub address: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
#[serde(rename_all = "camelCase")]
pub struct PollServiceRequest {
    /// Lowest event id the client wants to receive.
    #[serde(default)]
    pub offset: u64,
    /// Maximum number of events to return; 0 selects the server default.
    #[serde(default)]
    pub count: u64,
    /// Discard every event below `offset` before retrieving.
    #[serde(default)]
    pub discard_previous: bool,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct PollServiceResponse {
    /// Offset the events were answered from.
    pub offset: u64,
    pub events: Vec<Event>,
}

/// Client-visible event variants. Serialized untagged; `ErrorEvent` is
/// distinguished by the `errorCode` field on its cause.
#[derive(Debug, Serialize, Deserialize, ToSchema, Clone, PartialEq)]
#[serde(untagged)]
pub enum Event {
    Error(ErrorEvent),
    Execute(ExecuteServiceEvent),
    Deploy(DeployServiceEvent),
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone, PartialEq)]
pub struct ExecuteServiceEvent {
    pub id: u64,
    pub address: String,
    /// Output generated by the service at the end of its execution.
    pub output: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone, PartialEq)]
pub struct DeployServiceEvent {
    pub id: u64,
    /// Address the service was deployed at.
    pub address: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone, PartialEq)]
pub struct ErrorEvent {
    pub id: u64,
    pub cause: RpcError,
}

/// Cause carried by an error event.
#[derive(Debug, Serialize, Deserialize, ToSchema, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RpcError {
    pub error_code: u64,
    pub description: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct GetCodeRequest {
    pub address: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct GetCodeResponse {
    pub address: String,
    pub code: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct GetExpiryRequest {
    pub address: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct GetExpiryResponse {
    pub address: String,
    /// Expiry timestamp of the service, seconds since the epoch.
    pub expiry: u64,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct GetPublicKeyRequest {
    pub address: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
#[serde(rename_all = "camelCase")]
pub struct GetPublicKeyResponse {
    /// Expiry timestamp of the key material, seconds since the epoch.
    pub timestamp: u64,
    pub address: String,
    pub public_key: String,
    /// Key-manager signature authenticating the public key.
    pub signature: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct HealthStatus {
    pub status: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
    pub request_id: Option<String>,
}

impl From<BackendEvent> for Event {
    fn from(event: BackendEvent) -> Self {
        match event {
            BackendEvent::DeployServiceResponse { id, address } => {
                Event::Deploy(DeployServiceEvent { id, address })
            }
            BackendEvent::ExecuteServiceResponse {
                id,
                address,
                output,
            } => Event::Execute(ExecuteServiceEvent {
                id,
                address,
                output,
            }),
            BackendEvent::ErrorEvent { id, cause } => Event::Error(ErrorEvent {
                id,
                cause: RpcError {
                    error_code: cause.error_code,
                    description: cause.description,
                },
            }),
        }
    }
}
