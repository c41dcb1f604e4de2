// Backend contract for the Portico gateway: the async client interface the
// gateway consumes, the event model delivered through mailboxes, and the
// error taxonomy with the stable codes clients see inside error events.
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub mod dev;
pub mod manager;

pub use dev::DevClient;
pub use manager::RequestManager;

pub type Result<T> = std::result::Result<T, Error>;

/// Stable numeric codes carried on the wire by [`RpcError`].
pub mod codes {
    pub const INTERNAL: u64 = 1000;
    pub const INVALID_ADDRESS: u64 = 2001;
    pub const FAILED_AAD_VERIFICATION: u64 = 2002;
    pub const INVALID_OFFSET: u64 = 2003;
    pub const ALREADY_PRESENT: u64 = 2004;
    pub const BACKEND_UNAVAILABLE: u64 = 3001;
    pub const UNKNOWN_BACKEND: u64 = 3002;
    pub const BACKEND_CONFIG_CONFLICT: u64 = 3003;
}

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("address field has not been set")]
    InvalidAddress,
    #[error("failed to verify AAD against the request payload")]
    FailedAadVerification,
    #[error("offset {id} outside the mailbox window starting at {offset}")]
    InvalidOffset { id: u64, offset: u64 },
    #[error("an event is already present at id {0}")]
    AlreadyPresent(u64),
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn error_code(&self) -> u64 {
        match self {
            Error::InvalidAddress => codes::INVALID_ADDRESS,
            Error::FailedAadVerification => codes::FAILED_AAD_VERIFICATION,
            Error::InvalidOffset { .. } => codes::INVALID_OFFSET,
            Error::AlreadyPresent(_) => codes::ALREADY_PRESENT,
            Error::BackendUnavailable(_) => codes::BACKEND_UNAVAILABLE,
            Error::Internal(_) => codes::INTERNAL,
        }
    }
}

impl From<portico_mqueue::MQueueError> for Error {
    fn from(err: portico_mqueue::MQueueError) -> Self {
        match err {
            portico_mqueue::MQueueError::InvalidOffset { id, offset, .. } => {
                Error::InvalidOffset { id, offset }
            }
            portico_mqueue::MQueueError::AlreadyPresent(id) => Error::AlreadyPresent(id),
            portico_mqueue::MQueueError::BackendUnavailable(cause) => {
                Error::BackendUnavailable(cause)
            }
        }
    }
}

/// Error payload delivered to clients inside an error event. The `errorCode`
/// field is the tag clients branch on when decoding polled events.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RpcError {
    pub error_code: u64,
    pub description: String,
}

impl From<&Error> for RpcError {
    fn from(err: &Error) -> Self {
        Self {
            error_code: err.error_code(),
            description: err.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DeployServiceRequest {
    pub data: String,
}

#[derive(Debug, Clone)]
pub struct DeployServiceResponse {
    pub address: String,
}

#[derive(Debug, Clone)]
pub struct ExecuteServiceRequest {
    pub data: String,
    pub address: String,
}

#[derive(Debug, Clone)]
pub struct ExecuteServiceResponse {
    pub address: String,
    pub output: String,
}

#[derive(Debug, Clone)]
pub struct GetPublicKeyRequest {
    pub address: String,
}

#[derive(Debug, Clone)]
pub struct GetPublicKeyResponse {
    /// Expiry timestamp of the key material, seconds since the epoch.
    pub timestamp: u64,
    pub address: String,
    pub public_key: String,
    pub signature: String,
}

#[derive(Debug, Clone)]
pub struct GetCodeRequest {
    pub address: String,
}

#[derive(Debug, Clone)]
pub struct GetCodeResponse {
    pub address: String,
    pub code: String,
}

#[derive(Debug, Clone)]
pub struct GetExpiryRequest {
    pub address: String,
}

#[derive(Debug, Clone)]
pub struct GetExpiryResponse {
    pub address: String,
    /// Expiry timestamp of the service, seconds since the epoch.
    pub expiry: u64,
}

/// Poll cursor as understood by the request manager. The HTTP layer applies
/// the client-facing default count before calling in.
#[derive(Debug, Clone, Copy)]
pub struct PollServiceRequest {
    pub offset: u64,
    pub count: usize,
    pub discard_previous: bool,
}

/// Terminal record for one submitted async request, stored serialized in the
/// session mailbox at the id that was returned for the request. The kind tag
/// travels with the event, so decoding never needs per-process state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum BackendEvent {
    #[serde(rename_all = "camelCase")]
    DeployServiceResponse { id: u64, address: String },
    #[serde(rename_all = "camelCase")]
    ExecuteServiceResponse {
        id: u64,
        address: String,
        output: String,
    },
    #[serde(rename_all = "camelCase")]
    ErrorEvent { id: u64, cause: RpcError },
}

impl BackendEvent {
    pub fn id(&self) -> u64 {
        match self {
            BackendEvent::DeployServiceResponse { id, .. }
            | BackendEvent::ExecuteServiceResponse { id, .. }
            | BackendEvent::ErrorEvent { id, .. } => *id,
        }
    }
}

/// An ordered batch of events answered from `offset`.
#[derive(Debug, Clone, PartialEq)]
pub struct Events {
    pub offset: u64,
    pub events: Vec<BackendEvent>,
}

/// Interface to the execution backend. Deploy and execute are long-running
/// and reached through [`RequestManager`]; the lookups resolve synchronously.
#[async_trait]
pub trait Client: Send + Sync {
    async fn deploy_service(&self, request: DeployServiceRequest)
        -> Result<DeployServiceResponse>;

    async fn execute_service(
        &self,
        request: ExecuteServiceRequest,
    ) -> Result<ExecuteServiceResponse>;

    /// Public key a client uses to encrypt request data for a service.
    async fn get_public_key(&self, request: GetPublicKeyRequest)
        -> Result<GetPublicKeyResponse>;

    async fn get_code(&self, request: GetCodeRequest) -> Result<GetCodeResponse>;

    async fn get_expiry(&self, request: GetExpiryRequest) -> Result<GetExpiryResponse>;
}
