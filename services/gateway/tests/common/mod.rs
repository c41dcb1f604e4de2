use async_trait::async_trait;
use gateway::app::{build_router, AppState};
use gateway::auth::{InsecureVerifier, Verifier, VerifyError};
use portico_backend::{
    Client, DeployServiceRequest, DeployServiceResponse, Error, ExecuteServiceRequest,
    ExecuteServiceResponse, GetCodeRequest, GetCodeResponse, GetExpiryRequest, GetExpiryResponse,
    GetPublicKeyRequest, GetPublicKeyResponse, RequestManager, Result,
};
use portico_mqueue::MemMQueue;
use std::sync::Arc;

pub async fn read_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    serde_json::from_slice(&bytes).expect("json")
}

/// Scripted execution backend for the HTTP tests.
pub struct MockClient {
    pub fail: bool,
}

#[async_trait]
impl Client for MockClient {
    async fn deploy_service(
        &self,
        _request: DeployServiceRequest,
    ) -> Result<DeployServiceResponse> {
        if self.fail {
            return Err(Error::BackendUnavailable("mock backend down".to_string()));
        }
        Ok(DeployServiceResponse {
            address: "0xabc".to_string(),
        })
    }

    async fn execute_service(
        &self,
        request: ExecuteServiceRequest,
    ) -> Result<ExecuteServiceResponse> {
        if self.fail {
            return Err(Error::BackendUnavailable("mock backend down".to_string()));
        }
        Ok(ExecuteServiceResponse {
            address: request.address,
            output: format!("out:{}", request.data),
        })
    }

    async fn get_public_key(
        &self,
        request: GetPublicKeyRequest,
    ) -> Result<GetPublicKeyResponse> {
        Ok(GetPublicKeyResponse {
            timestamp: 1_700_000_000,
            address: request.address,
            public_key: "deadbeef".to_string(),
            signature: "cafe".to_string(),
        })
    }

    async fn get_code(&self, request: GetCodeRequest) -> Result<GetCodeResponse> {
        Ok(GetCodeResponse {
            address: request.address,
            code: "0061736d".to_string(),
        })
    }

    async fn get_expiry(&self, request: GetExpiryRequest) -> Result<GetExpiryResponse> {
        Ok(GetExpiryResponse {
            address: request.address,
            expiry: 1_700_000_000,
        })
    }
}

/// Verifier that rejects every payload, for exercising the AAD failure path.
pub struct RejectingVerifier;

impl Verifier for RejectingVerifier {
    fn verify(&self, _data: &str, _expected_aad: &str) -> std::result::Result<(), VerifyError> {
        Err(VerifyError)
    }
}

pub fn app_with(
    client: MockClient,
    verifier: impl Verifier + 'static,
) -> axum::routing::RouterIntoService<axum::body::Body, ()> {
    let client: Arc<dyn Client> = Arc::new(client);
    let manager = Arc::new(RequestManager::new(
        Arc::new(MemMQueue::new()),
        Arc::clone(&client),
    ));
    let state = AppState {
        manager,
        client,
        verifier: Arc::new(verifier),
    };
    build_router(state).into_service()
}

pub fn app() -> axum::routing::RouterIntoService<axum::body::Body, ()> {
    app_with(MockClient { fail: false }, InsecureVerifier)
}

pub fn failing_backend_app() -> axum::routing::RouterIntoService<axum::body::Body, ()> {
    app_with(MockClient { fail: true }, InsecureVerifier)
}
