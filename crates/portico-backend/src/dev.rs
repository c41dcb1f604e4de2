//! Deterministic in-process backend for local development and tests.
//!
//! # Purpose
//! Stands in for the real execution backend when the gateway runs without
//! one: deploys are stored in memory, addresses are derived from the payload,
//! and executions echo their input. State resets on restart.
use crate::{
    Client, DeployServiceRequest, DeployServiceResponse, Error, ExecuteServiceRequest,
    ExecuteServiceResponse, GetCodeRequest, GetCodeResponse, GetExpiryRequest, GetExpiryResponse,
    GetPublicKeyRequest, GetPublicKeyResponse, Result,
};
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::RwLock;

// How long dev services and their key material stay valid.
const DEV_EXPIRY_WINDOW: Duration = Duration::from_secs(24 * 60 * 60);

fn derive_address(data: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(b"service|");
    hasher.update(data.as_bytes());
    let digest = hasher.finalize();
    // Truncated digest in the usual 0x-prefixed form.
    format!("0x{}", hex::encode(&digest[..20]))
}

fn derive_key_material(tag: &str, address: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(tag.as_bytes());
    hasher.update(b"|");
    hasher.update(address.as_bytes());
    hex::encode(hasher.finalize())
}

fn expiry_timestamp() -> u64 {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    (now + DEV_EXPIRY_WINDOW).as_secs()
}

/// In-memory backend: address derived from the deploy payload, executions
/// echo their input back as output.
#[derive(Debug, Default)]
pub struct DevClient {
    // Deployed services keyed by address; the stored value is the code blob.
    services: RwLock<HashMap<String, String>>,
}

impl DevClient {
    pub fn new() -> Self {
        Self::default()
    }

    async fn require_service(&self, address: &str) -> Result<String> {
        self.services
            .read()
            .await
            .get(address)
            .cloned()
            .ok_or_else(|| Error::Internal(format!("no service deployed at {address}")))
    }
}

#[async_trait]
impl Client for DevClient {
    async fn deploy_service(
        &self,
        request: DeployServiceRequest,
    ) -> Result<DeployServiceResponse> {
        let address = derive_address(&request.data);
        self.services
            .write()
            .await
            .insert(address.clone(), request.data);
        Ok(DeployServiceResponse { address })
    }

    async fn execute_service(
        &self,
        request: ExecuteServiceRequest,
    ) -> Result<ExecuteServiceResponse> {
        self.require_service(&request.address).await?;
        Ok(ExecuteServiceResponse {
            address: request.address,
            output: request.data,
        })
    }

    async fn get_public_key(
        &self,
        request: GetPublicKeyRequest,
    ) -> Result<GetPublicKeyResponse> {
        self.require_service(&request.address).await?;
        let public_key = derive_key_material("pk", &request.address);
        let signature = derive_key_material("sig", &public_key);
        Ok(GetPublicKeyResponse {
            timestamp: expiry_timestamp(),
            address: request.address,
            public_key,
            signature,
        })
    }

    async fn get_code(&self, request: GetCodeRequest) -> Result<GetCodeResponse> {
        let code = self.require_service(&request.address).await?;
        Ok(GetCodeResponse {
            address: request.address,
            code,
        })
    }

    async fn get_expiry(&self, request: GetExpiryRequest) -> Result<GetExpiryResponse> {
        self.require_service(&request.address).await?;
        Ok(GetExpiryResponse {
            address: request.address,
            expiry: expiry_timestamp(),
        })
    }
}
