//! Session authentication data and payload verification.
//!
//! # Purpose
//! Extracts the authenticated session data the auth front end attaches to
//! every request (session key + expected AAD) and defines the verifier seam
//! handlers run request payloads through before any backend call.
//!
//! # Key invariants and assumptions
//! - The session key is opaque to the gateway; it only scopes mailbox state.
//! - Verification happens before any backend work and before an id is
//!   allocated, so a rejected payload never becomes observable.
use crate::api::error::{api_unauthorized, ApiError};
use axum::extract::FromRequestParts;
use axum::http::request::Parts;

/// Header carrying the opaque session key derived from client credentials.
pub const SESSION_HEADER: &str = "x-portico-session";

/// Header carrying the AAD request payloads must be bound to.
pub const AAD_HEADER: &str = "x-portico-aad";

/// Authenticated session data attached to a request.
#[derive(Debug, Clone)]
pub struct AuthData {
    /// Opaque identifier scoping all mailbox state for this client.
    pub session_key: String,
    /// AAD the verifier checks request payloads against. Empty when the
    /// auth front end binds no AAD.
    pub expected_aad: String,
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for AuthData
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> Result<Self, Self::Rejection> {
        let session_key = parts
            .headers
            .get(SESSION_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .ok_or_else(|| api_unauthorized("missing session key"))?
            .to_string();
        let expected_aad = parts
            .headers
            .get(AAD_HEADER)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_string();
        Ok(AuthData {
            session_key,
            expected_aad,
        })
    }
}

#[derive(thiserror::Error, Debug)]
#[error("payload is not bound to the expected AAD")]
pub struct VerifyError;

/// Checks that a request payload is bound to the caller's expected AAD.
pub trait Verifier: Send + Sync {
    fn verify(&self, data: &str, expected_aad: &str) -> Result<(), VerifyError>;
}

/// Development verifier that accepts every payload. Real deployments plug an
/// AAD scheme in behind the [`Verifier`] trait.
#[derive(Debug, Default)]
pub struct InsecureVerifier;

impl Verifier for InsecureVerifier {
    fn verify(&self, _data: &str, _expected_aad: &str) -> Result<(), VerifyError> {
        Ok(())
    }
}
