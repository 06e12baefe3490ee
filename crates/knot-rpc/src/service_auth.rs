//! `ServiceAuth` bearer JWT verification.
//!
//! The audience must be the knot's own DID; the subject becomes `ActorDid`
//! in request context. This implementation verifies an HS256
//! JWT whose signing secret is provisioned per-DID by the appview and
//! fetched through a pluggable [`ServiceAuthKeyResolver`], keeping the
//! verification mechanism swappable without touching the audience/subject
//! contract.

use async_trait::async_trait;
use axum::extract::{FromRef, FromRequestParts};
use axum::http::request::Parts;
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;

/// Resolves the HS256 signing secret the asserting DID was provisioned by
/// the appview, so the JWT's signature can be verified.
#[async_trait]
pub trait ServiceAuthKeyResolver: Send + Sync {
    async fn resolve_key(&self, did: &str) -> Result<String, ApiError>;
}

/// Fetches the signing secret from `{APPVIEW_ENDPOINT}/service-auth-key/{did}`.
pub struct AppviewKeyResolver {
    client: reqwest::Client,
    endpoint: String,
}

impl AppviewKeyResolver {
    pub fn new(endpoint: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint,
        }
    }
}

#[async_trait]
impl ServiceAuthKeyResolver for AppviewKeyResolver {
    async fn resolve_key(&self, did: &str) -> Result<String, ApiError> {
        #[derive(Deserialize)]
        struct KeyResponse {
            key: String,
        }
        let url = format!("{}/service-auth-key/{did}", self.endpoint);
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ApiError::InternalServerError(anyhow::anyhow!(e)))?;
        if !resp.status().is_success() {
            return Err(ApiError::MissingActorDid);
        }
        let body: KeyResponse = resp
            .json()
            .await
            .map_err(|e| ApiError::InternalServerError(anyhow::anyhow!(e)))?;
        Ok(body.key)
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct ServiceAuthClaims {
    iss: String,
    aud: String,
    exp: usize,
}

/// The caller's DID, established by a verified `ServiceAuth` bearer JWT.
/// Only mutation handlers extract this; read handlers never require it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActorDid(pub String);

impl<S> FromRequestParts<S> for ActorDid
where
    S: Send + Sync,
    crate::state::AppState: FromRef<S>,
    std::sync::Arc<dyn ServiceAuthKeyResolver>: FromRef<S>,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let app_state = crate::state::AppState::from_ref(state);
        let resolver = std::sync::Arc::<dyn ServiceAuthKeyResolver>::from_ref(state);

        let header = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .ok_or(ApiError::MissingActorDid)?;

        verify_service_auth(header, &app_state.config.owner_did, resolver.as_ref())
            .await
            .map(ActorDid)
    }
}

async fn verify_service_auth(
    token: &str,
    expected_audience: &str,
    resolver: &dyn ServiceAuthKeyResolver,
) -> Result<String, ApiError> {
    decode_header(token).map_err(|e| ApiError::InvalidRequest(e.to_string()))?;

    // The signing secret belongs to the asserting DID, so the subject is
    // read from the payload before its signature can be checked; the real
    // verification happens immediately after, keyed by that same DID.
    let mut unverified_validation = Validation::new(Algorithm::HS256);
    unverified_validation.insecure_disable_signature_validation();
    unverified_validation.validate_aud = false;
    unverified_validation.validate_exp = false;
    let unverified = decode::<ServiceAuthClaims>(token, &DecodingKey::from_secret(&[]), &unverified_validation)
        .map_err(|e| ApiError::InvalidRequest(e.to_string()))?;
    let secret = resolver.resolve_key(&unverified.claims.iss).await?;

    let mut validation = Validation::new(Algorithm::HS256);
    validation.set_audience(&[expected_audience]);
    let decoded = decode::<ServiceAuthClaims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )
    .map_err(|_| ApiError::MissingActorDid)?;

    Ok(decoded.claims.iss)
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};

    struct StaticResolver(String);

    #[async_trait]
    impl ServiceAuthKeyResolver for StaticResolver {
        async fn resolve_key(&self, _did: &str) -> Result<String, ApiError> {
            Ok(self.0.clone())
        }
    }

    fn sign(iss: &str, aud: &str, secret: &str) -> String {
        let claims = ServiceAuthClaims {
            iss: iss.to_string(),
            aud: aud.to_string(),
            exp: (chrono::Utc::now().timestamp() + 300) as usize,
        };
        encode(&Header::new(Algorithm::HS256), &claims, &EncodingKey::from_secret(secret.as_bytes())).unwrap()
    }

    #[tokio::test]
    async fn a_correctly_signed_token_resolves_to_its_subject() {
        let token = sign("did:plc:caller", "did:web:knot.example", "shh");
        let resolver = StaticResolver("shh".to_string());
        let did = verify_service_auth(&token, "did:web:knot.example", &resolver).await.unwrap();
        assert_eq!(did, "did:plc:caller");
    }

    #[tokio::test]
    async fn a_token_signed_with_the_wrong_secret_is_rejected() {
        let token = sign("did:plc:caller", "did:web:knot.example", "shh");
        let resolver = StaticResolver("different".to_string());
        assert!(verify_service_auth(&token, "did:web:knot.example", &resolver).await.is_err());
    }

    #[tokio::test]
    async fn a_token_with_the_wrong_audience_is_rejected() {
        let token = sign("did:plc:caller", "did:web:someone-else", "shh");
        let resolver = StaticResolver("shh".to_string());
        assert!(verify_service_auth(&token, "did:web:knot.example", &resolver).await.is_err());
    }
}
