//! Clerk bearer-token verification
//!
//! Session tokens are RS256 JWTs signed by Clerk. Verification is fully
//! delegated to the provider: the verifier fetches the JWKS published by the
//! provider's backend API (authorized with the instance secret key), caches
//! it, and validates signature and expiry locally. The `sub` claim is the
//! stable user id.

use async_trait::async_trait;
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use reqwest::Client;
use serde::Deserialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::{AuthError, Identity, IdentityVerifier};
use crate::config::AuthSettings;

/// How long a fetched key set is trusted before it is refreshed.
const JWKS_CACHE_TTL: Duration = Duration::from_secs(3600);

/// JSON Web Key Set as served by the provider
#[derive(Debug, Deserialize, Clone)]
pub struct Jwks {
    pub keys: Vec<JwkKey>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct JwkKey {
    pub kty: String,
    pub kid: String,
    pub n: String,
    pub e: String,
    pub alg: Option<String>,
    #[serde(rename = "use")]
    pub use_: Option<String>,
}

impl Jwks {
    /// Select the key matching a token header's `kid`.
    pub fn find(&self, kid: &str) -> Option<&JwkKey> {
        self.keys.iter().find(|k| k.kid == kid)
    }
}

/// Claims carried by a Clerk session token
#[derive(Debug, Deserialize)]
struct SessionClaims {
    sub: String,
    #[allow(dead_code)]
    exp: usize,
}

/// JWKS-backed identity verifier for Clerk session tokens
pub struct ClerkVerifier {
    client: Client,
    secret_key: String,
    jwks_url: String,
    jwks_cache: Arc<Mutex<Option<(Jwks, Instant)>>>,
}

impl ClerkVerifier {
    pub fn new(settings: &AuthSettings) -> Self {
        if settings.secret_key.is_empty() {
            warn!("Identity provider secret key is not set; bearer tokens will be rejected");
        }

        ClerkVerifier {
            client: Client::new(),
            secret_key: settings.secret_key.clone(),
            jwks_url: settings.jwks_url.clone(),
            jwks_cache: Arc::new(Mutex::new(None)),
        }
    }

    /// Fetch the provider key set, serving from cache while fresh.
    async fn get_jwks(&self) -> Result<Jwks, AuthError> {
        {
            let cache = self.jwks_cache.lock().await;
            if let Some((jwks, fetched_at)) = &*cache {
                if fetched_at.elapsed() < JWKS_CACHE_TTL {
                    return Ok(jwks.clone());
                }
            }
        }

        debug!(url = %self.jwks_url, "Fetching identity provider JWKS");

        let response = self
            .client
            .get(&self.jwks_url)
            .bearer_auth(&self.secret_key)
            .send()
            .await
            .map_err(|e| AuthError::Provider(format!("JWKS fetch failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(AuthError::Provider(format!(
                "JWKS endpoint returned {}",
                response.status()
            )));
        }

        let jwks: Jwks = response
            .json()
            .await
            .map_err(|e| AuthError::Provider(format!("JWKS parse failed: {}", e)))?;

        let mut cache = self.jwks_cache.lock().await;
        *cache = Some((jwks.clone(), Instant::now()));

        Ok(jwks)
    }
}

#[async_trait]
impl IdentityVerifier for ClerkVerifier {
    async fn verify(&self, token: &str) -> Result<Identity, AuthError> {
        let header = decode_header(token)
            .map_err(|e| AuthError::InvalidToken(format!("malformed token: {}", e)))?;
        let kid = header
            .kid
            .ok_or_else(|| AuthError::InvalidToken("token header missing kid".to_string()))?;

        let jwks = self.get_jwks().await?;
        let key = jwks
            .find(&kid)
            .ok_or_else(|| AuthError::InvalidToken(format!("no provider key matches kid {}", kid)))?;

        let decoding_key = DecodingKey::from_rsa_components(&key.n, &key.e)
            .map_err(|e| AuthError::Provider(format!("invalid JWKS key material: {}", e)))?;

        let mut validation = Validation::new(Algorithm::RS256);
        // Session tokens carry no audience claim
        validation.validate_aud = false;

        let data = decode::<SessionClaims>(token, &decoding_key, &validation)
            .map_err(|e| AuthError::InvalidToken(format!("signature validation failed: {}", e)))?;

        Ok(Identity {
            user_id: data.claims.sub,
        })
    }
}
