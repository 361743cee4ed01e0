//! Identity verification against the external identity provider
//!
//! The gateway never mints or stores credentials itself. A bearer token is
//! either resolved to a stable user id by the provider's published keys, or
//! the request is terminated with 401 before it reaches any authenticated
//! stage.

pub mod clerk;

pub use clerk::ClerkVerifier;

use async_trait::async_trait;
use thiserror::Error;

/// Identity verification errors
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid token: {0}")]
    InvalidToken(String),

    #[error("identity provider error: {0}")]
    Provider(String),
}

/// Stable identity of an authenticated caller.
///
/// Attached to the request's extensions by the identity middleware and read
/// by the rate-limit and usage stages. Lives only for the duration of one
/// request.
#[derive(Clone, Debug)]
pub struct Identity {
    pub user_id: String,
}

/// Contract for resolving a bearer credential to an [`Identity`].
#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> Result<Identity, AuthError>;
}

#[cfg(test)]
pub mod testing {
    use super::*;

    /// Verifier stub that resolves every token to a fixed identity, or
    /// rejects everything when constructed with `None`.
    pub struct StaticVerifier {
        pub identity: Option<String>,
    }

    #[async_trait]
    impl IdentityVerifier for StaticVerifier {
        async fn verify(&self, _token: &str) -> Result<Identity, AuthError> {
            match &self.identity {
                Some(user_id) => Ok(Identity {
                    user_id: user_id.clone(),
                }),
                None => Err(AuthError::InvalidToken("token rejected".to_string())),
            }
        }
    }
}
