//! Google Gemini upstream client
//!
//! Builds and issues the outbound generate-content call. The caller's body
//! is relayed as-is with the content type forced to JSON; the response is
//! handed back still streaming so the handler can relay it chunk by chunk.
//!
//! API Docs: https://ai.google.dev/api/generate-content

use bytes::Bytes;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Response};
use thiserror::Error;
use tracing::debug;

use crate::config::GeminiSettings;

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";
pub const DEFAULT_MODEL: &str = "gemini-3-pro-preview";

/// Upstream call errors
#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("upstream API key is not configured")]
    MissingApiKey,

    #[error("failed to build upstream request: {0}")]
    Request(String),

    #[error("upstream unreachable: {0}")]
    Unreachable(#[from] reqwest::Error),
}

/// Client for the generate-content endpoint
#[derive(Clone)]
pub struct GeminiClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    default_model: String,
}

impl GeminiClient {
    pub fn new(settings: &GeminiSettings) -> Self {
        let api_key = if settings.api_key.is_empty() {
            None
        } else {
            Some(settings.api_key.clone())
        };

        GeminiClient {
            // No request timeout: a generate call may stream for minutes,
            // and no timeout policy is configured for the upstream.
            client: Client::new(),
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            api_key,
            default_model: settings.default_model.clone(),
        }
    }

    pub fn default_model(&self) -> &str {
        &self.default_model
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    fn endpoint_url(&self, model: &str, api_key: &str) -> String {
        format!(
            "{}/{}:generateContent?key={}",
            self.base_url, model, api_key
        )
    }

    /// Issue the outbound call, body passed through untouched.
    ///
    /// A missing API key fails before any outbound attempt; a request that
    /// cannot be built is distinguished from an unreachable upstream so the
    /// handler can map them to 500 and 502 respectively.
    pub async fn generate_content(
        &self,
        model: &str,
        body: Bytes,
    ) -> Result<Response, UpstreamError> {
        let api_key = self.api_key.as_deref().ok_or(UpstreamError::MissingApiKey)?;

        let url = self.endpoint_url(model, api_key);
        debug!(model = %model, "Forwarding generate-content request upstream");

        let request = self
            .client
            .post(&url)
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .build()
            .map_err(|e| UpstreamError::Request(e.to_string()))?;

        let response = self.client.execute(request).await?;
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(api_key: &str, base_url: &str) -> GeminiClient {
        GeminiClient::new(&GeminiSettings {
            api_key: api_key.to_string(),
            base_url: base_url.to_string(),
            default_model: DEFAULT_MODEL.to_string(),
        })
    }

    #[test]
    fn test_endpoint_url() {
        let client = client("secret", "https://example.test/v1beta/models/");
        assert_eq!(
            client.endpoint_url("gemini-3-pro-preview", "secret"),
            "https://example.test/v1beta/models/gemini-3-pro-preview:generateContent?key=secret"
        );
    }

    #[test]
    fn test_empty_api_key_is_unconfigured() {
        assert!(!client("", DEFAULT_BASE_URL).has_api_key());
        assert!(client("k", DEFAULT_BASE_URL).has_api_key());
    }

    #[tokio::test]
    async fn test_missing_api_key_fails_without_outbound_call() {
        // Base URL points nowhere; the call must fail before reaching it
        let client = client("", "http://127.0.0.1:9/models");
        let err = client
            .generate_content(DEFAULT_MODEL, Bytes::from_static(b"{}"))
            .await
            .unwrap_err();
        assert!(matches!(err, UpstreamError::MissingApiKey));
    }

    #[tokio::test]
    async fn test_unreachable_upstream() {
        let client = client("k", "http://127.0.0.1:9/models");
        let err = client
            .generate_content(DEFAULT_MODEL, Bytes::from_static(b"{}"))
            .await
            .unwrap_err();
        assert!(matches!(err, UpstreamError::Unreachable(_)));
    }
}
