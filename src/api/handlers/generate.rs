//! Generate-content proxy endpoint
//!
//! Relays the validated request body to the upstream generate-content API
//! and streams the response back verbatim: upstream status and headers are
//! copied as received, and the body is forwarded chunk by chunk without
//! buffering, so arbitrarily large or streamed upstream responses flow
//! straight through.

use actix_web::http::header::{HeaderName, HeaderValue};
use actix_web::http::StatusCode;
use actix_web::{web, HttpResponse};
use serde::Deserialize;
use tracing::error;

use crate::providers::UpstreamError;
use crate::AppState;

/// Connection-level headers are owned by each hop; relaying them would
/// conflict with the framing actix chooses for the client response.
const HOP_BY_HOP_HEADERS: [&str; 4] = ["connection", "keep-alive", "transfer-encoding", "upgrade"];

#[derive(Debug, Deserialize)]
pub struct GenerateQuery {
    /// Target model identifier; falls back to the configured default
    pub model: Option<String>,
}

/// POST /api/generate-content - forward to the upstream model endpoint
pub async fn generate_content(
    state: web::Data<AppState>,
    query: web::Query<GenerateQuery>,
    body: web::Bytes,
) -> HttpResponse {
    let model = query
        .model
        .as_deref()
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| state.gemini.default_model());

    match state.gemini.generate_content(model, body).await {
        Ok(upstream) => relay(upstream),
        Err(e @ UpstreamError::MissingApiKey) | Err(e @ UpstreamError::Request(_)) => {
            error!(error = %e, "Upstream request could not be constructed");
            HttpResponse::InternalServerError().json(serde_json::json!({
                "error": "configuration_error",
                "message": e.to_string(),
            }))
        }
        Err(e) => {
            error!(error = %e, "Upstream call failed");
            HttpResponse::BadGateway().json(serde_json::json!({
                "error": "upstream_unreachable",
                "message": "Failed to contact the generate-content API",
            }))
        }
    }
}

/// Stream an upstream response through untouched.
fn relay(upstream: reqwest::Response) -> HttpResponse {
    let status = StatusCode::from_u16(upstream.status().as_u16())
        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

    let mut builder = HttpResponse::build(status);
    for (name, value) in upstream.headers() {
        if HOP_BY_HOP_HEADERS.contains(&name.as_str()) {
            continue;
        }
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_str().as_bytes()),
            HeaderValue::from_bytes(value.as_bytes()),
        ) {
            builder.insert_header((name, value));
        }
    }

    builder.streaming(upstream.bytes_stream())
}
