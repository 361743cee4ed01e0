//! Content Gateway
//!
//! Minimal API gateway in front of the Google Generative Language API:
//! bearer-token identity verification, per-user fixed-window rate limiting,
//! asynchronous usage logging, and a streaming pass-through proxy for the
//! generate-content endpoint. Every downstream dependency degrades
//! gracefully: the server binds and serves even when the identity provider,
//! counter store, or log store is unconfigured or down.

use actix_web::{middleware, web, App, HttpServer};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_actix_web::TracingLogger;

mod api;
mod auth;
mod config;
mod db;
mod providers;
mod ratelimit;

use crate::auth::{ClerkVerifier, IdentityVerifier};
use crate::config::Settings;
use crate::db::{DbPool, UsageLogger, UsageRepository};
use crate::providers::GeminiClient;
use crate::ratelimit::QuotaCounter;

/// Maximum accepted request body; generate-content payloads can carry
/// inline media.
const MAX_PAYLOAD_BYTES: usize = 10 * 1024 * 1024;

/// Application state shared across all handlers
pub struct AppState {
    pub gemini: GeminiClient,
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Initialize tracing subscriber for structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("content_gateway=info".parse().unwrap())
                .add_directive("actix_web=info".parse().unwrap()),
        )
        .json()
        .init();

    // Load configuration
    let settings = Settings::load().expect("Failed to load configuration");
    let bind_addr = format!("{}:{}", settings.server.host, settings.server.port);

    info!(
        "Starting content-gateway v{} on {}",
        env!("CARGO_PKG_VERSION"),
        bind_addr
    );

    // Identity provider (an empty secret key warns inside the constructor
    // and surfaces as 401s at runtime)
    let verifier: Arc<dyn IdentityVerifier> = Arc::new(ClerkVerifier::new(&settings.auth));

    // Counter store; unconfigured or invalid means rate limiting disabled
    let counter = QuotaCounter::new(&settings.redis);

    // Log store; unconfigured or unreachable means usage logging disabled
    let usage_logger = if !settings.database.url.is_empty() {
        match DbPool::new(&settings.database.url) {
            Ok(pool) => {
                if let Err(e) = pool.test_connection().await {
                    warn!(
                        "Database connection test failed: {}. Running without usage logging.",
                        e
                    );
                    None
                } else {
                    let repo = UsageRepository::new(pool.clone());
                    match repo.ensure_schema().await {
                        Ok(()) => {
                            info!("Database pool initialized, usage logging enabled");
                            Some(UsageLogger::spawn(pool))
                        }
                        Err(e) => {
                            warn!(
                                "Failed to prepare request_logs table: {}. Running without usage logging.",
                                e
                            );
                            None
                        }
                    }
                }
            }
            Err(e) => {
                warn!(
                    "Failed to create database pool: {}. Running without usage logging.",
                    e
                );
                None
            }
        }
    } else {
        info!("No database URL configured, running without usage logging");
        None
    };

    // Upstream client; a missing API key surfaces as 500 per request
    let gemini = GeminiClient::new(&settings.gemini);
    if !gemini.has_api_key() {
        warn!("Upstream API key is not configured; generate-content requests will fail");
    }

    let app_state = web::Data::new(AppState { gemini });
    let workers = settings
        .server
        .workers
        .unwrap_or_else(|| num_cpus::get() * 2);

    // Configure and start HTTP server
    HttpServer::new(move || {
        let verifier = verifier.clone();
        let counter = counter.clone();
        let usage_logger = usage_logger.clone();

        App::new()
            .app_data(app_state.clone())
            .app_data(web::PayloadConfig::new(MAX_PAYLOAD_BYTES))
            .wrap(TracingLogger::default())
            .wrap(
                middleware::DefaultHeaders::new()
                    .add(("X-Service", "content-gateway"))
                    .add(("X-Version", env!("CARGO_PKG_VERSION"))),
            )
            .configure(move |cfg| api::configure_routes(cfg, verifier, counter, usage_logger))
    })
    .workers(workers)
    .bind(&bind_addr)?
    .run()
    .await
}
