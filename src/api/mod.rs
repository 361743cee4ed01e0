//! API module - HTTP routes and the middleware pipeline

pub mod handlers;
pub mod middleware;

use actix_web::web;
use std::sync::Arc;

use crate::auth::IdentityVerifier;
use crate::db::UsageLogger;
use crate::ratelimit::QuotaCounter;

use middleware::{IdentityGuard, QuotaGuard, UsageRecorder};

/// Configure all routes.
///
/// The liveness check is unauthenticated. The protected scope wraps the
/// forwarding handler with, outermost first: identity verification, rate
/// limiting, usage recording. Actix applies the last-registered wrap first,
/// so registration order below is the reverse of execution order. Because
/// usage recording is the innermost stage, requests terminated by the outer
/// guards (401/429) are not logged.
pub fn configure_routes(
    cfg: &mut web::ServiceConfig,
    verifier: Arc<dyn IdentityVerifier>,
    counter: QuotaCounter,
    logger: Option<UsageLogger>,
) {
    cfg.service(
        web::scope("/api")
            .wrap(UsageRecorder::new(logger))
            .wrap(QuotaGuard::new(counter))
            .wrap(IdentityGuard::new(verifier))
            .route(
                "/generate-content",
                web::post().to(handlers::generate::generate_content),
            ),
    )
    .route("/health", web::get().to(handlers::health::health_check));
}
