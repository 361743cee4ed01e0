//! Rate limiting middleware
//!
//! Runs strictly after identity verification: the quota counter is keyed by
//! the resolved identity and must never observe an anonymous request. A
//! request arriving here without an identity is rejected outright rather
//! than counted against a shared bucket.

use actix_web::{
    body::{BoxBody, EitherBody},
    dev::{Service, ServiceRequest, ServiceResponse, Transform},
    Error, HttpMessage, HttpResponse,
};
use futures::future::{ok, LocalBoxFuture, Ready};
use std::rc::Rc;
use tracing::warn;

use crate::auth::Identity;
use crate::ratelimit::{QuotaCounter, QuotaDecision};

pub const RETRY_AFTER: &str = "Retry-After";

/// Middleware factory for per-identity rate limiting
pub struct QuotaGuard {
    counter: QuotaCounter,
}

impl QuotaGuard {
    pub fn new(counter: QuotaCounter) -> Self {
        Self { counter }
    }
}

impl<S, B> Transform<S, ServiceRequest> for QuotaGuard
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B, BoxBody>>;
    type Error = Error;
    type Transform = QuotaGuardService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ok(QuotaGuardService {
            service: Rc::new(service),
            counter: self.counter.clone(),
        })
    }
}

pub struct QuotaGuardService<S> {
    service: Rc<S>,
    counter: QuotaCounter,
}

impl<S, B> Service<ServiceRequest> for QuotaGuardService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B, BoxBody>>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(
        &self,
        ctx: &mut core::task::Context<'_>,
    ) -> core::task::Poll<Result<(), Self::Error>> {
        self.service.poll_ready(ctx)
    }

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = self.service.clone();
        let counter = self.counter.clone();

        Box::pin(async move {
            let identity = req.extensions().get::<Identity>().cloned();
            let Some(identity) = identity else {
                // Identity middleware runs first; reaching this without one
                // is a composition fault, answered like any other
                // unauthenticated request.
                warn!(path = %req.path(), "No identity resolved before quota check");
                let response = HttpResponse::Unauthorized().json(serde_json::json!({
                    "error": "unauthorized",
                    "message": "No identity resolved for request",
                }));
                return Ok(req.into_response(response).map_into_right_body());
            };

            match counter.check(&identity.user_id).await {
                QuotaDecision::Allowed => {
                    let res = service.call(req).await?;
                    Ok(res.map_into_left_body())
                }
                QuotaDecision::Denied { retry_after_secs } => {
                    warn!(user_id = %identity.user_id, "Rate limit exceeded");
                    let response = too_many_requests(counter.limit(), retry_after_secs);
                    Ok(req.into_response(response).map_into_right_body())
                }
                QuotaDecision::Unavailable => {
                    let response = HttpResponse::ServiceUnavailable().json(serde_json::json!({
                        "error": "counter_store_unavailable",
                        "message": "Rate limit counter is unavailable",
                    }));
                    Ok(req.into_response(response).map_into_right_body())
                }
            }
        })
    }
}

/// 429 response carrying the retry hint
fn too_many_requests(limit: i64, retry_after_secs: u64) -> HttpResponse {
    HttpResponse::TooManyRequests()
        .insert_header((RETRY_AFTER, retry_after_secs.to_string()))
        .json(serde_json::json!({
            "error": "rate_limit_exceeded",
            "message": format!(
                "Rate limit exceeded. Maximum {} requests per minute.",
                limit
            ),
            "retry_after_seconds": retry_after_secs,
        }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::middleware::IdentityGuard;
    use crate::auth::testing::StaticVerifier;
    use actix_web::http::StatusCode;
    use actix_web::{test, web, App};
    use std::sync::Arc;

    async fn handler() -> HttpResponse {
        HttpResponse::Ok().body("passed")
    }

    #[actix_web::test]
    async fn test_request_without_identity_is_rejected() {
        // QuotaGuard alone, nothing upstream inserting an identity
        let app = test::init_service(
            App::new()
                .wrap(QuotaGuard::new(QuotaCounter::disabled(10, 60)))
                .route("/", web::post().to(handler)),
        )
        .await;

        let req = test::TestRequest::post().uri("/").to_request();
        let res = test::call_service(&app, req).await;
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }

    #[actix_web::test]
    async fn test_identity_with_disabled_counter_passes() {
        let verifier = Arc::new(StaticVerifier {
            identity: Some("user_1".to_string()),
        });
        let app = test::init_service(
            App::new()
                .wrap(QuotaGuard::new(QuotaCounter::disabled(10, 60)))
                .wrap(IdentityGuard::new(verifier))
                .route("/", web::post().to(handler)),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/")
            .insert_header(("Authorization", "Bearer token"))
            .to_request();
        let res = test::call_service(&app, req).await;
        assert_eq!(res.status(), StatusCode::OK);
    }

    #[test]
    async fn test_denied_response_carries_retry_hint() {
        let response = too_many_requests(10, 60);
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok()),
            Some("60")
        );
    }
}
