//! Identity verification middleware
//!
//! Outermost stage of the protected pipeline. Resolves the bearer
//! credential to an [`Identity`] and stores it in the request extensions
//! for the rate-limit and usage stages, or terminates the request with 401.
//! A request without a resolvable identity never reaches a downstream
//! stage.

use actix_web::{
    body::{BoxBody, EitherBody},
    dev::{Service, ServiceRequest, ServiceResponse, Transform},
    http::header::Header,
    Error, HttpMessage, HttpResponse,
};
use actix_web_httpauth::headers::authorization::{Authorization, Bearer};
use futures::future::{ok, LocalBoxFuture, Ready};
use std::rc::Rc;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::auth::{Identity, IdentityVerifier};

/// Middleware factory for identity verification
pub struct IdentityGuard {
    verifier: Arc<dyn IdentityVerifier>,
}

impl IdentityGuard {
    pub fn new(verifier: Arc<dyn IdentityVerifier>) -> Self {
        Self { verifier }
    }
}

impl<S, B> Transform<S, ServiceRequest> for IdentityGuard
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B, BoxBody>>;
    type Error = Error;
    type Transform = IdentityGuardService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ok(IdentityGuardService {
            service: Rc::new(service),
            verifier: self.verifier.clone(),
        })
    }
}

pub struct IdentityGuardService<S> {
    service: Rc<S>,
    verifier: Arc<dyn IdentityVerifier>,
}

impl<S, B> Service<ServiceRequest> for IdentityGuardService<S>
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
        let verifier = self.verifier.clone();

        Box::pin(async move {
            let token = match Authorization::<Bearer>::parse(&req) {
                Ok(auth) => auth.as_ref().token().to_string(),
                Err(_) => {
                    warn!(path = %req.path(), "Missing bearer credential");
                    let response = unauthorized("Bearer credential required");
                    return Ok(req.into_response(response).map_into_right_body());
                }
            };

            match verifier.verify(&token).await {
                Ok(identity) => {
                    debug!(user_id = %identity.user_id, "Identity verified");
                    req.extensions_mut().insert(identity);

                    let res = service.call(req).await?;
                    Ok(res.map_into_left_body())
                }
                Err(e) => {
                    warn!(error = %e, path = %req.path(), "Bearer credential rejected");
                    let response = unauthorized(&e.to_string());
                    Ok(req.into_response(response).map_into_right_body())
                }
            }
        })
    }
}

fn unauthorized(message: &str) -> HttpResponse {
    HttpResponse::Unauthorized().json(serde_json::json!({
        "error": "unauthorized",
        "message": message,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::testing::StaticVerifier;
    use actix_web::http::StatusCode;
    use actix_web::{test, web, App, HttpRequest};

    async fn echo_identity(req: HttpRequest) -> HttpResponse {
        match req.extensions().get::<Identity>() {
            Some(identity) => HttpResponse::Ok().body(identity.user_id.clone()),
            None => HttpResponse::InternalServerError().body("no identity"),
        }
    }

    fn guard(identity: Option<&str>) -> IdentityGuard {
        IdentityGuard::new(Arc::new(StaticVerifier {
            identity: identity.map(str::to_string),
        }))
    }

    #[actix_web::test]
    async fn test_missing_credential_is_401() {
        let app = test::init_service(
            App::new()
                .wrap(guard(Some("user_1")))
                .route("/", web::post().to(echo_identity)),
        )
        .await;

        let req = test::TestRequest::post().uri("/").to_request();
        let res = test::call_service(&app, req).await;
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }

    #[actix_web::test]
    async fn test_rejected_credential_is_401() {
        let app = test::init_service(
            App::new()
                .wrap(guard(None))
                .route("/", web::post().to(echo_identity)),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/")
            .insert_header(("Authorization", "Bearer bad-token"))
            .to_request();
        let res = test::call_service(&app, req).await;
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }

    #[actix_web::test]
    async fn test_verified_identity_reaches_handler() {
        let app = test::init_service(
            App::new()
                .wrap(guard(Some("user_42")))
                .route("/", web::post().to(echo_identity)),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/")
            .insert_header(("Authorization", "Bearer good-token"))
            .to_request();
        let res = test::call_service(&app, req).await;
        assert_eq!(res.status(), StatusCode::OK);

        let body = test::read_body(res).await;
        assert_eq!(&body[..], b"user_42");
    }
}
