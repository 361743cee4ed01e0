//! Health check endpoint

use actix_web::HttpResponse;

/// GET /health - liveness probe
///
/// Unauthenticated and independent of every downstream subsystem: it must
/// answer even when the identity provider, counter store, log store, and
/// upstream are all down.
pub async fn health_check() -> HttpResponse {
    HttpResponse::Ok().body("OK")
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::http::StatusCode;
    use actix_web::{test, web, App};

    #[actix_web::test]
    async fn test_health_is_200_ok() {
        let app = test::init_service(
            App::new().route("/health", web::get().to(health_check)),
        )
        .await;

        let req = test::TestRequest::get().uri("/health").to_request();
        let res = test::call_service(&app, req).await;
        assert_eq!(res.status(), StatusCode::OK);

        let body = test::read_body(res).await;
        assert_eq!(&body[..], b"OK");
    }
}
