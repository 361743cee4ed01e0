//! Usage recording middleware
//!
//! Innermost stage of the protected pipeline. Captures the final status of
//! whatever response the handler produced and hands one log entry to the
//! background writer; the enqueue never delays the client-visible response
//! and its failure never alters the response already produced. With no log
//! store configured this stage is a pass-through.

use actix_web::{
    dev::{Service, ServiceRequest, ServiceResponse, Transform},
    Error, HttpMessage,
};
use chrono::Utc;
use futures::future::{ok, LocalBoxFuture, Ready};
use std::rc::Rc;

use crate::auth::Identity;
use crate::db::{UsageLogEntry, UsageLogger};

/// Middleware factory for usage recording
pub struct UsageRecorder {
    logger: Option<UsageLogger>,
}

impl UsageRecorder {
    pub fn new(logger: Option<UsageLogger>) -> Self {
        Self { logger }
    }
}

impl<S, B> Transform<S, ServiceRequest> for UsageRecorder
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Transform = UsageRecorderService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ok(UsageRecorderService {
            service: Rc::new(service),
            logger: self.logger.clone(),
        })
    }
}

pub struct UsageRecorderService<S> {
    service: Rc<S>,
    logger: Option<UsageLogger>,
}

impl<S, B> Service<ServiceRequest> for UsageRecorderService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
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
        let logger = self.logger.clone();

        Box::pin(async move {
            let user_id = req
                .extensions()
                .get::<Identity>()
                .map(|identity| identity.user_id.clone());
            let endpoint = req.path().to_string();

            let res = service.call(req).await?;

            if let (Some(logger), Some(user_id)) = (logger, user_id) {
                logger.record(UsageLogEntry {
                    user_id,
                    endpoint,
                    status_code: res.status().as_u16() as i32,
                    created_at: Utc::now(),
                });
            }

            Ok(res)
        })
    }
}
