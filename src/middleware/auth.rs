use crate::error::AppError;
use actix_web::{
    body::EitherBody,
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    Error, ResponseError,
};
use futures_util::future::LocalBoxFuture;
use std::future::{ready, Ready};
use std::rc::Rc;

pub const API_KEY_HEADER: &str = "X-API-Key";

/// Rejects requests whose `X-API-Key` header doesn't match the configured
/// key. With no key configured every request passes.
pub struct ApiKeyAuth {
    api_key: Option<Rc<str>>,
}

impl ApiKeyAuth {
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            api_key: api_key.filter(|key| !key.is_empty()).map(Rc::from),
        }
    }
}

impl<S, B> Transform<S, ServiceRequest> for ApiKeyAuth
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type InitError = ();
    type Transform = ApiKeyAuthMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(ApiKeyAuthMiddleware {
            service,
            api_key: self.api_key.clone(),
        }))
    }
}

pub struct ApiKeyAuthMiddleware<S> {
    service: S,
    api_key: Option<Rc<str>>,
}

impl<S, B> Service<ServiceRequest> for ApiKeyAuthMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        if let Some(expected) = &self.api_key {
            let provided = req
                .headers()
                .get(API_KEY_HEADER)
                .and_then(|value| value.to_str().ok());

            if provided != Some(&**expected) {
                tracing::warn!(
                    uri = %req.uri(),
                    header_present = provided.is_some(),
                    "Rejected request with invalid API key"
                );
                let response = AppError::Forbidden("Invalid or missing API key".to_string())
                    .error_response();
                return Box::pin(async move {
                    Ok(req.into_response(response).map_into_right_body())
                });
            }
        }

        let fut = self.service.call(req);
        Box::pin(async move { Ok(fut.await?.map_into_left_body()) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{http::StatusCode, test, web, App, HttpResponse};

    async fn status_for(api_key: Option<&str>, header: Option<&str>) -> StatusCode {
        let app = test::init_service(
            App::new().service(
                web::scope("/v1")
                    .wrap(ApiKeyAuth::new(api_key.map(String::from)))
                    .route("/ping", web::post().to(HttpResponse::Ok)),
            ),
        )
        .await;

        let mut req = test::TestRequest::post().uri("/v1/ping");
        if let Some(value) = header {
            req = req.insert_header((API_KEY_HEADER, value));
        }
        test::call_service(&app, req.to_request()).await.status()
    }

    #[actix_web::test]
    async fn test_no_configured_key_allows_everything() {
        assert_eq!(status_for(None, None).await, StatusCode::OK);
        assert_eq!(status_for(Some(""), None).await, StatusCode::OK);
    }

    #[actix_web::test]
    async fn test_key_must_match() {
        assert_eq!(status_for(Some("s3cret"), Some("s3cret")).await, StatusCode::OK);
        assert_eq!(status_for(Some("s3cret"), Some("wrong")).await, StatusCode::FORBIDDEN);
        assert_eq!(status_for(Some("s3cret"), None).await, StatusCode::FORBIDDEN);
    }

    #[actix_web::test]
    async fn test_rejection_body_has_detail() {
        let app = test::init_service(
            App::new().service(
                web::scope("/v1")
                    .wrap(ApiKeyAuth::new(Some("s3cret".into())))
                    .route("/ping", web::post().to(HttpResponse::Ok)),
            ),
        )
        .await;

        let req = test::TestRequest::post().uri("/v1/ping").to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["detail"], "Invalid or missing API key");
    }
}
