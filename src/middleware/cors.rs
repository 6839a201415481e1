use axum::{
    Router,
    extract::{Request, State},
    http::{HeaderValue, Method, StatusCode, header::ORIGIN},
    middleware::{Next, from_fn_with_state},
    response::Response,
};
use tower_http::cors::{AllowHeaders, CorsLayer};

use crate::{
    config::{ConfigError, CorsConfig},
    error::{AppError, AppResult},
};

pub const ALLOWED_METHODS: [Method; 6] = [
    Method::GET,
    Method::HEAD,
    Method::PUT,
    Method::PATCH,
    Method::POST,
    Method::DELETE,
];

/// Preflight responses use this status instead of 200.
pub const PREFLIGHT_STATUS: StatusCode = StatusCode::NO_CONTENT;

/// Single-origin, credentialed cross-origin policy.
#[derive(Debug, Clone)]
pub struct CorsPolicy {
    origin: HeaderValue,
}

impl CorsPolicy {
    pub fn new(config: &CorsConfig) -> Result<Self, ConfigError> {
        let origin = HeaderValue::from_str(config.allowed_origin.trim()).map_err(|_| {
            ConfigError::InvalidValue {
                key: "CORS_ORIGIN",
                value: config.allowed_origin.clone(),
            }
        })?;
        Ok(Self { origin })
    }

    pub fn origin(&self) -> &HeaderValue {
        &self.origin
    }

    pub fn layer(&self) -> CorsLayer {
        CorsLayer::new()
            .allow_origin(self.origin.clone())
            .allow_methods(ALLOWED_METHODS.to_vec())
            .allow_headers(AllowHeaders::mirror_request())
            .allow_credentials(true)
    }

    /// The origin gate runs first, then the header-writing layer.
    pub fn wrap(&self, router: Router) -> Router {
        router
            .layer(self.layer())
            .layer(from_fn_with_state(self.clone(), enforce_origin))
    }
}

/// Reject foreign origins and give preflights the configured status.
pub async fn enforce_origin(
    State(policy): State<CorsPolicy>,
    request: Request,
    next: Next,
) -> AppResult<Response> {
    if let Some(origin) = request.headers().get(ORIGIN) {
        if origin != policy.origin() {
            tracing::debug!(origin = ?origin, "Rejected cross-origin request");
            return Err(AppError::CrossOrigin);
        }
    }

    let preflight = request.method() == Method::OPTIONS;
    let mut response = next.run(request).await;
    if preflight && response.status() == StatusCode::OK {
        *response.status_mut() = PREFLIGHT_STATUS;
    }
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, routing::get};
    use tower::ServiceExt;

    fn app() -> Router {
        let policy = CorsPolicy::new(&CorsConfig {
            allowed_origin: "http://localhost:5173".into(),
        })
        .unwrap();
        policy.wrap(Router::new().route("/", get(|| async { "ok" })))
    }

    #[tokio::test]
    async fn requests_without_origin_pass() {
        let response = app()
            .oneshot(axum::http::Request::get("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn allowed_origin_gets_credentialed_headers() {
        let response = app()
            .oneshot(
                axum::http::Request::get("/")
                    .header(ORIGIN, "http://localhost:5173")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()["access-control-allow-origin"],
            "http://localhost:5173"
        );
        assert_eq!(response.headers()["access-control-allow-credentials"], "true");
    }

    #[tokio::test]
    async fn foreign_origin_is_rejected() {
        let response = app()
            .oneshot(
                axum::http::Request::get("/")
                    .header(ORIGIN, "https://evil.example")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn invalid_origin_is_a_config_error() {
        let err = CorsPolicy::new(&CorsConfig {
            allowed_origin: "http://bad\norigin".into(),
        })
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }
}
