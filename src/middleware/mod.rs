//! The request pipeline.
//!
//! [`PIPELINE`] is the single source of truth for middleware order. Stage
//! `PIPELINE[0]` sees the request first and the response last; routers and
//! the fallback handlers sit inside the last stage.

pub mod body;
pub mod cookies;
pub mod cors;
pub mod headers;
pub mod sanitize;

use axum::{Router, middleware::from_fn};
use tower_http::{catch_panic::CatchPanicLayer, trace::TraceLayer};

use crate::{config::Environment, error::panic_response, state::AppState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Turns handler panics into the generic 500 response.
    CatchPanic,
    /// Per-request trace logging; skipped in production.
    RequestLog,
    JsonBody,
    SecureHeaders,
    ScriptSanitize,
    OperatorSanitize,
    Cookies,
    Cors,
}

pub const PIPELINE: [Stage; 8] = [
    Stage::CatchPanic,
    Stage::RequestLog,
    Stage::JsonBody,
    Stage::SecureHeaders,
    Stage::ScriptSanitize,
    Stage::OperatorSanitize,
    Stage::Cookies,
    Stage::Cors,
];

impl Stage {
    pub fn name(self) -> &'static str {
        match self {
            Stage::CatchPanic => "catch-panic",
            Stage::RequestLog => "request-log",
            Stage::JsonBody => "json-body",
            Stage::SecureHeaders => "secure-headers",
            Stage::ScriptSanitize => "script-sanitize",
            Stage::OperatorSanitize => "operator-sanitize",
            Stage::Cookies => "cookies",
            Stage::Cors => "cors",
        }
    }

    pub fn enabled(self, environment: Environment) -> bool {
        match self {
            Stage::RequestLog => !environment.is_production(),
            _ => true,
        }
    }

    fn wrap(self, router: Router, state: &AppState) -> Router {
        match self {
            Stage::CatchPanic => router.layer(CatchPanicLayer::custom(panic_response)),
            Stage::RequestLog => router.layer(TraceLayer::new_for_http()),
            Stage::JsonBody => router.layer(from_fn(body::parse_json_body)),
            Stage::SecureHeaders => router.layer(from_fn(headers::secure_headers)),
            Stage::ScriptSanitize => router.layer(from_fn(sanitize::strip_scripts)),
            Stage::OperatorSanitize => router.layer(from_fn(sanitize::strip_operators)),
            Stage::Cookies => router.layer(from_fn(cookies::parse_cookies)),
            Stage::Cors => state.cors.wrap(router),
        }
    }
}

/// Stages that run for `environment`, in execution order.
pub fn active_stages(environment: Environment) -> Vec<Stage> {
    PIPELINE
        .into_iter()
        .filter(|stage| stage.enabled(environment))
        .collect()
}

/// Wrap `router` in every active stage. Layers added later run earlier, so
/// the stages are applied innermost first.
pub fn apply_pipeline(router: Router, state: &AppState) -> Router {
    let stages = active_stages(state.settings.environment);
    tracing::debug!(
        stages = ?stages.iter().map(|s| s.name()).collect::<Vec<_>>(),
        "Assembling request pipeline"
    );
    stages
        .into_iter()
        .rev()
        .fold(router, |router, stage| stage.wrap(router, state))
}
