//! Front-end bundle serving and the terminal not-found handler.

use axum::{
    extract::{Request, State},
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
};
use tower::ServiceExt;
use tower_http::services::{ServeDir, ServeFile};
use tracing::debug;

use crate::{error::AppError, state::AppState};

const API_PREFIX: &str = "/api";

fn is_api_path(path: &str) -> bool {
    path == API_PREFIX
        || path
            .strip_prefix(API_PREFIX)
            .is_some_and(|rest| rest.starts_with('/'))
}

/// Structured 404 for anything no router claimed.
pub async fn not_found() -> AppError {
    AppError::route_not_found()
}

/// Serve a file from the build directory, or the entry file for client-side
/// routes. API paths and non-read methods get the structured 404.
pub async fn fallback(State(state): State<AppState>, request: Request) -> Response {
    let readable = matches!(*request.method(), Method::GET | Method::HEAD);
    if !readable || is_api_path(request.uri().path()) {
        return AppError::route_not_found().into_response();
    }

    let frontend = &state.settings.frontend;
    let service =
        ServeDir::new(&frontend.build_dir).fallback(ServeFile::new(frontend.index_path()));

    match service.oneshot(request).await {
        Ok(response) if response.status() != StatusCode::NOT_FOUND => response.into_response(),
        _ => {
            debug!(build_dir = ?frontend.build_dir, "No front-end bundle to serve");
            AppError::route_not_found().into_response()
        }
    }
}
