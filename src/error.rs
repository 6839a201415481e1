use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::any::Any;
use thiserror::Error;

/// Message returned for every unexpected failure. Details only go to the log.
pub const GENERIC_ERROR_MESSAGE: &str = "Something went wrong, try again later";
pub const ROUTE_NOT_FOUND_MESSAGE: &str = "Route does not exist";

/// Server code for a unique index violation.
const DUPLICATE_KEY_CODE: i32 = 11000;

/// Application-level errors for HTTP handlers and middleware
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Malformed request body: {0}")]
    MalformedBody(String),

    #[error("request entity too large")]
    PayloadTooLarge,

    #[error("Validation failed: {}", .0.join(","))]
    Validation(Vec<String>),

    #[error("Duplicate value for {}", .0.join(", "))]
    DuplicateKey(Vec<String>),

    #[error("Invalid {path}: {value}")]
    Cast { path: String, value: String },

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Authentication invalid")]
    Unauthenticated,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not allowed by CORS")]
    CrossOrigin,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    InternalError(#[source] anyhow::Error),
}

impl AppError {
    pub fn route_not_found() -> Self {
        AppError::NotFound(ROUTE_NOT_FOUND_MESSAGE.to_string())
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::MalformedBody(_)
            | AppError::Validation(_)
            | AppError::DuplicateKey(_)
            | AppError::Cast { .. }
            | AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::Unauthenticated => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) | AppError::CrossOrigin => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to show to the caller.
    pub fn public_message(&self) -> String {
        match self {
            AppError::MalformedBody(msg)
            | AppError::BadRequest(msg)
            | AppError::Forbidden(msg)
            | AppError::NotFound(msg) => msg.clone(),
            AppError::Validation(messages) => messages.join(","),
            AppError::DuplicateKey(fields) => {
                format!("{} field has to be unique", fields.join(", "))
            }
            AppError::InternalError(_) => GENERIC_ERROR_MESSAGE.to_string(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        if status.is_server_error() {
            // Log the detailed error with full context chain
            tracing::error!("Handler error: {:?}", self);
        } else {
            tracing::debug!(%status, "Request rejected: {}", self);
        }

        let body = json!({
            "msg": self.public_message(),
        });

        (status, Json(body)).into_response()
    }
}

/// Turn a handler panic into the generic 500 response.
pub fn panic_response(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic payload".to_string()
    };
    AppError::InternalError(anyhow::anyhow!("handler panicked: {detail}")).into_response()
}

impl From<mongodb::error::Error> for AppError {
    fn from(err: mongodb::error::Error) -> Self {
        use mongodb::error::{ErrorKind, WriteFailure};

        let duplicate = match err.kind.as_ref() {
            ErrorKind::Write(WriteFailure::WriteError(write)) if write.code == DUPLICATE_KEY_CODE => {
                Some(write.message.clone())
            }
            ErrorKind::Command(command) if command.code == DUPLICATE_KEY_CODE => {
                Some(command.message.clone())
            }
            ErrorKind::InsertMany(insert) => insert
                .write_errors
                .iter()
                .flatten()
                .find(|write| write.code == DUPLICATE_KEY_CODE)
                .map(|write| write.message.clone()),
            ErrorKind::BulkWrite(bulk) => bulk
                .write_errors
                .iter()
                .filter(|(_, write)| write.code == DUPLICATE_KEY_CODE)
                .min_by_key(|(index, _)| **index)
                .map(|(_, write)| write.message.clone()),
            _ => None,
        };

        match duplicate {
            Some(message) => AppError::DuplicateKey(duplicate_key_fields(&message)),
            None => AppError::InternalError(anyhow::Error::new(err)),
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::MalformedBody(err.to_string())
    }
}

impl From<jsonwebtoken::errors::Error> for AppError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        tracing::debug!(kind = ?err.kind(), "Token verification failed");
        AppError::Unauthenticated
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::InternalError(err)
    }
}

/// Field names from a server message such as
/// `E11000 duplicate key error collection: app.users index: email_1 dup key: { email: "a@b.c" }`.
fn duplicate_key_fields(message: &str) -> Vec<String> {
    let Some(start) = message.find("dup key:") else {
        return vec!["value".to_string()];
    };
    let rest = &message[start + "dup key:".len()..];
    let Some(open) = rest.find('{') else {
        return vec!["value".to_string()];
    };

    let mut fields = Vec::new();
    let mut chars = rest[open + 1..].chars().peekable();
    loop {
        while chars.next_if(|c| c.is_whitespace() || *c == ',').is_some() {}
        let key: String = chars
            .by_ref()
            .take_while(|c| *c != ':')
            .collect::<String>()
            .trim()
            .to_string();
        if key.is_empty() || key.starts_with('}') {
            break;
        }
        fields.push(key);

        while chars.next_if(|c| c.is_whitespace()).is_some() {}
        if chars.next_if_eq(&'"').is_some() {
            let mut escaped = false;
            for c in chars.by_ref() {
                match c {
                    '\\' if !escaped => escaped = true,
                    '"' if !escaped => break,
                    _ => escaped = false,
                }
            }
        }
        let mut depth = 0usize;
        while let Some(c) = chars.peek().copied() {
            match c {
                '{' | '[' => depth += 1,
                ']' => depth = depth.saturating_sub(1),
                '}' if depth == 0 => break,
                '}' => depth -= 1,
                ',' if depth == 0 => break,
                _ => {}
            }
            chars.next();
        }
        if chars.peek().is_none_or(|c| *c == '}') {
            break;
        }
    }

    if fields.is_empty() {
        fields.push("value".to_string());
    }
    fields
}

/// Result type alias for handlers
pub type AppResult<T> = Result<T, AppError>;
