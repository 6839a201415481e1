use axum::{
    body::Body,
    extract::Request,
    http::{HeaderMap, HeaderValue, header::CONTENT_LENGTH, header::CONTENT_TYPE},
    middleware::Next,
    response::Response,
};
use serde_json::Value;

use crate::error::{AppError, AppResult};

/// Largest JSON body accepted, in bytes.
pub const BODY_LIMIT: usize = 100 * 1024;

/// The decoded JSON payload of the current request.
///
/// Later stages rewrite both this value and the raw body, so handlers may use
/// either this extension or an ordinary `Json<T>` extractor.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedBody(pub Value);

fn is_json(headers: &HeaderMap) -> bool {
    let Some(content_type) = headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok()) else {
        return false;
    };
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    essence == "application/json" || (essence.starts_with("application/") && essence.ends_with("+json"))
}

fn buffer_error(err: axum::Error) -> AppError {
    let inner = match err.into_inner().downcast::<axum::Error>() {
        Ok(err) => (*err).into_inner(),
        Err(err) => err,
    };
    if inner.is::<http_body_util::LengthLimitError>() {
        AppError::PayloadTooLarge
    } else {
        AppError::BadRequest(format!("Failed to read request body: {inner}"))
    }
}

/// Decode `application/json` bodies into a [`ParsedBody`].
pub async fn parse_json_body(request: Request, next: Next) -> AppResult<Response> {
    if !is_json(request.headers()) {
        return Ok(next.run(request).await);
    }

    let (mut parts, body) = request.into_parts();
    let bytes = axum::body::to_bytes(body, BODY_LIMIT)
        .await
        .map_err(buffer_error)?;

    if !bytes.iter().all(u8::is_ascii_whitespace) {
        let value: Value = serde_json::from_slice(&bytes)?;
        if !(value.is_object() || value.is_array()) {
            return Err(AppError::MalformedBody(
                "JSON body must be an object or an array".to_string(),
            ));
        }
        parts.extensions.insert(ParsedBody(value));
    }

    Ok(next
        .run(Request::from_parts(parts, Body::from(bytes)))
        .await)
}

/// Replace the raw body with `value` after a stage has rewritten it.
pub(crate) fn replace_json_body(request: &mut Request, value: &Value) -> AppResult<()> {
    let bytes = serde_json::to_vec(value)?;
    request
        .headers_mut()
        .insert(CONTENT_LENGTH, HeaderValue::from(bytes.len()));
    *request.body_mut() = Body::from(bytes);
    Ok(())
}
