//! Injection stripping for request bodies and query strings.

use axum::{
    extract::Request,
    http::{Uri, uri::PathAndQuery},
    middleware::Next,
    response::Response,
};
use serde_json::Value;

use super::body::{ParsedBody, replace_json_body};
use crate::error::{AppError, AppResult};

type Pairs = Vec<(String, String)>;

/// Neutralise markup in a single piece of text.
pub fn clean_text(text: &str) -> String {
    text.replace('<', "&lt;")
}

/// Escape markup in every key and string value. Returns whether anything
/// changed.
pub fn escape_scripts(value: &mut Value) -> bool {
    match value {
        Value::String(s) if s.contains('<') => {
            *s = clean_text(s);
            true
        }
        Value::Array(items) => items.iter_mut().fold(false, |changed, v| escape_scripts(v) | changed),
        Value::Object(map) => {
            if !map.keys().any(|k| k.contains('<')) {
                return map.values_mut().fold(false, |changed, v| escape_scripts(v) | changed);
            }
            // An escaped key never overwrites a key the client sent verbatim.
            let (marked, plain): (Vec<_>, Vec<_>) = std::mem::take(map)
                .into_iter()
                .partition(|(k, _)| k.contains('<'));
            for (key, mut value) in plain.into_iter().chain(marked) {
                escape_scripts(&mut value);
                map.entry(clean_text(&key)).or_insert(value);
            }
            true
        }
        _ => false,
    }
}

/// Keys a document store would read as a query operator or a nested path.
pub fn is_operator_key(key: &str) -> bool {
    key.starts_with('$') || key.contains('.')
}

/// Remove operator keys at every depth. Returns whether anything changed.
pub fn strip_operator_keys(value: &mut Value) -> bool {
    match value {
        Value::Array(items) => items
            .iter_mut()
            .fold(false, |changed, v| strip_operator_keys(v) | changed),
        Value::Object(map) => {
            let before = map.len();
            map.retain(|k, _| !is_operator_key(k));
            let removed = map.len() != before;
            map.values_mut()
                .fold(removed, |changed, v| strip_operator_keys(v) | changed)
        }
        _ => false,
    }
}

/// Query keys use bracket syntax for nesting, e.g. `salary[$gt]=1`.
fn is_operator_query_key(key: &str) -> bool {
    key.split(['[', ']'])
        .filter(|segment| !segment.is_empty())
        .any(is_operator_key)
}

fn escape_query(pairs: Pairs) -> Pairs {
    pairs
        .into_iter()
        .map(|(k, v)| (clean_text(&k), clean_text(&v)))
        .collect()
}

fn strip_query_operators(pairs: Pairs) -> Pairs {
    pairs
        .into_iter()
        .filter(|(k, _)| !is_operator_query_key(k))
        .collect()
}

fn rewrite_query(request: &mut Request, clean: fn(Pairs) -> Pairs) -> AppResult<()> {
    let Some(query) = request.uri().query() else {
        return Ok(());
    };
    // Unparseable queries are left for the handler's extractor to reject.
    let Ok(pairs) = serde_urlencoded::from_str::<Pairs>(query) else {
        return Ok(());
    };
    let cleaned = clean(pairs.clone());
    if cleaned == pairs {
        return Ok(());
    }

    let encoded =
        serde_urlencoded::to_string(&cleaned).map_err(|e| AppError::BadRequest(e.to_string()))?;
    let path = request.uri().path();
    let path_and_query = if encoded.is_empty() {
        path.to_string()
    } else {
        format!("{path}?{encoded}")
    };

    let mut parts = request.uri().clone().into_parts();
    parts.path_and_query = Some(
        PathAndQuery::try_from(path_and_query).map_err(|e| AppError::BadRequest(e.to_string()))?,
    );
    *request.uri_mut() = Uri::from_parts(parts).map_err(|e| AppError::BadRequest(e.to_string()))?;
    Ok(())
}

fn rewrite_body(request: &mut Request, clean: fn(&mut Value) -> bool) -> AppResult<()> {
    if let Some(mut parsed) = request.extensions_mut().remove::<ParsedBody>() {
        if clean(&mut parsed.0) {
            replace_json_body(request, &parsed.0)?;
        }
        request.extensions_mut().insert(parsed);
    }
    Ok(())
}

/// Escape `<` in body and query so stored text cannot open a tag.
pub async fn strip_scripts(mut request: Request, next: Next) -> AppResult<Response> {
    rewrite_body(&mut request, escape_scripts)?;
    rewrite_query(&mut request, escape_query)?;
    Ok(next.run(request).await)
}

/// Drop `$`-prefixed and dotted keys from body and query.
pub async fn strip_operators(mut request: Request, next: Next) -> AppResult<Response> {
    rewrite_body(&mut request, strip_operator_keys)?;
    rewrite_query(&mut request, strip_query_operators)?;
    Ok(next.run(request).await)
}
