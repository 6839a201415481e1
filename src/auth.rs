use async_trait::async_trait;
use axum::{
    extract::{FromRequestParts, Request, State},
    http::{HeaderMap, header::AUTHORIZATION, request::Parts},
    middleware::Next,
    response::Response,
};
use axum_extra::extract::cookie::CookieJar;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::debug;

use crate::{
    config::AuthConfig,
    error::{AppError, AppResult},
    state::AppState,
};

/// Cookie carrying the session token for browser clients.
pub const TOKEN_COOKIE: &str = "token";

/// JWT Claims structure
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// User identifier
    #[serde(rename = "userId")]
    pub user_id: String,
    /// Expiration time (as Unix timestamp)
    pub exp: u64,
    /// Issued at (as Unix timestamp)
    pub iat: u64,
}

impl Claims {
    /// Create new claims with given subject and expiration duration in seconds
    pub fn new(user_id: String, expires_in_secs: u64) -> Self {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();

        Self {
            user_id,
            iat: now,
            exp: now.saturating_add(expires_in_secs),
        }
    }
}

/// Caller identity attached to a request once the gate has passed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Identity {
    pub user_id: String,
    /// The shared demo account; collaborators treat it as read-only.
    pub test_user: bool,
}

impl<S> FromRequestParts<S> for Identity
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Identity>()
            .cloned()
            .ok_or(AppError::Unauthenticated)
    }
}

/// Validates a credential and resolves the caller behind it.
#[async_trait]
pub trait Authenticator: Send + Sync + 'static {
    async fn authenticate(&self, token: &str) -> AppResult<Identity>;
}

/// Generate a JWT token using HS256
pub fn generate_token(
    user_id: String,
    secret: &str,
    expires_in_secs: u64,
) -> Result<String, jsonwebtoken::errors::Error> {
    let claims = Claims::new(user_id, expires_in_secs);
    let encoding_key = EncodingKey::from_secret(secret.as_bytes());
    encode(&Header::new(Algorithm::HS256), &claims, &encoding_key)
}

/// Verify a JWT token using HS256
pub fn verify_token(token: &str, secret: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
    let decoding_key = DecodingKey::from_secret(secret.as_bytes());
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = true;
    validation.leeway = 0;

    let token_data = decode::<Claims>(token, &decoding_key, &validation)?;
    Ok(token_data.claims)
}

/// Default authenticator: HS256 tokens signed with the configured secret.
#[derive(Clone)]
pub struct JwtAuthenticator {
    secret: String,
    lifetime_secs: u64,
    test_user_id: Option<String>,
}

impl JwtAuthenticator {
    pub fn new(config: &AuthConfig) -> Self {
        Self {
            secret: config.jwt_secret.clone(),
            lifetime_secs: config.jwt_lifetime_secs,
            test_user_id: config.test_user_id.clone(),
        }
    }

    /// Issue a token for `user_id` with the configured lifetime.
    pub fn issue(&self, user_id: &str) -> AppResult<String> {
        generate_token(user_id.to_string(), &self.secret, self.lifetime_secs)
            .map_err(|e| AppError::InternalError(anyhow::Error::new(e)))
    }
}

#[async_trait]
impl Authenticator for JwtAuthenticator {
    async fn authenticate(&self, token: &str) -> AppResult<Identity> {
        let claims = verify_token(token, &self.secret)?;
        let test_user = self.test_user_id.as_deref() == Some(claims.user_id.as_str());
        Ok(Identity {
            user_id: claims.user_id,
            test_user,
        })
    }
}

/// Extract JWT token from Authorization header
fn extract_token_from_header(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

fn extract_token_from_cookie(request: &Request) -> Option<String> {
    let jar = request
        .extensions()
        .get::<CookieJar>()
        .cloned()
        .unwrap_or_else(|| CookieJar::from_headers(request.headers()));
    jar.get(TOKEN_COOKIE)
        .map(|c| c.value().to_string())
        .filter(|t| !t.is_empty())
}

/// Gate in front of protected route groups.
///
/// Any identity already on the request is discarded and the credential is
/// validated again, so the handler only ever sees an identity produced here.
pub async fn authenticate_user(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> AppResult<Response> {
    request.extensions_mut().remove::<Identity>();

    let token = extract_token_from_header(request.headers())
        .map(str::to_string)
        .or_else(|| extract_token_from_cookie(&request))
        .ok_or(AppError::Unauthenticated)?;

    let identity = state.authenticator.authenticate(&token).await?;
    debug!(user_id = %identity.user_id, "request authenticated");

    request.extensions_mut().insert(identity);
    Ok(next.run(request).await)
}
