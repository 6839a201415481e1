//! Shared fixtures for router-level tests.
//!
//! The database client is built lazily against an unreachable address, so
//! none of these tests need a running MongoDB.

#![allow(dead_code)]

use std::{
    collections::HashMap,
    path::PathBuf,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};

use axum::{
    Extension, Json, Router,
    body::{Body, Bytes},
    extract::{Path, Query},
    http::{HeaderMap, Request, StatusCode},
    routing::get,
};
use axum_extra::extract::cookie::CookieJar;
use jobdesk::{
    auth::{Identity, generate_token},
    config::{AppSettings, Environment},
    error::{AppError, AppResult},
    repository::{MongoRepository, parse_object_id},
    routes::{RouteGroups, build_router},
    state::AppState,
};
use serde::Deserialize;
use serde_json::{Value, json};
use tower::ServiceExt;

pub const SECRET: &str = "integration-test-secret";
pub const ALLOWED_ORIGIN: &str = "http://localhost:5173";
pub const DEMO_USER: &str = "demo-user";
pub const LOGIN_PASSWORD: &str = "secret";

pub fn fixture_build_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/build")
}

pub fn settings() -> AppSettings {
    let mut settings = AppSettings::default();
    settings.environment = Environment::Test;
    settings.database.uri = "mongodb://127.0.0.1:1/jobdesk_test".to_string();
    settings.database.connection_timeout_seconds = Some(1);
    settings.auth.jwt_secret = SECRET.to_string();
    settings.auth.test_user_id = Some(DEMO_USER.to_string());
    settings.cors.allowed_origin = ALLOWED_ORIGIN.to_string();
    settings.frontend.build_dir = fixture_build_dir();
    settings
}

pub async fn state_with(settings: AppSettings) -> AppState {
    let repository = MongoRepository::lazy(&settings.database)
        .await
        .expect("lazy client");
    AppState::with_jwt(settings, repository).expect("valid state")
}

pub fn token(user_id: &str) -> String {
    generate_token(user_id.to_string(), SECRET, 3600).expect("token")
}

#[derive(Deserialize)]
struct LoginRequest {
    email: String,
    password: String,
}

async fn login(Json(request): Json<LoginRequest>) -> AppResult<Json<Value>> {
    if request.password != LOGIN_PASSWORD {
        return Err(AppError::Unauthenticated);
    }
    let token = generate_token(request.email.clone(), SECRET, 3600)?;
    Ok(Json(json!({ "user": { "email": request.email }, "token": token })))
}

/// Route groups standing in for the real collaborators. `jobs_hits` counts
/// every time a jobs handler body runs.
pub fn groups(jobs_hits: Arc<AtomicUsize>) -> RouteGroups {
    let list_hits = jobs_hits.clone();
    let create_hits = jobs_hits;

    let auth = Router::new()
        .route("/login", axum::routing::post(login))
        .route(
            "/echo",
            axum::routing::post(|Json(body): Json<Value>| async move { Json(body) }),
        )
        .route(
            "/echo-query",
            get(|Query(query): Query<HashMap<String, String>>| async move { Json(query) }),
        )
        .route(
            "/cookies",
            get(|Extension(jar): Extension<CookieJar>| async move {
                jar.get("theme")
                    .map(|c| c.value().to_string())
                    .unwrap_or_default()
            }),
        );

    let jobs = Router::new().route(
        "/",
        get(move |identity: Identity| {
            let hits = list_hits.clone();
            async move {
                hits.fetch_add(1, Ordering::SeqCst);
                Json(json!({ "userId": identity.user_id, "testUser": identity.test_user }))
            }
        })
        .post(move |_identity: Identity| {
            let hits = create_hits.clone();
            async move {
                hits.fetch_add(1, Ordering::SeqCst);
                Err::<Json<Value>, _>(AppError::DuplicateKey(vec!["email".to_string()]))
            }
        }),
    );

    let file = Router::new().route(
        "/panic",
        get(|| async {
            if true {
                panic!("disk on fire");
            }
            "unreachable"
        }),
    );

    let transaction = Router::new()
        .route(
            "/fail",
            get(|| async {
                Err::<&'static str, _>(AppError::InternalError(anyhow::anyhow!(
                    "ledger offline at 10.0.0.7"
                )))
            }),
        )
        .route(
            "/{id}",
            get(|Path(id): Path<String>| async move {
                parse_object_id(&id).map(|oid| oid.to_hex())
            }),
        );

    RouteGroups {
        auth,
        jobs,
        file,
        transaction,
    }
}

pub async fn app_with(settings: AppSettings, jobs_hits: Arc<AtomicUsize>) -> Router {
    let state = state_with(settings).await;
    build_router(state, groups(jobs_hits))
}

pub async fn app() -> (Router, Arc<AtomicUsize>) {
    let hits = Arc::new(AtomicUsize::new(0));
    (app_with(settings(), hits.clone()).await, hits)
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl TestResponse {
    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body).expect("json body")
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

pub async fn send(app: Router, request: Request<Body>) -> TestResponse {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    TestResponse {
        status,
        headers,
        body,
    }
}

pub fn get_request(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

pub fn post_json(uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}
