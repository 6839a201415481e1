#![allow(clippy::needless_for_each)]
mod misc_handlers;
pub mod spa;

use crate::{auth::authenticate_user, middleware::apply_pipeline, state::AppState};
use axum::{Json, Router, middleware, routing::get};
use utoipa::OpenApi;
use utoipa_axum::{router::OpenApiRouter, routes};
use utoipa_scalar::{Scalar, Servable};

#[derive(OpenApi)]
#[openapi(
    tags(
        (name = "health", description = "Health check endpoints"),
    ),
    components(
        schemas(misc_handlers::Health)
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                utoipa::openapi::security::SecurityScheme::Http(
                    utoipa::openapi::security::HttpBuilder::new()
                        .scheme(utoipa::openapi::security::HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .description(Some("Required for every /api/v1/jobs route"))
                        .build(),
                ),
            );
            components.add_security_scheme(
                "cookie_auth",
                utoipa::openapi::security::SecurityScheme::ApiKey(
                    utoipa::openapi::security::ApiKey::Cookie(
                        utoipa::openapi::security::ApiKeyValue::with_description(
                            crate::auth::TOKEN_COOKIE,
                            "Session token cookie, accepted when no bearer token is sent",
                        ),
                    ),
                ),
            );
        }
    }
}

/// Owner of a route group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Group {
    Auth,
    Jobs,
    File,
    Transaction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mount {
    pub prefix: &'static str,
    pub group: Group,
    /// Every request under `prefix` must pass the authenticator first.
    pub gated: bool,
}

pub const MOUNTS: [Mount; 4] = [
    Mount {
        prefix: "/api/v1/auth",
        group: Group::Auth,
        gated: false,
    },
    Mount {
        prefix: "/api/v1/jobs",
        group: Group::Jobs,
        gated: true,
    },
    Mount {
        prefix: "/api/v1/file",
        group: Group::File,
        gated: false,
    },
    Mount {
        prefix: "/api/v1/tran",
        group: Group::Transaction,
        gated: false,
    },
];

/// Routers supplied by the modules that own each group. Paths inside a
/// group are relative to its prefix.
#[derive(Default)]
pub struct RouteGroups {
    pub auth: Router<AppState>,
    pub jobs: Router<AppState>,
    pub file: Router<AppState>,
    pub transaction: Router<AppState>,
}

impl RouteGroups {
    fn take(&mut self, group: Group) -> Router<AppState> {
        let slot = match group {
            Group::Auth => &mut self.auth,
            Group::Jobs => &mut self.jobs,
            Group::File => &mut self.file,
            Group::Transaction => &mut self.transaction,
        };
        std::mem::take(slot)
    }
}

fn mount_groups(
    mut router: Router<AppState>,
    mut groups: RouteGroups,
    state: &AppState,
) -> Router<AppState> {
    for mount in MOUNTS {
        // The group fallback keeps misses under an API prefix away from the SPA.
        let mut group = groups.take(mount.group).fallback(spa::not_found);
        if mount.gated {
            // `layer` rather than `route_layer` so unmatched paths are gated too.
            group = group.layer(middleware::from_fn_with_state(
                state.clone(),
                authenticate_user,
            ));
        }
        // Mounted as a service so a group's `/` route and its fallback both
        // live under the prefix without overlapping.
        router = router.nest_service(mount.prefix, group.with_state(state.clone()));
    }
    router
}

/// Compose the whole application: operational endpoints, the four route
/// groups, the SPA fallback, all wrapped in the request pipeline.
pub fn build_router(state: AppState, groups: RouteGroups) -> Router {
    let (api_routes, mut openapi) = OpenApiRouter::with_openapi(ApiDoc::openapi())
        .routes(routes!(misc_handlers::ping))
        .routes(routes!(misc_handlers::health))
        .split_for_parts();

    openapi.paths.paths = openapi
        .paths
        .paths
        .into_iter()
        .map(|(path, item)| (format!("/api{path}"), item))
        .collect::<utoipa::openapi::path::PathsMap<_, _>>();

    let router = Router::new()
        .nest("/api", api_routes)
        .merge(Scalar::with_url("/api/scalar", openapi.clone()))
        .route("/api/openapi.json", get(|| async move { Json(openapi) }));

    let full_router = mount_groups(router, groups, &state)
        .fallback(spa::fallback)
        .with_state(state.clone());

    apply_pipeline(full_router, &state)
}
