use std::sync::Arc;

use crate::{
    auth::{Authenticator, JwtAuthenticator},
    config::{AppSettings, ConfigError},
    middleware::cors::CorsPolicy,
    repository::MongoRepository,
};

/// Everything a request may need. Read-only once the server is listening.
#[derive(Clone)]
pub struct AppState {
    pub repository: MongoRepository,
    pub authenticator: Arc<dyn Authenticator>,
    pub cors: CorsPolicy,
    pub settings: Arc<AppSettings>,
}

impl AppState {
    pub fn new(
        settings: AppSettings,
        repository: MongoRepository,
        authenticator: Arc<dyn Authenticator>,
    ) -> Result<Self, ConfigError> {
        let cors = CorsPolicy::new(&settings.cors)?;
        Ok(Self {
            repository,
            authenticator,
            cors,
            settings: Arc::new(settings),
        })
    }

    /// State using the built-in JWT authenticator.
    pub fn with_jwt(settings: AppSettings, repository: MongoRepository) -> Result<Self, ConfigError> {
        let authenticator = Arc::new(JwtAuthenticator::new(&settings.auth));
        Self::new(settings, repository, authenticator)
    }
}
