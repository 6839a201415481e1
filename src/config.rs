use axum::http::HeaderValue;
use serde::{Deserialize, Serialize};
use serde_variant::to_variant_name;
use std::{
    fs,
    path::{Path, PathBuf},
};
use thiserror::Error;
use tracing::info;

/// Settings file read when `server` is given no `--config`.
pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

/// Deployment environment. `production` disables request logging.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Test,
    Production,
}

impl Environment {
    #[must_use]
    pub fn is_production(self) -> bool {
        self == Environment::Production
    }

    pub fn name(self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Test => "test",
            Environment::Production => "production",
        }
    }

    fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "production" => Environment::Production,
            "test" => Environment::Test,
            _ => Environment::Development,
        }
    }
}

/// What to do when the database cannot be reached at startup.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ConnectFailurePolicy {
    /// Return the error so the process exits non-zero.
    #[default]
    Exit,
    /// Log the failure and stay alive without binding the listener.
    Idle,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// The MongoDB connection string, for example
    /// `mongodb://localhost:27017/jobdesk`.
    #[serde(default)]
    pub uri: String,
    /// Database used when the connection string does not name one.
    #[serde(default = "default_database_name")]
    pub name: String,
    pub max_connections: Option<u32>,
    pub connection_timeout_seconds: Option<u64>,
    #[serde(default)]
    pub on_connect_failure: ConnectFailurePolicy,
}

fn default_database_name() -> String {
    "jobdesk".to_string()
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            uri: String::new(),
            name: default_database_name(),
            max_connections: None,
            connection_timeout_seconds: None,
            on_connect_failure: ConnectFailurePolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
#[derive(Default)]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}
impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        to_variant_name(self).expect("only enum supported").fmt(f)
    }
}
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
#[derive(Default)]
pub enum LogFormat {
    #[default]
    Compact,
    Pretty,
    Json,
}

/// Logger configuration for application use
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggerConfig {
    /// Enable log write to stdout
    pub enable: bool,

    /// Set the logger level.
    ///
    /// * options: `trace` | `debug` | `info` | `warn` | `error`
    pub level: LogLevel,

    /// Set the logger format.
    ///
    /// * options: `compact` | `pretty` | `json`
    pub format: LogFormat,

    /// Override our custom tracing filter.
    ///
    /// Set this to your own filter if you want to see traces from internal
    /// libraries. See more [here](https://docs.rs/tracing-subscriber/latest/tracing_subscriber/filter/struct.EnvFilter.html#directives)
    pub override_filter: Option<String>,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            enable: true,
            level: LogLevel::default(),
            format: LogFormat::default(),
            override_filter: None,
        }
    }
}

/// Sentry configuration for application use
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SentryConfig {
    pub dsn: String,
    pub traces_sample_rate: f32,
}

/// Server configuration for application use
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// The address on which the server should listen on for incoming
    /// connections.
    #[serde(default = "default_binding")]
    pub binding: String,
    /// The port on which the server should listen for incoming connections.
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_binding() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    5000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            binding: default_binding(),
            port: default_port(),
        }
    }
}

impl ServerConfig {
    #[must_use]
    pub fn full_url(&self) -> String {
        format!("{}:{}", self.binding, self.port)
    }
}

/// Cross-origin policy: exactly one browser origin may call the API.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CorsConfig {
    #[serde(default = "default_allowed_origin")]
    pub allowed_origin: String,
}

fn default_allowed_origin() -> String {
    "http://localhost:5173".to_string()
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origin: default_allowed_origin(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuthConfig {
    /// HS256 secret used to verify bearer and cookie tokens.
    #[serde(default)]
    pub jwt_secret: String,
    #[serde(default = "default_jwt_lifetime")]
    pub jwt_lifetime_secs: u64,
    /// User id of the shared read-only demo account, if any.
    pub test_user_id: Option<String>,
}

fn default_jwt_lifetime() -> u64 {
    24 * 60 * 60
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: String::new(),
            jwt_lifetime_secs: default_jwt_lifetime(),
            test_user_id: None,
        }
    }
}

/// Location of the prebuilt single page application.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FrontendConfig {
    #[serde(default = "default_build_dir")]
    pub build_dir: PathBuf,
    #[serde(default = "default_index_file")]
    pub index_file: String,
}

fn default_build_dir() -> PathBuf {
    PathBuf::from("client/build")
}

fn default_index_file() -> String {
    "index.html".to_string()
}

impl Default for FrontendConfig {
    fn default() -> Self {
        Self {
            build_dir: default_build_dir(),
            index_file: default_index_file(),
        }
    }
}

impl FrontendConfig {
    #[must_use]
    pub fn index_path(&self) -> PathBuf {
        self.build_dir.join(&self.index_file)
    }
}

/// Complete application settings that combines all configuration layers
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct AppSettings {
    #[serde(default)]
    pub environment: Environment,
    #[serde(default)]
    pub logger: LoggerConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub cors: CorsConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub frontend: FrontendConfig,
    pub sentry: Option<SentryConfig>,
}

impl AppSettings {
    /// Load settings from `config`, then from the process environment, then
    /// validate. Only the default path may be absent.
    pub fn load(config: &Path) -> Result<Self, ConfigError> {
        tolerate_missing_env_file(dotenvy::dotenv())?;

        let mut settings = if config.exists() || config != Path::new(DEFAULT_CONFIG_PATH) {
            Self::from_file(config)?
        } else {
            info!(selected_path =? config, "configuration file not found, using defaults");
            Self::default()
        };
        settings.apply_env(|key| std::env::var(key).ok())?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn from_file(config: &Path) -> Result<Self, ConfigError> {
        info!(selected_path =? config, "loading environment from");
        let content = fs::read_to_string(config)?;
        Ok(toml::from_str::<Self>(&content)?)
    }

    /// Override fields from environment variables resolved through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(env) = lookup("APP_ENV").or_else(|| lookup("NODE_ENV")) {
            self.environment = Environment::parse(&env);
        }
        if let Some(uri) = lookup("MONGO_URL") {
            self.database.uri = uri;
        }
        if let Some(port) = lookup("PORT") {
            self.server.port = port.trim().parse().map_err(|_| ConfigError::InvalidValue {
                key: "PORT",
                value: port.clone(),
            })?;
        }
        if let Some(origin) = lookup("CORS_ORIGIN") {
            self.cors.allowed_origin = origin;
        }
        if let Some(secret) = lookup("JWT_SECRET") {
            self.auth.jwt_secret = secret;
        }
        if let Some(lifetime) = lookup("JWT_LIFETIME") {
            self.auth.jwt_lifetime_secs =
                lifetime
                    .trim()
                    .parse()
                    .map_err(|_| ConfigError::InvalidValue {
                        key: "JWT_LIFETIME",
                        value: lifetime.clone(),
                    })?;
        }
        if let Some(user_id) = lookup("TEST_USER_ID") {
            self.auth.test_user_id = Some(user_id);
        }
        if let Some(dir) = lookup("STATIC_DIR") {
            self.frontend.build_dir = PathBuf::from(dir);
        }
        Ok(())
    }

    /// Reject settings the server cannot start with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.database.uri.trim().is_empty() {
            return Err(ConfigError::Missing("MONGO_URL"));
        }
        if self.auth.jwt_secret.is_empty() {
            return Err(ConfigError::Missing("JWT_SECRET"));
        }
        if HeaderValue::from_str(&self.cors.allowed_origin).is_err()
            || self.cors.allowed_origin.trim() == "*"
        {
            return Err(ConfigError::InvalidValue {
                key: "CORS_ORIGIN",
                value: self.cors.allowed_origin.clone(),
            });
        }
        Ok(())
    }
}

/// A missing `.env` is normal outside local development; a broken one is not.
fn tolerate_missing_env_file<T>(loaded: dotenvy::Result<T>) -> Result<(), ConfigError> {
    match loaded {
        Ok(_) => Ok(()),
        Err(err) if err.not_found() => Ok(()),
        Err(err) => Err(ConfigError::EnvFile(err)),
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read configuration file: {0}")]
    ReadError(#[from] std::io::Error),
    #[error("Failed to parse configuration: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("Failed to load .env file: {0}")]
    EnvFile(#[source] dotenvy::Error),
    #[error("Missing required setting {0}")]
    Missing(&'static str),
    #[error("Invalid value for {key}: {value:?}")]
    InvalidValue { key: &'static str, value: String },
}
