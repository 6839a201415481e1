use std::str::FromStr;

use anyhow::Result;
use sentry::{integrations::tracing::EventFilter, types::Dsn};
use tracing::{Level, Metadata, level_filters::LevelFilter};
use tracing_subscriber::{
    EnvFilter, Layer, Registry,
    fmt::{self, MakeWriter},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

use crate::config::{Environment, LogFormat, LogLevel, LoggerConfig, SentryConfig};

/// Crates whose events reach the log at the configured level.
const APP_MODULES: &[&str] = &["jobdesk", "mongodb"];

/// Emits the per-request spans of the request-log stage.
const REQUEST_LOG_MODULE: &str = "tower_http";

/// Default filter directives. Request spans follow the request-log stage, so
/// production keeps `tower_http` at `warn` whatever the configured level.
fn default_directives(level: &LogLevel, environment: Environment) -> String {
    let request_level = if environment.is_production() {
        LogLevel::Warn
    } else {
        level.clone()
    };
    APP_MODULES
        .iter()
        .map(|module| format!("{module}={level}"))
        .chain(std::iter::once(format!("{REQUEST_LOG_MODULE}={request_level}")))
        .collect::<Vec<_>>()
        .join(",")
}

fn env_filter(config: &LoggerConfig, environment: Environment) -> Result<EnvFilter> {
    // RUST_LOG beats the configured override, which beats the defaults.
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    let directives = config
        .override_filter
        .clone()
        .unwrap_or_else(|| default_directives(&config.level, environment));
    Ok(EnvFilter::try_new(directives)?)
}

fn stdout_layer<W>(make_writer: W, format: &LogFormat) -> Box<dyn Layer<Registry> + Sync + Send>
where
    W: for<'writer> MakeWriter<'writer> + Sync + Send + 'static,
{
    let layer = fmt::Layer::default().with_writer(make_writer);
    match format {
        LogFormat::Compact => layer.compact().boxed(),
        LogFormat::Pretty => layer.pretty().boxed(),
        // Log collectors do not want colour codes.
        LogFormat::Json => layer.with_ansi(false).json().boxed(),
    }
}

fn event_filter(metadata: &Metadata<'_>) -> EventFilter {
    match *metadata.level() {
        Level::ERROR => EventFilter::Event,
        Level::WARN => EventFilter::Breadcrumb,
        _ => EventFilter::Ignore,
    }
}

pub fn init_tracing(config: &LoggerConfig, environment: Environment) -> Result<()> {
    if !config.enable {
        return Ok(());
    }

    let sentry_layer = sentry::integrations::tracing::layer()
        .event_filter(event_filter)
        .with_filter(LevelFilter::WARN);

    tracing_subscriber::registry()
        .with(stdout_layer(std::io::stdout, &config.format))
        .with(env_filter(config, environment)?)
        .with(sentry_layer)
        .try_init()?;
    Ok(())
}

/// Start the sentry client, tagging every event with the deployment
/// environment.
pub fn init_sentry(
    sentry_cfg: &SentryConfig,
    environment: Environment,
) -> Result<sentry::ClientInitGuard> {
    Ok(sentry::init(sentry::ClientOptions {
        dsn: Some(Dsn::from_str(&sentry_cfg.dsn)?),
        release: sentry::release_name!(),
        environment: Some(environment.name().into()),
        traces_sample_rate: sentry_cfg.traces_sample_rate,
        ..Default::default()
    }))
}
