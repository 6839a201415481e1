use anyhow::{Context, Result};
use async_trait::async_trait;
use mongodb::{
    Client, Database,
    bson::{doc, oid::ObjectId},
    options::ClientOptions,
};
use std::time::Duration;
use tracing::info;

use crate::{
    config::DatabaseConfig,
    error::{AppError, AppResult},
};

const APP_NAME: &str = "jobdesk";

#[async_trait]
pub trait Repository: Send + Sync + Clone + 'static {
    async fn health_check(&self) -> bool;
}

/// Shared handle to the document store. Cloning is cheap.
#[derive(Debug, Clone)]
pub struct MongoRepository {
    pub client: Client,
    pub database: Database,
}

impl MongoRepository {
    /// Build a client without talking to the server.
    ///
    /// The driver connects on first use, so this only fails for an
    /// unparseable connection string.
    pub async fn lazy(config: &DatabaseConfig) -> Result<Self> {
        let mut options = ClientOptions::parse(&config.uri)
            .await
            .context("invalid database connection string")?;
        options.app_name = Some(APP_NAME.to_string());
        if let Some(max) = config.max_connections {
            options.max_pool_size = Some(max);
        }
        if let Some(secs) = config.connection_timeout_seconds {
            options.server_selection_timeout = Some(Duration::from_secs(secs));
            options.connect_timeout = Some(Duration::from_secs(secs));
        }

        let client = Client::with_options(options)?;
        let database = client
            .default_database()
            .unwrap_or_else(|| client.database(&config.name));
        Ok(Self { client, database })
    }

    /// Build a client and prove the server answers before returning.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let repository = Self::lazy(config).await?;
        repository
            .ping()
            .await
            .context("database did not answer ping")?;
        info!(database = %repository.database.name(), "Connected to database");
        Ok(repository)
    }

    pub async fn ping(&self) -> mongodb::error::Result<()> {
        self.database.run_command(doc! { "ping": 1 }).await?;
        Ok(())
    }
}

#[async_trait]
impl Repository for MongoRepository {
    async fn health_check(&self) -> bool {
        self.ping().await.is_ok()
    }
}

/// Parse a document id taken from a path or body, mapping bad input to a
/// cast fault instead of a server error.
pub fn parse_object_id(value: &str) -> AppResult<ObjectId> {
    ObjectId::parse_str(value).map_err(|_| AppError::Cast {
        path: "_id".to_string(),
        value: value.to_string(),
    })
}
