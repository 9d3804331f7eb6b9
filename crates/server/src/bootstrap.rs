use std::sync::Arc;

use haggle_agent::directive::TemplateComposer;
use haggle_agent::runtime::{build_policy, NegotiationRuntime, RuntimeSettings};
use haggle_core::audit::InMemoryAuditSink;
use haggle_core::config::{AppConfig, ConfigError, LoadOptions};
use haggle_db::repositories::{SqlListingRepository, SqlSessionRepository};
use haggle_db::{connect_with_settings, migrations, DbPool};
use thiserror::Error;
use tracing::info;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub runtime: Arc<NegotiationRuntime>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let db_pool = connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    .map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    let runtime = NegotiationRuntime::new(
        Arc::new(SqlListingRepository::new(db_pool.clone())),
        Arc::new(SqlSessionRepository::new(db_pool.clone())),
        build_policy(&config.negotiation),
        Arc::new(TemplateComposer),
        Arc::new(InMemoryAuditSink::default()),
        RuntimeSettings::from_config(&config.negotiation),
    );

    Ok(Application { config, db_pool, runtime: Arc::new(runtime) })
}
