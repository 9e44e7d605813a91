use std::sync::Arc;

use thiserror::Error;
use tickety_core::config::{AppConfig, ConfigError, LoadOptions};
use tickety_core::domain::ids::UserId;
use tickety_core::wizard::SystemClock;
use tickety_db::{
    connect_with_settings, migrations, DbPool, SqlGuildConfigRepository, SqlTicketRepository,
};
use tickety_discord::audit_sink::TracingAuditSink;
use tickety_discord::bot::{BotServices, BotSettings};
use tickety_discord::gateway::{GatewayRunner, NoopGatewayTransport, ReconnectPolicy};
use tickety_discord::platform::InMemoryPlatform;
use tracing::info;

/// Bot user id used by the offline platform until a real transport is attached.
const OFFLINE_BOT_USER_ID: &str = "0";

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub services: BotServices,
    pub gateway: GatewayRunner,
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

    let platform = Arc::new(InMemoryPlatform::new(UserId::new(OFFLINE_BOT_USER_ID)));
    let services = BotServices::new(
        platform.clone(),
        Arc::new(SqlGuildConfigRepository::new(db_pool.clone())),
        Arc::new(SqlTicketRepository::new(db_pool.clone())),
        Arc::new(SystemClock),
        Arc::new(TracingAuditSink),
        BotSettings::from_config(&config),
    );
    let gateway = GatewayRunner::new(
        Arc::new(NoopGatewayTransport),
        services.dispatcher(),
        platform,
        ReconnectPolicy::default(),
    );

    Ok(Application { config, db_pool, services, gateway })
}

#[cfg(test)]
mod tests {
    use tickety_core::config::{ConfigOverrides, LoadOptions};

    use crate::bootstrap::bootstrap;

    #[tokio::test]
    async fn bootstrap_fails_fast_without_a_valid_bot_token() {
        let result = bootstrap(LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some("sqlite::memory:".to_string()),
                discord_bot_token: Some("Bot abc.def.ghi".to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        })
        .await;

        assert!(result.is_err());
        let message = result.err().expect("error").to_string();
        assert!(message.contains("discord.bot_token"));
    }

    #[tokio::test]
    async fn bootstrap_applies_migrations_and_wires_services() {
        let app = bootstrap(LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some("sqlite::memory:?cache=shared".to_string()),
                discord_bot_token: Some("abc.def.ghi".to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        })
        .await
        .expect("bootstrap should succeed with valid overrides");

        let (table_count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sqlite_master \
             WHERE type = 'table' AND name IN ('guild_config', 'ticket')",
        )
        .fetch_one(&app.db_pool)
        .await
        .expect("tables should exist after bootstrap");
        assert_eq!(table_count, 2);

        assert_eq!(app.services.dispatcher().handler_count(), 3);
        assert_eq!(app.services.setup.active_sessions().await, 0);
        app.gateway.start().await.expect("offline gateway drains immediately");

        app.db_pool.close().await;
    }
}
