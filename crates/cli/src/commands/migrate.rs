use crate::commands::{CommandResult, FailureClass};
use tickety_core::config::{AppConfig, LoadOptions};
use tickety_db::{connect_with_settings, migrations, DbPool};

pub fn run() -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "migrate",
                FailureClass::ConfigValidation,
                format!("configuration issue: {error}"),
            );
        }
    };

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                "migrate",
                FailureClass::RuntimeInit,
                format!("failed to initialize async runtime: {error}"),
            );
        }
    };

    let result = runtime.block_on(async {
        let pool = connect_with_settings(
            &config.database.url,
            config.database.max_connections,
            config.database.timeout_secs,
        )
        .await
        .map_err(|error| (FailureClass::DbConnectivity, error.to_string()))?;
        migrations::run_pending(&pool)
            .await
            .map_err(|error| (FailureClass::Migration, error.to_string()))?;
        let applied = applied_versions(&pool)
            .await
            .map_err(|error| (FailureClass::Migration, error.to_string()))?;
        pool.close().await;
        Ok::<Vec<i64>, (FailureClass, String)>(applied)
    });

    match result {
        Ok(applied) => CommandResult::success(
            "migrate",
            format!(
                "schema up to date against `{}`; applied versions: {:?}",
                config.database.url, applied
            ),
        ),
        Err((class, message)) => CommandResult::failure("migrate", class, message),
    }
}

async fn applied_versions(pool: &DbPool) -> Result<Vec<i64>, sqlx::Error> {
    sqlx::query_scalar::<_, i64>(
        "SELECT version FROM _sqlx_migrations WHERE success = 1 ORDER BY version",
    )
    .fetch_all(pool)
    .await
}
