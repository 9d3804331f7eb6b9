use chrono::{Duration, Utc};

use crate::commands::CommandResult;
use haggle_core::config::{AppConfig, LoadOptions};
use haggle_db::repositories::{SessionRepository, SqlSessionRepository};
use haggle_db::{connect_with_settings, migrations};

/// The engine evaluates session TTLs lazily on read; this command is the
/// periodic job that settles sessions nobody will read again.
pub fn run() -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "sweep",
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            );
        }
    };

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                "sweep",
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                3,
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
        .map_err(|error| ("db_connectivity", error.to_string(), 4u8))?;

        migrations::run_pending(&pool)
            .await
            .map_err(|error| ("migration", error.to_string(), 5u8))?;

        let cutoff = Utc::now() - Duration::days(config.negotiation.session_ttl_days);
        let swept = SqlSessionRepository::new(pool.clone())
            .mark_expired_before(cutoff)
            .await
            .map_err(|error| ("sweep_execution", error.to_string(), 6u8))?;

        pool.close().await;
        Ok::<u64, (&'static str, String, u8)>(swept)
    });

    match result {
        Ok(swept) => CommandResult::success_with_details(
            "sweep",
            format!("marked {swept} session(s) expired past the TTL"),
            Some(serde_json::json!({ "swept": swept })),
        ),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("sweep", error_class, message, exit_code)
        }
    }
}
