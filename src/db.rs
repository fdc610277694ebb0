use std::time::Duration;

use sqlx::{migrate::MigrateError, postgres::PgPoolOptions, PgPool};

use crate::config::AppConfig;

/// Lazily connecting pool; `None` when no database URL is configured.
pub fn create_pool(config: &AppConfig) -> Result<Option<PgPool>, sqlx::Error> {
    let Some(database_url) = config.database_url.as_deref() else {
        return Ok(None);
    };

    let pool = PgPoolOptions::new()
        .max_connections(config.db_pool_max_connections.max(1))
        .min_connections(
            config
                .db_pool_min_connections
                .min(config.db_pool_max_connections.max(1)),
        )
        .acquire_timeout(Duration::from_secs(
            config.db_pool_acquire_timeout_seconds.max(1),
        ))
        .idle_timeout(Duration::from_secs(config.db_pool_idle_timeout_seconds))
        .connect_lazy(database_url)?;
    Ok(Some(pool))
}

pub async fn run_migrations(pool: &PgPool) -> Result<(), MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}
