use std::time::Duration;

use sqlx::MySqlPool;
use sqlx::mysql::{MySqlConnectOptions, MySqlPoolOptions};

use crate::config::DatabaseSettings;
use crate::error::AppError;

/// Build MySQL connect options from resolved settings.
pub fn connect_options(settings: &DatabaseSettings) -> MySqlConnectOptions {
    let mut options = MySqlConnectOptions::new()
        .host(&settings.host)
        .port(settings.port)
        .username(&settings.user)
        .database(&settings.database);

    if !settings.password.is_empty() {
        options = options.password(&settings.password);
    }

    options
}

/// Create the MySQL connection pool.
///
/// `pool_size` bounds the number of open connections. Each query checks a
/// connection out and the pool takes it back when the query finishes, on
/// success or error.
pub async fn create_pool(settings: &DatabaseSettings) -> Result<MySqlPool, AppError> {
    let pool = MySqlPoolOptions::new()
        .max_connections(settings.pool_size)
        .acquire_timeout(Duration::from_secs(5))
        .connect_with(connect_options(settings))
        .await?;

    tracing::info!(
        host = %settings.host,
        database = %settings.database,
        pool_size = settings.pool_size,
        "Connected to MySQL"
    );
    Ok(pool)
}

/// Round-trip `SELECT 1` through the pool.
pub async fn ping(pool: &MySqlPool) -> bool {
    match sqlx::query_scalar::<_, i64>("SELECT 1")
        .fetch_one(pool)
        .await
    {
        Ok(value) => value == 1,
        Err(e) => {
            tracing::error!(error = %e, "Database connection test failed");
            false
        }
    }
}
