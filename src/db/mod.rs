//! Persistence layer: Postgres pool setup and migrations.

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

/// Connects to Postgres and runs pending migrations, returning a ready connection pool.
pub async fn connect(database_url: &str) -> Result<PgPool, sqlx::Error> {
    let pool = PgPoolOptions::new()
        .max_connections(20)
        .connect(database_url)
        .await?;
    sqlx::migrate!("./migrations").run(&pool).await?;
    Ok(pool)
}
