use sqlx::{postgres::PgPoolOptions, PgPool};
use std::time::Duration;

/// Connects to PostgreSQL and brings the schema up to date
///
/// The recommendation tables are small and read-mostly, so a handful of
/// pooled connections is enough for the catalog and interaction log.
pub async fn create_pool(database_url: &str) -> anyhow::Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .acquire_timeout(Duration::from_secs(3))
        .connect(database_url)
        .await?;

    run_migrations(&pool).await?;

    Ok(pool)
}

/// Applies the embedded migrations in `migrations/`
pub async fn run_migrations(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    tracing::info!("Database migrations applied");
    Ok(())
}
