use std::time::Duration;

use anyhow::Context;
use sqlx::{postgres::PgPoolOptions, PgPool};
use tokio::sync::OnceCell;
use tracing::info;

/// Shared, lazily established database handle.
///
/// The first caller connects; concurrent callers wait for that attempt. Once connected,
/// further calls are no-ops. A failed attempt is returned to its caller and leaves the
/// handle unconnected, so the next request tries again instead of looping here.
pub struct Database {
    url: String,
    pool: OnceCell<PgPool>,
}

impl Database {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            pool: OnceCell::new(),
        }
    }

    pub async fn pool(&self) -> Result<&PgPool, sqlx::Error> {
        self.pool
            .get_or_try_init(|| async {
                let pool = PgPoolOptions::new()
                    .max_connections(10)
                    .acquire_timeout(Duration::from_secs(5))
                    .connect(&self.url)
                    .await?;
                info!("database connected");
                Ok(pool)
            })
            .await
    }

    pub async fn migrate(&self) -> anyhow::Result<()> {
        let pool = self.pool().await.context("connect to database")?;
        sqlx::migrate!("./migrations")
            .run(pool)
            .await
            .context("run migrations")?;
        Ok(())
    }
}
