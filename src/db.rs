use std::{path::PathBuf, str::FromStr, time::Duration};

use anyhow::{Context, Result};
use sea_orm::{ConnectionTrait, DatabaseConnection, SqlxPostgresConnector, Statement};
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};
use tokio::fs;

use crate::config::AppConfig;

pub type DbPool = PgPool;
pub type OrmConn = DatabaseConnection;

/// Create the shared sqlx pool. Every connection carries a server-side
/// `statement_timeout`, so a stuck order transaction errors out and is
/// rolled back instead of holding stock row locks.
pub async fn create_pool(config: &AppConfig) -> Result<DbPool> {
    let statement_timeout = config.db_statement_timeout_ms.to_string();
    let options = PgConnectOptions::from_str(&config.database_url)
        .context("invalid DATABASE_URL")?
        .options([("statement_timeout", statement_timeout.as_str())]);

    let pool = PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .acquire_timeout(Duration::from_secs(5))
        .idle_timeout(Duration::from_secs(300))
        .connect_with(options)
        .await
        .context("failed to connect to PostgreSQL")?;

    Ok(pool)
}

/// Create a SeaORM connection on top of an existing sqlx pool.
pub fn create_orm_conn(pool: &DbPool) -> OrmConn {
    SqlxPostgresConnector::from_sqlx_postgres_pool(pool.clone())
}

/// Minimal migration runner that executes SQL files in `migrations/` in filename order.
pub async fn run_migrations(conn: &DatabaseConnection) -> Result<()> {
    let mut entries = fs::read_dir("migrations").await?;
    let mut files: Vec<PathBuf> = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == "sql") {
            files.push(path);
        }
    }
    files.sort();

    let backend = conn.get_database_backend();
    for file in files {
        let sql = fs::read_to_string(&file).await?;
        // Postgres prepared statements cannot contain multiple commands,
        // so split the migration file and run each statement individually.
        for stmt in sql.split(';') {
            let stmt = stmt.trim();
            if stmt.is_empty() {
                continue;
            }
            let statement = format!("{stmt};");
            conn.execute(Statement::from_string(backend, statement))
                .await
                .with_context(|| format!("migration {} failed", file.display()))?;
        }
    }

    Ok(())
}
