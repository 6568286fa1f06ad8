//! SQLite connection setup
//!
//! A run holds a single connection for its whole lifetime; every batch and
//! ledger write goes through it.

use crate::error::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection};
use sqlx::ConnectOptions;
use std::str::FromStr;
use tracing::{debug, info};

/// Open the database at `url`, creating the file if needed, and apply
/// pending migrations
pub async fn connect(url: &str) -> Result<SqliteConnection> {
    let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
    let mut conn = options.connect().await?;

    migrate(&mut conn).await?;
    info!(url, "Database ready");

    Ok(conn)
}

/// Apply the embedded schema migrations
pub async fn migrate(conn: &mut SqliteConnection) -> Result<()> {
    sqlx::migrate!("./migrations").run(&mut *conn).await?;
    debug!("Migrations applied");
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use sqlx::Row;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_connect_creates_schema() {
        let mut conn = connect("sqlite::memory:").await.unwrap();

        let tables: Vec<String> = sqlx::query(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE '\\_%' ESCAPE '\\' ORDER BY name",
        )
        .fetch_all(&mut conn)
        .await
        .unwrap()
        .iter()
        .map(|row| row.get("name"))
        .collect();

        assert!(tables.contains(&"life_expectancy".to_string()));
        assert!(tables.contains(&"etl_runs".to_string()));
    }

    #[tokio::test]
    async fn test_connect_creates_missing_file_and_is_repeatable() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("gho.db");
        let url = format!("sqlite://{}", path.display());

        let conn = connect(&url).await.unwrap();
        drop(conn);
        assert!(path.exists());

        // migrations already applied
        connect(&url).await.unwrap();
    }
}
