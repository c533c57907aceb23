//! Persisted application state
//!
//! The whole `AppState` lives as one JSON document under a fixed key in a
//! small SQLite table. Every tool opens the same database; `update` wraps
//! load-modify-save in an immediate transaction so a daemon pass and a CLI
//! edit cannot overwrite each other.

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::SqliteConnection;

use crate::error::{Result, StoreError};
use crate::types::AppState;

/// Key under which the state document is stored
pub const STATE_KEY: &str = "socialdeck-store";

#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Open (creating if needed) the database at `db_path` and run migrations
    pub async fn new(db_path: &str) -> Result<Self> {
        let expanded_path = shellexpand::tilde(db_path).to_string();
        let path = Path::new(&expanded_path);

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(StoreError::IoError)?;
            }
        }

        // Forward slashes keep the URL valid on Windows too
        let db_url = format!("sqlite://{}", expanded_path.replace('\\', "/"));
        let options = SqliteConnectOptions::from_str(&db_url)
            .map_err(StoreError::SqlxError)?
            .create_if_missing(true)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(StoreError::SqlxError)?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(StoreError::MigrationError)?;

        tracing::debug!("Opened state database at {}", expanded_path);
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Current state, or the default state when nothing was saved yet
    pub async fn load(&self) -> Result<AppState> {
        let mut conn = self.pool.acquire().await.map_err(StoreError::SqlxError)?;
        read_state(&mut conn).await
    }

    /// Replace the stored state
    pub async fn save(&self, state: &AppState) -> Result<()> {
        let mut conn = self.pool.acquire().await.map_err(StoreError::SqlxError)?;
        write_state(&mut conn, state).await
    }

    /// Apply `f` to the stored state and save the result atomically
    ///
    /// When `f` fails nothing is written and its error is returned.
    pub async fn update<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut AppState) -> Result<T>,
    {
        let mut conn = self.pool.acquire().await.map_err(StoreError::SqlxError)?;

        sqlx::query("BEGIN IMMEDIATE")
            .execute(&mut *conn)
            .await
            .map_err(StoreError::SqlxError)?;

        let result: Result<T> = async {
            let mut state = read_state(&mut conn).await?;
            let value = f(&mut state)?;
            write_state(&mut conn, &state).await?;
            Ok::<T, crate::error::DeckError>(value)
        }
        .await;

        let finish = if result.is_ok() { "COMMIT" } else { "ROLLBACK" };
        sqlx::query(finish)
            .execute(&mut *conn)
            .await
            .map_err(StoreError::SqlxError)?;

        result
    }
}

async fn read_state(conn: &mut SqliteConnection) -> Result<AppState> {
    let raw: Option<String> = sqlx::query_scalar("SELECT value FROM app_state WHERE key = ?")
        .bind(STATE_KEY)
        .fetch_optional(&mut *conn)
        .await
        .map_err(StoreError::SqlxError)?;

    match raw {
        Some(json) => Ok(serde_json::from_str(&json).map_err(StoreError::Serialization)?),
        None => Ok(AppState::default()),
    }
}

async fn write_state(conn: &mut SqliteConnection, state: &AppState) -> Result<()> {
    let json = serde_json::to_string(state).map_err(StoreError::Serialization)?;

    sqlx::query(
        r#"
        INSERT INTO app_state (key, value, updated_at)
        VALUES (?, ?, ?)
        ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
        "#,
    )
    .bind(STATE_KEY)
    .bind(json)
    .bind(chrono::Utc::now().to_rfc3339())
    .execute(&mut *conn)
    .await
    .map_err(StoreError::SqlxError)?;

    Ok(())
}
