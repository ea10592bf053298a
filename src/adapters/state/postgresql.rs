//! PostgreSQL watermark storage
//!
//! Watermarks live in the `sync_watermarks` table (see `migrations/`), one row per
//! (source, scope) keyed by [`Watermark::generate_id`].

use super::traits::StateStorage;
use crate::config::schema::PostgreSQLConfig;
use crate::core::state::watermark::Watermark;
use crate::domain::{ConduitError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use deadpool_postgres::{Manager, ManagerConfig, Pool, RecyclingMethod, Runtime};
use postgres_native_tls::MakeTlsConnector;
use secrecy::ExposeSecret;
use std::time::Duration;
use tokio_postgres::config::SslMode;
use tokio_postgres::{NoTls, Row};

/// [`StateStorage`] backed by a PostgreSQL connection pool
pub struct PostgreSQLStateStorage {
    pool: Pool,
    statement_timeout_ms: u64,
}

impl PostgreSQLStateStorage {
    /// Connects the pool and makes sure the schema exists
    ///
    /// # Errors
    ///
    /// Returns a `Configuration` error for an invalid connection string or TLS setup and
    /// a `State` error when the database cannot be reached.
    pub async fn new(config: &PostgreSQLConfig) -> Result<Self> {
        let mut pg_config: tokio_postgres::Config = config
            .connection_string
            .expose_secret()
            .as_ref()
            .parse()
            .map_err(|e| {
                ConduitError::Configuration(format!("Invalid PostgreSQL connection string: {e}"))
            })?;

        let manager_config = ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        };

        let manager = match config.ssl_mode.as_str() {
            "disable" => {
                pg_config.ssl_mode(SslMode::Disable);
                Manager::from_config(pg_config, NoTls, manager_config)
            }
            mode => {
                pg_config.ssl_mode(match mode {
                    "allow" | "prefer" => SslMode::Prefer,
                    _ => SslMode::Require,
                });
                let connector = native_tls::TlsConnector::builder()
                    .danger_accept_invalid_certs(!matches!(mode, "verify-ca" | "verify-full"))
                    .danger_accept_invalid_hostnames(mode != "verify-full")
                    .build()
                    .map_err(|e| {
                        ConduitError::Configuration(format!("Failed to build TLS connector: {e}"))
                    })?;
                Manager::from_config(pg_config, MakeTlsConnector::new(connector), manager_config)
            }
        };

        let timeout = Some(Duration::from_secs(config.connection_timeout_seconds));
        let pool = Pool::builder(manager)
            .max_size(config.max_connections)
            .runtime(Runtime::Tokio1)
            .wait_timeout(timeout)
            .create_timeout(timeout)
            .recycle_timeout(timeout)
            .build()
            .map_err(|e| ConduitError::State(format!("Failed to create connection pool: {e}")))?;

        let storage = Self {
            pool,
            statement_timeout_ms: config.statement_timeout_seconds * 1000,
        };
        storage.ensure_schema().await?;
        Ok(storage)
    }

    async fn connection(&self) -> Result<deadpool_postgres::Object> {
        let client = self.pool.get().await.map_err(|e| {
            ConduitError::State(format!("Failed to get connection from pool: {e}"))
        })?;
        client
            .batch_execute(&format!(
                "SET statement_timeout = {}",
                self.statement_timeout_ms
            ))
            .await
            .map_err(|e| ConduitError::State(format!("Failed to set statement timeout: {e}")))?;
        Ok(client)
    }

    async fn ensure_schema(&self) -> Result<()> {
        let migration_sql = include_str!("../../../migrations/001_sync_watermarks.sql");
        self.connection()
            .await?
            .batch_execute(migration_sql)
            .await
            .map_err(|e| ConduitError::State(format!("Failed to execute migration: {e}")))?;
        tracing::debug!("sync_watermarks schema ready");
        Ok(())
    }

    fn row_to_watermark(row: &Row) -> Result<Watermark> {
        let records: i64 = row
            .try_get("records_synced")
            .map_err(|e| ConduitError::State(e.to_string()))?;
        let get_err = |e: tokio_postgres::Error| ConduitError::State(e.to_string());

        Ok(Watermark {
            id: row.try_get("id").map_err(get_err)?,
            source_base_url: row.try_get("source_base_url").map_err(get_err)?,
            scope_id: row.try_get("scope_id").map_err(get_err)?,
            last_sync_time: row
                .try_get::<_, DateTime<Utc>>("last_sync_time")
                .map_err(get_err)?,
            updated_at: row
                .try_get::<_, DateTime<Utc>>("updated_at")
                .map_err(get_err)?,
            last_strategy: row.try_get("last_strategy").map_err(get_err)?,
            records_synced: u64::try_from(records).unwrap_or(0),
        })
    }
}

#[async_trait]
impl StateStorage for PostgreSQLStateStorage {
    async fn load_watermark(
        &self,
        source_base_url: &str,
        scope_id: Option<&str>,
    ) -> Result<Option<Watermark>> {
        let id = Watermark::generate_id(source_base_url, scope_id);

        let rows = self
            .connection()
            .await?
            .query("SELECT * FROM sync_watermarks WHERE id = $1", &[&id])
            .await
            .map_err(|e| ConduitError::State(format!("Watermark query failed: {e}")))?;

        match rows.first() {
            Some(row) => Self::row_to_watermark(row).map(Some),
            None => {
                tracing::debug!(watermark_id = %id, "No watermark found in PostgreSQL (first sync)");
                Ok(None)
            }
        }
    }

    async fn save_watermark(&self, watermark: &Watermark) -> Result<()> {
        let upsert_query = r#"
            INSERT INTO sync_watermarks (
                id, source_base_url, scope_id, last_sync_time,
                updated_at, last_strategy, records_synced
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (id) DO UPDATE SET
                last_sync_time = EXCLUDED.last_sync_time,
                updated_at = EXCLUDED.updated_at,
                last_strategy = EXCLUDED.last_strategy,
                records_synced = EXCLUDED.records_synced
        "#;

        let records = i64::try_from(watermark.records_synced).unwrap_or(i64::MAX);
        self.connection()
            .await?
            .execute(
                upsert_query,
                &[
                    &watermark.id,
                    &watermark.source_base_url,
                    &watermark.scope_id,
                    &watermark.last_sync_time,
                    &watermark.updated_at,
                    &watermark.last_strategy,
                    &records,
                ],
            )
            .await
            .map_err(|e| ConduitError::State(format!("Watermark upsert failed: {e}")))?;

        tracing::debug!(watermark_id = %watermark.id, "Watermark saved to PostgreSQL");
        Ok(())
    }

    async fn get_all_watermarks(&self) -> Result<Vec<Watermark>> {
        let rows = self
            .connection()
            .await?
            .query("SELECT * FROM sync_watermarks ORDER BY id", &[])
            .await
            .map_err(|e| ConduitError::State(format!("Watermark query failed: {e}")))?;

        rows.iter().map(Self::row_to_watermark).collect()
    }
}
