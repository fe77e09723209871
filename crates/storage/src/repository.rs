//! Repository Implementation

use crate::StorageError;
use serde::{Deserialize, Serialize};
use sqlx::pool::PoolConnection;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Sqlite;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Hard cap on rows returned by a recent-measurements query
pub const MAX_RECENT: usize = 1000;

const CREATE_TABLE: &str = "CREATE TABLE IF NOT EXISTS datos (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    temperatura REAL,
    humedad     REAL,
    pm1_0       INTEGER,
    pm2_5       INTEGER,
    pm10        INTEGER,
    fecha       TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
)";

const CREATE_INDEX: &str = "CREATE INDEX IF NOT EXISTS idx_datos_fecha ON datos (fecha)";

const INSERT_MEASUREMENT: &str =
    "INSERT INTO datos (temperatura, humedad, pm1_0, pm2_5, pm10) VALUES (?, ?, ?, ?, ?)";

// Values written by other tools may carry any storage class; the casts coerce
// them the way the dashboard expects and leave NULL as NULL.
const SELECT_RECENT: &str = "SELECT id, \
     CAST(temperatura AS REAL) AS temperatura, \
     CAST(humedad AS REAL) AS humedad, \
     CAST(pm1_0 AS INTEGER) AS pm1_0, \
     CAST(pm2_5 AS INTEGER) AS pm2_5, \
     CAST(pm10 AS INTEGER) AS pm10, \
     CAST(fecha AS TEXT) AS fecha \
     FROM datos ORDER BY fecha DESC, id DESC LIMIT ?";

/// Database connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite connection URL
    pub url: String,
    /// Upper bound on pooled connections
    pub max_connections: u32,
    /// How long a request waits for a connection (seconds)
    pub acquire_timeout_secs: u64,
    /// Create the database file when it does not exist
    pub create_if_missing: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://measure_datalog.db".to_string(),
            max_connections: 5,
            acquire_timeout_secs: 5,
            create_if_missing: true,
        }
    }
}

/// A validated reading ready to be stored
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NewMeasurement {
    pub temperatura: f64,
    pub humedad: f64,
    pub pm1_0: i64,
    pub pm2_5: i64,
    pub pm10: i64,
}

/// A stored row of the `datos` table.
///
/// Numeric columns are nullable at the table level, so rows written by other
/// tools may come back without a value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Measurement {
    pub id: i64,
    pub temperatura: Option<f64>,
    pub humedad: Option<f64>,
    pub pm1_0: Option<i64>,
    pub pm2_5: Option<i64>,
    pub pm10: Option<i64>,
    /// Insert timestamp exactly as the database rendered it
    pub fecha: String,
}

/// Repository for measurement persistence
#[derive(Debug, Clone)]
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    /// Build a repository from settings.
    ///
    /// The pool connects lazily: an unreachable database is reported by the
    /// first operation that needs a connection, not here.
    pub fn connect_lazy(config: &DatabaseConfig) -> Result<Self, StorageError> {
        let options = SqliteConnectOptions::from_str(&config.url)
            .map_err(|e| StorageError::Config(e.to_string()))?
            .create_if_missing(config.create_if_missing);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections.max(1))
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
            .connect_lazy_with(options);

        info!(
            "Configured SQLite pool for {} (max {} connections)",
            config.url, config.max_connections
        );
        Ok(Self { pool })
    }

    /// Single-connection in-memory database with the schema already in place
    pub async fn in_memory() -> Result<Self, StorageError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| StorageError::Config(e.to_string()))?;

        // The database lives as long as its only connection does.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_lazy_with(options);

        let repo = Self { pool };
        repo.ensure_schema().await?;
        Ok(repo)
    }

    async fn acquire(&self) -> Result<PoolConnection<Sqlite>, StorageError> {
        self.pool.acquire().await.map_err(|e| {
            warn!("Failed to acquire database connection: {}", e);
            StorageError::Connection(e.to_string())
        })
    }

    /// Create the `datos` table and its timestamp index if absent
    pub async fn ensure_schema(&self) -> Result<(), StorageError> {
        let mut conn = self.acquire().await?;

        for statement in [CREATE_TABLE, CREATE_INDEX] {
            sqlx::query(statement)
                .execute(&mut *conn)
                .await
                .map_err(|e| StorageError::Statement(e.to_string()))?;
        }

        debug!("Schema for table datos is in place");
        Ok(())
    }

    /// Insert one measurement, returning the id assigned by the database
    pub async fn insert_measurement(&self, reading: &NewMeasurement) -> Result<i64, StorageError> {
        let mut conn = self.acquire().await?;

        let result = sqlx::query(INSERT_MEASUREMENT)
            .bind(reading.temperatura)
            .bind(reading.humedad)
            .bind(reading.pm1_0)
            .bind(reading.pm2_5)
            .bind(reading.pm10)
            .execute(&mut *conn)
            .await
            .map_err(|e| StorageError::Statement(e.to_string()))?;

        let id = result.last_insert_rowid();
        debug!("Inserted measurement with ID {}", id);
        Ok(id)
    }

    /// Most recent measurements, newest first, at most [`MAX_RECENT`] rows
    pub async fn recent_measurements(
        &self,
        limit: usize,
    ) -> Result<Vec<Measurement>, StorageError> {
        let limit = limit.min(MAX_RECENT) as i64;
        let mut conn = self.acquire().await?;

        let rows = sqlx::query_as::<_, Measurement>(SELECT_RECENT)
            .bind(limit)
            .fetch_all(&mut *conn)
            .await
            .map_err(|e| StorageError::Statement(e.to_string()))?;

        debug!("Fetched {} measurements (limit {})", rows.len(), limit);
        Ok(rows)
    }

    /// Total number of stored measurements
    pub async fn count(&self) -> Result<i64, StorageError> {
        let mut conn = self.acquire().await?;

        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM datos")
            .fetch_one(&mut *conn)
            .await
            .map_err(|e| StorageError::Statement(e.to_string()))
    }

    /// Close every pooled connection
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reading(temperatura: f64, pm2_5: i64) -> NewMeasurement {
        NewMeasurement {
            temperatura,
            humedad: 60.0,
            pm1_0: 5,
            pm2_5,
            pm10: 20,
        }
    }

    fn unreachable_config() -> DatabaseConfig {
        DatabaseConfig {
            url: "sqlite:///nonexistent-datalog-dir/missing/datalog.db".to_string(),
            create_if_missing: false,
            acquire_timeout_secs: 1,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_insert_and_retrieve() {
        let repo = Repository::in_memory().await.unwrap();

        let id = repo.insert_measurement(&reading(21.5, 12)).await.unwrap();
        assert_eq!(id, 1);

        let rows = repo.recent_measurements(MAX_RECENT).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, 1);
        assert_eq!(rows[0].temperatura, Some(21.5));
        assert_eq!(rows[0].humedad, Some(60.0));
        assert_eq!(rows[0].pm1_0, Some(5));
        assert_eq!(rows[0].pm2_5, Some(12));
        assert_eq!(rows[0].pm10, Some(20));
        assert!(!rows[0].fecha.is_empty());
    }

    #[tokio::test]
    async fn test_ids_increase() {
        let repo = Repository::in_memory().await.unwrap();

        let first = repo.insert_measurement(&reading(20.0, 1)).await.unwrap();
        let second = repo.insert_measurement(&reading(20.0, 2)).await.unwrap();
        let third = repo.insert_measurement(&reading(20.0, 3)).await.unwrap();

        assert!(first < second && second < third);
        assert_eq!(repo.count().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_empty_table() {
        let repo = Repository::in_memory().await.unwrap();
        let rows = repo.recent_measurements(MAX_RECENT).await.unwrap();
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn test_newest_first() {
        let repo = Repository::in_memory().await.unwrap();

        for pm in 0..3 {
            repo.insert_measurement(&reading(20.0, pm)).await.unwrap();
        }
        // An older reading inserted last must still sort last
        sqlx::query(
            "INSERT INTO datos (temperatura, humedad, pm1_0, pm2_5, pm10, fecha) \
             VALUES (1.0, 1.0, 1, 99, 1, '2020-01-01 00:00:00')",
        )
        .execute(&repo.pool)
        .await
        .unwrap();

        let rows = repo.recent_measurements(MAX_RECENT).await.unwrap();
        let pm: Vec<_> = rows.iter().map(|r| r.pm2_5.unwrap()).collect();
        assert_eq!(pm, vec![2, 1, 0, 99]);
        assert_eq!(rows[3].fecha, "2020-01-01 00:00:00");
    }

    #[tokio::test]
    async fn test_limit_is_capped() {
        let repo = Repository::in_memory().await.unwrap();

        for i in 0..(MAX_RECENT as i64 + 5) {
            repo.insert_measurement(&reading(20.0, i)).await.unwrap();
        }

        let rows = repo.recent_measurements(usize::MAX).await.unwrap();
        assert_eq!(rows.len(), MAX_RECENT);
        assert_eq!(rows[0].pm2_5, Some(MAX_RECENT as i64 + 4));

        let rows = repo.recent_measurements(10).await.unwrap();
        assert_eq!(rows.len(), 10);
    }

    #[tokio::test]
    async fn test_null_columns_are_read() {
        let repo = Repository::in_memory().await.unwrap();
        sqlx::query("INSERT INTO datos (pm10) VALUES (7)")
            .execute(&repo.pool)
            .await
            .unwrap();

        let rows = repo.recent_measurements(MAX_RECENT).await.unwrap();
        assert_eq!(rows[0].temperatura, None);
        assert_eq!(rows[0].pm2_5, None);
        assert_eq!(rows[0].pm10, Some(7));
    }

    #[tokio::test]
    async fn test_foreign_storage_classes_are_coerced() {
        let repo = Repository::in_memory().await.unwrap();
        sqlx::query(
            "INSERT INTO datos (temperatura, humedad, pm1_0, pm2_5, pm10) \
             VALUES ('n/a', '48.5', 12.5, '7', NULL)",
        )
        .execute(&repo.pool)
        .await
        .unwrap();

        let rows = repo.recent_measurements(MAX_RECENT).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].temperatura, Some(0.0));
        assert_eq!(rows[0].humedad, Some(48.5));
        assert_eq!(rows[0].pm1_0, Some(12));
        assert_eq!(rows[0].pm2_5, Some(7));
        assert_eq!(rows[0].pm10, None);
    }

    #[tokio::test]
    async fn test_unreachable_database() {
        let repo = Repository::connect_lazy(&unreachable_config()).unwrap();

        let err = repo.insert_measurement(&reading(21.5, 12)).await.unwrap_err();
        assert!(err.is_connection());

        let err = repo.recent_measurements(MAX_RECENT).await.unwrap_err();
        assert!(err.is_connection());
    }

    #[tokio::test]
    async fn test_missing_table_is_statement_error() {
        let options = SqliteConnectOptions::from_str("sqlite::memory:").unwrap();
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_lazy_with(options);
        let repo = Repository { pool };

        let err = repo.insert_measurement(&reading(21.5, 12)).await.unwrap_err();
        assert!(matches!(err, StorageError::Statement(_)));
    }

    #[test]
    fn test_invalid_url() {
        let config = DatabaseConfig {
            url: "sqlite://datalog.db?mode=bogus".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            Repository::connect_lazy(&config),
            Err(StorageError::Config(_))
        ));
    }
}
