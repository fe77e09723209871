//! Storage Layer
//!
//! SQLite persistence for sensor measurements, behind a repository.

mod repository;

pub use repository::{DatabaseConfig, Measurement, NewMeasurement, Repository, MAX_RECENT};

use thiserror::Error;

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    /// No connection could be obtained from the pool
    #[error("Connection error: {0}")]
    Connection(String),
    /// The statement was rejected by the database
    #[error("Statement error: {0}")]
    Statement(String),
    /// Invalid connection settings
    #[error("Invalid database configuration: {0}")]
    Config(String),
}

impl StorageError {
    /// Whether the failure happened before any statement was run
    pub fn is_connection(&self) -> bool {
        matches!(self, StorageError::Connection(_))
    }
}
