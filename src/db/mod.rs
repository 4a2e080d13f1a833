//! Database abstraction layer
//!
//! The checkpoint logic talks to the backend only through the [`Driver`] and
//! [`PoolManager`] traits, so it can run against a real server or a recording
//! stub in tests.

pub mod postgres;
pub mod types;

use crate::config::ConnectionConfig;
use crate::error::DbResult;
use std::future::Future;

// Re-export main types
pub use postgres::{PooledClient, PostgresConnection, PostgresDriver};
pub use types::{CellValue, DataType};

/// Backend driver
///
/// Every call names the database it must run against; how connections are
/// opened and reused is up to the implementation.
pub trait Driver: Send + Sync {
    /// An open connection handed to the reset engine
    type Connection: Send + Sync;

    /// Open (or check out) a connection to `config`'s database
    ///
    /// # Errors
    /// Returns `DbError::ConnectionFailed` if connection cannot be established
    fn open(
        &self,
        config: &ConnectionConfig,
    ) -> impl Future<Output = DbResult<Self::Connection>> + Send;

    /// Run a statement that returns no rows
    ///
    /// # Errors
    /// Returns `DbError::QueryFailed` with the backend's diagnostic text
    fn execute(&self, config: &ConnectionConfig, sql: &str)
    -> impl Future<Output = DbResult<()>> + Send;

    /// Run a query and return the first column of the first row
    ///
    /// A query returning no rows yields `CellValue::Null`.
    fn query_scalar(
        &self,
        config: &ConnectionConfig,
        sql: &str,
    ) -> impl Future<Output = DbResult<CellValue>> + Send;
}

/// Ownership of pooled connections
///
/// Draining a database kills backend sessions behind the pool's back, so the
/// pool must be flushed before anything is handed out again.
pub trait PoolManager: Send + Sync {
    fn clear_pools(&self);
}
