//! Error types for pgrespawn
//!
//! This module defines the error hierarchy used throughout the crate.
//! We use `thiserror` for library-style errors with clear error chains.

use tokio_postgres::error::SqlState;

/// Main error type returned by [`crate::Checkpoint::reset`]
#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    /// Empty or unparsable connection descriptor, or a misuse of the API
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// An identifier failed the DDL allow-list
    #[error("Invalid identifier '{0}': only ASCII letters, digits, '-' and '_' are allowed")]
    InvalidIdentifier(String),

    /// The catalog query returned no rows
    #[error("Could not determine structure hash for database '{0}'")]
    HashUnavailable(String),

    /// Any error surfaced by the driver, diagnostic text preserved
    #[error("Backend operation failed: {0}")]
    Backend(#[from] DbError),

    /// The clone target was created by someone else in the meantime
    #[error("Cannot clone into '{target}': database already exists ({source})")]
    CloneConflict {
        target: String,
        #[source]
        source: DbError,
    },

    /// The template database is missing or still has attached sessions
    #[error("Template database '{template}' is unavailable ({source})")]
    SourceUnavailable {
        template: String,
        #[source]
        source: DbError,
    },

    /// The external reset engine failed
    #[error("Reset engine failed: {0}")]
    Reset(#[from] ResetError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Database operation errors
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    /// Failed to establish connection
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Statement execution failed
    #[error("Query execution failed: {message}")]
    QueryFailed {
        /// Five-character SQLSTATE, when the server reported one
        sqlstate: Option<String>,
        message: String,
    },

    /// Operation timed out
    #[error("Operation timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// Type conversion error
    #[error("Type conversion error: {0}")]
    TypeConversion(String),
}

impl DbError {
    /// Whether the server reported the given SQLSTATE
    pub fn has_sqlstate(&self, state: &SqlState) -> bool {
        matches!(self, DbError::QueryFailed { sqlstate: Some(code), .. } if code == state.code())
    }
}

impl From<tokio_postgres::Error> for DbError {
    fn from(e: tokio_postgres::Error) -> Self {
        DbError::QueryFailed {
            sqlstate: e.code().map(|c| c.code().to_string()),
            message: e.to_string(),
        }
    }
}

/// Errors raised by a [`crate::reset::ResetEngine`]
#[derive(Debug, thiserror::Error)]
pub enum ResetError {
    /// The engine's own statements failed
    #[error("{0}")]
    Database(#[from] DbError),

    /// A table name in `tables_to_ignore` could not be understood
    #[error("Invalid table reference: {0}")]
    InvalidTable(String),
}

/// Configuration loading/parsing errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Home directory not found
    #[error("Could not determine home directory")]
    NoHomeDir,

    /// Config file could not be read
    #[error("Configuration file not readable: {0}")]
    NotFound(String),

    /// Failed to parse TOML
    #[error("Failed to parse configuration: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Specialized Result type for checkpoint operations
pub type Result<T> = std::result::Result<T, CheckpointError>;

/// Specialized Result type for database operations
pub type DbResult<T> = std::result::Result<T, DbError>;

/// Specialized Result type for config operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;
