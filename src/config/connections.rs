//! Connection configuration
//!
//! Parses connection descriptors (`postgres://` URLs or libpq `key=value`
//! strings). The parsed `tokio_postgres::Config` is kept whole, so parameters
//! pgrespawn never looks at (`options`, `application_name`, keepalives, extra
//! hosts) survive into every connection derived from it.

use crate::error::{CheckpointError, Result};
use std::str::FromStr;
use tokio_postgres::config::Host;

/// Database connection configuration
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    inner: tokio_postgres::Config,
}

/// SSL connection mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SslMode {
    Disable,
    #[default]
    Prefer,
    Require,
}

impl ConnectionConfig {
    /// Parse a `postgres://` URL or a libpq `key=value` connection string.
    ///
    /// A descriptor without a host connects to `localhost`.
    ///
    /// # Errors
    /// Returns `CheckpointError::InvalidArgument` for empty input or a
    /// descriptor the parser rejects.
    pub fn parse(descriptor: &str) -> Result<Self> {
        let descriptor = descriptor.trim();
        if descriptor.is_empty() {
            return Err(CheckpointError::InvalidArgument(
                "connection descriptor is empty".into(),
            ));
        }

        let mut inner = tokio_postgres::Config::from_str(descriptor).map_err(|e| {
            CheckpointError::InvalidArgument(format!("invalid connection descriptor: {}", e))
        })?;
        if inner.get_hosts().is_empty() {
            inner.host("localhost");
        }

        Ok(Self { inner })
    }

    /// Database name, if the descriptor carries a non-empty one
    pub fn database(&self) -> Option<&str> {
        self.inner.get_dbname().filter(|d| !d.is_empty())
    }

    /// Hosts in descriptor order, comma separated
    pub fn host(&self) -> String {
        self.inner
            .get_hosts()
            .iter()
            .map(|host| match host {
                Host::Tcp(h) => h.clone(),
                #[cfg(unix)]
                Host::Unix(path) => path.to_string_lossy().into_owned(),
            })
            .collect::<Vec<_>>()
            .join(",")
    }

    /// First port, or 5432
    pub fn port(&self) -> u16 {
        self.inner.get_ports().first().copied().unwrap_or(5432)
    }

    pub fn ssl_mode(&self) -> SslMode {
        match self.inner.get_ssl_mode() {
            tokio_postgres::config::SslMode::Disable => SslMode::Disable,
            tokio_postgres::config::SslMode::Require => SslMode::Require,
            _ => SslMode::Prefer,
        }
    }

    /// The full parsed descriptor
    pub fn pg_config(&self) -> &tokio_postgres::Config {
        &self.inner
    }

    /// Identical descriptor pointing at another database
    pub fn with_database(&self, database: &str) -> Self {
        let mut inner = self.inner.clone();
        inner.dbname(database);
        Self { inner }
    }

    /// Key that tells two descriptors apart, password included
    pub(crate) fn pool_key(&self) -> String {
        // Debug output redacts the password
        format!("{:?} {:?}", self.inner, self.inner.get_password())
    }
}

impl From<tokio_postgres::Config> for ConnectionConfig {
    fn from(inner: tokio_postgres::Config) -> Self {
        Self { inner }
    }
}

impl FromStr for ConnectionConfig {
    type Err = CheckpointError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}
