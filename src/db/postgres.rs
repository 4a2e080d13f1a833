//! PostgreSQL driver
//!
//! Concrete implementation using tokio-postgres, with a small per-database
//! client pool.

use crate::config::{ConnectionConfig, SslMode};
use crate::db::types::{CellValue, DataType};
use crate::db::{Driver, PoolManager};
use crate::error::{DbError, DbResult};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio_postgres::types::Type;
use tokio_postgres::{CancelToken, Client};
use tracing::{debug, warn};

/// A pooled connection; clones share the same backend session
pub type PooledClient = Arc<PostgresConnection>;

/// One backend session and the means to cancel what it is running
pub struct PostgresConnection {
    client: Client,
    cancel_token: CancelToken,
    ssl_mode: SslMode,
}

impl PostgresConnection {
    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn is_closed(&self) -> bool {
        self.client.is_closed()
    }

    /// Send a cancel request for the statement currently running on this session.
    pub async fn cancel_query(&self) -> DbResult<()> {
        match self.ssl_mode {
            SslMode::Disable => self.cancel_token.cancel_query(tokio_postgres::NoTls).await,
            SslMode::Prefer | SslMode::Require => {
                let tls = tokio_postgres_rustls::MakeRustlsConnect::new(make_tls_config());
                self.cancel_token.cancel_query(tls).await
            }
        }
        .map_err(|e| DbError::QueryFailed {
            sqlstate: None,
            message: format!("cancel failed: {}", e),
        })
    }

    /// Await `fut`, a statement on this session.
    ///
    /// When `limit` elapses first the statement is cancelled on the server
    /// before `DbError::Timeout` is returned.
    pub async fn bounded<T>(
        &self,
        limit: Option<Duration>,
        fut: impl Future<Output = DbResult<T>>,
    ) -> DbResult<T> {
        let Some(limit) = limit else {
            return fut.await;
        };
        match tokio::time::timeout(limit, fut).await {
            Ok(result) => result,
            Err(_) => {
                debug!(?limit, "statement timed out; cancelling on the server");
                if let Err(e) = self.cancel_query().await {
                    warn!(error = %e, "timed-out statement may still be running");
                }
                Err(DbError::Timeout(limit))
            }
        }
    }
}

/// PostgreSQL driver
pub struct PostgresDriver {
    /// One connection per descriptor
    pool: Mutex<HashMap<String, PooledClient>>,
    /// Upper bound for every connect and statement round-trip
    command_timeout: Option<Duration>,
}

impl PostgresDriver {
    pub fn new(command_timeout: Option<Duration>) -> Self {
        Self {
            pool: Mutex::new(HashMap::new()),
            command_timeout,
        }
    }

    #[cfg(test)]
    fn pooled_clients(&self) -> usize {
        self.lock_pool().len()
    }

    fn lock_pool(&self) -> MutexGuard<'_, HashMap<String, PooledClient>> {
        // The map stays consistent even if a holder panicked
        self.pool.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Check out a live connection for `config`, connecting if needed.
    ///
    /// Two checkouts racing for the same descriptor may both connect; the
    /// first to return is pooled and the other connection is dropped.
    async fn client(&self, config: &ConnectionConfig) -> DbResult<PooledClient> {
        let key = config.pool_key();

        {
            let mut pool = self.lock_pool();
            let cached = pool.get(&key).cloned();
            match cached {
                Some(client) if !client.is_closed() => return Ok(client),
                Some(_) => {
                    debug!(database = ?config.database(), "discarding closed pooled client");
                    pool.remove(&key);
                }
                None => {}
            }
        }

        let pending = connect(config);
        let connection = match self.command_timeout {
            Some(limit) => tokio::time::timeout(limit, pending)
                .await
                .map_err(|_| DbError::Timeout(limit))??,
            None => pending.await?,
        };
        let connection = Arc::new(connection);

        let mut pool = self.lock_pool();
        let pooled = pool.get(&key).filter(|c| !c.is_closed()).cloned();
        match pooled {
            Some(winner) => Ok(winner),
            None => {
                pool.insert(key, Arc::clone(&connection));
                Ok(connection)
            }
        }
    }
}

impl Default for PostgresDriver {
    fn default() -> Self {
        Self::new(None)
    }
}

impl Driver for PostgresDriver {
    type Connection = PooledClient;

    async fn open(&self, config: &ConnectionConfig) -> DbResult<PooledClient> {
        self.client(config).await
    }

    async fn execute(&self, config: &ConnectionConfig, sql: &str) -> DbResult<()> {
        let connection = self.client(config).await?;
        // Simple protocol: CREATE/DROP DATABASE refuse to run in a transaction block
        connection
            .bounded(self.command_timeout, async {
                connection.client().batch_execute(sql).await.map_err(DbError::from)
            })
            .await
    }

    async fn query_scalar(&self, config: &ConnectionConfig, sql: &str) -> DbResult<CellValue> {
        let connection = self.client(config).await?;
        let rows = connection
            .bounded(self.command_timeout, async {
                connection.client().query(sql, &[]).await.map_err(DbError::from)
            })
            .await?;

        match rows.first() {
            Some(row) if !row.is_empty() => extract_scalar(row),
            _ => Ok(CellValue::Null),
        }
    }
}

impl PoolManager for PostgresDriver {
    fn clear_pools(&self) {
        let mut pool = self.lock_pool();
        debug!(clients = pool.len(), "clearing connection pool");
        pool.clear();
    }
}

/// Open a new connection, spawning its background task.
async fn connect(config: &ConnectionConfig) -> DbResult<PostgresConnection> {
    let database = config.database().unwrap_or_default().to_string();
    let ssl_mode = config.ssl_mode();
    debug!(host = %config.host(), port = config.port(), %database, "connecting");

    let client = match ssl_mode {
        SslMode::Disable => {
            let (client, connection) = config
                .pg_config()
                .connect(tokio_postgres::NoTls)
                .await
                .map_err(|e| DbError::ConnectionFailed(e.to_string()))?;
            spawn_connection(connection, database);
            client
        }
        SslMode::Prefer | SslMode::Require => {
            let tls = tokio_postgres_rustls::MakeRustlsConnect::new(make_tls_config());
            let (client, connection) = config
                .pg_config()
                .connect(tls)
                .await
                .map_err(|e| DbError::ConnectionFailed(e.to_string()))?;
            spawn_connection(connection, database);
            client
        }
    };

    let cancel_token = client.cancel_token();
    Ok(PostgresConnection {
        client,
        cancel_token,
        ssl_mode,
    })
}

fn spawn_connection<F>(connection: F, database: String)
where
    F: Future<Output = Result<(), tokio_postgres::Error>> + Send + 'static,
{
    tokio::spawn(async move {
        // Terminated sessions end up here after a drain
        if let Err(e) = connection.await {
            debug!(%database, error = %e, "connection closed");
        }
    });
}

/// Build a rustls ClientConfig that trusts OS certificates (with Mozilla roots as fallback)
fn make_tls_config() -> rustls::ClientConfig {
    let mut root_store = rustls::RootCertStore::empty();

    let native_certs = rustls_native_certs::load_native_certs();
    let mut loaded = 0;
    for cert in native_certs.certs {
        if root_store.add(cert).is_ok() {
            loaded += 1;
        }
    }
    if loaded == 0 {
        root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    }

    rustls::ClientConfig::builder()
        .with_root_certificates(root_store)
        .with_no_client_auth()
}

/// Map tokio_postgres Type to our DataType enum
fn pg_type_to_datatype(pg_type: &Type) -> DataType {
    match *pg_type {
        Type::INT2 => DataType::SmallInt,
        Type::INT4 => DataType::Integer,
        Type::INT8 => DataType::BigInt,
        Type::NUMERIC => DataType::Numeric,
        Type::TEXT | Type::NAME | Type::VARCHAR | Type::BPCHAR => DataType::Text,
        Type::BOOL => DataType::Boolean,
        _ => DataType::Unknown(pg_type.name().to_string()),
    }
}

/// Decode column 0 of `row`.
fn extract_scalar(row: &tokio_postgres::Row) -> DbResult<CellValue> {
    let conversion = |e: tokio_postgres::Error| DbError::TypeConversion(e.to_string());
    let data_type = pg_type_to_datatype(row.columns()[0].type_());

    let value = match data_type {
        DataType::SmallInt => row
            .try_get::<_, Option<i16>>(0)
            .map_err(conversion)?
            .map(|v| CellValue::Integer(v as i64)),
        DataType::Integer => row
            .try_get::<_, Option<i32>>(0)
            .map_err(conversion)?
            .map(|v| CellValue::Integer(v as i64)),
        DataType::BigInt => row
            .try_get::<_, Option<i64>>(0)
            .map_err(conversion)?
            .map(CellValue::Integer),
        DataType::Numeric => row
            .try_get::<_, Option<Decimal>>(0)
            .map_err(conversion)?
            .map(CellValue::Numeric),
        DataType::Boolean => row
            .try_get::<_, Option<bool>>(0)
            .map_err(conversion)?
            .map(CellValue::Boolean),
        DataType::Text => row
            .try_get::<_, Option<String>>(0)
            .map_err(conversion)?
            .map(CellValue::Text),
        DataType::Unknown(name) => {
            return Err(DbError::TypeConversion(format!(
                "unsupported scalar type: {}",
                name
            )));
        }
    };

    Ok(value.unwrap_or(CellValue::Null))
}
