//! Recording stub driver for unit tests
//!
//! Simulates `pg_database` as a map of database name to schema version and
//! records every statement it is asked to run. The structure hash of a
//! database is its schema version.

use crate::config::ConnectionConfig;
use crate::db::{CellValue, Driver, PoolManager};
use crate::error::{DbError, DbResult, ResetError};
use crate::fingerprint::STRUCTURE_HASH_QUERY;
use crate::reset::{ResetEngine, ResetScope};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio_postgres::error::SqlState;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Exists { database: String },
    Fingerprint { database: String },
    Drain { on: String, database: String },
    Drop { database: String },
    Create { target: String, template: String },
    CreateExtension { on: String, extension: String },
    Open { database: String },
    ClearPools,
}

impl Call {
    fn is_mutation(&self) -> bool {
        matches!(
            self,
            Call::Drain { .. } | Call::Drop { .. } | Call::Create { .. } | Call::CreateExtension { .. }
        )
    }
}

#[derive(Debug, Clone)]
struct StubDatabase {
    schema: u64,
    /// Whether rows were written since the last reset
    dirty: bool,
}

#[derive(Default)]
struct StubState {
    databases: HashMap<String, StubDatabase>,
    calls: Vec<Call>,
    scalar_override: Option<CellValue>,
    failure: Option<(String, SqlState)>,
}

#[derive(Clone, Default)]
pub struct StubDriver {
    state: Arc<Mutex<StubState>>,
}

/// Connection handed to the reset engine
pub struct StubConnection {
    database: String,
    state: Arc<Mutex<StubState>>,
}

impl StubDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(database: &str) -> ConnectionConfig {
        let mut config = tokio_postgres::Config::new();
        config.host("localhost").user("test").dbname(database);
        ConnectionConfig::from(config)
    }

    pub fn with_database(self, name: &str, schema: u64) -> Self {
        self.state.lock().unwrap().databases.insert(
            name.into(),
            StubDatabase {
                schema,
                dirty: true,
            },
        );
        self
    }

    /// Answer every scalar query with `value`
    pub fn with_scalar_override(self, value: CellValue) -> Self {
        self.state.lock().unwrap().scalar_override = Some(value);
        self
    }

    /// Fail the first statement starting with `prefix`
    pub fn with_failure(self, prefix: &str, state: SqlState) -> Self {
        self.state.lock().unwrap().failure = Some((prefix.into(), state));
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn mutations(&self) -> Vec<Call> {
        self.calls().into_iter().filter(Call::is_mutation).collect()
    }

    pub fn schema_of(&self, name: &str) -> Option<u64> {
        self.state.lock().unwrap().databases.get(name).map(|d| d.schema)
    }

    pub fn is_dirty(&self, name: &str) -> Option<bool> {
        self.state.lock().unwrap().databases.get(name).map(|d| d.dirty)
    }

    /// Simulate a migration on `name`
    pub fn alter_schema(&self, name: &str, schema: u64) {
        if let Some(db) = self.state.lock().unwrap().databases.get_mut(name) {
            db.schema = schema;
        }
    }

    /// Simulate a test writing rows into `name`
    pub fn write_rows(&self, name: &str) {
        if let Some(db) = self.state.lock().unwrap().databases.get_mut(name) {
            db.dirty = true;
        }
    }

    fn run(&self, config: &ConnectionConfig, sql: &str) -> DbResult<CellValue> {
        let on = config.database().unwrap_or_default().to_string();
        let mut state = self.state.lock().unwrap();

        if let Some((prefix, code)) = state.failure.clone() {
            if sql.starts_with(&prefix) {
                state.failure = None;
                return Err(DbError::QueryFailed {
                    sqlstate: Some(code.code().to_string()),
                    message: format!("stub failure for {}", prefix),
                });
            }
        }

        if sql == STRUCTURE_HASH_QUERY.as_str() {
            state.calls.push(Call::Fingerprint {
                database: on.clone(),
            });
            if let Some(value) = state.scalar_override.clone() {
                return Ok(value);
            }
            return Ok(state
                .databases
                .get(&on)
                .map(|db| CellValue::Numeric(Decimal::from(db.schema)))
                .unwrap_or(CellValue::Null));
        }

        if let Some(rest) = sql.strip_prefix("SELECT EXISTS (SELECT 1 FROM pg_database WHERE datname = '") {
            let database = between(rest, "", "'");
            state.calls.push(Call::Exists {
                database: database.clone(),
            });
            if let Some(value) = state.scalar_override.clone() {
                return Ok(value);
            }
            return Ok(CellValue::Boolean(state.databases.contains_key(&database)));
        }

        if sql.starts_with("SELECT pg_terminate_backend") {
            let database = between(sql, "datname = '", "'");
            state.calls.push(Call::Drain { on, database });
            return Ok(CellValue::Null);
        }

        if let Some(rest) = sql.strip_prefix("DROP DATABASE IF EXISTS \"") {
            let database = between(rest, "", "\"");
            state.databases.remove(&database);
            state.calls.push(Call::Drop { database });
            return Ok(CellValue::Null);
        }

        if let Some(rest) = sql.strip_prefix("CREATE DATABASE \"") {
            let target = between(rest, "", "\"");
            let template = between(rest, "TEMPLATE \"", "\"");
            state.calls.push(Call::Create {
                target: target.clone(),
                template: template.clone(),
            });
            if state.databases.contains_key(&target) {
                return Err(stub_error(SqlState::DUPLICATE_DATABASE, "already exists"));
            }
            let Some(copy) = state.databases.get(&template).cloned() else {
                return Err(stub_error(SqlState::INVALID_CATALOG_NAME, "does not exist"));
            };
            state.databases.insert(target, copy);
            return Ok(CellValue::Null);
        }

        if let Some(extension) = sql.strip_prefix("CREATE EXTENSION IF NOT EXISTS ") {
            state.calls.push(Call::CreateExtension {
                on,
                extension: extension.trim_matches('"').to_string(),
            });
            return Ok(CellValue::Null);
        }

        panic!("stub driver got unexpected SQL: {}", sql);
    }
}

fn between(text: &str, start: &str, end: &str) -> String {
    let from = text.find(start).map(|i| i + start.len()).unwrap_or(0);
    let rest = &text[from..];
    rest[..rest.find(end).unwrap_or(rest.len())].to_string()
}

fn stub_error(code: SqlState, message: &str) -> DbError {
    DbError::QueryFailed {
        sqlstate: Some(code.code().to_string()),
        message: message.to_string(),
    }
}

impl Driver for StubDriver {
    type Connection = StubConnection;

    async fn open(&self, config: &ConnectionConfig) -> DbResult<StubConnection> {
        let database = config.database().unwrap_or_default().to_string();
        self.state.lock().unwrap().calls.push(Call::Open {
            database: database.clone(),
        });
        Ok(StubConnection {
            database,
            state: Arc::clone(&self.state),
        })
    }

    async fn execute(&self, config: &ConnectionConfig, sql: &str) -> DbResult<()> {
        self.run(config, sql).map(|_| ())
    }

    async fn query_scalar(&self, config: &ConnectionConfig, sql: &str) -> DbResult<CellValue> {
        self.run(config, sql)
    }
}

impl PoolManager for StubDriver {
    fn clear_pools(&self) {
        self.state.lock().unwrap().calls.push(Call::ClearPools);
    }
}

/// Reset engine that marks the connected database clean and counts calls
#[derive(Default)]
pub struct CountingEngine {
    calls: AtomicUsize,
    scopes: Mutex<Vec<ResetScope>>,
    fail: bool,
}

impl CountingEngine {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn scopes(&self) -> Vec<ResetScope> {
        self.scopes.lock().unwrap().clone()
    }
}

impl ResetEngine<StubConnection> for CountingEngine {
    async fn reset(&self, connection: &StubConnection, scope: &ResetScope) -> Result<(), ResetError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.scopes.lock().unwrap().push(scope.clone());
        if self.fail {
            return Err(ResetError::InvalidTable("stub failure".into()));
        }
        if let Some(db) = connection
            .state
            .lock()
            .unwrap()
            .databases
            .get_mut(&connection.database)
        {
            db.dirty = false;
        }
        Ok(())
    }
}
