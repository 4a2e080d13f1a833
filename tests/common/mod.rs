//! Common test utilities and helpers
//!
//! Shared infrastructure for the integration tests: throwaway databases on
//! the test server and plain tokio-postgres access to them.

use pgrespawn::CACHE_DATABASE_SUFFIX;
use pgrespawn::config::ConnectionConfig;
use tokio_postgres::{Client, NoTls};

/// Connection string for `database` on the test server
pub fn server_descriptor(database: &str) -> String {
    let host = std::env::var("TEST_DB_HOST").unwrap_or_else(|_| "localhost".to_string());
    let port = std::env::var("TEST_DB_PORT").unwrap_or_else(|_| "5433".to_string());
    let user = std::env::var("TEST_DB_USER").unwrap_or_else(|_| "test_user".to_string());
    let password =
        std::env::var("TEST_DB_PASSWORD").unwrap_or_else(|_| "test_password".to_string());
    format!(
        "host={} port={} user={} password={} dbname={} sslmode=disable",
        host, port, user, password, database
    )
}

/// Connection configuration for the test server's `postgres` database
pub fn server_config() -> ConnectionConfig {
    ConnectionConfig::parse(&server_descriptor("postgres")).expect("valid test server descriptor")
}

/// Open a standalone connection, outside of any pgrespawn pool
pub async fn connect(config: &ConnectionConfig) -> Result<Client, tokio_postgres::Error> {
    let (client, connection) = config.pg_config().connect(NoTls).await?;
    tokio::spawn(async move {
        let _ = connection.await;
    });
    Ok(client)
}

/// A uniquely named database that is dropped (with its cache) on cleanup
pub struct TestDatabase {
    pub name: String,
    pub config: ConnectionConfig,
}

impl TestDatabase {
    /// Create the database and run `schema_sql` in it.
    ///
    /// Returns `None` when the test server is unreachable.
    pub async fn create(schema_sql: &str) -> Option<Self> {
        let server = server_config();
        let admin = match connect(&server).await {
            Ok(client) => client,
            Err(e) => {
                eprintln!(
                    "Skipping test: Database not available at {}:{} - {}",
                    server.host(),
                    server.port(),
                    e
                );
                return None;
            }
        };

        let name = format!("pgrespawn_{}", uuid::Uuid::new_v4().simple());
        admin
            .batch_execute(&format!("CREATE DATABASE \"{}\"", name))
            .await
            .expect("create test database");

        let db = Self {
            config: server.with_database(&name),
            name,
        };
        if !schema_sql.is_empty() {
            db.execute(schema_sql).await;
        }
        Some(db)
    }

    pub fn cache_name(&self) -> String {
        format!("{}{}", self.name, CACHE_DATABASE_SUFFIX)
    }

    pub fn connection_string(&self) -> String {
        server_descriptor(&self.name)
    }

    /// Run `sql` on a fresh connection to this database
    pub async fn execute(&self, sql: &str) {
        let client = connect(&self.config).await.expect("connect to test database");
        client.batch_execute(sql).await.expect("execute test SQL");
    }

    pub async fn count_rows(&self, database: &str, table: &str) -> i64 {
        let client = connect(&self.config.with_database(database))
            .await
            .expect("connect for row count");
        client
            .query_one(&format!("SELECT count(*) FROM {}", table), &[])
            .await
            .expect("count rows")
            .get(0)
    }

    pub async fn database_exists(&self, database: &str) -> bool {
        let client = connect(&server_config()).await.expect("connect to server");
        client
            .query_one(
                "SELECT EXISTS (SELECT 1 FROM pg_database WHERE datname = $1)",
                &[&database],
            )
            .await
            .expect("query pg_database")
            .get(0)
    }

    /// Drop this database and its cache
    pub async fn cleanup(self) {
        let Ok(client) = connect(&server_config()).await else {
            return;
        };
        for database in [self.name.clone(), self.cache_name()] {
            let _ = client
                .execute(
                    "SELECT pg_terminate_backend(pid) FROM pg_stat_activity \
                     WHERE datname = $1 AND pid <> pg_backend_pid()",
                    &[&database],
                )
                .await;
            let _ = client
                .batch_execute(&format!("DROP DATABASE IF EXISTS \"{}\"", database))
                .await;
        }
    }
}
