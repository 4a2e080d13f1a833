//! Connection draining
//!
//! PostgreSQL refuses to drop a database, or use it as a template, while
//! sessions are attached. Draining terminates every backend bound to the
//! database except the one issuing the command. Clients mid-query against
//! that database see their connection die; that is expected.

use crate::config::ConnectionConfig;
use crate::db::Driver;
use crate::error::{CheckpointError, Result};
use crate::identifier::Identifier;
use tracing::debug;

pub(crate) fn terminate_sessions_sql(database: &Identifier) -> String {
    format!(
        "SELECT pg_terminate_backend(pg_stat_activity.pid) \
         FROM pg_stat_activity \
         WHERE pg_stat_activity.datname = '{}' AND pid <> pg_backend_pid()",
        database
    )
}

/// Terminate all sessions attached to `database`.
///
/// `system` must point at a different database (normally `postgres`).
/// Draining a database with no sessions is a no-op.
pub async fn drain<D: Driver>(
    driver: &D,
    system: &ConnectionConfig,
    database: &Identifier,
) -> Result<()> {
    if system.database() == Some(database.as_str()) {
        return Err(CheckpointError::InvalidArgument(format!(
            "cannot drain '{}' from a connection to itself",
            database
        )));
    }

    debug!(%database, "draining sessions");
    driver
        .execute(system, &terminate_sessions_sql(database))
        .await?;
    Ok(())
}
