//! Connection-target resolution
//!
//! Works out which database a descriptor points at, and builds the sibling
//! descriptor used for statements that must run outside of it.

use crate::config::ConnectionConfig;
use crate::error::{CheckpointError, Result};
use crate::identifier::Identifier;

/// The bootstrap database every PostgreSQL instance has
pub const SYSTEM_DATABASE: &str = "postgres";

/// Database name of `config`, validated for DDL use.
///
/// # Errors
/// `InvalidArgument` if the descriptor names no database, `InvalidIdentifier`
/// if the name fails the allow-list.
pub fn extract_database_name(config: &ConnectionConfig) -> Result<Identifier> {
    let name = config.database().ok_or_else(|| {
        CheckpointError::InvalidArgument("the connection descriptor does not name a database".into())
    })?;
    Identifier::parse(name)
}

/// The same descriptor, every parameter kept, pointed at [`SYSTEM_DATABASE`]
pub fn to_system_config(config: &ConnectionConfig) -> ConnectionConfig {
    config.with_database(SYSTEM_DATABASE)
}
