//! Reset engine seam
//!
//! On a cache miss the checkpoint hands an open connection to the target to a
//! [`ResetEngine`], which must leave the target's rows in their known state.
//! The table and schema filters are passed through untouched.

use crate::config::CheckpointOptions;
use crate::error::ResetError;
use std::future::Future;
use std::time::Duration;

/// What the reset engine may touch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResetScope {
    pub tables_to_ignore: Vec<String>,
    pub schemas_to_include: Vec<String>,
    pub schemas_to_exclude: Vec<String>,
    pub command_timeout: Option<Duration>,
}

impl From<&CheckpointOptions> for ResetScope {
    fn from(options: &CheckpointOptions) -> Self {
        Self {
            tables_to_ignore: options.tables_to_ignore.clone(),
            schemas_to_include: options.schemas_to_include.clone(),
            schemas_to_exclude: options.schemas_to_exclude.clone(),
            command_timeout: options.command_timeout(),
        }
    }
}

/// Restores a database's rows to a known state over an open connection
pub trait ResetEngine<C>: Send + Sync {
    fn reset(
        &self,
        connection: &C,
        scope: &ResetScope,
    ) -> impl Future<Output = Result<(), ResetError>> + Send;
}
