//! Schema-hash-gated template cache
//!
//! [`Checkpoint::reset`] brings a target database back to its known state.
//! Each target has at most one cache database, `<target>__respawn_cache`,
//! holding a physical copy of the target as it looked right after its last
//! full reset.
//!
//! - Cache present and structurally identical to the target: the target is
//!   recreated from the cache and the reset engine is not called.
//! - Otherwise: the reset engine empties the target in place, then the cache
//!   is (re)created as a copy of the freshly reset target.
//!
//! The cache is only ever filled from a target that was just reset, never
//! from an older cache generation.
//!
//! Concurrent `reset` calls for the same target from different processes are
//! not coordinated. Both may miss and both may rebuild the cache; the loser of
//! a create race gets `CloneConflict` or `SourceUnavailable`.

use crate::clone::{clone_if_absent, create_extension_if_not_exists, database_exists, force_clone};
use crate::config::{CheckpointOptions, ConnectionConfig};
use crate::db::{Driver, PoolManager, PostgresDriver};
use crate::error::{CheckpointError, Result};
use crate::fingerprint::fingerprint;
use crate::identifier::Identifier;
use crate::reset::{ResetEngine, ResetScope};
use crate::target::{SYSTEM_DATABASE, extract_database_name, to_system_config};
use crate::truncate::TruncateEngine;
use std::fmt;
use tracing::{debug, error, info, warn};

/// Appended to the target's name to form the cache database's name
pub const CACHE_DATABASE_SUFFIX: &str = "__respawn_cache";

/// Where a `reset` call currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckpointState {
    Idle,
    CacheLookup,
    CacheHit,
    CacheMiss,
    Rebuilding,
    CacheRefresh,
    Done,
    Failed,
}

impl fmt::Display for CheckpointState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CheckpointState::Idle => "idle",
            CheckpointState::CacheLookup => "cache-lookup",
            CheckpointState::CacheHit => "cache-hit",
            CheckpointState::CacheMiss => "cache-miss",
            CheckpointState::Rebuilding => "rebuilding",
            CheckpointState::CacheRefresh => "cache-refresh",
            CheckpointState::Done => "done",
            CheckpointState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Which path a successful `reset` took
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetOutcome {
    /// The target was recreated from a matching cache
    CacheHit,
    /// The reset engine ran and the cache was refreshed from the target
    Rebuilt,
}

/// Names involved in one `reset` call
struct Plan<'a> {
    config: &'a ConnectionConfig,
    system: ConnectionConfig,
    target: Identifier,
    cache: Identifier,
    extensions: Vec<Identifier>,
}

/// Resets target databases, using a template cache when it is still valid
pub struct Checkpoint<D, E> {
    driver: D,
    engine: E,
    options: CheckpointOptions,
    scope: ResetScope,
}

impl Checkpoint<PostgresDriver, TruncateEngine> {
    /// PostgreSQL driver and truncation engine, with `options.command_timeout`
    /// applied to every statement
    pub fn postgres(options: CheckpointOptions) -> Self {
        let driver = PostgresDriver::new(options.command_timeout());
        Self::new(driver, TruncateEngine, options)
    }
}

impl<D, E> Checkpoint<D, E>
where
    D: Driver + PoolManager,
    E: ResetEngine<D::Connection>,
{
    pub fn new(driver: D, engine: E, options: CheckpointOptions) -> Self {
        let scope = ResetScope::from(&options);
        Self {
            driver,
            engine,
            options,
            scope,
        }
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Reset the database named by `connection_string`.
    ///
    /// # Errors
    /// `InvalidArgument` / `InvalidIdentifier` before any backend call;
    /// anything the backend or reset engine reports afterwards, unchanged.
    pub async fn reset(&self, connection_string: &str) -> Result<ResetOutcome> {
        let config = ConnectionConfig::parse(connection_string)?;
        self.reset_config(&config).await
    }

    /// Reset the database `config` points at.
    pub async fn reset_config(&self, config: &ConnectionConfig) -> Result<ResetOutcome> {
        let plan = self.plan(config)?;

        let result = self.run(&plan).await;

        // Drained sessions may still sit in the pool
        self.driver.clear_pools();

        match &result {
            Ok(outcome) => {
                enter(CheckpointState::Done, &plan.target);
                info!(target_db = %plan.target, ?outcome, "reset complete");
            }
            Err(e) => {
                enter(CheckpointState::Failed, &plan.target);
                error!(target_db = %plan.target, error = %e, "reset failed");
            }
        }
        result
    }

    /// Validate every name up front so nothing reaches the backend unchecked.
    fn plan<'a>(&self, config: &'a ConnectionConfig) -> Result<Plan<'a>> {
        let target = extract_database_name(config)?;
        if target.as_str() == SYSTEM_DATABASE {
            return Err(CheckpointError::InvalidArgument(format!(
                "refusing to reset the '{}' system database",
                SYSTEM_DATABASE
            )));
        }
        let cache = target.with_suffix(CACHE_DATABASE_SUFFIX)?;

        let extensions = if self.options.auto_create_extensions {
            self.options
                .extensions
                .iter()
                .map(|e| Identifier::parse(e))
                .collect::<Result<Vec<_>>>()?
        } else {
            Vec::new()
        };

        Ok(Plan {
            config,
            system: to_system_config(config),
            target,
            cache,
            extensions,
        })
    }

    async fn run(&self, plan: &Plan<'_>) -> Result<ResetOutcome> {
        enter(CheckpointState::Idle, &plan.target);
        for extension in &plan.extensions {
            create_extension_if_not_exists(&self.driver, &plan.system, extension).await?;
        }

        enter(CheckpointState::CacheLookup, &plan.target);
        let cache_exists = database_exists(&self.driver, &plan.system, &plan.cache).await?;

        if cache_exists && self.cache_is_current(plan).await? {
            enter(CheckpointState::CacheHit, &plan.target);
            // The target always exists at this point, so it is replaced rather
            // than created
            force_clone(&self.driver, &plan.system, &plan.target, &plan.cache).await?;
            return Ok(ResetOutcome::CacheHit);
        }

        enter(CheckpointState::CacheMiss, &plan.target);
        enter(CheckpointState::Rebuilding, &plan.target);
        {
            let connection = self.driver.open(plan.config).await?;
            self.engine.reset(&connection, &self.scope).await?;
        }

        enter(CheckpointState::CacheRefresh, &plan.target);
        if cache_exists {
            force_clone(&self.driver, &plan.system, &plan.cache, &plan.target).await?;
        } else if !clone_if_absent(&self.driver, &plan.system, &plan.cache, &plan.target).await? {
            warn!(
                cache_db = %plan.cache,
                "cache database appeared while rebuilding; another process is refreshing it"
            );
        }

        Ok(ResetOutcome::Rebuilt)
    }

    async fn cache_is_current(&self, plan: &Plan<'_>) -> Result<bool> {
        let target_hash = fingerprint(&self.driver, plan.config).await?;
        let cache_config = plan.config.with_database(plan.cache.as_str());
        let cache_hash = fingerprint(&self.driver, &cache_config).await?;

        debug!(
            target_db = %plan.target,
            %target_hash,
            %cache_hash,
            "compared structure fingerprints"
        );
        Ok(target_hash == cache_hash)
    }
}

fn enter(state: CheckpointState, target: &Identifier) {
    debug!(target_db = %target, %state, "checkpoint state");
}
