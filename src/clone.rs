//! Template cloning
//!
//! Databases are copied with `CREATE DATABASE ... TEMPLATE ...`, which needs
//! both the template and the target free of sessions. None of these steps can
//! share a transaction, so a forced clone is a saga:
//!
//! 1. drain the template
//! 2. drain the target
//! 3. drop the target
//! 4. create the target from the template
//!
//! A failure in step 4 leaves the target absent. Nothing tries to restore it;
//! the error is logged and returned as-is.

use crate::config::ConnectionConfig;
use crate::db::Driver;
use crate::drain::drain;
use crate::error::{CheckpointError, DbError, Result};
use crate::identifier::Identifier;
use tokio_postgres::error::SqlState;
use tracing::{debug, error, info};

pub(crate) fn exists_sql(database: &Identifier) -> String {
    format!(
        "SELECT EXISTS (SELECT 1 FROM pg_database WHERE datname = '{}')",
        database
    )
}

pub(crate) fn drop_sql(database: &Identifier) -> String {
    format!("DROP DATABASE IF EXISTS \"{}\"", database)
}

pub(crate) fn create_from_template_sql(target: &Identifier, template: &Identifier) -> String {
    format!("CREATE DATABASE \"{}\" TEMPLATE \"{}\"", target, template)
}

pub(crate) fn create_extension_sql(extension: &Identifier) -> String {
    format!("CREATE EXTENSION IF NOT EXISTS \"{}\"", extension)
}

/// Whether `database` exists on the server `system` points at
pub async fn database_exists<D: Driver>(
    driver: &D,
    system: &ConnectionConfig,
    database: &Identifier,
) -> Result<bool> {
    let value = driver.query_scalar(system, &exists_sql(database)).await?;
    value.as_bool().ok_or_else(|| {
        DbError::TypeConversion(format!("EXISTS returned {}", value.kind())).into()
    })
}

/// Create `extension` in the database `config` points at, if missing
pub async fn create_extension_if_not_exists<D: Driver>(
    driver: &D,
    config: &ConnectionConfig,
    extension: &Identifier,
) -> Result<()> {
    debug!(%extension, "ensuring extension");
    driver
        .execute(config, &create_extension_sql(extension))
        .await?;
    Ok(())
}

/// Create `target` as a copy of `template` unless `target` already exists.
///
/// Returns `true` if the database was created.
///
/// # Errors
/// `CloneConflict` if `target` appears between the existence check and the
/// create; `SourceUnavailable` if `template` is missing or busy.
pub async fn clone_if_absent<D: Driver>(
    driver: &D,
    system: &ConnectionConfig,
    target: &Identifier,
    template: &Identifier,
) -> Result<bool> {
    if database_exists(driver, system, target).await? {
        debug!(%target, "clone target already exists");
        return Ok(false);
    }

    drain(driver, system, template).await?;
    drain(driver, system, target).await?;
    create_from_template(driver, system, target, template).await?;
    Ok(true)
}

/// Replace `target` with a fresh copy of `template`.
///
/// # Errors
/// As [`clone_if_absent`]. If the create fails, `target` has already been
/// dropped and stays absent.
pub async fn force_clone<D: Driver>(
    driver: &D,
    system: &ConnectionConfig,
    target: &Identifier,
    template: &Identifier,
) -> Result<()> {
    drain(driver, system, template).await?;
    drain(driver, system, target).await?;

    info!(%target, "dropping database");
    driver.execute(system, &drop_sql(target)).await?;

    if let Err(e) = create_from_template(driver, system, target, template).await {
        error!(%target, %template, error = %e, "clone failed; database left absent");
        return Err(e);
    }
    Ok(())
}

async fn create_from_template<D: Driver>(
    driver: &D,
    system: &ConnectionConfig,
    target: &Identifier,
    template: &Identifier,
) -> Result<()> {
    info!(%target, %template, "cloning database from template");
    driver
        .execute(system, &create_from_template_sql(target, template))
        .await
        .map_err(|e| classify_clone_error(e, target, template))
}

fn classify_clone_error(e: DbError, target: &Identifier, template: &Identifier) -> CheckpointError {
    if e.has_sqlstate(&SqlState::DUPLICATE_DATABASE) {
        CheckpointError::CloneConflict {
            target: target.to_string(),
            source: e,
        }
    } else if e.has_sqlstate(&SqlState::OBJECT_IN_USE)
        || e.has_sqlstate(&SqlState::INVALID_CATALOG_NAME)
    {
        CheckpointError::SourceUnavailable {
            template: template.to_string(),
            source: e,
        }
    } else {
        e.into()
    }
}
