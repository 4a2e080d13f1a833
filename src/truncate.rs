//! Truncation-based reset engine
//!
//! Empties every base table in scope with a single `TRUNCATE`. Listing all
//! tables in one statement lets PostgreSQL satisfy foreign keys between them
//! without ordering the list. A table outside the scope that references one
//! inside it makes the statement fail; that error is returned as-is.

use crate::db::PooledClient;
use crate::error::{DbError, ResetError};
use crate::reset::{ResetEngine, ResetScope};
use std::future::Future;
use tracing::{debug, info};

const LIST_TABLES_SQL: &str = "SELECT n.nspname, c.relname \
     FROM pg_class c \
     JOIN pg_namespace n ON n.oid = c.relnamespace \
     WHERE c.relkind IN ('r', 'p') \
       AND n.nspname NOT IN ('pg_catalog', 'information_schema') \
       AND n.nspname !~ '^pg_(toast|temp_)' \
     ORDER BY n.nspname, c.relname";

/// A `(schema, table)` pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableName {
    pub schema: String,
    pub name: String,
}

impl TableName {
    pub fn new(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            name: name.into(),
        }
    }

    /// Quoted `"schema"."table"` form
    pub fn quoted(&self) -> String {
        format!("{}.{}", quote_ident(&self.schema), quote_ident(&self.name))
    }
}

/// Default [`ResetEngine`] for [`crate::db::PostgresDriver`] connections
#[derive(Debug, Clone, Copy, Default)]
pub struct TruncateEngine;

impl ResetEngine<PooledClient> for TruncateEngine {
    fn reset(
        &self,
        connection: &PooledClient,
        scope: &ResetScope,
    ) -> impl Future<Output = Result<(), ResetError>> + Send {
        async move {
            let rows = connection
                .bounded(scope.command_timeout, async {
                    connection
                        .client()
                        .query(LIST_TABLES_SQL, &[])
                        .await
                        .map_err(DbError::from)
                })
                .await?;

            let all: Vec<TableName> = rows
                .iter()
                .map(|row| TableName::new(row.get::<_, String>(0), row.get::<_, String>(1)))
                .collect();

            let tables = select_tables(all, scope)?;
            let Some(sql) = truncate_sql(&tables) else {
                debug!("no tables in scope; nothing to truncate");
                return Ok(());
            };

            info!(tables = tables.len(), "truncating tables");
            connection
                .bounded(scope.command_timeout, async {
                    connection.client().batch_execute(&sql).await.map_err(DbError::from)
                })
                .await?;
            Ok(())
        }
    }
}

/// Apply the scope's schema and table filters.
///
/// # Errors
/// `ResetError::InvalidTable` for an ignore entry with more than one dot or
/// an empty part.
pub fn select_tables(all: Vec<TableName>, scope: &ResetScope) -> Result<Vec<TableName>, ResetError> {
    let ignored = scope
        .tables_to_ignore
        .iter()
        .map(|entry| parse_table_ref(entry))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(all
        .into_iter()
        .filter(|t| scope.schemas_to_include.is_empty() || scope.schemas_to_include.contains(&t.schema))
        .filter(|t| !scope.schemas_to_exclude.contains(&t.schema))
        .filter(|t| {
            !ignored.iter().any(|(schema, name)| {
                name == &t.name && schema.as_ref().is_none_or(|s| s == &t.schema)
            })
        })
        .collect())
}

fn parse_table_ref(entry: &str) -> Result<(Option<String>, String), ResetError> {
    let invalid = || ResetError::InvalidTable(entry.to_string());
    match entry.split('.').collect::<Vec<_>>().as_slice() {
        [name] if !name.is_empty() => Ok((None, name.to_string())),
        [schema, name] if !schema.is_empty() && !name.is_empty() => {
            Ok((Some(schema.to_string()), name.to_string()))
        }
        _ => Err(invalid()),
    }
}

/// `TRUNCATE` statement for `tables`, or `None` when there is nothing to do
pub fn truncate_sql(tables: &[TableName]) -> Option<String> {
    if tables.is_empty() {
        return None;
    }
    let list = tables
        .iter()
        .map(TableName::quoted)
        .collect::<Vec<_>>()
        .join(", ");
    Some(format!("TRUNCATE TABLE {} RESTART IDENTITY", list))
}

/// Quote a catalog-supplied identifier, doubling embedded quotes
fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
