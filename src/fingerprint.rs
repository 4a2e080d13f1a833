//! Structure fingerprinting
//!
//! A fingerprint summarizes the catalog-level structure of a database:
//! namespaces, columns (name, type, nullability, defaults, storage flags),
//! constraints and the tables/types they reference. Each catalog row is
//! reduced to the low 64 bits of an md5 over its monitored fields, and the
//! rows are summed. Summing keeps the result independent of the order the
//! catalog scan returns rows in.
//!
//! Only structural attributes are monitored. Object ids, statistics and
//! dropped-column placeholders are left out, so VACUUM/ANALYZE or an
//! add-then-drop round trip leave the fingerprint unchanged. `pg_toast` and
//! temporary namespaces are excluded for the same reason.

use crate::config::ConnectionConfig;
use crate::db::Driver;
use crate::error::{CheckpointError, DbError, Result};
use rust_decimal::Decimal;
use std::fmt;
use std::sync::LazyLock;

/// Monitored fields in hashing order. Changing this list changes every
/// fingerprint, which invalidates every existing cache once.
const MONITORED_FIELDS: &[&str] = &[
    // namespace
    "n.nspname",
    // column
    "f.attname",
    "f.attnum",
    "f.atttypmod",
    "f.attndims",
    "f.attlen",
    "f.attnotnull",
    "f.atthasdef",
    "f.attidentity",
    "f.attgenerated",
    "f.attstorage",
    "pg_get_expr(d.adbin, d.adrelid)",
    // constraint
    "p.conname",
    "p.contype",
    "p.condeferrable",
    "p.condeferred",
    "p.convalidated",
    "p.conkey",
    "p.confkey",
    "p.confupdtype",
    "p.confdeltype",
    "p.confmatchtype",
    "pg_get_constraintdef(p.oid)",
    // referenced table
    "g.relname",
    // owning relation
    "c.relname",
    "c.relkind",
    "c.relpersistence",
    "c.relispartition",
    // type
    "t.typname",
    "t.typtype",
    "t.typcategory",
];

/// The single catalog query behind [`fingerprint`]
pub static STRUCTURE_HASH_QUERY: LazyLock<String> = LazyLock::new(|| {
    let row_text = MONITORED_FIELDS
        .iter()
        .map(|field| format!("coalesce(({})::text, '')", field))
        .collect::<Vec<_>>()
        .join("\n        || ' ' || ");

    format!(
        "SELECT SUM(('x' || right(md5(\n        {}\n    ), 16))::bit(64)::bigint)\n\
         FROM pg_attribute f\n\
         JOIN pg_class c ON c.oid = f.attrelid\n\
         JOIN pg_type t ON t.oid = f.atttypid\n\
         LEFT JOIN pg_attrdef d ON d.adrelid = c.oid AND d.adnum = f.attnum\n\
         LEFT JOIN pg_namespace n ON n.oid = c.relnamespace\n\
         LEFT JOIN pg_constraint p ON p.conrelid = c.oid AND f.attnum = ANY (p.conkey)\n\
         LEFT JOIN pg_class g ON g.oid = p.confrelid\n\
         WHERE NOT f.attisdropped\n\
           AND coalesce(n.nspname, '') !~ '^pg_(toast|temp_)'",
        row_text
    )
});

/// Order-independent structure fingerprint of one database
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint(Decimal);

impl Fingerprint {
    pub fn value(&self) -> Decimal {
        self.0
    }
}

impl From<Decimal> for Fingerprint {
    fn from(value: Decimal) -> Self {
        Self(value)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Fingerprint the database `config` points at.
///
/// # Errors
/// `HashUnavailable` if the catalog query matched no rows; a NULL sum means
/// the structure could not be determined, not that it is empty.
pub async fn fingerprint<D: Driver>(driver: &D, config: &ConnectionConfig) -> Result<Fingerprint> {
    let value = driver
        .query_scalar(config, STRUCTURE_HASH_QUERY.as_str())
        .await?;

    if value.is_null() {
        return Err(CheckpointError::HashUnavailable(
            config.database().unwrap_or_default().to_string(),
        ));
    }

    let sum = value.as_decimal().ok_or_else(|| {
        DbError::TypeConversion(format!(
            "structure hash returned {} instead of numeric",
            value.kind()
        ))
    })?;
    Ok(Fingerprint(sum))
}
