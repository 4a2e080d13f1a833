//! Validated identifiers for string-built DDL
//!
//! `CREATE DATABASE`, `DROP DATABASE` and `CREATE EXTENSION` cannot take bound
//! parameters for object names, so every name that ends up in one of those
//! statements goes through [`Identifier::parse`] first. The allow-list is
//! strict on purpose: a rejected name never reaches the backend and is never
//! escaped or quoted into shape.

use crate::error::{CheckpointError, Result};
use std::fmt;

/// A database or extension name that passed the allow-list
///
/// Only ASCII letters, digits, `-` and `_` are accepted. The inner string is
/// private, so the only way to build one is through the validator.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identifier(String);

impl Identifier {
    /// Validate `name` and wrap it.
    ///
    /// # Errors
    /// Returns `CheckpointError::InvalidIdentifier` for empty input or any
    /// character outside the allow-list.
    pub fn parse(name: &str) -> Result<Self> {
        if name.is_empty() || !name.chars().all(is_allowed) {
            return Err(CheckpointError::InvalidIdentifier(name.to_string()));
        }
        Ok(Self(name.to_string()))
    }

    /// Append `suffix` and re-validate the result
    pub fn with_suffix(&self, suffix: &str) -> Result<Self> {
        Self::parse(&format!("{}{}", self.0, suffix))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn is_allowed(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == '_'
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Identifier {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
