//! Database type definitions
//!
//! Scalar values returned by [`crate::db::Driver::query_scalar`].

use rust_decimal::Decimal;

/// Column data types the driver knows how to decode as scalars
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataType {
    SmallInt,
    Integer,
    BigInt,
    Numeric,
    Text,
    Boolean,
    Unknown(String),
}

/// A single scalar value
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Null,
    Boolean(bool),
    Integer(i64),
    Numeric(Decimal),
    Text(String),
}

impl CellValue {
    pub fn is_null(&self) -> bool {
        matches!(self, CellValue::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            CellValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Numeric view of the value; integers widen losslessly
    pub fn as_decimal(&self) -> Option<Decimal> {
        match self {
            CellValue::Numeric(d) => Some(*d),
            CellValue::Integer(n) => Some(Decimal::from(*n)),
            CellValue::Text(s) => s.parse().ok(),
            _ => None,
        }
    }

    /// Short type label for error messages
    pub fn kind(&self) -> &'static str {
        match self {
            CellValue::Null => "null",
            CellValue::Boolean(_) => "boolean",
            CellValue::Integer(_) => "integer",
            CellValue::Numeric(_) => "numeric",
            CellValue::Text(_) => "text",
        }
    }
}
