use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

use crate::BrowseError;

/// A single displayable cell.
///
/// Data rows only ever hold `Null`, `Int`, `Float` or `Text`; `SchemaLabel`
/// is reserved for header rows.
#[derive(Debug, Clone, PartialEq, PartialOrd, Serialize, Deserialize)]
pub enum CellValue {
    Null,
    Int(i64),
    Float(f64),
    Text(String),
    SchemaLabel(String),
}

impl CellValue {
    pub fn label(text: impl Into<String>) -> Self {
        Self::SchemaLabel(text.into())
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, CellValue::Null)
    }

    /// Rendered form shown in a grid cell.
    pub fn value(&self) -> String {
        match self {
            CellValue::Null => "NULL".to_string(),
            CellValue::Int(i) => i.to_string(),
            CellValue::Float(f) => f.to_string(),
            CellValue::Text(s) | CellValue::SchemaLabel(s) => s.clone(),
        }
    }

    /// The typed value, usable as a seek-boundary literal.
    pub fn actual_value(&self) -> &CellValue {
        self
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            CellValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            CellValue::Text(s) | CellValue::SchemaLabel(s) => Some(s),
            _ => None,
        }
    }

    /// SQLite's storage-class order: NULL first, then numbers compared by
    /// value, then text. `Int(1)` and `Float(1.0)` compare equal here while
    /// `==` keeps them apart.
    pub fn sqlite_cmp(&self, other: &Self) -> Ordering {
        use CellValue::*;

        match (self, other) {
            (Null, Null) => Ordering::Equal,
            (Int(a), Int(b)) => a.cmp(b),
            (Float(a), Float(b)) => a.total_cmp(b),
            (Int(a), Float(b)) => (*a as f64).total_cmp(b),
            (Float(a), Int(b)) => a.total_cmp(&(*b as f64)),
            (Text(a), Text(b)) => a.cmp(b),
            (SchemaLabel(a), SchemaLabel(b)) => a.cmp(b),
            _ => self.type_order().cmp(&other.type_order()),
        }
    }

    fn type_order(&self) -> u8 {
        match self {
            CellValue::Null => 0,
            CellValue::Int(_) | CellValue::Float(_) => 1,
            CellValue::Text(_) => 2,
            CellValue::SchemaLabel(_) => 3,
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value())
    }
}

impl From<i64> for CellValue {
    fn from(value: i64) -> Self {
        CellValue::Int(value)
    }
}

impl From<f64> for CellValue {
    fn from(value: f64) -> Self {
        CellValue::Float(value)
    }
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        CellValue::Text(value.to_string())
    }
}

impl From<String> for CellValue {
    fn from(value: String) -> Self {
        CellValue::Text(value)
    }
}

/// Runtime storage class reported by the database for a single value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StorageClass {
    Null,
    Integer,
    Real,
    Text,
    Blob,
}

impl fmt::Display for StorageClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StorageClass::Null => "NULL",
            StorageClass::Integer => "INTEGER",
            StorageClass::Real => "REAL",
            StorageClass::Text => "TEXT",
            StorageClass::Blob => "BLOB",
        };
        f.write_str(name)
    }
}

/// A raw column value as read from a result row. The variant is the type tag.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RawColumn<'a> {
    Null,
    Integer(i64),
    Real(f64),
    Text(Option<&'a [u8]>),
    Blob(&'a [u8]),
}

impl RawColumn<'_> {
    pub fn storage_class(&self) -> StorageClass {
        match self {
            RawColumn::Null => StorageClass::Null,
            RawColumn::Integer(_) => StorageClass::Integer,
            RawColumn::Real(_) => StorageClass::Real,
            RawColumn::Text(_) => StorageClass::Text,
            RawColumn::Blob(_) => StorageClass::Blob,
        }
    }
}

/// Map a raw column value to a typed cell.
///
/// Storage classes without a grid rendering fail with
/// `BrowseError::UnsupportedColumnType` instead of being dropped.
pub fn map_column(raw: RawColumn<'_>) -> Result<CellValue, BrowseError> {
    match raw {
        RawColumn::Real(f) => Ok(CellValue::Float(f)),
        RawColumn::Integer(i) => Ok(CellValue::Int(i)),
        RawColumn::Null => Ok(CellValue::Null),
        RawColumn::Text(Some(bytes)) => {
            Ok(CellValue::Text(String::from_utf8_lossy(bytes).into_owned()))
        }
        RawColumn::Text(None) => Ok(CellValue::Null),
        other => Err(BrowseError::UnsupportedColumnType(other.storage_class())),
    }
}
