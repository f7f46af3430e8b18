use serde::{Deserialize, Serialize};

use crate::CellValue;

/// Labels of the header row produced for every introspected table.
pub const SCHEMA_HEADER_LABELS: [&str; 6] = ["cid", "name", "type", "pk", "dflt_value", "notnull"];

/// Column metadata within a table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnInfo {
    /// Zero-based ordinal as reported by the catalog.
    pub ordinal: i64,

    pub name: String,

    /// Declared type (e.g., "INTEGER", "varchar(255)"). Empty when undeclared.
    pub type_name: String,

    pub nullable: bool,
    pub is_primary_key: bool,

    /// Default value expression, if any.
    pub default_value: Option<String>,
}

/// A single grid row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Row {
    pub items: Vec<CellValue>,
    pub is_header_row: bool,

    /// Identity used to key UI lists. Always `None` for header rows.
    pub row_key: Option<CellValue>,
}

impl Row {
    pub fn header<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            items: labels.into_iter().map(CellValue::label).collect(),
            is_header_row: true,
            row_key: None,
        }
    }

    pub fn data(row_key: CellValue, items: Vec<CellValue>) -> Self {
        Self {
            items,
            is_header_row: false,
            row_key: Some(row_key),
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// A table snapshot. The first row is the header row by convention.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table {
    pub name: String,
    pub rows: Vec<Row>,
}

impl Table {
    pub fn new(name: impl Into<String>, rows: Vec<Row>) -> Self {
        Self {
            name: name.into(),
            rows,
        }
    }

    pub fn column_count(&self) -> usize {
        self.rows.first().map(Row::len).unwrap_or(0)
    }

    pub fn header(&self) -> Option<&Row> {
        self.rows.first().filter(|row| row.is_header_row)
    }

    pub fn data_rows(&self) -> impl Iterator<Item = &Row> {
        self.rows.iter().filter(|row| !row.is_header_row)
    }
}
