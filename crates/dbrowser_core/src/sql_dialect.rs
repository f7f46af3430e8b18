use crate::CellValue;

/// Database-specific SQL syntax (quoting, escaping, literals).
pub trait SqlDialect: Send + Sync {
    /// Quote an identifier (table/column name), doubling embedded quotes.
    fn quote_identifier(&self, name: &str) -> String;

    /// Convert a cell to a SQL literal string.
    fn value_to_literal(&self, value: &CellValue) -> String;

    /// Escape a string for use inside a single-quoted literal.
    fn escape_string(&self, s: &str) -> String {
        s.replace('\'', "''")
    }

    /// Numbered placeholder for the 1-based parameter `index`.
    fn placeholder(&self, index: usize) -> String {
        format!("?{}", index)
    }
}

/// ANSI conventions: double-quoted identifiers, single-quoted strings.
pub struct DefaultSqlDialect;

impl SqlDialect for DefaultSqlDialect {
    fn quote_identifier(&self, name: &str) -> String {
        let escaped = name.replace('"', "\"\"");
        format!("\"{}\"", escaped)
    }

    fn value_to_literal(&self, value: &CellValue) -> String {
        match value {
            CellValue::Null => "NULL".to_string(),
            CellValue::Int(i) => i.to_string(),
            CellValue::Float(f) => float_literal(*f),
            CellValue::Text(s) | CellValue::SchemaLabel(s) => {
                format!("'{}'", self.escape_string(s))
            }
        }
    }
}

/// Float literal that parses back to the same `f64`.
pub fn float_literal(f: f64) -> String {
    if f.is_nan() {
        "NULL".to_string()
    } else if f.is_infinite() {
        if f > 0.0 { "9e999" } else { "-9e999" }.to_string()
    } else {
        format!("{:?}", f)
    }
}
