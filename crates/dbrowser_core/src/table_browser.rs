use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::{BrowseError, CellValue, SqlDialect};

/// Sort direction for ORDER BY clauses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SortDirection {
    #[default]
    Ascending,
    Descending,
}

impl SortDirection {
    pub fn toggled(self) -> Self {
        match self {
            SortDirection::Ascending => SortDirection::Descending,
            SortDirection::Descending => SortDirection::Ascending,
        }
    }

    pub fn keyword(self) -> &'static str {
        match self {
            SortDirection::Ascending => "ASC",
            SortDirection::Descending => "DESC",
        }
    }
}

/// User-selected sort column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortSpec {
    pub column: String,
    pub direction: SortDirection,
}

impl SortSpec {
    pub fn asc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            direction: SortDirection::Ascending,
        }
    }

    pub fn desc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            direction: SortDirection::Descending,
        }
    }

    /// Flip the direction in place (re-click on the same header).
    pub fn toggle(&mut self) {
        self.direction = self.direction.toggled();
    }
}

/// The unique, never-NULL column anchoring every seek.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowIdentity {
    pub column: String,

    /// True for SQLite's implicit `rowid`/`_rowid_`/`oid`, which must stay unquoted.
    pub implicit: bool,
}

impl RowIdentity {
    pub fn column(name: impl Into<String>) -> Self {
        Self {
            column: name.into(),
            implicit: false,
        }
    }

    pub fn implicit(name: impl Into<String>) -> Self {
        Self {
            column: name.into(),
            implicit: true,
        }
    }

    fn as_key(&self) -> SortKey {
        SortKey {
            column: self.column.clone(),
            nullable: false,
            bare: self.implicit,
        }
    }

    fn render(&self, dialect: &dyn SqlDialect) -> String {
        self.as_key().reference(dialect, None)
    }
}

/// One column of the composite sort tuple.
///
/// Predicates reference the column directly so comparisons keep its declared
/// collating sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortKey {
    pub column: String,

    /// Nullable keys get explicit NULL handling: NULL sorts before every value.
    pub nullable: bool,

    bare: bool,
}

impl SortKey {
    fn reference(&self, dialect: &dyn SqlDialect, alias: Option<&str>) -> String {
        let name = if self.bare {
            self.column.clone()
        } else {
            dialect.quote_identifier(&self.column)
        };

        match alias {
            Some(alias) => format!("{}.{}", alias, name),
            None => name,
        }
    }

    /// `row` sorts after `bound` on this key alone (or equal when `inclusive`).
    fn follows(
        &self,
        row: &str,
        bound: &str,
        direction: SortDirection,
        inclusive: bool,
    ) -> String {
        let op = match direction {
            SortDirection::Ascending => ">",
            SortDirection::Descending => "<",
        };
        if !self.nullable {
            let eq = if inclusive { "=" } else { "" };
            return format!("{} {}{} {}", row, op, eq, bound);
        }

        let strict = match direction {
            SortDirection::Ascending => {
                format!("{row} IS NOT NULL AND ({bound} IS NULL OR {row} {op} {bound})")
            }
            SortDirection::Descending => {
                format!("{row} {op} {bound} OR {row} IS NULL AND {bound} IS NOT NULL")
            }
        };
        if inclusive {
            format!("({row} IS {bound} OR {strict})")
        } else {
            format!("({strict})")
        }
    }
}

/// Ordered key columns plus the shared direction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyColumns {
    keys: Vec<SortKey>,
    direction: SortDirection,
}

impl KeyColumns {
    /// The user sort column tie-broken by the row identity. Without a sort the
    /// identity alone, ascending.
    pub fn resolve(sort: Option<&SortSpec>, identity: &RowIdentity, sort_nullable: bool) -> Self {
        match sort {
            Some(spec) if spec.column != identity.column => Self {
                keys: vec![
                    SortKey {
                        column: spec.column.clone(),
                        nullable: sort_nullable,
                        bare: false,
                    },
                    identity.as_key(),
                ],
                direction: spec.direction,
            },
            Some(spec) => Self {
                keys: vec![identity.as_key()],
                direction: spec.direction,
            },
            None => Self {
                keys: vec![identity.as_key()],
                direction: SortDirection::Ascending,
            },
        }
    }

    pub fn names(&self) -> Vec<String> {
        self.keys.iter().map(|k| k.column.clone()).collect()
    }

    pub fn keys(&self) -> &[SortKey] {
        &self.keys
    }

    pub fn direction(&self) -> SortDirection {
        self.direction
    }

    /// Lexicographic "`row` sorts after `bound`" over the whole key tuple.
    /// `row` and `bound` hold one operand per key.
    fn after_predicate(&self, row: &[String], bound: &[String], inclusive: bool) -> String {
        let last = self.keys.len().saturating_sub(1);
        self.keys
            .iter()
            .enumerate()
            .map(|(i, key)| {
                let mut terms: Vec<String> = (0..i)
                    .map(|j| format!("{} IS {}", row[j], bound[j]))
                    .collect();
                let inclusive = inclusive && i == last;
                terms.push(key.follows(&row[i], &bound[i], self.direction, inclusive));
                if terms.len() == 1 {
                    terms.remove(0)
                } else {
                    format!("({})", terms.join(" AND "))
                }
            })
            .collect::<Vec<_>>()
            .join(" OR ")
    }

    fn references(&self, dialect: &dyn SqlDialect, alias: Option<&str>) -> Vec<String> {
        self.keys
            .iter()
            .map(|key| key.reference(dialect, alias))
            .collect()
    }

    fn order_by(&self, dialect: &dyn SqlDialect, alias: Option<&str>) -> String {
        self.references(dialect, alias)
            .into_iter()
            .map(|expr| format!("{} {}", expr, self.direction.keyword()))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Values of the first row of a page, keyed by sort column in key order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SeekBoundary {
    values: IndexMap<String, CellValue>,
}

impl SeekBoundary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, column: impl Into<String>, value: CellValue) -> Self {
        self.insert(column, value);
        self
    }

    pub fn insert(&mut self, column: impl Into<String>, value: CellValue) {
        self.values.insert(column.into(), value);
    }

    pub fn get(&self, column: &str) -> Option<&CellValue> {
        self.values.get(column)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &CellValue)> {
        self.values.iter()
    }
}

impl FromIterator<(String, CellValue)> for SeekBoundary {
    fn from_iter<T: IntoIterator<Item = (String, CellValue)>>(iter: T) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

/// Seek boundary of every page, in page order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageMap {
    pub table: String,
    pub sort: Option<SortSpec>,
    pub key_columns: Vec<String>,
    pub items_per_page: u32,
    pub total_rows: u64,
    pages: Vec<SeekBoundary>,
}

impl PageMap {
    pub fn new(
        table: impl Into<String>,
        sort: Option<SortSpec>,
        key_columns: Vec<String>,
        items_per_page: u32,
        total_rows: u64,
        pages: Vec<SeekBoundary>,
    ) -> Self {
        Self {
            table: table.into(),
            sort,
            key_columns,
            items_per_page,
            total_rows,
            pages,
        }
    }

    /// Authoritative page count.
    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    /// Boundary of the 1-based `page`.
    pub fn boundary(&self, page: u32) -> Result<&SeekBoundary, BrowseError> {
        (page as usize)
            .checked_sub(1)
            .and_then(|index| self.pages.get(index))
            .ok_or(BrowseError::InvalidPageNumber {
                page,
                page_count: self.pages.len(),
            })
    }

    pub fn boundaries(&self) -> &[SeekBoundary] {
        &self.pages
    }
}

/// How the page index query ranks rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageIndexStrategy {
    /// Correlated self-count of following rows per candidate.
    #[default]
    CorrelatedCount,
    /// `ROW_NUMBER()` window over the composite key.
    WindowRank,
}

pub fn validate_page_size(items_per_page: u32) -> Result<u32, BrowseError> {
    if items_per_page == 0 {
        return Err(BrowseError::InvalidPageSize(items_per_page));
    }
    Ok(items_per_page)
}

pub fn page_count(total_rows: u64, items_per_page: u32) -> u64 {
    total_rows.div_ceil(items_per_page as u64)
}

/// SQL text with positional parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlQuery {
    pub sql: String,
    pub params: Vec<CellValue>,
}

impl SqlQuery {
    /// SQL with `?N` parameters inlined as literals, for logs.
    pub fn display_sql(&self, dialect: &dyn SqlDialect) -> String {
        let mut rendered = String::with_capacity(self.sql.len());
        let mut chars = self.sql.chars().peekable();
        let mut quote: Option<char> = None;

        while let Some(ch) = chars.next() {
            match (ch, quote) {
                ('?', None) => {
                    let mut digits = String::new();
                    while let Some(digit) = chars.next_if(char::is_ascii_digit) {
                        digits.push(digit);
                    }
                    let param = digits
                        .parse::<usize>()
                        .ok()
                        .and_then(|index| index.checked_sub(1))
                        .and_then(|index| self.params.get(index));
                    match param {
                        Some(param) => rendered.push_str(&dialect.value_to_literal(param)),
                        None => {
                            rendered.push(ch);
                            rendered.push_str(&digits);
                        }
                    }
                    continue;
                }
                ('"' | '\'', None) => quote = Some(ch),
                (_, Some(open)) if ch == open => quote = None,
                _ => {}
            }
            rendered.push(ch);
        }
        rendered
    }
}

const POSITION_ALIAS: &str = "__dbrowser_pos";

/// Builds the count, page-index and seek statements for one table and key set.
pub struct TableBrowser<'a> {
    dialect: &'a dyn SqlDialect,
    table: &'a str,
    keys: &'a KeyColumns,
}

impl<'a> TableBrowser<'a> {
    pub fn new(dialect: &'a dyn SqlDialect, table: &'a str, keys: &'a KeyColumns) -> Self {
        Self {
            dialect,
            table,
            keys,
        }
    }

    fn quoted_table(&self) -> String {
        self.dialect.quote_identifier(self.table)
    }

    pub fn count_sql(&self) -> String {
        format!("SELECT COUNT(*) FROM {}", self.quoted_table())
    }

    /// Statement returning the raw key values of every page's first row, in
    /// page order. Selected columns follow `KeyColumns::names`.
    pub fn page_index_sql(
        &self,
        strategy: PageIndexStrategy,
        total_rows: u64,
        items_per_page: u32,
    ) -> String {
        match strategy {
            PageIndexStrategy::CorrelatedCount => {
                self.correlated_page_index_sql(total_rows, items_per_page)
            }
            PageIndexStrategy::WindowRank => self.windowed_page_index_sql(items_per_page),
        }
    }

    /// A row starts a page when the number of rows after it leaves a
    /// multiple of `items_per_page` rows before it.
    fn correlated_page_index_sql(&self, total_rows: u64, items_per_page: u32) -> String {
        let table = self.quoted_table();
        let select = self.keys.references(self.dialect, Some("c"));
        let following = self.keys.after_predicate(
            &self.keys.references(self.dialect, Some("o")),
            &select,
            false,
        );

        format!(
            "SELECT {} FROM {} AS c WHERE ({} - (SELECT COUNT(*) FROM {} AS o WHERE {})) % {} = 0 ORDER BY {}",
            select.join(", "),
            table,
            total_rows.saturating_sub(1),
            table,
            following,
            items_per_page,
            self.keys.order_by(self.dialect, Some("c")),
        )
    }

    fn windowed_page_index_sql(&self, items_per_page: u32) -> String {
        let inner: Vec<String> = self
            .keys
            .keys()
            .iter()
            .enumerate()
            .map(|(i, key)| format!("{} AS \"__k{}\"", key.reference(self.dialect, None), i))
            .collect();
        let outer: Vec<String> = (0..self.keys.keys().len())
            .map(|i| format!("\"__k{}\"", i))
            .collect();

        format!(
            "SELECT {} FROM (SELECT {}, ROW_NUMBER() OVER (ORDER BY {}) - 1 AS \"{}\" FROM {}) WHERE \"{}\" % {} = 0 ORDER BY \"{}\"",
            outer.join(", "),
            inner.join(", "),
            self.keys.order_by(self.dialect, None),
            POSITION_ALIAS,
            self.quoted_table(),
            POSITION_ALIAS,
            items_per_page,
            POSITION_ALIAS,
        )
    }

    /// `SELECT <identity>, * ... LIMIT items_per_page`, seeking from `boundary`
    /// when given.
    pub fn seek_query(
        &self,
        identity: &RowIdentity,
        items_per_page: u32,
        boundary: Option<&SeekBoundary>,
    ) -> Result<SqlQuery, BrowseError> {
        let mut sql = format!(
            "SELECT {}, * FROM {}",
            identity.render(self.dialect),
            self.quoted_table()
        );
        let mut params = Vec::new();

        if let Some(boundary) = boundary {
            for key in self.keys.keys() {
                let value = boundary.get(&key.column).ok_or_else(|| {
                    BrowseError::InvalidBoundary(format!("missing value for '{}'", key.column))
                })?;
                params.push(value.clone());
            }

            let placeholders: Vec<String> = (1..=params.len())
                .map(|index| self.dialect.placeholder(index))
                .collect();
            sql.push_str(" WHERE ");
            sql.push_str(&self.keys.after_predicate(
                &self.keys.references(self.dialect, None),
                &placeholders,
                true,
            ));
        }

        sql.push_str(&format!(
            " ORDER BY {} LIMIT {}",
            self.keys.order_by(self.dialect, None),
            items_per_page
        ));

        Ok(SqlQuery { sql, params })
    }
}
