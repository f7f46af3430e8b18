use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Instant;

use dbrowser_core::{
    BrowseError, BrowseRepository, BrowseSession, BrowserConfig, BrowserConfigStore, CellValue,
    ColumnInfo, KeyColumns, PageIndexStrategy, PageMap, RawColumn, Row, RowIdentity,
    SCHEMA_HEADER_LABELS, SeekBoundary, SortSpec, SqlDialect, Table, TableBrowser, float_literal,
    map_column, validate_page_size,
};
use rusqlite::types::{Value as SqliteValue, ValueRef};
use rusqlite::{Connection as RusqliteConnection, OpenFlags, params_from_iter};

/// SQLite SQL dialect implementation.
pub struct SqliteDialect;

impl SqlDialect for SqliteDialect {
    fn quote_identifier(&self, name: &str) -> String {
        sqlite_quote_ident(name)
    }

    fn value_to_literal(&self, value: &CellValue) -> String {
        value_to_sqlite_literal(value)
    }

    fn escape_string(&self, s: &str) -> String {
        sqlite_escape_string(s)
    }
}

static SQLITE_DIALECT: SqliteDialect = SqliteDialect;

/// Names SQLite accepts for the implicit rowid, in lookup order.
const IMPLICIT_ROWID_NAMES: [&str; 3] = ["rowid", "_rowid_", "oid"];

/// One row per (table, column), columns in the order of `SCHEMA_HEADER_LABELS`.
const CATALOG_SQL: &str = r#"
    SELECT
      m.name AS table_name,
      p.cid AS col_id,
      p.name AS col_name,
      p.type AS col_type,
      p.pk AS col_is_pk,
      p.dflt_value AS col_default_val,
      p."notnull" AS col_is_not_null
    FROM sqlite_master AS m
    LEFT OUTER JOIN pragma_table_info(m.name) AS p
    WHERE m.type = 'table' AND m.name NOT LIKE 'sqlite_%'
    ORDER BY table_name, col_id
"#;

const TABLE_COLUMNS_SQL: &str = r#"
    SELECT cid, name, type, pk, dflt_value, "notnull"
    FROM pragma_table_info(?1)
    ORDER BY cid
"#;

// =============================================================================
// Opening
// =============================================================================

/// A browsable SQLite database file.
///
/// The connection is guarded by a mutex so the repository can be handed to a
/// `QueryWorker` thread; all statements run on that one connection.
pub struct SqliteRepository {
    conn: Mutex<RusqliteConnection>,
    path: PathBuf,
}

impl SqliteRepository {
    /// Open an existing database file. A missing or non-database file fails
    /// with `BrowseError::Initialization`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, BrowseError> {
        let path = path.as_ref().to_path_buf();
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_URI
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;

        let conn = RusqliteConnection::open_with_flags(&path, flags)
            .map_err(|e| initialization_error(&path, &e))?;

        // Opening is lazy; reading the header rejects files that are not databases.
        conn.query_row("PRAGMA schema_version", [], |row| row.get::<_, i64>(0))
            .map_err(|e| initialization_error(&path, &e))?;

        log::info!("[OPEN] SQLite database {}", path.display());

        Ok(Self {
            conn: Mutex::new(conn),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> Result<MutexGuard<'_, RusqliteConnection>, BrowseError> {
        self.conn
            .lock()
            .map_err(|e| BrowseError::query_failed(format!("Lock error: {}", e)))
    }
}

/// Open `path` and start a browsing session over it.
pub fn open_session(
    path: impl AsRef<Path>,
    config: BrowserConfig,
) -> Result<BrowseSession, BrowseError> {
    let repository = SqliteRepository::open(path)?;
    BrowseSession::new(repository, config)
}

/// Open `path` with the settings saved in the user's config directory.
pub fn open_session_with_user_config(
    path: impl AsRef<Path>,
) -> Result<BrowseSession, BrowseError> {
    let config = BrowserConfigStore::new()?.load()?;
    open_session(path, config)
}

// =============================================================================
// BrowseRepository
// =============================================================================

impl BrowseRepository for SqliteRepository {
    fn list_tables(&self) -> Result<Vec<Table>, BrowseError> {
        let start = Instant::now();
        let conn = self.lock()?;

        let mut stmt = conn
            .prepare(CATALOG_SQL)
            .map_err(|e| format_sqlite_introspection_error(&e))?;
        let mut rows = stmt
            .query([])
            .map_err(|e| format_sqlite_introspection_error(&e))?;

        let mut tables: Vec<Table> = Vec::new();
        while let Some(row) = rows
            .next()
            .map_err(|e| format_sqlite_introspection_error(&e))?
        {
            let table_name: String = row
                .get(0)
                .map_err(|e| format_sqlite_introspection_error(&e))?;

            // LEFT JOIN yields one all-NULL column row for a table without columns.
            let col_id = row
                .get_ref(1)
                .map_err(|e| format_sqlite_introspection_error(&e))?;
            if matches!(col_id, ValueRef::Null) {
                log::debug!("[SCHEMA] Skipping table without columns: {}", table_name);
                continue;
            }

            let items = (1..=SCHEMA_HEADER_LABELS.len())
                .map(|idx| {
                    let value = row
                        .get_ref(idx)
                        .map_err(|e| format_sqlite_introspection_error(&e))?;
                    map_column(raw_column(value))
                })
                .collect::<Result<Vec<_>, _>>()?;
            let column_row = Row::data(items[0].clone(), items);

            match tables.last_mut() {
                Some(table) if table.name == table_name => table.rows.push(column_row),
                _ => tables.push(Table::new(
                    table_name,
                    vec![Row::header(SCHEMA_HEADER_LABELS), column_row],
                )),
            }
        }

        log::info!(
            "[SCHEMA] Loaded {} tables in {:.2}ms",
            tables.len(),
            start.elapsed().as_secs_f64() * 1000.0
        );

        Ok(tables)
    }

    fn build_page_map(
        &self,
        table: &str,
        items_per_page: u32,
        sort: Option<&SortSpec>,
        strategy: PageIndexStrategy,
    ) -> Result<PageMap, BrowseError> {
        validate_page_size(items_per_page)?;

        let start = Instant::now();
        let conn = self.lock()?;
        let (_, keys, _) = resolve_keys(&conn, table, sort)?;
        let browser = TableBrowser::new(&SQLITE_DIALECT, table, &keys);

        let count_sql = browser.count_sql();
        log::debug!("[PAGE_MAP] Counting: {}", count_sql);
        let total: i64 = conn
            .query_row(&count_sql, [], |row| row.get(0))
            .map_err(|e| format_sqlite_query_error(&e))?;
        let total = u64::try_from(total).unwrap_or_default();

        if total == 0 {
            return Ok(PageMap::new(
                table,
                sort.cloned(),
                keys.names(),
                items_per_page,
                0,
                Vec::new(),
            ));
        }

        let index_sql = browser.page_index_sql(strategy, total, items_per_page);
        log::debug!("[PAGE_MAP] Indexing ({:?}): {}", strategy, index_sql);

        let names = keys.names();
        let mut stmt = conn
            .prepare(&index_sql)
            .map_err(|e| format_sqlite_query_error(&e))?;
        let mut rows = stmt.query([]).map_err(|e| format_sqlite_query_error(&e))?;

        let mut pages = Vec::new();
        while let Some(row) = rows.next().map_err(|e| format_sqlite_query_error(&e))? {
            let mut boundary = SeekBoundary::new();
            for (idx, name) in names.iter().enumerate() {
                boundary.insert(name.clone(), read_cell(row, idx)?);
            }
            pages.push(boundary);
        }

        let expected = dbrowser_core::page_count(total, items_per_page);
        if pages.len() as u64 != expected {
            log::warn!(
                "[PAGE_MAP] {} has {} boundaries for {} expected pages; table changed while indexing?",
                table,
                pages.len(),
                expected
            );
        }

        log::info!(
            "[PAGE_MAP] {}: {} rows, {} pages in {:.2}ms",
            table,
            total,
            pages.len(),
            start.elapsed().as_secs_f64() * 1000.0
        );

        Ok(PageMap::new(
            table,
            sort.cloned(),
            names,
            items_per_page,
            total,
            pages,
        ))
    }

    fn load_page(
        &self,
        table: &str,
        items_per_page: u32,
        sort: Option<&SortSpec>,
        boundary: Option<&SeekBoundary>,
    ) -> Result<Vec<Row>, BrowseError> {
        validate_page_size(items_per_page)?;

        let start = Instant::now();
        let conn = self.lock()?;
        let (identity, keys, columns) = resolve_keys(&conn, table, sort)?;
        let query = TableBrowser::new(&SQLITE_DIALECT, table, &keys).seek_query(
            &identity,
            items_per_page,
            boundary,
        )?;

        log::debug!("[PAGE] Executing: {}", query.display_sql(&SQLITE_DIALECT));

        let mut page = vec![Row::header(columns.into_iter().map(|c| c.name))];

        let mut stmt = conn
            .prepare(&query.sql)
            .map_err(|e| format_sqlite_query_error(&e))?;
        let column_count = stmt.column_count();
        let mut rows = stmt
            .query(params_from_iter(query.params.iter().map(to_sqlite_value)))
            .map_err(|e| format_sqlite_query_error(&e))?;

        while let Some(row) = rows.next().map_err(|e| format_sqlite_query_error(&e))? {
            let row_key = read_cell(row, 0)?;
            let items = (1..column_count)
                .map(|idx| read_cell(row, idx))
                .collect::<Result<Vec<_>, _>>()?;

            if items.is_empty() {
                log::warn!("[PAGE] Dropping empty row {} from {}", row_key, table);
                continue;
            }
            page.push(Row::data(row_key, items));
        }

        log::debug!(
            "[PAGE] {}: {} rows in {:.2}ms",
            table,
            page.len() - 1,
            start.elapsed().as_secs_f64() * 1000.0
        );

        Ok(page)
    }
}

// =============================================================================
// Introspection helpers
// =============================================================================

/// Column metadata of `table`, in declaration order.
fn table_columns(conn: &RusqliteConnection, table: &str) -> Result<Vec<ColumnInfo>, BrowseError> {
    let mut stmt = conn
        .prepare(TABLE_COLUMNS_SQL)
        .map_err(|e| format_sqlite_query_error(&e))?;

    let columns = stmt
        .query_map([table], |row| {
            Ok(ColumnInfo {
                ordinal: row.get(0)?,
                name: row.get(1)?,
                type_name: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
                is_primary_key: row.get::<_, i64>(3)? > 0,
                default_value: row.get(4)?,
                nullable: row.get::<_, i64>(5)? == 0,
            })
        })
        .map_err(|e| format_sqlite_query_error(&e))?
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| format_sqlite_query_error(&e))?;

    if columns.is_empty() {
        return Err(BrowseError::query_failed(format!("no such table: {}", table)));
    }

    Ok(columns)
}

/// The unique, never-NULL column that tie-breaks every sort of `table`.
fn row_identity(
    conn: &RusqliteConnection,
    table: &str,
    columns: &[ColumnInfo],
) -> Result<RowIdentity, BrowseError> {
    let primary_key: Vec<&ColumnInfo> = columns.iter().filter(|c| c.is_primary_key).collect();

    // A lone INTEGER PRIMARY KEY aliases the rowid.
    if let [only] = primary_key.as_slice()
        && only.type_name.eq_ignore_ascii_case("INTEGER")
    {
        return Ok(RowIdentity::column(&only.name));
    }

    let implicit = IMPLICIT_ROWID_NAMES
        .iter()
        .copied()
        .find(|name| !columns.iter().any(|c| c.name.eq_ignore_ascii_case(name)));

    if let Some(name) = implicit {
        let check_sql = format!("SELECT {} FROM {} LIMIT 0", name, sqlite_quote_ident(table));
        // Fails with "no such column" on WITHOUT ROWID tables.
        if conn.prepare(&check_sql).is_ok() {
            return Ok(RowIdentity::implicit(name));
        }
    }

    if let [only] = primary_key.as_slice() {
        return Ok(RowIdentity::column(&only.name));
    }

    Err(BrowseError::query_failed("no single-column row identity"))
}

/// Identity, composite keys and column metadata for a browse of `table`.
fn resolve_keys(
    conn: &RusqliteConnection,
    table: &str,
    sort: Option<&SortSpec>,
) -> Result<(RowIdentity, KeyColumns, Vec<ColumnInfo>), BrowseError> {
    let columns = table_columns(conn, table)?;
    let identity = row_identity(conn, table, &columns)?;

    let sort_nullable = match sort {
        Some(spec) if spec.column != identity.column => columns
            .iter()
            .find(|c| c.name == spec.column)
            .map(|c| c.nullable)
            .ok_or_else(|| BrowseError::query_failed(format!("no such column: {}", spec.column)))?,
        _ => false,
    };

    let keys = KeyColumns::resolve(sort, &identity, sort_nullable);
    Ok((identity, keys, columns))
}

// =============================================================================
// Value conversion
// =============================================================================

fn raw_column(value: ValueRef<'_>) -> RawColumn<'_> {
    match value {
        ValueRef::Null => RawColumn::Null,
        ValueRef::Integer(i) => RawColumn::Integer(i),
        ValueRef::Real(f) => RawColumn::Real(f),
        ValueRef::Text(t) => RawColumn::Text(Some(t)),
        ValueRef::Blob(b) => RawColumn::Blob(b),
    }
}

fn read_cell(row: &rusqlite::Row<'_>, idx: usize) -> Result<CellValue, BrowseError> {
    let value = row
        .get_ref(idx)
        .map_err(|e| format_sqlite_query_error(&e))?;
    map_column(raw_column(value))
}

fn to_sqlite_value(value: &CellValue) -> SqliteValue {
    match value {
        CellValue::Null => SqliteValue::Null,
        CellValue::Int(i) => SqliteValue::Integer(*i),
        CellValue::Float(f) => SqliteValue::Real(*f),
        CellValue::Text(s) | CellValue::SchemaLabel(s) => SqliteValue::Text(s.clone()),
    }
}

// =============================================================================
// Errors
// =============================================================================

fn sqlite_error_message(e: &rusqlite::Error) -> String {
    match e {
        rusqlite::Error::SqliteFailure(err, msg) => {
            let code = format!("{:?} ({})", err.code, err.extended_code);
            match msg {
                Some(msg) => format!("{} [{}]", msg, code),
                None => code,
            }
        }
        _ => e.to_string(),
    }
}

fn format_sqlite_query_error(e: &rusqlite::Error) -> BrowseError {
    let message = sqlite_error_message(e);
    log::error!("SQLite query failed: {}", message);
    BrowseError::QueryExecution(message)
}

fn format_sqlite_introspection_error(e: &rusqlite::Error) -> BrowseError {
    let message = sqlite_error_message(e);
    log::error!("SQLite schema introspection failed: {}", message);
    BrowseError::Introspection(message)
}

fn initialization_error(path: &Path, e: &rusqlite::Error) -> BrowseError {
    let message = format!("{}: {}", path.display(), sqlite_error_message(e));
    log::error!("SQLite open failed: {}", message);
    BrowseError::Initialization(message)
}

// =============================================================================
// Literals
// =============================================================================

fn sqlite_quote_ident(ident: &str) -> String {
    debug_assert!(!ident.is_empty(), "identifier cannot be empty");
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Convert a cell to a SQLite literal string.
fn value_to_sqlite_literal(value: &CellValue) -> String {
    match value {
        CellValue::Null => "NULL".to_string(),
        CellValue::Int(i) => i.to_string(),
        CellValue::Float(f) => float_literal(*f),
        CellValue::Text(s) | CellValue::SchemaLabel(s) => {
            format!("'{}'", sqlite_escape_string(s))
        }
    }
}

/// Escape a string for use inside a SQLite single-quoted literal.
fn sqlite_escape_string(s: &str) -> String {
    s.replace('\'', "''")
}
