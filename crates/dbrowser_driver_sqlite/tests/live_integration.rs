use std::cmp::Ordering;
use std::error::Error;
use std::path::{Path, PathBuf};
use std::time::Duration;

use dbrowser_core::{
    BrowseError, BrowseRepository, BrowserConfig, CellValue, Loadable, PageIndexStrategy, Row,
    SeekBoundary, SortDirection, SortSpec, StorageClass,
};
use dbrowser_driver_sqlite::{SqliteRepository, open_session, open_session_with_user_config};
use dbrowser_test_support::fixtures::user_age;
use dbrowser_test_support::init_logging;
use tempfile::TempDir;

type TestResult = Result<(), Box<dyn Error>>;

const STRATEGIES: [PageIndexStrategy; 2] = [
    PageIndexStrategy::CorrelatedCount,
    PageIndexStrategy::WindowRank,
];

/// Create a database file from `ddl`. Keep the `TempDir` alive for the test.
fn create_db(ddl: &str) -> Result<(TempDir, PathBuf), Box<dyn Error>> {
    init_logging();
    let temp_dir = tempfile::tempdir()?;
    let db_path = temp_dir.path().join("test.sqlite");

    let conn = rusqlite::Connection::open(&db_path)?;
    conn.execute_batch(ddl)?;

    Ok((temp_dir, db_path))
}

/// `users(id, name, age)` with `count` rows; every fifth age is NULL.
fn users_db(count: i64) -> Result<(TempDir, PathBuf), Box<dyn Error>> {
    let (temp_dir, db_path) = create_db(
        "CREATE TABLE users (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            age INTEGER DEFAULT 30
        );
        CREATE TABLE orders (
            id INTEGER PRIMARY KEY,
            user_id INTEGER NOT NULL,
            amount REAL
        );",
    )?;

    let conn = rusqlite::Connection::open(&db_path)?;
    for id in 1..=count {
        let age = if id % 5 == 0 { None } else { Some(user_age(id)) };
        conn.execute(
            "INSERT INTO users (id, name, age) VALUES (?1, ?2, ?3)",
            rusqlite::params![id, format!("user{:02}", id), age],
        )?;
    }

    Ok((temp_dir, db_path))
}

fn compare_pairs(a: &(CellValue, CellValue), b: &(CellValue, CellValue)) -> Ordering {
    a.0.sqlite_cmp(&b.0).then_with(|| a.1.sqlite_cmp(&b.1))
}

fn data_keys(rows: &[Row]) -> Vec<CellValue> {
    rows.iter()
        .filter(|r| !r.is_header_row)
        .filter_map(|r| r.row_key.clone())
        .collect()
}

/// Load every page of the map and return the data rows in browse order.
fn load_all(
    repo: &SqliteRepository,
    table: &str,
    items_per_page: u32,
    sort: Option<&SortSpec>,
    strategy: PageIndexStrategy,
) -> Result<Vec<Row>, BrowseError> {
    let map = repo.build_page_map(table, items_per_page, sort, strategy)?;
    let mut rows = Vec::new();

    for (index, boundary) in map.boundaries().iter().enumerate() {
        let page = repo.load_page(table, items_per_page, sort, Some(boundary))?;
        assert!(page[0].is_header_row);

        let data: Vec<Row> = page.into_iter().skip(1).collect();
        if index + 1 < map.len() {
            assert_eq!(data.len(), items_per_page as usize, "page {} is short", index + 1);
        }
        assert!(!data.is_empty(), "page {} is empty", index + 1);
        rows.extend(data);
    }

    Ok(rows)
}

// ---------------------------------------------------------------------------
// Opening
// ---------------------------------------------------------------------------

#[test]
fn missing_file_fails_to_open() -> TestResult {
    let temp_dir = tempfile::tempdir()?;
    let missing = temp_dir.path().join("missing").join("nope.sqlite");

    assert!(matches!(
        SqliteRepository::open(&missing),
        Err(BrowseError::Initialization(_))
    ));
    assert!(!missing.exists());
    Ok(())
}

#[test]
fn non_database_file_fails_to_open() -> TestResult {
    let temp_dir = tempfile::tempdir()?;
    let path = temp_dir.path().join("notes.txt");
    std::fs::write(&path, "this is definitely not a database file, just plain text")?;

    assert!(matches!(
        SqliteRepository::open(&path),
        Err(BrowseError::Initialization(_))
    ));
    Ok(())
}

// ---------------------------------------------------------------------------
// Schema introspection
// ---------------------------------------------------------------------------

#[test]
fn list_tables_returns_a_header_and_one_row_per_column() -> TestResult {
    let (_dir, path) = users_db(3)?;
    let repo = SqliteRepository::open(&path)?;
    assert_eq!(repo.path(), Path::new(&path));

    let tables = repo.list_tables()?;
    let names: Vec<&str> = tables.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, vec!["orders", "users"]);

    let users = &tables[1];
    assert_eq!(users.rows.len(), 4);
    assert_eq!(
        users.rows[0],
        Row::header(["cid", "name", "type", "pk", "dflt_value", "notnull"])
    );
    assert_eq!(
        users.rows[1],
        Row::data(
            CellValue::Int(0),
            vec![
                CellValue::Int(0),
                CellValue::text("id"),
                CellValue::text("INTEGER"),
                CellValue::Int(1),
                CellValue::Null,
                CellValue::Int(0),
            ]
        )
    );
    assert_eq!(users.rows[2].items[5], CellValue::Int(1));
    assert_eq!(users.rows[3].items[4], CellValue::text("30"));
    Ok(())
}

#[test]
fn zero_tables_is_an_empty_list() -> TestResult {
    let (_dir, path) = create_db("PRAGMA user_version = 1;")?;
    let repo = SqliteRepository::open(&path)?;

    assert_eq!(repo.list_tables()?, Vec::new());
    Ok(())
}

#[test]
fn internal_tables_are_skipped() -> TestResult {
    let (_dir, path) = create_db(
        "CREATE TABLE events (id INTEGER PRIMARY KEY AUTOINCREMENT, name TEXT);
         INSERT INTO events (name) VALUES ('boot');",
    )?;
    let repo = SqliteRepository::open(&path)?;

    let names: Vec<String> = repo.list_tables()?.into_iter().map(|t| t.name).collect();
    assert_eq!(names, vec!["events".to_string()]);
    Ok(())
}

// ---------------------------------------------------------------------------
// Page index
// ---------------------------------------------------------------------------

#[test]
fn users_scenario_three_pages_of_ten() -> TestResult {
    let (_dir, path) = users_db(25)?;
    let repo = SqliteRepository::open(&path)?;

    let map = repo.build_page_map("users", 10, None, PageIndexStrategy::CorrelatedCount)?;
    assert_eq!(map.len(), 3);
    assert_eq!(map.total_rows, 25);
    assert_eq!(map.key_columns, vec!["id".to_string()]);
    assert_eq!(map.boundary(1)?, &SeekBoundary::new().with("id", CellValue::Int(1)));
    assert_eq!(map.boundary(2)?, &SeekBoundary::new().with("id", CellValue::Int(11)));
    assert_eq!(map.boundary(3)?, &SeekBoundary::new().with("id", CellValue::Int(21)));

    let page = repo.load_page("users", 10, None, Some(map.boundary(2)?))?;
    assert_eq!(page[0], Row::header(["id", "name", "age"]));
    assert_eq!(
        data_keys(&page),
        (11..=20).map(CellValue::Int).collect::<Vec<_>>()
    );
    assert_eq!(page[1].items[1], CellValue::text("user11"));
    Ok(())
}

#[test]
fn every_row_appears_once_in_sort_order() -> TestResult {
    let (_dir, path) = users_db(25)?;
    let repo = SqliteRepository::open(&path)?;

    let sorts = [
        None,
        Some(SortSpec::asc("age")),
        Some(SortSpec::desc("age")),
        Some(SortSpec::asc("name")),
        Some(SortSpec::desc("name")),
        Some(SortSpec::desc("id")),
    ];

    for strategy in STRATEGIES {
        for sort in &sorts {
            let rows = load_all(&repo, "users", 3, sort.as_ref(), strategy)?;

            let mut keys = data_keys(&rows);
            assert_eq!(keys.len(), 25, "{:?} {:?}", strategy, sort);
            keys.sort_by(CellValue::sqlite_cmp);
            assert_eq!(keys, (1..=25).map(CellValue::Int).collect::<Vec<_>>());

            let column = match sort.as_ref().map(|s| s.column.as_str()) {
                Some("name") => 1,
                Some("age") => 2,
                _ => 0,
            };
            let tuples: Vec<(CellValue, CellValue)> = rows
                .iter()
                .map(|r| (r.items[column].clone(), r.items[0].clone()))
                .collect();
            let descending = sort
                .as_ref()
                .is_some_and(|s| s.direction == SortDirection::Descending);
            let expected = if descending {
                Ordering::Greater
            } else {
                Ordering::Less
            };
            assert!(
                tuples
                    .windows(2)
                    .all(|w| compare_pairs(&w[0], &w[1]) == expected),
                "{:?} {:?} out of order",
                strategy,
                sort
            );
        }
    }
    Ok(())
}

#[test]
fn null_sort_values_come_first_ascending() -> TestResult {
    let (_dir, path) = users_db(25)?;
    let repo = SqliteRepository::open(&path)?;
    let sort = SortSpec::asc("age");

    let map = repo.build_page_map("users", 3, Some(&sort), PageIndexStrategy::CorrelatedCount)?;
    assert_eq!(map.key_columns, vec!["age".to_string(), "id".to_string()]);
    assert_eq!(
        map.boundary(2)?,
        &SeekBoundary::new()
            .with("age", CellValue::Null)
            .with("id", CellValue::Int(20))
    );

    let page = repo.load_page("users", 3, Some(&sort), Some(map.boundary(2)?))?;
    let keys = data_keys(&page);
    assert_eq!(keys.len(), 3);
    assert_eq!(&keys[..2], &[CellValue::Int(20), CellValue::Int(25)]);
    assert!(page[2].items[2].is_null());
    assert!(!page[3].items[2].is_null());
    Ok(())
}

#[test]
fn nullable_nocase_column_pages_in_collation_order() -> TestResult {
    let (_dir, path) = create_db(
        "CREATE TABLE t (id INTEGER PRIMARY KEY, name TEXT COLLATE NOCASE);
         INSERT INTO t (id, name) VALUES (1, 'b'), (2, 'A'), (3, 'c'), (4, 'B'), (5, 'a'), (6, NULL);",
    )?;
    let repo = SqliteRepository::open(&path)?;

    let conn = rusqlite::Connection::open(&path)?;
    let mut stmt = conn.prepare("SELECT id FROM t ORDER BY name, id")?;
    let ascending = stmt
        .query_map([], |row| row.get::<_, i64>(0))?
        .map(|id| id.map(CellValue::Int))
        .collect::<Result<Vec<_>, _>>()?;
    assert_eq!(ascending, [6, 2, 5, 1, 4, 3].map(CellValue::Int).to_vec());
    let mut descending = ascending.clone();
    descending.reverse();

    let asc = SortSpec::asc("name");
    let desc = SortSpec::desc("name");
    for strategy in STRATEGIES {
        for items_per_page in [1, 2, 4] {
            let rows = load_all(&repo, "t", items_per_page, Some(&asc), strategy)?;
            assert_eq!(data_keys(&rows), ascending, "{:?} P={}", strategy, items_per_page);

            let rows = load_all(&repo, "t", items_per_page, Some(&desc), strategy)?;
            assert_eq!(data_keys(&rows), descending, "{:?} P={}", strategy, items_per_page);
        }
    }
    Ok(())
}

#[test]
fn rtrim_column_ties_break_on_identity() -> TestResult {
    let (_dir, path) = create_db(
        "CREATE TABLE tags (code TEXT COLLATE RTRIM, note TEXT);
         INSERT INTO tags (code, note) VALUES ('x  ', 'a'), ('w', 'b'), ('x', 'c'), (NULL, 'd'), ('w ', 'e');",
    )?;
    let repo = SqliteRepository::open(&path)?;

    for strategy in STRATEGIES {
        let rows = load_all(&repo, "tags", 2, Some(&SortSpec::asc("code")), strategy)?;
        assert_eq!(
            data_keys(&rows),
            [4, 2, 5, 1, 3].map(CellValue::Int).to_vec(),
            "{:?}",
            strategy
        );
    }
    Ok(())
}

#[test]
fn correlated_and_window_strategies_agree() -> TestResult {
    let (_dir, path) = users_db(25)?;
    let repo = SqliteRepository::open(&path)?;

    for items_per_page in [1, 4, 10, 25, 40] {
        for sort in [None, Some(SortSpec::asc("age")), Some(SortSpec::desc("name"))] {
            let correlated = repo.build_page_map(
                "users",
                items_per_page,
                sort.as_ref(),
                PageIndexStrategy::CorrelatedCount,
            )?;
            let windowed = repo.build_page_map(
                "users",
                items_per_page,
                sort.as_ref(),
                PageIndexStrategy::WindowRank,
            )?;
            assert_eq!(correlated, windowed);
        }
    }
    Ok(())
}

#[test]
fn empty_table_has_no_pages_and_a_header_only_page() -> TestResult {
    let (_dir, path) = create_db("CREATE TABLE audit (id INTEGER PRIMARY KEY, event TEXT);")?;
    let repo = SqliteRepository::open(&path)?;

    let map = repo.build_page_map("audit", 10, None, PageIndexStrategy::CorrelatedCount)?;
    assert!(map.is_empty());
    assert_eq!(map.total_rows, 0);

    let page = repo.load_page("audit", 10, None, None)?;
    assert_eq!(page, vec![Row::header(["id", "event"])]);
    Ok(())
}

#[test]
fn zero_page_size_is_rejected_before_querying() -> TestResult {
    let (_dir, path) = users_db(3)?;
    let repo = SqliteRepository::open(&path)?;

    assert_eq!(
        repo.build_page_map("users", 0, None, PageIndexStrategy::CorrelatedCount),
        Err(BrowseError::InvalidPageSize(0))
    );
    assert_eq!(
        repo.load_page("users", 0, None, None),
        Err(BrowseError::InvalidPageSize(0))
    );
    Ok(())
}

#[test]
fn unknown_table_is_a_query_failure() -> TestResult {
    let (_dir, path) = users_db(3)?;
    let repo = SqliteRepository::open(&path)?;

    assert_eq!(
        repo.build_page_map("ghosts", 10, None, PageIndexStrategy::CorrelatedCount),
        Err(BrowseError::query_failed("no such table: ghosts"))
    );
    Ok(())
}

// ---------------------------------------------------------------------------
// Row loading
// ---------------------------------------------------------------------------

#[test]
fn loading_the_same_page_twice_is_idempotent() -> TestResult {
    let (_dir, path) = users_db(25)?;
    let repo = SqliteRepository::open(&path)?;
    let sort = SortSpec::desc("age");

    let map = repo.build_page_map("users", 10, Some(&sort), PageIndexStrategy::CorrelatedCount)?;
    let first = repo.load_page("users", 10, Some(&sort), Some(map.boundary(2)?))?;
    let second = repo.load_page("users", 10, Some(&sort), Some(map.boundary(2)?))?;

    assert_eq!(first, second);
    Ok(())
}

#[test]
fn no_boundary_starts_from_the_first_row() -> TestResult {
    let (_dir, path) = users_db(25)?;
    let repo = SqliteRepository::open(&path)?;

    let page = repo.load_page("users", 5, None, None)?;
    assert_eq!(data_keys(&page), (1..=5).map(CellValue::Int).collect::<Vec<_>>());
    Ok(())
}

#[test]
fn boundary_missing_a_key_column_is_rejected() -> TestResult {
    let (_dir, path) = users_db(5)?;
    let repo = SqliteRepository::open(&path)?;
    let sort = SortSpec::asc("age");
    let boundary = SeekBoundary::new().with("age", CellValue::Int(21));

    assert!(matches!(
        repo.load_page("users", 10, Some(&sort), Some(&boundary)),
        Err(BrowseError::InvalidBoundary(_))
    ));
    Ok(())
}

#[test]
fn real_and_text_cells_are_typed() -> TestResult {
    let (_dir, path) = create_db(
        "CREATE TABLE prices (id INTEGER PRIMARY KEY, label TEXT, amount REAL);
         INSERT INTO prices (label, amount) VALUES ('tea', 2.5), (NULL, NULL);",
    )?;
    let repo = SqliteRepository::open(&path)?;

    let page = repo.load_page("prices", 10, None, None)?;
    assert_eq!(
        page[1].items,
        vec![CellValue::Int(1), CellValue::text("tea"), CellValue::Float(2.5)]
    );
    assert_eq!(
        page[2].items,
        vec![CellValue::Int(2), CellValue::Null, CellValue::Null]
    );
    assert_eq!(page[2].items[1].value(), "NULL");
    Ok(())
}

#[test]
fn blob_cells_fail_the_page() -> TestResult {
    let (_dir, path) = create_db(
        "CREATE TABLE files (id INTEGER PRIMARY KEY, data BLOB);
         INSERT INTO files (data) VALUES (x'deadbeef');",
    )?;
    let repo = SqliteRepository::open(&path)?;

    assert_eq!(
        repo.load_page("files", 10, None, None),
        Err(BrowseError::UnsupportedColumnType(StorageClass::Blob))
    );
    Ok(())
}

#[test]
fn text_primary_key_pages_by_implicit_rowid() -> TestResult {
    let (_dir, path) = create_db(
        "CREATE TABLE tags (slug TEXT PRIMARY KEY, label TEXT);
         INSERT INTO tags VALUES ('e', 'E'), ('a', 'A'), ('d', 'D'), ('b', 'B'), ('c', 'C');",
    )?;
    let repo = SqliteRepository::open(&path)?;

    let map = repo.build_page_map("tags", 2, None, PageIndexStrategy::CorrelatedCount)?;
    assert_eq!(map.key_columns, vec!["rowid".to_string()]);
    assert_eq!(map.len(), 3);

    let rows = load_all(&repo, "tags", 2, None, PageIndexStrategy::WindowRank)?;
    assert_eq!(data_keys(&rows), (1..=5).map(CellValue::Int).collect::<Vec<_>>());
    assert_eq!(rows[0].items, vec![CellValue::text("e"), CellValue::text("E")]);

    let sort = SortSpec::asc("slug");
    let sorted = load_all(&repo, "tags", 2, Some(&sort), PageIndexStrategy::CorrelatedCount)?;
    let slugs: Vec<CellValue> = sorted.iter().map(|r| r.items[0].clone()).collect();
    assert_eq!(
        slugs,
        ["a", "b", "c", "d", "e"].into_iter().map(CellValue::text).collect::<Vec<_>>()
    );
    Ok(())
}

#[test]
fn without_rowid_table_pages_by_primary_key() -> TestResult {
    let (_dir, path) = create_db(
        "CREATE TABLE kv (key TEXT PRIMARY KEY, value TEXT) WITHOUT ROWID;
         INSERT INTO kv VALUES ('k3', 'c'), ('k1', 'a'), ('k2', 'b');",
    )?;
    let repo = SqliteRepository::open(&path)?;

    let map = repo.build_page_map("kv", 2, None, PageIndexStrategy::CorrelatedCount)?;
    assert_eq!(map.key_columns, vec!["key".to_string()]);
    assert_eq!(map.boundary(2)?, &SeekBoundary::new().with("key", CellValue::text("k3")));

    let rows = load_all(&repo, "kv", 2, None, PageIndexStrategy::CorrelatedCount)?;
    assert_eq!(
        data_keys(&rows),
        ["k1", "k2", "k3"].into_iter().map(CellValue::text).collect::<Vec<_>>()
    );
    Ok(())
}

#[test]
fn identifiers_with_quotes_and_spaces_are_quoted() -> TestResult {
    let (_dir, path) = create_db(
        r#"CREATE TABLE "odd ""name""" ("the id" INTEGER PRIMARY KEY, "a b" TEXT);
           INSERT INTO "odd ""name""" ("a b") VALUES ('x'), ('y'), ('z');"#,
    )?;
    let repo = SqliteRepository::open(&path)?;
    let sort = SortSpec::desc("a b");

    let rows = load_all(&repo, r#"odd "name""#, 2, Some(&sort), PageIndexStrategy::WindowRank)?;
    assert_eq!(
        rows.iter().map(|r| r.items[1].clone()).collect::<Vec<_>>(),
        ["z", "y", "x"].into_iter().map(CellValue::text).collect::<Vec<_>>()
    );
    Ok(())
}

// ---------------------------------------------------------------------------
// Session end to end
// ---------------------------------------------------------------------------

#[test]
fn session_browses_a_database_file() -> TestResult {
    let (_dir, path) = users_db(25)?;

    for strategy in STRATEGIES {
        let config = BrowserConfig::default()
            .with_items_per_page(10)
            .with_strategy(strategy);
        let mut session = open_session(&path, config)?;

        session.list_tables()?;
        session.select_table("users")?;
        assert!(session.block_until_settled(Duration::from_secs(5)));

        assert_eq!(session.tables().loaded().map(Vec::len), Some(2));
        assert_eq!(session.cursor().page_count(), 3);

        session.goto_page(2)?;
        assert!(session.block_until_settled(Duration::from_secs(5)));
        match session.page() {
            Loadable::Loaded(rows) => assert_eq!(
                data_keys(rows),
                (11..=20).map(CellValue::Int).collect::<Vec<_>>()
            ),
            other => panic!("expected loaded page, got {:?}", other),
        }

        session.set_sort("age")?;
        assert!(session.block_until_settled(Duration::from_secs(5)));
        assert_eq!(session.current_page(), 1);
        assert_eq!(
            session.page_map().loaded().map(|m| m.key_columns.clone()),
            Some(vec!["age".to_string(), "id".to_string()])
        );
    }
    Ok(())
}

#[test]
fn goto_page_follows_an_independently_loaded_map() -> TestResult {
    let (_dir, path) = users_db(25)?;
    let mut session = open_session(&path, BrowserConfig::default().with_items_per_page(10))?;
    session.select_table("users")?;
    assert!(session.block_until_settled(Duration::from_secs(5)));

    let by_age = SortSpec::desc("age");
    session.load_page_map("users", 5, Some(&by_age))?;
    assert!(session.block_until_settled(Duration::from_secs(5)));
    session.goto_page(2)?;
    assert!(session.block_until_settled(Duration::from_secs(5)));

    let repo = SqliteRepository::open(&path)?;
    let all = load_all(&repo, "users", 5, Some(&by_age), PageIndexStrategy::CorrelatedCount)?;
    match session.page() {
        Loadable::Loaded(rows) => assert_eq!(data_keys(rows), data_keys(&all[5..10])),
        other => panic!("expected loaded page, got {:?}", other),
    }
    Ok(())
}

#[test]
fn user_config_session_opens_the_file() -> TestResult {
    let (_dir, path) = users_db(3)?;

    match open_session_with_user_config(&path) {
        Ok(mut session) => {
            session.list_tables()?;
            assert!(session.block_until_settled(Duration::from_secs(5)));
            assert_eq!(session.tables().loaded().map(Vec::len), Some(2));
        }
        Err(BrowseError::Config(_)) => {}
        Err(other) => return Err(other.into()),
    }
    Ok(())
}

#[test]
fn open_session_reports_initialization_errors() -> TestResult {
    let temp_dir = tempfile::tempdir()?;
    let missing = temp_dir.path().join("absent.sqlite");

    assert!(matches!(
        open_session(&missing, BrowserConfig::default()),
        Err(BrowseError::Initialization(_))
    ));
    Ok(())
}
