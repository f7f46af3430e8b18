use dbrowser_core::{
    BrowseError, BrowseRepository, CellValue, PageIndexStrategy, PageMap, Row, SeekBoundary,
    SortDirection, SortSpec, Table, validate_page_size,
};
use std::cmp::Ordering as CmpOrdering;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Name of the identity column the fake exposes in page boundaries.
pub const FAKE_ROW_IDENTITY: &str = "rowid";

#[derive(Debug, Clone, Default)]
pub struct FakeRepositoryStats {
    pub list_tables_calls: usize,
    pub page_map_calls: usize,
    pub load_page_calls: usize,
    pub loaded_boundaries: Vec<Option<SeekBoundary>>,
}

#[derive(Default)]
struct FakeRepositoryState {
    tables: RwLock<Vec<Table>>,
    list_error: RwLock<Option<String>>,
    page_error: RwLock<Option<String>>,
    page_map_error: RwLock<Option<String>>,
    list_panics: AtomicBool,
    held: Mutex<bool>,
    released: Condvar,
    list_tables_calls: AtomicUsize,
    page_map_calls: AtomicUsize,
    load_page_calls: AtomicUsize,
    loaded_boundaries: Mutex<Vec<Option<SeekBoundary>>>,
}

/// In-memory repository paging `Table` fixtures by sort column then row key.
///
/// Clones share state, so a test can keep a handle after moving the
/// repository into a session and use [`FakeRepository::hold`] /
/// [`FakeRepository::release`] to control when the worker proceeds.
#[derive(Clone, Default)]
pub struct FakeRepository {
    state: Arc<FakeRepositoryState>,
}

impl FakeRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// `table` must start with its header row; data rows need a `row_key`.
    pub fn with_table(self, table: Table) -> Self {
        rwlock_write(&self.state.tables).push(table);
        self
    }

    pub fn with_list_error(self, message: impl Into<String>) -> Self {
        *rwlock_write(&self.state.list_error) = Some(message.into());
        self
    }

    pub fn with_page_error(self, message: impl Into<String>) -> Self {
        *rwlock_write(&self.state.page_error) = Some(message.into());
        self
    }

    pub fn with_page_map_error(self, message: impl Into<String>) -> Self {
        *rwlock_write(&self.state.page_map_error) = Some(message.into());
        self
    }

    /// Make `list_tables` panic, taking the worker thread down with it.
    pub fn with_list_panic(self) -> Self {
        self.state.list_panics.store(true, Ordering::Relaxed);
        self
    }

    /// Make every subsequent call block until [`FakeRepository::release`].
    pub fn hold(&self) {
        *mutex_lock(&self.state.held) = true;
    }

    pub fn release(&self) {
        *mutex_lock(&self.state.held) = false;
        self.state.released.notify_all();
    }

    pub fn stats(&self) -> FakeRepositoryStats {
        FakeRepositoryStats {
            list_tables_calls: self.state.list_tables_calls.load(Ordering::Relaxed),
            page_map_calls: self.state.page_map_calls.load(Ordering::Relaxed),
            load_page_calls: self.state.load_page_calls.load(Ordering::Relaxed),
            loaded_boundaries: mutex_lock(&self.state.loaded_boundaries).clone(),
        }
    }

    fn wait_while_held(&self) {
        let mut held = mutex_lock(&self.state.held);
        while *held {
            held = self
                .state
                .released
                .wait(held)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
        }
    }

    fn table(&self, name: &str) -> Result<Table, BrowseError> {
        rwlock_read(&self.state.tables)
            .iter()
            .find(|t| t.name == name)
            .cloned()
            .ok_or_else(|| BrowseError::query_failed(format!("no such table: {}", name)))
    }

    /// Data rows in browse order with their sort tuple.
    fn sorted_rows(
        &self,
        table: &Table,
        sort: Option<&SortSpec>,
    ) -> Result<Vec<(Vec<(String, CellValue)>, Row)>, BrowseError> {
        let header = table
            .header()
            .ok_or_else(|| BrowseError::query_failed("fixture table has no header"))?;
        let sort_index = match sort {
            Some(spec) if spec.column != FAKE_ROW_IDENTITY => Some(
                header
                    .items
                    .iter()
                    .position(|label| label.as_str() == Some(spec.column.as_str()))
                    .ok_or_else(|| {
                        BrowseError::query_failed(format!("no such column: {}", spec.column))
                    })?,
            ),
            _ => None,
        };

        let mut rows: Vec<(Vec<(String, CellValue)>, Row)> = table
            .data_rows()
            .map(|row| {
                let mut tuple = Vec::new();
                if let (Some(index), Some(spec)) = (sort_index, sort) {
                    let value = row.items.get(index).cloned().unwrap_or(CellValue::Null);
                    tuple.push((spec.column.clone(), value));
                }
                let key = row.row_key.clone().unwrap_or(CellValue::Null);
                tuple.push((FAKE_ROW_IDENTITY.to_string(), key));
                (tuple, row.clone())
            })
            .collect();

        let direction = sort.map(|s| s.direction).unwrap_or_default();
        rows.sort_by(|a, b| directed(compare_tuples(&a.0, &b.0), direction));
        Ok(rows)
    }
}

fn compare_tuples(a: &[(String, CellValue)], b: &[(String, CellValue)]) -> CmpOrdering {
    a.iter()
        .zip(b)
        .map(|((_, x), (_, y))| x.sqlite_cmp(y))
        .find(|ordering| ordering.is_ne())
        .unwrap_or_else(|| a.len().cmp(&b.len()))
}

fn directed(ordering: CmpOrdering, direction: SortDirection) -> CmpOrdering {
    match direction {
        SortDirection::Ascending => ordering,
        SortDirection::Descending => ordering.reverse(),
    }
}

impl BrowseRepository for FakeRepository {
    fn list_tables(&self) -> Result<Vec<Table>, BrowseError> {
        self.wait_while_held();
        self.state.list_tables_calls.fetch_add(1, Ordering::Relaxed);
        if self.state.list_panics.load(Ordering::Relaxed) {
            panic!("fake repository: list_tables panicked");
        }

        if let Some(message) = rwlock_read(&self.state.list_error).clone() {
            return Err(BrowseError::Introspection(message));
        }
        Ok(rwlock_read(&self.state.tables).clone())
    }

    fn build_page_map(
        &self,
        table: &str,
        items_per_page: u32,
        sort: Option<&SortSpec>,
        _strategy: PageIndexStrategy,
    ) -> Result<PageMap, BrowseError> {
        self.wait_while_held();
        self.state.page_map_calls.fetch_add(1, Ordering::Relaxed);
        validate_page_size(items_per_page)?;

        if let Some(message) = rwlock_read(&self.state.page_map_error).clone() {
            return Err(BrowseError::query_failed(message));
        }

        let fixture = self.table(table)?;
        let rows = self.sorted_rows(&fixture, sort)?;
        let key_columns: Vec<String> = rows
            .first()
            .map(|(tuple, _)| tuple.iter().map(|(name, _)| name.clone()).collect())
            .unwrap_or_default();
        let pages: Vec<SeekBoundary> = rows
            .chunks(items_per_page as usize)
            .map(|chunk| chunk[0].0.iter().cloned().collect::<SeekBoundary>())
            .collect();

        Ok(PageMap::new(
            table,
            sort.cloned(),
            key_columns,
            items_per_page,
            rows.len() as u64,
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
        self.wait_while_held();
        self.state.load_page_calls.fetch_add(1, Ordering::Relaxed);
        mutex_lock(&self.state.loaded_boundaries).push(boundary.cloned());
        validate_page_size(items_per_page)?;

        if let Some(message) = rwlock_read(&self.state.page_error).clone() {
            return Err(BrowseError::query_failed(message));
        }

        let fixture = self.table(table)?;
        let direction = sort.map(|s| s.direction).unwrap_or_default();
        let mut page = Vec::new();
        if let Some(header) = fixture.header() {
            page.push(header.clone());
        }

        let mut taken = 0;
        for (tuple, row) in self.sorted_rows(&fixture, sort)? {
            if let Some(boundary) = boundary {
                let seek: Vec<(String, CellValue)> = tuple
                    .iter()
                    .map(|(name, _)| {
                        boundary
                            .get(name)
                            .cloned()
                            .map(|v| (name.clone(), v))
                            .ok_or_else(|| {
                                BrowseError::InvalidBoundary(format!("missing value for '{}'", name))
                            })
                    })
                    .collect::<Result<_, _>>()?;
                if directed(compare_tuples(&tuple, &seek), direction) == CmpOrdering::Less {
                    continue;
                }
            }
            if taken == items_per_page as usize {
                break;
            }
            page.push(row);
            taken += 1;
        }

        Ok(page)
    }
}

fn mutex_lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn rwlock_read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn rwlock_write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}
