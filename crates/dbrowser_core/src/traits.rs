use crate::{BrowseError, PageIndexStrategy, PageMap, Row, SeekBoundary, SortSpec, Table};

/// Read-only access to one embedded database.
///
/// A repository is owned by exactly one `QueryWorker` and only ever called from
/// that worker's thread, so implementations need `Send` but not `Sync`.
pub trait BrowseRepository: Send {
    /// Every user table with its header row and one row per column definition.
    fn list_tables(&self) -> Result<Vec<Table>, BrowseError>;

    /// Seek boundary of every page of `table` under `sort`.
    fn build_page_map(
        &self,
        table: &str,
        items_per_page: u32,
        sort: Option<&SortSpec>,
        strategy: PageIndexStrategy,
    ) -> Result<PageMap, BrowseError>;

    /// Header row followed by at most `items_per_page` data rows starting at
    /// `boundary` (or the first row when `None`).
    fn load_page(
        &self,
        table: &str,
        items_per_page: u32,
        sort: Option<&SortSpec>,
        boundary: Option<&SeekBoundary>,
    ) -> Result<Vec<Row>, BrowseError>;
}

impl<R: BrowseRepository + ?Sized> BrowseRepository for Box<R> {
    fn list_tables(&self) -> Result<Vec<Table>, BrowseError> {
        (**self).list_tables()
    }

    fn build_page_map(
        &self,
        table: &str,
        items_per_page: u32,
        sort: Option<&SortSpec>,
        strategy: PageIndexStrategy,
    ) -> Result<PageMap, BrowseError> {
        (**self).build_page_map(table, items_per_page, sort, strategy)
    }

    fn load_page(
        &self,
        table: &str,
        items_per_page: u32,
        sort: Option<&SortSpec>,
        boundary: Option<&SeekBoundary>,
    ) -> Result<Vec<Row>, BrowseError> {
        (**self).load_page(table, items_per_page, sort, boundary)
    }
}
