mod app_config;
mod error;
mod loadable;
mod pager;
mod schema;
mod session;
mod sql_dialect;
mod table_browser;
mod task;
mod traits;
mod value;
mod worker;

pub use app_config::{BrowserConfig, BrowserConfigStore};
pub use error::BrowseError;
pub use loadable::{Delivery, LoadGate, Loadable, RequestSeq};
pub use pager::{PageCursor, PagerItem};
pub use schema::{ColumnInfo, Row, SCHEMA_HEADER_LABELS, Table};
pub use session::BrowseSession;
pub use sql_dialect::{DefaultSqlDialect, SqlDialect, float_literal};
pub use table_browser::{
    KeyColumns, PageIndexStrategy, PageMap, RowIdentity, SeekBoundary, SortDirection, SortKey,
    SortSpec, SqlQuery, TableBrowser, page_count, validate_page_size,
};
pub use task::{TaskId, TaskKind, TaskManager, TaskSnapshot, TaskStatus};
pub use traits::BrowseRepository;
pub use value::{CellValue, RawColumn, StorageClass, map_column};
pub use worker::QueryWorker;
