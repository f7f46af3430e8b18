use thiserror::Error;

use crate::StorageClass;

/// Errors surfaced by the browsing engine.
///
/// Variants carry rendered messages rather than source errors so the value can
/// be cloned into a `Loadable::Failed` snapshot.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BrowseError {
    #[error("Failed to open database: {0}")]
    Initialization(String),

    #[error("Schema introspection failed: {0}")]
    Introspection(String),

    #[error("Unsupported column type: {0}")]
    UnsupportedColumnType(StorageClass),

    #[error("Invalid page size: {0}")]
    InvalidPageSize(u32),

    #[error("Invalid page number {page} (page count {page_count})")]
    InvalidPageNumber { page: u32, page_count: usize },

    #[error("No table selected")]
    NoTableSelected,

    #[error("Invalid seek boundary: {0}")]
    InvalidBoundary(String),

    #[error("Query failed: {0}")]
    QueryExecution(String),

    #[error("Query worker stopped")]
    WorkerStopped,

    #[error("Configuration error: {0}")]
    Config(String),
}

impl BrowseError {
    pub fn query_failed(message: impl Into<String>) -> Self {
        Self::QueryExecution(message.into())
    }
}
