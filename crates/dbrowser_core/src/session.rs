use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::time::{Duration, Instant};

use tokio::sync::watch;

use crate::table_browser::validate_page_size;
use crate::{
    BrowseError, BrowseRepository, BrowserConfig, Delivery, LoadGate, Loadable, PageCursor,
    PageMap, PagerItem, QueryWorker, RequestSeq, Row, SeekBoundary, SortSpec, Table, TaskId,
    TaskKind, TaskManager, TaskSnapshot,
};

/// How long finished requests stay visible in `recent_tasks`.
const TASK_RETENTION: Duration = Duration::from_secs(300);

enum Completion {
    Tables {
        seq: RequestSeq,
        task: TaskId,
        result: Result<Vec<Table>, BrowseError>,
    },
    PageMap {
        seq: RequestSeq,
        task: TaskId,
        result: Result<PageMap, BrowseError>,
    },
    Page {
        seq: RequestSeq,
        task: TaskId,
        result: Result<Vec<Row>, BrowseError>,
    },
}

/// One browsing session over one database handle.
///
/// Requests are queued on the session's `QueryWorker`; their results are
/// handed back over a channel and only applied when the owner calls
/// [`BrowseSession::poll`], so state changes always happen on the owner's
/// thread. Every gate keeps only its latest request's result.
pub struct BrowseSession {
    worker: QueryWorker,
    completion_tx: Sender<Completion>,
    completion_rx: Receiver<Completion>,
    notify: Arc<watch::Sender<u64>>,
    config: BrowserConfig,

    tables: LoadGate<Vec<Table>>,
    page_map: LoadGate<PageMap>,
    page: LoadGate<Vec<Row>>,

    selected_table: Option<String>,
    sort: Option<SortSpec>,
    cursor: PageCursor,
    tasks: TaskManager,
}

impl BrowseSession {
    pub fn new<R>(repository: R, config: BrowserConfig) -> Result<Self, BrowseError>
    where
        R: BrowseRepository + 'static,
    {
        config.validate()?;

        let worker = QueryWorker::spawn("dbrowser-query-worker", repository)?;
        let (completion_tx, completion_rx) = mpsc::channel();
        let (notify, _) = watch::channel(0u64);

        Ok(Self {
            worker,
            completion_tx,
            completion_rx,
            notify: Arc::new(notify),
            config,
            tables: LoadGate::new(),
            page_map: LoadGate::new(),
            page: LoadGate::new(),
            selected_table: None,
            sort: None,
            cursor: PageCursor::default(),
            tasks: TaskManager::new(),
        })
    }

    pub fn config(&self) -> &BrowserConfig {
        &self.config
    }

    pub fn tables(&self) -> &Loadable<Vec<Table>> {
        self.tables.state()
    }

    pub fn page_map(&self) -> &Loadable<PageMap> {
        self.page_map.state()
    }

    pub fn page(&self) -> &Loadable<Vec<Row>> {
        self.page.state()
    }

    pub fn selected_table(&self) -> Option<&str> {
        self.selected_table.as_deref()
    }

    pub fn sort(&self) -> Option<&SortSpec> {
        self.sort.as_ref()
    }

    pub fn current_page(&self) -> u32 {
        self.cursor.current()
    }

    pub fn cursor(&self) -> &PageCursor {
        &self.cursor
    }

    pub fn pager_items(&self) -> Vec<PagerItem> {
        self.cursor.pager_items(self.config.pager_neighbours)
    }

    pub fn is_loading(&self) -> bool {
        self.tables.state().is_loading()
            || self.page_map.state().is_loading()
            || self.page.state().is_loading()
    }

    /// Receiver bumped whenever a result is ready for [`BrowseSession::poll`].
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.notify.subscribe()
    }

    pub fn recent_tasks(&self, limit: usize) -> Vec<TaskSnapshot> {
        self.tasks.recent_tasks(limit)
    }

    pub fn status_message(&self) -> Option<String> {
        self.tasks.current_status_message()
    }

    // --- Gate operations ---

    pub fn load_tables(&mut self) -> Result<RequestSeq, BrowseError> {
        let seq = self.tables.begin();
        let task = self.tasks.start(TaskKind::ListTables, "List tables");
        let tx = self.completion_tx.clone();
        let notify = self.notify.clone();

        let submitted = self.dispatch(task, move |repo| {
            let result = repo.list_tables();
            deliver(&tx, &notify, Completion::Tables { seq, task, result });
        });
        if let Err(e) = submitted {
            self.tables.complete(seq, Err(e.clone()));
            return Err(e);
        }

        Ok(seq)
    }

    pub fn load_page_map(
        &mut self,
        table: &str,
        items_per_page: u32,
        sort: Option<&SortSpec>,
    ) -> Result<RequestSeq, BrowseError> {
        validate_page_size(items_per_page)?;

        let seq = self.page_map.begin();
        let task = self
            .tasks
            .start(TaskKind::BuildPageMap, format!("Index pages of {}", table));
        let tx = self.completion_tx.clone();
        let notify = self.notify.clone();
        let table = table.to_string();
        let sort = sort.cloned();
        let strategy = self.config.page_index_strategy;

        let submitted = self.dispatch(task, move |repo| {
            let result = repo.build_page_map(&table, items_per_page, sort.as_ref(), strategy);
            deliver(&tx, &notify, Completion::PageMap { seq, task, result });
        });
        if let Err(e) = submitted {
            self.page_map.complete(seq, Err(e.clone()));
            return Err(e);
        }

        Ok(seq)
    }

    pub fn load_page(
        &mut self,
        table: &str,
        items_per_page: u32,
        sort: Option<&SortSpec>,
        boundary: Option<&SeekBoundary>,
    ) -> Result<RequestSeq, BrowseError> {
        validate_page_size(items_per_page)?;

        let seq = self.page.begin();
        let task = self
            .tasks
            .start(TaskKind::LoadPage, format!("Load page of {}", table));
        let tx = self.completion_tx.clone();
        let notify = self.notify.clone();
        let table = table.to_string();
        let sort = sort.cloned();
        let boundary = boundary.cloned();

        let submitted = self.dispatch(task, move |repo| {
            let result = repo.load_page(&table, items_per_page, sort.as_ref(), boundary.as_ref());
            deliver(&tx, &notify, Completion::Page { seq, task, result });
        });
        if let Err(e) = submitted {
            self.page.complete(seq, Err(e.clone()));
            return Err(e);
        }

        Ok(seq)
    }

    fn dispatch<F>(&mut self, task: TaskId, job: F) -> Result<(), BrowseError>
    where
        F: FnOnce(&dyn BrowseRepository) + Send + 'static,
    {
        if let Err(e) = self.worker.submit(job) {
            self.tasks.fail(task, e.to_string());
            return Err(e);
        }
        Ok(())
    }

    // --- Caller-facing operations ---

    pub fn list_tables(&mut self) -> Result<RequestSeq, BrowseError> {
        self.load_tables()
    }

    /// Switch to `name`, clearing the sort and rebuilding the page map. Page 1
    /// is loaded once the map arrives.
    pub fn select_table(&mut self, name: &str) -> Result<RequestSeq, BrowseError> {
        log::info!("[SESSION] selecting table {}", name);

        self.selected_table = Some(name.to_string());
        self.sort = None;
        self.page.reset();
        self.cursor = PageCursor::default();

        self.rebuild_page_map()
    }

    /// Sort by `column`: ascending on first use, toggled when it is already the
    /// sort column. Invalidates the page map and returns to page 1.
    pub fn set_sort(&mut self, column: &str) -> Result<RequestSeq, BrowseError> {
        if self.selected_table.is_none() {
            return Err(BrowseError::NoTableSelected);
        }

        let toggled = match self.sort.as_mut() {
            Some(sort) if sort.column == column => {
                sort.toggle();
                true
            }
            _ => false,
        };
        if !toggled {
            self.sort = Some(SortSpec::asc(column));
        }

        log::debug!("[SESSION] sort is now {:?}", self.sort);
        self.cursor.reset();
        self.rebuild_page_map()
    }

    /// Load the 1-based `page` of the current page map, seeking with the
    /// map's own sort and page size.
    ///
    /// Fails with `InvalidPageNumber` when no page map is loaded or `page` is
    /// out of range; nothing is queued in that case.
    pub fn goto_page(&mut self, page: u32) -> Result<RequestSeq, BrowseError> {
        let Some(map) = self.page_map.state().loaded() else {
            return Err(BrowseError::InvalidPageNumber {
                page,
                page_count: 0,
            });
        };

        PageCursor::new(map.len()).select(page)?;
        let boundary = if map.is_empty() {
            None
        } else {
            Some(map.boundary(page)?.clone())
        };
        let table = map.table.clone();
        let sort = map.sort.clone();
        let items_per_page = map.items_per_page;
        let page_count = map.len();

        self.cursor.set_page_count(page_count);
        self.cursor.select(page)?;
        self.load_page(&table, items_per_page, sort.as_ref(), boundary.as_ref())
    }

    pub fn next_page(&mut self) -> Result<RequestSeq, BrowseError> {
        self.goto_page(self.cursor.next())
    }

    pub fn prev_page(&mut self) -> Result<RequestSeq, BrowseError> {
        self.goto_page(self.cursor.previous())
    }

    pub fn first_page(&mut self) -> Result<RequestSeq, BrowseError> {
        self.goto_page(self.cursor.first())
    }

    pub fn last_page(&mut self) -> Result<RequestSeq, BrowseError> {
        self.goto_page(self.cursor.last())
    }

    fn rebuild_page_map(&mut self) -> Result<RequestSeq, BrowseError> {
        let table = self
            .selected_table
            .clone()
            .ok_or(BrowseError::NoTableSelected)?;
        let sort = self.sort.clone();

        self.load_page_map(&table, self.config.items_per_page, sort.as_ref())
    }

    // --- Delivery ---

    /// Apply every result handed back by the worker so far. Returns the number
    /// of results applied (stale ones are not counted).
    pub fn poll(&mut self) -> usize {
        self.tasks.cleanup_completed(TASK_RETENTION);

        let mut applied = 0;
        loop {
            match self.completion_rx.try_recv() {
                Ok(completion) => {
                    if self.apply(completion) == Delivery::Applied {
                        applied += 1;
                    }
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        applied
    }

    /// Block until no gate is loading or `timeout` elapses. Returns whether
    /// the session settled.
    pub fn block_until_settled(&mut self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        self.poll();

        while self.is_loading() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.completion_rx.recv_timeout(remaining) {
                Ok(completion) => {
                    self.apply(completion);
                }
                Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => {
                    return false;
                }
            }
        }
        true
    }

    fn apply(&mut self, completion: Completion) -> Delivery {
        match completion {
            Completion::Tables { seq, task, result } => {
                let failure = failure_message(&result);
                let delivery = self.tables.complete(seq, result);
                self.record_delivery(task, delivery, failure);
                delivery
            }
            Completion::PageMap { seq, task, result } => {
                let failure = failure_message(&result);
                let delivery = self.page_map.complete(seq, result);
                self.record_delivery(task, delivery, failure);
                if delivery == Delivery::Applied {
                    self.on_page_map_loaded();
                }
                delivery
            }
            Completion::Page { seq, task, result } => {
                let failure = failure_message(&result);
                let delivery = self.page.complete(seq, result);
                self.record_delivery(task, delivery, failure);
                delivery
            }
        }
    }

    fn record_delivery(&mut self, task: TaskId, delivery: Delivery, failure: Option<String>) {
        match (delivery, failure) {
            (Delivery::Stale, _) => {
                let kind = self.tasks.get(task).map(|t| t.kind.label()).unwrap_or("request");
                log::warn!("[SESSION] discarding stale {} result", kind);
                self.tasks.supersede(task);
            }
            (Delivery::Applied, Some(error)) => self.tasks.fail(task, error),
            (Delivery::Applied, None) => self.tasks.complete(task),
        }
    }

    fn on_page_map_loaded(&mut self) {
        let Some(map) = self.page_map.state().loaded() else {
            return;
        };

        let page_count = map.len();
        self.cursor.set_page_count(page_count);

        if self.selected_table.as_deref() != Some(map.table.as_str()) || map.sort != self.sort {
            log::debug!("[SESSION] page map for {} is not the selected view", map.table);
            return;
        }

        log::info!(
            "[SESSION] {} has {} rows in {} pages",
            map.table,
            map.total_rows,
            map.len()
        );

        if let Err(e) = self.goto_page(self.cursor.current()) {
            log::error!("[SESSION] failed to load page after indexing: {}", e);
        }
    }
}

fn failure_message<T>(result: &Result<T, BrowseError>) -> Option<String> {
    result.as_ref().err().map(ToString::to_string)
}

fn deliver(tx: &Sender<Completion>, notify: &watch::Sender<u64>, completion: Completion) {
    if tx.send(completion).is_err() {
        log::debug!("[SESSION] session dropped before delivery");
        return;
    }
    notify.send_modify(|n| *n = n.wrapping_add(1));
}
