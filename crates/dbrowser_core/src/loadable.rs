use crate::BrowseError;

/// Lifecycle of an asynchronous fetch.
#[derive(Debug, Clone, PartialEq)]
pub enum Loadable<T> {
    NotRequested,

    /// A request is in flight. `last` keeps the previously loaded value so a
    /// progress view can keep showing it.
    Loading { last: Option<T> },

    Loaded(T),
    Failed(BrowseError),
}

impl<T> Loadable<T> {
    pub fn is_not_requested(&self) -> bool {
        matches!(self, Loadable::NotRequested)
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, Loadable::Loading { .. })
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self, Loadable::Loaded(_))
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Loadable::Failed(_))
    }

    /// The loaded value, or the last one while a reload is in flight.
    pub fn value(&self) -> Option<&T> {
        match self {
            Loadable::Loaded(value) => Some(value),
            Loadable::Loading { last } => last.as_ref(),
            Loadable::NotRequested | Loadable::Failed(_) => None,
        }
    }

    pub fn loaded(&self) -> Option<&T> {
        match self {
            Loadable::Loaded(value) => Some(value),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&BrowseError> {
        match self {
            Loadable::Failed(error) => Some(error),
            _ => None,
        }
    }
}

/// Monotonic request tag, unique per gate.
pub type RequestSeq = u64;

/// Outcome of handing a completed request to its gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Applied,
    /// A newer request was issued after this one; the result was discarded.
    Stale,
}

/// Load-state machine for one kind of request.
///
/// Only the most recently issued request may change the state, so a slow
/// response can never overwrite a newer one.
#[derive(Debug)]
pub struct LoadGate<T> {
    state: Loadable<T>,
    latest: RequestSeq,
}

impl<T> Default for LoadGate<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> LoadGate<T> {
    pub fn new() -> Self {
        Self {
            state: Loadable::NotRequested,
            latest: 0,
        }
    }

    pub fn state(&self) -> &Loadable<T> {
        &self.state
    }

    /// Move to `Loading` and tag the new request.
    pub fn begin(&mut self) -> RequestSeq {
        self.latest += 1;

        let last = match std::mem::replace(&mut self.state, Loadable::NotRequested) {
            Loadable::Loaded(value) => Some(value),
            Loadable::Loading { last } => last,
            Loadable::NotRequested | Loadable::Failed(_) => None,
        };
        self.state = Loadable::Loading { last };

        self.latest
    }

    pub fn complete(&mut self, seq: RequestSeq, result: Result<T, BrowseError>) -> Delivery {
        if seq != self.latest {
            return Delivery::Stale;
        }

        self.state = match result {
            Ok(value) => Loadable::Loaded(value),
            Err(error) => Loadable::Failed(error),
        };
        Delivery::Applied
    }

    /// Back to `NotRequested`; anything still in flight becomes stale.
    pub fn reset(&mut self) {
        self.latest += 1;
        self.state = Loadable::NotRequested;
    }
}
