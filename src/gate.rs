use crate::client::TimeSeriesClient;
use crate::error::SinkError;
use crate::pending::{LogCall, PendingQueue};
use std::sync::Arc;
use tracing::debug;

/// How the target database was found to be usable.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum InitOutcome {
    Existing,
    Created,
}

/// Make sure `database` exists, creating it when the listing does not
/// contain it.
pub(crate) async fn initialize(
    client: Arc<dyn TimeSeriesClient>,
    database: String,
) -> Result<InitOutcome, SinkError> {
    let names = client
        .list_database_names()
        .await
        .map_err(|source| SinkError::Initialization {
            database: database.clone(),
            source,
        })?;

    if names.contains(&database) {
        debug!(database = %database, "database exists");
        return Ok(InitOutcome::Existing);
    }

    client
        .create_database(&database)
        .await
        .map_err(|source| SinkError::Initialization {
            database: database.clone(),
            source,
        })?;
    debug!(database = %database, "database created");
    Ok(InitOutcome::Created)
}

/// Readiness of the sink.
///
/// `NotReady` owns the calls received so far. The only transition is to
/// `Ready`, which hands the queue out once for replay.
#[derive(Debug)]
pub(crate) enum Gate {
    NotReady(PendingQueue),
    Ready,
}

impl Default for Gate {
    fn default() -> Self {
        Gate::NotReady(PendingQueue::default())
    }
}

impl Gate {
    pub fn is_ready(&self) -> bool {
        matches!(self, Gate::Ready)
    }

    /// Queue `call` while not ready, otherwise give it back for direct
    /// processing.
    pub fn admit(&mut self, call: LogCall) -> Option<LogCall> {
        match self {
            Gate::NotReady(queue) => {
                queue.push(call);
                None
            }
            Gate::Ready => Some(call),
        }
    }

    pub fn pending(&self) -> usize {
        match self {
            Gate::NotReady(queue) => queue.len(),
            Gate::Ready => 0,
        }
    }

    /// Switch to `Ready`, returning the queued calls. Returns `None` if the
    /// gate was already open.
    pub fn open(&mut self) -> Option<PendingQueue> {
        match std::mem::replace(self, Gate::Ready) {
            Gate::NotReady(queue) => Some(queue),
            Gate::Ready => None,
        }
    }

    /// Take the queued calls without opening, used on shutdown.
    pub fn take_pending(&mut self) -> PendingQueue {
        match self {
            Gate::NotReady(queue) => std::mem::take(queue),
            Gate::Ready => PendingQueue::default(),
        }
    }
}
