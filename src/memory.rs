use crate::client::TimeSeriesClient;
use crate::error::BoxError;
use crate::record::Point;
use async_trait::async_trait;
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard};

/// One batch received by a [`MemoryClient`].
#[derive(Debug, Clone, PartialEq)]
pub struct WrittenBatch {
    pub measurement: String,
    pub points: Vec<Point>,
}

#[derive(Debug, Default)]
struct State {
    databases: BTreeSet<String>,
    created: Vec<String>,
    batches: Vec<WrittenBatch>,
    fail_list: Option<String>,
    fail_create: Option<String>,
    failing_writes: usize,
}

/// A client that keeps everything in memory.
///
/// Useful for measuring the overhead of the sink itself without any
/// network I/O, and for tests that need to inspect what was written.
/// Cloning shares the underlying store.
#[derive(Clone, Debug, Default)]
pub struct MemoryClient {
    state: Arc<Mutex<State>>,
}

impl MemoryClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// A client on which `database` already exists.
    pub fn with_database(database: impl Into<String>) -> Self {
        let client = Self::new();
        client.state().databases.insert(database.into());
        client
    }

    /// Make every `list_database_names` call fail with `msg`.
    pub fn fail_listing(&self, msg: impl Into<String>) {
        self.state().fail_list = Some(msg.into());
    }

    /// Make every `create_database` call fail with `msg`.
    pub fn fail_creation(&self, msg: impl Into<String>) {
        self.state().fail_create = Some(msg.into());
    }

    /// Make the next `n` writes fail. Failed batches are not recorded.
    pub fn fail_next_writes(&self, n: usize) {
        self.state().failing_writes = n;
    }

    pub fn databases(&self) -> BTreeSet<String> {
        self.state().databases.clone()
    }

    /// Databases created through `create_database`, in call order.
    pub fn created_databases(&self) -> Vec<String> {
        self.state().created.clone()
    }

    pub fn batches(&self) -> Vec<WrittenBatch> {
        self.state().batches.clone()
    }

    /// All written points, flattened in write order.
    pub fn points(&self) -> Vec<Point> {
        self.state()
            .batches
            .iter()
            .flat_map(|b| b.points.iter().cloned())
            .collect()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        // A poisoned lock only means a test panicked while holding it.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl TimeSeriesClient for MemoryClient {
    async fn list_database_names(&self) -> Result<BTreeSet<String>, BoxError> {
        let state = self.state();
        match &state.fail_list {
            Some(msg) => Err(msg.clone().into()),
            None => Ok(state.databases.clone()),
        }
    }

    async fn create_database(&self, name: &str) -> Result<(), BoxError> {
        let mut state = self.state();
        if let Some(msg) = &state.fail_create {
            return Err(msg.clone().into());
        }
        state.databases.insert(name.to_string());
        state.created.push(name.to_string());
        Ok(())
    }

    async fn write_points(&self, measurement: &str, points: &[Point]) -> Result<(), BoxError> {
        let mut state = self.state();
        if state.failing_writes > 0 {
            state.failing_writes -= 1;
            return Err(format!("write of {} points rejected", points.len()).into());
        }
        state.batches.push(WrittenBatch {
            measurement: measurement.to_string(),
            points: points.to_vec(),
        });
        Ok(())
    }
}
