use crate::error::SinkError;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// What caused a flush.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FlushTrigger {
    /// The buffer reached `max_buffered_events`.
    Size,
    /// The periodic timer fired.
    Timer,
    /// The sink is shutting down.
    Shutdown,
}

impl FlushTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            FlushTrigger::Size => "size",
            FlushTrigger::Timer => "timer",
            FlushTrigger::Shutdown => "shutdown",
        }
    }
}

impl fmt::Display for FlushTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Observable sink activity, delivered through
/// [`SinkHandle::subscribe`](crate::sink::SinkHandle::subscribe).
#[derive(Clone, Debug)]
pub enum SinkEvent {
    /// A record was accepted into the buffer.
    Logged { level: String, message: String },
    /// A batch was written successfully.
    Flushed { points: usize, trigger: FlushTrigger },
    /// Initialization, extraction or flush failure.
    Error(Arc<SinkError>),
}

/// Counters maintained by the sink worker.
#[derive(Debug, Default)]
pub struct SinkStats {
    accepted: AtomicU64,
    silenced: AtomicU64,
    extraction_failures: AtomicU64,
    flushes: AtomicU64,
    flushed_points: AtomicU64,
    flush_failures: AtomicU64,
}

/// Point-in-time copy of [`SinkStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub accepted: u64,
    pub silenced: u64,
    pub extraction_failures: u64,
    pub flushes: u64,
    pub flushed_points: u64,
    pub flush_failures: u64,
}

impl SinkStats {
    pub(crate) fn record_accepted(&self) {
        self.accepted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_silenced(&self) {
        self.silenced.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_extraction_failure(&self) {
        self.extraction_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_flush(&self, points: usize) {
        self.flushes.fetch_add(1, Ordering::Relaxed);
        self.flushed_points.fetch_add(points as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_flush_failure(&self) {
        self.flush_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            accepted: self.accepted.load(Ordering::Relaxed),
            silenced: self.silenced.load(Ordering::Relaxed),
            extraction_failures: self.extraction_failures.load(Ordering::Relaxed),
            flushes: self.flushes.load(Ordering::Relaxed),
            flushed_points: self.flushed_points.load(Ordering::Relaxed),
            flush_failures: self.flush_failures.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_reflects_counters() {
        let stats = SinkStats::default();
        stats.record_accepted();
        stats.record_accepted();
        stats.record_silenced();
        stats.record_flush(2);
        stats.record_flush(0);
        stats.record_flush_failure();

        assert_eq!(
            stats.snapshot(),
            StatsSnapshot {
                accepted: 2,
                silenced: 1,
                extraction_failures: 0,
                flushes: 2,
                flushed_points: 2,
                flush_failures: 1,
            }
        );
    }
}
