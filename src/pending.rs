use crate::error::SinkError;
use crate::record::LogRecord;
use std::collections::VecDeque;
use tokio::sync::oneshot;

/// Reply channel of a log call. `None` for fire-and-forget calls.
pub(crate) type Reply = Option<oneshot::Sender<Result<(), SinkError>>>;

/// A log call together with the channel its outcome is reported on.
#[derive(Debug)]
pub(crate) struct LogCall {
    pub record: LogRecord,
    pub reply: Reply,
}

impl LogCall {
    /// Report the outcome. Consumes the call so it is answered exactly once.
    pub fn respond(self, result: Result<(), SinkError>) {
        if let Some(reply) = self.reply {
            // The caller may have stopped waiting.
            let _ = reply.send(result);
        }
    }
}

/// FIFO of log calls received before the sink became ready.
#[derive(Debug, Default)]
pub(crate) struct PendingQueue {
    calls: VecDeque<LogCall>,
}

impl PendingQueue {
    pub fn push(&mut self, call: LogCall) {
        self.calls.push_back(call);
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    /// Hand out the queued calls in arrival order. The queue is gone
    /// afterwards.
    pub fn into_replay(self) -> impl Iterator<Item = LogCall> {
        self.calls.into_iter()
    }
}
