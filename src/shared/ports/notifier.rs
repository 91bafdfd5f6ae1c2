use std::future::Future;
use std::pin::Pin;

pub type DispatchFuture = Pin<Box<dyn Future<Output = DispatchSummary> + Send>>;

/// Outcome counters of one dispatch round across the recipient list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchSummary {
    pub attempted: usize,
    pub queued: usize,
    pub failed: usize,
}

/// Turns script lines into voice calls. Never fails as a whole: per-recipient
/// problems only show up in the summary and the logs.
pub trait AlertNotifier: Send + Sync {
    fn notify_lines(&self, lines: Vec<String>) -> DispatchFuture;
}
