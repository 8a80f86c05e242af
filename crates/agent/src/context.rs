//! Per-run context handed to tools and prompt generators

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Caller-supplied dependencies plus run metadata.
///
/// Cloning is cheap; every clone shares the same dependency value.
pub struct RunContext<D> {
    deps: Arc<D>,
    run_id: Arc<str>,
    retry: u32,
    cancel: CancellationToken,
    deadline: Option<Instant>,
}

impl<D> Clone for RunContext<D> {
    fn clone(&self) -> Self {
        Self {
            deps: Arc::clone(&self.deps),
            run_id: Arc::clone(&self.run_id),
            retry: self.retry,
            cancel: self.cancel.clone(),
            deadline: self.deadline,
        }
    }
}

impl<D> RunContext<D> {
    pub fn new(deps: D, run_id: impl Into<String>, cancel: CancellationToken) -> Self {
        Self::from_arc(Arc::new(deps), run_id, cancel)
    }

    pub fn from_arc(deps: Arc<D>, run_id: impl Into<String>, cancel: CancellationToken) -> Self {
        Self {
            deps,
            run_id: Arc::from(run_id.into()),
            retry: 0,
            cancel,
            deadline: None,
        }
    }

    /// The dependencies supplied to `run`
    pub fn deps(&self) -> &D {
        &self.deps
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Retries consumed so far in this run
    pub fn retry(&self) -> u32 {
        self.retry
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolves when the run is cancelled
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await
    }

    /// When the current tool call will be abandoned, if bounded
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn time_remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    pub(crate) fn with_retry(mut self, retry: u32) -> Self {
        self.retry = retry;
        self
    }

    pub(crate) fn with_timeout(mut self, timeout: Duration) -> Self {
        self.deadline = Some(Instant::now() + timeout);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Deps {
        customer_id: u32,
    }

    #[test]
    fn test_clones_share_dependencies() {
        let ctx = RunContext::new(Deps { customer_id: 42 }, "run-1", CancellationToken::new());
        let other = ctx.clone().with_retry(2);

        assert_eq!(other.deps().customer_id, 42);
        assert_eq!(other.run_id(), "run-1");
        assert_eq!(other.retry(), 2);
        assert_eq!(ctx.retry(), 0);
        assert!(std::ptr::eq(ctx.deps(), other.deps()));
    }

    #[test]
    fn test_cancellation_is_shared() {
        let token = CancellationToken::new();
        let ctx = RunContext::new((), "run-2", token.clone());
        assert!(!ctx.is_cancelled());
        token.cancel();
        assert!(ctx.clone().is_cancelled());
    }

    #[tokio::test]
    async fn test_deadline() {
        let ctx = RunContext::new((), "run-3", CancellationToken::new());
        assert!(ctx.deadline().is_none());
        assert!(ctx.time_remaining().is_none());

        let ctx = ctx.with_timeout(Duration::from_secs(5));
        let remaining = ctx.time_remaining().unwrap();
        assert!(remaining <= Duration::from_secs(5));
        assert!(remaining > Duration::from_secs(4));
    }
}
