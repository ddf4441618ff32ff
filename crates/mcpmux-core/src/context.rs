//! Per-request execution context: cancellation, progress reporting, and the
//! checkpoint a handler calls between expensive steps to notice cancellation.

use std::fmt;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

/// Sent to a [`ProgressReporter`] on each progress update.
///
/// Implemented by the dispatcher to bridge a tool call's progress reports
/// into a `notifications/progress` message on the owning session's transport.
pub trait NotificationSender: Send + Sync {
    /// Reports a progress update. `total` and `message` are optional per the
    /// MCP `notifications/progress` schema.
    fn send_progress(&self, progress: f64, total: Option<f64>, message: Option<&str>);
}

/// A [`NotificationSender`] that discards every update.
///
/// Used as the default when a handler is invoked outside of a live request
/// (e.g. from a test harness) and has no transport to notify.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpNotificationSender;

impl NotificationSender for NoOpNotificationSender {
    fn send_progress(&self, _progress: f64, _total: Option<f64>, _message: Option<&str>) {}
}

/// Reports progress for a single in-flight request.
///
/// Cheaply cloneable; every clone reports to the same underlying sender.
#[derive(Clone)]
pub struct ProgressReporter {
    sender: Arc<dyn NotificationSender>,
}

impl ProgressReporter {
    /// Wraps a sender implementation.
    #[must_use]
    pub fn new(sender: Arc<dyn NotificationSender>) -> Self {
        Self { sender }
    }

    /// Reports a bare progress value with no total or message.
    pub fn report(&self, progress: f64) {
        self.sender.send_progress(progress, None, None);
    }

    /// Reports progress against a known total.
    pub fn report_with_total(&self, progress: f64, total: f64) {
        self.sender.send_progress(progress, Some(total), None);
    }

    /// Reports progress with a human-readable status message.
    pub fn report_with_message(&self, progress: f64, message: &str) {
        self.sender.send_progress(progress, None, Some(message));
    }
}

impl fmt::Debug for ProgressReporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgressReporter").finish_non_exhaustive()
    }
}

/// Raised by [`McpContext::checkpoint`] when the owning request has been
/// cancelled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CancelledError;

impl fmt::Display for CancelledError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "request cancelled")
    }
}

impl std::error::Error for CancelledError {}

/// The execution context a handler receives for a single request.
///
/// Carries a [`CancellationToken`] cancelled by the dispatcher when a
/// `$/cancelled` notification or a transport disconnect arrives for this
/// request's id, the numeric request id itself, and an optional progress
/// reporter wired to the owning session's transport.
#[derive(Clone)]
pub struct McpContext {
    cancel: CancellationToken,
    request_id: u64,
    progress_reporter: Option<ProgressReporter>,
}

impl McpContext {
    /// Creates a context with no progress reporter.
    #[must_use]
    pub fn new(cancel: CancellationToken, request_id: u64) -> Self {
        Self {
            cancel,
            request_id,
            progress_reporter: None,
        }
    }

    /// Creates a context wired to report progress to `reporter`.
    #[must_use]
    pub fn with_progress(
        cancel: CancellationToken,
        request_id: u64,
        reporter: ProgressReporter,
    ) -> Self {
        Self {
            cancel,
            request_id,
            progress_reporter: Some(reporter),
        }
    }

    /// Whether this context carries a progress reporter.
    #[must_use]
    pub fn has_progress_reporter(&self) -> bool {
        self.progress_reporter.is_some()
    }

    /// Reports bare progress, a no-op if no reporter is attached.
    pub fn report_progress(&self, progress: f64) {
        if let Some(reporter) = &self.progress_reporter {
            reporter.report(progress);
        }
    }

    /// Reports progress against a total, a no-op if no reporter is attached.
    pub fn report_progress_with_total(&self, progress: f64, total: f64) {
        if let Some(reporter) = &self.progress_reporter {
            reporter.report_with_total(progress, total);
        }
    }

    /// The JSON-RPC request id this context was created for.
    #[must_use]
    pub fn request_id(&self) -> u64 {
        self.request_id
    }

    /// Whether the request has been cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolves once the request is cancelled. Handlers that want to race
    /// cancellation against other work select on this future.
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await;
    }

    /// A cooperative cancellation point: returns `Err(CancelledError)` if the
    /// request has been cancelled since the context was created, `Ok(())`
    /// otherwise. Long-running handlers call this between expensive steps.
    pub fn checkpoint(&self) -> Result<(), CancelledError> {
        if self.cancel.is_cancelled() {
            Err(CancelledError)
        } else {
            Ok(())
        }
    }

    /// The underlying cancellation token, for handlers that need to derive a
    /// child token for sub-operations.
    #[must_use]
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }
}

impl fmt::Debug for McpContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("McpContext")
            .field("request_id", &self.request_id)
            .field("cancelled", &self.cancel.is_cancelled())
            .field("has_progress_reporter", &self.has_progress_reporter())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct CountingSender {
        calls: Mutex<Vec<(f64, Option<f64>, Option<String>)>>,
    }

    impl NotificationSender for CountingSender {
        fn send_progress(&self, progress: f64, total: Option<f64>, message: Option<&str>) {
            self.calls
                .lock()
                .unwrap()
                .push((progress, total, message.map(str::to_owned)));
        }
    }

    #[test]
    fn new_context_is_not_cancelled() {
        let ctx = McpContext::new(CancellationToken::new(), 1);
        assert!(!ctx.is_cancelled());
        assert!(ctx.checkpoint().is_ok());
        assert!(!ctx.has_progress_reporter());
    }

    #[test]
    fn cancelling_the_token_is_observed() {
        let token = CancellationToken::new();
        let ctx = McpContext::new(token.clone(), 1);
        token.cancel();
        assert!(ctx.is_cancelled());
        assert_eq!(ctx.checkpoint(), Err(CancelledError));
    }

    #[test]
    fn no_op_sender_reports_nothing() {
        let reporter = ProgressReporter::new(Arc::new(NoOpNotificationSender));
        reporter.report(0.5);
    }

    #[test]
    fn progress_reports_reach_the_sender() {
        let sender = Arc::new(CountingSender::default());
        let ctx = McpContext::with_progress(
            CancellationToken::new(),
            42,
            ProgressReporter::new(sender.clone()),
        );
        ctx.report_progress(0.25);
        ctx.report_progress_with_total(2.0, 10.0);
        let calls = sender.calls.lock().unwrap();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0], (0.25, None, None));
        assert_eq!(calls[1], (2.0, Some(10.0), None));
    }

    #[test]
    fn request_id_is_preserved() {
        let ctx = McpContext::new(CancellationToken::new(), 7);
        assert_eq!(ctx.request_id(), 7);
    }

    #[tokio::test]
    async fn cancelled_future_resolves_after_cancel() {
        let token = CancellationToken::new();
        let ctx = McpContext::new(token.clone(), 1);
        token.cancel();
        ctx.cancelled().await;
    }

    #[test]
    fn cancelled_error_display() {
        assert_eq!(CancelledError.to_string(), "request cancelled");
    }
}
