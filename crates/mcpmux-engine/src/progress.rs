//! Progress manager (§4.4): token issuance, listener fan-out, lifecycle.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use mcpmux_core::{McpError, McpResult};
use mcpmux_protocol::ProgressParams;
use tokio::sync::RwLock;

/// Receives a progress event for one token.
///
/// The dispatcher implements this to forward events as a
/// `notifications/progress` message on the owning session's transport.
pub trait ProgressListener: Send + Sync {
    /// Called on every `update`/`complete`/`fail` for the token this
    /// listener was registered against.
    fn on_progress(&self, params: &ProgressParams);
}

struct TokenEntry {
    request_id: u64,
    created: i64,
    listeners: Vec<Arc<dyn ProgressListener>>,
}

/// Issues progress tokens and fans their updates out to registered listeners.
///
/// Grounded on the shared `Arc<RwLock<HashMap<..>>>` manager pattern used
/// throughout the engine: reads take the shared lock, mutating operations
/// take the exclusive lock and never hold it across a listener callback.
pub struct ProgressManager {
    tokens: RwLock<HashMap<String, TokenEntry>>,
    sequence: AtomicU64,
}

impl Default for ProgressManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressManager {
    /// Creates an empty manager.
    #[must_use]
    pub fn new() -> Self {
        Self {
            tokens: RwLock::new(HashMap::new()),
            sequence: AtomicU64::new(0),
        }
    }

    /// Mints a fresh token of the form `prog_<unix-nanos-ish>_<requestId>` and
    /// registers it with no listeners.
    pub async fn issue_token(&self, request_id: u64) -> String {
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
        let token = format!("prog_{seq}_{request_id}");
        self.tokens.write().await.insert(
            token.clone(),
            TokenEntry {
                request_id,
                created: mcpmux_transport::now_unix(),
                listeners: Vec::new(),
            },
        );
        token
    }

    /// Registers a listener against an existing token.
    pub async fn add_listener(
        &self,
        token: &str,
        listener: Arc<dyn ProgressListener>,
    ) -> McpResult<()> {
        let mut tokens = self.tokens.write().await;
        let entry = tokens
            .get_mut(token)
            .ok_or_else(|| unknown_token_error(token))?;
        entry.listeners.push(listener);
        Ok(())
    }

    /// Emits `progress` (in `[0, 1]`, or `-1` to signal failure) with an
    /// optional `total`/`message`. Fails on an unknown token rather than
    /// being silently dropped.
    pub async fn update_progress(
        &self,
        token: &str,
        progress: f64,
        total: Option<f64>,
        message: Option<&str>,
    ) -> McpResult<()> {
        if progress != -1.0 && !(0.0..=1.0).contains(&progress) {
            return Err(McpError::validation_error(
                "progress",
                "must be in [0, 1], or -1 to signal failure",
            ));
        }
        let listeners = {
            let tokens = self.tokens.read().await;
            let entry = tokens
                .get(token)
                .ok_or_else(|| unknown_token_error(token))?;
            entry.listeners.clone()
        };
        let mut params = ProgressParams::new(token, progress);
        params.total = total;
        params.message = message.map(str::to_owned);
        for listener in listeners {
            listener.on_progress(&params);
        }
        Ok(())
    }

    /// Counted form: `current`/`total` must be non-negative with
    /// `current <= total`; translated to a `progress` fraction.
    pub async fn update_detailed_progress(
        &self,
        token: &str,
        current: f64,
        total: f64,
        message: Option<&str>,
    ) -> McpResult<()> {
        if current < 0.0 || total < 0.0 || current > total {
            return Err(McpError::validation_error(
                "current",
                "must satisfy 0 <= current <= total",
            ));
        }
        let progress = if total == 0.0 { 0.0 } else { current / total };
        self.update_progress(token, progress, Some(total), message).await
    }

    /// Sends a final `progress = 1.0` event and drops the token and its
    /// listeners. Terminal: a later `update`/`complete`/`fail` on the same
    /// token fails.
    pub async fn complete_progress(&self, token: &str, message: Option<&str>) -> McpResult<()> {
        let listeners = self.take_listeners(token).await?;
        let mut params = ProgressParams::new(token, 1.0);
        params.message = message.map(str::to_owned);
        for listener in listeners {
            listener.on_progress(&params);
        }
        Ok(())
    }

    /// Emits `progress = -1.0` with `message` carrying the failure detail and
    /// drops the token and its listeners.
    pub async fn fail_progress(&self, token: &str, message: &str) -> McpResult<()> {
        let listeners = self.take_listeners(token).await?;
        let params = ProgressParams::new(token, -1.0).with_message(message.to_owned());
        for listener in listeners {
            listener.on_progress(&params);
        }
        Ok(())
    }

    async fn take_listeners(&self, token: &str) -> McpResult<Vec<Arc<dyn ProgressListener>>> {
        let mut tokens = self.tokens.write().await;
        tokens
            .remove(token)
            .map(|entry| entry.listeners)
            .ok_or_else(|| unknown_token_error(token))
    }

    /// The request id a token was issued for, if it is still live.
    pub async fn request_id_for(&self, token: &str) -> Option<u64> {
        self.tokens.read().await.get(token).map(|e| e.request_id)
    }

    /// How many tokens are currently live.
    pub async fn live_token_count(&self) -> usize {
        self.tokens.read().await.len()
    }

    /// Drops tokens whose `created` timestamp is older than `max_age_secs`.
    /// Returns how many were reaped.
    pub async fn cleanup_stale_tokens(&self, max_age_secs: i64) -> usize {
        let cutoff = mcpmux_transport::now_unix() - max_age_secs;
        let mut tokens = self.tokens.write().await;
        let before = tokens.len();
        tokens.retain(|_, entry| entry.created >= cutoff);
        before - tokens.len()
    }
}

fn unknown_token_error(token: &str) -> McpError {
    McpError::validation_error("progressToken", format!("unknown progress token: {token}"))
        .with_context("progress_token", token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct RecordingListener {
        events: Mutex<Vec<ProgressParams>>,
    }

    impl RecordingListener {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                events: Mutex::new(Vec::new()),
            })
        }
    }

    impl ProgressListener for RecordingListener {
        fn on_progress(&self, params: &ProgressParams) {
            self.events.lock().unwrap().push(params.clone());
        }
    }

    #[tokio::test]
    async fn issue_then_update_then_complete_reaches_listener() {
        let manager = ProgressManager::new();
        let token = manager.issue_token(1).await;
        let listener = RecordingListener::new();
        manager.add_listener(&token, listener.clone()).await.unwrap();

        manager.update_progress(&token, 0.5, Some(1.0), Some("halfway")).await.unwrap();
        manager.complete_progress(&token, None).await.unwrap();

        let events = listener.events.lock().unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].progress, 0.5);
        assert_eq!(events[1].progress, 1.0);
    }

    #[tokio::test]
    async fn update_on_unknown_token_is_an_error() {
        let manager = ProgressManager::new();
        let err = manager.update_progress("missing", 0.1, None, None).await.unwrap_err();
        assert_eq!(err.code.code(), mcpmux_core::McpErrorCode::ValidationError.code());
    }

    #[tokio::test]
    async fn progress_out_of_range_is_rejected() {
        let manager = ProgressManager::new();
        let token = manager.issue_token(1).await;
        let err = manager.update_progress(&token, 1.5, None, None).await.unwrap_err();
        assert_eq!(err.code.code(), mcpmux_core::McpErrorCode::ValidationError.code());
    }

    #[tokio::test]
    async fn complete_is_terminal() {
        let manager = ProgressManager::new();
        let token = manager.issue_token(1).await;
        manager.complete_progress(&token, None).await.unwrap();
        let err = manager.update_progress(&token, 0.1, None, None).await.unwrap_err();
        assert_eq!(err.code.code(), mcpmux_core::McpErrorCode::ValidationError.code());
    }

    #[tokio::test]
    async fn detailed_progress_computes_fraction() {
        let manager = ProgressManager::new();
        let token = manager.issue_token(1).await;
        let listener = RecordingListener::new();
        manager.add_listener(&token, listener.clone()).await.unwrap();
        manager.update_detailed_progress(&token, 3.0, 4.0, None).await.unwrap();
        let events = listener.events.lock().unwrap();
        assert_eq!(events[0].progress, 0.75);
    }

    #[tokio::test]
    async fn detailed_progress_rejects_current_greater_than_total() {
        let manager = ProgressManager::new();
        let token = manager.issue_token(1).await;
        let err = manager.update_detailed_progress(&token, 5.0, 4.0, None).await.unwrap_err();
        assert_eq!(err.code.code(), mcpmux_core::McpErrorCode::ValidationError.code());
    }
}
