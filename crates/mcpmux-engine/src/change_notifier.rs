//! Change notifier (§4.5): content-hash diffing of per-server tool/prompt
//! lists, with order-insensitive fan-out to subscribers.

use std::collections::HashMap;

use mcpmux_core::log_engine;
use mcpmux_protocol::{Prompt, Tool};
use sha2::{Digest, Sha256};
use tokio::sync::RwLock;

/// Receives a list-changed fan-out.
///
/// The dispatcher implements this to forward the event as a
/// `notifications/tools/list_changed` (or `prompts/list_changed`) message on
/// one client's transport. A delivery failure is logged and does not abort
/// the fan-out to the remaining subscribers.
pub trait ChangeSubscriber: Send + Sync {
    /// Subscriber identity, used only for logging.
    fn id(&self) -> &str;
    /// Delivers a `tools/list_changed` notification. Returns `Err` on
    /// delivery failure.
    fn notify_tools_changed(&self, server: &str) -> Result<(), String>;
    /// Delivers a `prompts/list_changed` notification. Returns `Err` on
    /// delivery failure.
    fn notify_prompts_changed(&self, server: &str) -> Result<(), String>;
}

#[derive(Default)]
struct ServerHashes {
    tools: Option<String>,
    prompts: Option<String>,
}

struct SubscriberEntry {
    subscriber: std::sync::Arc<dyn ChangeSubscriber>,
    last_notified: i64,
}

/// Diffs tool/prompt lists per server and fans out change notifications to
/// registered subscribers when the content actually changed.
pub struct ChangeNotifier {
    hashes: RwLock<HashMap<String, ServerHashes>>,
    subscribers: RwLock<Vec<SubscriberEntry>>,
}

impl Default for ChangeNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl ChangeNotifier {
    /// Creates a notifier with no recorded servers and no subscribers.
    #[must_use]
    pub fn new() -> Self {
        Self {
            hashes: RwLock::new(HashMap::new()),
            subscribers: RwLock::new(Vec::new()),
        }
    }

    /// Registers a subscriber for future change notifications.
    pub async fn subscribe(&self, subscriber: std::sync::Arc<dyn ChangeSubscriber>) {
        self.subscribers.write().await.push(SubscriberEntry {
            subscriber,
            last_notified: mcpmux_transport::now_unix(),
        });
    }

    /// Removes a previously registered subscriber by id.
    pub async fn unsubscribe(&self, id: &str) {
        self.subscribers.write().await.retain(|s| s.subscriber.id() != id);
    }

    /// Drops subscribers that have gone `max_age_secs` without a successful
    /// delivery (or, for one never notified, since registration). Returns
    /// how many were reaped.
    pub async fn cleanup_inactive_subscribers(&self, max_age_secs: i64) -> usize {
        let cutoff = mcpmux_transport::now_unix() - max_age_secs;
        let mut subscribers = self.subscribers.write().await;
        let before = subscribers.len();
        subscribers.retain(|entry| entry.last_notified >= cutoff);
        before - subscribers.len()
    }

    /// Updates the tool list for `server`. The first observation of a server
    /// stores its digest silently; a later call fans out
    /// `notifications/tools/list_changed` only if the digest changed.
    pub async fn update_tools(&self, server: &str, tools: &[Tool]) {
        let digest = canonical_digest(tools, |t| t.name.clone());
        let changed = self.record(server, digest, true).await;
        if changed {
            self.fan_out_tools(server).await;
        }
    }

    /// Updates the prompt list for `server`, same semantics as
    /// [`Self::update_tools`].
    pub async fn update_prompts(&self, server: &str, prompts: &[Prompt]) {
        let digest = canonical_digest(prompts, |p| p.name.clone());
        let changed = self.record(server, digest, false).await;
        if changed {
            self.fan_out_prompts(server).await;
        }
    }

    /// Forces a `tools/list_changed` fan-out regardless of digest state.
    pub async fn force_notify_tools(&self, server: &str) {
        self.fan_out_tools(server).await;
    }

    /// Forces a `prompts/list_changed` fan-out regardless of digest state.
    pub async fn force_notify_prompts(&self, server: &str) {
        self.fan_out_prompts(server).await;
    }

    /// Records `digest` for `server` under the tools or prompts slot.
    /// Returns whether a notification should be emitted: `false` on first
    /// observation, otherwise whether the digest changed.
    async fn record(&self, server: &str, digest: String, is_tools: bool) -> bool {
        let mut hashes = self.hashes.write().await;
        let entry = hashes.entry(server.to_owned()).or_default();
        let slot = if is_tools { &mut entry.tools } else { &mut entry.prompts };
        match slot.take() {
            None => {
                *slot = Some(digest);
                false
            }
            Some(previous) => {
                let changed = previous != digest;
                *slot = Some(digest);
                changed
            }
        }
    }

    async fn fan_out_tools(&self, server: &str) {
        let snapshot: Vec<_> = self.subscribers.read().await.iter().map(|e| e.subscriber.clone()).collect();
        let mut delivered = Vec::new();
        for subscriber in snapshot {
            match subscriber.notify_tools_changed(server) {
                Ok(()) => delivered.push(subscriber.id().to_owned()),
                Err(err) => log_engine!(
                    log::Level::Warn,
                    "tools/list_changed delivery to {} failed: {err}",
                    subscriber.id()
                ),
            }
        }
        self.mark_notified(&delivered).await;
    }

    async fn fan_out_prompts(&self, server: &str) {
        let snapshot: Vec<_> = self.subscribers.read().await.iter().map(|e| e.subscriber.clone()).collect();
        let mut delivered = Vec::new();
        for subscriber in snapshot {
            match subscriber.notify_prompts_changed(server) {
                Ok(()) => delivered.push(subscriber.id().to_owned()),
                Err(err) => log_engine!(
                    log::Level::Warn,
                    "prompts/list_changed delivery to {} failed: {err}",
                    subscriber.id()
                ),
            }
        }
        self.mark_notified(&delivered).await;
    }

    async fn mark_notified(&self, ids: &[String]) {
        if ids.is_empty() {
            return;
        }
        let now = mcpmux_transport::now_unix();
        let mut subscribers = self.subscribers.write().await;
        for entry in subscribers.iter_mut() {
            if ids.iter().any(|id| id == entry.subscriber.id()) {
                entry.last_notified = now;
            }
        }
    }
}

/// Sorts items by a derived key, canonically serializes, and returns a hex
/// content digest. Order-insensitive by construction.
fn canonical_digest<T, F>(items: &[T], key: F) -> String
where
    F: Fn(&T) -> String,
{
    let mut keys: Vec<String> = items.iter().map(key).collect();
    keys.sort_unstable();
    let mut hasher = Sha256::new();
    for k in &keys {
        hasher.update(k.as_bytes());
        hasher.update([0u8]);
    }
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn tool(name: &str) -> Tool {
        Tool {
            name: name.to_owned(),
            description: None,
            input_schema: serde_json::json!({}),
        }
    }

    struct CountingSubscriber {
        id: String,
        tool_events: AtomicUsize,
    }

    impl ChangeSubscriber for CountingSubscriber {
        fn id(&self) -> &str {
            &self.id
        }
        fn notify_tools_changed(&self, _server: &str) -> Result<(), String> {
            self.tool_events.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        fn notify_prompts_changed(&self, _server: &str) -> Result<(), String> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn s2_scenario_reorder_is_silent_change_notifies_once() {
        let notifier = ChangeNotifier::new();
        let subscriber = Arc::new(CountingSubscriber {
            id: "c1".into(),
            tool_events: AtomicUsize::new(0),
        });
        notifier.subscribe(subscriber.clone()).await;

        notifier.update_tools("s", &[tool("a"), tool("b")]).await;
        assert_eq!(subscriber.tool_events.load(Ordering::SeqCst), 0);

        notifier.update_tools("s", &[tool("b"), tool("a")]).await;
        assert_eq!(subscriber.tool_events.load(Ordering::SeqCst), 0);

        notifier.update_tools("s", &[tool("a"), tool("c")]).await;
        assert_eq!(subscriber.tool_events.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn force_notify_bypasses_digest_check() {
        let notifier = ChangeNotifier::new();
        let subscriber = Arc::new(CountingSubscriber {
            id: "c1".into(),
            tool_events: AtomicUsize::new(0),
        });
        notifier.subscribe(subscriber.clone()).await;
        notifier.update_tools("s", &[tool("a")]).await;
        notifier.force_notify_tools("s").await;
        notifier.force_notify_tools("s").await;
        assert_eq!(subscriber.tool_events.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn delivery_failure_does_not_abort_fan_out() {
        struct Failing;
        impl ChangeSubscriber for Failing {
            fn id(&self) -> &str {
                "failing"
            }
            fn notify_tools_changed(&self, _server: &str) -> Result<(), String> {
                Err("boom".into())
            }
            fn notify_prompts_changed(&self, _server: &str) -> Result<(), String> {
                Ok(())
            }
        }
        let notifier = ChangeNotifier::new();
        let good = Arc::new(CountingSubscriber {
            id: "good".into(),
            tool_events: AtomicUsize::new(0),
        });
        notifier.subscribe(Arc::new(Failing)).await;
        notifier.subscribe(good.clone()).await;
        notifier.update_tools("s", &[tool("a")]).await;
        notifier.update_tools("s", &[tool("b")]).await;
        assert_eq!(good.tool_events.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cleanup_inactive_subscribers_reaps_past_max_age() {
        let notifier = ChangeNotifier::new();
        let subscriber = Arc::new(CountingSubscriber {
            id: "c1".into(),
            tool_events: AtomicUsize::new(0),
        });
        notifier.subscribe(subscriber).await;
        assert_eq!(notifier.cleanup_inactive_subscribers(-1).await, 1);
        assert_eq!(notifier.cleanup_inactive_subscribers(3600).await, 0);
    }

    #[tokio::test]
    async fn unsubscribe_stops_future_deliveries() {
        let notifier = ChangeNotifier::new();
        let subscriber = Arc::new(CountingSubscriber {
            id: "c1".into(),
            tool_events: AtomicUsize::new(0),
        });
        notifier.subscribe(subscriber.clone()).await;
        notifier.update_tools("s", &[tool("a")]).await;
        notifier.unsubscribe("c1").await;
        notifier.update_tools("s", &[tool("b")]).await;
        assert_eq!(subscriber.tool_events.load(Ordering::SeqCst), 0);
    }
}
