//! Subscription manager (§4.6): resource URI/template subscriptions, filter
//! evaluation, ownership, and batched/debounced delivery.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use glob::Pattern as GlobPattern;
use mcpmux_core::{McpError, McpResult};
use mcpmux_protocol::types::{BatchInfo, FilterKind, ResourceUpdateType, SubscriptionFilter, SubscriptionOptions};
use mcpmux_protocol::uri_template::template_to_regex;
use regex::Regex;
use tokio::sync::RwLock;

/// One standing registration for change notifications on a URI or URI
/// template.
#[derive(Debug, Clone)]
pub struct Subscription {
    /// Unique subscription id.
    pub id: String,
    /// Owning client.
    pub client_id: String,
    /// Session the subscription was created under.
    pub session_id: String,
    /// Subscribed URI or URI template.
    pub uri: String,
    /// Whether `uri` contains `{...}` template syntax.
    pub is_template: bool,
    /// Filters every matching update must satisfy.
    pub filters: Vec<SubscriptionFilter>,
    /// Batching/debounce delivery options.
    pub options: SubscriptionOptions,
    /// Unix timestamp (seconds) of creation.
    pub created: i64,
    /// Unix timestamp (seconds) of the last delivery, if any.
    pub last_notified: Option<i64>,
}

/// A resource update fed to [`SubscriptionManager::notify_resource_update`].
pub struct ResourceUpdate {
    /// The affected resource's URI.
    pub uri: String,
    /// What kind of change occurred.
    pub update_type: ResourceUpdateType,
    /// MIME type, if known — matched against `mimeType` filters.
    pub mime_type: Option<String>,
    /// Size in bytes, if known — matched against `size` filters.
    pub size: Option<u64>,
    /// Arbitrary metadata properties available to filters by key.
    pub metadata: HashMap<String, String>,
}

/// Delivers a batch of resource updates to one client.
///
/// The dispatcher implements this to forward the delivery as one
/// `notifications/resources/updated` message (or a sequence of them, if
/// `options.batch_size` splits the batch) on the client's transport.
pub trait SubscriptionSink: Send + Sync {
    /// Client identity this sink delivers to.
    fn client_id(&self) -> &str;
    /// Delivers one update for `subscription_id`, with `batch` set when the
    /// owning subscription requested batched delivery.
    fn deliver(&self, subscription_id: &str, update: &ResourceUpdate, batch: Option<&BatchInfo>);
}

struct ClientRecord {
    subscriptions: Vec<String>,
    last_seen: i64,
}

struct CompiledTemplate {
    regex: Regex,
}

/// Tracks subscriptions, evaluates them against resource updates, and
/// dispatches deliveries grouped by client.
pub struct SubscriptionManager {
    subscriptions: RwLock<HashMap<String, Subscription>>,
    clients: RwLock<HashMap<String, ClientRecord>>,
    sinks: RwLock<HashMap<String, Arc<dyn SubscriptionSink>>>,
    sequence: AtomicU64,
}

impl Default for SubscriptionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl SubscriptionManager {
    /// Creates an empty manager.
    #[must_use]
    pub fn new() -> Self {
        Self {
            subscriptions: RwLock::new(HashMap::new()),
            clients: RwLock::new(HashMap::new()),
            sinks: RwLock::new(HashMap::new()),
            sequence: AtomicU64::new(0),
        }
    }

    /// Registers (or replaces) the delivery sink for a client.
    pub async fn register_sink(&self, sink: Arc<dyn SubscriptionSink>) {
        self.sinks.write().await.insert(sink.client_id().to_owned(), sink);
    }

    /// Removes a client's delivery sink, e.g. on disconnect. Existing
    /// subscriptions are left in place for [`Self::cleanup_expired_subscriptions`]
    /// to reap; a client that reconnects with the same id can re-register a
    /// sink and resume delivery without resubscribing.
    pub async fn unregister_sink(&self, client_id: &str) {
        self.sinks.write().await.remove(client_id);
    }

    /// Validates and records a new subscription, returning its id.
    pub async fn subscribe(
        &self,
        client_id: &str,
        session_id: &str,
        uri: &str,
        filters: Vec<SubscriptionFilter>,
        options: SubscriptionOptions,
    ) -> McpResult<String> {
        if uri.is_empty() {
            return Err(McpError::validation_error("uri", "subscription uri must not be empty"));
        }
        for filter in &filters {
            if filter.property.is_empty() {
                return Err(McpError::validation_error(
                    "filters[].property",
                    "filter property must not be empty",
                ));
            }
        }

        let is_template = uri.contains('{') && uri.contains('}');
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
        let id = format!("sub_{seq}");
        let now = mcpmux_transport::now_unix();

        let subscription = Subscription {
            id: id.clone(),
            client_id: client_id.to_owned(),
            session_id: session_id.to_owned(),
            uri: uri.to_owned(),
            is_template,
            filters,
            options,
            created: now,
            last_notified: None,
        };

        self.subscriptions.write().await.insert(id.clone(), subscription);
        let mut clients = self.clients.write().await;
        let record = clients.entry(client_id.to_owned()).or_insert_with(|| ClientRecord {
            subscriptions: Vec::new(),
            last_seen: now,
        });
        record.subscriptions.push(id.clone());
        record.last_seen = now;

        Ok(id)
    }

    /// Removes a subscription. Only the owning client may unsubscribe;
    /// anyone else gets an `AuthorizationError` and state is left unchanged.
    pub async fn unsubscribe(&self, client_id: &str, subscription_id: &str) -> McpResult<()> {
        let mut subscriptions = self.subscriptions.write().await;
        let Some(subscription) = subscriptions.get(subscription_id) else {
            return Ok(());
        };
        if subscription.client_id != client_id {
            return Err(McpError::new(
                mcpmux_core::McpErrorCode::AuthorizationError,
                format!("client {client_id} does not own subscription {subscription_id}"),
            ));
        }
        subscriptions.remove(subscription_id);
        drop(subscriptions);

        let mut clients = self.clients.write().await;
        if let Some(record) = clients.get_mut(client_id) {
            record.subscriptions.retain(|id| id != subscription_id);
        }
        Ok(())
    }

    /// Evaluates `update` against every subscription, groups surviving
    /// matches by client, and delivers one (optionally batched) notification
    /// per client via its registered sink. A subscription whose
    /// `options.debounce_ms` window hasn't elapsed since its last delivery
    /// coalesces this update into silence rather than firing again.
    pub async fn notify_resource_update(&self, update: ResourceUpdate) {
        let now = mcpmux_transport::now_unix();
        let matches: Vec<Subscription> = {
            let subscriptions = self.subscriptions.read().await;
            subscriptions
                .values()
                .filter(|s| matches_uri(s, &update.uri))
                .filter(|s| filters_pass(&s.filters, &update))
                .filter(|s| !debounced(s, now))
                .cloned()
                .collect()
        };

        if matches.is_empty() {
            return;
        }

        let mut by_client: HashMap<String, Vec<Subscription>> = HashMap::new();
        for subscription in matches {
            by_client.entry(subscription.client_id.clone()).or_default().push(subscription);
        }

        // Snapshot the sinks we're about to call and release the lock
        // before invoking them, so a slow client can't stall other lookups
        // against this manager (§5).
        let sinks: HashMap<String, Arc<dyn SubscriptionSink>> = {
            let guard = self.sinks.read().await;
            by_client.keys().filter_map(|id| guard.get(id).map(|s| (id.clone(), s.clone()))).collect()
        };
        let batch_id = format!("batch_{now}_{}", self.sequence.fetch_add(1, Ordering::Relaxed));
        let mut notified_ids = Vec::new();

        for (client_id, subs) in &by_client {
            let Some(sink) = sinks.get(client_id) else {
                continue;
            };
            let total = subs.len();
            let batched = subs.iter().any(|s| s.options.batch_size > 0);
            for (idx, subscription) in subs.iter().enumerate() {
                let batch_info = batched.then(|| BatchInfo {
                    total,
                    current: idx + 1,
                    batch_id: batch_id.clone(),
                    last_batch: idx + 1 == total,
                });
                sink.deliver(&subscription.id, &update, batch_info.as_ref());
                notified_ids.push(subscription.id.clone());
            }
        }

        let mut subscriptions = self.subscriptions.write().await;
        for id in &notified_ids {
            if let Some(subscription) = subscriptions.get_mut(id) {
                subscription.last_notified = Some(now);
            }
        }
    }

    /// Records that `client_id` is still active.
    pub async fn touch_client(&self, client_id: &str) {
        let now = mcpmux_transport::now_unix();
        if let Some(record) = self.clients.write().await.get_mut(client_id) {
            record.last_seen = now;
        }
    }

    /// Drops clients (and their subscriptions) whose `last_seen` is older
    /// than `max_age_secs`. Returns how many clients were reaped.
    pub async fn cleanup_expired_subscriptions(&self, max_age_secs: i64) -> usize {
        let cutoff = mcpmux_transport::now_unix() - max_age_secs;
        let mut clients = self.clients.write().await;
        let expired: Vec<String> = clients
            .iter()
            .filter(|(_, r)| r.last_seen < cutoff)
            .map(|(id, _)| id.clone())
            .collect();

        let mut subscriptions = self.subscriptions.write().await;
        for client_id in &expired {
            if let Some(record) = clients.remove(client_id) {
                for sub_id in record.subscriptions {
                    subscriptions.remove(&sub_id);
                }
            }
        }
        expired.len()
    }

    /// Number of live subscriptions, for introspection/tests.
    pub async fn subscription_count(&self) -> usize {
        self.subscriptions.read().await.len()
    }
}

/// Whether `subscription` is still inside its debounce window, i.e. the
/// last delivery was fewer than `options.debounce_ms` ago. A subscription
/// with `debounce_ms == 0` never debounces.
fn debounced(subscription: &Subscription, now: i64) -> bool {
    if subscription.options.debounce_ms == 0 {
        return false;
    }
    let Some(last) = subscription.last_notified else {
        return false;
    };
    let window_secs = (subscription.options.debounce_ms / 1000).max(1) as i64;
    now - last < window_secs
}

fn matches_uri(subscription: &Subscription, update_uri: &str) -> bool {
    if !subscription.is_template {
        return subscription.uri == update_uri;
    }
    let pattern = template_to_regex(&subscription.uri);
    Regex::new(&pattern)
        .map(|re| re.is_match(update_uri))
        .unwrap_or(false)
}

fn filters_pass(filters: &[SubscriptionFilter], update: &ResourceUpdate) -> bool {
    filters.iter().all(|f| filter_passes(f, update))
}

fn filter_passes(filter: &SubscriptionFilter, update: &ResourceUpdate) -> bool {
    let Some(actual) = property_value(&filter.property, update) else {
        return false;
    };
    match filter.kind {
        FilterKind::Exact => actual == filter.value,
        FilterKind::Prefix => actual.starts_with(&filter.value),
        FilterKind::Glob => GlobPattern::new(&filter.value)
            .map(|p| p.matches(&actual))
            .unwrap_or(false),
        FilterKind::Regex => Regex::new(&filter.value)
            .map(|re| re.is_match(&actual))
            .unwrap_or(false),
    }
}

fn property_value(property: &str, update: &ResourceUpdate) -> Option<String> {
    match property {
        "type" => Some(update_type_name(update.update_type).to_owned()),
        "uri" => Some(update.uri.clone()),
        "mimeType" => update.mime_type.clone(),
        "size" => update.size.map(|s| s.to_string()),
        other => update.metadata.get(other).cloned(),
    }
}

fn update_type_name(update_type: ResourceUpdateType) -> &'static str {
    match update_type {
        ResourceUpdateType::Created => "created",
        ResourceUpdateType::Updated => "updated",
        ResourceUpdateType::Deleted => "deleted",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    struct RecordingSink {
        client_id: String,
        deliveries: StdMutex<Vec<(String, String)>>,
    }

    impl SubscriptionSink for RecordingSink {
        fn client_id(&self) -> &str {
            &self.client_id
        }
        fn deliver(&self, subscription_id: &str, update: &ResourceUpdate, _batch: Option<&BatchInfo>) {
            self.deliveries
                .lock()
                .unwrap()
                .push((subscription_id.to_owned(), update.uri.clone()));
        }
    }

    fn update(uri: &str) -> ResourceUpdate {
        ResourceUpdate {
            uri: uri.to_owned(),
            update_type: ResourceUpdateType::Updated,
            mime_type: None,
            size: None,
            metadata: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn invariant_4_exact_uri_only_matches_exact_uri() {
        let manager = SubscriptionManager::new();
        let sink = Arc::new(RecordingSink {
            client_id: "c1".into(),
            deliveries: StdMutex::new(Vec::new()),
        });
        manager.register_sink(sink.clone()).await;
        manager
            .subscribe("c1", "s1", "file:///a.txt", vec![], SubscriptionOptions::default())
            .await
            .unwrap();

        manager.notify_resource_update(update("file:///a.txt")).await;
        manager.notify_resource_update(update("file:///b.txt")).await;

        let deliveries = sink.deliveries.lock().unwrap();
        assert_eq!(deliveries.len(), 1);
        assert_eq!(deliveries[0].1, "file:///a.txt");
    }

    #[tokio::test]
    async fn s3_scenario_template_subscription_matches_only_matching_segment() {
        let manager = SubscriptionManager::new();
        let sink = Arc::new(RecordingSink {
            client_id: "c1".into(),
            deliveries: StdMutex::new(Vec::new()),
        });
        manager.register_sink(sink.clone()).await;
        manager
            .subscribe(
                "c1",
                "s1",
                "file:///logs/{name}.log",
                vec![],
                SubscriptionOptions::default(),
            )
            .await
            .unwrap();

        manager.notify_resource_update(update("file:///logs/app.log")).await;
        manager.notify_resource_update(update("file:///logs/app.txt")).await;

        let deliveries = sink.deliveries.lock().unwrap();
        assert_eq!(deliveries.len(), 1);
        assert_eq!(deliveries[0].1, "file:///logs/app.log");
    }

    #[tokio::test]
    async fn invariant_7_unsubscribe_by_owner_succeeds_by_other_is_authorization_error() {
        let manager = SubscriptionManager::new();
        let id = manager
            .subscribe("owner", "s1", "file:///a.txt", vec![], SubscriptionOptions::default())
            .await
            .unwrap();

        let err = manager.unsubscribe("intruder", &id).await.unwrap_err();
        assert_eq!(err.code.code(), mcpmux_core::McpErrorCode::AuthorizationError.code());
        assert_eq!(manager.subscription_count().await, 1);

        manager.unsubscribe("owner", &id).await.unwrap();
        assert_eq!(manager.subscription_count().await, 0);
    }

    #[tokio::test]
    async fn filter_on_mime_type_excludes_non_matching_updates() {
        let manager = SubscriptionManager::new();
        let sink = Arc::new(RecordingSink {
            client_id: "c1".into(),
            deliveries: StdMutex::new(Vec::new()),
        });
        manager.register_sink(sink.clone()).await;
        manager
            .subscribe(
                "c1",
                "s1",
                "file:///data/{name}",
                vec![SubscriptionFilter {
                    property: "mimeType".into(),
                    kind: FilterKind::Exact,
                    value: "text/plain".into(),
                }],
                SubscriptionOptions::default(),
            )
            .await
            .unwrap();

        let mut matching = update("file:///data/x");
        matching.mime_type = Some("text/plain".into());
        let mut non_matching = update("file:///data/y");
        non_matching.mime_type = Some("application/json".into());

        manager.notify_resource_update(matching).await;
        manager.notify_resource_update(non_matching).await;

        assert_eq!(sink.deliveries.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn debounce_window_coalesces_a_burst_into_one_delivery() {
        let manager = SubscriptionManager::new();
        let sink = Arc::new(RecordingSink {
            client_id: "c1".into(),
            deliveries: StdMutex::new(Vec::new()),
        });
        manager.register_sink(sink.clone()).await;
        manager
            .subscribe(
                "c1",
                "s1",
                "file:///a.txt",
                vec![],
                SubscriptionOptions {
                    batch_size: 0,
                    debounce_ms: 60_000,
                },
            )
            .await
            .unwrap();

        manager.notify_resource_update(update("file:///a.txt")).await;
        manager.notify_resource_update(update("file:///a.txt")).await;
        manager.notify_resource_update(update("file:///a.txt")).await;

        assert_eq!(sink.deliveries.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn cleanup_expired_subscriptions_drops_stale_clients() {
        let manager = SubscriptionManager::new();
        manager
            .subscribe("c1", "s1", "file:///a.txt", vec![], SubscriptionOptions::default())
            .await
            .unwrap();
        let reaped = manager.cleanup_expired_subscriptions(-1).await;
        assert_eq!(reaped, 1);
        assert_eq!(manager.subscription_count().await, 0);
    }
}
