//! Sampling manager (§4.10): LLM sampling-request queue with
//! human-in-the-loop approval.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use mcpmux_core::{McpError, McpResult};
use mcpmux_protocol::messages::{CreateMessageResult, SamplingContent, SamplingMessage};
use mcpmux_protocol::types::{HumanReview, SamplingRequest, SamplingStatus};
use tokio::sync::RwLock;

/// Per-server human-control policy evaluated against incoming requests.
#[derive(Debug, Clone, Default)]
pub struct HumanControlPolicy {
    /// Human control is active for this server at all.
    pub enabled: bool,
    /// Case-insensitive substrings that silently auto-approve a request.
    pub auto_approve_patterns: Vec<String>,
    /// Case-insensitive substrings that force a human decision.
    pub block_patterns: Vec<String>,
    /// A request above this token budget requires approval. `0` disables
    /// the check.
    pub max_tokens: u32,
    /// Require approval for every request not otherwise auto-approved.
    pub require_approval: bool,
}

/// Executes an approved sampling request against the model it selects.
pub trait SamplingHandler: Send + Sync {
    /// The model-hint name this handler answers to.
    fn name(&self) -> &str;
    /// Produces a completion for `messages`.
    fn execute(&self, messages: &[SamplingMessage], max_tokens: u32) -> McpResult<CreateMessageResult>;
}

struct Entry {
    request: SamplingRequest,
}

/// Tracks sampling requests through `pending → {awaiting_approval, approved,
/// completed, failed}` with human-in-the-loop approval gating.
pub struct SamplingManager {
    requests: RwLock<HashMap<String, Entry>>,
    policies: RwLock<HashMap<String, HumanControlPolicy>>,
    handlers: RwLock<HashMap<String, Arc<dyn SamplingHandler>>>,
    sequence: AtomicU64,
}

impl Default for SamplingManager {
    fn default() -> Self {
        Self::new()
    }
}

impl SamplingManager {
    /// Creates an empty manager.
    #[must_use]
    pub fn new() -> Self {
        Self {
            requests: RwLock::new(HashMap::new()),
            policies: RwLock::new(HashMap::new()),
            handlers: RwLock::new(HashMap::new()),
            sequence: AtomicU64::new(0),
        }
    }

    /// Sets the human-control policy for `server`.
    pub async fn set_policy(&self, server: &str, policy: HumanControlPolicy) {
        self.policies.write().await.insert(server.to_owned(), policy);
    }

    /// Registers a handler, keyed by the model-hint name it answers to.
    pub async fn register_handler(&self, handler: Arc<dyn SamplingHandler>) {
        self.handlers.write().await.insert(handler.name().to_owned(), handler);
    }

    /// Submits a request. Assigns an id, stores it with status `pending`,
    /// then evaluates the server's human-control policy per §4.10's
    /// four-step decision ladder.
    pub async fn submit(&self, server_name: &str, mut request: SamplingRequest) -> String {
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
        let id = format!("sample_{seq}");
        request.id = id.clone();
        request.server_name = server_name.to_owned();
        request.status = SamplingStatus::Pending;

        let policy = self.policies.read().await.get(server_name).cloned();
        if let Some(policy) = policy {
            if policy.enabled {
                request.status = evaluate_policy(&policy, &request);
            }
        }

        self.requests.write().await.insert(id.clone(), Entry { request });
        id
    }

    /// Approves a pending/awaiting-approval request, recording the human
    /// reviewer's decision.
    pub async fn approve(&self, id: &str, reviewer: &str, comments: Option<String>) -> McpResult<()> {
        let mut requests = self.requests.write().await;
        let entry = requests.get_mut(id).ok_or_else(|| unknown_request_error(id))?;
        if entry.request.status.is_terminal() {
            return Err(McpError::state_error("approve", "non-terminal"));
        }
        entry.request.status = SamplingStatus::Approved;
        entry.request.human_review = Some(HumanReview {
            reviewer: reviewer.to_owned(),
            review_time: mcpmux_transport::now_unix(),
            comments,
        });
        Ok(())
    }

    /// Rejects a request awaiting human approval. Terminal. Per the status
    /// lattice, only `awaiting_approval` requests may be rejected.
    pub async fn reject(&self, id: &str, reviewer: &str, comments: Option<String>) -> McpResult<()> {
        let mut requests = self.requests.write().await;
        let entry = requests.get_mut(id).ok_or_else(|| unknown_request_error(id))?;
        if entry.request.status != SamplingStatus::AwaitingApproval {
            return Err(McpError::state_error("reject", "awaiting_approval"));
        }
        entry.request.status = SamplingStatus::Rejected;
        entry.request.human_review = Some(HumanReview {
            reviewer: reviewer.to_owned(),
            review_time: mcpmux_transport::now_unix(),
            comments,
        });
        Ok(())
    }

    /// Executes an approved (or auto-approved-pending) request: selects a
    /// handler by the request's first model hint with a registered handler,
    /// falling back to any registered handler. Sets `completed`/`failed`
    /// accordingly.
    pub async fn process(&self, id: &str) -> McpResult<CreateMessageResult> {
        let (request, handler) = {
            let requests = self.requests.read().await;
            let entry = requests.get(id).ok_or_else(|| unknown_request_error(id))?;
            if !matches!(
                entry.request.status,
                SamplingStatus::Pending | SamplingStatus::Approved
            ) {
                return Err(McpError::state_error("processSamplingRequest", "approved"));
            }
            let handlers = self.handlers.read().await;
            let handler = select_handler(&entry.request, &handlers)
                .ok_or_else(|| McpError::execution_error("no sampling handler registered"))?;
            (entry.request.clone(), handler)
        };

        match handler.execute(&request.messages, request.max_tokens.unwrap_or(0)) {
            Ok(result) => {
                self.mark_terminal(id, SamplingStatus::Completed).await;
                Ok(result)
            }
            Err(err) => {
                self.mark_terminal(id, SamplingStatus::Failed).await;
                Err(err)
            }
        }
    }

    async fn mark_terminal(&self, id: &str, status: SamplingStatus) {
        if let Some(entry) = self.requests.write().await.get_mut(id) {
            entry.request.status = status;
        }
    }

    /// Records a completion produced outside [`Self::process`] — e.g. a
    /// request proxied to a downstream client's own sampling capability
    /// rather than executed by a locally registered [`SamplingHandler`].
    /// Only valid from `pending`/`approved`, mirroring `process`.
    pub async fn complete_externally(&self, id: &str) -> McpResult<()> {
        let mut requests = self.requests.write().await;
        let entry = requests.get_mut(id).ok_or_else(|| unknown_request_error(id))?;
        if !matches!(entry.request.status, SamplingStatus::Pending | SamplingStatus::Approved) {
            return Err(McpError::state_error("completeExternally", "approved"));
        }
        entry.request.status = SamplingStatus::Completed;
        Ok(())
    }

    /// Records an externally-observed failure, mirroring [`Self::complete_externally`].
    pub async fn fail_externally(&self, id: &str) -> McpResult<()> {
        let mut requests = self.requests.write().await;
        let entry = requests.get_mut(id).ok_or_else(|| unknown_request_error(id))?;
        if !matches!(entry.request.status, SamplingStatus::Pending | SamplingStatus::Approved) {
            return Err(McpError::state_error("failExternally", "approved"));
        }
        entry.request.status = SamplingStatus::Failed;
        Ok(())
    }

    /// The current state of a tracked request.
    pub async fn get(&self, id: &str) -> Option<SamplingRequest> {
        self.requests.read().await.get(id).map(|e| e.request.clone())
    }

    /// Drops terminal requests older than `max_age_secs` (measured from the
    /// human review time, or from now if never reviewed). Returns how many
    /// were reaped.
    pub async fn cleanup_old_requests(&self, max_age_secs: i64) -> usize {
        let cutoff = mcpmux_transport::now_unix() - max_age_secs;
        let mut requests = self.requests.write().await;
        let before = requests.len();
        requests.retain(|_, entry| {
            if !entry.request.status.is_terminal() {
                return true;
            }
            let reviewed_at = entry.request.human_review.as_ref().map(|r| r.review_time);
            reviewed_at.is_none_or(|t| t >= cutoff)
        });
        before - requests.len()
    }
}

fn unknown_request_error(id: &str) -> McpError {
    McpError::resource_not_found(id)
}

/// Four-step decision ladder from §4.10.
fn evaluate_policy(policy: &HumanControlPolicy, request: &SamplingRequest) -> SamplingStatus {
    let text = request_text(request).to_lowercase();

    if policy
        .auto_approve_patterns
        .iter()
        .any(|p| text.contains(&p.to_lowercase()))
    {
        return SamplingStatus::Approved;
    }
    if policy
        .block_patterns
        .iter()
        .any(|p| text.contains(&p.to_lowercase()))
    {
        return SamplingStatus::AwaitingApproval;
    }
    if policy.max_tokens > 0 && request.max_tokens.is_some_and(|t| t > policy.max_tokens) {
        return SamplingStatus::AwaitingApproval;
    }
    if policy.require_approval {
        return SamplingStatus::AwaitingApproval;
    }
    SamplingStatus::Pending
}

fn request_text(request: &SamplingRequest) -> String {
    request
        .messages
        .iter()
        .filter_map(|m| match &m.content {
            SamplingContent::Text { text } => Some(text.as_str()),
            SamplingContent::Image { .. } => None,
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn select_handler(
    request: &SamplingRequest,
    handlers: &HashMap<String, Arc<dyn SamplingHandler>>,
) -> Option<Arc<dyn SamplingHandler>> {
    for hint in &request.model_prefs.hints {
        if let Some(handler) = handlers.get(hint) {
            return Some(handler.clone());
        }
    }
    handlers.values().next().cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use mcpmux_protocol::types::Role;

    fn request_with_text(text: &str) -> SamplingRequest {
        SamplingRequest {
            id: String::new(),
            server_name: String::new(),
            messages: vec![SamplingMessage {
                role: Role::User,
                content: SamplingContent::Text { text: text.to_owned() },
            }],
            model_prefs: Default::default(),
            max_tokens: None,
            stop_sequence: Vec::new(),
            temperature: None,
            context: None,
            status: SamplingStatus::Pending,
            human_review: None,
        }
    }

    struct EchoHandler;
    impl SamplingHandler for EchoHandler {
        fn name(&self) -> &str {
            "echo"
        }
        fn execute(&self, messages: &[SamplingMessage], _max_tokens: u32) -> McpResult<CreateMessageResult> {
            let text = match &messages[0].content {
                SamplingContent::Text { text } => text.clone(),
                SamplingContent::Image { .. } => String::new(),
            };
            Ok(CreateMessageResult::text(text, "echo-model"))
        }
    }

    #[tokio::test]
    async fn s6_scenario_blocked_pattern_requires_approval_then_processes() {
        let manager = SamplingManager::new();
        manager
            .set_policy(
                "srv",
                HumanControlPolicy {
                    enabled: true,
                    require_approval: true,
                    block_patterns: vec!["delete".into()],
                    ..Default::default()
                },
            )
            .await;
        manager.register_handler(Arc::new(EchoHandler)).await;

        let id = manager.submit("srv", request_with_text("please delete")).await;
        let request = manager.get(&id).await.unwrap();
        assert_eq!(request.status, SamplingStatus::AwaitingApproval);

        let err = manager.process(&id).await.unwrap_err();
        assert_eq!(err.code.code(), mcpmux_core::McpErrorCode::StateError.code());

        manager.approve(&id, "alice", None).await.unwrap();
        let result = manager.process(&id).await.unwrap();
        assert_eq!(result.text_content(), Some("please delete"));

        let request = manager.get(&id).await.unwrap();
        assert_eq!(request.status, SamplingStatus::Completed);
    }

    #[tokio::test]
    async fn auto_approve_pattern_bypasses_human_review() {
        let manager = SamplingManager::new();
        manager
            .set_policy(
                "srv",
                HumanControlPolicy {
                    enabled: true,
                    auto_approve_patterns: vec!["hello".into()],
                    require_approval: true,
                    ..Default::default()
                },
            )
            .await;
        let id = manager.submit("srv", request_with_text("hello there")).await;
        let request = manager.get(&id).await.unwrap();
        assert_eq!(request.status, SamplingStatus::Approved);
    }

    #[tokio::test]
    async fn oversized_max_tokens_requires_approval() {
        let manager = SamplingManager::new();
        manager
            .set_policy(
                "srv",
                HumanControlPolicy {
                    enabled: true,
                    max_tokens: 100,
                    ..Default::default()
                },
            )
            .await;
        let mut req = request_with_text("hi");
        req.max_tokens = Some(500);
        let id = manager.submit("srv", req).await;
        let request = manager.get(&id).await.unwrap();
        assert_eq!(request.status, SamplingStatus::AwaitingApproval);
    }

    #[tokio::test]
    async fn reject_is_terminal_and_blocks_further_transitions() {
        let manager = SamplingManager::new();
        manager
            .set_policy(
                "srv",
                HumanControlPolicy {
                    enabled: true,
                    require_approval: true,
                    ..Default::default()
                },
            )
            .await;
        let id = manager.submit("srv", request_with_text("hi")).await;
        assert_eq!(
            manager.get(&id).await.unwrap().status,
            SamplingStatus::AwaitingApproval
        );
        manager.reject(&id, "bob", Some("no".into())).await.unwrap();
        let err = manager.approve(&id, "bob", None).await.unwrap_err();
        assert_eq!(err.code.code(), mcpmux_core::McpErrorCode::StateError.code());
    }

    #[tokio::test]
    async fn reject_from_pending_is_rejected_by_the_lattice() {
        let manager = SamplingManager::new();
        let id = manager.submit("srv", request_with_text("hi")).await;
        let err = manager.reject(&id, "bob", None).await.unwrap_err();
        assert_eq!(err.code.code(), mcpmux_core::McpErrorCode::StateError.code());
    }

    #[tokio::test]
    async fn handler_selection_prefers_model_hint() {
        let manager = SamplingManager::new();
        manager.register_handler(Arc::new(EchoHandler)).await;
        let mut req = request_with_text("hi");
        req.model_prefs.hints = vec!["echo".into()];
        let id = manager.submit("srv", req).await;
        manager.approve(&id, "r", None).await.unwrap();
        let result = manager.process(&id).await.unwrap();
        assert_eq!(result.model, "echo-model");
    }
}
