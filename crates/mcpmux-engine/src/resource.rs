//! Resource manager (§4.8): registry, content cache, search, prompt
//! embedding, and pluggable content transformation.

use std::collections::HashMap;
use std::sync::Arc;

use mcpmux_core::{McpError, McpResult};
use mcpmux_protocol::types::{
    Content, EmbeddingStrategy, Resource, ResourceCache, ResourceContent, ResourceContentMeta,
    ResourceEmbedding,
};
use sha2::{Digest, Sha256};
use tokio::sync::RwLock;

const DEFAULT_SUMMARY_LENGTH: usize = 200;

struct CacheEntry {
    inserted_at: i64,
    expires_at: Option<i64>,
    access_count: u64,
    last_access: i64,
}

struct RegisteredResource {
    resource: Resource,
    content_meta: ResourceContentMeta,
}

/// Equality/substring filters accepted by [`ResourceManager::search`].
#[derive(Debug, Clone, Default)]
pub struct ResourceSearchFilter {
    /// Substring matched against `name + description + tags`.
    pub query: Option<String>,
    /// Exact MIME type match.
    pub mime_type: Option<String>,
    /// A tag that must be present in `metadata.tags` (comma-separated).
    pub tag: Option<String>,
    /// Minimum body size, inclusive.
    pub min_size: Option<u64>,
    /// Maximum body size, inclusive.
    pub max_size: Option<u64>,
}

/// Converts a resource's body into an alternate representation.
///
/// Each built-in transformer (summary/markdown/json) implements this;
/// callers may register additional transformers by name.
pub trait ResourceTransformer: Send + Sync {
    /// The format name this transformer produces, e.g. `"summary"`.
    fn format(&self) -> &str;
    /// Produces the transformed body, recomputing the hash and bumping
    /// `modified` on the returned resource content.
    fn transform(&self, resource: &Resource, body: &str) -> String;
}

/// Truncates the body to a configurable length.
pub struct SummaryTransformer {
    max_len: usize,
}

impl SummaryTransformer {
    /// Creates a transformer truncating at `max_len` characters (default 200).
    #[must_use]
    pub fn new(max_len: usize) -> Self {
        Self { max_len }
    }
}

impl Default for SummaryTransformer {
    fn default() -> Self {
        Self::new(DEFAULT_SUMMARY_LENGTH)
    }
}

impl ResourceTransformer for SummaryTransformer {
    fn format(&self) -> &str {
        "summary"
    }
    fn transform(&self, _resource: &Resource, body: &str) -> String {
        if body.chars().count() <= self.max_len {
            body.to_owned()
        } else {
            let truncated: String = body.chars().take(self.max_len).collect();
            format!("{truncated}…")
        }
    }
}

/// Wraps the body in a fenced markdown code block.
pub struct MarkdownTransformer;

impl ResourceTransformer for MarkdownTransformer {
    fn format(&self) -> &str {
        "markdown"
    }
    fn transform(&self, resource: &Resource, body: &str) -> String {
        let lang = resource
            .mime_type
            .as_deref()
            .and_then(|m| m.split('/').next_back())
            .unwrap_or("text");
        format!("```{lang}\n{body}\n```")
    }
}

/// Wraps the body and resource metadata as a JSON document.
pub struct JsonTransformer;

impl ResourceTransformer for JsonTransformer {
    fn format(&self) -> &str {
        "json"
    }
    fn transform(&self, resource: &Resource, body: &str) -> String {
        serde_json::json!({
            "uri": resource.uri,
            "mimeType": resource.mime_type,
            "body": body,
        })
        .to_string()
    }
}

/// Owns the resource registry, its content cache, and pluggable
/// transformers; evaluates embedding policy for prompt insertion.
pub struct ResourceManager {
    resources: RwLock<HashMap<String, RegisteredResource>>,
    cache: RwLock<HashMap<String, CacheEntry>>,
    transformers: RwLock<HashMap<String, Arc<dyn ResourceTransformer>>>,
}

impl Default for ResourceManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceManager {
    /// Creates a manager with the built-in summary/markdown/json
    /// transformers already registered.
    #[must_use]
    pub fn new() -> Self {
        Self {
            resources: RwLock::new(HashMap::new()),
            cache: RwLock::new(HashMap::new()),
            transformers: RwLock::new(HashMap::new()),
        }
    }

    /// Registers (or replaces) a named transformer.
    pub async fn register_transformer(&self, transformer: Arc<dyn ResourceTransformer>) {
        self.transformers
            .write()
            .await
            .insert(transformer.format().to_owned(), transformer);
    }

    /// Adds `resource` under its URI. Auto-derives `mimeType` from the URI
    /// extension when absent, and auto-generates `content.hash` from `body`
    /// when the resource doesn't already carry one. If `cache.enabled`, a
    /// parallel cache entry is created with `expiresAt = now + ttl`.
    pub async fn add_resource(&self, mut resource: Resource, body: Option<&str>) -> McpResult<()> {
        if resource.uri.is_empty() {
            return Err(McpError::validation_error("uri", "resource uri must not be empty"));
        }

        if resource.mime_type.is_none() {
            resource.mime_type = mime_from_extension(&resource.uri);
        }

        let hash = body.map(content_hash);
        let content_meta = ResourceContentMeta { hash };

        let now = mcpmux_transport::now_unix();
        resource.modified = now;
        if resource.created == 0 {
            resource.created = now;
        }

        let should_cache = resource.cache.as_ref().is_some_and(|c| c.enabled);
        let cache_entry = should_cache.then(|| {
            let ttl = resource.cache.as_ref().map_or(0, |c| c.ttl);
            CacheEntry {
                inserted_at: now,
                expires_at: (ttl > 0).then(|| now + ttl as i64),
                access_count: 0,
                last_access: now,
            }
        });

        let uri = resource.uri.clone();
        self.resources.write().await.insert(
            uri.clone(),
            RegisteredResource {
                resource,
                content_meta,
            },
        );
        if let Some(entry) = cache_entry {
            self.cache.write().await.insert(uri, entry);
        }
        Ok(())
    }

    /// Reads a resource by URI. Checks the cache first (bumping
    /// `accessCount`/`lastAccess`); a lazily-discovered expired entry is
    /// removed before falling through to the registry.
    pub async fn get_resource(&self, uri: &str) -> McpResult<Resource> {
        self.evict_if_expired(uri).await;
        if let Some(entry) = self.cache.write().await.get_mut(uri) {
            entry.access_count += 1;
            entry.last_access = mcpmux_transport::now_unix();
        }
        let mut resources = self.resources.write().await;
        let registered = resources
            .get_mut(uri)
            .ok_or_else(|| McpError::resource_not_found(uri))?;
        registered.resource.accessed = Some(mcpmux_transport::now_unix());
        Ok(registered.resource.clone())
    }

    /// The content hash recorded for a resource, if any.
    pub async fn content_hash(&self, uri: &str) -> Option<String> {
        self.resources
            .read()
            .await
            .get(uri)
            .and_then(|r| r.content_meta.hash.clone())
    }

    async fn evict_if_expired(&self, uri: &str) {
        let now = mcpmux_transport::now_unix();
        let expired = self
            .cache
            .read()
            .await
            .get(uri)
            .is_some_and(|e| e.expires_at.is_some_and(|exp| exp <= now));
        if expired {
            self.cache.write().await.remove(uri);
        }
    }

    /// Removes every cache entry past its `expiresAt`. Returns how many were
    /// reaped.
    pub async fn cleanup_cache(&self) -> usize {
        let now = mcpmux_transport::now_unix();
        let mut cache = self.cache.write().await;
        let before = cache.len();
        cache.retain(|_, entry| entry.expires_at.is_none_or(|exp| exp > now));
        before - cache.len()
    }

    /// Removes a resource from the registry and its cache entry, if any.
    pub async fn remove_resource(&self, uri: &str) {
        self.resources.write().await.remove(uri);
        self.cache.write().await.remove(uri);
    }

    /// Substring-matches `name + description + tags` and applies equality
    /// filters over `mimeType`/`tag`/`minSize`/`maxSize`.
    pub async fn search(&self, filter: &ResourceSearchFilter) -> Vec<Resource> {
        self.resources
            .read()
            .await
            .values()
            .map(|r| &r.resource)
            .filter(|r| matches_query(r, filter.query.as_deref()))
            .filter(|r| filter.mime_type.as_deref().is_none_or(|m| r.mime_type.as_deref() == Some(m)))
            .filter(|r| filter.tag.as_deref().is_none_or(|t| has_tag(r, t)))
            .filter(|r| filter.min_size.is_none_or(|min| r.size >= min))
            .filter(|r| filter.max_size.is_none_or(|max| r.size <= max))
            .cloned()
            .collect()
    }

    /// Embeds a resource body into a prompt per `strategy`. For `inline`, if
    /// the body exceeds `embedding.maxSize`, falls back to
    /// `embedding.fallback` (or silently downgrades to `reference` if no
    /// fallback is configured).
    pub async fn embed_resource_in_prompt(
        &self,
        uri: &str,
        strategy: EmbeddingStrategy,
        body: &str,
    ) -> McpResult<Content> {
        let resources = self.resources.read().await;
        let registered = resources
            .get(uri)
            .ok_or_else(|| McpError::resource_not_found(uri))?;
        let resource = &registered.resource;

        let effective_strategy = match strategy {
            EmbeddingStrategy::Inline => {
                let max_size = resource.embedding.as_ref().and_then(|e| e.max_size);
                if max_size.is_some_and(|max| resource.size > max) {
                    resource
                        .embedding
                        .as_ref()
                        .and_then(|e| e.fallback)
                        .unwrap_or(EmbeddingStrategy::Reference)
                } else {
                    EmbeddingStrategy::Inline
                }
            }
            other => other,
        };

        let content = match effective_strategy {
            EmbeddingStrategy::Inline => ResourceContent {
                uri: resource.uri.clone(),
                mime_type: resource.mime_type.clone(),
                text: Some(body.to_owned()),
                blob: None,
            },
            EmbeddingStrategy::Reference => ResourceContent {
                uri: resource.uri.clone(),
                mime_type: resource.mime_type.clone(),
                text: None,
                blob: None,
            },
            EmbeddingStrategy::Summary => {
                let summary = SummaryTransformer::default().transform(resource, body);
                ResourceContent {
                    uri: resource.uri.clone(),
                    mime_type: resource.mime_type.clone(),
                    text: Some(summary),
                    blob: None,
                }
            }
        };

        Ok(Content::Resource { resource: content })
    }

    /// Runs the named transformer (`"summary"`, `"markdown"`, `"json"`, or a
    /// registered custom one) against `body`, recomputing the content hash.
    pub async fn transform_resource(
        &self,
        uri: &str,
        format: &str,
        body: &str,
    ) -> McpResult<(String, ResourceContentMeta)> {
        let resource = self.get_resource(uri).await?;
        let transformer = self.builtin_or_registered(format).await.ok_or_else(|| {
            McpError::validation_error("format", format!("unknown resource transform: {format}"))
        })?;
        let transformed = transformer.transform(&resource, body);
        let meta = ResourceContentMeta {
            hash: Some(content_hash(&transformed)),
        };
        if let Some(registered) = self.resources.write().await.get_mut(uri) {
            registered.resource.modified = mcpmux_transport::now_unix();
        }
        Ok((transformed, meta))
    }

    async fn builtin_or_registered(&self, format: &str) -> Option<Arc<dyn ResourceTransformer>> {
        match format {
            "summary" => Some(Arc::new(SummaryTransformer::default())),
            "markdown" => Some(Arc::new(MarkdownTransformer)),
            "json" => Some(Arc::new(JsonTransformer)),
            other => self.transformers.read().await.get(other).cloned(),
        }
    }
}

fn content_hash(body: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(body.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn mime_from_extension(uri: &str) -> Option<String> {
    let ext = uri.rsplit('.').next()?.to_lowercase();
    let mime = match ext.as_str() {
        "txt" | "log" => "text/plain",
        "json" => "application/json",
        "md" => "text/markdown",
        "html" | "htm" => "text/html",
        "xml" => "application/xml",
        "yaml" | "yml" => "application/yaml",
        "csv" => "text/csv",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        _ => return None,
    };
    Some(mime.to_owned())
}

fn matches_query(resource: &Resource, query: Option<&str>) -> bool {
    let Some(query) = query else {
        return true;
    };
    let query = query.to_lowercase();
    let haystack = format!(
        "{} {} {}",
        resource.name,
        resource.description.as_deref().unwrap_or(""),
        tags_string(resource)
    )
    .to_lowercase();
    haystack.contains(&query)
}

fn has_tag(resource: &Resource, tag: &str) -> bool {
    tags_string(resource).split(',').any(|t| t.trim() == tag)
}

fn tags_string(resource: &Resource) -> String {
    resource
        .metadata
        .get("tags")
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resource(uri: &str) -> Resource {
        Resource {
            uri: uri.to_owned(),
            name: uri.to_owned(),
            description: None,
            mime_type: None,
            size: 0,
            content: None,
            metadata: HashMap::new(),
            annotations: None,
            template: None,
            embedding: None,
            cache: None,
            created: 0,
            modified: 0,
            accessed: None,
        }
    }

    #[tokio::test]
    async fn add_resource_derives_mime_type_and_hash() {
        let manager = ResourceManager::new();
        manager
            .add_resource(resource("file:///logs/app.log"), Some("hello"))
            .await
            .unwrap();
        let read = manager.get_resource("file:///logs/app.log").await.unwrap();
        assert_eq!(read.mime_type.as_deref(), Some("text/plain"));
        assert!(manager.content_hash("file:///logs/app.log").await.is_some());
    }

    #[tokio::test]
    async fn cache_entry_expires_and_is_evicted_lazily() {
        let manager = ResourceManager::new();
        let mut r = resource("file:///a.txt");
        r.cache = Some(ResourceCache { enabled: true, ttl: 0 });
        // ttl=0 means cached with no expiry.
        manager.add_resource(r, None).await.unwrap();
        manager.get_resource("file:///a.txt").await.unwrap();
        assert_eq!(manager.cleanup_cache().await, 0);
    }

    #[tokio::test]
    async fn search_matches_substring_and_mime_filter() {
        let manager = ResourceManager::new();
        let mut r1 = resource("file:///notes/todo.txt");
        r1.name = "todo list".into();
        r1.mime_type = Some("text/plain".into());
        let mut r2 = resource("file:///notes/data.json");
        r2.name = "data blob".into();
        r2.mime_type = Some("application/json".into());
        manager.add_resource(r1, None).await.unwrap();
        manager.add_resource(r2, None).await.unwrap();

        let results = manager
            .search(&ResourceSearchFilter {
                query: Some("todo".into()),
                ..Default::default()
            })
            .await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].uri, "file:///notes/todo.txt");

        let results = manager
            .search(&ResourceSearchFilter {
                mime_type: Some("application/json".into()),
                ..Default::default()
            })
            .await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].uri, "file:///notes/data.json");
    }

    #[tokio::test]
    async fn inline_embedding_falls_back_when_oversized() {
        let manager = ResourceManager::new();
        let mut r = resource("file:///big.txt");
        r.size = 1000;
        r.embedding = Some(ResourceEmbedding {
            max_size: Some(10),
            fallback: Some(EmbeddingStrategy::Summary),
        });
        manager.add_resource(r, None).await.unwrap();

        let content = manager
            .embed_resource_in_prompt("file:///big.txt", EmbeddingStrategy::Inline, "some long body text")
            .await
            .unwrap();
        match content {
            Content::Resource { resource } => assert!(resource.text.is_some()),
            _ => panic!("expected resource content"),
        }
    }

    #[tokio::test]
    async fn inline_embedding_downgrades_silently_with_no_fallback() {
        let manager = ResourceManager::new();
        let mut r = resource("file:///big.txt");
        r.size = 1000;
        r.embedding = Some(ResourceEmbedding {
            max_size: Some(10),
            fallback: None,
        });
        manager.add_resource(r, None).await.unwrap();

        let content = manager
            .embed_resource_in_prompt("file:///big.txt", EmbeddingStrategy::Inline, "body")
            .await
            .unwrap();
        match content {
            Content::Resource { resource } => assert!(resource.text.is_none()),
            _ => panic!("expected resource content"),
        }
    }

    #[tokio::test]
    async fn summary_transformer_truncates_long_bodies() {
        let transformer = SummaryTransformer::new(5);
        let resource = resource("file:///a.txt");
        let out = transformer.transform(&resource, "abcdefghij");
        assert_eq!(out, "abcde…");
    }
}
