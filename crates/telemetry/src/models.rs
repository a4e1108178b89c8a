//! Model identifiers, name resolution, and the live model-info cache.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use std::time::{Duration, Instant};

use ironloom_core::{ModelInfo, Provider, ProviderError};
use tracing::debug;

pub const MODEL_HAIKU: &str = "anthropic/claude-haiku-4-5";
pub const MODEL_SONNET: &str = "anthropic/claude-sonnet-4-6";
pub const MODEL_OPUS: &str = "anthropic/claude-opus-4-6";

/// Output token limit for models nobody has described.
pub const DEFAULT_MAX_TOKENS: u32 = 8192;

/// Context window assumed for models absent from the cache.
pub const DEFAULT_CONTEXT_WINDOW: u64 = 200_000;

const CACHE_TTL: Duration = Duration::from_secs(15 * 60);

/// Map a user-facing model name to a full provider model id.
///
/// Short names (`haiku`, `sonnet`, `opus`) map to the current first-party
/// ids, `auto` selects the router, and anything with a `/` is taken as a
/// full id. Empty or unrecognised names resolve to `fallback`.
pub fn resolve_model(name: &str, fallback: &str) -> String {
    match name {
        "" => fallback.to_string(),
        "haiku" => MODEL_HAIKU.to_string(),
        "sonnet" => MODEL_SONNET.to_string(),
        "opus" => MODEL_OPUS.to_string(),
        "auto" => "openrouter/auto".to_string(),
        full if full.contains('/') => full.to_string(),
        _ => fallback.to_string(),
    }
}

#[derive(Default)]
struct CacheState {
    models: Vec<ModelInfo>,
    by_id: HashMap<String, usize>,
    fetched_at: Option<Instant>,
}

/// Cached model listing, shared by every concurrently running agent.
///
/// Reads never hand out references into the cache; everything is copied
/// out under a short read lock.
pub struct ModelCache {
    state: RwLock<CacheState>,
    ttl: Duration,
}

impl ModelCache {
    pub fn new() -> Self {
        Self::with_ttl(CACHE_TTL)
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            state: RwLock::new(CacheState::default()),
            ttl,
        }
    }

    pub fn get(&self, id: &str) -> Option<ModelInfo> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        state.by_id.get(id).map(|&i| state.models[i].clone())
    }

    /// Empty, never fetched, or older than the TTL.
    pub fn is_stale(&self) -> bool {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        match state.fetched_at {
            Some(at) => state.models.is_empty() || at.elapsed() > self.ttl,
            None => true,
        }
    }

    /// Replace the cached listing.
    pub fn update(&self, models: Vec<ModelInfo>) {
        let by_id = models
            .iter()
            .enumerate()
            .map(|(i, m)| (m.id.clone(), i))
            .collect();
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        *state = CacheState {
            models,
            by_id,
            fetched_at: Some(Instant::now()),
        };
    }

    /// Snapshot of every cached model.
    pub fn all(&self) -> Vec<ModelInfo> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .models
            .clone()
    }

    pub fn len(&self) -> usize {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .models
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Fetch the listing from `provider` if the cache is stale.
    ///
    /// Returns the number of cached models afterwards.
    pub async fn refresh_if_stale(&self, provider: &dyn Provider) -> Result<usize, ProviderError> {
        if !self.is_stale() {
            return Ok(self.len());
        }
        let models = provider.list_models().await?;
        debug!(count = models.len(), provider = provider.name(), "Refreshed model cache");
        self.update(models);
        Ok(self.len())
    }

    /// Output token limit for `model`.
    pub fn max_tokens_for_model(&self, model: &str) -> u32 {
        match model {
            MODEL_OPUS => 32_000,
            MODEL_SONNET => 16_000,
            MODEL_HAIKU => 8192,
            other => self
                .get(other)
                .and_then(|info| info.top_provider)
                .and_then(|p| p.max_completion_tokens)
                .filter(|&n| n > 0)
                .map(|n| u32::try_from(n).unwrap_or(u32::MAX))
                .unwrap_or(DEFAULT_MAX_TOKENS),
        }
    }

    /// Context window for `model`.
    pub fn context_window(&self, model: &str) -> u64 {
        self.get(model)
            .map(|info| info.context_length)
            .filter(|&n| n > 0)
            .unwrap_or(DEFAULT_CONTEXT_WINDOW)
    }
}

impl Default for ModelCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use ironloom_core::provider::TopProvider;
    use ironloom_core::{CompletionRequest, CompletionResponse};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn model(id: &str, max_completion: Option<u64>) -> ModelInfo {
        ModelInfo {
            id: id.into(),
            context_length: 128_000,
            top_provider: Some(TopProvider {
                max_completion_tokens: max_completion,
            }),
            ..ModelInfo::default()
        }
    }

    #[test]
    fn resolve_short_and_full_names() {
        assert_eq!(resolve_model("haiku", MODEL_SONNET), MODEL_HAIKU);
        assert_eq!(resolve_model("opus", MODEL_SONNET), MODEL_OPUS);
        assert_eq!(resolve_model("auto", MODEL_SONNET), "openrouter/auto");
        assert_eq!(resolve_model("openai/gpt-4o", MODEL_SONNET), "openai/gpt-4o");
        assert_eq!(resolve_model("", MODEL_HAIKU), MODEL_HAIKU);
        assert_eq!(resolve_model("gpt4", MODEL_HAIKU), MODEL_HAIKU);
    }

    #[test]
    fn max_tokens_table_then_cache_then_default() {
        let cache = ModelCache::new();
        assert_eq!(cache.max_tokens_for_model(MODEL_OPUS), 32_000);
        assert_eq!(cache.max_tokens_for_model(MODEL_SONNET), 16_000);
        assert_eq!(cache.max_tokens_for_model("openai/gpt-4o"), DEFAULT_MAX_TOKENS);

        cache.update(vec![model("openai/gpt-4o", Some(4096)), model("x/zero", Some(0))]);
        assert_eq!(cache.max_tokens_for_model("openai/gpt-4o"), 4096);
        assert_eq!(cache.max_tokens_for_model("x/zero"), DEFAULT_MAX_TOKENS);
        assert_eq!(cache.context_window("openai/gpt-4o"), 128_000);
        assert_eq!(cache.context_window("missing/model"), DEFAULT_CONTEXT_WINDOW);
    }

    #[test]
    fn staleness() {
        let cache = ModelCache::new();
        assert!(cache.is_stale());
        cache.update(vec![model("a/b", None)]);
        assert!(!cache.is_stale());

        let expired = ModelCache::with_ttl(Duration::ZERO);
        expired.update(vec![model("a/b", None)]);
        std::thread::sleep(Duration::from_millis(2));
        assert!(expired.is_stale());

        let empty = ModelCache::new();
        empty.update(vec![]);
        assert!(empty.is_stale());
    }

    #[test]
    fn snapshots_are_copies() {
        let cache = ModelCache::new();
        cache.update(vec![model("a/b", None)]);
        let mut snapshot = cache.all();
        snapshot.clear();
        assert_eq!(cache.len(), 1);
        assert!(cache.get("a/b").is_some());
    }

    struct ListingProvider {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Provider for ListingProvider {
        fn name(&self) -> &str {
            "listing"
        }

        async fn complete(
            &self,
            _request: CompletionRequest,
        ) -> Result<CompletionResponse, ProviderError> {
            Err(ProviderError::NotConfigured("unused".into()))
        }

        async fn list_models(&self) -> Result<Vec<ModelInfo>, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![model("a/b", None), model("c/d", None)])
        }
    }

    #[tokio::test]
    async fn refresh_only_when_stale() {
        let cache = ModelCache::new();
        let provider = ListingProvider {
            calls: AtomicUsize::new(0),
        };
        assert_eq!(cache.refresh_if_stale(&provider).await.unwrap(), 2);
        assert_eq!(cache.refresh_if_stale(&provider).await.unwrap(), 2);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }
}
