//! LLM client: provider registry, response cache, single-flight coalescing.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Instant;

use common_config::GenerationConfig;
use common_error::{RequelError, RequelResult};
use tokio::sync::OnceCell;
use tracing::{debug, warn};

use crate::cache::{CacheStats, LruCache};
use crate::fingerprint::{clamp_temperature, request_fingerprint};
use crate::provider::{LlmProvider, LlmResponse};

/// Result of one client generation call.
#[derive(Debug, Clone)]
pub struct GenerateResult {
    /// The (possibly cached) provider response.
    pub response: LlmResponse,
    /// True when the response came from the cache or a coalesced in-flight
    /// call rather than a fresh upstream request.
    pub cache_hit: bool,
}

/// Shared slot for one in-flight upstream call. Errors are carried as
/// strings so waiters can share them.
type InflightCell = Arc<OnceCell<Result<LlmResponse, String>>>;

/// Client over registered providers with fingerprint-keyed caching.
///
/// Concurrent calls with the same fingerprint coalesce: the first executes
/// the upstream request, the rest suspend on its completion and share the
/// result.
pub struct LlmClient {
    providers: RwLock<HashMap<String, Arc<dyn LlmProvider>>>,
    active: RwLock<Option<String>>,
    cache: Mutex<LruCache>,
    inflight: tokio::sync::Mutex<HashMap<String, InflightCell>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl LlmClient {
    /// Client with a response cache of the given capacity.
    pub fn new(cache_size: usize) -> Self {
        Self {
            providers: RwLock::new(HashMap::new()),
            active: RwLock::new(None),
            cache: Mutex::new(LruCache::new(cache_size)),
            inflight: tokio::sync::Mutex::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Register a provider. The first registration becomes the active
    /// provider.
    pub fn register_provider(&self, provider: Arc<dyn LlmProvider>) {
        let name = provider.name().to_string();
        self.providers
            .write()
            .expect("provider registry lock poisoned")
            .insert(name.clone(), provider);

        let mut active = self.active.write().expect("active provider lock poisoned");
        if active.is_none() {
            *active = Some(name);
        }
    }

    /// Select the active provider by name.
    pub fn set_provider(&self, name: &str) -> RequelResult<()> {
        let registry = self
            .providers
            .read()
            .expect("provider registry lock poisoned");
        if !registry.contains_key(name) {
            return Err(RequelError::config(format!("unknown provider {name}")));
        }
        *self.active.write().expect("active provider lock poisoned") = Some(name.to_string());
        Ok(())
    }

    fn active_provider(&self) -> RequelResult<Arc<dyn LlmProvider>> {
        let active = self
            .active
            .read()
            .expect("active provider lock poisoned")
            .clone()
            .ok_or_else(|| RequelError::provider_unavailable("no provider registered"))?;

        self.providers
            .read()
            .expect("provider registry lock poisoned")
            .get(&active)
            .cloned()
            .ok_or_else(|| RequelError::provider_unavailable(format!("provider {active} missing")))
    }

    /// Generate rewrite candidates for a prompt.
    ///
    /// Probes provider availability, consults the cache, coalesces with any
    /// identical in-flight request, and post-processes raw candidates down to
    /// their SQL bodies.
    pub async fn generate(
        &self,
        prompt: &str,
        config: &GenerationConfig,
    ) -> RequelResult<GenerateResult> {
        let provider = self.active_provider()?;
        if !provider.available().await {
            return Err(RequelError::provider_unavailable(format!(
                "provider {} failed its health probe",
                provider.name()
            )));
        }

        let mut config = config.clone();
        config.temperature = clamp_temperature(config.temperature);
        let key = request_fingerprint(provider.name(), prompt, &config);

        if let Some(response) = self
            .cache
            .lock()
            .expect("response cache lock poisoned")
            .get(&key)
        {
            self.hits.fetch_add(1, Ordering::Relaxed);
            debug!(fingerprint = %key, "response cache hit");
            return Ok(GenerateResult {
                response,
                cache_hit: true,
            });
        }

        let cell: InflightCell = {
            let mut inflight = self.inflight.lock().await;
            inflight.entry(key.clone()).or_default().clone()
        };

        let mut leader = false;
        let outcome = cell
            .get_or_init(|| async {
                leader = true;
                self.misses.fetch_add(1, Ordering::Relaxed);
                let started = Instant::now();
                match provider.generate(prompt, &config).await {
                    Ok(mut response) => {
                        response.latency_ms = started.elapsed().as_secs_f64() * 1000.0;
                        response.candidates = response
                            .candidates
                            .iter()
                            .map(|candidate| extract_sql(candidate))
                            .collect();
                        Ok(response)
                    }
                    Err(error) => {
                        warn!(provider = provider.name(), %error, "generation failed");
                        Err(error.to_string())
                    }
                }
            })
            .await
            .clone();

        if leader {
            if let Ok(response) = &outcome {
                if response.success {
                    self.cache
                        .lock()
                        .expect("response cache lock poisoned")
                        .insert(key.clone(), response.clone());
                }
            }
            self.inflight.lock().await.remove(&key);
        } else {
            self.hits.fetch_add(1, Ordering::Relaxed);
            debug!(fingerprint = %key, "coalesced with in-flight request");
        }

        match outcome {
            Ok(response) => Ok(GenerateResult {
                response,
                cache_hit: !leader,
            }),
            Err(message) => Err(RequelError::provider(message)),
        }
    }

    /// Cache counters.
    pub fn cache_stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            size: self
                .cache
                .lock()
                .expect("response cache lock poisoned")
                .len(),
        }
    }

    /// Drop cached responses and zero the counters.
    pub fn reset_cache(&self) {
        self.cache
            .lock()
            .expect("response cache lock poisoned")
            .clear();
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
    }
}

/// Pull the SQL body out of a raw candidate: a ```sql fence wins, then any
/// fence, then the trimmed text itself.
fn extract_sql(text: &str) -> String {
    if let Some(start) = text.find("```sql") {
        let body = &text[start + 6..];
        if let Some(end) = body.find("```") {
            return body[..end].trim().to_string();
        }
    }
    if let Some(start) = text.find("```") {
        let body = &text[start + 3..];
        if let Some(end) = body.find("```") {
            return body[..end].trim().to_string();
        }
    }
    text.trim().to_string()
}
