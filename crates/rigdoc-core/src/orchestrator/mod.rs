//! Request orchestration
//!
//! Turns a diagnosis or chat request into an answer by walking the providers
//! in attempt order, one at a time, each attempt bounded by the timeout
//! guard. Failures are recorded in order and never escape: when every
//! provider has failed the offline synthesizer answers instead.
//!
//! Settings live in an immutable snapshot that setters replace wholesale, so
//! a request in flight keeps the configuration it started with.

use parking_lot::RwLock;
use serde::{Serialize, Serializer};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::ai::{adapters_from_config, ProviderAdapter, ProviderId};
use crate::cache::{cache_key, CacheStats, ResponseCache};
use crate::config::AppConfig;
use crate::constants;
use crate::error::{ConfigError, ProviderError, RequestError};
use crate::health::{HealthMonitor, MonitorHandle};
use crate::offline;
use crate::timeout::with_timeout;
use crate::types::{
    AttemptContext, AttemptError, ChatMessage, DiagnosisRequest, DiagnosisResult,
    FallbackResult, ProviderHealth, Role,
};

/// Routing settings for the cascade
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrchestratorSettings {
    pub primary: ProviderId,
    pub fallback_enabled: bool,
    /// Limit applied to each provider attempt
    #[serde(rename = "timeout_ms", serialize_with = "as_millis")]
    pub timeout: Duration,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            primary: ProviderId::default(),
            fallback_enabled: true,
            timeout: constants::orchestrator::ATTEMPT_TIMEOUT,
        }
    }
}

impl OrchestratorSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            primary: config.orchestrator.primary,
            fallback_enabled: config.orchestrator.fallback_enabled,
            timeout: config.attempt_timeout(),
        }
    }
}

fn as_millis<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(value.as_millis() as u64)
}

/// What the cache keeps for a provider answer
#[derive(Debug, Clone)]
struct CachedDiagnosis {
    result: DiagnosisResult,
    fallback_used: bool,
}

/// Outcome of walking the attempt order
struct Cascade<T> {
    answer: Option<(ProviderId, T)>,
    errors: Vec<AttemptError>,
    primary: ProviderId,
}

pub struct RequestOrchestrator {
    settings: RwLock<Arc<OrchestratorSettings>>,
    adapters: HashMap<ProviderId, Arc<dyn ProviderAdapter>>,
    monitor: Arc<HealthMonitor>,
    cache: ResponseCache<CachedDiagnosis>,
}

impl RequestOrchestrator {
    /// Assemble from parts; the monitor should probe the same adapters
    pub fn new(
        settings: OrchestratorSettings,
        adapters: Vec<Arc<dyn ProviderAdapter>>,
        monitor: Arc<HealthMonitor>,
        cache_capacity: usize,
        cache_ttl: Duration,
    ) -> Self {
        let adapters = adapters.into_iter().map(|a| (a.id(), a)).collect();
        Self {
            settings: RwLock::new(Arc::new(settings)),
            adapters,
            monitor,
            cache: ResponseCache::new(cache_capacity, cache_ttl),
        }
    }

    /// Build the real adapters, monitor and cache from configuration
    pub fn from_config(config: &AppConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let adapters = adapters_from_config(config);
        let monitor = Arc::new(HealthMonitor::new(
            adapters.clone(),
            config.probe_interval(),
            config.probe_timeout(),
        ));
        Ok(Self::new(
            OrchestratorSettings::from_config(config),
            adapters,
            monitor,
            config.cache.capacity,
            config.cache_ttl(),
        ))
    }

    /// Start background health probing; probing stops when the handle drops
    pub fn start_health_monitor(&self) -> MonitorHandle {
        self.monitor.start()
    }

    pub fn monitor(&self) -> &Arc<HealthMonitor> {
        &self.monitor
    }

    /// Diagnose with fallback, never failing for a well-formed request
    pub async fn diagnose(
        &self,
        request: &DiagnosisRequest,
    ) -> Result<FallbackResult<DiagnosisResult>, RequestError> {
        self.run_diagnosis(request, None).await
    }

    /// Same as [`diagnose`](Self::diagnose) under an overall time budget
    ///
    /// Each attempt gets the smaller of the per-attempt timeout and what is
    /// left of the budget. Providers reached after the budget is spent are
    /// recorded as timed out without being called.
    pub async fn diagnose_within(
        &self,
        request: &DiagnosisRequest,
        budget: Duration,
    ) -> Result<FallbackResult<DiagnosisResult>, RequestError> {
        self.run_diagnosis(request, Some(Instant::now() + budget))
            .await
    }

    async fn run_diagnosis(
        &self,
        request: &DiagnosisRequest,
        deadline: Option<Instant>,
    ) -> Result<FallbackResult<DiagnosisResult>, RequestError> {
        request.validate()?;

        let key = cache_key(request);
        if let Some(hit) = self.cache.get(&key) {
            debug!(provider = %hit.result.provider, "Serving diagnosis from cache");
            return Ok(FallbackResult {
                provider: hit.result.provider.clone(),
                result: hit.result,
                fallback_used: hit.fallback_used,
                errors: Vec::new(),
                cached: true,
            });
        }

        let cascade = self
            .cascade("diagnose", deadline, |adapter| async move {
                adapter.diagnose(request).await
            })
            .await;

        match cascade.answer {
            Some((provider, result)) => {
                let fallback_used = provider != cascade.primary;
                self.cache.insert(
                    key,
                    CachedDiagnosis {
                        result: result.clone(),
                        fallback_used,
                    },
                );
                Ok(FallbackResult {
                    result,
                    provider: provider.tag().to_string(),
                    fallback_used,
                    errors: cascade.errors,
                    cached: false,
                })
            }
            None => {
                warn!(
                    attempts = cascade.errors.len(),
                    "All providers failed, using offline diagnosis"
                );
                Ok(FallbackResult {
                    result: offline::synthesize(request),
                    provider: constants::orchestrator::OFFLINE_PROVIDER.to_string(),
                    fallback_used: true,
                    errors: cascade.errors,
                    cached: false,
                })
            }
        }
    }

    /// Chat with fallback; replies are never cached
    pub async fn chat(
        &self,
        messages: &[ChatMessage],
    ) -> Result<FallbackResult<String>, RequestError> {
        let has_turn = messages
            .iter()
            .any(|m| m.role != Role::System && !m.content.trim().is_empty());
        if !has_turn {
            return Err(RequestError::InvalidRequest(
                "at least one non-empty user or assistant message is required".to_string(),
            ));
        }

        let cascade = self
            .cascade("chat", None, |adapter| async move {
                adapter.chat(messages).await
            })
            .await;

        Ok(match cascade.answer {
            Some((provider, reply)) => FallbackResult {
                result: reply,
                provider: provider.tag().to_string(),
                fallback_used: provider != cascade.primary,
                errors: cascade.errors,
                cached: false,
            },
            None => {
                warn!(
                    attempts = cascade.errors.len(),
                    "All providers failed, using offline chat reply"
                );
                FallbackResult {
                    result: offline::synthesize_chat(messages),
                    provider: constants::orchestrator::OFFLINE_PROVIDER.to_string(),
                    fallback_used: true,
                    errors: cascade.errors,
                    cached: false,
                }
            }
        })
    }

    /// Run a fresh probe round and return the table in provider order
    pub async fn check_health(&self) -> Vec<ProviderHealth> {
        self.monitor.probe_once().await;
        self.monitor.snapshot()
    }

    /// Current settings snapshot
    pub fn get_config(&self) -> Arc<OrchestratorSettings> {
        Arc::clone(&self.settings.read())
    }

    pub fn set_primary_provider(&self, primary: ProviderId) {
        self.update(|s| s.primary = primary);
        info!(primary = primary.tag(), "Primary provider changed");
    }

    pub fn set_fallback_enabled(&self, enabled: bool) {
        self.update(|s| s.fallback_enabled = enabled);
        info!(enabled, "Fallback setting changed");
    }

    /// Change the per-attempt timeout; zero is rejected
    pub fn set_timeout(&self, timeout: Duration) -> Result<(), RequestError> {
        if timeout.is_zero() {
            return Err(RequestError::InvalidRequest(
                "timeout must be positive".to_string(),
            ));
        }
        self.update(|s| s.timeout = timeout);
        info!(timeout_ms = timeout.as_millis() as u64, "Attempt timeout changed");
        Ok(())
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Swap in a modified copy of the settings
    fn update(&self, change: impl FnOnce(&mut OrchestratorSettings)) {
        let mut guard = self.settings.write();
        let mut next = OrchestratorSettings::clone(&guard);
        change(&mut next);
        *guard = Arc::new(next);
    }

    /// Try providers in order until one answers
    async fn cascade<T, F, Fut>(
        &self,
        operation: &'static str,
        deadline: Option<Instant>,
        call: F,
    ) -> Cascade<T>
    where
        F: Fn(Arc<dyn ProviderAdapter>) -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let settings = self.get_config();
        let order: Vec<ProviderId> =
            ProviderId::attempt_order(settings.primary, settings.fallback_enabled)
                .into_iter()
                .filter(|id| self.adapters.contains_key(id))
                .collect();

        let mut errors = Vec::new();

        for (index, id) in order.into_iter().enumerate() {
            let attempt = index + 1;
            let context = if id == settings.primary {
                AttemptContext::Primary
            } else {
                AttemptContext::Fallback
            };
            let mut record = |error: ProviderError| {
                warn!(
                    operation,
                    provider = id.tag(),
                    attempt,
                    kind = error.kind(),
                    contacted = !error.skipped_network(),
                    error = %error,
                    "Provider attempt failed"
                );
                errors.push(AttemptError {
                    provider: id,
                    error,
                    context,
                });
            };

            if self.monitor.is_known_unhealthy(id) {
                let reason = self
                    .monitor
                    .get(id)
                    .error
                    .unwrap_or_else(|| "last probe failed".to_string());
                record(ProviderError::KnownUnhealthy(reason));
                continue;
            }

            let limit = match deadline {
                Some(deadline) => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        record(ProviderError::Timeout { limit_ms: 0 });
                        continue;
                    }
                    remaining.min(settings.timeout)
                }
                None => settings.timeout,
            };

            let Some(adapter) = self.adapters.get(&id) else {
                continue;
            };

            let started = Instant::now();
            match with_timeout(call(Arc::clone(adapter)), limit).await {
                Ok(Ok(answer)) => {
                    info!(
                        operation,
                        provider = id.tag(),
                        attempt,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "Provider answered"
                    );
                    return Cascade {
                        answer: Some((id, answer)),
                        errors,
                        primary: settings.primary,
                    };
                }
                Ok(Err(e)) => record(e),
                Err(timeout) => record(timeout.into()),
            }
        }

        Cascade {
            answer: None,
            errors,
            primary: settings.primary,
        }
    }
}
