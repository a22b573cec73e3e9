//! Configuration loading
//!
//! Settings come from a TOML file (default `~/.rigdoc/config.toml`) with
//! environment variables layered on top. A missing file is not an error: every
//! field has a default and providers without credentials simply fail their
//! attempts with a config error.
//!
//! Environment variables:
//! - RIGDOC_PRIMARY, RIGDOC_FALLBACK_ENABLED, RIGDOC_TIMEOUT_MS
//! - RIGDOC_CACHE_CAPACITY, RIGDOC_CACHE_TTL_SECS, RIGDOC_HEALTH_INTERVAL_SECS
//! - AZURE_AGENT_ENDPOINT, AZURE_AGENT_ID, AZURE_AGENT_THREAD_ID, AZURE_AGENT_API_KEY
//! - AZURE_OPENAI_ENDPOINT, AZURE_OPENAI_DEPLOYMENT, AZURE_OPENAI_API_KEY,
//!   AZURE_OPENAI_API_VERSION
//! - INFERENCE_ENDPOINT, INFERENCE_MODEL, INFERENCE_API_KEY

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::ai::providers::ProviderId;
use crate::constants;
use crate::error::{ConfigError, ProviderError};

const REDACTED: &str = "***";

/// Root configuration object, constructed once and handed to the orchestrator
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub orchestrator: OrchestratorSection,
    pub cache: CacheSection,
    pub health: HealthSection,
    pub providers: ProvidersSection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorSection {
    pub primary: ProviderId,
    pub fallback_enabled: bool,
    pub timeout_ms: u64,
}

impl Default for OrchestratorSection {
    fn default() -> Self {
        Self {
            primary: ProviderId::default(),
            fallback_enabled: true,
            timeout_ms: constants::orchestrator::ATTEMPT_TIMEOUT.as_millis() as u64,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSection {
    pub capacity: usize,
    pub ttl_secs: u64,
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            capacity: constants::cache::CAPACITY,
            ttl_secs: constants::cache::TTL.as_secs(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthSection {
    pub interval_secs: u64,
    pub probe_timeout_ms: u64,
}

impl Default for HealthSection {
    fn default() -> Self {
        Self {
            interval_secs: constants::health::PROBE_INTERVAL.as_secs(),
            probe_timeout_ms: constants::health::PROBE_TIMEOUT.as_millis() as u64,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvidersSection {
    pub azure_agent: AgentSettings,
    pub azure_openai: CompletionSettings,
    pub inference: InferenceSettings,
}

/// Azure AI Foundry agent settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentSettings {
    pub project_endpoint: Option<String>,
    pub agent_id: Option<String>,
    /// Reuse one conversation thread; a fresh thread per call when unset
    pub thread_id: Option<String>,
    pub api_key: Option<String>,
    pub api_version: String,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            project_endpoint: None,
            agent_id: None,
            thread_id: None,
            api_key: None,
            api_version: constants::ai::AGENT_API_VERSION.to_string(),
        }
    }
}

/// Azure OpenAI deployment settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompletionSettings {
    pub endpoint: Option<String>,
    pub deployment: Option<String>,
    pub api_key: Option<String>,
    pub api_version: String,
}

impl Default for CompletionSettings {
    fn default() -> Self {
        Self {
            endpoint: None,
            deployment: None,
            api_key: None,
            api_version: constants::ai::OPENAI_API_VERSION.to_string(),
        }
    }
}

/// Generic chat-completions endpoint settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InferenceSettings {
    pub endpoint: Option<String>,
    pub model: Option<String>,
    pub api_key: Option<String>,
}

/// Return the value of a required field, or a config error naming it
pub(crate) fn required<'a>(
    provider: ProviderId,
    field: &str,
    value: &'a Option<String>,
) -> Result<&'a str, ProviderError> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ProviderError::Config(format!("{} is missing {}", provider.tag(), field)))
}

impl AppConfig {
    /// Default config file path
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(constants::paths::CONFIG_DIR_NAME)
            .join(constants::paths::CONFIG_FILE_NAME)
    }

    /// Load from the default path with environment overrides
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with_env(&Self::default_path())
    }

    /// Load from `path` with process environment overrides, then validate
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load_from_path(path)?;
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Load from a specific path; a missing file yields defaults
    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }
        let contents = fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&contents)?;
        tracing::debug!(path = %path.display(), "Loaded config file");
        Ok(config)
    }

    /// Layer environment values over the file values
    ///
    /// `lookup` abstracts `std::env::var` so callers (and tests) control the
    /// source. Empty values are ignored; unparseable numbers are logged and
    /// ignored.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(primary) = get("RIGDOC_PRIMARY") {
            match primary.parse::<ProviderId>() {
                Ok(id) => self.orchestrator.primary = id,
                Err(e) => tracing::warn!("Ignoring RIGDOC_PRIMARY: {}", e),
            }
        }
        if let Some(flag) = get("RIGDOC_FALLBACK_ENABLED") {
            self.orchestrator.fallback_enabled =
                matches!(flag.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on");
        }
        set_number(&get, "RIGDOC_TIMEOUT_MS", &mut self.orchestrator.timeout_ms);
        set_number(&get, "RIGDOC_CACHE_CAPACITY", &mut self.cache.capacity);
        set_number(&get, "RIGDOC_CACHE_TTL_SECS", &mut self.cache.ttl_secs);
        set_number(
            &get,
            "RIGDOC_HEALTH_INTERVAL_SECS",
            &mut self.health.interval_secs,
        );

        let agent = &mut self.providers.azure_agent;
        set_text(&get, "AZURE_AGENT_ENDPOINT", &mut agent.project_endpoint);
        set_text(&get, "AZURE_AGENT_ID", &mut agent.agent_id);
        set_text(&get, "AZURE_AGENT_THREAD_ID", &mut agent.thread_id);
        set_text(&get, "AZURE_AGENT_API_KEY", &mut agent.api_key);

        let openai = &mut self.providers.azure_openai;
        set_text(&get, "AZURE_OPENAI_ENDPOINT", &mut openai.endpoint);
        set_text(&get, "AZURE_OPENAI_DEPLOYMENT", &mut openai.deployment);
        set_text(&get, "AZURE_OPENAI_API_KEY", &mut openai.api_key);
        if let Some(version) = get("AZURE_OPENAI_API_VERSION") {
            openai.api_version = version;
        }

        let inference = &mut self.providers.inference;
        set_text(&get, "INFERENCE_ENDPOINT", &mut inference.endpoint);
        set_text(&get, "INFERENCE_MODEL", &mut inference.model);
        set_text(&get, "INFERENCE_API_KEY", &mut inference.api_key);
    }

    /// Reject values that would make the orchestrator misbehave
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.orchestrator.timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "orchestrator.timeout_ms must be positive".to_string(),
            ));
        }
        if self.cache.capacity == 0 {
            return Err(ConfigError::Invalid(
                "cache.capacity must be positive".to_string(),
            ));
        }
        if self.health.interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "health.interval_secs must be positive".to_string(),
            ));
        }

        let endpoints = [
            (
                "providers.azure_agent.project_endpoint",
                &self.providers.azure_agent.project_endpoint,
            ),
            (
                "providers.azure_openai.endpoint",
                &self.providers.azure_openai.endpoint,
            ),
            ("providers.inference.endpoint", &self.providers.inference.endpoint),
        ];
        for (field, value) in endpoints {
            if let Some(raw) = value {
                url::Url::parse(raw)
                    .map_err(|e| ConfigError::Invalid(format!("{field}: {e}")))?;
            }
        }
        Ok(())
    }

    /// Copy with every secret replaced, safe to print
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        for key in [
            &mut copy.providers.azure_agent.api_key,
            &mut copy.providers.azure_openai.api_key,
            &mut copy.providers.inference.api_key,
        ] {
            if key.is_some() {
                *key = Some(REDACTED.to_string());
            }
        }
        copy
    }

    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_millis(self.orchestrator.timeout_ms)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache.ttl_secs)
    }

    pub fn probe_interval(&self) -> Duration {
        Duration::from_secs(self.health.interval_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.health.probe_timeout_ms)
    }
}

fn set_text<G>(get: &G, key: &str, slot: &mut Option<String>)
where
    G: Fn(&str) -> Option<String>,
{
    if let Some(value) = get(key) {
        *slot = Some(value.trim().to_string());
    }
}

fn set_number<G, N>(get: &G, key: &str, slot: &mut N)
where
    G: Fn(&str) -> Option<String>,
    N: std::str::FromStr,
{
    if let Some(raw) = get(key) {
        match raw.trim().parse::<N>() {
            Ok(value) => *slot = value,
            Err(_) => tracing::warn!("Ignoring {}: not a number ({})", key, raw),
        }
    }
}
