//! Application constants and configuration defaults
//!
//! Centralized location for magic numbers and default values

use std::time::Duration;

/// HTTP client configuration
pub mod http {
    use super::*;

    /// Connection timeout for HTTP requests
    pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

    /// Hard ceiling on a single HTTP exchange. The orchestrator's per-attempt
    /// guard is normally much shorter than this.
    pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

    /// User agent sent to every backend
    pub const USER_AGENT: &str = "rigdoc/0.1";
}

/// Orchestrator defaults
pub mod orchestrator {
    use super::*;

    /// Per-attempt timeout applied by the TimeoutGuard
    pub const ATTEMPT_TIMEOUT: Duration = Duration::from_secs(30);

    /// Provider tag used for answers produced without any backend
    pub const OFFLINE_PROVIDER: &str = "offline-fallback";
}

/// Response cache defaults
pub mod cache {
    use super::*;

    /// Maximum number of cached diagnoses
    pub const CAPACITY: usize = 100;

    /// Time-to-live for a cached diagnosis (30 minutes)
    pub const TTL: Duration = Duration::from_secs(30 * 60);
}

/// Health monitor defaults
pub mod health {
    use super::*;

    /// Interval between probe rounds
    pub const PROBE_INTERVAL: Duration = Duration::from_secs(60);

    /// Upper bound on a single provider probe
    pub const PROBE_TIMEOUT: Duration = Duration::from_secs(10);
}

/// AI/LLM request defaults
pub mod ai {
    use super::*;

    /// Maximum output tokens for a diagnosis
    pub const MAX_OUTPUT_TOKENS: usize = 1000;

    /// Sampling temperature for diagnoses
    pub const TEMPERATURE: f32 = 0.3;

    /// Confidence reported when a backend answered but its text was not JSON
    pub const TEMPLATED_CONFIDENCE: f64 = 0.6;

    /// Azure AI Foundry agents API version
    pub const AGENT_API_VERSION: &str = "2025-05-01";

    /// Azure OpenAI data-plane API version
    pub const OPENAI_API_VERSION: &str = "2024-10-21";

    /// Upper bound on waiting for an agent run to reach a terminal state
    pub const RUN_POLL_BUDGET: Duration = Duration::from_secs(60);

    /// First delay between run status polls
    pub const RUN_POLL_INITIAL: Duration = Duration::from_millis(250);

    /// Largest delay between run status polls
    pub const RUN_POLL_MAX: Duration = Duration::from_secs(2);
}

/// Config file locations
pub mod paths {
    /// Config directory name under the home directory
    pub const CONFIG_DIR_NAME: &str = ".rigdoc";

    /// Config file name
    pub const CONFIG_FILE_NAME: &str = "config.toml";
}
