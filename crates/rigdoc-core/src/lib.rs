//! Rigdoc Core - fault-tolerant AI provider orchestration for truck diagnostics
//!
//! This crate turns a diagnostic request into an answer:
//! - Three AI backends behind one adapter trait
//! - Sequential fallback with per-attempt timeouts and ordered attempt errors
//! - LRU + TTL response cache
//! - Background health probing that never bans a provider for good
//! - Deterministic offline answers when every backend is down

pub mod ai;
pub mod cache;
pub mod config;
pub mod constants;
pub mod error;
pub mod health;
pub mod offline;
pub mod orchestrator;
pub mod timeout;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

// Re-exports for convenience
pub use ai::{ProviderAdapter, ProviderId};
pub use config::AppConfig;
pub use error::{ConfigError, ProviderError, RequestError, TimeoutError};
pub use health::{HealthMonitor, MonitorHandle};
pub use orchestrator::{OrchestratorSettings, RequestOrchestrator};
pub use types::{
    AttemptContext, AttemptError, ChatMessage, DiagnosisRequest, DiagnosisResult,
    FallbackResult, ProviderHealth, Role, TruckInfo, Urgency,
};
