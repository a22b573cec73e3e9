//! Provider adapter capability interface

use async_trait::async_trait;
use std::time::Instant;

use crate::ai::providers::ProviderId;
use crate::error::ProviderError;
use crate::types::{ChatMessage, DiagnosisRequest, DiagnosisResult, ProviderHealth};

/// One external AI backend behind a uniform, normalized surface
///
/// Implementations own no state that outlives a call beyond their immutable
/// settings and HTTP client. Backend quirks are absorbed here: a successful
/// `diagnose` always yields the full [`DiagnosisResult`] field set with a
/// clamped confidence, and every failure is already a [`ProviderError`].
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    fn id(&self) -> ProviderId;

    async fn diagnose(&self, request: &DiagnosisRequest) -> Result<DiagnosisResult, ProviderError>;

    async fn chat(&self, messages: &[ChatMessage]) -> Result<String, ProviderError>;

    /// Cheapest call that proves the backend is reachable and authorized
    async fn probe(&self) -> ProviderHealth;
}

/// Convert the outcome of a probe call into a health record
pub(crate) fn health_from_probe(
    provider: ProviderId,
    started: Instant,
    outcome: Result<(), ProviderError>,
) -> ProviderHealth {
    match outcome {
        Ok(()) => ProviderHealth::up(provider, started.elapsed().as_millis() as u64),
        Err(e) => ProviderHealth::down(provider, e.to_string()),
    }
}
