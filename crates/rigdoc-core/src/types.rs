//! Request and result types shared by adapters, cache and orchestrator

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::ai::providers::ProviderId;
use crate::error::{ProviderError, RequestError};

/// How soon the truck needs attention
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum Urgency {
    Low,
    #[default]
    Medium,
    High,
}

impl Urgency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Urgency::Low => "low",
            Urgency::Medium => "medium",
            Urgency::High => "high",
        }
    }
}

impl fmt::Display for Urgency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Urgency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "low" => Ok(Urgency::Low),
            "medium" | "moderate" => Ok(Urgency::Medium),
            "high" | "critical" | "urgent" => Ok(Urgency::High),
            other => Err(format!("unknown urgency: {other}")),
        }
    }
}

/// Truck identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TruckInfo {
    pub make: String,
    pub model: String,
    pub year: u16,
    pub engine: String,
}

impl fmt::Display for TruckInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} ({})",
            self.year, self.make, self.model, self.engine
        )
    }
}

/// A diagnosis request as produced by the intake forms
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagnosisRequest {
    pub truck: TruckInfo,
    pub symptoms: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    #[serde(default)]
    pub urgency: Urgency,
}

impl DiagnosisRequest {
    /// Reject requests no provider could meaningfully answer
    pub fn validate(&self) -> Result<(), RequestError> {
        if self.symptoms.is_empty() {
            return Err(RequestError::InvalidRequest(
                "symptom list must not be empty".to_string(),
            ));
        }
        if self.symptoms.iter().all(|s| s.trim().is_empty()) {
            return Err(RequestError::InvalidRequest(
                "symptoms must contain text".to_string(),
            ));
        }
        Ok(())
    }

    /// Non-blank symptoms, trimmed, in caller order
    pub fn symptom_list(&self) -> Vec<&str> {
        self.symptoms
            .iter()
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .collect()
    }

    /// Trimmed context, if any text was given
    pub fn context_text(&self) -> Option<&str> {
        self.context
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
    }
}

/// Normalized answer, identical in shape whichever backend produced it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosisResult {
    pub diagnosis: String,
    pub possible_causes: Vec<String>,
    pub recommendations: Vec<String>,
    pub confidence: f64,
    pub estimated_cost: String,
    pub urgency: Urgency,
    pub provider: String,
    #[serde(default)]
    pub tools_needed: Vec<String>,
    #[serde(default)]
    pub safety_notes: Vec<String>,
}

impl DiagnosisResult {
    /// Clamp a raw confidence into 0.0..=1.0; NaN becomes 0.0
    pub fn clamp_confidence(raw: f64) -> f64 {
        if raw.is_nan() {
            0.0
        } else {
            raw.clamp(0.0, 1.0)
        }
    }
}

/// Chat participant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// One turn of a conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }
}

/// Latest known health of one provider
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProviderHealth {
    pub provider: ProviderId,
    pub healthy: bool,
    pub latency_ms: Option<u64>,
    pub error: Option<String>,
    /// None until the first probe completes
    pub last_checked: Option<DateTime<Utc>>,
}

impl ProviderHealth {
    /// Initial state before any probe: not healthy, but not known-unhealthy
    pub fn unknown(provider: ProviderId) -> Self {
        Self {
            provider,
            healthy: false,
            latency_ms: None,
            error: None,
            last_checked: None,
        }
    }

    pub fn up(provider: ProviderId, latency_ms: u64) -> Self {
        Self {
            provider,
            healthy: true,
            latency_ms: Some(latency_ms),
            error: None,
            last_checked: Some(Utc::now()),
        }
    }

    pub fn down(provider: ProviderId, error: impl Into<String>) -> Self {
        Self {
            provider,
            healthy: false,
            latency_ms: None,
            error: Some(error.into()),
            last_checked: Some(Utc::now()),
        }
    }
}

/// Where in the cascade an attempt happened
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AttemptContext {
    #[serde(rename = "primary attempt")]
    Primary,
    #[serde(rename = "fallback attempt")]
    Fallback,
}

impl fmt::Display for AttemptContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttemptContext::Primary => f.write_str("primary attempt"),
            AttemptContext::Fallback => f.write_str("fallback attempt"),
        }
    }
}

/// One failed provider attempt, recorded in attempt order
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttemptError {
    pub provider: ProviderId,
    pub error: ProviderError,
    pub context: AttemptContext,
}

/// The orchestrator's output envelope
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FallbackResult<T> {
    pub result: T,
    /// Provider tag, or `offline-fallback`
    pub provider: String,
    pub fallback_used: bool,
    pub errors: Vec<AttemptError>,
    /// Served from the response cache without any provider call
    #[serde(default)]
    pub cached: bool,
}
