//! AI provider identities
//!
//! Defines the fixed set of backends and the documented fallback order the
//! orchestrator walks when the primary provider cannot answer.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Unique identifier for each supported provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ProviderId {
    /// Azure AI Foundry agent (stateful thread + run polling)
    #[default]
    AzureAgent,
    /// Azure OpenAI deployment (single JSON-mode completion)
    #[serde(rename = "azure-openai")]
    AzureOpenAi,
    /// Generic chat-completions inference endpoint
    Inference,
}

impl ProviderId {
    /// Get all provider IDs in fallback order
    /// Order: agent first (richest answers), inference last (cheapest)
    pub fn all() -> &'static [ProviderId] {
        &[
            ProviderId::AzureAgent,
            ProviderId::AzureOpenAi,
            ProviderId::Inference,
        ]
    }

    /// Stable tag reported in results, logs and config files
    pub fn tag(&self) -> &'static str {
        match self {
            ProviderId::AzureAgent => "azure-agent",
            ProviderId::AzureOpenAi => "azure-openai",
            ProviderId::Inference => "inference",
        }
    }

    /// Build the attempt order for one request
    ///
    /// The primary always goes first; the rest follow [`ProviderId::all`].
    /// With fallback disabled only the primary is attempted.
    pub fn attempt_order(primary: ProviderId, fallback_enabled: bool) -> Vec<ProviderId> {
        let mut order = vec![primary];
        if fallback_enabled {
            order.extend(Self::all().iter().copied().filter(|p| *p != primary));
        }
        order
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderId::AzureAgent => write!(f, "Azure AI Agent"),
            ProviderId::AzureOpenAi => write!(f, "Azure OpenAI"),
            ProviderId::Inference => write!(f, "Inference API"),
        }
    }
}

impl FromStr for ProviderId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('_', "-").as_str() {
            "azure-agent" | "agent" => Ok(ProviderId::AzureAgent),
            "azure-openai" | "openai" => Ok(ProviderId::AzureOpenAi),
            "inference" | "github-models" => Ok(ProviderId::Inference),
            other => Err(format!("unknown provider: {other}")),
        }
    }
}
