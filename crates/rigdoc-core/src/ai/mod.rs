//! AI provider layer
//!
//! Three backends behind one [`ProviderAdapter`] surface:
//! an Azure AI Foundry agent, an Azure OpenAI deployment, and any
//! OpenAI-compatible inference endpoint.

pub mod adapter;
pub mod agent;
pub mod client;
pub mod completion;
pub mod inference;
pub mod parse;
pub mod prompt;
pub mod providers;

pub use adapter::ProviderAdapter;
pub use agent::{AgentAdapter, PollConfig};
pub use completion::CompletionAdapter;
pub use inference::InferenceAdapter;
pub use providers::ProviderId;

use std::sync::Arc;

use crate::config::AppConfig;

/// Build every adapter from configuration, in fallback order
pub fn adapters_from_config(config: &AppConfig) -> Vec<Arc<dyn ProviderAdapter>> {
    let providers = &config.providers;
    vec![
        Arc::new(AgentAdapter::new(providers.azure_agent.clone())),
        Arc::new(CompletionAdapter::new(providers.azure_openai.clone())),
        Arc::new(InferenceAdapter::new(providers.inference.clone())),
    ]
}
