//! Agent-conversation adapter (Azure AI Foundry agents)
//!
//! A turn against a hosted agent is a small protocol rather than one call:
//!
//! 1. create a thread, unless one is configured for reuse
//! 2. append the user message to the thread
//! 3. start a run of the agent on that thread
//! 4. poll the run until it reaches a terminal state
//! 5. read back the assistant message that run produced
//!
//! Polling backs off exponentially and is bounded by its own budget, so a run
//! stuck in `queued` cannot hold the adapter forever even without an outer
//! deadline.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use super::adapter::{health_from_probe, ProviderAdapter};
use super::client::{join_url, HttpTransport};
use super::parse::parse_or_degrade;
use super::prompt;
use super::providers::ProviderId;
use crate::config::{required, AgentSettings};
use crate::constants;
use crate::error::ProviderError;
use crate::timeout::with_timeout;
use crate::types::{ChatMessage, DiagnosisRequest, DiagnosisResult, ProviderHealth, Role};

/// How run status is polled
#[derive(Debug, Clone)]
pub struct PollConfig {
    /// Total time allowed for a run to finish
    pub budget: Duration,
    /// Delay before the second status check
    pub initial_delay: Duration,
    /// Upper bound on the delay between checks
    pub max_delay: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            budget: constants::ai::RUN_POLL_BUDGET,
            initial_delay: constants::ai::RUN_POLL_INITIAL,
            max_delay: constants::ai::RUN_POLL_MAX,
        }
    }
}

/// Run states after which the status no longer changes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunOutcome {
    Completed,
    Failed,
    Cancelled,
    Expired,
    Incomplete,
    RequiresAction,
}

impl RunOutcome {
    fn from_status(status: &str) -> Option<Self> {
        match status {
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "cancelled" | "cancelling" => Some(Self::Cancelled),
            "expired" => Some(Self::Expired),
            "incomplete" => Some(Self::Incomplete),
            "requires_action" => Some(Self::RequiresAction),
            // queued, in_progress and anything new keep polling
            _ => None,
        }
    }
}

/// Resolved connection details for one call
struct Target<'a> {
    endpoint: &'a str,
    agent_id: &'a str,
    api_key: &'a str,
}

pub struct AgentAdapter {
    settings: AgentSettings,
    transport: HttpTransport,
    poll: PollConfig,
}

impl AgentAdapter {
    pub fn new(settings: AgentSettings) -> Self {
        Self {
            settings,
            transport: HttpTransport::new(ProviderId::AzureAgent),
            poll: PollConfig::default(),
        }
    }

    pub fn with_poll_config(mut self, poll: PollConfig) -> Self {
        self.poll = poll;
        self
    }

    fn target(&self) -> Result<Target<'_>, ProviderError> {
        let id = ProviderId::AzureAgent;
        Ok(Target {
            endpoint: required(id, "project_endpoint", &self.settings.project_endpoint)?,
            agent_id: required(id, "agent_id", &self.settings.agent_id)?,
            api_key: required(id, "api_key", &self.settings.api_key)?,
        })
    }

    fn url(&self, target: &Target<'_>, path: &str) -> String {
        let base = join_url(target.endpoint, path);
        let sep = if base.contains('?') { '&' } else { '?' };
        format!("{}{}api-version={}", base, sep, self.settings.api_version)
    }

    /// Run one user turn and return the agent's reply text
    async fn converse(&self, instructions: &str, content: String) -> Result<String, ProviderError> {
        let target = self.target()?;

        let thread_id = match self
            .settings
            .thread_id
            .as_deref()
            .filter(|t| !t.trim().is_empty())
        {
            Some(existing) => existing.to_string(),
            None => self.create_thread(&target).await?,
        };

        self.transport
            .post_json(
                &self.url(&target, &format!("threads/{}/messages", thread_id)),
                target.api_key,
                &json!({"role": "user", "content": content}),
            )
            .await?;

        let run = self
            .transport
            .post_json(
                &self.url(&target, &format!("threads/{}/runs", thread_id)),
                target.api_key,
                &json!({
                    "assistant_id": target.agent_id,
                    "additional_instructions": instructions,
                }),
            )
            .await?;
        let run_id = string_at(&run, "id")
            .ok_or_else(|| ProviderError::Parse("run response has no id".to_string()))?;
        debug!(thread = %thread_id, run = %run_id, "Agent run started");

        let outcome = with_timeout(
            self.wait_for_run(&target, &thread_id, &run_id),
            self.poll.budget,
        )
        .await??;

        match outcome {
            (RunOutcome::Completed, _) => {}
            (RunOutcome::RequiresAction, _) => {
                return Err(ProviderError::Parse(
                    "agent run requires tool output, which is not supported".to_string(),
                ));
            }
            (other, run) => {
                let detail = run
                    .get("last_error")
                    .and_then(|e| e.get("message"))
                    .and_then(|m| m.as_str())
                    .unwrap_or("no detail");
                warn!(run = %run_id, outcome = ?other, "Agent run did not complete");
                return Err(ProviderError::Network(format!(
                    "agent run {:?}: {}",
                    other, detail
                )));
            }
        }

        self.run_reply(&target, &thread_id, &run_id).await
    }

    async fn create_thread(&self, target: &Target<'_>) -> Result<String, ProviderError> {
        let thread = self
            .transport
            .post_json(&self.url(target, "threads"), target.api_key, &json!({}))
            .await?;
        string_at(&thread, "id")
            .ok_or_else(|| ProviderError::Parse("thread response has no id".to_string()))
    }

    /// Poll with capped exponential backoff until the run is terminal
    async fn wait_for_run(
        &self,
        target: &Target<'_>,
        thread_id: &str,
        run_id: &str,
    ) -> Result<(RunOutcome, Value), ProviderError> {
        let url = self.url(target, &format!("threads/{}/runs/{}", thread_id, run_id));
        let mut delay = self.poll.initial_delay;

        loop {
            let run = self.transport.get_json(&url, target.api_key).await?;
            let status = string_at(&run, "status").unwrap_or_default();
            if let Some(outcome) = RunOutcome::from_status(&status) {
                return Ok((outcome, run));
            }

            tokio::time::sleep(delay).await;
            delay = (delay * 2).min(self.poll.max_delay);
        }
    }

    /// Reply written by `run_id`; other runs on a shared thread are ignored
    async fn run_reply(
        &self,
        target: &Target<'_>,
        thread_id: &str,
        run_id: &str,
    ) -> Result<String, ProviderError> {
        let url = self.url(
            target,
            &format!("threads/{}/messages?order=desc&run_id={}", thread_id, run_id),
        );
        let listing = self.transport.get_json(&url, target.api_key).await?;
        assistant_text(&listing, run_id).ok_or_else(|| {
            ProviderError::Parse(format!("run {} left no assistant reply", run_id))
        })
    }
}

#[async_trait]
impl ProviderAdapter for AgentAdapter {
    fn id(&self) -> ProviderId {
        ProviderId::AzureAgent
    }

    async fn diagnose(&self, request: &DiagnosisRequest) -> Result<DiagnosisResult, ProviderError> {
        let text = self
            .converse(
                prompt::DIAGNOSIS_SYSTEM_PROMPT,
                prompt::diagnosis_prompt(request),
            )
            .await?;
        Ok(parse_or_degrade(&text, request, self.id().tag()))
    }

    async fn chat(&self, messages: &[ChatMessage]) -> Result<String, ProviderError> {
        let (system, turns): (Vec<ChatMessage>, Vec<ChatMessage>) = messages
            .iter()
            .cloned()
            .partition(|m| m.role == Role::System);

        let instructions = if system.is_empty() {
            prompt::CHAT_SYSTEM_PROMPT.to_string()
        } else {
            system
                .iter()
                .map(|m| m.content.as_str())
                .collect::<Vec<_>>()
                .join("\n")
        };

        self.converse(&instructions, prompt::transcript(&turns)).await
    }

    async fn probe(&self) -> ProviderHealth {
        let started = Instant::now();
        let outcome = match self.target() {
            Ok(target) => {
                let url = self.url(&target, &format!("assistants/{}", target.agent_id));
                self.transport
                    .get_json(&url, target.api_key)
                    .await
                    .map(|_| ())
            }
            Err(e) => Err(e),
        };
        health_from_probe(self.id(), started, outcome)
    }
}

fn string_at(value: &Value, key: &str) -> Option<String> {
    value
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
}

/// Text of the newest assistant message `run_id` wrote, from a descending listing
fn assistant_text(listing: &Value, run_id: &str) -> Option<String> {
    let messages = listing.get("data")?.as_array()?;
    let message = messages.iter().find(|m| {
        m.get("role").and_then(|r| r.as_str()) == Some("assistant")
            && m.get("run_id").and_then(|r| r.as_str()) == Some(run_id)
    })?;

    let text = message
        .get("content")?
        .as_array()?
        .iter()
        .filter_map(|part| {
            part.get("text")
                .and_then(|t| t.get("value"))
                .and_then(|v| v.as_str())
        })
        .collect::<Vec<_>>()
        .join("\n");

    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}
