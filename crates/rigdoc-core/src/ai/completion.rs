//! Single-completion adapter (Azure OpenAI deployment)
//!
//! One request, one response. Diagnoses use JSON mode; a reply that still
//! fails to parse degrades to a templated answer instead of failing.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Instant;
use tracing::debug;

use super::adapter::{health_from_probe, ProviderAdapter};
use super::client::{completion_text, join_url, HttpTransport};
use super::parse::parse_or_degrade;
use super::prompt;
use super::providers::ProviderId;
use crate::config::{required, CompletionSettings};
use crate::constants;
use crate::error::ProviderError;
use crate::types::{ChatMessage, DiagnosisRequest, DiagnosisResult, ProviderHealth};

pub struct CompletionAdapter {
    settings: CompletionSettings,
    transport: HttpTransport,
}

impl CompletionAdapter {
    pub fn new(settings: CompletionSettings) -> Self {
        Self {
            settings,
            transport: HttpTransport::new(ProviderId::AzureOpenAi),
        }
    }

    /// Deployment URL and key, or a config error before any network call
    fn target(&self) -> Result<(String, &str), ProviderError> {
        let id = ProviderId::AzureOpenAi;
        let endpoint = required(id, "endpoint", &self.settings.endpoint)?;
        let deployment = required(id, "deployment", &self.settings.deployment)?;
        let api_key = required(id, "api_key", &self.settings.api_key)?;
        let url = format!(
            "{}?api-version={}",
            join_url(
                endpoint,
                &format!("openai/deployments/{}/chat/completions", deployment)
            ),
            self.settings.api_version
        );
        Ok((url, api_key))
    }

    async fn request(
        &self,
        messages: &[ChatMessage],
        max_tokens: usize,
        json_mode: bool,
    ) -> Result<Value, ProviderError> {
        let (url, api_key) = self.target()?;

        let mut body = json!({
            "messages": prompt::to_wire(messages),
            "max_tokens": max_tokens,
            "temperature": constants::ai::TEMPERATURE,
        });
        if json_mode {
            body["response_format"] = json!({"type": "json_object"});
        }

        self.transport.post_json(&url, api_key, &body).await
    }

    async fn complete(
        &self,
        messages: &[ChatMessage],
        max_tokens: usize,
        json_mode: bool,
    ) -> Result<String, ProviderError> {
        let response = self.request(messages, max_tokens, json_mode).await?;
        completion_text(&response)
            .ok_or_else(|| ProviderError::Parse("completion has no message content".to_string()))
    }
}

#[async_trait]
impl ProviderAdapter for CompletionAdapter {
    fn id(&self) -> ProviderId {
        ProviderId::AzureOpenAi
    }

    async fn diagnose(&self, request: &DiagnosisRequest) -> Result<DiagnosisResult, ProviderError> {
        let messages = prompt::diagnosis_messages(request);
        let text = self
            .complete(&messages, constants::ai::MAX_OUTPUT_TOKENS, true)
            .await?;
        debug!(chars = text.len(), "Azure OpenAI diagnosis received");
        Ok(parse_or_degrade(&text, request, self.id().tag()))
    }

    async fn chat(&self, messages: &[ChatMessage]) -> Result<String, ProviderError> {
        let messages = prompt::chat_messages(messages);
        self.complete(&messages, constants::ai::MAX_OUTPUT_TOKENS, false)
            .await
    }

    async fn probe(&self) -> ProviderHealth {
        let started = Instant::now();
        // Any 2xx is healthy; a one-token reply is often blank
        let outcome = self
            .request(&[ChatMessage::user(prompt::PROBE_MESSAGE)], 1, false)
            .await
            .map(|_| ());
        health_from_probe(self.id(), started, outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{TruckInfo, Urgency};
    use wiremock::matchers::{body_partial_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn settings(endpoint: &str) -> CompletionSettings {
        CompletionSettings {
            endpoint: Some(endpoint.to_string()),
            deployment: Some("diag".to_string()),
            api_key: Some("key".to_string()),
            ..CompletionSettings::default()
        }
    }

    fn request() -> DiagnosisRequest {
        DiagnosisRequest {
            truck: TruckInfo {
                make: "Volvo".into(),
                model: "VNL 860".into(),
                year: 2021,
                engine: "D13".into(),
            },
            symptoms: vec!["Air pressure drops when parked".into()],
            context: None,
            urgency: Urgency::Medium,
        }
    }

    fn completion(content: &str) -> serde_json::Value {
        json!({"choices": [{"message": {"role": "assistant", "content": content}}]})
    }

    #[tokio::test]
    async fn test_diagnose_uses_json_mode_and_normalizes() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/openai/deployments/diag/chat/completions"))
            .and(query_param("api-version", constants::ai::OPENAI_API_VERSION))
            .and(body_partial_json(json!({"response_format": {"type": "json_object"}})))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion(
                r#"{"diagnosis": "Leaking air dryer purge valve",
                    "possibleCauses": ["Purge valve leak", "Governor fault"],
                    "recommendations": ["Soap test air lines"],
                    "confidence": 0.8, "estimatedCost": "$200 - $600", "urgency": "high"}"#,
            )))
            .expect(1)
            .mount(&server)
            .await;

        let adapter = CompletionAdapter::new(settings(&server.uri()));
        let result = adapter.diagnose(&request()).await.unwrap();
        assert_eq!(result.provider, "azure-openai");
        assert_eq!(result.possible_causes.len(), 2);
        assert_eq!(result.urgency, Urgency::High);
        assert!((result.confidence - 0.8).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_diagnose_degrades_on_prose() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(completion("Likely a leaking air dryer. Check it soon.")),
            )
            .mount(&server)
            .await;

        let adapter = CompletionAdapter::new(settings(&server.uri()));
        let result = adapter.diagnose(&request()).await.unwrap();
        assert_eq!(result.confidence, constants::ai::TEMPLATED_CONFIDENCE);
        assert!(result.diagnosis.contains("air dryer"));
    }

    #[tokio::test]
    async fn test_server_error_is_provider_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let adapter = CompletionAdapter::new(settings(&server.uri()));
        let err = adapter.diagnose(&request()).await.unwrap_err();
        assert!(matches!(err, ProviderError::Http { status: 500, .. }));
    }

    #[tokio::test]
    async fn test_missing_key_is_config_error_without_network() {
        let adapter = CompletionAdapter::new(CompletionSettings {
            endpoint: Some("http://127.0.0.1:9".to_string()),
            deployment: Some("diag".to_string()),
            ..CompletionSettings::default()
        });
        let err = adapter.chat(&[ChatMessage::user("hi")]).await.unwrap_err();
        assert_eq!(err.kind(), "config");

        let health = adapter.probe().await;
        assert!(!health.healthy);
        assert!(health.error.unwrap().contains("api_key"));
    }

    #[tokio::test]
    async fn test_probe_reports_latency() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({"max_tokens": 1})))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion("pong")))
            .mount(&server)
            .await;

        let adapter = CompletionAdapter::new(settings(&server.uri()));
        let health = adapter.probe().await;
        assert!(health.healthy);
        assert!(health.latency_ms.is_some());
        assert!(health.last_checked.is_some());
    }

    #[tokio::test]
    async fn test_blank_one_token_reply_is_healthy() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"content": "\n"}, "finish_reason": "length"}]
            })))
            .mount(&server)
            .await;

        let health = CompletionAdapter::new(settings(&server.uri())).probe().await;
        assert!(health.healthy);
        assert_eq!(health.error, None);
    }
}
