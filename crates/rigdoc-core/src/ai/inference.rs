//! REST-inference adapter
//!
//! Any OpenAI-compatible `/chat/completions` endpoint (GitHub Models, Azure AI
//! model inference, self-hosted gateways) with the model named in the body.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Instant;

use super::adapter::{health_from_probe, ProviderAdapter};
use super::client::{completion_text, join_url, HttpTransport};
use super::parse::parse_or_degrade;
use super::prompt;
use super::providers::ProviderId;
use crate::config::{required, InferenceSettings};
use crate::constants;
use crate::error::ProviderError;
use crate::types::{ChatMessage, DiagnosisRequest, DiagnosisResult, ProviderHealth};

pub struct InferenceAdapter {
    settings: InferenceSettings,
    transport: HttpTransport,
}

impl InferenceAdapter {
    pub fn new(settings: InferenceSettings) -> Self {
        Self {
            settings,
            transport: HttpTransport::new(ProviderId::Inference),
        }
    }

    async fn request(
        &self,
        messages: &[ChatMessage],
        max_tokens: usize,
    ) -> Result<Value, ProviderError> {
        let id = ProviderId::Inference;
        let endpoint = required(id, "endpoint", &self.settings.endpoint)?;
        let model = required(id, "model", &self.settings.model)?;
        let api_key = required(id, "api_key", &self.settings.api_key)?;

        // No response_format: not every compatible endpoint supports JSON mode
        let body = json!({
            "model": model,
            "messages": prompt::to_wire(messages),
            "max_tokens": max_tokens,
            "temperature": constants::ai::TEMPERATURE,
        });

        let url = join_url(endpoint, "chat/completions");
        self.transport.post_json(&url, api_key, &body).await
    }

    async fn complete(
        &self,
        messages: &[ChatMessage],
        max_tokens: usize,
    ) -> Result<String, ProviderError> {
        let response = self.request(messages, max_tokens).await?;
        completion_text(&response)
            .ok_or_else(|| ProviderError::Parse("completion has no message content".to_string()))
    }
}

#[async_trait]
impl ProviderAdapter for InferenceAdapter {
    fn id(&self) -> ProviderId {
        ProviderId::Inference
    }

    async fn diagnose(&self, request: &DiagnosisRequest) -> Result<DiagnosisResult, ProviderError> {
        let messages = prompt::diagnosis_messages(request);
        let text = self
            .complete(&messages, constants::ai::MAX_OUTPUT_TOKENS)
            .await?;
        Ok(parse_or_degrade(&text, request, self.id().tag()))
    }

    async fn chat(&self, messages: &[ChatMessage]) -> Result<String, ProviderError> {
        self.complete(&prompt::chat_messages(messages), constants::ai::MAX_OUTPUT_TOKENS)
            .await
    }

    async fn probe(&self) -> ProviderHealth {
        let started = Instant::now();
        // Any 2xx is healthy; a one-token reply is often blank
        let outcome = self
            .request(&[ChatMessage::user(prompt::PROBE_MESSAGE)], 1)
            .await
            .map(|_| ());
        health_from_probe(self.id(), started, outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{TruckInfo, Urgency};
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn adapter(endpoint: &str) -> InferenceAdapter {
        InferenceAdapter::new(InferenceSettings {
            endpoint: Some(format!("{}/inference", endpoint)),
            model: Some("gpt-4o-mini".to_string()),
            api_key: Some("ghp-token".to_string()),
        })
    }

    fn request() -> DiagnosisRequest {
        DiagnosisRequest {
            truck: TruckInfo {
                make: "Kenworth".into(),
                model: "T680".into(),
                year: 2019,
                engine: "PACCAR MX-13".into(),
            },
            symptoms: vec!["Loss of power on grades".into()],
            context: Some("DPF light on".into()),
            urgency: Urgency::Medium,
        }
    }

    #[tokio::test]
    async fn test_diagnose_sends_model_and_parses_fenced_json() {
        let server = MockServer::start().await;
        let content = "```json\n{\"diagnosis\": \"Clogged DPF\", \
                       \"possibleCauses\": [\"Soot loading\"], \
                       \"recommendations\": [\"Run a parked regen\"]}\n```";
        Mock::given(method("POST"))
            .and(path("/inference/chat/completions"))
            .and(header("authorization", "Bearer ghp-token"))
            .and(body_partial_json(json!({"model": "gpt-4o-mini"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                json!({"choices": [{"message": {"content": content}}]}),
            ))
            .expect(1)
            .mount(&server)
            .await;

        let result = adapter(&server.uri()).diagnose(&request()).await.unwrap();
        assert_eq!(result.diagnosis, "Clogged DPF");
        assert_eq!(result.provider, "inference");
        // Confidence absent from the reply
        assert_eq!(result.confidence, constants::ai::TEMPLATED_CONFIDENCE);
        assert_eq!(result.urgency, Urgency::Medium);
    }

    #[tokio::test]
    async fn test_chat_returns_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                json!({"choices": [{"message": {"content": "Check the fuel filter."}}]}),
            ))
            .mount(&server)
            .await;

        let reply = adapter(&server.uri())
            .chat(&[ChatMessage::user("Why is my truck slow uphill?")])
            .await
            .unwrap();
        assert_eq!(reply, "Check the fuel filter.");
    }

    #[tokio::test]
    async fn test_empty_choices_is_parse_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
            .mount(&server)
            .await;

        let err = adapter(&server.uri())
            .chat(&[ChatMessage::user("hi")])
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "parse");
    }

    #[tokio::test]
    async fn test_unauthorized_probe_is_unhealthy() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad credentials"))
            .mount(&server)
            .await;

        let health = adapter(&server.uri()).probe().await;
        assert!(!health.healthy);
        assert!(health.error.unwrap().contains("401"));
    }

    #[tokio::test]
    async fn test_empty_one_token_reply_is_healthy() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/inference/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"content": ""}, "finish_reason": "length"}]
            })))
            .mount(&server)
            .await;

        let health = adapter(&server.uri()).probe().await;
        assert!(health.healthy);
        assert!(health.latency_ms.is_some());
    }

    #[tokio::test]
    async fn test_missing_model_is_config_error() {
        let adapter = InferenceAdapter::new(InferenceSettings {
            endpoint: Some("http://127.0.0.1:9".to_string()),
            model: None,
            api_key: Some("k".to_string()),
        });
        let err = adapter.diagnose(&request()).await.unwrap_err();
        assert_eq!(err, ProviderError::Config("inference is missing model".to_string()));
    }
}
