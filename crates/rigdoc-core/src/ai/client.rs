//! Shared HTTP transport for provider adapters
//!
//! One pooled `reqwest::Client` per adapter, bearer authentication, and a
//! single place where HTTP and transport failures are translated into
//! [`ProviderError`] so nothing backend-specific leaks past the adapter.

use reqwest::{Client, RequestBuilder, Response};
use serde_json::Value;
use tracing::{debug, error};

use crate::ai::providers::ProviderId;
use crate::constants;
use crate::error::ProviderError;

/// Longest error body kept in a provider error message
const MAX_ERROR_BODY: usize = 300;

/// JSON-over-HTTPS client for one provider
#[derive(Clone)]
pub struct HttpTransport {
    http: Client,
    provider: ProviderId,
}

impl HttpTransport {
    /// Create the HTTP client
    fn create_http_client() -> Client {
        Client::builder()
            .user_agent(constants::http::USER_AGENT)
            .connect_timeout(constants::http::CONNECT_TIMEOUT)
            .timeout(constants::http::REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|e| {
                error!("Failed to build HTTP client: {}. Using default client.", e);
                Client::new()
            })
    }

    pub fn new(provider: ProviderId) -> Self {
        Self {
            http: Self::create_http_client(),
            provider,
        }
    }

    /// POST a JSON body and decode a JSON response
    pub async fn post_json(
        &self,
        url: &str,
        api_key: &str,
        body: &Value,
    ) -> Result<Value, ProviderError> {
        debug!(provider = %self.provider.tag(), url, "POST");
        let request = self.authorized(self.http.post(url), api_key).json(body);
        self.send(request).await
    }

    /// GET a JSON resource
    pub async fn get_json(&self, url: &str, api_key: &str) -> Result<Value, ProviderError> {
        debug!(provider = %self.provider.tag(), url, "GET");
        let request = self.authorized(self.http.get(url), api_key);
        self.send(request).await
    }

    fn authorized(&self, request: RequestBuilder, api_key: &str) -> RequestBuilder {
        request
            .bearer_auth(api_key)
            .header("content-type", "application/json")
    }

    async fn send(&self, request: RequestBuilder) -> Result<Value, ProviderError> {
        let response = request.send().await?;
        let response = self.handle_error_response(response).await?;
        let text = response.text().await?;
        serde_json::from_str(&text)
            .map_err(|e| ProviderError::Parse(format!("response body is not JSON: {e}")))
    }

    /// Turn a non-success status into a provider error
    async fn handle_error_response(&self, response: Response) -> Result<Response, ProviderError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let error_text = response.text().await.unwrap_or_default();
        error!(
            provider = %self.provider.tag(),
            status = status.as_u16(),
            "API error response: {}",
            error_text
        );
        Err(ProviderError::Http {
            status: status.as_u16(),
            message: truncate(&error_text, MAX_ERROR_BODY),
        })
    }
}

/// Join a base endpoint and a path without doubling slashes
pub fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let cut: String = text.chars().take(max_chars).collect();
        format!("{cut}...")
    }
}

/// Pull the assistant text out of an OpenAI-style chat completion
pub fn completion_text(body: &Value) -> Option<String> {
    body.get("choices")
        .and_then(|c| c.as_array())
        .and_then(|arr| arr.first())
        .and_then(|choice| choice.get("message"))
        .and_then(|msg| msg.get("content"))
        .and_then(|t| t.as_str())
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
}
