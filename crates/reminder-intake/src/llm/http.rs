//! [`LlmProvider`] over an OpenAI-compatible chat completions endpoint.
//!
//! Works with OpenAI itself and with local servers exposing the same API
//! (Ollama, llama.cpp, vLLM).

use async_trait::async_trait;
use serde_json::json;

use super::{LlmProvider, LlmRequest, ProviderError};
use crate::config::LlmConfig;

pub struct OpenAiCompatibleProvider {
    base_url: String,
    model: String,
    api_key: String,
    client: reqwest::Client,
}

impl std::fmt::Debug for OpenAiCompatibleProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiCompatibleProvider")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("has_api_key", &!self.api_key.is_empty())
            .finish()
    }
}

impl OpenAiCompatibleProvider {
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        let base_url: String = base_url.into();
        let base_url = base_url.trim_end_matches('/');
        let base_url = base_url.strip_suffix("/v1").unwrap_or(base_url).to_owned();
        Self {
            base_url,
            model: model.into(),
            api_key: api_key.into(),
            client: reqwest::Client::new(),
        }
    }

    pub fn from_config(config: &LlmConfig) -> Self {
        Self::new(
            config.api_url.as_str(),
            config.api_model.as_str(),
            config.effective_api_key(),
        )
    }

    pub fn endpoint(&self) -> String {
        format!("{}/v1/chat/completions", self.base_url)
    }

    fn build_body(&self, request: &LlmRequest) -> serde_json::Value {
        json!({
            "model": self.model,
            "temperature": request.temperature,
            "response_format": { "type": "json_object" },
            "messages": [
                { "role": "system", "content": request.system },
                { "role": "user", "content": request.user },
            ],
        })
    }

    fn map_http_error(status: reqwest::StatusCode, body: &str) -> ProviderError {
        let message = extract_error_message(body);
        let code = status.as_u16();
        if code == 429 || status.is_server_error() {
            ProviderError::Transient(format!("HTTP {code}: {message}"))
        } else {
            ProviderError::Permanent(format!("HTTP {code}: {message}"))
        }
    }
}

fn extract_error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.get("error")
                .and_then(|e| e.get("message"))
                .and_then(|m| m.as_str())
                .map(String::from)
        })
        .unwrap_or_else(|| body.to_string())
}

/// Pull `choices[0].message.content` out of a completion envelope.
fn extract_content(envelope: &serde_json::Value) -> Result<String, ProviderError> {
    envelope
        .get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .map(String::from)
        .ok_or_else(|| {
            ProviderError::Malformed("response has no choices[0].message.content".into())
        })
}

#[async_trait]
impl LlmProvider for OpenAiCompatibleProvider {
    async fn complete(&self, request: &LlmRequest) -> Result<String, ProviderError> {
        let mut http = self
            .client
            .post(self.endpoint())
            .header("Content-Type", "application/json");
        if !self.api_key.is_empty() {
            http = http.bearer_auth(&self.api_key);
        }

        let response = http
            .json(&self.build_body(request))
            .send()
            .await
            .map_err(|e| ProviderError::Transient(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(Self::map_http_error(status, &body_text));
        }

        let envelope: serde_json::Value = response
            .json()
            .await
            .map_err(|e| ProviderError::Malformed(format!("response is not JSON: {e}")))?;
        extract_content(&envelope)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_normalization() {
        let p = OpenAiCompatibleProvider::new("http://localhost:11434/v1/", "llama3", "");
        assert_eq!(p.endpoint(), "http://localhost:11434/v1/chat/completions");
        let p = OpenAiCompatibleProvider::new("https://api.openai.com", "gpt-4o-mini", "k");
        assert_eq!(p.endpoint(), "https://api.openai.com/v1/chat/completions");
    }

    #[test]
    fn test_body_shape() {
        let p = OpenAiCompatibleProvider::new("http://x", "m", "");
        let body = p.build_body(&LlmRequest {
            system: "sys".into(),
            user: "usr".into(),
            temperature: 0.0,
        });
        assert_eq!(body["model"], "m");
        assert_eq!(body["response_format"]["type"], "json_object");
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "usr");
    }

    #[test]
    fn test_status_mapping() {
        use reqwest::StatusCode;
        let body = r#"{"error":{"message":"slow down"}}"#;
        assert_eq!(
            OpenAiCompatibleProvider::map_http_error(StatusCode::TOO_MANY_REQUESTS, body),
            ProviderError::Transient("HTTP 429: slow down".into())
        );
        assert!(matches!(
            OpenAiCompatibleProvider::map_http_error(StatusCode::BAD_GATEWAY, ""),
            ProviderError::Transient(_)
        ));
        assert!(matches!(
            OpenAiCompatibleProvider::map_http_error(StatusCode::UNAUTHORIZED, "nope"),
            ProviderError::Permanent(_)
        ));
    }

    #[test]
    fn test_extract_content() {
        let ok = json!({"choices":[{"message":{"role":"assistant","content":"{}"}}]});
        assert_eq!(extract_content(&ok).unwrap(), "{}");
        assert!(matches!(
            extract_content(&json!({"choices": []})),
            Err(ProviderError::Malformed(_))
        ));
    }
}
