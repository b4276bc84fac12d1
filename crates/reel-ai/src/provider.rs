//! Text-completion providers.
//!
//! Each provider is one model behind one endpoint. The script synthesizer
//! walks an ordered list of them.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::ScriptServiceConfig;
use crate::error::{AiError, AiResult};

/// One completion call.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub system: String,
    pub prompt: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

/// A model that turns a prompt into free text.
#[async_trait]
pub trait TextCompletionProvider: Send + Sync {
    /// Model identifier, for logs.
    fn name(&self) -> &str;

    async fn complete(&self, request: &CompletionRequest) -> AiResult<String>;
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

/// `POST {base}/chat/completions` with a bearer key.
pub struct OpenAiCompatProvider {
    client: Client,
    endpoint: String,
    api_key: String,
    model: String,
}

impl OpenAiCompatProvider {
    pub fn new(client: Client, base_url: &str, api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            api_key: api_key.into(),
            model: model.into(),
        }
    }

    /// One provider per configured model, sharing a client.
    pub fn from_config(config: &ScriptServiceConfig) -> AiResult<Vec<Arc<dyn TextCompletionProvider>>> {
        let client = Client::builder().timeout(config.request_timeout).build()?;
        Ok(config
            .models
            .iter()
            .map(|model| {
                Arc::new(Self::new(client.clone(), &config.base_url, &config.api_key, model))
                    as Arc<dyn TextCompletionProvider>
            })
            .collect())
    }
}

#[async_trait]
impl TextCompletionProvider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: &CompletionRequest) -> AiResult<String> {
        let body = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &request.system,
                },
                ChatMessage {
                    role: "user",
                    content: &request.prompt,
                },
            ],
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        };

        debug!(model = %self.model, "Requesting completion");
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let text = response.text().await.unwrap_or_default();
            return Err(AiError::upstream(status, &text));
        }

        let parsed: ChatResponse = response.json().await?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| AiError::EmptyCompletion(self.model.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request() -> CompletionRequest {
        CompletionRequest {
            system: "system".into(),
            prompt: "prompt".into(),
            temperature: 0.8,
            max_tokens: 600,
        }
    }

    #[tokio::test]
    async fn test_complete_posts_chat_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer key"))
            .and(body_partial_json(serde_json::json!({
                "model": "model-a",
                "max_tokens": 600,
                "messages": [
                    {"role": "system", "content": "system"},
                    {"role": "user", "content": "prompt"}
                ]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"role": "assistant", "content": "Hello there."}}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let provider = OpenAiCompatProvider::new(
            Client::new(),
            &format!("{}/v1/", server.uri()),
            "key",
            "model-a",
        );
        assert_eq!(provider.complete(&request()).await.unwrap(), "Hello there.");
    }

    #[tokio::test]
    async fn test_non_success_status_is_upstream_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
            .mount(&server)
            .await;

        let provider = OpenAiCompatProvider::new(Client::new(), &server.uri(), "key", "m");
        match provider.complete(&request()).await {
            Err(AiError::UpstreamStatus { status, body }) => {
                assert_eq!(status, 429);
                assert_eq!(body, "slow down");
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_empty_choices() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"choices": []})))
            .mount(&server)
            .await;

        let provider = OpenAiCompatProvider::new(Client::new(), &server.uri(), "key", "m");
        assert!(matches!(
            provider.complete(&request()).await,
            Err(AiError::EmptyCompletion(_))
        ));
    }
}
