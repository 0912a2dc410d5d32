use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::config::PlannerConfig;

/// Client for the Ollama chat API used by the planner.
pub struct OllamaClient {
    pub endpoint: String,
    pub model: String,
    client: reqwest::Client,
}

/// Parameters for a chat request to Ollama.
pub struct ChatRequest {
    pub system_prompt: String,
    pub user_prompt: String,
    pub temperature: f32,
    pub top_p: f32,
    pub json_format: bool,
}

#[derive(Serialize)]
struct ChatBody<'a> {
    model: &'a str,
    messages: [Message<'a>; 2],
    stream: bool,
    options: SamplingOptions,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<&'static str>,
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct SamplingOptions {
    temperature: f32,
    top_p: f32,
}

#[derive(Deserialize)]
struct ChatReply {
    message: ReplyMessage,
}

#[derive(Deserialize)]
struct ReplyMessage {
    content: String,
}

impl OllamaClient {
    pub fn new(client: reqwest::Client, config: &PlannerConfig) -> Self {
        Self {
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            client,
        }
    }

    /// Single non-streaming chat turn; returns the assistant's content.
    pub async fn chat(&self, request: ChatRequest) -> Result<String> {
        let body = ChatBody {
            model: &self.model,
            messages: [
                Message {
                    role: "system",
                    content: &request.system_prompt,
                },
                Message {
                    role: "user",
                    content: &request.user_prompt,
                },
            ],
            stream: false,
            options: SamplingOptions {
                temperature: request.temperature,
                top_p: request.top_p,
            },
            format: request.json_format.then_some("json"),
        };

        let response = self
            .client
            .post(format!("{}/api/chat", self.endpoint))
            .json(&body)
            .send()
            .await
            .context("Failed to send request to Ollama")?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            anyhow::bail!("Ollama API error ({}): {}", status, error_text);
        }

        let reply: ChatReply = response
            .json()
            .await
            .context("Ollama reply has no message content")?;
        Ok(reply.message.content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    #[tokio::test]
    async fn test_chat_returns_message_content() {
        let mut server = mockito::Server::new_async().await;
        let chat = server
            .mock("POST", "/api/chat")
            .match_body(Matcher::PartialJson(serde_json::json!({
                "model": "llama3.1",
                "stream": false,
                "format": "json"
            })))
            .with_status(200)
            .with_body(r#"{"message":{"role":"assistant","content":"{\"tools\":[]}"}}"#)
            .expect(1)
            .create_async()
            .await;

        let config = PlannerConfig {
            endpoint: server.url(),
            ..PlannerConfig::default()
        };
        let client = OllamaClient::new(reqwest::Client::new(), &config);
        let content = client
            .chat(ChatRequest {
                system_prompt: "sys".to_string(),
                user_prompt: "user".to_string(),
                temperature: 0.2,
                top_p: 0.9,
                json_format: true,
            })
            .await
            .unwrap();

        assert_eq!(content, r#"{"tools":[]}"#);
        chat.assert_async().await;
    }

    #[tokio::test]
    async fn test_chat_reply_without_message_is_an_error() {
        let mut server = mockito::Server::new_async().await;
        let _chat = server
            .mock("POST", "/api/chat")
            .with_status(200)
            .with_body(r#"{"done":true}"#)
            .create_async()
            .await;

        let config = PlannerConfig {
            endpoint: server.url(),
            ..PlannerConfig::default()
        };
        let err = OllamaClient::new(reqwest::Client::new(), &config)
            .chat(ChatRequest {
                system_prompt: String::new(),
                user_prompt: String::new(),
                temperature: 0.2,
                top_p: 0.9,
                json_format: false,
            })
            .await
            .unwrap_err();
        assert!(err.to_string().contains("no message content"));
    }

    #[tokio::test]
    async fn test_chat_surfaces_api_errors() {
        let mut server = mockito::Server::new_async().await;
        let _chat = server
            .mock("POST", "/api/chat")
            .with_status(404)
            .with_body(r#"{"error":"model not found"}"#)
            .create_async()
            .await;

        let config = PlannerConfig {
            endpoint: server.url(),
            ..PlannerConfig::default()
        };
        let err = OllamaClient::new(reqwest::Client::new(), &config)
            .chat(ChatRequest {
                system_prompt: String::new(),
                user_prompt: String::new(),
                temperature: 0.2,
                top_p: 0.9,
                json_format: false,
            })
            .await
            .unwrap_err();
        assert!(err.to_string().contains("model not found"));
    }
}
