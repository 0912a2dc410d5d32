//! Slack Web API: bot mentions and channel messages.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{check_status, ServiceError};

/// A message that mentions the bot user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: Option<String>,
    pub user: Option<String>,
    pub channel: Option<String>,
    pub text: Option<String>,
}

#[async_trait]
pub trait ChatService: Send + Sync {
    async fn mentions(&self, count: u32) -> Result<Vec<ChatMessage>, ServiceError>;
    async fn post_message(&self, channel_id: &str, text: &str) -> Result<(), ServiceError>;
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    messages: Option<SearchMessages>,
}

#[derive(Debug, Deserialize)]
struct SearchMessages {
    #[serde(default)]
    matches: Vec<SearchMatch>,
}

#[derive(Debug, Deserialize)]
struct SearchMatch {
    ts: Option<String>,
    user: Option<String>,
    channel: Option<ChannelRef>,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChannelRef {
    id: Option<String>,
}

pub struct SlackClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
    bot_user_id: String,
}

impl SlackClient {
    /// Verify the token with `auth.test` and remember the bot's user id.
    pub async fn connect(http: reqwest::Client, base_url: String, token: String) -> Result<Self, ServiceError> {
        let base_url = base_url.trim_end_matches('/').to_string();
        let body = call(&http, &base_url, &token, "auth.test", serde_json::json!({})).await?;

        let bot_user_id = body
            .get("user_id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ServiceError::Malformed("auth.test returned no user_id".to_string()))?
            .to_string();
        log::info!("Slack: connected as bot user {}", bot_user_id);

        Ok(Self {
            http,
            base_url,
            token,
            bot_user_id,
        })
    }
}

/// POST a Web API method and unwrap Slack's `ok`/`error` envelope.
async fn call(
    http: &reqwest::Client,
    base_url: &str,
    token: &str,
    method: &str,
    payload: serde_json::Value,
) -> Result<serde_json::Value, ServiceError> {
    let resp = http
        .post(format!("{}/{}", base_url, method))
        .bearer_auth(token)
        .json(&payload)
        .send()
        .await?;
    envelope(resp).await
}

/// GET variant of [`call`], for read methods that take query parameters.
async fn call_get(
    http: &reqwest::Client,
    base_url: &str,
    token: &str,
    method: &str,
    query: &[(&str, &str)],
) -> Result<serde_json::Value, ServiceError> {
    let resp = http
        .get(format!("{}/{}", base_url, method))
        .bearer_auth(token)
        .query(query)
        .send()
        .await?;
    envelope(resp).await
}

async fn envelope(resp: reqwest::Response) -> Result<serde_json::Value, ServiceError> {
    let body: serde_json::Value = check_status(resp).await?.json().await?;

    if body.get("ok").and_then(|v| v.as_bool()) != Some(true) {
        let error = body
            .get("error")
            .and_then(|e| e.as_str())
            .unwrap_or("unknown error");
        return Err(ServiceError::Rejected(error.to_string()));
    }
    Ok(body)
}

#[async_trait]
impl ChatService for SlackClient {
    async fn mentions(&self, count: u32) -> Result<Vec<ChatMessage>, ServiceError> {
        let query = format!("<@{}>", self.bot_user_id);
        let count = count.to_string();
        let body = call_get(
            &self.http,
            &self.base_url,
            &self.token,
            "search.messages",
            &[("query", query.as_str()), ("count", count.as_str())],
        )
        .await?;

        let search: SearchResponse =
            serde_json::from_value(body).map_err(|e| ServiceError::Malformed(e.to_string()))?;
        let messages: Vec<ChatMessage> = search
            .messages
            .map(|m| m.matches)
            .unwrap_or_default()
            .into_iter()
            .map(|m| ChatMessage {
                id: m.ts,
                user: m.user,
                channel: m.channel.and_then(|c| c.id),
                text: m.text,
            })
            .collect();

        log::info!("Slack: found {} mention(s)", messages.len());
        Ok(messages)
    }

    async fn post_message(&self, channel_id: &str, text: &str) -> Result<(), ServiceError> {
        call(
            &self.http,
            &self.base_url,
            &self.token,
            "chat.postMessage",
            serde_json::json!({ "channel": channel_id, "text": text }),
        )
        .await?;
        log::info!("Slack: posted message to {}", channel_id);
        Ok(())
    }
}
