//! Gmail API v1: unread inbox listing and threaded replies.

use std::sync::Arc;

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE;
use base64::Engine;
use serde::{Deserialize, Serialize};

use super::{check_status, GoogleCredentials, ServiceError};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessageListResponse {
    #[serde(default)]
    messages: Vec<MessageStub>,
}

#[derive(Debug, Deserialize)]
struct MessageStub {
    id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessageDetail {
    id: String,
    #[serde(default)]
    thread_id: String,
    #[serde(default)]
    snippet: String,
    #[serde(default)]
    payload: Option<MessagePayload>,
}

#[derive(Debug, Deserialize)]
struct MessagePayload {
    #[serde(default)]
    headers: Vec<Header>,
}

#[derive(Debug, Deserialize)]
struct Header {
    name: String,
    value: String,
}

#[derive(Debug, Deserialize)]
struct ThreadResponse {
    #[serde(default)]
    messages: Vec<MessageDetail>,
}

impl MessageDetail {
    fn header(&self, name: &str) -> Option<&str> {
        self.payload
            .as_ref()?
            .headers
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.as_str())
    }
}

/// An unread inbox message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Email {
    pub id: String,
    pub thread_id: String,
    pub from: String,
    pub subject: String,
    pub snippet: String,
}

#[async_trait]
pub trait MailService: Send + Sync {
    /// Latest unread inbox messages, newest first.
    async fn unread_emails(&self, max_results: u32) -> Result<Vec<Email>, ServiceError>;

    /// Reply to the sender of the thread's first message, inside that thread.
    async fn reply_to_thread(&self, thread_id: &str, body: &str) -> Result<(), ServiceError>;
}

pub struct GmailClient {
    http: reqwest::Client,
    base_url: String,
    credentials: Arc<GoogleCredentials>,
}

impl GmailClient {
    pub fn new(http: reqwest::Client, base_url: String, credentials: Arc<GoogleCredentials>) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            credentials,
        }
    }

    async fn get_message(&self, token: &str, id: &str) -> Result<MessageDetail, ServiceError> {
        let resp = self
            .http
            .get(format!("{}/users/me/messages/{}", self.base_url, id))
            .bearer_auth(token)
            .query(&[
                ("format", "metadata"),
                ("metadataHeaders", "From"),
                ("metadataHeaders", "Subject"),
            ])
            .send()
            .await?;
        Ok(check_status(resp).await?.json().await?)
    }
}

#[async_trait]
impl MailService for GmailClient {
    async fn unread_emails(&self, max_results: u32) -> Result<Vec<Email>, ServiceError> {
        let token = self.credentials.access_token().await?;
        let max_results = max_results.to_string();

        let resp = self
            .http
            .get(format!("{}/users/me/messages", self.base_url))
            .bearer_auth(&token)
            .query(&[
                ("labelIds", "INBOX"),
                ("labelIds", "UNREAD"),
                ("maxResults", max_results.as_str()),
            ])
            .send()
            .await?;
        let list: MessageListResponse = check_status(resp).await?.json().await?;

        let mut emails = Vec::with_capacity(list.messages.len());
        for stub in &list.messages {
            let detail = self.get_message(&token, &stub.id).await?;
            emails.push(Email {
                from: detail.header("From").unwrap_or("Unknown Sender").to_string(),
                subject: detail.header("Subject").unwrap_or("No Subject").to_string(),
                id: detail.id,
                thread_id: detail.thread_id,
                snippet: detail.snippet,
            });
        }

        log::info!("Gmail: fetched {} unread email(s)", emails.len());
        Ok(emails)
    }

    async fn reply_to_thread(&self, thread_id: &str, body: &str) -> Result<(), ServiceError> {
        let token = self.credentials.access_token().await?;

        let resp = self
            .http
            .get(format!("{}/users/me/threads/{}", self.base_url, thread_id))
            .bearer_auth(&token)
            .query(&[("format", "metadata")])
            .send()
            .await?;
        let thread: ThreadResponse = check_status(resp).await?.json().await?;

        let first = thread
            .messages
            .first()
            .ok_or_else(|| ServiceError::Malformed(format!("thread {} has no messages", thread_id)))?;
        let subject = first
            .header("Subject")
            .ok_or_else(|| ServiceError::Malformed("thread has no Subject header".to_string()))?;
        let to = first
            .header("From")
            .ok_or_else(|| ServiceError::Malformed("thread has no From header".to_string()))?;

        let raw = encode_reply(to, subject, body);
        let resp = self
            .http
            .post(format!("{}/users/me/messages/send", self.base_url))
            .bearer_auth(&token)
            .json(&serde_json::json!({ "raw": raw, "threadId": thread_id }))
            .send()
            .await?;
        check_status(resp).await?;

        log::info!("Gmail: sent reply in thread {}", thread_id);
        Ok(())
    }
}

/// Plain-text RFC 2822 reply, base64url encoded for the `raw` field.
fn encode_reply(to: &str, subject: &str, body: &str) -> String {
    let message = format!(
        "Content-Type: text/plain; charset=\"utf-8\"\r\n\
         MIME-Version: 1.0\r\n\
         to: {}\r\n\
         subject: Re: {}\r\n\
         \r\n\
         {}",
        to, subject, body
    );
    URL_SAFE.encode(message.as_bytes())
}
