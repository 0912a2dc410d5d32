use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{remote_failure, DynTool, NoParams, Tool, ToolError, ToolKind, ToolOutput};
use crate::services::{ChatService, MailService, Services};

const GMAIL_UNAVAILABLE: &str = "Gmail service not available.";
const SLACK_UNAVAILABLE: &str = "Slack client not available.";

/// How many items a fetch returns; no pagination past the first page.
pub const FETCH_LIMIT: u32 = 5;

pub fn tools(services: &Services) -> Vec<Arc<dyn DynTool>> {
    vec![
        Arc::new(FetchUnreadEmails { mail: services.mail.clone() }),
        Arc::new(FetchSlackMessages { chat: services.chat.clone() }),
        Arc::new(SendGmailReply { mail: services.mail.clone() }),
        Arc::new(SendSlackMessage { chat: services.chat.clone() }),
    ]
}

pub struct FetchUnreadEmails {
    mail: Option<Arc<dyn MailService>>,
}

#[async_trait]
impl Tool for FetchUnreadEmails {
    type Params = NoParams;

    fn id(&self) -> &'static str {
        "fetch_unread_emails"
    }

    fn description(&self) -> &'static str {
        "Fetches a list of the latest unread emails."
    }

    fn kind(&self) -> ToolKind {
        ToolKind::Fetch
    }

    async fn run(&self, _params: NoParams) -> Result<ToolOutput, ToolError> {
        let Some(mail) = &self.mail else {
            return Ok(ToolOutput::message(GMAIL_UNAVAILABLE));
        };
        match mail.unread_emails(FETCH_LIMIT).await {
            Ok(emails) => Ok(ToolOutput::Emails(emails)),
            Err(e) => remote_failure("An error occurred with Gmail API", e),
        }
    }
}

pub struct FetchSlackMessages {
    chat: Option<Arc<dyn ChatService>>,
}

#[async_trait]
impl Tool for FetchSlackMessages {
    type Params = NoParams;

    fn id(&self) -> &'static str {
        "fetch_slack_messages"
    }

    fn description(&self) -> &'static str {
        "Fetches a list of the latest Slack messages mentioning me."
    }

    fn kind(&self) -> ToolKind {
        ToolKind::Fetch
    }

    async fn run(&self, _params: NoParams) -> Result<ToolOutput, ToolError> {
        let Some(chat) = &self.chat else {
            return Ok(ToolOutput::message(SLACK_UNAVAILABLE));
        };
        match chat.mentions(FETCH_LIMIT).await {
            Ok(messages) => Ok(ToolOutput::ChatMessages(messages)),
            Err(e) => remote_failure("An error occurred with Slack API", e),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SendGmailReplyParams {
    pub thread_id: String,
    pub body: String,
}

pub struct SendGmailReply {
    mail: Option<Arc<dyn MailService>>,
}

#[async_trait]
impl Tool for SendGmailReply {
    type Params = SendGmailReplyParams;

    fn id(&self) -> &'static str {
        "send_gmail_reply"
    }

    fn description(&self) -> &'static str {
        "Sends a reply to a given Gmail email thread ID."
    }

    async fn run(&self, params: SendGmailReplyParams) -> Result<ToolOutput, ToolError> {
        let Some(mail) = &self.mail else {
            return Ok(ToolOutput::message(GMAIL_UNAVAILABLE));
        };
        match mail.reply_to_thread(&params.thread_id, &params.body).await {
            Ok(()) => Ok(ToolOutput::message(format!(
                "Successfully sent reply to thread {}.",
                params.thread_id
            ))),
            Err(e) => remote_failure("An error occurred sending Gmail reply", e),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SendSlackMessageParams {
    pub channel_id: String,
    pub message: String,
}

pub struct SendSlackMessage {
    chat: Option<Arc<dyn ChatService>>,
}

#[async_trait]
impl Tool for SendSlackMessage {
    type Params = SendSlackMessageParams;

    fn id(&self) -> &'static str {
        "send_slack_message"
    }

    fn description(&self) -> &'static str {
        "Sends a message to a given Slack channel or user ID."
    }

    async fn run(&self, params: SendSlackMessageParams) -> Result<ToolOutput, ToolError> {
        let Some(chat) = &self.chat else {
            return Ok(ToolOutput::message(SLACK_UNAVAILABLE));
        };
        match chat.post_message(&params.channel_id, &params.message).await {
            Ok(()) => Ok(ToolOutput::message(format!(
                "Successfully sent message to {}.",
                params.channel_id
            ))),
            Err(e) => remote_failure("An error occurred sending Slack message", e),
        }
    }
}
