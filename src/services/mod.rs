//! Thin clients for the external accounts the tools act on.
//!
//! Each client sits behind an async trait so the tool layer never depends on
//! a concrete HTTP backend. A client that cannot be initialized is simply
//! absent from [`Services`]; the tools report it as unavailable.

pub mod calendar;
pub mod github;
pub mod gmail;
pub mod google;
pub mod notion;
pub mod slack;

use std::sync::Arc;

use anyhow::{Context, Result};

use crate::config::{Config, HttpConfig, Secrets};

pub use calendar::{BusyInterval, CalendarService, GoogleCalendarClient, NewEvent};
pub use github::{CodeHostService, GitHubClient, MergeOutcome, WorkItem, WorkItemKind};
pub use gmail::{Email, GmailClient, MailService};
pub use google::{GoogleAuthError, GoogleCredentials};
pub use notion::{NotesService, NotionClient};
pub use slack::{ChatMessage, ChatService, SlackClient};

/// Failure of a single remote call.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("HTTP: {0}")]
    Http(reqwest::Error),
    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },
    #[error("{0}")]
    Rejected(String),
    #[error("authentication failed: {0}")]
    Auth(#[from] GoogleAuthError),
    #[error("unexpected response: {0}")]
    Malformed(String),
}

impl From<reqwest::Error> for ServiceError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ServiceError::Malformed(err.to_string())
        } else {
            ServiceError::Http(err)
        }
    }
}

impl ServiceError {
    /// Malformed responses are bugs or contract breaks, everything else is a
    /// remote failure the caller reports back as text.
    pub fn is_malformed(&self) -> bool {
        matches!(self, ServiceError::Malformed(_))
    }
}

/// Turn a non-2xx response into [`ServiceError::Api`].
pub(crate) async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response, ServiceError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let message = resp.text().await.unwrap_or_default();
    Err(ServiceError::Api {
        status: status.as_u16(),
        message,
    })
}

/// Shared HTTP client with an explicit per-call timeout.
pub fn http_client(config: &HttpConfig) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(config.timeout())
        .user_agent(concat!("chief-of-staff/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("Failed to build HTTP client")
}

/// Handles for every external account. `None` means unavailable.
#[derive(Clone, Default)]
pub struct Services {
    pub mail: Option<Arc<dyn MailService>>,
    pub chat: Option<Arc<dyn ChatService>>,
    pub code_host: Option<Arc<dyn CodeHostService>>,
    pub notes: Option<Arc<dyn NotesService>>,
    pub calendar: Option<Arc<dyn CalendarService>>,
}

impl Services {
    /// Initialize every client once at process start.
    ///
    /// Initialization failures are logged and leave the handle empty; they
    /// never abort startup.
    pub async fn connect(config: &Config, secrets: &Secrets, http: &reqwest::Client) -> Self {
        let endpoints = &config.services;

        let google = match (&secrets.google_token_json, &secrets.google_credentials_json) {
            (Some(token), Some(creds)) => {
                match GoogleCredentials::from_json(token, creds, http.clone()).await {
                    Ok(c) => Some(Arc::new(c)),
                    Err(e) => {
                        log::error!("Error initializing Google credentials: {}", e);
                        None
                    }
                }
            }
            _ => {
                log::warn!("GOOGLE_TOKEN_JSON or GOOGLE_CREDENTIALS_JSON not set; Gmail and Calendar disabled");
                None
            }
        };

        let mail = google.clone().map(|creds| {
            Arc::new(GmailClient::new(http.clone(), endpoints.gmail_api.clone(), creds))
                as Arc<dyn MailService>
        });

        let calendar = google.map(|creds| {
            Arc::new(GoogleCalendarClient::new(
                http.clone(),
                endpoints.calendar_api.clone(),
                creds,
            )) as Arc<dyn CalendarService>
        });

        let chat = match &secrets.slack_bot_token {
            Some(token) => {
                match SlackClient::connect(http.clone(), endpoints.slack_api.clone(), token.clone()).await {
                    Ok(c) => Some(Arc::new(c) as Arc<dyn ChatService>),
                    Err(e) => {
                        log::error!("Error initializing Slack client: {}", e);
                        None
                    }
                }
            }
            None => {
                log::warn!("SLACK_BOT_TOKEN not set; Slack disabled");
                None
            }
        };

        let code_host = match &secrets.github_token {
            Some(token) => {
                match GitHubClient::connect(http.clone(), endpoints.github_api.clone(), token.clone()).await {
                    Ok(c) => Some(Arc::new(c) as Arc<dyn CodeHostService>),
                    Err(e) => {
                        log::error!("Error initializing GitHub client: {}", e);
                        None
                    }
                }
            }
            None => {
                log::warn!("GITHUB_TOKEN not set; GitHub disabled");
                None
            }
        };

        let notes = match (&secrets.notion_api_key, &secrets.notion_database_id) {
            (Some(key), Some(database_id)) => Some(Arc::new(NotionClient::new(
                http.clone(),
                endpoints.notion_api.clone(),
                endpoints.notion_version.clone(),
                key.clone(),
                database_id.clone(),
            )) as Arc<dyn NotesService>),
            _ => {
                log::warn!("NOTION_API_KEY or NOTION_DATABASE_ID not set; Notion disabled");
                None
            }
        };

        let services = Self {
            mail,
            chat,
            code_host,
            notes,
            calendar,
        };
        log::info!("Services available: {}", services.summary());
        services
    }

    fn summary(&self) -> String {
        let flag = |name: &str, present: bool| format!("{}={}", name, if present { "yes" } else { "no" });
        [
            flag("gmail", self.mail.is_some()),
            flag("slack", self.chat.is_some()),
            flag("github", self.code_host.is_some()),
            flag("notion", self.notes.is_some()),
            flag("calendar", self.calendar.is_some()),
        ]
        .join(" ")
    }
}
