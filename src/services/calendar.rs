//! Google Calendar API v3: free/busy lookup and event creation.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use super::{check_status, GoogleCredentials, ServiceError};

/// A range during which the primary calendar is occupied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusyInterval {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewEvent {
    pub summary: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub attendees: Vec<String>,
}

#[async_trait]
pub trait CalendarService: Send + Sync {
    /// Busy intervals of the primary calendar within `[time_min, time_max]`, as reported.
    async fn busy_intervals(
        &self,
        time_min: DateTime<Utc>,
        time_max: DateTime<Utc>,
    ) -> Result<Vec<BusyInterval>, ServiceError>;

    /// Insert into the primary calendar, returning the event's HTML link.
    async fn insert_event(&self, event: &NewEvent) -> Result<String, ServiceError>;
}

#[derive(Debug, Deserialize)]
struct FreeBusyResponse {
    #[serde(default)]
    calendars: std::collections::HashMap<String, FreeBusyCalendar>,
}

#[derive(Debug, Deserialize)]
struct FreeBusyCalendar {
    #[serde(default)]
    busy: Vec<RawBusy>,
}

#[derive(Debug, Deserialize)]
struct RawBusy {
    start: String,
    end: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InsertedEvent {
    #[serde(default)]
    html_link: Option<String>,
}

fn parse_time(raw: &str) -> Result<DateTime<Utc>, ServiceError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| ServiceError::Malformed(format!("bad busy timestamp {:?}: {}", raw, e)))
}

/// Keeps sub-second precision so the created event starts exactly at the
/// computed slot.
fn rfc3339(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

pub struct GoogleCalendarClient {
    http: reqwest::Client,
    base_url: String,
    credentials: Arc<GoogleCredentials>,
}

impl GoogleCalendarClient {
    pub fn new(http: reqwest::Client, base_url: String, credentials: Arc<GoogleCredentials>) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            credentials,
        }
    }
}

#[async_trait]
impl CalendarService for GoogleCalendarClient {
    async fn busy_intervals(
        &self,
        time_min: DateTime<Utc>,
        time_max: DateTime<Utc>,
    ) -> Result<Vec<BusyInterval>, ServiceError> {
        let token = self.credentials.access_token().await?;
        let resp = self
            .http
            .post(format!("{}/freeBusy", self.base_url))
            .bearer_auth(&token)
            .json(&serde_json::json!({
                "timeMin": rfc3339(time_min),
                "timeMax": rfc3339(time_max),
                "items": [ { "id": "primary" } ]
            }))
            .send()
            .await?;
        let body: FreeBusyResponse = check_status(resp).await?.json().await?;

        let primary = body
            .calendars
            .get("primary")
            .ok_or_else(|| ServiceError::Malformed("freeBusy response has no primary calendar".to_string()))?;

        primary
            .busy
            .iter()
            .map(|b| {
                Ok(BusyInterval {
                    start: parse_time(&b.start)?,
                    end: parse_time(&b.end)?,
                })
            })
            .collect()
    }

    async fn insert_event(&self, event: &NewEvent) -> Result<String, ServiceError> {
        let token = self.credentials.access_token().await?;
        let attendees: Vec<serde_json::Value> = event
            .attendees
            .iter()
            .map(|email| serde_json::json!({ "email": email }))
            .collect();

        let resp = self
            .http
            .post(format!("{}/calendars/primary/events", self.base_url))
            .bearer_auth(&token)
            .json(&serde_json::json!({
                "summary": event.summary,
                "start": { "dateTime": rfc3339(event.start), "timeZone": "UTC" },
                "end": { "dateTime": rfc3339(event.end), "timeZone": "UTC" },
                "attendees": attendees,
            }))
            .send()
            .await?;
        let created: InsertedEvent = check_status(resp).await?.json().await?;

        log::info!("Calendar: created '{}' at {}", event.summary, rfc3339(event.start));
        Ok(created.html_link.unwrap_or_default())
    }
}
