//! Notion API: add a row to the task database.

use async_trait::async_trait;

use super::{check_status, ServiceError};

#[async_trait]
pub trait NotesService: Send + Sync {
    async fn add_task(&self, title: &str) -> Result<(), ServiceError>;
}

pub struct NotionClient {
    http: reqwest::Client,
    base_url: String,
    version: String,
    api_key: String,
    database_id: String,
}

impl NotionClient {
    pub fn new(
        http: reqwest::Client,
        base_url: String,
        version: String,
        api_key: String,
        database_id: String,
    ) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            version,
            api_key,
            database_id,
        }
    }
}

#[async_trait]
impl NotesService for NotionClient {
    async fn add_task(&self, title: &str) -> Result<(), ServiceError> {
        let page = serde_json::json!({
            "parent": { "database_id": self.database_id },
            "properties": {
                "Task": { "title": [ { "text": { "content": title } } ] }
            }
        });

        let resp = self
            .http
            .post(format!("{}/pages", self.base_url))
            .bearer_auth(&self.api_key)
            .header("Notion-Version", &self.version)
            .json(&page)
            .send()
            .await?;
        check_status(resp).await?;

        log::info!("Notion: added task '{}'", title);
        Ok(())
    }
}
