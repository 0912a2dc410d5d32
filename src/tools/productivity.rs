use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{remote_failure, DynTool, Tool, ToolError, ToolOutput};
use crate::services::{NotesService, Services};

pub fn tools(services: &Services) -> Vec<Arc<dyn DynTool>> {
    vec![Arc::new(AddTaskToNotionDb { notes: services.notes.clone() })]
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AddNotionTaskParams {
    pub task_title: String,
}

pub struct AddTaskToNotionDb {
    notes: Option<Arc<dyn NotesService>>,
}

#[async_trait]
impl Tool for AddTaskToNotionDb {
    type Params = AddNotionTaskParams;

    fn id(&self) -> &'static str {
        "add_task_to_notion_db"
    }

    fn description(&self) -> &'static str {
        "Adds a new task to the user's primary Notion task database."
    }

    async fn run(&self, params: AddNotionTaskParams) -> Result<ToolOutput, ToolError> {
        let Some(notes) = &self.notes else {
            return Ok(ToolOutput::message("Notion client not initialized."));
        };
        match notes.add_task(&params.task_title).await {
            Ok(()) => Ok(ToolOutput::message(format!(
                "Successfully added task '{}' to Notion.",
                params.task_title
            ))),
            Err(e) => remote_failure("Error adding task to Notion", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::ServiceError;

    struct Notes(Result<(), u16>);

    #[async_trait]
    impl NotesService for Notes {
        async fn add_task(&self, _title: &str) -> Result<(), ServiceError> {
            self.0.map_err(|status| ServiceError::Api {
                status,
                message: "validation_error".to_string(),
            })
        }
    }

    fn params() -> AddNotionTaskParams {
        AddNotionTaskParams { task_title: "Follow up on email: Budget".to_string() }
    }

    #[tokio::test]
    async fn test_add_task_outcomes() {
        let out = AddTaskToNotionDb { notes: Some(Arc::new(Notes(Ok(())))) }
            .run(params())
            .await
            .unwrap();
        assert_eq!(
            out,
            ToolOutput::message("Successfully added task 'Follow up on email: Budget' to Notion.")
        );

        let out = AddTaskToNotionDb { notes: Some(Arc::new(Notes(Err(400)))) }
            .run(params())
            .await
            .unwrap();
        match out {
            ToolOutput::Message(text) => assert!(text.starts_with("Error adding task to Notion: ")),
            other => panic!("unexpected output {:?}", other),
        }

        let out = AddTaskToNotionDb { notes: None }.run(params()).await.unwrap();
        assert_eq!(out, ToolOutput::message("Notion client not initialized."));
    }
}
