pub mod communication;
pub mod github;
pub mod productivity;
pub mod scheduling;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::services::{ChatMessage, Email, ServiceError, Services, WorkItem};

pub use communication::{SendGmailReplyParams, SendSlackMessageParams};
pub use github::{MergePullRequestParams, PostGithubCommentParams};
pub use productivity::AddNotionTaskParams;
pub use scheduling::ScheduleMeetingParams;

/// Tool trait for planner- and approval-driven operations.
///
/// Not object-safe (associated params type). The catalog stores tools as
/// [`DynTool`], which every `Tool` gets for free and which validates raw JSON
/// against `Params` before calling [`Tool::run`].
#[async_trait]
pub trait Tool: Send + Sync {
    type Params: DeserializeOwned + Send;

    fn id(&self) -> &'static str;
    fn description(&self) -> &'static str;

    fn kind(&self) -> ToolKind {
        ToolKind::Action
    }

    async fn run(&self, params: Self::Params) -> Result<ToolOutput, ToolError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolKind {
    /// Read-only; safe to run while planning.
    Fetch,
    /// Side-effecting; runs only after approval.
    Action,
}

/// Parameters of tools that take none.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NoParams {}

/// What a tool hands back: fetched items, or a human-readable message.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ToolOutput {
    Emails(Vec<Email>),
    WorkItems(Vec<WorkItem>),
    ChatMessages(Vec<ChatMessage>),
    Message(String),
}

impl ToolOutput {
    pub fn message(text: impl Into<String>) -> Self {
        ToolOutput::Message(text.into())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("Tool '{0}' not found")]
    NotFound(String),
    #[error("Invalid params for '{tool}': {source}")]
    InvalidParams {
        tool: String,
        #[source]
        source: serde_json::Error,
    },
    #[error(transparent)]
    Execution(#[from] anyhow::Error),
}

/// Report a failed remote call as text, as the caller expects, unless the
/// response itself was malformed.
pub(crate) fn remote_failure(prefix: &str, err: ServiceError) -> Result<ToolOutput, ToolError> {
    if err.is_malformed() {
        return Err(ToolError::Execution(anyhow::Error::new(err).context(prefix.to_string())));
    }
    log::warn!("{}: {}", prefix, err);
    Ok(ToolOutput::Message(format!("{}: {}", prefix, err)))
}

/// Object-safe view of a [`Tool`].
#[async_trait]
pub trait DynTool: Send + Sync {
    fn id(&self) -> &'static str;
    fn description(&self) -> &'static str;
    fn kind(&self) -> ToolKind;
    async fn invoke(&self, params: serde_json::Value) -> Result<ToolOutput, ToolError>;
}

#[async_trait]
impl<T: Tool> DynTool for T {
    fn id(&self) -> &'static str {
        Tool::id(self)
    }

    fn description(&self) -> &'static str {
        Tool::description(self)
    }

    fn kind(&self) -> ToolKind {
        Tool::kind(self)
    }

    async fn invoke(&self, params: serde_json::Value) -> Result<ToolOutput, ToolError> {
        let params = serde_json::from_value::<T::Params>(params).map_err(|source| ToolError::InvalidParams {
            tool: Tool::id(self).to_string(),
            source,
        })?;
        self.run(params).await
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub id: String,
    pub description: String,
    pub kind: ToolKind,
}

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("duplicate tool id '{0}'")]
    DuplicateId(String),
}

/// Immutable registry of every tool, keyed by id, in registration order.
pub struct ToolCatalog {
    tools: Vec<Arc<dyn DynTool>>,
    index: HashMap<&'static str, usize>,
}

impl ToolCatalog {
    pub fn new(tools: Vec<Arc<dyn DynTool>>) -> Result<Self, CatalogError> {
        let mut index = HashMap::with_capacity(tools.len());
        for (i, tool) in tools.iter().enumerate() {
            if index.insert(tool.id(), i).is_some() {
                return Err(CatalogError::DuplicateId(tool.id().to_string()));
            }
        }
        Ok(Self { tools, index })
    }

    /// Communication, GitHub, scheduling and productivity tools, in that order.
    pub fn standard(services: &Services) -> Result<Self, CatalogError> {
        let mut tools = communication::tools(services);
        tools.extend(github::tools(services));
        tools.extend(scheduling::tools(services));
        tools.extend(productivity::tools(services));
        Self::new(tools)
    }

    pub fn get(&self, id: &str) -> Option<&Arc<dyn DynTool>> {
        self.index.get(id).map(|&i| &self.tools[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn DynTool>> {
        self.tools.iter()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn descriptors(&self) -> Vec<ToolDescriptor> {
        self.tools
            .iter()
            .map(|t| ToolDescriptor {
                id: t.id().to_string(),
                description: t.description().to_string(),
                kind: t.kind(),
            })
            .collect()
    }

    /// Look up `id` and run it with `params`.
    pub async fn dispatch(&self, id: &str, params: serde_json::Value) -> Result<ToolOutput, ToolError> {
        let tool = self.get(id).ok_or_else(|| ToolError::NotFound(id.to_string()))?;
        log::info!("Dispatching tool {}", id);
        tool.invoke(params).await
    }
}
