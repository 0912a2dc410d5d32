//! Decides which fetch tools feed the daily plan, and runs them.

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;

use crate::aggregate::PlanOutputs;
use crate::config::PlannerConfig;
use crate::ollama::{ChatRequest, OllamaClient};
use crate::tools::{ToolCatalog, ToolKind};

pub const DAILY_PLAN_PROMPT: &str = "You are an AI Chief of Staff. Create a prioritized daily action plan (max 5 items). \
1. Fetch all tasks from emails, Slack, and GitHub. \
2. For each high-priority item, generate a proactive next step (e.g., draft a reply, add a task to Notion). \
3. Present the final output as a JSON list of tasks, each with a 'proposed_action' object.";

#[async_trait]
pub trait Planner: Send + Sync {
    /// Run the fetch tools relevant to `prompt` and return their outputs by tool id.
    async fn plan(&self, prompt: &str, catalog: &ToolCatalog) -> Result<PlanOutputs>;
}

/// Build the planner named by `config.provider`.
pub fn from_config(config: &PlannerConfig, http: reqwest::Client) -> Result<Arc<dyn Planner>> {
    match config.provider.as_str() {
        "ollama" => Ok(Arc::new(OllamaPlanner::new(http, config))),
        "static" => Ok(Arc::new(StaticPlanner)),
        other => anyhow::bail!("Unknown planner provider '{}' (expected 'ollama' or 'static')", other),
    }
}

/// Run each selected id once, in order. Unknown ids, action tools and tools
/// that fail are skipped.
async fn run_fetch_tools<I>(ids: I, catalog: &ToolCatalog) -> PlanOutputs
where
    I: IntoIterator<Item = String>,
{
    let mut seen = HashSet::new();
    let mut outputs = PlanOutputs::new();

    for id in ids {
        if !seen.insert(id.clone()) {
            continue;
        }
        let Some(tool) = catalog.get(&id) else {
            log::warn!("Planner: skipping unknown tool '{}'", id);
            continue;
        };
        if tool.kind() != ToolKind::Fetch {
            log::warn!("Planner: refusing to run action tool '{}' while planning", id);
            continue;
        }

        log::info!("Planner: running {}", id);
        match catalog.dispatch(&id, serde_json::json!({})).await {
            Ok(output) => {
                outputs.insert(id, output);
            }
            // A failed source contributes nothing; the rest of the plan stands
            Err(e) => log::error!(
                "Planner: tool '{}' failed, skipping its items: {:#}",
                id,
                anyhow::Error::new(e)
            ),
        }
    }

    outputs
}

/// Runs every fetch tool in catalog order, no LLM involved.
pub struct StaticPlanner;

#[async_trait]
impl Planner for StaticPlanner {
    async fn plan(&self, _prompt: &str, catalog: &ToolCatalog) -> Result<PlanOutputs> {
        let ids: Vec<String> = catalog
            .iter()
            .filter(|t| t.kind() == ToolKind::Fetch)
            .map(|t| t.id().to_string())
            .collect();
        Ok(run_fetch_tools(ids, catalog).await)
    }
}

#[derive(Debug, Deserialize)]
struct ToolSelection {
    #[serde(default)]
    tools: Vec<String>,
}

/// Asks a local Ollama model which tools to run.
pub struct OllamaPlanner {
    ollama: OllamaClient,
    temperature: f32,
    top_p: f32,
}

impl OllamaPlanner {
    pub fn new(http: reqwest::Client, config: &PlannerConfig) -> Self {
        Self {
            ollama: OllamaClient::new(http, config),
            temperature: config.temperature,
            top_p: config.top_p,
        }
    }

    fn build_system_prompt(catalog: &ToolCatalog) -> String {
        let mut prompt = String::from(
            "You select which tools to run to gather information for a task.\n\n\
             Available tools:\n",
        );
        for tool in catalog.iter() {
            let kind = match tool.kind() {
                ToolKind::Fetch => "fetch",
                ToolKind::Action => "action",
            };
            prompt.push_str(&format!("- {} ({}): {}\n", tool.id(), kind, tool.description()));
        }
        prompt.push_str(
            "\nOnly fetch tools can be run now; actions are proposed to the user later.\n\
             Respond with a JSON object of the form {\"tools\": [\"tool_id\", ...]} \
             listing the tools to run, in order.",
        );
        prompt
    }
}

#[async_trait]
impl Planner for OllamaPlanner {
    async fn plan(&self, prompt: &str, catalog: &ToolCatalog) -> Result<PlanOutputs> {
        log::info!("Planner: asking {} which tools to run", self.ollama.model);
        let response = self
            .ollama
            .chat(ChatRequest {
                system_prompt: Self::build_system_prompt(catalog),
                user_prompt: prompt.to_string(),
                temperature: self.temperature,
                top_p: self.top_p,
                json_format: true,
            })
            .await
            .context("Planner: LLM tool selection failed")?;

        let selection: ToolSelection = serde_json::from_str(&response)
            .context("Planner: failed to parse tool selection JSON from LLM")?;
        log::info!("Planner: selected {:?}", selection.tools);

        Ok(run_fetch_tools(selection.tools, catalog).await)
    }
}
