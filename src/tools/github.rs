use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::communication::FETCH_LIMIT;
use super::{remote_failure, DynTool, NoParams, Tool, ToolError, ToolKind, ToolOutput};
use crate::services::{CodeHostService, MergeOutcome, Services};

const GITHUB_UNAVAILABLE: &str = "GitHub client not initialized.";

pub fn tools(services: &Services) -> Vec<Arc<dyn DynTool>> {
    vec![
        Arc::new(FetchGithubItems { github: services.code_host.clone() }),
        Arc::new(PostGithubComment { github: services.code_host.clone() }),
        Arc::new(MergePullRequest { github: services.code_host.clone() }),
    ]
}

pub struct FetchGithubItems {
    github: Option<Arc<dyn CodeHostService>>,
}

#[async_trait]
impl Tool for FetchGithubItems {
    type Params = NoParams;

    fn id(&self) -> &'static str {
        "fetch_github_items"
    }

    fn description(&self) -> &'static str {
        "Fetches all open pull requests and issues assigned to the current user."
    }

    fn kind(&self) -> ToolKind {
        ToolKind::Fetch
    }

    async fn run(&self, _params: NoParams) -> Result<ToolOutput, ToolError> {
        let Some(github) = &self.github else {
            return Ok(ToolOutput::message(GITHUB_UNAVAILABLE));
        };
        match github.assigned_items(FETCH_LIMIT).await {
            Ok(items) => Ok(ToolOutput::WorkItems(items)),
            Err(e) => remote_failure("Error fetching GitHub items", e),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PostGithubCommentParams {
    pub repo_name: String,
    pub issue_number: u64,
    pub comment: String,
}

pub struct PostGithubComment {
    github: Option<Arc<dyn CodeHostService>>,
}

#[async_trait]
impl Tool for PostGithubComment {
    type Params = PostGithubCommentParams;

    fn id(&self) -> &'static str {
        "post_github_comment"
    }

    fn description(&self) -> &'static str {
        "Posts a comment to a GitHub issue or pull request."
    }

    async fn run(&self, params: PostGithubCommentParams) -> Result<ToolOutput, ToolError> {
        let Some(github) = &self.github else {
            return Ok(ToolOutput::message(GITHUB_UNAVAILABLE));
        };
        match github
            .comment(&params.repo_name, params.issue_number, &params.comment)
            .await
        {
            Ok(()) => Ok(ToolOutput::message(format!(
                "Successfully posted comment to {}#{}.",
                params.repo_name, params.issue_number
            ))),
            Err(e) => remote_failure("Error posting comment", e),
        }
    }
}

fn default_merge_method() -> String {
    "merge".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MergePullRequestParams {
    pub repo_name: String,
    pub pr_number: u64,
    #[serde(default = "default_merge_method")]
    pub merge_method: String,
}

pub struct MergePullRequest {
    github: Option<Arc<dyn CodeHostService>>,
}

#[async_trait]
impl Tool for MergePullRequest {
    type Params = MergePullRequestParams;

    fn id(&self) -> &'static str {
        "merge_pull_request"
    }

    fn description(&self) -> &'static str {
        "Merges a pull request."
    }

    async fn run(&self, params: MergePullRequestParams) -> Result<ToolOutput, ToolError> {
        let Some(github) = &self.github else {
            return Ok(ToolOutput::message(GITHUB_UNAVAILABLE));
        };
        match github
            .merge_pull_request(&params.repo_name, params.pr_number, &params.merge_method)
            .await
        {
            Ok(MergeOutcome::Merged) => Ok(ToolOutput::message(format!(
                "Successfully merged PR #{} in {}.",
                params.pr_number, params.repo_name
            ))),
            Ok(MergeOutcome::NotMergeable) => Ok(ToolOutput::message(format!(
                "Error: PR #{} in {} is not mergeable.",
                params.pr_number, params.repo_name
            ))),
            Err(e) => remote_failure("Error merging PR", e),
        }
    }
}
