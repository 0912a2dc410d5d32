//! Turns fetched items into the short list of proposals shown to the user.

use std::collections::HashMap;

use serde::Serialize;

use crate::services::{Email, WorkItem, WorkItemKind};
use crate::tools::{
    AddNotionTaskParams, MergePullRequestParams, PostGithubCommentParams, SendGmailReplyParams,
    ToolOutput,
};

pub const MAX_TASKS: usize = 5;

/// Fetch results keyed by the id of the tool that produced them.
pub type PlanOutputs = HashMap<String, ToolOutput>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskKind {
    Notion,
    Gmail,
    Github,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
}

/// The single follow-up suggested for an item, in the shape `/api/approve` accepts.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "tool_id", content = "params", rename_all = "snake_case")]
pub enum ProposedAction {
    SendGmailReply(SendGmailReplyParams),
    AddTaskToNotionDb(AddNotionTaskParams),
    MergePullRequest(MergePullRequestParams),
    PostGithubComment(PostGithubCommentParams),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProposedTask {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: TaskKind,
    pub summary: String,
    pub source: String,
    pub priority: Priority,
    pub proposed_action: ProposedAction,
}

/// Decides whether an email needs a tracked follow-up instead of a quick reply.
pub trait UrgencyPolicy: Send + Sync {
    fn is_urgent(&self, email: &Email) -> bool;
}

/// Case-insensitive keyword match on the subject line.
#[derive(Debug, Clone)]
pub struct KeywordPolicy {
    keyword: String,
}

impl KeywordPolicy {
    pub fn new(keyword: &str) -> Self {
        Self {
            keyword: keyword.to_lowercase(),
        }
    }
}

impl Default for KeywordPolicy {
    fn default() -> Self {
        Self::new("urgent")
    }
}

impl UrgencyPolicy for KeywordPolicy {
    fn is_urgent(&self, email: &Email) -> bool {
        email.subject.to_lowercase().contains(&self.keyword)
    }
}

fn email_action(email: &Email, urgent: bool) -> (TaskKind, ProposedAction) {
    if urgent {
        let params = AddNotionTaskParams {
            task_title: format!("Follow up on email: {}", email.subject),
        };
        return (TaskKind::Notion, ProposedAction::AddTaskToNotionDb(params));
    }

    let thread_id = if email.thread_id.is_empty() {
        email.id.clone()
    } else {
        email.thread_id.clone()
    };
    let params = SendGmailReplyParams {
        thread_id,
        body: format!(
            "AI DRAFT: Thanks for your email about '{}'. I'm on it.",
            email.subject
        ),
    };
    (TaskKind::Gmail, ProposedAction::SendGmailReply(params))
}

fn work_item_action(item: &WorkItem) -> ProposedAction {
    match item.kind {
        WorkItemKind::PullRequest => ProposedAction::MergePullRequest(MergePullRequestParams {
            repo_name: item.repo.clone(),
            pr_number: item.number,
            merge_method: "squash".to_string(),
        }),
        WorkItemKind::Issue => ProposedAction::PostGithubComment(PostGithubCommentParams {
            repo_name: item.repo.clone(),
            issue_number: item.number,
            comment: "AI DRAFT: Thanks for flagging this. I'll investigate.".to_string(),
        }),
    }
}

/// Build at most [`MAX_TASKS`] proposals: emails first, then GitHub items,
/// each in fetch order. Outputs that are not item lists are ignored.
pub fn build_daily_plan(outputs: &PlanOutputs, policy: &dyn UrgencyPolicy) -> Vec<ProposedTask> {
    let mut drafts: Vec<(TaskKind, String, &'static str, ProposedAction)> = Vec::new();

    if let Some(ToolOutput::Emails(emails)) = outputs.get("fetch_unread_emails") {
        for email in emails {
            let (kind, action) = email_action(email, policy.is_urgent(email));
            let summary = format!("Email from {}: {}", email.from, email.subject);
            drafts.push((kind, summary, "Gmail", action));
        }
    }

    if let Some(ToolOutput::WorkItems(items)) = outputs.get("fetch_github_items") {
        for item in items {
            let summary = format!("GitHub {} in {}: {}", item.kind, item.repo, item.title);
            drafts.push((TaskKind::Github, summary, "GitHub", work_item_action(item)));
        }
    }

    drafts
        .into_iter()
        .take(MAX_TASKS)
        .enumerate()
        .map(|(i, (kind, summary, source, proposed_action))| ProposedTask {
            id: format!("task_{}", i + 1),
            kind,
            summary,
            source: source.to_string(),
            priority: Priority::High,
            proposed_action,
        })
        .collect()
}
