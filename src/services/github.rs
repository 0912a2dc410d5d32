//! GitHub REST API: assigned issues/PRs, comments and merges.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{check_status, ServiceError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkItemKind {
    Issue,
    #[serde(rename = "PR")]
    PullRequest,
}

impl fmt::Display for WorkItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkItemKind::Issue => write!(f, "Issue"),
            WorkItemKind::PullRequest => write!(f, "PR"),
        }
    }
}

/// An open issue or pull request assigned to the authenticated user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkItem {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: WorkItemKind,
    pub title: String,
    pub url: String,
    pub repo: String,
    pub number: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeOutcome {
    Merged,
    NotMergeable,
}

#[async_trait]
pub trait CodeHostService: Send + Sync {
    async fn assigned_items(&self, max_results: u32) -> Result<Vec<WorkItem>, ServiceError>;
    async fn comment(&self, repo: &str, number: u64, body: &str) -> Result<(), ServiceError>;
    async fn merge_pull_request(
        &self,
        repo: &str,
        number: u64,
        merge_method: &str,
    ) -> Result<MergeOutcome, ServiceError>;
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<SearchItem>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    number: u64,
    title: String,
    html_url: String,
    repository_url: String,
    #[serde(default)]
    pull_request: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct PullRequestState {
    #[serde(default)]
    mergeable: Option<bool>,
}

pub struct GitHubClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
    login: String,
}

impl GitHubClient {
    /// Resolve the token's user login, used to build the assignee query.
    pub async fn connect(http: reqwest::Client, base_url: String, token: String) -> Result<Self, ServiceError> {
        let base_url = base_url.trim_end_matches('/').to_string();
        let resp = http
            .get(format!("{}/user", base_url))
            .bearer_auth(&token)
            .header(reqwest::header::ACCEPT, "application/vnd.github+json")
            .header(reqwest::header::USER_AGENT, "chief-of-staff")
            .send()
            .await?;
        let user: serde_json::Value = check_status(resp).await?.json().await?;
        let login = user
            .get("login")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ServiceError::Malformed("GET /user returned no login".to_string()))?
            .to_string();
        log::info!("GitHub: authenticated as {}", login);

        Ok(Self {
            http,
            base_url,
            token,
            login,
        })
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.http
            .request(method, format!("{}{}", self.base_url, path))
            .bearer_auth(&self.token)
            .header(reqwest::header::ACCEPT, "application/vnd.github+json")
            .header(reqwest::header::USER_AGENT, "chief-of-staff")
    }
}

/// `https://api.github.com/repos/owner/name` → `owner/name`.
fn repo_full_name(repository_url: &str) -> Option<String> {
    let rest = repository_url.split("/repos/").nth(1)?;
    let mut parts = rest.trim_end_matches('/').splitn(2, '/');
    let owner = parts.next().filter(|s| !s.is_empty())?;
    let name = parts.next().filter(|s| !s.is_empty())?;
    Some(format!("{}/{}", owner, name))
}

#[async_trait]
impl CodeHostService for GitHubClient {
    async fn assigned_items(&self, max_results: u32) -> Result<Vec<WorkItem>, ServiceError> {
        let query = format!("assignee:{} is:open", self.login);
        let resp = self
            .request(reqwest::Method::GET, "/search/issues")
            .query(&[("q", query.as_str()), ("per_page", max_results.to_string().as_str())])
            .send()
            .await?;
        let search: SearchResponse = check_status(resp).await?.json().await?;

        let mut items = Vec::with_capacity(search.items.len());
        for item in search.items.into_iter().take(max_results as usize) {
            let repo = repo_full_name(&item.repository_url).ok_or_else(|| {
                ServiceError::Malformed(format!("unexpected repository_url {}", item.repository_url))
            })?;
            items.push(WorkItem {
                id: format!("github-{}", item.number),
                kind: if item.pull_request.is_some() {
                    WorkItemKind::PullRequest
                } else {
                    WorkItemKind::Issue
                },
                title: item.title,
                url: item.html_url,
                repo,
                number: item.number,
            });
        }

        log::info!("GitHub: found {} open assigned item(s)", items.len());
        Ok(items)
    }

    async fn comment(&self, repo: &str, number: u64, body: &str) -> Result<(), ServiceError> {
        let resp = self
            .request(reqwest::Method::POST, &format!("/repos/{}/issues/{}/comments", repo, number))
            .json(&serde_json::json!({ "body": body }))
            .send()
            .await?;
        check_status(resp).await?;
        log::info!("GitHub: commented on {}#{}", repo, number);
        Ok(())
    }

    async fn merge_pull_request(
        &self,
        repo: &str,
        number: u64,
        merge_method: &str,
    ) -> Result<MergeOutcome, ServiceError> {
        let resp = self
            .request(reqwest::Method::GET, &format!("/repos/{}/pulls/{}", repo, number))
            .send()
            .await?;
        let pr: PullRequestState = check_status(resp).await?.json().await?;

        // `null` means GitHub has not computed mergeability yet
        if pr.mergeable != Some(true) {
            log::warn!("GitHub: {}#{} is not mergeable ({:?})", repo, number, pr.mergeable);
            return Ok(MergeOutcome::NotMergeable);
        }

        let resp = self
            .request(reqwest::Method::PUT, &format!("/repos/{}/pulls/{}/merge", repo, number))
            .json(&serde_json::json!({ "merge_method": merge_method }))
            .send()
            .await?;
        check_status(resp).await?;
        log::info!("GitHub: merged {}#{} ({})", repo, number, merge_method);
        Ok(MergeOutcome::Merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    async fn connected(server: &mut mockito::ServerGuard) -> GitHubClient {
        let _user = server
            .mock("GET", "/user")
            .match_header("authorization", "Bearer ghp_test")
            .with_status(200)
            .with_body(r#"{"login":"octocat"}"#)
            .create_async()
            .await;
        GitHubClient::connect(reqwest::Client::new(), server.url(), "ghp_test".to_string())
            .await
            .unwrap()
    }

    #[test]
    fn test_repo_full_name() {
        assert_eq!(
            repo_full_name("https://api.github.com/repos/octo/hello-world").as_deref(),
            Some("octo/hello-world")
        );
        assert_eq!(repo_full_name("https://api.github.com/users/octo"), None);
        assert_eq!(repo_full_name("https://api.github.com/repos/octo"), None);
    }

    #[tokio::test]
    async fn test_assigned_items_distinguishes_prs() {
        let mut server = mockito::Server::new_async().await;
        let client = connected(&mut server).await;
        let _search = server
            .mock("GET", "/search/issues")
            .match_query(Matcher::UrlEncoded("q".into(), "assignee:octocat is:open".into()))
            .with_status(200)
            .with_body(
                r#"{"total_count":2,"items":[
                    {"number":7,"title":"Fix login","html_url":"https://github.com/o/r/pull/7",
                     "repository_url":"https://api.github.com/repos/o/r","pull_request":{"url":"x"}},
                    {"number":9,"title":"Crash on start","html_url":"https://github.com/o/r/issues/9",
                     "repository_url":"https://api.github.com/repos/o/r"}]}"#,
            )
            .create_async()
            .await;

        let items = client.assigned_items(5).await.unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].id, "github-7");
        assert_eq!(items[0].kind, WorkItemKind::PullRequest);
        assert_eq!(items[0].repo, "o/r");
        assert_eq!(items[1].kind, WorkItemKind::Issue);
    }

    #[tokio::test]
    async fn test_merge_checks_mergeable_first() {
        let mut server = mockito::Server::new_async().await;
        let client = connected(&mut server).await;
        let _pr = server
            .mock("GET", "/repos/o/r/pulls/7")
            .with_status(200)
            .with_body(r#"{"number":7,"mergeable":false}"#)
            .create_async()
            .await;
        let merge = server
            .mock("PUT", "/repos/o/r/pulls/7/merge")
            .expect(0)
            .create_async()
            .await;

        let outcome = client.merge_pull_request("o/r", 7, "squash").await.unwrap();
        assert_eq!(outcome, MergeOutcome::NotMergeable);
        merge.assert_async().await;
    }

    #[tokio::test]
    async fn test_merge_sends_merge_method() {
        let mut server = mockito::Server::new_async().await;
        let client = connected(&mut server).await;
        let _pr = server
            .mock("GET", "/repos/o/r/pulls/7")
            .with_status(200)
            .with_body(r#"{"number":7,"mergeable":true}"#)
            .create_async()
            .await;
        let merge = server
            .mock("PUT", "/repos/o/r/pulls/7/merge")
            .match_body(Matcher::Json(serde_json::json!({"merge_method": "squash"})))
            .with_status(200)
            .with_body(r#"{"merged":true}"#)
            .expect(1)
            .create_async()
            .await;

        let outcome = client.merge_pull_request("o/r", 7, "squash").await.unwrap();
        assert_eq!(outcome, MergeOutcome::Merged);
        merge.assert_async().await;
    }

    #[tokio::test]
    async fn test_comment_posts_to_issue() {
        let mut server = mockito::Server::new_async().await;
        let client = connected(&mut server).await;
        let comment = server
            .mock("POST", "/repos/o/r/issues/9/comments")
            .match_body(Matcher::Json(serde_json::json!({"body": "on it"})))
            .with_status(201)
            .with_body(r#"{"id":1}"#)
            .expect(1)
            .create_async()
            .await;

        client.comment("o/r", 9, "on it").await.unwrap();
        comment.assert_async().await;
    }
}
