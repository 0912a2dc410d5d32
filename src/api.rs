//! JSON API: build the daily plan, approve or reject a proposed task.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;

use crate::aggregate::{build_daily_plan, ProposedTask, UrgencyPolicy};
use crate::config::ServerConfig;
use crate::planner::{Planner, DAILY_PLAN_PROMPT};
use crate::tools::{ToolCatalog, ToolDescriptor, ToolError, ToolOutput};

#[derive(Clone)]
pub struct AppState {
    pub catalog: Arc<ToolCatalog>,
    pub planner: Arc<dyn Planner>,
    pub policy: Arc<dyn UrgencyPolicy>,
}

#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    message: String,
}

impl AppError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: msg.into(),
        }
    }

    pub fn internal(err: anyhow::Error) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: format!("{err:#}"),
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        Self::bad_request(format!("Invalid request body: {}", rejection.body_text()))
    }
}

impl From<ToolError> for AppError {
    fn from(err: ToolError) -> Self {
        match err {
            ToolError::NotFound(_) => Self {
                status: StatusCode::NOT_FOUND,
                message: err.to_string(),
            },
            ToolError::InvalidParams { .. } => Self::bad_request(err.to_string()),
            ToolError::Execution(e) => Self::internal(e),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let body = serde_json::json!({ "error": self.message });
        (self.status, Json(body)).into_response()
    }
}

#[derive(Debug, Deserialize)]
pub struct ApproveRequest {
    #[serde(default)]
    pub tool_id: Option<String>,
    #[serde(default)]
    pub params: Option<serde_json::Value>,
}

#[derive(Debug, Serialize)]
pub struct ApproveResponse {
    pub status: &'static str,
    pub result: ToolOutput,
}

#[derive(Debug, Deserialize)]
pub struct RejectRequest {
    /// Any JSON value; non-strings are echoed in their JSON form.
    #[serde(default)]
    pub id: Option<serde_json::Value>,
}

impl RejectRequest {
    fn task_label(&self) -> String {
        match &self.id {
            None | Some(serde_json::Value::Null) => "Unknown task".to_string(),
            Some(serde_json::Value::String(id)) => id.clone(),
            Some(other) => other.to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RejectResponse {
    pub status: &'static str,
    pub message: String,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/daily-plan", get(daily_plan))
        .route("/api/approve", post(approve))
        .route("/api/reject", post(reject))
        .route("/api/tools", get(list_tools))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn serve(state: AppState, config: &ServerConfig) -> Result<()> {
    let app = build_router(state);
    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .context("Invalid server host/port")?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    log::info!("Listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;
    log::info!("Server shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::error!("Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
}

async fn daily_plan(State(state): State<AppState>) -> Result<Json<Vec<ProposedTask>>, AppError> {
    let outputs = state
        .planner
        .plan(DAILY_PLAN_PROMPT, &state.catalog)
        .await
        .map_err(|e| {
            log::error!("Error building daily plan: {:#}", e);
            AppError::internal(e)
        })?;

    let tasks = build_daily_plan(&outputs, state.policy.as_ref());
    log::info!("Daily plan: {} task(s) proposed", tasks.len());
    Ok(Json(tasks))
}

async fn approve(
    State(state): State<AppState>,
    body: Result<Json<ApproveRequest>, JsonRejection>,
) -> Result<Json<ApproveResponse>, AppError> {
    let Json(req) = body?;
    let (tool_id, params) = match (req.tool_id, req.params) {
        (Some(id), Some(params)) if !id.is_empty() => (id, params),
        _ => return Err(AppError::bad_request("Missing 'tool_id' or 'params'")),
    };

    let result = state.catalog.dispatch(&tool_id, params).await.map_err(|e| {
        log::error!("Error executing tool {}: {}", tool_id, e);
        AppError::from(e)
    })?;

    Ok(Json(ApproveResponse {
        status: "success",
        result,
    }))
}

async fn reject(
    body: Result<Json<RejectRequest>, JsonRejection>,
) -> Result<Json<RejectResponse>, AppError> {
    let Json(req) = body?;
    let task_id = req.task_label();
    log::info!("Task {} was rejected by the user.", task_id);
    Ok(Json(RejectResponse {
        status: "success",
        message: format!("Task {} rejected.", task_id),
    }))
}

async fn list_tools(State(state): State<AppState>) -> Json<Vec<ToolDescriptor>> {
    Json(state.catalog.descriptors())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::KeywordPolicy;
    use crate::planner::StaticPlanner;
    use crate::services::{ChatMessage, ChatService, Email, MailService, ServiceError, Services};
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    struct Inbox;

    #[async_trait]
    impl MailService for Inbox {
        async fn unread_emails(&self, _max_results: u32) -> Result<Vec<Email>, ServiceError> {
            Ok(vec![Email {
                id: "m1".to_string(),
                thread_id: "t1".to_string(),
                from: "ana@example.com".to_string(),
                subject: "Urgent: contract".to_string(),
                snippet: String::new(),
            }])
        }

        async fn reply_to_thread(&self, _thread_id: &str, _body: &str) -> Result<(), ServiceError> {
            Ok(())
        }
    }

    struct Channel;

    #[async_trait]
    impl ChatService for Channel {
        async fn mentions(&self, _count: u32) -> Result<Vec<ChatMessage>, ServiceError> {
            Ok(vec![])
        }

        async fn post_message(&self, _channel_id: &str, _text: &str) -> Result<(), ServiceError> {
            Ok(())
        }
    }

    fn app() -> Router {
        let services = Services {
            mail: Some(Arc::new(Inbox)),
            chat: Some(Arc::new(Channel)),
            ..Services::default()
        };
        build_router(AppState {
            catalog: Arc::new(ToolCatalog::standard(&services).unwrap()),
            planner: Arc::new(StaticPlanner),
            policy: Arc::new(KeywordPolicy::default()),
        })
    }

    async fn call(app: Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = match body {
            Some(body) => Request::builder()
                .method(method)
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => Request::builder().method(method).uri(uri).body(Body::empty()).unwrap(),
        };
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), 1_048_576)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_approve_dispatches_tool() {
        let (status, body) = call(
            app(),
            "POST",
            "/api/approve",
            Some(json!({"tool_id": "send_slack_message", "params": {"channel_id": "C1", "message": "hi"}})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            json!({"status": "success", "result": "Successfully sent message to C1."})
        );
    }

    #[tokio::test]
    async fn test_approve_unknown_tool_is_404() {
        let (status, body) = call(
            app(),
            "POST",
            "/api/approve",
            Some(json!({"tool_id": "nonexistent", "params": {}})),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, json!({"error": "Tool 'nonexistent' not found"}));
    }

    #[tokio::test]
    async fn test_approve_missing_fields_is_400() {
        for req in [
            json!({"params": {}}),
            json!({"tool_id": "send_slack_message"}),
            json!({"tool_id": "", "params": {}}),
            json!({"tool_id": "send_slack_message", "params": null}),
        ] {
            let (status, body) = call(app(), "POST", "/api/approve", Some(req)).await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert_eq!(body, json!({"error": "Missing 'tool_id' or 'params'"}));
        }
    }

    #[tokio::test]
    async fn test_approve_schema_mismatch_is_400() {
        let (status, body) = call(
            app(),
            "POST",
            "/api/approve",
            Some(json!({"tool_id": "send_slack_message", "params": {"channel": "C1"}})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("send_slack_message"));
    }

    #[tokio::test]
    async fn test_malformed_bodies_are_json_400() {
        let (status, body) = call(
            app(),
            "POST",
            "/api/approve",
            Some(json!({"tool_id": 5, "params": {}})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().starts_with("Invalid request body"));

        let request = Request::builder()
            .method("POST")
            .uri("/api/approve")
            .body(Body::from(r#"{"tool_id":"send_slack_message","params":{}}"#))
            .unwrap();
        let response = app().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let bytes = axum::body::to_bytes(response.into_body(), 1_048_576)
            .await
            .unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert!(body["error"].is_string());

        let request = Request::builder()
            .method("POST")
            .uri("/api/reject")
            .header("content-type", "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let response = app().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_reject_accepts_any_id_value() {
        let (status, body) = call(app(), "POST", "/api/reject", Some(json!({"id": 3}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Task 3 rejected.");

        let (_, body) = call(app(), "POST", "/api/reject", Some(json!({"id": null}))).await;
        assert_eq!(body["message"], "Task Unknown task rejected.");
    }

    #[tokio::test]
    async fn test_reject_acknowledges() {
        let (status, body) = call(app(), "POST", "/api/reject", Some(json!({"id": "task_3"}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"status": "success", "message": "Task task_3 rejected."}));

        let (_, body) = call(app(), "POST", "/api/reject", Some(json!({}))).await;
        assert_eq!(body["message"], "Task Unknown task rejected.");
    }

    #[tokio::test]
    async fn test_daily_plan_aggregates_fetched_items() {
        let (status, body) = call(app(), "GET", "/api/daily-plan", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            json!([{
                "id": "task_1",
                "type": "notion",
                "summary": "Email from ana@example.com: Urgent: contract",
                "source": "Gmail",
                "priority": "high",
                "proposed_action": {
                    "tool_id": "add_task_to_notion_db",
                    "params": {"task_title": "Follow up on email: Urgent: contract"}
                }
            }])
        );
    }

    #[tokio::test]
    async fn test_daily_plan_survives_a_broken_source() {
        use crate::services::{CodeHostService, MergeOutcome, WorkItem};

        struct BadGithub;

        #[async_trait]
        impl CodeHostService for BadGithub {
            async fn assigned_items(&self, _max_results: u32) -> Result<Vec<WorkItem>, ServiceError> {
                Err(ServiceError::Malformed("unexpected repository_url".to_string()))
            }

            async fn comment(&self, _repo: &str, _number: u64, _body: &str) -> Result<(), ServiceError> {
                Ok(())
            }

            async fn merge_pull_request(
                &self,
                _repo: &str,
                _number: u64,
                _merge_method: &str,
            ) -> Result<MergeOutcome, ServiceError> {
                Ok(MergeOutcome::Merged)
            }
        }

        let services = Services {
            mail: Some(Arc::new(Inbox)),
            code_host: Some(Arc::new(BadGithub)),
            ..Services::default()
        };
        let router = build_router(AppState {
            catalog: Arc::new(ToolCatalog::standard(&services).unwrap()),
            planner: Arc::new(StaticPlanner),
            policy: Arc::new(KeywordPolicy::default()),
        });

        let (status, body) = call(router, "GET", "/api/daily-plan", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().unwrap().len(), 1);
        assert_eq!(body[0]["source"], "Gmail");
    }

    #[tokio::test]
    async fn test_daily_plan_failure_is_500() {
        struct Broken;

        #[async_trait]
        impl Planner for Broken {
            async fn plan(&self, _prompt: &str, _catalog: &ToolCatalog) -> Result<crate::aggregate::PlanOutputs> {
                anyhow::bail!("planner offline")
            }
        }

        let router = build_router(AppState {
            catalog: Arc::new(ToolCatalog::standard(&Services::default()).unwrap()),
            planner: Arc::new(Broken),
            policy: Arc::new(KeywordPolicy::default()),
        });
        let (status, body) = call(router, "GET", "/api/daily-plan", None).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, json!({"error": "planner offline"}));
    }

    #[tokio::test]
    async fn test_tools_lists_catalog() {
        let (status, body) = call(app(), "GET", "/api/tools", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().unwrap().len(), 9);
        assert_eq!(body[0]["id"], "fetch_unread_emails");
        assert_eq!(body[0]["kind"], "fetch");
    }
}
