//! REST endpoints for the survey chat and session inspection.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use super::controller::{InboundMessage, SurveyController, TurnRequest};
use super::state::SurveyPhase;
use crate::error::{LlmError, SurveyError};

/// Shared state for survey routes.
#[derive(Clone)]
pub struct SurveyRouteState {
    pub controller: Arc<SurveyController>,
}

/// Body of `POST /api/chat`.
#[derive(Debug, Default, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub messages: Vec<InboundMessage>,
    #[serde(default, alias = "threadId")]
    pub thread_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    #[serde(rename = "extractedQuestion")]
    pub extracted_question: String,
    pub thread_id: String,
    pub phase: SurveyPhase,
    pub complete: bool,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> axum::response::Response {
    (status, Json(serde_json::json!({"error": message.into()}))).into_response()
}

/// HTTP status for a failed turn.
fn error_status(err: &SurveyError) -> StatusCode {
    match err {
        SurveyError::Transport(LlmError::Timeout { .. }) => StatusCode::GATEWAY_TIMEOUT,
        SurveyError::Transport(_) => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// POST /api/chat
///
/// Runs one survey turn. A missing thread id starts a new thread.
async fn post_chat(
    State(state): State<SurveyRouteState>,
    body: Result<Json<ChatRequest>, JsonRejection>,
) -> impl IntoResponse {
    let Json(body) = match body {
        Ok(body) => body,
        Err(rejection) => {
            return error_response(StatusCode::BAD_REQUEST, rejection.body_text());
        }
    };

    let thread_id = body
        .thread_id
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    let request = TurnRequest {
        thread_id,
        messages: body.messages,
    };

    match state.controller.turn(request).await {
        Ok(outcome) => Json(ChatResponse {
            extracted_question: outcome.message,
            thread_id: outcome.thread_id,
            phase: outcome.phase,
            complete: outcome.complete,
        })
        .into_response(),
        Err(e) => error_response(error_status(&e), e.to_string()),
    }
}

/// GET /api/survey/form
async fn get_form(State(state): State<SurveyRouteState>) -> impl IntoResponse {
    Json(serde_json::json!({ "form": state.controller.sessions().schema().as_ref() }))
}

/// GET /api/survey/sessions
async fn list_sessions(State(state): State<SurveyRouteState>) -> impl IntoResponse {
    match state.controller.sessions().thread_ids().await {
        Ok(threads) => Json(serde_json::json!({ "threads": threads })).into_response(),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

/// GET /api/survey/sessions/{thread_id}
///
/// Returns the session snapshot, or 404 if the thread is unknown.
async fn get_session(
    State(state): State<SurveyRouteState>,
    Path(thread_id): Path<String>,
) -> impl IntoResponse {
    match state.controller.sessions().snapshot(&thread_id).await {
        Ok(Some(snapshot)) => Json(snapshot).into_response(),
        Ok(None) => error_response(StatusCode::NOT_FOUND, "No session for this thread"),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

/// DELETE /api/survey/sessions/{thread_id}
async fn delete_session(
    State(state): State<SurveyRouteState>,
    Path(thread_id): Path<String>,
) -> impl IntoResponse {
    match state.controller.sessions().reset(&thread_id).await {
        Ok(true) => StatusCode::NO_CONTENT.into_response(),
        Ok(false) => error_response(StatusCode::NOT_FOUND, "No session for this thread"),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({"status": "ok"}))
}

/// Build the survey REST routes.
pub fn survey_routes(state: SurveyRouteState) -> Router {
    Router::new()
        .route("/api/chat", post(post_chat))
        .route("/api/survey/form", get(get_form))
        .route("/api/survey/sessions", get(list_sessions))
        .route(
            "/api/survey/sessions/{thread_id}",
            get(get_session).delete(delete_session),
        )
        .route("/health", get(health))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    use crate::llm::{
        CompletionRequest, CompletionResponse, FinishReason, LlmProvider, Reasoning,
        ToolCompletionRequest, ToolCompletionResponse,
    };
    use crate::store::InMemorySessionStore;
    use crate::survey::controller::ControllerConfig;
    use crate::survey::registry::SessionRegistry;
    use crate::survey::schema::FormSchema;
    use crate::tools::ToolRegistry;

    /// Always asks for the business name, or fails when told to.
    struct StubLlm {
        fail: bool,
    }

    #[async_trait]
    impl LlmProvider for StubLlm {
        fn model_name(&self) -> &str {
            "stub"
        }

        async fn complete(&self, _request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
            unimplemented!("not used in route tests")
        }

        async fn complete_with_tools(
            &self,
            _request: ToolCompletionRequest,
        ) -> Result<ToolCompletionResponse, LlmError> {
            if self.fail {
                return Err(LlmError::RequestFailed {
                    provider: "stub".into(),
                    reason: "connection refused".into(),
                });
            }
            Ok(ToolCompletionResponse {
                content: Some(r#"Here you go: "What is your business name?""#.into()),
                tool_calls: vec![],
                input_tokens: 0,
                output_tokens: 0,
                finish_reason: FinishReason::Stop,
                response_id: None,
            })
        }
    }

    fn app(fail: bool) -> Router {
        let sessions = SessionRegistry::new(
            Arc::new(FormSchema::business_survey().unwrap()),
            Arc::new(InMemorySessionStore::new()),
            Duration::from_secs(3600),
        );
        let controller = SurveyController::new(
            Reasoning::new(Arc::new(StubLlm { fail })),
            Arc::new(ToolRegistry::new()),
            sessions,
            ControllerConfig::default(),
        );
        survey_routes(SurveyRouteState {
            controller: Arc::new(controller),
        })
    }

    async fn send(app: Router, req: Request<Body>) -> (StatusCode, serde_json::Value) {
        let resp = app.oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let json = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }

    fn chat(body: serde_json::Value) -> Request<Body> {
        Request::post("/api/chat")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn chat_returns_extracted_question_and_thread() {
        let (status, body) = send(app(false), chat(serde_json::json!({"messages": []}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["extractedQuestion"], "What is your business name?");
        assert_eq!(body["phase"], "asking");
        assert_eq!(body["complete"], false);
        assert!(uuid::Uuid::parse_str(body["thread_id"].as_str().unwrap()).is_ok());
    }

    #[tokio::test]
    async fn chat_keeps_supplied_thread_id() {
        let (status, body) = send(
            app(false),
            chat(serde_json::json!({
                "messages": [{"role": "user", "content": "hi"}],
                "threadId": "abc"
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["thread_id"], "abc");
    }

    #[tokio::test]
    async fn transport_failure_is_bad_gateway() {
        let (status, body) = send(app(true), chat(serde_json::json!({}))).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert!(body["error"].as_str().unwrap().contains("connection refused"));
    }

    #[tokio::test]
    async fn malformed_body_is_rejected() {
        let req = Request::post("/api/chat")
            .header("content-type", "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let (status, body) = send(app(false), req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn session_lifecycle() {
        let app = app(false);

        let get = || {
            Request::get("/api/survey/sessions/t1")
                .body(Body::empty())
                .unwrap()
        };
        let (status, _) = send(app.clone(), get()).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = send(
            app.clone(),
            chat(serde_json::json!({"thread_id": "t1", "messages": []})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = send(app.clone(), get()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["thread_id"], "t1");
        assert_eq!(body["turn_count"], 1);

        let list = || Request::get("/api/survey/sessions").body(Body::empty()).unwrap();
        let (status, body) = send(app.clone(), list()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["threads"], serde_json::json!(["t1"]));

        let delete = Request::delete("/api/survey/sessions/t1")
            .body(Body::empty())
            .unwrap();
        let (status, _) = send(app.clone(), delete).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, _) = send(app.clone(), get()).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (_, body) = send(app, list()).await;
        assert_eq!(body["threads"], serde_json::json!([]));
    }

    #[tokio::test]
    async fn form_and_health() {
        let (status, body) = send(
            app(false),
            Request::get("/api/survey/form").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["form"]["fields"][0]["key"], "business_name");

        let (status, body) = send(
            app(false),
            Request::get("/health").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[test]
    fn timeouts_map_to_gateway_timeout() {
        let err = SurveyError::Transport(LlmError::Timeout {
            provider: "stub".into(),
            timeout: Duration::from_secs(1),
        });
        assert_eq!(error_status(&err), StatusCode::GATEWAY_TIMEOUT);
        let err = SurveyError::MissingCollaboratorReply {
            reason: "empty".into(),
        };
        assert_eq!(error_status(&err), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
