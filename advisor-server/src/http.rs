//! Campus Advisor HTTP REST API
//!
//! Axum-based HTTP server exposing the chat, verification and feedback
//! endpoints. Each endpoint has a thin axum handler that delegates to a
//! pure inner function; the inner functions are directly testable
//! without axum dispatch machinery.
//!
//! Endpoints:
//! - GET  /api/health          — health check with model name
//! - GET  /api/stats           — public aggregate statistics
//! - POST /api/verify          — student identity verification
//! - POST /api/chat            — intent-routed chat turn
//! - POST /api/logout          — session removal (idempotent)
//! - POST /api/feedback        — rate a (query, response) pair
//! - GET  /api/feedback/recent — recent feedback records

use std::sync::{Arc, OnceLock};

use axum::body::{to_bytes, Body};
use axum::extract::{Query, Request, State};
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use regex::Regex;
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::cors::CorsLayer;

use advisor_core::models::{FeedbackRecord, FeedbackScore, VerifiedSession};
use advisor_core::PrivacyFilter;
use advisor_data::{summary_stats, verify_student, FeedbackStore, Roster};

use crate::subsystems::chat::ChatEngine;
use crate::subsystems::sessions::SessionStore;

/// Shared state for all HTTP handlers
pub struct AppState {
    pub model: String,
    pub roster: Arc<dyn Roster>,
    pub sessions: SessionStore,
    pub feedback: Arc<FeedbackStore>,
    pub privacy: PrivacyFilter,
    pub chat: ChatEngine,
}

/// Build the Axum router with all endpoints
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/health", get(health_handler))
        .route("/api/stats", get(stats_handler))
        .route("/api/verify", post(verify_handler))
        .route("/api/chat", post(chat_handler))
        .route("/api/logout", post(logout_handler))
        .route("/api/feedback", post(feedback_handler))
        .route("/api/feedback/recent", get(feedback_recent_handler))
        .layer(middleware::from_fn(log_requests))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Start the HTTP server on the configured address.
/// Gracefully shuts down when the broadcast shutdown signal fires.
pub async fn start_http_server(
    state: Arc<AppState>,
    host: &str,
    port: u16,
    mut shutdown: broadcast::Receiver<()>,
) -> anyhow::Result<()> {
    let addr = format!("{}:{}", host, port);
    let app = build_router(state);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Campus Advisor HTTP API listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
            tracing::info!("HTTP server shutting down...");
        })
        .await?;

    Ok(())
}

// ============================================================================
// Request / Response DTOs
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct VerifyRequest {
    pub student_number: String,
    pub name: String,
    pub session_id: String,
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: Option<String>,
    pub session_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LogoutRequest {
    pub session_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct FeedbackRequest {
    pub query: String,
    pub response: String,
    pub score: i8,
}

#[derive(Debug, Deserialize, Default)]
pub struct RecentParams {
    pub limit: Option<usize>,
}

// ============================================================================
// Inner (directly testable) business logic functions
// ============================================================================

/// Inner health check — pure, reports the configured model.
pub fn health_inner(model: &str) -> (StatusCode, serde_json::Value) {
    (
        StatusCode::OK,
        serde_json::json!({
            "status": "healthy",
            "model": model,
        }),
    )
}

/// Inner stats — public aggregate snapshot; collaborator failure
/// degrades to the "no data" shape inside `summary_stats`.
pub async fn stats_inner(roster: &dyn Roster) -> (StatusCode, serde_json::Value) {
    (StatusCode::OK, summary_stats(roster).await)
}

/// Inner verify — exact identifier+name match; creates or overwrites
/// the session on success.
pub async fn verify_inner(
    state: &AppState,
    req: VerifyRequest,
) -> (StatusCode, serde_json::Value) {
    match verify_student(state.roster.as_ref(), &req.student_number, &req.name).await {
        Ok(Some(record)) => {
            state
                .sessions
                .insert(VerifiedSession {
                    session_id: req.session_id,
                    student_number: req.student_number.clone(),
                    name: req.name.clone(),
                    student_data: record,
                })
                .await;
            (
                StatusCode::OK,
                serde_json::json!({
                    "success": true,
                    "message": format!("Welcome, {}!", req.name),
                    "student_number": req.student_number,
                }),
            )
        }
        Ok(None) => (
            StatusCode::OK,
            serde_json::json!({
                "success": false,
                "message": "Student not found. Please check your student number and name.",
            }),
        ),
        Err(e) => {
            tracing::error!(error = %e, "verification lookup failed");
            (
                StatusCode::OK,
                serde_json::json!({
                    "success": false,
                    "message": "Verification is temporarily unavailable. Please try again.",
                }),
            )
        }
    }
}

/// Inner chat — one intent-routed turn.
pub async fn chat_inner(state: &AppState, req: ChatRequest) -> (StatusCode, serde_json::Value) {
    let message = match req.message {
        Some(m) if !m.trim().is_empty() => m,
        _ => {
            return (
                StatusCode::BAD_REQUEST,
                serde_json::json!({
                    "error": "message field is required",
                    "status": "error",
                }),
            );
        }
    };

    let session = match &req.session_id {
        Some(id) => state.sessions.get(id).await,
        None => None,
    };

    let reply = state.chat.handle_message(&message, session.as_ref()).await;
    (
        StatusCode::OK,
        serde_json::to_value(reply).unwrap_or_default(),
    )
}

/// Inner logout — idempotent session removal.
pub async fn logout_inner(state: &AppState, req: LogoutRequest) -> (StatusCode, serde_json::Value) {
    if let Some(session_id) = &req.session_id {
        state.sessions.remove(session_id).await;
    }
    (StatusCode::OK, serde_json::json!({ "success": true }))
}

/// Inner feedback — privacy-gated append. A rejected record is skipped,
/// not an error; persistence failure never fails the request.
pub async fn feedback_inner(
    state: &AppState,
    req: FeedbackRequest,
) -> (StatusCode, serde_json::Value) {
    let score = match FeedbackScore::try_from(req.score) {
        Ok(score) => score,
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                serde_json::json!({
                    "error": e,
                    "status": "error",
                }),
            );
        }
    };

    if !state.privacy.allow_write(&req.query, &req.response) {
        tracing::info!("feedback skipped by privacy filter");
        return (
            StatusCode::OK,
            serde_json::json!({ "success": true, "stored": false }),
        );
    }

    let record = FeedbackRecord::new(req.query, req.response, score);
    state.feedback.append(&record).await;
    (
        StatusCode::OK,
        serde_json::json!({ "success": true, "stored": true }),
    )
}

/// Inner feedback listing — most recent first, primary store winning.
pub async fn feedback_recent_inner(
    state: &AppState,
    params: RecentParams,
) -> (StatusCode, serde_json::Value) {
    let limit = params.limit.unwrap_or(20);
    match state.feedback.recent(limit).await {
        Ok(records) => (
            StatusCode::OK,
            serde_json::json!({
                "count": records.len(),
                "records": records,
            }),
        ),
        Err(e) => {
            tracing::warn!(error = %e, "feedback listing unavailable");
            (
                StatusCode::OK,
                serde_json::json!({ "count": 0, "records": [] }),
            )
        }
    }
}

// ============================================================================
// Axum handler wrappers (thin — delegate to inner functions)
// ============================================================================

pub async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let (status, body) = health_inner(&state.model);
    (status, Json(body))
}

pub async fn stats_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let (status, body) = stats_inner(state.roster.as_ref()).await;
    (status, Json(body))
}

pub async fn verify_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<VerifyRequest>,
) -> impl IntoResponse {
    let (status, body) = verify_inner(&state, req).await;
    (status, Json(body))
}

pub async fn chat_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ChatRequest>,
) -> impl IntoResponse {
    let (status, body) = chat_inner(&state, req).await;
    (status, Json(body))
}

pub async fn logout_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LogoutRequest>,
) -> impl IntoResponse {
    let (status, body) = logout_inner(&state, req).await;
    (status, Json(body))
}

pub async fn feedback_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<FeedbackRequest>,
) -> impl IntoResponse {
    let (status, body) = feedback_inner(&state, req).await;
    (status, Json(body))
}

pub async fn feedback_recent_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<RecentParams>,
) -> impl IntoResponse {
    let (status, body) = feedback_recent_inner(&state, params).await;
    (status, Json(body))
}

// ============================================================================
// Request logging with redaction
// ============================================================================

fn email_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"[\w.\-]+@[\w.\-]+\.\w+").expect("static email pattern"))
}

fn phone_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\d{3}-\d{3}-\d{4}").expect("static phone pattern"))
}

/// Strip emails and phone numbers before anything reaches the logs.
/// Patterns compile once and are shared across requests.
pub fn redact(text: &str) -> String {
    let text = email_pattern().replace_all(text, "[EMAIL_REDACTED]");
    phone_pattern()
        .replace_all(&text, "[PHONE_REDACTED]")
        .into_owned()
}

/// Log method, path and (at debug) the redacted request body.
pub async fn log_requests(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    let (parts, body) = request.into_parts();
    let bytes = to_bytes(body, usize::MAX).await.unwrap_or_default();
    if !bytes.is_empty() {
        tracing::debug!(
            body = %redact(&String::from_utf8_lossy(&bytes)),
            "request body"
        );
    }
    tracing::info!(%method, %path, "request");

    next.run(Request::from_parts(parts, Body::from(bytes))).await
}

// ============================================================================
// Unit Tests — call inner functions directly
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    use advisor_core::llm::{CompletionBackend, CompletionRequest, LlmError};
    use advisor_core::models::{IntentClassification, StudentRecord};
    use advisor_data::{MemoryFeedbackLog, MemoryRoster};

    use crate::subsystems::relevance::RelevanceEngine;

    /// Fixed-script completion backend: every message classifies GENERAL
    /// and completes with a canned reply.
    struct StaticLlm;

    #[async_trait]
    impl CompletionBackend for StaticLlm {
        async fn classify(&self, _message: &str) -> Result<IntentClassification, LlmError> {
            Ok(IntentClassification::general())
        }

        async fn complete(&self, _request: &CompletionRequest) -> Result<String, LlmError> {
            Ok("canned reply".to_string())
        }

        fn model(&self) -> &str {
            "static"
        }
    }

    fn make_state() -> Arc<AppState> {
        let roster: Arc<dyn Roster> = Arc::new(MemoryRoster::new(vec![
            StudentRecord::new(vec![
                ("StudentNo".to_string(), "1001".to_string()),
                ("Name".to_string(), "Vicky Yiran".to_string()),
                ("Gender".to_string(), "Female".to_string()),
                ("Nationality".to_string(), "China".to_string()),
            ]),
            StudentRecord::new(vec![
                ("StudentNo".to_string(), "1002".to_string()),
                ("Name".to_string(), "John Smith".to_string()),
                ("Gender".to_string(), "Male".to_string()),
                ("Nationality".to_string(), "Malaysia".to_string()),
            ]),
        ]));
        let feedback = Arc::new(FeedbackStore::new(
            None,
            Arc::new(MemoryFeedbackLog::new()),
        ));
        let llm: Arc<dyn CompletionBackend> = Arc::new(StaticLlm);
        let chat = ChatEngine::new(
            llm,
            roster.clone(),
            RelevanceEngine::new(feedback.clone(), 200, 0.3, 3),
            10,
        );
        Arc::new(AppState {
            model: "llama3.1:latest".to_string(),
            roster,
            sessions: SessionStore::new(),
            feedback,
            privacy: PrivacyFilter::new(),
            chat,
        })
    }

    #[test]
    fn test_health_inner_reports_model() {
        let (status, body) = health_inner("llama3.1:latest");
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["model"], "llama3.1:latest");
    }

    #[tokio::test]
    async fn test_stats_inner_counts_roster() {
        let state = make_state();
        let (status, body) = stats_inner(state.roster.as_ref()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total_students"], 2);
        assert_eq!(body["gender_breakdown"]["Female"], 1);
    }

    #[tokio::test]
    async fn test_verify_inner_success_creates_session() {
        let state = make_state();
        let (status, body) = verify_inner(
            &state,
            VerifyRequest {
                student_number: "1001".to_string(),
                name: "vicky yiran".to_string(),
                session_id: "s1".to_string(),
            },
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["message"], "Welcome, vicky yiran!");
        assert_eq!(body["student_number"], "1001");
        assert!(state.sessions.get("s1").await.is_some());
    }

    #[tokio::test]
    async fn test_verify_inner_mismatch_creates_no_session() {
        let state = make_state();
        let (status, body) = verify_inner(
            &state,
            VerifyRequest {
                student_number: "1001".to_string(),
                name: "John Smith".to_string(),
                session_id: "s1".to_string(),
            },
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], false);
        assert!(state.sessions.get("s1").await.is_none());
    }

    #[tokio::test]
    async fn test_chat_inner_requires_message() {
        let state = make_state();
        let (status, body) = chat_inner(
            &state,
            ChatRequest {
                message: Some("   ".to_string()),
                session_id: None,
            },
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["status"], "error");
    }

    #[tokio::test]
    async fn test_chat_inner_guest_turn() {
        let state = make_state();
        let (status, body) = chat_inner(
            &state,
            ChatRequest {
                message: Some("hello".to_string()),
                session_id: None,
            },
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["response"], "canned reply");
        assert_eq!(body["user"], "guest");
        assert_eq!(body["type"], "message");
    }

    #[tokio::test]
    async fn test_logout_inner_unknown_session_succeeds() {
        let state = make_state();
        let (status, body) = logout_inner(
            &state,
            LogoutRequest {
                session_id: Some("never-existed".to_string()),
            },
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
    }

    #[tokio::test]
    async fn test_feedback_inner_stores_clean_record() {
        let state = make_state();
        let (status, body) = feedback_inner(
            &state,
            FeedbackRequest {
                query: "what courses exist".to_string(),
                response: "CS, IT, Business".to_string(),
                score: 1,
            },
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["stored"], true);

        let (_, listing) = feedback_recent_inner(&state, RecentParams::default()).await;
        assert_eq!(listing["count"], 1);
        assert_eq!(listing["records"][0]["query"], "what courses exist");
    }

    #[tokio::test]
    async fn test_feedback_inner_filters_numeric_responses() {
        let state = make_state();
        let (status, body) = feedback_inner(
            &state,
            FeedbackRequest {
                query: "what courses exist".to_string(),
                response: "Your id is 12345678".to_string(),
                score: 1,
            },
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["stored"], false);

        let (_, listing) = feedback_recent_inner(&state, RecentParams::default()).await;
        assert_eq!(listing["count"], 0);
    }

    #[tokio::test]
    async fn test_feedback_inner_rejects_invalid_score() {
        let state = make_state();
        let (status, _body) = feedback_inner(
            &state,
            FeedbackRequest {
                query: "q".to_string(),
                response: "r".to_string(),
                score: 0,
            },
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_redact_masks_emails_and_phones() {
        let text = "reach me at jane.doe@example.edu or 012-345-6789";
        let safe = redact(text);
        assert!(safe.contains("[EMAIL_REDACTED]"));
        assert!(safe.contains("[PHONE_REDACTED]"));
        assert!(!safe.contains("example.edu"));
    }

    #[test]
    fn test_redact_shared_patterns_across_calls() {
        // Patterns are compiled once; repeated calls keep redacting all
        // occurrences consistently.
        for _ in 0..3 {
            let safe = redact("a@b.edu then c@d.org then 111-222-3333");
            assert_eq!(
                safe,
                "[EMAIL_REDACTED] then [EMAIL_REDACTED] then [PHONE_REDACTED]"
            );
        }
        assert_eq!(redact("nothing sensitive"), "nothing sensitive");
    }
}
