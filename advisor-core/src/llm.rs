//! Completion-service client — Ollama-backed chat and intent classification
//!
//! Provides a `CompletionBackend` trait with the production `OllamaClient`
//! implementation. The classifier call is retried with exponential backoff;
//! the chat call is not (it already runs with a long timeout and the chat
//! engine maps its failures to fixed user-visible texts).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::Retry;

use crate::config::LlmConfig;
use crate::models::{Intent, IntentClassification};

/// System instructions sent with every chat completion. Carries the
/// formatting rules and the data-privacy guardrails the model must obey
/// when context data is (or is not) present.
pub const SYSTEM_PROMPT: &str = "You are a helpful and friendly chatbot for the university.\n\
You assist students and visitors with information about the university.\n\
You have access to student data when provided in the context.\n\
\n\
RESPONSE STYLE:\n\
- Be concise and friendly\n\
- Format data in a clean, readable way\n\
- Always put each data field on its OWN LINE\n\
\n\
CRITICAL RULES FOR DATA PRIVACY:\n\
1. NEVER INVENT OR HALLUCINATE STUDENT DATA.\n\
2. If the user asks for personal information and NO Context Data is provided, you MUST NOT create fake data.\n\
3. Instead, reply: \"Access Restricted: I cannot show personal information because you are not logged in or no data was found. Please login using the button at the top right.\"\n\
4. ONLY use information explicitly provided in the 'Context Data' section below. If the context is empty, you know NOTHING about specific students.";

const CLASSIFY_PROMPT: &str = "Classify the following user message into ONE of these intents:\n\
\n\
1. GENERAL - General conversation, greetings, university info, programs, statistics (student count, gender ratio, nationality breakdown), campus facilities, etc. Anything that is PUBLIC information.\n\
\n\
2. PERSONAL_DATA - Any request for STUDENT PERSONAL information. This includes:\n\
   - User asking about their OWN data (\"my grades\", \"my enrollment\", \"my info\", \"show me my details\")\n\
   - User asking about a SPECIFIC student by name (\"who is John?\", \"tell me about Mary\", \"find student X\")\n\
   - Any request that would reveal individual student records\n\
\n\
If the intent is PERSONAL_DATA and a specific student name is mentioned, extract it as search_term.\n\
\n\
Respond in this exact JSON format only, no other text:\n\
{\"intent\": \"INTENT_NAME\", \"search_term\": \"student name if mentioned or null\"}\n\
\n\
User message: ";

// ============================================================================
// Error types
// ============================================================================

#[derive(Error, Debug)]
pub enum LlmError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({code}): {message}")]
    Api { code: u16, message: String },

    #[error("All {attempts} retry attempts failed")]
    RetryExhausted { attempts: usize },
}

impl LlmError {
    /// True when the server could not be reached at all.
    pub fn is_connect(&self) -> bool {
        matches!(self, LlmError::Http(e) if e.is_connect())
    }

    /// True when the request ran past its deadline.
    pub fn is_timeout(&self) -> bool {
        matches!(self, LlmError::Http(e) if e.is_timeout())
    }
}

// ============================================================================
// Request types
// ============================================================================

/// One completed (user, assistant) exchange from the rolling history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatTurn {
    pub user: String,
    pub assistant: String,
}

/// Liked / disliked past responses surfaced for a similar query.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exemplars {
    pub good: Vec<String>,
    pub bad: Vec<String>,
}

impl Exemplars {
    pub fn is_empty(&self) -> bool {
        self.good.is_empty() && self.bad.is_empty()
    }
}

/// Everything a chat completion call needs besides the model itself.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub history: Vec<ChatTurn>,
    pub exemplars: Exemplars,
    pub context: String,
    pub message: String,
}

/// Assemble the user-role prompt: context data, then liked/disliked
/// references, then the question, then the closing instruction. Section
/// wording is part of the observable prompt contract.
pub fn build_user_prompt(context: &str, exemplars: &Exemplars, message: &str) -> String {
    let mut parts: Vec<String> = Vec::new();

    if !context.is_empty() {
        parts.push(format!("Context Data:\n{}", context));
    }

    if !exemplars.good.is_empty() {
        let list = exemplars
            .good
            .iter()
            .map(|item| format!("- {}", item))
            .collect::<Vec<_>>()
            .join("\n");
        parts.push(format!(
            "Reference (Past Good Answers):\nThe user previously liked these answers for a similar question. Use them as a style/content guide:\n{}",
            list
        ));
    }

    if !exemplars.bad.is_empty() {
        let list = exemplars
            .bad
            .iter()
            .map(|item| format!("- {}", item))
            .collect::<Vec<_>>()
            .join("\n");
        parts.push(format!(
            "Constraint (Past Bad Answers):\nThe user previously disliked these answers for a similar question. Do NOT repeat these mistakes:\n{}",
            list
        ));
    }

    parts.push(format!("User Question: {}", message));

    if !context.is_empty() {
        parts.push(
            "Please answer based on the context data provided above. Be specific and use the data."
                .to_string(),
        );
    } else if !exemplars.is_empty() {
        parts.push("Please answer using the feedback references as a guide.".to_string());
    }

    parts.join("\n\n")
}

// ============================================================================
// CompletionBackend trait
// ============================================================================

/// Abstraction over the text-completion service. Both calls are remote
/// calls whose only fault modes are connection, timeout and HTTP status.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// Classify a raw user message. Callers fail open to
    /// `IntentClassification::general()` on `Err`.
    async fn classify(&self, message: &str) -> Result<IntentClassification, LlmError>;

    /// Produce the assistant reply for an assembled request.
    async fn complete(&self, request: &CompletionRequest) -> Result<String, LlmError>;

    /// Model identifier for health reporting.
    fn model(&self) -> &str;
}

// ============================================================================
// Ollama wire structs (private)
// ============================================================================

#[derive(Debug, Serialize)]
struct OllamaChatRequest {
    model: String,
    messages: Vec<OllamaMessage>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct OllamaMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    message: Option<OllamaMessage>,
}

#[derive(Debug, Deserialize)]
struct OllamaErrorResponse {
    error: Option<String>,
}

// ============================================================================
// OllamaClient
// ============================================================================

/// Production completion backend talking to a local Ollama server.
pub struct OllamaClient {
    client: Client,
    config: LlmConfig,
}

impl OllamaClient {
    pub fn new(config: LlmConfig) -> Result<Self, LlmError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_seconds))
            .build()?;
        Ok(Self { client, config })
    }

    async fn chat_once(
        &self,
        messages: Vec<OllamaMessage>,
        json_format: bool,
        timeout: Duration,
    ) -> Result<String, LlmError> {
        let url = format!("{}/api/chat", self.config.base_url);
        let request = OllamaChatRequest {
            model: self.config.model.clone(),
            messages,
            stream: false,
            format: json_format.then(|| "json".to_string()),
        };

        let response = self
            .client
            .post(&url)
            .timeout(timeout)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<OllamaErrorResponse>(&error_body)
                .ok()
                .and_then(|e| e.error)
                .unwrap_or(error_body);
            tracing::error!(code = status.as_u16(), message = %message, "Ollama API error");
            return Err(LlmError::Api {
                code: status.as_u16(),
                message,
            });
        }

        let body: OllamaChatResponse = response.json().await?;
        Ok(body.message.map(|m| m.content).unwrap_or_default())
    }

    async fn classify_once(&self, message: &str) -> Result<IntentClassification, LlmError> {
        let content = self
            .chat_once(
                vec![OllamaMessage {
                    role: "user".to_string(),
                    content: format!("{}{}", CLASSIFY_PROMPT, message),
                }],
                true,
                Duration::from_secs(self.config.classify_timeout_seconds),
            )
            .await?;

        Ok(parse_classification(&content))
    }
}

/// Strict JSON parse of the classifier output, with a text heuristic for
/// malformed content. A transport failure is an error; malformed content
/// is still a (degraded) classification.
fn parse_classification(content: &str) -> IntentClassification {
    match serde_json::from_str::<IntentClassification>(content) {
        Ok(parsed) => parsed,
        Err(_) => {
            let upper = content.to_uppercase();
            if upper.contains("PERSONAL") || upper.contains("STUDENT") {
                IntentClassification {
                    intent: Intent::PersonalData,
                    search_term: None,
                }
            } else {
                IntentClassification::general()
            }
        }
    }
}

#[async_trait]
impl CompletionBackend for OllamaClient {
    async fn classify(&self, message: &str) -> Result<IntentClassification, LlmError> {
        let retry_strategy = ExponentialBackoff::from_millis(self.config.retry_delay_ms)
            .max_delay(Duration::from_secs(10))
            .map(jitter)
            .take(self.config.max_retries);

        match Retry::spawn(retry_strategy, || self.classify_once(message)).await {
            Ok(classification) => Ok(classification),
            Err(e) => {
                tracing::error!(
                    attempts = self.config.max_retries,
                    error = %e,
                    "All intent classification attempts failed"
                );
                Err(LlmError::RetryExhausted {
                    attempts: self.config.max_retries,
                })
            }
        }
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<String, LlmError> {
        let mut messages = Vec::with_capacity(request.history.len() * 2 + 2);
        messages.push(OllamaMessage {
            role: "system".to_string(),
            content: SYSTEM_PROMPT.to_string(),
        });
        for turn in &request.history {
            messages.push(OllamaMessage {
                role: "user".to_string(),
                content: turn.user.clone(),
            });
            messages.push(OllamaMessage {
                role: "assistant".to_string(),
                content: turn.assistant.clone(),
            });
        }
        messages.push(OllamaMessage {
            role: "user".to_string(),
            content: build_user_prompt(&request.context, &request.exemplars, &request.message),
        });

        self.chat_once(
            messages,
            false,
            Duration::from_secs(self.config.chat_timeout_seconds),
        )
        .await
    }

    fn model(&self) -> &str {
        &self.config.model
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(base_url: &str) -> LlmConfig {
        LlmConfig {
            base_url: base_url.to_string(),
            model: "llama3.1:latest".to_string(),
            classify_timeout_seconds: 5,
            chat_timeout_seconds: 5,
            connect_timeout_seconds: 2,
            max_retries: 2,
            retry_delay_ms: 10,
            history_turns: 10,
        }
    }

    fn chat_body(content: &str) -> serde_json::Value {
        serde_json::json!({
            "message": { "role": "assistant", "content": content }
        })
    }

    // --- parse_classification ---

    #[test]
    fn parse_strict_json_classification() {
        let parsed =
            parse_classification(r#"{"intent": "PERSONAL_DATA", "search_term": "John Smith"}"#);
        assert_eq!(parsed.intent, Intent::PersonalData);
        assert_eq!(parsed.search_term.as_deref(), Some("John Smith"));
    }

    #[test]
    fn parse_malformed_content_uses_text_heuristic() {
        let parsed = parse_classification("The user is asking about a STUDENT record.");
        assert_eq!(parsed.intent, Intent::PersonalData);
        assert!(parsed.search_term.is_none());

        let parsed = parse_classification("just a greeting");
        assert_eq!(parsed.intent, Intent::General);
    }

    #[test]
    fn parse_unknown_intent_variant_falls_back() {
        // Unknown enum variant fails strict parse; no trigger words either.
        let parsed = parse_classification(r#"{"intent": "CHITCHAT", "search_term": null}"#);
        assert_eq!(parsed.intent, Intent::General);
    }

    // --- build_user_prompt ---

    #[test]
    fn prompt_with_context_appends_data_instruction() {
        let prompt = build_user_prompt("STATS: 10 students", &Exemplars::default(), "how many?");
        assert!(prompt.starts_with("Context Data:\nSTATS: 10 students"));
        assert!(prompt.contains("User Question: how many?"));
        assert!(prompt.ends_with("Be specific and use the data."));
    }

    #[test]
    fn prompt_with_exemplars_only_appends_guide_instruction() {
        let exemplars = Exemplars {
            good: vec!["Nice answer".to_string()],
            bad: vec!["Bad answer".to_string()],
        };
        let prompt = build_user_prompt("", &exemplars, "what programs do you have?");
        assert!(prompt.contains("Reference (Past Good Answers):"));
        assert!(prompt.contains("- Nice answer"));
        assert!(prompt.contains("Constraint (Past Bad Answers):"));
        assert!(prompt.contains("- Bad answer"));
        assert!(!prompt.contains("Context Data:"));
        assert!(prompt.ends_with("Please answer using the feedback references as a guide."));
    }

    #[test]
    fn bare_prompt_is_just_the_question() {
        let prompt = build_user_prompt("", &Exemplars::default(), "hello");
        assert_eq!(prompt, "User Question: hello");
    }

    // --- OllamaClient over wiremock ---

    #[tokio::test]
    async fn classify_parses_json_intent() {
        let server = MockServer::start().await;
        let client = OllamaClient::new(test_config(&server.uri())).unwrap();

        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .respond_with(ResponseTemplate::new(200).set_body_json(chat_body(
                r#"{"intent": "PERSONAL_DATA", "search_term": "Vicky"}"#,
            )))
            .mount(&server)
            .await;

        let result = client.classify("who is Vicky?").await.unwrap();
        assert_eq!(result.intent, Intent::PersonalData);
        assert_eq!(result.search_term.as_deref(), Some("Vicky"));
    }

    #[tokio::test]
    async fn classify_retries_then_errors_on_persistent_500() {
        let server = MockServer::start().await;
        let client = OllamaClient::new(test_config(&server.uri())).unwrap();

        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(500)
                    .set_body_json(serde_json::json!({ "error": "model load failed" })),
            )
            .mount(&server)
            .await;

        let result = client.classify("hello").await;
        match result {
            Err(LlmError::RetryExhausted { attempts }) => assert_eq!(attempts, 2),
            other => panic!("expected RetryExhausted, got {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn classify_recovers_after_transient_failure() {
        let server = MockServer::start().await;
        let client = OllamaClient::new(test_config(&server.uri())).unwrap();

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(chat_body(r#"{"intent": "GENERAL", "search_term": null}"#)),
            )
            .mount(&server)
            .await;

        let result = client.classify("hello").await.unwrap();
        assert_eq!(result.intent, Intent::General);
    }

    #[tokio::test]
    async fn complete_returns_assistant_content() {
        let server = MockServer::start().await;
        let client = OllamaClient::new(test_config(&server.uri())).unwrap();

        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .respond_with(ResponseTemplate::new(200).set_body_json(chat_body("Hi there!")))
            .mount(&server)
            .await;

        let request = CompletionRequest {
            history: vec![ChatTurn {
                user: "hello".to_string(),
                assistant: "hi".to_string(),
            }],
            exemplars: Exemplars::default(),
            context: String::new(),
            message: "how are you?".to_string(),
        };

        let reply = client.complete(&request).await.unwrap();
        assert_eq!(reply, "Hi there!");
    }

    #[tokio::test]
    async fn complete_maps_non_2xx_to_api_error() {
        let server = MockServer::start().await;
        let client = OllamaClient::new(test_config(&server.uri())).unwrap();

        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(404)
                    .set_body_json(serde_json::json!({ "error": "model not found" })),
            )
            .mount(&server)
            .await;

        let request = CompletionRequest {
            history: vec![],
            exemplars: Exemplars::default(),
            context: String::new(),
            message: "hello".to_string(),
        };

        match client.complete(&request).await {
            Err(LlmError::Api { code, message }) => {
                assert_eq!(code, 404);
                assert_eq!(message, "model not found");
            }
            other => panic!("expected Api error, got {:?}", other.map(|_| ())),
        }
    }
}
