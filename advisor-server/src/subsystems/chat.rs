//! Chat engine — the per-turn intent-routing state machine.
//!
//! Owns the authorization decision and context assembly for every
//! inbound message: classify, gate personal data on a verified session
//! and a self-match, attach relevance exemplars, call the completion
//! service. Classification failure fails open to GENERAL handling,
//! which is fail-closed with respect to personal data.
//!
//! The rolling conversation history is process-wide and shared across
//! sessions, exactly as in the system this replaces; it is a known
//! limitation kept for prompt-content compatibility.

use std::collections::VecDeque;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Mutex;

use advisor_core::llm::{ChatTurn, CompletionBackend, CompletionRequest, LlmError};
use advisor_core::models::{Intent, IntentClassification, VerifiedSession};
use advisor_data::{summary_stats, Roster};

use super::relevance::RelevanceEngine;

/// Substrings of a GENERAL message that trigger the statistics context.
const STATS_KEYWORDS: &[&str] = &[
    "how many",
    "total student",
    "gender",
    "ratio",
    "nationality",
    "statistics",
    "student count",
];

const LOGIN_HINT: &str = "🔒 This is student personal information. To view details, please login using the Login button above.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplyKind {
    LoginHint,
    Message,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatReply {
    pub response: String,
    pub user: String,
    #[serde(rename = "type")]
    pub kind: ReplyKind,
}

pub struct ChatEngine {
    llm: Arc<dyn CompletionBackend>,
    roster: Arc<dyn Roster>,
    relevance: RelevanceEngine,
    history: Mutex<VecDeque<ChatTurn>>,
    history_turns: usize,
}

impl ChatEngine {
    pub fn new(
        llm: Arc<dyn CompletionBackend>,
        roster: Arc<dyn Roster>,
        relevance: RelevanceEngine,
        history_turns: usize,
    ) -> Self {
        Self {
            llm,
            roster,
            relevance,
            history: Mutex::new(VecDeque::new()),
            history_turns,
        }
    }

    /// Handle one chat turn. Never errors: every collaborator failure
    /// is converted to a reply here.
    pub async fn handle_message(
        &self,
        message: &str,
        session: Option<&VerifiedSession>,
    ) -> ChatReply {
        let classification = match self.llm.classify(message).await {
            Ok(classification) => classification,
            Err(e) => {
                tracing::warn!(error = %e, "intent classification failed, defaulting to GENERAL");
                IntentClassification::general()
            }
        };
        tracing::info!(
            intent = ?classification.intent,
            search_term = classification.search_term.as_deref(),
            "intent classified"
        );

        let user = session.map(|s| s.name.clone()).unwrap_or_else(|| "guest".to_string());

        let context = match classification.intent {
            Intent::PersonalData => {
                let Some(session) = session else {
                    return ChatReply {
                        response: LOGIN_HINT.to_string(),
                        user: "guest".to_string(),
                        kind: ReplyKind::LoginHint,
                    };
                };

                match classification.search_term.as_deref() {
                    None => own_data_context(session),
                    Some(term) if is_self_match(&session.name, term) => {
                        searched_self_context(session)
                    }
                    Some(term) => {
                        // Denied: no completion call, and the roster is
                        // never queried for the other student.
                        return ChatReply {
                            response: denial_text(&session.name, term),
                            user,
                            kind: ReplyKind::Message,
                        };
                    }
                }
            }
            Intent::General => {
                if wants_statistics(message) {
                    let stats = summary_stats(self.roster.as_ref()).await;
                    format!(
                        "UNIVERSITY STATISTICS:\n{}",
                        serde_json::to_string_pretty(&stats).unwrap_or_default()
                    )
                } else {
                    String::new()
                }
            }
        };

        let exemplars = self.relevance.find_exemplars(message).await;
        let history: Vec<ChatTurn> = self.history.lock().await.iter().cloned().collect();

        let request = CompletionRequest {
            history,
            exemplars,
            context,
            message: message.to_string(),
        };

        match self.llm.complete(&request).await {
            Ok(response) => {
                let mut history = self.history.lock().await;
                history.push_back(ChatTurn {
                    user: message.to_string(),
                    assistant: response.clone(),
                });
                while history.len() > self.history_turns {
                    history.pop_front();
                }
                ChatReply {
                    response,
                    user,
                    kind: ReplyKind::Message,
                }
            }
            Err(e) => ChatReply {
                response: completion_error_text(&e),
                user,
                kind: ReplyKind::Message,
            },
        }
    }
}

/// Fixed, user-visible texts for completion-service failures. Distinct
/// from normal answers; nothing propagates past the engine.
fn completion_error_text(error: &LlmError) -> String {
    if error.is_connect() {
        "Error: Cannot connect to the model service. Make sure it is running.".to_string()
    } else if error.is_timeout() {
        "Error: Request timed out. Please try a simpler question.".to_string()
    } else if let LlmError::Api { code, .. } = error {
        format!("Error: The model service returned status {}", code)
    } else {
        format!("Error: {}", error)
    }
}

fn denial_text(verified_name: &str, search_term: &str) -> String {
    format!(
        "🔒 Privacy Protection: You can only access your own information. You are logged in as '{}', so you cannot view information about '{}'.",
        verified_name, search_term
    )
}

fn own_data_context(session: &VerifiedSession) -> String {
    format!(
        "STUDENT'S PERSONAL DATA:\n{}\n\nThis is {}'s information.",
        session.student_data.display_block(),
        session.name
    )
}

fn searched_self_context(session: &VerifiedSession) -> String {
    format!(
        "YOUR PERSONAL DATA:\n{}\n\nThis is your information.",
        session.student_data.display_block()
    )
}

/// Does a search term refer to the verified identity? Both sides are
/// lowercased and trimmed; match on containment either way, or on any
/// whitespace token of the term appearing inside the verified name.
fn is_self_match(verified_name: &str, search_term: &str) -> bool {
    let name = verified_name.trim().to_lowercase();
    let term = search_term.trim().to_lowercase();

    term.contains(&name)
        || name.contains(&term)
        || term.split_whitespace().any(|part| name.contains(part))
}

/// Fixed keyword scan over the raw message; any hit loads the
/// statistics context.
fn wants_statistics(message: &str) -> bool {
    let lower = message.to_lowercase();
    STATS_KEYWORDS.iter().any(|kw| lower.contains(kw))
}
