use serde::{Deserialize, Serialize};

/// Classification of a user message: public conversation vs a request
/// that may touch individual student records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Intent {
    General,
    PersonalData,
}

/// Per-message classifier output. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntentClassification {
    pub intent: Intent,
    #[serde(default)]
    pub search_term: Option<String>,
}

impl IntentClassification {
    /// The fail-open default: public-only handling, no search term.
    pub fn general() -> Self {
        Self {
            intent: Intent::General,
            search_term: None,
        }
    }
}
