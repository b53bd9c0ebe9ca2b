pub mod config;
pub mod db;
pub mod error;
pub mod llm;
pub mod models;
pub mod privacy;

pub use config::AdvisorConfig;
pub use error::AdvisorError;
pub use llm::{
    build_user_prompt, ChatTurn, CompletionBackend, CompletionRequest, Exemplars, LlmError,
    OllamaClient,
};
pub use models::{
    FeedbackRecord, FeedbackScore, Intent, IntentClassification, StudentRecord, VerifiedSession,
};
pub use privacy::PrivacyFilter;
