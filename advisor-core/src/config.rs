use config::{Config, ConfigError, File};
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct AdvisorConfig {
    pub service: ServiceConfig,
    /// Optional: absent when both the roster and the feedback primary
    /// run file-backed (no Postgres at all).
    #[serde(default)]
    pub database: Option<DatabaseConfig>,
    pub roster: RosterConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub feedback: FeedbackConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServiceConfig {
    pub host: String,
    pub port: u16,
    pub log_level: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            log_level: "info".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RosterConfig {
    /// "postgres" (table in the configured database) or "file"
    /// (JSON array of row objects at `path`).
    pub source: String,
    #[serde(default = "default_roster_table")]
    pub table: String,
    #[serde(default)]
    pub path: String,
}

fn default_roster_table() -> String {
    "students".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    pub base_url: String,
    pub model: String,
    pub classify_timeout_seconds: u64,
    pub chat_timeout_seconds: u64,
    pub connect_timeout_seconds: u64,
    pub max_retries: usize,
    pub retry_delay_ms: u64,
    /// Rolling conversation history cap, in (user, assistant) turns.
    pub history_turns: usize,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".to_string(),
            model: "llama3.1:latest".to_string(),
            classify_timeout_seconds: 30,
            chat_timeout_seconds: 120,
            connect_timeout_seconds: 5,
            max_retries: 3,
            retry_delay_ms: 500,
            history_turns: 10,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct FeedbackConfig {
    /// Local append-only JSON-lines mirror of the primary store.
    pub fallback_path: String,
    /// How many recent records the relevance engine scans.
    pub scan_limit: usize,
    /// Jaccard word-overlap threshold for "similar enough".
    pub similarity_threshold: f64,
    /// Cap per bucket (good / bad) on exemplars injected into prompts.
    pub max_exemplars: usize,
}

impl Default for FeedbackConfig {
    fn default() -> Self {
        Self {
            fallback_path: "feedback.jsonl".to_string(),
            scan_limit: 200,
            similarity_threshold: 0.3,
            max_exemplars: 3,
        }
    }
}

impl AdvisorConfig {
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let s = Config::builder()
            .add_source(File::with_name(path))
            .build()?;
        s.try_deserialize()
    }
}
