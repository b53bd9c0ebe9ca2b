//! Feedback store — append-only (query, response, score) log.
//!
//! Two physical homes: a Postgres primary and a local JSON-lines
//! fallback mirror. Writes to each are independent best-effort; a
//! failure on one side is logged and never rolls back the other. On
//! reads the primary wins when present; the fallback replaces it only
//! when the primary is absent or erroring, and never supplements it.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use advisor_core::models::{FeedbackRecord, FeedbackScore};
use advisor_core::AdvisorError;

#[async_trait]
pub trait FeedbackBackend: Send + Sync {
    /// Backend name for failure logs.
    fn name(&self) -> &str;

    async fn append(&self, record: &FeedbackRecord) -> Result<(), AdvisorError>;

    /// Up to `limit` records, most recent first.
    async fn recent(&self, limit: usize) -> Result<Vec<FeedbackRecord>, AdvisorError>;
}

// ============================================================================
// PgFeedbackLog — primary
// ============================================================================

pub struct PgFeedbackLog {
    pool: PgPool,
}

impl PgFeedbackLog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the feedback table when it does not exist yet.
    pub async fn ensure_schema(&self) -> Result<(), AdvisorError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS feedback (
                id BIGSERIAL PRIMARY KEY,
                query TEXT NOT NULL,
                response TEXT NOT NULL,
                score SMALLINT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl FeedbackBackend for PgFeedbackLog {
    fn name(&self) -> &str {
        "postgres"
    }

    async fn append(&self, record: &FeedbackRecord) -> Result<(), AdvisorError> {
        sqlx::query(
            "INSERT INTO feedback (query, response, score, created_at) VALUES ($1, $2, $3, $4)",
        )
        .bind(&record.query)
        .bind(&record.response)
        .bind(record.score.as_i8() as i16)
        .bind(record.timestamp)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn recent(&self, limit: usize) -> Result<Vec<FeedbackRecord>, AdvisorError> {
        let rows: Vec<(String, String, i16, DateTime<Utc>)> = sqlx::query_as(
            "SELECT query, response, score, created_at FROM feedback \
             ORDER BY created_at DESC, id DESC LIMIT $1",
        )
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;

        let mut records = Vec::with_capacity(rows.len());
        for (query, response, score, timestamp) in rows {
            match FeedbackScore::try_from(score as i8) {
                Ok(score) => records.push(FeedbackRecord {
                    query,
                    response,
                    score,
                    timestamp,
                }),
                Err(e) => tracing::warn!(error = %e, "skipping feedback row with invalid score"),
            }
        }
        Ok(records)
    }
}

// ============================================================================
// JsonlFeedbackLog — local fallback
// ============================================================================

/// Append-only JSON-lines file, one record per line. A missing file
/// reads as an empty log.
pub struct JsonlFeedbackLog {
    path: PathBuf,
}

impl JsonlFeedbackLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl FeedbackBackend for JsonlFeedbackLog {
    fn name(&self) -> &str {
        "jsonl"
    }

    async fn append(&self, record: &FeedbackRecord) -> Result<(), AdvisorError> {
        let mut line = serde_json::to_string(record)
            .map_err(|e| AdvisorError::Data(format!("feedback serialization: {}", e)))?;
        line.push('\n');

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }

    async fn recent(&self, limit: usize) -> Result<Vec<FeedbackRecord>, AdvisorError> {
        let text = match tokio::fs::read_to_string(&self.path).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(vec![]),
            Err(e) => return Err(e.into()),
        };

        let mut records: Vec<FeedbackRecord> = Vec::new();
        for line in text.lines().filter(|l| !l.trim().is_empty()) {
            match serde_json::from_str(line) {
                Ok(record) => records.push(record),
                Err(e) => tracing::warn!(error = %e, "skipping malformed feedback line"),
            }
        }

        // File order is oldest-first; callers get newest-first.
        let start = records.len().saturating_sub(limit);
        let mut recent: Vec<FeedbackRecord> = records.split_off(start);
        recent.reverse();
        Ok(recent)
    }
}

// ============================================================================
// MemoryFeedbackLog — in-memory backend for tests and demos
// ============================================================================

#[derive(Default)]
pub struct MemoryFeedbackLog {
    records: Mutex<Vec<FeedbackRecord>>,
}

impl MemoryFeedbackLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn seed(&self, records: Vec<FeedbackRecord>) {
        self.records.lock().await.extend(records);
    }
}

#[async_trait]
impl FeedbackBackend for MemoryFeedbackLog {
    fn name(&self) -> &str {
        "memory"
    }

    async fn append(&self, record: &FeedbackRecord) -> Result<(), AdvisorError> {
        self.records.lock().await.push(record.clone());
        Ok(())
    }

    async fn recent(&self, limit: usize) -> Result<Vec<FeedbackRecord>, AdvisorError> {
        let records = self.records.lock().await;
        Ok(records.iter().rev().take(limit).cloned().collect())
    }
}

// ============================================================================
// FeedbackStore — tiered primary + fallback
// ============================================================================

pub struct FeedbackStore {
    primary: Option<Arc<dyn FeedbackBackend>>,
    fallback: Arc<dyn FeedbackBackend>,
}

impl FeedbackStore {
    pub fn new(primary: Option<Arc<dyn FeedbackBackend>>, fallback: Arc<dyn FeedbackBackend>) -> Self {
        Self { primary, fallback }
    }

    pub fn has_primary(&self) -> bool {
        self.primary.is_some()
    }

    /// Best-effort append to both homes. Each side logs its own failure;
    /// neither write is rolled back because of the other. Persistence
    /// failure never fails the enclosing request.
    pub async fn append(&self, record: &FeedbackRecord) {
        if let Some(primary) = &self.primary {
            if let Err(e) = primary.append(record).await {
                tracing::error!(backend = primary.name(), error = %e, "feedback write failed");
            }
        }
        if let Err(e) = self.fallback.append(record).await {
            tracing::error!(backend = self.fallback.name(), error = %e, "feedback write failed");
        }
    }

    /// Most-recent-first records from the primary; the fallback replaces
    /// it when the primary is absent or errors.
    pub async fn recent(&self, limit: usize) -> Result<Vec<FeedbackRecord>, AdvisorError> {
        if let Some(primary) = &self.primary {
            match primary.recent(limit).await {
                Ok(records) => return Ok(records),
                Err(e) => {
                    tracing::warn!(backend = primary.name(), error = %e, "feedback read failed, using fallback");
                }
            }
        }
        self.fallback.recent(limit).await
    }

    /// Primary read without fallback substitution, for callers that
    /// need to know which scan discipline applies.
    pub async fn primary_recent(
        &self,
        limit: usize,
    ) -> Option<Result<Vec<FeedbackRecord>, AdvisorError>> {
        match &self.primary {
            Some(primary) => Some(primary.recent(limit).await),
            None => None,
        }
    }

    pub async fn fallback_recent(&self, limit: usize) -> Result<Vec<FeedbackRecord>, AdvisorError> {
        self.fallback.recent(limit).await
    }
}
