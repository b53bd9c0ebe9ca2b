//! Roster table collaborator — the queryable table of student records.
//!
//! Two implementations: `PgRoster` reads a Postgres table with whatever
//! columns the registrar loaded into it, and `MemoryRoster` holds the
//! whole table in memory for file-backed setups and tests.

use async_trait::async_trait;
use sqlx::PgPool;

use advisor_core::models::StudentRecord;
use advisor_core::AdvisorError;

use crate::columns::{identity_columns, resolve, ColumnRole};

#[async_trait]
pub trait Roster: Send + Sync {
    /// Column labels in declaration order.
    async fn columns(&self) -> Result<Vec<String>, AdvisorError>;

    /// Zero-or-one record whose `column` equals `value` after trimming
    /// and case-folding both sides.
    async fn find_by(&self, column: &str, value: &str)
        -> Result<Option<StudentRecord>, AdvisorError>;

    async fn count(&self) -> Result<u64, AdvisorError>;

    /// Distinct values of `column` with their row counts, most frequent
    /// first. Null/absent values are not counted.
    async fn aggregate_counts(&self, column: &str) -> Result<Vec<(String, u64)>, AdvisorError>;
}

fn fold(value: &str) -> String {
    value.trim().to_lowercase()
}

/// Render a JSON cell the way it should appear in prompts and replies.
fn render_value(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn record_from_json(row: &serde_json::Value) -> StudentRecord {
    let fields = row
        .as_object()
        .map(|obj| {
            obj.iter()
                .map(|(k, v)| (k.clone(), render_value(v)))
                .collect()
        })
        .unwrap_or_default();
    StudentRecord::new(fields)
}

// ============================================================================
// MemoryRoster
// ============================================================================

/// Whole-table-in-memory roster. Column order is taken from the first
/// row; a JSON file source must be an array of objects with identical
/// keys.
pub struct MemoryRoster {
    rows: Vec<StudentRecord>,
}

impl MemoryRoster {
    pub fn new(rows: Vec<StudentRecord>) -> Self {
        Self { rows }
    }

    pub fn load_json_file(path: &str) -> Result<Self, AdvisorError> {
        let text = std::fs::read_to_string(path)?;
        let rows: Vec<serde_json::Value> = serde_json::from_str(&text)
            .map_err(|e| AdvisorError::Data(format!("roster file {}: {}", path, e)))?;
        Ok(Self::new(rows.iter().map(record_from_json).collect()))
    }
}

#[async_trait]
impl Roster for MemoryRoster {
    async fn columns(&self) -> Result<Vec<String>, AdvisorError> {
        Ok(self
            .rows
            .first()
            .map(|r| r.columns().map(str::to_string).collect())
            .unwrap_or_default())
    }

    async fn find_by(
        &self,
        column: &str,
        value: &str,
    ) -> Result<Option<StudentRecord>, AdvisorError> {
        let wanted = fold(value);
        Ok(self
            .rows
            .iter()
            .find(|row| row.get(column).map(fold) == Some(wanted.clone()))
            .cloned())
    }

    async fn count(&self) -> Result<u64, AdvisorError> {
        Ok(self.rows.len() as u64)
    }

    async fn aggregate_counts(&self, column: &str) -> Result<Vec<(String, u64)>, AdvisorError> {
        let mut counts: Vec<(String, u64)> = Vec::new();
        for row in &self.rows {
            let Some(value) = row.get(column) else { continue };
            if value.is_empty() {
                continue;
            }
            match counts.iter_mut().find(|(v, _)| v == value) {
                Some((_, n)) => *n += 1,
                None => counts.push((value.to_string(), 1)),
            }
        }
        counts.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        Ok(counts)
    }
}

// ============================================================================
// PgRoster
// ============================================================================

/// Postgres-backed roster over an arbitrary-column table. Rows travel as
/// `row_to_json` so the schema stays dynamic end to end.
pub struct PgRoster {
    pool: PgPool,
    table: String,
}

fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

impl PgRoster {
    pub fn new(pool: PgPool, table: impl Into<String>) -> Self {
        Self {
            pool,
            table: table.into(),
        }
    }
}

#[async_trait]
impl Roster for PgRoster {
    async fn columns(&self) -> Result<Vec<String>, AdvisorError> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT column_name FROM information_schema.columns \
             WHERE table_schema = 'public' AND table_name = $1 \
             ORDER BY ordinal_position",
        )
        .bind(&self.table)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|(c,)| c).collect())
    }

    async fn find_by(
        &self,
        column: &str,
        value: &str,
    ) -> Result<Option<StudentRecord>, AdvisorError> {
        // Only resolver-selected labels reach this point, but refuse
        // anything that is not an actual column of the table.
        let known = self.columns().await?;
        if !known.iter().any(|c| c == column) {
            return Ok(None);
        }

        let sql = format!(
            "SELECT row_to_json(t) FROM {} t \
             WHERE lower(trim(t.{}::text)) = lower(trim($1)) LIMIT 1",
            quote_ident(&self.table),
            quote_ident(column),
        );
        let row: Option<(serde_json::Value,)> = sqlx::query_as(&sql)
            .bind(value)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|(json,)| record_from_json(&json)))
    }

    async fn count(&self) -> Result<u64, AdvisorError> {
        let sql = format!("SELECT count(*) FROM {}", quote_ident(&self.table));
        let (n,): (i64,) = sqlx::query_as(&sql).fetch_one(&self.pool).await?;
        Ok(n as u64)
    }

    async fn aggregate_counts(&self, column: &str) -> Result<Vec<(String, u64)>, AdvisorError> {
        let sql = format!(
            "SELECT {col}::text, count(*) FROM {table} \
             WHERE {col} IS NOT NULL GROUP BY 1 ORDER BY 2 DESC, 1 ASC",
            col = quote_ident(column),
            table = quote_ident(&self.table),
        );
        let rows: Vec<(String, i64)> = sqlx::query_as(&sql).fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(|(v, n)| (v, n as u64)).collect())
    }
}

// ============================================================================
// Verification and statistics over any Roster
// ============================================================================

/// Exact identifier+name match against the roster. Both sides are
/// trimmed and case-folded; column selection goes through the resolver
/// (including its positional fallback). An empty or unusable roster
/// verifies nobody — it never errors for that reason.
pub async fn verify_student(
    roster: &dyn Roster,
    student_number: &str,
    name: &str,
) -> Result<Option<StudentRecord>, AdvisorError> {
    let columns = roster.columns().await?;
    let Some((id_col, name_col)) = identity_columns(&columns) else {
        tracing::warn!(
            available = ?columns,
            "could not determine identity columns for verification"
        );
        return Ok(None);
    };

    let Some(record) = roster.find_by(&id_col, student_number).await? else {
        return Ok(None);
    };

    let matches = record.get(&name_col).map(fold) == Some(fold(name));
    Ok(matches.then_some(record))
}

/// Public aggregate snapshot: total count, column list, and gender /
/// nationality breakdowns when those columns exist. Collaborator
/// failures degrade to the "no data" shape rather than erroring.
pub async fn summary_stats(roster: &dyn Roster) -> serde_json::Value {
    let stats = async {
        let columns = roster.columns().await?;
        if columns.is_empty() {
            return Ok::<_, AdvisorError>(None);
        }

        let mut stats = serde_json::json!({
            "total_students": roster.count().await?,
            "columns": columns,
        });

        if let Some(gender_col) = resolve(&columns, ColumnRole::Gender) {
            let counts = roster.aggregate_counts(gender_col).await?;
            stats["gender_breakdown"] = counts_to_json(&counts);
        }
        if let Some(nat_col) = resolve(&columns, ColumnRole::Nationality) {
            let counts = roster.aggregate_counts(nat_col).await?;
            stats["nationality_breakdown"] = counts_to_json(&counts);
        }
        Ok(Some(stats))
    }
    .await;

    match stats {
        Ok(Some(stats)) => stats,
        Ok(None) => serde_json::json!({ "error": "No data available" }),
        Err(e) => {
            tracing::warn!(error = %e, "roster unavailable for statistics");
            serde_json::json!({ "error": "No data available" })
        }
    }
}

fn counts_to_json(counts: &[(String, u64)]) -> serde_json::Value {
    let mut map = serde_json::Map::new();
    for (value, n) in counts {
        map.insert(value.clone(), serde_json::json!(n));
    }
    serde_json::Value::Object(map)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_roster() -> MemoryRoster {
        let rows = vec![
            vec![
                ("StudentNo", "1001"),
                ("Name", "Vicky Yiran"),
                ("Gender", "Female"),
                ("Nationality", "China"),
            ],
            vec![
                ("StudentNo", "1002"),
                ("Name", "John Smith"),
                ("Gender", "Male"),
                ("Nationality", "Malaysia"),
            ],
            vec![
                ("StudentNo", "1003"),
                ("Name", "Aisha Binti"),
                ("Gender", "Female"),
                ("Nationality", "Malaysia"),
            ],
        ];
        MemoryRoster::new(
            rows.into_iter()
                .map(|r| {
                    StudentRecord::new(
                        r.into_iter()
                            .map(|(c, v)| (c.to_string(), v.to_string()))
                            .collect(),
                    )
                })
                .collect(),
        )
    }

    #[tokio::test]
    async fn verify_matches_trimmed_case_folded_pair() {
        let roster = sample_roster();
        let hit = verify_student(&roster, " 1001 ", "vicky yiran").await.unwrap();
        assert_eq!(hit.unwrap().get("Name"), Some("Vicky Yiran"));
    }

    #[tokio::test]
    async fn verify_rejects_name_mismatch() {
        let roster = sample_roster();
        let hit = verify_student(&roster, "1001", "John Smith").await.unwrap();
        assert!(hit.is_none());
    }

    #[tokio::test]
    async fn verify_on_empty_roster_is_none_not_error() {
        let roster = MemoryRoster::new(vec![]);
        let hit = verify_student(&roster, "1001", "Vicky Yiran").await.unwrap();
        assert!(hit.is_none());
    }

    #[tokio::test]
    async fn aggregate_counts_orders_most_frequent_first() {
        let roster = sample_roster();
        let counts = roster.aggregate_counts("Nationality").await.unwrap();
        assert_eq!(
            counts,
            vec![("Malaysia".to_string(), 2), ("China".to_string(), 1)]
        );
    }

    #[tokio::test]
    async fn stats_include_breakdowns_when_columns_exist() {
        let roster = sample_roster();
        let stats = summary_stats(&roster).await;
        assert_eq!(stats["total_students"], 3);
        assert_eq!(stats["gender_breakdown"]["Female"], 2);
        assert_eq!(stats["nationality_breakdown"]["Malaysia"], 2);
    }

    #[tokio::test]
    async fn stats_on_empty_roster_report_no_data() {
        let roster = MemoryRoster::new(vec![]);
        let stats = summary_stats(&roster).await;
        assert_eq!(stats["error"], "No data available");
    }
}
