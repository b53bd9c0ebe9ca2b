//! advisor-cli — operator frontend for the Campus Advisor HTTP API
//!
//! # Subcommands
//! - `status`                          — server health and model
//! - `stats [--json]`                  — public roster aggregates
//! - `chat <message> [--session <id>]` — one chat turn from the terminal
//! - `feedback [-n <limit>] [--json]`  — recent feedback records

use clap::{Parser, Subcommand};
use serde::Deserialize;

const DEFAULT_SERVER: &str = "http://127.0.0.1:8000";
const DEFAULT_LIMIT: usize = 10;

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Debug, Parser)]
#[command(
    name = "advisor-cli",
    version,
    about = "Campus Advisor — operator CLI for the advisor HTTP API"
)]
struct Cli {
    /// Advisor HTTP server URL (overrides ADVISOR_HTTP_URL env var)
    #[arg(long, env = "ADVISOR_HTTP_URL", default_value = DEFAULT_SERVER)]
    server: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Show advisor server status
    Status,

    /// Show public roster statistics
    Stats {
        /// Output raw JSON
        #[arg(long)]
        json: bool,
    },

    /// Send one chat message and print the reply
    Chat {
        /// Message text
        message: String,

        /// Verified session id (omit for guest access)
        #[arg(long)]
        session: Option<String>,
    },

    /// List recent feedback records
    Feedback {
        /// Maximum number of records to show
        #[arg(short = 'n', long, default_value_t = DEFAULT_LIMIT)]
        limit: usize,

        /// Output raw JSON
        #[arg(long)]
        json: bool,
    },
}

// ============================================================================
// API Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ChatResponse {
    pub response: String,
    pub user: String,
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Deserialize)]
pub struct FeedbackListing {
    pub count: usize,
    pub records: Vec<FeedbackEntry>,
}

#[derive(Debug, Deserialize)]
pub struct FeedbackEntry {
    pub query: String,
    pub response: String,
    pub score: i8,
    pub timestamp: String,
}

// ============================================================================
// Output Formatting
// ============================================================================

/// Human-readable stats block from the /api/stats JSON.
pub fn format_stats(stats: &serde_json::Value) -> String {
    if let Some(error) = stats.get("error").and_then(|v| v.as_str()) {
        return format!("No statistics: {}", error);
    }

    let mut out = String::new();
    out.push_str(&format!(
        "Total students: {}\n",
        stats["total_students"].as_u64().unwrap_or(0)
    ));

    for (label, key) in [
        ("Gender", "gender_breakdown"),
        ("Nationality", "nationality_breakdown"),
    ] {
        if let Some(map) = stats.get(key).and_then(|v| v.as_object()) {
            if map.is_empty() {
                continue;
            }
            out.push_str(&format!("{}:\n", label));
            for (value, count) in map {
                out.push_str(&format!("  {:<20} {}\n", value, count.as_u64().unwrap_or(0)));
            }
        }
    }

    out.trim_end().to_string()
}

/// One line per record, newest first: score glyph, query, response preview.
pub fn format_feedback(records: &[FeedbackEntry]) -> String {
    if records.is_empty() {
        return "No feedback recorded yet.".to_string();
    }

    records
        .iter()
        .map(|r| {
            let glyph = if r.score >= 1 { "👍" } else { "👎" };
            let preview: String = r.response.chars().take(60).collect();
            format!("{} [{}] {} — {}", glyph, r.timestamp, r.query, preview)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Chat reply with the speaking user prefixed; login hints are marked.
pub fn format_chat(reply: &ChatResponse) -> String {
    if reply.kind == "login_hint" {
        format!("(login required)\n{}", reply.response)
    } else {
        format!("[{}] {}", reply.user, reply.response)
    }
}

// ============================================================================
// HTTP Client Calls
// ============================================================================

fn make_client(timeout_secs: u64) -> anyhow::Result<reqwest::blocking::Client> {
    Ok(reqwest::blocking::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()?)
}

/// Show the server status by calling GET /api/health.
fn do_status(server: &str) -> anyhow::Result<()> {
    let client = make_client(10)?;
    let url = format!("{}/api/health", server);

    match client.get(&url).send() {
        Ok(r) if r.status().is_success() => {
            let body: serde_json::Value = r.json().unwrap_or_default();
            println!("Advisor server: {}", body["status"].as_str().unwrap_or("unknown"));
            println!("Model:          {}", body["model"].as_str().unwrap_or("?"));
        }
        Ok(r) => {
            eprintln!("advisor-cli: server unhealthy (HTTP {})", r.status());
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("advisor-cli: cannot reach {} — {}", url, e);
            std::process::exit(1);
        }
    }

    Ok(())
}

/// Fetch and print roster statistics from GET /api/stats.
fn do_stats(server: &str, json_output: bool) -> anyhow::Result<()> {
    let client = make_client(10)?;
    let url = format!("{}/api/stats", server);

    let resp = match client.get(&url).send() {
        Ok(r) => r,
        Err(e) => {
            eprintln!("advisor-cli: connection failed to {}: {}", url, e);
            std::process::exit(1);
        }
    };

    let stats: serde_json::Value = resp.json()?;
    if json_output {
        println!("{}", serde_json::to_string_pretty(&stats)?);
    } else {
        println!("{}", format_stats(&stats));
    }

    Ok(())
}

/// Send one message through POST /api/chat.
fn do_chat(server: &str, message: &str, session: Option<&str>) -> anyhow::Result<()> {
    // Chat replies can take as long as the model does
    let client = make_client(180)?;
    let url = format!("{}/api/chat", server);
    let body = serde_json::json!({
        "message": message,
        "session_id": session,
    });

    let resp = match client.post(&url).json(&body).send() {
        Ok(r) => r,
        Err(e) => {
            eprintln!("advisor-cli: connection failed to {}: {}", url, e);
            std::process::exit(1);
        }
    };

    if !resp.status().is_success() {
        let status = resp.status();
        let body = resp.text().unwrap_or_default();
        eprintln!("advisor-cli: server returned {}: {}", status, body);
        std::process::exit(1);
    }

    let reply: ChatResponse = resp.json()?;
    println!("{}", format_chat(&reply));

    Ok(())
}

/// List recent feedback from GET /api/feedback/recent.
fn do_feedback(server: &str, limit: usize, json_output: bool) -> anyhow::Result<()> {
    let client = make_client(10)?;
    let url = format!("{}/api/feedback/recent?limit={}", server, limit);

    let resp = match client.get(&url).send() {
        Ok(r) => r,
        Err(e) => {
            eprintln!("advisor-cli: connection failed to {}: {}", url, e);
            std::process::exit(1);
        }
    };

    if json_output {
        let body: serde_json::Value = resp.json()?;
        println!("{}", serde_json::to_string_pretty(&body)?);
    } else {
        let listing: FeedbackListing = resp.json()?;
        println!("{}", format_feedback(&listing.records));
    }

    Ok(())
}

// ============================================================================
// Main
// ============================================================================

fn main() {
    let cli = Cli::parse();
    let server = cli.server.trim_end_matches('/').to_string();

    let result = match cli.command {
        Commands::Status => do_status(&server),
        Commands::Stats { json } => do_stats(&server, json),
        Commands::Chat { message, session } => do_chat(&server, &message, session.as_deref()),
        Commands::Feedback { limit, json } => do_feedback(&server, limit, json),
    };

    if let Err(e) = result {
        eprintln!("advisor-cli: {}", e);
        std::process::exit(1);
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(query: &str, response: &str, score: i8) -> FeedbackEntry {
        FeedbackEntry {
            query: query.to_string(),
            response: response.to_string(),
            score,
            timestamp: "2026-08-30T10:00:00Z".to_string(),
        }
    }

    #[test]
    fn test_format_stats_lists_breakdowns() {
        let stats = serde_json::json!({
            "total_students": 42,
            "columns": ["StudentNo", "Name", "Gender"],
            "gender_breakdown": { "Female": 22, "Male": 20 },
            "nationality_breakdown": { "Malaysia": 30, "China": 12 },
        });

        let out = format_stats(&stats);
        assert!(out.starts_with("Total students: 42"));
        assert!(out.contains("Gender:"));
        assert!(out.contains("Female"));
        assert!(out.contains("Nationality:"));
        assert!(out.contains("Malaysia"));
    }

    #[test]
    fn test_format_stats_surfaces_error_shape() {
        let stats = serde_json::json!({ "error": "No data available" });
        assert_eq!(format_stats(&stats), "No statistics: No data available");
    }

    #[test]
    fn test_format_feedback_glyphs_and_preview() {
        let records = vec![
            entry("how do I enrol", "Visit the registry office", 1),
            entry("opening hours", "No idea", -1),
        ];

        let out = format_feedback(&records);
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("👍"));
        assert!(lines[1].starts_with("👎"));
        assert!(lines[0].contains("how do I enrol"));
    }

    #[test]
    fn test_format_feedback_truncates_long_responses() {
        let long = "x".repeat(200);
        let out = format_feedback(&[entry("q", &long, 1)]);
        assert!(out.contains(&"x".repeat(60)));
        assert!(!out.contains(&"x".repeat(61)));
    }

    #[test]
    fn test_format_feedback_empty() {
        assert_eq!(format_feedback(&[]), "No feedback recorded yet.");
    }

    #[test]
    fn test_format_chat_marks_login_hint() {
        let reply = ChatResponse {
            response: "🔒 Please log in first".to_string(),
            user: "guest".to_string(),
            kind: "login_hint".to_string(),
        };
        assert!(format_chat(&reply).starts_with("(login required)"));
    }

    #[test]
    fn test_format_chat_prefixes_user() {
        let reply = ChatResponse {
            response: "hello!".to_string(),
            user: "Vicky Yiran".to_string(),
            kind: "message".to_string(),
        };
        assert_eq!(format_chat(&reply), "[Vicky Yiran] hello!");
    }
}
