//! PII tripwire for the feedback write path.
//!
//! A feedback record is skipped when the query names an identifier or
//! grade concept, or when the response carries numeric tokens that look
//! like scores or identifiers. This is a best-effort heuristic, not a
//! guarantee; it exists to keep the obvious personal-data shapes out of
//! the append-only feedback log.

use regex::Regex;

/// Query terms that indicate the exchange touched identifying or graded
/// data. English and Korean, matched case-insensitively as substrings.
const SENSITIVE_QUERY_TERMS: &[&str] = &[
    "student number",
    "studentno",
    "student id",
    "grade",
    "gpa",
    "score",
    "학번",
    "성적",
    "점수",
    "평점",
];

pub struct PrivacyFilter {
    float_token: Regex,
    digit_run: Regex,
}

impl Default for PrivacyFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl PrivacyFilter {
    pub fn new() -> Self {
        Self {
            float_token: Regex::new(r"\d+\.\d+").expect("static float pattern"),
            digit_run: Regex::new(r"\d{5,}").expect("static digit-run pattern"),
        }
    }

    /// True when the (query, response) pair may be persisted.
    pub fn allow_write(&self, query: &str, response: &str) -> bool {
        let query_lower = query.to_lowercase();
        if SENSITIVE_QUERY_TERMS
            .iter()
            .any(|term| query_lower.contains(term))
        {
            return false;
        }

        !self.float_token.is_match(response) && !self.digit_run.is_match(response)
    }
}
