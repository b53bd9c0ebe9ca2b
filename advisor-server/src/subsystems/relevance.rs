//! Relevance engine — exemplar retrieval over the feedback log.
//!
//! Scores a new query against historically recorded queries and
//! surfaces up to three liked and three disliked past responses for
//! prompt injection. Similarity is lexical: substring containment
//! either way, or Jaccard word overlap above a threshold. No stemming,
//! no statistical claims.
//!
//! The two read paths differ on purpose: the primary scan walks
//! newest-first and exits early once both buckets are full, while the
//! fallback scan walks the whole log oldest-first and keeps the last
//! three matches per bucket. On tie cases they return different
//! orderings; both behaviors are preserved as observed, and unifying
//! them is left as a future consolidation.

use std::collections::HashSet;
use std::sync::Arc;

use advisor_core::models::{FeedbackRecord, FeedbackScore};
use advisor_core::Exemplars;
use advisor_data::FeedbackStore;

pub struct RelevanceEngine {
    store: Arc<FeedbackStore>,
    scan_limit: usize,
    similarity_threshold: f64,
    max_exemplars: usize,
}

impl RelevanceEngine {
    pub fn new(
        store: Arc<FeedbackStore>,
        scan_limit: usize,
        similarity_threshold: f64,
        max_exemplars: usize,
    ) -> Self {
        Self {
            store,
            scan_limit,
            similarity_threshold,
            max_exemplars,
        }
    }

    /// Up to `max_exemplars` good and bad past responses for queries
    /// similar to this one. Store failures degrade to an empty result.
    pub async fn find_exemplars(&self, query: &str) -> Exemplars {
        let query_lower = query.to_lowercase();
        let query_words = word_set(&query_lower);
        if query_words.is_empty() {
            return Exemplars::default();
        }

        match self.store.primary_recent(self.scan_limit).await {
            Some(Ok(records)) => self.scan_primary(&query_lower, &query_words, &records),
            Some(Err(e)) => {
                tracing::warn!(error = %e, "primary feedback scan failed, using fallback");
                self.scan_fallback(&query_lower, &query_words).await
            }
            None => self.scan_fallback(&query_lower, &query_words).await,
        }
    }

    /// Newest-first scan with early exit once both buckets are full.
    fn scan_primary(
        &self,
        query_lower: &str,
        query_words: &HashSet<String>,
        records: &[FeedbackRecord],
    ) -> Exemplars {
        let mut exemplars = Exemplars::default();
        for record in records {
            if !self.is_similar(query_lower, query_words, &record.query) {
                continue;
            }
            let bucket = match record.score {
                FeedbackScore::Liked => &mut exemplars.good,
                FeedbackScore::Disliked => &mut exemplars.bad,
            };
            if bucket.len() < self.max_exemplars && !bucket.contains(&record.response) {
                bucket.push(record.response.clone());
            }
            if exemplars.good.len() == self.max_exemplars
                && exemplars.bad.len() == self.max_exemplars
            {
                break;
            }
        }
        exemplars
    }

    /// Full oldest-first scan, truncated to the last matches per bucket.
    async fn scan_fallback(&self, query_lower: &str, query_words: &HashSet<String>) -> Exemplars {
        let records = match self.store.fallback_recent(usize::MAX).await {
            Ok(records) => records,
            Err(e) => {
                tracing::warn!(error = %e, "fallback feedback scan failed");
                return Exemplars::default();
            }
        };

        let mut good: Vec<String> = Vec::new();
        let mut bad: Vec<String> = Vec::new();
        for record in records.iter().rev() {
            if !self.is_similar(query_lower, query_words, &record.query) {
                continue;
            }
            let bucket = match record.score {
                FeedbackScore::Liked => &mut good,
                FeedbackScore::Disliked => &mut bad,
            };
            if !bucket.contains(&record.response) {
                bucket.push(record.response.clone());
            }
        }

        Exemplars {
            good: tail(good, self.max_exemplars),
            bad: tail(bad, self.max_exemplars),
        }
    }

    fn is_similar(
        &self,
        query_lower: &str,
        query_words: &HashSet<String>,
        past_query: &str,
    ) -> bool {
        let past_lower = past_query.to_lowercase();
        let past_words = word_set(&past_lower);
        if past_words.is_empty() {
            return false;
        }

        if query_lower.contains(&past_lower) || past_lower.contains(query_lower) {
            return true;
        }

        jaccard(query_words, &past_words) > self.similarity_threshold
    }
}

fn word_set(text: &str) -> HashSet<String> {
    text.split_whitespace().map(str::to_string).collect()
}

/// |intersection| / |union| over exact whitespace tokens.
fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f64 / union as f64
}

fn tail(mut items: Vec<String>, n: usize) -> Vec<String> {
    let start = items.len().saturating_sub(n);
    items.split_off(start)
}
