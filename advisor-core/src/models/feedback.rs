use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A thumbs-up (+1) or thumbs-down (-1) rating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "i8", into = "i8")]
pub enum FeedbackScore {
    Liked,
    Disliked,
}

impl FeedbackScore {
    pub fn as_i8(self) -> i8 {
        match self {
            FeedbackScore::Liked => 1,
            FeedbackScore::Disliked => -1,
        }
    }
}

impl TryFrom<i8> for FeedbackScore {
    type Error = String;

    fn try_from(value: i8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(FeedbackScore::Liked),
            -1 => Ok(FeedbackScore::Disliked),
            other => Err(format!("score must be 1 or -1, got {}", other)),
        }
    }
}

impl From<FeedbackScore> for i8 {
    fn from(score: FeedbackScore) -> Self {
        score.as_i8()
    }
}

/// One recorded (query, response, score) triple. Append-only: records
/// are never updated or deleted once written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackRecord {
    pub query: String,
    pub response: String,
    pub score: FeedbackScore,
    pub timestamp: DateTime<Utc>,
}

impl FeedbackRecord {
    pub fn new(query: impl Into<String>, response: impl Into<String>, score: FeedbackScore) -> Self {
        Self {
            query: query.into(),
            response: response.into(),
            score,
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn score_roundtrips_through_i8() {
        assert_eq!(FeedbackScore::try_from(1), Ok(FeedbackScore::Liked));
        assert_eq!(FeedbackScore::try_from(-1), Ok(FeedbackScore::Disliked));
        assert!(FeedbackScore::try_from(0).is_err());
        assert_eq!(FeedbackScore::Liked.as_i8(), 1);
        assert_eq!(FeedbackScore::Disliked.as_i8(), -1);
    }

    #[test]
    fn record_serializes_score_as_integer() {
        let rec = FeedbackRecord::new("q", "r", FeedbackScore::Disliked);
        let json = serde_json::to_value(&rec).unwrap();
        assert_eq!(json["score"], -1);
    }
}
