use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const TOP_K_CHOICES: [u32; 4] = [1, 3, 5, 10];
pub const DEFAULT_TOP_K: u32 = 3;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RetrievalError {
    #[error("Please enter query text")]
    EmptyQuery,
    #[error("top_k must be at least 1")]
    InvalidTopK,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalRequest {
    pub query: String,
    pub kb_id: i64,
    pub top_k: u32,
}

impl RetrievalRequest {
    pub fn new(query: impl Into<String>, kb_id: i64, top_k: u32) -> Result<Self, RetrievalError> {
        let request = Self {
            query: query.into().trim().to_string(),
            kb_id,
            top_k,
        };
        request.validate()?;
        Ok(request)
    }

    pub fn validate(&self) -> Result<(), RetrievalError> {
        if self.query.trim().is_empty() {
            return Err(RetrievalError::EmptyQuery);
        }
        if self.top_k == 0 {
            return Err(RetrievalError::InvalidTopK);
        }
        Ok(())
    }
}

/// One scored result from the retrieval service, consumed as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalHit {
    pub score: f64,
    pub document: String,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl RetrievalHit {
    pub fn source(&self) -> Option<&str> {
        self.metadata.get("source").and_then(Value::as_str)
    }

    pub fn relevance_label(&self) -> String {
        relevance_label(self.score)
    }
}

pub fn relevance_label(score: f64) -> String {
    format!("{:.2}%", score * 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_query_is_rejected() {
        assert_eq!(
            RetrievalRequest::new("   ", 1, 3),
            Err(RetrievalError::EmptyQuery)
        );
    }

    #[test]
    fn zero_top_k_is_rejected() {
        assert_eq!(
            RetrievalRequest::new("pricing", 1, 0),
            Err(RetrievalError::InvalidTopK)
        );
    }

    #[test]
    fn query_is_trimmed() {
        let request = RetrievalRequest::new("  pricing tiers ", 7, 5).expect("valid request");
        assert_eq!(request.query, "pricing tiers");
        assert_eq!(request.kb_id, 7);
    }

    #[test]
    fn relevance_is_a_two_decimal_percentage() {
        assert_eq!(relevance_label(0.87654), "87.65%");
        assert_eq!(relevance_label(1.0), "100.00%");
        assert_eq!(relevance_label(0.0), "0.00%");
    }

    #[test]
    fn hit_reads_source_from_metadata() {
        let hit: RetrievalHit = serde_json::from_str(
            r#"{"score":0.5,"document":"text","metadata":{"source":"kb/guide.md","page":3}}"#,
        )
        .expect("parse hit");
        assert_eq!(hit.source(), Some("kb/guide.md"));
        assert_eq!(hit.relevance_label(), "50.00%");
    }
}
