//! Shared search types.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::SearchError;

/// A document id with a ranker's raw score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoredDoc {
    pub doc_id: String,
    pub score: f64,
}

impl ScoredDoc {
    pub fn new(doc_id: impl Into<String>, score: f64) -> Self {
        Self {
            doc_id: doc_id.into(),
            score,
        }
    }
}

/// Which rankers a search uses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    Keyword,
    Graph,
    #[default]
    Hybrid,
}

impl FromStr for SearchMode {
    type Err = SearchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "keyword" => Ok(SearchMode::Keyword),
            "graph" => Ok(SearchMode::Graph),
            "hybrid" => Ok(SearchMode::Hybrid),
            other => Err(SearchError::InvalidMode(other.to_string())),
        }
    }
}

impl std::fmt::Display for SearchMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SearchMode::Keyword => "keyword",
            SearchMode::Graph => "graph",
            SearchMode::Hybrid => "hybrid",
        };
        f.write_str(name)
    }
}
