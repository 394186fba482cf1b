//! Per-document version history.
//!
//! Every update, replace, patch or rollback appends a snapshot of the prior
//! document state. Retention is bounded; the oldest snapshots go first.

use serde::{Deserialize, Serialize};

use crate::document::Document;

/// Snapshots retained per document unless configured otherwise.
pub const DEFAULT_HISTORY_LIMIT: usize = 50;

/// A full copy of a document as it was before a mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistorySnapshot {
    /// `_version` of the captured state
    pub version: u64,
    /// The complete prior document
    pub snapshot: Document,
    /// When the mutation that replaced this state happened (RFC 3339)
    pub changed_at: String,
}

impl HistorySnapshot {
    pub fn new(version: u64, snapshot: Document, changed_at: impl Into<String>) -> Self {
        Self {
            version,
            snapshot,
            changed_at: changed_at.into(),
        }
    }
}

/// Append a snapshot, evicting from the front until at most `limit` remain.
pub fn push_bounded(history: &mut Vec<HistorySnapshot>, snapshot: HistorySnapshot, limit: usize) {
    history.push(snapshot);
    if history.len() > limit {
        let excess = history.len() - limit;
        history.drain(..excess);
    }
}
