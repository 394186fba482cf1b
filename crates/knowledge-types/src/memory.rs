//! Agent memory items.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A piece of information an agent asked to remember.
///
/// Only `last_accessed_at` changes after creation; recall stamps it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryItem {
    pub id: String,
    pub agent_id: String,
    /// Free-form category such as "fact", "preference" or "task"
    #[serde(rename = "type")]
    pub memory_type: String,
    pub content: String,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Derived match terms: long content tokens plus lowercased tags
    #[serde(default)]
    pub keywords: Vec<String>,
    /// Conversation this item belongs to, for session memory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// Speaker of a session message ("user", "assistant", ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_accessed_at: DateTime<Utc>,
}

impl MemoryItem {
    pub fn has_keyword(&self, term: &str) -> bool {
        self.keywords.iter().any(|k| k == term)
    }

    /// Whether this item was stored under `session_id`, either as a session
    /// message or by an agent of the same id.
    pub fn in_session(&self, session_id: &str) -> bool {
        self.agent_id == session_id || self.session_id.as_deref() == Some(session_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_item_json_shape() {
        let now = Utc::now();
        let item = MemoryItem {
            id: "mem_1".to_string(),
            agent_id: "agent-a".to_string(),
            memory_type: "fact".to_string(),
            content: "Prefers dark roast coffee".to_string(),
            tags: vec!["coffee".to_string()],
            keywords: vec!["prefers".to_string(), "coffee".to_string()],
            session_id: None,
            role: None,
            created_at: now,
            last_accessed_at: now,
        };

        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(json["type"], "fact");
        assert_eq!(json["agentId"], "agent-a");
        assert!(json.get("lastAccessedAt").is_some());
        assert!(json.get("sessionId").is_none());

        let decoded: MemoryItem = serde_json::from_value(json).unwrap();
        assert_eq!(decoded, item);
        assert!(decoded.has_keyword("coffee"));
    }
}
