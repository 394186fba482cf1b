//! Conversation-scoped memory.
//!
//! A session is a running transcript: each message is stored as a
//! `conversation` memory whose agent id and session id are both the session
//! id, so the agent-level operations still see it. Session reads never stamp
//! access times and session writes are not subject to the per-agent cap.

use chrono::Utc;
use knowledge_storage::ResourceKind;
use knowledge_types::{generate_id, MemoryItem};
use serde::Serialize;
use tracing::{debug, info, instrument};

use crate::error::MemoryStoreError;
use crate::scorer::score;
use crate::store::{derive_keywords, MemoryStore};

/// Memory type given to every session message.
pub const SESSION_MEMORY_TYPE: &str = "conversation";

const DEFAULT_ROLE: &str = "user";

/// All messages of one session, oldest first.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionTranscript {
    pub session_id: String,
    pub count: usize,
    pub messages: Vec<MemoryItem>,
}

/// A session message returned by [`MemoryStore::recall_in_session`].
///
/// `relevance` is only set when the recall was ranked against a query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionRecall {
    #[serde(flatten)]
    pub item: MemoryItem,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relevance: Option<f64>,
}

fn require_session(session_id: &str) -> Result<(), MemoryStoreError> {
    if session_id.trim().is_empty() {
        return Err(MemoryStoreError::InvalidInput("sessionId is required".to_string()));
    }
    Ok(())
}

impl MemoryStore {
    /// Append a message to a session. `role` defaults to "user".
    #[instrument(skip(self, content))]
    pub fn remember_in_session(
        &self,
        tenant: &str,
        database: &str,
        session_id: &str,
        role: Option<&str>,
        content: &str,
    ) -> Result<MemoryItem, MemoryStoreError> {
        require_session(session_id)?;
        if content.trim().is_empty() {
            return Err(MemoryStoreError::InvalidInput("content is required".to_string()));
        }

        let key = Self::key(tenant, database)?;
        self.locks.with_lock(ResourceKind::Memory, &key, || {
            let mut items = self.load(&key)?;
            let now = Utc::now();
            let item = MemoryItem {
                id: generate_id("mem"),
                agent_id: session_id.to_string(),
                memory_type: SESSION_MEMORY_TYPE.to_string(),
                content: content.to_string(),
                tags: Vec::new(),
                keywords: derive_keywords(content, &[]),
                session_id: Some(session_id.to_string()),
                role: Some(role.unwrap_or(DEFAULT_ROLE).to_string()),
                created_at: now,
                last_accessed_at: now,
            };
            items.push(item.clone());
            self.save(&key, &items)?;

            debug!(memory_id = %item.id, "Stored session message");
            Ok(item)
        })
    }

    /// Every message stored under `session_id`.
    pub fn session(
        &self,
        tenant: &str,
        database: &str,
        session_id: &str,
    ) -> Result<SessionTranscript, MemoryStoreError> {
        require_session(session_id)?;
        let key = Self::key(tenant, database)?;
        let messages: Vec<MemoryItem> = self
            .load(&key)?
            .into_iter()
            .filter(|m| m.in_session(session_id))
            .collect();

        Ok(SessionTranscript {
            session_id: session_id.to_string(),
            count: messages.len(),
            messages,
        })
    }

    /// Rank a session's messages against `query`. Without a query (or with a
    /// blank one) the last `limit` messages come back unranked.
    #[instrument(skip(self))]
    pub fn recall_in_session(
        &self,
        tenant: &str,
        database: &str,
        session_id: &str,
        query: Option<&str>,
        limit: usize,
    ) -> Result<Vec<SessionRecall>, MemoryStoreError> {
        let messages = self.session(tenant, database, session_id)?.messages;

        match query.filter(|q| !q.trim().is_empty()) {
            Some(query) => Ok(score(query, &messages, limit, None)
                .into_iter()
                .map(|s| SessionRecall {
                    item: s.item,
                    relevance: Some(s.relevance),
                })
                .collect()),
            None => {
                let start = messages.len().saturating_sub(limit);
                Ok(messages
                    .into_iter()
                    .skip(start)
                    .map(|item| SessionRecall {
                        item,
                        relevance: None,
                    })
                    .collect())
            }
        }
    }

    /// Drop every message of a session. Returns how many went.
    #[instrument(skip(self))]
    pub fn forget_session(
        &self,
        tenant: &str,
        database: &str,
        session_id: &str,
    ) -> Result<usize, MemoryStoreError> {
        require_session(session_id)?;
        let key = Self::key(tenant, database)?;
        self.locks.with_lock(ResourceKind::Memory, &key, || {
            let items = self.load(&key)?;
            let before = items.len();
            let remaining: Vec<MemoryItem> = items
                .into_iter()
                .filter(|m| !m.in_session(session_id))
                .collect();

            let deleted = before - remaining.len();
            if deleted > 0 {
                self.save(&key, &remaining)?;
            }
            info!(session_id, deleted, "Forgot session");
            Ok(deleted)
        })
    }
}
