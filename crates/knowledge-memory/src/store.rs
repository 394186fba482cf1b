//! Persistent agent memory.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use knowledge_storage::{ResourceKey, ResourceKind, ResourceLocks, Storage};
use knowledge_types::{generate_id, MemoryItem};
use serde::Serialize;
use tracing::{debug, info, instrument};

use crate::error::MemoryStoreError;
use crate::scorer::score;

/// Name of the per-database memory blob.
const MEMORY_BLOB: &str = "agent_memory";

/// Input to [`MemoryStore::remember`].
#[derive(Debug, Clone)]
pub struct NewMemory {
    pub agent_id: String,
    pub memory_type: String,
    pub content: String,
    pub tags: Vec<String>,
}

/// A recalled memory as returned to the agent.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecalledMemory {
    pub memory_id: String,
    pub content: String,
    #[serde(rename = "type")]
    pub memory_type: String,
    pub relevance: f64,
    pub created_at: DateTime<Utc>,
}

/// One page of [`MemoryStore::list`].
#[derive(Debug, Clone, Serialize)]
pub struct MemoryPage {
    /// Matches before pagination
    pub count: usize,
    pub memories: Vec<MemoryItem>,
}

/// Match terms for a new memory: lowercase content tokens longer than three
/// characters, then lowercased tags, without repeats.
pub fn derive_keywords(content: &str, tags: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    content
        .to_lowercase()
        .split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|t| t.chars().count() > 3)
        .map(str::to_string)
        .chain(tags.iter().map(|t| t.to_lowercase()))
        .filter(|k| seen.insert(k.clone()))
        .collect()
}

/// Agent memory backed by one blob per database.
pub struct MemoryStore {
    storage: Arc<Storage>,
    pub(crate) locks: Arc<ResourceLocks>,
    max_items_per_agent: usize,
}

impl MemoryStore {
    pub fn new(storage: Arc<Storage>, locks: Arc<ResourceLocks>, max_items_per_agent: usize) -> Self {
        Self {
            storage,
            locks,
            max_items_per_agent,
        }
    }

    pub(crate) fn key(tenant: &str, database: &str) -> Result<ResourceKey, MemoryStoreError> {
        Ok(ResourceKey::new(tenant, database, MEMORY_BLOB)?)
    }

    pub(crate) fn load(&self, key: &ResourceKey) -> Result<Vec<MemoryItem>, MemoryStoreError> {
        Ok(self
            .storage
            .get_json(ResourceKind::Memory, key)?
            .unwrap_or_default())
    }

    pub(crate) fn save(&self, key: &ResourceKey, items: &[MemoryItem]) -> Result<(), MemoryStoreError> {
        self.storage.put_json(ResourceKind::Memory, key, &items)?;
        Ok(())
    }

    /// Store a new memory for an agent.
    #[instrument(skip(self, memory), fields(agent = %memory.agent_id))]
    pub fn remember(
        &self,
        tenant: &str,
        database: &str,
        memory: NewMemory,
    ) -> Result<MemoryItem, MemoryStoreError> {
        if memory.agent_id.trim().is_empty() {
            return Err(MemoryStoreError::InvalidInput("agentId is required".to_string()));
        }
        if memory.memory_type.trim().is_empty() {
            return Err(MemoryStoreError::InvalidInput("type is required".to_string()));
        }
        if memory.content.trim().is_empty() {
            return Err(MemoryStoreError::InvalidInput("content is required".to_string()));
        }

        let key = Self::key(tenant, database)?;
        self.locks.with_lock(ResourceKind::Memory, &key, || {
            let mut items = self.load(&key)?;
            let held = items.iter().filter(|m| m.agent_id == memory.agent_id).count();
            if held >= self.max_items_per_agent {
                return Err(MemoryStoreError::LimitReached {
                    agent_id: memory.agent_id.clone(),
                    max: self.max_items_per_agent,
                });
            }

            let now = Utc::now();
            let item = MemoryItem {
                id: generate_id("mem"),
                keywords: derive_keywords(&memory.content, &memory.tags),
                agent_id: memory.agent_id,
                memory_type: memory.memory_type,
                content: memory.content,
                tags: memory.tags,
                session_id: None,
                role: None,
                created_at: now,
                last_accessed_at: now,
            };
            items.push(item.clone());
            self.save(&key, &items)?;

            debug!(memory_id = %item.id, "Stored memory");
            Ok(item)
        })
    }

    /// Rank an agent's memories against `query` and stamp the returned ones
    /// as accessed.
    #[instrument(skip(self))]
    pub fn recall(
        &self,
        tenant: &str,
        database: &str,
        agent_id: &str,
        query: &str,
        limit: usize,
        memory_type: Option<&str>,
    ) -> Result<Vec<RecalledMemory>, MemoryStoreError> {
        let key = Self::key(tenant, database)?;
        self.locks.with_lock(ResourceKind::Memory, &key, || {
            let mut items = self.load(&key)?;
            let agent_items: Vec<MemoryItem> = items
                .iter()
                .filter(|m| m.agent_id == agent_id)
                .cloned()
                .collect();
            let scored = score(query, &agent_items, limit, memory_type);
            if scored.is_empty() {
                return Ok(Vec::new());
            }

            let now = Utc::now();
            let recalled: HashSet<&str> = scored.iter().map(|s| s.item.id.as_str()).collect();
            for item in items.iter_mut() {
                if recalled.contains(item.id.as_str()) {
                    item.last_accessed_at = now;
                }
            }
            self.save(&key, &items)?;

            Ok(scored
                .into_iter()
                .map(|s| RecalledMemory {
                    memory_id: s.item.id,
                    content: s.item.content,
                    memory_type: s.item.memory_type,
                    relevance: s.relevance,
                    created_at: s.item.created_at,
                })
                .collect())
        })
    }

    /// Delete an agent's memories, optionally only of one type and only
    /// those created at least `older_than_days` ago. Returns how many went.
    #[instrument(skip(self))]
    pub fn forget(
        &self,
        tenant: &str,
        database: &str,
        agent_id: &str,
        memory_type: Option<&str>,
        older_than_days: Option<u32>,
    ) -> Result<usize, MemoryStoreError> {
        let cutoff = older_than_days.map(|days| Utc::now() - Duration::days(i64::from(days)));
        let key = Self::key(tenant, database)?;

        self.locks.with_lock(ResourceKind::Memory, &key, || {
            let items = self.load(&key)?;
            let before = items.len();
            let remaining: Vec<MemoryItem> = items
                .into_iter()
                .filter(|m| {
                    let doomed = m.agent_id == agent_id
                        && memory_type.map_or(true, |t| m.memory_type == t)
                        && cutoff.map_or(true, |c| m.created_at <= c);
                    !doomed
                })
                .collect();

            let deleted = before - remaining.len();
            if deleted > 0 {
                self.save(&key, &remaining)?;
            }
            info!(agent_id, deleted, "Forgot memories");
            Ok(deleted)
        })
    }

    /// Delete one memory by id. Fails with `NotFound` when the agent holds
    /// no memory with that id.
    #[instrument(skip(self))]
    pub fn forget_one(
        &self,
        tenant: &str,
        database: &str,
        agent_id: &str,
        memory_id: &str,
    ) -> Result<MemoryItem, MemoryStoreError> {
        let key = Self::key(tenant, database)?;
        self.locks.with_lock(ResourceKind::Memory, &key, || {
            let mut items = self.load(&key)?;
            let position = items
                .iter()
                .position(|m| m.id == memory_id && m.agent_id == agent_id)
                .ok_or_else(|| MemoryStoreError::NotFound {
                    agent_id: agent_id.to_string(),
                    memory_id: memory_id.to_string(),
                })?;
            let removed = items.remove(position);
            self.save(&key, &items)?;
            info!(agent_id, memory_id, "Forgot memory");
            Ok(removed)
        })
    }

    /// Page through memories, optionally for one agent and one type.
    pub fn list(
        &self,
        tenant: &str,
        database: &str,
        agent_id: Option<&str>,
        memory_type: Option<&str>,
        skip: usize,
        limit: usize,
    ) -> Result<MemoryPage, MemoryStoreError> {
        let key = Self::key(tenant, database)?;
        let matching: Vec<MemoryItem> = self
            .load(&key)?
            .into_iter()
            .filter(|m| agent_id.map_or(true, |a| m.agent_id == a))
            .filter(|m| memory_type.map_or(true, |t| m.memory_type == t))
            .collect();

        Ok(MemoryPage {
            count: matching.len(),
            memories: matching.into_iter().skip(skip).take(limit).collect(),
        })
    }
}
