//! Key encoding and decoding for storage layer.
//!
//! Key format: `{tenant}:{database}:{name}`
//! - tenant and database: non-empty, no `:`
//! - name: collection name, `{collection}:{docId}` for histories, or a fixed
//!   name such as `graph` for per-database singletons
//!
//! Sharing the `{tenant}:{database}:` prefix lets a database's resources of
//! one kind be listed with a single prefix scan.

use crate::error::StorageError;

/// Key for a stored resource blob
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceKey {
    pub tenant: String,
    pub database: String,
    pub name: String,
}

impl ResourceKey {
    /// Build a key, validating the tenant and database segments.
    pub fn new(tenant: &str, database: &str, name: &str) -> Result<Self, StorageError> {
        validate_segment("tenant", tenant)?;
        validate_segment("database", database)?;
        if name.is_empty() {
            return Err(StorageError::InvalidKey("resource name must not be empty".to_string()));
        }
        Ok(Self {
            tenant: tenant.to_string(),
            database: database.to_string(),
            name: name.to_string(),
        })
    }

    /// Key for a sibling resource in the same database.
    pub fn sibling(&self, name: &str) -> Result<Self, StorageError> {
        Self::new(&self.tenant, &self.database, name)
    }

    /// Encode key to bytes for storage
    pub fn to_bytes(&self) -> Vec<u8> {
        format!("{}:{}:{}", self.tenant, self.database, self.name).into_bytes()
    }

    /// Decode key from bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, StorageError> {
        let s = std::str::from_utf8(bytes)
            .map_err(|e| StorageError::InvalidKey(format!("Invalid UTF-8: {}", e)))?;
        let mut parts = s.splitn(3, ':');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(tenant), Some(database), Some(name)) => Self::new(tenant, database, name),
            _ => Err(StorageError::InvalidKey(s.to_string())),
        }
    }

    /// Prefix covering every resource of one database.
    pub fn database_prefix(tenant: &str, database: &str) -> Result<Vec<u8>, StorageError> {
        validate_segment("tenant", tenant)?;
        validate_segment("database", database)?;
        Ok(format!("{}:{}:", tenant, database).into_bytes())
    }
}

impl std::fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}:{}", self.tenant, self.database, self.name)
    }
}

fn validate_segment(what: &str, value: &str) -> Result<(), StorageError> {
    if value.is_empty() {
        return Err(StorageError::InvalidKey(format!("{} must not be empty", what)));
    }
    if value.contains(':') {
        return Err(StorageError::InvalidKey(format!(
            "{} must not contain ':': {}",
            what, value
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_roundtrip_keeps_colons_in_name() {
        let key = ResourceKey::new("acme", "main", "people:doc_123").unwrap();
        let decoded = ResourceKey::from_bytes(&key.to_bytes()).unwrap();
        assert_eq!(decoded, key);
        assert_eq!(decoded.name, "people:doc_123");
    }

    #[test]
    fn test_key_rejects_bad_segments() {
        assert!(ResourceKey::new("", "main", "people").is_err());
        assert!(ResourceKey::new("acme", "a:b", "people").is_err());
        assert!(ResourceKey::new("acme", "main", "").is_err());
    }

    #[test]
    fn test_database_prefix() {
        let prefix = ResourceKey::database_prefix("acme", "main").unwrap();
        let key = ResourceKey::new("acme", "main", "people").unwrap();
        assert!(key.to_bytes().starts_with(&prefix));
        assert_eq!(key.to_string(), "acme:main:people");
    }
}
