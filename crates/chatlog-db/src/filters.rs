//! Persisted filter rules.

use std::sync::Arc;

use tracing::{info, warn};

use chatlog_core::{FilterField, FilterRuleSet, Result};

use crate::backend::StorageBackend;

/// Owner of the user's filter rules and their durable copy.
///
/// Every mutation writes the whole rule set back; a failed write is reported
/// but the in-memory rules keep applying.
pub struct FilterRuleStore {
    backend: Arc<dyn StorageBackend>,
    key: String,
    rules: FilterRuleSet,
}

impl FilterRuleStore {
    /// Load the rules stored under `key`. Unreadable or malformed documents
    /// yield an empty rule set.
    pub async fn load(backend: Arc<dyn StorageBackend>, key: impl Into<String>) -> Self {
        let key = key.into();
        let rules = match backend.get(&key).await {
            Ok(Some(raw)) => match serde_json::from_str::<FilterRuleSet>(&raw) {
                Ok(rules) => rules,
                Err(e) => {
                    warn!(storage_key = %key, error = %e, "Malformed filter rules, starting empty");
                    FilterRuleSet::new()
                }
            },
            Ok(None) => FilterRuleSet::new(),
            Err(e) => {
                warn!(storage_key = %key, error = %e, "Failed to read filter rules, starting empty");
                FilterRuleSet::new()
            }
        };
        Self {
            backend,
            key,
            rules,
        }
    }

    pub fn rules(&self) -> &FilterRuleSet {
        &self.rules
    }

    pub fn storage_key(&self) -> &str {
        &self.key
    }

    /// Add a pattern and persist. Returns false (without writing) when the
    /// pattern is blank or already present.
    pub async fn add(&mut self, field: FilterField, pattern: &str) -> Result<bool> {
        if !self.rules.add(field, pattern) {
            return Ok(false);
        }
        info!(field = %field, pattern = pattern.trim(), "Added filter rule");
        self.persist().await?;
        Ok(true)
    }

    /// Remove a pattern and persist. Returns false when it was not present.
    pub async fn remove(&mut self, field: FilterField, pattern: &str) -> Result<bool> {
        if !self.rules.remove(field, pattern) {
            return Ok(false);
        }
        info!(field = %field, pattern, "Removed filter rule");
        self.persist().await?;
        Ok(true)
    }

    /// Union `other` into the stored rules, returning how many were new.
    pub async fn merge(&mut self, other: &FilterRuleSet) -> Result<usize> {
        let added = self.rules.merge(other);
        if added > 0 {
            self.persist().await?;
        }
        Ok(added)
    }

    async fn persist(&self) -> Result<()> {
        let json = serde_json::to_string(&self.rules)?;
        self.backend.set(&self.key, &json).await
    }
}
