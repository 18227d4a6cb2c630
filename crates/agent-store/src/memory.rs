//! In-memory repository using DashMap

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;

use crate::{error::StoreError, repository::Repository, Result};

/// In-memory repository backed by a concurrent map
///
/// Records are lost when the process exits.
///
/// # Example
///
/// ```
/// use agent_store::{InMemoryRepository, Repository};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let repo = InMemoryRepository::new("items");
///     repo.put("a", 1u32).await?;
///     assert_eq!(repo.get("a").await?, Some(1));
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct InMemoryRepository<T> {
    name: String,
    records: Arc<DashMap<String, T>>,
    /// Maximum number of records to store
    max_capacity: Option<usize>,
}

impl<T> InMemoryRepository<T> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            records: Arc::new(DashMap::new()),
            max_capacity: None,
        }
    }

    /// Create a repository that refuses new records beyond `max_capacity`
    pub fn with_capacity(name: impl Into<String>, max_capacity: usize) -> Self {
        Self {
            max_capacity: Some(max_capacity),
            ..Self::new(name)
        }
    }

    fn is_at_capacity(&self) -> bool {
        self.max_capacity
            .map(|max| self.records.len() >= max)
            .unwrap_or(false)
    }

    /// Remove every record, returning how many there were
    pub fn clear(&self) -> usize {
        let count = self.records.len();
        self.records.clear();
        tracing::debug!(repository = %self.name, count, "Cleared repository");
        count
    }
}

#[async_trait]
impl<T> Repository<T> for InMemoryRepository<T>
where
    T: Clone + Send + Sync + 'static,
{
    async fn get(&self, id: &str) -> Result<Option<T>> {
        Ok(self.records.get(id).map(|entry| entry.value().clone()))
    }

    async fn put(&self, id: &str, value: T) -> Result<()> {
        // Replacing an existing record never counts against capacity
        if !self.records.contains_key(id) && self.is_at_capacity() {
            return Err(StoreError::CapacityExceeded {
                repository: self.name.clone(),
                capacity: self.max_capacity.unwrap_or_default(),
            });
        }
        self.records.insert(id.to_string(), value);
        tracing::trace!(repository = %self.name, id, "Stored record");
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<Option<T>> {
        Ok(self.records.remove(id).map(|(_, value)| value))
    }

    async fn list(&self) -> Result<Vec<T>> {
        let mut entries: Vec<(String, T)> = self
            .records
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(entries.into_iter().map(|(_, value)| value).collect())
    }

    async fn len(&self) -> Result<usize> {
        Ok(self.records.len())
    }

    fn name(&self) -> &str {
        &self.name
    }
}
