//! Repository trait definition

use async_trait::async_trait;

use crate::Result;

/// Keyed storage for one kind of record
///
/// Implementations provide different storage strategies: in-memory for tests
/// and single-process use, a durable backend where records must outlive the
/// process. Coordination logic only sees this trait.
#[async_trait]
pub trait Repository<T>: Send + Sync
where
    T: Clone + Send + Sync + 'static,
{
    /// Fetch a record, `None` if absent
    async fn get(&self, id: &str) -> Result<Option<T>>;

    /// Insert or replace a record
    async fn put(&self, id: &str, value: T) -> Result<()>;

    /// Remove a record, returning it if it existed
    async fn delete(&self, id: &str) -> Result<Option<T>>;

    /// All records, ordered by id
    async fn list(&self) -> Result<Vec<T>>;

    /// Number of stored records
    async fn len(&self) -> Result<usize>;

    async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }

    async fn contains(&self, id: &str) -> Result<bool> {
        Ok(self.get(id).await?.is_some())
    }

    /// Get the name of this repository (for logging)
    fn name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    // Single-slot repository exercising the provided methods
    struct OneSlot;

    #[async_trait]
    impl Repository<u32> for OneSlot {
        async fn get(&self, id: &str) -> Result<Option<u32>> {
            Ok((id == "answer").then_some(42))
        }

        async fn put(&self, _id: &str, _value: u32) -> Result<()> {
            Ok(())
        }

        async fn delete(&self, _id: &str) -> Result<Option<u32>> {
            Ok(None)
        }

        async fn list(&self) -> Result<Vec<u32>> {
            Ok(vec![42])
        }

        async fn len(&self) -> Result<usize> {
            Ok(1)
        }

        fn name(&self) -> &str {
            "one-slot"
        }
    }

    #[tokio::test]
    async fn test_provided_methods() {
        let repo = OneSlot;
        assert!(repo.contains("answer").await.unwrap());
        assert!(!repo.contains("question").await.unwrap());
        assert!(!repo.is_empty().await.unwrap());
        assert_eq!(repo.name(), "one-slot");
    }
}
