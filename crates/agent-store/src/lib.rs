//! Record Storage
//!
//! A small repository interface for the records coordination components
//! keep (tracked items, pattern library, workflows), with an in-memory
//! implementation. A durable backend only has to implement [`Repository`].

pub mod error;
pub mod memory;
pub mod repository;

// Re-exports
pub use error::{Result, StoreError};
pub use memory::InMemoryRepository;
pub use repository::Repository;
