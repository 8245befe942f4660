//! Reference-record retrieval
//!
//! The valuation pipeline depends on [`RetrievalStore`] only. The store is
//! built once at startup and shared read-only across requests.

pub mod memory;
pub mod seed;

pub use memory::InMemoryStore;
pub use seed::{load_seed, parse_seed, SeedRecord};

use async_trait::async_trait;
use ivs_common::RetrievedDocument;
use thiserror::Error;

use crate::model::ModelError;

#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("Embedding failed: {0}")]
    Embedding(#[from] ModelError),

    #[error("Seed file error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Seed line {line}: {message}")]
    Seed { line: usize, message: String },

    #[error("Embedding dimension {found} does not match store dimension {expected}")]
    DimensionMismatch { expected: usize, found: usize },
}

#[async_trait]
pub trait RetrievalStore: Send + Sync {
    /// Up to `k` documents ordered by descending similarity to `query`.
    /// Equal scores keep the store's native order. No match is `Ok(vec![])`.
    async fn query(&self, query: &str, k: usize) -> Result<Vec<RetrievedDocument>, RetrievalError>;

    /// Number of indexed records
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
