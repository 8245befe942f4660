//! In-memory vector store with cosine similarity

use async_trait::async_trait;
use ivs_common::RetrievedDocument;
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::sync::Arc;

use super::{RetrievalError, RetrievalStore, SeedRecord};
use crate::model::Embedder;

struct StoredEntry {
    content: String,
    metadata: Map<String, Value>,
    embedding: Vec<f32>,
}

/// Seed records embedded once at construction; queries embed only the query
pub struct InMemoryStore {
    embedder: Arc<dyn Embedder>,
    entries: Vec<StoredEntry>,
}

impl InMemoryStore {
    /// Embed every record and index it
    pub async fn build(
        embedder: Arc<dyn Embedder>,
        records: Vec<SeedRecord>,
    ) -> Result<Self, RetrievalError> {
        let texts: Vec<String> = records.iter().map(|r| r.content.clone()).collect();
        let embeddings = if texts.is_empty() {
            Vec::new()
        } else {
            embedder.embed(&texts).await?
        };

        let dimension = embeddings.first().map(Vec::len).unwrap_or(0);
        if let Some(bad) = embeddings.iter().find(|e| e.len() != dimension) {
            return Err(RetrievalError::DimensionMismatch {
                expected: dimension,
                found: bad.len(),
            });
        }

        let entries = records
            .into_iter()
            .zip(embeddings)
            .map(|(record, embedding)| StoredEntry {
                content: record.content,
                metadata: record.metadata,
                embedding,
            })
            .collect::<Vec<_>>();

        tracing::info!(count = entries.len(), dimension, "Retrieval store indexed");
        Ok(Self { embedder, entries })
    }

    fn dimension(&self) -> Option<usize> {
        self.entries.first().map(|e| e.embedding.len())
    }
}

#[async_trait]
impl RetrievalStore for InMemoryStore {
    async fn query(&self, query: &str, k: usize) -> Result<Vec<RetrievedDocument>, RetrievalError> {
        if k == 0 || self.entries.is_empty() {
            return Ok(Vec::new());
        }

        let query_embedding = self
            .embedder
            .embed(&[query.to_string()])
            .await?
            .into_iter()
            .next()
            .unwrap_or_default();

        if let Some(expected) = self.dimension() {
            if query_embedding.len() != expected {
                return Err(RetrievalError::DimensionMismatch {
                    expected,
                    found: query_embedding.len(),
                });
            }
        }

        let mut scored: Vec<(f32, &StoredEntry)> = self
            .entries
            .iter()
            .map(|entry| (cosine_similarity(&query_embedding, &entry.embedding), entry))
            .collect();

        // sort_by is stable: equal scores keep insertion order
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(Ordering::Equal));

        Ok(scored
            .into_iter()
            .take(k)
            .map(|(score, entry)| RetrievedDocument {
                content: entry.content.clone(),
                metadata: entry.metadata.clone(),
                score,
            })
            .collect())
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Cosine similarity; 0.0 when either vector has zero norm
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}
