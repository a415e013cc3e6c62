//! Vector persistence: key → embedding with cosine top-k and metadata filters.
//!
//! Two backends share one trait: an in-memory matrix scan and a persistent
//! HNSW index. Selection happens once at startup from configuration; a
//! persistent backend that fails to initialise falls back to memory with a
//! prominent warning.

mod hnsw;
mod memory;

pub use hnsw::HnswVectorStore;
pub use memory::MemoryVectorStore;

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{bail, Result};
use serde_json::Value;

use crate::config::Config;

/// Scalar-only metadata attached to each vector.
pub type Metadata = HashMap<String, Value>;

/// One similarity hit: id, score in [0, 1] (1 = identical), metadata.
#[derive(Debug, Clone)]
pub struct VectorHit {
    pub id: String,
    pub score: f32,
    pub metadata: Metadata,
}

/// Key→vector persistence with cosine similarity search.
pub trait VectorStore: Send + Sync {
    /// Insert vectors. `ids`, `vectors`, and `metadata` must have equal
    /// length; every vector must match the configured dimension.
    fn add(&self, ids: &[String], vectors: &[Vec<f32>], metadata: &[Metadata]) -> Result<()>;

    /// Top-k most similar entries, optionally filtered by metadata equality.
    fn search(&self, vector: &[f32], top_k: usize, filter: Option<&Metadata>) -> Result<Vec<VectorHit>>;

    /// Remove entries by id. Unknown ids are ignored.
    fn remove(&self, ids: &[String]) -> Result<()>;

    fn count(&self) -> usize;

    fn contains(&self, id: &str) -> bool;

    /// Persist any buffered state. A no-op for the in-memory backend.
    fn flush(&self) -> Result<()>;
}

/// Keep only scalar metadata values; nulls and structured values are omitted.
pub fn sanitize_metadata(metadata: &Metadata) -> Metadata {
    metadata
        .iter()
        .filter(|(_, v)| matches!(v, Value::String(_) | Value::Number(_) | Value::Bool(_)))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

pub(crate) fn check_batch_shape(
    ids: &[String],
    vectors: &[Vec<f32>],
    metadata: &[Metadata],
    dimension: usize,
) -> Result<()> {
    if ids.len() != vectors.len() || ids.len() != metadata.len() {
        bail!(
            "ids ({}), vectors ({}) and metadata ({}) length mismatch",
            ids.len(),
            vectors.len(),
            metadata.len()
        );
    }
    for vector in vectors {
        if vector.len() != dimension {
            bail!("Vector dimension {} != {}", vector.len(), dimension);
        }
    }
    Ok(())
}

pub(crate) fn l2_normalize(vector: &[f32]) -> Vec<f32> {
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        vector.iter().map(|v| v / norm).collect()
    } else {
        vector.to_vec()
    }
}

pub(crate) fn matches_filter(metadata: &Metadata, filter: &Metadata) -> bool {
    filter.iter().all(|(k, v)| metadata.get(k) == Some(v))
}

/// Build the configured backend. Lifecycle is configure-once at startup,
/// lazy file loading inside the backend, `flush` on shutdown.
pub fn open_vector_store(config: &Config) -> Arc<dyn VectorStore> {
    let dimension = config.embedding_dimension;
    match config.vector_store_backend.trim().to_ascii_lowercase().as_str() {
        "hnsw" => match HnswVectorStore::open(&config.vector_store_dir, dimension) {
            Ok(store) => {
                tracing::info!(
                    dir = %config.vector_store_dir.display(),
                    dimension,
                    "Vector store initialized (hnsw)"
                );
                Arc::new(store)
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to initialize hnsw vector store");
                tracing::warn!(
                    "Falling back to the in-memory vector store; vectors will not survive restarts"
                );
                Arc::new(MemoryVectorStore::new(dimension))
            }
        },
        _ => {
            tracing::info!(dimension, "Vector store initialized (memory)");
            Arc::new(MemoryVectorStore::new(dimension))
        }
    }
}
