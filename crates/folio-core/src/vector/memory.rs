//! In-memory vector store: matrix scan with dot product over L2-normalised
//! vectors. Ephemeral; suitable for development and tests.

use std::sync::RwLock;

use anyhow::Result;

use super::{check_batch_shape, l2_normalize, matches_filter, sanitize_metadata, Metadata, VectorHit, VectorStore};

#[derive(Default)]
struct Inner {
    ids: Vec<String>,
    vectors: Vec<Vec<f32>>,
    metadata: Vec<Metadata>,
}

pub struct MemoryVectorStore {
    dimension: usize,
    inner: RwLock<Inner>,
}

impl MemoryVectorStore {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            inner: RwLock::new(Inner::default()),
        }
    }
}

impl VectorStore for MemoryVectorStore {
    fn add(&self, ids: &[String], vectors: &[Vec<f32>], metadata: &[Metadata]) -> Result<()> {
        if ids.is_empty() {
            tracing::warn!("Vector add called with empty batch");
            return Ok(());
        }
        check_batch_shape(ids, vectors, metadata, self.dimension)?;

        let mut inner = self.inner.write().expect("vector store lock poisoned");
        for ((id, vector), meta) in ids.iter().zip(vectors).zip(metadata) {
            inner.ids.push(id.clone());
            inner.vectors.push(l2_normalize(vector));
            inner.metadata.push(sanitize_metadata(meta));
        }
        tracing::debug!(added = ids.len(), total = inner.ids.len(), "Vectors added");
        Ok(())
    }

    fn search(&self, vector: &[f32], top_k: usize, filter: Option<&Metadata>) -> Result<Vec<VectorHit>> {
        let inner = self.inner.read().expect("vector store lock poisoned");
        if inner.ids.is_empty() {
            return Ok(Vec::new());
        }
        let query = l2_normalize(vector);

        let mut scored: Vec<(usize, f32)> = inner
            .vectors
            .iter()
            .enumerate()
            .map(|(i, v)| {
                let dot: f32 = v.iter().zip(&query).map(|(a, b)| a * b).sum();
                (i, dot.clamp(0.0, 1.0))
            })
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(top_k);

        let hits = scored
            .into_iter()
            .filter(|(i, _)| match filter {
                Some(f) => matches_filter(&inner.metadata[*i], f),
                None => true,
            })
            .map(|(i, score)| VectorHit {
                id: inner.ids[i].clone(),
                score,
                metadata: inner.metadata[i].clone(),
            })
            .collect();
        Ok(hits)
    }

    fn remove(&self, ids: &[String]) -> Result<()> {
        let mut inner = self.inner.write().expect("vector store lock poisoned");
        let keep: Vec<bool> = inner.ids.iter().map(|id| !ids.contains(id)).collect();
        let mut index = 0;
        inner.ids.retain(|_| { let k = keep[index]; index += 1; k });
        index = 0;
        inner.vectors.retain(|_| { let k = keep[index]; index += 1; k });
        index = 0;
        inner.metadata.retain(|_| { let k = keep[index]; index += 1; k });
        Ok(())
    }

    fn count(&self) -> usize {
        self.inner.read().expect("vector store lock poisoned").ids.len()
    }

    fn contains(&self, id: &str) -> bool {
        self.inner
            .read()
            .expect("vector store lock poisoned")
            .ids
            .iter()
            .any(|existing| existing == id)
    }

    fn flush(&self) -> Result<()> {
        Ok(())
    }
}
