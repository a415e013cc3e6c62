//! Persistent vector store backed by a usearch HNSW index in cosine space.
//!
//! usearch addresses vectors by u64 keys, so a JSON sidecar maps keys to the
//! string vector ids and their metadata. The index file and sidecar are
//! rewritten after every mutating batch; `flush` forces a final write.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use usearch::ffi::{IndexOptions, MetricKind, ScalarKind};

use super::{check_batch_shape, matches_filter, sanitize_metadata, Metadata, VectorHit, VectorStore};

const INDEX_FILE: &str = "index.usearch";
const SIDECAR_FILE: &str = "metadata.json";
const INITIAL_CAPACITY: usize = 16_384;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SidecarEntry {
    key: u64,
    id: String,
    metadata: Metadata,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Sidecar {
    next_key: u64,
    entries: Vec<SidecarEntry>,
}

struct Inner {
    index: usearch::Index,
    by_key: HashMap<u64, (String, Metadata)>,
    key_of: HashMap<String, u64>,
    next_key: u64,
}

pub struct HnswVectorStore {
    dimension: usize,
    index_path: PathBuf,
    sidecar_path: PathBuf,
    inner: RwLock<Inner>,
}

impl HnswVectorStore {
    /// Open or create the index under `dir`.
    pub fn open(dir: &Path, dimension: usize) -> Result<Self> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create vector store dir {}", dir.display()))?;
        let index_path = dir.join(INDEX_FILE);
        let sidecar_path = dir.join(SIDECAR_FILE);

        let options = IndexOptions {
            dimensions: dimension,
            metric: MetricKind::Cos,
            quantization: ScalarKind::F32,
            connectivity: 16,
            expansion_add: 128,
            expansion_search: 64,
            multi: false,
        };
        let index = usearch::Index::new(&options)
            .map_err(|e| anyhow!("Failed to create hnsw index: {e}"))?;

        let mut by_key = HashMap::new();
        let mut key_of = HashMap::new();
        let mut next_key = 0u64;

        if index_path.exists() && sidecar_path.exists() {
            index
                .load(index_path.to_string_lossy().as_ref())
                .map_err(|e| anyhow!("Failed to load hnsw index: {e}"))?;
            let sidecar: Sidecar = serde_json::from_str(
                &std::fs::read_to_string(&sidecar_path).context("Failed to read vector sidecar")?,
            )
            .context("Failed to parse vector sidecar")?;
            next_key = sidecar.next_key;
            for entry in sidecar.entries {
                key_of.insert(entry.id.clone(), entry.key);
                by_key.insert(entry.key, (entry.id, entry.metadata));
            }
            tracing::info!(vectors = by_key.len(), "Loaded persisted vector index");
        } else {
            index
                .reserve(INITIAL_CAPACITY)
                .map_err(|e| anyhow!("Failed to reserve hnsw capacity: {e}"))?;
        }

        Ok(Self {
            dimension,
            index_path,
            sidecar_path,
            inner: RwLock::new(Inner {
                index,
                by_key,
                key_of,
                next_key,
            }),
        })
    }

    fn persist(&self, inner: &Inner) -> Result<()> {
        inner
            .index
            .save(self.index_path.to_string_lossy().as_ref())
            .map_err(|e| anyhow!("Failed to save hnsw index: {e}"))?;
        let sidecar = Sidecar {
            next_key: inner.next_key,
            entries: inner
                .by_key
                .iter()
                .map(|(key, (id, metadata))| SidecarEntry {
                    key: *key,
                    id: id.clone(),
                    metadata: metadata.clone(),
                })
                .collect(),
        };
        let tmp = self.sidecar_path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_string(&sidecar)?)?;
        std::fs::rename(&tmp, &self.sidecar_path)?;
        Ok(())
    }
}

impl VectorStore for HnswVectorStore {
    fn add(&self, ids: &[String], vectors: &[Vec<f32>], metadata: &[Metadata]) -> Result<()> {
        if ids.is_empty() {
            tracing::warn!("Vector add called with empty batch");
            return Ok(());
        }
        check_batch_shape(ids, vectors, metadata, self.dimension)?;

        let mut inner = self.inner.write().expect("vector store lock poisoned");
        let needed = inner.index.size() + ids.len();
        if needed >= inner.index.capacity() {
            let target = (inner.index.capacity() * 2).max(needed + 1024);
            inner
                .index
                .reserve(target)
                .map_err(|e| anyhow!("Failed to grow hnsw capacity: {e}"))?;
        }

        for ((id, vector), meta) in ids.iter().zip(vectors).zip(metadata) {
            let key = inner.next_key;
            inner.next_key += 1;
            inner
                .index
                .add(key, vector)
                .map_err(|e| anyhow!("Failed to add vector {id}: {e}"))?;
            inner.key_of.insert(id.clone(), key);
            inner.by_key.insert(key, (id.clone(), sanitize_metadata(meta)));
        }
        self.persist(&inner)?;
        tracing::debug!(added = ids.len(), total = inner.by_key.len(), "Vectors added");
        Ok(())
    }

    fn search(&self, vector: &[f32], top_k: usize, filter: Option<&Metadata>) -> Result<Vec<VectorHit>> {
        let inner = self.inner.read().expect("vector store lock poisoned");
        if inner.index.size() == 0 {
            return Ok(Vec::new());
        }
        let matches = inner
            .index
            .search(vector, top_k)
            .map_err(|e| anyhow!("Vector search failed: {e}"))?;

        let mut hits = Vec::with_capacity(matches.keys.len());
        for (key, distance) in matches.keys.iter().zip(matches.distances.iter()) {
            let Some((id, metadata)) = inner.by_key.get(key) else {
                continue;
            };
            if let Some(f) = filter {
                if !matches_filter(metadata, f) {
                    continue;
                }
            }
            hits.push(VectorHit {
                id: id.clone(),
                score: (1.0 - distance).clamp(0.0, 1.0),
                metadata: metadata.clone(),
            });
        }
        Ok(hits)
    }

    fn remove(&self, ids: &[String]) -> Result<()> {
        let mut inner = self.inner.write().expect("vector store lock poisoned");
        let mut removed = 0usize;
        for id in ids {
            if let Some(key) = inner.key_of.remove(id) {
                inner
                    .index
                    .remove(key)
                    .map_err(|e| anyhow!("Failed to remove vector {id}: {e}"))?;
                inner.by_key.remove(&key);
                removed += 1;
            }
        }
        if removed > 0 {
            self.persist(&inner)?;
        }
        Ok(())
    }

    fn count(&self) -> usize {
        self.inner.read().expect("vector store lock poisoned").by_key.len()
    }

    fn contains(&self, id: &str) -> bool {
        self.inner
            .read()
            .expect("vector store lock poisoned")
            .key_of
            .contains_key(id)
    }

    fn flush(&self) -> Result<()> {
        let inner = self.inner.read().expect("vector store lock poisoned");
        self.persist(&inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn meta(kind: &str) -> Metadata {
        let mut m = Metadata::new();
        m.insert("type".into(), json!(kind));
        m
    }

    #[test]
    fn add_search_remove_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = HnswVectorStore::open(dir.path(), 4).unwrap();
        store
            .add(
                &["a".into(), "b".into()],
                &[vec![1.0, 0.0, 0.0, 0.0], vec![0.0, 1.0, 0.0, 0.0]],
                &[meta("text"), meta("image")],
            )
            .unwrap();

        let hits = store.search(&[1.0, 0.0, 0.0, 0.0], 2, None).unwrap();
        assert_eq!(hits[0].id, "a");
        assert!(hits[0].score > 0.99);

        let mut filter = Metadata::new();
        filter.insert("type".into(), json!("image"));
        let filtered = store.search(&[1.0, 0.0, 0.0, 0.0], 2, Some(&filter)).unwrap();
        assert!(filtered.iter().all(|h| h.id == "b"));

        store.remove(&["a".into()]).unwrap();
        assert!(!store.contains("a"));
        assert_eq!(store.count(), 1);
    }

    #[test]
    fn persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = HnswVectorStore::open(dir.path(), 4).unwrap();
            store
                .add(
                    &["chunk_1_1_0".into()],
                    &[vec![0.5, 0.5, 0.0, 0.0]],
                    &[meta("text")],
                )
                .unwrap();
            store.flush().unwrap();
        }
        let reopened = HnswVectorStore::open(dir.path(), 4).unwrap();
        assert_eq!(reopened.count(), 1);
        assert!(reopened.contains("chunk_1_1_0"));
        let hits = reopened.search(&[0.5, 0.5, 0.0, 0.0], 1, None).unwrap();
        assert_eq!(hits[0].id, "chunk_1_1_0");
    }
}
