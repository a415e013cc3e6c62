//! Search coordinator: keyword-only, semantic-only, or hybrid with RRF.

pub mod rrf;

use std::collections::HashMap;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::content::{ContentStore, ResolvedRecord, ResultType};
use crate::services::Embedder;
use crate::vector::{Metadata, VectorStore};

use rrf::{rrf_merge, DEFAULT_RRF_K};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    #[default]
    Hybrid,
    Keyword,
    Semantic,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default)]
    pub mode: SearchMode,
}

fn default_top_k() -> usize {
    20
}

impl SearchRequest {
    pub fn new(query: impl Into<String>, top_k: usize, mode: SearchMode) -> Self {
        Self {
            query: query.into(),
            top_k,
            mode,
        }
    }
}

/// One search result, from either modality.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResultItem {
    pub document_id: i64,
    pub document_title: String,
    pub page_id: i64,
    pub page_num: i64,
    pub result_type: ResultType,
    pub chunk_id: Option<i64>,
    pub region_id: Option<i64>,
    pub snippet: String,
    pub score: f64,
    pub vector_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResponse {
    pub query: String,
    pub results: Vec<SearchResultItem>,
}

fn round4(score: f64) -> f64 {
    (score * 10_000.0).round() / 10_000.0
}

fn item_from_record(record: &ResolvedRecord, score: f64, vector_id: Option<String>) -> SearchResultItem {
    SearchResultItem {
        document_id: record.document_id,
        document_title: record.document_title.clone(),
        page_id: record.page_id,
        page_num: record.page_num,
        result_type: record.result_type,
        chunk_id: record.chunk_id,
        region_id: record.region_id,
        snippet: record.snippet.clone(),
        score: round4(score),
        vector_id,
    }
}

/// Embed the query once and query the vector store. Failures (including an
/// unconfigured embedder) degrade to an empty list so keyword search still
/// serves.
async fn vector_search(
    vectors: &dyn VectorStore,
    embedder: &Embedder,
    query: &str,
    top_k: usize,
) -> Vec<(String, f32, Metadata)> {
    let query_vector = match embedder.embed_query(query).await {
        Ok(vector) => vector,
        Err(e) => {
            tracing::warn!(error = %e, "Query embedding failed, skipping semantic results");
            return Vec::new();
        }
    };
    match vectors.search(&query_vector, top_k, None) {
        Ok(hits) => hits
            .into_iter()
            .map(|hit| (hit.id, hit.score, hit.metadata))
            .collect(),
        Err(e) => {
            tracing::warn!(error = %e, "Vector search failed");
            Vec::new()
        }
    }
}

/// Run a search in the requested mode. Empty queries yield an empty
/// response, never an error.
pub async fn search(
    store: &mut ContentStore,
    vectors: &dyn VectorStore,
    embedder: &Embedder,
    request: &SearchRequest,
) -> Result<SearchResponse> {
    let query = request.query.trim().to_string();
    let top_k = request.top_k;
    if query.is_empty() {
        tracing::warn!("Empty search query");
        return Ok(SearchResponse {
            query: request.query.clone(),
            results: Vec::new(),
        });
    }

    let results = match request.mode {
        SearchMode::Keyword => {
            let hits = store.keyword_search(&query, top_k)?;
            tracing::info!(results = hits.len(), query = %query, "Keyword search");
            hits.into_iter()
                .map(|hit| item_from_record(&hit.record, hit.score, hit.vector_id))
                .collect()
        }
        SearchMode::Semantic => {
            let hits = vector_search(vectors, embedder, &query, top_k).await;
            let ids: Vec<String> = hits.iter().map(|(id, _, _)| id.clone()).collect();
            let resolved = store.resolve_vector_ids(&ids)?;
            let items: Vec<SearchResultItem> = hits
                .into_iter()
                .filter_map(|(id, score, _)| {
                    resolved
                        .get(&id)
                        .map(|record| item_from_record(record, score as f64, Some(id)))
                })
                .collect();
            tracing::info!(results = items.len(), query = %query, "Semantic search");
            items
        }
        SearchMode::Hybrid => {
            let keyword_hits = store.keyword_search(&query, top_k)?;
            let vector_hits = vector_search(vectors, embedder, &query, top_k).await;

            let keyword_list: Vec<(String, f32)> = keyword_hits
                .iter()
                .filter_map(|hit| hit.vector_id.clone().map(|id| (id, hit.score as f32)))
                .collect();
            let vector_list: Vec<(String, f32)> = vector_hits
                .iter()
                .map(|(id, score, _)| (id.clone(), *score))
                .collect();
            if keyword_list.is_empty() && vector_list.is_empty() {
                tracing::debug!("No keyword or vector results");
                return Ok(SearchResponse {
                    query: request.query.clone(),
                    results: Vec::new(),
                });
            }

            let mut merged = rrf_merge(&[keyword_list, vector_list], DEFAULT_RRF_K);
            merged.truncate(top_k);

            // Keyword hits arrive already joined; resolve the rest in one
            // batched query.
            let mut known: HashMap<String, ResolvedRecord> = keyword_hits
                .into_iter()
                .filter_map(|hit| hit.vector_id.map(|id| (id, hit.record)))
                .collect();
            let missing: Vec<String> = merged
                .iter()
                .filter(|(id, _)| !known.contains_key(id))
                .map(|(id, _)| id.clone())
                .collect();
            known.extend(store.resolve_vector_ids(&missing)?);

            let items: Vec<SearchResultItem> = merged
                .into_iter()
                .filter_map(|(id, score)| {
                    known
                        .get(&id)
                        .map(|record| item_from_record(record, score, Some(id)))
                })
                .collect();
            tracing::info!(results = items.len(), query = %query, "Hybrid search");
            items
        }
    };

    Ok(SearchResponse {
        query: request.query.clone(),
        results,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::RegionBox;
    use crate::vector::MemoryVectorStore;
    use serde_json::json;

    const DIM: usize = 8;

    struct Fixture {
        store: ContentStore,
        vectors: MemoryVectorStore,
        embedder: Embedder,
    }

    /// One document, page 1 has a "hello world" chunk, page 2 a "diagram"
    /// region, both with vectors derived from their content.
    async fn fixture() -> Fixture {
        let store = ContentStore::open_in_memory().unwrap();
        let vectors = MemoryVectorStore::new(DIM);
        let embedder = Embedder::mock(DIM);

        let doc_id = store.insert_document("h", "guide.pdf", 2).unwrap();
        let page1 = store.insert_page(doc_id, 1).unwrap();
        let page2 = store.insert_page(doc_id, 2).unwrap();

        let chunk_vid = format!("chunk_{doc_id}_{page1}_0");
        store
            .insert_chunk(page1, doc_id, 0, "hello world from the guide", Some(&chunk_vid))
            .unwrap();
        let chunk_vec = embedder
            .embed_query("hello world from the guide")
            .await
            .unwrap();
        let mut chunk_meta = Metadata::new();
        chunk_meta.insert("type".into(), json!("text"));
        vectors
            .add(&[chunk_vid], &[chunk_vec], &[chunk_meta])
            .unwrap();

        let region_id = store
            .insert_region(
                page2,
                doc_id,
                "wiring diagram",
                RegionBox { y0: 0.0, x0: 0.0, y1: 10.0, x1: 10.0 },
            )
            .unwrap();
        let region_vid = format!("region_{doc_id}_{region_id}");
        store.set_region_crop(region_id, "/tmp/crop.png").unwrap();
        store.set_region_vector(region_id, &region_vid).unwrap();
        let mut region_meta = Metadata::new();
        region_meta.insert("type".into(), json!("image"));
        vectors
            .add(&[region_vid], &[vec![0.9; DIM]], &[region_meta])
            .unwrap();

        Fixture { store, vectors, embedder }
    }

    #[tokio::test]
    async fn keyword_mode_returns_text_hit_with_fields() {
        let mut fx = fixture().await;
        let request = SearchRequest::new("hello", 5, SearchMode::Keyword);
        let response = search(&mut fx.store, &fx.vectors, &fx.embedder, &request)
            .await
            .unwrap();
        assert_eq!(response.results.len(), 1);
        let item = &response.results[0];
        assert_eq!(item.result_type, ResultType::Text);
        assert_eq!(item.page_num, 1);
        assert!(item.snippet.contains("hello world"));
        assert_eq!(item.document_title, "guide.pdf");
        assert!(item.chunk_id.is_some());
        assert!(item.region_id.is_none());
    }

    #[tokio::test]
    async fn keyword_mode_finds_region_labels() {
        let mut fx = fixture().await;
        let request = SearchRequest::new("diagram", 5, SearchMode::Keyword);
        let response = search(&mut fx.store, &fx.vectors, &fx.embedder, &request)
            .await
            .unwrap();
        assert_eq!(response.results.len(), 1);
        assert_eq!(response.results[0].result_type, ResultType::Image);
        assert_eq!(response.results[0].snippet, "wiring diagram");
    }

    #[tokio::test]
    async fn semantic_mode_resolves_ids_to_records() {
        let mut fx = fixture().await;
        let request = SearchRequest::new("hello world from the guide", 5, SearchMode::Semantic);
        let response = search(&mut fx.store, &fx.vectors, &fx.embedder, &request)
            .await
            .unwrap();
        assert!(!response.results.is_empty());
        let top = &response.results[0];
        assert_eq!(top.result_type, ResultType::Text);
        // Identical content embeds identically, so the top score is 1.0.
        assert!((top.score - 1.0).abs() < 1e-3);
    }

    #[tokio::test]
    async fn hybrid_mode_fuses_and_is_stable() {
        let mut fx = fixture().await;
        let request = SearchRequest::new("hello", 5, SearchMode::Hybrid);
        let first = search(&mut fx.store, &fx.vectors, &fx.embedder, &request)
            .await
            .unwrap();
        assert!(!first.results.is_empty());
        let second = search(&mut fx.store, &fx.vectors, &fx.embedder, &request)
            .await
            .unwrap();
        let first_ids: Vec<_> = first.results.iter().map(|r| r.vector_id.clone()).collect();
        let second_ids: Vec<_> = second.results.iter().map(|r| r.vector_id.clone()).collect();
        assert_eq!(first_ids, second_ids);
    }

    #[tokio::test]
    async fn no_match_returns_empty_response() {
        let mut fx = fixture().await;
        let request = SearchRequest::new("zzz-nonexistent-term", 5, SearchMode::Keyword);
        let response = search(&mut fx.store, &fx.vectors, &fx.embedder, &request)
            .await
            .unwrap();
        assert!(response.results.is_empty());
    }

    #[tokio::test]
    async fn empty_query_returns_empty_response() {
        let mut fx = fixture().await;
        let request = SearchRequest::new("   ", 5, SearchMode::Hybrid);
        let response = search(&mut fx.store, &fx.vectors, &fx.embedder, &request)
            .await
            .unwrap();
        assert!(response.results.is_empty());
    }

    #[tokio::test]
    async fn stale_vector_hit_is_dropped() {
        let mut fx = fixture().await;
        // A vector whose content row no longer exists.
        let mut meta = Metadata::new();
        meta.insert("type".into(), json!("text"));
        let ghost_vec = fx.embedder.embed_query("ghost").await.unwrap();
        fx.vectors
            .add(&["chunk_99_99_0".to_string()], &[ghost_vec], &[meta])
            .unwrap();

        let request = SearchRequest::new("ghost", 10, SearchMode::Semantic);
        let response = search(&mut fx.store, &fx.vectors, &fx.embedder, &request)
            .await
            .unwrap();
        assert!(response
            .results
            .iter()
            .all(|r| r.vector_id.as_deref() != Some("chunk_99_99_0")));
    }

    #[tokio::test]
    async fn unconfigured_embedder_degrades_hybrid_to_keyword() {
        let mut fx = fixture().await;
        let dead_embedder = Embedder::from_config(None, "us-central1", None, DIM);
        let request = SearchRequest::new("hello", 5, SearchMode::Hybrid);
        let response = search(&mut fx.store, &fx.vectors, &dead_embedder, &request)
            .await
            .unwrap();
        assert!(!response.results.is_empty());
        assert_eq!(response.results[0].result_type, ResultType::Text);
    }

    #[test]
    fn mode_parses_from_lowercase() {
        assert_eq!(
            serde_json::from_str::<SearchMode>("\"hybrid\"").unwrap(),
            SearchMode::Hybrid
        );
        assert_eq!(
            serde_json::from_str::<SearchMode>("\"keyword\"").unwrap(),
            SearchMode::Keyword
        );
        assert_eq!(
            serde_json::from_str::<SearchMode>("\"semantic\"").unwrap(),
            SearchMode::Semantic
        );
    }
}
