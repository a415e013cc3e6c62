//! End-to-end ingest pipeline.
//!
//! ```text
//! run_pipeline()
//!     │ hash → duplicate check → render (blocking thread)
//!     ▼
//! index_document()          one IMMEDIATE transaction on the writer
//!     │ insert Document + Pages, save rasters
//!     ├── OCR: producer → bounded queue → batching consumer ─┐
//!     ├── detection: buffer_unordered(5) worker pool ────────┤ barrier
//!     │ chunk OCR text → embed → TextChunk rows → vectors  ◄─┘
//!     │ region rows → crops → embed → vectors
//!     ▼ move PDF into storage, commit
//! ```
//!
//! OCR and detection failures degrade (empty text, no regions); render,
//! storage, and post-retry embedder failures roll the document back.

pub mod chunker;
pub mod crops;
pub mod render;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use futures::StreamExt;
use serde_json::json;
use sha2::{Digest, Sha256};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::content::{ContentStore, RegionBox};
use crate::services::{ImageInput, OcrClient, RegionDetector};
use crate::vector::Metadata;
use crate::AppState;

use chunker::{DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE};
use render::RenderedPage;

/// Concurrent detection calls against the vision model.
const DETECTION_WORKERS: usize = 5;

/// How long the OCR consumer waits on the queue before flushing a partial batch.
const OCR_POLL_TIMEOUT: Duration = Duration::from_secs(1);

/// Result of submitting one PDF.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    /// Newly indexed.
    Indexed(i64),
    /// Identical bytes were indexed before; the existing id is returned.
    Duplicate(i64),
    /// The PDF rendered to zero pages.
    Empty,
}

struct OcrTask {
    page_id: i64,
    png: Vec<u8>,
}

struct OcrPageResult {
    page_id: i64,
    text: String,
    error: Option<String>,
}

struct CroppedRegion {
    label: String,
    bounds: RegionBox,
    png: Vec<u8>,
}

/// Index one PDF from disk. Returns the new document id, the existing id
/// for a duplicate, or `Empty` when nothing rendered.
pub async fn run_pipeline(
    state: &AppState,
    pdf_path: &Path,
    cancel: &CancellationToken,
) -> Result<IngestOutcome> {
    if !pdf_path.exists() {
        bail!("PDF not found: {}", pdf_path.display());
    }
    let pdf_bytes = std::fs::read(pdf_path)
        .with_context(|| format!("Failed to read {}", pdf_path.display()))?;
    let file_hash = hex::encode(Sha256::digest(&pdf_bytes));

    let mut store = state.open_content()?;
    if let Some(existing) = store.find_document_by_hash(&file_hash)? {
        tracing::info!(
            pdf = %pdf_path.display(),
            document_id = existing.id,
            "Skipping duplicate PDF"
        );
        return Ok(IngestOutcome::Duplicate(existing.id));
    }

    let dpi = state.config.pdf_render_dpi;
    let render_path = pdf_path.to_path_buf();
    let pages = tokio::task::spawn_blocking(move || render::render_pdf_pages(&render_path, dpi))
        .await
        .context("Render task panicked")??;

    let filename = pdf_path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "document.pdf".to_string());

    ingest_rendered(state, &mut store, &file_hash, &filename, &pdf_bytes, pages, cancel).await
}

/// Index pre-rendered pages. Owns the whole ingest transaction: on any
/// fatal error the database is rolled back and no Document row survives.
pub async fn ingest_rendered(
    state: &AppState,
    store: &mut ContentStore,
    file_hash: &str,
    filename: &str,
    pdf_bytes: &[u8],
    pages: Vec<RenderedPage>,
    cancel: &CancellationToken,
) -> Result<IngestOutcome> {
    if let Some(existing) = store.find_document_by_hash(file_hash)? {
        tracing::info!(document_id = existing.id, "Skipping duplicate PDF");
        return Ok(IngestOutcome::Duplicate(existing.id));
    }
    if pages.is_empty() {
        tracing::warn!(filename, "No pages rendered");
        return Ok(IngestOutcome::Empty);
    }
    if cancel.is_cancelled() {
        bail!("Ingest cancelled");
    }

    store.begin()?;
    match index_document(state, store, file_hash, filename, pdf_bytes, &pages, cancel).await {
        Ok(document_id) => {
            store.commit()?;
            tracing::info!(document_id, filename, "Pipeline complete");
            Ok(IngestOutcome::Indexed(document_id))
        }
        Err(e) => {
            if let Err(rollback_err) = store.rollback() {
                tracing::error!(error = %rollback_err, "Rollback failed");
            }
            tracing::error!(filename, error = %e, "Pipeline failed");
            Err(e)
        }
    }
}

async fn index_document(
    state: &AppState,
    store: &mut ContentStore,
    file_hash: &str,
    filename: &str,
    pdf_bytes: &[u8],
    pages: &[RenderedPage],
    cancel: &CancellationToken,
) -> Result<i64> {
    let document_id = store.insert_document(file_hash, filename, pages.len() as i64)?;
    tracing::info!(document_id, pages = pages.len(), "Created document");

    let mut page_ids = Vec::with_capacity(pages.len());
    for page in pages {
        let page_id = store.insert_page(document_id, page.page_num as i64)?;
        let image_path = state.storage.save_page(&page.png, document_id, page.page_num)?;
        store.set_page_image_path(page_id, &image_path.to_string_lossy())?;
        page_ids.push(page_id);
    }

    // Parallel extraction: one OCR consumer on a bounded queue, a fixed
    // detection pool, and a barrier before anything is written back.
    let (ocr_tx, ocr_rx) = mpsc::channel(state.config.ocr_max_queue_size);
    let consumer = tokio::spawn(ocr_consumer(
        state.ocr.clone(),
        ocr_rx,
        state.config.ocr_batch_size,
    ));

    for (page, page_id) in pages.iter().zip(&page_ids) {
        ocr_tx
            .send(Some(OcrTask {
                page_id: *page_id,
                png: page.png.clone(),
            }))
            .await
            .context("OCR consumer stopped early")?;
    }
    ocr_tx.send(None).await.context("OCR consumer stopped early")?;
    drop(ocr_tx);

    let detection_results: Vec<(usize, Vec<CroppedRegion>)> =
        futures::stream::iter(pages.iter().cloned().enumerate())
            .map(|(idx, page)| {
                let detector = state.detector.clone();
                async move { (idx, detect_page_regions(&detector, &page).await) }
            })
            .buffer_unordered(DETECTION_WORKERS)
            .collect()
            .await;
    let mut detections: Vec<Vec<CroppedRegion>> = Vec::with_capacity(pages.len());
    detections.resize_with(pages.len(), Vec::new);
    for (idx, regions) in detection_results {
        detections[idx] = regions;
    }

    let ocr_results = consumer.await.context("OCR consumer panicked")?;

    if cancel.is_cancelled() {
        bail!("Ingest cancelled");
    }

    for result in &ocr_results {
        let metadata = result
            .error
            .as_ref()
            .map(|message| json!({ "error": message }).to_string());
        store.set_page_ocr(result.page_id, &result.text, metadata.as_deref())?;
    }

    // Chunk and embed text, rows before vectors.
    let ocr_for_chunking: Vec<(i64, i64, String)> = ocr_results
        .iter()
        .map(|r| (r.page_id, document_id, r.text.clone()))
        .collect();
    let plans = chunker::chunk_ocr_results(&ocr_for_chunking, DEFAULT_CHUNK_SIZE, DEFAULT_CHUNK_OVERLAP);

    if !plans.is_empty() {
        let texts: Vec<String> = plans.iter().map(|p| p.text.clone()).collect();
        let vectors = state.embedder.embed_text(&texts).await?;

        let mut ids = Vec::new();
        let mut embeddings = Vec::new();
        let mut metadata = Vec::new();
        for (plan, vector) in plans.iter().zip(vectors) {
            let vector_id = format!("chunk_{document_id}_{}_{}", plan.page_id, plan.chunk_index);
            store.insert_chunk(
                plan.page_id,
                document_id,
                plan.chunk_index,
                &plan.text,
                vector.is_some().then_some(vector_id.as_str()),
            )?;
            if let Some(vector) = vector {
                ids.push(vector_id);
                embeddings.push(vector);
                metadata.push(text_metadata(document_id, plan.page_id));
            }
        }
        if !ids.is_empty() {
            let count = ids.len();
            state.vectors.add(&ids, &embeddings, &metadata)?;
            tracing::info!(document_id, chunks = count, "Indexed text chunks");
        }
    }

    if cancel.is_cancelled() {
        bail!("Ingest cancelled");
    }

    // Region rows, then crop files, then vectors.
    let mut crop_rows: Vec<(i64, i64, Vec<u8>)> = Vec::new();
    for (idx, regions) in detections.into_iter().enumerate() {
        let page_id = page_ids[idx];
        for region in regions {
            let region_id = store.insert_region(page_id, document_id, &region.label, region.bounds)?;
            let crop_path = state.storage.save_crop(&region.png, document_id, region_id)?;
            store.set_region_crop(region_id, &crop_path.to_string_lossy())?;
            crop_rows.push((region_id, page_id, region.png));
        }
    }

    if !crop_rows.is_empty() {
        let images: Vec<ImageInput> = crop_rows
            .iter()
            .map(|(_, _, png)| ImageInput::Bytes(png.clone()))
            .collect();
        let vectors = state.embedder.embed_images(&images).await?;

        let mut ids = Vec::new();
        let mut embeddings = Vec::new();
        let mut metadata = Vec::new();
        for ((region_id, page_id, _), vector) in crop_rows.iter().zip(vectors) {
            if let Some(vector) = vector {
                let vector_id = format!("region_{document_id}_{region_id}");
                store.set_region_vector(*region_id, &vector_id)?;
                ids.push(vector_id);
                embeddings.push(vector);
                metadata.push(image_metadata(document_id, *page_id, *region_id));
            }
        }
        if !ids.is_empty() {
            let count = ids.len();
            state.vectors.add(&ids, &embeddings, &metadata)?;
            tracing::info!(document_id, regions = count, "Indexed region vectors");
        }
    }

    // Finalise: move the PDF into storage and record where it went.
    let stored = state.storage.save_pdf(pdf_bytes, document_id, filename)?;
    store.set_document_storage_path(document_id, &stored.to_string_lossy())?;

    Ok(document_id)
}

/// Drain the task queue into OCR batches of up to `batch_size`, flushing on
/// a full batch, on a queue lull, and on the closing sentinel. The partial
/// trailing batch is always flushed before exit.
async fn ocr_consumer(
    ocr: Arc<OcrClient>,
    mut rx: mpsc::Receiver<Option<OcrTask>>,
    batch_size: usize,
) -> Vec<OcrPageResult> {
    let mut results = Vec::new();
    let mut done = false;
    while !done {
        let mut batch: Vec<OcrTask> = Vec::new();
        while batch.len() < batch_size {
            match tokio::time::timeout(OCR_POLL_TIMEOUT, rx.recv()).await {
                Ok(Some(Some(task))) => batch.push(task),
                Ok(Some(None)) | Ok(None) => {
                    done = true;
                    break;
                }
                Err(_) => break,
            }
        }
        if batch.is_empty() {
            continue;
        }

        let images: Vec<Vec<u8>> = batch.iter().map(|t| t.png.clone()).collect();
        match ocr.batch_ocr(&images).await {
            Ok(items) => {
                for (task, item) in batch.iter().zip(items) {
                    results.push(OcrPageResult {
                        page_id: task.page_id,
                        text: if item.error.is_some() { String::new() } else { item.text },
                        error: item.error,
                    });
                }
                tracing::debug!(pages = batch.len(), "OCR batch done");
            }
            Err(e) => {
                tracing::error!(error = %e, pages = batch.len(), "OCR batch failed");
                for task in &batch {
                    results.push(OcrPageResult {
                        page_id: task.page_id,
                        text: String::new(),
                        error: Some(e.to_string()),
                    });
                }
            }
        }
    }
    results
}

/// Detect regions on one page and crop them. Failures degrade to an empty
/// list; a page without figures contributes nothing.
async fn detect_page_regions(detector: &RegionDetector, page: &RenderedPage) -> Vec<CroppedRegion> {
    let detected = match detector.detect_regions(&page.png).await {
        Ok(regions) => regions,
        Err(e) => {
            tracing::warn!(page_num = page.page_num, error = %e, "Detection failed");
            return Vec::new();
        }
    };
    if detected.is_empty() {
        tracing::debug!(page_num = page.page_num, "No regions detected");
        return Vec::new();
    }

    let mut out = Vec::new();
    for region in detected {
        let Some(boxed) = crops::clamp_box(region.box_2d, page.width, page.height) else {
            continue;
        };
        match crops::crop_png(&page.png, boxed) {
            Ok(png) => out.push(CroppedRegion {
                label: region.label,
                bounds: boxed.to_region_box(),
                png,
            }),
            Err(e) => {
                tracing::warn!(page_num = page.page_num, error = %e, "Failed to crop region");
            }
        }
    }
    tracing::info!(
        page_num = page.page_num,
        cropped = out.len(),
        "Page detection done"
    );
    out
}

fn text_metadata(document_id: i64, page_id: i64) -> Metadata {
    let mut meta = Metadata::new();
    meta.insert("document_id".into(), json!(document_id));
    meta.insert("page_id".into(), json!(page_id));
    meta.insert("type".into(), json!("text"));
    meta
}

fn image_metadata(document_id: i64, page_id: i64, region_id: i64) -> Metadata {
    let mut meta = text_metadata(document_id, page_id);
    meta.insert("type".into(), json!("image"));
    meta.insert("region_id".into(), json!(region_id));
    meta
}

/// Delete a document with everything it owns: rows, vectors, stored files.
pub fn delete_document(state: &AppState, store: &ContentStore, document_id: i64) -> Result<bool> {
    let Some(deleted) = store.delete_document(document_id)? else {
        return Ok(false);
    };
    state.vectors.remove(&deleted.vector_ids)?;
    state.storage.remove_document_files(document_id)?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::services::{ChatModel, DetectedRegion, Embedder, OcrClient, RegionDetector, WebSearchClient, WebSearchResult};
    use crate::vector::MemoryVectorStore;
    use crate::AppState;
    use image::{DynamicImage, ImageFormat, RgbImage};
    use std::io::Cursor;

    const DIM: usize = 8;

    fn test_png(width: u32, height: u32) -> Vec<u8> {
        let image = DynamicImage::ImageRgb8(RgbImage::new(width, height));
        let mut out = Cursor::new(Vec::new());
        image.write_to(&mut out, ImageFormat::Png).unwrap();
        out.into_inner()
    }

    fn rendered_pages(count: usize) -> Vec<RenderedPage> {
        (0..count)
            .map(|i| RenderedPage {
                page_num: i as u32 + 1,
                png: test_png(100, 100),
                width: 100,
                height: 100,
            })
            .collect()
    }

    fn test_state(
        dir: &Path,
        ocr: OcrClient,
        detector: RegionDetector,
    ) -> AppState {
        let mut config = Config::for_data_dir(dir);
        config.embedding_dimension = DIM;
        config.ensure_dirs().unwrap();
        AppState::with_services(
            config,
            Arc::new(MemoryVectorStore::new(DIM)),
            Arc::new(Embedder::mock(DIM)),
            Arc::new(ocr),
            Arc::new(detector),
            Arc::new(ChatModel::scripted(vec![])),
            Arc::new(WebSearchClient::mock(WebSearchResult {
                text: String::new(),
                web_search_queries: vec![],
                sources: vec![],
            })),
        )
    }

    fn figure_on_page_two() -> RegionDetector {
        RegionDetector::mock(vec![
            vec![],
            vec![DetectedRegion {
                box_2d: [10.0, 10.0, 60.0, 60.0],
                label: "figure".into(),
            }],
        ])
    }

    #[tokio::test]
    async fn two_page_ingest_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(
            dir.path(),
            OcrClient::mock(vec!["hello world".into(), String::new()]),
            figure_on_page_two(),
        );
        let mut store = state.open_content().unwrap();

        let outcome = ingest_rendered(
            &state,
            &mut store,
            "hash-e2e",
            "sample.pdf",
            b"%PDF-1.4 sample",
            rendered_pages(2),
            &CancellationToken::new(),
        )
        .await
        .unwrap();
        let IngestOutcome::Indexed(document_id) = outcome else {
            panic!("expected Indexed, got {outcome:?}");
        };

        let document = store.get_document(document_id).unwrap().unwrap();
        assert_eq!(document.total_pages, 2);
        assert!(document.storage_path.is_some());

        let pages = store.list_pages(document_id).unwrap();
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0].ocr_text.as_deref(), Some("hello world"));
        assert!(pages.iter().all(|p| p.image_path.is_some()));

        let chunks = store.list_chunks(pages[0].id).unwrap();
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].text.contains("hello world"));
        let chunk_vector_id = chunks[0].vector_id.clone().unwrap();
        assert_eq!(
            chunk_vector_id,
            format!("chunk_{document_id}_{}_0", pages[0].id)
        );
        assert!(state.vectors.contains(&chunk_vector_id));

        let regions = store.list_regions(pages[1].id).unwrap();
        assert_eq!(regions.len(), 1);
        let crop_path = regions[0].crop_path.clone().unwrap();
        assert!(Path::new(&crop_path).exists());
        let region_vector_id = regions[0].vector_id.clone().unwrap();
        assert!(state.vectors.contains(&region_vector_id));
        assert!(regions[0].bounds.y0 < regions[0].bounds.y1);
        assert!(regions[0].bounds.x0 < regions[0].bounds.x1);

        assert!(state.vectors.count() >= 2);
    }

    #[tokio::test]
    async fn resubmission_is_a_silent_duplicate() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(
            dir.path(),
            OcrClient::mock(vec!["text".into(), "text".into()]),
            RegionDetector::mock(vec![]),
        );
        let mut store = state.open_content().unwrap();
        let cancel = CancellationToken::new();

        let first = ingest_rendered(
            &state, &mut store, "dup", "a.pdf", b"%PDF", rendered_pages(1), &cancel,
        )
        .await
        .unwrap();
        let IngestOutcome::Indexed(id) = first else { panic!() };
        let vectors_before = state.vectors.count();
        let chunks_before = store.chunk_count(id).unwrap();

        let second = ingest_rendered(
            &state, &mut store, "dup", "a.pdf", b"%PDF", rendered_pages(1), &cancel,
        )
        .await
        .unwrap();
        assert_eq!(second, IngestOutcome::Duplicate(id));
        assert_eq!(state.vectors.count(), vectors_before);
        assert_eq!(store.chunk_count(id).unwrap(), chunks_before);
        assert_eq!(store.list_documents().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn empty_render_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path(), OcrClient::mock(vec![]), RegionDetector::mock(vec![]));
        let mut store = state.open_content().unwrap();
        let outcome = ingest_rendered(
            &state, &mut store, "h", "x.pdf", b"%PDF", vec![], &CancellationToken::new(),
        )
        .await
        .unwrap();
        assert_eq!(outcome, IngestOutcome::Empty);
        assert!(store.list_documents().unwrap().is_empty());
    }

    #[tokio::test]
    async fn batch_size_one_still_maps_text_to_pages() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::for_data_dir(dir.path());
        config.embedding_dimension = DIM;
        config.ocr_batch_size = 1;
        config.ensure_dirs().unwrap();
        let state = AppState::with_services(
            config,
            Arc::new(MemoryVectorStore::new(DIM)),
            Arc::new(Embedder::mock(DIM)),
            Arc::new(OcrClient::mock(vec![
                "page one text".into(),
                "page two text".into(),
                "page three text".into(),
            ])),
            Arc::new(RegionDetector::mock(vec![])),
            Arc::new(ChatModel::scripted(vec![])),
            Arc::new(WebSearchClient::mock(WebSearchResult {
                text: String::new(),
                web_search_queries: vec![],
                sources: vec![],
            })),
        );
        let mut store = state.open_content().unwrap();

        let outcome = ingest_rendered(
            &state, &mut store, "b1", "b.pdf", b"%PDF", rendered_pages(3),
            &CancellationToken::new(),
        )
        .await
        .unwrap();
        let IngestOutcome::Indexed(id) = outcome else { panic!() };

        let pages = store.list_pages(id).unwrap();
        assert_eq!(pages[0].ocr_text.as_deref(), Some("page one text"));
        assert_eq!(pages[1].ocr_text.as_deref(), Some("page two text"));
        assert_eq!(pages[2].ocr_text.as_deref(), Some("page three text"));
    }

    #[tokio::test]
    async fn partial_trailing_batch_is_flushed_on_sentinel() {
        // Two pages against a batch size of 12: the only batch is partial
        // and arrives together with the sentinel.
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(
            dir.path(),
            OcrClient::mock(vec!["alpha".into(), "beta".into()]),
            RegionDetector::mock(vec![]),
        );
        assert_eq!(state.config.ocr_batch_size, 12);
        let mut store = state.open_content().unwrap();

        let outcome = ingest_rendered(
            &state, &mut store, "flush", "f.pdf", b"%PDF", rendered_pages(2),
            &CancellationToken::new(),
        )
        .await
        .unwrap();
        let IngestOutcome::Indexed(id) = outcome else { panic!() };
        let pages = store.list_pages(id).unwrap();
        assert_eq!(pages[0].ocr_text.as_deref(), Some("alpha"));
        assert_eq!(pages[1].ocr_text.as_deref(), Some("beta"));
    }

    #[tokio::test]
    async fn page_without_regions_contributes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(
            dir.path(),
            OcrClient::mock(vec!["text".into()]),
            RegionDetector::mock(vec![vec![]]),
        );
        let mut store = state.open_content().unwrap();
        let outcome = ingest_rendered(
            &state, &mut store, "nr", "n.pdf", b"%PDF", rendered_pages(1),
            &CancellationToken::new(),
        )
        .await
        .unwrap();
        let IngestOutcome::Indexed(id) = outcome else { panic!() };
        assert_eq!(store.region_count(id).unwrap(), 0);
        // Only the text vector exists.
        assert_eq!(state.vectors.count(), 1);
    }

    #[tokio::test]
    async fn degenerate_detection_box_is_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(
            dir.path(),
            OcrClient::mock(vec!["text".into()]),
            RegionDetector::mock(vec![vec![
                DetectedRegion { box_2d: [50.0, 10.0, 50.0, 20.0], label: "collapsed".into() },
                DetectedRegion { box_2d: [0.0, 0.0, 40.0, 40.0], label: "kept".into() },
            ]]),
        );
        let mut store = state.open_content().unwrap();
        let outcome = ingest_rendered(
            &state, &mut store, "dg", "d.pdf", b"%PDF", rendered_pages(1),
            &CancellationToken::new(),
        )
        .await
        .unwrap();
        let IngestOutcome::Indexed(id) = outcome else { panic!() };
        assert_eq!(store.region_count(id).unwrap(), 1);
        let pages = store.list_pages(id).unwrap();
        assert_eq!(store.list_regions(pages[0].id).unwrap()[0].label, "kept");
    }

    #[tokio::test]
    async fn embedder_failure_rolls_back_the_document() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::for_data_dir(dir.path());
        config.embedding_dimension = DIM;
        config.ensure_dirs().unwrap();
        let state = AppState::with_services(
            config,
            Arc::new(MemoryVectorStore::new(DIM)),
            // Unconfigured embedder: every call is a transport error.
            Arc::new(Embedder::from_config(None, "us-central1", None, DIM)),
            Arc::new(OcrClient::mock(vec!["text that will chunk".into()])),
            Arc::new(RegionDetector::mock(vec![])),
            Arc::new(ChatModel::scripted(vec![])),
            Arc::new(WebSearchClient::mock(WebSearchResult {
                text: String::new(),
                web_search_queries: vec![],
                sources: vec![],
            })),
        );
        let mut store = state.open_content().unwrap();

        let result = ingest_rendered(
            &state, &mut store, "fatal", "f.pdf", b"%PDF", rendered_pages(1),
            &CancellationToken::new(),
        )
        .await;
        assert!(result.is_err());
        assert!(store.list_documents().unwrap().is_empty());
        assert_eq!(state.vectors.count(), 0);
    }

    #[tokio::test]
    async fn delete_document_removes_rows_vectors_and_files() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(
            dir.path(),
            OcrClient::mock(vec!["hello world".into(), String::new()]),
            figure_on_page_two(),
        );
        let mut store = state.open_content().unwrap();
        let outcome = ingest_rendered(
            &state, &mut store, "del", "d.pdf", b"%PDF", rendered_pages(2),
            &CancellationToken::new(),
        )
        .await
        .unwrap();
        let IngestOutcome::Indexed(id) = outcome else { panic!() };
        assert!(state.vectors.count() >= 2);

        assert!(delete_document(&state, &store, id).unwrap());
        assert!(store.get_document(id).unwrap().is_none());
        assert_eq!(state.vectors.count(), 0);
        assert!(state.storage.get_pdf_path(id).is_none());
        assert!(state.storage.get_page_path(id, 1).is_none());
        assert!(!delete_document(&state, &store, id).unwrap());
    }

    #[tokio::test]
    async fn ocr_failure_degrades_to_empty_text() {
        // An unconfigured OCR client fails every batch; pages end up with
        // empty text and an error note, and the ingest still succeeds.
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(
            dir.path(),
            OcrClient::from_api_key(None),
            RegionDetector::mock(vec![]),
        );
        let mut store = state.open_content().unwrap();
        let outcome = ingest_rendered(
            &state, &mut store, "ocrfail", "o.pdf", b"%PDF", rendered_pages(1),
            &CancellationToken::new(),
        )
        .await
        .unwrap();
        let IngestOutcome::Indexed(id) = outcome else { panic!() };
        let pages = store.list_pages(id).unwrap();
        assert_eq!(pages[0].ocr_text.as_deref(), Some(""));
        assert!(pages[0].ocr_metadata.as_deref().unwrap_or_default().contains("error"));
        assert_eq!(store.chunk_count(id).unwrap(), 0);
    }
}
