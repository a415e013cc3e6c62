//! Folio Core - Business logic for multimodal PDF search
//!
//! This crate contains all the core functionality for Folio, including:
//! - File storage for PDFs, page rasters, and region crops
//! - SQLite content store with an FTS5 keyword index
//! - Pluggable vector store (in-memory or persistent HNSW)
//! - Clients for OCR, region detection, embeddings, and web search
//! - The ingest pipeline (render → OCR ∥ detect → chunk → embed → persist)
//! - Hybrid search (keyword + semantic, RRF fusion)
//! - Agent/conversation handling with persistent memory

pub mod agent;
pub mod config;
pub mod content;
pub mod pipeline;
pub mod search;
pub mod services;
pub mod storage;
pub mod vector;

use std::sync::Arc;

use anyhow::Result;

pub use agent::{run_agent, AgentDeps, AgentReply, MemoryStore, SourceRef};
pub use config::Config;
pub use content::ContentStore;
pub use pipeline::{delete_document, run_pipeline, IngestOutcome};
pub use search::{SearchMode, SearchRequest, SearchResponse, SearchResultItem};
pub use services::{ChatModel, Embedder, OcrClient, RegionDetector, WebSearchClient};
pub use storage::Storage;
pub use vector::VectorStore;

/// Process-scoped application state: configuration plus the singleton
/// handles shared by the pipeline, search, and agent paths. Database
/// connections are deliberately not held here; callers open one per
/// request (readers) or per ingest (the writer) over WAL.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub storage: Storage,
    pub vectors: Arc<dyn VectorStore>,
    pub embedder: Arc<Embedder>,
    pub ocr: Arc<OcrClient>,
    pub detector: Arc<RegionDetector>,
    pub chat: Arc<ChatModel>,
    pub web: Arc<WebSearchClient>,
}

impl AppState {
    /// Build state from configuration: ensure directories, select the
    /// vector backend, and construct the remote service clients.
    pub fn new(config: Config) -> Result<Self> {
        config.ensure_dirs()?;
        let vectors = vector::open_vector_store(&config);
        let embedder = Arc::new(Embedder::from_config(
            config.gcp_project_id.as_deref(),
            &config.gcp_location,
            config.google_api_key.as_deref(),
            config.embedding_dimension,
        ));
        let ocr = Arc::new(OcrClient::from_api_key(config.google_api_key.as_deref()));
        let detector = Arc::new(RegionDetector::new(
            config.gemini_api_key.as_deref(),
            &config.bounding_box_system_instructions,
            config.pdf_spatial_instructions.as_deref(),
        ));
        let chat = Arc::new(ChatModel::from_api_key(config.gemini_api_key.as_deref()));
        let web = Arc::new(WebSearchClient::from_api_key(config.gemini_api_key.as_deref()));
        let storage = Storage::new(&config);

        Ok(Self {
            config,
            storage,
            vectors,
            embedder,
            ocr,
            detector,
            chat,
            web,
        })
    }

    /// Build state around explicit service handles. Used by tests and by
    /// callers that assemble their own clients.
    pub fn with_services(
        config: Config,
        vectors: Arc<dyn VectorStore>,
        embedder: Arc<Embedder>,
        ocr: Arc<OcrClient>,
        detector: Arc<RegionDetector>,
        chat: Arc<ChatModel>,
        web: Arc<WebSearchClient>,
    ) -> Self {
        let storage = Storage::new(&config);
        Self {
            config,
            storage,
            vectors,
            embedder,
            ocr,
            detector,
            chat,
            web,
        }
    }

    /// Open a connection to the content database.
    pub fn open_content(&self) -> Result<ContentStore> {
        ContentStore::open(&self.config.db_path)
    }

    /// Open a connection to the chat-history database.
    pub fn open_memory(&self) -> Result<MemoryStore> {
        MemoryStore::open(&self.config.memory_db_path())
    }
}
