use std::path::PathBuf;

/// Default system instruction for the bounding-box detector.
const DEFAULT_BOUNDING_BOX_INSTRUCTIONS: &str = "Return bounding boxes as a JSON array with labels. \
Never return masks or code fencing. Limit to 25 objects.\n\
If an object is present multiple times, name them according to their unique characteristics \
(colors, size, position, unique characteristics, etc.).";

/// Application configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// GCP project for the Vertex embedding endpoint
    pub gcp_project_id: Option<String>,
    /// Vertex AI region
    pub gcp_location: String,
    /// Path to a service account JSON (exported for outer tooling; unused directly)
    pub google_application_credentials: Option<String>,
    /// API key for the Vision OCR and Vertex endpoints
    pub google_api_key: Option<String>,
    /// API key for Gemini (detection, chat, web grounding)
    pub gemini_api_key: Option<String>,

    /// Base data directory
    pub data_dir: PathBuf,
    /// Content database path
    pub db_path: PathBuf,
    /// Subdir under data_dir for stored PDFs
    pub pdfs_dir: String,
    /// Subdir under data_dir for region crops
    pub crops_dir: String,

    /// System instruction for region detection
    pub bounding_box_system_instructions: String,
    /// Optional extra instructions for PDF page layout
    pub pdf_spatial_instructions: Option<String>,

    /// OCR batch size (1..=16)
    pub ocr_batch_size: usize,
    /// Bounded queue capacity for the OCR producer/consumer
    pub ocr_max_queue_size: usize,
    /// DPI for PDF page rendering
    pub pdf_render_dpi: u32,

    /// Vector dimension (Vertex multimodal is 1408)
    pub embedding_dimension: usize,
    /// Vector store backend: "memory" or "hnsw"
    pub vector_store_backend: String,
    /// Persistence directory for the hnsw backend
    pub vector_store_dir: PathBuf,

    /// HTTP listen address
    pub listen_addr: String,
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env_string(key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Config {
    /// Load configuration from the environment, falling back to defaults.
    pub fn from_env() -> Self {
        let data_dir = PathBuf::from(env_string("DATA_DIR").unwrap_or_else(|| "data".to_string()));
        let db_path = PathBuf::from(env_string("DB_PATH").unwrap_or_else(|| "folio.db".to_string()));
        let vector_store_dir = env_string("VECTOR_STORE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join("vectors"));

        let config = Self {
            gcp_project_id: env_string("GCP_PROJECT_ID"),
            gcp_location: env_string("GCP_LOCATION").unwrap_or_else(|| "us-central1".to_string()),
            google_application_credentials: env_string("GOOGLE_APPLICATION_CREDENTIALS"),
            google_api_key: env_string("GOOGLE_API_KEY"),
            gemini_api_key: env_string("GEMINI_API_KEY"),
            data_dir,
            db_path,
            pdfs_dir: env_string("PDFS_DIR").unwrap_or_else(|| "pdfs".to_string()),
            crops_dir: env_string("CROPS_DIR").unwrap_or_else(|| "crops".to_string()),
            bounding_box_system_instructions: env_string("BOUNDING_BOX_SYSTEM_INSTRUCTIONS")
                .unwrap_or_else(|| DEFAULT_BOUNDING_BOX_INSTRUCTIONS.to_string()),
            pdf_spatial_instructions: env_string("PDF_SPATIAL_INSTRUCTIONS"),
            ocr_batch_size: env_parse("OCR_BATCH_SIZE", 12usize).clamp(1, 16),
            ocr_max_queue_size: env_parse("OCR_MAX_QUEUE_SIZE", 24usize).max(1),
            pdf_render_dpi: env_parse("PDF_RENDER_DPI", 144u32).max(72),
            embedding_dimension: env_parse("EMBEDDING_DIMENSION", 1408usize),
            vector_store_backend: env_string("VECTOR_STORE_BACKEND")
                .unwrap_or_else(|| "memory".to_string()),
            vector_store_dir,
            listen_addr: env_string("LISTEN_ADDR").unwrap_or_else(|| "127.0.0.1:8000".to_string()),
        };

        tracing::debug!(
            data_dir = %config.data_dir.display(),
            db_path = %config.db_path.display(),
            backend = %config.vector_store_backend,
            "Config loaded"
        );
        config
    }

    /// Chat-history database, next to the content database.
    pub fn memory_db_path(&self) -> PathBuf {
        match self.db_path.parent() {
            Some(parent) if parent.as_os_str().is_empty() => PathBuf::from("chat_history.db"),
            Some(parent) => parent.join("chat_history.db"),
            None => PathBuf::from("chat_history.db"),
        }
    }

    pub fn pdfs_path(&self) -> PathBuf {
        self.data_dir.join(&self.pdfs_dir)
    }

    pub fn crops_path(&self) -> PathBuf {
        self.data_dir.join(&self.crops_dir)
    }

    pub fn pages_path(&self) -> PathBuf {
        self.data_dir.join("pages")
    }

    /// Ensure all required directories exist.
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.data_dir)?;
        std::fs::create_dir_all(self.pdfs_path())?;
        std::fs::create_dir_all(self.crops_path())?;
        std::fs::create_dir_all(self.pages_path())?;
        if let Some(parent) = self.db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        Ok(())
    }

    /// A configuration rooted at `dir`, with remote services left unconfigured.
    /// Used by tests and by callers that construct state programmatically.
    pub fn for_data_dir(dir: impl Into<PathBuf>) -> Self {
        let data_dir: PathBuf = dir.into();
        Self {
            gcp_project_id: None,
            gcp_location: "us-central1".to_string(),
            google_application_credentials: None,
            google_api_key: None,
            gemini_api_key: None,
            db_path: data_dir.join("folio.db"),
            pdfs_dir: "pdfs".to_string(),
            crops_dir: "crops".to_string(),
            bounding_box_system_instructions: DEFAULT_BOUNDING_BOX_INSTRUCTIONS.to_string(),
            pdf_spatial_instructions: None,
            ocr_batch_size: 12,
            ocr_max_queue_size: 24,
            pdf_render_dpi: 144,
            embedding_dimension: 1408,
            vector_store_backend: "memory".to_string(),
            vector_store_dir: data_dir.join("vectors"),
            listen_addr: "127.0.0.1:8000".to_string(),
            data_dir,
        }
    }
}
