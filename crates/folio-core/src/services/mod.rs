//! Clients for the external Google services: OCR, region detection,
//! multimodal embeddings, web-grounded search, and the chat model.
//!
//! Every client has a mock constructor returning deterministic output so the
//! pipeline, search core, and agent are testable without network access.

pub mod detector;
pub mod embedder;
pub mod gemini;
pub mod ocr;
pub mod web_search;

pub use detector::{DetectedRegion, RegionDetector};
pub use embedder::{EmbedError, Embedder, ImageInput};
pub use gemini::{ChatModel, Content, FunctionCall, FunctionDeclaration, ModelTurn, Part, Tool};
pub use ocr::{OcrClient, OcrItem};
pub use web_search::{WebSearchClient, WebSearchResult, WebSource};
