//! Row types for the content database.

use rusqlite::Row;
use serde::{Deserialize, Serialize};

/// A PDF document. Immutable once created; one row per unique file hash.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: i64,
    pub file_hash: String,
    pub filename: String,
    pub total_pages: i64,
    pub storage_path: Option<String>,
}

impl Document {
    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            file_hash: row.get(1)?,
            filename: row.get(2)?,
            total_pages: row.get(3)?,
            storage_path: row.get(4)?,
        })
    }
}

/// One page of a document; `ocr_text` arrives after OCR completes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page {
    pub id: i64,
    pub document_id: i64,
    pub page_num: i64,
    pub image_path: Option<String>,
    pub ocr_text: Option<String>,
    pub ocr_metadata: Option<String>,
}

impl Page {
    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            document_id: row.get(1)?,
            page_num: row.get(2)?,
            image_path: row.get(3)?,
            ocr_text: row.get(4)?,
            ocr_metadata: row.get(5)?,
        })
    }
}

/// A fixed-width window of a page's OCR text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextChunk {
    pub id: i64,
    pub page_id: i64,
    pub document_id: i64,
    pub chunk_index: i64,
    pub text: String,
    pub vector_id: Option<String>,
}

impl TextChunk {
    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            page_id: row.get(1)?,
            document_id: row.get(2)?,
            chunk_index: row.get(3)?,
            text: row.get(4)?,
            vector_id: row.get(5)?,
        })
    }
}

/// Bounding box in raster pixels, y-axis first to match the detector output.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegionBox {
    pub y0: f64,
    pub x0: f64,
    pub y1: f64,
    pub x1: f64,
}

/// A detected figure/table/diagram on a page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Region {
    pub id: i64,
    pub page_id: i64,
    pub document_id: i64,
    pub label: String,
    #[serde(flatten)]
    pub bounds: RegionBox,
    pub crop_path: Option<String>,
    pub vector_id: Option<String>,
}

impl Region {
    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            page_id: row.get(1)?,
            document_id: row.get(2)?,
            label: row.get(3)?,
            bounds: RegionBox {
                y0: row.get(4)?,
                x0: row.get(5)?,
                y1: row.get(6)?,
                x1: row.get(7)?,
            },
            crop_path: row.get(8)?,
            vector_id: row.get(9)?,
        })
    }
}

/// Whether a result came from chunk text or a detected region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultType {
    Text,
    Image,
}

/// A vector id resolved back to its content row, joined with document and
/// page fields. Shared by keyword search and semantic resolution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolvedRecord {
    pub document_id: i64,
    pub document_title: String,
    pub page_id: i64,
    pub page_num: i64,
    pub result_type: ResultType,
    pub chunk_id: Option<i64>,
    pub region_id: Option<i64>,
    pub snippet: String,
}
