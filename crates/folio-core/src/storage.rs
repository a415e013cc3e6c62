//! File storage for PDFs, page rasters, and region crops.
//!
//! Layout is deterministic so paths can be rebuilt from ids alone:
//! - `<data>/pdfs/<doc_id>/<safe_filename>`
//! - `<data>/pages/<doc_id>/page_<n>.png`
//! - `<data>/crops/<doc_id>/region_<id>.png`

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::config::Config;

/// Local-disk storage rooted at the configured data directory.
#[derive(Debug, Clone)]
pub struct Storage {
    pdfs: PathBuf,
    pages: PathBuf,
    crops: PathBuf,
}

/// Reduce a client-supplied filename to its basename, with a fallback.
fn sanitize_filename(filename: &str) -> String {
    Path::new(filename)
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| "document.pdf".to_string())
}

/// Write bytes to a temp file in the target directory, then rename into place
/// so a concurrent reader sees either the previous or the finished file.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = path
        .parent()
        .context("storage path has no parent directory")?;
    std::fs::create_dir_all(dir)?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let tmp = dir.join(format!(".{file_name}.tmp"));
    std::fs::write(&tmp, bytes)
        .with_context(|| format!("Failed to write {}", tmp.display()))?;
    std::fs::rename(&tmp, path)
        .with_context(|| format!("Failed to move {} into place", path.display()))?;
    Ok(())
}

impl Storage {
    pub fn new(config: &Config) -> Self {
        Self {
            pdfs: config.pdfs_path(),
            pages: config.pages_path(),
            crops: config.crops_path(),
        }
    }

    /// Save the source PDF for a document. Returns the stored path.
    pub fn save_pdf(&self, bytes: &[u8], document_id: i64, filename: &str) -> Result<PathBuf> {
        let safe_name = sanitize_filename(filename);
        let path = self.pdfs.join(document_id.to_string()).join(safe_name);
        write_atomic(&path, bytes)?;
        tracing::info!(document_id, path = %path.display(), "Saved PDF");
        Ok(path)
    }

    /// Save a rendered page raster. Returns the stored path.
    pub fn save_page(&self, bytes: &[u8], document_id: i64, page_num: u32) -> Result<PathBuf> {
        let path = self
            .pages
            .join(document_id.to_string())
            .join(format!("page_{}.png", page_num));
        write_atomic(&path, bytes)?;
        tracing::debug!(document_id, page_num, "Saved page image");
        Ok(path)
    }

    /// Save a region crop. Returns the stored path.
    pub fn save_crop(&self, bytes: &[u8], document_id: i64, region_id: i64) -> Result<PathBuf> {
        let path = self
            .crops
            .join(document_id.to_string())
            .join(format!("region_{}.png", region_id));
        write_atomic(&path, bytes)?;
        tracing::debug!(document_id, region_id, "Saved crop");
        Ok(path)
    }

    /// Path to the stored PDF for a document, if present.
    pub fn get_pdf_path(&self, document_id: i64) -> Option<PathBuf> {
        let dir = self.pdfs.join(document_id.to_string());
        let entries = std::fs::read_dir(&dir).ok()?;
        for entry in entries.flatten() {
            let path = entry.path();
            if path
                .extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"))
            {
                return Some(path);
            }
        }
        None
    }

    /// Path to a stored page raster, if present.
    pub fn get_page_path(&self, document_id: i64, page_num: u32) -> Option<PathBuf> {
        let path = self
            .pages
            .join(document_id.to_string())
            .join(format!("page_{}.png", page_num));
        path.exists().then_some(path)
    }

    /// Path to a stored crop, if present.
    pub fn get_crop_path(&self, document_id: i64, region_id: i64) -> Option<PathBuf> {
        let path = self
            .crops
            .join(document_id.to_string())
            .join(format!("region_{}.png", region_id));
        path.exists().then_some(path)
    }

    /// Remove every stored file belonging to a document.
    pub fn remove_document_files(&self, document_id: i64) -> Result<()> {
        for dir in [&self.pdfs, &self.pages, &self.crops] {
            let path = dir.join(document_id.to_string());
            if path.exists() {
                std::fs::remove_dir_all(&path)
                    .with_context(|| format!("Failed to remove {}", path.display()))?;
            }
        }
        tracing::debug!(document_id, "Removed stored files");
        Ok(())
    }
}
