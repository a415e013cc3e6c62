//! PDF rasterisation through pdfium.
//!
//! The library is bound once per call: an explicit path from `PDFIUM_DIR`
//! or `PDFIUM_DLL_PATH` wins, otherwise the system library is used.

use std::io::Cursor;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use image::ImageFormat;
use pdfium_render::prelude::*;

/// One rendered page: PNG bytes plus raster dimensions.
#[derive(Debug, Clone)]
pub struct RenderedPage {
    /// 1-based page number
    pub page_num: u32,
    pub png: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

fn bind_pdfium() -> Result<Box<dyn PdfiumLibraryBindings>> {
    if let Ok(path) = std::env::var("PDFIUM_DLL_PATH") {
        let pb = PathBuf::from(path);
        let lib_path = if pb.is_dir() {
            Pdfium::pdfium_platform_library_name_at_path(&pb)
        } else {
            pb
        };
        if let Ok(bindings) = Pdfium::bind_to_library(&lib_path) {
            return Ok(bindings);
        }
    }
    if let Ok(dir) = std::env::var("PDFIUM_DIR") {
        let lib_path = Pdfium::pdfium_platform_library_name_at_path(&PathBuf::from(dir));
        if let Ok(bindings) = Pdfium::bind_to_library(&lib_path) {
            return Ok(bindings);
        }
    }
    Pdfium::bind_to_system_library().map_err(|e| anyhow!("Failed to bind pdfium: {e}"))
}

/// Render every page of a PDF to PNG at the given DPI.
///
/// CPU-bound; callers run it on a blocking thread. Any page failing to
/// render fails the whole document.
pub fn render_pdf_pages(pdf_path: &Path, dpi: u32) -> Result<Vec<RenderedPage>> {
    let pdfium = Pdfium::new(bind_pdfium()?);
    let document = pdfium
        .load_pdf_from_file(pdf_path, None)
        .map_err(|e| anyhow!("Failed to open PDF {}: {e}", pdf_path.display()))?;

    let scale = dpi as f32 / 72.0;
    let page_count = document.pages().len() as usize;
    tracing::info!(
        pdf = %pdf_path.display(),
        pages = page_count,
        dpi,
        "Rendering PDF"
    );

    let mut out = Vec::with_capacity(page_count);
    for (index, page) in document.pages().iter().enumerate() {
        let config = PdfRenderConfig::new().scale_page_by_factor(scale);
        let bitmap = page
            .render_with_config(&config)
            .map_err(|e| anyhow!("Failed to render page {}: {e}", index + 1))?;
        let rendered = bitmap.as_image();
        let (width, height) = (rendered.width(), rendered.height());

        let mut png = Cursor::new(Vec::new());
        rendered
            .write_to(&mut png, ImageFormat::Png)
            .context("Failed to encode page as PNG")?;

        tracing::debug!(page = index + 1, width, height, "Rendered page");
        out.push(RenderedPage {
            page_num: index as u32 + 1,
            png: png.into_inner(),
            width,
            height,
        });
    }
    Ok(out)
}
