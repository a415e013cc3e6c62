//! CLI entrypoint to index a PDF or a directory of PDFs.
//!
//! Usage: run-index <path_to_pdf_or_dir>
//!
//! Set LOG_LEVEL=debug for per-step logs (OCR batches, regions, embeddings).

use std::path::{Path, PathBuf};

use anyhow::Result;
use folio_core::{pipeline, AppState, Config, IngestOutcome};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

fn log_filter() -> tracing_subscriber::EnvFilter {
    tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        tracing_subscriber::EnvFilter::new(level.to_lowercase())
    })
}

fn collect_pdfs(dir: &Path, out: &mut Vec<PathBuf>) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    let mut entries: Vec<_> = entries.flatten().map(|e| e.path()).collect();
    entries.sort();
    for path in entries {
        if path.is_dir() {
            collect_pdfs(&path, out);
        } else if path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"))
        {
            out.push(path);
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter(log_filter()).init();

    let Some(arg) = std::env::args().nth(1) else {
        eprintln!("Usage: run-index <path_to_pdf_or_dir>");
        std::process::exit(1);
    };
    let path = PathBuf::from(arg);
    if !path.exists() {
        error!("Path does not exist: {}", path.display());
        std::process::exit(1);
    }

    let state = AppState::new(Config::from_env())?;

    // Ctrl+C stops the pipeline at the next stage barrier.
    let cancel = CancellationToken::new();
    let cancel_on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received, stopping after the current stage");
            cancel_on_signal.cancel();
        }
    });

    if path.is_file() {
        if !path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"))
        {
            error!("Not a PDF file: {}", path.display());
            std::process::exit(1);
        }
        match pipeline::run_pipeline(&state, &path, &cancel).await? {
            IngestOutcome::Indexed(id) => info!(document_id = id, "Indexed"),
            IngestOutcome::Duplicate(id) => info!(document_id = id, "Already indexed"),
            IngestOutcome::Empty => info!("Skipped: no pages rendered"),
        }
        state.vectors.flush().ok();
        return Ok(());
    }

    let mut pdfs = Vec::new();
    collect_pdfs(&path, &mut pdfs);
    info!(count = pdfs.len(), dir = %path.display(), "Found PDFs");

    for pdf in &pdfs {
        if cancel.is_cancelled() {
            break;
        }
        // One bad PDF must not abort the rest of the batch.
        match pipeline::run_pipeline(&state, pdf, &cancel).await {
            Ok(IngestOutcome::Indexed(id)) => info!(document_id = id, pdf = %pdf.display(), "Indexed"),
            Ok(IngestOutcome::Duplicate(id)) => {
                info!(document_id = id, pdf = %pdf.display(), "Already indexed")
            }
            Ok(IngestOutcome::Empty) => info!(pdf = %pdf.display(), "Skipped: no pages rendered"),
            Err(e) => error!(pdf = %pdf.display(), error = %e, "Failed to index"),
        }
    }
    state.vectors.flush().ok();
    info!("Done.");
    Ok(())
}
