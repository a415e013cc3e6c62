//! PDF upload: multipart `file` in, indexed document id out.

use axum::extract::{Multipart, State};
use axum::Json;
use folio_core::{pipeline, AppState, IngestOutcome};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::{AppError, AppResult};

pub async fn ingest_pdf(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> AppResult<Json<Value>> {
    let mut filename: Option<String> = None;
    let mut content: Option<Vec<u8>> = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(format!("Failed to read upload: {e}")))?
    {
        if field.name() == Some("file") {
            filename = field.file_name().map(str::to_string);
            content = Some(
                field
                    .bytes()
                    .await
                    .map_err(|e| AppError::BadRequest(format!("Failed to read file: {e}")))?
                    .to_vec(),
            );
        }
    }

    let filename = filename.unwrap_or_default();
    if !filename.to_lowercase().ends_with(".pdf") {
        return Err(AppError::BadRequest("File must be a PDF".to_string()));
    }
    let content = content.filter(|c| !c.is_empty()).ok_or_else(|| {
        AppError::BadRequest("Failed to read file".to_string())
    })?;

    // Spool to a temp file carrying the original basename, then run the pipeline.
    let safe_name = std::path::Path::new(&filename)
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "upload.pdf".to_string());
    let tmp_dir = std::env::temp_dir().join(format!("folio-upload-{}", Uuid::new_v4()));
    std::fs::create_dir_all(&tmp_dir).map_err(|e| AppError::Internal(e.into()))?;
    let tmp_path = tmp_dir.join(&safe_name);
    std::fs::write(&tmp_path, &content).map_err(|e| AppError::Internal(e.into()))?;

    let result = pipeline::run_pipeline(&state, &tmp_path, &CancellationToken::new()).await;
    let _ = std::fs::remove_dir_all(&tmp_dir);

    match result {
        Ok(IngestOutcome::Indexed(document_id)) | Ok(IngestOutcome::Duplicate(document_id)) => {
            Ok(Json(json!({ "document_id": document_id, "status": "indexed" })))
        }
        Ok(IngestOutcome::Empty) => Ok(Json(json!({ "detail": "Skipped (duplicate or empty)" }))),
        Err(e) => Err(AppError::Internal(e)),
    }
}
