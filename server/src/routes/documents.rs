//! Document listing, detail, per-page regions, and deletion.

use axum::extract::{Path, State};
use axum::Json;
use folio_core::{pipeline, AppState};
use serde::Serialize;
use serde_json::{json, Value};

use crate::error::{AppError, AppResult};

#[derive(Debug, Serialize)]
pub struct DocumentListItem {
    id: i64,
    filename: String,
    total_pages: i64,
    storage_path: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PageSummary {
    id: i64,
    page_num: i64,
    has_image: bool,
    has_ocr_text: bool,
}

#[derive(Debug, Serialize)]
pub struct DocumentDetail {
    id: i64,
    filename: String,
    total_pages: i64,
    storage_path: Option<String>,
    pages: Vec<PageSummary>,
}

#[derive(Debug, Serialize)]
pub struct RegionDetail {
    id: i64,
    page_id: i64,
    label: String,
    box_y0: f64,
    box_x0: f64,
    box_y1: f64,
    box_x1: f64,
    crop_path: Option<String>,
    vector_id: Option<String>,
}

pub async fn list_documents(
    State(state): State<AppState>,
) -> AppResult<Json<Vec<DocumentListItem>>> {
    let store = state.open_content().map_err(AppError::Internal)?;
    let documents = store.list_documents().map_err(AppError::Internal)?;
    Ok(Json(
        documents
            .into_iter()
            .map(|d| DocumentListItem {
                id: d.id,
                filename: d.filename,
                total_pages: d.total_pages,
                storage_path: d.storage_path,
            })
            .collect(),
    ))
}

pub async fn get_document(
    State(state): State<AppState>,
    Path(document_id): Path<i64>,
) -> AppResult<Json<DocumentDetail>> {
    let store = state.open_content().map_err(AppError::Internal)?;
    let document = store
        .get_document(document_id)
        .map_err(AppError::Internal)?
        .ok_or_else(|| AppError::NotFound("Document not found".to_string()))?;
    let pages = store.list_pages(document_id).map_err(AppError::Internal)?;

    Ok(Json(DocumentDetail {
        id: document.id,
        filename: document.filename,
        total_pages: document.total_pages,
        storage_path: document.storage_path,
        pages: pages
            .into_iter()
            .map(|p| PageSummary {
                id: p.id,
                page_num: p.page_num,
                has_image: p.image_path.is_some(),
                has_ocr_text: p.ocr_text.as_deref().is_some_and(|t| !t.is_empty()),
            })
            .collect(),
    }))
}

pub async fn get_page_regions(
    State(state): State<AppState>,
    Path((document_id, page_num)): Path<(i64, i64)>,
) -> AppResult<Json<Vec<RegionDetail>>> {
    let store = state.open_content().map_err(AppError::Internal)?;
    let page = store
        .find_page(document_id, page_num)
        .map_err(AppError::Internal)?
        .ok_or_else(|| AppError::NotFound("Page not found".to_string()))?;
    let regions = store.list_regions(page.id).map_err(AppError::Internal)?;

    Ok(Json(
        regions
            .into_iter()
            .map(|r| RegionDetail {
                id: r.id,
                page_id: r.page_id,
                label: r.label,
                box_y0: r.bounds.y0,
                box_x0: r.bounds.x0,
                box_y1: r.bounds.y1,
                box_x1: r.bounds.x1,
                crop_path: r.crop_path,
                vector_id: r.vector_id,
            })
            .collect(),
    ))
}

pub async fn delete_document(
    State(state): State<AppState>,
    Path(document_id): Path<i64>,
) -> AppResult<Json<Value>> {
    let store = state.open_content().map_err(AppError::Internal)?;
    let deleted =
        pipeline::delete_document(&state, &store, document_id).map_err(AppError::Internal)?;
    if !deleted {
        return Err(AppError::NotFound("Document not found".to_string()));
    }
    Ok(Json(json!({ "document_id": document_id, "status": "deleted" })))
}
