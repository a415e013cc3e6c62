//! Raw PNG responses for page rasters and region crops.

use axum::extract::{Path, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use folio_core::AppState;

use crate::error::{AppError, AppResult};

fn png_response(bytes: Vec<u8>) -> Response {
    ([(header::CONTENT_TYPE, "image/png")], bytes).into_response()
}

pub async fn render_page(
    State(state): State<AppState>,
    Path((document_id, page_num)): Path<(i64, i64)>,
) -> AppResult<Response> {
    let store = state.open_content().map_err(AppError::Internal)?;
    let page = store
        .find_page(document_id, page_num)
        .map_err(AppError::Internal)?
        .ok_or_else(|| AppError::NotFound("Page image not found".to_string()))?;
    let image_path = page
        .image_path
        .ok_or_else(|| AppError::NotFound("Page image not found".to_string()))?;
    let bytes = std::fs::read(&image_path)
        .map_err(|_| AppError::NotFound("Page file not found".to_string()))?;
    Ok(png_response(bytes))
}

pub async fn render_crop(
    State(state): State<AppState>,
    Path((document_id, region_id)): Path<(i64, i64)>,
) -> AppResult<Response> {
    let store = state.open_content().map_err(AppError::Internal)?;
    let region = store
        .get_region(document_id, region_id)
        .map_err(AppError::Internal)?
        .ok_or_else(|| AppError::NotFound("Crop not found".to_string()))?;
    let crop_path = region
        .crop_path
        .ok_or_else(|| AppError::NotFound("Crop not found".to_string()))?;
    let bytes = std::fs::read(&crop_path)
        .map_err(|_| AppError::NotFound("Crop file not found".to_string()))?;
    Ok(png_response(bytes))
}
