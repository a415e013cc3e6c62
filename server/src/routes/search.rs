//! Search over the indexed corpus: GET with query params or POST with JSON.

use axum::extract::{Query, State};
use axum::Json;
use folio_core::{search, AppState, SearchMode, SearchRequest, SearchResponse};
use serde::Deserialize;

use crate::error::{AppError, AppResult};

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    q: String,
    #[serde(default = "default_top_k")]
    top_k: usize,
    #[serde(default)]
    mode: SearchMode,
}

fn default_top_k() -> usize {
    20
}

async fn run_search(state: &AppState, request: SearchRequest) -> AppResult<Json<SearchResponse>> {
    if request.query.trim().is_empty() {
        return Err(AppError::BadRequest("Query must not be empty".to_string()));
    }
    let mut store = state.open_content().map_err(AppError::Internal)?;
    let response = search::search(
        &mut store,
        state.vectors.as_ref(),
        &state.embedder,
        &request,
    )
    .await
    .map_err(AppError::Internal)?;
    Ok(Json(response))
}

pub async fn search_get(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> AppResult<Json<SearchResponse>> {
    let request = SearchRequest::new(params.q, params.top_k.clamp(1, 100), params.mode);
    run_search(&state, request).await
}

pub async fn search_post(
    State(state): State<AppState>,
    Json(mut request): Json<SearchRequest>,
) -> AppResult<Json<SearchResponse>> {
    request.top_k = request.top_k.clamp(1, 100);
    run_search(&state, request).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn params_default_to_hybrid_and_twenty() {
        let params: SearchParams = serde_json::from_str(r#"{"q": "hello"}"#).unwrap();
        assert_eq!(params.top_k, 20);
        assert_eq!(params.mode, SearchMode::Hybrid);
    }

    #[test]
    fn mode_parses_from_query_value() {
        let params: SearchParams =
            serde_json::from_str(r#"{"q": "x", "mode": "keyword", "top_k": 5}"#).unwrap();
        assert_eq!(params.mode, SearchMode::Keyword);
        assert_eq!(params.top_k, 5);
    }
}
