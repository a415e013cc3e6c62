use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use folio_core::AppState;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::routes;

/// Largest accepted PDF upload.
const MAX_UPLOAD_BYTES: usize = 200 * 1024 * 1024;

pub fn create_app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(routes::health))
        .route("/ingest/pdf", post(routes::ingest::ingest_pdf))
        .route(
            "/search",
            get(routes::search::search_get).post(routes::search::search_post),
        )
        .route("/documents", get(routes::documents::list_documents))
        .route(
            "/documents/{document_id}",
            get(routes::documents::get_document).delete(routes::documents::delete_document),
        )
        .route(
            "/documents/{document_id}/pages/{page_num}/regions",
            get(routes::documents::get_page_regions),
        )
        .route(
            "/render/page/{document_id}/{page_num}",
            get(routes::render::render_page),
        )
        .route(
            "/render/crop/{document_id}/{region_id}",
            get(routes::render::render_crop),
        )
        .route("/chat", post(routes::chat::chat_stateless))
        .route(
            "/chat/sessions",
            get(routes::chat::list_sessions).post(routes::chat::create_session),
        )
        .route(
            "/chat/sessions/{session_id}",
            get(routes::chat::get_session_history),
        )
        .route("/chat/{session_id}", post(routes::chat::chat_with_session))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
