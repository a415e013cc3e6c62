pub mod chat;
pub mod documents;
pub mod ingest;
pub mod render;
pub mod search;

use axum::Json;
use serde_json::{json, Value};

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
