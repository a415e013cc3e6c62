//! Chat routes: stateless and per-session agent runs plus session management.

use axum::extract::{Path, State};
use axum::Json;
use folio_core::agent::{run_agent, AgentDeps, AgentReply};
use folio_core::AppState;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub selected_region_context: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CreateSessionResponse {
    session_id: String,
    title: String,
}

#[derive(Debug, Serialize)]
pub struct SessionListItem {
    session_id: String,
    title: Option<String>,
    created_at: String,
}

#[derive(Debug, Serialize)]
pub struct MessageSchema {
    role: String,
    content: String,
    timestamp: String,
}

#[derive(Debug, Serialize)]
pub struct SessionHistoryResponse {
    session_id: String,
    messages: Vec<MessageSchema>,
}

async fn run_chat(
    state: &AppState,
    body: &ChatRequest,
    session_id: Option<&str>,
) -> AppResult<Json<AgentReply>> {
    let mut store = state.open_content().map_err(AppError::Internal)?;
    let mut memory = state.open_memory().map_err(AppError::Internal)?;
    let mut deps = AgentDeps {
        store: &mut store,
        memory: &mut memory,
        vectors: state.vectors.as_ref(),
        embedder: &state.embedder,
        chat: &state.chat,
        web: &state.web,
    };
    let reply = run_agent(
        &mut deps,
        &body.message,
        body.selected_region_context.as_deref(),
        session_id,
    )
    .await
    .map_err(AppError::Internal)?;
    Ok(Json(reply))
}

pub async fn chat_stateless(
    State(state): State<AppState>,
    Json(body): Json<ChatRequest>,
) -> AppResult<Json<AgentReply>> {
    run_chat(&state, &body, None).await
}

pub async fn chat_with_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(body): Json<ChatRequest>,
) -> AppResult<Json<AgentReply>> {
    let memory = state.open_memory().map_err(AppError::Internal)?;
    if memory
        .get_session(&session_id)
        .map_err(AppError::Internal)?
        .is_none()
    {
        return Err(AppError::NotFound("Session not found".to_string()));
    }
    drop(memory);
    run_chat(&state, &body, Some(&session_id)).await
}

pub async fn list_sessions(
    State(state): State<AppState>,
) -> AppResult<Json<Vec<SessionListItem>>> {
    let memory = state.open_memory().map_err(AppError::Internal)?;
    let sessions = memory.list_sessions().map_err(AppError::Internal)?;
    Ok(Json(
        sessions
            .into_iter()
            .map(|s| SessionListItem {
                session_id: s.id,
                title: s.title,
                created_at: s.created_at,
            })
            .collect(),
    ))
}

pub async fn create_session(
    State(state): State<AppState>,
) -> AppResult<Json<CreateSessionResponse>> {
    let memory = state.open_memory().map_err(AppError::Internal)?;
    let session = memory.create_session("New Chat").map_err(AppError::Internal)?;
    Ok(Json(CreateSessionResponse {
        session_id: session.id,
        title: session.title.unwrap_or_else(|| "New Chat".to_string()),
    }))
}

pub async fn get_session_history(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> AppResult<Json<SessionHistoryResponse>> {
    let memory = state.open_memory().map_err(AppError::Internal)?;
    if memory
        .get_session(&session_id)
        .map_err(AppError::Internal)?
        .is_none()
    {
        return Err(AppError::NotFound("Session not found".to_string()));
    }
    let messages = memory
        .list_messages(&session_id)
        .map_err(AppError::Internal)?;
    Ok(Json(SessionHistoryResponse {
        session_id,
        messages: messages
            .into_iter()
            .map(|m| MessageSchema {
                role: m.role.as_str().to_string(),
                content: m.content,
                timestamp: m.timestamp,
            })
            .collect(),
    }))
}
