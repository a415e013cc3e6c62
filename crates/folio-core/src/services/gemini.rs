//! Gemini REST plumbing shared by the detector, web search, and chat model.

use std::collections::VecDeque;
use std::sync::Mutex;

use anyhow::{bail, Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::Value;

const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// One message in a Gemini conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Content {
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub parts: Vec<Part>,
}

impl Content {
    pub fn user_text(text: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            parts: vec![Part::text(text)],
        }
    }

    pub fn model_text(text: impl Into<String>) -> Self {
        Self {
            role: "model".to_string(),
            parts: vec![Part::text(text)],
        }
    }
}

/// One part of a message: text, inline image, or a function call/response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inline_data: Option<Blob>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub function_call: Option<FunctionCall>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub function_response: Option<FunctionResponse>,
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::default()
        }
    }

    pub fn png(bytes: &[u8]) -> Self {
        Self {
            inline_data: Some(Blob {
                mime_type: "image/png".to_string(),
                data: BASE64.encode(bytes),
            }),
            ..Self::default()
        }
    }

    pub fn function_response(name: impl Into<String>, response: Value) -> Self {
        Self {
            function_response: Some(FunctionResponse {
                name: name.into(),
                response,
            }),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Blob {
    pub mime_type: String,
    pub data: String,
}

/// A function call emitted by the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    #[serde(default)]
    pub args: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionResponse {
    pub name: String,
    pub response: Value,
}

/// A callable tool advertised to the model.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Tool {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub function_declarations: Option<Vec<FunctionDeclaration>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub google_search: Option<Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FunctionDeclaration {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thinking_config: Option<ThinkingConfig>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ThinkingConfig {
    pub thinking_budget: i32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: &'a [Content],
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<SystemInstruction>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<&'a [Tool]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<&'a GenerationConfig>,
}

#[derive(Debug, Serialize)]
struct SystemInstruction {
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    pub content: Option<Content>,
    pub grounding_metadata: Option<GroundingMetadata>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroundingMetadata {
    #[serde(default)]
    pub web_search_queries: Vec<String>,
    #[serde(default)]
    pub grounding_chunks: Vec<GroundingChunkInfo>,
}

#[derive(Debug, Deserialize)]
pub struct GroundingChunkInfo {
    pub web: Option<WebInfo>,
}

#[derive(Debug, Deserialize)]
pub struct WebInfo {
    pub title: Option<String>,
    pub uri: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

impl GenerateContentResponse {
    /// Concatenated text parts of the first candidate.
    pub fn text(&self) -> String {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|content| {
                content
                    .parts
                    .iter()
                    .filter_map(|p| p.text.as_deref())
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default()
    }

    /// Function calls requested by the first candidate.
    pub fn function_calls(&self) -> Vec<FunctionCall> {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|content| {
                content
                    .parts
                    .iter()
                    .filter_map(|p| p.function_call.clone())
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Thin client for the `generateContent` endpoint.
#[derive(Debug, Clone)]
pub struct GeminiClient {
    http: reqwest::Client,
    api_key: String,
}

impl GeminiClient {
    pub fn new(api_key: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key: api_key.to_string(),
        }
    }

    pub async fn generate(
        &self,
        model: &str,
        contents: &[Content],
        system_instruction: Option<&str>,
        tools: Option<&[Tool]>,
        generation_config: Option<&GenerationConfig>,
    ) -> Result<GenerateContentResponse> {
        let request = GenerateContentRequest {
            contents,
            system_instruction: system_instruction.map(|text| SystemInstruction {
                parts: vec![Part::text(text)],
            }),
            tools,
            generation_config,
        };

        let url = format!("{GEMINI_API_BASE}/{model}:generateContent");
        let response = self
            .http
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await
            .context("Gemini request failed")?;

        if !response.status().is_success() {
            let status = response.status();
            let message = response
                .json::<ApiErrorBody>()
                .await
                .map(|body| body.error.message)
                .unwrap_or_else(|_| status.to_string());
            bail!("Gemini API error: {message}");
        }

        response
            .json::<GenerateContentResponse>()
            .await
            .context("Failed to decode Gemini response")
    }
}

// ============================================================================
// Chat model (agent turns)
// ============================================================================

/// One completed model turn: final text and any tool calls requested.
#[derive(Debug, Clone)]
pub struct ModelTurn {
    pub text: String,
    pub function_calls: Vec<FunctionCall>,
}

enum ChatInner {
    Remote { client: GeminiClient, model: String },
    Scripted(Mutex<VecDeque<ModelTurn>>),
    Unconfigured,
}

/// The generative model driving the agent loop.
pub struct ChatModel {
    inner: ChatInner,
}

impl ChatModel {
    pub const DEFAULT_MODEL: &'static str = "gemini-3-pro-preview";

    pub fn from_api_key(api_key: Option<&str>) -> Self {
        let inner = match api_key {
            Some(key) => ChatInner::Remote {
                client: GeminiClient::new(key),
                model: Self::DEFAULT_MODEL.to_string(),
            },
            None => ChatInner::Unconfigured,
        };
        Self { inner }
    }

    /// A model that replays the given turns in order (tests).
    pub fn scripted(turns: Vec<ModelTurn>) -> Self {
        Self {
            inner: ChatInner::Scripted(Mutex::new(turns.into())),
        }
    }

    pub async fn generate(
        &self,
        contents: &[Content],
        system_instruction: &str,
        tools: &[Tool],
    ) -> Result<ModelTurn> {
        match &self.inner {
            ChatInner::Remote { client, model } => {
                let response = client
                    .generate(model, contents, Some(system_instruction), Some(tools), None)
                    .await?;
                Ok(ModelTurn {
                    text: response.text(),
                    function_calls: response.function_calls(),
                })
            }
            ChatInner::Scripted(queue) => {
                let mut queue = queue.lock().expect("scripted chat lock poisoned");
                queue.pop_front().context("scripted chat model exhausted")
            }
            ChatInner::Unconfigured => {
                bail!("GEMINI_API_KEY is not set; cannot run the chat model")
            }
        }
    }
}
