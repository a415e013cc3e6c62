//! Tool-calling agent over the local index and the web.
//!
//! One request runs up to [`MAX_AGENT_STEPS`] model turns. Each turn either
//! produces the final reply or a set of tool calls; tool output is fed back
//! as a function response and the loop continues. Every tool invocation is
//! recorded in the returned source list for the UI.

pub mod memory;

pub use memory::{ChatMessage, ChatSession, MemoryStore, MessageRole};

use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::content::ContentStore;
use crate::search::{self, SearchMode, SearchRequest};
use crate::services::{
    ChatModel, Content, FunctionCall, FunctionDeclaration, Embedder, Part, Tool, WebSearchClient,
};
use crate::vector::VectorStore;

/// Step cap per request; doubles as the implicit timeout.
pub const MAX_AGENT_STEPS: usize = 10;

/// Messages loaded from session memory before the first turn.
const HISTORY_LIMIT: usize = 20;

/// Longest summary recorded per tool invocation.
const SOURCE_SUMMARY_CHARS: usize = 300;

const SYSTEM_PROMPT: &str = "You are a helpful assistant with access to local PDF search and web \
search. Prefer the local index for questions about the user's documents; use web search for \
current or general information. Cite your sources.";

/// One tool invocation recorded for the UI.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceRef {
    #[serde(rename = "type")]
    pub kind: String,
    pub query: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    pub summary: String,
}

/// The agent's answer plus everything it consulted along the way.
#[derive(Debug, Clone, Serialize)]
pub struct AgentReply {
    pub reply: String,
    pub sources: Vec<SourceRef>,
}

/// Everything a single agent request needs. All handles are request-scoped.
pub struct AgentDeps<'a> {
    pub store: &'a mut ContentStore,
    pub memory: &'a mut MemoryStore,
    pub vectors: &'a dyn VectorStore,
    pub embedder: &'a Embedder,
    pub chat: &'a ChatModel,
    pub web: &'a WebSearchClient,
}

fn tool_declarations() -> Vec<Tool> {
    vec![Tool {
        function_declarations: Some(vec![
            FunctionDeclaration {
                name: "search_local_index".to_string(),
                description: "Search the local PDF index by keyword and semantics. Returns \
                              matching text snippets and figure/table labels from indexed \
                              documents."
                    .to_string(),
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "query": {
                            "type": "string",
                            "description": "Search query (keywords or natural language question)"
                        },
                        "top_k": {
                            "type": "integer",
                            "description": "Maximum number of results to return (default 10)"
                        },
                        "mode": {
                            "type": "string",
                            "description": "hybrid (default), keyword, or semantic"
                        }
                    },
                    "required": ["query"]
                }),
            },
            FunctionDeclaration {
                name: "web_search".to_string(),
                description: "Search the web for current or general information. Use for facts, \
                              recent events, or information not in the local PDF index."
                    .to_string(),
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "query": {
                            "type": "string",
                            "description": "Search question or keywords"
                        }
                    },
                    "required": ["query"]
                }),
            },
        ]),
        google_search: None,
    }]
}

fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

/// Run one agent request. With a `session_id`, prior history is loaded and
/// the user and final model messages are persisted; without one the agent
/// is stateless.
pub async fn run_agent(
    deps: &mut AgentDeps<'_>,
    message: &str,
    selected_region_context: Option<&str>,
    session_id: Option<&str>,
) -> Result<AgentReply> {
    let mut history: Vec<Content> = Vec::new();
    if let Some(session_id) = session_id {
        for stored in deps.memory.recent_messages(session_id, HISTORY_LIMIT)? {
            let content = match stored.role {
                MessageRole::User => Content::user_text(stored.content),
                _ => Content::model_text(stored.content),
            };
            history.push(content);
        }
    }

    let user_content = match selected_region_context {
        Some(context) => {
            format!("Context (selected figure/region): {context}\n\nUser question: {message}")
        }
        None => message.to_string(),
    };
    history.push(Content::user_text(&user_content));
    if let Some(session_id) = session_id {
        deps.memory
            .append_message(session_id, MessageRole::User, &user_content)?;
    }

    tracing::info!(
        message_len = message.len(),
        session = session_id.unwrap_or("stateless"),
        "Starting agent loop"
    );

    let tools = tool_declarations();
    let mut sources: Vec<SourceRef> = Vec::new();
    let mut last_text = String::new();

    for step in 1..=MAX_AGENT_STEPS {
        tracing::debug!(step, messages = history.len(), "Agent step");
        let turn = match deps.chat.generate(&history, SYSTEM_PROMPT, &tools).await {
            Ok(turn) => turn,
            Err(e) => {
                tracing::error!(error = %e, "Chat model call failed");
                return Ok(AgentReply {
                    reply: format!("Error: {e}"),
                    sources,
                });
            }
        };
        last_text = turn.text.clone();

        if turn.function_calls.is_empty() {
            if let Some(session_id) = session_id {
                deps.memory
                    .append_message(session_id, MessageRole::Model, &turn.text)?;
            }
            tracing::info!(steps = step, "Agent loop completed");
            return Ok(AgentReply {
                reply: turn.text,
                sources,
            });
        }

        // Echo the model turn (text + calls) back into the history, then
        // answer each call with a function response.
        let mut parts = Vec::new();
        if !turn.text.is_empty() {
            parts.push(Part::text(&turn.text));
        }
        for call in &turn.function_calls {
            parts.push(Part {
                function_call: Some(call.clone()),
                ..Part::default()
            });
        }
        history.push(Content {
            role: "model".to_string(),
            parts,
        });

        for call in &turn.function_calls {
            tracing::info!(tool = %call.name, "Executing tool");
            let result = execute_tool(deps, call, &mut sources).await;
            history.push(Content {
                role: "user".to_string(),
                parts: vec![Part::function_response(&call.name, json!({ "result": result }))],
            });
        }
    }

    tracing::warn!(max_steps = MAX_AGENT_STEPS, "Agent hit the step cap");
    let reply = if last_text.trim().is_empty() {
        "Stopped after reaching the step limit.".to_string()
    } else {
        format!("{last_text}\n\n[Stopped after reaching the step limit.]")
    };
    if let Some(session_id) = session_id {
        deps.memory
            .append_message(session_id, MessageRole::Model, &reply)?;
    }
    Ok(AgentReply { reply, sources })
}

/// Closed dispatch table. Tool failures come back as tool output so the
/// model can react to them.
async fn execute_tool(
    deps: &mut AgentDeps<'_>,
    call: &FunctionCall,
    sources: &mut Vec<SourceRef>,
) -> String {
    match call.name.as_str() {
        "search_local_index" => {
            let query = call.args["query"].as_str().unwrap_or("").to_string();
            let top_k = call.args["top_k"].as_u64().unwrap_or(10) as usize;
            let mode_name = call.args["mode"].as_str().unwrap_or("hybrid").to_string();
            let mode = match mode_name.as_str() {
                "keyword" => SearchMode::Keyword,
                "semantic" => SearchMode::Semantic,
                _ => SearchMode::Hybrid,
            };
            let result = run_local_search(deps, &query, top_k, mode).await;
            sources.push(SourceRef {
                kind: "local".to_string(),
                query,
                mode: Some(mode_name),
                summary: truncate_chars(&result, SOURCE_SUMMARY_CHARS),
            });
            result
        }
        "web_search" => {
            let query = call.args["query"].as_str().unwrap_or("").to_string();
            let result = run_web_search(deps.web, &query).await;
            sources.push(SourceRef {
                kind: "web".to_string(),
                query,
                mode: None,
                summary: truncate_chars(&result, SOURCE_SUMMARY_CHARS),
            });
            result
        }
        unknown => {
            tracing::warn!(tool = unknown, "Unknown tool requested");
            format!("Unknown tool: {unknown}")
        }
    }
}

async fn run_local_search(
    deps: &mut AgentDeps<'_>,
    query: &str,
    top_k: usize,
    mode: SearchMode,
) -> String {
    let request = SearchRequest::new(query, top_k, mode);
    match search::search(deps.store, deps.vectors, deps.embedder, &request).await {
        Ok(response) => {
            if response.results.is_empty() {
                return "No results found in the local index.".to_string();
            }
            let lines: Vec<String> = response
                .results
                .iter()
                .take(top_k)
                .map(|item| {
                    let kind = match item.result_type {
                        crate::content::ResultType::Text => "text",
                        crate::content::ResultType::Image => "image",
                    };
                    format!(
                        "- [{}] p.{} ({}): {}...",
                        item.document_title,
                        item.page_num,
                        kind,
                        truncate_chars(&item.snippet, 200)
                    )
                })
                .collect();
            format!("Local search results:\n{}", lines.join("\n"))
        }
        Err(e) => {
            tracing::error!(error = %e, "search_local_index failed");
            format!("Search error: {e}")
        }
    }
}

async fn run_web_search(web: &WebSearchClient, query: &str) -> String {
    match web.web_search(query).await {
        Ok(result) => {
            let mut out = if result.text.is_empty() {
                "No response.".to_string()
            } else {
                result.text
            };
            if !result.sources.is_empty() {
                out.push_str("\n\nSources:\n");
                for (i, source) in result.sources.iter().take(5).enumerate() {
                    out.push_str(&format!(
                        "  [{}] {}: {}\n",
                        i + 1,
                        source.title.as_deref().unwrap_or("N/A"),
                        source.uri.as_deref().unwrap_or("N/A"),
                    ));
                }
            }
            out
        }
        Err(e) => {
            tracing::error!(error = %e, "web_search failed");
            format!("Web search error: {e}")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::{ModelTurn, WebSearchResult, WebSource};
    use crate::vector::MemoryVectorStore;

    const DIM: usize = 8;

    fn search_call(query: &str) -> FunctionCall {
        FunctionCall {
            name: "search_local_index".to_string(),
            args: json!({ "query": query }),
        }
    }

    struct Fixture {
        store: ContentStore,
        memory: MemoryStore,
        vectors: MemoryVectorStore,
        embedder: Embedder,
        web: WebSearchClient,
    }

    fn fixture() -> Fixture {
        let store = ContentStore::open_in_memory().unwrap();
        let doc_id = store.insert_document("h", "guide.pdf", 1).unwrap();
        let page_id = store.insert_page(doc_id, 1).unwrap();
        let vector_id = format!("chunk_{doc_id}_{page_id}_0");
        store
            .insert_chunk(
                page_id,
                doc_id,
                0,
                "hello world inside the guide",
                Some(&vector_id),
            )
            .unwrap();
        let vectors = MemoryVectorStore::new(DIM);
        vectors
            .add(&[vector_id], &[vec![0.5; DIM]], &[Default::default()])
            .unwrap();
        Fixture {
            store,
            memory: MemoryStore::open_in_memory().unwrap(),
            vectors,
            embedder: Embedder::mock(DIM),
            web: WebSearchClient::mock(WebSearchResult {
                text: "Web says hello.".to_string(),
                web_search_queries: vec!["hello".to_string()],
                sources: vec![WebSource {
                    title: Some("Example".to_string()),
                    uri: Some("https://example.com".to_string()),
                }],
            }),
        }
    }

    async fn run(
        fx: &mut Fixture,
        chat: ChatModel,
        message: &str,
        session_id: Option<&str>,
    ) -> AgentReply {
        let mut deps = AgentDeps {
            store: &mut fx.store,
            memory: &mut fx.memory,
            vectors: &fx.vectors,
            embedder: &fx.embedder,
            chat: &chat,
            web: &fx.web,
        };
        run_agent(&mut deps, message, None, session_id).await.unwrap()
    }

    #[tokio::test]
    async fn tool_loop_searches_then_answers() {
        let mut fx = fixture();
        let chat = ChatModel::scripted(vec![
            ModelTurn {
                text: String::new(),
                function_calls: vec![search_call("hello")],
            },
            ModelTurn {
                text: "Found it in guide.pdf on page 1.".to_string(),
                function_calls: vec![],
            },
        ]);

        let reply = run(&mut fx, chat, "search my PDFs for hello", None).await;
        assert_eq!(reply.reply, "Found it in guide.pdf on page 1.");
        assert_eq!(reply.sources.len(), 1);
        let source = &reply.sources[0];
        assert_eq!(source.kind, "local");
        assert_eq!(source.query, "hello");
        assert_eq!(source.mode.as_deref(), Some("hybrid"));
        assert!(source.summary.contains("guide.pdf"));
        assert!(source.summary.chars().count() <= 300);
    }

    #[tokio::test]
    async fn web_tool_contributes_a_web_source() {
        let mut fx = fixture();
        let chat = ChatModel::scripted(vec![
            ModelTurn {
                text: String::new(),
                function_calls: vec![FunctionCall {
                    name: "web_search".to_string(),
                    args: json!({ "query": "latest news" }),
                }],
            },
            ModelTurn {
                text: "According to the web, hello.".to_string(),
                function_calls: vec![],
            },
        ]);

        let reply = run(&mut fx, chat, "what is new", None).await;
        assert_eq!(reply.sources.len(), 1);
        assert_eq!(reply.sources[0].kind, "web");
        assert!(reply.sources[0].summary.contains("Web says hello"));
    }

    #[tokio::test]
    async fn session_persists_user_and_final_model_messages_only() {
        let mut fx = fixture();
        let session = fx.memory.create_session("New Chat").unwrap();
        let chat = ChatModel::scripted(vec![
            ModelTurn {
                text: String::new(),
                function_calls: vec![search_call("hello")],
            },
            ModelTurn {
                text: "Done.".to_string(),
                function_calls: vec![],
            },
        ]);

        run(&mut fx, chat, "find hello", Some(&session.id)).await;

        let messages = fx.memory.list_messages(&session.id).unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, MessageRole::User);
        assert_eq!(messages[0].content, "find hello");
        assert_eq!(messages[1].role, MessageRole::Model);
        assert_eq!(messages[1].content, "Done.");
    }

    #[tokio::test]
    async fn stateless_run_persists_nothing() {
        let mut fx = fixture();
        let session = fx.memory.create_session("New Chat").unwrap();
        let chat = ChatModel::scripted(vec![ModelTurn {
            text: "Hi.".to_string(),
            function_calls: vec![],
        }]);
        run(&mut fx, chat, "hi", None).await;
        assert!(fx.memory.list_messages(&session.id).unwrap().is_empty());
    }

    #[tokio::test]
    async fn history_is_loaded_before_the_first_turn() {
        let mut fx = fixture();
        let session = fx.memory.create_session("New Chat").unwrap();
        fx.memory
            .append_message(&session.id, MessageRole::User, "earlier question")
            .unwrap();
        fx.memory
            .append_message(&session.id, MessageRole::Model, "earlier answer")
            .unwrap();

        let chat = ChatModel::scripted(vec![ModelTurn {
            text: "ok".to_string(),
            function_calls: vec![],
        }]);
        run(&mut fx, chat, "follow-up", Some(&session.id)).await;

        // Prior exchange + the new user/model pair.
        let messages = fx.memory.list_messages(&session.id).unwrap();
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[3].content, "ok");
    }

    #[tokio::test]
    async fn region_context_prefixes_the_user_message() {
        let mut fx = fixture();
        let session = fx.memory.create_session("New Chat").unwrap();
        let chat = ChatModel::scripted(vec![ModelTurn {
            text: "noted".to_string(),
            function_calls: vec![],
        }]);
        let mut deps = AgentDeps {
            store: &mut fx.store,
            memory: &mut fx.memory,
            vectors: &fx.vectors,
            embedder: &fx.embedder,
            chat: &chat,
            web: &fx.web,
        };
        run_agent(&mut deps, "what is this", Some("bar chart, page 2"), Some(&session.id))
            .await
            .unwrap();
        let messages = fx.memory.list_messages(&session.id).unwrap();
        assert!(messages[0]
            .content
            .starts_with("Context (selected figure/region): bar chart, page 2"));
        assert!(messages[0].content.contains("what is this"));
    }

    #[tokio::test]
    async fn unknown_tool_is_reported_back_to_the_model() {
        let mut fx = fixture();
        let chat = ChatModel::scripted(vec![
            ModelTurn {
                text: String::new(),
                function_calls: vec![FunctionCall {
                    name: "summon_pdf_wizard".to_string(),
                    args: json!({}),
                }],
            },
            ModelTurn {
                text: "That tool does not exist.".to_string(),
                function_calls: vec![],
            },
        ]);
        let reply = run(&mut fx, chat, "do magic", None).await;
        assert_eq!(reply.reply, "That tool does not exist.");
        assert!(reply.sources.is_empty());
    }

    #[tokio::test]
    async fn step_cap_returns_last_text_with_indicator() {
        let mut fx = fixture();
        let turns: Vec<ModelTurn> = (0..MAX_AGENT_STEPS)
            .map(|i| ModelTurn {
                text: format!("thinking {i}"),
                function_calls: vec![search_call("hello")],
            })
            .collect();
        let chat = ChatModel::scripted(turns);
        let reply = run(&mut fx, chat, "loop forever", None).await;
        assert!(reply.reply.contains("thinking 9"));
        assert!(reply.reply.contains("step limit"));
        assert_eq!(reply.sources.len(), MAX_AGENT_STEPS);
    }

    #[tokio::test]
    async fn model_error_surfaces_as_error_reply() {
        let mut fx = fixture();
        // Empty script: first generate call fails.
        let chat = ChatModel::scripted(vec![]);
        let reply = run(&mut fx, chat, "hello", None).await;
        assert!(reply.reply.starts_with("Error:"));
    }
}
