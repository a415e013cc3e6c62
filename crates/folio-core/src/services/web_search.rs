//! Web search through a grounded generative call: the model answers and
//! cites the web sources it consulted.

use anyhow::{bail, Result};
use serde_json::json;

use super::gemini::{Content, GeminiClient, Tool};

const GROUNDED_MODEL: &str = "gemini-2.0-flash";

/// One cited web source.
#[derive(Debug, Clone)]
pub struct WebSource {
    pub title: Option<String>,
    pub uri: Option<String>,
}

/// Result of a web-grounded call.
#[derive(Debug, Clone)]
pub struct WebSearchResult {
    pub text: String,
    pub web_search_queries: Vec<String>,
    pub sources: Vec<WebSource>,
}

enum WebInner {
    Remote(GeminiClient),
    Mock(WebSearchResult),
    Unconfigured,
}

/// Grounded web-search client.
pub struct WebSearchClient {
    inner: WebInner,
}

impl WebSearchClient {
    pub fn from_api_key(api_key: Option<&str>) -> Self {
        let inner = match api_key {
            Some(key) => WebInner::Remote(GeminiClient::new(key)),
            None => WebInner::Unconfigured,
        };
        Self { inner }
    }

    /// A client answering every query with the same canned result (tests).
    pub fn mock(result: WebSearchResult) -> Self {
        Self {
            inner: WebInner::Mock(result),
        }
    }

    pub async fn web_search(&self, query: &str) -> Result<WebSearchResult> {
        match &self.inner {
            WebInner::Remote(client) => {
                let tools = [Tool {
                    function_declarations: None,
                    google_search: Some(json!({})),
                }];
                let response = client
                    .generate(
                        GROUNDED_MODEL,
                        &[Content::user_text(query)],
                        None,
                        Some(tools.as_slice()),
                        None,
                    )
                    .await?;

                let text = response.text();
                let mut web_search_queries = Vec::new();
                let mut sources = Vec::new();
                if let Some(meta) = response
                    .candidates
                    .first()
                    .and_then(|c| c.grounding_metadata.as_ref())
                {
                    web_search_queries = meta.web_search_queries.clone();
                    for chunk in &meta.grounding_chunks {
                        if let Some(web) = &chunk.web {
                            sources.push(WebSource {
                                title: web.title.clone(),
                                uri: web.uri.clone(),
                            });
                        }
                    }
                }
                tracing::debug!(
                    queries = web_search_queries.len(),
                    sources = sources.len(),
                    "Web search grounded"
                );
                Ok(WebSearchResult {
                    text,
                    web_search_queries,
                    sources,
                })
            }
            WebInner::Mock(result) => Ok(result.clone()),
            WebInner::Unconfigured => {
                bail!("GEMINI_API_KEY is not set; cannot call web search")
            }
        }
    }
}
