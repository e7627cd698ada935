use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::{AppError, Result};
use crate::llm::{check_status, http_client};

pub const MAX_SEARCH_RESULTS: usize = 5;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResult {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

#[async_trait]
pub trait WebSearch: Send + Sync {
    async fn search(&self, query: &str) -> Result<Vec<SearchResult>>;
}

/// DuckDuckGo instant-answer API. Needs no API key.
pub struct DuckDuckGoSearch {
    client: Client,
    base_url: String,
}

impl DuckDuckGoSearch {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let client = http_client(config).map_err(|e| AppError::provider("DuckDuckGo", e))?;
        Ok(Self::new(client, config.endpoints.search_url.clone()))
    }
}

#[async_trait]
impl WebSearch for DuckDuckGoSearch {
    async fn search(&self, query: &str) -> Result<Vec<SearchResult>> {
        let url = format!(
            "{}/?q={}&format=json&no_redirect=1&no_html=1",
            self.base_url.trim_end_matches('/'),
            urlencoding::encode(query)
        );
        debug!("Searching DuckDuckGo for {:?}", query);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| AppError::provider("DuckDuckGo", e))?;
        let response = check_status(response)
            .await
            .map_err(|e| AppError::provider("DuckDuckGo", e))?;

        let payload: Value = response
            .json()
            .await
            .map_err(|e| AppError::provider("DuckDuckGo", e))?;
        let mut results = Vec::new();

        if let Some(abstract_text) = payload.get("AbstractText").and_then(|v| v.as_str()) {
            if let Some(url) = payload.get("AbstractURL").and_then(|v| v.as_str()) {
                if !abstract_text.is_empty() && !url.is_empty() {
                    let heading = payload
                        .get("Heading")
                        .and_then(|v| v.as_str())
                        .filter(|h| !h.is_empty())
                        .unwrap_or(abstract_text);
                    results.push(SearchResult {
                        title: heading.to_string(),
                        url: url.to_string(),
                        snippet: abstract_text.to_string(),
                    });
                }
            }
        }

        if let Some(items) = payload.get("Results").and_then(|v| v.as_array()) {
            extract_topics(items, &mut results);
        }
        if let Some(items) = payload.get("RelatedTopics").and_then(|v| v.as_array()) {
            extract_topics(items, &mut results);
        }

        results.truncate(MAX_SEARCH_RESULTS);
        Ok(results)
    }
}

fn extract_topics(items: &[Value], results: &mut Vec<SearchResult>) {
    for item in items {
        if let Some(topics) = item.get("Topics").and_then(|v| v.as_array()) {
            extract_topics(topics, results);
            continue;
        }
        let text = item.get("Text").and_then(|v| v.as_str()).unwrap_or("");
        let url = item.get("FirstURL").and_then(|v| v.as_str()).unwrap_or("");
        if text.is_empty() || url.is_empty() {
            continue;
        }
        results.push(SearchResult {
            title: text.split(" - ").next().unwrap_or(text).to_string(),
            url: url.to_string(),
            snippet: text.to_string(),
        });
    }
}

/// Search and flatten the results into prompt context. Never fails: errors
/// come back as text so the conversation can carry on.
pub async fn search_text(search: &dyn WebSearch, query: &str) -> String {
    match search.search(query).await {
        Ok(results) if results.is_empty() => {
            format!("No search results found for '{}'.", query)
        }
        Ok(results) => results
            .iter()
            .take(MAX_SEARCH_RESULTS)
            .map(|r| format!("{}\n{}\n{}", r.title, r.snippet, r.url))
            .collect::<Vec<_>>()
            .join("\n\n"),
        Err(e) => {
            warn!("Web search failed: {}", e);
            format!("Error performing web search: {}", e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_search_collects_abstract_and_nested_topics() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("q", "rust language"))
            .and(query_param("format", "json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "Heading": "Rust",
                "AbstractText": "Rust is a systems programming language.",
                "AbstractURL": "https://en.wikipedia.org/wiki/Rust",
                "RelatedTopics": [
                    {"Text": "Cargo - Rust package manager", "FirstURL": "https://duckduckgo.com/Cargo"},
                    {"Name": "Tools", "Topics": [
                        {"Text": "Clippy - Rust linter", "FirstURL": "https://duckduckgo.com/Clippy"}
                    ]},
                    {"Text": "", "FirstURL": ""}
                ]
            })))
            .mount(&server)
            .await;

        let search = DuckDuckGoSearch::new(Client::new(), server.uri());
        let results = search.search("rust language").await.unwrap();

        assert_eq!(results.len(), 3);
        assert_eq!(results[0].title, "Rust");
        assert_eq!(results[1].title, "Cargo");
        assert_eq!(results[2].url, "https://duckduckgo.com/Clippy");
    }

    #[tokio::test]
    async fn test_search_caps_results() {
        let server = MockServer::start().await;
        let topics: Vec<Value> = (0..12)
            .map(|i| json!({"Text": format!("Topic {}", i), "FirstURL": format!("https://x/{}", i)}))
            .collect();
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"RelatedTopics": topics})))
            .mount(&server)
            .await;

        let search = DuckDuckGoSearch::new(Client::new(), server.uri());
        assert_eq!(search.search("many").await.unwrap().len(), MAX_SEARCH_RESULTS);
    }

    #[tokio::test]
    async fn test_search_text_reports_errors_as_text() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let search = DuckDuckGoSearch::new(Client::new(), server.uri());
        let text = search_text(&search, "anything").await;
        assert!(text.starts_with("Error performing web search:"));
        assert!(text.contains("503"));
    }

    #[tokio::test]
    async fn test_search_text_without_results() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"RelatedTopics": []})))
            .mount(&server)
            .await;

        let search = DuckDuckGoSearch::new(Client::new(), server.uri());
        assert_eq!(
            search_text(&search, "obscure").await,
            "No search results found for 'obscure'."
        );
    }
}
