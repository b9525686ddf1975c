//! Web search tool backed by the DuckDuckGo Instant Answer API.
use std::sync::Arc;
use std::time::Duration;

use adk_rust::prelude::*;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

pub const WEB_SEARCH_TOOL_NAME: &str = "web_search";
pub const DUCKDUCKGO_API_URL: &str = "https://api.duckduckgo.com/";
pub const SEARCH_DEFAULT_MAX_RESULTS: usize = 5;
pub const SEARCH_MAX_RESULTS_LIMIT: usize = 10;
pub const SEARCH_TIMEOUT_SECS: u64 = 20;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchRequest {
    pub query: String,
    pub max_results: usize,
}

pub fn parse_search_request(args: &Value) -> Result<SearchRequest, String> {
    let query = args
        .get("query")
        .and_then(Value::as_str)
        .map(str::trim)
        .unwrap_or_default()
        .to_string();
    if query.is_empty() {
        return Err("'query' is required for web_search".to_string());
    }

    let max_results = match args.get("max_results") {
        None => SEARCH_DEFAULT_MAX_RESULTS,
        Some(raw) => match raw.as_u64() {
            Some(n) if (1..=SEARCH_MAX_RESULTS_LIMIT as u64).contains(&n) => n as usize,
            _ => {
                return Err(format!(
                    "'max_results' must be between 1 and {SEARCH_MAX_RESULTS_LIMIT}"
                ));
            }
        },
    };

    Ok(SearchRequest { query, max_results })
}

/// Related topics are "Title - description"; the leading segment doubles as a title.
fn split_topic_text(text: &str) -> (String, String) {
    match text.split_once(" - ") {
        Some((title, _)) => (title.trim().to_string(), text.trim().to_string()),
        None => (text.trim().to_string(), text.trim().to_string()),
    }
}

fn collect_topics(topics: &[Value], out: &mut Vec<SearchResult>, max_results: usize) {
    for topic in topics {
        if out.len() >= max_results {
            return;
        }
        if let Some(nested) = topic.get("Topics").and_then(Value::as_array) {
            collect_topics(nested, out, max_results);
            continue;
        }
        let text = topic.get("Text").and_then(Value::as_str).unwrap_or_default();
        let url = topic.get("FirstURL").and_then(Value::as_str).unwrap_or_default();
        if text.trim().is_empty() || url.is_empty() {
            continue;
        }
        let (title, snippet) = split_topic_text(text);
        out.push(SearchResult {
            title,
            url: url.to_string(),
            snippet,
        });
    }
}

pub fn parse_instant_answer(body: &Value, max_results: usize) -> Vec<SearchResult> {
    let mut results = Vec::new();

    let abstract_text = body
        .get("AbstractText")
        .and_then(Value::as_str)
        .unwrap_or_default();
    let abstract_url = body
        .get("AbstractURL")
        .and_then(Value::as_str)
        .unwrap_or_default();
    if !abstract_text.trim().is_empty() && !abstract_url.is_empty() {
        let heading = body
            .get("Heading")
            .and_then(Value::as_str)
            .filter(|h| !h.trim().is_empty())
            .unwrap_or(abstract_url);
        results.push(SearchResult {
            title: heading.to_string(),
            url: abstract_url.to_string(),
            snippet: abstract_text.trim().to_string(),
        });
    }

    if let Some(results_array) = body.get("Results").and_then(Value::as_array) {
        collect_topics(results_array, &mut results, max_results);
    }
    if let Some(topics) = body.get("RelatedTopics").and_then(Value::as_array) {
        collect_topics(topics, &mut results, max_results);
    }

    results.truncate(max_results);
    results
}

pub async fn duckduckgo_search(
    client: &reqwest::Client,
    request: &SearchRequest,
) -> Result<Vec<SearchResult>> {
    tracing::debug!(query = %request.query, "running duckduckgo search");
    let body = client
        .get(DUCKDUCKGO_API_URL)
        .query(&[
            ("q", request.query.as_str()),
            ("format", "json"),
            ("no_html", "1"),
            ("skip_disambig", "1"),
        ])
        .send()
        .await
        .context("duckduckgo search request failed")?
        .error_for_status()
        .context("duckduckgo search returned an error status")?
        .json::<Value>()
        .await
        .context("duckduckgo search returned malformed json")?;

    Ok(parse_instant_answer(&body, request.max_results))
}

pub async fn web_search_tool_response(client: &reqwest::Client, args: &Value) -> Value {
    let request = match parse_search_request(args) {
        Ok(request) => request,
        Err(message) => {
            return json!({ "status": "error", "code": "invalid_args", "error": message });
        }
    };

    match duckduckgo_search(client, &request).await {
        Ok(results) => json!({
            "status": "ok",
            "query": request.query,
            "results": results,
        }),
        Err(err) => {
            tracing::warn!(query = %request.query, error = %format!("{err:#}"), "web search failed");
            json!({ "status": "error", "code": "search_failed", "error": format!("{err:#}") })
        }
    }
}

pub fn build_search_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(SEARCH_TIMEOUT_SECS))
        .user_agent(concat!("smallbiz-team/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("failed to build web search http client")
}

pub fn build_web_search_tool(client: reqwest::Client) -> Arc<dyn Tool> {
    Arc::new(FunctionTool::new(
        WEB_SEARCH_TOOL_NAME,
        "Searches the web (DuckDuckGo) for current facts, regulations, and market information. \
         Args: query (required), max_results (1-10, default 5).",
        move |_ctx, args| {
            let client = client.clone();
            async move { Ok(web_search_tool_response(&client, &args).await) }
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_requires_query() {
        let err = parse_search_request(&json!({"query": "   "})).expect_err("blank query");
        assert!(err.contains("'query' is required"));
    }

    #[test]
    fn request_defaults_and_bounds_max_results() {
        let req = parse_search_request(&json!({"query": "GST registration"})).unwrap();
        assert_eq!(req.max_results, SEARCH_DEFAULT_MAX_RESULTS);
        assert!(parse_search_request(&json!({"query": "x", "max_results": 0})).is_err());
        assert!(parse_search_request(&json!({"query": "x", "max_results": 11})).is_err());
        assert_eq!(
            parse_search_request(&json!({"query": "x", "max_results": 3}))
                .unwrap()
                .max_results,
            3
        );
    }

    #[test]
    fn instant_answer_puts_abstract_first_and_flattens_groups() {
        let body = json!({
            "Heading": "Goods and services tax (Canada)",
            "AbstractText": "The GST is a value-added tax.",
            "AbstractURL": "https://en.wikipedia.org/wiki/GST_(Canada)",
            "Results": [],
            "RelatedTopics": [
                {"Text": "HST - Harmonized sales tax", "FirstURL": "https://duckduckgo.com/HST"},
                {"Name": "See also", "Topics": [
                    {"Text": "PST - Provincial sales tax", "FirstURL": "https://duckduckgo.com/PST"}
                ]},
                {"Text": "", "FirstURL": "https://duckduckgo.com/empty"}
            ]
        });

        let results = parse_instant_answer(&body, 5);
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].title, "Goods and services tax (Canada)");
        assert_eq!(results[1].title, "HST");
        assert_eq!(results[1].snippet, "HST - Harmonized sales tax");
        assert_eq!(results[2].url, "https://duckduckgo.com/PST");
    }

    #[test]
    fn instant_answer_respects_max_results() {
        let topics = (0..8)
            .map(|i| json!({"Text": format!("Topic {i}"), "FirstURL": format!("https://d.com/{i}")}))
            .collect::<Vec<_>>();
        let body = json!({ "RelatedTopics": topics });
        assert_eq!(parse_instant_answer(&body, 2).len(), 2);
    }

    #[test]
    fn empty_answer_yields_no_results() {
        assert!(parse_instant_answer(&json!({}), 5).is_empty());
    }

    #[tokio::test]
    async fn invalid_args_never_hit_the_network() {
        let client = build_search_client().expect("client builds");
        let response = web_search_tool_response(&client, &json!({})).await;
        assert_eq!(response["status"], "error");
        assert_eq!(response["code"], "invalid_args");
    }
}
