//! Search + generative extraction source: web search results are handed to a
//! Gemini model which returns one JSON record per result.

use std::sync::Arc;

use async_trait::async_trait;
use ohub_storage::HttpFetcher;
use reqwest::Url;
use scraper::Html;
use serde::Deserialize;
use serde_json::json;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::raw::{text_or_none, RawRecord};
use crate::{AdapterError, ExternalSource};

pub const DEFAULT_SEARCH_ENDPOINT: &str = "https://www.googleapis.com/customsearch/v1";
pub const DEFAULT_GEMINI_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta/models";
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-pro";

pub const DEFAULT_QUERIES: [&str; 8] = [
    "hackathons 2025 India students",
    "internships 2025 India tech",
    "Google Summer of Code 2025",
    "open source programs 2025",
    "fellowships 2025 India",
    "MLH hackathons 2025",
    "tech internships India 2025",
    "coding competitions 2025",
];

#[derive(Debug, Clone)]
pub struct SearchExtractConfig {
    pub gemini_api_key: Option<String>,
    pub search_api_key: Option<String>,
    pub search_engine_id: Option<String>,
    pub gemini_model: String,
    pub search_endpoint: String,
    pub gemini_endpoint: String,
    pub queries: Vec<String>,
    pub results_per_query: u8,
    pub max_extractions: usize,
}

impl Default for SearchExtractConfig {
    fn default() -> Self {
        Self {
            gemini_api_key: None,
            search_api_key: None,
            search_engine_id: None,
            gemini_model: DEFAULT_GEMINI_MODEL.to_string(),
            search_endpoint: DEFAULT_SEARCH_ENDPOINT.to_string(),
            gemini_endpoint: DEFAULT_GEMINI_ENDPOINT.to_string(),
            queries: DEFAULT_QUERIES.iter().map(|q| q.to_string()).collect(),
            results_per_query: 5,
            max_extractions: 10,
        }
    }
}

impl SearchExtractConfig {
    pub fn from_env() -> Self {
        let key = |name: &str| std::env::var(name).ok().and_then(|v| text_or_none(&v));
        Self {
            gemini_api_key: key("GEMINI_API_KEY"),
            search_api_key: key("GOOGLE_SEARCH_API_KEY"),
            search_engine_id: key("GOOGLE_SEARCH_ENGINE_ID"),
            gemini_model: key("OHUB_GEMINI_MODEL").unwrap_or_else(|| DEFAULT_GEMINI_MODEL.to_string()),
            ..Self::default()
        }
    }

    pub fn is_configured(&self) -> bool {
        self.gemini_api_key.is_some() && self.search_api_key.is_some() && self.search_engine_id.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchHit {
    pub title: String,
    pub link: String,
    pub snippet: String,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<SearchItem>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    #[serde(default)]
    title: String,
    #[serde(default)]
    link: String,
    #[serde(default)]
    snippet: String,
    #[serde(default, rename = "htmlSnippet")]
    html_snippet: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiContent>,
}

#[derive(Debug, Deserialize)]
struct GeminiContent {
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Deserialize)]
struct GeminiPart {
    text: Option<String>,
}

/// Plain text of an HTML fragment, whitespace collapsed.
pub fn fragment_text(html: &str) -> String {
    let fragment = Html::parse_fragment(html);
    fragment
        .root_element()
        .text()
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Slice from the first `{` to the last `}`, which tolerates models wrapping
/// their answer in markdown fences or prose.
pub fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (start < end).then(|| &text[start..=end])
}

pub fn extraction_prompt(hit: &SearchHit) -> String {
    format!(
        r#"Extract structured details about the tech opportunity described by this search result.
Reply with a single JSON object and nothing else, using exactly these keys:
{{
  "name": "opportunity name",
  "organizer": "organizer name",
  "description": "one or two sentences",
  "category": "hackathon|internship|opensource|fellowship",
  "mode": "online|offline|hybrid",
  "level": "beginner|intermediate|advanced",
  "applicationStart": "YYYY-MM-DD or null",
  "applicationEnd": "YYYY-MM-DD or null",
  "eventStart": "YYYY-MM-DD or null",
  "eventEnd": "YYYY-MM-DD or null",
  "location": "city, country or null",
  "country": "country name",
  "isIndiaFocused": true or false,
  "eligibility": ["requirement"],
  "techStack": ["technology"],
  "domains": ["domain"],
  "stipend": "amount or null",
  "prizes": "prize details or null",
  "officialLink": "url",
  "applicationLink": "url or null"
}}

Title: {title}
Link: {link}
Snippet: {snippet}

If the result is not a tech opportunity or lacks enough detail, reply with null."#,
        title = hit.title,
        link = hit.link,
        snippet = hit.snippet,
    )
}

/// Parse the model's reply text into a record, if it contains one.
pub fn parse_extraction_reply(text: &str) -> Option<RawRecord> {
    let json = extract_json_object(text)?;
    match serde_json::from_str::<RawRecord>(json) {
        Ok(record) => Some(record),
        Err(err) => {
            debug!(error = %err, "extraction reply is not a valid record");
            None
        }
    }
}

#[derive(Debug, Clone)]
pub struct SearchExtractSource {
    http: HttpFetcher,
    config: Arc<SearchExtractConfig>,
}

impl SearchExtractSource {
    pub fn new(http: HttpFetcher, config: SearchExtractConfig) -> Self {
        Self {
            http,
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &SearchExtractConfig {
        &self.config
    }

    async fn search(&self, query: &str) -> Result<Vec<SearchHit>, AdapterError> {
        let (Some(key), Some(cx)) = (&self.config.search_api_key, &self.config.search_engine_id) else {
            return Ok(Vec::new());
        };
        let num = self.config.results_per_query.to_string();
        let url = Url::parse_with_params(
            &self.config.search_endpoint,
            [("key", key.as_str()), ("cx", cx.as_str()), ("q", query), ("num", num.as_str())],
        )
        .map_err(|e| AdapterError::Message(format!("invalid search endpoint: {e}")))?;

        let response: SearchResponse = self.http.get_json("web_search", url.as_str()).await?;
        debug!(query, hits = response.items.len(), "search results");
        Ok(response
            .items
            .into_iter()
            .filter(|item| !item.link.is_empty())
            .map(|item| SearchHit {
                snippet: match item.html_snippet.as_deref() {
                    Some(html) => fragment_text(html),
                    None => item.snippet,
                },
                title: item.title,
                link: item.link,
            })
            .collect())
    }

    async fn extract(&self, hit: &SearchHit) -> Result<Option<RawRecord>, AdapterError> {
        let Some(key) = &self.config.gemini_api_key else {
            return Ok(None);
        };
        let endpoint = format!(
            "{}/{}:generateContent",
            self.config.gemini_endpoint.trim_end_matches('/'),
            self.config.gemini_model
        );
        let url = Url::parse_with_params(&endpoint, [("key", key.as_str())])
            .map_err(|e| AdapterError::Message(format!("invalid extraction endpoint: {e}")))?;
        let body = json!({
            "contents": [{ "parts": [{ "text": extraction_prompt(hit) }] }]
        });

        let response: GeminiResponse = self.http.post_json("extraction", url.as_str(), &body).await?;
        let text = response
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .and_then(|c| c.parts.into_iter().next())
            .and_then(|p| p.text)
            .unwrap_or_default();
        if text.trim().is_empty() {
            debug!(title = %hit.title, "empty extraction reply");
            return Ok(None);
        }
        Ok(parse_extraction_reply(&text))
    }
}

#[async_trait]
impl ExternalSource for SearchExtractSource {
    fn source_id(&self) -> &'static str {
        "search-extract"
    }

    async fn fetch_raw_records(&self) -> Result<Vec<RawRecord>, AdapterError> {
        if !self.config.is_configured() {
            warn!("search/extraction API keys not configured; skipping external fetch");
            return Ok(Vec::new());
        }

        let mut searches = JoinSet::new();
        for (idx, query) in self.config.queries.iter().cloned().enumerate() {
            let source = self.clone();
            searches.spawn(async move { (idx, source.search(&query).await, query) });
        }

        let mut failures = 0usize;
        let mut batches = Vec::new();
        while let Some(joined) = searches.join_next().await {
            let (idx, result, query) = joined.map_err(|e| AdapterError::Message(e.to_string()))?;
            match result {
                Ok(hits) => batches.push((idx, hits)),
                Err(err) => {
                    warn!(query = %query, error = %err, "search query failed");
                    failures += 1;
                }
            }
        }
        if failures > 0 && failures == self.config.queries.len() {
            return Err(AdapterError::Message(format!(
                "all {failures} search queries failed"
            )));
        }

        batches.sort_by_key(|(idx, _)| *idx);
        let hits = batches
            .into_iter()
            .flat_map(|(_, hits)| hits)
            .take(self.config.max_extractions)
            .collect::<Vec<_>>();
        if hits.is_empty() {
            warn!("search returned no results");
            return Ok(Vec::new());
        }
        info!(hits = hits.len(), "extracting records from search results");

        let mut extractions = JoinSet::new();
        for (idx, hit) in hits.into_iter().enumerate() {
            let source = self.clone();
            extractions.spawn(async move {
                let result = source.extract(&hit).await;
                (idx, result, hit.title)
            });
        }

        let mut records = Vec::new();
        while let Some(joined) = extractions.join_next().await {
            let (idx, result, title) = joined.map_err(|e| AdapterError::Message(e.to_string()))?;
            match result {
                Ok(Some(record)) => records.push((idx, record)),
                Ok(None) => debug!(title = %title, "no record extracted"),
                Err(err) => warn!(title = %title, error = %err, "extraction failed"),
            }
        }
        records.sort_by_key(|(idx, _)| *idx);
        info!(records = records.len(), "external records extracted");
        Ok(records.into_iter().map(|(_, r)| r).collect())
    }
}
