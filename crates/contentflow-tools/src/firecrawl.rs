use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use contentflow_types::ContentflowError;

use crate::SearchTool;

const DEFAULT_LIMIT: u32 = 5;

// ---------------------------------------------------------------------------
// FirecrawlSearchTool
// ---------------------------------------------------------------------------

/// Web search through the Firecrawl `/v1/search` endpoint.
#[derive(Debug)]
pub struct FirecrawlSearchTool {
    api_key: String,
    client: reqwest::Client,
    base_url: String,
    limit: u32,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    data: Vec<SearchHit>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    #[serde(default)]
    url: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    markdown: Option<String>,
}

impl FirecrawlSearchTool {
    pub fn new(api_key: String) -> Self {
        Self {
            api_key,
            client: reqwest::Client::new(),
            base_url: "https://api.firecrawl.dev".to_string(),
            limit: DEFAULT_LIMIT,
        }
    }

    pub fn from_env() -> Result<Self, ContentflowError> {
        let key = std::env::var("FIRECRAWL_API_KEY").map_err(|_| {
            ContentflowError::ConfigurationError("FIRECRAWL_API_KEY is not set".into())
        })?;
        Ok(Self::new(key))
    }

    pub fn with_base_url(mut self, url: String) -> Self {
        self.base_url = url.trim_end_matches('/').to_string();
        self
    }

    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = limit.max(1);
        self
    }

    fn search_error(&self, message: String, retryable: bool) -> ContentflowError {
        ContentflowError::SearchError {
            tool: "firecrawl".into(),
            message,
            retryable,
        }
    }
}

fn render_hits(hits: &[SearchHit]) -> String {
    let mut out = String::new();
    for (i, hit) in hits.iter().enumerate() {
        if i > 0 {
            out.push_str("\n\n");
        }
        out.push_str(&format!("## {}\n", hit.title.as_deref().unwrap_or(&hit.url)));
        out.push_str(&hit.url);
        if let Some(desc) = hit.description.as_deref().filter(|d| !d.is_empty()) {
            out.push('\n');
            out.push_str(desc);
        }
        if let Some(md) = hit.markdown.as_deref().filter(|m| !m.is_empty()) {
            out.push_str("\n\n");
            out.push_str(md.trim());
        }
    }
    out
}

#[async_trait]
impl SearchTool for FirecrawlSearchTool {
    fn name(&self) -> &str {
        "firecrawl"
    }

    async fn search(&self, query: &str) -> contentflow_types::Result<String> {
        let body = json!({
            "query": query,
            "limit": self.limit,
        });

        let resp = self
            .client
            .post(format!("{}/v1/search", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| self.search_error(e.to_string(), true))?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| self.search_error(e.to_string(), true))?;

        if !status.is_success() {
            let retryable = status.as_u16() == 429 || status.is_server_error();
            return Err(self.search_error(format!("HTTP {}: {}", status.as_u16(), text), retryable));
        }

        let parsed: SearchResponse = serde_json::from_str(&text)
            .map_err(|e| self.search_error(format!("invalid response: {e}"), false))?;

        if !parsed.success {
            return Err(self.search_error(
                parsed.error.unwrap_or_else(|| "search reported failure".into()),
                false,
            ));
        }

        tracing::debug!(query, hits = parsed.data.len(), "firecrawl search");
        Ok(render_hits(&parsed.data))
    }
}
