//! `web_search` / `web_fetch`: "network call via provider-specific
//! grounding or an HTTP fetcher." We implement the HTTP-fetcher half — a
//! provider that wants to ground through its own search API would swap in a
//! different `WebAccess` impl without touching the dispatcher.

use async_trait::async_trait;

const FETCH_BYTE_CAP: usize = 200_000;

#[async_trait]
pub trait WebAccess: Send + Sync {
    async fn search(&self, query: &str) -> Result<String, String>;
    async fn fetch(&self, url: &str) -> Result<String, String>;
}

/// Fetches pages over HTTP(S); `search` queries a configurable search
/// endpoint (default: DuckDuckGo's HTML-only results page, which needs no
/// API key) and returns its raw body for the model to read.
pub struct ReqwestWebAccess {
    client: reqwest::Client,
    search_base_url: String,
}

impl ReqwestWebAccess {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
            search_base_url: "https://html.duckduckgo.com/html/".to_string(),
        }
    }

    pub fn with_search_base_url(mut self, url: impl Into<String>) -> Self {
        self.search_base_url = url.into();
        self
    }

    fn truncate(body: String) -> String {
        if body.len() > FETCH_BYTE_CAP {
            let mut cut = FETCH_BYTE_CAP;
            while !body.is_char_boundary(cut) {
                cut -= 1;
            }
            format!("{}...\n[truncated, {} total bytes]", &body[..cut], body.len())
        } else {
            body
        }
    }
}

impl Default for ReqwestWebAccess {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WebAccess for ReqwestWebAccess {
    async fn search(&self, query: &str) -> Result<String, String> {
        let resp = self
            .client
            .get(&self.search_base_url)
            .query(&[("q", query)])
            .send()
            .await
            .map_err(|e| e.to_string())?;
        if !resp.status().is_success() {
            return Err(format!("search request failed: HTTP {}", resp.status()));
        }
        let body = resp.text().await.map_err(|e| e.to_string())?;
        Ok(Self::truncate(body))
    }

    async fn fetch(&self, url: &str) -> Result<String, String> {
        let parsed = reqwest::Url::parse(url).map_err(|e| format!("invalid url: {e}"))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(format!("unsupported scheme: {}", parsed.scheme()));
        }
        let resp = self.client.get(parsed).send().await.map_err(|e| e.to_string())?;
        if !resp.status().is_success() {
            return Err(format!("fetch failed: HTTP {}", resp.status()));
        }
        let body = resp.text().await.map_err(|e| e.to_string())?;
        Ok(Self::truncate(body))
    }
}
