//! Reaction asset lookup and download
//!
//! A reply can be followed by a reaction image found by keyword. Every
//! step degrades to "no reaction" on failure — a missing sticker is
//! never worth failing a reply over. Downloads land in a
//! [`NamedTempFile`], so the artifact is removed when the handle drops
//! no matter which path the caller takes.

use std::io::Write;

use serde::Deserialize;
use tempfile::NamedTempFile;

/// Search response: `{code: 200, data: {url}}` on success
#[derive(Debug, Deserialize)]
struct SearchResponse {
    code: i64,
    data: Option<SearchData>,
}

#[derive(Debug, Deserialize)]
struct SearchData {
    url: String,
}

/// Client for the keyword → image search service
pub struct ReactionFetcher {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl ReactionFetcher {
    /// Create a fetcher for the given search endpoint
    #[must_use]
    pub fn new(endpoint: String, api_key: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint,
            api_key,
        }
    }

    /// Resolve `keyword` to an image URL, or `None` when the service has
    /// nothing (or fails)
    pub async fn resolve_url(&self, keyword: &str) -> Option<String> {
        if keyword.is_empty() {
            return None;
        }

        tracing::debug!(keyword, "searching reaction image");
        let response = match self
            .http
            .get(&self.endpoint)
            .query(&[("key", self.api_key.as_str()), ("msg", keyword)])
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(error = %e, "reaction search request failed");
                return None;
            }
        };

        let body: SearchResponse = match response.json().await {
            Ok(body) => body,
            Err(e) => {
                tracing::warn!(error = %e, "reaction search response unreadable");
                return None;
            }
        };

        if body.code != 200 {
            tracing::warn!(code = body.code, keyword, "reaction search returned no match");
            return None;
        }
        body.data.map(|data| data.url)
    }

    /// Download `url` into a temp file that deletes itself on drop
    pub async fn download(&self, url: &str) -> Option<NamedTempFile> {
        tracing::debug!(url, "downloading reaction image");
        let bytes = match self.http.get(url).send().await {
            Ok(response) if response.status().is_success() => match response.bytes().await {
                Ok(bytes) => bytes,
                Err(e) => {
                    tracing::warn!(error = %e, "reaction download read failed");
                    return None;
                }
            },
            Ok(response) => {
                tracing::warn!(status = %response.status(), "reaction download rejected");
                return None;
            }
            Err(e) => {
                tracing::warn!(error = %e, "reaction download request failed");
                return None;
            }
        };

        let mut file = match tempfile::Builder::new()
            .prefix("murmur-reaction-")
            .suffix(&format!(".{}", url_extension(url)))
            .tempfile()
        {
            Ok(file) => file,
            Err(e) => {
                tracing::warn!(error = %e, "cannot create reaction temp file");
                return None;
            }
        };

        if let Err(e) = file.write_all(&bytes).and_then(|()| file.flush()) {
            tracing::warn!(error = %e, "cannot write reaction temp file");
            return None;
        }
        Some(file)
    }
}

/// File extension from a URL path, defaulting to `jpg`
fn url_extension(url: &str) -> &str {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let candidate = path.rsplit('/').next().and_then(|name| {
        let (_, ext) = name.rsplit_once('.')?;
        ((1..=4).contains(&ext.len()) && ext.chars().all(|c| c.is_ascii_alphanumeric()))
            .then_some(ext)
    });
    candidate.unwrap_or("jpg")
}
