use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::creative::CreativeFormat;

const RUNWAY_81298: &str = include_str!("../static/snippets/runway_81298.html");
const PREROLL_81172: &str = include_str!("../static/snippets/preroll_81172.xml");
const TEST_12345: &str = include_str!("../static/snippets/test_12345.html");

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("Snippet not found: {0}")]
    NotFound(String),
    #[error("Snippet transport error: {0}")]
    Transport(String),
    #[error("Snippet fetch timed out after {0} ms")]
    Timeout(u64),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnippetResponse {
    pub snippet_id: String,
    pub snippet_url: String,
    pub snippet_code: String,
    pub format: CreativeFormat,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dimensions: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<u32>,
}

/// Source of raw publisher snippets.
#[async_trait]
pub trait SnippetProvider: Send + Sync {
    async fn fetch_snippet(&self, snippet_url: &str) -> Result<SnippetResponse, FetchError>;
}

/// Snippet id from `/snippet/dm/<id>`, falling back to the last path segment.
pub fn extract_snippet_id(snippet_url: &str) -> Option<String> {
    let parsed = Url::parse(snippet_url).ok()?;
    let segments: Vec<&str> = parsed
        .path_segments()?
        .filter(|s| !s.is_empty())
        .collect();
    match segments.as_slice() {
        ["snippet", "dm", id, ..] => Some((*id).to_string()),
        [.., last] => Some((*last).to_string()),
        [] => None,
    }
}

struct CannedSnippet {
    code: &'static str,
    format: CreativeFormat,
    dimensions: &'static str,
    duration: Option<u32>,
}

/// In-process provider serving a fixed catalogue of snippets.
pub struct MockSnippetProvider {
    snippets: BTreeMap<String, CannedSnippet>,
}

impl Default for MockSnippetProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MockSnippetProvider {
    pub fn new() -> Self {
        let mut snippets = BTreeMap::new();
        snippets.insert(
            "81298".to_string(),
            CannedSnippet {
                code: RUNWAY_81298,
                format: CreativeFormat::Runway,
                dimensions: "320x50",
                duration: None,
            },
        );
        snippets.insert(
            "81172".to_string(),
            CannedSnippet {
                code: PREROLL_81172,
                format: CreativeFormat::EnhancedPreroll,
                // branded canvas size
                dimensions: "300x50",
                duration: Some(15),
            },
        );
        snippets.insert(
            "12345".to_string(),
            CannedSnippet {
                code: TEST_12345,
                format: CreativeFormat::Runway,
                dimensions: "320x50",
                duration: None,
            },
        );
        Self { snippets }
    }

    pub fn snippet_ids(&self) -> Vec<String> {
        self.snippets.keys().cloned().collect()
    }
}

#[async_trait]
impl SnippetProvider for MockSnippetProvider {
    async fn fetch_snippet(&self, snippet_url: &str) -> Result<SnippetResponse, FetchError> {
        log::debug!("Fetching snippet {}", snippet_url);
        let id = extract_snippet_id(snippet_url)
            .ok_or_else(|| FetchError::NotFound(snippet_url.to_string()))?;
        let canned = self
            .snippets
            .get(&id)
            .ok_or_else(|| FetchError::NotFound(id.clone()))?;
        log::info!("Snippet {} retrieved ({} bytes)", id, canned.code.len());
        Ok(SnippetResponse {
            snippet_id: id,
            snippet_url: snippet_url.to_string(),
            snippet_code: canned.code.to_string(),
            format: canned.format,
            dimensions: Some(canned.dimensions.to_string()),
            duration: canned.duration,
        })
    }
}
