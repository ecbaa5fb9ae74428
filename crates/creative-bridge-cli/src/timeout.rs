use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use creative_bridge_core::provider::{FetchError, SnippetProvider, SnippetResponse};

/// Bounds every fetch of the wrapped provider.
pub struct TimeoutSnippetProvider {
    inner: Arc<dyn SnippetProvider>,
    timeout: Duration,
}

impl TimeoutSnippetProvider {
    pub fn new(inner: Arc<dyn SnippetProvider>, timeout: Duration) -> Self {
        Self { inner, timeout }
    }
}

#[async_trait]
impl SnippetProvider for TimeoutSnippetProvider {
    async fn fetch_snippet(&self, snippet_url: &str) -> Result<SnippetResponse, FetchError> {
        match tokio::time::timeout(self.timeout, self.inner.fetch_snippet(snippet_url)).await {
            Ok(result) => result,
            Err(_) => {
                log::warn!("Snippet fetch timed out: {}", snippet_url);
                Err(FetchError::Timeout(self.timeout.as_millis() as u64))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use creative_bridge_core::provider::MockSnippetProvider;

    struct Stalled;

    #[async_trait]
    impl SnippetProvider for Stalled {
        async fn fetch_snippet(&self, _snippet_url: &str) -> Result<SnippetResponse, FetchError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Err(FetchError::Transport("unreachable".to_string()))
        }
    }

    #[tokio::test]
    async fn slow_fetch_becomes_timeout() {
        let provider = TimeoutSnippetProvider::new(Arc::new(Stalled), Duration::from_millis(20));
        let err = provider
            .fetch_snippet("https://snippet.kargo.com/snippet/dm/1")
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Timeout(20)));
    }

    #[tokio::test]
    async fn fast_fetch_passes_through() {
        let provider = TimeoutSnippetProvider::new(
            Arc::new(MockSnippetProvider::new()),
            Duration::from_secs(5),
        );
        let snippet = provider
            .fetch_snippet("https://snippet.kargo.com/snippet/dm/12345")
            .await
            .unwrap();
        assert_eq!(snippet.snippet_id, "12345");
    }
}
