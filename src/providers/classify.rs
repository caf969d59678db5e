use crate::error::FetchError;
use crate::types::{SearchResponse, SearchResult, SearchSource};
use anyhow::Result;
use std::future::Future;
use tracing::{error, info, warn};

/// 執行 provider 的搜尋，把失敗轉成帶來源標籤的錯誤回應
pub async fn run_classified<F>(source: SearchSource, fut: F) -> SearchResponse
where
    F: Future<Output = Result<Vec<SearchResult>>>,
{
    match fut.await {
        Ok(results) => {
            info!(source = %source, count = results.len(), "找到結果");
            SearchResponse::ok(source, results)
        }
        Err(e) => {
            let kind = FetchError::classify(&e);
            match &kind {
                FetchError::Timeout => warn!(source = %source, "請求逾時"),
                FetchError::Network(msg) => warn!(source = %source, error = %msg, "網路錯誤"),
                FetchError::Parse(msg) | FetchError::Unclassified(msg) => {
                    error!(source = %source, error = %msg, "未知錯誤")
                }
            }
            SearchResponse::error(source, kind.user_message())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_success_passes_results_through() {
        let results = vec![SearchResult::new(SearchSource::Vndb, "v1", "t", "u")];
        let response = run_classified(SearchSource::Vndb, async { Ok(results.clone()) }).await;
        assert_eq!(response, SearchResponse::ok(SearchSource::Vndb, results));
    }

    #[tokio::test]
    async fn test_timeout_classification() {
        let response = run_classified(SearchSource::Fanza, async {
            Err(anyhow::Error::new(FetchError::Timeout).context("search page"))
        })
        .await;
        assert_eq!(response, SearchResponse::error(SearchSource::Fanza, "timeout"));
    }

    #[tokio::test]
    async fn test_other_failures_are_truncated() {
        let response = run_classified(SearchSource::DLsite, async {
            Err(anyhow::anyhow!("unexpected markup in the search page"))
        })
        .await;
        assert_eq!(response.source, SearchSource::DLsite);
        assert_eq!(response.outcome, Err("error: unexpected markup in".to_string()));
    }
}
