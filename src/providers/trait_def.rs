use crate::types::{SearchResponse, SearchResult, SearchSource};
use super::classify::run_classified;
use anyhow::Result;

/// 搜尋來源 Trait
#[async_trait::async_trait]
pub trait SourceProvider: Send + Sync {
    /// 來源
    fn source(&self) -> SearchSource;

    /// 實際的請求與解析，失敗時回傳錯誤
    async fn fetch(&self, keyword: &str) -> Result<Vec<SearchResult>>;

    /// 搜尋；所有失敗都被分類成錯誤回應，不會往外丟
    async fn search(&self, keyword: &str) -> SearchResponse {
        run_classified(self.source(), self.fetch(keyword)).await
    }
}
