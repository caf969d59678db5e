use crate::config::{AppConfig, Endpoints};
use crate::fetcher::{RequestOptions, ResilientClient};
use crate::providers::trait_def::SourceProvider;
use crate::types::{SearchResult, SearchSource};
use anyhow::{Context, Result};
use reqwest::header::USER_AGENT;
use serde::Deserialize;
use std::sync::Arc;

const FIELDS: &str = "id, title, titles.title, titles.lang, image.url";

#[derive(Debug, Deserialize)]
struct VndbResponse {
    #[serde(default)]
    results: Vec<VndbItem>,
}

#[derive(Debug, Deserialize)]
struct VndbItem {
    #[serde(default)]
    id: String,
    title: Option<String>,
    #[serde(default)]
    titles: Vec<VndbTitle>,
    image: Option<VndbImage>,
}

#[derive(Debug, Deserialize)]
struct VndbTitle {
    lang: Option<String>,
    title: Option<String>,
}

#[derive(Debug, Deserialize)]
struct VndbImage {
    url: Option<String>,
}

/// VNDB JSON API
pub struct VndbProvider {
    client: Arc<ResilientClient>,
    endpoints: Endpoints,
    user_agent: String,
    max_results: usize,
}

impl VndbProvider {
    pub fn new(client: Arc<ResilientClient>, config: &AppConfig) -> Self {
        Self {
            client,
            endpoints: config.endpoints.clone(),
            user_agent: config.vndb_user_agent.clone(),
            max_results: config.limits.max_results,
        }
    }

    fn payload(&self, keyword: &str) -> serde_json::Value {
        serde_json::json!({
            "filters": ["search", "=", keyword],
            "fields": FIELDS,
            "results": self.max_results,
        })
    }
}

#[async_trait::async_trait]
impl SourceProvider for VndbProvider {
    fn source(&self) -> SearchSource {
        SearchSource::Vndb
    }

    async fn fetch(&self, keyword: &str) -> Result<Vec<SearchResult>> {
        let options = RequestOptions::new()
            .with_header(USER_AGENT, &self.user_agent)
            .with_json(self.payload(keyword))
            .retry_non_idempotent();

        let body = self
            .client
            .post(&self.endpoints.vndb_api, &options)
            .await?
            .error_for_status()?
            .text()
            .await
            .context("讀取 VNDB 回應失敗")?;

        parse_response(&body, &self.endpoints, self.max_results)
    }
}

/// 解析 VNDB 回應：優先日文標題，否則用主標題
pub fn parse_response(body: &str, endpoints: &Endpoints, max_results: usize) -> Result<Vec<SearchResult>> {
    let data: VndbResponse = serde_json::from_str(body).context("無法解析 VNDB 回應")?;

    let results = data
        .results
        .into_iter()
        .take(max_results)
        .map(|item| {
            let title = item
                .titles
                .iter()
                .find(|t| t.lang.as_deref() == Some("ja") && t.title.as_deref().is_some_and(|s| !s.is_empty()))
                .and_then(|t| t.title.clone())
                .or(item.title)
                .unwrap_or_else(|| "Unknown".to_string());

            let thumb = item.image.and_then(|img| img.url).unwrap_or_default();

            SearchResult::new(SearchSource::Vndb, item.id.clone(), title, endpoints.vndb_detail(&item.id))
                .with_thumb(thumb)
        })
        .collect();

    Ok(results)
}
