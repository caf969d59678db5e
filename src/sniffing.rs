use crate::config::{AppConfig, Endpoints};
use crate::fetcher::{RequestOptions, ResilientClient};
use crate::pool::WorkerPool;
use crate::providers::Patterns;
use crate::providers::utils::{first_text, selector};
use crate::types::{SearchResult, SearchSource, SniffResult};
use anyhow::Result;
use scraper::{Html, Selector};
use std::sync::Arc;
use tracing::{debug, info, warn};

const DLSITE_DOMAIN: &str = "dlsite.com";
const DMM_DOMAIN: &str = "dmm.co.jp";

/// 從 VNDB 詳細頁的外部連結找出 DLsite / FANZA 商品，並以 ID 取得資訊
pub struct SniffingEnricher {
    client: Arc<ResilientClient>,
    patterns: Arc<Patterns>,
    pool: WorkerPool,
    endpoints: Endpoints,
    dlsite_cookies: Vec<(String, String)>,
    fanza_cookies: Vec<(String, String)>,
    anchor_selector: Selector,
    dlsite_title: Vec<Selector>,
    fanza_title: Vec<Selector>,
}

impl SniffingEnricher {
    pub fn new(
        client: Arc<ResilientClient>,
        patterns: Arc<Patterns>,
        pool: WorkerPool,
        config: &AppConfig,
    ) -> Result<Self> {
        Ok(Self {
            client,
            patterns,
            pool,
            endpoints: config.endpoints.clone(),
            dlsite_cookies: config.cookies.dlsite.clone(),
            fanza_cookies: config.cookies.fanza.clone(),
            anchor_selector: selector("a[href]")?,
            dlsite_title: vec![
                selector("#work_name a")?,
                selector("h1#work_name")?,
                selector(r#"meta[property="og:title"]"#)?,
            ],
            fanza_title: vec![
                selector("h1#title")?,
                selector("h1.productTitle__txt")?,
                selector(r#"meta[property="og:title"]"#)?,
                selector("title")?,
            ],
        })
    }

    /// 掃描單一頁面的所有連結
    pub fn scan_links(&self, html: &str) -> SniffResult {
        let document = Html::parse_document(html);
        let mut found = SniffResult::default();

        for anchor in document.select(&self.anchor_selector) {
            let Some(href) = anchor.value().attr("href") else {
                continue;
            };

            if href.contains(DLSITE_DOMAIN) {
                for caps in self.patterns.sniff_dlsite.captures_iter(href) {
                    found.add(SearchSource::DLsite, caps[1].to_uppercase());
                }
            } else if href.contains(DMM_DOMAIN) && href.contains("/detail/") {
                if let Some(caps) = self.patterns.sniff_dmm.captures(href) {
                    let id = caps[1].to_string();
                    if self.patterns.is_non_game_id(&id) {
                        debug!(%id, "略過非遊戲商品");
                        continue;
                    }
                    found.add(SearchSource::Fanza, id);
                }
            }
        }

        found
    }

    /// 平行抓取每個 VNDB 結果的詳細頁；結果依輸入順序合併
    pub async fn sniff(self: &Arc<Self>, vndb_results: &[SearchResult]) -> SniffResult {
        let handles: Vec<_> = vndb_results
            .iter()
            .map(|result| {
                let this = Arc::clone(self);
                let url = result.url.clone();
                self.pool.spawn(async move {
                    let html = this.client.get_text(&url, &RequestOptions::new()).await?;
                    Ok::<_, anyhow::Error>(this.scan_links(&html))
                })
            })
            .collect();

        let mut sniffed = SniffResult::default();
        for (result, handle) in vndb_results.iter().zip(handles) {
            match handle.await {
                Ok(Ok(found)) => sniffed.merge(found),
                Ok(Err(e)) => warn!(id = %result.id, error = %e, "VNDB 嗅探：解析頁面失敗"),
                Err(e) => warn!(id = %result.id, error = %e, "VNDB 嗅探：任務中止"),
            }
        }

        info!(
            dlsite = sniffed.dlsite_ids.len(),
            fanza = sniffed.fanza_ids.len(),
            "VNDB 嗅探完成"
        );
        sniffed
    }

    /// 以 ID 取得商品；失敗只記錄，不影響其他項目
    pub async fn fetch_by_id(&self, source: SearchSource, id: &str) -> Option<SearchResult> {
        match source {
            SearchSource::DLsite => self.fetch_dlsite(id).await,
            SearchSource::Fanza => self.fetch_fanza(id).await,
            SearchSource::Vndb => None,
        }
    }

    async fn fetch_dlsite(&self, id: &str) -> Option<SearchResult> {
        let options = RequestOptions::new().with_cookies(&self.dlsite_cookies);

        for mode in &self.endpoints.dlsite_modes {
            let url = self.endpoints.dlsite_product(mode, id);
            let response = match self.client.get(&url, &options).await {
                Ok(response) => response,
                Err(e) => {
                    warn!(%id, %mode, error = %e, "DLsite 取得商品失敗");
                    continue;
                }
            };
            if !response.status().is_success() {
                continue;
            }
            let Ok(html) = response.text().await else {
                continue;
            };
            if !html.contains(id) {
                continue;
            }

            let title = self.dlsite_title(&html).unwrap_or_else(|| id.to_string());
            info!(%id, %title, "DLsite 成功取得");
            return Some(SearchResult::new(SearchSource::DLsite, id, title, url).sniffed());
        }

        warn!(%id, "DLsite 所有分區都找不到");
        None
    }

    async fn fetch_fanza(&self, id: &str) -> Option<SearchResult> {
        let url = self.endpoints.fanza_detail(id);
        let options = RequestOptions::new().with_cookies(&self.fanza_cookies);

        let response = match self.client.get(&url, &options).await {
            Ok(response) => response,
            Err(e) => {
                warn!(%id, error = %e, "FANZA 取得商品失敗");
                return None;
            }
        };
        if !response.status().is_success() {
            warn!(%id, status = response.status().as_u16(), "FANZA 頁面請求失敗");
            return None;
        }
        let html = match response.text().await {
            Ok(html) => html,
            Err(e) => {
                warn!(%id, error = %e, "FANZA 讀取頁面失敗");
                return None;
            }
        };

        let title = match self.fanza_title(&html) {
            Some(title) => {
                info!(%id, %title, "FANZA 成功取得");
                title
            }
            None => {
                warn!(%id, "FANZA 無法解析標題，使用 ID 當標題");
                id.to_string()
            }
        };
        Some(SearchResult::new(SearchSource::Fanza, id, title, url).sniffed())
    }

    pub fn dlsite_title(&self, html: &str) -> Option<String> {
        let document = Html::parse_document(html);
        first_text(&document, &self.dlsite_title).filter(|t| !t.is_empty())
    }

    pub fn fanza_title(&self, html: &str) -> Option<String> {
        let document = Html::parse_document(html);
        first_text(&document, &self.fanza_title)
            .map(|t| self.patterns.clean_fanza_page_title(&t))
            .filter(|t| !t.is_empty())
    }
}
