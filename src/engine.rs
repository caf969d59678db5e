use crate::cache::{CacheStats, ImageCache, LruCache};
use crate::config::AppConfig;
use crate::error::FetchError;
use crate::fetcher::ResilientClient;
use crate::imaging::ImagePipeline;
use crate::pool::WorkerPool;
use crate::providers::{Patterns, Provider, SourceProvider};
use crate::sniffing::SniffingEnricher;
use crate::types::{GroupedResults, SearchResponse, SearchResult};
use anyhow::Result;
use image::RgbaImage;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// 搜尋協調器：三個來源平行搜尋、VNDB 嗅探補充、結果與圖片快取
pub struct SearchOrchestrator {
    client: Arc<ResilientClient>,
    providers: Vec<Arc<Provider>>,
    enricher: Arc<SniffingEnricher>,
    images: ImagePipeline,
    result_cache: LruCache<String, GroupedResults>,
    image_cache: ImageCache,
    pool: WorkerPool,
}

impl SearchOrchestrator {
    pub fn new(config: &AppConfig) -> Result<Self> {
        let client = Arc::new(ResilientClient::new(config)?);
        let patterns = Arc::new(Patterns::new()?);
        let pool = WorkerPool::new(config.limits.max_workers);

        let providers = Provider::standard(Arc::clone(&client), Arc::clone(&patterns), config)?
            .into_iter()
            .map(Arc::new)
            .collect();
        let enricher = Arc::new(SniffingEnricher::new(
            Arc::clone(&client),
            patterns,
            pool.clone(),
            config,
        )?);

        info!(workers = pool.size(), "搜尋引擎初始化完成");
        Ok(Self {
            images: ImagePipeline::new(Arc::clone(&client), config)?,
            result_cache: LruCache::new(config.limits.search_cache_size),
            image_cache: ImageCache::from_config(config),
            client,
            providers,
            enricher,
            pool,
        })
    }

    /// 搜尋全部來源；單一來源失敗只會出現在 errors 中
    pub async fn search_all(&self, keyword: &str, use_cache: bool) -> GroupedResults {
        self.image_cache.cleanup_if_needed();

        let cache_key = keyword.to_string();
        if use_cache {
            if let Some(cached) = self.result_cache.get(&cache_key) {
                info!(%keyword, "使用快取結果");
                return cached;
            }
        }

        let mut grouped = GroupedResults::default();
        let mut set = JoinSet::new();

        for provider in &self.providers {
            let source = provider.source();
            let provider = Arc::clone(provider);
            let kw = keyword.to_string();
            let handle = self.pool.spawn(async move { provider.search(&kw).await });
            set.spawn(async move { (source, handle.await) });
        }

        // 依完成順序收回，依來源放入
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((_, Ok(response))) => grouped.absorb(response),
                Ok((source, Err(e))) => {
                    error!(%source, error = %e, "搜尋任務中止");
                    let message = FetchError::Unclassified(e.to_string()).user_message();
                    grouped.absorb(SearchResponse::error(source, message));
                }
                Err(e) => error!(error = %e, "搜尋任務中止"),
            }
        }

        self.enrich(&mut grouped).await;

        info!(
            %keyword,
            total = grouped.total_count(),
            sniffed = grouped.sniffed_count(),
            errors = grouped.errors.len(),
            "搜尋完成"
        );
        self.result_cache.set(cache_key, grouped.clone());
        grouped
    }

    /// 以 VNDB 結果嗅探 DLsite / FANZA 商品並附加到對應分組
    async fn enrich(&self, grouped: &mut GroupedResults) {
        if grouped.vndb.is_empty() {
            return;
        }

        let candidates = self.enricher.sniff(&grouped.vndb).await.exclude_present(grouped);
        if candidates.is_empty() {
            debug!("沒有需要補充的商品");
            return;
        }

        let mut set = JoinSet::new();
        for (source, id) in candidates.tasks() {
            let enricher = Arc::clone(&self.enricher);
            self.pool
                .spawn_in(&mut set, async move { enricher.fetch_by_id(source, &id).await });
        }

        let mut added = 0;
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(Some(result)) => {
                    if grouped.push_unique(result) {
                        added += 1;
                    }
                }
                Ok(None) => {}
                Err(e) => warn!(error = %e, "VNDB 嗅探：補充任務中止"),
            }
        }
        info!(added, "VNDB 嗅探補充完成");
    }

    /// 取得處理後的圖片；任何失敗都回傳 None
    pub async fn fetch_image(&self, result: &SearchResult) -> Option<Arc<RgbaImage>> {
        let url = match self.images.resolve_url(result).await {
            Ok(Some(url)) => url,
            Ok(None) => {
                debug!(id = %result.id, "找不到圖片 URL");
                return None;
            }
            Err(e) => {
                error!(id = %result.id, error = %e, "取得圖片 URL 失敗");
                return None;
            }
        };

        if let Some(image) = self.image_cache.get(&url) {
            return Some(image);
        }

        match self.images.load(&url).await {
            Ok(image) => {
                let image = Arc::new(image);
                self.image_cache.set(&url, Arc::clone(&image));
                Some(image)
            }
            Err(e) => {
                warn!(%url, error = %e, "圖片載入失敗");
                None
            }
        }
    }

    pub fn clear_cache(&self) {
        self.image_cache.clear();
        self.result_cache.clear();
        info!("所有快取已清空");
    }

    /// 釋放連線池
    pub fn shutdown(&self) {
        self.client.close();
    }

    pub fn result_cache_stats(&self) -> CacheStats {
        self.result_cache.stats()
    }

    pub fn image_cache_stats(&self) -> CacheStats {
        self.image_cache.stats()
    }
}
