// 宣告子模組
pub mod classify;
pub mod patterns;
pub mod services;
pub mod trait_def;
pub mod utils;

pub use classify::run_classified;
pub use patterns::Patterns;
pub use trait_def::SourceProvider;

use crate::config::AppConfig;
use crate::fetcher::ResilientClient;
use crate::types::{SearchResult, SearchSource};
use anyhow::Result;
use services::{DlsiteProvider, FanzaProvider, VndbProvider};
use std::sync::Arc;

/// 固定的三個來源
pub enum Provider {
    DLsite(DlsiteProvider),
    Fanza(FanzaProvider),
    Vndb(VndbProvider),
}

impl Provider {
    /// 以共用的 client 建立三個來源
    pub fn standard(client: Arc<ResilientClient>, patterns: Arc<Patterns>, config: &AppConfig) -> Result<Vec<Provider>> {
        Ok(vec![
            Provider::DLsite(DlsiteProvider::new(Arc::clone(&client), Arc::clone(&patterns), config)?),
            Provider::Fanza(FanzaProvider::new(Arc::clone(&client), patterns, config)?),
            Provider::Vndb(VndbProvider::new(client, config)),
        ])
    }
}

#[async_trait::async_trait]
impl SourceProvider for Provider {
    fn source(&self) -> SearchSource {
        match self {
            Provider::DLsite(p) => p.source(),
            Provider::Fanza(p) => p.source(),
            Provider::Vndb(p) => p.source(),
        }
    }

    async fn fetch(&self, keyword: &str) -> Result<Vec<SearchResult>> {
        match self {
            Provider::DLsite(p) => p.fetch(keyword).await,
            Provider::Fanza(p) => p.fetch(keyword).await,
            Provider::Vndb(p) => p.fetch(keyword).await,
        }
    }
}
