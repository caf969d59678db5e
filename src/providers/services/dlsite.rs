use crate::config::{AppConfig, Endpoints};
use crate::fetcher::{RequestOptions, ResilientClient};
use crate::providers::patterns::Patterns;
use crate::providers::trait_def::SourceProvider;
use crate::types::{SearchResult, SearchSource};
use anyhow::{Context, Result};
use regex::Regex;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

/// DLsite 搜尋頁爬取（maniax / pro 兩個分區）
pub struct DlsiteProvider {
    client: Arc<ResilientClient>,
    patterns: Arc<Patterns>,
    endpoints: Endpoints,
    cookies: Vec<(String, String)>,
    max_results: usize,
    link_pattern: Regex,
}

impl DlsiteProvider {
    pub fn new(client: Arc<ResilientClient>, patterns: Arc<Patterns>, config: &AppConfig) -> Result<Self> {
        Ok(Self {
            link_pattern: link_pattern(&config.endpoints.dlsite_base)?,
            client,
            patterns,
            endpoints: config.endpoints.clone(),
            cookies: config.cookies.dlsite.clone(),
            max_results: config.limits.max_results,
        })
    }

    /// 原始關鍵字與去除裝飾符號的版本（相同時只留一個）
    pub fn keyword_variants(&self, keyword: &str) -> Vec<String> {
        let mut variants = vec![keyword.to_string()];
        let cleaned = self.patterns.clean_dlsite_keyword(keyword);
        if !cleaned.is_empty() && cleaned != keyword {
            variants.push(cleaned);
        }
        variants
    }
}

#[async_trait::async_trait]
impl SourceProvider for DlsiteProvider {
    fn source(&self) -> SearchSource {
        SearchSource::DLsite
    }

    async fn fetch(&self, keyword: &str) -> Result<Vec<SearchResult>> {
        let options = RequestOptions::new().with_cookies(&self.cookies);
        let mut results = Vec::new();
        let mut seen = HashSet::new();

        'variants: for kw in self.keyword_variants(keyword).iter().take(2) {
            for mode in &self.endpoints.dlsite_modes {
                if results.len() >= self.max_results {
                    break 'variants;
                }

                let url = self.endpoints.dlsite_search(mode, kw);
                debug!(%url, "DLsite 搜尋");
                let html = self
                    .client
                    .get(&url, &options)
                    .await?
                    .error_for_status()?
                    .text()
                    .await
                    .context("讀取 DLsite 搜尋頁失敗")?;

                collect_products(&html, &self.link_pattern, &mut seen, &mut results, self.max_results);
            }
        }

        Ok(results)
    }
}

/// 商品詳細頁連結：`href="<base>/.../product_id/RJ123456.html"`
pub fn link_pattern(base: &str) -> Result<Regex> {
    let pattern = format!(
        r#"href="({}/[^"]+?/product_id/((?:RJ|VJ)\d+)\.html)""#,
        regex::escape(base.trim_end_matches('/'))
    );
    Regex::new(&pattern).context("DLsite 連結正規表示式錯誤")
}

/// 從搜尋頁原始碼收集商品，跨頁面以 ID 去重，達上限即停止
pub fn collect_products(
    html: &str,
    link_pattern: &Regex,
    seen: &mut HashSet<String>,
    results: &mut Vec<SearchResult>,
    max_results: usize,
) {
    for caps in link_pattern.captures_iter(html) {
        if results.len() >= max_results {
            break;
        }

        let (link, id) = (&caps[1], &caps[2]);
        if !seen.insert(id.to_string()) {
            continue;
        }

        let title = title_after(html, id).unwrap_or_else(|| id.to_string());
        results.push(SearchResult::new(SearchSource::DLsite, id, title, link));
    }
}

/// 第一個 `product_id/<ID>` 之後出現的 `title="..."`
fn title_after(html: &str, id: &str) -> Option<String> {
    let marker = format!("product_id/{}", id);
    let start = html.find(&marker)? + marker.len();
    let rest = &html[start..];
    let attr_start = rest.find(r#"title=""#)? + r#"title=""#.len();
    let rest = &rest[attr_start..];
    let end = rest.find('"')?;
    let title = rest[..end].trim();
    if title.is_empty() { None } else { Some(title.to_string()) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const PAGE: &str = r#"
        <div class="search_result_img_box_inner">
            <a href="https://www.dlsite.com/maniax/work/=/product_id/RJ01001.html" class="work_thumb">
                <img src="//img.dlsite.jp/RJ01001_img_sam.jpg" alt="">
            </a>
            <dd class="work_name">
                <a href="https://www.dlsite.com/maniax/work/=/product_id/RJ01001.html" title="魔法少女の冒険">魔法少女の冒険</a>
            </dd>
        </div>
        <div>
            <a href="https://www.dlsite.com/pro/work/=/product_id/VJ00999.html">no title</a>
        </div>
    "#;

    fn search_path(mode: &str, keyword: &str) -> String {
        format!("/{}/fsr/=/keyword/{}/order/trend", mode, urlencoding::encode(keyword))
    }

    fn collect(html: &str, max: usize) -> Vec<SearchResult> {
        let pattern = link_pattern("https://www.dlsite.com").unwrap();
        let mut seen = HashSet::new();
        let mut results = Vec::new();
        collect_products(html, &pattern, &mut seen, &mut results, max);
        results
    }

    #[test]
    fn test_duplicate_anchor_kept_once() {
        let results = collect(PAGE, 5);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].id, "RJ01001");
        assert_eq!(results[0].title, "魔法少女の冒険");
        assert_eq!(results[0].url, "https://www.dlsite.com/maniax/work/=/product_id/RJ01001.html");
        assert_eq!(results[1].id, "VJ00999");
        // 後面沒有 title 屬性時退回 ID
        assert_eq!(results[1].title, "VJ00999");
    }

    #[test]
    fn test_cap_stops_collection() {
        let results = collect(PAGE, 1);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "RJ01001");
    }

    #[test]
    fn test_ignores_other_domains() {
        let html = r#"<a href="https://evil.example.com/maniax/work/=/product_id/RJ1.html">x</a>"#;
        assert!(collect(html, 5).is_empty());
    }

    #[tokio::test]
    async fn test_searches_both_variants_and_modes() {
        let server = MockServer::start().await;
        let page = |id: &str| {
            format!(
                r#"<a href="{}/maniax/work/=/product_id/{}.html" title="t-{}">x</a>"#,
                server.uri(),
                id,
                id
            )
        };

        Mock::given(method("GET"))
            .and(path(search_path("maniax", "【魔法】")))
            .and(header("cookie", "adult_checked=1; locale=ja_JP"))
            .respond_with(ResponseTemplate::new(200).set_body_string(page("RJ1")))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(search_path("pro", "【魔法】")))
            .respond_with(ResponseTemplate::new(200).set_body_string(page("RJ1")))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(search_path("maniax", "魔法")))
            .respond_with(ResponseTemplate::new(200).set_body_string(page("RJ2")))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(search_path("pro", "魔法")))
            .respond_with(ResponseTemplate::new(200).set_body_string(""))
            .expect(1)
            .mount(&server)
            .await;

        let config = AppConfig::default().with_base_url(&server.uri());
        let client = Arc::new(ResilientClient::new(&config).unwrap());
        let provider = DlsiteProvider::new(client, Arc::new(Patterns::new().unwrap()), &config).unwrap();

        assert_eq!(provider.keyword_variants("【魔法】"), vec!["【魔法】", "魔法"]);

        let results = provider.search("【魔法】").await.outcome.unwrap();
        let ids: Vec<_> = results.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["RJ1", "RJ2"]);
        assert_eq!(results[1].title, "t-RJ2");
    }

    #[tokio::test]
    async fn test_stops_requesting_once_capped() {
        let server = MockServer::start().await;
        let body = format!(
            r#"<a href="{0}/maniax/work/=/product_id/RJ1.html" title="a">a</a>
               <a href="{0}/maniax/work/=/product_id/RJ2.html" title="b">b</a>"#,
            server.uri()
        );
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .expect(1)
            .mount(&server)
            .await;

        let config = AppConfig::default().with_base_url(&server.uri()).with_max_results(2);
        let client = Arc::new(ResilientClient::new(&config).unwrap());
        let provider = DlsiteProvider::new(client, Arc::new(Patterns::new().unwrap()), &config).unwrap();

        let results = provider.search("plain").await.outcome.unwrap();
        assert_eq!(results.len(), 2);
    }
}
