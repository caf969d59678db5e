use crate::config::{AppConfig, Endpoints};
use crate::fetcher::{RequestOptions, ResilientClient};
use crate::providers::patterns::Patterns;
use crate::providers::trait_def::SourceProvider;
use crate::providers::utils::{element_text, selector};
use crate::types::{SearchResult, SearchSource};
use anyhow::{Context, Result};
use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;
use std::sync::Arc;

/// FANZA 搜尋頁爬取
pub struct FanzaProvider {
    client: Arc<ResilientClient>,
    parser: FanzaSearchParser,
    endpoints: Endpoints,
    cookies: Vec<(String, String)>,
}

impl FanzaProvider {
    pub fn new(client: Arc<ResilientClient>, patterns: Arc<Patterns>, config: &AppConfig) -> Result<Self> {
        Ok(Self {
            client,
            parser: FanzaSearchParser::new(patterns, config.endpoints.clone(), config.limits.max_results)?,
            endpoints: config.endpoints.clone(),
            cookies: config.cookies.fanza.clone(),
        })
    }
}

#[async_trait::async_trait]
impl SourceProvider for FanzaProvider {
    fn source(&self) -> SearchSource {
        SearchSource::Fanza
    }

    async fn fetch(&self, keyword: &str) -> Result<Vec<SearchResult>> {
        let url = self.endpoints.fanza_search(keyword);
        let options = RequestOptions::new().with_cookies(&self.cookies);

        let html = self
            .client
            .get(&url, &options)
            .await?
            .error_for_status()?
            .text()
            .await
            .context("讀取 FANZA 搜尋頁失敗")?;

        Ok(self.parser.parse_page(&html))
    }
}

/// FANZA 搜尋結果解析器
pub struct FanzaSearchParser {
    patterns: Arc<Patterns>,
    endpoints: Endpoints,
    max_results: usize,
    item_selector: Selector,
    anchor_selector: Selector,
    image_selector: Selector,
}

impl FanzaSearchParser {
    pub fn new(patterns: Arc<Patterns>, endpoints: Endpoints, max_results: usize) -> Result<Self> {
        Ok(Self {
            patterns,
            endpoints,
            max_results,
            item_selector: selector("li.tmb-list-item, div.t-item")?,
            anchor_selector: selector("a[href]")?,
            image_selector: selector("img")?,
        })
    }

    fn detail_id(&self, elem: &ElementRef) -> Option<String> {
        let href = elem.value().attr("href")?;
        self.patterns.fanza_id.captures(href).map(|caps| caps[1].to_string())
    }

    /// 優先使用結果容器；找不到容器時掃描全部符合的連結
    pub fn parse_page(&self, html: &str) -> Vec<SearchResult> {
        let document = Html::parse_document(html);

        // 依文件順序記錄每個連結之前最近的一張圖
        let mut anchors: Vec<(ElementRef, Option<String>)> = Vec::new();
        let mut last_image: Option<String> = None;
        for node in document.root_element().descendants() {
            let Some(elem) = ElementRef::wrap(node) else {
                continue;
            };
            match elem.value().name() {
                "img" => last_image = elem.value().attr("src").map(str::to_string),
                "a" if self.detail_id(&elem).is_some() => anchors.push((elem, last_image.clone())),
                _ => {}
            }
        }

        let items: Vec<ElementRef> = document.select(&self.item_selector).collect();
        let links: Vec<ElementRef> = if items.is_empty() {
            anchors.iter().map(|(a, _)| *a).collect()
        } else {
            items
                .iter()
                .filter_map(|item| item.select(&self.anchor_selector).find(|a| self.detail_id(a).is_some()))
                .collect()
        };

        let mut results = Vec::new();
        let mut seen = HashSet::new();

        for link in links {
            let Some(id) = self.detail_id(&link) else {
                continue;
            };
            let raw_title = element_text(&link);
            if raw_title.is_empty() || seen.contains(&id) {
                continue;
            }

            let title = self.patterns.strip_fanza_prefix(&raw_title);
            let thumb = link
                .select(&self.image_selector)
                .next()
                .and_then(|img| img.value().attr("src").map(str::to_string))
                .or_else(|| anchors.iter().find(|(a, _)| a.id() == link.id()).and_then(|(_, img)| img.clone()))
                .unwrap_or_default();

            results.push(
                SearchResult::new(SearchSource::Fanza, id.clone(), title, self.endpoints.fanza_detail(&id))
                    .with_thumb(thumb),
            );
            seen.insert(id);

            if results.len() >= self.max_results {
                break;
            }
        }

        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path_regex};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn parser(max: usize) -> FanzaSearchParser {
        FanzaSearchParser::new(Arc::new(Patterns::new().unwrap()), Endpoints::default(), max).unwrap()
    }

    #[test]
    fn test_structured_items() {
        let html = r#"
            <ul>
              <li class="tmb-list-item">
                <a href="https://dlsoft.dmm.co.jp/detail/abc_0001/">
                  <img src="//pics.dmm.co.jp/digital/pcgame/abc_0001/abc_0001ps.jpg">
                  【期間限定】アダルトPCゲーム 恋する乙女
                </a>
              </li>
              <li class="tmb-list-item">
                <a href="/other/">unrelated</a>
                <a href="https://dlsoft.dmm.co.jp/detail/xyz_0002/">別のタイトル</a>
              </li>
            </ul>
            <a href="https://dlsoft.dmm.co.jp/detail/outside_0003/">not in a container</a>
        "#;
        let results = parser(5).parse_page(html);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].id, "abc_0001");
        assert_eq!(results[0].title, "恋する乙女");
        assert_eq!(results[0].url, "https://dlsoft.dmm.co.jp/detail/abc_0001/");
        assert_eq!(results[0].thumb_url, "//pics.dmm.co.jp/digital/pcgame/abc_0001/abc_0001ps.jpg");
        assert_eq!(results[1].id, "xyz_0002");
        assert_eq!(results[1].title, "別のタイトル");
    }

    #[test]
    fn test_fallback_anchor_scan_dedups() {
        let html = r#"
            <div><img src="https://pics.example/one.jpg"></div>
            <p><a href="/detail/one_001/">One</a></p>
            <p><a href="/detail/one_001/">One again</a></p>
            <p><a href="/detail/two_002/"></a></p>
            <p><a href="/detail/three_003/">Three</a></p>
        "#;
        let results = parser(5).parse_page(html);
        let ids: Vec<_> = results.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["one_001", "three_003"]);
        assert_eq!(results[0].thumb_url, "https://pics.example/one.jpg");
        assert_eq!(results[1].thumb_url, "https://pics.example/one.jpg");
    }

    #[test]
    fn test_cap() {
        let html: String = (0..10)
            .map(|i| format!(r#"<a href="/detail/id_{0}/">T{0}</a>"#, i))
            .collect();
        assert_eq!(parser(3).parse_page(&html).len(), 3);
    }

    #[tokio::test]
    async fn test_search_sends_age_cookie() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path_regex(r"^/search/=/searchstr=.+/floor=digital/group=adult/$"))
            .and(header("cookie", "age_check_done=1"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(r#"<a href="/detail/game_01/">ゲーム タイトル</a>"#),
            )
            .expect(1)
            .mount(&server)
            .await;

        let config = AppConfig::default().with_base_url(&server.uri());
        let client = Arc::new(ResilientClient::new(&config).unwrap());
        let provider = FanzaProvider::new(client, Arc::new(Patterns::new().unwrap()), &config).unwrap();

        let results = provider.search("タイトル").await.outcome.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].title, "タイトル");
        assert_eq!(results[0].url, format!("{}/detail/game_01/", server.uri()));
    }
}
