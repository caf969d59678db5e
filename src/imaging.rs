use crate::config::{AppConfig, ImageGeometry};
use crate::fetcher::{RequestOptions, ResilientClient};
use crate::providers::utils::{meta_property, normalize_url, selector};
use crate::types::{SearchResult, SearchSource};
use anyhow::{Context, Result};
use image::imageops::FilterType;
use image::{DynamicImage, RgbaImage};
use scraper::{Html, Selector};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// FANZA 小圖 → 大圖
pub fn upgrade_fanza_thumb(thumb: &str) -> Option<String> {
    if thumb.contains("ps.jpg") {
        Some(normalize_url(&thumb.replace("ps.jpg", "pl.jpg")))
    } else {
        None
    }
}

/// 依目標高度等比縮放
pub fn resize_to_height(image: &DynamicImage, height: u32) -> RgbaImage {
    let (w, h) = (image.width().max(1), image.height().max(1));
    let width = ((w as f64) * (height as f64) / (h as f64)).round().max(1.0) as u32;
    image.resize_exact(width, height.max(1), FilterType::Lanczos3).to_rgba8()
}

/// 四個角套上圓形 alpha 遮罩
pub fn round_corners(image: &mut RgbaImage, radius: u32) {
    let (width, height) = image.dimensions();
    let radius = radius.min(width / 2).min(height / 2);
    if radius == 0 {
        return;
    }

    let r = radius as f64;
    for y in 0..radius {
        for x in 0..radius {
            let dx = r - x as f64 - 0.5;
            let dy = r - y as f64 - 0.5;
            if dx * dx + dy * dy <= r * r {
                continue;
            }
            for (px, py) in [
                (x, y),
                (width - 1 - x, y),
                (x, height - 1 - y),
                (width - 1 - x, height - 1 - y),
            ] {
                image.get_pixel_mut(px, py).0[3] = 0;
            }
        }
    }
}

/// 縮放加圓角
pub fn process(image: &DynamicImage, geometry: &ImageGeometry) -> RgbaImage {
    let mut resized = resize_to_height(image, geometry.height);
    round_corners(&mut resized, geometry.corner_radius);
    resized
}

/// 圖片 URL 解析與下載
pub struct ImagePipeline {
    client: Arc<ResilientClient>,
    dlsite_cookies: Vec<(String, String)>,
    fanza_cookies: Vec<(String, String)>,
    timeout: Duration,
    geometry: ImageGeometry,
    package_image: Selector,
    package_src: Selector,
}

impl ImagePipeline {
    pub fn new(client: Arc<ResilientClient>, config: &AppConfig) -> Result<Self> {
        Ok(Self {
            client,
            dlsite_cookies: config.cookies.dlsite.clone(),
            fanza_cookies: config.cookies.fanza.clone(),
            timeout: config.image_timeout(),
            geometry: config.image.clone(),
            package_image: selector(r#"a[name="package-image"]"#)?,
            package_src: selector("#package-src")?,
        })
    }

    /// 找出實際要下載的圖片 URL
    pub async fn resolve_url(&self, result: &SearchResult) -> Result<Option<String>> {
        match result.source {
            SearchSource::Vndb => Ok(Some(result.thumb_url.clone()).filter(|u| !u.is_empty())),
            SearchSource::DLsite => {
                let options = RequestOptions::new().with_cookies(&self.dlsite_cookies);
                let html = self.client.get_text(&result.url, &options).await?;
                let document = Html::parse_document(&html);
                Ok(meta_property(&document, "og:image").map(|url| normalize_url(&url)))
            }
            SearchSource::Fanza => {
                if let Some(url) = upgrade_fanza_thumb(&result.thumb_url) {
                    return Ok(Some(url));
                }
                let options = RequestOptions::new().with_cookies(&self.fanza_cookies);
                let html = self.client.get_text(&result.url, &options).await?;
                Ok(self.package_image_url(&html))
            }
        }
    }

    fn package_image_url(&self, html: &str) -> Option<String> {
        let document = Html::parse_document(html);
        let target = document
            .select(&self.package_image)
            .next()
            .or_else(|| document.select(&self.package_src).next())?;
        let value = target.value();
        value
            .attr("href")
            .filter(|s| !s.is_empty())
            .or_else(|| value.attr("src"))
            .map(normalize_url)
            .filter(|s| !s.is_empty())
    }

    /// 下載、解碼並處理
    pub async fn load(&self, url: &str) -> Result<RgbaImage> {
        let options = RequestOptions::new().with_timeout(self.timeout);
        let bytes = self
            .client
            .get(url, &options)
            .await?
            .error_for_status()?
            .bytes()
            .await
            .context("讀取圖片失敗")?;
        debug!(url, size = bytes.len(), "圖片下載完成");

        let geometry = self.geometry.clone();
        tokio::task::spawn_blocking(move || {
            let decoded = image::load_from_memory(&bytes).context("圖片解碼失敗")?;
            Ok::<_, anyhow::Error>(process(&decoded, &geometry))
        })
        .await
        .context("圖片處理任務中止")?
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use image::{ImageFormat, Rgba};
    use std::io::Cursor;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    pub(crate) fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = RgbaImage::from_pixel(width, height, Rgba([200, 100, 50, 255]));
        let mut buf = Cursor::new(Vec::new());
        DynamicImage::ImageRgba8(img).write_to(&mut buf, ImageFormat::Png).unwrap();
        buf.into_inner()
    }

    fn pipeline(config: &AppConfig) -> ImagePipeline {
        let client = Arc::new(ResilientClient::new(config).unwrap());
        ImagePipeline::new(client, config).unwrap()
    }

    #[test]
    fn test_upgrade_fanza_thumb() {
        assert_eq!(
            upgrade_fanza_thumb("//pics.dmm.co.jp/digital/pcgame/abc/abcps.jpg"),
            Some("https://pics.dmm.co.jp/digital/pcgame/abc/abcpl.jpg".to_string())
        );
        assert_eq!(upgrade_fanza_thumb("https://pics.dmm.co.jp/abc.png"), None);
        assert_eq!(upgrade_fanza_thumb(""), None);
    }

    #[test]
    fn test_process_resizes_and_rounds() {
        let source = DynamicImage::ImageRgba8(RgbaImage::from_pixel(200, 100, Rgba([1, 2, 3, 255])));
        let geometry = ImageGeometry {
            height: 50,
            corner_radius: 10,
        };
        let out = process(&source, &geometry);

        assert_eq!(out.dimensions(), (100, 50));
        assert_eq!(out.get_pixel(0, 0).0[3], 0);
        assert_eq!(out.get_pixel(99, 0).0[3], 0);
        assert_eq!(out.get_pixel(0, 49).0[3], 0);
        assert_eq!(out.get_pixel(99, 49).0[3], 0);
        assert_eq!(out.get_pixel(50, 25).0[3], 255);
        assert_eq!(out.get_pixel(10, 0).0[3], 255);
    }

    #[test]
    fn test_round_corners_on_tiny_image() {
        let mut img = RgbaImage::from_pixel(3, 3, Rgba([0, 0, 0, 255]));
        round_corners(&mut img, 25);
        assert_eq!(img.get_pixel(1, 1).0[3], 255);
    }

    #[tokio::test]
    async fn test_resolve_vndb_uses_thumb() {
        let p = pipeline(&AppConfig::default());
        let with_thumb = SearchResult::new(SearchSource::Vndb, "v1", "t", "u").with_thumb("https://t.vndb.org/1.jpg");
        let without = SearchResult::new(SearchSource::Vndb, "v2", "t", "u");

        assert_eq!(
            p.resolve_url(&with_thumb).await.unwrap(),
            Some("https://t.vndb.org/1.jpg".to_string())
        );
        assert_eq!(p.resolve_url(&without).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_resolve_dlsite_og_image() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/maniax/work/=/product_id/RJ1.html"))
            .and(header("cookie", "adult_checked=1; locale=ja_JP"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"<html><head><meta property="og:image" content="//img.dlsite.jp/RJ1_img_main.jpg"></head></html>"#,
            ))
            .mount(&server)
            .await;

        let config = AppConfig::default().with_base_url(&server.uri());
        let result = SearchResult::new(
            SearchSource::DLsite,
            "RJ1",
            "t",
            config.endpoints.dlsite_product("maniax", "RJ1"),
        );
        assert_eq!(
            pipeline(&config).resolve_url(&result).await.unwrap(),
            Some("https://img.dlsite.jp/RJ1_img_main.jpg".to_string())
        );
    }

    #[tokio::test]
    async fn test_resolve_fanza_package_image() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/detail/abc_0001/"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"<a name="package-image" href="//pics.dmm.co.jp/abc_0001pl.jpg"><img id="package-src" src="small.jpg"></a>"#,
            ))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/detail/xyz_0002/"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"<img id="package-src" src="//pics/x.jpg">"#))
            .mount(&server)
            .await;

        let config = AppConfig::default().with_base_url(&server.uri());
        let p = pipeline(&config);

        let first = SearchResult::new(SearchSource::Fanza, "abc_0001", "t", config.endpoints.fanza_detail("abc_0001"));
        assert_eq!(
            p.resolve_url(&first).await.unwrap(),
            Some("https://pics.dmm.co.jp/abc_0001pl.jpg".to_string())
        );

        let second = SearchResult::new(SearchSource::Fanza, "xyz_0002", "t", config.endpoints.fanza_detail("xyz_0002"));
        assert_eq!(p.resolve_url(&second).await.unwrap(), Some("https://pics/x.jpg".to_string()));
    }

    #[tokio::test]
    async fn test_load_downloads_and_processes() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/cover.png"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(png_bytes(60, 84)))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/broken.png"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not an image"))
            .mount(&server)
            .await;

        let p = pipeline(&AppConfig::default());
        let image = p.load(&format!("{}/cover.png", server.uri())).await.unwrap();
        assert_eq!(image.dimensions(), (300, 420));
        assert_eq!(image.get_pixel(0, 0).0[3], 0);

        assert!(p.load(&format!("{}/broken.png", server.uri())).await.is_err());
    }
}
