use anyhow::Result;
use scraper::{ElementRef, Html, Selector};

/// 解析 CSS 選擇器
pub fn selector(s: &str) -> Result<Selector> {
    Selector::parse(s).map_err(|e| anyhow::anyhow!("選擇器解析失敗 {}: {:?}", s, e))
}

/// 元素的文字內容（各段去空白後直接相接）
pub fn element_text(elem: &ElementRef) -> String {
    elem.text().map(str::trim).collect::<String>()
}

/// 依序嘗試選擇器，取第一個命中元素的文字；meta 取 content 屬性
pub fn first_text(document: &Html, selectors: &[Selector]) -> Option<String> {
    selectors.iter().find_map(|sel| {
        document.select(sel).next().map(|elem| {
            if elem.value().name() == "meta" {
                elem.value().attr("content").unwrap_or_default().trim().to_string()
            } else {
                element_text(&elem)
            }
        })
    })
}

/// 讀取 `<meta property="...">` 的 content
pub fn meta_property(document: &Html, property: &str) -> Option<String> {
    let sel = selector(&format!(r#"meta[property="{}"]"#, property)).ok()?;
    document
        .select(&sel)
        .next()
        .and_then(|elem| elem.value().attr("content"))
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// 協定相對 URL 補上 https
pub fn normalize_url(url: &str) -> String {
    let url = url.trim();
    if url.starts_with("//") {
        format!("https:{}", url)
    } else {
        url.to_string()
    }
}
