use anyhow::{Context, Result};
use regex::Regex;

/// 各來源共用的正規表示式
pub struct Patterns {
    /// DLsite 關鍵字中的括號、波浪號、驚嘆號與空白
    pub dlsite_clean: Regex,
    /// FANZA 標題前綴（【...】デジタル｜アダルトPCゲーム 之類）
    pub fanza_prefix: Regex,
    /// FANZA 頁面標題尾端的站名
    pub fanza_site_suffix: Regex,
    /// FANZA 詳細頁 ID
    pub fanza_id: Regex,
    /// VNDB 頁面中指向 DLsite 的商品 ID
    pub sniff_dlsite: Regex,
    /// VNDB 頁面中指向 DMM 的商品 ID
    pub sniff_dmm: Regex,
    /// 原聲帶、畫集、廣播劇等非遊戲商品
    non_game: Vec<Regex>,
}

impl Patterns {
    pub fn new() -> Result<Self> {
        let compile = |pattern: &str| Regex::new(pattern).with_context(|| format!("正規表示式錯誤: {}", pattern));

        Ok(Self {
            dlsite_clean: compile(r"[【】\[\]()（）~～！!\s]")?,
            fanza_prefix: compile(
                r"^(?:【[^】]+】)?(?:デジタル\|?)?(?:還元)?(?:アダルト)?(?:PC)?(?:ゲーム)?\s*",
            )?,
            fanza_site_suffix: compile(r"\s*[-|｜].*(?:DMM|FANZA).*$")?,
            fanza_id: compile(r"/detail/([a-zA-Z0-9_]+)")?,
            sniff_dlsite: compile(r"(?i)(?:product_id|/id)/([RV]J\d+)(?:\.html)?")?,
            sniff_dmm: compile(r"(?i)(?:cid=|/detail/)([a-z0-9_]+?)(?:/|$|\?)")?,
            non_game: ["_ost$", "_soundtrack", "_music", "_vocal", "_drama", "_artbook", "_settei"]
                .iter()
                .map(|p| compile(&format!("(?i){}", p)))
                .collect::<Result<Vec<_>>>()?,
        })
    }

    pub fn is_non_game_id(&self, id: &str) -> bool {
        self.non_game.iter().any(|p| p.is_match(id))
    }

    /// 去除裝飾符號後的關鍵字
    pub fn clean_dlsite_keyword(&self, keyword: &str) -> String {
        self.dlsite_clean.replace_all(keyword, "").into_owned()
    }

    /// 去除 FANZA 前綴；結果為空時保留原標題
    pub fn strip_fanza_prefix(&self, raw: &str) -> String {
        let stripped = self.fanza_prefix.replace(raw, "");
        let stripped = stripped.trim();
        if stripped.is_empty() {
            raw.trim().to_string()
        } else {
            stripped.to_string()
        }
    }

    /// 詳細頁標題：去前綴再去站名，可能為空
    pub fn clean_fanza_page_title(&self, raw: &str) -> String {
        let title = self.fanza_prefix.replace(raw, "");
        let title = title.trim();
        self.fanza_site_suffix.replace(title, "").trim().to_string()
    }
}
