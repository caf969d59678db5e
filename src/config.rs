use anyhow::{Context, Result};
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub const BROWSER_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// 數量限制
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Limits {
    /// 每個來源最多回傳幾筆
    pub max_results: usize,
    /// 網路任務的 worker 數
    pub max_workers: usize,
    /// 5xx 自動重試次數
    pub retry_times: u32,
    /// 退避基數（秒）
    pub retry_backoff_secs: f64,
    /// 每個 host 保留的閒置連線數
    pub pool_max_idle_per_host: usize,
    pub image_cache_size: usize,
    pub search_cache_size: usize,
    /// 記憶體門檻（MB），超過時清空圖片快取
    pub memory_threshold_mb: u64,
    /// 記憶體檢查最短間隔（秒）
    pub memory_check_interval_secs: u64,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_results: 5,
            max_workers: 4,
            retry_times: 3,
            retry_backoff_secs: 0.5,
            pool_max_idle_per_host: 10,
            image_cache_size: 20,
            search_cache_size: 10,
            memory_threshold_mb: 200,
            memory_check_interval_secs: 30,
        }
    }
}

/// 逾時設定（秒）
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Timeouts {
    pub request_secs: u64,
    pub image_secs: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            request_secs: 8,
            image_secs: 10,
        }
    }
}

/// 圖片後處理參數
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageGeometry {
    pub height: u32,
    pub corner_radius: u32,
}

impl Default for ImageGeometry {
    fn default() -> Self {
        Self {
            height: 420,
            corner_radius: 25,
        }
    }
}

/// 遠端端點
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Endpoints {
    pub vndb_api: String,
    pub vndb_site: String,
    pub dlsite_base: String,
    pub dlsite_modes: Vec<String>,
    pub fanza_search_base: String,
    pub fanza_detail_base: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            vndb_api: "https://api.vndb.org/kana/vn".to_string(),
            vndb_site: "https://vndb.org".to_string(),
            dlsite_base: "https://www.dlsite.com".to_string(),
            dlsite_modes: vec!["maniax".to_string(), "pro".to_string()],
            fanza_search_base: "https://www.dmm.co.jp".to_string(),
            fanza_detail_base: "https://dlsoft.dmm.co.jp".to_string(),
        }
    }
}

impl Endpoints {
    pub fn dlsite_search(&self, mode: &str, keyword: &str) -> String {
        format!(
            "{}/{}/fsr/=/keyword/{}/order/trend",
            self.dlsite_base,
            mode,
            urlencoding::encode(keyword)
        )
    }

    pub fn dlsite_product(&self, mode: &str, id: &str) -> String {
        format!("{}/{}/work/=/product_id/{}.html", self.dlsite_base, mode, id)
    }

    pub fn fanza_search(&self, keyword: &str) -> String {
        format!(
            "{}/search/=/searchstr={}/floor=digital/group=adult/",
            self.fanza_search_base,
            urlencoding::encode(keyword)
        )
    }

    pub fn fanza_detail(&self, id: &str) -> String {
        format!("{}/detail/{}/", self.fanza_detail_base, id)
    }

    pub fn vndb_detail(&self, id: &str) -> String {
        format!("{}/{}", self.vndb_site, id)
    }
}

/// 年齡確認 / 語系 cookie
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Cookies {
    pub dlsite: Vec<(String, String)>,
    pub fanza: Vec<(String, String)>,
}

impl Default for Cookies {
    fn default() -> Self {
        Self {
            dlsite: vec![
                ("adult_checked".to_string(), "1".to_string()),
                ("locale".to_string(), "ja_JP".to_string()),
            ],
            fanza: vec![("age_check_done".to_string(), "1".to_string())],
        }
    }
}

/// 全域設定
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub limits: Limits,
    pub timeouts: Timeouts,
    pub image: ImageGeometry,
    pub endpoints: Endpoints,
    pub cookies: Cookies,
    pub user_agent: String,
    pub vndb_user_agent: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            limits: Limits::default(),
            timeouts: Timeouts::default(),
            image: ImageGeometry::default(),
            endpoints: Endpoints::default(),
            cookies: Cookies::default(),
            user_agent: BROWSER_USER_AGENT.to_string(),
            vndb_user_agent: format!("ButterFetch/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl AppConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// 預設值 → TOML 檔（若存在）→ `BUTTERFETCH_` 環境變數
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Figment::from(Serialized::defaults(AppConfig::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("BUTTERFETCH_").split("__"))
            .extract()
            .context("無法解析設定")
    }

    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.limits.max_results = max_results;
        self
    }

    pub fn with_workers(mut self, max_workers: usize) -> Self {
        self.limits.max_workers = max_workers;
        self
    }

    pub fn with_retries(mut self, retry_times: u32, backoff_secs: f64) -> Self {
        self.limits.retry_times = retry_times;
        self.limits.retry_backoff_secs = backoff_secs;
        self
    }

    pub fn with_timeout(mut self, request_secs: u64) -> Self {
        self.timeouts.request_secs = request_secs;
        self
    }

    pub fn with_endpoints(mut self, endpoints: Endpoints) -> Self {
        self.endpoints = endpoints;
        self
    }

    /// 所有端點指向同一個 base（測試用 mock server）
    pub fn with_base_url(self, base: &str) -> Self {
        let endpoints = Endpoints {
            vndb_api: format!("{}/kana/vn", base),
            vndb_site: base.to_string(),
            dlsite_base: base.to_string(),
            dlsite_modes: vec!["maniax".to_string(), "pro".to_string()],
            fanza_search_base: base.to_string(),
            fanza_detail_base: base.to_string(),
        };
        self.with_endpoints(endpoints)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.timeouts.request_secs)
    }

    pub fn image_timeout(&self) -> Duration {
        Duration::from_secs(self.timeouts.image_secs)
    }
}
