use crate::config::AppConfig;
use crate::error::FetchError;
use anyhow::{Context, Result};
use reqwest::header::{COOKIE, HeaderMap, HeaderName, HeaderValue, USER_AGENT};
use reqwest::{Client, Method, Response};
use std::sync::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};

/// 會自動重試的狀態碼
const RETRY_STATUSES: [u16; 4] = [500, 502, 503, 504];

/// 單次請求的覆寫選項
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub cookies: Vec<(String, String)>,
    pub headers: HeaderMap,
    pub timeout: Option<Duration>,
    pub json: Option<serde_json::Value>,
    /// 非冪等方法（POST）也套用 5xx 重試
    pub retry_non_idempotent: bool,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cookies(mut self, cookies: &[(String, String)]) -> Self {
        self.cookies.extend(cookies.iter().cloned());
        self
    }

    pub fn with_header(mut self, name: HeaderName, value: &str) -> Self {
        if let Ok(value) = HeaderValue::from_str(value) {
            self.headers.insert(name, value);
        }
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_json(mut self, body: serde_json::Value) -> Self {
        self.json = Some(body);
        self
    }

    pub fn retry_non_idempotent(mut self) -> Self {
        self.retry_non_idempotent = true;
        self
    }

    fn cookie_header(&self) -> Option<String> {
        if self.cookies.is_empty() {
            return None;
        }
        Some(
            self.cookies
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect::<Vec<_>>()
                .join("; "),
        )
    }
}

/// 共用的 HTTP client：連線池、5xx 重試、傳輸層失敗時重建連線
pub struct ResilientClient {
    session: RwLock<Option<Client>>,
    user_agent: String,
    timeout: Duration,
    pool_max_idle_per_host: usize,
    max_retries: u32,
    backoff: Duration,
    resets: AtomicU64,
}

impl ResilientClient {
    pub fn new(config: &AppConfig) -> Result<Self> {
        let client = Self {
            session: RwLock::new(None),
            user_agent: config.user_agent.clone(),
            timeout: config.request_timeout(),
            pool_max_idle_per_host: config.limits.pool_max_idle_per_host,
            max_retries: config.limits.retry_times,
            backoff: Duration::from_secs_f64(config.limits.retry_backoff_secs.max(0.0)),
            resets: AtomicU64::new(0),
        };
        client.session()?;
        info!("網路服務初始化完成");
        Ok(client)
    }

    fn build_session(&self) -> Result<Client> {
        Client::builder()
            .timeout(self.timeout)
            .user_agent(self.user_agent.as_str())
            .pool_max_idle_per_host(self.pool_max_idle_per_host)
            .build()
            .context("無法建立 HTTP 客戶端")
    }

    /// 取得目前的 session，已關閉時重新建立
    fn session(&self) -> Result<Client> {
        if let Some(client) = self.session.read().ok().and_then(|s| s.clone()) {
            return Ok(client);
        }
        let mut guard = self
            .session
            .write()
            .map_err(|_| anyhow::anyhow!("session lock poisoned"))?;
        if let Some(client) = guard.as_ref() {
            return Ok(client.clone());
        }
        let client = self.build_session()?;
        *guard = Some(client.clone());
        Ok(client)
    }

    /// 丟棄舊連線池並重建
    pub fn reset(&self) -> Result<()> {
        let client = self.build_session()?;
        let mut guard = self
            .session
            .write()
            .map_err(|_| anyhow::anyhow!("session lock poisoned"))?;
        *guard = Some(client);
        self.resets.fetch_add(1, Ordering::Relaxed);
        debug!("網路連線已重置");
        Ok(())
    }

    /// 釋放連線池；可重複呼叫，之後的請求會重新建立 session
    pub fn close(&self) {
        if let Ok(mut guard) = self.session.write() {
            if guard.take().is_some() {
                info!("網路服務已關閉");
            }
        }
    }

    /// 已重建 session 的次數
    pub fn resets(&self) -> u64 {
        self.resets.load(Ordering::Relaxed)
    }

    pub async fn get(&self, url: &str, options: &RequestOptions) -> Result<Response> {
        self.request(Method::GET, url, options).await
    }

    pub async fn post(&self, url: &str, options: &RequestOptions) -> Result<Response> {
        self.request(Method::POST, url, options).await
    }

    /// GET 並讀取文字內容
    pub async fn get_text(&self, url: &str, options: &RequestOptions) -> Result<String> {
        let response = self.get(url, options).await?;
        response.text().await.context("讀取回應失敗")
    }

    async fn request(&self, method: Method, url: &str, options: &RequestOptions) -> Result<Response> {
        let client = self.session()?;
        match self.send_with_retry(&client, &method, url, options).await {
            Err(e) if is_transport_failure(&e) => {
                warn!(url, error = %e, "連線錯誤，重置連線後重試");
                self.reset()?;
                let client = self.session()?;
                self.send_with_retry(&client, &method, url, options).await
            }
            other => other,
        }
    }

    /// 帶重試的請求（指數退避）
    async fn send_with_retry(
        &self,
        client: &Client,
        method: &Method,
        url: &str,
        options: &RequestOptions,
    ) -> Result<Response> {
        let retryable = *method == Method::GET || *method == Method::HEAD || options.retry_non_idempotent;
        let mut attempt: u32 = 0;

        loop {
            let response = self.build(client, method, url, options).send().await?;
            let status = response.status().as_u16();

            if !retryable || !RETRY_STATUSES.contains(&status) {
                return Ok(response);
            }
            if attempt >= self.max_retries {
                return Err(FetchError::Network(format!(
                    "HTTP {} after {} retries: {}",
                    status, self.max_retries, url
                ))
                .into());
            }

            let wait = self.backoff.mul_f64(2f64.powi(attempt as i32));
            attempt += 1;
            debug!(url, status, attempt, "伺服器錯誤，稍後重試");
            tokio::time::sleep(wait).await;
        }
    }

    fn build(&self, client: &Client, method: &Method, url: &str, options: &RequestOptions) -> reqwest::RequestBuilder {
        let mut builder = client
            .request(method.clone(), url)
            .timeout(options.timeout.unwrap_or(self.timeout));

        if !options.headers.contains_key(USER_AGENT) {
            builder = builder.header(USER_AGENT, self.user_agent.as_str());
        }
        builder = builder.headers(options.headers.clone());
        if let Some(cookie) = options.cookie_header() {
            builder = builder.header(COOKIE, cookie);
        }
        if let Some(body) = &options.json {
            builder = builder.json(body);
        }
        builder
    }
}

/// TLS / 連線層失敗（逾時不算）
fn is_transport_failure(err: &anyhow::Error) -> bool {
    err.chain()
        .filter_map(|cause| cause.downcast_ref::<reqwest::Error>())
        .any(|e| e.is_connect() && !e.is_timeout())
}
