use thiserror::Error;

/// 錯誤訊息顯示時的截斷長度
const MESSAGE_LIMIT: usize = 20;

/// 失敗分類
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("request timed out")]
    Timeout,
    #[error("network error: {0}")]
    Network(String),
    #[error("parse error: {0}")]
    Parse(String),
    #[error("{0}")]
    Unclassified(String),
}

impl FetchError {
    /// 沿著錯誤鏈找出 reqwest / FetchError 並分類
    pub fn classify(err: &anyhow::Error) -> FetchError {
        for cause in err.chain() {
            if let Some(e) = cause.downcast_ref::<reqwest::Error>() {
                if e.is_timeout() {
                    return FetchError::Timeout;
                }
                return FetchError::Network(e.to_string());
            }
            if let Some(e) = cause.downcast_ref::<FetchError>() {
                return e.clone();
            }
        }
        FetchError::Unclassified(err.to_string())
    }

    /// 給使用者看的簡短訊息
    pub fn user_message(&self) -> String {
        match self {
            FetchError::Timeout => "timeout".to_string(),
            FetchError::Network(_) => "network error".to_string(),
            FetchError::Parse(msg) | FetchError::Unclassified(msg) => {
                format!("error: {}", truncate(msg, MESSAGE_LIMIT))
            }
        }
    }
}

/// 依字元（非位元組）截斷
pub fn truncate(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}
