use crate::types::SearchResult;
use std::future::Future;
use std::sync::{Arc, Mutex};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::debug;

/// 只保留最新一次載入的圖片請求；舊請求完成後直接丟棄，不中斷 I/O
pub struct CancellableImageFetch {
    generation: Arc<Mutex<u64>>,
    runtime: Handle,
}

impl CancellableImageFetch {
    pub fn new(runtime: Handle) -> Self {
        Self {
            generation: Arc::new(Mutex::new(0)),
            runtime,
        }
    }

    fn advance(generation: &Mutex<u64>) -> u64 {
        let mut current = generation.lock().unwrap_or_else(|p| p.into_inner());
        *current += 1;
        *current
    }

    fn is_current(generation: &Mutex<u64>, token: u64) -> bool {
        *generation.lock().unwrap_or_else(|p| p.into_inner()) == token
    }

    pub fn current_generation(&self) -> u64 {
        *self.generation.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// 在背景執行 fetcher；完成時仍是最新一代才呼叫 callback
    pub fn load<F, Fut, T, S, E>(&self, result: SearchResult, on_success: S, on_failure: E, fetcher: F) -> JoinHandle<()>
    where
        F: FnOnce(SearchResult) -> Fut + Send + 'static,
        Fut: Future<Output = Option<T>> + Send + 'static,
        T: Send + 'static,
        S: FnOnce(T) + Send + 'static,
        E: FnOnce() + Send + 'static,
    {
        let token = Self::advance(&self.generation);
        let generation = Arc::clone(&self.generation);
        let id = result.id.clone();

        self.runtime.spawn(async move {
            let outcome = fetcher(result).await;

            if !Self::is_current(&generation, token) {
                debug!(%id, token, "圖片請求已過期，捨棄結果");
                return;
            }
            match outcome {
                Some(value) => on_success(value),
                None => on_failure(),
            }
        })
    }

    /// 讓進行中的請求失效
    pub fn cancel_current(&self) {
        Self::advance(&self.generation);
    }
}
