use crate::engine::SearchOrchestrator;
use crate::loader::CancellableImageFetch;
use crate::types::{GroupedResults, SearchResult};
use image::RgbaImage;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

type Callback = Box<dyn FnOnce() + Send + 'static>;

/// 背景任務把 callback 送回協調執行緒
#[derive(Clone)]
pub struct CallbackSender {
    tx: mpsc::UnboundedSender<Callback>,
}

impl CallbackSender {
    /// 佇列已關閉時回傳 false
    pub fn send<F>(&self, callback: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        self.tx.send(Box::new(callback)).is_ok()
    }
}

/// 協調執行緒端：依送達順序執行 callback
pub struct CallbackQueue {
    rx: mpsc::UnboundedReceiver<Callback>,
}

impl CallbackQueue {
    pub fn new() -> (Self, CallbackSender) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { rx }, CallbackSender { tx })
    }

    /// 執行目前已送達的 callback，不等待
    pub fn run_pending(&mut self) -> usize {
        let mut ran = 0;
        while let Ok(callback) = self.rx.try_recv() {
            callback();
            ran += 1;
        }
        ran
    }

    /// 阻塞直到下一個 callback；所有 sender 都消失時回傳 false。
    /// 不能在 async context 中呼叫。
    pub fn run_next(&mut self) -> bool {
        match self.rx.blocking_recv() {
            Some(callback) => {
                callback();
                true
            }
            None => false,
        }
    }
}

/// 給呈現層使用的入口：工作在 runtime 上執行，結果透過 callback 佇列送回
pub struct SearchService {
    runtime: Handle,
    engine: Arc<SearchOrchestrator>,
    loader: CancellableImageFetch,
    callbacks: CallbackSender,
}

impl SearchService {
    pub fn new(runtime: Handle, engine: Arc<SearchOrchestrator>, callbacks: CallbackSender) -> Self {
        Self {
            loader: CancellableImageFetch::new(runtime.clone()),
            runtime,
            engine,
            callbacks,
        }
    }

    pub fn engine(&self) -> &Arc<SearchOrchestrator> {
        &self.engine
    }

    pub fn search<F>(&self, keyword: &str, on_done: F) -> JoinHandle<()>
    where
        F: FnOnce(GroupedResults) + Send + 'static,
    {
        let engine = Arc::clone(&self.engine);
        let callbacks = self.callbacks.clone();
        let keyword = keyword.to_string();

        self.runtime.spawn(async move {
            let grouped = engine.search_all(&keyword, true).await;
            if !callbacks.send(move || on_done(grouped)) {
                debug!(%keyword, "callback 佇列已關閉");
            }
        })
    }

    /// 載入圖片；新的呼叫會讓前一次的結果失效
    pub fn load_image<S, E>(&self, result: SearchResult, on_success: S, on_failure: E) -> JoinHandle<()>
    where
        S: FnOnce(Arc<RgbaImage>) + Send + 'static,
        E: FnOnce() + Send + 'static,
    {
        let engine = Arc::clone(&self.engine);
        let success_tx = self.callbacks.clone();
        let failure_tx = self.callbacks.clone();

        self.loader.load(
            result,
            move |image| {
                success_tx.send(move || on_success(image));
            },
            move || {
                failure_tx.send(on_failure);
            },
            move |result| async move { engine.fetch_image(&result).await },
        )
    }

    pub fn cancel_image(&self) {
        self.loader.cancel_current();
    }

    pub fn clear_cache(&self) {
        self.engine.clear_cache();
    }

    pub fn shutdown(&self) {
        self.engine.shutdown();
    }
}
