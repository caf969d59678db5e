// 宣告模組
pub mod cache;
pub mod config;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod fetcher;
pub mod imaging;
pub mod loader;
pub mod pool;
pub mod providers;
pub mod sniffing;
pub mod types;

pub use config::AppConfig;
pub use dispatch::{CallbackQueue, CallbackSender, SearchService};
pub use engine::SearchOrchestrator;
pub use error::FetchError;
pub use types::{GroupedResults, SearchResponse, SearchResult, SearchSource, SniffResult, format_found};
