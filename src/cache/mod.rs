pub mod image;
pub mod lru;

pub use self::image::{ImageCache, MemoryMonitor};
pub use self::lru::{CacheStats, LruCache};
