use super::lru::{CacheStats, LruCache};
use crate::config::AppConfig;
use image::RgbaImage;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// 取得目前常駐記憶體（位元組）；不支援的平台回傳 None
pub type MemorySampler = fn() -> Option<u64>;

/// Linux: /proc/self/status 的 VmRSS（kB）
pub fn resident_memory_bytes() -> Option<u64> {
    if cfg!(target_os = "linux") {
        let content = std::fs::read_to_string("/proc/self/status").ok()?;
        for line in content.lines() {
            if let Some(rest) = line.strip_prefix("VmRSS:") {
                let parts = rest.split_whitespace().collect::<Vec<_>>();
                if let Some(kb) = parts.first().and_then(|s| s.parse::<u64>().ok()) {
                    return Some(kb.saturating_mul(1024));
                }
            }
        }
    }
    None
}

/// 定期取樣記憶體用量，間隔內的呼叫直接略過
pub struct MemoryMonitor {
    threshold_bytes: u64,
    interval: Duration,
    sampler: MemorySampler,
    last_check: Mutex<Option<Instant>>,
}

impl MemoryMonitor {
    pub fn new(threshold_mb: u64, interval: Duration) -> Self {
        Self::with_sampler(threshold_mb, interval, resident_memory_bytes)
    }

    pub fn with_sampler(threshold_mb: u64, interval: Duration, sampler: MemorySampler) -> Self {
        Self {
            threshold_bytes: threshold_mb.saturating_mul(1024 * 1024),
            interval,
            sampler,
            last_check: Mutex::new(None),
        }
    }

    /// 超過門檻時回傳 true
    pub fn under_pressure(&self) -> bool {
        {
            let mut last = self.last_check.lock().unwrap_or_else(|p| p.into_inner());
            if last.is_some_and(|t| t.elapsed() < self.interval) {
                return false;
            }
            *last = Some(Instant::now());
        }

        match (self.sampler)() {
            Some(used) if used > self.threshold_bytes => {
                warn!(
                    used_mb = used / 1024 / 1024,
                    threshold_mb = self.threshold_bytes / 1024 / 1024,
                    "記憶體使用過高"
                );
                true
            }
            _ => false,
        }
    }
}

/// 處理後圖片的快取，以解析後的圖片 URL 為 key
pub struct ImageCache {
    cache: LruCache<String, Arc<RgbaImage>>,
    monitor: MemoryMonitor,
}

impl ImageCache {
    pub fn new(capacity: usize, monitor: MemoryMonitor) -> Self {
        Self {
            cache: LruCache::new(capacity),
            monitor,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        let monitor = MemoryMonitor::new(
            config.limits.memory_threshold_mb,
            Duration::from_secs(config.limits.memory_check_interval_secs),
        );
        Self::new(config.limits.image_cache_size, monitor)
    }

    pub fn get(&self, url: &str) -> Option<Arc<RgbaImage>> {
        self.cache.get(&url.to_string())
    }

    pub fn set(&self, url: &str, image: Arc<RgbaImage>) {
        self.cache.set(url.to_string(), image);
    }

    pub fn contains(&self, url: &str) -> bool {
        self.cache.contains(&url.to_string())
    }

    /// 記憶體壓力過高時整批清空；有清空時回傳 true
    pub fn cleanup_if_needed(&self) -> bool {
        if !self.monitor.under_pressure() {
            return false;
        }
        let dropped = self.cache.len();
        self.cache.clear();
        info!(dropped, "記憶體壓力，已清空圖片快取");
        true
    }

    pub fn clear(&self) {
        self.cache.clear();
        info!("圖片快取已清除");
    }

    pub fn stats(&self) -> CacheStats {
        self.cache.stats()
    }
}
