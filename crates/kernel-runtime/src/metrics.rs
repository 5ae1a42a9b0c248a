//! Dispatch-relevant counters: how often the kernel dispatches, how often
//! the resident set hits vs misses, and how often skills reload or get
//! evicted. Exposed as a single immutable `snapshot()` for the CLI's
//! `info` command and any future metrics exporter.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

pub struct KernelMetrics {
    dispatch_count: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    reload_count: AtomicU64,
    eviction_count: AtomicU64,
    permission_denied_count: AtomicU64,
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub dispatch_count: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub reload_count: u64,
    pub eviction_count: u64,
    pub permission_denied_count: u64,
    pub cache_hit_rate: f64,
}

impl KernelMetrics {
    pub fn new() -> Self {
        Self {
            dispatch_count: AtomicU64::new(0),
            cache_hits: AtomicU64::new(0),
            cache_misses: AtomicU64::new(0),
            reload_count: AtomicU64::new(0),
            eviction_count: AtomicU64::new(0),
            permission_denied_count: AtomicU64::new(0),
        }
    }

    pub fn record_dispatch(&self) {
        self.dispatch_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_reload(&self) {
        self.reload_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_eviction(&self) {
        self.eviction_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_permission_denied(&self) {
        self.permission_denied_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let hits = self.cache_hits.load(Ordering::Relaxed);
        let misses = self.cache_misses.load(Ordering::Relaxed);
        let total = hits + misses;
        let cache_hit_rate = if total == 0 { 0.0 } else { hits as f64 / total as f64 };

        MetricsSnapshot {
            dispatch_count: self.dispatch_count.load(Ordering::Relaxed),
            cache_hits: hits,
            cache_misses: misses,
            reload_count: self.reload_count.load(Ordering::Relaxed),
            eviction_count: self.eviction_count.load(Ordering::Relaxed),
            permission_denied_count: self.permission_denied_count.load(Ordering::Relaxed),
            cache_hit_rate,
        }
    }
}

impl Default for KernelMetrics {
    fn default() -> Self {
        Self::new()
    }
}
