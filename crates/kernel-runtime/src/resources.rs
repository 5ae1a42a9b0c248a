//! Post-call eviction of transient heavy resources (spec'd dispatch step 8).
//!
//! An extensible registry of `(resource_key -> dispose_fn)` with no required
//! entries; skills and backends register a disposer against a resource key
//! (e.g. a vector-store handle path) and the gateway drops it after every
//! call that touched it. Dropping the kernel's reference does not affect
//! in-flight callers already holding their own `Arc`.

use std::collections::HashMap;
use std::sync::Mutex;

type DisposeFn = Box<dyn Fn() + Send + Sync>;

pub struct HeavyResourceRegistry {
    disposers: Mutex<HashMap<String, DisposeFn>>,
}

impl HeavyResourceRegistry {
    pub fn new() -> Self {
        Self {
            disposers: Mutex::new(HashMap::new()),
        }
    }

    /// Register a disposer under `resource_key`, replacing any prior one.
    pub fn register(&self, resource_key: impl Into<String>, dispose: impl Fn() + Send + Sync + 'static) {
        self.disposers
            .lock()
            .expect("heavy resource registry lock poisoned")
            .insert(resource_key.into(), Box::new(dispose));
    }

    /// Run and remove the disposer for `resource_key`, if one is registered.
    /// A no-op for keys with nothing registered, matching the spec's "no
    /// required entries" resolution.
    pub fn evict(&self, resource_key: &str) {
        let disposer = self
            .disposers
            .lock()
            .expect("heavy resource registry lock poisoned")
            .remove(resource_key);
        if let Some(dispose) = disposer {
            dispose();
        }
    }

    pub fn is_registered(&self, resource_key: &str) -> bool {
        self.disposers
            .lock()
            .expect("heavy resource registry lock poisoned")
            .contains_key(resource_key)
    }
}

impl Default for HeavyResourceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn evict_runs_disposer_once() {
        let registry = HeavyResourceRegistry::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        registry.register("qdrant:git", move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        registry.evict("qdrant:git");
        registry.evict("qdrant:git");

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn evict_unregistered_key_is_a_no_op() {
        let registry = HeavyResourceRegistry::new();
        registry.evict("nothing:here");
    }

    #[test]
    fn is_registered_reflects_current_state() {
        let registry = HeavyResourceRegistry::new();
        assert!(!registry.is_registered("k"));
        registry.register("k", || {});
        assert!(registry.is_registered("k"));
        registry.evict("k");
        assert!(!registry.is_registered("k"));
    }
}
