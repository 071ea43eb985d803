use autoscale_cuckoo_filter::CuckooFilter;
use std::sync::{PoisonError, RwLock};

/// Probabilistic set of punch dedup keys.
///
/// `might_contain == false` means this process never saw the key; `true` may be a false
/// positive and must be confirmed against the cache or the store.
pub struct KeyFilter {
    inner: RwLock<CuckooFilter<str>>,
}

impl KeyFilter {
    pub fn new(capacity: usize, false_positive_rate: f64) -> Self {
        Self {
            inner: RwLock::new(CuckooFilter::new(capacity, false_positive_rate)),
        }
    }

    pub fn might_contain(&self, key: &str) -> bool {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(key)
    }

    pub fn insert(&self, key: &str) {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .add(key);
    }

    pub fn remove(&self, key: &str) {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
    }

    /// Insert a batch under a single write lock
    pub fn insert_batch(&self, keys: &[String]) {
        let mut filter = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        for key in keys {
            filter.add(key);
        }
    }
}
