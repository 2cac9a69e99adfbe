//! Process-wide lookup of the last known manufacture date per drug name.
//!
//! `LookupCache` is shared by every connection. Entries are only inserted or
//! overwritten, never evicted, so concurrent writers to one name race with
//! last-writer-wins semantics. The cache sits in front of the store: readers
//! consult it first and fall back to the store on a miss.

use dashmap::DashMap;

/// Concurrent `name -> manufacture date` map.
#[derive(Debug, Default)]
pub struct LookupCache(DashMap<String, String>);

impl LookupCache {
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Return the cached date for `name`, if any.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<String> {
        self.0.get(name).map(|entry| entry.value().clone())
    }

    /// Insert or overwrite the date for `name`.
    pub fn put(&self, name: impl Into<String>, date: impl Into<String>) {
        self.0.insert(name.into(), date.into());
    }

    #[must_use]
    pub fn len(&self) -> usize { self.0.len() }

    #[must_use]
    pub fn is_empty(&self) -> bool { self.0.is_empty() }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[test]
    fn put_overwrites_previous_value() {
        let cache = LookupCache::new();
        cache.put("Aspirin", "2023-01");
        cache.put("Aspirin", "2024-02");

        assert_eq!(cache.get("Aspirin").as_deref(), Some("2024-02"));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn lookups_are_exact() {
        let cache = LookupCache::new();
        cache.put("Aspirin", "2023-01");

        assert_eq!(cache.get("aspirin"), None);
        assert_eq!(cache.get("Aspirin 100mg"), None);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_writers_leave_one_value_per_name() {
        let cache = Arc::new(LookupCache::new());
        let tasks: Vec<_> = (0..16)
            .map(|i| {
                let cache = Arc::clone(&cache);
                tokio::spawn(async move {
                    cache.put("shared", format!("2024-{i:02}"));
                    cache.put(format!("own-{i}"), "2024-01");
                })
            })
            .collect();
        for task in tasks {
            task.await.expect("writer should not panic");
        }

        assert_eq!(cache.len(), 17);
        assert!(cache.get("shared").is_some_and(|d| d.starts_with("2024-")));
    }
}
