//! A record store that can be switched off mid-test.

use std::sync::{
    Arc,
    atomic::{AtomicBool, AtomicUsize, Ordering},
};

use async_trait::async_trait;
use drugwire::{
    protocol::DrugRecord,
    store::{RecordStore, StoreError},
};

/// Wraps another store and fails every call while offline.
///
/// Calls made while offline are counted but never reach the inner store.
#[derive(Clone)]
pub struct FlakyStore {
    inner: Arc<dyn RecordStore>,
    offline: Arc<AtomicBool>,
    rejected: Arc<AtomicUsize>,
}

impl FlakyStore {
    #[must_use]
    pub fn new(inner: Arc<dyn RecordStore>) -> Self {
        Self {
            inner,
            offline: Arc::new(AtomicBool::new(false)),
            rejected: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Take the store offline or bring it back.
    pub fn set_offline(&self, offline: bool) { self.offline.store(offline, Ordering::SeqCst); }

    /// Number of calls rejected while offline.
    #[must_use]
    pub fn rejected_calls(&self) -> usize { self.rejected.load(Ordering::SeqCst) }

    fn check(&self) -> Result<(), StoreError> {
        if self.offline.load(Ordering::SeqCst) {
            self.rejected.fetch_add(1, Ordering::SeqCst);
            log::debug!("flaky store rejecting call while offline");
            return Err(StoreError::Unavailable("switched off by test".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl RecordStore for FlakyStore {
    async fn insert(&self, record: DrugRecord) -> Result<(), StoreError> {
        self.check()?;
        self.inner.insert(record).await
    }

    async fn find_by_name(&self, fragment: &str) -> Result<Vec<DrugRecord>, StoreError> {
        self.check()?;
        self.inner.find_by_name(fragment).await
    }

    async fn upsert_manufacture_date(&self, name: &str, date: &str) -> Result<(), StoreError> {
        self.check()?;
        self.inner.upsert_manufacture_date(name, date).await
    }

    async fn latest_manufacture_date(&self, name: &str) -> Result<Option<String>, StoreError> {
        self.check()?;
        self.inner.latest_manufacture_date(name).await
    }
}
