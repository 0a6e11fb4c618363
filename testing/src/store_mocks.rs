//! In-memory ledger store for fast, deterministic tests.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)] // Panics only on a poisoned lock

use attendance_core::error::StorageError;
use attendance_core::storage::{CommitBatch, LedgerStore, StoreFuture, Version, VersionedValue};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

/// `HashMap`-backed [`LedgerStore`] with the same commit semantics as the
/// PostgreSQL store: every expectation is checked and every write applied
/// under one lock, so a batch is all-or-nothing.
///
/// Reads yield to the scheduler once before answering, which lets
/// concurrent units of work interleave the way they would against a real
/// database.
///
/// # Example
///
/// ```
/// use attendance_testing::InMemoryLedgerStore;
/// use attendance_core::storage::{CommitBatch, LedgerStore, Version};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let store = InMemoryLedgerStore::new();
///
/// store.commit(CommitBatch {
///     expectations: vec![("ticket/counter".to_string(), Version::ABSENT)],
///     writes: vec![("ticket/counter".to_string(), vec![1])],
/// }).await?;
///
/// let value = store.get("ticket/counter").await?;
/// assert_eq!(value.map(|v| v.version), Some(Version::new(1)));
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug, Default)]
pub struct InMemoryLedgerStore {
    data: Arc<RwLock<HashMap<String, VersionedValue>>>,
    fail_next_commit: Arc<AtomicBool>,
    commits: Arc<AtomicUsize>,
}

impl InMemoryLedgerStore {
    /// Create a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `commit` fail with a backend error without applying anything.
    ///
    /// Useful to prove that a unit of work rolls back as a whole.
    pub fn fail_next_commit(&self) {
        self.fail_next_commit.store(true, Ordering::SeqCst);
    }

    /// Number of batches committed successfully.
    #[must_use]
    pub fn commits(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }

    /// Number of stored keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.read().unwrap().len()
    }

    /// Check if the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.read().unwrap().is_empty()
    }

    /// All stored keys, sorted.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.data.read().unwrap().keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Current version of `key` (`Version::ABSENT` if never written).
    #[must_use]
    pub fn version(&self, key: &str) -> Version {
        self.data
            .read()
            .unwrap()
            .get(key)
            .map_or(Version::ABSENT, |v| v.version)
    }

    fn apply(&self, batch: CommitBatch) -> Result<(), StorageError> {
        if self.fail_next_commit.swap(false, Ordering::SeqCst) {
            return Err(StorageError::Backend("injected commit failure".to_string()));
        }

        let mut data = self.data.write().unwrap();

        for (key, expected) in &batch.expectations {
            let actual = data.get(key).map_or(Version::ABSENT, |v| v.version);
            if actual != *expected {
                return Err(StorageError::Conflict {
                    key: key.clone(),
                    expected: *expected,
                    actual,
                });
            }
        }

        for (key, value) in batch.writes {
            let version = data.get(&key).map_or(Version::ABSENT, |v| v.version).next();
            data.insert(key, VersionedValue { version, data: value });
        }

        self.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

impl LedgerStore for InMemoryLedgerStore {
    fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<VersionedValue>> {
        Box::pin(async move {
            tokio::task::yield_now().await;
            Ok(self.data.read().unwrap().get(key).cloned())
        })
    }

    fn commit(&self, batch: CommitBatch) -> StoreFuture<'_, ()> {
        Box::pin(async move { self.apply(batch) })
    }
}
