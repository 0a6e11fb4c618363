//! Optimistic unit of work over a [`LedgerStore`].
//!
//! A `Transaction` is the single path through which a ledger operation reads
//! and writes state. Reads are recorded with the version they observed;
//! writes are buffered. Nothing reaches the store until the owner turns the
//! transaction into a [`CommitBatch`] and commits it, and the store only
//! accepts the batch if none of the observed keys moved in the meantime.
//!
//! Dropping a transaction is a rollback.
//!
//! # Read semantics
//!
//! 1. A key written earlier in the same transaction reads back the pending value
//! 2. A key read earlier reads back the same snapshot (repeatable reads)
//! 3. Otherwise the committed value is fetched and its version recorded
//!
//! A key written without ever being read is committed with the expectation
//! that it is still absent.

use crate::error::StorageError;
use crate::event::LedgerEvent;
use crate::storage::{CommitBatch, LedgerStore, Version};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Encode a value the way the ledgers store it (bincode).
///
/// # Errors
///
/// Returns [`StorageError::Serialization`] if the value cannot be encoded.
pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, StorageError> {
    bincode::serialize(value).map_err(|e| StorageError::Serialization(e.to_string()))
}

/// Decode a stored value.
///
/// # Errors
///
/// Returns [`StorageError::Serialization`] if the bytes are not a valid `T`.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, StorageError> {
    bincode::deserialize(bytes).map_err(|e| StorageError::Serialization(e.to_string()))
}

#[derive(Debug)]
struct Observed {
    version: Version,
    data: Option<Vec<u8>>,
}

/// A unit of work spanning any number of ledgers.
pub struct Transaction {
    store: Arc<dyn LedgerStore>,
    observed: BTreeMap<String, Observed>,
    pending: BTreeMap<String, Vec<u8>>,
    events: Vec<LedgerEvent>,
}

impl Transaction {
    /// Begin a new, empty unit of work against `store`.
    #[must_use]
    pub fn begin(store: Arc<dyn LedgerStore>) -> Self {
        Self {
            store,
            observed: BTreeMap::new(),
            pending: BTreeMap::new(),
            events: Vec::new(),
        }
    }

    /// Read and decode a key.
    ///
    /// # Errors
    ///
    /// - [`StorageError::Backend`] if the store read fails
    /// - [`StorageError::Serialization`] if the stored bytes do not decode as `T`
    pub async fn get<T: DeserializeOwned>(&mut self, key: &str) -> Result<Option<T>, StorageError> {
        if let Some(bytes) = self.pending.get(key) {
            return decode(bytes).map(Some);
        }

        if !self.observed.contains_key(key) {
            let fetched = self.store.get(key).await?;
            let observed = match fetched {
                Some(value) => Observed {
                    version: value.version,
                    data: Some(value.data),
                },
                None => Observed {
                    version: Version::ABSENT,
                    data: None,
                },
            };
            self.observed.insert(key.to_string(), observed);
        }

        match self.observed.get(key).and_then(|o| o.data.as_deref()) {
            Some(bytes) => decode(bytes).map(Some),
            None => Ok(None),
        }
    }

    /// Read a key, falling back to `T::default()` when it was never written.
    ///
    /// # Errors
    ///
    /// Same as [`Transaction::get`].
    pub async fn get_or_default<T: DeserializeOwned + Default>(
        &mut self,
        key: &str,
    ) -> Result<T, StorageError> {
        Ok(self.get(key).await?.unwrap_or_default())
    }

    /// Buffer a write. Later reads of `key` in this transaction see `value`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Serialization`] if the value cannot be encoded.
    pub fn put<T: Serialize>(&mut self, key: impl Into<String>, value: &T) -> Result<(), StorageError> {
        let bytes = encode(value)?;
        self.pending.insert(key.into(), bytes);
        Ok(())
    }

    /// Record a notification to publish once this unit of work commits.
    pub fn emit(&mut self, event: LedgerEvent) {
        self.events.push(event);
    }

    /// Events emitted so far.
    #[must_use]
    pub fn events(&self) -> &[LedgerEvent] {
        &self.events
    }

    /// Whether the transaction has buffered any write.
    #[must_use]
    pub fn has_writes(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Consume the transaction into its commit batch and emitted events.
    #[must_use]
    pub fn into_parts(self) -> (CommitBatch, Vec<LedgerEvent>) {
        let mut expectations: Vec<(String, Version)> = self
            .observed
            .iter()
            .map(|(key, observed)| (key.clone(), observed.version))
            .collect();

        // Blind writes: the key must still be absent
        expectations.extend(
            self.pending
                .keys()
                .filter(|key| !self.observed.contains_key(*key))
                .map(|key| (key.clone(), Version::ABSENT)),
        );

        let batch = CommitBatch {
            expectations,
            writes: self.pending.into_iter().collect(),
        };
        tracing::trace!(
            reads = batch.expectations.len(),
            writes = batch.writes.len(),
            events = self.events.len(),
            "Sealed unit of work"
        );

        (batch, self.events)
    }
}

impl std::fmt::Debug for Transaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("observed", &self.observed.keys().collect::<Vec<_>>())
            .field("pending", &self.pending.keys().collect::<Vec<_>>())
            .field("events", &self.events.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::storage::{StoreFuture, VersionedValue};
    use crate::types::Amount;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Minimal read-only store seeded with fixed entries.
    struct SeededStore {
        entries: Mutex<HashMap<String, VersionedValue>>,
    }

    impl SeededStore {
        fn with(entries: Vec<(&str, u64, Vec<u8>)>) -> Arc<Self> {
            let entries = entries
                .into_iter()
                .map(|(key, version, data)| {
                    (key.to_string(), VersionedValue { version: Version::new(version), data })
                })
                .collect();
            Arc::new(Self { entries: Mutex::new(entries) })
        }
    }

    impl LedgerStore for SeededStore {
        fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<VersionedValue>> {
            let value = self.entries.lock().ok().and_then(|e| e.get(key).cloned());
            Box::pin(async move { Ok(value) })
        }

        fn commit(&self, _batch: CommitBatch) -> StoreFuture<'_, ()> {
            Box::pin(async { Err(StorageError::Backend("read-only".to_string())) })
        }
    }

    #[tokio::test]
    async fn reads_record_observed_versions() {
        let store = SeededStore::with(vec![("balance/alice", 4, encode(&Amount::new(20)).unwrap())]);
        let mut tx = Transaction::begin(store);

        let balance: Option<Amount> = tx.get("balance/alice").await.unwrap();
        let missing: Option<Amount> = tx.get("balance/bob").await.unwrap();
        assert_eq!(balance, Some(Amount::new(20)));
        assert_eq!(missing, None);

        let (batch, events) = tx.into_parts();
        assert!(batch.is_empty());
        assert!(events.is_empty());
        assert_eq!(batch.expected_version("balance/alice"), Some(Version::new(4)));
        assert_eq!(batch.expected_version("balance/bob"), Some(Version::ABSENT));
    }

    #[tokio::test]
    async fn pending_writes_are_read_back() {
        let store = SeededStore::with(vec![("balance/alice", 1, encode(&Amount::new(20)).unwrap())]);
        let mut tx = Transaction::begin(store);

        let before: Amount = tx.get_or_default("balance/alice").await.unwrap();
        tx.put("balance/alice", &Amount::new(10)).unwrap();
        let after: Amount = tx.get_or_default("balance/alice").await.unwrap();

        assert_eq!(before, Amount::new(20));
        assert_eq!(after, Amount::new(10));
        assert!(tx.has_writes());

        let (batch, _) = tx.into_parts();
        // The write is guarded by the version read before it
        assert_eq!(batch.expected_version("balance/alice"), Some(Version::new(1)));
        assert_eq!(batch.writes.len(), 1);
    }

    #[tokio::test]
    async fn blind_writes_expect_absence() {
        let mut tx = Transaction::begin(SeededStore::with(vec![]));
        tx.put("ticket/1", &"alice".to_string()).unwrap();

        let (batch, _) = tx.into_parts();
        assert_eq!(batch.expected_version("ticket/1"), Some(Version::ABSENT));
    }

    #[tokio::test]
    async fn undecodable_value_is_a_serialization_error() {
        let store = SeededStore::with(vec![("ticket/counter", 1, vec![0xff])]);
        let mut tx = Transaction::begin(store);

        let result: Result<Option<u64>, _> = tx.get("ticket/counter").await;
        assert!(matches!(result, Err(StorageError::Serialization(_))));
    }
}
