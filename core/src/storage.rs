//! Durable, versioned key-value storage for the ledgers.
//!
//! This module defines the storage abstraction the ledgers persist through:
//! a key-value store where every key carries a version, and where a batch of
//! writes commits atomically only if every key the batch depends on is still
//! at the version it was read at.
//!
//! # Design
//!
//! The `LedgerStore` trait is deliberately minimal:
//!
//! - Read one key with its current version
//! - Commit a batch of writes guarded by version expectations (all or nothing)
//!
//! Keys are never deleted. A ticket that is destroyed is overwritten with a
//! tombstone record, so versions only ever move forward.
//!
//! # Implementations
//!
//! - `PostgresLedgerStore` (in `attendance-postgres` crate): Production implementation
//! - `InMemoryLedgerStore` (in `attendance-testing` crate): Fast, deterministic testing

use crate::error::StorageError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::pin::Pin;

/// Version number of a stored key, for optimistic concurrency control.
///
/// Version 0 means the key has never been written. Each committed write
/// increments the key's version by one.
///
/// # Examples
///
/// ```
/// use attendance_core::storage::Version;
///
/// let v0 = Version::ABSENT;
/// assert!(v0.is_absent());
/// assert_eq!(v0.next(), Version::new(1));
/// ```
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Version(u64);

impl Version {
    /// The version of a key that has never been written.
    pub const ABSENT: Self = Self(0);

    /// Create a new `Version` with the given value.
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Get the version number.
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }

    /// Get the next version (current + 1).
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }

    /// Check if this is the version of a never-written key.
    #[must_use]
    pub const fn is_absent(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A stored value together with the version it was read at.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VersionedValue {
    /// Current version of the key (never `ABSENT` for a stored value).
    pub version: Version,
    /// Bincode-encoded value bytes.
    pub data: Vec<u8>,
}

/// An atomic batch of guarded writes.
///
/// `expectations` lists every key the unit of work depends on together with
/// the version it observed (`Version::ABSENT` for keys it saw missing or wrote
/// blind). `writes` is the new content of every modified key.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CommitBatch {
    /// `(key, expected version)` pairs that must all still hold at commit time.
    pub expectations: Vec<(String, Version)>,
    /// `(key, encoded value)` pairs applied when every expectation holds.
    pub writes: Vec<(String, Vec<u8>)>,
}

impl CommitBatch {
    /// Whether the batch changes nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    /// The version the batch expects for `key`, if it depends on it.
    #[must_use]
    pub fn expected_version(&self, key: &str) -> Option<Version> {
        self.expectations
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, version)| *version)
    }
}

/// Type alias for the boxed futures returned by [`LedgerStore`].
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StorageError>> + Send + 'a>>;

/// Durable key-value store abstraction for the ledgers.
///
/// # Atomicity
///
/// `commit` must be atomic: either every write in the batch becomes visible
/// (and every written key's version increments by one) or none does. A reader
/// never observes part of a batch.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync` to be shared across tasks.
///
/// # Dyn Compatibility
///
/// This trait uses explicit `Pin<Box<dyn Future>>` returns instead of `async fn`
/// so ledgers can hold it as `Arc<dyn LedgerStore>`.
pub trait LedgerStore: Send + Sync {
    /// Read a key with its current version.
    ///
    /// Returns `None` if the key has never been written.
    ///
    /// # Errors
    ///
    /// - `Backend`: connection or query failure
    fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<VersionedValue>>;

    /// Atomically apply a batch of writes if every expectation still holds.
    ///
    /// # Errors
    ///
    /// - `Conflict`: some key's current version differs from the expected one;
    ///   nothing was written
    /// - `Backend`: connection or query failure; nothing was written
    fn commit(&self, batch: CommitBatch) -> StoreFuture<'_, ()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_ordering_and_next() {
        assert!(Version::ABSENT < Version::new(1));
        assert_eq!(Version::new(41).next().value(), 42);
        assert!(!Version::new(1).is_absent());
    }

    #[test]
    fn batch_lookup_by_key() {
        let batch = CommitBatch {
            expectations: vec![
                ("balance/alice".to_string(), Version::new(3)),
                ("ticket/1".to_string(), Version::ABSENT),
            ],
            writes: vec![("ticket/1".to_string(), vec![1])],
        };

        assert_eq!(batch.expected_version("balance/alice"), Some(Version::new(3)));
        assert_eq!(batch.expected_version("ticket/1"), Some(Version::ABSENT));
        assert_eq!(batch.expected_version("ticket/2"), None);
        assert!(!batch.is_empty());
    }
}
