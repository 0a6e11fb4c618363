//! # Attendance Core
//!
//! Core types and traits shared by the attendance ledgers.
//!
//! The system issues event tickets as uniquely-owned tokens, charges a
//! fungible-token price for them, and converts spent tickets into
//! non-transferable proof-of-attendance records once the event has begun.
//! This crate holds the pieces every ledger needs but none of them owns:
//!
//! - **Types**: `Address`, `Amount`, `TicketId`, `RedemptionId`, `SaleState`
//! - **Errors**: the `LedgerError` taxonomy surfaced to callers
//! - **Environment**: the injected `Clock`
//! - **Storage**: the versioned `LedgerStore` trait (durable, atomic multi-key commit)
//! - **Transaction**: an optimistic unit of work over a `LedgerStore`
//! - **Events**: `LedgerEvent` notifications produced by committed units of work
//!
//! ## Architecture Principles
//!
//! - All mutations of one operation go through a single `Transaction`
//! - A transaction either commits every write or none
//! - Concurrent writers are detected by key versions, never by locks held across calls
//! - Dependencies (clock, store) are injected, never ambient
//!
//! ## Example
//!
//! ```ignore
//! use attendance_core::{transaction::Transaction, types::Address};
//!
//! let mut tx = Transaction::begin(store.clone());
//! let balance: Option<Amount> = tx.get("balance/alice").await?;
//! tx.put("balance/alice", &balance.unwrap_or_default())?;
//! store.commit(tx.into_parts().0).await?;
//! ```

// Re-export commonly used types
pub use chrono::{DateTime, Utc};
pub use serde::{Deserialize, Serialize};

pub mod error;
pub mod event;
pub mod storage;
pub mod transaction;
pub mod types;

pub use error::{LedgerError, StorageError};
pub use event::LedgerEvent;
pub use storage::{CommitBatch, LedgerStore, Version, VersionedValue};
pub use transaction::Transaction;
pub use types::{Address, Amount, RedemptionId, SaleState, TicketId};

/// Environment module - Dependency injection traits
///
/// External dependencies are abstracted behind traits and injected into
/// each ledger at construction.
pub mod environment {
    use chrono::{DateTime, Utc};

    /// Clock trait - abstracts time operations for testability
    ///
    /// The sale window and the event start are both evaluated against
    /// this clock at the moment an operation runs.
    ///
    /// # Examples
    ///
    /// ```
    /// use attendance_core::environment::{Clock, SystemClock};
    ///
    /// let clock = SystemClock;
    /// let before = clock.now();
    /// assert!(clock.now() >= before);
    /// ```
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;
    }

    /// Production clock backed by the system time.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }
}
