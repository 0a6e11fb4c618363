//! Error taxonomy for ledger operations.
//!
//! Every error is detected where a precondition is evaluated and surfaces
//! unchanged to the immediate caller. A failure inside a nested ledger call
//! aborts the whole outer operation with that same error.

use crate::storage::Version;
use crate::types::{Address, Amount, RedemptionId, TicketId};
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors raised by the durable store.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// Optimistic concurrency conflict: a key changed after it was read.
    ///
    /// Another unit of work committed first. Nothing from the rejected
    /// batch was applied.
    #[error("Concurrency conflict on {key}: expected version {expected}, found {actual}")]
    Conflict {
        /// The key whose version moved.
        key: String,
        /// The version observed when the key was read.
        expected: Version,
        /// The version found at commit time.
        actual: Version,
    },

    /// Backend failure (connection, query, I/O).
    #[error("Storage backend error: {0}")]
    Backend(String),

    /// A stored value could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Errors surfaced by ledger operations.
///
/// Callers receive the specific kind, so "not enough funds", "not allowed"
/// and "ticket already used" stay distinguishable.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// The caller lacks the administrator role (or, for ticket destruction,
    /// is not the configured redemption ledger).
    #[error("Unauthorized: {caller} may not perform this operation")]
    Unauthorized {
        /// The rejected caller.
        caller: Address,
    },

    /// An address failed the whitelist membership check.
    #[error("Address {0} is not whitelisted")]
    NotWhitelisted(Address),

    /// The spender's allowance does not cover the requested pull.
    #[error("Insufficient allowance: {spender} may pull {available} from {owner}, requested {requested}")]
    InsufficientAllowance {
        /// Owner of the tokens.
        owner: Address,
        /// Spender attempting the pull.
        spender: Address,
        /// Requested amount.
        requested: Amount,
        /// Remaining allowance.
        available: Amount,
    },

    /// The debited address does not hold enough tokens.
    #[error("Insufficient balance: {address} holds {available}, requested {requested}")]
    InsufficientBalance {
        /// Debited address.
        address: Address,
        /// Requested amount.
        requested: Amount,
        /// Current balance.
        available: Amount,
    },

    /// A withdrawal exceeds the ticket ledger's escrowed balance.
    #[error("Insufficient contract balance: escrow holds {available}, requested {requested}")]
    InsufficientContractBalance {
        /// Requested withdrawal.
        requested: Amount,
        /// Escrowed balance.
        available: Amount,
    },

    /// The ticket id was never issued or has already been destroyed.
    #[error("Invalid ticket: {0}")]
    InvalidTicket(TicketId),

    /// The redemption id was never issued.
    #[error("Invalid redemption: {0}")]
    InvalidRedemption(RedemptionId),

    /// The caller does not own the ticket it is acting on.
    #[error("{caller} does not own ticket {ticket_id}")]
    NotOwner {
        /// Ticket in question.
        ticket_id: TicketId,
        /// Caller that is not the owner.
        caller: Address,
    },

    /// The event has started; only the administrator may issue tickets.
    #[error("Event already started at {started_at}; ticket sales are finished")]
    SaleClosed {
        /// Configured start time.
        started_at: DateTime<Utc>,
    },

    /// Redemption attempted before the event start.
    #[error("Event has not started yet; it starts at {starts_at}")]
    EventNotStarted {
        /// Configured start time.
        starts_at: DateTime<Utc>,
    },

    /// A credit would overflow the amount type.
    #[error("Amount overflow")]
    AmountOverflow,

    /// The durable store failed or rejected the unit of work.
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl LedgerError {
    /// Whether this error is an optimistic-concurrency conflict.
    ///
    /// Conflicts mean another unit of work committed first; re-evaluating
    /// the operation against the new state is safe.
    #[must_use]
    pub const fn is_conflict(&self) -> bool {
        matches!(self, Self::Storage(StorageError::Conflict { .. }))
    }

    /// Short, stable label for logs and metrics.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Unauthorized { .. } => "unauthorized",
            Self::NotWhitelisted(_) => "not_whitelisted",
            Self::InsufficientAllowance { .. } => "insufficient_allowance",
            Self::InsufficientBalance { .. } => "insufficient_balance",
            Self::InsufficientContractBalance { .. } => "insufficient_contract_balance",
            Self::InvalidTicket(_) => "invalid_ticket",
            Self::InvalidRedemption(_) => "invalid_redemption",
            Self::NotOwner { .. } => "not_owner",
            Self::SaleClosed { .. } => "sale_closed",
            Self::EventNotStarted { .. } => "event_not_started",
            Self::AmountOverflow => "amount_overflow",
            Self::Storage(StorageError::Conflict { .. }) => "conflict",
            Self::Storage(_) => "storage",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflict_error_display() {
        let error = StorageError::Conflict {
            key: "balance/alice".to_string(),
            expected: Version::new(2),
            actual: Version::new(3),
        };

        let display = format!("{error}");
        assert!(display.contains("balance/alice"));
        assert!(display.contains("expected version 2"));
        assert!(display.contains("found 3"));
    }

    #[test]
    fn conflicts_are_the_only_retryable_errors() {
        let conflict = LedgerError::from(StorageError::Conflict {
            key: "ticket/counter".to_string(),
            expected: Version::new(1),
            actual: Version::new(2),
        });
        assert!(conflict.is_conflict());
        assert_eq!(conflict.kind(), "conflict");

        let backend = LedgerError::from(StorageError::Backend("down".to_string()));
        assert!(!backend.is_conflict());
        assert!(!LedgerError::InvalidTicket(TicketId::new(1)).is_conflict());
    }
}
