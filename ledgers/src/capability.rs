//! Capabilities one ledger exposes to another.
//!
//! Cross-ledger calls are explicit trait objects injected at construction:
//!
//! ```text
//! RedemptionLedger ──TicketRegistry──► TicketLedger ──FungibleLedger──► BalanceLedger
//!                                                                          │
//!                                                          MembershipRegistry
//!                                                                          ▼
//!                                                                 WhitelistRegistry
//! ```
//!
//! Every method takes the caller's [`Transaction`], so the nested call is part
//! of the same unit of work: if it fails, the outer operation fails with the
//! same error and nothing is committed.
//!
//! Note: Returns boxed futures instead of `async fn` to be dyn-compatible (object-safe).

use attendance_core::error::LedgerError;
use attendance_core::transaction::Transaction;
use attendance_core::types::{Address, Amount, TicketId};
use chrono::{DateTime, Utc};
use std::future::Future;
use std::pin::Pin;

/// Boxed future returned by every capability method.
pub type LedgerFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, LedgerError>> + Send + 'a>>;

/// Membership predicate used to gate balance-affecting operations.
pub trait MembershipRegistry: Send + Sync {
    /// Whether `address` is currently a member. No side effects.
    fn is_member<'a>(&'a self, tx: &'a mut Transaction, address: &'a Address)
    -> LedgerFuture<'a, bool>;
}

/// Fungible-token operations the ticket ledger relies on.
pub trait FungibleLedger: Send + Sync {
    /// Current balance of `address`.
    fn balance_of<'a>(&'a self, tx: &'a mut Transaction, address: &'a Address)
    -> LedgerFuture<'a, Amount>;

    /// Pull `amount` from `owner` to `to` on behalf of `spender`, consuming allowance.
    fn transfer_from<'a>(
        &'a self,
        tx: &'a mut Transaction,
        spender: &'a Address,
        owner: &'a Address,
        to: &'a Address,
        amount: Amount,
    ) -> LedgerFuture<'a, ()>;

    /// Move `amount` from `from` to `to` without allowance involvement.
    fn transfer<'a>(
        &'a self,
        tx: &'a mut Transaction,
        from: &'a Address,
        to: &'a Address,
        amount: Amount,
    ) -> LedgerFuture<'a, ()>;
}

/// Ticket operations the redemption ledger relies on.
pub trait TicketRegistry: Send + Sync {
    /// Configured event start time.
    fn sale_start(&self) -> DateTime<Utc>;

    /// Current owner of a live ticket.
    fn owner_of<'a>(&'a self, tx: &'a mut Transaction, ticket_id: TicketId)
    -> LedgerFuture<'a, Address>;

    /// Permanently destroy a live ticket. Only the authorized redeemer may call.
    fn destroy<'a>(
        &'a self,
        tx: &'a mut Transaction,
        ticket_id: TicketId,
        caller: &'a Address,
    ) -> LedgerFuture<'a, ()>;
}
