//! # Attendance Ledgers
//!
//! The four cooperating registries behind ticket sales and redemption:
//!
//! - [`WhitelistRegistry`]: addresses allowed to hold and move tokens
//! - [`BalanceLedger`]: fungible balances and allowances
//! - [`TicketLedger`]: uniquely-owned tickets sold for tokens, with escrow
//! - [`RedemptionLedger`]: proof-of-attendance records created by consuming tickets
//!
//! Each ledger owns its own keys and reaches the others only through the
//! capability traits in [`capability`], injected at construction.
//!
//! Every operation takes the caller's address explicitly, and a
//! [`Transaction`](attendance_core::Transaction) that collects reads, writes
//! and events. Operations check all of their preconditions (including nested
//! calls into other ledgers) before writing local state; when any check
//! fails the error is returned unchanged and the caller drops the
//! transaction, so nothing is committed.

pub mod balance;
pub mod capability;
pub mod keys;
pub mod redemption;
pub mod ticket;
pub mod whitelist;

pub use balance::BalanceLedger;
pub use capability::{FungibleLedger, LedgerFuture, MembershipRegistry, TicketRegistry};
pub use redemption::{RedemptionConfig, RedemptionLedger, RedemptionRecord};
pub use ticket::{TicketConfig, TicketLedger, TicketRecord};
pub use whitelist::WhitelistRegistry;
