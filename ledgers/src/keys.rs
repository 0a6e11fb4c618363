//! Storage key layout.
//!
//! Each ledger owns its own key prefix; no ledger reads or writes another
//! ledger's keys directly, only through that ledger's capability trait.

use attendance_core::types::{Address, RedemptionId, TicketId};

/// Whitelist membership flag for an address.
#[must_use]
pub fn member(address: &Address) -> String {
    format!("whitelist/{address}")
}

/// Fungible balance of an address.
#[must_use]
pub fn balance(address: &Address) -> String {
    format!("balance/{address}")
}

/// Amount `spender` may still pull from `owner`.
#[must_use]
pub fn allowance(owner: &Address, spender: &Address) -> String {
    format!("allowance/{owner}/{spender}")
}

/// Total amount ever minted.
pub const TOTAL_SUPPLY: &str = "token/supply";

/// Current ticket price.
pub const TICKET_PRICE: &str = "ticket/price";

/// Number of tickets issued so far (also the highest assigned id).
pub const TICKET_COUNTER: &str = "ticket/counter";

/// Record of one ticket.
#[must_use]
pub fn ticket(id: TicketId) -> String {
    format!("ticket/{id}")
}

/// Number of redemptions so far (also the highest assigned id).
pub const REDEMPTION_COUNTER: &str = "redemption/counter";

/// Record of one redemption.
#[must_use]
pub fn redemption(id: RedemptionId) -> String {
    format!("redemption/{id}")
}

/// Redemption created from a given ticket.
#[must_use]
pub fn redemption_by_ticket(ticket_id: TicketId) -> String {
    format!("redemption/by-ticket/{ticket_id}")
}
