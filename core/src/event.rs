//! Notifications produced by committed units of work.
//!
//! Events describe facts that have happened. They are buffered inside the
//! [`Transaction`](crate::transaction::Transaction) that produced them and
//! only published after that transaction commits, so a subscriber never sees
//! an event for a change that was rolled back.
//!
//! The store remains the source of truth; events are for observers.
//!
//! # Event Naming Convention
//!
//! `event_type()` returns a stable identifier with a version suffix, e.g.
//! `"TicketIssued.v1"`, so consumers can route and evolve schemas.

use crate::types::{Address, Amount, RedemptionId, TicketId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Everything that can happen across the four ledgers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerEvent {
    // ========== Whitelist ==========
    /// An address became a whitelist member.
    WhitelistAdded {
        /// The new member.
        address: Address,
    },

    /// An address stopped being a whitelist member.
    WhitelistRemoved {
        /// The removed member.
        address: Address,
    },

    // ========== Balance ledger ==========
    /// New tokens were created.
    Minted {
        /// Credited address.
        to: Address,
        /// Minted amount.
        amount: Amount,
    },

    /// An allowance was set (overwritten).
    Approval {
        /// Token owner.
        owner: Address,
        /// Approved spender.
        spender: Address,
        /// New allowance.
        amount: Amount,
    },

    /// Tokens moved between addresses.
    Transferred {
        /// Debited address.
        from: Address,
        /// Credited address.
        to: Address,
        /// Moved amount.
        amount: Amount,
    },

    // ========== Ticket ledger ==========
    /// A ticket was sold and issued.
    TicketIssued {
        /// New ticket id.
        ticket_id: TicketId,
        /// Address that paid.
        payer: Address,
        /// Address that owns the ticket.
        recipient: Address,
        /// Price paid.
        price: Amount,
    },

    /// A ticket changed hands.
    TicketTransferred {
        /// Ticket id.
        ticket_id: TicketId,
        /// Previous owner.
        from: Address,
        /// New owner.
        to: Address,
    },

    /// A ticket was destroyed on redemption.
    TicketDestroyed {
        /// Ticket id.
        ticket_id: TicketId,
        /// Owner at the time of destruction.
        owner: Address,
    },

    /// The ticket price changed.
    PriceUpdated {
        /// Previous price.
        old_price: Amount,
        /// New price.
        new_price: Amount,
    },

    /// Escrowed tokens were withdrawn to the administrator.
    Withdrawn {
        /// Receiving administrator.
        to: Address,
        /// Withdrawn amount.
        amount: Amount,
    },

    // ========== Redemption ledger ==========
    /// A ticket was redeemed for a proof-of-attendance record.
    Redeemed {
        /// New redemption id.
        redemption_id: RedemptionId,
        /// Source ticket.
        ticket_id: TicketId,
        /// Owner of the redemption record.
        owner: Address,
        /// When it happened.
        redeemed_at: DateTime<Utc>,
    },
}

impl LedgerEvent {
    /// Stable, versioned event type name.
    #[must_use]
    pub const fn event_type(&self) -> &'static str {
        match self {
            Self::WhitelistAdded { .. } => "WhitelistAdded.v1",
            Self::WhitelistRemoved { .. } => "WhitelistRemoved.v1",
            Self::Minted { .. } => "Minted.v1",
            Self::Approval { .. } => "Approval.v1",
            Self::Transferred { .. } => "Transferred.v1",
            Self::TicketIssued { .. } => "TicketIssued.v1",
            Self::TicketTransferred { .. } => "TicketTransferred.v1",
            Self::TicketDestroyed { .. } => "TicketDestroyed.v1",
            Self::PriceUpdated { .. } => "PriceUpdated.v1",
            Self::Withdrawn { .. } => "Withdrawn.v1",
            Self::Redeemed { .. } => "Redeemed.v1",
        }
    }
}
