//! Mutating operations as data.
//!
//! Every state change goes through [`Command`], so a transport layer can
//! hand the runtime an already-authenticated caller plus a serialized
//! command, and so logs and metrics can name the operation.

use attendance_core::types::{Address, Amount, RedemptionId, TicketId};
use serde::{Deserialize, Serialize};

/// A mutating operation together with its authenticated caller.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Command {
    /// Administrator adds members.
    AddToWhitelist {
        /// Caller (must be the administrator).
        caller: Address,
        /// Addresses to add.
        addresses: Vec<Address>,
    },
    /// Administrator removes members.
    RemoveFromWhitelist {
        /// Caller (must be the administrator).
        caller: Address,
        /// Addresses to remove.
        addresses: Vec<Address>,
    },
    /// Administrator creates tokens.
    Mint {
        /// Caller (must be the administrator).
        caller: Address,
        /// Credited member.
        to: Address,
        /// Amount created.
        amount: Amount,
    },
    /// Owner sets a spender's allowance.
    Approve {
        /// Token owner (the caller).
        owner: Address,
        /// Approved spender.
        spender: Address,
        /// New allowance.
        amount: Amount,
    },
    /// Spender pulls tokens from an owner.
    TransferFrom {
        /// Spender (the caller).
        spender: Address,
        /// Debited owner.
        owner: Address,
        /// Credited address.
        to: Address,
        /// Amount moved.
        amount: Amount,
    },
    /// Holder sends tokens.
    Transfer {
        /// Debited holder (the caller).
        from: Address,
        /// Credited address.
        to: Address,
        /// Amount moved.
        amount: Amount,
    },
    /// Buy a ticket.
    IssueTicket {
        /// Payer (the caller).
        payer: Address,
        /// Ticket holder.
        recipient: Address,
    },
    /// Hand a ticket to someone else.
    TransferTicket {
        /// Current holder (the caller).
        caller: Address,
        /// New holder.
        to: Address,
        /// Ticket.
        ticket_id: TicketId,
    },
    /// Administrator changes the price.
    UpdatePrice {
        /// Caller (must be the administrator).
        caller: Address,
        /// New price.
        new_price: Amount,
    },
    /// Administrator withdraws escrowed tokens.
    Withdraw {
        /// Caller (must be the administrator).
        caller: Address,
        /// Amount withdrawn.
        amount: Amount,
    },
    /// Convert a ticket into a redemption record.
    Redeem {
        /// Ticket holder (the caller).
        caller: Address,
        /// Ticket consumed.
        ticket_id: TicketId,
        /// Holder of the new record.
        recipient: Address,
    },
}

impl Command {
    /// Stable operation name for logs and metrics.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::AddToWhitelist { .. } => "add_to_whitelist",
            Self::RemoveFromWhitelist { .. } => "remove_from_whitelist",
            Self::Mint { .. } => "mint",
            Self::Approve { .. } => "approve",
            Self::TransferFrom { .. } => "transfer_from",
            Self::Transfer { .. } => "transfer",
            Self::IssueTicket { .. } => "issue_ticket",
            Self::TransferTicket { .. } => "transfer_ticket",
            Self::UpdatePrice { .. } => "update_price",
            Self::Withdraw { .. } => "withdraw",
            Self::Redeem { .. } => "redeem",
        }
    }

    /// The authenticated address issuing the command.
    #[must_use]
    pub const fn caller(&self) -> &Address {
        match self {
            Self::AddToWhitelist { caller, .. }
            | Self::RemoveFromWhitelist { caller, .. }
            | Self::Mint { caller, .. }
            | Self::TransferTicket { caller, .. }
            | Self::UpdatePrice { caller, .. }
            | Self::Withdraw { caller, .. }
            | Self::Redeem { caller, .. } => caller,
            Self::Approve { owner, .. } => owner,
            Self::TransferFrom { spender, .. } => spender,
            Self::Transfer { from, .. } => from,
            Self::IssueTicket { payer, .. } => payer,
        }
    }
}

/// Result of a committed command.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    /// The command committed and has nothing to return.
    Done,
    /// A ticket was issued.
    TicketIssued(TicketId),
    /// A redemption record was created.
    Redeemed(RedemptionId),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn caller_is_the_acting_party() {
        let command = Command::TransferFrom {
            spender: Address::new("ticket-ledger"),
            owner: Address::new("alice"),
            to: Address::new("ticket-ledger"),
            amount: Amount::new(10),
        };
        assert_eq!(command.caller(), &Address::new("ticket-ledger"));
        assert_eq!(command.name(), "transfer_from");
    }
}
