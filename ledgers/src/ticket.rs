//! Ticket ledger: uniquely-owned tickets sold for fungible tokens.
//!
//! # Ticket lifecycle
//!
//! ```text
//! Unissued ──issue──► Owned ──transfer──► Owned
//!                        │
//!                     destroy
//!                        ▼
//!                    Destroyed (terminal)
//! ```
//!
//! A destroyed ticket keeps its key with a tombstone record, so the id can
//! never be issued again and a racing redemption of the same id conflicts.
//!
//! # Sale window
//!
//! Before the configured start time anyone may buy; from the start time on,
//! only the administrator may issue (for example to comp a guest). The
//! window is derived from the injected clock on every call.

use crate::capability::{FungibleLedger, LedgerFuture, TicketRegistry};
use crate::keys;
use attendance_core::environment::Clock;
use attendance_core::error::LedgerError;
use attendance_core::event::LedgerEvent;
use attendance_core::transaction::Transaction;
use attendance_core::types::{Address, Amount, SaleState, TicketId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Stored state of an issued ticket.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TicketRecord {
    /// Live ticket held by `owner`.
    Owned {
        /// Current holder.
        owner: Address,
    },
    /// Ticket consumed by a redemption.
    Destroyed {
        /// Holder at the time it was destroyed.
        last_owner: Address,
    },
}

/// Fixed identity and metadata of the ticket ledger.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketConfig {
    /// Address under which the ledger holds escrowed tokens.
    pub address: Address,
    /// Address allowed to issue after the start, set the price and withdraw.
    pub administrator: Address,
    /// The only caller allowed to destroy tickets.
    pub redeemer: Address,
    /// Collection name.
    pub name: String,
    /// Collection symbol.
    pub symbol: String,
    /// Event start; sales close and redemption opens at this instant.
    pub start_time: DateTime<Utc>,
}

/// Issues, transfers and destroys tickets.
#[derive(Clone)]
pub struct TicketLedger {
    config: TicketConfig,
    tokens: Arc<dyn FungibleLedger>,
    clock: Arc<dyn Clock>,
}

impl TicketLedger {
    /// Create a ledger that charges through `tokens` and reads time from `clock`.
    #[must_use]
    pub fn new(config: TicketConfig, tokens: Arc<dyn FungibleLedger>, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            tokens,
            clock,
        }
    }

    /// Store the initial price. Only writes when no price exists yet.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Storage`] if the store fails.
    pub async fn initialize(&self, tx: &mut Transaction, price: Amount) -> Result<(), LedgerError> {
        if tx.get::<Amount>(keys::TICKET_PRICE).await?.is_none() {
            tx.put(keys::TICKET_PRICE, &price)?;
        }
        Ok(())
    }

    // ========== Mutations ==========

    /// Sell a ticket to `recipient`, paid for by `payer`.
    ///
    /// The price is pulled from `payer` into this ledger's escrow through
    /// the allowance `payer` granted to this ledger's address. The counter
    /// and the ticket record are only written once the pull succeeded.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::SaleClosed`] if the event started and `payer` is not the administrator
    /// - [`LedgerError::InsufficientBalance`] if `payer` cannot cover the price
    /// - any error of the token pull, unchanged (`NotWhitelisted`, `InsufficientAllowance`, ...)
    pub async fn issue(
        &self,
        tx: &mut Transaction,
        payer: &Address,
        recipient: &Address,
    ) -> Result<TicketId, LedgerError> {
        if self.sale_state() == SaleState::Closed {
            if *payer != self.config.administrator {
                return Err(LedgerError::SaleClosed {
                    started_at: self.config.start_time,
                });
            }
            tracing::debug!(recipient = %recipient, "Administrator issuing after sale close");
        }

        let price = self.price(tx).await?;
        let available = self.tokens.balance_of(tx, payer).await?;
        if available < price {
            return Err(LedgerError::InsufficientBalance {
                address: payer.clone(),
                requested: price,
                available,
            });
        }

        self.tokens
            .transfer_from(tx, &self.config.address, payer, &self.config.address, price)
            .await?;

        let ticket_id = TicketId::new(self.issued_count(tx).await? + 1);
        tx.put(keys::TICKET_COUNTER, &ticket_id.value())?;
        tx.put(
            keys::ticket(ticket_id),
            &TicketRecord::Owned {
                owner: recipient.clone(),
            },
        )?;
        tx.emit(LedgerEvent::TicketIssued {
            ticket_id,
            payer: payer.clone(),
            recipient: recipient.clone(),
            price,
        });

        Ok(ticket_id)
    }

    /// Hand a ticket from its owner to `to`.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::InvalidTicket`] if the ticket is not live
    /// - [`LedgerError::NotOwner`] if `caller` does not hold it
    pub async fn transfer(
        &self,
        tx: &mut Transaction,
        caller: &Address,
        to: &Address,
        ticket_id: TicketId,
    ) -> Result<(), LedgerError> {
        let owner = self.owner_of(tx, ticket_id).await?;
        if owner != *caller {
            return Err(LedgerError::NotOwner {
                ticket_id,
                caller: caller.clone(),
            });
        }

        tx.put(keys::ticket(ticket_id), &TicketRecord::Owned { owner: to.clone() })?;
        tx.emit(LedgerEvent::TicketTransferred {
            ticket_id,
            from: owner,
            to: to.clone(),
        });
        Ok(())
    }

    /// Change the price charged by subsequent issuances.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Unauthorized`] if `caller` is not the administrator.
    pub async fn update_price(
        &self,
        tx: &mut Transaction,
        caller: &Address,
        new_price: Amount,
    ) -> Result<(), LedgerError> {
        self.ensure_administrator(caller)?;

        let old_price = self.price(tx).await?;
        tx.put(keys::TICKET_PRICE, &new_price)?;
        tx.emit(LedgerEvent::PriceUpdated { old_price, new_price });
        Ok(())
    }

    /// Move `amount` of escrowed tokens to the administrator.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::Unauthorized`] if `caller` is not the administrator
    /// - [`LedgerError::InsufficientContractBalance`] if escrow holds less than `amount`
    /// - any error of the token transfer, unchanged
    pub async fn withdraw(&self, tx: &mut Transaction, caller: &Address, amount: Amount) -> Result<(), LedgerError> {
        self.ensure_administrator(caller)?;

        let available = self.escrow_balance(tx).await?;
        if available < amount {
            return Err(LedgerError::InsufficientContractBalance {
                requested: amount,
                available,
            });
        }

        self.tokens
            .transfer(tx, &self.config.address, &self.config.administrator, amount)
            .await?;
        tx.emit(LedgerEvent::Withdrawn {
            to: self.config.administrator.clone(),
            amount,
        });
        Ok(())
    }

    /// Permanently destroy a live ticket.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::Unauthorized`] if `caller` is not the configured redeemer
    /// - [`LedgerError::InvalidTicket`] if the ticket is not live
    pub async fn destroy(&self, tx: &mut Transaction, ticket_id: TicketId, caller: &Address) -> Result<(), LedgerError> {
        if *caller != self.config.redeemer {
            return Err(LedgerError::Unauthorized { caller: caller.clone() });
        }

        let owner = self.owner_of(tx, ticket_id).await?;
        tx.put(
            keys::ticket(ticket_id),
            &TicketRecord::Destroyed {
                last_owner: owner.clone(),
            },
        )?;
        tx.emit(LedgerEvent::TicketDestroyed { ticket_id, owner });
        Ok(())
    }

    // ========== Reads ==========

    /// Current owner of a live ticket.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::InvalidTicket`] if the id was never issued or was destroyed.
    pub async fn owner_of(&self, tx: &mut Transaction, ticket_id: TicketId) -> Result<Address, LedgerError> {
        match tx.get::<TicketRecord>(&keys::ticket(ticket_id)).await? {
            Some(TicketRecord::Owned { owner }) => Ok(owner),
            Some(TicketRecord::Destroyed { .. }) | None => Err(LedgerError::InvalidTicket(ticket_id)),
        }
    }

    /// Current price.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Storage`] if the store fails.
    pub async fn price(&self, tx: &mut Transaction) -> Result<Amount, LedgerError> {
        Ok(tx.get_or_default(keys::TICKET_PRICE).await?)
    }

    /// Number of tickets issued so far, which is also the highest id.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Storage`] if the store fails.
    pub async fn issued_count(&self, tx: &mut Transaction) -> Result<u64, LedgerError> {
        Ok(tx.get_or_default(keys::TICKET_COUNTER).await?)
    }

    /// Tokens held in escrow by this ledger.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Storage`] if the store fails.
    pub async fn escrow_balance(&self, tx: &mut Transaction) -> Result<Amount, LedgerError> {
        self.tokens.balance_of(tx, &self.config.address).await
    }

    /// Sale phase at the current clock time.
    #[must_use]
    pub fn sale_state(&self) -> SaleState {
        SaleState::at(self.clock.now(), self.config.start_time)
    }

    /// Collection name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Collection symbol.
    #[must_use]
    pub fn symbol(&self) -> &str {
        &self.config.symbol
    }

    /// Event start time.
    #[must_use]
    pub const fn start_time(&self) -> DateTime<Utc> {
        self.config.start_time
    }

    /// Escrow address of this ledger.
    #[must_use]
    pub const fn address(&self) -> &Address {
        &self.config.address
    }

    /// Fixed configuration.
    #[must_use]
    pub const fn config(&self) -> &TicketConfig {
        &self.config
    }

    fn ensure_administrator(&self, caller: &Address) -> Result<(), LedgerError> {
        if *caller == self.config.administrator {
            Ok(())
        } else {
            Err(LedgerError::Unauthorized { caller: caller.clone() })
        }
    }
}

impl std::fmt::Debug for TicketLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TicketLedger")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl TicketRegistry for TicketLedger {
    fn sale_start(&self) -> DateTime<Utc> {
        self.config.start_time
    }

    fn owner_of<'a>(&'a self, tx: &'a mut Transaction, ticket_id: TicketId) -> LedgerFuture<'a, Address> {
        Box::pin(Self::owner_of(self, tx, ticket_id))
    }

    fn destroy<'a>(
        &'a self,
        tx: &'a mut Transaction,
        ticket_id: TicketId,
        caller: &'a Address,
    ) -> LedgerFuture<'a, ()> {
        Box::pin(Self::destroy(self, tx, ticket_id, caller))
    }
}
