//! Redemption ledger: non-transferable proof-of-attendance records.
//!
//! Redeeming consumes a live ticket through the [`TicketRegistry`] and
//! creates a record in its place. Because the ticket is destroyed in the
//! same unit of work, a second redemption of the same id fails with
//! `InvalidTicket`, and two racing redemptions cannot both commit.

use crate::capability::TicketRegistry;
use crate::keys;
use attendance_core::environment::Clock;
use attendance_core::error::LedgerError;
use attendance_core::event::LedgerEvent;
use attendance_core::transaction::Transaction;
use attendance_core::types::{Address, RedemptionId, TicketId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A redemption and where it came from.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedemptionRecord {
    /// Redemption id.
    pub id: RedemptionId,
    /// Holder of the record. Records never change hands.
    pub owner: Address,
    /// Ticket that was consumed.
    pub ticket_id: TicketId,
    /// Clock time of the redemption.
    pub redeemed_at: DateTime<Utc>,
}

/// Fixed identity and metadata of the redemption ledger.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedemptionConfig {
    /// Address the ticket ledger recognizes as its redeemer.
    pub address: Address,
    /// Collection name.
    pub name: String,
    /// Collection symbol.
    pub symbol: String,
}

/// Converts tickets into redemption records once the event has started.
#[derive(Clone)]
pub struct RedemptionLedger {
    config: RedemptionConfig,
    tickets: Arc<dyn TicketRegistry>,
    clock: Arc<dyn Clock>,
}

impl RedemptionLedger {
    /// Create a ledger redeeming tickets of `tickets`.
    #[must_use]
    pub fn new(config: RedemptionConfig, tickets: Arc<dyn TicketRegistry>, clock: Arc<dyn Clock>) -> Self {
        Self { config, tickets, clock }
    }

    /// Redeem `ticket_id`, crediting the new record to `recipient`.
    ///
    /// Preconditions, in order:
    /// 1. the event has started (`EventNotStarted`)
    /// 2. the ticket is live (`InvalidTicket`)
    /// 3. `caller` holds it (`NotOwner`)
    ///
    /// # Errors
    ///
    /// Any failed precondition above, or any error the ticket ledger reports
    /// while destroying the ticket. Nothing is written in either case.
    pub async fn redeem(
        &self,
        tx: &mut Transaction,
        caller: &Address,
        ticket_id: TicketId,
        recipient: &Address,
    ) -> Result<RedemptionId, LedgerError> {
        let now = self.clock.now();
        let starts_at = self.tickets.sale_start();
        if now < starts_at {
            return Err(LedgerError::EventNotStarted { starts_at });
        }

        let holder = self.tickets.owner_of(tx, ticket_id).await?;
        if holder != *caller {
            return Err(LedgerError::NotOwner {
                ticket_id,
                caller: caller.clone(),
            });
        }

        self.tickets.destroy(tx, ticket_id, &self.config.address).await?;

        let id = RedemptionId::new(self.redeemed_count(tx).await? + 1);
        let record = RedemptionRecord {
            id,
            owner: recipient.clone(),
            ticket_id,
            redeemed_at: now,
        };
        tx.put(keys::REDEMPTION_COUNTER, &id.value())?;
        tx.put(keys::redemption(id), &record)?;
        tx.put(keys::redemption_by_ticket(ticket_id), &id)?;
        tx.emit(LedgerEvent::Redeemed {
            redemption_id: id,
            ticket_id,
            owner: recipient.clone(),
            redeemed_at: now,
        });

        Ok(id)
    }

    /// Holder of a redemption record.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::InvalidRedemption`] if the id was never issued.
    pub async fn owner_of(&self, tx: &mut Transaction, id: RedemptionId) -> Result<Address, LedgerError> {
        Ok(self.redemption(tx, id).await?.owner)
    }

    /// Full redemption record.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::InvalidRedemption`] if the id was never issued.
    pub async fn redemption(&self, tx: &mut Transaction, id: RedemptionId) -> Result<RedemptionRecord, LedgerError> {
        tx.get(&keys::redemption(id))
            .await?
            .ok_or(LedgerError::InvalidRedemption(id))
    }

    /// Redemption created from `ticket_id`, if it was redeemed.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Storage`] if the store fails.
    pub async fn redemption_for_ticket(
        &self,
        tx: &mut Transaction,
        ticket_id: TicketId,
    ) -> Result<Option<RedemptionId>, LedgerError> {
        Ok(tx.get(&keys::redemption_by_ticket(ticket_id)).await?)
    }

    /// Number of redemptions so far, which is also the highest id.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Storage`] if the store fails.
    pub async fn redeemed_count(&self, tx: &mut Transaction) -> Result<u64, LedgerError> {
        Ok(tx.get_or_default(keys::REDEMPTION_COUNTER).await?)
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

    /// Address of this ledger.
    #[must_use]
    pub const fn address(&self) -> &Address {
        &self.config.address
    }
}

impl std::fmt::Debug for RedemptionLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedemptionLedger")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::capability::LedgerFuture;
    use attendance_testing::{FixedClock, InMemoryLedgerStore};
    use chrono::Duration;
    use std::sync::Mutex;

    /// Ticket registry with a fixed set of live tickets.
    struct StubTickets {
        start: DateTime<Utc>,
        live: Mutex<Vec<(TicketId, Address)>>,
    }

    impl TicketRegistry for StubTickets {
        fn sale_start(&self) -> DateTime<Utc> {
            self.start
        }

        fn owner_of<'a>(&'a self, _tx: &'a mut Transaction, ticket_id: TicketId) -> LedgerFuture<'a, Address> {
            let owner = self
                .live
                .lock()
                .unwrap()
                .iter()
                .find(|(id, _)| *id == ticket_id)
                .map(|(_, owner)| owner.clone());
            Box::pin(async move { owner.ok_or(LedgerError::InvalidTicket(ticket_id)) })
        }

        fn destroy<'a>(
            &'a self,
            _tx: &'a mut Transaction,
            ticket_id: TicketId,
            _caller: &'a Address,
        ) -> LedgerFuture<'a, ()> {
            let mut live = self.live.lock().unwrap();
            let before = live.len();
            live.retain(|(id, _)| *id != ticket_id);
            let removed = live.len() < before;
            Box::pin(async move {
                if removed {
                    Ok(())
                } else {
                    Err(LedgerError::InvalidTicket(ticket_id))
                }
            })
        }
    }

    fn ledger(now: DateTime<Utc>, start: DateTime<Utc>) -> RedemptionLedger {
        let tickets = StubTickets {
            start,
            live: Mutex::new(vec![(TicketId::new(1), Address::new("alice"))]),
        };
        let config = RedemptionConfig {
            address: Address::new("redemptions"),
            name: "X Tickets".to_string(),
            symbol: "XP".to_string(),
        };
        RedemptionLedger::new(config, Arc::new(tickets), Arc::new(FixedClock::new(now)))
    }

    #[tokio::test]
    async fn redemption_before_start_fails_even_for_invalid_tickets() {
        let start = Utc::now();
        let ledger = ledger(start - Duration::seconds(1), start);
        let mut tx = Transaction::begin(Arc::new(InMemoryLedgerStore::new()));

        for id in [1, 42] {
            let err = ledger
                .redeem(&mut tx, &Address::new("alice"), TicketId::new(id), &Address::new("alice"))
                .await
                .unwrap_err();
            assert_eq!(err, LedgerError::EventNotStarted { starts_at: start });
        }
        assert_eq!(ledger.redeemed_count(&mut tx).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn redeem_records_the_source_ticket() {
        let start = Utc::now();
        let ledger = ledger(start, start);
        let mut tx = Transaction::begin(Arc::new(InMemoryLedgerStore::new()));
        let alice = Address::new("alice");

        let id = ledger.redeem(&mut tx, &alice, TicketId::new(1), &alice).await.unwrap();

        assert_eq!(id, RedemptionId::new(1));
        let record = ledger.redemption(&mut tx, id).await.unwrap();
        assert_eq!(record.owner, alice);
        assert_eq!(record.ticket_id, TicketId::new(1));
        assert_eq!(record.redeemed_at, start);
        assert_eq!(
            ledger.redemption_for_ticket(&mut tx, TicketId::new(1)).await.unwrap(),
            Some(id)
        );

        let err = ledger.redeem(&mut tx, &alice, TicketId::new(1), &alice).await.unwrap_err();
        assert_eq!(err, LedgerError::InvalidTicket(TicketId::new(1)));
    }

    #[tokio::test]
    async fn only_the_holder_may_redeem() {
        let start = Utc::now();
        let ledger = ledger(start, start);
        let mut tx = Transaction::begin(Arc::new(InMemoryLedgerStore::new()));
        let carol = Address::new("carol");

        let err = ledger.redeem(&mut tx, &carol, TicketId::new(1), &carol).await.unwrap_err();
        assert_eq!(
            err,
            LedgerError::NotOwner {
                ticket_id: TicketId::new(1),
                caller: carol
            }
        );
        assert!(!tx.has_writes());
    }

    #[tokio::test]
    async fn unknown_redemption_is_invalid() {
        let start = Utc::now();
        let ledger = ledger(start, start);
        let mut tx = Transaction::begin(Arc::new(InMemoryLedgerStore::new()));

        let err = ledger.owner_of(&mut tx, RedemptionId::new(7)).await.unwrap_err();
        assert_eq!(err, LedgerError::InvalidRedemption(RedemptionId::new(7)));
    }
}
