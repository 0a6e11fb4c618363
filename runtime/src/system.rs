//! The deployed ledger set and its atomic command execution.

use crate::command::{Command, Outcome};
use crate::config::{DeploymentConfig, RuntimeConfig};
use crate::error::DeployError;
use crate::metrics::CommandMetrics;
use crate::retry::{RetryPolicy, retry_with_predicate};
use attendance_core::environment::Clock;
use attendance_core::error::{LedgerError, StorageError};
use attendance_core::event::LedgerEvent;
use attendance_core::storage::LedgerStore;
use attendance_core::transaction::Transaction;
use attendance_core::types::{Address, Amount, RedemptionId, SaleState, TicketId};
use attendance_ledgers::{
    BalanceLedger, RedemptionConfig, RedemptionLedger, RedemptionRecord, TicketConfig, TicketLedger,
    WhitelistRegistry,
};
use chrono::{DateTime, Utc};
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{Mutex, broadcast};
use tracing::Instrument;

/// Key of the persisted [`DeploymentConfig`].
pub const DEPLOYMENT_KEY: &str = "deployment";

/// The four ledgers wired together.
struct Ledgers {
    whitelist: Arc<WhitelistRegistry>,
    tokens: Arc<BalanceLedger>,
    tickets: Arc<TicketLedger>,
    redemptions: RedemptionLedger,
}

impl Ledgers {
    fn build(config: &DeploymentConfig, clock: &Arc<dyn Clock>) -> Self {
        let whitelist = Arc::new(WhitelistRegistry::new(config.administrator.clone()));
        let tokens = Arc::new(BalanceLedger::new(config.administrator.clone(), whitelist.clone()));
        let tickets = Arc::new(TicketLedger::new(
            TicketConfig {
                address: config.ticket_ledger.clone(),
                administrator: config.administrator.clone(),
                redeemer: config.redemption_ledger.clone(),
                name: config.ticket_name.clone(),
                symbol: config.ticket_symbol.clone(),
                start_time: config.start_time,
            },
            tokens.clone(),
            Arc::clone(clock),
        ));
        let redemptions = RedemptionLedger::new(
            RedemptionConfig {
                address: config.redemption_ledger.clone(),
                name: config.redemption_name.clone(),
                symbol: config.redemption_symbol.clone(),
            },
            tickets.clone(),
            Arc::clone(clock),
        );

        Self {
            whitelist,
            tokens,
            tickets,
            redemptions,
        }
    }

    /// Write genesis if the store is empty; otherwise return the stored deployment.
    async fn genesis_or_resume(
        &self,
        store: &Arc<dyn LedgerStore>,
        config: &DeploymentConfig,
    ) -> Result<Option<DeploymentConfig>, LedgerError> {
        let mut tx = Transaction::begin(Arc::clone(store));
        if let Some(stored) = tx.get::<DeploymentConfig>(DEPLOYMENT_KEY).await? {
            return Ok(Some(stored));
        }

        let mut members = config.initial_whitelist.clone();
        members.push(config.ticket_ledger.clone());

        tx.put(DEPLOYMENT_KEY, config)?;
        self.whitelist.add_many(&mut tx, &config.administrator, &members).await?;
        self.tickets.initialize(&mut tx, config.initial_price).await?;

        let (batch, _events) = tx.into_parts();
        store.commit(batch).await?;
        Ok(None)
    }
}

/// A deployed ticketing system: the four ledgers over one durable store.
///
/// Every mutating operation runs as one unit of work: a fresh
/// [`Transaction`], the ledger call (including any nested cross-ledger
/// calls), then one atomic commit. A domain error drops the transaction, so
/// nothing is written. A commit that loses a race against a concurrent unit
/// of work changed nothing either, and the whole unit is run again against
/// the winner's state.
///
/// Units of work on one system run one at a time, so requests racing
/// through the same system queue up instead of conflicting. Conflict retry
/// covers the races that remain: other processes sharing the store.
///
/// Reads run on a fresh transaction and never commit, so they only ever see
/// fully committed state.
///
/// # Example
///
/// ```ignore
/// let system = AttendanceSystem::deploy(config, store, clock, RuntimeConfig::default()).await?;
/// system.approve(&alice, &config.ticket_ledger, Amount::new(10)).await?;
/// let ticket = system.issue_ticket(&alice, &alice).await?;
/// ```
pub struct AttendanceSystem {
    config: DeploymentConfig,
    store: Arc<dyn LedgerStore>,
    ledgers: Ledgers,
    retry: RetryPolicy,
    events: broadcast::Sender<LedgerEvent>,
    units: Mutex<()>,
}

impl AttendanceSystem {
    /// Deploy the ledgers on `store`, or resume the deployment it already holds.
    ///
    /// On an empty store this writes genesis atomically: the deployment
    /// record, the initial price, and the initial whitelist plus the ticket
    /// ledger's own address (it must be a member to hold escrow).
    ///
    /// # Errors
    ///
    /// - [`DeployError::Mismatch`] if the store holds a deployment with a
    ///   different administrator, ledger address or start time
    /// - [`DeployError::Ledger`] if the store fails
    pub async fn deploy(
        config: DeploymentConfig,
        store: Arc<dyn LedgerStore>,
        clock: Arc<dyn Clock>,
        runtime: RuntimeConfig,
    ) -> Result<Self, DeployError> {
        let genesis = Ledgers::build(&config, &clock);
        let (store_ref, config_ref, genesis_ref) = (&store, &config, &genesis);

        let stored = retry_with_predicate(
            &runtime.retry,
            move || genesis_ref.genesis_or_resume(store_ref, config_ref),
            LedgerError::is_conflict,
        )
        .await?;

        let (config, ledgers) = match stored {
            Some(stored) => {
                if let Some(mismatch) = stored.identity_mismatch(&config) {
                    return Err(mismatch);
                }
                tracing::info!(
                    administrator = %stored.administrator,
                    ticket_ledger = %stored.ticket_ledger,
                    "Resumed existing deployment"
                );
                let ledgers = Ledgers::build(&stored, &clock);
                (stored, ledgers)
            }
            None => {
                tracing::info!(
                    administrator = %config.administrator,
                    ticket_ledger = %config.ticket_ledger,
                    start_time = %config.start_time,
                    "Genesis written"
                );
                (config, genesis)
            }
        };

        let (events, _) = broadcast::channel(runtime.event_capacity.max(1));
        Ok(Self {
            config,
            store,
            ledgers,
            retry: runtime.retry,
            events,
            units: Mutex::new(()),
        })
    }

    /// The deployment this system runs (as persisted at genesis).
    #[must_use]
    pub const fn config(&self) -> &DeploymentConfig {
        &self.config
    }

    /// Subscribe to events of committed units of work.
    ///
    /// Events are notifications only; a lagging subscriber may miss some,
    /// while the store stays the source of truth.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<LedgerEvent> {
        self.events.subscribe()
    }

    // ========== Command execution ==========

    /// Execute one command as an atomic unit of work.
    ///
    /// # Errors
    ///
    /// The domain error of the failed precondition, or a storage error.
    /// Nothing is committed in either case.
    pub async fn execute(&self, command: Command) -> Result<Outcome, LedgerError> {
        let span = tracing::debug_span!(
            "execute",
            command = command.name(),
            caller = %command.caller()
        );
        self.dispatch(command).instrument(span).await
    }

    async fn dispatch(&self, command: Command) -> Result<Outcome, LedgerError> {
        match command {
            Command::AddToWhitelist { caller, addresses } => {
                self.add_to_whitelist(&caller, &addresses).await.map(|()| Outcome::Done)
            }
            Command::RemoveFromWhitelist { caller, addresses } => self
                .remove_from_whitelist(&caller, &addresses)
                .await
                .map(|()| Outcome::Done),
            Command::Mint { caller, to, amount } => {
                self.mint(&caller, &to, amount).await.map(|()| Outcome::Done)
            }
            Command::Approve { owner, spender, amount } => {
                self.approve(&owner, &spender, amount).await.map(|()| Outcome::Done)
            }
            Command::TransferFrom {
                spender,
                owner,
                to,
                amount,
            } => self
                .transfer_from(&spender, &owner, &to, amount)
                .await
                .map(|()| Outcome::Done),
            Command::Transfer { from, to, amount } => {
                self.transfer(&from, &to, amount).await.map(|()| Outcome::Done)
            }
            Command::IssueTicket { payer, recipient } => self
                .issue_ticket(&payer, &recipient)
                .await
                .map(Outcome::TicketIssued),
            Command::TransferTicket { caller, to, ticket_id } => self
                .transfer_ticket(&caller, &to, ticket_id)
                .await
                .map(|()| Outcome::Done),
            Command::UpdatePrice { caller, new_price } => {
                self.update_price(&caller, new_price).await.map(|()| Outcome::Done)
            }
            Command::Withdraw { caller, amount } => {
                self.withdraw(&caller, amount).await.map(|()| Outcome::Done)
            }
            Command::Redeem {
                caller,
                ticket_id,
                recipient,
            } => self
                .redeem(&caller, ticket_id, &recipient)
                .await
                .map(Outcome::Redeemed),
        }
    }

    /// Run `unit` with conflict retry, recording metrics and logs under `command`.
    ///
    /// Each attempt holds the unit-of-work lock from its first read to its
    /// commit. Backoff sleeps happen outside the lock.
    #[tracing::instrument(skip_all, fields(command = command, caller = %caller))]
    async fn run<T, F, Fut>(&self, command: &'static str, caller: &Address, mut unit: F) -> Result<T, LedgerError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, LedgerError>>,
    {
        let started = Instant::now();
        let attempt = || {
            let pending = unit();
            async move {
                let _serialized = self.units.lock().await;
                pending.await
            }
        };
        let result = retry_with_predicate(&self.retry, attempt, LedgerError::is_conflict).await;

        match &result {
            Ok(_) => {
                tracing::debug!("Command committed");
                CommandMetrics::record(command, "ok", started.elapsed());
            }
            Err(err) => {
                tracing::debug!(error = %err, kind = err.kind(), "Command rejected");
                CommandMetrics::record(command, err.kind(), started.elapsed());
            }
        }
        result
    }

    fn begin(&self) -> Transaction {
        Transaction::begin(Arc::clone(&self.store))
    }

    /// Commit a finished unit of work and publish its events.
    async fn commit(&self, tx: Transaction) -> Result<(), LedgerError> {
        let (batch, events) = tx.into_parts();

        if !batch.is_empty() {
            if let Err(err) = self.store.commit(batch).await {
                if matches!(err, StorageError::Conflict { .. }) {
                    CommandMetrics::record_conflict();
                }
                return Err(err.into());
            }
        }

        for event in events {
            log_committed(&event);
            // No subscribers is fine
            let _ = self.events.send(event);
        }
        Ok(())
    }

    // ========== Whitelist ==========

    /// Add members. Administrator only.
    ///
    /// # Errors
    ///
    /// [`LedgerError::Unauthorized`] for any other caller.
    pub async fn add_to_whitelist(&self, caller: &Address, addresses: &[Address]) -> Result<(), LedgerError> {
        self.run("add_to_whitelist", caller, move || async move {
            let mut tx = self.begin();
            self.ledgers.whitelist.add_many(&mut tx, caller, addresses).await?;
            self.commit(tx).await
        })
        .await
    }

    /// Remove members. Administrator only.
    ///
    /// # Errors
    ///
    /// [`LedgerError::Unauthorized`] for any other caller.
    pub async fn remove_from_whitelist(&self, caller: &Address, addresses: &[Address]) -> Result<(), LedgerError> {
        self.run("remove_from_whitelist", caller, move || async move {
            let mut tx = self.begin();
            self.ledgers.whitelist.remove_many(&mut tx, caller, addresses).await?;
            self.commit(tx).await
        })
        .await
    }

    /// Whether `address` is a member.
    ///
    /// # Errors
    ///
    /// [`LedgerError::Storage`] if the store fails.
    pub async fn is_member(&self, address: &Address) -> Result<bool, LedgerError> {
        let mut tx = self.begin();
        self.ledgers.whitelist.is_member(&mut tx, address).await
    }

    // ========== Balance ledger ==========

    /// Create tokens for a member. Administrator only.
    ///
    /// # Errors
    ///
    /// [`LedgerError::Unauthorized`], [`LedgerError::NotWhitelisted`] or
    /// [`LedgerError::AmountOverflow`].
    pub async fn mint(&self, caller: &Address, to: &Address, amount: Amount) -> Result<(), LedgerError> {
        self.run("mint", caller, move || async move {
            let mut tx = self.begin();
            self.ledgers.tokens.mint(&mut tx, caller, to, amount).await?;
            self.commit(tx).await
        })
        .await
    }

    /// Set the allowance `spender` may pull from `owner` (the caller).
    ///
    /// # Errors
    ///
    /// [`LedgerError::Storage`] if the store fails.
    pub async fn approve(&self, owner: &Address, spender: &Address, amount: Amount) -> Result<(), LedgerError> {
        self.run("approve", owner, move || async move {
            let mut tx = self.begin();
            self.ledgers.tokens.approve(&mut tx, owner, spender, amount).await?;
            self.commit(tx).await
        })
        .await
    }

    /// Pull tokens from `owner` to `to` on behalf of `spender` (the caller).
    ///
    /// # Errors
    ///
    /// [`LedgerError::NotWhitelisted`], [`LedgerError::InsufficientAllowance`],
    /// [`LedgerError::InsufficientBalance`], in that order.
    pub async fn transfer_from(
        &self,
        spender: &Address,
        owner: &Address,
        to: &Address,
        amount: Amount,
    ) -> Result<(), LedgerError> {
        self.run("transfer_from", spender, move || async move {
            let mut tx = self.begin();
            self.ledgers.tokens.transfer_from(&mut tx, spender, owner, to, amount).await?;
            self.commit(tx).await
        })
        .await
    }

    /// Send tokens from `from` (the caller) to `to`.
    ///
    /// # Errors
    ///
    /// [`LedgerError::NotWhitelisted`] or [`LedgerError::InsufficientBalance`].
    pub async fn transfer(&self, from: &Address, to: &Address, amount: Amount) -> Result<(), LedgerError> {
        self.run("transfer", from, move || async move {
            let mut tx = self.begin();
            self.ledgers.tokens.transfer(&mut tx, from, to, amount).await?;
            self.commit(tx).await
        })
        .await
    }

    /// Token balance of `address`.
    ///
    /// # Errors
    ///
    /// [`LedgerError::Storage`] if the store fails.
    pub async fn balance_of(&self, address: &Address) -> Result<Amount, LedgerError> {
        let mut tx = self.begin();
        self.ledgers.tokens.balance_of(&mut tx, address).await
    }

    /// Remaining allowance of `spender` over `owner`'s tokens.
    ///
    /// # Errors
    ///
    /// [`LedgerError::Storage`] if the store fails.
    pub async fn allowance_of(&self, owner: &Address, spender: &Address) -> Result<Amount, LedgerError> {
        let mut tx = self.begin();
        self.ledgers.tokens.allowance_of(&mut tx, owner, spender).await
    }

    /// Total amount ever minted.
    ///
    /// # Errors
    ///
    /// [`LedgerError::Storage`] if the store fails.
    pub async fn total_supply(&self) -> Result<Amount, LedgerError> {
        let mut tx = self.begin();
        self.ledgers.tokens.total_supply(&mut tx).await
    }

    // ========== Ticket ledger ==========

    /// Buy a ticket for `recipient`, paid by `payer` (the caller).
    ///
    /// # Errors
    ///
    /// [`LedgerError::SaleClosed`], [`LedgerError::InsufficientBalance`], or
    /// any error of the token pull.
    pub async fn issue_ticket(&self, payer: &Address, recipient: &Address) -> Result<TicketId, LedgerError> {
        self.run("issue_ticket", payer, move || async move {
            let mut tx = self.begin();
            let ticket_id = self.ledgers.tickets.issue(&mut tx, payer, recipient).await?;
            self.commit(tx).await?;
            Ok::<_, LedgerError>(ticket_id)
        })
        .await
    }

    /// Hand a ticket from `caller` to `to`.
    ///
    /// # Errors
    ///
    /// [`LedgerError::InvalidTicket`] or [`LedgerError::NotOwner`].
    pub async fn transfer_ticket(&self, caller: &Address, to: &Address, ticket_id: TicketId) -> Result<(), LedgerError> {
        self.run("transfer_ticket", caller, move || async move {
            let mut tx = self.begin();
            self.ledgers.tickets.transfer(&mut tx, caller, to, ticket_id).await?;
            self.commit(tx).await
        })
        .await
    }

    /// Change the ticket price. Administrator only.
    ///
    /// # Errors
    ///
    /// [`LedgerError::Unauthorized`] for any other caller.
    pub async fn update_price(&self, caller: &Address, new_price: Amount) -> Result<(), LedgerError> {
        self.run("update_price", caller, move || async move {
            let mut tx = self.begin();
            self.ledgers.tickets.update_price(&mut tx, caller, new_price).await?;
            self.commit(tx).await
        })
        .await
    }

    /// Withdraw escrowed tokens to the administrator. Administrator only.
    ///
    /// # Errors
    ///
    /// [`LedgerError::Unauthorized`] or [`LedgerError::InsufficientContractBalance`].
    pub async fn withdraw(&self, caller: &Address, amount: Amount) -> Result<(), LedgerError> {
        self.run("withdraw", caller, move || async move {
            let mut tx = self.begin();
            self.ledgers.tickets.withdraw(&mut tx, caller, amount).await?;
            self.commit(tx).await
        })
        .await
    }

    /// Holder of a live ticket.
    ///
    /// # Errors
    ///
    /// [`LedgerError::InvalidTicket`] if never issued or destroyed.
    pub async fn ticket_owner(&self, ticket_id: TicketId) -> Result<Address, LedgerError> {
        let mut tx = self.begin();
        self.ledgers.tickets.owner_of(&mut tx, ticket_id).await
    }

    /// Current ticket price.
    ///
    /// # Errors
    ///
    /// [`LedgerError::Storage`] if the store fails.
    pub async fn ticket_price(&self) -> Result<Amount, LedgerError> {
        let mut tx = self.begin();
        self.ledgers.tickets.price(&mut tx).await
    }

    /// Number of tickets issued so far.
    ///
    /// # Errors
    ///
    /// [`LedgerError::Storage`] if the store fails.
    pub async fn tickets_issued(&self) -> Result<u64, LedgerError> {
        let mut tx = self.begin();
        self.ledgers.tickets.issued_count(&mut tx).await
    }

    /// Tokens escrowed by the ticket ledger.
    ///
    /// # Errors
    ///
    /// [`LedgerError::Storage`] if the store fails.
    pub async fn escrow_balance(&self) -> Result<Amount, LedgerError> {
        let mut tx = self.begin();
        self.ledgers.tickets.escrow_balance(&mut tx).await
    }

    /// Sale phase right now.
    #[must_use]
    pub fn sale_state(&self) -> SaleState {
        self.ledgers.tickets.sale_state()
    }

    /// Event start time.
    #[must_use]
    pub fn start_time(&self) -> DateTime<Utc> {
        self.ledgers.tickets.start_time()
    }

    /// Ticket collection name.
    #[must_use]
    pub fn ticket_name(&self) -> &str {
        self.ledgers.tickets.name()
    }

    /// Ticket collection symbol.
    #[must_use]
    pub fn ticket_symbol(&self) -> &str {
        self.ledgers.tickets.symbol()
    }

    /// Escrow address of the ticket ledger.
    #[must_use]
    pub fn ticket_ledger_address(&self) -> &Address {
        self.ledgers.tickets.address()
    }

    // ========== Redemption ledger ==========

    /// Redeem a ticket held by `caller`, crediting the record to `recipient`.
    ///
    /// # Errors
    ///
    /// [`LedgerError::EventNotStarted`], [`LedgerError::InvalidTicket`] or
    /// [`LedgerError::NotOwner`], in that order.
    pub async fn redeem(
        &self,
        caller: &Address,
        ticket_id: TicketId,
        recipient: &Address,
    ) -> Result<RedemptionId, LedgerError> {
        self.run("redeem", caller, move || async move {
            let mut tx = self.begin();
            let redemption_id = self
                .ledgers
                .redemptions
                .redeem(&mut tx, caller, ticket_id, recipient)
                .await?;
            self.commit(tx).await?;
            Ok::<_, LedgerError>(redemption_id)
        })
        .await
    }

    /// Holder of a redemption record.
    ///
    /// # Errors
    ///
    /// [`LedgerError::InvalidRedemption`] if never issued.
    pub async fn redemption_owner(&self, id: RedemptionId) -> Result<Address, LedgerError> {
        let mut tx = self.begin();
        self.ledgers.redemptions.owner_of(&mut tx, id).await
    }

    /// Full redemption record.
    ///
    /// # Errors
    ///
    /// [`LedgerError::InvalidRedemption`] if never issued.
    pub async fn redemption(&self, id: RedemptionId) -> Result<RedemptionRecord, LedgerError> {
        let mut tx = self.begin();
        self.ledgers.redemptions.redemption(&mut tx, id).await
    }

    /// Redemption created from `ticket_id`, if any.
    ///
    /// # Errors
    ///
    /// [`LedgerError::Storage`] if the store fails.
    pub async fn redemption_for_ticket(&self, ticket_id: TicketId) -> Result<Option<RedemptionId>, LedgerError> {
        let mut tx = self.begin();
        self.ledgers.redemptions.redemption_for_ticket(&mut tx, ticket_id).await
    }

    /// Number of redemptions so far.
    ///
    /// # Errors
    ///
    /// [`LedgerError::Storage`] if the store fails.
    pub async fn redemptions_count(&self) -> Result<u64, LedgerError> {
        let mut tx = self.begin();
        self.ledgers.redemptions.redeemed_count(&mut tx).await
    }

    /// Redemption collection name.
    #[must_use]
    pub fn redemption_name(&self) -> &str {
        self.ledgers.redemptions.name()
    }

    /// Redemption collection symbol.
    #[must_use]
    pub fn redemption_symbol(&self) -> &str {
        self.ledgers.redemptions.symbol()
    }
}

impl std::fmt::Debug for AttendanceSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AttendanceSystem")
            .field("config", &self.config)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

fn log_committed(event: &LedgerEvent) {
    match event {
        LedgerEvent::TicketIssued {
            ticket_id,
            payer,
            recipient,
            price,
        } => tracing::info!(%ticket_id, %payer, %recipient, %price, "Ticket issued"),
        LedgerEvent::Redeemed {
            redemption_id,
            ticket_id,
            owner,
            ..
        } => tracing::info!(%redemption_id, %ticket_id, %owner, "Ticket redeemed"),
        LedgerEvent::Withdrawn { to, amount } => tracing::info!(%to, %amount, "Escrow withdrawn"),
        other => tracing::debug!(event_type = other.event_type(), "Committed"),
    }
}
