//! Fungible balance ledger.
//!
//! Owns per-address balances and per-(owner, spender) allowances. Every
//! balance-affecting operation checks whitelist membership of the addresses
//! whose balances change, through the injected [`MembershipRegistry`].
//!
//! # Check order
//!
//! `transfer_from` evaluates its preconditions in a fixed order and reports
//! the first one that fails:
//!
//! 1. `owner` and `to` are members (`NotWhitelisted`)
//! 2. allowance covers the amount (`InsufficientAllowance`)
//! 3. balance covers the amount (`InsufficientBalance`)
//! 4. the credit does not overflow (`AmountOverflow`)
//!
//! All writes happen after every check has passed.

use crate::capability::{FungibleLedger, LedgerFuture, MembershipRegistry};
use crate::keys;
use attendance_core::error::LedgerError;
use attendance_core::event::LedgerEvent;
use attendance_core::transaction::Transaction;
use attendance_core::types::{Address, Amount};
use std::sync::Arc;

/// Balances and allowances of the fungible token.
#[derive(Clone)]
pub struct BalanceLedger {
    administrator: Address,
    whitelist: Arc<dyn MembershipRegistry>,
}

impl BalanceLedger {
    /// Create a ledger minted by `administrator` and gated by `whitelist`.
    #[must_use]
    pub fn new(administrator: Address, whitelist: Arc<dyn MembershipRegistry>) -> Self {
        Self {
            administrator,
            whitelist,
        }
    }

    // ========== Mutations ==========

    /// Credit `to` with newly created tokens.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::Unauthorized`] if `caller` is not the administrator
    /// - [`LedgerError::NotWhitelisted`] if `to` is not a member
    /// - [`LedgerError::AmountOverflow`] if the balance or total supply would overflow
    pub async fn mint(
        &self,
        tx: &mut Transaction,
        caller: &Address,
        to: &Address,
        amount: Amount,
    ) -> Result<(), LedgerError> {
        if *caller != self.administrator {
            return Err(LedgerError::Unauthorized { caller: caller.clone() });
        }
        self.ensure_member(tx, to).await?;

        let supply: Amount = tx.get_or_default(keys::TOTAL_SUPPLY).await?;
        let new_supply = supply.checked_add(amount).ok_or(LedgerError::AmountOverflow)?;
        let balance = self.balance_of(tx, to).await?;
        let new_balance = balance.checked_add(amount).ok_or(LedgerError::AmountOverflow)?;

        tx.put(keys::TOTAL_SUPPLY, &new_supply)?;
        tx.put(keys::balance(to), &new_balance)?;
        tx.emit(LedgerEvent::Minted {
            to: to.clone(),
            amount,
        });
        Ok(())
    }

    /// Set the allowance `spender` may pull from `owner`. Overwrites, never adds.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Storage`] if the store fails.
    pub async fn approve(
        &self,
        tx: &mut Transaction,
        owner: &Address,
        spender: &Address,
        amount: Amount,
    ) -> Result<(), LedgerError> {
        // Read first so the overwrite is guarded by the committed version
        let previous = self.allowance_of(tx, owner, spender).await?;
        tracing::trace!(%owner, %spender, %previous, %amount, "Allowance replaced");
        tx.put(keys::allowance(owner, spender), &amount)?;
        tx.emit(LedgerEvent::Approval {
            owner: owner.clone(),
            spender: spender.clone(),
            amount,
        });
        Ok(())
    }

    /// Pull `amount` from `owner` to `to`, consuming `spender`'s allowance.
    ///
    /// # Errors
    ///
    /// See the module docs for the order in which preconditions are checked.
    pub async fn transfer_from(
        &self,
        tx: &mut Transaction,
        spender: &Address,
        owner: &Address,
        to: &Address,
        amount: Amount,
    ) -> Result<(), LedgerError> {
        self.ensure_member(tx, owner).await?;
        self.ensure_member(tx, to).await?;

        let allowance = self.allowance_of(tx, owner, spender).await?;
        let remaining = allowance
            .checked_sub(amount)
            .ok_or_else(|| LedgerError::InsufficientAllowance {
                owner: owner.clone(),
                spender: spender.clone(),
                requested: amount,
                available: allowance,
            })?;

        self.move_balance(tx, owner, to, amount).await?;
        tx.put(keys::allowance(owner, spender), &remaining)?;
        Ok(())
    }

    /// Move `amount` from `from` to `to`.
    ///
    /// # Errors
    ///
    /// Same as [`BalanceLedger::transfer_from`] without the allowance check.
    pub async fn transfer(
        &self,
        tx: &mut Transaction,
        from: &Address,
        to: &Address,
        amount: Amount,
    ) -> Result<(), LedgerError> {
        self.ensure_member(tx, from).await?;
        self.ensure_member(tx, to).await?;
        self.move_balance(tx, from, to, amount).await
    }

    // ========== Reads ==========

    /// Balance of `address`; zero if it never received tokens.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Storage`] if the store fails.
    pub async fn balance_of(&self, tx: &mut Transaction, address: &Address) -> Result<Amount, LedgerError> {
        Ok(tx.get_or_default(&keys::balance(address)).await?)
    }

    /// Remaining allowance of `spender` over `owner`'s tokens.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Storage`] if the store fails.
    pub async fn allowance_of(
        &self,
        tx: &mut Transaction,
        owner: &Address,
        spender: &Address,
    ) -> Result<Amount, LedgerError> {
        Ok(tx.get_or_default(&keys::allowance(owner, spender)).await?)
    }

    /// Total amount ever minted. Equals the sum of all balances.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Storage`] if the store fails.
    pub async fn total_supply(&self, tx: &mut Transaction) -> Result<Amount, LedgerError> {
        Ok(tx.get_or_default(keys::TOTAL_SUPPLY).await?)
    }

    // ========== Helpers ==========

    async fn ensure_member(&self, tx: &mut Transaction, address: &Address) -> Result<(), LedgerError> {
        if self.whitelist.is_member(tx, address).await? {
            Ok(())
        } else {
            Err(LedgerError::NotWhitelisted(address.clone()))
        }
    }

    /// Debit `from` and credit `to`. Both balances are computed before either is written.
    async fn move_balance(
        &self,
        tx: &mut Transaction,
        from: &Address,
        to: &Address,
        amount: Amount,
    ) -> Result<(), LedgerError> {
        let from_balance = self.balance_of(tx, from).await?;
        let debited = from_balance
            .checked_sub(amount)
            .ok_or_else(|| LedgerError::InsufficientBalance {
                address: from.clone(),
                requested: amount,
                available: from_balance,
            })?;

        if from != to {
            let to_balance = self.balance_of(tx, to).await?;
            let credited = to_balance.checked_add(amount).ok_or(LedgerError::AmountOverflow)?;
            tx.put(keys::balance(from), &debited)?;
            tx.put(keys::balance(to), &credited)?;
        }

        tx.emit(LedgerEvent::Transferred {
            from: from.clone(),
            to: to.clone(),
            amount,
        });
        Ok(())
    }
}

impl std::fmt::Debug for BalanceLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BalanceLedger")
            .field("administrator", &self.administrator)
            .finish_non_exhaustive()
    }
}

impl FungibleLedger for BalanceLedger {
    fn balance_of<'a>(&'a self, tx: &'a mut Transaction, address: &'a Address) -> LedgerFuture<'a, Amount> {
        Box::pin(Self::balance_of(self, tx, address))
    }

    fn transfer_from<'a>(
        &'a self,
        tx: &'a mut Transaction,
        spender: &'a Address,
        owner: &'a Address,
        to: &'a Address,
        amount: Amount,
    ) -> LedgerFuture<'a, ()> {
        Box::pin(Self::transfer_from(self, tx, spender, owner, to, amount))
    }

    fn transfer<'a>(
        &'a self,
        tx: &'a mut Transaction,
        from: &'a Address,
        to: &'a Address,
        amount: Amount,
    ) -> LedgerFuture<'a, ()> {
        Box::pin(Self::transfer(self, tx, from, to, amount))
    }
}
