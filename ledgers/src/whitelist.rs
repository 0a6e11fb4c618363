//! Whitelist registry: the set of addresses allowed to hold and move tokens.

use crate::capability::{LedgerFuture, MembershipRegistry};
use crate::keys;
use attendance_core::error::LedgerError;
use attendance_core::event::LedgerEvent;
use attendance_core::transaction::Transaction;
use attendance_core::types::Address;

/// Administrator-managed membership set.
///
/// Membership is stored as one boolean flag per address, so adding or
/// removing one address never contends with a concurrent change to another.
#[derive(Debug, Clone)]
pub struct WhitelistRegistry {
    administrator: Address,
}

impl WhitelistRegistry {
    /// Create a registry managed by `administrator`.
    #[must_use]
    pub const fn new(administrator: Address) -> Self {
        Self { administrator }
    }

    /// The administrator allowed to change membership.
    #[must_use]
    pub const fn administrator(&self) -> &Address {
        &self.administrator
    }

    /// Mark every address in `addresses` as a member.
    ///
    /// Addresses that are already members are left untouched and emit no event.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::Unauthorized`] if `caller` is not the administrator
    /// - [`LedgerError::Storage`] if the store fails
    pub async fn add_many(
        &self,
        tx: &mut Transaction,
        caller: &Address,
        addresses: &[Address],
    ) -> Result<(), LedgerError> {
        self.ensure_administrator(caller)?;

        for address in addresses {
            if !self.is_member(tx, address).await? {
                tx.put(keys::member(address), &true)?;
                tx.emit(LedgerEvent::WhitelistAdded { address: address.clone() });
            } else {
                tracing::trace!(address = %address, "Already a member");
            }
        }
        Ok(())
    }

    /// Mark every address in `addresses` as absent.
    ///
    /// Balances of removed addresses are kept, but they can no longer move.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::Unauthorized`] if `caller` is not the administrator
    /// - [`LedgerError::Storage`] if the store fails
    pub async fn remove_many(
        &self,
        tx: &mut Transaction,
        caller: &Address,
        addresses: &[Address],
    ) -> Result<(), LedgerError> {
        self.ensure_administrator(caller)?;

        for address in addresses {
            if self.is_member(tx, address).await? {
                tx.put(keys::member(address), &false)?;
                tx.emit(LedgerEvent::WhitelistRemoved { address: address.clone() });
            } else {
                tracing::trace!(address = %address, "Not a member, nothing to remove");
            }
        }
        Ok(())
    }

    /// Whether `address` is currently a member.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Storage`] if the store fails.
    pub async fn is_member(&self, tx: &mut Transaction, address: &Address) -> Result<bool, LedgerError> {
        Ok(tx.get_or_default::<bool>(&keys::member(address)).await?)
    }

    fn ensure_administrator(&self, caller: &Address) -> Result<(), LedgerError> {
        if *caller == self.administrator {
            Ok(())
        } else {
            Err(LedgerError::Unauthorized { caller: caller.clone() })
        }
    }
}

impl MembershipRegistry for WhitelistRegistry {
    fn is_member<'a>(&'a self, tx: &'a mut Transaction, address: &'a Address) -> LedgerFuture<'a, bool> {
        Box::pin(Self::is_member(self, tx, address))
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use attendance_testing::InMemoryLedgerStore;
    use std::sync::Arc;

    fn admin() -> Address {
        Address::new("owner")
    }

    #[tokio::test]
    async fn add_many_is_idempotent() {
        let store = Arc::new(InMemoryLedgerStore::new());
        let registry = WhitelistRegistry::new(admin());
        let alice = Address::new("alice");

        let mut tx = Transaction::begin(store.clone());
        registry
            .add_many(&mut tx, &admin(), &[alice.clone(), alice.clone()])
            .await
            .unwrap();
        assert!(registry.is_member(&mut tx, &alice).await.unwrap());
        // The second occurrence saw the pending write and emitted nothing
        assert_eq!(tx.events().len(), 1);
    }

    #[tokio::test]
    async fn non_administrator_cannot_change_membership() {
        let store = Arc::new(InMemoryLedgerStore::new());
        let registry = WhitelistRegistry::new(admin());
        let mallory = Address::new("mallory");

        let mut tx = Transaction::begin(store);
        let err = registry
            .add_many(&mut tx, &mallory, &[mallory.clone()])
            .await
            .unwrap_err();
        assert_eq!(err, LedgerError::Unauthorized { caller: mallory.clone() });

        let err = registry.remove_many(&mut tx, &mallory, &[admin()]).await.unwrap_err();
        assert!(matches!(err, LedgerError::Unauthorized { .. }));
        assert!(!tx.has_writes());
    }

    #[tokio::test]
    async fn remove_many_revokes_membership() {
        let store = Arc::new(InMemoryLedgerStore::new());
        let registry = WhitelistRegistry::new(admin());
        let carol = Address::new("carol");

        let mut tx = Transaction::begin(store);
        registry.add_many(&mut tx, &admin(), &[carol.clone()]).await.unwrap();
        registry.remove_many(&mut tx, &admin(), &[carol.clone()]).await.unwrap();

        assert!(!registry.is_member(&mut tx, &carol).await.unwrap());
        assert_eq!(
            tx.events().last(),
            Some(&LedgerEvent::WhitelistRemoved { address: carol })
        );
    }
}
