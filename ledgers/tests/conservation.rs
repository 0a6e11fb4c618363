//! Property tests: token movements never create or destroy tokens.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use attendance_core::environment::Clock;
use attendance_core::{Address, Amount, LedgerStore, Transaction};
use attendance_ledgers::{BalanceLedger, TicketConfig, TicketLedger, WhitelistRegistry};
use attendance_testing::{FixedClock, InMemoryLedgerStore};
use chrono::{Duration, Utc};
use proptest::prelude::*;
use std::sync::Arc;

const ACCOUNTS: [&str; 4] = ["owner", "alice", "bobby", "carol"];

#[derive(Debug, Clone)]
enum Op {
    Transfer { from: usize, to: usize, amount: u128 },
    Approve { owner: usize, amount: u128 },
    PullToCarol { owner: usize, amount: u128 },
    Issue { payer: usize },
    Withdraw { amount: u128 },
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0..4usize, 0..4usize, 0..30u128).prop_map(|(from, to, amount)| Op::Transfer { from, to, amount }),
        (0..4usize, 0..30u128).prop_map(|(owner, amount)| Op::Approve { owner, amount }),
        (0..4usize, 0..30u128).prop_map(|(owner, amount)| Op::PullToCarol { owner, amount }),
        (0..4usize).prop_map(|payer| Op::Issue { payer }),
        (0..30u128).prop_map(|amount| Op::Withdraw { amount }),
    ]
}

struct World {
    store: Arc<InMemoryLedgerStore>,
    tokens: BalanceLedger,
    tickets: TicketLedger,
}

fn addr(index: usize) -> Address {
    Address::new(ACCOUNTS[index])
}

async fn world() -> World {
    let store = Arc::new(InMemoryLedgerStore::new());
    let owner = addr(0);
    let whitelist = WhitelistRegistry::new(owner.clone());
    let tokens = BalanceLedger::new(owner.clone(), Arc::new(whitelist.clone()));
    let clock: Arc<dyn Clock> = Arc::new(FixedClock::new(Utc::now()));
    let config = TicketConfig {
        address: Address::new("tickets"),
        administrator: owner.clone(),
        redeemer: Address::new("redemptions"),
        name: "X Tickets".to_string(),
        symbol: "XT".to_string(),
        start_time: clock.now() + Duration::days(1),
    };
    let tickets = TicketLedger::new(config, Arc::new(tokens.clone()), clock);

    let mut tx = Transaction::begin(store.clone());
    let mut members: Vec<Address> = ACCOUNTS.iter().map(|a| Address::new(*a)).collect();
    members.push(Address::new("tickets"));
    whitelist.add_many(&mut tx, &owner, &members).await.unwrap();
    tickets.initialize(&mut tx, Amount::new(10)).await.unwrap();
    for account in ACCOUNTS {
        tokens
            .mint(&mut tx, &owner, &Address::new(account), Amount::new(25))
            .await
            .unwrap();
    }
    store.commit(tx.into_parts().0).await.unwrap();

    World { store, tokens, tickets }
}

impl World {
    async fn apply(&self, op: &Op) {
        let mut tx = Transaction::begin(self.store.clone());
        let result = match *op {
            Op::Transfer { from, to, amount } => {
                self.tokens
                    .transfer(&mut tx, &addr(from), &addr(to), Amount::new(amount))
                    .await
            }
            Op::Approve { owner, amount } => {
                self.tokens
                    .approve(&mut tx, &addr(owner), &addr(3), Amount::new(amount))
                    .await
            }
            Op::PullToCarol { owner, amount } => {
                self.tokens
                    .transfer_from(&mut tx, &addr(3), &addr(owner), &addr(3), Amount::new(amount))
                    .await
            }
            Op::Issue { payer } => {
                let approve = self
                    .tokens
                    .approve(&mut tx, &addr(payer), self.tickets.address(), Amount::new(10))
                    .await;
                match approve {
                    Ok(()) => self.tickets.issue(&mut tx, &addr(payer), &addr(payer)).await.map(|_| ()),
                    Err(e) => Err(e),
                }
            }
            Op::Withdraw { amount } => self.tickets.withdraw(&mut tx, &addr(0), Amount::new(amount)).await,
        };

        // Failed operations are rolled back by dropping the transaction
        if result.is_ok() {
            self.store.commit(tx.into_parts().0).await.unwrap();
        }
    }

    async fn sum_of_balances(&self) -> u128 {
        let mut tx = Transaction::begin(self.store.clone());
        let mut sum = self.tickets.escrow_balance(&mut tx).await.unwrap().units();
        for index in 0..ACCOUNTS.len() {
            sum += self.tokens.balance_of(&mut tx, &addr(index)).await.unwrap().units();
        }
        sum
    }

    async fn total_supply(&self) -> u128 {
        let mut tx = Transaction::begin(self.store.clone());
        self.tokens.total_supply(&mut tx).await.unwrap().units()
    }
}

#[tokio::test]
async fn one_payer_buys_repeatedly_across_commits() {
    let world = world().await;
    for _ in 0..2 {
        world.apply(&Op::Issue { payer: 1 }).await;
    }

    let mut tx = Transaction::begin(world.store.clone());
    assert_eq!(world.tickets.issued_count(&mut tx).await.unwrap(), 2);
    assert_eq!(world.tokens.balance_of(&mut tx, &addr(1)).await.unwrap(), Amount::new(5));
    assert_eq!(world.tickets.escrow_balance(&mut tx).await.unwrap(), Amount::new(20));
    assert_eq!(world.sum_of_balances().await, world.total_supply().await);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn balances_sum_to_total_supply(ops in prop::collection::vec(op(), 0..40)) {
        let runtime = tokio::runtime::Runtime::new().expect("Failed to create runtime");
        let (sum, supply, issued) = runtime.block_on(async {
            let world = world().await;
            for op in &ops {
                world.apply(op).await;
            }
            let mut tx = Transaction::begin(world.store.clone());
            let issued = world.tickets.issued_count(&mut tx).await.unwrap();
            (world.sum_of_balances().await, world.total_supply().await, issued)
        });

        prop_assert_eq!(supply, 100);
        prop_assert_eq!(sum, supply);
        prop_assert!(issued <= ops.len() as u64);
    }
}
