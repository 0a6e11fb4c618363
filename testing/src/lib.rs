//! # Attendance Testing
//!
//! Testing utilities for the attendance ledgers.
//!
//! This crate provides:
//! - Deterministic clocks ([`FixedClock`], [`ManualClock`])
//! - [`InMemoryLedgerStore`] with failure injection
//! - The five-account deployment fixture used across the integration tests
//!
//! ## Example
//!
//! ```ignore
//! use attendance_testing::fixtures::deploy_fixture;
//!
//! #[tokio::test]
//! async fn alice_buys_a_ticket() {
//!     let fx = deploy_fixture().await;
//!     let id = fx.system.issue_ticket(&fx.cast.alice, &fx.cast.alice).await.unwrap();
//!     assert_eq!(id.value(), 1);
//! }
//! ```

use attendance_core::environment::Clock;
use chrono::{DateTime, Utc};

mod store_mocks;

pub use store_mocks::InMemoryLedgerStore;

/// Mock implementations of Environment traits
pub mod mocks {
    use super::{Clock, DateTime, Utc};
    use chrono::Duration;
    use std::sync::{PoisonError, RwLock};

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use attendance_testing::mocks::FixedClock;
    /// use attendance_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// let time1 = clock.now();
    /// let time2 = clock.now();
    /// assert_eq!(time1, time2); // Always the same!
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    ///
    /// # Panics
    ///
    /// This function will panic if the hardcoded timestamp fails to parse,
    /// which should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(
            DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
                .expect("hardcoded timestamp should always parse")
                .with_timezone(&Utc),
        )
    }

    /// Clock that stands still until a test moves it.
    ///
    /// Used to walk a deployment across the event start: sell tickets
    /// before, then [`ManualClock::set`] past the start and redeem.
    #[derive(Debug)]
    pub struct ManualClock {
        time: RwLock<DateTime<Utc>>,
    }

    impl ManualClock {
        /// Create a clock reading `time`.
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self {
                time: RwLock::new(time),
            }
        }

        /// Jump to `time`.
        pub fn set(&self, time: DateTime<Utc>) {
            *self.time.write().unwrap_or_else(PoisonError::into_inner) = time;
        }

        /// Move forward by `by`.
        pub fn advance(&self, by: Duration) {
            let mut time = self.time.write().unwrap_or_else(PoisonError::into_inner);
            *time += by;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            *self.time.read().unwrap_or_else(PoisonError::into_inner)
        }
    }
}

/// Deployment fixture shared by the integration tests.
///
/// Mirrors a small event: an administrator and four attendees with
/// different funding, a price of 10, and a sale that starts one day after
/// the fixture's clock.
///
/// | Account | Whitelisted | Balance | Allowance to ticket ledger |
/// |---------|-------------|---------|----------------------------|
/// | owner   | yes         | 10      | 10                         |
/// | alice   | yes         | 20      | 10                         |
/// | bobby   | yes         | 0       | 10                         |
/// | carol   | yes         | 20      | 0                          |
/// | david   | no          | 0       | 0                          |
pub mod fixtures {
    #![allow(clippy::expect_used)] // Fixtures fail loudly on setup errors
    #![allow(clippy::missing_panics_doc)]

    use super::InMemoryLedgerStore;
    use super::mocks::{ManualClock, test_clock};
    use attendance_core::environment::Clock;
    use attendance_core::types::{Address, Amount};
    use attendance_runtime::{AttendanceSystem, DeploymentConfig, RuntimeConfig};
    use chrono::{DateTime, Duration, Utc};
    use std::sync::Arc;

    /// Ticket price used by the fixture.
    pub const PRICE: Amount = Amount::new(10);

    /// Addresses of the fixture's participants.
    #[derive(Debug, Clone)]
    pub struct Cast {
        /// Administrator of every ledger.
        pub owner: Address,
        /// Funded and approved.
        pub alice: Address,
        /// Approved but unfunded.
        pub bobby: Address,
        /// Funded but never approved.
        pub carol: Address,
        /// Not whitelisted.
        pub david: Address,
    }

    impl Default for Cast {
        fn default() -> Self {
            Self {
                owner: Address::new("owner"),
                alice: Address::new("alice"),
                bobby: Address::new("bobby"),
                carol: Address::new("carol"),
                david: Address::new("david"),
            }
        }
    }

    /// A deployed system with handles on its store and clock.
    pub struct Fixture {
        /// The system under test.
        pub system: AttendanceSystem,
        /// Store behind `system`, for inspection and failure injection.
        pub store: Arc<InMemoryLedgerStore>,
        /// Clock behind `system`, one day before the event start.
        pub clock: Arc<ManualClock>,
        /// Participants.
        pub cast: Cast,
    }

    impl Fixture {
        /// Move the clock to the event start.
        pub fn start_event(&self) {
            self.clock.set(self.system.config().start_time);
        }
    }

    /// Deployment configuration for `cast` with the event starting at `start_time`.
    #[must_use]
    pub fn deployment_config(cast: &Cast, start_time: DateTime<Utc>) -> DeploymentConfig {
        DeploymentConfig {
            administrator: cast.owner.clone(),
            ticket_ledger: Address::new("ticket-ledger"),
            redemption_ledger: Address::new("redemption-ledger"),
            ticket_name: "X Tickets".to_string(),
            ticket_symbol: "XT".to_string(),
            redemption_name: "X Tickets".to_string(),
            redemption_symbol: "XP".to_string(),
            initial_price: PRICE,
            start_time,
            initial_whitelist: vec![
                cast.owner.clone(),
                cast.alice.clone(),
                cast.bobby.clone(),
                cast.carol.clone(),
            ],
        }
    }

    /// Deploy on a fresh in-memory store and fund the cast.
    pub async fn deploy_fixture() -> Fixture {
        deploy_fixture_with(RuntimeConfig::default()).await
    }

    /// Same as [`deploy_fixture`] with a custom runtime configuration.
    pub async fn deploy_fixture_with(runtime: RuntimeConfig) -> Fixture {
        let cast = Cast::default();
        let now = test_clock().now();
        let clock = Arc::new(ManualClock::new(now));
        let store = Arc::new(InMemoryLedgerStore::new());

        let system = AttendanceSystem::deploy(
            deployment_config(&cast, now + Duration::days(1)),
            store.clone(),
            clock.clone(),
            runtime,
        )
        .await
        .expect("fixture deployment");

        let ticket_ledger = system.config().ticket_ledger.clone();
        for (account, balance) in [(&cast.owner, 10), (&cast.alice, 20), (&cast.carol, 20)] {
            system
                .mint(&cast.owner, account, Amount::new(balance))
                .await
                .expect("fixture mint");
        }
        for account in [&cast.owner, &cast.alice, &cast.bobby] {
            system
                .approve(account, &ticket_ledger, PRICE)
                .await
                .expect("fixture approval");
        }

        Fixture {
            system,
            store,
            clock,
            cast,
        }
    }
}

/// Initialize a `tracing` subscriber for tests, honoring `RUST_LOG`.
///
/// Safe to call from many tests; only the first call installs it.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

// Re-export commonly used items
pub use mocks::{FixedClock, ManualClock, test_clock};

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_fixed_clock() {
        let clock = test_clock();
        let time1 = clock.now();
        let time2 = clock.now();
        assert_eq!(time1, time2);
    }

    #[test]
    fn manual_clock_moves_only_when_told() {
        let start = test_clock().now();
        let clock = ManualClock::new(start);
        assert_eq!(clock.now(), start);

        clock.advance(Duration::hours(2));
        assert_eq!(clock.now(), start + Duration::hours(2));

        clock.set(start);
        assert_eq!(clock.now(), start);
    }
}
