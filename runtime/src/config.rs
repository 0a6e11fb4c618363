//! Deployment and runtime configuration.

use crate::error::DeployError;
use crate::retry::RetryPolicy;
use attendance_core::types::{Address, Amount};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Default capacity of the event broadcast channel.
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Everything fixed when the ledgers are deployed.
///
/// The identities (administrator, ledger addresses, start time) are
/// persisted at genesis and checked on every later deployment against the
/// same store.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentConfig {
    /// Single administrator of every ledger.
    pub administrator: Address,
    /// Escrow address of the ticket ledger.
    pub ticket_ledger: Address,
    /// Address of the redemption ledger, the only caller allowed to destroy tickets.
    pub redemption_ledger: Address,
    /// Ticket collection name.
    pub ticket_name: String,
    /// Ticket collection symbol.
    pub ticket_symbol: String,
    /// Redemption collection name.
    pub redemption_name: String,
    /// Redemption collection symbol.
    pub redemption_symbol: String,
    /// Price written at genesis.
    pub initial_price: Amount,
    /// Event start: sales close and redemption opens.
    pub start_time: DateTime<Utc>,
    /// Members written at genesis. The ticket ledger is always added.
    pub initial_whitelist: Vec<Address>,
}

impl DeploymentConfig {
    /// First fixed identity on which `configured` differs from this (stored) deployment.
    #[must_use]
    pub fn identity_mismatch(&self, configured: &Self) -> Option<DeployError> {
        let mismatch = |field: &'static str, stored: String, configured: String| {
            Some(DeployError::Mismatch {
                field,
                stored,
                configured,
            })
        };

        if self.administrator != configured.administrator {
            return mismatch(
                "administrator",
                self.administrator.to_string(),
                configured.administrator.to_string(),
            );
        }
        if self.ticket_ledger != configured.ticket_ledger {
            return mismatch(
                "ticket_ledger",
                self.ticket_ledger.to_string(),
                configured.ticket_ledger.to_string(),
            );
        }
        if self.redemption_ledger != configured.redemption_ledger {
            return mismatch(
                "redemption_ledger",
                self.redemption_ledger.to_string(),
                configured.redemption_ledger.to_string(),
            );
        }
        if self.start_time != configured.start_time {
            return mismatch(
                "start_time",
                self.start_time.to_rfc3339(),
                configured.start_time.to_rfc3339(),
            );
        }
        None
    }
}

/// Tuning of the runtime itself.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Retry policy for units of work that lose a commit race.
    pub retry: RetryPolicy,
    /// Buffered events per subscriber before the slowest one starts lagging.
    pub event_capacity: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}
