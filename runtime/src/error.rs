//! Deployment errors.

use attendance_core::error::LedgerError;
use thiserror::Error;

/// Errors raised while deploying or resuming a deployment.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeployError {
    /// Writing or reading the genesis state failed.
    #[error("Deployment failed: {0}")]
    Ledger(#[from] LedgerError),

    /// The store already holds a deployment with different identities.
    #[error("Store already holds a different deployment: {field} is {stored}, configured {configured}")]
    Mismatch {
        /// Name of the first differing field.
        field: &'static str,
        /// Value persisted at genesis.
        stored: String,
        /// Value in the new configuration.
        configured: String,
    },
}
