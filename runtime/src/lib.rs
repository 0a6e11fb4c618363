//! # Attendance Runtime
//!
//! Runs the four attendance ledgers as one deployed system.
//!
//! This crate provides:
//! - **Deployment**: genesis on an empty store, or resuming (and checking) an existing one
//! - **Atomic execution**: every [`Command`] is one unit of work, committed all-or-nothing
//! - **Conflict retry**: a unit that loses a commit race is re-run against the winner's state
//! - **Events**: [`LedgerEvent`](attendance_core::LedgerEvent)s of committed units, broadcast to subscribers
//! - **Metrics**: command and conflict counters through the `metrics` facade
//!
//! ## Example
//!
//! ```ignore
//! use attendance_runtime::{AttendanceSystem, RuntimeConfig};
//!
//! let system = AttendanceSystem::deploy(config, store, clock, RuntimeConfig::default()).await?;
//! let mut events = system.subscribe();
//!
//! system.mint(&admin, &alice, Amount::new(20)).await?;
//! system.approve(&alice, system.ticket_ledger_address(), Amount::new(10)).await?;
//! let ticket = system.issue_ticket(&alice, &alice).await?;
//! ```

pub mod command;
pub mod config;
pub mod error;
pub mod metrics;
pub mod retry;
pub mod system;

pub use command::{Command, Outcome};
pub use config::{DeploymentConfig, RuntimeConfig};
pub use error::DeployError;
pub use retry::RetryPolicy;
pub use system::AttendanceSystem;
