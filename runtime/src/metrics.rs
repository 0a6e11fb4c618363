//! Metrics for command execution and commit contention.
//!
//! Recorded through the `metrics` facade; installing an exporter (for
//! example Prometheus) is left to the embedding process. Call
//! [`register_metrics`] once after installing the recorder so exporters
//! carry descriptions.
//!
//! | Metric | Kind | Labels |
//! |--------|------|--------|
//! | `attendance_commands_total` | counter | `command`, `outcome` |
//! | `attendance_command_duration_seconds` | histogram | `command` |
//! | `attendance_commit_conflicts_total` | counter | |
//! | `attendance_retries_exhausted_total` | counter | |

use metrics::{describe_counter, describe_histogram};
use std::time::Duration;

// Re-export metrics macros for use in other modules
pub use metrics::{counter, histogram};

/// Register all metric descriptions.
pub fn register_metrics() {
    describe_counter!(
        "attendance_commands_total",
        "Total number of commands executed, by command and outcome"
    );
    describe_histogram!(
        "attendance_command_duration_seconds",
        "Command execution time in seconds, retries included"
    );
    describe_counter!(
        "attendance_commit_conflicts_total",
        "Total number of commits rejected because a concurrent unit of work committed first"
    );
    describe_counter!(
        "attendance_retries_exhausted_total",
        "Total number of commands that gave up after exhausting conflict retries"
    );
}

/// Command execution metrics recorder.
pub struct CommandMetrics;

impl CommandMetrics {
    /// Record one finished command. `outcome` is `"ok"` or an error kind.
    pub fn record(command: &'static str, outcome: &'static str, duration: Duration) {
        counter!("attendance_commands_total", "command" => command, "outcome" => outcome).increment(1);
        histogram!("attendance_command_duration_seconds", "command" => command)
            .record(duration.as_secs_f64());
    }

    /// Record a commit rejected by a version conflict.
    pub fn record_conflict() {
        counter!("attendance_commit_conflicts_total").increment(1);
    }
}

/// Retry metrics recorder.
pub struct RetryMetrics;

impl RetryMetrics {
    /// Record a command that ran out of retries.
    pub fn record_exhausted() {
        counter!("attendance_retries_exhausted_total").increment(1);
    }
}
