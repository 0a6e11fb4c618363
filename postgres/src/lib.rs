//! `PostgreSQL` ledger store for the attendance ledgers.
//!
//! Every ledger key lives in one row of `ledger_entries` together with its
//! version. A [`CommitBatch`] is applied inside a single `SERIALIZABLE`
//! transaction: a write expecting an absent key is an insert that must not
//! collide, any other write is an update guarded by the expected version,
//! and keys that were only read have their versions compared last.
//!
//! Serialization failures (`40001`) and unique violations on racing first
//! writes (`23505`) are reported as [`StorageError::Conflict`], so the
//! runtime re-runs the unit of work exactly as it does for a version mismatch.
//!
//! # Example
//!
//! ```ignore
//! use attendance_postgres::PostgresLedgerStore;
//!
//! let store = PostgresLedgerStore::new("postgres://localhost/attendance").await?;
//! store.migrate().await?;
//! let system = AttendanceSystem::deploy(config, Arc::new(store), clock, runtime).await?;
//! ```

use attendance_core::error::StorageError;
use attendance_core::storage::{CommitBatch, LedgerStore, StoreFuture, Version, VersionedValue};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Postgres, Transaction};

/// Default size of the connection pool opened by [`PostgresLedgerStore::new`].
pub const DEFAULT_MAX_CONNECTIONS: u32 = 10;

/// `SQLSTATE` raised when a serializable transaction cannot be ordered.
const SERIALIZATION_FAILURE: &str = "40001";

/// `SQLSTATE` raised when two transactions insert the same key.
const UNIQUE_VIOLATION: &str = "23505";

/// Counter of commits that lost a serialization race inside `PostgreSQL`.
pub const SERIALIZATION_FAILURES: &str = "attendance_store_serialization_failures_total";

/// Register the store's metric descriptions with the installed recorder.
pub fn register_metrics() {
    metrics::describe_counter!(
        SERIALIZATION_FAILURES,
        "Total number of commits aborted by PostgreSQL serialization or unique-key races"
    );
}

/// `PostgreSQL`-backed [`LedgerStore`].
#[derive(Clone, Debug)]
pub struct PostgresLedgerStore {
    pool: PgPool,
}

impl PostgresLedgerStore {
    /// Connect with a pool of [`DEFAULT_MAX_CONNECTIONS`] connections.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Backend`] if the database cannot be reached.
    pub async fn new(database_url: &str) -> Result<Self, StorageError> {
        Self::with_max_connections(database_url, DEFAULT_MAX_CONNECTIONS).await
    }

    /// Connect with an explicit pool size.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Backend`] if the database cannot be reached.
    pub async fn with_max_connections(
        database_url: &str,
        max_connections: u32,
    ) -> Result<Self, StorageError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| StorageError::Backend(format!("Failed to connect: {e}")))?;

        tracing::info!(max_connections, "Connected to ledger database");
        Ok(Self::from_pool(pool))
    }

    /// Wrap an existing pool.
    #[must_use]
    pub const fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the `ledger_entries` table if it does not exist yet.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Backend`] if a migration fails.
    pub async fn migrate(&self) -> Result<(), StorageError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(format!("Migration failed: {e}")))?;
        Ok(())
    }

    /// Get the underlying connection pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn fetch(&self, key: &str) -> Result<Option<VersionedValue>, StorageError> {
        let row: Option<(i64, Vec<u8>)> =
            sqlx::query_as("SELECT version, value FROM ledger_entries WHERE key = $1")
                .bind(key)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| StorageError::Backend(format!("Failed to read {key}: {e}")))?;

        row.map(|(version, data)| {
            Ok(VersionedValue {
                version: to_version(key, version)?,
                data,
            })
        })
        .transpose()
    }

    async fn apply(&self, batch: CommitBatch) -> Result<(), StorageError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StorageError::Backend(format!("Failed to begin transaction: {e}")))?;

        sqlx::query("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE")
            .execute(&mut *tx)
            .await
            .map_err(|e| StorageError::Backend(format!("Failed to set isolation level: {e}")))?;

        // Dropping `tx` on any early return rolls the whole batch back
        for (key, data) in &batch.writes {
            let expected = batch.expected_version(key).unwrap_or(Version::ABSENT);
            let result = if expected.is_absent() {
                sqlx::query(
                    "INSERT INTO ledger_entries (key, version, value, updated_at)
                     VALUES ($1, 1, $2, now())
                     ON CONFLICT (key) DO NOTHING",
                )
                .bind(key)
                .bind(data)
                .execute(&mut *tx)
                .await
            } else {
                sqlx::query(
                    "UPDATE ledger_entries
                     SET version = version + 1, value = $2, updated_at = now()
                     WHERE key = $1 AND version = $3",
                )
                .bind(key)
                .bind(data)
                .bind(to_column(expected)?)
                .execute(&mut *tx)
                .await
            };
            let written = result.map_err(|e| classify(&batch, key, &e))?;

            if written.rows_affected() == 0 {
                let actual = current_version(&mut tx, key).await?;
                return Err(StorageError::Conflict {
                    key: key.clone(),
                    expected,
                    actual,
                });
            }
        }

        // Keys the unit only read must not have moved either
        for (key, expected) in &batch.expectations {
            if batch.writes.iter().any(|(written, _)| written == key) {
                continue;
            }
            let actual = current_version(&mut tx, key).await?;
            if actual != *expected {
                return Err(StorageError::Conflict {
                    key: key.clone(),
                    expected: *expected,
                    actual,
                });
            }
        }

        tx.commit()
            .await
            .map_err(|e| classify(&batch, first_written_key(&batch), &e))?;

        tracing::debug!(
            writes = batch.writes.len(),
            expectations = batch.expectations.len(),
            "Committed ledger batch"
        );
        Ok(())
    }
}

impl LedgerStore for PostgresLedgerStore {
    fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<VersionedValue>> {
        Box::pin(self.fetch(key))
    }

    fn commit(&self, batch: CommitBatch) -> StoreFuture<'_, ()> {
        Box::pin(self.apply(batch))
    }
}

// ========== Helpers ==========

async fn current_version(
    tx: &mut Transaction<'_, Postgres>,
    key: &str,
) -> Result<Version, StorageError> {
    let row: Option<(i64,)> =
        sqlx::query_as("SELECT version FROM ledger_entries WHERE key = $1")
            .bind(key)
            .fetch_optional(&mut **tx)
            .await
            .map_err(|e| StorageError::Backend(format!("Failed to read version of {key}: {e}")))?;

    row.map_or(Ok(Version::ABSENT), |(version,)| to_version(key, version))
}

fn to_version(key: &str, raw: i64) -> Result<Version, StorageError> {
    u64::try_from(raw)
        .map(Version::new)
        .map_err(|_| StorageError::Backend(format!("Negative version {raw} stored for {key}")))
}

fn to_column(version: Version) -> Result<i64, StorageError> {
    i64::try_from(version.value())
        .map_err(|_| StorageError::Backend(format!("Version {version} exceeds BIGINT")))
}

fn first_written_key(batch: &CommitBatch) -> &str {
    batch.writes.first().map_or("", |(key, _)| key.as_str())
}

/// Map a database error raised while applying `batch` to a storage error.
///
/// Ordering failures become conflicts on `key`; the actual version is not
/// known at that point, so it is reported as one past the expected one.
fn classify(batch: &CommitBatch, key: &str, error: &sqlx::Error) -> StorageError {
    let code = error
        .as_database_error()
        .and_then(|db| db.code().map(|code| code.into_owned()));

    match code.as_deref() {
        Some(SERIALIZATION_FAILURE | UNIQUE_VIOLATION) => {
            metrics::counter!(SERIALIZATION_FAILURES).increment(1);
            let expected = batch.expected_version(key).unwrap_or(Version::ABSENT);
            tracing::debug!(key, "Ledger batch lost a serialization race");
            StorageError::Conflict {
                key: key.to_string(),
                expected,
                actual: expected.next(),
            }
        }
        _ => StorageError::Backend(format!("Failed to commit {key}: {error}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_versions_are_rejected() {
        assert_eq!(to_version("ticket/1", 3).ok(), Some(Version::new(3)));
        assert!(matches!(
            to_version("ticket/1", -1),
            Err(StorageError::Backend(_))
        ));
    }

    #[test]
    fn non_database_errors_are_backend_failures() {
        let batch = CommitBatch {
            expectations: vec![("ticket/counter".to_string(), Version::new(4))],
            writes: vec![("ticket/counter".to_string(), vec![5])],
        };

        let error = classify(&batch, first_written_key(&batch), &sqlx::Error::PoolTimedOut);

        assert!(matches!(error, StorageError::Backend(message) if message.contains("ticket/counter")));
    }
}
