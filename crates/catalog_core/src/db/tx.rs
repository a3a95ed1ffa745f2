//! Scoped transaction coordinator.
//!
//! # Responsibility
//! - Begin one SQLite transaction, hand a unit of work to caller code, then
//!   commit on success or roll back on failure.
//! - Bind repository handles to the open transaction.
//!
//! # Invariants
//! - The transaction never outlives [`run_in_transaction`]: it is committed,
//!   rolled back, or (on panic) rolled back by `Drop`.
//! - Transactions start `IMMEDIATE`, so the write lock is held from begin.
//! - The unit of work is never shared across calls.

use crate::repo::image_repo::SqliteImageRepository;
use crate::repo::product_repo::SqliteProductRepository;
use log::{debug, error, warn};
use rusqlite::{Connection, Transaction, TransactionBehavior};
use std::time::Instant;

/// Repository access bound to one open transaction.
pub struct UnitOfWork<'tx> {
    conn: &'tx Connection,
}

impl<'tx> UnitOfWork<'tx> {
    fn new(tx: &'tx Transaction<'_>) -> Self {
        Self { conn: tx }
    }

    /// Product store writing through the transaction.
    pub fn products(&self) -> SqliteProductRepository<'tx> {
        SqliteProductRepository::new(self.conn)
    }

    /// Image store writing through the transaction.
    pub fn images(&self) -> SqliteImageRepository<'tx> {
        SqliteImageRepository::new(self.conn)
    }
}

/// Runs `work` inside one transaction.
///
/// Commits when `work` returns `Ok`, rolls back when it returns `Err`. A panic
/// inside `work` unwinds through the transaction guard, which rolls back.
///
/// # Errors
/// - Begin and commit failures are converted into `E`.
/// - Errors returned by `work` are passed through unchanged after rollback and
///   are not logged here.
pub fn run_in_transaction<T, E, F>(
    conn: &mut Connection,
    operation: &'static str,
    work: F,
) -> Result<T, E>
where
    F: FnOnce(&UnitOfWork<'_>) -> Result<T, E>,
    E: From<rusqlite::Error>,
{
    let started_at = Instant::now();
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    debug!("event=tx_begin module=db status=start operation={operation}");

    let outcome = {
        let unit = UnitOfWork::new(&tx);
        work(&unit)
    };

    match outcome {
        Ok(value) => {
            if let Err(err) = tx.commit() {
                error!(
                    "event=tx_commit module=db status=error operation={operation} duration_ms={}",
                    started_at.elapsed().as_millis()
                );
                return Err(err.into());
            }
            debug!(
                "event=tx_commit module=db status=ok operation={operation} duration_ms={}",
                started_at.elapsed().as_millis()
            );
            Ok(value)
        }
        // Failure detail belongs to the caller that classifies `err`.
        Err(err) => {
            if let Err(rollback_err) = tx.rollback() {
                error!(
                    "event=tx_rollback module=db status=error operation={operation} error={rollback_err}"
                );
            } else {
                warn!(
                    "event=tx_rollback module=db status=ok operation={operation} duration_ms={}",
                    started_at.elapsed().as_millis()
                );
            }
            Err(err)
        }
    }
}
