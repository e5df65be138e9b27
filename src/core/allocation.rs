//! Allocation of transactions to spending buckets.
//!
//! When a transaction's bucket reference changes, money moves between the
//! transaction and the bucket: attaching debits the bucket (never by more than
//! it holds), detaching credits back exactly what was debited. Every bucket
//! touched is re-run through the contribution calculator and written back with
//! an optimistic check on the balances that were read.

use crate::{
    core::{spending as spending_ops, time::parse_timezone},
    entities::{account, spending, spending::SpendingType, transaction},
    errors::{Error, Result},
};
use chrono::{DateTime, Utc};
use sea_orm::ConnectionTrait;
use tracing::debug;

/// What has to happen to bucket balances when a transaction's bucket changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocationPlan {
    /// The transaction is newly attached to a bucket
    Add {
        /// Bucket to debit
        to: i64,
    },
    /// The transaction moves from one bucket to another
    Change {
        /// Bucket to credit back
        from: i64,
        /// Bucket to debit
        to: i64,
    },
    /// The transaction is detached from its bucket
    Remove {
        /// Bucket to credit back
        from: i64,
    },
    /// Nothing to move
    NoOp,
}

impl AllocationPlan {
    /// Derives the plan from the stored and requested bucket references.
    ///
    /// Changing only the amount of an allocated transaction is a no-op; the
    /// bucket keeps the original allocation.
    #[must_use]
    pub const fn between(existing: Option<i64>, updated: Option<i64>) -> Self {
        match (existing, updated) {
            (None, Some(to)) => Self::Add { to },
            (Some(from), None) => Self::Remove { from },
            (Some(from), Some(to)) if from != to => Self::Change { from, to },
            _ => Self::NoOp,
        }
    }
}

/// Debits `bucket` for `txn` and records the allocation on the transaction.
///
/// The allocation is capped at what the bucket currently holds. Goals move the
/// money into `used_amount` so their progress is kept. Returns the amount
/// allocated.
pub fn add_allocation(bucket: &mut spending::Model, txn: &mut transaction::Model) -> i64 {
    let allocation = bucket.current_amount.min(txn.amount);
    bucket.current_amount -= allocation;
    if bucket.spending_type == SpendingType::Goal {
        bucket.used_amount += allocation;
    }
    txn.spending_id = Some(bucket.id);
    txn.spending_amount = Some(allocation);
    allocation
}

/// Credits `bucket` with what `txn` had taken from it and clears the
/// transaction's allocation. Returns the amount credited back.
///
/// # Errors
/// Returns [`Error::InvalidState`] if the transaction has no recorded
/// allocation amount.
pub fn remove_allocation(bucket: &mut spending::Model, txn: &mut transaction::Model) -> Result<i64> {
    let allocation = txn.spending_amount.ok_or_else(|| {
        Error::invalid_state(format!(
            "transaction {} is allocated to spending {} without an amount",
            txn.id, bucket.id
        ))
    })?;
    bucket.current_amount += allocation;
    if bucket.spending_type == SpendingType::Goal {
        bucket.used_amount -= allocation;
    }
    txn.spending_id = None;
    txn.spending_amount = None;
    Ok(allocation)
}

/// Applies the allocation change between `existing` and `updated` to the
/// affected buckets.
///
/// `updated.spending_id` is the requested bucket; on return
/// `updated.spending_amount` reflects what was actually allocated. Buckets are
/// loaded and saved through `conn`, which should be the caller's database
/// transaction so the bucket writes commit or roll back with the transaction
/// row. Returns the buckets that were written.
///
/// # Errors
/// - [`Error::NotFound`] if a referenced bucket is not held in the
///   transaction's bank account
/// - [`Error::InvalidState`] if a schedule cannot be recomputed
/// - [`Error::Conflict`] if a bucket changed since it was read
pub async fn reconcile_allocation<C>(
    conn: &C,
    account: &account::Model,
    existing: Option<&transaction::Model>,
    updated: &mut transaction::Model,
    now: DateTime<Utc>,
) -> Result<Vec<spending::Model>>
where
    C: ConnectionTrait,
{
    let plan = AllocationPlan::between(
        existing.and_then(|txn| txn.spending_id),
        updated.spending_id,
    );
    debug!(transaction_id = updated.id, ?plan, "Reconciling allocation");

    let tz = parse_timezone(&account.timezone)?;
    let mut touched = Vec::new();

    if let AllocationPlan::Remove { from } | AllocationPlan::Change { from, .. } = plan {
        // Removal works from what was stored, not from the requested state.
        updated.spending_id = Some(from);
        updated.spending_amount = existing.and_then(|txn| txn.spending_amount);

        let read = spending_ops::get_spending_for_bank_account(
            conn,
            account.id,
            updated.bank_account_id,
            from,
        )
        .await?;
        let mut bucket = read.clone();
        remove_allocation(&mut bucket, updated)?;
        spending_ops::recompute_spending(conn, tz, now, &mut bucket).await?;
        spending_ops::save_spending_checked(conn, &read, &bucket).await?;
        touched.push(bucket);
    }

    match plan {
        AllocationPlan::Add { to } | AllocationPlan::Change { to, .. } => {
            let read = spending_ops::get_spending_for_bank_account(
                conn,
                account.id,
                updated.bank_account_id,
                to,
            )
            .await?;
            let mut bucket = read.clone();
            add_allocation(&mut bucket, updated);
            spending_ops::recompute_spending(conn, tz, now, &mut bucket).await?;
            spending_ops::save_spending_checked(conn, &read, &bucket).await?;
            touched.push(bucket);
        }
        AllocationPlan::NoOp => {
            updated.spending_amount = existing.and_then(|txn| txn.spending_amount);
            if updated.spending_id.is_none() {
                updated.spending_amount = None;
            }
        }
        AllocationPlan::Remove { .. } => {}
    }

    Ok(touched)
}
