//! Transaction business logic - user-facing create, update, and delete.
//!
//! Each operation runs in one database transaction together with the bucket
//! writes it causes, so a failure anywhere leaves both the transaction row and
//! the bucket balances untouched. Fields that come from the bank feed are not
//! editable on externally sourced transactions.

use crate::{
    core::{
        account::{bank_accounts_for_link, get_account, link_for_bank_account},
        allocation::reconcile_allocation,
    },
    entities::{Transaction, transaction},
    errors::{Error, Result},
};
use chrono::{DateTime, NaiveDate, Utc};
use sea_orm::{ActiveValue::Unchanged, QueryOrder, Set, TransactionTrait, prelude::*};
use tracing::{info, instrument};

/// User input for a manual transaction.
#[derive(Debug, Clone)]
pub struct ManualTransaction {
    /// Bank account under a manual link
    pub bank_account_id: i64,
    /// Amount in minor units, positive for money leaving
    pub amount: i64,
    /// Calendar date in the account's zone
    pub date: NaiveDate,
    /// Display name
    pub name: String,
    /// Merchant, if known
    pub merchant_name: Option<String>,
    /// Free-form categories
    pub categories: Vec<String>,
    /// Whether it has not posted yet
    pub is_pending: bool,
    /// Bucket to spend from
    pub spending_id: Option<i64>,
}

/// Replacement values for the editable fields of a transaction.
///
/// On externally sourced transactions, `amount`, `date`, `authorized_date`,
/// and `is_pending` must match what is stored.
#[derive(Debug, Clone)]
pub struct TransactionUpdate {
    /// Bucket to spend from
    pub spending_id: Option<i64>,
    /// Amount in minor units
    pub amount: i64,
    /// Calendar date
    pub date: NaiveDate,
    /// Authorization date
    pub authorized_date: Option<NaiveDate>,
    /// Whether it has not posted yet
    pub is_pending: bool,
    /// Display name
    pub name: String,
    /// Display merchant name
    pub merchant_name: Option<String>,
    /// Categories
    pub categories: Vec<String>,
}

impl TransactionUpdate {
    /// Starts an update from the stored values.
    ///
    /// # Errors
    /// Returns [`Error::Serialization`] if the stored categories are not a
    /// list of strings.
    pub fn from_model(model: &transaction::Model) -> Result<Self> {
        Ok(Self {
            spending_id: model.spending_id,
            amount: model.amount,
            date: model.date,
            authorized_date: model.authorized_date,
            is_pending: model.is_pending,
            name: model.name.clone(),
            merchant_name: model.merchant_name.clone(),
            categories: serde_json::from_value(model.categories.clone())?,
        })
    }
}

/// The columns a user edit may write. Feed-owned columns are left out for
/// externally sourced transactions so a concurrent sync keeps its values.
fn user_owned_changes(model: &transaction::Model, manual: bool) -> transaction::ActiveModel {
    let mut changes = transaction::ActiveModel {
        id: Unchanged(model.id),
        spending_id: Set(model.spending_id),
        spending_amount: Set(model.spending_amount),
        name: Set(model.name.clone()),
        merchant_name: Set(model.merchant_name.clone()),
        categories: Set(model.categories.clone()),
        ..Default::default()
    };
    if manual {
        changes.amount = Set(model.amount);
        changes.date = Set(model.date);
        changes.authorized_date = Set(model.authorized_date);
        changes.is_pending = Set(model.is_pending);
    }
    changes
}

fn validate_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(Error::Validation {
            message: "Transaction name cannot be empty".to_string(),
        });
    }
    Ok(())
}

fn validate_amount(amount: i64) -> Result<()> {
    if amount <= 0 {
        return Err(Error::Validation {
            message: format!("Transaction amount must be positive, got {amount}"),
        });
    }
    Ok(())
}

/// Creates a manual transaction, spending it from a bucket if one is given.
///
/// # Errors
/// - [`Error::Validation`] for an empty name or a non-positive amount
/// - [`Error::NotFound`] if the account, bank account, or bucket is missing
/// - [`Error::Forbidden`] if the bank account is not under a manual link
/// - [`Error::Conflict`] if the bucket changed concurrently
#[instrument(skip(db, input), fields(bank_account_id = input.bank_account_id))]
pub async fn create_transaction(
    db: &DatabaseConnection,
    account_id: i64,
    input: ManualTransaction,
    now: DateTime<Utc>,
) -> Result<transaction::Model> {
    validate_name(&input.name)?;
    validate_amount(input.amount)?;

    let txn = db.begin().await?;

    let account = get_account(&txn, account_id).await?;
    let (bank_account, link) = link_for_bank_account(&txn, account_id, input.bank_account_id).await?;
    if !link.is_manual() {
        return Err(Error::Forbidden {
            message: format!(
                "transactions cannot be created manually under external link {}",
                link.id
            ),
        });
    }

    let name = input.name.trim().to_string();
    let categories = serde_json::to_value(&input.categories)?;
    let mut model = transaction::Model {
        id: 0,
        account_id,
        bank_account_id: bank_account.id,
        external_id: None,
        pending_external_id: None,
        amount: input.amount,
        spending_id: input.spending_id,
        spending_amount: None,
        categories: categories.clone(),
        original_categories: categories,
        date: input.date,
        authorized_date: None,
        name: name.clone(),
        original_name: name,
        merchant_name: input.merchant_name.clone(),
        original_merchant_name: input.merchant_name,
        is_pending: input.is_pending,
        is_deleted: false,
        created_at: now,
    };
    reconcile_allocation(&txn, &account, None, &mut model, now).await?;

    let active = transaction::ActiveModel {
        account_id: Set(model.account_id),
        bank_account_id: Set(model.bank_account_id),
        external_id: Set(None),
        pending_external_id: Set(None),
        amount: Set(model.amount),
        spending_id: Set(model.spending_id),
        spending_amount: Set(model.spending_amount),
        categories: Set(model.categories),
        original_categories: Set(model.original_categories),
        date: Set(model.date),
        authorized_date: Set(None),
        name: Set(model.name),
        original_name: Set(model.original_name),
        merchant_name: Set(model.merchant_name),
        original_merchant_name: Set(model.original_merchant_name),
        is_pending: Set(model.is_pending),
        is_deleted: Set(false),
        created_at: Set(model.created_at),
        ..Default::default()
    };
    let created = active.insert(&txn).await?;

    txn.commit().await?;
    info!(transaction_id = created.id, spending_id = ?created.spending_id, "Created transaction");
    Ok(created)
}

/// Retrieves a transaction by id, returning None if it does not exist.
pub async fn get_transaction_by_id<C>(
    conn: &C,
    transaction_id: i64,
) -> Result<Option<transaction::Model>>
where
    C: ConnectionTrait,
{
    Transaction::find_by_id(transaction_id)
        .one(conn)
        .await
        .map_err(Into::into)
}

/// Lists the live transactions of a bank account, newest first.
pub async fn transactions_for_bank_account(
    db: &DatabaseConnection,
    bank_account_id: i64,
) -> Result<Vec<transaction::Model>> {
    Transaction::find()
        .filter(transaction::Column::BankAccountId.eq(bank_account_id))
        .filter(transaction::Column::IsDeleted.eq(false))
        .order_by_desc(transaction::Column::Date)
        .order_by_desc(transaction::Column::Id)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Whether any transaction, deleted or not, is stored under a link's bank
/// accounts. A link without one has not had its history pulled yet.
pub async fn link_has_transactions<C>(conn: &C, link_id: i64) -> Result<bool>
where
    C: ConnectionTrait,
{
    let bank_account_ids: Vec<i64> = bank_accounts_for_link(conn, link_id)
        .await?
        .into_iter()
        .map(|bank_account| bank_account.id)
        .collect();
    if bank_account_ids.is_empty() {
        return Ok(false);
    }
    let count = Transaction::find()
        .filter(transaction::Column::BankAccountId.is_in(bank_account_ids))
        .count(conn)
        .await?;
    Ok(count > 0)
}

async fn get_live_transaction<C>(
    conn: &C,
    account_id: i64,
    transaction_id: i64,
) -> Result<transaction::Model>
where
    C: ConnectionTrait,
{
    Transaction::find_by_id(transaction_id)
        .filter(transaction::Column::AccountId.eq(account_id))
        .filter(transaction::Column::IsDeleted.eq(false))
        .one(conn)
        .await?
        .ok_or_else(|| Error::not_found("transaction", transaction_id))
}

/// Replaces the editable fields of a transaction and moves its allocation if
/// the bucket changed.
///
/// The `original_*` fields are never touched.
///
/// # Errors
/// - [`Error::Validation`] for an empty name, or a non-positive amount on a manual transaction
/// - [`Error::Forbidden`] when changing feed-owned fields of an external transaction
/// - [`Error::NotFound`] if the transaction or a referenced bucket is missing
/// - [`Error::Conflict`] if a bucket changed concurrently
#[instrument(skip(db, update))]
pub async fn update_transaction(
    db: &DatabaseConnection,
    account_id: i64,
    transaction_id: i64,
    update: TransactionUpdate,
    now: DateTime<Utc>,
) -> Result<transaction::Model> {
    validate_name(&update.name)?;

    let txn = db.begin().await?;

    let account = get_account(&txn, account_id).await?;
    let existing = get_live_transaction(&txn, account_id, transaction_id).await?;
    let (_, link) = link_for_bank_account(&txn, account_id, existing.bank_account_id).await?;

    if link.is_manual() {
        validate_amount(update.amount)?;
    } else {
        let mut changed = Vec::new();
        if update.amount != existing.amount {
            changed.push("amount");
        }
        if update.is_pending != existing.is_pending {
            changed.push("is_pending");
        }
        if update.date != existing.date {
            changed.push("date");
        }
        if update.authorized_date != existing.authorized_date {
            changed.push("authorized_date");
        }
        if !changed.is_empty() {
            return Err(Error::Forbidden {
                message: format!(
                    "cannot change {} on externally sourced transaction {transaction_id}",
                    changed.join(", ")
                ),
            });
        }
    }

    let mut updated = existing.clone();
    updated.spending_id = update.spending_id;
    updated.amount = update.amount;
    updated.date = update.date;
    updated.authorized_date = update.authorized_date;
    updated.is_pending = update.is_pending;
    updated.name = update.name.trim().to_string();
    updated.merchant_name = update.merchant_name;
    updated.categories = serde_json::to_value(&update.categories)?;

    reconcile_allocation(&txn, &account, Some(&existing), &mut updated, now).await?;

    let saved = user_owned_changes(&updated, link.is_manual())
        .update(&txn)
        .await?;
    txn.commit().await?;
    Ok(saved)
}

/// Deletes a transaction, first returning any allocated money to its bucket.
///
/// Manual transactions are removed. Externally sourced ones are only marked
/// deleted, so a later sync finds the row instead of inserting a duplicate; if
/// the feed still reports the transaction, that sync restores it.
///
/// # Errors
/// - [`Error::NotFound`] if the transaction or its bucket is missing
/// - [`Error::Conflict`] if the bucket changed concurrently
#[instrument(skip(db))]
pub async fn delete_transaction(
    db: &DatabaseConnection,
    account_id: i64,
    transaction_id: i64,
    now: DateTime<Utc>,
) -> Result<()> {
    let txn = db.begin().await?;

    let account = get_account(&txn, account_id).await?;
    let existing = get_live_transaction(&txn, account_id, transaction_id).await?;
    let (_, link) = link_for_bank_account(&txn, account_id, existing.bank_account_id).await?;

    let mut released = existing.clone();
    released.spending_id = None;
    reconcile_allocation(&txn, &account, Some(&existing), &mut released, now).await?;

    if link.is_manual() {
        existing.delete(&txn).await?;
    } else {
        transaction::ActiveModel {
            id: Unchanged(existing.id),
            spending_id: Set(None),
            spending_amount: Set(None),
            is_deleted: Set(true),
            ..Default::default()
        }
        .update(&txn)
        .await?;
    }

    txn.commit().await?;
    Ok(())
}
