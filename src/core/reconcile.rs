//! Merging an external transaction batch into stored transactions.
//!
//! [`reconcile`] is a pure diff: it looks at the batch and a snapshot of the
//! stored rows keyed by external id and decides what to insert and what to
//! update. The sync job owns all I/O. Feeding the same batch back in against
//! the merged state produces no work.

use crate::{
    core::time::parse_feed_date,
    entities::transaction,
    feed::ExternalTransaction,
};
use chrono::{DateTime, NaiveDate, Utc};
use sea_orm::{Set, prelude::Json};
use std::collections::HashMap;
use tracing::warn;

/// Where a batch came from and when it is being merged.
#[derive(Debug, Clone)]
pub struct ReconcileContext {
    /// Owning account
    pub account_id: i64,
    /// Link the batch was pulled for
    pub link_id: i64,
    /// Provider account id to local bank account id
    pub bank_accounts: HashMap<String, i64>,
    /// Merge time, used as `created_at` for new rows
    pub now: DateTime<Utc>,
}

/// A transaction to insert.
#[derive(Debug, Clone, PartialEq)]
pub struct NewTransaction {
    /// Owning account
    pub account_id: i64,
    /// Local bank account
    pub bank_account_id: i64,
    /// Provider transaction id
    pub external_id: String,
    /// Provider id of the pending transaction it replaces
    pub pending_external_id: Option<String>,
    /// Amount in minor units
    pub amount: i64,
    /// Categories as reported
    pub categories: Vec<String>,
    /// Calendar date
    pub date: NaiveDate,
    /// Authorization date
    pub authorized_date: Option<NaiveDate>,
    /// Raw name as reported
    pub original_name: String,
    /// Display name derived from the feed
    pub name: String,
    /// Merchant as reported
    pub merchant_name: Option<String>,
    /// Not posted yet
    pub is_pending: bool,
    /// Merge time
    pub created_at: DateTime<Utc>,
}

impl From<NewTransaction> for transaction::ActiveModel {
    fn from(new: NewTransaction) -> Self {
        let categories = Json::from(new.categories);
        Self {
            account_id: Set(new.account_id),
            bank_account_id: Set(new.bank_account_id),
            external_id: Set(Some(new.external_id)),
            pending_external_id: Set(new.pending_external_id),
            amount: Set(new.amount),
            spending_id: Set(None),
            spending_amount: Set(None),
            categories: Set(categories.clone()),
            original_categories: Set(categories),
            date: Set(new.date),
            authorized_date: Set(new.authorized_date),
            name: Set(new.name),
            original_name: Set(new.original_name),
            merchant_name: Set(new.merchant_name.clone()),
            original_merchant_name: Set(new.merchant_name),
            is_pending: Set(new.is_pending),
            is_deleted: Set(false),
            created_at: Set(new.created_at),
            ..Default::default()
        }
    }
}

/// Work produced by [`reconcile`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconcileOutcome {
    /// New rows, oldest first
    pub to_insert: Vec<NewTransaction>,
    /// Stored rows with feed-owned fields brought up to date
    pub to_update: Vec<transaction::Model>,
}

impl ReconcileOutcome {
    /// Whether there is nothing to write.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.to_insert.is_empty() && self.to_update.is_empty()
    }
}

/// The columns [`reconcile`] may change on a stored row, as an update.
///
/// Allocation, categories, merchant, and the `original_*` columns are not
/// included; they belong to the user or were fixed at insert.
#[must_use]
pub fn feed_owned_changes(model: &transaction::Model) -> transaction::ActiveModel {
    transaction::ActiveModel {
        amount: Set(model.amount),
        is_pending: Set(model.is_pending),
        authorized_date: Set(model.authorized_date),
        pending_external_id: Set(model.pending_external_id.clone()),
        date: Set(model.date),
        name: Set(model.name.clone()),
        is_deleted: Set(model.is_deleted),
        ..Default::default()
    }
}

/// The name shown for a feed transaction: the merchant when there is one.
#[must_use]
pub fn display_name(name: &str, merchant_name: Option<&str>) -> String {
    match merchant_name.map(str::trim) {
        Some(merchant) if !merchant.is_empty() => merchant.to_string(),
        _ => name.to_string(),
    }
}

/// Major-unit feed amount to minor units, rounding to the nearest cent.
#[allow(clippy::cast_possible_truncation)]
#[must_use]
pub fn to_minor_units(amount: f64) -> i64 {
    (amount * 100.0).round() as i64
}

/// Diffs `external` against `snapshot` (stored rows keyed by external id).
///
/// Rows naming an unknown provider account or carrying an unparseable date are
/// skipped. When an external id appears more than once, only its last
/// occurrence is used. Stored rows missing from the batch are left alone.
#[must_use]
pub fn reconcile(
    context: &ReconcileContext,
    external: &[ExternalTransaction],
    snapshot: &HashMap<String, transaction::Model>,
) -> ReconcileOutcome {
    let last_seen: HashMap<&str, usize> = external
        .iter()
        .enumerate()
        .map(|(index, item)| (item.transaction_id.as_str(), index))
        .collect();

    let mut outcome = ReconcileOutcome::default();

    for (index, item) in external.iter().enumerate() {
        if last_seen.get(item.transaction_id.as_str()) != Some(&index) {
            continue;
        }

        let Some(&bank_account_id) = context.bank_accounts.get(&item.account_id) else {
            warn!(
                link_id = context.link_id,
                external_id = %item.transaction_id,
                external_account_id = %item.account_id,
                "Skipping transaction for unknown bank account"
            );
            continue;
        };

        let dates = parse_feed_date(&item.date).and_then(|date| {
            item.authorized_date
                .as_deref()
                .map(parse_feed_date)
                .transpose()
                .map(|authorized| (date, authorized))
        });
        let (date, authorized_date) = match dates {
            Ok(dates) => dates,
            Err(e) => {
                warn!(
                    link_id = context.link_id,
                    external_id = %item.transaction_id,
                    error = %e,
                    "Skipping transaction with unreadable date"
                );
                continue;
            }
        };

        let amount = to_minor_units(item.amount);
        let name = display_name(&item.name, item.merchant_name.as_deref());

        let Some(stored) = snapshot.get(&item.transaction_id) else {
            outcome.to_insert.push(NewTransaction {
                account_id: context.account_id,
                bank_account_id,
                external_id: item.transaction_id.clone(),
                pending_external_id: item.pending_transaction_id.clone(),
                amount,
                categories: item.category.clone(),
                date,
                authorized_date,
                original_name: item.name.clone(),
                name,
                merchant_name: item.merchant_name.clone(),
                is_pending: item.pending,
                created_at: context.now,
            });
            continue;
        };

        let mut updated = stored.clone();
        let mut changed = false;

        if updated.amount != amount {
            updated.amount = amount;
            changed = true;
        }
        if updated.is_pending != item.pending {
            updated.is_pending = item.pending;
            changed = true;
        }
        if updated.authorized_date != authorized_date {
            updated.authorized_date = authorized_date;
            changed = true;
        }
        if updated.pending_external_id != item.pending_transaction_id {
            updated.pending_external_id.clone_from(&item.pending_transaction_id);
            changed = true;
        }
        if updated.date != date {
            updated.date = date;
            changed = true;
        }
        if updated.is_deleted {
            updated.is_deleted = false;
            changed = true;
        }

        // Names the user has edited are theirs to keep.
        let uncustomized = updated.name == updated.original_name
            || updated.name
                == display_name(
                    &updated.original_name,
                    updated.original_merchant_name.as_deref(),
                );
        if uncustomized && updated.name != name {
            updated.name = name;
            changed = true;
        }

        if changed {
            outcome.to_update.push(updated);
        }
    }

    // Feeds list newest first; insert oldest first.
    outcome.to_insert.reverse();
    outcome
}
