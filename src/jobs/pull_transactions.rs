//! Pulls a date range of transactions for one link and merges them.
//!
//! The feed is read completely before any database work starts, then the
//! snapshot read, inserts, and updates all happen in one database
//! transaction. A job that fails or is cancelled mid-fetch leaves nothing
//! behind. Running two jobs for the same link at once is prevented by the
//! dispatcher, not here.

use crate::{
    core::{
        account::{bank_accounts_for_link, get_account, get_link},
        reconcile::{ReconcileContext, feed_owned_changes, reconcile},
    },
    entities::{Transaction, transaction},
    errors::{Error, Result},
    feed::FeedProvider,
};
use chrono::{Days, Months, NaiveDate, Utc};
use sea_orm::{TransactionTrait, prelude::*};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, instrument, warn};

/// Rows per statement when reading or inserting a batch. A transaction row
/// binds 18 parameters, which keeps every statement well under SQLite's
/// variable limit.
const BATCH_CHUNK: usize = 500;

/// How far back the first pull after linking reaches.
const HISTORICAL_MONTHS: u32 = 24;

/// Job payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullTransactionsArguments {
    /// Owning account
    pub account_id: i64,
    /// Link to pull
    pub link_id: i64,
    /// First day to pull
    pub start: NaiveDate,
    /// Last day to pull
    pub end: NaiveDate,
}

impl PullTransactionsArguments {
    /// Arguments covering the `days` before `today`, inclusive of today.
    #[must_use]
    pub fn lookback(account_id: i64, link_id: i64, today: NaiveDate, days: u32) -> Self {
        Self {
            account_id,
            link_id,
            start: today
                .checked_sub_days(Days::new(u64::from(days)))
                .unwrap_or(NaiveDate::MIN),
            end: today,
        }
    }

    /// Arguments for the backfill run once after a link is added: the two
    /// years up to and including `today`.
    #[must_use]
    pub fn historical(account_id: i64, link_id: i64, today: NaiveDate) -> Self {
        Self {
            account_id,
            link_id,
            start: today
                .checked_sub_months(Months::new(HISTORICAL_MONTHS))
                .unwrap_or(NaiveDate::MIN),
            end: today,
        }
    }
}

/// How a job run ended, when it did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    /// There was nothing to pull
    Skipped {
        /// Why the run stopped early
        reason: String,
    },
    /// The feed was merged
    Synced {
        /// New transactions stored
        inserted: usize,
        /// Existing transactions brought up to date
        updated: usize,
    },
}

impl JobOutcome {
    fn skipped(reason: impl Into<String>) -> Self {
        let reason = reason.into();
        info!(%reason, "Skipping transaction pull");
        Self::Skipped { reason }
    }
}

/// Runs pull-transactions jobs against a database and a feed provider.
pub struct PullTransactionsHandler<'a, P> {
    db: &'a DatabaseConnection,
    provider: P,
}

impl<'a, P> PullTransactionsHandler<'a, P>
where
    P: FeedProvider,
{
    /// Creates a handler.
    pub const fn new(db: &'a DatabaseConnection, provider: P) -> Self {
        Self { db, provider }
    }

    /// Decodes a JSON payload and runs the job.
    ///
    /// # Errors
    /// Returns [`Error::Serialization`] for a malformed payload, otherwise
    /// whatever [`run`](Self::run) returns.
    pub async fn handle_consume_job(&self, payload: &[u8]) -> Result<JobOutcome> {
        let args: PullTransactionsArguments = serde_json::from_slice(payload)?;
        self.run(&args).await
    }

    /// Pulls and merges transactions for `args.link_id`.
    ///
    /// # Errors
    /// - [`Error::NotFound`] if the account or link is missing
    /// - [`Error::MissingCredentials`] if the link has no access token
    /// - [`Error::ExternalUnavailable`] if the feed cannot be read
    /// - [`Error::Database`] if the merge cannot be stored
    #[instrument(skip(self), fields(account_id = args.account_id, link_id = args.link_id))]
    pub async fn run(&self, args: &PullTransactionsArguments) -> Result<JobOutcome> {
        let account = get_account(self.db, args.account_id).await?;
        let link = get_link(self.db, account.id, args.link_id).await?;

        if link.is_manual() {
            return Ok(JobOutcome::skipped("link is manual"));
        }
        let Some(access_token) = link.access_token.as_deref() else {
            warn!("External link has no access token");
            return Err(Error::MissingCredentials { link_id: link.id });
        };

        let bank_accounts = bank_accounts_for_link(self.db, link.id).await?;
        if bank_accounts.is_empty() {
            return Ok(JobOutcome::skipped("link has no bank accounts"));
        }

        let client = self.provider.client(&link, access_token).await?;

        // Accounts closed at the institution are no longer reported.
        let open: HashSet<String> = client
            .list_accounts()
            .await?
            .into_iter()
            .map(|external| external.account_id)
            .collect();
        let mapping: HashMap<String, i64> = bank_accounts
            .iter()
            .filter_map(|bank_account| {
                let external_id = bank_account.external_account_id.as_ref()?;
                open.contains(external_id)
                    .then(|| (external_id.clone(), bank_account.id))
            })
            .collect();
        if mapping.is_empty() {
            return Ok(JobOutcome::skipped("no open bank accounts"));
        }

        let mut account_ids: Vec<String> = mapping.keys().cloned().collect();
        account_ids.sort();
        let external = client
            .list_transactions(args.start, args.end, &account_ids)
            .await?;
        debug!(count = external.len(), "Fetched transactions from feed");

        if external.is_empty() {
            return Ok(JobOutcome::Synced {
                inserted: 0,
                updated: 0,
            });
        }

        let txn = self.db.begin().await?;

        let external_ids: Vec<String> = external
            .iter()
            .map(|item| item.transaction_id.clone())
            .collect();
        let mut snapshot: HashMap<String, transaction::Model> = HashMap::new();
        for ids in external_ids.chunks(BATCH_CHUNK) {
            let stored = Transaction::find()
                .filter(transaction::Column::AccountId.eq(account.id))
                .filter(transaction::Column::BankAccountId.is_in(mapping.values().copied()))
                .filter(transaction::Column::ExternalId.is_in(ids.iter().cloned()))
                .all(&txn)
                .await?;
            snapshot.extend(
                stored
                    .into_iter()
                    .filter_map(|model| model.external_id.clone().map(|id| (id, model))),
            );
        }

        let context = ReconcileContext {
            account_id: account.id,
            link_id: link.id,
            bank_accounts: mapping,
            now: Utc::now(),
        };
        let outcome = reconcile(&context, &external, &snapshot);
        let inserted = outcome.to_insert.len();
        let updated = outcome.to_update.len();

        let mut pending_inserts = outcome.to_insert.into_iter().peekable();
        while pending_inserts.peek().is_some() {
            let chunk: Vec<transaction::ActiveModel> = pending_inserts
                .by_ref()
                .take(BATCH_CHUNK)
                .map(transaction::ActiveModel::from)
                .collect();
            Transaction::insert_many(chunk).exec(&txn).await?;
        }
        for model in &outcome.to_update {
            store_feed_update(&txn, model).await?;
        }

        txn.commit().await?;
        info!(inserted, updated, "Merged transactions from feed");
        Ok(JobOutcome::Synced { inserted, updated })
    }
}

/// Writes the feed-owned columns of `model` to its stored row.
///
/// Allocation and user-edited columns are left as they are in the database,
/// not as they were when the snapshot was read.
async fn store_feed_update<C>(conn: &C, model: &transaction::Model) -> Result<()>
where
    C: ConnectionTrait,
{
    Transaction::update_many()
        .set(feed_owned_changes(model))
        .filter(transaction::Column::Id.eq(model.id))
        .exec(conn)
        .await?;
    Ok(())
}
