//! Spending buckets - creation, schedule recomputation, and guarded saves.
//!
//! Whenever a bucket's balances or due date change, its derived fields are
//! recomputed here before the row is written. Writes go through
//! [`save_spending_checked`], which only succeeds if the balances in the
//! database are still the ones that were read.

use crate::{
    core::{
        account::{get_account, link_for_bank_account, list_accounts},
        contribution::{ContributionSchedule, FundingEvent, compute_schedule},
        funding::{advance_due_schedules, funding_schedules_for_account, get_funding_schedule},
        recurrence::RecurrenceRule,
        time::parse_timezone,
    },
    entities::{Spending, funding_schedule, spending, spending::SpendingType},
    errors::{Error, Result},
};
use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use sea_orm::{QueryOrder, Set, TransactionTrait, prelude::*};
use std::collections::HashMap;
use tracing::{debug, info, instrument, warn};

/// User input for a new spending bucket.
#[derive(Debug, Clone)]
pub struct NewSpending {
    /// Bank account the bucket's money lives in
    pub bank_account_id: i64,
    /// Schedule that funds the bucket
    pub funding_schedule_id: i64,
    /// Expense or goal
    pub spending_type: SpendingType,
    /// Display name
    pub name: String,
    /// Target amount in minor units
    pub target_amount: i64,
    /// Amount already set aside
    pub current_amount: i64,
    /// RRULE text; `None` for a one-shot bucket
    pub recurrence_rule: Option<String>,
    /// First due date
    pub next_recurrence: NaiveDate,
}

/// Counts from one [`refresh_all_schedules`] pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefreshSummary {
    /// Accounts visited
    pub accounts: usize,
    /// Buckets recomputed
    pub buckets_examined: usize,
    /// Buckets whose stored fields changed
    pub buckets_updated: usize,
    /// Funding schedules moved forward
    pub schedules_advanced: usize,
}

/// Computes the schedule of `bucket` against the schedule that funds it.
pub fn schedule_for(
    bucket: &spending::Model,
    funding: &funding_schedule::Model,
    tz: Tz,
    now: DateTime<Utc>,
) -> Result<ContributionSchedule> {
    let rule = RecurrenceRule::parse(&funding.rule, funding.next_occurrence)?;
    compute_schedule(
        bucket,
        tz,
        now,
        &FundingEvent {
            next_occurrence: funding.next_occurrence,
            rule: &rule,
        },
    )
}

/// Creates a bucket with its derived fields already computed.
///
/// # Errors
/// - [`Error::Validation`] for an empty name or negative amounts
/// - [`Error::InvalidState`] for an unparseable recurrence rule
/// - [`Error::NotFound`] if the account, bank account, or funding schedule is missing
pub async fn create_spending(
    db: &DatabaseConnection,
    account_id: i64,
    input: NewSpending,
    now: DateTime<Utc>,
) -> Result<spending::Model> {
    if input.name.trim().is_empty() {
        return Err(Error::Validation {
            message: "Spending name cannot be empty".to_string(),
        });
    }
    if input.target_amount < 0 || input.current_amount < 0 {
        return Err(Error::Validation {
            message: "Spending amounts cannot be negative".to_string(),
        });
    }
    if let Some(rule) = input.recurrence_rule.as_deref() {
        RecurrenceRule::parse(rule, input.next_recurrence)?;
    }

    let account = get_account(db, account_id).await?;
    let tz = parse_timezone(&account.timezone)?;
    link_for_bank_account(db, account_id, input.bank_account_id).await?;
    let funding = get_funding_schedule(db, input.funding_schedule_id)
        .await?
        .filter(|schedule| schedule.account_id == account_id)
        .ok_or_else(|| Error::not_found("funding schedule", input.funding_schedule_id))?;

    let mut bucket = spending::Model {
        id: 0,
        account_id,
        bank_account_id: input.bank_account_id,
        funding_schedule_id: funding.id,
        spending_type: input.spending_type,
        name: input.name.trim().to_string(),
        target_amount: input.target_amount,
        current_amount: input.current_amount,
        used_amount: 0,
        recurrence_rule: input.recurrence_rule,
        last_recurrence: None,
        next_recurrence: input.next_recurrence,
        next_contribution_amount: 0,
        is_behind: false,
        created_at: now,
    };
    schedule_for(&bucket, &funding, tz, now)?.apply_to(&mut bucket);

    let active = spending::ActiveModel {
        account_id: Set(bucket.account_id),
        bank_account_id: Set(bucket.bank_account_id),
        funding_schedule_id: Set(bucket.funding_schedule_id),
        spending_type: Set(bucket.spending_type),
        name: Set(bucket.name),
        target_amount: Set(bucket.target_amount),
        current_amount: Set(bucket.current_amount),
        used_amount: Set(bucket.used_amount),
        recurrence_rule: Set(bucket.recurrence_rule),
        last_recurrence: Set(bucket.last_recurrence),
        next_recurrence: Set(bucket.next_recurrence),
        next_contribution_amount: Set(bucket.next_contribution_amount),
        is_behind: Set(bucket.is_behind),
        created_at: Set(bucket.created_at),
        ..Default::default()
    };
    active.insert(db).await.map_err(Into::into)
}

/// Finds a bucket by id, returning None if it does not exist.
pub async fn get_spending_by_id<C>(conn: &C, spending_id: i64) -> Result<Option<spending::Model>>
where
    C: ConnectionTrait,
{
    Spending::find_by_id(spending_id)
        .one(conn)
        .await
        .map_err(Into::into)
}

/// Loads a bucket whose money lives in `bank_account_id` of `account_id`.
///
/// # Errors
/// Returns [`Error::NotFound`] if the bucket is missing, owned by another
/// account, or held in a different bank account.
pub async fn get_spending_for_bank_account<C>(
    conn: &C,
    account_id: i64,
    bank_account_id: i64,
    spending_id: i64,
) -> Result<spending::Model>
where
    C: ConnectionTrait,
{
    Spending::find_by_id(spending_id)
        .filter(spending::Column::AccountId.eq(account_id))
        .filter(spending::Column::BankAccountId.eq(bank_account_id))
        .one(conn)
        .await?
        .ok_or_else(|| Error::not_found("spending", spending_id))
}

/// Lists an account's buckets.
pub async fn spending_for_account<C>(conn: &C, account_id: i64) -> Result<Vec<spending::Model>>
where
    C: ConnectionTrait,
{
    Spending::find()
        .filter(spending::Column::AccountId.eq(account_id))
        .order_by_asc(spending::Column::Id)
        .all(conn)
        .await
        .map_err(Into::into)
}

/// Reloads the bucket's funding schedule and re-derives its schedule fields.
///
/// Returns whether any derived field changed.
pub async fn recompute_spending<C>(
    conn: &C,
    tz: Tz,
    now: DateTime<Utc>,
    bucket: &mut spending::Model,
) -> Result<bool>
where
    C: ConnectionTrait,
{
    let funding = get_funding_schedule(conn, bucket.funding_schedule_id)
        .await?
        .ok_or_else(|| Error::not_found("funding schedule", bucket.funding_schedule_id))?;
    Ok(schedule_for(bucket, &funding, tz, now)?.apply_to(bucket))
}

/// Writes `updated` over the stored bucket if its balances still match `read`.
///
/// Only balances and schedule fields are written. Zero matched rows means
/// another writer got there first.
///
/// # Errors
/// Returns [`Error::Conflict`] when the stored balances no longer match `read`.
pub async fn save_spending_checked<C>(
    conn: &C,
    read: &spending::Model,
    updated: &spending::Model,
) -> Result<()>
where
    C: ConnectionTrait,
{
    let changes = spending::ActiveModel {
        current_amount: Set(updated.current_amount),
        used_amount: Set(updated.used_amount),
        last_recurrence: Set(updated.last_recurrence),
        next_recurrence: Set(updated.next_recurrence),
        next_contribution_amount: Set(updated.next_contribution_amount),
        is_behind: Set(updated.is_behind),
        ..Default::default()
    };

    let result = Spending::update_many()
        .set(changes)
        .filter(spending::Column::Id.eq(read.id))
        .filter(spending::Column::CurrentAmount.eq(read.current_amount))
        .filter(spending::Column::UsedAmount.eq(read.used_amount))
        .exec(conn)
        .await?;

    if result.rows_affected == 0 {
        warn!(spending_id = read.id, "Optimistic update of spending matched no rows");
        return Err(Error::Conflict {
            spending_id: read.id,
        });
    }
    Ok(())
}

/// Advances stale funding schedules and recomputes every bucket of every
/// account.
///
/// Each account is processed in its own database transaction. A bucket row is
/// only written when one of its schedule fields changed.
#[instrument(skip(db))]
pub async fn refresh_all_schedules(
    db: &DatabaseConnection,
    now: DateTime<Utc>,
) -> Result<RefreshSummary> {
    let mut summary = RefreshSummary::default();

    for account in list_accounts(db).await? {
        let tz = parse_timezone(&account.timezone)?;
        let txn = db.begin().await?;

        summary.schedules_advanced += advance_due_schedules(&txn, account.id, tz, now)
            .await?
            .len();

        let funding: HashMap<i64, funding_schedule::Model> =
            funding_schedules_for_account(&txn, account.id)
                .await?
                .into_iter()
                .map(|schedule| (schedule.id, schedule))
                .collect();

        for bucket in spending_for_account(&txn, account.id).await? {
            summary.buckets_examined += 1;
            let schedule = funding
                .get(&bucket.funding_schedule_id)
                .ok_or_else(|| Error::not_found("funding schedule", bucket.funding_schedule_id))?;

            let mut refreshed = bucket.clone();
            if schedule_for(&bucket, schedule, tz, now)?.apply_to(&mut refreshed) {
                debug!(spending_id = bucket.id, "Spending schedule changed");
                save_spending_checked(&txn, &bucket, &refreshed).await?;
                summary.buckets_updated += 1;
            }
        }

        txn.commit().await?;
        summary.accounts += 1;
    }

    info!(
        accounts = summary.accounts,
        examined = summary.buckets_examined,
        updated = summary.buckets_updated,
        advanced = summary.schedules_advanced,
        "Refreshed spending schedules"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::entities::LinkType;
    use crate::test_utils::*;
    use sea_orm::sea_query::Expr;
    use sea_orm::{DatabaseBackend, MockDatabase};

    #[tokio::test]
    async fn test_create_spending_validation() -> Result<()> {
        let db = MockDatabase::new(DatabaseBackend::Sqlite).into_connection();
        let input = NewSpending {
            bank_account_id: 1,
            funding_schedule_id: 1,
            spending_type: SpendingType::Expense,
            name: "   ".to_string(),
            target_amount: 1000,
            current_amount: 0,
            recurrence_rule: None,
            next_recurrence: date(2022, 5, 1),
        };

        let result = create_spending(&db, 1, input.clone(), test_now()).await;
        assert!(matches!(result, Err(Error::Validation { .. })));

        let negative = NewSpending {
            name: "Rent".to_string(),
            target_amount: -5,
            ..input.clone()
        };
        let result = create_spending(&db, 1, negative, test_now()).await;
        assert!(matches!(result, Err(Error::Validation { .. })));

        let bad_rule = NewSpending {
            name: "Rent".to_string(),
            recurrence_rule: Some("FREQ=OFTEN".to_string()),
            ..input
        };
        let result = create_spending(&db, 1, bad_rule, test_now()).await;
        assert!(matches!(result, Err(Error::InvalidState { .. })));
        Ok(())
    }

    #[tokio::test]
    async fn test_create_spending_computes_schedule() -> Result<()> {
        let db = setup_test_db().await?;
        let fixture = BudgetFixture::create(&db, LinkType::Manual).await?;

        // Paydays Apr 15 and Apr 30 fall before the May 1 due date.
        let bucket = create_spending(
            &db,
            fixture.account.id,
            NewSpending {
                bank_account_id: fixture.bank_account.id,
                funding_schedule_id: fixture.funding.id,
                spending_type: SpendingType::Expense,
                name: "Rent".to_string(),
                target_amount: 1001,
                current_amount: 1,
                recurrence_rule: Some("FREQ=MONTHLY;BYMONTHDAY=1".to_string()),
                next_recurrence: date(2022, 5, 1),
            },
            noon_utc(2022, 4, 5),
        )
        .await?;

        assert_eq!(bucket.next_contribution_amount, 500);
        assert!(!bucket.is_behind);
        assert_eq!(get_spending_by_id(&db, bucket.id).await?.unwrap(), bucket);
        Ok(())
    }

    #[tokio::test]
    async fn test_save_spending_checked_detects_conflict() -> Result<()> {
        let db = setup_test_db().await?;
        let fixture = BudgetFixture::create(&db, LinkType::Manual).await?;
        let read = create_test_spending(&db, &fixture, SpendingType::Expense, 1000, 400).await?;

        // Another writer moves the balance after our read.
        Spending::update_many()
            .col_expr(
                spending::Column::CurrentAmount,
                Expr::col(spending::Column::CurrentAmount).add(50),
            )
            .filter(spending::Column::Id.eq(read.id))
            .exec(&db)
            .await?;

        let mut stale = read.clone();
        stale.current_amount -= 100;
        let result = save_spending_checked(&db, &read, &stale).await;
        assert!(matches!(
            result,
            Err(Error::Conflict { spending_id }) if spending_id == read.id
        ));

        let stored = get_spending_by_id(&db, read.id).await?.unwrap();
        assert_eq!(stored.current_amount, 450);
        Ok(())
    }

    #[tokio::test]
    async fn test_save_spending_checked_writes_fields() -> Result<()> {
        let db = setup_test_db().await?;
        let fixture = BudgetFixture::create(&db, LinkType::Manual).await?;
        let read = create_test_spending(&db, &fixture, SpendingType::Goal, 1000, 400).await?;

        let mut updated = read.clone();
        updated.current_amount = 100;
        updated.used_amount = 300;
        updated.is_behind = true;
        save_spending_checked(&db, &read, &updated).await?;

        assert_eq!(get_spending_by_id(&db, read.id).await?.unwrap(), updated);
        Ok(())
    }

    #[tokio::test]
    async fn test_refresh_all_schedules() -> Result<()> {
        let db = setup_test_db().await?;
        let fixture = BudgetFixture::create(&db, LinkType::Manual).await?;
        let bucket = create_test_spending(&db, &fixture, SpendingType::Expense, 1000, 0).await?;
        assert_eq!(bucket.next_recurrence, date(2022, 5, 1));

        // A month later: payday moved to May 15, rent rolled to June 1.
        let summary = refresh_all_schedules(&db, noon_utc(2022, 5, 3)).await?;
        assert_eq!(
            summary,
            RefreshSummary {
                accounts: 1,
                buckets_examined: 1,
                buckets_updated: 1,
                schedules_advanced: 1,
            }
        );

        let stored = get_spending_by_id(&db, bucket.id).await?.unwrap();
        assert_eq!(stored.last_recurrence, Some(date(2022, 5, 1)));
        assert_eq!(stored.next_recurrence, date(2022, 6, 1));
        // May 15 and May 31 remain before June 1.
        assert_eq!(stored.next_contribution_amount, 500);

        let again = refresh_all_schedules(&db, noon_utc(2022, 5, 3)).await?;
        assert_eq!(again.buckets_updated, 0);
        assert_eq!(again.schedules_advanced, 0);
        Ok(())
    }
}
