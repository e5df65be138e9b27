//! Funding schedules - the paydays that supply money to buckets.

use crate::{
    core::{
        account::{get_account, link_for_bank_account},
        recurrence::{Recurrence, RecurrenceRule},
        time::local_today,
    },
    entities::{FundingSchedule, funding_schedule},
    errors::{Error, Result},
};
use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use sea_orm::{IntoActiveModel, QueryOrder, Set, prelude::*};
use tracing::debug;

/// User input for a new funding schedule.
#[derive(Debug, Clone)]
pub struct NewFundingSchedule {
    /// Bank account the income lands in
    pub bank_account_id: i64,
    /// Display name
    pub name: String,
    /// RRULE text
    pub rule: String,
    /// First payday
    pub next_occurrence: NaiveDate,
}

/// Creates a funding schedule after checking its rule parses.
///
/// # Errors
/// - [`Error::Validation`] for an empty name
/// - [`Error::InvalidState`] for an unparseable rule
/// - [`Error::NotFound`] if the account or bank account is missing
pub async fn create_funding_schedule(
    db: &DatabaseConnection,
    account_id: i64,
    input: NewFundingSchedule,
) -> Result<funding_schedule::Model> {
    if input.name.trim().is_empty() {
        return Err(Error::Validation {
            message: "Funding schedule name cannot be empty".to_string(),
        });
    }
    let rule = RecurrenceRule::parse(&input.rule, input.next_occurrence)?;

    get_account(db, account_id).await?;
    link_for_bank_account(db, account_id, input.bank_account_id).await?;

    let schedule = funding_schedule::ActiveModel {
        account_id: Set(account_id),
        bank_account_id: Set(input.bank_account_id),
        name: Set(input.name.trim().to_string()),
        rule: Set(rule.spec().to_string()),
        next_occurrence: Set(input.next_occurrence),
        last_occurrence: Set(None),
        ..Default::default()
    };
    schedule.insert(db).await.map_err(Into::into)
}

/// Loads a funding schedule by id, returning None if it does not exist.
pub async fn get_funding_schedule<C>(
    conn: &C,
    schedule_id: i64,
) -> Result<Option<funding_schedule::Model>>
where
    C: ConnectionTrait,
{
    FundingSchedule::find_by_id(schedule_id)
        .one(conn)
        .await
        .map_err(Into::into)
}

/// Lists an account's funding schedules.
pub async fn funding_schedules_for_account<C>(
    conn: &C,
    account_id: i64,
) -> Result<Vec<funding_schedule::Model>>
where
    C: ConnectionTrait,
{
    FundingSchedule::find()
        .filter(funding_schedule::Column::AccountId.eq(account_id))
        .order_by_asc(funding_schedule::Column::Id)
        .all(conn)
        .await
        .map_err(Into::into)
}

/// Moves `schedule` forward until its next payday is `today` or later.
///
/// Returns whether the schedule moved.
///
/// # Errors
/// Returns [`Error::InvalidState`] if the rule is unparseable or runs out of
/// occurrences before reaching `today`.
pub fn advance_funding_schedule(
    schedule: &mut funding_schedule::Model,
    today: NaiveDate,
) -> Result<bool> {
    if schedule.next_occurrence >= today {
        return Ok(false);
    }

    let rule = RecurrenceRule::parse(&schedule.rule, schedule.next_occurrence)?;
    while schedule.next_occurrence < today {
        let next = rule
            .after(schedule.next_occurrence, false)?
            .ok_or_else(|| {
                Error::invalid_state(format!(
                    "funding schedule {} has no occurrence after {}",
                    schedule.id, schedule.next_occurrence
                ))
            })?;
        schedule.last_occurrence = Some(schedule.next_occurrence);
        schedule.next_occurrence = next;
    }
    Ok(true)
}

/// Advances and saves every stale funding schedule of an account.
///
/// Returns the schedules that were advanced.
pub async fn advance_due_schedules<C>(
    conn: &C,
    account_id: i64,
    tz: Tz,
    now: DateTime<Utc>,
) -> Result<Vec<funding_schedule::Model>>
where
    C: ConnectionTrait,
{
    let today = local_today(now, tz);
    let mut advanced = Vec::new();

    for mut schedule in funding_schedules_for_account(conn, account_id).await? {
        if !advance_funding_schedule(&mut schedule, today)? {
            continue;
        }
        debug!(
            schedule_id = schedule.id,
            next_occurrence = %schedule.next_occurrence,
            "Advanced funding schedule"
        );
        let saved = schedule.into_active_model().reset_all().update(conn).await?;
        advanced.push(saved);
    }
    Ok(advanced)
}
