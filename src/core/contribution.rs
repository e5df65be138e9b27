//! Contribution scheduling for spending buckets.
//!
//! Given a bucket, the account's zone, and the next funding event, works out
//! the bucket's next due date, whether it has fallen behind, and how much to
//! set aside at the next payday. Pure: "now" is passed in and nothing is read
//! from or written to the database here.

use crate::core::recurrence::{Recurrence, RecurrenceRule};
use crate::core::time::date_midnight;
use crate::entities::spending;
use crate::errors::{Error, Result};
use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use std::cmp::Ordering;

/// The next funding event of the schedule that feeds a bucket.
pub struct FundingEvent<'a> {
    /// Next payday, as a calendar date in the account's zone
    pub next_occurrence: NaiveDate,
    /// The funding schedule's own rule, used to count paydays before a due date
    pub rule: &'a dyn Recurrence,
}

/// Derived scheduling fields for one bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContributionSchedule {
    /// Due date after any catch-up
    pub next_recurrence: NaiveDate,
    /// Previous due date
    pub last_recurrence: Option<NaiveDate>,
    /// Amount to set aside at the next funding event
    pub next_contribution_amount: i64,
    /// The next funding event lands after the due date
    pub is_behind: bool,
}

impl ContributionSchedule {
    /// Writes the derived fields onto `spending`. Returns whether anything changed.
    ///
    /// This is the only place the derived fields are assigned.
    pub fn apply_to(&self, spending: &mut spending::Model) -> bool {
        let changed = spending.next_recurrence != self.next_recurrence
            || spending.last_recurrence != self.last_recurrence
            || spending.next_contribution_amount != self.next_contribution_amount
            || spending.is_behind != self.is_behind;

        spending.next_recurrence = self.next_recurrence;
        spending.last_recurrence = self.last_recurrence;
        spending.next_contribution_amount = self.next_contribution_amount;
        spending.is_behind = self.is_behind;
        changed
    }
}

/// Computes the schedule for `spending` as of `now`.
///
/// A bucket whose due date has passed is advanced by exactly one occurrence of
/// its rule; further missed periods are caught up by later evaluations. Buckets
/// without a rule are one-shot and keep their due date.
///
/// # Errors
/// Returns [`Error::InvalidState`] if the bucket's rule cannot be parsed or has
/// no occurrence after the current due date, or if the funding rule fails.
pub fn compute_schedule(
    spending: &spending::Model,
    tz: Tz,
    now: DateTime<Utc>,
    funding: &FundingEvent<'_>,
) -> Result<ContributionSchedule> {
    let progress = spending.progress_amount();
    let now = now.with_timezone(&tz);

    let mut next_recurrence = spending.next_recurrence;
    let mut last_recurrence = spending.last_recurrence;

    if let Some(rule_text) = spending.recurrence_rule.as_deref() {
        let rule = RecurrenceRule::parse(rule_text, next_recurrence)?;
        if now > date_midnight(next_recurrence, tz) {
            let advanced = rule.after(next_recurrence, false)?.ok_or_else(|| {
                Error::invalid_state(format!(
                    "spending {} has no recurrence after {next_recurrence}",
                    spending.id
                ))
            })?;
            last_recurrence = Some(next_recurrence);
            next_recurrence = advanced;
        }
    }

    let needed = (spending.target_amount - progress).max(0);
    let due = date_midnight(next_recurrence, tz);
    let funding_at = date_midnight(funding.next_occurrence, tz);

    let (next_contribution_amount, is_behind) = match funding_at.cmp(&due) {
        // The next payday is too late to fund this due date, contribute everything now.
        Ordering::Greater => (needed, progress < spending.target_amount),
        // Funding on the due date is tight but on plan.
        Ordering::Equal => (needed, false),
        Ordering::Less => {
            let contributions = funding
                .rule
                .between(funding.next_occurrence, next_recurrence, true)?
                .into_iter()
                .filter(|day| *day < next_recurrence)
                .count();
            if contributions == 0 {
                // Funding schedule and due date disagree; fund it in one shot
                // rather than divide by zero.
                (needed, false)
            } else {
                let contributions = i64::try_from(contributions).unwrap_or(i64::MAX);
                (needed / contributions, false)
            }
        }
    };

    Ok(ContributionSchedule {
        next_recurrence,
        last_recurrence,
        next_contribution_amount,
        is_behind,
    })
}
