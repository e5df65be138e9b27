//! Recurrence rules for due dates and paydays.
//!
//! Rules are stored as RRULE text (`FREQ=MONTHLY;BYMONTHDAY=15,-1`) and parsed
//! by the `rrule` crate. The rest of the engine only sees the [`Recurrence`]
//! trait, which speaks in account-local calendar days.

use crate::errors::{Error, Result};
use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone};
use rrule::{RRule, RRuleSet, Tz as RuleTz, Unvalidated};

/// "Next occurrence" and "occurrences in a range" over calendar days.
pub trait Recurrence {
    /// First occurrence after `date` (or on it, when `inclusive`).
    /// `None` once a bounded rule has run out.
    fn after(&self, date: NaiveDate, inclusive: bool) -> Result<Option<NaiveDate>>;

    /// Occurrences between `start` and `end`. `inclusive` applies to both ends.
    fn between(&self, start: NaiveDate, end: NaiveDate, inclusive: bool) -> Result<Vec<NaiveDate>>;
}

/// A parsed RRULE anchored at a start date.
///
/// The anchor is the rule's DTSTART; it fixes the phase of interval rules such
/// as a bi-weekly payday.
#[derive(Debug, Clone)]
pub struct RecurrenceRule {
    spec: String,
    rule: RRule<Unvalidated>,
    anchor: NaiveDate,
}

impl RecurrenceRule {
    /// Parses `spec` (with or without an `RRULE:` prefix) anchored at `anchor`.
    ///
    /// # Errors
    /// Returns [`Error::InvalidState`] if the text is not a valid RRULE or the
    /// rule cannot be built from `anchor`.
    pub fn parse(spec: &str, anchor: NaiveDate) -> Result<Self> {
        let trimmed = spec.trim();
        let body = trimmed.strip_prefix("RRULE:").unwrap_or(trimmed);
        let rule: RRule<Unvalidated> = body
            .parse()
            .map_err(|e| Error::invalid_state(format!("invalid recurrence rule {spec:?}: {e}")))?;

        let parsed = Self {
            spec: body.to_string(),
            rule,
            anchor,
        };
        // Validate up front so evaluation errors only come from bad dates.
        parsed.build()?;
        Ok(parsed)
    }

    /// The rule text as stored.
    #[must_use]
    pub fn spec(&self) -> &str {
        &self.spec
    }

    /// The date the rule is anchored at.
    #[must_use]
    pub const fn anchor(&self) -> NaiveDate {
        self.anchor
    }

    fn build(&self) -> Result<RRuleSet> {
        self.rule
            .clone()
            .build(day_start(self.anchor))
            .map_err(|e| Error::invalid_state(format!("invalid recurrence rule {:?}: {e}", self.spec)))
    }
}

// Day-granularity evaluation is zone independent once the days are local, so
// the rule is always evaluated at UTC midnight.
fn day_start(date: NaiveDate) -> DateTime<RuleTz> {
    RuleTz::UTC.from_utc_datetime(&date.and_time(NaiveTime::MIN))
}

impl Recurrence for RecurrenceRule {
    fn after(&self, date: NaiveDate, inclusive: bool) -> Result<Option<NaiveDate>> {
        let result = self.build()?.after(day_start(date)).all(2);
        Ok(result
            .dates
            .into_iter()
            .map(|occurrence| occurrence.date_naive())
            .find(|day| if inclusive { *day >= date } else { *day > date }))
    }

    fn between(&self, start: NaiveDate, end: NaiveDate, inclusive: bool) -> Result<Vec<NaiveDate>> {
        if end < start {
            return Ok(Vec::new());
        }
        let result = self
            .build()?
            .after(day_start(start))
            .before(day_start(end))
            .all(u16::MAX);
        Ok(result
            .dates
            .into_iter()
            .map(|occurrence| occurrence.date_naive())
            .filter(|day| {
                if inclusive {
                    *day >= start && *day <= end
                } else {
                    *day > start && *day < end
                }
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    const SEMI_MONTHLY: &str = "FREQ=MONTHLY;BYMONTHDAY=15,-1";

    #[test]
    fn test_semi_monthly_after() -> Result<()> {
        let rule = RecurrenceRule::parse(SEMI_MONTHLY, date(2022, 1, 15))?;
        assert_eq!(rule.after(date(2022, 4, 5), false)?, Some(date(2022, 4, 15)));
        assert_eq!(rule.after(date(2022, 4, 15), false)?, Some(date(2022, 4, 30)));
        assert_eq!(rule.after(date(2022, 4, 30), false)?, Some(date(2022, 5, 15)));
        Ok(())
    }

    #[test]
    fn test_after_inclusive_returns_same_day() -> Result<()> {
        let rule = RecurrenceRule::parse(SEMI_MONTHLY, date(2022, 1, 15))?;
        assert_eq!(rule.after(date(2022, 4, 15), true)?, Some(date(2022, 4, 15)));
        Ok(())
    }

    #[test]
    fn test_rrule_prefix_is_accepted() -> Result<()> {
        let rule = RecurrenceRule::parse("RRULE:FREQ=MONTHLY;BYMONTHDAY=1", date(2022, 1, 1))?;
        assert_eq!(rule.spec(), "FREQ=MONTHLY;BYMONTHDAY=1");
        assert_eq!(rule.after(date(2022, 2, 10), false)?, Some(date(2022, 3, 1)));
        Ok(())
    }

    #[test]
    fn test_between_semi_monthly() -> Result<()> {
        let rule = RecurrenceRule::parse(SEMI_MONTHLY, date(2022, 1, 15))?;
        let inclusive = rule.between(date(2022, 4, 15), date(2022, 5, 31), true)?;
        assert_eq!(
            inclusive,
            vec![
                date(2022, 4, 15),
                date(2022, 4, 30),
                date(2022, 5, 15),
                date(2022, 5, 31)
            ]
        );

        let exclusive = rule.between(date(2022, 4, 15), date(2022, 5, 31), false)?;
        assert_eq!(exclusive, vec![date(2022, 4, 30), date(2022, 5, 15)]);
        Ok(())
    }

    #[test]
    fn test_between_reversed_range_is_empty() -> Result<()> {
        let rule = RecurrenceRule::parse(SEMI_MONTHLY, date(2022, 1, 15))?;
        assert!(rule.between(date(2022, 6, 1), date(2022, 5, 1), true)?.is_empty());
        Ok(())
    }

    #[test]
    fn test_biweekly_phase_follows_anchor() -> Result<()> {
        let rule = "FREQ=WEEKLY;INTERVAL=2;BYDAY=FR";
        let first = RecurrenceRule::parse(rule, date(2022, 4, 1))?;
        let second = RecurrenceRule::parse(rule, date(2022, 4, 8))?;
        assert_eq!(first.after(date(2022, 4, 2), false)?, Some(date(2022, 4, 15)));
        assert_eq!(second.after(date(2022, 4, 2), false)?, Some(date(2022, 4, 8)));
        Ok(())
    }

    #[test]
    fn test_bounded_rule_runs_out() -> Result<()> {
        let rule = RecurrenceRule::parse("FREQ=MONTHLY;BYMONTHDAY=1;COUNT=2", date(2022, 1, 1))?;
        assert_eq!(rule.after(date(2022, 1, 15), false)?, Some(date(2022, 2, 1)));
        assert_eq!(rule.after(date(2022, 2, 1), false)?, None);
        Ok(())
    }

    #[test]
    fn test_invalid_rule_is_invalid_state() {
        let result = RecurrenceRule::parse("FREQ=SOMETIMES", date(2022, 1, 1));
        assert!(matches!(result, Err(Error::InvalidState { .. })));
    }
}
