//! Spending entity - A savings target ("spending bucket").
//!
//! Expenses refill indefinitely toward a fixed target. Goals track money spent
//! from them in `used_amount` so that spending does not erase progress.
//! `next_contribution_amount` and `is_behind` are derived by the contribution
//! calculator and must never be written from anywhere else.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Expense or goal.
#[derive(Copy, Clone, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "i32", db_type = "Integer")]
pub enum SpendingType {
    /// Fixed target that refills every recurrence
    #[sea_orm(num_value = 0)]
    Expense,
    /// Target where spent money is tracked separately from saved money
    #[sea_orm(num_value = 1)]
    Goal,
}

/// Spending database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "spending")]
pub struct Model {
    /// Unique identifier for the bucket
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Owning account
    pub account_id: i64,
    /// Bank account the bucket's money lives in
    pub bank_account_id: i64,
    /// Funding schedule that contributes to this bucket
    pub funding_schedule_id: i64,
    /// Expense or goal
    pub spending_type: SpendingType,
    /// Human-readable name
    pub name: String,
    /// Amount to reach by the due date, in minor units
    pub target_amount: i64,
    /// Amount currently set aside, in minor units
    pub current_amount: i64,
    /// Amount spent from a goal, in minor units
    pub used_amount: i64,
    /// RRULE text; `None` makes the bucket one-shot
    pub recurrence_rule: Option<String>,
    /// Previous due date
    pub last_recurrence: Option<Date>,
    /// Next due date, as a calendar date in the account's zone
    pub next_recurrence: Date,
    /// Derived: amount to set aside at the next funding event
    pub next_contribution_amount: i64,
    /// Derived: the next funding event falls after the due date
    pub is_behind: bool,
    /// When the bucket was created
    pub created_at: DateTimeUtc,
}

impl Model {
    /// How far the bucket has progressed toward its target.
    ///
    /// Goals count money already spent from them; expenses only count what is
    /// currently set aside.
    #[must_use]
    pub const fn progress_amount(&self) -> i64 {
        match self.spending_type {
            SpendingType::Goal => self.current_amount + self.used_amount,
            SpendingType::Expense => self.current_amount,
        }
    }
}

/// Defines relationships between Spending and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Each bucket belongs to one account
    #[sea_orm(
        belongs_to = "super::account::Entity",
        from = "Column::AccountId",
        to = "super::account::Column::Id"
    )]
    Account,
    /// Each bucket is funded by one schedule
    #[sea_orm(
        belongs_to = "super::funding_schedule::Entity",
        from = "Column::FundingScheduleId",
        to = "super::funding_schedule::Column::Id"
    )]
    FundingSchedule,
    /// One bucket has many allocated transactions
    #[sea_orm(has_many = "super::transaction::Entity")]
    Transactions,
}

impl Related<super::account::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Account.def()
    }
}

impl Related<super::funding_schedule::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::FundingSchedule.def()
    }
}

impl Related<super::transaction::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Transactions.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
