//! Funding schedule entity - A recurring income event (payday) that supplies
//! money to spending buckets.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Funding schedule database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "funding_schedules")]
pub struct Model {
    /// Unique identifier for the funding schedule
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Owning account
    pub account_id: i64,
    /// Bank account the income lands in
    pub bank_account_id: i64,
    /// Human-readable name, e.g. "Payday"
    pub name: String,
    /// RRULE text, e.g. `FREQ=MONTHLY;BYMONTHDAY=15,-1`
    pub rule: String,
    /// Next payday, as a calendar date in the account's zone
    pub next_occurrence: Date,
    /// Most recent payday that has passed
    pub last_occurrence: Option<Date>,
}

/// Defines relationships between `FundingSchedule` and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// One funding schedule funds many spending buckets
    #[sea_orm(has_many = "super::spending::Entity")]
    Spending,
}

impl Related<super::spending::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Spending.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
