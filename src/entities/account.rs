//! Account entity - The owner of every other record.
//!
//! The account's IANA time zone is the reference for all "midnight" and
//! due-date computations on its buckets, schedules, and transactions.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Account database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "accounts")]
pub struct Model {
    /// Unique identifier for the account
    #[sea_orm(primary_key)]
    pub id: i64,
    /// IANA time zone name, e.g. `"America/Chicago"`
    pub timezone: String,
    /// When the account was created
    pub created_at: DateTimeUtc,
}

/// Defines relationships between Account and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// One account has many links
    #[sea_orm(has_many = "super::link::Entity")]
    Links,
    /// One account has many spending buckets
    #[sea_orm(has_many = "super::spending::Entity")]
    Spending,
}

impl Related<super::link::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Links.def()
    }
}

impl Related<super::spending::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Spending.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
