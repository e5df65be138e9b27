//! Bank account entity - One account at an institution, under a link.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Bank account database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "bank_accounts")]
pub struct Model {
    /// Unique identifier for the bank account
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Owning account
    pub account_id: i64,
    /// Link this bank account was discovered through
    pub link_id: i64,
    /// The provider's id for this account; `None` for manual bank accounts
    pub external_account_id: Option<String>,
    /// Display name, e.g. "Checking"
    pub name: String,
}

/// Defines relationships between `BankAccount` and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Each bank account belongs to one link
    #[sea_orm(
        belongs_to = "super::link::Entity",
        from = "Column::LinkId",
        to = "super::link::Column::Id"
    )]
    Link,
    /// One bank account has many transactions
    #[sea_orm(has_many = "super::transaction::Entity")]
    Transactions,
}

impl Related<super::link::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Link.def()
    }
}

impl Related<super::transaction::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Transactions.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
