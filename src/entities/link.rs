//! Link entity - A connection to a financial institution.
//!
//! Manual links hold user-entered transactions. External links are fed by the
//! bank-data provider and carry the access credential used by the sync job.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// How transactions arrive for a link.
#[derive(Copy, Clone, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "i32", db_type = "Integer")]
pub enum LinkType {
    /// Transactions are entered by the user
    #[sea_orm(num_value = 0)]
    Manual,
    /// Transactions are pulled from the external feed
    #[sea_orm(num_value = 1)]
    External,
}

/// Link database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "links")]
pub struct Model {
    /// Unique identifier for the link
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Owning account
    pub account_id: i64,
    /// Manual or externally synced
    pub link_type: LinkType,
    /// Provider access credential; `None` for manual links or revoked external links
    #[serde(skip_serializing)]
    pub access_token: Option<String>,
    /// Display name of the institution
    pub institution_name: String,
    /// When the link was created
    pub created_at: DateTimeUtc,
}

impl Model {
    /// Whether transactions under this link are user-owned.
    #[must_use]
    pub fn is_manual(&self) -> bool {
        self.link_type == LinkType::Manual
    }
}

/// Defines relationships between Link and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Each link belongs to one account
    #[sea_orm(
        belongs_to = "super::account::Entity",
        from = "Column::AccountId",
        to = "super::account::Column::Id"
    )]
    Account,
    /// One link has many bank accounts
    #[sea_orm(has_many = "super::bank_account::Entity")]
    BankAccounts,
}

impl Related<super::account::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Account.def()
    }
}

impl Related<super::bank_account::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::BankAccounts.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
