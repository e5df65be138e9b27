//! Transaction entity - Money moving in or out of a bank account.
//!
//! Externally sourced rows carry `external_id` as their natural key; the
//! `original_*` fields record what the source first reported and never change
//! afterwards, while the plain fields hold user edits. `spending_amount` is the
//! part of `amount` that was debited from the bucket in `spending_id`, and is
//! present exactly when `spending_id` is.
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Transaction database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "transactions")]
pub struct Model {
    /// Unique identifier for the transaction
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Owning account
    pub account_id: i64,
    /// Bank account the transaction posted to
    pub bank_account_id: i64,
    /// Provider transaction id; `None` for manual transactions
    pub external_id: Option<String>,
    /// Provider id of the pending transaction this posted one replaces
    pub pending_external_id: Option<String>,
    /// Amount in minor units (positive for money leaving the account)
    pub amount: i64,
    /// Spending bucket this transaction was spent from
    pub spending_id: Option<i64>,
    /// Amount actually debited from the bucket (may be less than `amount`)
    pub spending_amount: Option<i64>,
    /// Current categories (JSON array of strings)
    pub categories: Json,
    /// Categories as first reported (JSON array of strings)
    pub original_categories: Json,
    /// Calendar date in the account's zone
    pub date: Date,
    /// Date the transaction was authorized; absent while pending
    pub authorized_date: Option<Date>,
    /// Display name
    pub name: String,
    /// Name as first reported
    pub original_name: String,
    /// Display merchant name
    pub merchant_name: Option<String>,
    /// Merchant name as first reported
    pub original_merchant_name: Option<String>,
    /// Whether the transaction has not posted yet
    pub is_pending: bool,
    /// Soft delete flag for externally sourced rows
    pub is_deleted: bool,
    /// When the row was created
    pub created_at: DateTimeUtc,
}

/// Defines relationships between Transaction and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Each transaction belongs to one bank account
    #[sea_orm(
        belongs_to = "super::bank_account::Entity",
        from = "Column::BankAccountId",
        to = "super::bank_account::Column::Id"
    )]
    BankAccount,
    /// A transaction may be spent from one bucket
    #[sea_orm(
        belongs_to = "super::spending::Entity",
        from = "Column::SpendingId",
        to = "super::spending::Column::Id"
    )]
    Spending,
}

impl Related<super::bank_account::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::BankAccount.def()
    }
}

impl Related<super::spending::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Spending.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
