//! Entity module - Contains all SeaORM entity definitions for the database.
//! These entities represent the database tables and their relationships.
//! Each entity has a Model struct for data and an Entity struct for operations.

pub mod account;
pub mod bank_account;
pub mod funding_schedule;
pub mod link;
pub mod spending;
pub mod transaction;

// Re-export specific types to avoid conflicts
pub use account::{Column as AccountColumn, Entity as Account, Model as AccountModel};
pub use bank_account::{
    Column as BankAccountColumn, Entity as BankAccount, Model as BankAccountModel,
};
pub use funding_schedule::{
    Column as FundingScheduleColumn, Entity as FundingSchedule, Model as FundingScheduleModel,
};
pub use link::{Column as LinkColumn, Entity as Link, LinkType, Model as LinkModel};
pub use spending::{
    Column as SpendingColumn, Entity as Spending, Model as SpendingModel, SpendingType,
};
pub use transaction::{
    Column as TransactionColumn, Entity as Transaction, Model as TransactionModel,
};
