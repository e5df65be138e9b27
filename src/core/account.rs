//! Accounts, links, and bank accounts.
//!
//! These are the ownership records every bucket and transaction hangs off.
//! Lookups that take an `account_id` treat a record owned by another account
//! the same as a missing one.

use crate::{
    core::time::parse_timezone,
    entities::{Account, BankAccount, Link, LinkType, account, bank_account, link},
    errors::{Error, Result},
};
use chrono::{DateTime, Utc};
use sea_orm::{QueryOrder, Set, prelude::*};

/// Creates an account in the given IANA time zone.
///
/// # Errors
/// Returns [`Error::Validation`] if the zone name is unknown.
pub async fn create_account(
    db: &DatabaseConnection,
    timezone: &str,
    now: DateTime<Utc>,
) -> Result<account::Model> {
    let tz = parse_timezone(timezone).map_err(|e| Error::Validation {
        message: e.to_string(),
    })?;

    let account = account::ActiveModel {
        timezone: Set(tz.name().to_string()),
        created_at: Set(now),
        ..Default::default()
    };
    account.insert(db).await.map_err(Into::into)
}

/// Loads an account by id.
///
/// # Errors
/// Returns [`Error::NotFound`] if no such account exists.
pub async fn get_account<C>(conn: &C, account_id: i64) -> Result<account::Model>
where
    C: ConnectionTrait,
{
    Account::find_by_id(account_id)
        .one(conn)
        .await?
        .ok_or_else(|| Error::not_found("account", account_id))
}

/// Lists every account, oldest first.
pub async fn list_accounts(db: &DatabaseConnection) -> Result<Vec<account::Model>> {
    Account::find()
        .order_by_asc(account::Column::Id)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Creates a link under `account_id`.
///
/// Manual links never carry an access token; one passed in is dropped.
pub async fn create_link(
    db: &DatabaseConnection,
    account_id: i64,
    link_type: LinkType,
    institution_name: String,
    access_token: Option<String>,
    now: DateTime<Utc>,
) -> Result<link::Model> {
    if institution_name.trim().is_empty() {
        return Err(Error::Validation {
            message: "Institution name cannot be empty".to_string(),
        });
    }
    get_account(db, account_id).await?;

    let access_token = match link_type {
        LinkType::Manual => None,
        LinkType::External => access_token,
    };
    let link = link::ActiveModel {
        account_id: Set(account_id),
        link_type: Set(link_type),
        access_token: Set(access_token),
        institution_name: Set(institution_name.trim().to_string()),
        created_at: Set(now),
        ..Default::default()
    };
    link.insert(db).await.map_err(Into::into)
}

/// Loads a link owned by `account_id`.
///
/// # Errors
/// Returns [`Error::NotFound`] if the link does not exist under the account.
pub async fn get_link<C>(conn: &C, account_id: i64, link_id: i64) -> Result<link::Model>
where
    C: ConnectionTrait,
{
    Link::find_by_id(link_id)
        .filter(link::Column::AccountId.eq(account_id))
        .one(conn)
        .await?
        .ok_or_else(|| Error::not_found("link", link_id))
}

/// Lists the external links of an account.
pub async fn external_links_for_account(
    db: &DatabaseConnection,
    account_id: i64,
) -> Result<Vec<link::Model>> {
    Link::find()
        .filter(link::Column::AccountId.eq(account_id))
        .filter(link::Column::LinkType.eq(LinkType::External))
        .order_by_asc(link::Column::Id)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Creates a bank account under a link of the same account.
pub async fn create_bank_account(
    db: &DatabaseConnection,
    account_id: i64,
    link_id: i64,
    external_account_id: Option<String>,
    name: String,
) -> Result<bank_account::Model> {
    let link = get_link(db, account_id, link_id).await?;

    let bank_account = bank_account::ActiveModel {
        account_id: Set(account_id),
        link_id: Set(link.id),
        external_account_id: Set(external_account_id),
        name: Set(name),
        ..Default::default()
    };
    bank_account.insert(db).await.map_err(Into::into)
}

/// Lists the bank accounts discovered through a link.
pub async fn bank_accounts_for_link<C>(conn: &C, link_id: i64) -> Result<Vec<bank_account::Model>>
where
    C: ConnectionTrait,
{
    BankAccount::find()
        .filter(bank_account::Column::LinkId.eq(link_id))
        .order_by_asc(bank_account::Column::Id)
        .all(conn)
        .await
        .map_err(Into::into)
}

/// Loads a bank account of `account_id` together with its link.
///
/// # Errors
/// Returns [`Error::NotFound`] if either record is missing or belongs to
/// another account.
pub async fn link_for_bank_account<C>(
    conn: &C,
    account_id: i64,
    bank_account_id: i64,
) -> Result<(bank_account::Model, link::Model)>
where
    C: ConnectionTrait,
{
    let (bank_account, link) = BankAccount::find_by_id(bank_account_id)
        .filter(bank_account::Column::AccountId.eq(account_id))
        .find_also_related(Link)
        .one(conn)
        .await?
        .ok_or_else(|| Error::not_found("bank account", bank_account_id))?;

    let link = link.ok_or_else(|| Error::not_found("link", bank_account.link_id))?;
    Ok((bank_account, link))
}
