//! Bank-data feed interface.
//!
//! The concrete provider client lives outside this crate. The sync job only
//! needs to list a link's accounts and pull a date range of transactions, so
//! that is all the traits here expose. Implementations report transport and
//! provider failures as [`Error::ExternalUnavailable`](crate::errors::Error::ExternalUnavailable).

use crate::{entities::link, errors::Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// An account as reported by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalBankAccount {
    /// Provider account id
    pub account_id: String,
    /// Display name
    pub name: String,
    /// Last digits of the account number
    pub mask: Option<String>,
}

/// A transaction as reported by the provider.
///
/// Amounts are in major units; dates are `YYYY-MM-DD` calendar days.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalTransaction {
    /// Provider transaction id
    pub transaction_id: String,
    /// Provider account id
    pub account_id: String,
    /// Amount in major units, positive for money leaving
    pub amount: f64,
    /// Posting (or expected posting) date
    pub date: String,
    /// Authorization date, once known
    pub authorized_date: Option<String>,
    /// Whether the transaction has not posted yet
    pub pending: bool,
    /// Id of the pending transaction this posted one replaces
    pub pending_transaction_id: Option<String>,
    /// Raw name
    pub name: String,
    /// Cleaned merchant name
    pub merchant_name: Option<String>,
    /// Provider categories
    #[serde(default)]
    pub category: Vec<String>,
}

/// A client bound to one link's credentials.
#[async_trait]
pub trait FeedClient: Send + Sync {
    /// Accounts the provider currently reports for the link. Closed accounts
    /// are omitted.
    async fn list_accounts(&self) -> Result<Vec<ExternalBankAccount>>;

    /// Transactions dated between `start` and `end` for the given provider
    /// account ids.
    async fn list_transactions(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        account_ids: &[String],
    ) -> Result<Vec<ExternalTransaction>>;
}

/// Builds clients for links.
#[async_trait]
pub trait FeedProvider: Send + Sync {
    /// Returns a client authorized with `access_token` for `link`.
    async fn client(&self, link: &link::Model, access_token: &str) -> Result<Box<dyn FeedClient>>;
}
