//! Shared test utilities for the budget engine.
//!
//! This module provides helpers for setting up test databases, building
//! entity values with sensible defaults, and a scripted in-memory bank feed.

use crate::{
    core::{
        account::{create_account, create_bank_account, create_link},
        funding::{NewFundingSchedule, create_funding_schedule},
        spending::{NewSpending, create_spending},
    },
    entities::{
        LinkType, account, bank_account, funding_schedule, link, spending, spending::SpendingType,
        transaction,
    },
    errors::{Error, Result},
    feed::{ExternalBankAccount, ExternalTransaction, FeedClient, FeedProvider},
};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use sea_orm::{ActiveModelTrait, DatabaseConnection, Set};
use std::sync::{Arc, Mutex};
use tracing_subscriber::EnvFilter;

/// Routes `tracing` output through the test harness. Safe to call repeatedly.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")))
        .with_test_writer()
        .try_init();
}

/// Creates an in-memory `SQLite` database with all tables initialized.
/// This is the standard setup for all integration tests.
pub async fn setup_test_db() -> Result<DatabaseConnection> {
    init_test_tracing();
    let db = sea_orm::Database::connect("sqlite::memory:").await?;
    crate::config::database::create_tables(&db).await?;
    Ok(db)
}

/// Shorthand for a calendar date.
pub fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap_or(NaiveDate::MIN)
}

/// Midday UTC on the given date, which is the same calendar day in the
/// American zones the tests use.
pub fn noon_utc(year: i32, month: u32, day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, 17, 0, 0)
        .single()
        .unwrap_or_default()
}

/// The fixed "now" most tests run at: 2022-04-05.
pub fn test_now() -> DateTime<Utc> {
    noon_utc(2022, 4, 5)
}

/// An unsaved bucket due 2022-05-01 with no recurrence rule.
pub fn spending_fixture(
    spending_type: SpendingType,
    target_amount: i64,
    current_amount: i64,
    used_amount: i64,
) -> spending::Model {
    spending::Model {
        id: 1,
        account_id: 1,
        bank_account_id: 1,
        funding_schedule_id: 1,
        spending_type,
        name: "Test Spending".to_string(),
        target_amount,
        current_amount,
        used_amount,
        recurrence_rule: None,
        last_recurrence: None,
        next_recurrence: date(2022, 5, 1),
        next_contribution_amount: 0,
        is_behind: false,
        created_at: test_now(),
    }
}

/// An unsaved manual transaction with no allocation.
pub fn transaction_fixture(amount: i64) -> transaction::Model {
    transaction::Model {
        id: 1,
        account_id: 1,
        bank_account_id: 1,
        external_id: None,
        pending_external_id: None,
        amount,
        spending_id: None,
        spending_amount: None,
        categories: serde_json::json!([]),
        original_categories: serde_json::json!([]),
        date: date(2022, 4, 5),
        authorized_date: None,
        name: "Test transaction".to_string(),
        original_name: "Test transaction".to_string(),
        merchant_name: None,
        original_merchant_name: None,
        is_pending: false,
        is_deleted: false,
        created_at: test_now(),
    }
}

/// An unsaved funding schedule.
pub fn funding_fixture(rule: &str, next_occurrence: NaiveDate) -> funding_schedule::Model {
    funding_schedule::Model {
        id: 1,
        account_id: 1,
        bank_account_id: 1,
        name: "Payday".to_string(),
        rule: rule.to_string(),
        next_occurrence,
        last_occurrence: None,
    }
}

/// A feed transaction on `ext-checking` named `COFFEE CO #123`.
pub fn external_transaction(transaction_id: &str, amount: f64, date: &str) -> ExternalTransaction {
    ExternalTransaction {
        transaction_id: transaction_id.to_string(),
        account_id: "ext-checking".to_string(),
        amount,
        date: date.to_string(),
        authorized_date: None,
        pending: false,
        pending_transaction_id: None,
        name: "COFFEE CO #123".to_string(),
        merchant_name: None,
        category: vec!["Food and Drink".to_string()],
    }
}

/// Creates an account in `America/Chicago`.
pub async fn create_test_account(db: &DatabaseConnection) -> Result<account::Model> {
    create_account(db, "America/Chicago", test_now()).await
}

/// Creates a link. External links get the token `access-token`.
pub async fn create_test_link(
    db: &DatabaseConnection,
    account_id: i64,
    link_type: LinkType,
) -> Result<link::Model> {
    create_link(
        db,
        account_id,
        link_type,
        "Test Bank".to_string(),
        Some("access-token".to_string()),
        test_now(),
    )
    .await
}

/// Creates a bank account named "Checking".
pub async fn create_test_bank_account(
    db: &DatabaseConnection,
    account_id: i64,
    link_id: i64,
    external_account_id: Option<&str>,
) -> Result<bank_account::Model> {
    create_bank_account(
        db,
        account_id,
        link_id,
        external_account_id.map(str::to_string),
        "Checking".to_string(),
    )
    .await
}

/// Creates a semi-monthly (15th and last day) funding schedule.
pub async fn create_test_funding_schedule(
    db: &DatabaseConnection,
    account_id: i64,
    bank_account_id: i64,
    next_occurrence: NaiveDate,
) -> Result<funding_schedule::Model> {
    create_funding_schedule(
        db,
        account_id,
        NewFundingSchedule {
            bank_account_id,
            name: "Payday".to_string(),
            rule: "FREQ=MONTHLY;BYMONTHDAY=15,-1".to_string(),
            next_occurrence,
        },
    )
    .await
}

/// Everything a bucket or transaction needs to exist.
pub struct BudgetFixture {
    /// Account in `America/Chicago`
    pub account: account::Model,
    /// Link of the requested type
    pub link: link::Model,
    /// Bank account under the link (`ext-checking` for external links)
    pub bank_account: bank_account::Model,
    /// Semi-monthly payday, next on 2022-04-15
    pub funding: funding_schedule::Model,
}

impl BudgetFixture {
    /// Creates the account, link, bank account, and funding schedule.
    pub async fn create(db: &DatabaseConnection, link_type: LinkType) -> Result<Self> {
        let account = create_test_account(db).await?;
        let link = create_test_link(db, account.id, link_type).await?;
        let external_account_id = match link_type {
            LinkType::Manual => None,
            LinkType::External => Some("ext-checking"),
        };
        let bank_account =
            create_test_bank_account(db, account.id, link.id, external_account_id).await?;
        let funding =
            create_test_funding_schedule(db, account.id, bank_account.id, date(2022, 4, 15))
                .await?;
        Ok(Self {
            account,
            link,
            bank_account,
            funding,
        })
    }
}

/// Creates a bucket due monthly on the 1st, next on 2022-05-01.
pub async fn create_test_spending(
    db: &DatabaseConnection,
    fixture: &BudgetFixture,
    spending_type: SpendingType,
    target_amount: i64,
    current_amount: i64,
) -> Result<spending::Model> {
    create_spending(
        db,
        fixture.account.id,
        NewSpending {
            bank_account_id: fixture.bank_account.id,
            funding_schedule_id: fixture.funding.id,
            spending_type,
            name: "Test Spending".to_string(),
            target_amount,
            current_amount,
            recurrence_rule: Some("FREQ=MONTHLY;BYMONTHDAY=1".to_string()),
            next_recurrence: date(2022, 5, 1),
        },
        test_now(),
    )
    .await
}

/// Stores a posted transaction as if it had come from the feed.
pub async fn insert_external_transaction(
    db: &DatabaseConnection,
    fixture: &BudgetFixture,
    external_id: &str,
    amount: i64,
) -> Result<transaction::Model> {
    let model = transaction::ActiveModel {
        account_id: Set(fixture.account.id),
        bank_account_id: Set(fixture.bank_account.id),
        external_id: Set(Some(external_id.to_string())),
        pending_external_id: Set(None),
        amount: Set(amount),
        spending_id: Set(None),
        spending_amount: Set(None),
        categories: Set(serde_json::json!(["Food and Drink"])),
        original_categories: Set(serde_json::json!(["Food and Drink"])),
        date: Set(date(2022, 4, 4)),
        authorized_date: Set(Some(date(2022, 4, 3))),
        name: Set("COFFEE CO #123".to_string()),
        original_name: Set("COFFEE CO #123".to_string()),
        merchant_name: Set(None),
        original_merchant_name: Set(None),
        is_pending: Set(false),
        is_deleted: Set(false),
        created_at: Set(test_now()),
        ..Default::default()
    };
    model.insert(db).await.map_err(Into::into)
}

#[derive(Default)]
struct FakeFeedState {
    accounts: Vec<ExternalBankAccount>,
    transactions: Vec<ExternalTransaction>,
    fail_transactions: bool,
    calls: Vec<String>,
}

/// Scripted feed shared between the test and the handler under test.
///
/// Clones share state, so a test can change what the feed returns between
/// job runs and inspect the calls it received.
#[derive(Clone, Default)]
pub struct FakeFeed {
    state: Arc<Mutex<FakeFeedState>>,
}

impl FakeFeed {
    /// A feed reporting the given provider account ids as open.
    pub fn with_accounts(account_ids: &[&str]) -> Self {
        let feed = Self::default();
        if let Ok(mut state) = feed.state.lock() {
            state.accounts = account_ids
                .iter()
                .map(|id| ExternalBankAccount {
                    account_id: (*id).to_string(),
                    name: format!("Account {id}"),
                    mask: Some("0000".to_string()),
                })
                .collect();
        }
        feed
    }

    /// Replaces the transactions the feed will return.
    pub fn set_transactions(&self, transactions: Vec<ExternalTransaction>) {
        if let Ok(mut state) = self.state.lock() {
            state.transactions = transactions;
        }
    }

    /// Makes every later `list_transactions` call fail.
    pub fn fail_transactions(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.fail_transactions = true;
        }
    }

    /// Calls received so far, in order.
    pub fn calls(&self) -> Vec<String> {
        self.state
            .lock()
            .map(|state| state.calls.clone())
            .unwrap_or_default()
    }

    fn record(&self, call: String) {
        if let Ok(mut state) = self.state.lock() {
            state.calls.push(call);
        }
    }
}

#[async_trait]
impl FeedClient for FakeFeed {
    async fn list_accounts(&self) -> Result<Vec<ExternalBankAccount>> {
        self.record("list_accounts".to_string());
        Ok(self
            .state
            .lock()
            .map(|state| state.accounts.clone())
            .unwrap_or_default())
    }

    async fn list_transactions(
        &self,
        _start: NaiveDate,
        _end: NaiveDate,
        account_ids: &[String],
    ) -> Result<Vec<ExternalTransaction>> {
        self.record(format!("list_transactions:{}", account_ids.join(",")));
        let state = self.state.lock().map_err(|e| Error::ExternalUnavailable {
            message: e.to_string(),
        })?;
        if state.fail_transactions {
            return Err(Error::ExternalUnavailable {
                message: "feed timed out".to_string(),
            });
        }
        Ok(state
            .transactions
            .iter()
            .filter(|item| account_ids.contains(&item.account_id))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl FeedProvider for FakeFeed {
    async fn client(&self, _link: &link::Model, _access_token: &str) -> Result<Box<dyn FeedClient>> {
        Ok(Box::new(self.clone()))
    }
}
