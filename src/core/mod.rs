//! Core business logic - framework-agnostic budgeting operations.
//!
//! The scheduling and reconciliation algorithms (`contribution`, `allocation`,
//! `reconcile`) sit on top of thin repository modules that take a `SeaORM`
//! connection explicitly.

/// Accounts, links, and bank accounts
pub mod account;
/// Moving transaction amounts in and out of spending buckets
pub mod allocation;
/// Per-bucket due dates, contributions, and behind detection
pub mod contribution;
/// Funding schedules (paydays)
pub mod funding;
/// Merging an external transaction batch with stored rows
pub mod reconcile;
/// Recurrence rules over calendar days
pub mod recurrence;
/// Spending bucket persistence and the scheduled refresh
pub mod spending;
/// Account-local date helpers
pub mod time;
/// User-facing transaction operations
pub mod transaction;
