//! Background jobs.
//!
//! Jobs receive JSON payloads from an external queue. Delivery, scheduling,
//! and retries belong to the queue; a failed job reports through
//! [`Error::is_retryable`](crate::errors::Error::is_retryable) whether it is
//! worth running again.

/// Pulling and merging transactions from the bank feed
pub mod pull_transactions;
