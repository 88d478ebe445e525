//! The request interface the sync engine consumes.

use async_trait::async_trait;

use lenda_common::{Record, Result};

/// Narrow interface over the remote marketplace API.
///
/// Implementations own transport, authentication, pagination and pacing;
/// the sync engine only sees parsed records or a failure.
#[async_trait]
pub trait RemoteSource {
    /// Current wallet snapshot of the authenticated user.
    async fn fetch_wallet(&self) -> Result<Record>;

    /// Pending reservations against the wallet.
    async fn fetch_blocked_amounts(&self) -> Result<Vec<Record>>;

    /// Wallet ledger entries, optionally only those at or after `since`
    /// (ISO-8601 timestamp).
    async fn fetch_transactions(&self, since: Option<&str>) -> Result<Vec<Record>>;

    /// Detail of one marketplace loan.
    async fn fetch_loan(&self, loan_id: i64) -> Result<Record>;

    /// All investments made into one loan.
    async fn fetch_loan_investments(&self, loan_id: i64) -> Result<Vec<Record>>;

    /// The authenticated user's own investments.
    async fn fetch_user_investments(&self) -> Result<Vec<Record>>;

    /// Notifications raised for the authenticated user.
    async fn fetch_notifications(&self) -> Result<Vec<Record>>;
}
