//! Full-synchronization pipeline.

use std::time::{Duration, Instant};

use tracing::{debug, info};

use lenda_client::RemoteSource;
use lenda_common::Result;
use lenda_store::Store;

use crate::relations::resolve_notification_relations;

/// Per-stage counters of one synchronization pass.
#[derive(Debug, Clone, Default)]
pub struct SyncReport {
    pub wallets: usize,
    pub blocked_amounts: usize,
    pub transactions: usize,
    pub loans_backfilled: usize,
    pub loan_investments: usize,
    pub user_investments: usize,
    pub notifications: usize,
    pub relations_resolved: usize,
    pub duration: Duration,
}

/// Orchestrates a full synchronization pass against a remote source.
///
/// The pipeline is strictly ordered and each stage is durable before the
/// next starts: later stages anti-join against ids written by earlier ones,
/// and a failed run resumes from the last completed watermark simply by
/// being invoked again.
pub struct SyncEngine<'a, S: RemoteSource> {
    store: &'a Store,
    source: S,
}

impl<'a, S: RemoteSource> SyncEngine<'a, S> {
    /// Create an engine over an opened store and an authenticated source.
    pub fn new(store: &'a Store, source: S) -> Self {
        Self { store, source }
    }

    /// Run the whole pipeline once.
    ///
    /// Any fetch or storage failure aborts the remaining stages; stages
    /// already committed stay persisted.
    pub async fn run_full_sync(&self) -> Result<SyncReport> {
        let start = Instant::now();
        let mut report = SyncReport::default();

        info!("starting full sync");

        // The wallet is a point-in-time singleton, not an append log.
        info!("downloading wallet");
        let wallet = self.source.fetch_wallet().await?;
        self.store.clear_table("a_wallet")?;
        self.store.upsert("a_wallet", std::slice::from_ref(&wallet))?;
        report.wallets = 1;

        info!("downloading blocked amounts");
        let blocked = self.source.fetch_blocked_amounts().await?;
        self.store.clear_table("a_blocked_amounts")?;
        self.store.upsert("a_blocked_amounts", &blocked)?;
        report.blocked_amounts = blocked.len();

        info!("updating transactions");
        let watermark = self.store.last_transaction_timestamp()?;
        debug!(?watermark, "transaction watermark");
        let transactions = self.source.fetch_transactions(watermark.as_deref()).await?;
        self.store.upsert("a_transactions", &transactions)?;
        report.transactions = transactions.len();

        // Backfill only loans the user has actually interacted with; the
        // marketplace as a whole is never mirrored.
        info!("downloading missing loans");
        let missing = self.store.missing_loan_ids()?;
        let mut loans = Vec::with_capacity(missing.len());
        for loan_id in &missing {
            loans.push(self.source.fetch_loan(*loan_id).await?);
        }
        self.store.upsert("a_loans", &loans)?;
        report.loans_backfilled = loans.len();

        info!("downloading loan investments");
        let mut loan_investments = Vec::new();
        for loan_id in &missing {
            loan_investments.extend(self.source.fetch_loan_investments(*loan_id).await?);
        }
        self.store.upsert("a_loan_investments", &loan_investments)?;
        report.loan_investments = loan_investments.len();

        // Upsert without clearing: stale investments age out of relevance
        // but are not pruned.
        info!("downloading user investments");
        let user_investments = self.source.fetch_user_investments().await?;
        self.store.upsert("a_user_investments", &user_investments)?;
        report.user_investments = user_investments.len();

        info!("downloading user notifications");
        let notifications = self.source.fetch_notifications().await?;
        self.store.upsert("a_notifications", &notifications)?;
        report.notifications = notifications.len();

        info!("calculating notification relations");
        report.relations_resolved = resolve_notification_relations(self.store)?;

        self.store.mark_sync_event()?;

        report.duration = start.elapsed();
        info!(
            transactions = report.transactions,
            loans = report.loans_backfilled,
            notifications = report.notifications,
            "full sync completed in {:?}",
            report.duration
        );

        Ok(report)
    }
}
