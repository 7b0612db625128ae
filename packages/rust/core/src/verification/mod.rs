//! Bulk email-verification poller and reconciler.
//!
//! Each run walks the unprocessed verification files, oldest first, asks
//! the provider how far each one got, and reconciles finished files onto
//! the campaign's leads. A file is marked processed only after its results
//! were applied; any failure leaves it for the next run.

mod client;
mod reconcile;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use leadsmith_shared::{EmailVerificationFile, Result, VerifierConfig};
use leadsmith_storage::Storage;

pub use client::{MillionVerifierClient, parse_results_csv};
pub use reconcile::{Classified, ReconcileReport, classify_rows, reconcile_file};

/// Provider statuses that mean the job is over.
const FINISHED_STATUSES: &[&str] = &["finished", "completed", "complete", "done"];

/// Provider-side progress of one submitted file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileInfo {
    pub status: Option<String>,
    pub lines: Option<i64>,
    pub lines_processed: Option<i64>,
}

impl FileInfo {
    /// Finished by status, or by counters when the status is unexpected.
    ///
    /// `known_lines` stands in when the provider omits the total.
    pub fn is_complete(&self, known_lines: Option<i64>) -> bool {
        let by_status = self
            .status
            .as_deref()
            .map(|s| FINISHED_STATUSES.contains(&s.trim().to_ascii_lowercase().as_str()))
            .unwrap_or(false);
        let by_counters = match (self.lines.or(known_lines), self.lines_processed) {
            (Some(lines), Some(processed)) => lines > 0 && processed >= lines,
            _ => false,
        };
        by_status || by_counters
    }
}

/// One row of the provider's results matrix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultRow {
    /// Lower-cased, trimmed.
    pub email: String,
    pub quality: String,
    pub result: String,
}

/// The external bulk-verification provider.
#[async_trait]
pub trait VerificationApi: Send + Sync {
    async fn file_info(&self, file_id: &str) -> Result<FileInfo>;
    async fn download_results(&self, file_id: &str) -> Result<Vec<ResultRow>>;
}

pub struct VerificationContext<'a> {
    pub storage: &'a Storage,
    pub api: &'a dyn VerificationApi,
    pub settings: VerifierConfig,
}

/// Tally of one poll run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VerificationReport {
    pub checked: usize,
    pub reconciled: usize,
    pub still_running: usize,
    /// Status lookup failed; only `checked_at` was refreshed.
    pub lookup_failures: usize,
    /// Finished but reconciliation failed; retried next run.
    pub reconcile_failures: usize,
    pub leads_updated: u64,
}

/// Poll up to `batch_size` unprocessed files.
///
/// Listing the files is the only failure that fails the run; every file is
/// handled in isolation.
#[instrument(skip_all, fields(batch_size = ctx.settings.batch_size))]
pub async fn run_verification_batch(ctx: &VerificationContext<'_>) -> Result<VerificationReport> {
    let files = ctx
        .storage
        .list_unprocessed_files(ctx.settings.batch_size)
        .await?;
    let mut report = VerificationReport::default();
    if files.is_empty() {
        debug!("no unprocessed verification files");
        return Ok(report);
    }

    for file in &files {
        report.checked += 1;
        poll_file(ctx, file, &mut report).await;
    }

    info!(
        checked = report.checked,
        reconciled = report.reconciled,
        still_running = report.still_running,
        leads_updated = report.leads_updated,
        "verification poll finished"
    );
    Ok(report)
}

#[instrument(skip_all, fields(file_id = %file.file_id))]
async fn poll_file(
    ctx: &VerificationContext<'_>,
    file: &EmailVerificationFile,
    report: &mut VerificationReport,
) {
    let info = match ctx.api.file_info(&file.file_id).await {
        Ok(info) => info,
        Err(e) => {
            warn!(error = %e, "status lookup failed");
            report.lookup_failures += 1;
            if let Err(e) = ctx.storage.touch_file_checked(&file.id).await {
                warn!(error = %e, "could not refresh checked_at");
            }
            return;
        }
    };

    if let Err(e) = ctx
        .storage
        .record_file_check(&file.id, info.status.as_deref(), info.lines, info.lines_processed)
        .await
    {
        warn!(error = %e, "could not store file progress");
    }

    if !info.is_complete(file.lines) {
        debug!(status = ?info.status, processed = ?info.lines_processed, "file still running");
        report.still_running += 1;
        return;
    }

    match reconcile_file(ctx, file).await {
        Ok(outcome) => {
            report.reconciled += 1;
            report.leads_updated += outcome.leads_updated;
        }
        Err(e) => {
            warn!(error = %e, "reconciliation failed, file left for the next run");
            report.reconcile_failures += 1;
        }
    }
}
