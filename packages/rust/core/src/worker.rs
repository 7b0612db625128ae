//! Enrichment worker loop.
//!
//! One invocation claims a bounded batch from the queue, enriches each lead
//! and acknowledges every message it claimed, whatever the lead's outcome.
//! Delivery is at-least-once: a message is only seen again when the worker
//! died before acking it, so every step re-checks lead state first.

use futures::future::join_all;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use leadsmith_shared::{IceStatus, Lead, LeadsmithError, QueueConfig, QueueMessage, Result};

use crate::enrichment::{EnrichmentContext, enrich_lead};

/// Claim and concurrency parameters for one batch.
#[derive(Debug, Clone)]
pub struct BatchOptions {
    pub batch_size: u32,
    pub visibility_timeout_secs: u32,
    /// Leads processed together; `1` is strictly sequential.
    pub parallelism: u32,
}

impl BatchOptions {
    pub fn from_config(config: &QueueConfig) -> Self {
        Self {
            batch_size: config.batch_size,
            visibility_timeout_secs: config.visibility_timeout_secs,
            parallelism: config.parallelism,
        }
    }
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self::from_config(&QueueConfig::default())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LeadOutcome {
    Done,
    Failed,
    Skipped,
}

/// Tally of one batch run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub claimed: usize,
    pub done: usize,
    pub failed: usize,
    pub skipped: usize,
    pub ack_failures: usize,
}

impl BatchReport {
    fn record(&mut self, outcome: LeadOutcome) {
        match outcome {
            LeadOutcome::Done => self.done += 1,
            LeadOutcome::Failed => self.failed += 1,
            LeadOutcome::Skipped => self.skipped += 1,
        }
    }
}

/// Progress callback for a batch run.
pub trait WorkerProgress: Send + Sync {
    /// Called once the batch is claimed.
    fn claimed(&self, count: usize);
    /// Called after each lead, once its message has been acked.
    fn lead_finished(&self, lead_id: &str, outcome: LeadOutcome);
}

/// No-op progress for headless usage.
pub struct SilentProgress;

impl WorkerProgress for SilentProgress {
    fn claimed(&self, _count: usize) {}
    fn lead_finished(&self, _lead_id: &str, _outcome: LeadOutcome) {}
}

/// Claim up to `batch_size` messages and process them.
///
/// A failed claim fails the run. Per-lead failures and ack failures are
/// logged and counted; they never stop the rest of the batch.
#[instrument(skip_all, fields(batch_size = options.batch_size, parallelism = options.parallelism))]
pub async fn run_enrichment_batch(
    ctx: &EnrichmentContext<'_>,
    options: &BatchOptions,
    progress: &dyn WorkerProgress,
) -> Result<BatchReport> {
    let messages = ctx
        .storage
        .claim_messages(options.batch_size, options.visibility_timeout_secs)
        .await?;
    progress.claimed(messages.len());

    let mut report = BatchReport {
        claimed: messages.len(),
        ..BatchReport::default()
    };
    if messages.is_empty() {
        debug!("queue empty");
        return Ok(report);
    }
    info!(claimed = messages.len(), "batch claimed");

    let group = options.parallelism.max(1) as usize;
    for chunk in messages.chunks(group) {
        let results = join_all(chunk.iter().map(|m| handle_message(ctx, m))).await;
        for (message, (outcome, acked)) in chunk.iter().zip(results) {
            report.record(outcome);
            if !acked {
                report.ack_failures += 1;
            }
            progress.lead_finished(&message.lead_id, outcome);
        }
    }

    info!(
        done = report.done,
        failed = report.failed,
        skipped = report.skipped,
        ack_failures = report.ack_failures,
        "batch finished"
    );
    Ok(report)
}

/// Process one message and ack it. Returns the outcome and whether the ack
/// went through.
#[instrument(skip_all, fields(msg_id = message.msg_id, lead_id = %message.lead_id))]
async fn handle_message(ctx: &EnrichmentContext<'_>, message: &QueueMessage) -> (LeadOutcome, bool) {
    let outcome = process_lead(ctx, &message.lead_id).await;

    let acked = match ctx.storage.ack_message(message.msg_id).await {
        Ok(true) => true,
        Ok(false) => {
            debug!("message was already acked");
            true
        }
        Err(e) => {
            warn!(error = %e, "ack failed, message will be redelivered after its timeout");
            false
        }
    };
    (outcome, acked)
}

async fn process_lead(ctx: &EnrichmentContext<'_>, lead_id: &str) -> LeadOutcome {
    let lead = match ctx.storage.get_lead(lead_id).await {
        Ok(Some(lead)) => lead,
        Ok(None) => {
            info!("lead no longer exists, skipping");
            return LeadOutcome::Skipped;
        }
        Err(e) => {
            warn!(error = %e, "lead lookup failed");
            return LeadOutcome::Failed;
        }
    };
    if lead.ice_status == IceStatus::Done {
        info!("lead already enriched, skipping");
        return LeadOutcome::Skipped;
    }

    match ctx
        .storage
        .set_ice_status(&lead.id, IceStatus::Processing, false)
        .await
    {
        Ok(_) => {}
        Err(e @ (LeadsmithError::InvalidTransition { .. } | LeadsmithError::NotFound { .. })) => {
            info!(reason = %e, "lead not claimable, skipping");
            return LeadOutcome::Skipped;
        }
        Err(e) => {
            warn!(error = %e, "could not mark lead processing");
            return LeadOutcome::Failed;
        }
    }

    let result = match ctx.storage.get_campaign(&lead.campaign_id).await {
        Ok(Some(campaign)) => {
            let mut rng = ctx.settings.rng();
            enrich_lead(ctx, &lead, &campaign, &mut rng).await
        }
        Ok(None) => Err(LeadsmithError::not_found("campaign", &lead.campaign_id)),
        Err(e) => Err(e),
    };

    match result {
        Ok(enrichment) => match ctx
            .storage
            .complete_icebreaker(&lead.id, &enrichment.ice_breaker)
            .await
        {
            Ok(()) => {
                info!("lead enriched");
                LeadOutcome::Done
            }
            Err(e) => {
                warn!(error = %e, "could not store icebreaker");
                record_failure(ctx, &lead, &e).await;
                LeadOutcome::Failed
            }
        },
        Err(e) => {
            warn!(error = %e.categorized(), "lead enrichment failed");
            record_failure(ctx, &lead, &e).await;
            LeadOutcome::Failed
        }
    }
}

/// Write the error ledger row and move the lead to `error`.
async fn record_failure(ctx: &EnrichmentContext<'_>, lead: &Lead, error: &LeadsmithError) {
    if let Err(ledger) = ctx
        .storage
        .record_enrichment_error(&lead.id, &lead.campaign_id, &error.categorized())
        .await
    {
        warn!(error = %ledger, "could not record enrichment error");
    }
}
