//! Putting leads on the enrichment queue.

use serde::Serialize;
use tracing::{debug, info, instrument};

use leadsmith_shared::{IceStatus, LeadsmithError, Result};
use leadsmith_storage::Storage;

/// Which leads to enqueue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnqueueTarget {
    Leads(Vec<String>),
    /// Every `pending` lead of the campaign.
    AllPending,
}

#[derive(Debug, Clone)]
pub struct EnqueueRequest {
    pub tenant_id: String,
    pub campaign_id: String,
    pub target: EnqueueTarget,
    /// Allow `done` leads to be enriched again.
    pub reenrich: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EnqueueReport {
    pub enqueued: usize,
    /// Leads left alone: unknown, another tenant's or campaign's, or in a
    /// status that cannot move to `queued`.
    pub skipped: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Append one queue message per target lead and move the lead to `queued`.
///
/// The campaign must belong to the tenant. A lead whose status update fails
/// after its message was written has that message removed again.
#[instrument(skip_all, fields(campaign_id = %request.campaign_id, reenrich = request.reenrich))]
pub async fn enqueue_enrichment(storage: &Storage, request: &EnqueueRequest) -> Result<EnqueueReport> {
    let campaign = storage
        .get_campaign(&request.campaign_id)
        .await?
        .filter(|c| c.customer_id == request.tenant_id)
        .ok_or_else(|| LeadsmithError::not_found("campaign", &request.campaign_id))?;

    let lead_ids = match &request.target {
        EnqueueTarget::Leads(ids) => ids.clone(),
        EnqueueTarget::AllPending => {
            storage
                .list_pending_lead_ids(&campaign.id, &request.tenant_id)
                .await?
        }
    };

    let mut report = EnqueueReport::default();
    if lead_ids.is_empty() {
        report.message = Some("No leads to enqueue".into());
        return Ok(report);
    }

    for lead_id in lead_ids {
        let lead = storage
            .get_lead(&lead_id)
            .await?
            .filter(|l| l.campaign_id == campaign.id && l.customer_id == request.tenant_id);
        let Some(lead) = lead else {
            debug!(%lead_id, "lead not in campaign, skipped");
            report.skipped.push(lead_id);
            continue;
        };
        if let Err(e) = lead.ice_status.transition(IceStatus::Queued, request.reenrich) {
            debug!(%lead_id, reason = %e, "lead not enqueueable, skipped");
            report.skipped.push(lead_id);
            continue;
        }

        // message first: if the insert fails the lead keeps its status and
        // can be enqueued again
        let msg_id = storage.enqueue_message(&lead_id, &campaign.id).await?;
        match storage
            .set_ice_status(&lead_id, IceStatus::Queued, request.reenrich)
            .await
        {
            Ok(_) => report.enqueued += 1,
            Err(e @ (LeadsmithError::InvalidTransition { .. } | LeadsmithError::NotFound { .. })) => {
                debug!(%lead_id, reason = %e, "lead changed while enqueueing, skipped");
                storage.ack_message(msg_id).await?;
                report.skipped.push(lead_id);
            }
            Err(e) => {
                storage.ack_message(msg_id).await?;
                return Err(e);
            }
        }
    }

    info!(enqueued = report.enqueued, skipped = report.skipped.len(), "leads enqueued");
    Ok(report)
}
