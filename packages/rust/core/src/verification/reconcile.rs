//! Applying a finished results matrix onto a campaign's leads.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, instrument};

use leadsmith_shared::{EmailVerificationFile, Result, VerificationStatus};
use leadsmith_storage::Storage;

use super::{ResultRow, VerificationContext};

/// Emails grouped by terminal status. Every email is in exactly one group.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Classified {
    pub ok: BTreeSet<String>,
    pub bad: BTreeSet<String>,
    pub unknown: BTreeSet<String>,
}

impl Classified {
    pub fn groups(&self) -> [(VerificationStatus, &BTreeSet<String>); 3] {
        [
            (VerificationStatus::VerifiedOk, &self.ok),
            (VerificationStatus::VerifiedBad, &self.bad),
            (VerificationStatus::VerifiedUnknown, &self.unknown),
        ]
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub ok: usize,
    pub bad: usize,
    pub unknown: usize,
    pub leads_updated: u64,
}

/// Classify result rows, then add every submitted email the provider did
/// not report as unknown.
///
/// Emails compare lower-cased and trimmed. When one email appears in
/// several rows the last row decides.
pub fn classify_rows(rows: &[ResultRow], submitted: &[String]) -> Classified {
    let mut by_email: BTreeMap<String, VerificationStatus> = BTreeMap::new();
    for row in rows {
        let email = row.email.trim().to_lowercase();
        if email.is_empty() {
            continue;
        }
        by_email.insert(email, VerificationStatus::classify(&row.quality, &row.result));
    }
    for email in submitted {
        let email = email.trim().to_lowercase();
        if !email.is_empty() {
            by_email
                .entry(email)
                .or_insert(VerificationStatus::VerifiedUnknown);
        }
    }

    let mut classified = Classified::default();
    for (email, status) in by_email {
        match status {
            VerificationStatus::VerifiedOk => classified.ok.insert(email),
            VerificationStatus::VerifiedBad => classified.bad.insert(email),
            _ => classified.unknown.insert(email),
        };
    }
    classified
}

/// Download `file`'s results, update matching leads and mark it processed.
///
/// Any error leaves the file unprocessed. Re-running converges on the same
/// lead state.
#[instrument(skip_all, fields(file_id = %file.file_id, campaign_id = %file.campaign_id))]
pub async fn reconcile_file(
    ctx: &VerificationContext<'_>,
    file: &EmailVerificationFile,
) -> Result<ReconcileReport> {
    let rows = ctx.api.download_results(&file.file_id).await?;
    let classified = classify_rows(&rows, &file.emails);
    debug!(rows = rows.len(), "results downloaded");

    let index = email_index(ctx.storage, &file.campaign_id, ctx.settings.lead_page_size).await?;
    let checked_at = Utc::now();
    let chunk_size = ctx.settings.update_chunk_size.max(1);

    let mut leads_updated = 0;
    for (status, emails) in classified.groups() {
        let ids: Vec<String> = emails
            .iter()
            .filter_map(|email| index.get(email))
            .flatten()
            .cloned()
            .collect();
        for chunk in ids.chunks(chunk_size) {
            leads_updated += ctx
                .storage
                .set_verification_status(chunk, status, checked_at)
                .await?;
        }
    }

    ctx.storage.mark_file_processed(&file.id).await?;

    let report = ReconcileReport {
        ok: classified.ok.len(),
        bad: classified.bad.len(),
        unknown: classified.unknown.len(),
        leads_updated,
    };
    info!(
        ok = report.ok,
        bad = report.bad,
        unknown = report.unknown,
        leads_updated,
        "verification file reconciled"
    );
    Ok(report)
}

/// Lower-cased email → lead ids, over every lead of the campaign.
/// Read page by page since one email may belong to many leads.
async fn email_index(
    storage: &Storage,
    campaign_id: &str,
    page_size: u32,
) -> Result<HashMap<String, Vec<String>>> {
    let page_size = page_size.max(1);
    let mut index: HashMap<String, Vec<String>> = HashMap::new();
    let mut offset = 0u64;
    loop {
        let page = storage
            .page_lead_emails(campaign_id, page_size, offset)
            .await?;
        let len = page.len();
        for (id, email) in page {
            let email = email.trim().to_lowercase();
            if !email.is_empty() {
                index.entry(email).or_default().push(id);
            }
        }
        if len < page_size as usize {
            break;
        }
        offset += len as u64;
    }
    Ok(index)
}
