//! Bulk pipeline-stage jobs: preview, then commit.
//!
//! [`plan_stage`] only reads. [`commit_stage`] recomputes the same plan and
//! inserts the job with the plan's config, so the numbers a caller was shown
//! are the numbers the job runs with.

use serde::Serialize;
use serde_json::{Value, json};
use tracing::{info, instrument};

use leadsmith_shared::{BulkJob, BulkJobType, LeadsmithError, Result};
use leadsmith_storage::Storage;

pub const SCRAPE_MAX_LEADS: u32 = 1000;
pub const SCRAPE_CONCURRENCY: u32 = 20;
pub const SCRAPE_LOCATIONS_FILE: &str = "data/us_locations.csv";
pub const CLEAN_MAX_LEADS: u32 = 1000;
pub const CLEAN_WORKERS: u32 = 10;
/// Default for the two paid lookups.
pub const LOOKUP_MAX_LEADS: u32 = 100;

/// One stage invocation with its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageRequest {
    ScrapeMaps {
        keywords: Vec<String>,
        max_leads: u32,
    },
    CleanLeads {
        categories: Vec<String>,
        max_leads: u32,
    },
    FindEmails {
        max_leads: u32,
        include_existing: bool,
    },
    FindDecisionMakers {
        max_leads: u32,
        include_existing: bool,
    },
}

impl StageRequest {
    pub fn job_type(&self) -> BulkJobType {
        match self {
            Self::ScrapeMaps { .. } => BulkJobType::ScrapeMaps,
            Self::CleanLeads { .. } => BulkJobType::CleanLeads,
            Self::FindEmails { .. } => BulkJobType::FindEmails,
            Self::FindDecisionMakers { .. } => BulkJobType::FindDecisionMakers,
        }
    }
}

/// What a stage would do, computed without side effects.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StagePlan {
    pub job_type: BulkJobType,
    pub campaign_id: String,
    pub campaign_name: String,
    pub total_leads: i64,
    /// Leads (or, for scrape, target new leads) the job would handle.
    pub will_process: i64,
    /// Stage-specific counts for display.
    pub details: Value,
    /// Config the committed job is created with.
    pub config: Value,
}

#[derive(Debug, Clone)]
pub struct StageCommit {
    pub job: BulkJob,
    pub plan: StagePlan,
}

/// Compute the preview for `request` on `campaign_id`.
#[instrument(skip(storage, request), fields(stage = %request.job_type()))]
pub async fn plan_stage(
    storage: &Storage,
    campaign_id: &str,
    request: &StageRequest,
) -> Result<StagePlan> {
    let campaign = storage
        .get_campaign(campaign_id)
        .await?
        .ok_or_else(|| LeadsmithError::not_found("campaign", campaign_id))?;
    let stats = storage.lead_stats(campaign_id).await?;

    let (will_process, details, config) = match request {
        StageRequest::ScrapeMaps {
            keywords,
            max_leads,
        } => {
            let keywords: Vec<&str> = keywords
                .iter()
                .map(|k| k.trim())
                .filter(|k| !k.is_empty())
                .collect();
            if keywords.is_empty() {
                return Err(LeadsmithError::validation("scrape needs at least one keyword"));
            }
            (
                i64::from(*max_leads),
                json!({
                    "keywords": keywords,
                    "locations_file": SCRAPE_LOCATIONS_FILE,
                }),
                json!({
                    "keywords": keywords,
                    "locations_file": SCRAPE_LOCATIONS_FILE,
                    "max_leads": max_leads,
                    "concurrent": SCRAPE_CONCURRENCY,
                    "test_only": false,
                }),
            )
        }
        StageRequest::CleanLeads {
            categories,
            max_leads,
        } => {
            let will_process = stats.with_website.min(i64::from(*max_leads));
            (
                will_process,
                json!({
                    "leads_with_website": stats.with_website,
                    "already_validated": stats.validated,
                    "categories": categories,
                }),
                json!({
                    "categories": categories,
                    "max_leads": max_leads,
                    "workers": CLEAN_WORKERS,
                    "total_with_website": stats.with_website,
                }),
            )
        }
        StageRequest::FindEmails {
            max_leads,
            include_existing,
        } => {
            let pool = if *include_existing {
                stats.total
            } else {
                stats.without_email()
            };
            let eligible = pool.min(i64::from(*max_leads));
            (
                eligible,
                json!({
                    "with_email": stats.with_email,
                    "without_email": stats.without_email(),
                    "include_existing": include_existing,
                    "estimated_api_credits": eligible,
                }),
                lookup_config(*max_leads, *include_existing, eligible),
            )
        }
        StageRequest::FindDecisionMakers {
            max_leads,
            include_existing,
        } => {
            let pool = if *include_existing {
                stats.total
            } else {
                stats.without_decision_maker()
            };
            let eligible = pool.min(i64::from(*max_leads));
            (
                eligible,
                json!({
                    "with_decision_maker": stats.with_decision_maker,
                    "without_decision_maker": stats.without_decision_maker(),
                    "include_existing": include_existing,
                }),
                lookup_config(*max_leads, *include_existing, eligible),
            )
        }
    };

    Ok(StagePlan {
        job_type: request.job_type(),
        campaign_id: campaign.id,
        campaign_name: campaign.name,
        total_leads: stats.total,
        will_process,
        details,
        config,
    })
}

/// Recompute the plan and insert the bulk job it describes.
#[instrument(skip(storage, request), fields(stage = %request.job_type()))]
pub async fn commit_stage(
    storage: &Storage,
    campaign_id: &str,
    request: &StageRequest,
) -> Result<StageCommit> {
    let plan = plan_stage(storage, campaign_id, request).await?;
    let job = storage
        .insert_bulk_job(&plan.campaign_id, plan.job_type, &plan.config)
        .await?;
    info!(job_id = %job.id, will_process = plan.will_process, "stage committed");
    Ok(StageCommit { job, plan })
}

fn lookup_config(max_leads: u32, include_existing: bool, eligible: i64) -> Value {
    json!({
        "max_leads": max_leads,
        "include_existing": include_existing,
        "estimated_leads": eligible,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{add_lead, seeded};
    use leadsmith_shared::EnrichmentFlags;

    async fn seeded_with_leads() -> (Storage, String) {
        let (storage, campaign) = seeded().await;
        for i in 0..5 {
            add_lead(&storage, &campaign, |l| {
                if i < 3 {
                    l.company_website = Some(format!("site{i}.test"));
                }
                if i == 0 {
                    l.email = Some("owner@site0.test".into());
                    l.decision_maker_name = Some("Pat".into());
                    l.enrichment_status = EnrichmentFlags {
                        website_validated: true,
                    };
                }
            })
            .await;
        }
        (storage, campaign.id)
    }

    #[tokio::test]
    async fn find_emails_preview_matches_commit() {
        let (storage, campaign_id) = seeded_with_leads().await;
        let request = StageRequest::FindEmails {
            max_leads: 3,
            include_existing: false,
        };

        let plan = plan_stage(&storage, &campaign_id, &request).await.unwrap();
        assert_eq!(plan.total_leads, 5);
        assert_eq!(plan.will_process, 3);
        assert_eq!(plan.details["without_email"], 4);
        assert_eq!(storage.count_bulk_jobs(&campaign_id).await.unwrap(), 0);

        let commit = commit_stage(&storage, &campaign_id, &request).await.unwrap();
        assert_eq!(commit.plan, plan);
        assert_eq!(commit.job.job_type, BulkJobType::FindEmails);
        assert_eq!(commit.job.status, "pending");
        assert_eq!(commit.job.config["estimated_leads"], 3);
        assert_eq!(storage.count_bulk_jobs(&campaign_id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn include_existing_counts_every_lead() {
        let (storage, campaign_id) = seeded_with_leads().await;
        let plan = plan_stage(
            &storage,
            &campaign_id,
            &StageRequest::FindDecisionMakers {
                max_leads: LOOKUP_MAX_LEADS,
                include_existing: true,
            },
        )
        .await
        .unwrap();
        assert_eq!(plan.will_process, 5);

        let plan = plan_stage(
            &storage,
            &campaign_id,
            &StageRequest::FindDecisionMakers {
                max_leads: LOOKUP_MAX_LEADS,
                include_existing: false,
            },
        )
        .await
        .unwrap();
        assert_eq!(plan.will_process, 4);
    }

    #[tokio::test]
    async fn clean_preview_counts_websites() {
        let (storage, campaign_id) = seeded_with_leads().await;
        let plan = plan_stage(
            &storage,
            &campaign_id,
            &StageRequest::CleanLeads {
                categories: vec!["Roofer".into()],
                max_leads: CLEAN_MAX_LEADS,
            },
        )
        .await
        .unwrap();
        assert_eq!(plan.will_process, 3);
        assert_eq!(plan.details["already_validated"], 1);
        assert_eq!(plan.config["workers"], CLEAN_WORKERS);
        assert_eq!(plan.config["total_with_website"], 3);
    }

    #[tokio::test]
    async fn scrape_needs_keywords_and_campaign() {
        let (storage, campaign_id) = seeded_with_leads().await;
        let empty = StageRequest::ScrapeMaps {
            keywords: vec!["  ".into()],
            max_leads: SCRAPE_MAX_LEADS,
        };
        let err = plan_stage(&storage, &campaign_id, &empty).await.unwrap_err();
        assert!(matches!(err, LeadsmithError::Validation { .. }));

        let request = StageRequest::ScrapeMaps {
            keywords: vec!["roofers austin".into()],
            max_leads: 250,
        };
        let err = plan_stage(&storage, "missing", &request).await.unwrap_err();
        assert!(matches!(err, LeadsmithError::NotFound { .. }));

        let commit = commit_stage(&storage, &campaign_id, &request).await.unwrap();
        assert_eq!(commit.job.config["max_leads"], 250);
        assert_eq!(commit.job.config["concurrent"], SCRAPE_CONCURRENCY);
        assert_eq!(commit.job.config["locations_file"], SCRAPE_LOCATIONS_FILE);
    }
}
