//! Core domain types: campaigns, leads, queue messages, and job records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{LeadsmithError, Result};

// ---------------------------------------------------------------------------
// IceStatus
// ---------------------------------------------------------------------------

/// Lifecycle of a lead's icebreaker enrichment.
///
/// Normal flow is `pending -> queued -> processing -> done | error`.
/// `error -> queued` re-enqueues a failed lead. A `done` lead only goes back
/// to `queued` through an explicit re-enrich request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IceStatus {
    Pending,
    Queued,
    Processing,
    Done,
    Error,
}

impl IceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Queued => "queued",
            Self::Processing => "processing",
            Self::Done => "done",
            Self::Error => "error",
        }
    }

    /// Whether `self -> next` is part of the regular lifecycle.
    ///
    /// `processing -> processing` is allowed: a message redelivered after a
    /// worker crash finds its lead still marked as processing.
    pub fn can_transition_to(self, next: IceStatus) -> bool {
        use IceStatus::*;
        matches!(
            (self, next),
            (Pending, Queued)
                | (Queued, Processing)
                | (Processing, Processing)
                | (Processing, Done)
                | (Processing, Error)
                | (Error, Queued)
        )
    }

    /// Validate a transition, optionally allowing the explicit re-enrich path.
    pub fn transition(self, next: IceStatus, reenrich: bool) -> Result<IceStatus> {
        if self.can_transition_to(next) || (reenrich && self == Self::Done && next == Self::Queued)
        {
            Ok(next)
        } else {
            Err(LeadsmithError::InvalidTransition {
                from: self.as_str().into(),
                to: next.as_str().into(),
            })
        }
    }
}

impl std::fmt::Display for IceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for IceStatus {
    type Err = LeadsmithError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(Self::Pending),
            "queued" => Ok(Self::Queued),
            "processing" => Ok(Self::Processing),
            "done" => Ok(Self::Done),
            "error" => Ok(Self::Error),
            other => Err(LeadsmithError::parse(format!("unknown ice_status '{other}'"))),
        }
    }
}

// ---------------------------------------------------------------------------
// VerificationStatus
// ---------------------------------------------------------------------------

/// Outcome of bulk email verification for a lead's email address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    Unverified,
    VerifiedOk,
    VerifiedBad,
    VerifiedUnknown,
}

impl VerificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unverified => "unverified",
            Self::VerifiedOk => "verified_ok",
            Self::VerifiedBad => "verified_bad",
            Self::VerifiedUnknown => "verified_unknown",
        }
    }

    /// Terminal statuses are the three `verified_*` outcomes.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Unverified)
    }

    /// Classify one row of the provider's quality × result matrix.
    ///
    /// Inputs are compared case-insensitively.
    pub fn classify(quality: &str, result: &str) -> Self {
        let quality = quality.trim().to_ascii_lowercase();
        let result = result.trim().to_ascii_lowercase();
        match (quality.as_str(), result.as_str()) {
            ("good", "ok") => Self::VerifiedOk,
            ("risky", "catch_all") | ("bad", "invalid") => Self::VerifiedBad,
            _ => Self::VerifiedUnknown,
        }
    }
}

impl std::fmt::Display for VerificationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for VerificationStatus {
    type Err = LeadsmithError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "unverified" => Ok(Self::Unverified),
            "verified_ok" => Ok(Self::VerifiedOk),
            "verified_bad" => Ok(Self::VerifiedBad),
            "verified_unknown" => Ok(Self::VerifiedUnknown),
            other => Err(LeadsmithError::parse(format!(
                "unknown verification_status '{other}'"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Campaign / Lead
// ---------------------------------------------------------------------------

/// A named enrichment run configuration. Owns its leads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Campaign {
    pub id: String,
    /// Tenant that owns the campaign.
    pub customer_id: String,
    pub name: String,
    pub service_line: String,
    /// Page summary prompt; may contain `{url}` and `{markdown}` placeholders.
    pub summarize_prompt: String,
    /// Icebreaker prompt; may contain a `{serviceLine}` placeholder.
    pub icebreaker_prompt: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

/// Free-form enrichment flags stored alongside a lead.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrichmentFlags {
    #[serde(default)]
    pub website_validated: bool,
}

/// One scraped business record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lead {
    pub id: String,
    pub campaign_id: String,
    pub customer_id: String,

    pub company_name: Option<String>,
    pub company_website: Option<String>,
    pub company_name_casual: Option<String>,

    pub email: Option<String>,
    pub personal_email: Option<String>,
    pub phone: Option<String>,

    pub full_name: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub title: Option<String>,
    pub industry: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub country: Option<String>,
    /// Raw third-party payload (JSON text) the lead was imported from.
    pub raw: Option<String>,

    pub decision_maker_name: Option<String>,
    pub decision_maker_title: Option<String>,
    pub decision_maker_email: Option<String>,
    pub decision_maker_linkedin: Option<String>,

    pub ice_breaker: Option<String>,
    pub ice_status: IceStatus,
    pub enriched_at: Option<DateTime<Utc>>,

    pub verification_status: VerificationStatus,
    pub verification_checked_at: Option<DateTime<Utc>>,

    pub enrichment_status: EnrichmentFlags,
    pub created_at: DateTime<Utc>,
}

impl Lead {
    /// Minimal lead with every optional field empty. Used by importers and tests.
    pub fn new(campaign_id: &str, customer_id: &str) -> Self {
        Self {
            id: uuid::Uuid::now_v7().to_string(),
            campaign_id: campaign_id.into(),
            customer_id: customer_id.into(),
            company_name: None,
            company_website: None,
            company_name_casual: None,
            email: None,
            personal_email: None,
            phone: None,
            full_name: None,
            first_name: None,
            last_name: None,
            title: None,
            industry: None,
            city: None,
            state: None,
            country: None,
            raw: None,
            decision_maker_name: None,
            decision_maker_title: None,
            decision_maker_email: None,
            decision_maker_linkedin: None,
            ice_breaker: None,
            ice_status: IceStatus::Pending,
            enriched_at: None,
            verification_status: VerificationStatus::Unverified,
            verification_checked_at: None,
            enrichment_status: EnrichmentFlags::default(),
            created_at: Utc::now(),
        }
    }

    /// Display name: `full_name`, else first + last.
    pub fn display_name(&self) -> Option<String> {
        if let Some(full) = self.full_name.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            return Some(full.to_string());
        }
        let joined = [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        (!joined.is_empty()).then_some(joined)
    }
}

/// Strip scheme and surrounding slashes/whitespace from a stored website.
///
/// `"https://Acme.test/"` becomes `"Acme.test"`. Returns `None` when nothing
/// is left.
pub fn normalize_website(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    let lower = trimmed.to_ascii_lowercase();
    let without_scheme = if lower.starts_with("https://") {
        &trimmed[8..]
    } else if lower.starts_with("http://") {
        &trimmed[7..]
    } else {
        trimmed
    };
    let base = without_scheme.trim_end_matches('/').trim();
    (!base.is_empty()).then(|| base.to_string())
}

// ---------------------------------------------------------------------------
// Queue / jobs
// ---------------------------------------------------------------------------

/// A claimed queue message. Hidden from other claimants until acked or
/// until its visibility timeout lapses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueMessage {
    pub msg_id: i64,
    pub lead_id: String,
}

/// Most recent enrichment failure for a lead.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichmentJob {
    pub lead_id: String,
    pub campaign_id: String,
    pub status: String,
    pub error: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// One submitted bulk email-verification batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailVerificationFile {
    pub id: String,
    pub campaign_id: String,
    /// Provider-side file identifier.
    pub file_id: String,
    /// Emails as originally submitted.
    pub emails: Vec<String>,
    pub lines: Option<i64>,
    pub lines_processed: Option<i64>,
    /// Set once results have been reconciled onto leads.
    pub processed: bool,
    pub status: Option<String>,
    pub checked_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Coarse-grained pipeline stage consumed by an out-of-process worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BulkJobType {
    ScrapeMaps,
    CleanLeads,
    FindEmails,
    FindDecisionMakers,
}

impl BulkJobType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ScrapeMaps => "scrape_maps",
            Self::CleanLeads => "clean_leads",
            Self::FindEmails => "find_emails",
            Self::FindDecisionMakers => "find_decision_makers",
        }
    }
}

impl std::fmt::Display for BulkJobType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for BulkJobType {
    type Err = LeadsmithError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "scrape_maps" => Ok(Self::ScrapeMaps),
            "clean_leads" => Ok(Self::CleanLeads),
            "find_emails" => Ok(Self::FindEmails),
            "find_decision_makers" => Ok(Self::FindDecisionMakers),
            other => Err(LeadsmithError::parse(format!("unknown bulk job type '{other}'"))),
        }
    }
}

/// A queued pipeline-stage task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkJob {
    pub id: String,
    pub campaign_id: String,
    #[serde(rename = "type")]
    pub job_type: BulkJobType,
    pub config: serde_json::Value,
    pub status: String,
    pub progress: i64,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}
