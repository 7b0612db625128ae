//! Casual company names: "Acme Roofing Solutions, LLC" → "Acme Roofing".

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use tracing::{info, instrument};

use leadsmith_shared::Result;
use leadsmith_storage::Storage;

/// Leads casualized per call.
pub const CASUALIZE_LIMIT: u32 = 500;

const LEGAL_SUFFIXES: &[&str] = &[
    "inc", "incorporated", "llc", "l.l.c", "ltd", "limited", "corp", "corporation", "co",
    "company", "pllc", "plc", "lp", "llp", "p.c", "p.a", "gmbh", "ag", "sa", "srl", "bv", "nv",
];

const DESCRIPTORS: &[&str] = &[
    "agency",
    "professional services",
    "services",
    "solutions",
    "technologies",
    "technology",
    "consulting",
    "consultants",
    "group",
    "partners",
    "associates",
    "enterprises",
    "international",
    "global",
    "digital",
    "marketing",
    "management",
    "advisors",
    "advisory",
    "studio",
    "labs",
    "lab",
    "systems",
    "network",
    "networks",
];

static SUFFIX_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    LEGAL_SUFFIXES
        .iter()
        .map(|s| Regex::new(&format!(r"(?i)[,\s]+{}[.\s]*$", regex::escape(s))).expect("suffix regex"))
        .collect()
});

static DESCRIPTOR_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    DESCRIPTORS
        .iter()
        .map(|d| Regex::new(&format!(r"(?i)\s+{}\s*$", regex::escape(d))).expect("descriptor regex"))
        .collect()
});

/// Strip legal suffixes, then generic descriptors, each list applied once
/// in order. Falls back to the trimmed input when under two characters
/// would remain.
pub fn casualize(name: &str) -> String {
    let original = name.trim();
    let mut result = original.to_string();
    for pattern in SUFFIX_PATTERNS.iter().chain(DESCRIPTOR_PATTERNS.iter()) {
        result = pattern.replace(&result, "").trim().to_string();
    }
    if result.chars().count() < 2 {
        return original.to_string();
    }
    result
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CasualizeReport {
    pub processed: usize,
    /// `(company_name, casual_name)` pairs written.
    pub names: Vec<(String, String)>,
}

/// Fill in casual names for up to [`CASUALIZE_LIMIT`] leads that lack one.
#[instrument(skip(storage))]
pub async fn casualize_campaign(storage: &Storage, campaign_id: &str) -> Result<CasualizeReport> {
    let leads = storage
        .leads_missing_casual_name(campaign_id, CASUALIZE_LIMIT)
        .await?;

    let mut report = CasualizeReport::default();
    for (lead_id, company_name) in leads {
        let casual = casualize(&company_name);
        storage.set_casual_name(&lead_id, &casual).await?;
        report.processed += 1;
        report.names.push((company_name, casual));
    }
    info!(processed = report.processed, "company names casualized");
    Ok(report)
}
