//! The agent's tool registry and dispatch.
//!
//! Every tool returns a JSON value. Failures become `{"error": ...}` so the
//! model can read them and carry on.

use std::collections::BTreeMap;

use serde_json::{Map, Value, json};
use tracing::{info, instrument, warn};

use leadsmith_llm::ToolSpec;
use leadsmith_shared::{LeadsmithError, Result};
use leadsmith_storage::Storage;

use crate::casualize::casualize_campaign;
use crate::stages::{
    CLEAN_MAX_LEADS, LOOKUP_MAX_LEADS, SCRAPE_MAX_LEADS, StagePlan, StageRequest, commit_stage,
    plan_stage,
};

const SAMPLE_DEFAULT: u32 = 10;
const SAMPLE_MAX: u32 = 20;
const ACTIVE_JOBS_LIMIT: u32 = 20;
/// Existing leads shown alongside a scrape preview.
const SCRAPE_PREVIEW_SAMPLE: u32 = 5;

type Args = Map<String, Value>;

/// Tool definitions offered to the model.
pub fn tool_specs() -> Vec<ToolSpec> {
    let campaign_only = json!({
        "type": "object",
        "properties": { "campaign_id": { "type": "string", "description": "Campaign id" } },
        "required": ["campaign_id"],
    });
    let lookup = |what: &str| {
        json!({
            "type": "object",
            "properties": {
                "campaign_id": { "type": "string" },
                "max_leads": { "type": "number", "description": format!("Most leads to look up {what} for (default 100)") },
                "include_existing": { "type": "boolean", "description": format!("Also process leads that already have {what}") },
                "dry_run": { "type": "boolean", "description": "Preview only. Always call with true first." },
            },
            "required": ["campaign_id"],
        })
    };

    vec![
        ToolSpec::function(
            "list_campaigns",
            "List campaigns with their lead counts.",
            json!({ "type": "object", "properties": {}, "required": [] }),
        ),
        ToolSpec::function(
            "get_campaign_stats",
            "Coverage counts for a campaign: total leads, with email, with website, with decision maker, with casual name, with icebreaker, validated.",
            campaign_only.clone(),
        ),
        ToolSpec::function(
            "scrape_google_maps",
            "Scrape business leads from Google Maps into a campaign. Call with test_only=true first to preview; test_only=false creates the scrape job.",
            json!({
                "type": "object",
                "properties": {
                    "campaign_id": { "type": "string" },
                    "keywords": { "type": "array", "items": { "type": "string" }, "description": "Search keywords" },
                    "max_leads": { "type": "number", "description": "Target number of leads (default 1000)" },
                    "test_only": { "type": "boolean", "description": "Preview only. Always call with true first." },
                },
                "required": ["campaign_id", "keywords"],
            }),
        ),
        ToolSpec::function(
            "clean_and_validate",
            "Check that lead websites are live, optionally filtered by category. dry_run=true previews; dry_run=false creates the job.",
            json!({
                "type": "object",
                "properties": {
                    "campaign_id": { "type": "string" },
                    "categories": { "type": "array", "items": { "type": "string" } },
                    "max_leads": { "type": "number", "description": "Most leads to validate (default 1000)" },
                    "dry_run": { "type": "boolean", "description": "Preview only. Always call with true first." },
                },
                "required": ["campaign_id"],
            }),
        ),
        ToolSpec::function(
            "find_emails",
            "Find email addresses for leads. Paid, about one credit per lead. dry_run=true previews cost; dry_run=false creates the job.",
            lookup("emails"),
        ),
        ToolSpec::function(
            "find_decision_makers",
            "Find owners, founders or executives for leads. Paid. dry_run=true previews cost; dry_run=false creates the job.",
            lookup("decision makers"),
        ),
        ToolSpec::function(
            "casualise_names",
            "Shorten company names for outreach (drops Inc, LLC, Services and the like). Free and immediate; leads already done are skipped.",
            campaign_only.clone(),
        ),
        ToolSpec::function(
            "get_sample_leads",
            "Show recent leads of a campaign with a category breakdown.",
            json!({
                "type": "object",
                "properties": {
                    "campaign_id": { "type": "string" },
                    "limit": { "type": "number", "description": "How many leads (default 10, max 20)" },
                },
                "required": ["campaign_id"],
            }),
        ),
        ToolSpec::function(
            "get_active_jobs",
            "Most recent pipeline jobs with status and progress, optionally for one campaign.",
            json!({
                "type": "object",
                "properties": { "campaign_id": { "type": "string" } },
                "required": [],
            }),
        ),
    ]
}

/// Run tool `name` with `args`.
#[instrument(skip(storage, args))]
pub async fn execute(storage: &Storage, name: &str, args: &Args) -> Value {
    let result = match name {
        "list_campaigns" => list_campaigns(storage).await,
        "get_campaign_stats" => campaign_stats(storage, args).await,
        "scrape_google_maps" => scrape(storage, args).await,
        "clean_and_validate" => {
            let request = StageRequest::CleanLeads {
                categories: string_list(args, "categories"),
                max_leads: u32_arg(args, "max_leads", CLEAN_MAX_LEADS),
            };
            gated_stage(storage, args, &request, "dry_run").await
        }
        "find_emails" => {
            let request = StageRequest::FindEmails {
                max_leads: u32_arg(args, "max_leads", LOOKUP_MAX_LEADS),
                include_existing: bool_arg(args, "include_existing", false),
            };
            gated_stage(storage, args, &request, "dry_run").await
        }
        "find_decision_makers" => {
            let request = StageRequest::FindDecisionMakers {
                max_leads: u32_arg(args, "max_leads", LOOKUP_MAX_LEADS),
                include_existing: bool_arg(args, "include_existing", false),
            };
            gated_stage(storage, args, &request, "dry_run").await
        }
        "casualise_names" => casualise(storage, args).await,
        "get_sample_leads" => sample_leads(storage, args).await,
        "get_active_jobs" => active_jobs(storage, args).await,
        other => {
            warn!(tool = other, "model asked for an unknown tool");
            return json!({ "error": format!("Unknown tool: {other}") });
        }
    };

    result.unwrap_or_else(|e| {
        warn!(error = %e, "tool failed");
        json!({ "error": e.to_string() })
    })
}

async fn list_campaigns(storage: &Storage) -> Result<Value> {
    let mut out = Vec::new();
    for campaign in storage.list_campaigns().await? {
        let stats = storage.lead_stats(&campaign.id).await?;
        out.push(json!({
            "id": campaign.id,
            "name": campaign.name,
            "service_line": campaign.service_line,
            "status": campaign.status,
            "created_at": campaign.created_at,
            "lead_count": stats.total,
        }));
    }
    Ok(Value::Array(out))
}

async fn campaign_stats(storage: &Storage, args: &Args) -> Result<Value> {
    let campaign_id = str_arg(args, "campaign_id")?;
    let campaign = storage
        .get_campaign(&campaign_id)
        .await?
        .ok_or_else(|| LeadsmithError::not_found("campaign", &campaign_id))?;
    let stats = storage.lead_stats(&campaign_id).await?;

    let mut out = to_object(&stats)?;
    out.insert("campaign_name".into(), json!(campaign.name));
    Ok(Value::Object(out))
}

async fn scrape(storage: &Storage, args: &Args) -> Result<Value> {
    let campaign_id = str_arg(args, "campaign_id")?;
    let request = StageRequest::ScrapeMaps {
        keywords: string_list(args, "keywords"),
        max_leads: u32_arg(args, "max_leads", SCRAPE_MAX_LEADS),
    };
    let mut result = gated_stage(storage, args, &request, "test_only").await?;

    if bool_arg(args, "test_only", true) {
        let samples = storage
            .sample_leads(&campaign_id, SCRAPE_PREVIEW_SAMPLE)
            .await?
            .into_iter()
            .map(|l| json!({ "company": l.company_name, "category": l.title, "city": l.city }))
            .collect::<Vec<_>>();
        result["existing_samples"] = Value::Array(samples);
    }
    Ok(result)
}

/// Preview while the flag named `flag` is set (the default), commit once
/// the caller clears it.
async fn gated_stage(
    storage: &Storage,
    args: &Args,
    request: &StageRequest,
    flag: &str,
) -> Result<Value> {
    let campaign_id = str_arg(args, "campaign_id")?;
    if bool_arg(args, flag, true) {
        let plan = plan_stage(storage, &campaign_id, request).await?;
        return Ok(preview(&plan, flag));
    }

    let commit = commit_stage(storage, &campaign_id, request).await?;
    info!(job_id = %commit.job.id, "job created from agent");
    Ok(json!({
        "job_id": commit.job.id,
        "type": commit.job.job_type,
        "campaign_name": commit.plan.campaign_name,
        "eligible_leads": commit.plan.will_process,
        "config": commit.plan.config,
        "message": format!(
            "{} job created for campaign \"{}\" covering {} leads.",
            commit.job.job_type, commit.plan.campaign_name, commit.plan.will_process
        ),
    }))
}

fn preview(plan: &StagePlan, flag: &str) -> Value {
    let mut out = Map::new();
    out.insert("mode".into(), json!("PREVIEW"));
    out.insert("type".into(), json!(plan.job_type));
    out.insert("campaign_name".into(), json!(plan.campaign_name));
    out.insert("total_leads".into(), json!(plan.total_leads));
    out.insert("will_process".into(), json!(plan.will_process));
    if let Value::Object(details) = &plan.details {
        out.extend(details.clone());
    }
    out.insert(
        "message".into(),
        json!(format!(
            "Preview only, nothing was started. {} would process {} of {} leads in \"{}\". Call again with {flag}=false after the user confirms.",
            plan.job_type, plan.will_process, plan.total_leads, plan.campaign_name
        )),
    );
    Value::Object(out)
}

async fn casualise(storage: &Storage, args: &Args) -> Result<Value> {
    let campaign_id = str_arg(args, "campaign_id")?;
    let report = casualize_campaign(storage, &campaign_id).await?;
    if report.processed == 0 {
        return Ok(json!({ "processed": 0, "message": "No leads need casualisation" }));
    }
    let examples: Vec<Value> = report
        .names
        .iter()
        .take(5)
        .map(|(from, to)| json!({ "from": from, "to": to }))
        .collect();
    Ok(json!({
        "processed": report.processed,
        "examples": examples,
        "message": format!("Casualised {} company names.", report.processed),
    }))
}

async fn sample_leads(storage: &Storage, args: &Args) -> Result<Value> {
    let campaign_id = str_arg(args, "campaign_id")?;
    let limit = u32_arg(args, "limit", SAMPLE_DEFAULT).clamp(1, SAMPLE_MAX);
    let leads = storage.sample_leads(&campaign_id, limit).await?;
    if leads.is_empty() {
        return Ok(json!({ "leads": [], "message": "No leads found for this campaign." }));
    }

    let mut categories: BTreeMap<String, usize> = BTreeMap::new();
    let rows: Vec<Value> = leads
        .iter()
        .map(|l| {
            let category = l
                .title
                .as_deref()
                .filter(|t| !t.trim().is_empty())
                .unwrap_or("Unknown");
            *categories.entry(category.to_string()).or_default() += 1;
            let location = [l.city.as_deref(), l.state.as_deref()]
                .into_iter()
                .flatten()
                .filter(|s| !s.is_empty())
                .collect::<Vec<_>>()
                .join(", ");
            json!({
                "company": l.company_name,
                "website": l.company_website,
                "category": l.title,
                "location": location,
                "phone": l.phone,
                "email": l.email,
            })
        })
        .collect();

    Ok(json!({
        "sample_count": rows.len(),
        "leads": rows,
        "category_breakdown": categories,
        "message": format!("Showing {} sample leads.", leads.len()),
    }))
}

async fn active_jobs(storage: &Storage, args: &Args) -> Result<Value> {
    let campaign_id = args.get("campaign_id").and_then(Value::as_str);
    let jobs = storage
        .list_recent_bulk_jobs(campaign_id, ACTIVE_JOBS_LIMIT)
        .await?;
    serde_json::to_value(jobs).map_err(|e| LeadsmithError::parse(e.to_string()))
}

// ---------------------------------------------------------------------------
// Argument helpers
// ---------------------------------------------------------------------------

fn str_arg(args: &Args, name: &str) -> Result<String> {
    args.get(name)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .ok_or_else(|| LeadsmithError::validation(format!("missing argument '{name}'")))
}

fn bool_arg(args: &Args, name: &str, default: bool) -> bool {
    args.get(name).and_then(Value::as_bool).unwrap_or(default)
}

/// Models send counts as integers, floats or numeric strings.
fn u32_arg(args: &Args, name: &str, default: u32) -> u32 {
    let value = match args.get(name) {
        Some(Value::Number(n)) => n.as_u64().or_else(|| n.as_f64().map(|f| f.max(0.0) as u64)),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    };
    value
        .map(|v| u32::try_from(v).unwrap_or(u32::MAX))
        .unwrap_or(default)
}

/// An array of strings, or one comma-separated string.
fn string_list(args: &Args, name: &str) -> Vec<String> {
    match args.get(name) {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
        Some(Value::String(s)) => s
            .split(',')
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .collect(),
        _ => Vec::new(),
    }
}

fn to_object<T: serde::Serialize>(value: &T) -> Result<Map<String, Value>> {
    match serde_json::to_value(value) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(LeadsmithError::parse("expected a JSON object")),
        Err(e) => Err(LeadsmithError::parse(e.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{add_lead, seeded};
    use leadsmith_shared::IceStatus;

    fn args(value: Value) -> Args {
        match value {
            Value::Object(map) => map,
            _ => panic!("object expected"),
        }
    }

    #[test]
    fn registry_names() {
        let names: Vec<String> = tool_specs().into_iter().map(|t| t.function.name).collect();
        assert_eq!(
            names,
            vec![
                "list_campaigns",
                "get_campaign_stats",
                "scrape_google_maps",
                "clean_and_validate",
                "find_emails",
                "find_decision_makers",
                "casualise_names",
                "get_sample_leads",
                "get_active_jobs",
            ]
        );
    }

    #[test]
    fn argument_coercion() {
        let a = args(json!({"max_leads": 50.0, "limit": "7", "keywords": "roofers, plumbers ,"}));
        assert_eq!(u32_arg(&a, "max_leads", 1), 50);
        assert_eq!(u32_arg(&a, "limit", 1), 7);
        assert_eq!(u32_arg(&a, "missing", 9), 9);
        assert_eq!(string_list(&a, "keywords"), vec!["roofers", "plumbers"]);
        assert!(str_arg(&a, "campaign_id").is_err());
    }

    #[tokio::test]
    async fn dry_run_is_default_and_leaves_no_trace() {
        let (storage, campaign) = seeded().await;
        let lead = add_lead(&storage, &campaign, |l| l.company_website = Some("a.test".into())).await;

        for tool in ["find_emails", "find_decision_makers", "clean_and_validate"] {
            let result = execute(&storage, tool, &args(json!({"campaign_id": campaign.id}))).await;
            assert_eq!(result["mode"], "PREVIEW", "{tool}: {result}");
            assert_eq!(result["will_process"], 1);
        }
        let result = execute(
            &storage,
            "scrape_google_maps",
            &args(json!({"campaign_id": campaign.id, "keywords": ["roofers"]})),
        )
        .await;
        assert_eq!(result["mode"], "PREVIEW");
        assert_eq!(result["existing_samples"].as_array().unwrap().len(), 1);

        assert_eq!(storage.count_bulk_jobs(&campaign.id).await.unwrap(), 0);
        let unchanged = storage.get_lead(&lead.id).await.unwrap().unwrap();
        assert_eq!(unchanged.ice_status, IceStatus::Pending);
        assert_eq!(unchanged.email, None);
    }

    #[tokio::test]
    async fn commit_creates_job_with_previewed_count() {
        let (storage, campaign) = seeded().await;
        for _ in 0..3 {
            add_lead(&storage, &campaign, |_| {}).await;
        }

        let preview = execute(
            &storage,
            "find_emails",
            &args(json!({"campaign_id": campaign.id, "max_leads": 2})),
        )
        .await;
        let commit = execute(
            &storage,
            "find_emails",
            &args(json!({"campaign_id": campaign.id, "max_leads": 2, "dry_run": false})),
        )
        .await;

        assert_eq!(preview["will_process"], 2);
        assert_eq!(commit["eligible_leads"], preview["will_process"]);
        assert!(commit["job_id"].is_string());
        assert_eq!(commit["type"], "find_emails");
        assert_eq!(storage.count_bulk_jobs(&campaign.id).await.unwrap(), 1);

        let jobs = execute(&storage, "get_active_jobs", &args(json!({}))).await;
        assert_eq!(jobs.as_array().unwrap().len(), 1);
        assert_eq!(jobs[0]["status"], "pending");
    }

    #[tokio::test]
    async fn samples_and_stats() {
        let (storage, campaign) = seeded().await;
        add_lead(&storage, &campaign, |l| {
            l.company_name = Some("Acme".into());
            l.title = Some("Roofer".into());
            l.city = Some("Austin".into());
            l.state = Some("TX".into());
        })
        .await;
        add_lead(&storage, &campaign, |l| l.email = Some("a@b.test".into())).await;

        let samples = execute(
            &storage,
            "get_sample_leads",
            &args(json!({"campaign_id": campaign.id, "limit": 50})),
        )
        .await;
        assert_eq!(samples["sample_count"], 2);
        assert_eq!(samples["category_breakdown"]["Roofer"], 1);
        assert_eq!(samples["category_breakdown"]["Unknown"], 1);
        let locations: Vec<&str> = samples["leads"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(|l| l["location"].as_str())
            .collect();
        assert!(locations.contains(&"Austin, TX"));

        let stats = execute(
            &storage,
            "get_campaign_stats",
            &args(json!({"campaign_id": campaign.id})),
        )
        .await;
        assert_eq!(stats["total"], 2);
        assert_eq!(stats["with_email"], 1);
        assert_eq!(stats["campaign_name"], "Austin roofers");

        let listed = execute(&storage, "list_campaigns", &args(json!({}))).await;
        assert_eq!(listed[0]["lead_count"], 2);
    }

    #[tokio::test]
    async fn failures_become_error_results() {
        let (storage, _) = seeded().await;
        let unknown = execute(&storage, "delete_everything", &args(json!({}))).await;
        assert_eq!(unknown["error"], "Unknown tool: delete_everything");

        let missing = execute(&storage, "get_campaign_stats", &args(json!({}))).await;
        assert!(missing["error"].as_str().unwrap().contains("campaign_id"));

        let no_keywords = execute(
            &storage,
            "scrape_google_maps",
            &args(json!({"campaign_id": "whatever"})),
        )
        .await;
        assert!(no_keywords["error"].is_string());
    }
}
