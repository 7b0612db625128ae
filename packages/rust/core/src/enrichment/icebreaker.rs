//! Icebreaker synthesis from the lead profile and page abstracts.

use serde_json::{Value, json};
use tracing::instrument;

use leadsmith_llm::{ChatMessage, ChatRequest};
use leadsmith_shared::reply::extract_string_field_or_text;
use leadsmith_shared::{Campaign, Lead, LeadsmithError, Result};

use super::{EnrichmentContext, PageSummary};

const PERSONA: &str = "You're a helpful, intelligent sales assistant.";

/// Worked example of the tone and structure wanted from the model.
const EXEMPLAR: &str = "Hi Dana,\n\n\
    Came across Northwind Landscaping while looking at outdoor-living projects around Portland. \
    The before-and-after gallery of the terraced garden on your site is great work.\n\n\
    I'll be upfront: I looked through your site more than a stranger probably should. \
    You mention that most new clients come from referrals, so I put together a small system \
    that finds homeowners who just filed patio or deck permits and sends them a short note \
    with a link to your gallery. It costs a few cents per lead to run and fits the \
    word-of-mouth feel you've built.";

#[instrument(skip_all, fields(lead_id = %lead.id, summaries = summaries.len()))]
pub(super) async fn generate_icebreaker(
    ctx: &EnrichmentContext<'_>,
    lead: &Lead,
    campaign: &Campaign,
    summaries: &[PageSummary],
) -> Result<String> {
    let request = ChatRequest::new(
        ctx.settings.model.clone(),
        icebreaker_messages(lead, campaign, summaries),
    );
    let reply = ctx.chat.chat(&request).await?;

    let text = extract_string_field_or_text(reply.content_str(), "icebreaker");
    if text.is_empty() {
        return Err(LeadsmithError::Llm("empty icebreaker".into()));
    }
    Ok(text)
}

/// Persona, exemplar, campaign instruction, then profile and abstracts.
pub fn icebreaker_messages(
    lead: &Lead,
    campaign: &Campaign,
    summaries: &[PageSummary],
) -> Vec<ChatMessage> {
    let instruction = campaign
        .icebreaker_prompt
        .replace("{serviceLine}", &campaign.service_line);
    let abstracts = summaries
        .iter()
        .map(PageSummary::labeled)
        .collect::<Vec<_>>()
        .join("\n\n");

    vec![
        ChatMessage::system(PERSONA),
        ChatMessage::assistant(EXEMPLAR),
        ChatMessage::user(instruction),
        ChatMessage::user(format!(
            "Profile: {}\n\nWebsite summaries: {abstracts}",
            build_profile(lead)
        )),
    ]
}

/// Profile object sent alongside the abstracts. Missing fields are `null`.
pub fn build_profile(lead: &Lead) -> Value {
    json!({
        "full_name": lead.display_name(),
        "title": non_blank(&lead.title),
        "headline": lead.raw.as_deref().and_then(headline_from_raw),
        "industry": non_blank(&lead.industry),
        "city": non_blank(&lead.city),
        "state": non_blank(&lead.state),
        "country": non_blank(&lead.country),
    })
}

/// A LinkedIn-style headline out of the raw import payload, if any.
pub fn headline_from_raw(raw: &str) -> Option<String> {
    let payload: Value = serde_json::from_str(raw).ok()?;
    let candidates = [
        payload.get("Headline"),
        payload.get("headline"),
        payload.pointer("/profile/Headline"),
        payload.pointer("/profile/headline"),
        payload.pointer("/linkedin/headline"),
    ];
    candidates
        .into_iter()
        .flatten()
        .find_map(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
}

fn non_blank(field: &Option<String>) -> Option<&str> {
    field.as_deref().map(str::trim).filter(|s| !s.is_empty())
}
