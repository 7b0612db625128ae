//! Relevance-gated page summaries.

use serde_json::json;
use tracing::{debug, instrument};

use leadsmith_llm::{ChatMessage, ChatRequest};
use leadsmith_shared::reply::extract_string_field;
use leadsmith_shared::{Campaign, Lead, LeadsmithError, Result};
use leadsmith_text::{html_to_text, truncate_chars};

use super::EnrichmentContext;

/// Abstract the model returns for a page that is not about the company.
pub const NO_CONTENT: &str = "no content";

/// Fetch `url`, reduce it to text and ask the model for an abstract.
///
/// `Ok(None)` means the model judged the page off-topic.
#[instrument(skip_all, fields(url = %url))]
pub(super) async fn summarize_page(
    ctx: &EnrichmentContext<'_>,
    lead: &Lead,
    campaign: &Campaign,
    base: &str,
    url: &str,
) -> Result<Option<String>> {
    let html = ctx.pages.fetch_html(url).await?;
    let text = html_to_text(&html);
    if text.is_empty() {
        return Err(LeadsmithError::parse(format!("no readable text at {url}")));
    }
    let content = truncate_chars(&text, ctx.settings.content_chars);
    let company = lead.company_name.as_deref().unwrap_or_default();

    let mut request = ChatRequest::new(
        ctx.settings.model.clone(),
        vec![
            ChatMessage::system(summary_system_prompt(company, base, url)),
            ChatMessage::user(summary_user_prompt(
                &campaign.summarize_prompt,
                company,
                base,
                url,
                content,
            )),
        ],
    );
    request.response_format = Some(json!({"type": "json_object"}));

    let reply = ctx.chat.chat(&request).await?;
    let summary = extract_string_field(reply.content_str(), "abstract")
        .filter(|s| !s.is_empty())
        .ok_or_else(|| LeadsmithError::Llm("invalid or non-JSON summary".into()))?;

    debug!(chars = summary.len(), "page abstract received");
    if summary.eq_ignore_ascii_case(NO_CONTENT) {
        return Ok(None);
    }
    Ok(Some(summary))
}

pub fn summary_system_prompt(company: &str, base: &str, url: &str) -> String {
    format!(
        "You summarize a company's own web page for sales research.\n\n\
         Rules:\n\
         - Company: {company}\n\
         - Primary domain (must match): {base}\n\
         - Page: {url}\n\
         - Summarize only if the page is clearly about this business: what it offers, \
         who it is, its work.\n\
         - If the page is generic, unrelated or scraped wrong, answer exactly \
         {{\"abstract\":\"{NO_CONTENT}\"}}.\n\
         - Answer with JSON only, shaped like {{\"abstract\":\"...\"}}."
    )
}

/// The campaign's template when it has a `{markdown}` slot, else a default.
pub fn summary_user_prompt(
    template: &str,
    company: &str,
    base: &str,
    url: &str,
    content: &str,
) -> String {
    let template = template.trim();
    if template.contains("{markdown}") {
        return template.replace("{url}", url).replace("{markdown}", content);
    }
    let company = if company.is_empty() { "the company" } else { company };
    format!(
        "Summarize this page from {company} ({base}). Return JSON exactly \
         {{\"abstract\":\"...\"}}. If it is not clearly about this company, return \
         {{\"abstract\":\"{NO_CONTENT}\"}}.\n\n\
         URL: {url}\n\n\
         CONTENT START\n{content}\nCONTENT END"
    )
}
