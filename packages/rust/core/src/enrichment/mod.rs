//! Website enrichment of a single lead.
//!
//! Discovery → candidate selection → per-page summaries → icebreaker.
//! This module never touches lead state; [`crate::worker`] owns the status
//! transitions around it.

mod icebreaker;
mod summarize;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{info, instrument, warn};

use leadsmith_crawler::PageSource;
use leadsmith_discovery::{discover_links, select_targets};
use leadsmith_llm::ChatModel;
use leadsmith_shared::{AppConfig, Campaign, Lead, LeadsmithError, Result, normalize_website};
use leadsmith_storage::Storage;

pub use icebreaker::{build_profile, headline_from_raw, icebreaker_messages};
pub use summarize::{NO_CONTENT, summary_system_prompt, summary_user_prompt};

/// Tunables for one worker run.
#[derive(Debug, Clone)]
pub struct EnrichmentSettings {
    /// Model used for page summaries and the icebreaker.
    pub model: String,
    pub max_candidates: usize,
    pub max_summaries: usize,
    /// Characters of page text sent per summary call.
    pub content_chars: usize,
    /// Fixed seed for candidate shuffling. `None` seeds from the OS.
    pub selection_seed: Option<u64>,
}

impl EnrichmentSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            model: config.openai.enrichment_model.clone(),
            max_candidates: config.enrichment.max_candidates,
            max_summaries: config.enrichment.max_summaries,
            content_chars: config.enrichment.content_chars,
            selection_seed: None,
        }
    }

    pub(crate) fn rng(&self) -> StdRng {
        match self.selection_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        }
    }
}

impl Default for EnrichmentSettings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

/// Everything an enrichment run needs, passed explicitly into each run.
pub struct EnrichmentContext<'a> {
    pub storage: &'a Storage,
    pub pages: &'a dyn PageSource,
    pub chat: &'a dyn ChatModel,
    pub settings: EnrichmentSettings,
}

/// One usable page abstract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageSummary {
    pub url: String,
    pub text: String,
}

impl PageSummary {
    /// `URL: <url>\n<abstract>`, the form handed to the icebreaker prompt.
    pub fn labeled(&self) -> String {
        format!("URL: {}\n{}", self.url, self.text)
    }
}

/// Result of enriching one lead.
#[derive(Debug, Clone)]
pub struct Enrichment {
    /// Pages picked for summarization, homepage first.
    pub targets: Vec<String>,
    pub summaries: Vec<PageSummary>,
    pub ice_breaker: String,
}

/// Run website enrichment for `lead`.
///
/// Fails when the lead has no website, when no page yields a usable
/// abstract, or when icebreaker synthesis fails. When every page failed,
/// the error of the last page is returned.
#[instrument(skip_all, fields(lead_id = %lead.id))]
pub async fn enrich_lead<R: Rng + ?Sized>(
    ctx: &EnrichmentContext<'_>,
    lead: &Lead,
    campaign: &Campaign,
    rng: &mut R,
) -> Result<Enrichment> {
    let base = lead
        .company_website
        .as_deref()
        .and_then(normalize_website)
        .ok_or_else(|| LeadsmithError::validation("lead has no company website"))?;
    let homepage = format!("https://{base}");

    let links = discover_links(ctx.pages, &homepage).await;
    let targets = select_targets(&homepage, &links, ctx.settings.max_candidates, rng);
    info!(discovered = links.len(), targets = targets.len(), "summarization targets selected");

    let mut summaries = Vec::new();
    let mut last_error: Option<LeadsmithError> = None;
    for url in &targets {
        if summaries.len() >= ctx.settings.max_summaries {
            break;
        }
        match summarize::summarize_page(ctx, lead, campaign, &base, url).await {
            Ok(Some(text)) => summaries.push(PageSummary {
                url: url.clone(),
                text,
            }),
            Ok(None) => info!(url = %url, "page not about the company, skipped"),
            Err(e) => {
                warn!(url = %url, error = %e.categorized(), "page summary failed");
                last_error = Some(e);
            }
        }
    }

    if summaries.is_empty() {
        return Err(last_error.unwrap_or_else(|| {
            LeadsmithError::Llm("no page summary was about the company".into())
        }));
    }

    let ice_breaker = icebreaker::generate_icebreaker(ctx, lead, campaign, &summaries).await?;
    info!(summaries = summaries.len(), chars = ice_breaker.len(), "icebreaker generated");

    Ok(Enrichment {
        targets,
        summaries,
        ice_breaker,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ScriptedChat, StaticPages, campaign, summary_reply, test_storage};
    use leadsmith_llm::Role;
    use rand::SeedableRng;

    fn lead_with_site(site: &str) -> Lead {
        let mut lead = Lead::new("c-1", "tenant-1");
        lead.company_name = Some("Acme Roofing".into());
        lead.company_website = Some(site.into());
        lead
    }

    #[tokio::test]
    async fn pdf_dropped_about_and_home_summarized() {
        let storage = test_storage().await;
        let pages = StaticPages::new()
            .page(
                "https://acme.test",
                r#"<a href="/about">About</a><a href="/pricing.pdf">Prices</a><p>Acme home</p>"#,
            )
            .page("https://acme.test/", "<p>Acme roofs houses in Austin.</p>")
            .page("https://acme.test/about", "<p>Family owned since 1990.</p>");
        let chat = ScriptedChat::new(vec![
            summary_reply("Residential roofing in Austin"),
            summary_reply("Family business since 1990"),
            "Hey, loved the family story.".into(),
        ]);
        let ctx = EnrichmentContext {
            storage: &storage,
            pages: &pages,
            chat: &chat,
            settings: EnrichmentSettings::default(),
        };

        let mut rng = StdRng::seed_from_u64(1);
        let result = enrich_lead(&ctx, &lead_with_site("acme.test"), &campaign("tenant-1"), &mut rng)
            .await
            .unwrap();

        assert_eq!(result.targets, vec!["https://acme.test/", "https://acme.test/about"]);
        assert_eq!(result.summaries.len(), 2);
        assert_eq!(result.ice_breaker, "Hey, loved the family story.");
        assert!(!pages.was_fetched("https://acme.test/pricing.pdf"));

        let requests = chat.requests();
        assert_eq!(requests.len(), 3);
        let synthesis = requests[2].messages.last().unwrap().content_str().to_string();
        assert!(synthesis.contains("URL: https://acme.test/\nResidential roofing in Austin"));
        assert!(synthesis.contains("URL: https://acme.test/about\nFamily business since 1990"));
    }

    #[tokio::test]
    async fn no_content_abstract_is_not_used() {
        let storage = test_storage().await;
        let pages = StaticPages::new()
            .page("https://acme.test", r#"<a href="/news">News</a>"#)
            .page("https://acme.test/", "<p>Acme roofing</p>")
            .page("https://acme.test/news", "<p>Stock market today</p>");
        let chat = ScriptedChat::new(vec![
            summary_reply("Roofing contractor"),
            summary_reply(NO_CONTENT),
            "Nice roofs.".into(),
        ]);
        let ctx = EnrichmentContext {
            storage: &storage,
            pages: &pages,
            chat: &chat,
            settings: EnrichmentSettings::default(),
        };

        let mut rng = StdRng::seed_from_u64(1);
        let result = enrich_lead(&ctx, &lead_with_site("acme.test"), &campaign("t"), &mut rng)
            .await
            .unwrap();

        assert_eq!(result.summaries.len(), 1);
        let synthesis = chat.requests()[2].messages.last().unwrap().content_str().to_string();
        assert!(!synthesis.contains(NO_CONTENT));
    }

    #[tokio::test]
    async fn all_pages_failing_returns_last_error() {
        let storage = test_storage().await;
        let pages = StaticPages::new();
        let chat = ScriptedChat::new(vec![]);
        let ctx = EnrichmentContext {
            storage: &storage,
            pages: &pages,
            chat: &chat,
            settings: EnrichmentSettings::default(),
        };

        let mut rng = StdRng::seed_from_u64(1);
        let err = enrich_lead(&ctx, &lead_with_site("https://gone.test/"), &campaign("t"), &mut rng)
            .await
            .unwrap_err();

        assert!(err.categorized().starts_with("scrape: "), "{}", err.categorized());
        assert!(chat.requests().is_empty());
    }

    #[tokio::test]
    async fn only_off_topic_pages_is_an_error() {
        let storage = test_storage().await;
        let pages = StaticPages::new().page("https://acme.test/", "<p>Parked domain</p>");
        let chat = ScriptedChat::new(vec![summary_reply(NO_CONTENT)]);
        let ctx = EnrichmentContext {
            storage: &storage,
            pages: &pages,
            chat: &chat,
            settings: EnrichmentSettings::default(),
        };

        let mut rng = StdRng::seed_from_u64(1);
        let err = enrich_lead(&ctx, &lead_with_site("acme.test"), &campaign("t"), &mut rng)
            .await
            .unwrap_err();
        assert_eq!(err.category(), "openai");
        // no icebreaker call after the single summary
        assert_eq!(chat.requests().len(), 1);
        assert_eq!(chat.requests()[0].messages[0].role, Role::System);
    }

    #[tokio::test]
    async fn missing_website_fails_before_fetching() {
        let storage = test_storage().await;
        let pages = StaticPages::new();
        let chat = ScriptedChat::new(vec![]);
        let ctx = EnrichmentContext {
            storage: &storage,
            pages: &pages,
            chat: &chat,
            settings: EnrichmentSettings::default(),
        };
        let lead = Lead::new("c-1", "t");

        let mut rng = StdRng::seed_from_u64(1);
        let err = enrich_lead(&ctx, &lead, &campaign("t"), &mut rng).await.unwrap_err();
        assert!(err.to_string().contains("no company website"));
        assert_eq!(pages.fetch_count(), 0);
    }
}
