//! Pipeline orchestration agent.
//!
//! A bounded tool-calling loop: the model sees the tool registry from
//! [`tools::tool_specs`], each requested call runs against storage and its
//! JSON result goes back as a tool message. The loop ends on the first plain
//! assistant reply or after [`MAX_ITERATIONS`] model calls.
//!
//! Costly stages preview by default (`test_only` / `dry_run` default to
//! true), so a job only exists once the model clears the flag explicitly.

pub mod tools;

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, info, instrument, warn};

use leadsmith_llm::{ChatMessage, ChatModel, ChatRequest};
use leadsmith_shared::Result;
use leadsmith_shared::reply::parse_object;
use leadsmith_storage::Storage;

pub use tools::tool_specs;

pub const MAX_ITERATIONS: usize = 10;

const SYSTEM_PROMPT: &str = "\
You run a lead-generation pipeline for an outreach team. Each campaign moves through these stages in order:

1. scrape_google_maps: collect businesses for the campaign's keywords.
2. clean_and_validate: drop leads whose websites are dead.
3. find_emails: look up contact emails (paid, about one credit per lead).
4. find_decision_makers: look up owners and executives (paid).
5. casualise_names: shorten company names for outreach copy.

Rules:
- Scrape, clean, find_emails and find_decision_makers cost money or time. Call them with test_only=true (scrape) or dry_run=true (the others) first, tell the user what the preview says, and only call again with the flag set to false after the user clearly agrees.
- casualise_names is free and skips leads that already have a casual name. Run it without asking.
- Before scraping, ask for keywords if the user has not given any.
- Use get_campaign_stats and get_sample_leads to answer questions about a campaign instead of guessing.
- When a job is created, report its job id and how many leads it covers.
- Keep answers short and concrete.";

/// One executed tool call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolLogEntry {
    pub name: String,
    pub args: Value,
    pub result: Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct AgentResponse {
    /// Final assistant text; empty when the iteration cap cut the run short.
    pub reply: String,
    /// The conversation after the run, without the system prompt.
    pub messages: Vec<ChatMessage>,
    pub tool_log: Vec<ToolLogEntry>,
    pub iterations: usize,
}

pub struct Agent<'a> {
    storage: &'a Storage,
    chat: &'a dyn ChatModel,
    model: String,
}

impl<'a> Agent<'a> {
    pub fn new(storage: &'a Storage, chat: &'a dyn ChatModel, model: impl Into<String>) -> Self {
        Self {
            storage,
            chat,
            model: model.into(),
        }
    }

    /// Continue `history` (user and assistant turns, no system prompt) until
    /// the model answers without tool calls.
    ///
    /// A failed model call aborts the run. Failed tools do not: their
    /// `{"error": ...}` result goes back to the model.
    #[instrument(skip_all, fields(model = %self.model, turns = history.len()))]
    pub async fn run(&self, history: Vec<ChatMessage>) -> Result<AgentResponse> {
        let specs = tools::tool_specs();
        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(ChatMessage::system(SYSTEM_PROMPT));
        messages.extend(history);

        let mut tool_log = Vec::new();
        let mut reply = String::new();
        let mut iterations = 0;

        while iterations < MAX_ITERATIONS {
            iterations += 1;
            let request =
                ChatRequest::new(self.model.clone(), messages.clone()).with_tools(specs.clone());
            let message = self.chat.chat(&request).await?;
            let calls = message.tool_calls.clone();
            messages.push(message);

            if calls.is_empty() {
                reply = messages
                    .last()
                    .map(|m| m.content_str().to_string())
                    .unwrap_or_default();
                break;
            }

            for call in calls {
                let name = call.function.name;
                let args = parse_arguments(&call.function.arguments);
                debug!(tool = %name, iteration = iterations, "running tool");
                let result = tools::execute(self.storage, &name, &args).await;
                messages.push(ChatMessage::tool(call.id, result.to_string()));
                tool_log.push(ToolLogEntry {
                    name,
                    args: Value::Object(args),
                    result,
                });
            }
        }

        if reply.is_empty() && iterations == MAX_ITERATIONS {
            warn!(iterations, "agent stopped at the iteration cap");
        }
        info!(iterations, tools = tool_log.len(), "agent run finished");

        messages.remove(0);
        Ok(AgentResponse {
            reply,
            messages,
            tool_log,
            iterations,
        })
    }
}

/// Tool arguments as an object; anything unparseable becomes `{}`.
fn parse_arguments(raw: &str) -> Map<String, Value> {
    if raw.trim().is_empty() {
        return Map::new();
    }
    parse_object(raw).unwrap_or_else(|| {
        warn!(raw, "unparseable tool arguments");
        Map::new()
    })
}
