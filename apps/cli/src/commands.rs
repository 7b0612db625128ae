//! CLI command definitions, routing, and tracing setup.

use std::future::Future;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use color_eyre::eyre::{Report, Result, eyre};
use leadsmith_core::agent::Agent;
use leadsmith_core::enqueue::{EnqueueRequest, EnqueueTarget, enqueue_enrichment};
use leadsmith_core::enrichment::{EnrichmentContext, EnrichmentSettings};
use leadsmith_core::stages::{
    CLEAN_MAX_LEADS, LOOKUP_MAX_LEADS, SCRAPE_MAX_LEADS, StageRequest, commit_stage, plan_stage,
};
use leadsmith_core::verification::{
    MillionVerifierClient, VerificationContext, run_verification_batch,
};
use leadsmith_core::worker::{BatchOptions, run_enrichment_batch};
use leadsmith_crawler::HttpFetcher;
use leadsmith_llm::{ChatMessage, OpenAiClient};
use leadsmith_shared::{AppConfig, expand_home, init_config, load_config, validate_api_key};
use leadsmith_storage::Storage;
use tokio::time::MissedTickBehavior;
use tracing::{error, info};

use crate::progress::CliProgress;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// Leadsmith: enrich, verify and stage campaign leads.
#[derive(Parser)]
#[command(
    name = "leadsmith",
    version,
    about = "Lead enrichment workers, email verification and pipeline orchestration.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Run a queue worker once, or on a schedule with --every.
    Worker {
        #[command(subcommand)]
        action: WorkerAction,
    },

    /// Put leads on the enrichment queue.
    Enqueue {
        /// Tenant (customer) the campaign belongs to.
        #[arg(long)]
        tenant: String,

        /// Campaign id.
        #[arg(long)]
        campaign: String,

        /// Lead id to enqueue (repeatable).
        #[arg(long = "lead", conflicts_with = "all")]
        leads: Vec<String>,

        /// Enqueue every pending lead of the campaign.
        #[arg(long)]
        all: bool,

        /// Allow leads that already have an icebreaker to be redone.
        #[arg(long)]
        reenrich: bool,
    },

    /// Preview a pipeline stage, or create its job with --commit.
    Stage {
        /// Which stage.
        kind: StageKind,

        /// Campaign id.
        #[arg(long)]
        campaign: String,

        /// Create the job instead of previewing it.
        #[arg(long)]
        commit: bool,

        /// Cap on leads processed (or, for scrape, leads collected).
        #[arg(long)]
        max_leads: Option<u32>,

        /// Search keyword for scrape (repeatable).
        #[arg(long = "keyword")]
        keywords: Vec<String>,

        /// Category filter for clean (repeatable).
        #[arg(long = "category")]
        categories: Vec<String>,

        /// Include leads that already have the looked-up field.
        #[arg(long)]
        include_existing: bool,
    },

    /// Send one message to the pipeline agent.
    Agent {
        /// Message text.
        #[arg(required = true, num_args = 1..)]
        message: Vec<String>,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Worker subcommands.
#[derive(Subcommand)]
pub(crate) enum WorkerAction {
    /// Claim queued leads and write their icebreakers.
    Enrich {
        /// Messages claimed per run.
        #[arg(long)]
        batch_size: Option<u32>,

        /// Leads processed concurrently within a batch.
        #[arg(long)]
        parallelism: Option<u32>,

        /// Seconds a claimed message stays invisible.
        #[arg(long)]
        visibility_timeout: Option<u32>,

        /// Repeat every N seconds until interrupted.
        #[arg(long)]
        every: Option<u64>,
    },

    /// Poll open verification files and reconcile finished ones.
    Verify {
        /// Repeat every N seconds until interrupted.
        #[arg(long)]
        every: Option<u64>,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub(crate) enum StageKind {
    Scrape,
    Clean,
    FindEmails,
    FindDecisionMakers,
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "leadsmith=info",
        1 => "leadsmith=debug",
        _ => "leadsmith=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt().with_env_filter(env_filter).with_target(false).init();
        }
        LogFormat::Json => {
            fmt().json().with_env_filter(env_filter).init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Worker { action } => match action {
            WorkerAction::Enrich {
                batch_size,
                parallelism,
                visibility_timeout,
                every,
            } => cmd_worker_enrich(batch_size, parallelism, visibility_timeout, every).await,
            WorkerAction::Verify { every } => cmd_worker_verify(every).await,
        },
        Command::Enqueue {
            tenant,
            campaign,
            leads,
            all,
            reenrich,
        } => cmd_enqueue(tenant, campaign, leads, all, reenrich).await,
        Command::Stage {
            kind,
            campaign,
            commit,
            max_leads,
            keywords,
            categories,
            include_existing,
        } => {
            let request = stage_request(kind, max_leads, keywords, categories, include_existing);
            cmd_stage(&campaign, &request, commit).await
        }
        Command::Agent { message } => cmd_agent(&message.join(" ")).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show().await,
        },
    }
}

async fn open_storage(config: &AppConfig) -> Result<Storage> {
    let path = expand_home(&config.database.path)?;
    Ok(Storage::open(&path).await?)
}

/// Run `tick` once, or every `every` seconds until Ctrl-C.
///
/// On a schedule a failed tick is logged and the next one still runs.
async fn scheduled<F, Fut>(every: Option<u64>, mut tick: F) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<()>>,
{
    let Some(secs) = every else {
        return tick().await;
    };

    let mut interval = tokio::time::interval(Duration::from_secs(secs.max(1)));
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    info!(every_secs = secs, "running on a schedule, Ctrl-C to stop");
    loop {
        tokio::select! {
            _ = interval.tick() => {
                if let Err(e) = tick().await {
                    error!(error = %e, "scheduled run failed");
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted, stopping");
                return Ok(());
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Workers
// ---------------------------------------------------------------------------

async fn cmd_worker_enrich(
    batch_size: Option<u32>,
    parallelism: Option<u32>,
    visibility_timeout: Option<u32>,
    every: Option<u64>,
) -> Result<()> {
    let config = load_config()?;
    let api_key = validate_api_key(&config.openai.api_key_env)?;
    let storage = open_storage(&config).await?;
    let pages = HttpFetcher::new(&config.fetch)?;
    let chat = OpenAiClient::new(&config.openai, api_key)?;

    let mut options = BatchOptions::from_config(&config.queue);
    if let Some(n) = batch_size {
        options.batch_size = n;
    }
    if let Some(n) = parallelism {
        options.parallelism = n.max(1);
    }
    if let Some(s) = visibility_timeout {
        options.visibility_timeout_secs = s;
    }

    let ctx = EnrichmentContext {
        storage: &storage,
        pages: &pages,
        chat: &chat,
        settings: EnrichmentSettings::from_config(&config),
    };

    let (ctx, options) = (&ctx, &options);
    scheduled(every, move || async move {
        let progress = CliProgress::new();
        let result = run_enrichment_batch(ctx, options, &progress).await;
        progress.finish();
        let report = result?;
        println!(
            "  claimed {}  done {}  failed {}  skipped {}  ack failures {}",
            report.claimed, report.done, report.failed, report.skipped, report.ack_failures
        );
        Ok::<(), Report>(())
    })
    .await
}

async fn cmd_worker_verify(every: Option<u64>) -> Result<()> {
    let config = load_config()?;
    let api_key = validate_api_key(&config.verifier.api_key_env)?;
    let storage = open_storage(&config).await?;
    let api = MillionVerifierClient::new(&config.verifier, api_key)?;

    let ctx = VerificationContext {
        storage: &storage,
        api: &api,
        settings: config.verifier.clone(),
    };

    let ctx = &ctx;
    scheduled(every, move || async move {
        let report = run_verification_batch(ctx).await?;
        println!(
            "  checked {}  reconciled {}  running {}  lookup failures {}  reconcile failures {}  leads updated {}",
            report.checked,
            report.reconciled,
            report.still_running,
            report.lookup_failures,
            report.reconcile_failures,
            report.leads_updated
        );
        Ok::<(), Report>(())
    })
    .await
}

// ---------------------------------------------------------------------------
// Queue and stages
// ---------------------------------------------------------------------------

async fn cmd_enqueue(
    tenant: String,
    campaign: String,
    leads: Vec<String>,
    all: bool,
    reenrich: bool,
) -> Result<()> {
    let target = match (all, leads.is_empty()) {
        (true, _) => EnqueueTarget::AllPending,
        (false, false) => EnqueueTarget::Leads(leads),
        (false, true) => return Err(eyre!("pass --all or at least one --lead")),
    };

    let config = load_config()?;
    let storage = open_storage(&config).await?;
    let report = enqueue_enrichment(
        &storage,
        &EnqueueRequest {
            tenant_id: tenant,
            campaign_id: campaign,
            target,
            reenrich,
        },
    )
    .await?;

    if let Some(message) = &report.message {
        println!("  {message}");
    }
    println!("  Enqueued: {}", report.enqueued);
    if !report.skipped.is_empty() {
        println!("  Skipped:  {}", report.skipped.len());
        for id in &report.skipped {
            println!("    {id}");
        }
    }
    Ok(())
}

fn stage_request(
    kind: StageKind,
    max_leads: Option<u32>,
    keywords: Vec<String>,
    categories: Vec<String>,
    include_existing: bool,
) -> StageRequest {
    match kind {
        StageKind::Scrape => StageRequest::ScrapeMaps {
            keywords,
            max_leads: max_leads.unwrap_or(SCRAPE_MAX_LEADS),
        },
        StageKind::Clean => StageRequest::CleanLeads {
            categories,
            max_leads: max_leads.unwrap_or(CLEAN_MAX_LEADS),
        },
        StageKind::FindEmails => StageRequest::FindEmails {
            max_leads: max_leads.unwrap_or(LOOKUP_MAX_LEADS),
            include_existing,
        },
        StageKind::FindDecisionMakers => StageRequest::FindDecisionMakers {
            max_leads: max_leads.unwrap_or(LOOKUP_MAX_LEADS),
            include_existing,
        },
    }
}

async fn cmd_stage(campaign: &str, request: &StageRequest, commit: bool) -> Result<()> {
    let config = load_config()?;
    let storage = open_storage(&config).await?;

    if !commit {
        let plan = plan_stage(&storage, campaign, request).await?;
        println!();
        println!("  Preview: {} on \"{}\"", plan.job_type, plan.campaign_name);
        println!("  Total leads:  {}", plan.total_leads);
        println!("  Would process: {}", plan.will_process);
        println!("{}", serde_json::to_string_pretty(&plan.details)?);
        println!("  Nothing was started. Re-run with --commit to create the job.");
        println!();
        return Ok(());
    }

    let commit = commit_stage(&storage, campaign, request).await?;
    println!();
    println!("  Job created!");
    println!("  ID:       {}", commit.job.id);
    println!("  Type:     {}", commit.job.job_type);
    println!("  Campaign: {}", commit.plan.campaign_name);
    println!("  Leads:    {}", commit.plan.will_process);
    println!();
    Ok(())
}

// ---------------------------------------------------------------------------
// Agent
// ---------------------------------------------------------------------------

async fn cmd_agent(message: &str) -> Result<()> {
    let config = load_config()?;
    let api_key = validate_api_key(&config.openai.api_key_env)?;
    let storage = open_storage(&config).await?;
    let chat = OpenAiClient::new(&config.openai, api_key)?;

    let agent = Agent::new(&storage, &chat, config.openai.agent_model.clone());
    let response = agent.run(vec![ChatMessage::user(message)]).await?;

    for entry in &response.tool_log {
        println!("  ▸ {} {}", entry.name, entry.args);
        println!("    {}", entry.result);
    }
    if !response.tool_log.is_empty() {
        println!();
    }
    if response.reply.is_empty() {
        println!("(no reply after {} iterations)", response.iterations);
    } else {
        println!("{}", response.reply);
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}
