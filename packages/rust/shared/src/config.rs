//! Application configuration for Leadsmith.
//!
//! User config lives at `~/.leadsmith/leadsmith.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{LeadsmithError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "leadsmith.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".leadsmith";

// ---------------------------------------------------------------------------
// Config structs (matching leadsmith.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Language model API settings.
    #[serde(default)]
    pub openai: OpenAiConfig,

    /// Bulk email-verification provider settings.
    #[serde(default)]
    pub verifier: VerifierConfig,

    /// Enrichment queue consumption.
    #[serde(default)]
    pub queue: QueueConfig,

    /// Website fetching limits.
    #[serde(default)]
    pub fetch: FetchConfig,

    /// Per-lead enrichment limits.
    #[serde(default)]
    pub enrichment: EnrichmentConfig,
}

/// `[database]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the libSQL database file. `~` expands to the home directory.
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> String {
    "~/.leadsmith/leadsmith.db".into()
}

/// `[openai]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiConfig {
    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_openai_key_env")]
    pub api_key_env: String,

    /// Base URL of an OpenAI-compatible chat completions API.
    #[serde(default = "default_openai_base_url")]
    pub base_url: String,

    /// Model used for page summaries and icebreakers.
    #[serde(default = "default_enrichment_model")]
    pub enrichment_model: String,

    /// Model used by the orchestration agent (needs tool calling).
    #[serde(default = "default_agent_model")]
    pub agent_model: String,

    /// Request timeout for a single chat completion.
    #[serde(default = "default_openai_timeout")]
    pub timeout_secs: u64,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_openai_key_env(),
            base_url: default_openai_base_url(),
            enrichment_model: default_enrichment_model(),
            agent_model: default_agent_model(),
            timeout_secs: default_openai_timeout(),
        }
    }
}

fn default_openai_key_env() -> String {
    "OPENAI_API_KEY".into()
}
fn default_openai_base_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_enrichment_model() -> String {
    "gpt-5-nano".into()
}
fn default_agent_model() -> String {
    "gpt-4o-mini".into()
}
fn default_openai_timeout() -> u64 {
    60
}

/// `[verifier]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifierConfig {
    #[serde(default = "default_verifier_key_env")]
    pub api_key_env: String,

    #[serde(default = "default_verifier_base_url")]
    pub base_url: String,

    /// Unprocessed files polled per invocation.
    #[serde(default = "default_verifier_batch")]
    pub batch_size: u32,

    /// Leads fetched per page when building the email index.
    #[serde(default = "default_lead_page_size")]
    pub lead_page_size: u32,

    /// Lead ids per bulk status update.
    #[serde(default = "default_update_chunk")]
    pub update_chunk_size: usize,
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_verifier_key_env(),
            base_url: default_verifier_base_url(),
            batch_size: default_verifier_batch(),
            lead_page_size: default_lead_page_size(),
            update_chunk_size: default_update_chunk(),
        }
    }
}

fn default_verifier_key_env() -> String {
    "MILLIONVERIFIER_API_KEY".into()
}
fn default_verifier_base_url() -> String {
    "https://bulkapi.millionverifier.com/bulkapi/v2".into()
}
fn default_verifier_batch() -> u32 {
    20
}
fn default_lead_page_size() -> u32 {
    1000
}
fn default_update_chunk() -> usize {
    100
}

/// `[queue]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Messages claimed per worker invocation.
    #[serde(default = "default_queue_batch")]
    pub batch_size: u32,

    /// Seconds a claimed message stays hidden before it can be reclaimed.
    #[serde(default = "default_visibility_timeout")]
    pub visibility_timeout_secs: u32,

    /// Leads processed together within a batch (1 = sequential).
    #[serde(default = "default_parallelism")]
    pub parallelism: u32,

    /// Interval between scheduled invocations in loop mode.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            batch_size: default_queue_batch(),
            visibility_timeout_secs: default_visibility_timeout(),
            parallelism: default_parallelism(),
            poll_interval_secs: default_poll_interval(),
        }
    }
}

fn default_queue_batch() -> u32 {
    10
}
fn default_visibility_timeout() -> u32 {
    120
}
fn default_parallelism() -> u32 {
    1
}
fn default_poll_interval() -> u64 {
    60
}

/// `[fetch]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    #[serde(default = "default_fetch_timeout")]
    pub timeout_ms: u64,

    /// Bytes read from a response body before it is cut off.
    #[serde(default = "default_max_bytes")]
    pub max_bytes: usize,

    #[serde(default = "default_attempts")]
    pub attempts: u32,

    /// Pause between attempts.
    #[serde(default = "default_backoff")]
    pub backoff_ms: u64,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_fetch_timeout(),
            max_bytes: default_max_bytes(),
            attempts: default_attempts(),
            backoff_ms: default_backoff(),
            user_agent: default_user_agent(),
        }
    }
}

fn default_fetch_timeout() -> u64 {
    12_000
}
fn default_max_bytes() -> usize {
    300 * 1024
}
fn default_attempts() -> u32 {
    2
}
fn default_backoff() -> u64 {
    300
}
fn default_user_agent() -> String {
    concat!("Mozilla/5.0 (compatible; Leadsmith/", env!("CARGO_PKG_VERSION"), ")").into()
}

/// `[enrichment]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichmentConfig {
    /// Internal pages picked besides the homepage.
    #[serde(default = "default_max_candidates")]
    pub max_candidates: usize,

    /// Usable page abstracts after which summarization stops.
    #[serde(default = "default_max_summaries")]
    pub max_summaries: usize,

    /// Characters of page text sent to the model.
    #[serde(default = "default_content_chars")]
    pub content_chars: usize,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            max_candidates: default_max_candidates(),
            max_summaries: default_max_summaries(),
            content_chars: default_content_chars(),
        }
    }
}

fn default_max_candidates() -> usize {
    3
}
fn default_max_summaries() -> usize {
    3
}
fn default_content_chars() -> usize {
    6_000
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.leadsmith/`).
pub fn config_dir() -> Result<PathBuf> {
    let home =
        dirs::home_dir().ok_or_else(|| LeadsmithError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.leadsmith/leadsmith.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| LeadsmithError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| LeadsmithError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| LeadsmithError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| LeadsmithError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| LeadsmithError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Expand a leading `~/` against the home directory.
pub fn expand_home(path: &str) -> Result<PathBuf> {
    match path.strip_prefix("~/") {
        Some(rest) => {
            let home = dirs::home_dir()
                .ok_or_else(|| LeadsmithError::config("could not determine home directory"))?;
            Ok(home.join(rest))
        }
        None => Ok(PathBuf::from(path)),
    }
}

/// Read an API key from the named env var, failing with a config error when
/// it is unset or empty.
pub fn validate_api_key(var_name: &str) -> Result<String> {
    match std::env::var(var_name) {
        Ok(val) if !val.trim().is_empty() => Ok(val),
        _ => Err(LeadsmithError::config(format!(
            "API key not found. Set the {var_name} environment variable."
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("OPENAI_API_KEY"));
        assert!(toml_str.contains("MILLIONVERIFIER_API_KEY"));
        assert!(toml_str.contains("visibility_timeout_secs"));
    }

    #[test]
    fn config_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let parsed: AppConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.queue.visibility_timeout_secs, 120);
        assert_eq!(parsed.fetch.max_bytes, 300 * 1024);
        assert_eq!(parsed.enrichment.content_chars, 6_000);
        assert_eq!(parsed.verifier.batch_size, 20);
    }

    #[test]
    fn partial_config_fills_defaults() {
        let toml_str = r#"
[queue]
batch_size = 4
parallelism = 2

[openai]
agent_model = "gpt-4.1-mini"
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.queue.batch_size, 4);
        assert_eq!(config.queue.parallelism, 2);
        assert_eq!(config.queue.visibility_timeout_secs, 120);
        assert_eq!(config.openai.agent_model, "gpt-4.1-mini");
        assert_eq!(config.openai.enrichment_model, "gpt-5-nano");
        assert_eq!(config.fetch.attempts, 2);
    }

    #[test]
    fn expand_home_leaves_absolute_paths() {
        assert_eq!(
            expand_home("/var/lib/leadsmith.db").unwrap(),
            PathBuf::from("/var/lib/leadsmith.db")
        );
    }

    #[test]
    fn api_key_validation() {
        // Use a unique env var name to avoid interfering with other tests
        let result = validate_api_key("LS_TEST_NONEXISTENT_KEY_12345");
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("LS_TEST_NONEXISTENT_KEY_12345"));
    }
}
