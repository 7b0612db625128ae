//! Shared types, error model, and configuration for Leadsmith.
//!
//! This crate is the foundation depended on by all other Leadsmith crates.
//! It provides:
//! - [`LeadsmithError`]: the unified error type
//! - Domain types ([`Lead`], [`Campaign`], [`IceStatus`], [`VerificationStatus`], job records)
//! - Configuration ([`AppConfig`] and its sections, config loading)
//! - [`reply`]: defensive parsing of language-model replies

pub mod config;
pub mod error;
pub mod reply;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, DatabaseConfig, EnrichmentConfig, FetchConfig, OpenAiConfig, QueueConfig,
    VerifierConfig, config_dir, config_file_path, expand_home, init_config, load_config,
    load_config_from, validate_api_key,
};
pub use error::{LeadsmithError, Result};
pub use types::{
    BulkJob, BulkJobType, Campaign, EmailVerificationFile, EnrichmentFlags, EnrichmentJob,
    IceStatus, Lead, QueueMessage, VerificationStatus, normalize_website,
};
