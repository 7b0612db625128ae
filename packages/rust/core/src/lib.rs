//! Lead-enrichment engine.
//!
//! This crate ties the store, the page fetcher and the chat model together
//! into the pipeline's workers and triggers:
//!
//! - [`worker`]: claims queued leads and runs website enrichment on each
//! - [`enrichment`]: per-lead link discovery, page summaries, icebreaker
//! - [`verification`]: polls bulk email-verification files and reconciles
//!   their results onto leads
//! - [`enqueue`]: moves leads into the enrichment queue
//! - [`stages`]: preview/commit of bulk pipeline-stage jobs
//! - [`agent`]: tool-calling sequencer over the stages
//! - [`casualize`]: company-name shortening heuristic

pub mod agent;
pub mod casualize;
pub mod enqueue;
pub mod enrichment;
pub mod stages;
pub mod verification;
pub mod worker;

#[cfg(test)]
pub(crate) mod testing;
