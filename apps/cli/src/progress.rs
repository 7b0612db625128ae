//! Terminal progress for worker batches.

use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use leadsmith_core::worker::{LeadOutcome, WorkerProgress};

/// Per-batch progress bar, hidden when stderr is not a terminal.
pub(crate) struct CliProgress {
    bar: ProgressBar,
}

impl CliProgress {
    pub(crate) fn new() -> Self {
        let bar = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} {msg}") {
            bar.set_style(style.tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]));
        }
        bar.set_message("Claiming leads");
        bar.enable_steady_tick(Duration::from_millis(80));
        Self { bar }
    }

    pub(crate) fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl WorkerProgress for CliProgress {
    fn claimed(&self, count: usize) {
        self.bar.set_length(count as u64);
        self.bar.set_position(0);
        if let Ok(style) = ProgressStyle::with_template("{bar:30.cyan/blue} {pos}/{len} {msg}") {
            self.bar.set_style(style);
        }
        self.bar.set_message(format!("{count} leads claimed"));
    }

    fn lead_finished(&self, lead_id: &str, outcome: LeadOutcome) {
        self.bar.inc(1);
        let label = match outcome {
            LeadOutcome::Done => "done",
            LeadOutcome::Failed => "failed",
            LeadOutcome::Skipped => "skipped",
        };
        self.bar.set_message(format!("{lead_id} {label}"));
    }
}
