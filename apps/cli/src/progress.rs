//! Terminal progress for conversions.

use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};

use ietf2vcon_core::{CapabilityStatus, ConversionReport, ProgressReporter, Stage};

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];

/// Spinner showing the current stage, with one line per capability outcome.
pub(crate) struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    pub(crate) fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(TICKS),
        );
        spinner.enable_steady_tick(Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn stage(&self, stage: Stage) {
        self.spinner.set_message(stage.to_string());
    }

    fn capability(&self, name: &str, status: &CapabilityStatus) {
        let mark = if status.is_available() { "✓" } else { "–" };
        self.spinner.println(format!("  {mark} {name:<11} {status}"));
    }

    fn done(&self, _report: &ConversionReport) {
        self.spinner.finish_and_clear();
    }
}

/// Bar over the groups of a `convert-all` run.
pub(crate) fn batch_bar(total: usize) -> ProgressBar {
    let bar = ProgressBar::new(total as u64);
    bar.set_style(
        ProgressStyle::with_template("{spinner:.cyan} [{pos}/{len}] {wide_msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .tick_strings(TICKS),
    );
    bar.enable_steady_tick(Duration::from_millis(80));
    bar
}
