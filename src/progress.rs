//! # Progress Reporting and Statistics Module
//!
//! Questo modulo gestisce la progress bar e il riepilogo finale di una run.
//!
//! ## Componenti principali:
//! - `ProgressManager`: progress bar `indicatif`, aggiornata campionando i
//!   contatori atomici (la bar è solo UI, non sincronizzazione)
//! - `RunSummary`: statistiche aggregate stampate a fine run
//!
//! ## Visual feedback:
//! ```text
//! ⠋ [00:02:15] [=======================>----------------] 87/150 (58%) Converting images
//! ```

use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Sampling period of the progress display
pub const PROGRESS_TICK: Duration = Duration::from_millis(100);

/// Manages progress reporting for a conversion phase
#[derive(Clone)]
pub struct ProgressManager {
    bar: ProgressBar,
}

impl ProgressManager {
    /// Create a new progress manager
    pub fn new(total: u64, message: &str) -> Self {
        let bar = ProgressBar::new(total);

        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}")
        {
            bar.set_style(style.progress_chars("=>-"));
        }

        bar.set_message(message.to_string());
        bar.enable_steady_tick(PROGRESS_TICK);

        Self { bar }
    }

    /// A manager that draws nothing
    pub fn hidden(total: u64) -> Self {
        let bar = ProgressBar::hidden();
        bar.set_length(total);
        Self { bar }
    }

    /// Move to an absolute position, as sampled from the counters
    pub fn set_position(&self, position: u64) {
        self.bar.set_position(position);
    }

    /// Advance by one
    pub fn inc(&self) {
        self.bar.inc(1);
    }

    pub fn position(&self) -> u64 {
        self.bar.position()
    }

    /// Finish with a final message
    pub fn finish(&self, message: &str) {
        self.bar.finish_with_message(message.to_string());
    }
}

/// Aggregate outcome of a run
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub files_found: usize,
    pub files_pending: usize,
    pub converted: usize,
    pub failed: usize,
    pub metadata_transferred: usize,
    pub metadata_recovered: usize,
    pub originals_replaced: usize,
}

impl RunSummary {
    pub fn format_summary(&self) -> String {
        format!(
            "Found: {} images | Converted: {}/{} | Failed: {} | Metadata transferred: {} | Recovered: {} | Replaced: {}",
            self.files_found,
            self.converted,
            self.files_pending,
            self.failed,
            self.metadata_transferred,
            self.metadata_recovered,
            self.originals_replaced,
        )
    }
}
