//! # Recovery Reconciler
//!
//! Riconcilia lo stato su disco dopo una run interrotta.
//!
//! - **Fase 1** (prima della conversione): i sorgenti il cui base name ha già
//!   un `WebPs/<base>.webp` vengono tolti dalla lista; i rimanenti sono i file
//!   falliti da riconvertire.
//! - **Fase 2** (dopo la conversione): un output è un "buco" di metadata
//!   quando NON mostra metadata extra mentre il suo sorgente sì; per ognuno si
//!   ritenta il trasferimento una volta.

use std::collections::HashSet;
use tracing::{debug, info};

use crate::converter::RunContext;
use crate::error::ConvertError;
use crate::file_manager::{FileManager, ImageFile, SourceFormat};
use crate::metadata::{MetadataClassifier, MetadataTransfer};
use crate::progress::ProgressManager;

/// Outcome of phase 1
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingReport {
    /// Sources still without an output
    pub pending: Vec<ImageFile>,
    pub already_converted: usize,
}

impl PendingReport {
    pub fn message(&self) -> String {
        if self.pending.is_empty() {
            "All images converted successfully.".to_string()
        } else {
            format!("Found {} images that failed to convert", self.pending.len())
        }
    }
}

/// Outcome of phase 2
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetadataRecoveryReport {
    pub outputs_checked: usize,
    /// (source, output) pairs whose metadata was missing
    pub gaps: Vec<(ImageFile, ImageFile)>,
    pub recovered: usize,
}

impl MetadataRecoveryReport {
    pub fn message(&self) -> String {
        if self.gaps.is_empty() {
            "There is no metadata to recover.".to_string()
        } else {
            format!("Recovered metadata for {}/{} images", self.recovered, self.gaps.len())
        }
    }
}

/// Sources whose base name has no existing output
pub fn pending_sources(sources: Vec<ImageFile>, existing_outputs: &[ImageFile]) -> Vec<ImageFile> {
    let converted: HashSet<&str> = existing_outputs.iter().map(|o| o.base_name()).collect();
    sources
        .into_iter()
        .filter(|s| !converted.contains(s.base_name()))
        .collect()
}

pub struct RecoveryReconciler<'a> {
    ctx: &'a RunContext,
    show_progress: bool,
}

impl<'a> RecoveryReconciler<'a> {
    pub fn new(ctx: &'a RunContext) -> Self {
        Self {
            ctx,
            show_progress: true,
        }
    }

    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    fn existing_outputs(&self) -> Result<Vec<ImageFile>, ConvertError> {
        let output_dir = self.ctx.layout.output_dir();
        if !output_dir.is_dir() {
            return Ok(Vec::new());
        }
        FileManager::find_formats(output_dir, &[SourceFormat::Webp])
    }

    /// Phase 1: drop sources that already have an output from a prior run
    pub fn reconcile_pending(
        &self,
        sources: Vec<ImageFile>,
    ) -> Result<PendingReport, ConvertError> {
        let outputs = self.existing_outputs()?;
        let total = sources.len();
        let pending = pending_sources(sources, &outputs);
        let report = PendingReport {
            already_converted: total - pending.len(),
            pending,
        };
        info!("{}", report.message());
        Ok(report)
    }

    /// Phase 2: retry metadata transfer for outputs missing their source's metadata
    pub async fn recover_metadata(
        &self,
        sources: &[ImageFile],
    ) -> Result<MetadataRecoveryReport, ConvertError> {
        let outputs = self.existing_outputs()?;
        let classifier = MetadataClassifier::new(self.ctx);
        let progress = self.progress(outputs.len(), "Checking image metadata");

        let mut lacking = Vec::new();
        for output in &outputs {
            if !classifier.has_extra_metadata(output.path()).await {
                lacking.push(output.clone());
            }
            progress.inc();
        }
        progress.finish(&format!("Checked {} outputs", outputs.len()));

        let mut report = MetadataRecoveryReport {
            outputs_checked: outputs.len(),
            ..Default::default()
        };
        for output in lacking {
            let Some(source) = sources.iter().find(|s| s.base_name() == output.base_name()) else {
                debug!("No source left for {}", output.path().display());
                continue;
            };
            if classifier.has_extra_metadata(source.path()).await {
                report.gaps.push((source.clone(), output));
            }
        }

        if report.gaps.is_empty() {
            info!("{}", report.message());
            return Ok(report);
        }

        let transfer = MetadataTransfer::new(self.ctx);
        let mut log = self.ctx.run_log.worker("recovery");
        let progress = self.progress(report.gaps.len(), "Transferring metadata");
        for (source, output) in &report.gaps {
            if transfer.transfer(source, output.path(), &mut log).await {
                report.recovered += 1;
            }
            progress.inc();
        }
        progress.finish(&report.message());
        info!("{}", report.message());

        Ok(report)
    }

    fn progress(&self, total: usize, message: &str) -> ProgressManager {
        if self.show_progress {
            ProgressManager::new(total as u64, message)
        } else {
            ProgressManager::hidden(total as u64)
        }
    }
}
