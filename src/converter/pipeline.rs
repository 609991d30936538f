//! # WebP Converter Main Orchestrator
//!
//! Orchestratore principale: collega discovery, recovery, pool di worker e
//! auto-replace in una singola run.
//!
//! ## Flusso:
//! 1. Discovery delle immagini nella directory di lavoro
//! 2. (recover) Fase 1: esclude i file già convertiti
//! 3. Partizionamento round-robin e creazione di `WebPs/` e `xmpdata_tmp/`
//! 4. Pool di worker
//! 5. (recover) Fase 2: ritenta i metadata mancanti
//! 6. (auto-replace) Sostituisce gli originali convertiti senza errori
//! 7. Rimozione della directory scratch
//!
//! Le modalità "di servizio" (`list`, `mdtest`, `convert_single`) riusano gli
//! stessi componenti senza avviare il pool.

use anyhow::{Context, Result};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::converter::engine::{ConversionEngine, ConversionResult};
use crate::converter::partition::partition;
use crate::converter::pool::WorkerPool;
use crate::converter::recovery::RecoveryReconciler;
use crate::converter::RunContext;
use crate::error::ConvertError;
use crate::file_manager::{FileManager, ImageFile, WorkDirLayout};
use crate::metadata::{describe_dump, MetadataClassifier, TagLine};
use crate::progress::RunSummary;
use crate::run_log::{Outcome, RunLog};
use crate::tools::CommandRunner;

/// A discovered image and, when requested, whether it carries extra metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListedImage {
    pub file: ImageFile,
    pub extra_metadata: Option<bool>,
}

impl ListedImage {
    /// `\t<name>` with a ` + Extra Data` tag when the file has extra metadata
    pub fn to_line(&self) -> String {
        match self.extra_metadata {
            Some(true) => format!("\t{} + Extra Data", self.file.display_name()),
            _ => format!("\t{}", self.file.display_name()),
        }
    }
}

/// Orchestrates a conversion run in one working directory
pub struct WebpConverter {
    layout: WorkDirLayout,
    config: Config,
    runner: Arc<dyn CommandRunner>,
    show_progress: bool,
}

impl WebpConverter {
    pub fn new(
        work_dir: impl Into<PathBuf>,
        config: Config,
        runner: Arc<dyn CommandRunner>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            layout: WorkDirLayout::new(work_dir),
            config,
            runner,
            show_progress: true,
        })
    }

    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    pub fn layout(&self) -> &WorkDirLayout {
        &self.layout
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Images of the accepted formats in the working directory
    pub fn discover(&self) -> Result<Vec<ImageFile>, ConvertError> {
        FileManager::find_images(self.layout.root(), self.config.include_webp)
    }

    /// Full pipeline over the working directory
    pub async fn run(&self) -> Result<RunSummary> {
        let start_time = Instant::now();
        let discovered = self.discover()?;
        let files_found = discovered.len();
        let (sources, colliding) = FileManager::split_base_name_collisions(discovered);
        for file in &colliding {
            warn!(
                "⚠️ Skipping {}: another image already converts to {}.webp",
                file.path().display(),
                file.base_name()
            );
        }
        let mut summary = RunSummary {
            files_found,
            ..Default::default()
        };

        if !self.config.recover {
            if sources.is_empty() {
                info!("No images found in {}", self.layout.root().display());
                return Ok(summary);
            }
            info!("🔍 Found {} images in {}", sources.len(), self.layout.root().display());
        }

        let run_log = if self.config.logging {
            RunLog::init(&self.layout).await
        } else {
            RunLog::disabled()
        };
        let ctx = Arc::new(RunContext::new(
            self.config.clone(),
            self.layout.clone(),
            Arc::clone(&self.runner),
            run_log,
        ));

        let pending = if self.config.recover {
            let report = RecoveryReconciler::new(&ctx)
                .with_progress(self.show_progress)
                .reconcile_pending(sources.clone())?;
            report.pending
        } else {
            sources.clone()
        };
        summary.files_pending = pending.len();

        let partitions = partition(pending, self.config.effective_workers());
        FileManager::make_dir(self.layout.output_dir()).await?;
        FileManager::make_dir(self.layout.scratch_dir()).await?;

        let outcome = WorkerPool::new(Arc::clone(&ctx))
            .with_progress(self.show_progress)
            .run(partitions)
            .await;
        summary.converted = ctx.counters.images_completed();
        summary.failed = ctx.counters.images_failed();
        summary.metadata_transferred = outcome.metadata_transferred();

        if self.config.recover {
            let report = RecoveryReconciler::new(&ctx)
                .with_progress(self.show_progress)
                .recover_metadata(&sources)
                .await?;
            summary.metadata_recovered = report.recovered;
        }

        if self.config.auto_replace {
            let failed: HashSet<&Path> = outcome
                .entries
                .iter()
                .filter(|e| e.outcome == Outcome::Failed)
                .map(|e| e.file.as_path())
                .collect();
            summary.originals_replaced = self
                .replace_originals(&ctx, &outcome.results, &failed)
                .await;
        }

        FileManager::remove_dir(self.layout.scratch_dir()).await?;

        info!(
            "✅ Run completed in {:.1}s: {}",
            start_time.elapsed().as_secs_f64(),
            summary.format_summary()
        );
        Ok(summary)
    }

    /// Replace each original whose run logged no failure; returns how many were replaced
    async fn replace_originals(
        &self,
        ctx: &RunContext,
        results: &[ConversionResult],
        failed: &HashSet<&Path>,
    ) -> usize {
        let mut replaced = 0;
        for result in results {
            let Some(ref output) = result.output else {
                continue;
            };
            let original = result.input.path();
            if failed.contains(original) || ctx.errors.has_errors_for(original).await {
                debug!("Keeping {}: failures were logged for it", original.display());
                continue;
            }
            match FileManager::replace_with_converted(&result.input, output).await {
                Ok(placed) => {
                    debug!("Replaced {} with {}", original.display(), placed.display());
                    replaced += 1;
                }
                Err(e) => warn!("Could not replace {}: {}", original.display(), e),
            }
        }
        info!("♻️ Replaced {}/{} originals", replaced, results.len());
        replaced
    }

    /// Convert one image in its own directory and copy the result next to it.
    ///
    /// `WebPs/` is removed afterwards if it holds nothing but this output.
    pub async fn convert_single(&self, image: &Path, remove_original: bool) -> Result<PathBuf> {
        let path = match image.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => image.to_path_buf(),
            _ => self.layout.root().join(image),
        };
        let input = ImageFile::from_path(&path)
            .ok_or_else(|| ConvertError::UnsupportedFormat(image.display().to_string()))?;
        let dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        let layout = WorkDirLayout::new(&dir);

        let run_log = if self.config.logging {
            RunLog::init(&layout).await
        } else {
            RunLog::disabled()
        };
        let ctx = RunContext::new(
            self.config.clone(),
            layout.clone(),
            Arc::clone(&self.runner),
            run_log,
        );

        FileManager::make_dir(layout.output_dir()).await?;
        FileManager::make_dir(layout.scratch_dir()).await?;

        let mut log = ctx.run_log.worker("single");
        let result = ConversionEngine::new(&ctx).convert(&input, &mut log).await;
        FileManager::remove_dir(layout.scratch_dir()).await?;

        let Some(output) = result.output else {
            // nothing of ours in WebPs/, drop it only if the failure left it empty
            if FileManager::count_entries(layout.output_dir()).await? == 0 {
                FileManager::remove_dir(layout.output_dir()).await?;
            }
            return Err(anyhow::anyhow!("Conversion failed for {}", input.path().display()));
        };

        let placed = dir.join(format!("{}.webp", input.base_name()));
        tokio::fs::copy(&output, &placed).await.with_context(|| {
            format!("Failed to copy {} to {}", output.display(), placed.display())
        })?;
        if remove_original && placed != input.path() {
            tokio::fs::remove_file(input.path())
                .await
                .with_context(|| format!("Failed to remove {}", input.path().display()))?;
        }

        if FileManager::count_entries(layout.output_dir()).await? <= 1 {
            FileManager::remove_dir(layout.output_dir()).await?;
        }

        info!("✅ {} -> {}", input.display_name(), placed.display());
        Ok(placed)
    }

    /// Files a run would convert, optionally classified for extra metadata
    pub async fn list(&self, check_metadata: bool) -> Result<Vec<ListedImage>> {
        let files = self.discover()?;
        let ctx = self.service_context();
        let classifier = MetadataClassifier::new(&ctx);

        let mut listed = Vec::with_capacity(files.len());
        for file in files {
            let extra_metadata = if check_metadata {
                Some(classifier.has_extra_metadata(file.path()).await)
            } else {
                None
            };
            listed.push(ListedImage { file, extra_metadata });
        }
        Ok(listed)
    }

    /// Dump the metadata of one image, tagging every line as baseline or not
    pub async fn mdtest(&self, image: &Path) -> Result<Vec<TagLine>> {
        let ctx = self.service_context();
        let dump = MetadataClassifier::new(&ctx)
            .dump(image)
            .await
            .with_context(|| format!("Could not read metadata of {}", image.display()))?;
        Ok(describe_dump(&dump))
    }

    fn service_context(&self) -> RunContext {
        RunContext::new(
            self.config.clone(),
            self.layout.clone(),
            Arc::clone(&self.runner),
            RunLog::disabled(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{touch_all, MockRunner};
    use crate::tools::Tool;
    use tempfile::TempDir;

    fn quiet_config() -> Config {
        Config {
            logging: false,
            workers: 2,
            ..Default::default()
        }
    }

    fn converter(root: &Path, config: Config, runner: &MockRunner) -> WebpConverter {
        WebpConverter::new(root, config, Arc::new(runner.clone()))
            .unwrap()
            .with_progress(false)
    }

    #[tokio::test]
    async fn test_run_converts_and_cleans_scratch() {
        let temp = TempDir::new().unwrap();
        touch_all(temp.path(), &["a.png", "b.tiff", "c.tga"]);
        let runner = MockRunner::new().with_extra_metadata("b.tiff");

        let summary = converter(temp.path(), quiet_config(), &runner).run().await.unwrap();

        assert_eq!(summary.files_found, 3);
        assert_eq!(summary.converted, 3);
        assert_eq!(summary.metadata_transferred, 1);
        assert!(temp.path().join("WebPs/b.webp").exists());
        assert!(!temp.path().join("xmpdata_tmp").exists());
        assert!(!temp.path().join("WebpLogs").exists());
    }

    #[tokio::test]
    async fn test_run_without_images() {
        let temp = TempDir::new().unwrap();
        let runner = MockRunner::new();
        let summary = converter(temp.path(), quiet_config(), &runner).run().await.unwrap();

        assert_eq!(summary, RunSummary::default());
        assert!(!temp.path().join("WebPs").exists());
        assert!(runner.calls().is_empty());
    }

    #[tokio::test]
    async fn test_run_writes_worker_logs() {
        let temp = TempDir::new().unwrap();
        touch_all(temp.path(), &["a.png", "b.png"]);
        let runner = MockRunner::new().failing_encoder("b.png");
        let config = Config {
            logging: true,
            ..quiet_config()
        };

        converter(temp.path(), config, &runner).run().await.unwrap();

        let run_dirs: Vec<_> = std::fs::read_dir(temp.path().join("WebpLogs")).unwrap().collect();
        assert_eq!(run_dirs.len(), 1);
        let run_dir = run_dirs.into_iter().next().unwrap().unwrap().path();
        let worker1 = std::fs::read_to_string(run_dir.join("worker1.log")).unwrap();
        assert_eq!(worker1, "Converting b.png...FAILED\n");
        let errors = std::fs::read_to_string(run_dir.join("ErrorFiles.txt")).unwrap();
        assert!(errors.ends_with("b.png CONVERSION ERROR\n"));
    }

    #[tokio::test]
    async fn test_auto_replace_skips_failed_files() {
        let temp = TempDir::new().unwrap();
        touch_all(temp.path(), &["a.png", "b.tiff", "c.tga"]);
        let runner = MockRunner::new()
            .with_extra_metadata("c.tga")
            .failing_encoder("b.tiff")
            .failing_inject();
        let config = Config {
            auto_replace: true,
            ..quiet_config()
        };

        let summary = converter(temp.path(), config, &runner).run().await.unwrap();

        assert_eq!(summary.originals_replaced, 1);
        assert!(!temp.path().join("a.png").exists());
        assert!(temp.path().join("a.webp").exists());
        assert!(temp.path().join("b.tiff").exists());
        // metadata injection failed for c
        assert!(temp.path().join("c.tga").exists());
        assert!(!temp.path().join("c.webp").exists());
    }

    #[tokio::test]
    async fn test_recover_skips_converted_sources() {
        let temp = TempDir::new().unwrap();
        touch_all(temp.path(), &["a.png", "b.tiff"]);
        std::fs::create_dir(temp.path().join("WebPs")).unwrap();
        touch_all(&temp.path().join("WebPs"), &["a.webp"]);
        let runner = MockRunner::new();
        let config = Config {
            recover: true,
            ..quiet_config()
        };

        let summary = converter(temp.path(), config, &runner).run().await.unwrap();

        assert_eq!(summary.files_found, 2);
        assert_eq!(summary.files_pending, 1);
        assert_eq!(summary.converted, 1);
        assert_eq!(runner.count(Tool::Encoder), 1);
    }

    #[tokio::test]
    async fn test_convert_single_copies_next_to_original() {
        let temp = TempDir::new().unwrap();
        let image = touch_all(temp.path(), &["photo.png"]).remove(0);
        let runner = MockRunner::new();
        // the converter root is elsewhere; the image's own directory is used
        let other = TempDir::new().unwrap();

        let placed = converter(other.path(), quiet_config(), &runner)
            .convert_single(&image, true)
            .await
            .unwrap();

        assert_eq!(placed, temp.path().join("photo.webp"));
        assert!(placed.exists());
        assert!(!image.exists());
        assert!(!temp.path().join("WebPs").exists());
        assert!(!temp.path().join("xmpdata_tmp").exists());
    }

    #[tokio::test]
    async fn test_convert_single_keeps_busy_output_dir() {
        let temp = TempDir::new().unwrap();
        let image = touch_all(temp.path(), &["photo.png"]).remove(0);
        std::fs::create_dir(temp.path().join("WebPs")).unwrap();
        touch_all(&temp.path().join("WebPs"), &["older.webp"]);

        converter(temp.path(), quiet_config(), &MockRunner::new())
            .convert_single(&image, false)
            .await
            .unwrap();

        assert!(image.exists());
        assert!(temp.path().join("WebPs/photo.webp").exists());
    }

    #[tokio::test]
    async fn test_convert_single_failure() {
        let temp = TempDir::new().unwrap();
        let image = touch_all(temp.path(), &["photo.png"]).remove(0);
        let runner = MockRunner::new().failing_encoder("photo.png");

        let result = converter(temp.path(), quiet_config(), &runner)
            .convert_single(&image, true)
            .await;

        assert!(result.is_err());
        assert!(image.exists());
        assert!(!temp.path().join("WebPs").exists());
        assert!(!temp.path().join("xmpdata_tmp").exists());
    }

    #[tokio::test]
    async fn test_convert_single_failure_keeps_earlier_outputs() {
        let temp = TempDir::new().unwrap();
        let image = touch_all(temp.path(), &["photo.png"]).remove(0);
        std::fs::create_dir(temp.path().join("WebPs")).unwrap();
        touch_all(&temp.path().join("WebPs"), &["older.webp"]);
        let runner = MockRunner::new().failing_encoder("photo.png");

        let result = converter(temp.path(), quiet_config(), &runner)
            .convert_single(&image, false)
            .await;

        assert!(result.is_err());
        assert!(temp.path().join("WebPs/older.webp").exists());
    }

    #[tokio::test]
    async fn test_auto_replace_with_colliding_base_names() {
        let temp = TempDir::new().unwrap();
        touch_all(temp.path(), &["a.png", "a.tiff"]);
        let runner = MockRunner::new();
        let config = Config {
            auto_replace: true,
            ..quiet_config()
        };

        let summary = converter(temp.path(), config, &runner).run().await.unwrap();

        assert_eq!(summary.files_found, 2);
        assert_eq!(summary.files_pending, 1);
        assert_eq!(summary.originals_replaced, 1);
        assert_eq!(runner.count(Tool::Encoder), 1);
        assert!(!temp.path().join("a.png").exists());
        assert!(temp.path().join("a.webp").exists());
        assert!(temp.path().join("a.tiff").exists());
    }

    #[tokio::test]
    async fn test_list_with_metadata() {
        let temp = TempDir::new().unwrap();
        touch_all(temp.path(), &["a.png", "b.tiff", "d.webp"]);
        let runner = MockRunner::new().with_extra_metadata("b.tiff");

        let conv = converter(temp.path(), quiet_config(), &runner);
        let plain = conv.list(false).await.unwrap();
        assert_eq!(plain.len(), 2);
        assert_eq!(runner.count(Tool::MetadataDump), 0);

        let lines: Vec<String> = conv
            .list(true)
            .await
            .unwrap()
            .iter()
            .map(|l| l.to_line())
            .collect();
        assert_eq!(lines, vec!["\ta.png", "\tb.tiff + Extra Data"]);
    }

    #[tokio::test]
    async fn test_mdtest_tags_lines() {
        let temp = TempDir::new().unwrap();
        let image = touch_all(temp.path(), &["b.tiff"]).remove(0);
        let runner = MockRunner::new().with_extra_metadata("b.tiff");

        let lines = converter(temp.path(), quiet_config(), &runner)
            .mdtest(&image)
            .await
            .unwrap();

        assert!(lines.iter().any(|l| !l.is_default && l.line.starts_with("Artist")));
        assert_eq!(lines.iter().filter(|l| !l.is_default).count(), 1);
    }

    #[tokio::test]
    async fn test_mdtest_timeout_is_an_error() {
        let temp = TempDir::new().unwrap();
        let image = touch_all(temp.path(), &["b.tiff"]).remove(0);
        let runner = MockRunner::new().timing_out_dump("b.tiff");

        let result = converter(temp.path(), quiet_config(), &runner).mdtest(&image).await;
        assert!(result.is_err());
    }
}
