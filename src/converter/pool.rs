//! # Worker Pool
//!
//! Un task tokio per partizione. Ogni worker converte i propri file in
//! sequenza; i worker girano in parallelo tra loro. Il completamento si
//! rileva con il join di tutti gli handle, mentre un task separato campiona i
//! contatori ogni 100ms solo per la progress bar.

use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::converter::engine::{ConversionEngine, ConversionResult};
use crate::converter::partition::WorkPartition;
use crate::converter::RunContext;
use crate::progress::{ProgressManager, PROGRESS_TICK};
use crate::run_log::LogEntry;

/// Everything the workers produced
#[derive(Debug, Default)]
pub struct PoolOutcome {
    pub results: Vec<ConversionResult>,
    pub entries: Vec<LogEntry>,
}

impl PoolOutcome {
    pub fn converted(&self) -> usize {
        self.results.iter().filter(|r| r.succeeded()).count()
    }

    pub fn failed(&self) -> usize {
        self.results.iter().filter(|r| !r.succeeded()).count()
    }

    pub fn metadata_transferred(&self) -> usize {
        self.results.iter().filter(|r| r.metadata_transferred).count()
    }
}

struct WorkerOutcome {
    results: Vec<ConversionResult>,
    entries: Vec<LogEntry>,
}

/// Fixed pool of workers, one static partition each
pub struct WorkerPool {
    ctx: Arc<RunContext>,
    show_progress: bool,
}

impl WorkerPool {
    pub fn new(ctx: Arc<RunContext>) -> Self {
        Self {
            ctx,
            show_progress: true,
        }
    }

    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    /// Run every partition to completion. A worker that panics is reported and
    /// its results are lost; the other workers are unaffected.
    pub async fn run(&self, partitions: Vec<WorkPartition>) -> PoolOutcome {
        let total: usize = partitions.iter().map(|p| p.len()).sum();
        info!("🔧 Dispatching {} images to {} workers", total, partitions.len());

        let progress = if self.show_progress {
            ProgressManager::new(total as u64, "Converting images")
        } else {
            ProgressManager::hidden(total as u64)
        };
        let (stop_tx, stop_rx) = oneshot::channel();
        let reporter = tokio::spawn(Self::report_progress(
            Arc::clone(&self.ctx),
            progress.clone(),
            stop_rx,
        ));

        let handles: Vec<JoinHandle<WorkerOutcome>> = partitions
            .into_iter()
            .map(|partition| tokio::spawn(Self::run_worker(Arc::clone(&self.ctx), partition)))
            .collect();

        let mut outcome = PoolOutcome::default();
        for joined in futures::future::join_all(handles).await {
            match joined {
                Ok(worker) => {
                    outcome.results.extend(worker.results);
                    outcome.entries.extend(worker.entries);
                }
                Err(e) => error!("Worker terminated abnormally: {}", e),
            }
        }

        let _ = stop_tx.send(());
        if let Err(e) = reporter.await {
            debug!("Progress reporter ended abnormally: {}", e);
        }
        progress.finish(&format!(
            "Converting Image ({}/{})",
            self.ctx.counters.images_processed(),
            total
        ));

        outcome
    }

    async fn run_worker(ctx: Arc<RunContext>, partition: WorkPartition) -> WorkerOutcome {
        let engine = ConversionEngine::new(&ctx);
        let mut log = ctx.run_log.worker(partition.worker_name());
        let mut results = Vec::with_capacity(partition.len());

        for file in partition.files() {
            let result = engine.convert(file, &mut log).await;
            if result.succeeded() {
                ctx.counters.image_completed();
            } else {
                ctx.counters.image_failed();
            }
            results.push(result);
        }

        ctx.counters.worker_finished();
        debug!("{} finished {} images", log.name(), results.len());

        WorkerOutcome {
            results,
            entries: log.into_entries(),
        }
    }

    async fn report_progress(
        ctx: Arc<RunContext>,
        progress: ProgressManager,
        mut stop: oneshot::Receiver<()>,
    ) {
        let mut ticker = tokio::time::interval(PROGRESS_TICK);
        loop {
            tokio::select! {
                _ = ticker.tick() => progress.set_position(ctx.counters.images_processed() as u64),
                _ = &mut stop => break,
            }
        }
        progress.set_position(ctx.counters.images_processed() as u64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::converter::partition::partition;
    use crate::file_manager::ImageFile;
    use crate::test_support::{context_with, MockRunner};
    use crate::tools::Tool;
    use tempfile::TempDir;

    fn images(dir: &std::path::Path, names: &[&str]) -> Vec<ImageFile> {
        names
            .iter()
            .map(|n| ImageFile::from_path(dir.join(n)).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn test_pool_converts_every_partition() {
        let temp = TempDir::new().unwrap();
        let runner = MockRunner::new();
        let ctx = Arc::new(context_with(temp.path(), Config::default(), runner.clone()));
        let files = images(temp.path(), &["a.png", "b.tiff", "c.tga", "d.png", "e.tif"]);

        let outcome = WorkerPool::new(Arc::clone(&ctx))
            .with_progress(false)
            .run(partition(files, 3))
            .await;

        assert_eq!(outcome.converted(), 5);
        assert_eq!(outcome.failed(), 0);
        assert_eq!(ctx.counters.images_completed(), 5);
        assert_eq!(ctx.counters.workers_finished(), 3);
        assert_eq!(runner.count(Tool::Encoder), 5);
        assert_eq!(outcome.entries.len(), 5);
    }

    #[tokio::test]
    async fn test_failure_does_not_stop_worker() {
        let temp = TempDir::new().unwrap();
        let runner = MockRunner::new().failing_encoder("a.png");
        let ctx = Arc::new(context_with(temp.path(), Config::default(), runner));
        // single worker: the failing file comes first in its partition
        let files = images(temp.path(), &["a.png", "b.png", "c.png"]);

        let outcome = WorkerPool::new(Arc::clone(&ctx))
            .with_progress(false)
            .run(partition(files, 1))
            .await;

        assert_eq!(outcome.converted(), 2);
        assert_eq!(outcome.failed(), 1);
        assert_eq!(ctx.counters.images_completed(), 2);
        assert_eq!(ctx.counters.images_failed(), 1);
        assert_eq!(ctx.counters.workers_finished(), 1);
    }

    #[tokio::test]
    async fn test_partition_order_within_worker() {
        let temp = TempDir::new().unwrap();
        let runner = MockRunner::new();
        let ctx = Arc::new(context_with(temp.path(), Config::default(), runner.clone()));
        let files = images(temp.path(), &["a.png", "b.png", "c.png", "d.png"]);

        let outcome = WorkerPool::new(Arc::clone(&ctx))
            .with_progress(false)
            .run(partition(files, 2))
            .await;

        let worker0: Vec<&str> = outcome
            .entries
            .iter()
            .filter(|e| e.worker == "worker0")
            .map(|e| e.file.file_name().unwrap().to_str().unwrap())
            .collect();
        assert_eq!(worker0, vec!["a.png", "c.png"]);
    }

    #[tokio::test]
    async fn test_empty_pool() {
        let temp = TempDir::new().unwrap();
        let ctx = Arc::new(context_with(temp.path(), Config::default(), MockRunner::new()));
        let outcome = WorkerPool::new(Arc::clone(&ctx))
            .with_progress(false)
            .run(partition(Vec::new(), 4))
            .await;
        assert!(outcome.results.is_empty());
        assert_eq!(ctx.counters.workers_finished(), 4);
    }
}
