//! # Run Context
//!
//! Stato condiviso da tutti i worker di una run: configurazione immutabile,
//! contatori atomici, log e runner dei tool esterni. Passato per riferimento
//! (`Arc`) a ogni worker al posto di variabili globali.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::config::Config;
use crate::file_manager::WorkDirLayout;
use crate::run_log::{ErrorLog, RunLog};
use crate::tools::CommandRunner;

/// Monotonic counters shared between workers and the progress reporter
#[derive(Debug, Default)]
pub struct RunCounters {
    images_completed: AtomicUsize,
    images_failed: AtomicUsize,
    workers_finished: AtomicUsize,
}

impl RunCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn image_completed(&self) {
        self.images_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn image_failed(&self) {
        self.images_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn worker_finished(&self) {
        self.workers_finished.fetch_add(1, Ordering::AcqRel);
    }

    pub fn images_completed(&self) -> usize {
        self.images_completed.load(Ordering::Relaxed)
    }

    pub fn images_failed(&self) -> usize {
        self.images_failed.load(Ordering::Relaxed)
    }

    /// Images a worker is done with, whatever the outcome
    pub fn images_processed(&self) -> usize {
        self.images_completed() + self.images_failed()
    }

    pub fn workers_finished(&self) -> usize {
        self.workers_finished.load(Ordering::Acquire)
    }
}

/// Everything a worker needs, shared read-only apart from the counters and error log
pub struct RunContext {
    pub config: Config,
    pub layout: WorkDirLayout,
    pub runner: Arc<dyn CommandRunner>,
    pub counters: RunCounters,
    pub run_log: RunLog,
    pub errors: ErrorLog,
}

impl RunContext {
    pub fn new(
        config: Config,
        layout: WorkDirLayout,
        runner: Arc<dyn CommandRunner>,
        run_log: RunLog,
    ) -> Self {
        let errors = run_log.error_log();
        Self {
            config,
            layout,
            runner,
            counters: RunCounters::new(),
            run_log,
            errors,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_counters_are_not_lost_across_threads() {
        let counters = Arc::new(RunCounters::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let counters = Arc::clone(&counters);
                thread::spawn(move || {
                    for _ in 0..1000 {
                        counters.image_completed();
                    }
                    counters.image_failed();
                    counters.worker_finished();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(counters.images_completed(), 8000);
        assert_eq!(counters.images_failed(), 8);
        assert_eq!(counters.images_processed(), 8008);
        assert_eq!(counters.workers_finished(), 8);
    }
}
