//! # Work Partitioning
//!
//! Assegnazione statica round-robin dei file ai worker, decisa una sola volta
//! prima del dispatch.

use crate::file_manager::ImageFile;

/// Ordered files owned by exactly one worker
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkPartition {
    worker_id: usize,
    files: Vec<ImageFile>,
}

impl WorkPartition {
    pub fn worker_id(&self) -> usize {
        self.worker_id
    }

    /// Name used for the worker's log stream
    pub fn worker_name(&self) -> String {
        format!("worker{}", self.worker_id)
    }

    pub fn files(&self) -> &[ImageFile] {
        &self.files
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// Split `files` across `workers` partitions: file `i` goes to partition `i % workers`.
/// Always returns `max(workers, 1)` partitions, some possibly empty.
pub fn partition(files: Vec<ImageFile>, workers: usize) -> Vec<WorkPartition> {
    let workers = workers.max(1);
    let mut partitions: Vec<WorkPartition> = (0..workers)
        .map(|worker_id| WorkPartition {
            worker_id,
            files: Vec::with_capacity(files.len() / workers + 1),
        })
        .collect();

    for (i, file) in files.into_iter().enumerate() {
        partitions[i % workers].files.push(file);
    }
    partitions
}
