//! # Converter Module
//!
//! Pipeline di conversione suddivisa in sottomoduli:
//! - `context`: Stato condiviso della run (config, contatori, log, runner)
//! - `partition`: Suddivisione round-robin dei file tra i worker
//! - `engine`: Conversione di un singolo file
//! - `pool`: Worker pool e progress sampling
//! - `recovery`: Riconciliazione con una run precedente
//! - `pipeline`: Orchestratore principale

pub mod context;
pub mod engine;
pub mod partition;
pub mod pipeline;
pub mod pool;
pub mod recovery;

pub use context::{RunContext, RunCounters};
pub use engine::{ConversionEngine, ConversionResult};
pub use partition::{partition, WorkPartition};
pub use pipeline::{ListedImage, WebpConverter};
pub use pool::{PoolOutcome, WorkerPool};
pub use recovery::{MetadataRecoveryReport, PendingReport, RecoveryReconciler};
