//! # Run Log Module
//!
//! Log append-only di una run di conversione.
//!
//! ## Responsabilità:
//! - Un file di log per worker in `WebpLogs/<M-D_h-m-s>/<worker>.log`
//! - `ErrorFiles.txt` condiviso con una riga per file fallito e categoria
//! - Fallback su `tracing` (stdout) se la directory di log non è creabile
//! - Conserva le `LogEntry` in memoria per l'auto-replace a fine run
//!
//! Ogni worker possiede il proprio `WorkerLog`, quindi nessuna contesa sulle
//! scritture; solo l'`ErrorLog` è condiviso ed è protetto da un mutex.
//!
//! ## Formato per-worker:
//! ```text
//! Converting a.png...FINISHED
//! Converting b.tiff...FINISHED
//! Getting EXIF data...FINISHED
//! Merging EXIF data...FAILED
//! ```

use std::fmt;
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::file_manager::{FileManager, WorkDirLayout};

/// Name of the shared error listing inside the run's log directory
pub const ERROR_FILE: &str = "ErrorFiles.txt";

/// A unit of work that is logged with a start marker and an outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Conversion,
    MetadataFetch,
    MetadataMerge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Succeeded,
    Failed,
}

/// Everything a worker can write to its log
#[derive(Debug, Clone, Copy)]
pub enum LogEvent<'a> {
    ConversionStarted(&'a Path),
    MetadataFetchStarted(&'a Path),
    MetadataMergeStarted(&'a Path),
    Succeeded(&'a Path),
    Failed(&'a Path),
}

impl<'a> LogEvent<'a> {
    fn started(step: Step, file: &'a Path) -> Self {
        match step {
            Step::Conversion => Self::ConversionStarted(file),
            Step::MetadataFetch => Self::MetadataFetchStarted(file),
            Step::MetadataMerge => Self::MetadataMergeStarted(file),
        }
    }

    fn finished(outcome: Outcome, file: &'a Path) -> Self {
        match outcome {
            Outcome::Succeeded => Self::Succeeded(file),
            Outcome::Failed => Self::Failed(file),
        }
    }

    /// Text appended to a worker's log file
    fn file_text(&self) -> String {
        match self {
            Self::ConversionStarted(file) => format!("Converting {}...", file_label(file)),
            Self::MetadataFetchStarted(_) => "Getting EXIF data...".to_string(),
            Self::MetadataMergeStarted(_) => "Merging EXIF data...".to_string(),
            Self::Succeeded(_) => "FINISHED\n".to_string(),
            Self::Failed(_) => "FAILED\n".to_string(),
        }
    }

    /// Self-contained line for console logging
    fn console_text(&self) -> String {
        match self {
            Self::ConversionStarted(file) => format!("Converting {}...", file_label(file)),
            Self::MetadataFetchStarted(file) => {
                format!("Getting EXIF data from {}...", file_label(file))
            }
            Self::MetadataMergeStarted(file) => {
                format!("Merging EXIF data from {}...", file_label(file))
            }
            Self::Succeeded(file) => format!("FINISHED {}", file_label(file)),
            Self::Failed(file) => format!("FAILED WORK ON {}", file_label(file)),
        }
    }
}

fn file_label(file: &Path) -> String {
    file.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| file.display().to_string())
}

/// One completed step of one worker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub worker: String,
    pub step: Step,
    pub file: PathBuf,
    pub outcome: Outcome,
}

/// Where log output goes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogTarget {
    /// Only in-memory entries and `tracing` debug events
    Disabled,
    /// Per-worker files inside this directory
    Directory(PathBuf),
    /// Directory could not be created, events go to `tracing` at info level
    Stdout,
}

/// Log of one run, hands out per-worker streams
#[derive(Debug, Clone)]
pub struct RunLog {
    target: LogTarget,
}

impl RunLog {
    pub fn disabled() -> Self {
        Self { target: LogTarget::Disabled }
    }

    pub fn with_target(target: LogTarget) -> Self {
        Self { target }
    }

    /// Create `WebpLogs/<M-D_h-m-s>/`; on failure log to stdout instead
    pub async fn init(layout: &WorkDirLayout) -> Self {
        let stamp = chrono::Local::now().format("%-m-%-d_%-H-%-M-%-S").to_string();
        let dir = layout.log_root().join(stamp);

        match FileManager::make_dir(&dir).await {
            Ok(()) => {
                info!("Log system initialized in {}", dir.display());
                Self { target: LogTarget::Directory(dir) }
            }
            Err(e) => {
                warn!("Log folder could not be created ({}), will be logging to stdout", e);
                Self { target: LogTarget::Stdout }
            }
        }
    }

    pub fn target(&self) -> &LogTarget {
        &self.target
    }

    pub fn directory(&self) -> Option<&Path> {
        match self.target {
            LogTarget::Directory(ref dir) => Some(dir),
            _ => None,
        }
    }

    /// A log stream owned by a single worker
    pub fn worker(&self, name: impl Into<String>) -> WorkerLog {
        WorkerLog {
            name: name.into(),
            target: self.target.clone(),
            file: None,
            open_step: None,
            entries: Vec::new(),
        }
    }

    /// The error listing shared by all workers of this run
    pub fn error_log(&self) -> ErrorLog {
        ErrorLog::new(self.directory().map(|dir| dir.join(ERROR_FILE)))
    }
}

/// Append-only log stream of one worker
#[derive(Debug)]
pub struct WorkerLog {
    name: String,
    target: LogTarget,
    file: Option<File>,
    open_step: Option<(Step, PathBuf)>,
    entries: Vec<LogEntry>,
}

impl WorkerLog {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Write the start marker of a step
    pub async fn start(&mut self, step: Step, file: &Path) {
        if let Some((pending, path)) = self.open_step.take() {
            debug!("[{}] step {:?} on {} never finished", self.name, pending, path.display());
        }
        self.emit(LogEvent::started(step, file)).await;
        self.open_step = Some((step, file.to_path_buf()));
    }

    /// Close the open step with its outcome
    pub async fn finish(&mut self, outcome: Outcome) {
        let Some((step, file)) = self.open_step.take() else {
            debug!("[{}] {:?} without a started step", self.name, outcome);
            return;
        };
        self.emit(LogEvent::finished(outcome, &file)).await;
        self.entries.push(LogEntry {
            worker: self.name.clone(),
            step,
            file,
            outcome,
        });
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<LogEntry> {
        self.entries
    }

    async fn emit(&mut self, event: LogEvent<'_>) {
        match self.target {
            LogTarget::Disabled => debug!(worker = %self.name, "{}", event.console_text()),
            LogTarget::Stdout => info!(worker = %self.name, "{}", event.console_text()),
            LogTarget::Directory(ref dir) => {
                let path = dir.join(format!("{}.log", self.name));
                if let Err(e) = Self::append(&mut self.file, &path, &event.file_text()).await {
                    warn!("Could not write to {}: {}", path.display(), e);
                }
            }
        }
    }

    async fn append(file: &mut Option<File>, path: &Path, text: &str) -> std::io::Result<()> {
        if file.is_none() {
            let opened = OpenOptions::new().create(true).append(true).open(path).await?;
            *file = Some(opened);
        }
        if let Some(f) = file.as_mut() {
            f.write_all(text.as_bytes()).await?;
            f.flush().await?;
        }
        Ok(())
    }
}

/// Failure categories of the error listing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Conversion,
    MetadataExtraction,
    MetadataInsertion,
    MetadataDetection,
}

impl ErrorKind {
    fn label(&self) -> &'static str {
        match self {
            Self::Conversion => "CONVERSION ERROR",
            Self::MetadataExtraction => "METADATA EXTRACTION ERROR",
            Self::MetadataInsertion => "METADATA INSERTIONS ERROR",
            Self::MetadataDetection => "METADATA DETECTION ERROR",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorRecord {
    pub kind: ErrorKind,
    pub file: PathBuf,
}

impl ErrorRecord {
    /// `<path> <CATEGORY>`
    pub fn to_line(&self) -> String {
        format!("{} {}", self.file.display(), self.kind)
    }
}

/// Shared, append-only error listing
#[derive(Debug)]
pub struct ErrorLog {
    path: Option<PathBuf>,
    records: Mutex<Vec<ErrorRecord>>,
}

impl ErrorLog {
    pub fn new(path: Option<PathBuf>) -> Self {
        Self {
            path,
            records: Mutex::new(Vec::new()),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub async fn record(&self, kind: ErrorKind, file: &Path) {
        let record = ErrorRecord {
            kind,
            file: file.to_path_buf(),
        };
        warn!("{}", record.to_line());

        let mut records = self.records.lock().await;
        if let Some(ref path) = self.path {
            if let Err(e) = Self::append_line(path, &record.to_line()).await {
                warn!("Could not write to {}: {}", path.display(), e);
            }
        }
        records.push(record);
    }

    pub async fn records(&self) -> Vec<ErrorRecord> {
        self.records.lock().await.clone()
    }

    /// Whether any failure was recorded for `file`
    pub async fn has_errors_for(&self, file: &Path) -> bool {
        self.records.lock().await.iter().any(|r| r.file == file)
    }

    async fn append_line(path: &Path, line: &str) -> std::io::Result<()> {
        let mut file = OpenOptions::new().create(true).append(true).open(path).await?;
        file.write_all(format!("{}\n", line).as_bytes()).await?;
        file.flush().await
    }
}
