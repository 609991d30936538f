//! # Metadata Module
//!
//! Decide se un'immagine ha metadata "extra" e li trasferisce sul WebP convertito.
//!
//! ## Classificazione
//! `exiftool <file>` produce righe `Tag Name : value`. Ogni riga non vuota che
//! non inizia con uno dei tag di base (`DEFAULT_TAGS`) indica metadata extra.
//! Se la query fallisce (timeout, output non UTF-8, exit code != 0) il file è
//! considerato CON metadata, per non perderli silenziosamente.
//!
//! ## Trasferimento
//! `cwebp` passa solo il profilo ICC; EXIF/XMP fanno il giro via sidecar:
//! 1. `exiftool -u -U -P -a -z -tagsFromFile <src> xmpdata_tmp/<base>.xmp`
//! 2. `webpmux -set xmp xmpdata_tmp/<base>.xmp <out> -o <out>`
//!
//! Un errore in uno dei due passi viene loggato e il trasferimento si ferma,
//! senza interrompere la run.

use std::fmt;
use std::io;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, warn};

use crate::args;
use crate::converter::RunContext;
use crate::file_manager::ImageFile;
use crate::run_log::{ErrorKind, Outcome, Step, WorkerLog};
use crate::tools::{Tool, ToolInvocation, ToolStatus};

/// Tags every image carries; only lines outside this table count as extra metadata
pub const DEFAULT_TAGS: [&str; 20] = [
    "ExifTool Version Number",
    "File Name",
    "Directory",
    "File Size",
    "File Modification Date/Time",
    "File Access Date/Time",
    "File Creation Date/Time",
    "File Permissions",
    "File Type",
    "File Type Extension",
    "MIME Type",
    "Image Width",
    "Image Height",
    "Bit Depth",
    "Color Type",
    "Compression",
    "Filter",
    "Interlace",
    "Image Size",
    "Megapixels",
];

/// Whether a file's metadata should be carried over
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetadataVerdict {
    ForceTrue,
    ForceFalse,
    Computed(bool),
}

impl MetadataVerdict {
    pub fn forced(value: bool) -> Self {
        if value {
            Self::ForceTrue
        } else {
            Self::ForceFalse
        }
    }

    pub fn has_extra(&self) -> bool {
        match self {
            Self::ForceTrue => true,
            Self::ForceFalse => false,
            Self::Computed(value) => *value,
        }
    }
}

/// True when a dump line is one of the baseline tags
pub fn is_default_line(line: &str) -> bool {
    DEFAULT_TAGS.iter().any(|tag| line.starts_with(tag))
}

/// Classify a metadata dump: true as soon as one non-empty line is not a baseline tag
pub fn dump_has_extra_metadata(dump: &str) -> bool {
    dump.lines().any(|line| !line.is_empty() && !is_default_line(line))
}

/// One non-empty dump line and whether it is a baseline tag
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagLine {
    pub line: String,
    pub is_default: bool,
}

impl fmt::Display for TagLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = if self.is_default { "DEFAULT" } else { "NOT DEFAULT" };
        write!(f, "{}: {}", label, self.line)
    }
}

/// Line-by-line breakdown of a dump
pub fn describe_dump(dump: &str) -> Vec<TagLine> {
    dump.lines()
        .filter(|line| !line.is_empty())
        .map(|line| TagLine {
            line: line.to_string(),
            is_default: is_default_line(line),
        })
        .collect()
}

/// Why a metadata dump could not be obtained
#[derive(Debug)]
pub enum DumpFailure {
    TimedOut(Duration),
    Exited(Option<i32>),
    Undecodable,
    Spawn(io::Error),
}

impl fmt::Display for DumpFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TimedOut(limit) => write!(f, "metadata dump timed out after {:?}", limit),
            Self::Exited(code) => write!(f, "exiftool exited with {:?}", code),
            Self::Undecodable => f.write_str("metadata dump is not valid UTF-8"),
            Self::Spawn(e) => write!(f, "could not run exiftool: {}", e),
        }
    }
}

impl std::error::Error for DumpFailure {}

/// Decides whether a file carries metadata worth preserving
pub struct MetadataClassifier<'a> {
    ctx: &'a RunContext,
}

impl<'a> MetadataClassifier<'a> {
    pub fn new(ctx: &'a RunContext) -> Self {
        Self { ctx }
    }

    /// Operator override if set, otherwise the dump heuristic
    pub async fn verdict(&self, file: &Path) -> MetadataVerdict {
        if let Some(forced) = self.ctx.config.metadata_override() {
            return forced;
        }

        match self.dump(file).await {
            Ok(text) => MetadataVerdict::Computed(dump_has_extra_metadata(&text)),
            Err(failure) => {
                warn!("{} for {}, assuming extra metadata", failure, file.display());
                self.ctx.errors.record(ErrorKind::MetadataDetection, file).await;
                MetadataVerdict::Computed(true)
            }
        }
    }

    pub async fn has_extra_metadata(&self, file: &Path) -> bool {
        self.verdict(file).await.has_extra()
    }

    /// Raw `exiftool` dump of a file, bounded by the configured timeout
    pub async fn dump(&self, file: &Path) -> Result<String, DumpFailure> {
        let limit = Duration::from_secs(self.ctx.config.metadata_timeout_secs);
        let invocation = ToolInvocation::new(Tool::MetadataDump, args![file.display()])
            .capturing_stdout()
            .with_timeout(limit);

        let output = self.ctx.runner.run(&invocation).await.map_err(DumpFailure::Spawn)?;
        match output.status {
            ToolStatus::TimedOut => Err(DumpFailure::TimedOut(limit)),
            ToolStatus::Exited(Some(0)) => {
                String::from_utf8(output.stdout).map_err(|_| DumpFailure::Undecodable)
            }
            ToolStatus::Exited(code) => Err(DumpFailure::Exited(code)),
        }
    }
}

/// Moves metadata from a source image onto its converted output
pub struct MetadataTransfer<'a> {
    ctx: &'a RunContext,
}

impl<'a> MetadataTransfer<'a> {
    pub fn new(ctx: &'a RunContext) -> Self {
        Self { ctx }
    }

    /// Returns whether both steps succeeded. Failures are logged, never raised.
    pub async fn transfer(&self, source: &ImageFile, output: &Path, log: &mut WorkerLog) -> bool {
        let sidecar = self.ctx.layout.sidecar_path_for(source);
        // exiftool refuses to overwrite an existing sidecar
        match tokio::fs::remove_file(&sidecar).await {
            Ok(()) => debug!("Removed stale sidecar {}", sidecar.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!("Could not remove stale sidecar {}: {}", sidecar.display(), e),
        }

        log.start(Step::MetadataFetch, source.path()).await;
        let extract = ToolInvocation::new(
            Tool::MetadataExtract,
            args![
                "-u",
                "-U",
                "-P",
                "-a",
                "-z",
                "-tagsFromFile",
                source.path().display(),
                sidecar.display(),
            ],
        );
        if !self.run_step(&extract).await {
            log.finish(Outcome::Failed).await;
            self.ctx.errors.record(ErrorKind::MetadataExtraction, source.path()).await;
            return false;
        }
        log.finish(Outcome::Succeeded).await;

        log.start(Step::MetadataMerge, source.path()).await;
        let inject = ToolInvocation::new(
            Tool::MetadataInject,
            args!["-set", "xmp", sidecar.display(), output.display(), "-o", output.display()],
        );
        if !self.run_step(&inject).await {
            log.finish(Outcome::Failed).await;
            self.ctx.errors.record(ErrorKind::MetadataInsertion, source.path()).await;
            return false;
        }
        log.finish(Outcome::Succeeded).await;

        debug!("Metadata transferred: {} -> {}", source.path().display(), output.display());
        true
    }

    async fn run_step(&self, invocation: &ToolInvocation) -> bool {
        match self.ctx.runner.run(invocation).await {
            Ok(output) => output.success(),
            Err(e) => {
                warn!("Could not run {}: {}", invocation.tool, e);
                false
            }
        }
    }
}
