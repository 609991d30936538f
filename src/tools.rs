//! # External Tool Invocation
//!
//! Every external process goes through a [`CommandRunner`]. The production
//! runner spawns real binaries with `tokio::process`; tests substitute a mock
//! that fakes `cwebp`/`exiftool`/`webpmux` behaviour.

use futures::future::BoxFuture;
use std::fmt;
use std::io;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::ConvertError;
use crate::tool_resolver::ToolPathResolver;

/// The roles an external binary plays in a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tool {
    /// `cwebp`: image → lossless WebP
    Encoder,
    /// `exiftool <file>`: line-oriented `Tag Name: value` dump
    MetadataDump,
    /// `exiftool -tagsFromFile`: source tags → sidecar file
    MetadataExtract,
    /// `webpmux -set xmp`: sidecar → WebP, in place
    MetadataInject,
}

impl Tool {
    pub fn binary_name(&self) -> &'static str {
        match self {
            Self::Encoder => "cwebp",
            Self::MetadataDump | Self::MetadataExtract => "exiftool",
            Self::MetadataInject => "webpmux",
        }
    }
}

impl fmt::Display for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.binary_name())
    }
}

/// One external process to run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolInvocation {
    pub tool: Tool,
    pub args: Vec<String>,
    /// Capture stdout instead of discarding it
    pub capture_stdout: bool,
    /// Kill the process after this long; `None` waits indefinitely
    pub timeout: Option<Duration>,
}

impl ToolInvocation {
    pub fn new(tool: Tool, args: Vec<String>) -> Self {
        Self {
            tool,
            args,
            capture_stdout: false,
            timeout: None,
        }
    }

    pub fn capturing_stdout(mut self) -> Self {
        self.capture_stdout = true;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// How an external process ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolStatus {
    /// Exit code, `None` when terminated by a signal
    Exited(Option<i32>),
    TimedOut,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOutput {
    pub status: ToolStatus,
    pub stdout: Vec<u8>,
}

impl ToolOutput {
    pub fn exited(code: i32) -> Self {
        Self {
            status: ToolStatus::Exited(Some(code)),
            stdout: Vec::new(),
        }
    }

    pub fn with_stdout(mut self, stdout: impl Into<Vec<u8>>) -> Self {
        self.stdout = stdout.into();
        self
    }

    pub fn timed_out() -> Self {
        Self {
            status: ToolStatus::TimedOut,
            stdout: Vec::new(),
        }
    }

    pub fn success(&self) -> bool {
        self.status == ToolStatus::Exited(Some(0))
    }
}

/// Seam between the pipeline and the operating system's processes
pub trait CommandRunner: Send + Sync {
    /// Run the invocation to completion (or timeout). `Err` means the process
    /// could not be spawned or waited on at all.
    fn run<'a>(&'a self, invocation: &'a ToolInvocation) -> BoxFuture<'a, io::Result<ToolOutput>>;
}

/// Runs the real binaries
#[derive(Debug, Clone, Default)]
pub struct SystemRunner {
    resolver: ToolPathResolver,
}

impl SystemRunner {
    pub fn new(tools_dir: Option<PathBuf>) -> Self {
        Self {
            resolver: ToolPathResolver::new(tools_dir),
        }
    }

    pub fn resolver(&self) -> &ToolPathResolver {
        &self.resolver
    }

    /// Fail when the encoder is missing; warn for the metadata tools, whose
    /// absence only costs metadata preservation.
    pub fn check_dependencies(&self) -> Result<(), ConvertError> {
        if let Err(msg) = self.resolver.check_tool_with_instructions(Tool::Encoder.binary_name()) {
            return Err(ConvertError::MissingDependency(msg));
        }

        for tool in self.resolver.missing_tools() {
            warn!("⚠️ {} not available, metadata will not be preserved", tool);
        }
        Ok(())
    }

    async fn run_process(&self, invocation: &ToolInvocation) -> io::Result<ToolOutput> {
        let program = self
            .resolver
            .resolve_tool(invocation.tool.binary_name())
            .unwrap_or_else(|| PathBuf::from(invocation.tool.binary_name()));

        debug!("Running {:?} {:?}", program, invocation.args);
        let start_time = Instant::now();

        let child = Command::new(&program)
            .args(&invocation.args)
            .stdin(Stdio::null())
            .stdout(if invocation.capture_stdout { Stdio::piped() } else { Stdio::null() })
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()?;

        let waited = match invocation.timeout {
            Some(limit) => match tokio::time::timeout(limit, child.wait_with_output()).await {
                Ok(result) => result?,
                Err(_) => {
                    // dropping the future kills the child
                    warn!("{} timed out after {:?}", invocation.tool, limit);
                    return Ok(ToolOutput::timed_out());
                }
            },
            None => child.wait_with_output().await?,
        };

        debug!(
            "{} exited with {:?} in {:?}",
            invocation.tool,
            waited.status.code(),
            start_time.elapsed()
        );

        Ok(ToolOutput {
            status: ToolStatus::Exited(waited.status.code()),
            stdout: waited.stdout,
        })
    }
}

impl CommandRunner for SystemRunner {
    fn run<'a>(&'a self, invocation: &'a ToolInvocation) -> BoxFuture<'a, io::Result<ToolOutput>> {
        Box::pin(self.run_process(invocation))
    }
}
