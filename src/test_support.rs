//! Shared test utilities: a scripted stand-in for `cwebp`, `exiftool` and `webpmux`.
//!
//! The mock keys everything on file names:
//! - the encoder writes a placeholder `.webp` unless told to fail for that input
//! - the dump reports baseline tags, plus an `Artist` line for files marked
//!   as carrying extra metadata
//! - a successful injection marks the output as carrying extra metadata

use futures::future::BoxFuture;
use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::config::Config;
use crate::converter::RunContext;
use crate::file_manager::WorkDirLayout;
use crate::run_log::RunLog;
use crate::tools::{CommandRunner, Tool, ToolInvocation, ToolOutput};

pub const BASELINE_DUMP: &str = "ExifTool Version Number         : 12.40\n\
File Name                       : image\n\
Directory                       : .\n\
File Size                       : 1 kB\n\
MIME Type                       : image/png\n\
Image Width                     : 1\n\
Image Height                    : 1\n";

#[derive(Default)]
struct MockState {
    calls: Vec<ToolInvocation>,
    extra_metadata: HashSet<String>,
    failing_encoder: HashSet<String>,
    timing_out: HashSet<String>,
    undecodable: HashSet<String>,
    failing_dump: HashSet<String>,
    failing_extract: bool,
    failing_inject: bool,
}

#[derive(Clone, Default)]
pub struct MockRunner {
    state: Arc<Mutex<MockState>>,
}

fn name_of(arg: &str) -> String {
    Path::new(arg)
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}

impl MockRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_extra_metadata(self, file_name: &str) -> Self {
        self.state.lock().unwrap().extra_metadata.insert(file_name.to_string());
        self
    }

    pub fn failing_encoder(self, file_name: &str) -> Self {
        self.state.lock().unwrap().failing_encoder.insert(file_name.to_string());
        self
    }

    pub fn timing_out_dump(self, file_name: &str) -> Self {
        self.state.lock().unwrap().timing_out.insert(file_name.to_string());
        self
    }

    /// The dump of `file_name` is not valid UTF-8
    pub fn undecodable_dump(self, file_name: &str) -> Self {
        self.state.lock().unwrap().undecodable.insert(file_name.to_string());
        self
    }

    /// exiftool exits with 1 when dumping `file_name`
    pub fn failing_dump(self, file_name: &str) -> Self {
        self.state.lock().unwrap().failing_dump.insert(file_name.to_string());
        self
    }

    pub fn failing_extract(self) -> Self {
        self.state.lock().unwrap().failing_extract = true;
        self
    }

    pub fn failing_inject(self) -> Self {
        self.state.lock().unwrap().failing_inject = true;
        self
    }

    pub fn calls(&self) -> Vec<ToolInvocation> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn count(&self, tool: Tool) -> usize {
        self.calls().iter().filter(|c| c.tool == tool).count()
    }

    /// File names the metadata transfer was extracted from, in call order
    pub fn extracted_from(&self) -> Vec<String> {
        self.calls()
            .iter()
            .filter(|c| c.tool == Tool::MetadataExtract)
            .map(|c| name_of(&c.args[c.args.len() - 2]))
            .collect()
    }

    fn respond(&self, invocation: &ToolInvocation) -> io::Result<ToolOutput> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(invocation.clone());
        let last = invocation.args.last().cloned().unwrap_or_default();

        match invocation.tool {
            Tool::Encoder => {
                let input = &invocation.args[invocation.args.len() - 3];
                if state.failing_encoder.contains(&name_of(input)) {
                    return Ok(ToolOutput::exited(1));
                }
                write_placeholder(Path::new(&last))?;
                Ok(ToolOutput::exited(0))
            }
            Tool::MetadataDump => {
                let name = name_of(&last);
                if state.timing_out.contains(&name) {
                    return Ok(ToolOutput::timed_out());
                }
                if state.undecodable.contains(&name) {
                    return Ok(ToolOutput::exited(0).with_stdout(vec![0xff, 0xfe]));
                }
                if state.failing_dump.contains(&name) {
                    return Ok(ToolOutput::exited(1));
                }
                let mut dump = BASELINE_DUMP.to_string();
                if state.extra_metadata.contains(&name) {
                    dump.push_str("Artist                          : Jane Doe\n");
                }
                Ok(ToolOutput::exited(0).with_stdout(dump))
            }
            Tool::MetadataExtract => {
                if state.failing_extract {
                    return Ok(ToolOutput::exited(1));
                }
                write_placeholder(Path::new(&last))?;
                Ok(ToolOutput::exited(0))
            }
            Tool::MetadataInject => {
                if state.failing_inject {
                    return Ok(ToolOutput::exited(1));
                }
                let target = name_of(&invocation.args[3]);
                state.extra_metadata.insert(target);
                Ok(ToolOutput::exited(0))
            }
        }
    }
}

fn write_placeholder(path: &Path) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, b"RIFF")
}

impl CommandRunner for MockRunner {
    fn run<'a>(&'a self, invocation: &'a ToolInvocation) -> BoxFuture<'a, io::Result<ToolOutput>> {
        Box::pin(async move { self.respond(invocation) })
    }
}

/// A run context rooted at `root` with logging disabled
pub fn context_with(root: &Path, config: Config, runner: MockRunner) -> RunContext {
    RunContext::new(config, WorkDirLayout::new(root), Arc::new(runner), RunLog::disabled())
}

/// Create empty files named `names` inside `dir`
pub fn touch_all(dir: &Path, names: &[&str]) -> Vec<PathBuf> {
    names
        .iter()
        .map(|name| {
            let path = dir.join(name);
            std::fs::write(&path, b"img").unwrap();
            path
        })
        .collect()
}
