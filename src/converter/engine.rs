//! # Conversion Engine
//!
//! Converte un singolo file con `cwebp` e, se serve, ne trasferisce i metadata.

use std::path::PathBuf;
use tracing::{debug, warn};

use crate::args;
use crate::converter::RunContext;
use crate::file_manager::ImageFile;
use crate::metadata::{MetadataClassifier, MetadataTransfer};
use crate::run_log::{ErrorKind, Outcome, Step, WorkerLog};
use crate::tools::{Tool, ToolInvocation};

/// What happened to one input file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionResult {
    pub input: ImageFile,
    /// `None` when the encoder produced nothing
    pub output: Option<PathBuf>,
    pub metadata_transferred: bool,
}

impl ConversionResult {
    pub fn succeeded(&self) -> bool {
        self.output.is_some()
    }
}

/// Runs the encoder on one file at a time
pub struct ConversionEngine<'a> {
    ctx: &'a RunContext,
}

impl<'a> ConversionEngine<'a> {
    pub fn new(ctx: &'a RunContext) -> Self {
        Self { ctx }
    }

    /// Encoder flags: lossless, best alpha filter, max effort, multithreaded,
    /// ICC-only metadata passthrough. EXIF/XMP go through [`MetadataTransfer`].
    pub fn encoder_args(input: &ImageFile, output: &std::path::Path) -> Vec<String> {
        args![
            "-lossless",
            "-metadata",
            "icc",
            "-mt",
            "-z",
            9,
            "-alpha_filter",
            "best",
            "-exact",
            input.path().display(),
            "-o",
            output.display(),
        ]
    }

    /// Convert `input` to `WebPs/<base>.webp`. Encoder failure yields a result
    /// without output; metadata transfer failure does not affect the output path.
    pub async fn convert(&self, input: &ImageFile, log: &mut WorkerLog) -> ConversionResult {
        let output = self.ctx.layout.output_path_for(input);

        log.start(Step::Conversion, input.path()).await;
        let invocation = ToolInvocation::new(Tool::Encoder, Self::encoder_args(input, &output));
        let encoded = match self.ctx.runner.run(&invocation).await {
            Ok(result) => result.success(),
            Err(e) => {
                warn!("Could not run {}: {}", invocation.tool, e);
                false
            }
        };

        if !encoded {
            log.finish(Outcome::Failed).await;
            self.ctx.errors.record(ErrorKind::Conversion, input.path()).await;
            return ConversionResult {
                input: input.clone(),
                output: None,
                metadata_transferred: false,
            };
        }
        log.finish(Outcome::Succeeded).await;
        debug!("Encoded {} -> {}", input.path().display(), output.display());

        let classifier = MetadataClassifier::new(self.ctx);
        let metadata_transferred = if classifier.has_extra_metadata(input.path()).await {
            MetadataTransfer::new(self.ctx).transfer(input, &output, log).await
        } else {
            false
        };

        ConversionResult {
            input: input.clone(),
            output: Some(output),
            metadata_transferred,
        }
    }
}
