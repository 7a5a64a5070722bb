//! Request-to-process invocation.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::time::Instant;

use async_trait::async_trait;
use metrics::histogram;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use vedit_models::TransformRequest;

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::MediaResult;
use crate::output::StagedOutput;

pub const FFMPEG_DURATION_SECONDS: &str = "vedit_ffmpeg_duration_seconds";

/// Runs one transformation request to completion.
#[async_trait]
pub trait Invoker: Send + Sync {
    /// Execute `request`, returning the produced files.
    ///
    /// A single attempt; cancellation yields
    /// [`ProcessKilled`](crate::MediaError::ProcessKilled).
    async fn invoke(
        &self,
        request: &TransformRequest,
        cancel: &CancellationToken,
    ) -> MediaResult<Vec<PathBuf>>;

    /// Remove files returned by an earlier [`invoke`](Invoker::invoke)
    /// whose locations were never delivered.
    async fn discard(&self, _files: &[PathBuf]) -> MediaResult<()> {
        Ok(())
    }
}

/// Configuration for [`FfmpegInvoker`].
#[derive(Debug, Clone)]
pub struct InvokerConfig {
    /// FFmpeg binary name or path
    pub binary_path: PathBuf,
    /// Root under which per-invocation output directories are created
    pub output_root: PathBuf,
}

impl Default for InvokerConfig {
    fn default() -> Self {
        Self {
            binary_path: PathBuf::from("ffmpeg"),
            output_root: PathBuf::from("./data/output"),
        }
    }
}

/// Invoker backed by the FFmpeg command line.
#[derive(Debug, Clone)]
pub struct FfmpegInvoker {
    runner: FfmpegRunner,
    output_root: PathBuf,
}

impl FfmpegInvoker {
    pub fn new(config: InvokerConfig) -> Self {
        Self {
            runner: FfmpegRunner::new(config.binary_path),
            output_root: config.output_root,
        }
    }
}

#[async_trait]
impl Invoker for FfmpegInvoker {
    async fn invoke(
        &self,
        request: &TransformRequest,
        cancel: &CancellationToken,
    ) -> MediaResult<Vec<PathBuf>> {
        // Validate the input before touching the filesystem.
        let cmd = FfmpegCommand::from_request(request)?;

        let staged = StagedOutput::create(&self.output_root, &request.output.file_pattern).await?;
        let cmd = cmd.with_output(&staged.path);

        let start = Instant::now();
        let result = self.runner.run(&cmd, cancel).await;
        histogram!(FFMPEG_DURATION_SECONDS).record(start.elapsed().as_secs_f64());

        if let Err(e) = result {
            if let Err(cleanup) = staged.discard().await {
                warn!("Failed to remove staging dir {}: {}", staged.dir.display(), cleanup);
            }
            return Err(e);
        }

        let files = staged.collect_files().await?;
        info!(
            "Command finished successfully with {} output file(s){}",
            files.len(),
            if staged.is_sequence { " (sequence)" } else { "" }
        );

        Ok(files)
    }

    /// Delete the staging directories holding `files`.
    ///
    /// Only `<root>/<dir>/...` paths are touched; anything else is left alone.
    async fn discard(&self, files: &[PathBuf]) -> MediaResult<()> {
        let mut dirs = BTreeSet::new();
        for file in files {
            let Ok(relative) = file.strip_prefix(&self.output_root) else {
                continue;
            };
            let mut components = relative.components();
            if let (Some(dir), Some(_)) = (components.next(), components.next()) {
                dirs.insert(self.output_root.join(dir));
            }
        }

        for dir in dirs {
            match tokio::fs::remove_dir_all(&dir).await {
                Ok(()) => info!("Discarded undelivered output {}", dir.display()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}
