//! FFmpeg command builder and runner.

use std::collections::{BTreeMap, VecDeque};
use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use vedit_models::TransformRequest;

use crate::error::{MediaError, MediaResult};

/// Lines of stderr kept for error reports.
const STDERR_TAIL_LINES: usize = 20;

/// Builder for FFmpeg commands.
///
/// Argument order is fixed: `-y`, input args, `-i <input>`, output args,
/// output path.
#[derive(Debug, Clone)]
pub struct FfmpegCommand {
    /// Input file path or URL
    input: String,
    /// Output file path or sequence pattern
    output: String,
    /// Input arguments (before -i)
    input_args: Vec<String>,
    /// Output arguments (after -i)
    output_args: Vec<String>,
    /// Whether to overwrite output
    overwrite: bool,
}

impl FfmpegCommand {
    /// Create a new FFmpeg command.
    pub fn new(input: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            output: output.into(),
            input_args: Vec::new(),
            output_args: Vec::new(),
            overwrite: true,
        }
    }

    /// Translate a request into a command.
    ///
    /// Fails with [`MediaError::InvalidInput`] when the request has neither a
    /// remote URL nor a staged local file.
    pub fn from_request(request: &TransformRequest) -> MediaResult<Self> {
        let input = request.source().ok_or(MediaError::InvalidInput)?;

        let mut cmd = Self::new(input, request.output.file_pattern.clone());

        if let Some(start_time) = request.start_time() {
            cmd = cmd.seek(start_time);
        }
        if let Some(graph) = filter_graph(&request.filters) {
            cmd = cmd.video_filter(graph);
        }
        if let Some(frames) = request.frames() {
            cmd = cmd.frames(frames);
        }
        if let Some(extra) = request.extra_options() {
            cmd = cmd.output_args(split_extra_options(extra));
        }

        Ok(cmd)
    }

    /// Add input arguments (before -i).
    pub fn input_arg(mut self, arg: impl Into<String>) -> Self {
        self.input_args.push(arg.into());
        self
    }

    /// Add output arguments (after -i).
    pub fn output_arg(mut self, arg: impl Into<String>) -> Self {
        self.output_args.push(arg.into());
        self
    }

    /// Add multiple output arguments.
    pub fn output_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.output_args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set seek position (before input).
    pub fn seek(self, position: impl Into<String>) -> Self {
        self.input_arg("-ss").input_arg(position)
    }

    /// Set video filter graph.
    pub fn video_filter(self, graph: impl Into<String>) -> Self {
        self.output_arg("-vf").output_arg(graph)
    }

    /// Limit the number of video frames written.
    pub fn frames(self, count: impl Into<String>) -> Self {
        self.output_arg("-frames:v").output_arg(count)
    }

    /// Replace the output path.
    pub fn with_output(mut self, output: impl AsRef<Path>) -> Self {
        self.output = output.as_ref().to_string_lossy().to_string();
        self
    }

    pub fn output(&self) -> &str {
        &self.output
    }

    /// Build the command arguments.
    pub fn build_args(&self) -> Vec<String> {
        let mut args = Vec::with_capacity(self.input_args.len() + self.output_args.len() + 4);

        if self.overwrite {
            args.push("-y".to_string());
        }

        args.extend(self.input_args.iter().cloned());

        args.push("-i".to_string());
        args.push(self.input.clone());

        args.extend(self.output_args.iter().cloned());

        args.push(self.output.clone());

        args
    }
}

/// Join filters into a single `-vf` graph, `name=options` or bare `name`.
///
/// Returns `None` for an empty map. Order follows the map's key order.
pub fn filter_graph(filters: &BTreeMap<String, String>) -> Option<String> {
    if filters.is_empty() {
        return None;
    }

    let graph = filters
        .iter()
        .map(|(name, options)| {
            if options.is_empty() {
                name.clone()
            } else {
                format!("{}={}", name, options)
            }
        })
        .collect::<Vec<_>>()
        .join(",");

    Some(graph)
}

/// Split the raw extra-options string into tokens.
///
/// No quoting awareness: `-metadata "title=a b"` yields three tokens.
pub fn split_extra_options(extra: &str) -> impl Iterator<Item = &str> {
    extra.split_whitespace()
}

/// Runner for FFmpeg commands with cancellation.
#[derive(Debug, Clone)]
pub struct FfmpegRunner {
    /// Binary to execute
    binary: PathBuf,
}

impl Default for FfmpegRunner {
    fn default() -> Self {
        Self::new("ffmpeg")
    }
}

impl FfmpegRunner {
    /// Create a runner for the given binary name or path.
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// Run a command until it exits or `cancel` fires.
    ///
    /// On cancellation the child is killed and reaped before returning
    /// [`MediaError::ProcessKilled`].
    pub async fn run(&self, cmd: &FfmpegCommand, cancel: &CancellationToken) -> MediaResult<()> {
        let binary = check_ffmpeg(&self.binary)?;

        let args = cmd.build_args();
        info!("Running command: {} {}", binary.display(), args.join(" "));

        let mut child = Command::new(&binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let stderr = child.stderr.take();
        let stderr_handle = tokio::spawn(async move {
            let mut tail = VecDeque::with_capacity(STDERR_TAIL_LINES);
            if let Some(stderr) = stderr {
                let mut reader = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = reader.next_line().await {
                    debug!(target: "vedit_media::ffmpeg", "{}", line);
                    if tail.len() == STDERR_TAIL_LINES {
                        tail.pop_front();
                    }
                    tail.push_back(line);
                }
            }
            tail.into_iter().collect::<Vec<_>>().join("\n")
        });

        let result = self.wait_for_completion(&mut child, cancel).await;

        // A killed child may leave descendants holding the pipe open.
        if matches!(result, Err(MediaError::ProcessKilled)) {
            stderr_handle.abort();
            return result;
        }

        let stderr_tail = stderr_handle.await.unwrap_or_default();

        match result {
            Err(MediaError::ProcessFailed {
                message, exit_code, ..
            }) => Err(MediaError::process_failed(
                message,
                (!stderr_tail.is_empty()).then_some(stderr_tail),
                exit_code,
            )),
            other => other,
        }
    }

    /// Wait for the child process, killing it on cancellation.
    async fn wait_for_completion(
        &self,
        child: &mut Child,
        cancel: &CancellationToken,
    ) -> MediaResult<()> {
        let status = tokio::select! {
            status = child.wait() => status?,
            _ = cancel.cancelled() => {
                info!("Cancellation requested, killing process");
                if let Err(e) = child.kill().await {
                    warn!("Failed to kill process: {}", e);
                }
                return Err(MediaError::ProcessKilled);
            }
        };

        info!("Command finished: {}", status);

        if status.success() {
            Ok(())
        } else {
            Err(MediaError::process_failed(
                status.to_string(),
                None,
                status.code(),
            ))
        }
    }
}

/// Resolve the FFmpeg binary on `PATH`, or as given when it is a path.
pub fn check_ffmpeg(binary: impl AsRef<Path>) -> MediaResult<PathBuf> {
    let binary = binary.as_ref();
    which::which(binary).map_err(|_| MediaError::BinaryNotFound(binary.to_path_buf()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use vedit_models::{Input, Output};

    fn args(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_thumbnail_request_arguments() {
        let request = TransformRequest::new(Output::new("out.jpg"))
            .with_input(Input::local("in.mp4"))
            .with_start_time("00:00:05")
            .with_filter("scale", "-1:100")
            .with_frames("1");

        let cmd = FfmpegCommand::from_request(&request).unwrap();

        assert_eq!(
            cmd.build_args(),
            args(&[
                "-y", "-ss", "00:00:05", "-i", "in.mp4", "-vf", "scale=-1:100", "-frames:v", "1",
                "out.jpg",
            ])
        );
    }

    #[test]
    fn test_check_ffmpeg_reports_missing_binary() {
        let missing = Path::new("/nonexistent/vedit-ffmpeg");
        match check_ffmpeg(missing) {
            Err(MediaError::BinaryNotFound(path)) => assert_eq!(path, missing),
            other => panic!("expected BinaryNotFound, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_input_is_rejected() {
        let request = TransformRequest::new(Output::new("out.jpg"));
        assert!(matches!(
            FfmpegCommand::from_request(&request),
            Err(MediaError::InvalidInput)
        ));
    }

    #[test]
    fn test_minimal_request_arguments() {
        let request = TransformRequest::new(Output::new("out.mp4"))
            .with_input(Input::remote("https://example.com/in.mp4"));

        let cmd = FfmpegCommand::from_request(&request).unwrap();
        assert_eq!(
            cmd.build_args(),
            args(&["-y", "-i", "https://example.com/in.mp4", "out.mp4"])
        );
    }

    #[test]
    fn test_filter_graph_contains_each_pair_once() {
        let mut filters = BTreeMap::new();
        filters.insert("scale".to_string(), "640:-1".to_string());
        filters.insert("hflip".to_string(), String::new());
        filters.insert("fps".to_string(), "1".to_string());

        let graph = filter_graph(&filters).unwrap();

        assert_eq!(graph, "fps=1,hflip,scale=640:-1");
        assert!(!graph.starts_with(','));
        assert!(!graph.ends_with(','));
        for pair in ["fps=1", "hflip", "scale=640:-1"] {
            assert_eq!(graph.split(',').filter(|p| *p == pair).count(), 1);
        }
    }

    #[test]
    fn test_filter_graph_empty() {
        assert_eq!(filter_graph(&BTreeMap::new()), None);
    }

    #[test]
    fn test_extra_options_are_split_literally() {
        let request = TransformRequest::new(Output::new("out.mp4"))
            .with_input(Input::local("in.mp4"))
            .with_frames("10")
            .with_extra_options("-c:v  libx264 -metadata \"title=a b\"");

        let built = FfmpegCommand::from_request(&request).unwrap().build_args();

        assert_eq!(
            built,
            args(&[
                "-y", "-i", "in.mp4", "-frames:v", "10", "-c:v", "libx264", "-metadata",
                "\"title=a", "b\"", "out.mp4"
            ])
        );
    }

    #[test]
    fn test_with_output_replaces_pattern() {
        let cmd = FfmpegCommand::new("in.mp4", "out.jpg").with_output("/data/output/x/out.jpg");
        assert_eq!(cmd.output(), "/data/output/x/out.jpg");
        assert_eq!(cmd.build_args().last().unwrap(), "/data/output/x/out.jpg");
    }
}
