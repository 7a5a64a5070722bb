#![deny(unreachable_patterns)]
//! FFmpeg CLI invocation for the transformation service.
//!
//! This crate provides:
//! - Request-to-argument translation
//! - Per-invocation output staging
//! - Process supervision with cancellation

pub mod command;
pub mod error;
pub mod invoker;
pub mod output;

pub use command::{check_ffmpeg, filter_graph, split_extra_options, FfmpegCommand, FfmpegRunner};
pub use error::{MediaError, MediaResult};
pub use invoker::{FfmpegInvoker, Invoker, InvokerConfig, FFMPEG_DURATION_SECONDS};
pub use output::{collect_files, has_sequence_placeholder, StagedOutput};
