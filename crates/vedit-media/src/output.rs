//! Per-invocation output staging.
//!
//! Every invocation writes into its own `<root>/<uuid>/` directory so
//! concurrent jobs never collide on file names, including numbered frame
//! sequences.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;
use tokio::fs;
use tracing::debug;
use uuid::Uuid;

use crate::error::{MediaError, MediaResult};

fn placeholder_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"%(0[0-9]+)?d").expect("valid placeholder regex"))
}

/// Whether an output pattern contains a printf-style sequence placeholder.
pub fn has_sequence_placeholder(pattern: &str) -> bool {
    placeholder_regex().is_match(pattern)
}

/// A freshly created staging directory and the output path inside it.
#[derive(Debug, Clone)]
pub struct StagedOutput {
    /// Directory owned exclusively by one invocation
    pub dir: PathBuf,
    /// Path (or sequence pattern) handed to FFmpeg
    pub path: PathBuf,
    /// Whether FFmpeg will emit numbered files
    pub is_sequence: bool,
}

impl StagedOutput {
    /// Create `<root>/<uuid>/` and place the pattern's file name inside it.
    ///
    /// Directory components of the caller's pattern are discarded.
    pub async fn create(root: impl AsRef<Path>, pattern: &str) -> MediaResult<Self> {
        let file_name = Path::new(pattern)
            .file_name()
            .ok_or_else(|| MediaError::invalid_output(format!("no file name in {:?}", pattern)))?;

        let dir = root.as_ref().join(Uuid::new_v4().to_string());
        fs::create_dir_all(&dir).await?;

        let path = dir.join(file_name);
        debug!("Staged output {}", path.display());

        Ok(Self {
            is_sequence: has_sequence_placeholder(pattern),
            dir,
            path,
        })
    }

    /// List every regular file produced under the staging directory, sorted by path.
    pub async fn collect_files(&self) -> MediaResult<Vec<PathBuf>> {
        collect_files(&self.dir).await
    }

    /// Remove the staging directory and everything in it.
    pub async fn discard(&self) -> MediaResult<()> {
        match fs::remove_dir_all(&self.dir).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Walk `dir` and return all regular files, skipping directory entries.
pub async fn collect_files(dir: impl AsRef<Path>) -> MediaResult<Vec<PathBuf>> {
    let mut files = Vec::new();
    let mut pending = vec![dir.as_ref().to_path_buf()];

    while let Some(current) = pending.pop() {
        let mut entries = fs::read_dir(&current).await?;
        while let Some(entry) = entries.next_entry().await? {
            let file_type = entry.file_type().await?;
            if file_type.is_dir() {
                pending.push(entry.path());
            } else if file_type.is_file() {
                files.push(entry.path());
            }
        }
    }

    files.sort();
    Ok(files)
}
