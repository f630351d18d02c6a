//! Reassembly of downloaded segments into a single container.
//!
//! Segment files are listed from the segment directory, sorted by name (which
//! is ordinal order, see [`crate::hls::segment_file_name`]), written to an
//! ffmpeg concat list and joined with stream copy.

mod ffmpeg;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};

pub use ffmpeg::{ConcatTool, FfmpegConcat, ToolOutput, default_ffmpeg_path};

pub const FILE_LIST_NAME: &str = "filelist.txt";
const SEGMENT_EXTENSION: &str = ".ts";
const DIAGNOSTIC_LIST_CHARS: usize = 200;
const DIAGNOSTIC_SAMPLE_FILES: usize = 3;

#[derive(Debug, thiserror::Error)]
pub enum MergeError {
    #[error("no .ts files found in {}", dir.display())]
    NoSegmentsOnDisk { dir: PathBuf },

    #[error("merge tool exited with code {code}: {stderr}")]
    MergeTool {
        code: i32,
        stderr: String,
        /// Working directory, head of the file list and a sample of segment files
        diagnostics: String,
    },

    #[error("failed to run `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("merge finished but output {} does not exist", path.display())]
    OutputMissing { path: PathBuf },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone)]
pub struct MergeConfig {
    pub ffmpeg_path: String,
    /// Delete the segment directory after a successful merge
    pub remove_segments_on_success: bool,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: default_ffmpeg_path(),
            remove_segments_on_success: false,
        }
    }
}

pub struct SegmentMerger {
    tool: Arc<dyn ConcatTool>,
    remove_segments_on_success: bool,
}

impl SegmentMerger {
    /// Merger backed by ffmpeg.
    pub fn new(config: &MergeConfig) -> Self {
        Self::with_tool(Arc::new(FfmpegConcat::new(&config.ffmpeg_path)), config)
    }

    pub fn with_tool(tool: Arc<dyn ConcatTool>, config: &MergeConfig) -> Self {
        Self {
            tool,
            remove_segments_on_success: config.remove_segments_on_success,
        }
    }

    /// Join every `.ts` file in `segment_dir` into `output` and return the
    /// absolute output path.
    pub async fn merge(&self, segment_dir: &Path, output: &Path) -> Result<PathBuf, MergeError> {
        let segment_dir = std::path::absolute(segment_dir)?;
        let output = std::path::absolute(output)?;

        let files = list_segment_files(&segment_dir).await?;
        if files.is_empty() {
            error!(dir = %segment_dir.display(), "No .ts files found");
            return Err(MergeError::NoSegmentsOnDisk { dir: segment_dir });
        }
        info!(count = files.len(), "Found .ts files to merge");

        let list = build_file_list(&files);
        let list_path = segment_dir.join(FILE_LIST_NAME);
        tokio::fs::write(&list_path, &list).await?;
        info!(path = %list_path.display(), "Created file list");

        if let Some(parent) = output.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let result = self.tool.concat(&list_path, &output).await?;
        if !result.success {
            error!(code = result.code, "Merge tool stderr output:\n{}", result.stderr);
            let diagnostics = collect_diagnostics(&list, &files).await;
            error!("Merge diagnostics:\n{diagnostics}");
            return Err(MergeError::MergeTool {
                code: result.code,
                stderr: result.stderr,
                diagnostics,
            });
        }

        if !tokio::fs::try_exists(&output).await? {
            return Err(MergeError::OutputMissing { path: output });
        }
        info!(output = %output.display(), "Successfully merged video");

        if self.remove_segments_on_success {
            match tokio::fs::remove_dir_all(&segment_dir).await {
                Ok(()) => info!(dir = %segment_dir.display(), "Removed segment directory"),
                Err(e) => warn!(dir = %segment_dir.display(), error = %e, "Failed to remove segment directory"),
            }
        }

        Ok(output)
    }
}

/// Regular files ending in `.ts`, sorted by file name.
async fn list_segment_files(dir: &Path) -> Result<Vec<PathBuf>, MergeError> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        if !entry.file_type().await?.is_file() {
            continue;
        }
        if entry
            .file_name()
            .to_string_lossy()
            .ends_with(SEGMENT_EXTENSION)
        {
            files.push(entry.path());
        }
    }
    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(files)
}

/// ffmpeg concat demuxer input: one `file '<path>'` line per segment.
pub fn build_file_list(files: &[PathBuf]) -> String {
    files
        .iter()
        .map(|path| format!("file '{}'\n", escape_concat_path(path)))
        .collect()
}

fn escape_concat_path(path: &Path) -> String {
    path.to_string_lossy()
        .replace('\\', "/")
        .replace('\'', r"'\''")
}

async fn collect_diagnostics(list: &str, files: &[PathBuf]) -> String {
    let cwd = std::env::current_dir()
        .map(|d| d.display().to_string())
        .unwrap_or_else(|e| format!("<unavailable: {e}>"));
    let list_head: String = list.chars().take(DIAGNOSTIC_LIST_CHARS).collect();

    let mut out = format!("Working directory: {cwd}\nFirst lines of {FILE_LIST_NAME}:\n{list_head}\n");
    for path in files.iter().take(DIAGNOSTIC_SAMPLE_FILES) {
        let line = match tokio::fs::metadata(path).await {
            Ok(meta) => format!("{}: exists=true, size={}\n", path.display(), meta.len()),
            Err(_) => format!("{}: exists=false, size=N/A\n", path.display()),
        };
        out.push_str(&line);
    }
    out
}
