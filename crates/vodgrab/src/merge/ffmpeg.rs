use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info};

use super::MergeError;

/// What the concatenation tool reported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOutput {
    pub success: bool,
    /// Exit code, -1 when the process was terminated by a signal
    pub code: i32,
    pub stderr: String,
}

/// Joins the files named in a concat list into one container without
/// re-encoding.
#[async_trait]
pub trait ConcatTool: Send + Sync {
    async fn concat(&self, file_list: &Path, output: &Path) -> Result<ToolOutput, MergeError>;
}

pub struct FfmpegConcat {
    ffmpeg_path: String,
}

impl FfmpegConcat {
    pub fn new(ffmpeg_path: impl Into<String>) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
        }
    }

    fn build_args(file_list: &Path, output: &Path) -> Vec<String> {
        vec![
            "-hide_banner".to_string(),
            "-f".to_string(),
            "concat".to_string(),
            "-safe".to_string(),
            "0".to_string(),
            "-i".to_string(),
            file_list.to_string_lossy().into_owned(),
            "-c".to_string(),
            "copy".to_string(),
            "-y".to_string(),
            output.to_string_lossy().into_owned(),
        ]
    }
}

/// `FFMPEG_PATH` if set, `ffmpeg` from `PATH` otherwise.
pub fn default_ffmpeg_path() -> String {
    std::env::var("FFMPEG_PATH").unwrap_or_else(|_| "ffmpeg".to_string())
}

#[async_trait]
impl ConcatTool for FfmpegConcat {
    async fn concat(&self, file_list: &Path, output: &Path) -> Result<ToolOutput, MergeError> {
        let args = Self::build_args(file_list, output);
        info!(
            command = %format!("{} {}", self.ffmpeg_path, args.join(" ")),
            "Executing merge command"
        );

        let mut cmd = Command::new(&self.ffmpeg_path);
        cmd.args(&args)
            .env("LC_ALL", "C")
            .stdin(Stdio::null())
            .kill_on_drop(true);

        let result = cmd.output().await.map_err(|source| MergeError::Spawn {
            program: self.ffmpeg_path.clone(),
            source,
        })?;

        let stderr = String::from_utf8_lossy(&result.stderr).into_owned();
        debug!(status = %result.status, "ffmpeg exited");
        Ok(ToolOutput {
            success: result.status.success(),
            code: result.status.code().unwrap_or(-1),
            stderr,
        })
    }
}
