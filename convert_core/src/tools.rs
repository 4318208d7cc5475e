//! External tool discovery
//!
//! ffmpeg and ffprobe are located once per batch, before any file is touched.

use crate::errors::{ConvertError, Result};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::info;

/// A resolved external program plus any arguments that always precede the
/// per-call arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalTool {
    program: PathBuf,
    leading_args: Vec<OsString>,
}

impl ExternalTool {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            leading_args: Vec::new(),
        }
    }

    pub fn with_leading_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.leading_args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Stand-in tool running `script` through `sh -c`. Per-call arguments end
    /// up in `$1`, `$2`, ...
    #[cfg(test)]
    pub(crate) fn shell(script: &str) -> Self {
        Self::new("sh").with_leading_args(["-c", script, "fake-tool"])
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Fresh `Command` for one invocation.
    pub fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.leading_args);
        cmd
    }

    /// Find `name` in PATH.
    pub fn locate(name: &str) -> Result<Self> {
        which::which(name)
            .map(Self::new)
            .map_err(|_| ConvertError::ToolNotFound(name.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolPaths {
    pub ffmpeg: ExternalTool,
    pub ffprobe: ExternalTool,
}

impl ToolPaths {
    pub fn discover() -> Result<Self> {
        let ffmpeg = ExternalTool::locate("ffmpeg")?;
        let ffprobe = ExternalTool::locate("ffprobe")?;
        info!(
            ffmpeg = %ffmpeg.program().display(),
            ffprobe = %ffprobe.program().display(),
            "Located external tools"
        );
        Ok(Self { ffmpeg, ffprobe })
    }
}
