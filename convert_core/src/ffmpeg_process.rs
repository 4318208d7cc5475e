//! FFmpeg process management
//!
//! ## Pipe deadlock
//!
//! With both stdout and stderr piped, a reader that only consumes stdout can
//! hang forever: once ffmpeg fills the stderr pipe buffer (typically 64 KiB)
//! it blocks on write, stops producing progress on stdout, and both sides
//! wait on each other.
//!
//! [`FfmpegProcess`] drains stderr on its own thread from the moment the child
//! is spawned, keeping only a bounded tail for error reports.
//!
//! ```ignore
//! use convert_core::ffmpeg_process::FfmpegProcess;
//! use std::process::Command;
//!
//! let mut cmd = Command::new("ffmpeg");
//! cmd.arg("-i").arg("input.flac").arg("output.wav");
//!
//! let mut process = FfmpegProcess::spawn(&mut cmd)?;
//! if let Some(stdout) = process.take_stdout() {
//!     // read progress...
//! }
//! let (status, stderr_tail) = process.wait_with_output()?;
//! ```

use std::collections::VecDeque;
use std::io::{self, BufRead, BufReader, Read};
use std::process::{Child, ChildStdout, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info};

/// Lines of stderr kept for the error report.
pub const STDERR_TAIL_LINES: usize = 40;
/// Longest single stderr line kept; the rest is cut.
pub const STDERR_LINE_MAX_BYTES: usize = 512;

/// Last `max_lines` lines of a stream, each capped at `STDERR_LINE_MAX_BYTES`.
#[derive(Debug, Clone)]
pub struct DiagnosticTail {
    lines: VecDeque<String>,
    max_lines: usize,
    total_bytes: u64,
}

impl DiagnosticTail {
    /// Empty tail; `max_lines == 0` only counts bytes.
    pub fn new(max_lines: usize) -> Self {
        Self {
            lines: VecDeque::with_capacity(max_lines.min(64)),
            max_lines,
            total_bytes: 0,
        }
    }

    pub fn push_line(&mut self, raw: &[u8]) {
        self.total_bytes += raw.len() as u64;
        if self.max_lines == 0 {
            return;
        }
        let cut = &raw[..raw.len().min(STDERR_LINE_MAX_BYTES)];
        let line = String::from_utf8_lossy(cut).trim_end().to_string();
        if self.lines.len() == self.max_lines {
            self.lines.pop_front();
        }
        self.lines.push_back(line);
    }

    /// Read `reader` to EOF. Long lines are consumed in pieces so memory
    /// stays bounded no matter what the child writes.
    pub fn drain<R: Read>(max_lines: usize, reader: R) -> Self {
        let mut tail = Self::new(max_lines);
        let mut reader = BufReader::new(reader);
        let mut line = Vec::new();
        loop {
            line.clear();
            match (&mut reader)
                .take(STDERR_LINE_MAX_BYTES as u64 * 4)
                .read_until(b'\n', &mut line)
            {
                Ok(0) => break,
                Ok(_) => tail.push_line(&line),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    debug!(error = %e, lines = tail.lines.len(), "Stopped draining stderr");
                    break;
                }
            }
        }
        tail
    }

    /// Total bytes seen, including those no longer kept.
    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    pub fn to_text(&self) -> String {
        let mut out = String::new();
        for line in &self.lines {
            out.push_str(line);
            out.push('\n');
        }
        out
    }
}

/// An ffmpeg child whose stderr is drained continuously in the background.
pub struct FfmpegProcess {
    child: Child,
    stderr_thread: Option<JoinHandle<DiagnosticTail>>,
}

impl FfmpegProcess {
    /// Spawn `cmd` with stdout and stderr piped and stdin closed.
    pub fn spawn(cmd: &mut Command) -> io::Result<Self> {
        info!(command = ?cmd, "Executing FFmpeg command");

        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = cmd.spawn()?;

        let stderr = match child.stderr.take() {
            Some(stderr) => stderr,
            None => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(io::Error::other("failed to capture FFmpeg stderr"));
            }
        };

        let stderr_thread =
            thread::spawn(move || DiagnosticTail::drain(STDERR_TAIL_LINES, stderr));

        Ok(Self {
            child,
            stderr_thread: Some(stderr_thread),
        })
    }

    pub fn take_stdout(&mut self) -> Option<ChildStdout> {
        self.child.stdout.take()
    }

    /// Wait for exit, then join the stderr drain.
    pub fn wait_with_output(mut self) -> io::Result<(ExitStatus, DiagnosticTail)> {
        let status = self.child.wait()?;
        let stderr = self
            .stderr_thread
            .take()
            .and_then(|t| t.join().ok())
            .unwrap_or_else(|| DiagnosticTail::new(0));

        if status.success() {
            info!(exit_code = status.code(), "FFmpeg process completed successfully");
            debug!(
                stderr_bytes = stderr.total_bytes(),
                stderr_output = %stderr.to_text(),
                "FFmpeg stderr output"
            );
        } else {
            error!(
                exit_code = status.code(),
                stderr_output = %stderr.to_text(),
                "FFmpeg process failed"
            );
        }

        Ok((status, stderr))
    }

    pub fn kill(&mut self) -> io::Result<()> {
        self.child.kill()
    }
}

impl Drop for FfmpegProcess {
    fn drop(&mut self) {
        // Only reached without wait_with_output, e.g. when reading stdout
        // failed. Do not leave a zombie behind.
        if self.stderr_thread.is_some() {
            let _ = self.child.kill();
            let _ = self.child.wait();
            if let Some(t) = self.stderr_thread.take() {
                let _ = t.join();
            }
        }
    }
}

/// The single most useful line of an ffmpeg stderr dump.
///
/// 1. last line mentioning "error" (any case)
/// 2. otherwise the last non-empty line that is not a stats line
/// 3. otherwise "Unknown FFmpeg error"
pub fn format_ffmpeg_error(stderr: &str) -> String {
    if let Some(error_line) = stderr
        .lines()
        .rev()
        .find(|line| line.to_lowercase().contains("error"))
    {
        return error_line.trim().to_string();
    }

    stderr
        .lines()
        .rev()
        .find(|line| {
            let trimmed = line.trim();
            !trimmed.is_empty()
                && !trimmed.starts_with("frame=")
                && !trimmed.starts_with("size=")
        })
        .map(|s| s.trim().to_string())
        .unwrap_or_else(|| "Unknown FFmpeg error".to_string())
}

/// Headline plus the kept tail, for [`crate::errors::ConvertError::Conversion`].
pub fn diagnostic_excerpt(tail: &DiagnosticTail) -> String {
    let text = tail.to_text();
    let headline = format_ffmpeg_error(&text);
    let body = text.trim_end();
    if body.is_empty() || body == headline {
        headline
    } else {
        format!("{}\n{}", headline, body)
    }
}
