//! Conversion job runner
//!
//! Runs ffmpeg for one probed task. stdout carries the `-progress pipe:1`
//! stream and is parsed on the calling thread; stderr is drained by
//! [`FfmpegProcess`] on a background thread. The presenter gets a fraction per
//! tick when the duration is known, and exactly one `finalize` per task.

use crate::errors::{ConvertError, Result};
use crate::ffmpeg_process::{diagnostic_excerpt, FfmpegProcess};
use crate::ffprobe::MediaDuration;
use crate::progress::{ProgressFraction, ProgressPresenter};
use crate::progress_parser::{ProgressParser, ProgressSample};
use crate::task::{MediaTask, ProbedTask};
use crate::tools::ExternalTool;
use std::path::PathBuf;
use std::process::{Command, ExitStatus};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// What a successful job did.
#[derive(Debug, Clone, PartialEq)]
pub struct JobReport {
    pub input: PathBuf,
    pub output: PathBuf,
    pub duration: MediaDuration,
    /// Progress ticks parsed from ffmpeg.
    pub samples: usize,
    /// Presenter updates sent; always zero when the duration is unknown.
    pub updates: usize,
    pub last_fraction: Option<ProgressFraction>,
    pub wall_time: Duration,
}

/// Runs one ffmpeg conversion at a time with progress tracking.
pub struct JobRunner<'a> {
    ffmpeg: &'a ExternalTool,
    overwrite: bool,
}

impl<'a> JobRunner<'a> {
    /// `overwrite` picks `-y` over `-n`.
    pub fn new(ffmpeg: &'a ExternalTool, overwrite: bool) -> Self {
        Self { ffmpeg, overwrite }
    }

    /// `-progress pipe:1` must come before the output so ffmpeg treats it as
    /// a global option.
    pub fn build_command(&self, task: &MediaTask) -> Command {
        let mut cmd = self.ffmpeg.command();
        cmd.args(["-hide_banner", "-loglevel", "error"])
            .args(["-progress", "pipe:1", "-nostats"])
            .arg(if self.overwrite { "-y" } else { "-n" })
            .arg("-i")
            .arg(task.input());
        if task.format().is_audio_only() {
            cmd.arg("-vn");
        }
        cmd.args(task.format().codec_args()).arg(task.output());
        cmd
    }

    /// Convert `probed`, feeding `presenter` as ticks arrive. The presenter
    /// gets exactly one `finalize`, on success and on failure alike.
    pub fn run(
        &self,
        probed: &ProbedTask,
        presenter: &mut dyn ProgressPresenter,
    ) -> Result<JobReport> {
        let mut cmd = self.build_command(probed.task());
        run_command(&mut cmd, probed, presenter)
    }
}

/// Forwards fractions that do not move the bar backwards.
struct FractionForwarder<'p> {
    task_id: &'p str,
    duration: MediaDuration,
    presenter: &'p mut dyn ProgressPresenter,
    last: Option<ProgressFraction>,
    samples: usize,
    updates: usize,
}

impl FractionForwarder<'_> {
    fn observe(&mut self, sample: ProgressSample) {
        self.samples += 1;
        let Some(fraction) = ProgressFraction::from_elapsed(sample.elapsed, self.duration) else {
            return;
        };
        if matches!(self.last, Some(last) if fraction < last) {
            return;
        }
        self.presenter.update(self.task_id, fraction);
        self.last = Some(fraction);
        self.updates += 1;
    }
}

/// Run an already-built ffmpeg command for `probed`.
pub fn run_command(
    cmd: &mut Command,
    probed: &ProbedTask,
    presenter: &mut dyn ProgressPresenter,
) -> Result<JobReport> {
    let task = probed.task();
    let task_id = task.id();
    let started = Instant::now();

    let mut process = match FfmpegProcess::spawn(cmd) {
        Ok(process) => process,
        Err(e) => {
            presenter.finalize(&task_id, false);
            return Err(ConvertError::Conversion {
                path: task.input().to_path_buf(),
                exit_code: None,
                diagnostic: format!("failed to launch ffmpeg: {}", e),
            });
        }
    };

    let mut forwarder = FractionForwarder {
        task_id: &task_id,
        duration: probed.duration(),
        presenter,
        last: None,
        samples: 0,
        updates: 0,
    };

    if let Some(stdout) = process.take_stdout() {
        let mut parser = ProgressParser::new();
        if let Err(e) = parser.read_from(stdout, |sample| forwarder.observe(sample)) {
            // Can not keep draining stdout; stop the child rather than let it
            // block on a full pipe.
            warn!(path = %task.input().display(), error = %e, "Lost FFmpeg progress stream");
            let _ = process.kill();
        }
    }

    let FractionForwarder {
        presenter,
        last,
        samples,
        updates,
        ..
    } = forwarder;

    let waited = process.wait_with_output();
    let success = matches!(&waited, Ok((status, _)) if status.success());
    presenter.finalize(&task_id, success);

    let (status, stderr) = waited.map_err(|e| ConvertError::Conversion {
        path: task.input().to_path_buf(),
        exit_code: None,
        diagnostic: format!("failed to wait for ffmpeg: {}", e),
    })?;

    if !status.success() {
        let mut diagnostic = diagnostic_excerpt(&stderr);
        if status.code().is_none() {
            diagnostic = format!("{} ({})", diagnostic, describe_abnormal_exit(&status));
        }
        return Err(ConvertError::Conversion {
            path: task.input().to_path_buf(),
            exit_code: status.code(),
            diagnostic,
        });
    }

    let wall_time = started.elapsed();
    debug!(
        path = %task.input().display(),
        samples,
        updates,
        "Progress stream finished"
    );
    info!(
        input = %task.input().display(),
        output = %task.output().display(),
        duration_secs = wall_time.as_secs_f64(),
        "Conversion finished"
    );

    Ok(JobReport {
        input: task.input().to_path_buf(),
        output: task.output().to_path_buf(),
        duration: probed.duration(),
        samples,
        updates,
        last_fraction: last,
        wall_time,
    })
}

#[cfg(unix)]
fn describe_abnormal_exit(status: &ExitStatus) -> String {
    use std::os::unix::process::ExitStatusExt;
    match status.signal() {
        Some(sig) => format!("terminated by signal {}", sig),
        None => "terminated abnormally".to_string(),
    }
}

#[cfg(not(unix))]
fn describe_abnormal_exit(_status: &ExitStatus) -> String {
    "terminated abnormally".to_string()
}
