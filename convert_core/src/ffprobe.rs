//! FFprobe wrapper module
//!
//! Duration probing for the progress bar. Every failure mode collapses to
//! [`MediaDuration::Unknown`]; callers never see a probe error.

use crate::tools::ExternalTool;
use serde::Deserialize;
use std::path::Path;
use tracing::debug;

/// Total duration of a media file as reported by ffprobe.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MediaDuration {
    /// Strictly positive, finite seconds.
    Known(f64),
    Unknown,
}

impl MediaDuration {
    /// Zero, negative and non-finite values are all treated as unknown, so a
    /// zero-length file shows no bar instead of an instant 100%.
    pub fn from_seconds(seconds: f64) -> Self {
        if seconds.is_finite() && seconds > 0.0 {
            MediaDuration::Known(seconds)
        } else {
            MediaDuration::Unknown
        }
    }

    pub fn seconds(&self) -> Option<f64> {
        match self {
            MediaDuration::Known(s) => Some(*s),
            MediaDuration::Unknown => None,
        }
    }

    pub fn is_known(&self) -> bool {
        matches!(self, MediaDuration::Known(_))
    }
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    format: Option<ProbeFormat>,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

/// Extract `format.duration` from `ffprobe -print_format json -show_format` output.
pub fn parse_probe_output(json: &str) -> MediaDuration {
    let parsed: ProbeOutput = match serde_json::from_str(json) {
        Ok(p) => p,
        Err(e) => {
            debug!(error = %e, "ffprobe output is not valid JSON");
            return MediaDuration::Unknown;
        }
    };

    parsed
        .format
        .and_then(|f| f.duration)
        .and_then(|d| d.trim().parse::<f64>().ok())
        .map(MediaDuration::from_seconds)
        .unwrap_or(MediaDuration::Unknown)
}

/// Run ffprobe once on `path`. No retries: a failed probe means the file
/// converts without a progress bar.
pub fn probe_duration(ffprobe: &ExternalTool, path: &Path) -> MediaDuration {
    if !path.is_file() {
        debug!(path = %path.display(), "Not a file, duration unknown");
        return MediaDuration::Unknown;
    }

    let output = match ffprobe
        .command()
        .args(["-v", "error", "-print_format", "json", "-show_format", "--"])
        .arg(path)
        .output()
    {
        Ok(output) => output,
        Err(e) => {
            debug!(path = %path.display(), error = %e, "Failed to run ffprobe");
            return MediaDuration::Unknown;
        }
    };

    if !output.status.success() {
        debug!(
            path = %path.display(),
            exit_code = ?output.status.code(),
            stderr = %String::from_utf8_lossy(&output.stderr).trim(),
            "ffprobe failed"
        );
        return MediaDuration::Unknown;
    }

    let duration = parse_probe_output(&String::from_utf8_lossy(&output.stdout));
    debug!(path = %path.display(), duration = ?duration, "Probed duration");
    duration
}
