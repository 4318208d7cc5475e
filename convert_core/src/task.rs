//! One file's conversion request.

use crate::ffprobe::{probe_duration, MediaDuration};
use crate::formats::TargetFormat;
use crate::tools::ExternalTool;
use std::path::{Path, PathBuf};

/// Input, output and target format of one conversion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaTask {
    input: PathBuf,
    output: PathBuf,
    format: TargetFormat,
}

impl MediaTask {
    pub fn new(input: impl Into<PathBuf>, output: impl Into<PathBuf>, format: TargetFormat) -> Self {
        Self {
            input: input.into(),
            output: output.into(),
            format,
        }
    }

    /// `<output_folder>/<input stem>.<format extension>`
    pub fn for_output_folder(input: &Path, output_folder: &Path, format: &TargetFormat) -> Self {
        let stem = input
            .file_stem()
            .map(|s| s.to_os_string())
            .unwrap_or_else(|| input.as_os_str().to_os_string());
        let mut file_name = stem;
        file_name.push(".");
        file_name.push(format.extension());
        Self::new(input, output_folder.join(file_name), format.clone())
    }

    pub fn input(&self) -> &Path {
        &self.input
    }

    pub fn output(&self) -> &Path {
        &self.output
    }

    pub fn format(&self) -> &TargetFormat {
        &self.format
    }

    /// Identifier handed to the progress presenter: the input file name.
    pub fn id(&self) -> String {
        self.input
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.input.display().to_string())
    }

    /// Probe once and freeze the duration for the rest of the task's life.
    pub fn probe(self, ffprobe: &ExternalTool) -> ProbedTask {
        let duration = probe_duration(ffprobe, &self.input);
        self.with_duration(duration)
    }

    pub fn with_duration(self, duration: MediaDuration) -> ProbedTask {
        ProbedTask {
            task: self,
            duration,
        }
    }
}

/// A task whose duration has been settled. There is no way to change the
/// duration afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbedTask {
    task: MediaTask,
    duration: MediaDuration,
}

impl ProbedTask {
    pub fn task(&self) -> &MediaTask {
        &self.task
    }

    pub fn duration(&self) -> MediaDuration {
        self.duration
    }

    pub fn into_task(self) -> MediaTask {
        self.task
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_for_output_folder_replaces_extension() {
        let format = TargetFormat::parse("mp3").unwrap();
        let task = MediaTask::for_output_folder(
            Path::new("/in/sub/take one.WAV"),
            Path::new("/out"),
            &format,
        );
        assert_eq!(task.output(), Path::new("/out/take one.mp3"));
        assert_eq!(task.input(), Path::new("/in/sub/take one.WAV"));
        assert_eq!(task.id(), "take one.WAV");
    }

    #[test]
    fn test_for_output_folder_keeps_inner_dots() {
        let format = TargetFormat::default();
        let task =
            MediaTask::for_output_folder(Path::new("a/b.c.flac"), Path::new("o"), &format);
        assert_eq!(task.output(), Path::new("o/b.c.wav"));
    }

    #[test]
    fn test_with_duration() {
        let task = MediaTask::new("a.wav", "b.mp3", TargetFormat::default());
        let probed = task.clone().with_duration(MediaDuration::Known(3.0));
        assert_eq!(probed.duration(), MediaDuration::Known(3.0));
        assert_eq!(probed.into_task(), task);
    }
}
