//! Batch orchestration
//!
//! Discovers media files, converts them one at a time and archives the
//! originals that no longer need converting.

use crate::archive::archive_files;
use crate::config::ConvertConfig;
use crate::errors::{ConvertError, Result};
use crate::formats::is_media_file;
use crate::progress::ProgressPresenter;
use crate::runner::JobRunner;
use crate::task::MediaTask;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{info, warn};
use walkdir::WalkDir;

/// Media files directly in `dir`, or anywhere below it when `recursive`.
/// Sorted by path.
pub fn collect_media_files(dir: &Path, recursive: bool) -> Vec<PathBuf> {
    let walker = if recursive {
        WalkDir::new(dir).follow_links(true)
    } else {
        WalkDir::new(dir).max_depth(1)
    };

    let mut files: Vec<PathBuf> = walker
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| is_media_file(e.path()))
        .map(|e| e.path().to_path_buf())
        .collect();
    files.sort();
    files
}

/// Outcome counters of one batch run.
#[derive(Debug, Clone, Default)]
pub struct BatchResult {
    /// Files looked at: `succeeded + failed + skipped`.
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Output already present and `--overwrite` not given.
    pub skipped: usize,
    /// Originals moved to the archive folder.
    pub archived: usize,
    /// Input path and message of every failed file.
    pub errors: Vec<(PathBuf, String)>,
    /// Size of the converted inputs.
    pub input_bytes: u64,
    /// Size of the outputs written in this run.
    pub output_bytes: u64,
    /// Wall time of the whole batch.
    pub elapsed: Duration,
}

impl BatchResult {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a converted file.
    pub fn success(&mut self) {
        self.total += 1;
        self.succeeded += 1;
    }

    /// Record a failed file with its error message.
    pub fn fail(&mut self, path: PathBuf, error: String) {
        self.total += 1;
        self.failed += 1;
        self.errors.push((path, error));
    }

    /// Record a file whose output already existed.
    pub fn skip(&mut self) {
        self.total += 1;
        self.skipped += 1;
    }

    /// Percentage of succeeded files; 100 for an empty batch.
    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            100.0
        } else {
            (self.succeeded as f64 / self.total as f64) * 100.0
        }
    }

    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }
}

/// Convert every media file of `config.input_folder`.
///
/// Per-file failures are recorded and the batch moves on; only problems
/// with the folders themselves are returned as errors.
pub fn convert_folder(
    config: &ConvertConfig,
    presenter: &mut dyn ProgressPresenter,
) -> Result<BatchResult> {
    let started = Instant::now();

    if !config.input_folder.is_dir() {
        return Err(ConvertError::InputFolderMissing(config.input_folder.clone()));
    }
    fs::create_dir_all(&config.output_folder)?;

    let files = collect_media_files(&config.input_folder, config.recursive);
    info!(
        input = %config.input_folder.display(),
        output = %config.output_folder.display(),
        format = %config.format,
        files = files.len(),
        "Starting batch"
    );

    let runner = JobRunner::new(&config.tools.ffmpeg, config.overwrite);
    let mut result = BatchResult::new();
    let mut done_originals: Vec<PathBuf> = Vec::new();
    // Output path -> input that claimed it in this batch.
    let mut claimed_outputs: HashMap<PathBuf, PathBuf> = HashMap::new();

    for input in files {
        let task = MediaTask::for_output_folder(&input, &config.output_folder, &config.format);

        if let Some(first) = claimed_outputs.get(task.output()) {
            let message = format!(
                "output {} is already produced from {}",
                task.output().display(),
                first.display()
            );
            eprintln!("FAILED {}: {}", input.display(), message);
            warn!(path = %input.display(), output = %task.output().display(), "Duplicate output path");
            result.fail(input, message);
            continue;
        }
        claimed_outputs.insert(task.output().to_path_buf(), input.clone());

        if is_same_file(task.input(), task.output()) {
            let message = "output would replace its own input".to_string();
            eprintln!("FAILED {}: {}", input.display(), message);
            warn!(path = %input.display(), "Output path equals input path");
            result.fail(input, message);
            continue;
        }

        if task.output().exists() && !config.overwrite {
            info!(output = %task.output().display(), "Output exists, skipping");
            if !config.quiet {
                println!("Skipping (exists): {}", task.output().display());
            }
            result.skip();
            done_originals.push(input);
            continue;
        }

        let output = task.output().to_path_buf();
        let output_existed = output.exists();
        let probed = task.probe(&config.tools.ffprobe);
        match runner.run(&probed, presenter) {
            Ok(report) => {
                if !config.quiet {
                    println!("OK  {} -> {}", report.input.display(), report.output.display());
                }
                result.input_bytes += file_size(&report.input);
                result.output_bytes += file_size(&report.output);
                result.success();
                done_originals.push(input);
            }
            Err(e) => {
                eprintln!("FAILED {}", e);
                if e.is_conversion() && !output_existed {
                    remove_partial_output(&output);
                }
                result.fail(input, e.to_string());
            }
        }
    }

    if let Some(archive_dir) = &config.archive_folder {
        if !done_originals.is_empty() {
            let summary = archive_files(&done_originals, archive_dir);
            for dest in &summary.collisions {
                eprintln!(
                    "Warning: {} already exists in archive, original left in place",
                    dest.display()
                );
            }
            for e in &summary.errors {
                eprintln!("Warning: {}", e);
            }
            result.archived = summary.moved;
            if !config.quiet {
                println!(
                    "Moved {} file(s) to archive: {}",
                    summary.moved,
                    archive_dir.display()
                );
            }
        }
    }

    result.elapsed = started.elapsed();
    info!(
        total = result.total,
        succeeded = result.succeeded,
        failed = result.failed,
        skipped = result.skipped,
        archived = result.archived,
        "Batch finished"
    );
    Ok(result)
}

/// Drop whatever a failed ffmpeg run wrote. A leftover output counts as
/// converted on the next run.
fn remove_partial_output(output: &Path) {
    match fs::remove_file(output) {
        Ok(()) => info!(output = %output.display(), "Removed partial output"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(output = %output.display(), error = %e, "Failed to remove partial output"),
    }
}

fn file_size(path: &Path) -> u64 {
    fs::metadata(path).map(|m| m.len()).unwrap_or(0)
}

fn is_same_file(a: &Path, b: &Path) -> bool {
    if a == b {
        return true;
    }
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formats::TargetFormat;
    use crate::progress::{NoopPresenter, RecordingPresenter};
    use crate::tools::{ExternalTool, ToolPaths};
    use tempfile::TempDir;

    /// ffprobe stand-in reporting a 60 second duration.
    const FAKE_FFPROBE: &str = r#"echo '{"format": {"duration": "60.000000"}}'"#;

    /// ffmpeg stand-in: emits four progress ticks and writes the output file,
    /// which is always the last argument.
    const FAKE_FFMPEG: &str = r#"for last; do :; done
printf 'out_time_ms=15000000\nprogress=continue\nout_time_ms=60000000\nprogress=end\n'
echo converted > "$last""#;

    /// Fails on any input whose name contains "broken".
    const FAKE_FFMPEG_PICKY: &str = r#"for last; do :; done
case "$*" in
  *broken*) echo 'broken.flac: Invalid data found when processing input' >&2; exit 1 ;;
esac
echo converted > "$last""#;

    fn config(root: &Path, ffmpeg: &str) -> ConvertConfig {
        ConvertConfig {
            input_folder: root.join("in"),
            output_folder: root.join("out"),
            format: TargetFormat::default(),
            recursive: false,
            overwrite: false,
            quiet: true,
            archive_folder: None,
            tools: ToolPaths {
                ffmpeg: ExternalTool::shell(ffmpeg),
                ffprobe: ExternalTool::shell(FAKE_FFPROBE),
            },
        }
    }

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"media").unwrap();
    }

    #[test]
    fn test_collect_media_files_sorted_and_filtered() {
        let dir = TempDir::new().unwrap();
        for name in ["b.MP3", "a.flac", "notes.txt", "c.mxf", "sub/d.wav"] {
            touch(&dir.path().join(name));
        }

        let flat = collect_media_files(dir.path(), false);
        let names: Vec<_> = flat
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.flac", "b.MP3", "c.mxf"]);

        let deep = collect_media_files(dir.path(), true);
        assert_eq!(deep.len(), 4);
        assert!(deep.contains(&dir.path().join("sub/d.wav")));
    }

    #[test]
    fn test_missing_input_folder() {
        let dir = TempDir::new().unwrap();
        let cfg = config(dir.path(), FAKE_FFMPEG);
        let err = convert_folder(&cfg, &mut NoopPresenter).unwrap_err();
        assert!(matches!(err, ConvertError::InputFolderMissing(_)));
    }

    #[test]
    fn test_empty_folder() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("in")).unwrap();
        let cfg = config(dir.path(), FAKE_FFMPEG);

        let result = convert_folder(&cfg, &mut NoopPresenter).unwrap();
        assert_eq!(result.total, 0);
        assert!(dir.path().join("out").is_dir());
    }

    #[cfg(unix)]
    #[test]
    fn test_converts_and_reports_progress() {
        let dir = TempDir::new().unwrap();
        touch(&dir.path().join("in/a.flac"));
        touch(&dir.path().join("in/b.mp3"));
        let cfg = config(dir.path(), FAKE_FFMPEG);

        let mut presenter = RecordingPresenter::default();
        let result = convert_folder(&cfg, &mut presenter).unwrap();

        assert_eq!(result.total, 2);
        assert_eq!(result.succeeded, 2);
        assert!(dir.path().join("out/a.wav").exists());
        assert!(dir.path().join("out/b.wav").exists());
        assert_eq!(presenter.fractions(), vec![0.25, 1.0, 0.25, 1.0]);
        assert_eq!(
            presenter.finalizations(),
            vec![("a.flac".to_string(), true), ("b.mp3".to_string(), true)]
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_existing_output_is_skipped() {
        let dir = TempDir::new().unwrap();
        touch(&dir.path().join("in/a.flac"));
        fs::create_dir_all(dir.path().join("out")).unwrap();
        fs::write(dir.path().join("out/a.wav"), b"previous").unwrap();
        let cfg = config(dir.path(), FAKE_FFMPEG);

        let mut presenter = RecordingPresenter::default();
        let result = convert_folder(&cfg, &mut presenter).unwrap();
        assert_eq!(result.skipped, 1);
        assert_eq!(result.succeeded, 0);
        assert!(presenter.events.is_empty());
        assert_eq!(fs::read(dir.path().join("out/a.wav")).unwrap(), b"previous");
    }

    #[cfg(unix)]
    #[test]
    fn test_overwrite_reconverts_existing_output() {
        let dir = TempDir::new().unwrap();
        touch(&dir.path().join("in/a.flac"));
        fs::create_dir_all(dir.path().join("out")).unwrap();
        fs::write(dir.path().join("out/a.wav"), b"previous").unwrap();
        let mut cfg = config(dir.path(), FAKE_FFMPEG);
        cfg.overwrite = true;

        let result = convert_folder(&cfg, &mut NoopPresenter).unwrap();
        assert_eq!(result.succeeded, 1);
        assert_eq!(
            fs::read_to_string(dir.path().join("out/a.wav")).unwrap().trim(),
            "converted"
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_failure_does_not_stop_batch_and_archives_rest() {
        let dir = TempDir::new().unwrap();
        touch(&dir.path().join("in/a.flac"));
        touch(&dir.path().join("in/broken.flac"));
        touch(&dir.path().join("in/c.flac"));
        fs::create_dir_all(dir.path().join("out")).unwrap();
        fs::write(dir.path().join("out/c.wav"), b"previous").unwrap();
        let mut cfg = config(dir.path(), FAKE_FFMPEG_PICKY);
        cfg.archive_folder = Some(dir.path().join("archived"));

        let mut presenter = RecordingPresenter::default();
        let result = convert_folder(&cfg, &mut presenter).unwrap();

        assert_eq!(result.total, 3);
        assert_eq!(result.succeeded, 1);
        assert_eq!(result.failed, 1);
        assert_eq!(result.skipped, 1);
        assert_eq!(result.archived, 2);
        assert!(result.has_failures());
        assert!(result.errors[0].1.contains("Invalid data found"));

        // Converted and skipped originals move; the failed one stays.
        assert!(dir.path().join("archived/a.flac").exists());
        assert!(dir.path().join("archived/c.flac").exists());
        assert!(dir.path().join("in/broken.flac").exists());
        assert!(!dir.path().join("in/a.flac").exists());

        assert_eq!(
            presenter.finalizations(),
            vec![
                ("a.flac".to_string(), true),
                ("broken.flac".to_string(), false)
            ]
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_output_equal_to_input_is_failure() {
        let dir = TempDir::new().unwrap();
        touch(&dir.path().join("in/a.wav"));
        let mut cfg = config(dir.path(), FAKE_FFMPEG);
        cfg.output_folder = dir.path().join("in");
        cfg.overwrite = true;

        let result = convert_folder(&cfg, &mut NoopPresenter).unwrap();
        assert_eq!(result.failed, 1);
        assert_eq!(fs::read(dir.path().join("in/a.wav")).unwrap(), b"media");
    }

    #[cfg(unix)]
    #[test]
    fn test_failed_partial_output_is_removed_and_retried() {
        // Writes half a file, then dies.
        const FAKE_FFMPEG_TRUNCATES: &str = r#"for last; do :; done
echo half > "$last"
echo 'Error while encoding: disk full' >&2
exit 1"#;

        let dir = TempDir::new().unwrap();
        touch(&dir.path().join("in/a.flac"));
        let mut cfg = config(dir.path(), FAKE_FFMPEG_TRUNCATES);
        cfg.archive_folder = Some(dir.path().join("archived"));

        let first = convert_folder(&cfg, &mut NoopPresenter).unwrap();
        assert_eq!(first.failed, 1);
        assert!(!dir.path().join("out/a.wav").exists());
        assert!(dir.path().join("in/a.flac").exists());

        // Second run tries again instead of skipping and archiving.
        let second = convert_folder(&cfg, &mut NoopPresenter).unwrap();
        assert_eq!(second.failed, 1);
        assert_eq!(second.skipped, 0);
        assert_eq!(second.archived, 0);
        assert!(dir.path().join("in/a.flac").exists());
        assert!(!dir.path().join("archived/a.flac").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_failed_overwrite_keeps_existing_output() {
        const FAKE_FFMPEG_FAILS: &str = "echo 'Error opening input' >&2; exit 1";

        let dir = TempDir::new().unwrap();
        touch(&dir.path().join("in/a.flac"));
        fs::create_dir_all(dir.path().join("out")).unwrap();
        fs::write(dir.path().join("out/a.wav"), b"previous").unwrap();
        let mut cfg = config(dir.path(), FAKE_FFMPEG_FAILS);
        cfg.overwrite = true;

        let result = convert_folder(&cfg, &mut NoopPresenter).unwrap();
        assert_eq!(result.failed, 1);
        assert_eq!(fs::read(dir.path().join("out/a.wav")).unwrap(), b"previous");
    }

    #[cfg(unix)]
    #[test]
    fn test_recursive_duplicate_output_name_is_failure() {
        let dir = TempDir::new().unwrap();
        touch(&dir.path().join("in/a/x.flac"));
        touch(&dir.path().join("in/b/x.flac"));
        let mut cfg = config(dir.path(), FAKE_FFMPEG);
        cfg.recursive = true;
        cfg.archive_folder = Some(dir.path().join("archived"));

        let result = convert_folder(&cfg, &mut NoopPresenter).unwrap();
        assert_eq!(result.succeeded, 1);
        assert_eq!(result.skipped, 0);
        assert_eq!(result.failed, 1);
        assert_eq!(result.errors[0].0, dir.path().join("in/b/x.flac"));
        assert!(result.errors[0].1.contains("already produced from"));

        // Only the converted one is archived.
        assert_eq!(result.archived, 1);
        assert!(dir.path().join("in/b/x.flac").exists());
    }

    #[test]
    fn test_batch_result_counts() {
        let mut result = BatchResult::new();
        result.success();
        result.success();
        result.fail(PathBuf::from("x.wav"), "Error".to_string());
        result.skip();

        assert_eq!(result.total, 4);
        assert_eq!(result.total, result.succeeded + result.failed + result.skipped);
        assert!((result.success_rate() - 50.0).abs() < 0.001);
        assert!(result.has_failures());
    }

    #[test]
    fn test_success_rate_empty() {
        assert!((BatchResult::new().success_rate() - 100.0).abs() < 0.001);
    }
}
