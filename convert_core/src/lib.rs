//! Batch media conversion on top of ffmpeg
//!
//! This crate provides everything behind the `convert-audio` tool:
//! - Discovery of media files and target format handling
//! - ffprobe duration probing
//! - The ffmpeg job runner with deadlock-free progress tracking
//! - Terminal progress bars
//! - Persisted folder defaults, archiving and summary reporting

pub mod archive;
pub mod batch;
pub mod config;
pub mod errors;
pub mod ffmpeg_process;
pub mod ffprobe;
pub mod formats;
pub mod logging;
pub mod progress;
pub mod progress_parser;
pub mod report;
pub mod runner;
pub mod task;
pub mod tools;

pub use archive::{archive_file, archive_files, ArchiveOutcome, ArchiveSummary};
pub use batch::{collect_media_files, convert_folder, BatchResult};
pub use config::{
    ConvertConfig, DefaultsStore, StoredDefaults, CONFIG_FILE_NAME, DEFAULT_ARCHIVE_FOLDER,
    DEFAULT_INPUT_FOLDER, DEFAULT_OUTPUT_FOLDER,
};
pub use errors::{ConvertError, Result};
pub use ffmpeg_process::{format_ffmpeg_error, DiagnosticTail, FfmpegProcess};
pub use ffprobe::{probe_duration, MediaDuration};
pub use formats::{is_media_file, TargetFormat, DEFAULT_FORMAT, MEDIA_EXTENSIONS};
pub use logging::{init_logging, LogConfig};
pub use progress::{
    presenter_for, BarPresenter, NoopPresenter, ProgressFraction, ProgressPresenter,
};
pub use progress_parser::{ProgressParser, ProgressSample};
pub use report::print_summary_report;
pub use runner::{JobReport, JobRunner};
pub use task::{MediaTask, ProbedTask};
pub use tools::{ExternalTool, ToolPaths};
