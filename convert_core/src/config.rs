//! Configuration
//!
//! Two layers:
//! - [`StoredDefaults`]: folder defaults persisted as JSON in the user's home
//!   directory (`~/.convert_audio_tool.json`).
//! - [`ConvertConfig`]: the fully resolved settings of one run, passed
//!   explicitly to the batch orchestrator.

use crate::errors::Result;
use crate::formats::TargetFormat;
use crate::tools::ToolPaths;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub const CONFIG_FILE_NAME: &str = ".convert_audio_tool.json";

pub const DEFAULT_INPUT_FOLDER: &str = "input_folder";
pub const DEFAULT_OUTPUT_FOLDER: &str = "output_folder/odpovedi";
pub const DEFAULT_ARCHIVE_FOLDER: &str = "archived";

/// Folder defaults as stored on disk. `None` means "not set"; a `null`
/// archive written by `--no-archive --save-defaults` falls back to the
/// built-in archive folder on the next run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StoredDefaults {
    pub input_folder: Option<String>,
    pub output_folder: Option<String>,
    pub archive: Option<String>,
}

impl StoredDefaults {
    /// Lenient parse: anything that is not a JSON object gives empty
    /// defaults, and keys holding non-string values are skipped.
    pub fn from_json(text: &str) -> std::result::Result<Self, serde_json::Error> {
        let value: serde_json::Value = serde_json::from_str(text)?;
        let Some(map) = value.as_object() else {
            return Ok(Self::default());
        };
        let get = |key: &str| map.get(key).and_then(|v| v.as_str()).map(String::from);
        Ok(Self {
            input_folder: get("input_folder"),
            output_folder: get("output_folder"),
            archive: get("archive"),
        })
    }

    pub fn input_folder_or_default(&self) -> &str {
        non_empty(&self.input_folder).unwrap_or(DEFAULT_INPUT_FOLDER)
    }

    pub fn output_folder_or_default(&self) -> &str {
        non_empty(&self.output_folder).unwrap_or(DEFAULT_OUTPUT_FOLDER)
    }

    pub fn archive_or_default(&self) -> &str {
        non_empty(&self.archive).unwrap_or(DEFAULT_ARCHIVE_FOLDER)
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|s| !s.is_empty())
}

/// Location of the persisted defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefaultsStore {
    path: PathBuf,
}

impl DefaultsStore {
    /// Store backed by an explicit file.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `~/.convert_audio_tool.json`, falling back to the current directory
    /// when no home directory is known.
    pub fn in_home_dir() -> Self {
        let home = std::env::var_os("HOME")
            .or_else(|| std::env::var_os("USERPROFILE"))
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));
        Self::new(home.join(CONFIG_FILE_NAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Missing or corrupt files give empty defaults; never an error.
    pub fn load(&self) -> StoredDefaults {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) => {
                debug!(path = %self.path.display(), error = %e, "No stored defaults");
                return StoredDefaults::default();
            }
        };

        match StoredDefaults::from_json(&text) {
            Ok(defaults) => defaults,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Ignoring corrupt config file");
                StoredDefaults::default()
            }
        }
    }

    /// Write pretty JSON, replacing the previous file.
    pub fn save(&self, defaults: &StoredDefaults) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_string_pretty(defaults)?;
        fs::write(&self.path, json)?;
        debug!(path = %self.path.display(), "Saved defaults");
        Ok(())
    }
}

/// Everything one batch run needs. No global state: the orchestrator and
/// job runner read only from here.
#[derive(Debug, Clone)]
pub struct ConvertConfig {
    pub input_folder: PathBuf,
    pub output_folder: PathBuf,
    pub format: TargetFormat,
    pub recursive: bool,
    pub overwrite: bool,
    pub quiet: bool,
    /// `None` leaves originals where they are.
    pub archive_folder: Option<PathBuf>,
    pub tools: ToolPaths,
}
