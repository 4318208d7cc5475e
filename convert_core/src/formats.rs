//! Media Formats Module
//!
//! Input extensions picked up by the batch scan, and the target format
//! (output extension + ffmpeg codec arguments) for a conversion run.

use crate::errors::{ConvertError, Result};
use std::fmt;
use std::path::Path;

/// Extensions collected from the input folder (audio plus simple video containers).
pub const MEDIA_EXTENSIONS: &[&str] = &[
    "wav", "flac", "aac", "ogg", "mp3", "mp4", "m4a", "mxf", "mov", "avi",
];

pub const DEFAULT_FORMAT: &str = "wav";

/// Lowercase extension of `path`, empty if there is none.
///
/// ```
/// use std::path::Path;
/// use convert_core::formats::get_extension_lowercase;
///
/// assert_eq!(get_extension_lowercase(Path::new("take.WAV")), "wav");
/// assert_eq!(get_extension_lowercase(Path::new("noext")), "");
/// ```
pub fn get_extension_lowercase(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default()
}

pub fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    let ext = get_extension_lowercase(path);
    extensions.contains(&ext.as_str())
}

pub fn is_media_file(path: &Path) -> bool {
    has_extension(path, MEDIA_EXTENSIONS)
}

/// Output format of a conversion run, identified by its file extension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetFormat {
    extension: String,
}

impl TargetFormat {
    /// Accepts `mp3`, `.mp3` or `MP3`. Rejects empty values and anything that
    /// would escape the output folder when used as an extension.
    pub fn parse(value: &str) -> Result<Self> {
        let extension = value.trim().trim_start_matches('.').to_lowercase();
        if extension.is_empty()
            || !extension
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(ConvertError::InvalidFormat(value.to_string()));
        }
        Ok(Self { extension })
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    /// Codec arguments placed between the input and the output path.
    ///
    /// Containers not listed here are left to ffmpeg's own defaults.
    pub fn codec_args(&self) -> &'static [&'static str] {
        match self.extension.as_str() {
            "wav" => &["-c:a", "pcm_s16le"],
            "mp3" => &["-c:a", "libmp3lame", "-q:a", "2"],
            "flac" => &["-c:a", "flac"],
            "ogg" => &["-c:a", "libvorbis", "-q:a", "5"],
            "m4a" | "aac" => &["-c:a", "aac", "-b:a", "192k"],
            "mp4" | "mov" => &["-c:v", "libx264", "-pix_fmt", "yuv420p", "-c:a", "aac"],
            _ => &[],
        }
    }

    /// Audio-only targets drop any video stream of the input.
    pub fn is_audio_only(&self) -> bool {
        matches!(
            self.extension.as_str(),
            "wav" | "mp3" | "flac" | "ogg" | "m4a" | "aac"
        )
    }
}

impl Default for TargetFormat {
    fn default() -> Self {
        Self {
            extension: DEFAULT_FORMAT.to_string(),
        }
    }
}

impl fmt::Display for TargetFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.extension)
    }
}
