use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConvertError {
    /// ffmpeg could not be launched or exited unsuccessfully for one file.
    #[error("Conversion failed for {}{}: {diagnostic}", path.display(), exit_code_suffix(*exit_code))]
    Conversion {
        path: PathBuf,
        exit_code: Option<i32>,
        diagnostic: String,
    },

    #[error("External tool not found: {0} (install ffmpeg and make sure it is in PATH)")]
    ToolNotFound(String),

    #[error("Input folder does not exist: {}", .0.display())]
    InputFolderMissing(PathBuf),

    #[error("Invalid output format: {0:?}")]
    InvalidFormat(String),

    #[error("Failed to archive {}: {source}", path.display())]
    Archive {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Config error: {0}")]
    Config(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn exit_code_suffix(code: Option<i32>) -> String {
    match code {
        Some(code) => format!(" (exit code {})", code),
        None => String::new(),
    }
}

impl ConvertError {
    pub fn is_conversion(&self) -> bool {
        matches!(self, ConvertError::Conversion { .. })
    }
}

pub type Result<T> = std::result::Result<T, ConvertError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conversion_error_display() {
        let err = ConvertError::Conversion {
            path: PathBuf::from("in/song.flac"),
            exit_code: Some(1),
            diagnostic: "Invalid data found when processing input".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("in/song.flac"));
        assert!(msg.contains("exit code 1"));
        assert!(msg.contains("Invalid data found"));
        assert!(err.is_conversion());
    }

    #[test]
    fn test_conversion_error_without_exit_code() {
        let err = ConvertError::Conversion {
            path: PathBuf::from("a.wav"),
            exit_code: None,
            diagnostic: "terminated by signal".to_string(),
        };
        assert_eq!(err.to_string(), "Conversion failed for a.wav: terminated by signal");
    }

    #[test]
    fn test_tool_not_found_is_not_conversion() {
        let err = ConvertError::ToolNotFound("ffprobe".to_string());
        assert!(!err.is_conversion());
        assert!(err.to_string().contains("ffprobe"));
    }
}
