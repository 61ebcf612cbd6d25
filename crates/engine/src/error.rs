use std::fmt::{Display, Formatter};
use std::path::PathBuf;

use crate::config::EditorTool;
use crate::segments::{SegmentId, SegmentKindTag};
use crate::time::PlaybackMode;

/// Result type used by the engine crate.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors produced by engine commands and timeline operations.
#[derive(Debug)]
pub enum EngineError {
    InvalidDuration(f64),
    InvalidSource,
    ExportFailure {
        message: String,
    },
    PickerCancelled,
    SourceNotLoaded,
    SegmentIdNotFound {
        segment_id: SegmentId,
    },
    SegmentKindMismatch {
        segment_id: SegmentId,
        expected: SegmentKindTag,
        found: SegmentKindTag,
    },
    InvalidSegmentRange {
        start: f64,
        end: f64,
    },
    InvalidModeTransition {
        from: PlaybackMode,
        to: PlaybackMode,
    },
    FeatureDisabled(EditorTool),
    ThumbnailGeneration {
        reason: String,
    },
    ConfigIo {
        path: PathBuf,
        source: std::io::Error,
    },
    ConfigParse {
        path: PathBuf,
        source: serde_json::Error,
    },
    Serialization(serde_json::Error),
}

impl Display for EngineError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidDuration(duration) => write!(f, "invalid duration: {duration}"),
            Self::InvalidSource => write!(f, "media source uri is empty"),
            Self::ExportFailure { message } => write!(f, "export failed: {message}"),
            Self::PickerCancelled => write!(f, "file picker was cancelled"),
            Self::SourceNotLoaded => write!(f, "source is not loaded"),
            Self::SegmentIdNotFound { segment_id } => {
                write!(f, "segment id not found: {segment_id}")
            }
            Self::SegmentKindMismatch {
                segment_id,
                expected,
                found,
            } => write!(
                f,
                "segment {segment_id} is a {found} segment, cannot apply {expected} changes"
            ),
            Self::InvalidSegmentRange { start, end } => {
                write!(f, "invalid segment range: {start}..{end}")
            }
            Self::InvalidModeTransition { from, to } => {
                write!(f, "invalid playback mode transition: {from} -> {to}")
            }
            Self::FeatureDisabled(tool) => write!(f, "editor tool is disabled: {tool}"),
            Self::ThumbnailGeneration { reason } => {
                write!(f, "thumbnail generation failed: {reason}")
            }
            Self::ConfigIo { path, source } => {
                write!(f, "failed to read config {} ({source})", path.display())
            }
            Self::ConfigParse { path, source } => {
                write!(f, "failed to parse config {} ({source})", path.display())
            }
            Self::Serialization(err) => write!(f, "export serialization failed: {err}"),
        }
    }
}

impl std::error::Error for EngineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::ConfigIo { source, .. } => Some(source),
            Self::ConfigParse { source, .. } => Some(source),
            Self::Serialization(err) => Some(err),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization(value)
    }
}
