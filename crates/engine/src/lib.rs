//! UI-agnostic timeline engine for the Trimline video editor.

pub mod api;
pub mod audio_sync;
pub mod backend;
pub mod config;
pub mod error;
pub mod export;
pub mod segments;
pub mod session;
pub mod thumbnails;
pub mod time;

pub use api::{Command, Engine, EngineErrorEvent, EngineErrorKind, Event, ExportResult};
pub use backend::{FileTypeFilter, MediaBackend, PickedFile};
pub use config::{EditorConfig, EditorFeatures, EditorTool};
pub use error::{EngineError, Result};
pub use export::{AspectRatio, ExportConfig, OperationElement};
pub use segments::{Segment, SegmentId, SegmentKind, SegmentStore};
pub use session::{EditorSession, NaturalSize, SessionSnapshot};
pub use time::{PlaybackMode, TimeDomain};
