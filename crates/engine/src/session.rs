use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::EditorConfig;
use crate::error::{EngineError, Result};
use crate::export::{AspectRatio, ExportSnapshot};
use crate::segments::{Segment, SegmentId, SegmentStore};
use crate::thumbnails::ThumbnailPipeline;
use crate::time::{PlaybackMode, TimeDomain};

/// Pixel size of the decoded source, reported by the playback collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NaturalSize {
    pub width: f64,
    pub height: f64,
}

/// Edit state of one editor session, owned by the engine and lent to each component.
#[derive(Debug, Clone, PartialEq)]
pub struct EditorSession {
    pub source_uri: Option<String>,
    pub natural_size: Option<NaturalSize>,
    pub time: TimeDomain,
    pub segments: SegmentStore,
    pub thumbnails: ThumbnailPipeline,
    pub aspect_ratio: AspectRatio,
    pub muted: bool,
}

impl EditorSession {
    pub fn new(config: &EditorConfig) -> Self {
        Self {
            source_uri: None,
            natural_size: None,
            time: TimeDomain::new(config.min_trim_gap),
            segments: SegmentStore::new(),
            thumbnails: ThumbnailPipeline::new(),
            aspect_ratio: AspectRatio::default(),
            muted: false,
        }
    }

    /// Switches to a new source and drops every edit made on the old one.
    pub fn change_source(&mut self, uri: String) {
        info!(uri = %uri, previous = ?self.source_uri, "source changed");
        self.source_uri = Some(uri);
        self.natural_size = None;
        self.time.unload();
        self.segments.clear();
        self.thumbnails.reset();
        self.aspect_ratio = AspectRatio::default();
        self.muted = false;
    }

    pub fn source_uri(&self) -> Result<&str> {
        self.source_uri.as_deref().ok_or(EngineError::InvalidSource)
    }

    /// Fails with `SourceNotLoaded` until the source duration is known.
    pub fn ensure_loaded(&self) -> Result<()> {
        if self.time.is_loaded() {
            Ok(())
        } else {
            Err(EngineError::SourceNotLoaded)
        }
    }

    /// Copies the state the export builder reads.
    pub fn export_snapshot(&self) -> Result<ExportSnapshot> {
        Ok(ExportSnapshot {
            source_uri: self.source_uri()?.to_string(),
            time: self.time.clone(),
            segments: self.segments.clone(),
            aspect_ratio: self.aspect_ratio,
            muted: self.muted,
        })
    }

    /// Creates an immutable snapshot for the host UI.
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            source_uri: self.source_uri.clone(),
            natural_size: self.natural_size,
            duration: self.time.duration(),
            trim_start: self.time.trim_start(),
            trim_end: self.time.trim_end(),
            current_time: self.time.current_time(),
            mode: self.time.mode(),
            segments: self.segments.iter().cloned().collect(),
            selected_segment: self.segments.selected(),
            aspect_ratio: self.aspect_ratio,
            muted: self.muted,
        }
    }
}

/// Immutable session snapshot consumed by the host UI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub source_uri: Option<String>,
    pub natural_size: Option<NaturalSize>,
    pub duration: f64,
    pub trim_start: f64,
    pub trim_end: f64,
    pub current_time: f64,
    pub mode: PlaybackMode,
    pub segments: Vec<Segment>,
    pub selected_segment: Option<SegmentId>,
    pub aspect_ratio: AspectRatio,
    pub muted: bool,
}

#[cfg(test)]
mod tests {
    use super::EditorSession;
    use crate::config::EditorConfig;
    use crate::error::EngineError;
    use crate::export::AspectRatio;
    use crate::segments::{SegmentKind, VoiceOverClip};

    #[test]
    fn change_source_drops_state_of_previous_source() {
        let mut session = EditorSession::new(&EditorConfig::default());
        session.change_source("a.mp4".to_string());
        session.time.load(10.0).expect("load");
        session
            .segments
            .add(
                0.0,
                2.0,
                SegmentKind::VoiceOver(VoiceOverClip {
                    uri: "v.m4a".to_string(),
                }),
                10.0,
            )
            .expect("voice-over");
        session.aspect_ratio = AspectRatio::Square;
        session.muted = true;
        let token_before = session.thumbnails.token();

        session.change_source("b.mp4".to_string());

        assert!(!session.time.is_loaded());
        assert!(session.segments.is_empty());
        assert!(session.thumbnails.token() > token_before);
        assert_eq!(session.aspect_ratio, AspectRatio::Original);
        assert!(!session.muted);
        assert_eq!(session.snapshot().source_uri.as_deref(), Some("b.mp4"));
    }

    #[test]
    fn export_snapshot_requires_source() {
        let session = EditorSession::new(&EditorConfig::default());
        assert!(matches!(
            session.export_snapshot(),
            Err(EngineError::InvalidSource)
        ));
    }
}
