use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::audio_sync::{self, TickOutcome};
use crate::backend::{FileTypeFilter, MediaBackend, PickedFile};
use crate::config::{EditorConfig, EditorTool};
use crate::error::{EngineError, Result};
use crate::export::{AspectRatio, TextGeometry};
use crate::segments::{
    AudioClip, SegmentId, SegmentKind, SegmentKindTag, SegmentPatch, TextOverlay, VoiceOverClip,
};
use crate::session::{EditorSession, NaturalSize, SessionSnapshot};
use crate::thumbnails::{GenerationToken, ThumbnailDescriptor, ThumbnailRequest, ThumbnailRun};
use crate::time::PlaybackMode;

/// Commands accepted by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Command {
    /// Opens a new source, discarding every edit tied to the previous one.
    LoadSource { uri: String },
    /// Load callback of the playback collaborator.
    ///
    /// The first callback after `LoadSource` fixes the duration and starts
    /// thumbnail generation; later ones only refresh the natural size.
    SourceLoaded {
        duration: f64,
        #[serde(default)]
        natural_size: Option<NaturalSize>,
    },
    Play,
    Pause,
    TogglePlayback,
    /// Moves the playhead to a window-relative `time`.
    Seek { time: f64 },
    /// Progress callback carrying the decoded *source* position.
    PlaybackProgress { current_time: f64 },
    BeginScrub,
    EndScrub,
    BeginTrim,
    /// Sets the trim window in source seconds; the engine clamps it.
    ///
    /// Outside a trim drag a material change regenerates thumbnails right away.
    ///
    /// # Example
    /// ```ignore
    /// use engine::{Command, Engine};
    ///
    /// let mut engine = Engine::new(backend);
    /// let _ = engine.handle_command(Command::LoadSource { uri: "video.mp4".into() });
    /// let _ = engine.handle_command(Command::SourceLoaded { duration: 20.0, natural_size: None });
    /// let _ = engine.handle_command(Command::SetTrim { start: 2.0, end: 18.0 });
    /// ```
    SetTrim { start: f64, end: f64 },
    /// Ends a trim drag; thumbnails are regenerated when the window moved materially.
    EndTrim,
    SetAspectRatio { ratio: AspectRatio },
    SetMuted { muted: bool },
    /// Asks the picker for a background-music file.
    PickBackgroundAudio,
    /// Adds background music, replacing any existing music segment.
    ///
    /// The span defaults to the whole source.
    AddAudio {
        uri: String,
        clip_duration: f64,
        #[serde(default)]
        audio_offset: f64,
        #[serde(default)]
        is_looped: bool,
        #[serde(default)]
        start: Option<f64>,
        #[serde(default)]
        end: Option<f64>,
    },
    /// Adds a text overlay; missing style fields come from the configured defaults.
    AddText {
        text: String,
        #[serde(default)]
        font_size: Option<f64>,
        #[serde(default)]
        color: Option<String>,
        #[serde(default)]
        background_color: Option<String>,
        #[serde(default)]
        x: f64,
        #[serde(default)]
        y: f64,
        #[serde(default)]
        start: Option<f64>,
        #[serde(default)]
        end: Option<f64>,
    },
    AddVoiceOver { uri: String, start: f64, end: f64 },
    UpdateSegment { id: SegmentId, patch: SegmentPatch },
    RemoveSegment { id: SegmentId },
    SelectSegment { id: Option<SegmentId> },
    /// Pulls the next batch of the running thumbnail generation.
    PollThumbnails,
    ResetThumbnails,
    Export,
    /// Closes the editor without exporting.
    Cancel,
}

/// Events emitted by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Event {
    SessionChanged(SessionSnapshot),
    PlayheadChanged {
        current_time: f64,
    },
    ModeChanged {
        mode: PlaybackMode,
    },
    /// Player positions and volumes after a seek or a progress callback.
    PlaybackSynced(TickOutcome),
    ThumbnailsChanged {
        token: GenerationToken,
        thumbnails: Vec<ThumbnailDescriptor>,
        is_generating: bool,
    },
    AudioPicked(PickedFile),
    SegmentAdded {
        id: SegmentId,
    },
    EditorClosed(ExportResult),
    Error(EngineErrorEvent),
}

/// Outcome reported to the host when the editor closes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exported_uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Coarse classification of errors shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineErrorKind {
    SourceNotLoaded,
    SegmentNotFound,
    FeatureDisabled,
    InvalidEdit,
    Other,
}

impl From<&EngineError> for EngineErrorKind {
    fn from(value: &EngineError) -> Self {
        match value {
            EngineError::SourceNotLoaded | EngineError::InvalidSource => Self::SourceNotLoaded,
            EngineError::SegmentIdNotFound { .. } => Self::SegmentNotFound,
            EngineError::FeatureDisabled(_) => Self::FeatureDisabled,
            EngineError::SegmentKindMismatch { .. }
            | EngineError::InvalidSegmentRange { .. }
            | EngineError::InvalidModeTransition { .. } => Self::InvalidEdit,
            _ => Self::Other,
        }
    }
}

/// User-facing error payload emitted as an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineErrorEvent {
    pub kind: EngineErrorKind,
    pub message: String,
}

impl EngineErrorEvent {
    pub fn from_error(error: &EngineError) -> Self {
        Self {
            kind: EngineErrorKind::from(error),
            message: error.to_string(),
        }
    }
}

/// Timeline engine driving one editor session.
///
/// All mutations go through `handle_command` on a single thread. The only
/// suspension points are thumbnail batches, pulled by `PollThumbnails`, and
/// the export call.
#[derive(Debug)]
pub struct Engine<M> {
    media: M,
    config: EditorConfig,
    session: EditorSession,
    thumbnail_run: Option<ThumbnailRun>,
}

impl<M> Engine<M>
where
    M: MediaBackend,
{
    /// Creates an engine with default settings.
    pub fn new(media: M) -> Self {
        Self::with_config(media, EditorConfig::default())
    }

    pub fn with_config(media: M, config: EditorConfig) -> Self {
        let session = EditorSession::new(&config);
        Self {
            media,
            config,
            session,
            thumbnail_run: None,
        }
    }

    pub fn config(&self) -> &EditorConfig {
        &self.config
    }

    pub fn session(&self) -> &EditorSession {
        &self.session
    }

    /// Applies one command and returns emitted events.
    pub fn handle_command(&mut self, command: Command) -> Result<Vec<Event>> {
        match command {
            Command::LoadSource { uri } => self.load_source(uri),
            Command::SourceLoaded {
                duration,
                natural_size,
            } => self.source_loaded(duration, natural_size),
            Command::Play => self.set_mode(PlaybackMode::Playing),
            Command::Pause => self.set_mode(PlaybackMode::Idle),
            Command::TogglePlayback => {
                let next = if self.session.time.is_playing() {
                    PlaybackMode::Idle
                } else {
                    PlaybackMode::Playing
                };
                self.set_mode(next)
            }
            Command::Seek { time } => self.seek(time),
            Command::PlaybackProgress { current_time } => self.playback_progress(current_time),
            Command::BeginScrub => self.set_mode(PlaybackMode::Scrubbing),
            Command::EndScrub => self.end_drag(PlaybackMode::Scrubbing),
            Command::BeginTrim => {
                self.config.features.ensure(EditorTool::Trim)?;
                self.set_mode(PlaybackMode::Trimming)
            }
            Command::SetTrim { start, end } => self.set_trim(start, end),
            Command::EndTrim => self.end_trim(),
            Command::SetAspectRatio { ratio } => self.set_aspect_ratio(ratio),
            Command::SetMuted { muted } => self.set_muted(muted),
            Command::PickBackgroundAudio => self.pick_background_audio(),
            Command::AddAudio {
                uri,
                clip_duration,
                audio_offset,
                is_looped,
                start,
                end,
            } => {
                self.config.features.ensure(EditorTool::BackgroundMusic)?;
                let clip = AudioClip {
                    uri,
                    audio_offset,
                    is_looped,
                    clip_duration,
                };
                self.add_segment(start, end, SegmentKind::Audio(clip))
            }
            Command::AddText {
                text,
                font_size,
                color,
                background_color,
                x,
                y,
                start,
                end,
            } => {
                self.config.features.ensure(EditorTool::TextOverlay)?;
                let defaults = &self.config.text_defaults;
                let overlay = TextOverlay {
                    text,
                    font_size: font_size.unwrap_or(defaults.font_size),
                    color: color.unwrap_or_else(|| defaults.color.clone()),
                    background_color: background_color
                        .unwrap_or_else(|| defaults.background_color.clone()),
                    x,
                    y,
                };
                self.add_segment(start, end, SegmentKind::Text(overlay))
            }
            Command::AddVoiceOver { uri, start, end } => {
                self.config.features.ensure(EditorTool::VoiceOver)?;
                self.add_segment(
                    Some(start),
                    Some(end),
                    SegmentKind::VoiceOver(VoiceOverClip { uri }),
                )
            }
            Command::UpdateSegment { id, patch } => self.update_segment(id, patch),
            Command::RemoveSegment { id } => self.remove_segment(id),
            Command::SelectSegment { id } => self.select_segment(id),
            Command::PollThumbnails => self.poll_thumbnails(),
            Command::ResetThumbnails => {
                self.session.thumbnails.reset();
                self.thumbnail_run = None;
                Ok(vec![self.thumbnails_event()])
            }
            Command::Export => Ok(vec![Event::EditorClosed(self.export())]),
            Command::Cancel => {
                info!("editor closed without export");
                Ok(vec![Event::EditorClosed(ExportResult {
                    success: false,
                    exported_uri: None,
                    error: None,
                })])
            }
        }
    }

    /// Serializes the current edit state into the export JSON.
    ///
    /// The state is snapshotted first, so a host running the encode call
    /// asynchronously may keep feeding commands meanwhile.
    pub fn prepare_export(&self) -> Result<String> {
        let snapshot = self.session.export_snapshot()?;
        snapshot
            .build(&TextGeometry::from_config(&self.config))
            .to_json()
    }

    fn load_source(&mut self, uri: String) -> Result<Vec<Event>> {
        if uri.trim().is_empty() {
            warn!("load ignored: {}", EngineError::InvalidSource);
            return Ok(Vec::new());
        }

        self.thumbnail_run = None;
        self.session.change_source(uri);
        Ok(vec![
            Event::SessionChanged(self.session.snapshot()),
            self.thumbnails_event(),
        ])
    }

    fn source_loaded(
        &mut self,
        duration: f64,
        natural_size: Option<NaturalSize>,
    ) -> Result<Vec<Event>> {
        let Some(uri) = self.session.source_uri.clone() else {
            warn!(duration, "load callback ignored: {}", EngineError::InvalidSource);
            return Ok(Vec::new());
        };

        if natural_size.is_some() {
            self.session.natural_size = natural_size;
        }
        if self.session.time.is_loaded() {
            debug!(
                duration,
                fixed_duration = self.session.time.duration(),
                "load callback after first load keeps duration"
            );
            return Ok(vec![Event::SessionChanged(self.session.snapshot())]);
        }

        if let Err(error) = self.session.time.load(duration) {
            warn!(duration, %error, "load callback ignored");
            return Ok(Vec::new());
        }
        info!(uri = %uri, duration, "source loaded");

        let mut events = vec![
            Event::SessionChanged(self.session.snapshot()),
            Event::PlayheadChanged { current_time: 0.0 },
        ];
        if let Some(request) = self.session.thumbnails.begin_generate(&uri, duration) {
            self.start_thumbnail_run(request);
            events.push(self.thumbnails_event());
        }
        Ok(events)
    }

    fn set_mode(&mut self, mode: PlaybackMode) -> Result<Vec<Event>> {
        self.session.ensure_loaded()?;
        let previous = self.session.time.mode();
        self.session.time.set_mode(mode)?;
        if previous == mode {
            return Ok(Vec::new());
        }
        Ok(vec![Event::ModeChanged { mode }])
    }

    fn end_drag(&mut self, drag: PlaybackMode) -> Result<Vec<Event>> {
        if self.session.time.mode() != drag {
            debug!(mode = %self.session.time.mode(), expected = %drag, "drag end ignored");
            return Ok(Vec::new());
        }
        self.set_mode(PlaybackMode::Idle)
    }

    fn seek(&mut self, time: f64) -> Result<Vec<Event>> {
        self.session.ensure_loaded()?;
        let current_time = self.session.time.seek(time);
        let sync = audio_sync::plan(current_time, &self.session.segments, self.session.muted);
        let outcome = TickOutcome {
            wrapped: false,
            video_seek: Some(self.session.time.to_source_time(current_time)),
            sync,
        };

        Ok(vec![
            Event::PlayheadChanged { current_time },
            Event::PlaybackSynced(outcome),
        ])
    }

    fn playback_progress(&mut self, source_time: f64) -> Result<Vec<Event>> {
        self.session.ensure_loaded()?;
        let before = self.session.time.current_time();
        let outcome = audio_sync::on_progress(
            &mut self.session.time,
            &self.session.segments,
            self.session.muted,
            source_time,
        );

        let mut events = Vec::with_capacity(2);
        let after = self.session.time.current_time();
        if after != before {
            events.push(Event::PlayheadChanged {
                current_time: after,
            });
        }
        events.push(Event::PlaybackSynced(outcome));
        Ok(events)
    }

    fn set_trim(&mut self, start: f64, end: f64) -> Result<Vec<Event>> {
        self.config.features.ensure(EditorTool::Trim)?;
        if !self.session.time.set_trim(start, end) {
            return Ok(Vec::new());
        }

        let mut events = vec![Event::SessionChanged(self.session.snapshot())];
        // Inside a drag the strip is regenerated once, on EndTrim.
        if self.session.time.mode() != PlaybackMode::Trimming {
            events.extend(self.regenerate_for_trim()?);
        }
        Ok(events)
    }

    fn end_trim(&mut self) -> Result<Vec<Event>> {
        let mut events = self.end_drag(PlaybackMode::Trimming)?;
        if events.is_empty() {
            return Ok(events);
        }
        events.extend(self.regenerate_for_trim()?);
        Ok(events)
    }

    /// Restarts thumbnail generation when the trim window moved materially.
    fn regenerate_for_trim(&mut self) -> Result<Option<Event>> {
        let time = &self.session.time;
        let (start, window) = (time.trim_start(), time.window_len());
        if !self.session.thumbnails.is_material_change(
            start,
            window,
            self.config.thumbnails.regenerate_threshold,
        ) {
            return Ok(None);
        }

        let uri = self.session.source_uri()?.to_string();
        let Some(request) = self.session.thumbnails.begin_regenerate(&uri, start, window) else {
            return Ok(None);
        };
        self.start_thumbnail_run(request);
        Ok(Some(self.thumbnails_event()))
    }

    fn set_aspect_ratio(&mut self, ratio: AspectRatio) -> Result<Vec<Event>> {
        self.config.features.ensure(EditorTool::Crop)?;
        if self.session.aspect_ratio == ratio {
            return Ok(Vec::new());
        }
        debug!(from = ?self.session.aspect_ratio, to = ?ratio, "aspect ratio changed");
        self.session.aspect_ratio = ratio;
        Ok(vec![Event::SessionChanged(self.session.snapshot())])
    }

    fn set_muted(&mut self, muted: bool) -> Result<Vec<Event>> {
        self.config.features.ensure(EditorTool::Mute)?;
        if self.session.muted == muted {
            return Ok(Vec::new());
        }
        self.session.muted = muted;
        Ok(vec![Event::SessionChanged(self.session.snapshot())])
    }

    fn pick_background_audio(&mut self) -> Result<Vec<Event>> {
        self.config.features.ensure(EditorTool::BackgroundMusic)?;
        match self.media.pick_file(FileTypeFilter::Audio) {
            Ok(file) => {
                info!(uri = %file.uri, name = %file.name, "background audio picked");
                Ok(vec![Event::AudioPicked(file)])
            }
            Err(EngineError::PickerCancelled) => {
                debug!("background audio picker dismissed");
                Ok(Vec::new())
            }
            Err(error) => {
                warn!(%error, "background audio picker failed");
                Ok(vec![Event::Error(EngineErrorEvent::from_error(&error))])
            }
        }
    }

    fn add_segment(
        &mut self,
        start: Option<f64>,
        end: Option<f64>,
        kind: SegmentKind,
    ) -> Result<Vec<Event>> {
        self.session.ensure_loaded()?;
        let duration = self.session.time.duration();
        let id = self.session.segments.add(
            start.unwrap_or(0.0),
            end.unwrap_or(duration),
            kind,
            duration,
        )?;
        info!(
            segment_id = id,
            segment_count = self.session.segments.len(),
            "segment added"
        );
        Ok(vec![
            Event::SegmentAdded { id },
            Event::SessionChanged(self.session.snapshot()),
        ])
    }

    fn update_segment(&mut self, id: SegmentId, patch: SegmentPatch) -> Result<Vec<Event>> {
        if let Some(segment) = self.session.segments.get(id) {
            self.config.features.ensure(tool_for(segment.kind.tag()))?;
        }
        let duration = self.session.time.duration();
        if !self.session.segments.update(id, patch, duration)? {
            return Ok(Vec::new());
        }
        Ok(vec![Event::SessionChanged(self.session.snapshot())])
    }

    fn remove_segment(&mut self, id: SegmentId) -> Result<Vec<Event>> {
        if self.session.segments.remove(id).is_none() {
            debug!(segment_id = id, "remove ignored: segment not found");
            return Ok(Vec::new());
        }
        Ok(vec![Event::SessionChanged(self.session.snapshot())])
    }

    fn select_segment(&mut self, id: Option<SegmentId>) -> Result<Vec<Event>> {
        match id {
            Some(id) => self.session.segments.select(id)?,
            None => self.session.segments.clear_selection(),
        }
        Ok(vec![Event::SessionChanged(self.session.snapshot())])
    }

    fn start_thumbnail_run(&mut self, request: ThumbnailRequest) {
        match self.media.generate_thumbnails(&request) {
            Ok(batches) => {
                self.thumbnail_run = Some(ThumbnailRun::new(request.token, batches));
            }
            Err(error) => {
                self.thumbnail_run = None;
                self.session
                    .thumbnails
                    .fail(request.token, &error.to_string());
            }
        }
    }

    fn poll_thumbnails(&mut self) -> Result<Vec<Event>> {
        let Some(mut run) = self.thumbnail_run.take() else {
            return Ok(Vec::new());
        };
        let token = run.token();

        match run.next_batch() {
            Some(Ok(batch)) => {
                if !self.session.thumbnails.apply_batch(token, batch) {
                    return Ok(Vec::new());
                }
                self.thumbnail_run = Some(run);
            }
            Some(Err(error)) => {
                self.session.thumbnails.fail(token, &error.to_string());
            }
            None => {
                self.session.thumbnails.complete(token);
            }
        }
        Ok(vec![self.thumbnails_event()])
    }

    fn export(&mut self) -> ExportResult {
        let config_json = match self.prepare_export() {
            Ok(config_json) => config_json,
            Err(error) => {
                warn!(%error, "export rejected");
                return ExportResult {
                    success: false,
                    exported_uri: None,
                    error: Some(error.to_string()),
                };
            }
        };

        info!(bytes = config_json.len(), "export started");
        match self.media.process_video_editing(&config_json) {
            Ok(exported_uri) => {
                info!(exported_uri = %exported_uri, "export finished");
                ExportResult {
                    success: true,
                    exported_uri: Some(exported_uri),
                    error: None,
                }
            }
            Err(error) => {
                let message = match error {
                    EngineError::ExportFailure { message } => message,
                    other => other.to_string(),
                };
                warn!(error = %message, "export failed");
                ExportResult {
                    success: false,
                    exported_uri: None,
                    error: Some(message),
                }
            }
        }
    }

    fn thumbnails_event(&self) -> Event {
        let thumbnails = &self.session.thumbnails;
        Event::ThumbnailsChanged {
            token: thumbnails.token(),
            thumbnails: thumbnails.thumbnails().to_vec(),
            is_generating: thumbnails.is_generating(),
        }
    }
}

fn tool_for(tag: SegmentKindTag) -> EditorTool {
    match tag {
        SegmentKindTag::Audio => EditorTool::BackgroundMusic,
        SegmentKindTag::Text => EditorTool::TextOverlay,
        SegmentKindTag::VoiceOver => EditorTool::VoiceOver,
    }
}
