use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{EngineError, Result};

/// Opaque identifier for timeline segments, unique across all collections.
pub type SegmentId = u64;

/// Auxiliary media anchored to timeline coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub id: SegmentId,
    pub start: f64,
    pub end: f64,
    pub kind: SegmentKind,
}

/// Type payload of a segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SegmentKind {
    Audio(AudioClip),
    Text(TextOverlay),
    VoiceOver(VoiceOverClip),
}

/// Background music placed under the video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioClip {
    pub uri: String,
    /// Seek-in point inside the audio file.
    pub audio_offset: f64,
    pub is_looped: bool,
    /// Length of the audio file itself.
    pub clip_duration: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextOverlay {
    pub text: String,
    pub font_size: f64,
    pub color: String,
    pub background_color: String,
    /// Top-left corner in preview pixels.
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoiceOverClip {
    pub uri: String,
}

/// Discriminant of [`SegmentKind`] used in errors and filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentKindTag {
    Audio,
    Text,
    VoiceOver,
}

impl Display for SegmentKindTag {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Audio => "audio",
            Self::Text => "text",
            Self::VoiceOver => "voice-over",
        };
        f.write_str(name)
    }
}

impl SegmentKind {
    pub fn tag(&self) -> SegmentKindTag {
        match self {
            Self::Audio(_) => SegmentKindTag::Audio,
            Self::Text(_) => SegmentKindTag::Text,
            Self::VoiceOver(_) => SegmentKindTag::VoiceOver,
        }
    }
}

impl Segment {
    /// Half-open activity test: active at `start`, inactive at `end`.
    pub fn contains(&self, t: f64) -> bool {
        self.start <= t && t < self.end
    }
}

/// Partial update merged into an existing segment. `None` keeps the field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SegmentPatch {
    #[serde(default)]
    pub start: Option<f64>,
    #[serde(default)]
    pub end: Option<f64>,
    #[serde(default)]
    pub payload: Option<PayloadPatch>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PayloadPatch {
    Audio {
        #[serde(default)]
        uri: Option<String>,
        #[serde(default)]
        audio_offset: Option<f64>,
        #[serde(default)]
        is_looped: Option<bool>,
        #[serde(default)]
        clip_duration: Option<f64>,
    },
    Text {
        #[serde(default)]
        text: Option<String>,
        #[serde(default)]
        font_size: Option<f64>,
        #[serde(default)]
        color: Option<String>,
        #[serde(default)]
        background_color: Option<String>,
        #[serde(default)]
        x: Option<f64>,
        #[serde(default)]
        y: Option<f64>,
    },
    VoiceOver {
        #[serde(default)]
        uri: Option<String>,
    },
}

impl PayloadPatch {
    fn tag(&self) -> SegmentKindTag {
        match self {
            Self::Audio { .. } => SegmentKindTag::Audio,
            Self::Text { .. } => SegmentKindTag::Text,
            Self::VoiceOver { .. } => SegmentKindTag::VoiceOver,
        }
    }

    fn merge_into(self, kind: &mut SegmentKind) {
        match (self, kind) {
            (
                Self::Audio {
                    uri,
                    audio_offset,
                    is_looped,
                    clip_duration,
                },
                SegmentKind::Audio(clip),
            ) => {
                merge(&mut clip.uri, uri);
                merge(&mut clip.audio_offset, audio_offset);
                merge(&mut clip.is_looped, is_looped);
                merge(&mut clip.clip_duration, clip_duration);
            }
            (
                Self::Text {
                    text,
                    font_size,
                    color,
                    background_color,
                    x,
                    y,
                },
                SegmentKind::Text(overlay),
            ) => {
                merge(&mut overlay.text, text);
                merge(&mut overlay.font_size, font_size);
                merge(&mut overlay.color, color);
                merge(&mut overlay.background_color, background_color);
                merge(&mut overlay.x, x);
                merge(&mut overlay.y, y);
            }
            (Self::VoiceOver { uri }, SegmentKind::VoiceOver(clip)) => {
                merge(&mut clip.uri, uri);
            }
            // Callers check tags first.
            _ => {}
        }
    }
}

fn merge<T>(slot: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *slot = value;
    }
}

/// Owner of every audio, text and voice-over segment of a session.
///
/// At most one audio segment exists at a time: adding another replaces it.
/// Text and voice-over segments accumulate and may overlap freely.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentStore {
    segments: Vec<Segment>,
    selected: Option<SegmentId>,
    next_id: SegmentId,
}

impl Default for SegmentStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SegmentStore {
    pub fn new() -> Self {
        Self {
            segments: Vec::new(),
            selected: None,
            next_id: 1,
        }
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// All segments in creation order.
    pub fn iter(&self) -> impl Iterator<Item = &Segment> {
        self.segments.iter()
    }

    pub fn get(&self, id: SegmentId) -> Option<&Segment> {
        self.segments.iter().find(|segment| segment.id == id)
    }

    /// The active background-music segment, if any.
    pub fn audio(&self) -> Option<(&Segment, &AudioClip)> {
        self.segments.iter().find_map(|segment| match &segment.kind {
            SegmentKind::Audio(clip) => Some((segment, clip)),
            _ => None,
        })
    }

    pub fn texts(&self) -> impl Iterator<Item = (&Segment, &TextOverlay)> {
        self.segments.iter().filter_map(|segment| match &segment.kind {
            SegmentKind::Text(overlay) => Some((segment, overlay)),
            _ => None,
        })
    }

    pub fn voice_overs(&self) -> impl Iterator<Item = (&Segment, &VoiceOverClip)> {
        self.segments.iter().filter_map(|segment| match &segment.kind {
            SegmentKind::VoiceOver(clip) => Some((segment, clip)),
            _ => None,
        })
    }

    pub fn selected(&self) -> Option<SegmentId> {
        self.selected
    }

    /// Adds a segment spanning `start..end`, clamped to `[0, duration]`.
    ///
    /// An audio segment replaces the existing one. Returns the new id.
    ///
    /// # Example
    /// ```
    /// use engine::segments::{AudioClip, SegmentKind, SegmentStore};
    ///
    /// let mut store = SegmentStore::new();
    /// let clip = AudioClip {
    ///     uri: "file:///song.mp3".into(),
    ///     audio_offset: 0.0,
    ///     is_looped: false,
    ///     clip_duration: 30.0,
    /// };
    /// store.add(0.0, 10.0, SegmentKind::Audio(clip.clone()), 10.0).unwrap();
    /// store.add(0.0, 10.0, SegmentKind::Audio(clip), 10.0).unwrap();
    /// assert_eq!(store.len(), 1);
    /// ```
    pub fn add(
        &mut self,
        start: f64,
        end: f64,
        kind: SegmentKind,
        duration: f64,
    ) -> Result<SegmentId> {
        let (start, end) = clamp_span(start, end, duration)?;
        let tag = kind.tag();

        if tag == SegmentKindTag::Audio {
            let replaced: Vec<SegmentId> = self
                .segments
                .iter()
                .filter(|segment| segment.kind.tag() == SegmentKindTag::Audio)
                .map(|segment| segment.id)
                .collect();
            for id in replaced {
                debug!(segment_id = id, "audio segment replaced");
                self.remove(id);
            }
        }

        let id = self.allocate_id();
        self.segments.push(Segment {
            id,
            start,
            end,
            kind,
        });
        debug!(segment_id = id, kind = %tag, start, end, "segment added");
        Ok(id)
    }

    /// Removes a segment. Unknown ids are ignored.
    pub fn remove(&mut self, id: SegmentId) -> Option<Segment> {
        let index = self.segments.iter().position(|segment| segment.id == id)?;
        let removed = self.segments.remove(index);
        if self.selected == Some(id) {
            self.selected = None;
        }
        debug!(
            segment_id = id,
            kind = %removed.kind.tag(),
            segment_count = self.segments.len(),
            "segment removed"
        );
        Some(removed)
    }

    /// Merges `patch` into segment `id`.
    ///
    /// Returns `Ok(false)` for unknown ids. The payload type cannot change: a
    /// patch for another type fails with `SegmentKindMismatch`. The merged span
    /// is clamped to `[0, duration]` and rejected when empty; the segment is
    /// left untouched on error.
    pub fn update(&mut self, id: SegmentId, patch: SegmentPatch, duration: f64) -> Result<bool> {
        let Some(index) = self.segments.iter().position(|segment| segment.id == id) else {
            debug!(segment_id = id, "update ignored: segment not found");
            return Ok(false);
        };

        let mut updated = self.segments[index].clone();
        if let Some(payload) = patch.payload {
            let found = updated.kind.tag();
            let expected = payload.tag();
            if expected != found {
                warn!(segment_id = id, %expected, %found, "update rejected: kind mismatch");
                return Err(EngineError::SegmentKindMismatch {
                    segment_id: id,
                    expected,
                    found,
                });
            }
            payload.merge_into(&mut updated.kind);
        }

        let (start, end) = clamp_span(
            patch.start.unwrap_or(updated.start),
            patch.end.unwrap_or(updated.end),
            duration,
        )?;
        updated.start = start;
        updated.end = end;

        let changed = updated != self.segments[index];
        self.segments[index] = updated;
        debug!(segment_id = id, start, end, changed, "segment updated");
        Ok(changed)
    }

    /// Marks one segment as the active selection.
    pub fn select(&mut self, id: SegmentId) -> Result<()> {
        if self.get(id).is_none() {
            return Err(EngineError::SegmentIdNotFound { segment_id: id });
        }
        self.selected = Some(id);
        Ok(())
    }

    pub fn clear_selection(&mut self) {
        self.selected = None;
    }

    /// Drops every segment. Ids keep increasing so stale references never match.
    pub fn clear(&mut self) {
        self.segments.clear();
        self.selected = None;
    }

    fn allocate_id(&mut self) -> SegmentId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }
}

fn clamp_span(start: f64, end: f64, duration: f64) -> Result<(f64, f64)> {
    if duration <= 0.0 {
        return Err(EngineError::SourceNotLoaded);
    }
    if !start.is_finite() || !end.is_finite() {
        return Err(EngineError::InvalidSegmentRange { start, end });
    }

    let clamped_start = start.clamp(0.0, duration);
    let clamped_end = end.clamp(0.0, duration);
    if clamped_start >= clamped_end {
        warn!(start, end, duration, "segment range rejected");
        return Err(EngineError::InvalidSegmentRange { start, end });
    }
    Ok((clamped_start, clamped_end))
}

/// Upper bound on full repeats drawn for one looped clip.
pub const MAX_LOOP_TILES: f64 = 10_000.0;

/// Pixel layout of a looped audio clip repeated across the timeline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoopTiling {
    pub repeat_count: u32,
    pub tile_width: f64,
    pub remainder_width: f64,
    pub remainder_offset: f64,
}

/// One drawn tile: `offset` and `width` in timeline pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TileRect {
    pub offset: f64,
    pub width: f64,
}

impl LoopTiling {
    /// Computes how a clip of `clip_duration` seconds tiles a timeline of
    /// `duration` seconds drawn `width` pixels wide.
    ///
    /// Returns `None` when either duration is not positive, or when the clip is
    /// so short that it would repeat more than [`MAX_LOOP_TILES`] times.
    ///
    /// # Example
    /// ```
    /// use engine::segments::LoopTiling;
    ///
    /// let tiling = LoopTiling::compute(3.0, 10.0, 100.0).unwrap();
    /// assert_eq!(tiling.repeat_count, 3);
    /// assert_eq!(tiling.tile_width, 30.0);
    /// assert_eq!((tiling.remainder_offset, tiling.remainder_width), (90.0, 10.0));
    /// ```
    pub fn compute(clip_duration: f64, duration: f64, width: f64) -> Option<Self> {
        if !(clip_duration > 0.0) || !(duration > 0.0) {
            return None;
        }

        let repeats = (duration / clip_duration).floor();
        if !(repeats <= MAX_LOOP_TILES) {
            warn!(clip_duration, duration, "loop tiling rejected: too many repeats");
            return None;
        }

        let repeat_count = repeats as u32;
        let remainder = duration % clip_duration;
        let tile_width = clip_duration * width / duration;
        let remainder_width = if remainder > 0.0 {
            remainder * width / duration
        } else {
            0.0
        };

        Some(Self {
            repeat_count,
            tile_width,
            remainder_width,
            remainder_offset: f64::from(repeat_count) * tile_width,
        })
    }

    /// Every tile rectangle, full repeats first, then the remainder if any.
    pub fn tiles(&self) -> Vec<TileRect> {
        let mut tiles: Vec<TileRect> = (0..self.repeat_count)
            .map(|index| TileRect {
                offset: f64::from(index) * self.tile_width,
                width: self.tile_width,
            })
            .collect();
        if self.remainder_width > 0.0 {
            tiles.push(TileRect {
                offset: self.remainder_offset,
                width: self.remainder_width,
            });
        }
        tiles
    }
}
