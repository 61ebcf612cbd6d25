use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::{EditorConfig, TextCoordinateSpace};
use crate::error::Result;
use crate::segments::{AudioClip, Segment, SegmentKind, SegmentStore, TextOverlay, VoiceOverClip};
use crate::time::TimeDomain;

// Rough glyph box used to find the visual centre of a text overlay.
const GLYPH_WIDTH_RATIO: f64 = 0.6;
const LINE_HEIGHT_RATIO: f64 = 1.4;

/// Output frame shape; anything but `Original` adds a crop operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AspectRatio {
    #[default]
    #[serde(rename = "original")]
    Original,
    #[serde(rename = "9:16")]
    NineSixteen,
    #[serde(rename = "1:1")]
    Square,
    #[serde(rename = "16:9")]
    SixteenNine,
}

/// Visible area of the crop mask relative to the preview.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CropMask {
    pub width: f64,
    pub height: f64,
}

impl AspectRatio {
    /// Mask drawn over the portrait preview, `None` when the whole frame stays visible.
    pub fn crop_mask(self) -> Option<CropMask> {
        match self {
            Self::Original | Self::NineSixteen => None,
            Self::Square => Some(CropMask {
                width: 1.0,
                height: 9.0 / 16.0,
            }),
            Self::SixteenNine => Some(CropMask {
                width: 1.0,
                height: 9.0 / 16.0 / (16.0 / 9.0),
            }),
        }
    }
}

/// Position of a text overlay in the export config.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextPosition {
    pub x_axis: f64,
    pub y_axis: f64,
}

/// One step of the edit pipeline interpreted by the renderer in list order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum OperationElement {
    #[serde(rename = "videoUri")]
    VideoUri { uri: String, muted: bool },
    #[serde(rename = "crop")]
    Crop { selection_params: AspectRatio },
    #[serde(rename = "trim", rename_all = "camelCase")]
    Trim { start_time: f64, end_time: f64 },
    #[serde(rename = "addBGM", rename_all = "camelCase")]
    AddBgm {
        music_uri: String,
        start_time: f64,
        end_time: f64,
        audio_offset: f64,
        is_looped: bool,
    },
    #[serde(rename = "addTextOverlay", rename_all = "camelCase")]
    AddTextOverlay {
        text: String,
        font_size: f64,
        text_color: String,
        text_overlay_color: String,
        text_position: TextPosition,
        start_time: f64,
        end_time: f64,
        screen_width: f64,
        screen_height: f64,
    },
    #[serde(rename = "addVoiceOver", rename_all = "camelCase")]
    AddVoiceOver {
        voice_over_uri: String,
        start_time: f64,
        end_time: f64,
    },
}

/// Discriminant of [`OperationElement`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    VideoUri,
    Crop,
    Trim,
    AddBgm,
    AddTextOverlay,
    AddVoiceOver,
}

impl OperationKind {
    /// Singleton kinds appear at most once in a config.
    pub fn is_singleton(self) -> bool {
        matches!(self, Self::VideoUri | Self::Crop | Self::Trim)
    }
}

impl OperationElement {
    pub fn kind(&self) -> OperationKind {
        match self {
            Self::VideoUri { .. } => OperationKind::VideoUri,
            Self::Crop { .. } => OperationKind::Crop,
            Self::Trim { .. } => OperationKind::Trim,
            Self::AddBgm { .. } => OperationKind::AddBgm,
            Self::AddTextOverlay { .. } => OperationKind::AddTextOverlay,
            Self::AddVoiceOver { .. } => OperationKind::AddVoiceOver,
        }
    }
}

/// Ordered operation list with keyed upsert for singleton kinds.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OperationList {
    elements: Vec<OperationElement>,
}

impl OperationList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the element of the same singleton kind in place, or appends.
    ///
    /// # Example
    /// ```
    /// use engine::export::{OperationElement, OperationList};
    ///
    /// let mut list = OperationList::new();
    /// list.upsert(OperationElement::Trim { start_time: 0.0, end_time: 4.0 });
    /// list.upsert(OperationElement::Trim { start_time: 1.0, end_time: 3.0 });
    /// assert_eq!(list.as_slice().len(), 1);
    /// ```
    pub fn upsert(&mut self, element: OperationElement) {
        let kind = element.kind();
        if kind.is_singleton() {
            if let Some(existing) = self.elements.iter_mut().find(|e| e.kind() == kind) {
                *existing = element;
                return;
            }
        }
        self.elements.push(element);
    }

    /// Drops every element of `kind`.
    pub fn remove(&mut self, kind: OperationKind) {
        self.elements.retain(|element| element.kind() != kind);
    }

    pub fn as_slice(&self) -> &[OperationElement] {
        &self.elements
    }

    pub fn into_vec(self) -> Vec<OperationElement> {
        self.elements
    }
}

/// Payload handed to the encode service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportConfig {
    pub video_elements: Vec<OperationElement>,
}

impl ExportConfig {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Preview geometry used to place text overlays.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextGeometry {
    pub preview_width: f64,
    pub preview_height: f64,
    pub pixel_density: f64,
    pub coordinates: TextCoordinateSpace,
}

impl TextGeometry {
    pub fn from_config(config: &EditorConfig) -> Self {
        Self {
            preview_width: config.preview_width,
            preview_height: config.preview_height,
            pixel_density: config.pixel_density,
            coordinates: config.text_coordinates,
        }
    }

    /// Converts a top-left pixel position to the configured export space.
    ///
    /// In normalized space the estimated centre of the text box is mapped to
    /// `[-1, 1]` horizontally and `[1, -1]` vertically.
    pub fn position(&self, overlay: &TextOverlay) -> TextPosition {
        match self.coordinates {
            TextCoordinateSpace::Pixels => TextPosition {
                x_axis: overlay.x,
                y_axis: overlay.y,
            },
            TextCoordinateSpace::Normalized => {
                let chars = overlay.text.chars().count() as f64;
                let center_x = overlay.x + chars * overlay.font_size * GLYPH_WIDTH_RATIO / 2.0;
                let center_y = overlay.y + overlay.font_size * LINE_HEIGHT_RATIO / 2.0;
                let width = self.preview_width.max(1.0);
                let height = self.preview_height.max(1.0);
                TextPosition {
                    x_axis: (center_x / width * 2.0 - 1.0).clamp(-1.0, 1.0),
                    y_axis: (1.0 - center_y / height * 2.0).clamp(-1.0, 1.0),
                }
            }
        }
    }
}

/// Frozen copy of everything the builder reads.
///
/// Taken when an export is requested so later edits cannot leak into a
/// config that is already on its way to the encoder.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportSnapshot {
    pub source_uri: String,
    pub time: TimeDomain,
    pub segments: SegmentStore,
    pub aspect_ratio: AspectRatio,
    pub muted: bool,
}

impl ExportSnapshot {
    pub fn build(&self, geometry: &TextGeometry) -> ExportConfig {
        ExportConfig {
            video_elements: build_operations(
                &self.source_uri,
                &self.time,
                &self.segments,
                self.aspect_ratio,
                self.muted,
                geometry,
            ),
        }
    }
}

/// Serialises the edit state into the ordered operation list.
///
/// Order: `videoUri`, `crop` (only for a non-original ratio), `trim`, then
/// music, text overlays and voice-overs, each group in creation order.
pub fn build_operations(
    source_uri: &str,
    time: &TimeDomain,
    segments: &SegmentStore,
    aspect_ratio: AspectRatio,
    muted: bool,
    geometry: &TextGeometry,
) -> Vec<OperationElement> {
    let mut list = OperationList::new();

    list.upsert(OperationElement::VideoUri {
        uri: source_uri.to_string(),
        muted,
    });
    if aspect_ratio != AspectRatio::Original {
        list.upsert(OperationElement::Crop {
            selection_params: aspect_ratio,
        });
    }
    list.upsert(OperationElement::Trim {
        start_time: time.trim_start(),
        end_time: time.trim_start() + time.window_len(),
    });

    let mut music = Vec::new();
    let mut texts = Vec::new();
    let mut voice_overs = Vec::new();
    for segment in segments.iter() {
        match &segment.kind {
            SegmentKind::Audio(clip) => music.push(music_element(segment, clip)),
            SegmentKind::Text(overlay) => texts.push(text_element(segment, overlay, geometry)),
            SegmentKind::VoiceOver(clip) => voice_overs.push(voice_over_element(segment, clip)),
        }
    }
    for element in music.into_iter().chain(texts).chain(voice_overs) {
        list.upsert(element);
    }

    let elements = list.into_vec();
    debug!(
        operation_count = elements.len(),
        aspect_ratio = ?aspect_ratio,
        muted,
        "export operations built"
    );
    elements
}

fn music_element(segment: &Segment, clip: &AudioClip) -> OperationElement {
    OperationElement::AddBgm {
        music_uri: clip.uri.clone(),
        start_time: segment.start,
        end_time: segment.end,
        audio_offset: clip.audio_offset,
        is_looped: clip.is_looped,
    }
}

fn text_element(
    segment: &Segment,
    overlay: &TextOverlay,
    geometry: &TextGeometry,
) -> OperationElement {
    OperationElement::AddTextOverlay {
        text: overlay.text.clone(),
        font_size: overlay.font_size * geometry.pixel_density,
        text_color: overlay.color.clone(),
        text_overlay_color: overlay.background_color.clone(),
        text_position: geometry.position(overlay),
        start_time: segment.start,
        end_time: segment.end,
        screen_width: geometry.preview_width,
        screen_height: geometry.preview_height,
    }
}

fn voice_over_element(segment: &Segment, clip: &VoiceOverClip) -> OperationElement {
    OperationElement::AddVoiceOver {
        voice_over_uri: clip.uri.clone(),
        start_time: segment.start,
        end_time: segment.end,
    }
}
