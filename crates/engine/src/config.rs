use std::fmt::{Display, Formatter};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{EngineError, Result};

/// Editor settings shared by every component of a session.
///
/// Every field has a default, so a config file only needs the keys it overrides.
///
/// # Example
/// ```
/// use engine::config::EditorConfig;
///
/// let config: EditorConfig = serde_json::from_str(r#"{ "min_trim_gap": 2.0 }"#).unwrap();
/// assert_eq!(config.min_trim_gap, 2.0);
/// assert_eq!(config.preview_width, 360.0);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EditorConfig {
    /// Minimum trim window length in seconds.
    pub min_trim_gap: f64,
    pub preview_width: f64,
    pub preview_height: f64,
    /// Multiplier from density-independent font units to device pixels.
    pub pixel_density: f64,
    pub text_coordinates: TextCoordinateSpace,
    pub thumbnails: ThumbnailSettings,
    pub features: EditorFeatures,
    pub text_defaults: TextDefaults,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            min_trim_gap: 1.0,
            preview_width: 360.0,
            preview_height: 640.0,
            pixel_density: 1.0,
            text_coordinates: TextCoordinateSpace::Normalized,
            thumbnails: ThumbnailSettings::default(),
            features: EditorFeatures::default(),
            text_defaults: TextDefaults::default(),
        }
    }
}

impl EditorConfig {
    /// Reads a JSON config file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| EngineError::ConfigIo {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&raw).map_err(|source| EngineError::ConfigParse {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = ?path, min_trim_gap = config.min_trim_gap, "editor config loaded");
        Ok(config)
    }
}

/// How text positions are written into the export config.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextCoordinateSpace {
    /// Origin-centred device coordinates, `[-1, 1]` horizontally and `[1, -1]` vertically.
    Normalized,
    /// Raw top-left preview pixels.
    Pixels,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThumbnailSettings {
    pub interval_seconds: f64,
    pub pixels_per_second: f64,
    /// Boundary movement, in seconds, that makes a trim change worth new thumbnails.
    pub regenerate_threshold: f64,
}

impl Default for ThumbnailSettings {
    fn default() -> Self {
        Self {
            interval_seconds: 1.0,
            pixels_per_second: 60.0,
            regenerate_threshold: 0.25,
        }
    }
}

/// Per-tool switches; a disabled tool rejects its commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EditorFeatures {
    pub trim: bool,
    pub crop: bool,
    pub background_music: bool,
    pub text_overlay: bool,
    pub voice_over: bool,
    pub mute: bool,
}

impl Default for EditorFeatures {
    fn default() -> Self {
        Self {
            trim: true,
            crop: true,
            background_music: true,
            text_overlay: true,
            voice_over: true,
            mute: true,
        }
    }
}

impl EditorFeatures {
    pub fn is_enabled(&self, tool: EditorTool) -> bool {
        match tool {
            EditorTool::Trim => self.trim,
            EditorTool::Crop => self.crop,
            EditorTool::BackgroundMusic => self.background_music,
            EditorTool::TextOverlay => self.text_overlay,
            EditorTool::VoiceOver => self.voice_over,
            EditorTool::Mute => self.mute,
        }
    }

    /// Fails with `FeatureDisabled` when `tool` is switched off.
    pub fn ensure(&self, tool: EditorTool) -> Result<()> {
        if self.is_enabled(tool) {
            Ok(())
        } else {
            Err(EngineError::FeatureDisabled(tool))
        }
    }
}

/// Editing tools that can be switched off per session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EditorTool {
    Trim,
    Crop,
    BackgroundMusic,
    TextOverlay,
    VoiceOver,
    Mute,
}

impl Display for EditorTool {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Trim => "trim",
            Self::Crop => "crop",
            Self::BackgroundMusic => "background music",
            Self::TextOverlay => "text overlay",
            Self::VoiceOver => "voice-over",
            Self::Mute => "mute",
        };
        f.write_str(name)
    }
}

/// Style applied to new text segments when the payload leaves a field out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TextDefaults {
    pub font_size: f64,
    pub color: String,
    pub background_color: String,
}

impl Default for TextDefaults {
    fn default() -> Self {
        Self {
            font_size: 24.0,
            color: "#FFFFFF".to_string(),
            background_color: "transparent".to_string(),
        }
    }
}
