use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::thumbnails::{ThumbnailBatches, ThumbnailRequest};

/// File types offered by the picker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileTypeFilter {
    Audio,
    Video,
}

/// File chosen by the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PickedFile {
    pub uri: String,
    pub name: String,
}

/// Platform services required by the engine.
pub trait MediaBackend {
    /// Starts thumbnail extraction for `request.start..request.start + request.duration`.
    ///
    /// An `Err` here is a total failure; single failed frames belong in the
    /// batches as `Failed` descriptors.
    fn generate_thumbnails(&self, request: &ThumbnailRequest) -> Result<ThumbnailBatches>;

    /// Hands the serialized export config to the encoder and returns the output uri.
    fn process_video_editing(&self, config_json: &str) -> Result<String>;

    /// Lets the user choose a file. Dismissal is reported as `PickerCancelled`.
    fn pick_file(&self, filter: FileTypeFilter) -> Result<PickedFile>;
}
