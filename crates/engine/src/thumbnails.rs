use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::Result;

/// Monotonic id of one generation run; batches carrying an older token are stale.
pub type GenerationToken = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThumbnailStatus {
    Pending,
    Success,
    Failed,
}

/// One timeline thumbnail produced by the external generator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThumbnailDescriptor {
    /// Image location, absent until generated or when generation failed.
    pub uri: Option<String>,
    /// Source time the thumbnail was taken at.
    pub time: f64,
    /// Timeline width in pixels, proportional to the time span it covers.
    pub width: f64,
    pub status: ThumbnailStatus,
}

/// Work order handed to the generator.
#[derive(Debug, Clone, PartialEq)]
pub struct ThumbnailRequest {
    pub token: GenerationToken,
    pub uri: String,
    pub start: f64,
    pub duration: f64,
}

/// Lazy, finite sequence of progressive batches. Each batch is the full
/// current state of the run; an `Err` item aborts the run.
pub type ThumbnailBatches = Box<dyn Iterator<Item = Result<Vec<ThumbnailDescriptor>>>>;

/// A generation run in progress, pulled one batch at a time.
pub struct ThumbnailRun {
    token: GenerationToken,
    batches: ThumbnailBatches,
}

impl std::fmt::Debug for ThumbnailRun {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThumbnailRun")
            .field("token", &self.token)
            .finish_non_exhaustive()
    }
}

impl ThumbnailRun {
    pub fn new(token: GenerationToken, batches: ThumbnailBatches) -> Self {
        Self { token, batches }
    }

    pub fn token(&self) -> GenerationToken {
        self.token
    }

    /// Pulls the next batch; `None` once the generator is exhausted.
    pub fn next_batch(&mut self) -> Option<Result<Vec<ThumbnailDescriptor>>> {
        self.batches.next()
    }
}

#[derive(Debug, Clone, PartialEq)]
struct InFlight {
    token: GenerationToken,
    uri: String,
    start: f64,
    duration: f64,
}

/// Thumbnail state of the current source.
///
/// Every run gets a fresh token; `reset` and regeneration bump the token so
/// anything still arriving from an older run is dropped by `apply_batch`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ThumbnailPipeline {
    token: GenerationToken,
    thumbnails: Vec<ThumbnailDescriptor>,
    in_flight: Option<InFlight>,
    completed_uri: Option<String>,
    last_window: Option<(f64, f64)>,
}

impl ThumbnailPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn token(&self) -> GenerationToken {
        self.token
    }

    pub fn thumbnails(&self) -> &[ThumbnailDescriptor] {
        &self.thumbnails
    }

    pub fn is_generating(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Starts the initial run for `uri` covering the whole source.
    ///
    /// Returns `None` (and logs) for an empty uri or non-positive duration,
    /// while a run for the same uri is in flight, or when the uri already
    /// completed since the last `reset`.
    pub fn begin_generate(&mut self, uri: &str, duration: f64) -> Option<ThumbnailRequest> {
        if !validate(uri, duration) {
            return None;
        }
        if let Some(in_flight) = &self.in_flight {
            if in_flight.uri == uri {
                debug!(uri, token = in_flight.token, "thumbnail generation already in flight");
                return None;
            }
        }
        if self.completed_uri.as_deref() == Some(uri) {
            debug!(
                uri,
                thumbnail_count = self.thumbnails.len(),
                "thumbnails already generated"
            );
            return None;
        }

        self.thumbnails.clear();
        Some(self.start_run(uri, 0.0, duration))
    }

    /// Restarts generation for a new trim window, superseding any run in flight.
    pub fn begin_regenerate(
        &mut self,
        uri: &str,
        start: f64,
        duration: f64,
    ) -> Option<ThumbnailRequest> {
        if !validate(uri, duration) {
            return None;
        }

        self.thumbnails.clear();
        Some(self.start_run(uri, start.max(0.0), duration))
    }

    /// Replaces the descriptors with `batch` if `token` is current.
    pub fn apply_batch(&mut self, token: GenerationToken, batch: Vec<ThumbnailDescriptor>) -> bool {
        if !self.is_current(token) {
            debug!(
                token,
                current = self.token,
                batch_len = batch.len(),
                "stale thumbnail batch dropped"
            );
            return false;
        }
        self.thumbnails = batch;
        true
    }

    /// Marks run `token` as finished.
    pub fn complete(&mut self, token: GenerationToken) -> bool {
        if !self.is_current(token) {
            return false;
        }
        let Some(run) = self.in_flight.take() else {
            return false;
        };

        let failed = self
            .thumbnails
            .iter()
            .filter(|thumb| thumb.status == ThumbnailStatus::Failed)
            .count();
        info!(
            token,
            uri = %run.uri,
            total = self.thumbnails.len(),
            failed,
            "thumbnail generation finished"
        );
        self.last_window = Some((run.start, run.start + run.duration));
        self.completed_uri = Some(run.uri);
        true
    }

    /// Records a total generator failure: no thumbnails, not generating, retry allowed.
    pub fn fail(&mut self, token: GenerationToken, reason: &str) -> bool {
        if !self.is_current(token) {
            return false;
        }
        warn!(token, reason, "thumbnail generation failed");
        self.in_flight = None;
        self.thumbnails.clear();
        self.completed_uri = None;
        true
    }

    /// Forgets everything about the current source and invalidates running work.
    pub fn reset(&mut self) {
        self.token += 1;
        self.thumbnails.clear();
        self.in_flight = None;
        self.completed_uri = None;
        self.last_window = None;
        debug!(token = self.token, "thumbnail pipeline reset");
    }

    /// True when the window `start..start + duration` moved at least
    /// `threshold` seconds on either side from the last generated window.
    pub fn is_material_change(&self, start: f64, duration: f64, threshold: f64) -> bool {
        let Some((last_start, last_end)) = self.last_window else {
            return true;
        };
        (start - last_start).abs() >= threshold || (start + duration - last_end).abs() >= threshold
    }

    fn is_current(&self, token: GenerationToken) -> bool {
        token == self.token && self.in_flight.is_some()
    }

    fn start_run(&mut self, uri: &str, start: f64, duration: f64) -> ThumbnailRequest {
        self.token += 1;
        self.in_flight = Some(InFlight {
            token: self.token,
            uri: uri.to_string(),
            start,
            duration,
        });
        info!(token = self.token, uri, start, duration, "thumbnail generation started");
        ThumbnailRequest {
            token: self.token,
            uri: uri.to_string(),
            start,
            duration,
        }
    }
}

fn validate(uri: &str, duration: f64) -> bool {
    if uri.trim().is_empty() {
        warn!("cannot generate thumbnails: missing source uri");
        return false;
    }
    if !duration.is_finite() || duration <= 0.0 {
        warn!(duration, "cannot generate thumbnails: invalid duration");
        return false;
    }
    true
}

/// Upper bound on slots produced for one window.
pub const MAX_THUMBNAIL_SLOTS: f64 = 10_000.0;

/// Time position and pixel width of one thumbnail slot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThumbnailSlot {
    pub time: f64,
    pub width: f64,
}

/// Spacing of thumbnails along the timeline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThumbnailLayout {
    pub interval_seconds: f64,
    pub pixels_per_second: f64,
}

impl ThumbnailLayout {
    /// Slots covering `start..start + duration`; the last slot is shortened
    /// to the remaining span. Empty when the window would need more than
    /// [`MAX_THUMBNAIL_SLOTS`] slots.
    ///
    /// # Example
    /// ```
    /// use engine::thumbnails::ThumbnailLayout;
    ///
    /// let layout = ThumbnailLayout { interval_seconds: 2.0, pixels_per_second: 10.0 };
    /// let widths: Vec<f64> = layout.slots(0.0, 5.0).iter().map(|slot| slot.width).collect();
    /// assert_eq!(widths, vec![20.0, 20.0, 10.0]);
    /// ```
    pub fn slots(&self, start: f64, duration: f64) -> Vec<ThumbnailSlot> {
        if !(duration > 0.0) {
            return Vec::new();
        }
        if !(self.interval_seconds > 0.0) {
            return vec![ThumbnailSlot {
                time: start,
                width: duration * self.pixels_per_second,
            }];
        }

        let count = (duration / self.interval_seconds).ceil();
        if !(count <= MAX_THUMBNAIL_SLOTS) {
            warn!(
                duration,
                interval_seconds = self.interval_seconds,
                "thumbnail layout rejected: interval too small"
            );
            return Vec::new();
        }

        let count = count as usize;
        (0..count)
            .map(|index| {
                let offset = index as f64 * self.interval_seconds;
                let span = self.interval_seconds.min(duration - offset);
                ThumbnailSlot {
                    time: start + offset,
                    width: span * self.pixels_per_second,
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::{ThumbnailDescriptor, ThumbnailLayout, ThumbnailPipeline, ThumbnailStatus};

    fn batch(len: usize) -> Vec<ThumbnailDescriptor> {
        (0..len)
            .map(|index| ThumbnailDescriptor {
                uri: Some(format!("thumb-{index}.jpg")),
                time: index as f64,
                width: 60.0,
                status: ThumbnailStatus::Success,
            })
            .collect()
    }

    #[test]
    fn invalid_input_does_not_start_a_run() {
        let mut pipeline = ThumbnailPipeline::new();
        assert!(pipeline.begin_generate("", 10.0).is_none());
        assert!(pipeline.begin_generate("   ", 10.0).is_none());
        assert!(pipeline.begin_generate("video.mp4", 0.0).is_none());
        assert!(!pipeline.is_generating());
        assert_eq!(pipeline.token(), 0);
    }

    #[test]
    fn second_generate_while_in_flight_is_dropped() {
        let mut pipeline = ThumbnailPipeline::new();
        let request = pipeline
            .begin_generate("video.mp4", 10.0)
            .expect("first run starts");
        assert!(pipeline.begin_generate("video.mp4", 10.0).is_none());
        assert_eq!(pipeline.token(), request.token);
    }

    #[test]
    fn completed_uri_is_not_generated_again_until_reset() {
        let mut pipeline = ThumbnailPipeline::new();
        let request = pipeline
            .begin_generate("video.mp4", 10.0)
            .expect("first run starts");
        assert!(pipeline.apply_batch(request.token, batch(3)));
        assert!(pipeline.complete(request.token));

        assert!(pipeline.begin_generate("video.mp4", 10.0).is_none());
        assert_eq!(pipeline.thumbnails().len(), 3);

        pipeline.reset();
        assert!(pipeline.thumbnails().is_empty());
        assert!(pipeline.begin_generate("video.mp4", 10.0).is_some());
    }

    #[test]
    fn progressive_batches_replace_previous_state() {
        let mut pipeline = ThumbnailPipeline::new();
        let request = pipeline
            .begin_generate("video.mp4", 10.0)
            .expect("run starts");

        assert!(pipeline.apply_batch(request.token, batch(2)));
        assert!(pipeline.apply_batch(request.token, batch(5)));
        assert_eq!(pipeline.thumbnails().len(), 5);
    }

    #[test]
    fn reset_mid_generation_discards_late_batches() {
        let mut pipeline = ThumbnailPipeline::new();
        let request = pipeline
            .begin_generate("video.mp4", 10.0)
            .expect("run starts");
        assert!(pipeline.apply_batch(request.token, batch(2)));

        pipeline.reset();

        assert!(!pipeline.apply_batch(request.token, batch(4)));
        assert!(!pipeline.complete(request.token));
        assert!(pipeline.thumbnails().is_empty());
        assert!(!pipeline.is_generating());
    }

    #[test]
    fn regeneration_supersedes_running_generation() {
        let mut pipeline = ThumbnailPipeline::new();
        let first = pipeline
            .begin_generate("video.mp4", 20.0)
            .expect("first run starts");
        pipeline.apply_batch(first.token, batch(4));

        let second = pipeline
            .begin_regenerate("video.mp4", 2.0, 16.0)
            .expect("regeneration starts");
        assert!(second.token > first.token);
        assert!(pipeline.thumbnails().is_empty());
        assert!(!pipeline.apply_batch(first.token, batch(4)));
        assert!(pipeline.apply_batch(second.token, batch(2)));
        assert_eq!((second.start, second.duration), (2.0, 16.0));
    }

    #[test]
    fn total_failure_clears_state_and_allows_retry() {
        let mut pipeline = ThumbnailPipeline::new();
        let request = pipeline
            .begin_generate("video.mp4", 10.0)
            .expect("run starts");
        pipeline.apply_batch(request.token, batch(2));

        assert!(pipeline.fail(request.token, "decoder crashed"));
        assert!(!pipeline.is_generating());
        assert!(pipeline.thumbnails().is_empty());
        assert!(pipeline.begin_generate("video.mp4", 10.0).is_some());
    }

    #[test]
    fn material_change_compares_against_last_completed_window() {
        let mut pipeline = ThumbnailPipeline::new();
        assert!(pipeline.is_material_change(0.0, 10.0, 0.25));

        let request = pipeline
            .begin_generate("video.mp4", 10.0)
            .expect("run starts");
        pipeline.complete(request.token);

        assert!(!pipeline.is_material_change(0.1, 9.9, 0.25));
        assert!(pipeline.is_material_change(1.0, 9.0, 0.25));
        assert!(pipeline.is_material_change(0.0, 8.0, 0.25));
    }

    #[test]
    fn layout_without_interval_yields_one_slot() {
        let layout = ThumbnailLayout {
            interval_seconds: 0.0,
            pixels_per_second: 10.0,
        };
        let slots = layout.slots(3.0, 4.0);
        assert_eq!(slots.len(), 1);
        assert_eq!((slots[0].time, slots[0].width), (3.0, 40.0));
        assert!(layout.slots(0.0, 0.0).is_empty());
    }

    #[test]
    fn layout_with_tiny_interval_yields_no_slots() {
        let layout = ThumbnailLayout {
            interval_seconds: 1e-300,
            pixels_per_second: 60.0,
        };
        assert!(layout.slots(0.0, 20.0).is_empty());

        let dense = ThumbnailLayout {
            interval_seconds: 0.5,
            pixels_per_second: 60.0,
        };
        assert_eq!(dense.slots(0.0, 5_000.0).len(), 10_000);
    }
}
