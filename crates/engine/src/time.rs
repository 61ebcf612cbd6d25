use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{EngineError, Result};

// Keeps `trim_start < trim_end` even when the configured gap is zero.
const MIN_GAP_FLOOR: f64 = 1e-3;

/// What is currently driving the playhead.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackMode {
    #[default]
    Idle,
    Playing,
    Scrubbing,
    Trimming,
}

impl PlaybackMode {
    /// True for the drag modes, during which playback ticks must not move the playhead.
    pub fn is_dragging(self) -> bool {
        matches!(self, Self::Scrubbing | Self::Trimming)
    }
}

impl Display for PlaybackMode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Playing => "playing",
            Self::Scrubbing => "scrubbing",
            Self::Trimming => "trimming",
        };
        f.write_str(name)
    }
}

/// Source duration, trim window and playhead of one editing session.
///
/// All values are seconds. `current_time` is relative to the trim window, so
/// `0 <= current_time <= trim_end - trim_start` always holds. Every field has a
/// single writer: `duration` is written by `load` only, the trim window by
/// `set_trim` only, and `current_time` by `seek`, whose caller is either the
/// playback tick or a scrub gesture, never both at once because of `mode`.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeDomain {
    duration: f64,
    trim_start: f64,
    trim_end: f64,
    current_time: f64,
    mode: PlaybackMode,
    min_gap: f64,
}

impl TimeDomain {
    /// Creates an unloaded time domain with the given minimum trim window.
    pub fn new(min_gap: f64) -> Self {
        Self {
            duration: 0.0,
            trim_start: 0.0,
            trim_end: 0.0,
            current_time: 0.0,
            mode: PlaybackMode::Idle,
            min_gap: min_gap.max(MIN_GAP_FLOOR),
        }
    }

    pub fn duration(&self) -> f64 {
        self.duration
    }

    pub fn trim_start(&self) -> f64 {
        self.trim_start
    }

    pub fn trim_end(&self) -> f64 {
        self.trim_end
    }

    pub fn current_time(&self) -> f64 {
        self.current_time
    }

    pub fn mode(&self) -> PlaybackMode {
        self.mode
    }

    pub fn is_loaded(&self) -> bool {
        self.duration > 0.0
    }

    pub fn is_playing(&self) -> bool {
        self.mode == PlaybackMode::Playing
    }

    /// Length of the trim window.
    pub fn window_len(&self) -> f64 {
        self.trim_end - self.trim_start
    }

    /// Sets the source duration and resets trim window, playhead and mode.
    ///
    /// # Example
    /// ```
    /// use engine::time::TimeDomain;
    ///
    /// let mut time = TimeDomain::new(1.0);
    /// assert!(time.load(0.0).is_err());
    /// time.load(20.0).unwrap();
    /// assert_eq!((time.trim_start(), time.trim_end()), (0.0, 20.0));
    /// ```
    pub fn load(&mut self, duration: f64) -> Result<()> {
        if !duration.is_finite() || duration <= 0.0 {
            return Err(EngineError::InvalidDuration(duration));
        }

        self.duration = duration;
        self.trim_start = 0.0;
        self.trim_end = duration;
        self.current_time = 0.0;
        self.mode = PlaybackMode::Idle;
        debug!(duration, "time domain loaded");
        Ok(())
    }

    /// Returns to the unloaded state, used when the source changes.
    pub fn unload(&mut self) {
        *self = Self::new(self.min_gap);
    }

    /// Clamps and stores a new trim window.
    ///
    /// `start` is clamped to `[0, end - gap]` and `end` to `[start + gap, duration]`,
    /// where `gap` is the configured minimum, capped at the duration. Silently
    /// ignored before a source is loaded. Returns true when the window changed.
    pub fn set_trim(&mut self, start: f64, end: f64) -> bool {
        if !self.is_loaded() {
            return false;
        }
        if !start.is_finite() || !end.is_finite() {
            warn!(start, end, "trim rejected: non-finite bound");
            return false;
        }

        let gap = self.effective_gap();
        let end_bound = bounded(end, gap, self.duration);
        let new_start = bounded(start, 0.0, end_bound - gap);
        let new_end = bounded(end, new_start + gap, self.duration);

        let changed = new_start != self.trim_start || new_end != self.trim_end;
        self.trim_start = new_start;
        self.trim_end = new_end;
        self.current_time = bounded(self.current_time, 0.0, self.window_len());

        debug!(
            requested_start = start,
            requested_end = end,
            trim_start = new_start,
            trim_end = new_end,
            changed,
            "trim applied"
        );
        changed
    }

    /// Moves the playhead to a window-relative `time` and returns the stored value.
    ///
    /// While playing, a time past the window end wraps to the window start;
    /// otherwise the time is clamped to the window.
    pub fn seek(&mut self, time: f64) -> f64 {
        let len = self.window_len().max(0.0);
        let time = if time.is_finite() { time } else { 0.0 };

        self.current_time = if self.mode == PlaybackMode::Playing && time > len {
            debug!(time, window_len = len, "seek wrapped to window start");
            0.0
        } else {
            bounded(time, 0.0, len)
        };
        self.current_time
    }

    /// Switches the playback mode.
    ///
    /// `idle <-> playing`, `idle/playing -> scrubbing -> idle` and
    /// `idle/playing -> trimming -> idle` are accepted; entering a drag mode
    /// stops playback. Anything else fails with `InvalidModeTransition`.
    pub fn set_mode(&mut self, mode: PlaybackMode) -> Result<()> {
        use PlaybackMode::{Idle, Playing, Scrubbing, Trimming};

        if self.mode == mode {
            return Ok(());
        }

        let allowed = matches!(
            (self.mode, mode),
            (Idle, Playing)
                | (Playing, Idle)
                | (Idle | Playing, Scrubbing | Trimming)
                | (Scrubbing | Trimming, Idle)
        );
        if !allowed {
            warn!(from = %self.mode, to = %mode, "mode transition rejected");
            return Err(EngineError::InvalidModeTransition {
                from: self.mode,
                to: mode,
            });
        }

        debug!(from = %self.mode, to = %mode, "mode changed");
        self.mode = mode;
        Ok(())
    }

    /// Converts a window-relative time to source time.
    pub fn to_source_time(&self, relative: f64) -> f64 {
        self.trim_start + relative
    }

    /// Converts a source time to window-relative time, never negative.
    pub fn to_window_time(&self, source: f64) -> f64 {
        (source - self.trim_start).max(0.0)
    }

    /// True once a window-relative time reaches the window end.
    pub fn is_past_window_end(&self, relative: f64) -> bool {
        self.is_loaded() && relative >= self.window_len()
    }

    fn effective_gap(&self) -> f64 {
        self.min_gap.min(self.duration)
    }
}

// Like `f64::clamp` but tolerates `lo` exceeding `hi` by rounding; `hi` wins.
fn bounded(value: f64, lo: f64, hi: f64) -> f64 {
    value.max(lo).min(hi)
}

#[cfg(test)]
mod tests {
    use super::{PlaybackMode, TimeDomain};
    use crate::error::EngineError;

    fn loaded(duration: f64) -> TimeDomain {
        let mut time = TimeDomain::new(1.0);
        time.load(duration).expect("duration should be valid");
        time
    }

    #[test]
    fn load_rejects_non_positive_duration() {
        let mut time = TimeDomain::new(1.0);
        assert!(matches!(time.load(-3.0), Err(EngineError::InvalidDuration(_))));
        assert!(!time.is_loaded());
    }

    #[test]
    fn set_trim_before_load_is_ignored() {
        let mut time = TimeDomain::new(1.0);
        assert!(!time.set_trim(1.0, 2.0));
        assert_eq!(time.trim_end(), 0.0);
    }

    #[test]
    fn set_trim_clamps_out_of_range_input() {
        let inputs = [
            (-5.0, 100.0),
            (19.8, 19.9),
            (25.0, 30.0),
            (-4.0, -2.0),
            (10.0, 3.0),
            (0.0, 0.5),
            (3.0, 3.0),
        ];

        for (start, end) in inputs {
            let mut time = loaded(20.0);
            time.set_trim(start, end);
            assert!(time.trim_start() >= 0.0, "start for {start}..{end}");
            assert!(time.trim_start() < time.trim_end(), "order for {start}..{end}");
            assert!(time.trim_end() <= 20.0, "end for {start}..{end}");
            assert!(time.window_len() >= 1.0 - 1e-9, "gap for {start}..{end}");
        }
    }

    #[test]
    fn set_trim_caps_gap_for_short_sources() {
        let mut time = loaded(0.4);
        time.set_trim(0.1, 0.2);
        assert_eq!(time.trim_start(), 0.0);
        assert_eq!(time.trim_end(), 0.4);
    }

    #[test]
    fn set_trim_pulls_playhead_back_into_window() {
        let mut time = loaded(20.0);
        time.seek(15.0);
        time.set_trim(2.0, 10.0);
        assert_eq!(time.current_time(), 8.0);
    }

    #[test]
    fn seek_clamps_when_not_playing_and_wraps_while_playing() {
        let mut time = loaded(20.0);
        time.set_trim(2.0, 18.0);

        assert_eq!(time.seek(30.0), 16.0);
        assert_eq!(time.seek(-1.0), 0.0);

        time.set_mode(PlaybackMode::Playing).expect("idle -> playing");
        assert_eq!(time.seek(17.0), 0.0);
        assert_eq!(time.seek(12.5), 12.5);
    }

    #[test]
    fn entering_drag_mode_stops_playback() {
        let mut time = loaded(20.0);
        time.set_mode(PlaybackMode::Playing).expect("idle -> playing");
        time.set_mode(PlaybackMode::Scrubbing)
            .expect("playing -> scrubbing");
        assert!(!time.is_playing());
        time.set_mode(PlaybackMode::Idle).expect("scrubbing -> idle");
        assert_eq!(time.mode(), PlaybackMode::Idle);
    }

    #[test]
    fn switching_between_drag_modes_is_rejected() {
        let mut time = loaded(20.0);
        time.set_mode(PlaybackMode::Trimming).expect("idle -> trimming");

        let result = time.set_mode(PlaybackMode::Scrubbing);
        assert!(matches!(
            result,
            Err(EngineError::InvalidModeTransition {
                from: PlaybackMode::Trimming,
                to: PlaybackMode::Scrubbing,
            })
        ));
        assert!(time.set_mode(PlaybackMode::Playing).is_err());
    }

    #[test]
    fn window_conversions_use_trim_start() {
        let mut time = loaded(20.0);
        time.set_trim(2.0, 18.0);
        assert_eq!(time.to_source_time(3.0), 5.0);
        assert_eq!(time.to_window_time(1.0), 0.0);
        assert!(time.is_past_window_end(16.0));
        assert!(!time.is_past_window_end(15.9));
    }
}
