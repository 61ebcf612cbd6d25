//! Per-tick synchronisation of background music, voice-overs and volumes.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::segments::{AudioClip, Segment, SegmentId, SegmentStore};
use crate::time::TimeDomain;

pub const MUSIC_VOLUME_FULL: f64 = 1.0;
pub const MUSIC_VOLUME_UNDER_VOICE_OVER: f64 = 0.4;
pub const VIDEO_VOLUME_FULL: f64 = 1.0;
pub const VIDEO_VOLUME_UNDER_MUSIC: f64 = 0.46;
pub const VIDEO_VOLUME_UNDER_VOICE_OVER: f64 = 0.15;
pub const VIDEO_VOLUME_MUTED: f64 = 0.0;

/// Player volumes the host applies on each tick.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Volumes {
    pub background_music: f64,
    pub main_video: f64,
}

/// Where one voice-over player should sit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VoiceOverSeek {
    pub segment_id: SegmentId,
    pub active: bool,
    /// Position inside the voice-over file; `0` while inactive.
    pub position: f64,
}

/// Seek targets and volumes for one window-relative time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncPlan {
    pub current_time: f64,
    /// Seek target for the background-music player, absent without music.
    pub music_seek: Option<f64>,
    pub voice_overs: Vec<VoiceOverSeek>,
    pub volumes: Volumes,
}

/// Result of handling one playback progress callback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickOutcome {
    /// True when the window end was reached and playback looped.
    pub wrapped: bool,
    /// Source-time seek for the video player, set on loop-back.
    pub video_seek: Option<f64>,
    pub sync: SyncPlan,
}

/// Offset into the music clip for window-relative `current_time`.
///
/// Looped clips wrap every `clip_duration` seconds (zero when the clip length
/// is unknown); one-shot clips advance linearly from the segment start.
pub fn music_playback_offset(current_time: f64, segment: &Segment, clip: &AudioClip) -> f64 {
    let elapsed = current_time - segment.start;
    if clip.is_looped {
        if clip.clip_duration > 0.0 {
            elapsed % clip.clip_duration
        } else {
            0.0
        }
    } else {
        elapsed
    }
}

/// Absolute seek target for the music player, never before the file start.
///
/// # Example
/// ```
/// use engine::audio_sync::music_seek_target;
/// use engine::segments::{AudioClip, Segment, SegmentKind};
///
/// let clip = AudioClip {
///     uri: "song.mp3".into(),
///     audio_offset: 5.0,
///     is_looped: true,
///     clip_duration: 4.0,
/// };
/// let segment = Segment { id: 1, start: 1.0, end: 20.0, kind: SegmentKind::Audio(clip.clone()) };
/// assert_eq!(music_seek_target(10.0, &segment, &clip), 6.0);
/// ```
pub fn music_seek_target(current_time: f64, segment: &Segment, clip: &AudioClip) -> f64 {
    (clip.audio_offset + music_playback_offset(current_time, segment, clip)).max(0.0)
}

/// Seek positions for every voice-over; inactive ones rest at `0`.
pub fn voice_over_seeks(current_time: f64, segments: &SegmentStore) -> Vec<VoiceOverSeek> {
    segments
        .voice_overs()
        .map(|(segment, _)| {
            let active = segment.contains(current_time);
            VoiceOverSeek {
                segment_id: segment.id,
                active,
                position: if active {
                    current_time - segment.start
                } else {
                    0.0
                },
            }
        })
        .collect()
}

/// Ducking policy: voice-overs duck music and video, music ducks video.
pub fn ducking_volumes(current_time: f64, segments: &SegmentStore, muted: bool) -> Volumes {
    let voice_over_active = segments
        .voice_overs()
        .any(|(segment, _)| segment.contains(current_time));
    let music_active = segments
        .audio()
        .is_some_and(|(segment, _)| segment.contains(current_time));

    let background_music = if voice_over_active {
        MUSIC_VOLUME_UNDER_VOICE_OVER
    } else {
        MUSIC_VOLUME_FULL
    };
    let main_video = if muted {
        VIDEO_VOLUME_MUTED
    } else if voice_over_active {
        VIDEO_VOLUME_UNDER_VOICE_OVER
    } else if music_active {
        VIDEO_VOLUME_UNDER_MUSIC
    } else {
        VIDEO_VOLUME_FULL
    };

    Volumes {
        background_music,
        main_video,
    }
}

/// Full sync plan for window-relative `current_time`.
pub fn plan(current_time: f64, segments: &SegmentStore, muted: bool) -> SyncPlan {
    SyncPlan {
        current_time,
        music_seek: segments
            .audio()
            .map(|(segment, clip)| music_seek_target(current_time, segment, clip)),
        voice_overs: voice_over_seeks(current_time, segments),
        volumes: ducking_volumes(current_time, segments, muted),
    }
}

/// Handles a progress callback carrying the decoded `source_time`.
///
/// Reaching the window end loops: the video is sent back to the trim start,
/// the playhead returns to `0` and music is re-primed from the window start.
/// During a drag the playhead is owned by the gesture and left untouched.
pub fn on_progress(
    time: &mut TimeDomain,
    segments: &SegmentStore,
    muted: bool,
    source_time: f64,
) -> TickOutcome {
    let relative = time.to_window_time(source_time);
    let dragging = time.mode().is_dragging();
    let volumes = ducking_volumes(relative, segments, muted);

    if time.is_past_window_end(relative) {
        if !dragging {
            time.seek(0.0);
        }
        debug!(
            source_time,
            trim_start = time.trim_start(),
            window_len = time.window_len(),
            "playback looped to window start"
        );
        let mut sync = plan(0.0, segments, muted);
        sync.volumes = volumes;
        return TickOutcome {
            wrapped: true,
            video_seek: Some(time.trim_start()),
            sync,
        };
    }

    let current_time = if dragging {
        time.current_time()
    } else {
        time.seek(relative)
    };
    let mut sync = plan(current_time, segments, muted);
    sync.volumes = volumes;
    TickOutcome {
        wrapped: false,
        video_seek: None,
        sync,
    }
}
