use std::sync::{Arc, Mutex};

use engine::export::{OperationKind, TextGeometry};
use engine::thumbnails::{
    ThumbnailBatches, ThumbnailDescriptor, ThumbnailLayout, ThumbnailRequest, ThumbnailStatus,
};
use engine::{
    AspectRatio, Command, EditorConfig, Engine, EngineError, Event, FileTypeFilter, MediaBackend,
    OperationElement, PickedFile,
};

/// Backend that renders one thumbnail per batch and records every export payload.
#[derive(Debug, Clone, Default)]
struct RecordingBackend {
    exports: Arc<Mutex<Vec<String>>>,
}

impl MediaBackend for RecordingBackend {
    fn generate_thumbnails(&self, request: &ThumbnailRequest) -> engine::Result<ThumbnailBatches> {
        let layout = ThumbnailLayout {
            interval_seconds: 4.0,
            pixels_per_second: 10.0,
        };
        let mut delivered = Vec::new();
        let batches: Vec<engine::Result<Vec<ThumbnailDescriptor>>> = layout
            .slots(request.start, request.duration)
            .into_iter()
            .map(|slot| {
                delivered.push(ThumbnailDescriptor {
                    uri: Some(format!("thumb-{}.jpg", slot.time)),
                    time: slot.time,
                    width: slot.width,
                    status: ThumbnailStatus::Success,
                });
                Ok(delivered.clone())
            })
            .collect();
        Ok(Box::new(batches.into_iter()))
    }

    fn process_video_editing(&self, config_json: &str) -> engine::Result<String> {
        self.exports
            .lock()
            .expect("lock exports")
            .push(config_json.to_string());
        Ok("file:///exports/out.mp4".to_string())
    }

    fn pick_file(&self, _filter: FileTypeFilter) -> engine::Result<PickedFile> {
        Err(EngineError::PickerCancelled)
    }
}

fn run(engine: &mut Engine<RecordingBackend>, command: Command) -> Vec<Event> {
    engine
        .handle_command(command)
        .expect("command should succeed")
}

fn loaded(duration: f64) -> Engine<RecordingBackend> {
    loaded_with(RecordingBackend::default(), duration)
}

fn loaded_with(backend: RecordingBackend, duration: f64) -> Engine<RecordingBackend> {
    let mut engine = Engine::new(backend);
    run(
        &mut engine,
        Command::LoadSource {
            uri: "file:///clips/beach.mp4".into(),
        },
    );
    run(
        &mut engine,
        Command::SourceLoaded {
            duration,
            natural_size: None,
        },
    );
    engine
}

fn synced(events: &[Event]) -> &engine::audio_sync::TickOutcome {
    events
        .iter()
        .find_map(|event| match event {
            Event::PlaybackSynced(outcome) => Some(outcome),
            _ => None,
        })
        .expect("PlaybackSynced event")
}

#[test]
fn playback_loops_inside_trim_window_and_reprimes_music() {
    let mut engine = loaded(20.0);
    run(&mut engine, Command::SetTrim { start: 2.0, end: 18.0 });
    run(
        &mut engine,
        Command::AddAudio {
            uri: "song.mp3".into(),
            clip_duration: 5.0,
            audio_offset: 0.0,
            is_looped: true,
            start: None,
            end: None,
        },
    );
    run(&mut engine, Command::Play);

    let events = run(&mut engine, Command::Seek { time: 17.0 });
    assert_eq!(events[0], Event::PlayheadChanged { current_time: 0.0 });
    assert_eq!(synced(&events).video_seek, Some(2.0));

    let events = run(&mut engine, Command::PlaybackProgress { current_time: 9.0 });
    assert_eq!(engine.session().time.current_time(), 7.0);
    assert_eq!(synced(&events).sync.music_seek, Some(2.0));
    assert!(!synced(&events).wrapped);

    let events = run(&mut engine, Command::PlaybackProgress { current_time: 18.0 });
    let outcome = synced(&events);
    assert!(outcome.wrapped);
    assert_eq!(outcome.video_seek, Some(2.0));
    assert_eq!(outcome.sync.music_seek, Some(0.0));
    assert_eq!(engine.session().time.current_time(), 0.0);
    assert!(engine.session().time.is_playing());
}

#[test]
fn reset_during_generation_discards_remaining_batches() {
    let mut engine = loaded(20.0);
    run(&mut engine, Command::PollThumbnails);
    assert_eq!(engine.session().thumbnails.thumbnails().len(), 1);

    let events = run(&mut engine, Command::ResetThumbnails);
    assert!(matches!(
        &events[0],
        Event::ThumbnailsChanged { thumbnails, is_generating: false, .. } if thumbnails.is_empty()
    ));

    assert!(run(&mut engine, Command::PollThumbnails).is_empty());
    assert!(engine.session().thumbnails.thumbnails().is_empty());
}

#[test]
fn full_generation_covers_source_in_order() {
    let mut engine = loaded(10.0);
    while !run(&mut engine, Command::PollThumbnails).is_empty() {}

    let times: Vec<f64> = engine
        .session()
        .thumbnails
        .thumbnails()
        .iter()
        .map(|thumb| thumb.time)
        .collect();
    assert_eq!(times, vec![0.0, 4.0, 8.0]);
    assert!(!engine.session().thumbnails.is_generating());
}

#[test]
fn exports_begin_with_source_and_carry_one_trim() {
    let mut engine = loaded(30.0);
    run(&mut engine, Command::SetTrim { start: 5.0, end: 25.0 });
    run(
        &mut engine,
        Command::SetAspectRatio {
            ratio: AspectRatio::NineSixteen,
        },
    );
    run(
        &mut engine,
        Command::AddText {
            text: "Summer".into(),
            font_size: Some(32.0),
            color: None,
            background_color: None,
            x: 40.0,
            y: 80.0,
            start: Some(1.0),
            end: Some(4.0),
        },
    );
    run(
        &mut engine,
        Command::AddVoiceOver {
            uri: "voice.m4a".into(),
            start: 2.0,
            end: 6.0,
        },
    );

    let snapshot = engine.session().export_snapshot().expect("snapshot");
    let config = snapshot.build(&TextGeometry::from_config(&EditorConfig::default()));
    let kinds: Vec<OperationKind> = config
        .video_elements
        .iter()
        .map(OperationElement::kind)
        .collect();

    assert_eq!(kinds[0], OperationKind::VideoUri);
    assert_eq!(
        kinds.iter().filter(|kind| **kind == OperationKind::Trim).count(),
        1
    );
    assert_eq!(
        kinds,
        vec![
            OperationKind::VideoUri,
            OperationKind::Crop,
            OperationKind::Trim,
            OperationKind::AddTextOverlay,
            OperationKind::AddVoiceOver,
        ]
    );
}

#[test]
fn export_is_deterministic_and_reports_output() {
    let backend = RecordingBackend::default();
    let exports = Arc::clone(&backend.exports);
    let mut engine = loaded_with(backend, 12.0);
    run(&mut engine, Command::SetMuted { muted: true });
    let prepared = engine.prepare_export().expect("prepare export");
    assert_eq!(prepared, engine.prepare_export().expect("prepare export"));

    let events = run(&mut engine, Command::Export);
    let Event::EditorClosed(result) = &events[0] else {
        panic!("export must close the editor");
    };
    assert!(result.success);
    assert_eq!(result.exported_uri.as_deref(), Some("file:///exports/out.mp4"));
    assert_eq!(exports.lock().expect("lock exports")[0], prepared);
}

#[test]
fn snapshot_is_unaffected_by_later_edits() {
    let mut engine = loaded(12.0);
    let snapshot = engine.session().export_snapshot().expect("snapshot");
    let geometry = TextGeometry::from_config(engine.config());
    let before = snapshot.build(&geometry).to_json().expect("json");

    run(&mut engine, Command::SetTrim { start: 3.0, end: 9.0 });
    run(
        &mut engine,
        Command::AddVoiceOver {
            uri: "late.m4a".into(),
            start: 0.0,
            end: 1.0,
        },
    );

    assert_eq!(snapshot.build(&geometry).to_json().expect("json"), before);
    assert_ne!(engine.prepare_export().expect("prepare export"), before);
}

#[test]
fn music_replaces_while_overlays_accumulate() {
    let mut engine = loaded(20.0);
    for uri in ["first.mp3", "second.mp3"] {
        run(
            &mut engine,
            Command::AddAudio {
                uri: uri.into(),
                clip_duration: 10.0,
                audio_offset: 0.0,
                is_looped: false,
                start: None,
                end: None,
            },
        );
    }
    for (start, end) in [(0.0, 5.0), (3.0, 8.0)] {
        run(
            &mut engine,
            Command::AddVoiceOver {
                uri: format!("voice-{start}.m4a"),
                start,
                end,
            },
        );
    }

    let segments = &engine.session().segments;
    assert_eq!(segments.len(), 3);
    assert_eq!(
        segments.audio().map(|(_, clip)| clip.uri.as_str()),
        Some("second.mp3")
    );
    assert_eq!(segments.voice_overs().count(), 2);
}

#[test]
fn loading_a_new_source_clears_previous_edits() {
    let mut engine = loaded(20.0);
    run(
        &mut engine,
        Command::AddVoiceOver {
            uri: "voice.m4a".into(),
            start: 0.0,
            end: 2.0,
        },
    );

    run(
        &mut engine,
        Command::LoadSource {
            uri: "file:///clips/city.mp4".into(),
        },
    );
    assert!(engine.session().segments.is_empty());
    assert!(!engine.session().time.is_loaded());
    assert!(matches!(
        engine.handle_command(Command::Play),
        Err(EngineError::SourceNotLoaded)
    ));
}
