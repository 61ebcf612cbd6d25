//! Trimline CLI - replays an editing script against the timeline engine.

use std::fs;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use engine::thumbnails::{
    ThumbnailBatches, ThumbnailDescriptor, ThumbnailLayout, ThumbnailRequest, ThumbnailStatus,
};
use engine::{
    Command, EditorConfig, Engine, EngineError, EngineErrorEvent, Event, FileTypeFilter,
    MediaBackend, PickedFile,
};
use tracing::{info, warn};

/// Thumbnails delivered per batch by the dry-run generator.
const THUMBNAILS_PER_BATCH: usize = 4;

/// Command-line arguments for the trimline tool.
#[derive(Parser, Debug)]
#[command(name = "trimline")]
#[command(version)]
#[command(about = "Replays a timeline editing script and writes the export config")]
#[command(long_about = "Trimline feeds a JSON array of editor commands to the timeline engine \
    and prints every emitted event as one JSON line.\n\n\
    EXAMPLES:\n    \
    trimline -s session.json -o export.json\n    \
    trimline -s session.json -o export.json --config editor.json --music song.mp3")]
struct Args {
    /// Editing script: a JSON array of commands
    #[arg(short, long)]
    script: PathBuf,

    /// Where the export config is written when the script exports
    #[arg(short, long, default_value = "export.json")]
    output: PathBuf,

    /// Editor configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// File returned by the audio picker; without it the picker is dismissed
    #[arg(long)]
    music: Option<String>,

    /// Verbose output with debug logging
    #[arg(short, long)]
    verbose: bool,
}

/// Backend that synthesizes thumbnails and writes the export config to disk.
#[derive(Debug)]
struct DryRunBackend {
    layout: ThumbnailLayout,
    output: PathBuf,
    music: Option<String>,
}

impl MediaBackend for DryRunBackend {
    fn generate_thumbnails(&self, request: &ThumbnailRequest) -> engine::Result<ThumbnailBatches> {
        let frames: Vec<ThumbnailDescriptor> = self
            .layout
            .slots(request.start, request.duration)
            .into_iter()
            .map(|slot| ThumbnailDescriptor {
                uri: Some(format!("{}#t={:.3}", request.uri, slot.time)),
                time: slot.time,
                width: slot.width,
                status: ThumbnailStatus::Success,
            })
            .collect();

        // Each batch carries every frame produced so far.
        let batch_count = frames.len().div_ceil(THUMBNAILS_PER_BATCH);
        let batches = (1..=batch_count)
            .map(move |index| {
                let end = (index * THUMBNAILS_PER_BATCH).min(frames.len());
                Ok(frames[..end].to_vec())
            })
            .collect::<Vec<engine::Result<Vec<ThumbnailDescriptor>>>>();
        Ok(Box::new(batches.into_iter()))
    }

    fn process_video_editing(&self, config_json: &str) -> engine::Result<String> {
        fs::write(&self.output, config_json).map_err(|error| EngineError::ExportFailure {
            message: format!("failed to write {}: {error}", self.output.display()),
        })?;
        Ok(format!("file://{}", self.output.display()))
    }

    fn pick_file(&self, filter: FileTypeFilter) -> engine::Result<PickedFile> {
        match (filter, &self.music) {
            (FileTypeFilter::Audio, Some(uri)) => Ok(PickedFile {
                uri: uri.clone(),
                name: uri.rsplit('/').next().unwrap_or(uri).to_string(),
            }),
            _ => Err(EngineError::PickerCancelled),
        }
    }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(if args.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        })
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);

    let config = match &args.config {
        Some(path) => EditorConfig::from_path(path)?,
        None => EditorConfig::default(),
    };
    let script = fs::read_to_string(&args.script)
        .with_context(|| format!("failed to read script {}", args.script.display()))?;
    let commands: Vec<Command> = serde_json::from_str(&script)
        .with_context(|| format!("failed to parse script {}", args.script.display()))?;

    let backend = DryRunBackend {
        layout: ThumbnailLayout {
            interval_seconds: config.thumbnails.interval_seconds,
            pixels_per_second: config.thumbnails.pixels_per_second,
        },
        output: args.output.clone(),
        music: args.music.clone(),
    };
    let mut engine = Engine::with_config(backend, config);

    info!(commands = commands.len(), script = %args.script.display(), "replaying script");
    for command in commands {
        let events = match engine.handle_command(command) {
            Ok(events) => events,
            Err(error) => {
                warn!(%error, "command rejected");
                vec![Event::Error(EngineErrorEvent::from_error(&error))]
            }
        };
        for event in events {
            println!("{}", serde_json::to_string(&event)?);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{DryRunBackend, THUMBNAILS_PER_BATCH};
    use engine::thumbnails::{ThumbnailLayout, ThumbnailRequest};
    use engine::{EngineError, FileTypeFilter, MediaBackend};
    use std::path::PathBuf;

    fn backend(music: Option<&str>) -> DryRunBackend {
        DryRunBackend {
            layout: ThumbnailLayout {
                interval_seconds: 1.0,
                pixels_per_second: 60.0,
            },
            output: PathBuf::from("unused.json"),
            music: music.map(str::to_string),
        }
    }

    #[test]
    fn dry_run_batches_grow_until_the_window_is_covered() {
        let request = ThumbnailRequest {
            token: 1,
            uri: "video.mp4".to_string(),
            start: 0.0,
            duration: 10.0,
        };
        let batches: Vec<_> = backend(None)
            .generate_thumbnails(&request)
            .expect("generator")
            .map(|batch| batch.expect("batch"))
            .collect();

        assert_eq!(batches[0].len(), THUMBNAILS_PER_BATCH);
        let last = batches.last().expect("last batch");
        assert_eq!(last.len(), 10);
        assert_eq!(last[0].uri.as_deref(), Some("video.mp4#t=0.000"));
    }

    #[test]
    fn picker_without_music_is_dismissed() {
        assert!(matches!(
            backend(None).pick_file(FileTypeFilter::Audio),
            Err(EngineError::PickerCancelled)
        ));
        let picked = backend(Some("/music/song.mp3"))
            .pick_file(FileTypeFilter::Audio)
            .expect("picked");
        assert_eq!(picked.name, "song.mp3");
    }
}
