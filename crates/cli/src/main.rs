use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use riff_core::{
    AudioCache, ChordProgression, EngineConfig, MixdownError, ProjectDocument, SoloPolicy, TimeContext,
    load_project, project_virtual_clips, render_mixdown,
};

/// Inspect and render riff projects
#[derive(Parser, Debug)]
#[command(name = "riff")]
#[command(version)]
struct Args {
    /// Config file (defaults to the user config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Print tracks, clips and the chord layout of a project
    Info { project: PathBuf },

    /// Mix every track down to a WAV file
    Render {
        project: PathBuf,

        #[arg(short, long, default_value = "mixdown.wav")]
        output: PathBuf,

        #[arg(long)]
        sample_rate: Option<u32>,

        #[arg(long, value_enum)]
        solo_policy: Option<SoloMode>,

        /// Gain of non-soloed tracks with `--solo-policy dampen`
        #[arg(long, default_value_t = 0.3)]
        dampen: f32,

        /// Render this many seconds instead of up to the last clip
        #[arg(long)]
        duration: Option<f64>,

        /// Directory relative audio references are resolved against
        /// (defaults to the project's directory)
        #[arg(long)]
        media_root: Option<PathBuf>,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum SoloMode {
    Dampen,
    Mute,
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let args = Args::parse();
    let config = match &args.config {
        Some(path) => EngineConfig::load_from(path),
        None => EngineConfig::load(),
    };

    match args.command {
        Cmd::Info { project } => info(&project, &config),
        Cmd::Render {
            project,
            output,
            sample_rate,
            solo_policy,
            dampen,
            duration,
            media_root,
        } => {
            let mut config = config;
            if let Some(rate) = sample_rate {
                config.mixdown.sample_rate = rate;
            }
            match solo_policy {
                Some(SoloMode::Dampen) => config.mixdown.solo_policy = SoloPolicy::Dampen { factor: dampen },
                Some(SoloMode::Mute) => config.mixdown.solo_policy = SoloPolicy::Mute,
                None => {}
            }
            let media_root = media_root.unwrap_or_else(|| project_dir(&project));
            render(&project, &output, &media_root, duration, &config)
        }
    }
}

fn project_dir(project: &Path) -> PathBuf {
    project
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."))
}

fn load(path: &Path) -> anyhow::Result<ProjectDocument> {
    load_project(path).with_context(|| format!("failed to load {}", path.display()))
}

fn info(path: &Path, config: &EngineConfig) -> anyhow::Result<()> {
    let document = load(path)?;
    let project = &document.project;
    let time = TimeContext::new(
        project.tempo.bpm(),
        project.time_signature,
        config.base_pixels_per_second,
    );
    let (numerator, denominator) = project.time_signature;

    println!("{}", project.name);
    println!("  tempo: {} BPM, {numerator}/{denominator}", project.tempo.bpm());
    println!("  tracks: {}, clips: {}", document.tracks.len(), document.clip_count());

    for track in &document.tracks {
        let flags = [
            (track.is_backing_track, "backing"),
            (track.muted, "muted"),
            (track.solo, "solo"),
        ]
        .iter()
        .filter(|(on, _)| *on)
        .map(|(_, name)| *name)
        .collect::<Vec<_>>()
        .join(", ");
        println!(
            "\n[{}] {} vol {:.2} pan {:+.2} {flags}",
            track.order, track.name, track.volume, track.pan
        );
        for clip in track.clips() {
            println!(
                "  {} +{:.3}s  {}",
                time.format_position(clip.start),
                clip.duration,
                clip.kind.label()
            );
        }
    }

    let progression = ChordProgression::new(project.chord_progression.clone())?;
    let has_chord_clips = document
        .tracks
        .iter()
        .filter(|t| t.is_backing_track)
        .any(|t| t.clips().iter().any(|c| c.is_chord()));
    if !progression.is_empty() && !has_chord_clips {
        println!("\nchords (not yet on the backing track):");
        for chord in project_virtual_clips(&progression, &time) {
            println!("  {}  {}", time.format_position(chord.start), chord.chord.chord_name);
        }
    }
    Ok(())
}

fn render(
    path: &Path,
    output: &Path,
    media_root: &Path,
    duration: Option<f64>,
    config: &EngineConfig,
) -> anyhow::Result<()> {
    let document = load(path)?;
    let cache = AudioCache::with_media_root(media_root);

    let rendered = match render_mixdown(&document.tracks, &cache, &config.mixdown, duration) {
        Ok(rendered) => rendered,
        Err(MixdownError::NothingToRender { cause, warnings }) => {
            for warning in &warnings {
                log::warn!("{warning}");
            }
            anyhow::bail!("nothing to render: {cause}");
        }
        Err(e) => return Err(e.into()),
    };

    std::fs::write(output, &rendered.wav)
        .with_context(|| format!("failed to write {}", output.display()))?;
    log::info!(
        "wrote {} ({:.2}s, {} clips, {} skipped)",
        output.display(),
        rendered.duration,
        rendered.scheduled_clips,
        rendered.warnings.len()
    );
    Ok(())
}
