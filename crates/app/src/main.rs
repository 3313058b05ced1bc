use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use serde::Deserialize;
use tempo_timeline_core::{
    time::position_at, AssetEntry, AssetStore, BeatGridGenerator, CommandQueue, EngineCommand,
    EngineConfig, ManualClock, Tempo, TimelineEngine, TimelineEvent, VoiceTracker,
};
use tracing_subscriber::EnvFilter;

fn main() -> tempo_timeline_core::Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };

    match cli.command {
        Commands::Grid {
            bpm,
            numerator,
            denominator,
            duration,
            subdivision,
            json,
        } => run_grid(
            &config,
            GridArgs {
                bpm,
                numerator,
                denominator,
                duration,
                subdivision,
            },
            json,
        ),
        Commands::Quantize {
            time,
            bpm,
            subdivision,
            no_snap,
        } => run_quantize(&config, time, bpm, subdivision, !no_snap),
        Commands::Simulate {
            script,
            fps,
            frames,
            assets,
        } => run_simulate(&config, script.as_deref(), fps, frames, &assets),
    }
}

struct GridArgs {
    bpm: Option<f64>,
    numerator: Option<u32>,
    denominator: Option<u32>,
    duration: Option<f64>,
    subdivision: Option<f64>,
}

fn run_grid(config: &EngineConfig, args: GridArgs, json: bool) -> tempo_timeline_core::Result<()> {
    let mut config = config.clone();
    let timeline = &mut config.timeline;
    timeline.bpm = args.bpm.unwrap_or(timeline.bpm);
    timeline.numerator = args.numerator.unwrap_or(timeline.numerator);
    timeline.denominator = args.denominator.unwrap_or(timeline.denominator);
    timeline.duration_seconds = args.duration.unwrap_or(timeline.duration_seconds);
    config.grid.subdivision = args.subdivision.unwrap_or(config.grid.subdivision);
    // Rejects non-finite durations and grids too large to build.
    config.validate()?;

    let tempo = config.tempo()?;
    let signature = config.time_signature()?;
    let subdivision = config.subdivision()?;
    let duration = config.timeline.duration_seconds;

    let markers =
        BeatGridGenerator::generate_with(duration, tempo.bpm(), signature, subdivision);
    tracing::info!(count = markers.len(), bpm = tempo.bpm(), %signature, "generated beat grid");

    if json {
        println!("{}", serde_json::to_string_pretty(&markers)?);
        return Ok(());
    }

    for marker in &markers {
        let position = position_at(marker.time_seconds, tempo.bpm(), signature);
        println!(
            "{:>10.4}s  beat {:>8.3}  {:<10}  {}",
            marker.time_seconds,
            marker.beat,
            position.to_string(),
            "|".repeat(marker.weight() as usize)
        );
    }
    Ok(())
}

fn run_quantize(
    config: &EngineConfig,
    time: f64,
    bpm: Option<f64>,
    subdivision: Option<f64>,
    snap: bool,
) -> tempo_timeline_core::Result<()> {
    let tempo = Tempo::new(bpm.unwrap_or(config.timeline.bpm))?;
    let subdivision = subdivision.unwrap_or(config.grid.subdivision);
    let snapped = BeatGridGenerator::quantize(time, tempo.bpm(), subdivision, snap)?;
    let position = position_at(snapped, tempo.bpm(), config.time_signature()?);
    println!("{snapped} ({position})");
    Ok(())
}

/// One line of a simulation script: a command and the timeline time at
/// which to apply it.
#[derive(Debug, Deserialize)]
struct ScriptStep {
    at: f64,
    #[serde(flatten)]
    command: EngineCommand,
}

fn load_script(path: &Path) -> tempo_timeline_core::Result<Vec<ScriptStep>> {
    let json = std::fs::read_to_string(path)?;
    let mut steps: Vec<ScriptStep> = serde_json::from_str(&json)?;
    steps.sort_by(|a, b| a.at.total_cmp(&b.at));
    Ok(steps)
}

fn run_simulate(
    config: &EngineConfig,
    script: Option<&Path>,
    fps: f64,
    frames: u64,
    assets: &[String],
) -> tempo_timeline_core::Result<()> {
    if !fps.is_finite() || fps <= 0.0 {
        return Err(tempo_timeline_core::TimelineError::invalid(format!(
            "fps must be positive, got {fps}"
        )));
    }
    let steps = match script {
        Some(path) => load_script(path)?,
        None => Vec::new(),
    };
    tracing::info!(steps = steps.len(), fps, frames, "starting simulation");

    let clock = ManualClock::new();
    let voices = VoiceTracker::new();
    let mut engine =
        TimelineEngine::new(clock.clone(), config)?.with_sound_sink(voices.clone());
    if !assets.is_empty() {
        let mut store = AssetStore::new();
        for id in assets {
            store.register(AssetEntry::new(id.as_str()));
        }
        engine = engine.with_assets(store);
    }
    engine.initialize()?;
    engine.subscribe(print_event);

    let mut pending = steps.into_iter().peekable();
    engine.play(None)?;

    for frame in 0..=frames {
        let now = frame as f64 / fps;
        clock.set(now);
        while let Some(step) = pending.next_if(|step| step.at <= now) {
            if let Err(err) = engine.apply(step.command) {
                tracing::warn!(%err, at = step.at, "script command failed");
            }
        }
        engine.tick();
        if !engine.wants_frames() && pending.peek().is_none() {
            break;
        }
    }

    tracing::info!(
        time = engine.current_time(),
        position = %engine.position(),
        voices = voices.active_count(),
        "simulation finished"
    );
    Ok(())
}

fn print_event(event: &TimelineEvent, _commands: &mut CommandQueue) {
    // Grids are large; print a summary instead of every marker.
    if let TimelineEvent::BeatMarkersUpdated { markers } = event {
        println!(r#"{{"event":"beat-markers-updated","count":{}}}"#, markers.len());
        return;
    }
    match serde_json::to_string(event) {
        Ok(line) => println!("{line}"),
        Err(err) => tracing::warn!(%err, "failed to serialise event"),
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Beat-synchronised timeline engine", long_about = None)]
struct Cli {
    /// JSON engine configuration. Command-line values override it.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the beat grid for a tempo, meter and duration.
    Grid {
        #[arg(long)]
        bpm: Option<f64>,
        #[arg(long)]
        numerator: Option<u32>,
        #[arg(long)]
        denominator: Option<u32>,
        /// Timeline length in seconds.
        #[arg(long)]
        duration: Option<f64>,
        /// Grid step as a fraction of one beat.
        #[arg(long)]
        subdivision: Option<f64>,
        /// Emit the markers as a JSON array.
        #[arg(long)]
        json: bool,
    },
    /// Snap a time in seconds to the beat grid.
    Quantize {
        /// Time in seconds.
        #[arg(allow_negative_numbers = true)]
        time: f64,
        #[arg(long)]
        bpm: Option<f64>,
        #[arg(long)]
        subdivision: Option<f64>,
        /// Return the time unchanged.
        #[arg(long)]
        no_snap: bool,
    },
    /// Play the timeline against a simulated clock and print every event as
    /// a JSON line.
    Simulate {
        /// JSON array of commands, each with an `at` time in seconds.
        #[arg(short, long)]
        script: Option<PathBuf>,
        #[arg(long, default_value_t = 60.0)]
        fps: f64,
        /// Maximum number of frames to drive.
        #[arg(long, default_value_t = 600)]
        frames: u64,
        /// Known asset ids. When given, keyframes referencing other assets
        /// are reported as missing.
        #[arg(long = "asset")]
        assets: Vec<String>,
    },
}
