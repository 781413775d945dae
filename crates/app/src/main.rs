mod decode;
mod sink;

use std::{
    io::BufRead,
    path::{Path, PathBuf},
    time::Duration,
};

use clap::{Parser, Subcommand, ValueEnum};
use crossbeam_channel::{bounded, Sender};
use music_particles_core::{
    session, AppConfig, AudioFeatureSource, ClockDrive, EffectKind, FeatureFrame, LoopOptions,
    LoopSignal, ParticleSimulation, RenderSink, Transport,
};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use crate::sink::{FanOut, JsonLinesSink, StatsSink};

/// How often the playback transport refreshes its position.
const TRANSPORT_TICK: Duration = Duration::from_millis(5);

fn main() -> music_particles_core::Result<()> {
    init_tracing();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run(args) => run_effect(args),
        Commands::Features {
            input,
            effect,
            config,
            output,
        } => run_features(&input, effect, config.as_deref(), output.as_deref()),
        Commands::Config { effect } => print_config(effect),
    }
}

fn run_effect(args: RunArgs) -> music_particles_core::Result<()> {
    let mut config = load_config(args.effect, args.config.as_deref())?;
    if args.offline {
        config.render.pacing = false;
    }
    tracing::info!(
        input = ?args.input,
        effect = %config.effect.kind(),
        offline = args.offline,
        "starting run"
    );

    let buffer = decode::decode_mono(&args.input)?;
    let length = buffer.duration();
    let mut source = AudioFeatureSource::from_buffer(buffer, config.analysis.clone())?;
    let mut simulation = ParticleSimulation::from_config(&config, args.seed)?;

    let mut sinks: Vec<Box<dyn RenderSink>> = vec![Box::new(StatsSink::new(
        u64::from(config.render.fps) * 5,
    ))];
    if let Some(path) = &args.snapshots {
        sinks.push(Box::new(JsonLinesSink::create(path)?));
    }
    let mut sink = FanOut::new(sinks);

    let max_frames = args
        .max_seconds
        .map(|seconds| (seconds.max(0.0) * f64::from(config.render.fps)).ceil() as u64);

    let (signal_tx, signal_rx) = bounded(4);
    let mut options = LoopOptions {
        render_fps: config.render.fps,
        pacing: config.render.pacing,
        clock: ClockDrive::FrameLocked,
        max_frames,
    };

    let summary = if args.offline {
        session::run(&mut source, &mut simulation, &mut sink, &signal_rx, options)?
    } else if args.wall_clock {
        options.clock = ClockDrive::WallClock;
        watch_stdin(signal_tx);
        session::run(&mut source, &mut simulation, &mut sink, &signal_rx, options)?
    } else {
        let mut transport = Transport::start(length, TRANSPORT_TICK, signal_tx.clone())?;
        watch_stdin(signal_tx);
        options.clock = ClockDrive::Reported(&transport);
        let summary = session::run(&mut source, &mut simulation, &mut sink, &signal_rx, options);
        transport.stop();
        summary?
    };

    tracing::info!(
        frames = summary.frames,
        end = ?summary.end,
        overruns = summary.overruns,
        "run finished"
    );
    Ok(())
}

fn run_features(
    input: &Path,
    effect: EffectArg,
    config: Option<&Path>,
    output: Option<&Path>,
) -> music_particles_core::Result<()> {
    let config = load_config(effect, config)?;
    let buffer = decode::decode_mono(input)?;
    let mut source = AudioFeatureSource::from_buffer(buffer, config.analysis)?;

    let dump = FeatureDump {
        sample_rate: source.sample_rate(),
        feature_fps: source.feature_fps(),
        samples_per_frame: source.samples_per_frame(),
        frames: source.precompute(),
    };
    tracing::info!(frames = dump.frames.len(), "computed features");

    match output {
        Some(path) => {
            let file = std::fs::File::create(path)?;
            serde_json::to_writer(std::io::BufWriter::new(file), &dump)?;
            tracing::info!(path = %path.display(), "wrote features");
        }
        None => println!("{}", serde_json::to_string_pretty(&dump)?),
    }
    Ok(())
}

fn print_config(effect: EffectArg) -> music_particles_core::Result<()> {
    println!("{}", effect.preset().to_json_pretty()?);
    Ok(())
}

fn load_config(effect: EffectArg, path: Option<&Path>) -> music_particles_core::Result<AppConfig> {
    match path {
        Some(path) => {
            let config = AppConfig::load(path)?;
            let requested = EffectKind::from(effect);
            if config.effect.kind() != requested {
                tracing::warn!(
                    file = %config.effect.kind(),
                    requested = %requested,
                    "config file selects a different effect; using the file"
                );
            }
            Ok(config)
        }
        None => Ok(effect.preset()),
    }
}

/// Any line on stdin asks the frame loop to quit.
fn watch_stdin(signals: Sender<LoopSignal>) {
    let spawned = std::thread::Builder::new()
        .name("stdin-quit".into())
        .spawn(move || {
            let mut line = String::new();
            if std::io::stdin().lock().read_line(&mut line).unwrap_or(0) > 0 {
                let _ = signals.send(LoopSignal::Quit);
            }
        });
    if let Err(err) = spawned {
        tracing::warn!(%err, "quit watcher unavailable");
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();
}

#[derive(Serialize)]
struct FeatureDump {
    sample_rate: u32,
    feature_fps: u32,
    samples_per_frame: usize,
    frames: Vec<FeatureFrame>,
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Audio-reactive particle effects", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Play a track through one of the particle effects.
    Run(RunArgs),
    /// Analyse a track and dump its feature frames as JSON.
    Features {
        /// Audio file to analyse.
        input: PathBuf,
        /// Effect whose analysis preset to use.
        #[arg(short, long, value_enum, default_value_t = EffectArg::Firework)]
        effect: EffectArg,
        /// Configuration file; overrides the preset.
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Output path. Prints to stdout when omitted.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Print the default configuration of an effect.
    Config {
        #[arg(short, long, value_enum, default_value_t = EffectArg::Firework)]
        effect: EffectArg,
    },
}

#[derive(clap::Args, Debug)]
struct RunArgs {
    /// Audio file to play (WAV or MP3).
    input: PathBuf,
    #[arg(short, long, value_enum, default_value_t = EffectArg::Firework)]
    effect: EffectArg,
    /// Configuration file; overrides the preset.
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Seed for the random stream.
    #[arg(long)]
    seed: Option<u64>,
    /// Write every snapshot to this file as JSON lines.
    #[arg(long)]
    snapshots: Option<PathBuf>,
    /// Step one frame per feature tick as fast as possible, without playback.
    #[arg(long)]
    offline: bool,
    /// Follow wall-clock time instead of the playback position.
    #[arg(long, conflicts_with = "offline")]
    wall_clock: bool,
    /// Stop after this many seconds of rendered frames.
    #[arg(long)]
    max_seconds: Option<f64>,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum EffectArg {
    /// Large and small shells picked by loudness.
    Firework,
    /// Random classic shells, likelier when loud.
    FireworkClassic,
    Rain,
    Snow,
}

impl EffectArg {
    fn preset(self) -> AppConfig {
        match self {
            EffectArg::FireworkClassic => AppConfig::firework_classic(),
            other => AppConfig::preset(other.into()),
        }
    }
}

impl From<EffectArg> for EffectKind {
    fn from(arg: EffectArg) -> Self {
        match arg {
            EffectArg::Firework | EffectArg::FireworkClassic => EffectKind::Firework,
            EffectArg::Rain => EffectKind::Rain,
            EffectArg::Snow => EffectKind::Snow,
        }
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_run_flags() {
        let cli = Cli::try_parse_from([
            "music-particles",
            "run",
            "track.wav",
            "--effect",
            "snow",
            "--seed",
            "7",
            "--offline",
            "--max-seconds",
            "2.5",
        ])
        .unwrap();

        let Commands::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.effect, EffectArg::Snow);
        assert_eq!(args.seed, Some(7));
        assert!(args.offline);
        assert_eq!(args.max_seconds, Some(2.5));
        assert_eq!(EffectKind::from(args.effect), EffectKind::Snow);
    }

    #[test]
    fn classic_firework_is_selectable() {
        let cli = Cli::try_parse_from(["music-particles", "config", "--effect", "firework-classic"])
            .unwrap();
        let Commands::Config { effect } = cli.command else {
            panic!("expected config");
        };
        assert_eq!(effect, EffectArg::FireworkClassic);
        assert_eq!(EffectKind::from(effect), EffectKind::Firework);
        assert_eq!(effect.preset(), AppConfig::firework_classic());
        assert_ne!(effect.preset(), EffectArg::Firework.preset());
    }

    #[test]
    fn offline_and_wall_clock_conflict() {
        let parsed = Cli::try_parse_from([
            "music-particles",
            "run",
            "track.wav",
            "--offline",
            "--wall-clock",
        ]);
        assert!(parsed.is_err());
    }
}
