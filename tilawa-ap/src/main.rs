//! Tilawa Audio Player (tilawa-ap) - command-line entry point
//!
//! Plays a list of tracks once, gaplessly, then exits. Tracks are either
//! given directly as files/URLs or resolved from a verse range against the
//! configured audio layout.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tilawa_ap::audio::resolver::parse_verse_range;
use tilawa_ap::audio::{
    CpalOutput, OutputBackend, SourceFetcher, SymphoniaDecoder, TrackResolver, TrackSource,
    VerseAudioLocator, VirtualOutput,
};
use tilawa_ap::{Notifications, Sequencer, SequencerOptions, SequencerState, UnderrunPolicy};
use tilawa_common::config::{ConfigOverrides, TomlConfig, CONFIG_ENV_VAR};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for tilawa-ap
#[derive(Parser, Debug)]
#[command(name = "tilawa-ap")]
#[command(about = "Gapless recitation player")]
#[command(version)]
struct Args {
    /// Config file (default: <config dir>/tilawa/config.toml)
    #[arg(short, long, env = CONFIG_ENV_VAR)]
    config: Option<PathBuf>,

    /// Directory or HTTP(S) root holding {language}/{reciter}/{verse}.mp3
    #[arg(long)]
    audio_base: Option<String>,

    #[arg(long)]
    language: Option<String>,

    #[arg(long)]
    reciter: Option<String>,

    /// Playback gain (0.0 - 2.0)
    #[arg(long)]
    gain: Option<f32>,

    /// Behaviour when a track ends before the next one is decoded
    #[arg(long, value_name = "wait|stop")]
    underrun_policy: Option<UnderrunPolicy>,

    /// Play on a silent virtual device in real time
    #[arg(long)]
    no_audio: bool,

    /// Print every sequencer event as a JSON line on stdout
    #[arg(long)]
    json_events: bool,

    /// List output devices and exit
    #[arg(long)]
    list_devices: bool,

    /// Verse range to play, e.g. 1..=7
    #[arg(long, value_parser = parse_verse_range, conflicts_with = "sources")]
    verses: Option<std::ops::RangeInclusive<u32>>,

    /// Audio files or URLs to play in order
    sources: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let overrides = ConfigOverrides {
        config_path: args.config.clone(),
        audio_base: args.audio_base.clone(),
        language: args.language.clone(),
        reciter: args.reciter.clone(),
        gain: args.gain,
        underrun_policy: args.underrun_policy,
    };
    let config = TomlConfig::load(&overrides);

    // Filter level comes from the config when it loaded
    let level = config
        .as_ref()
        .map(|c| c.logging.level.clone())
        .unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("tilawa_ap={level},tilawa_common={level}").into()
            }),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = config.context("Failed to load configuration")?;

    if args.list_devices {
        for name in CpalOutput::list_devices().context("Failed to list output devices")? {
            println!("{}", name);
        }
        return Ok(());
    }

    let tracks = track_list(&args, &config)?;
    info!("Starting Tilawa Audio Player with {} tracks", tracks.len());

    let output: Arc<dyn OutputBackend> = if args.no_audio {
        info!("Audio output disabled, using virtual device");
        Arc::new(VirtualOutput::realtime(config.output.sample_rate))
    } else {
        Arc::new(CpalOutput::new(
            config.output.device.clone(),
            config.output.sample_rate,
            config.output.buffer_size,
        ))
    };

    let fetcher = SourceFetcher::new(config.playback.fetch_timeout())
        .context("Failed to build HTTP client")?;
    let decoder = Arc::new(SymphoniaDecoder::new(fetcher, config.output.sample_rate));

    let total = tracks.len();
    let notifications = Notifications::new()
        .on_track_changed(move |index| info!("Track {}/{}", index + 1, total))
        .on_play_state_changed(|playing| info!("Playing: {}", playing))
        .on_error(|e| warn!("{}", e));

    let sequencer = Sequencer::spawn(
        decoder,
        output,
        SequencerOptions::from_config(&config),
        notifications,
    );

    if args.json_events {
        let mut events = sequencer.subscribe();
        tokio::spawn(async move {
            while let Ok(event) = events.recv().await {
                match serde_json::to_string(&event) {
                    Ok(line) => println!("{}", line),
                    Err(e) => error!("Failed to serialize event: {}", e),
                }
            }
        });
    }

    let played = tokio::select! {
        result = play_through(&sequencer, tracks) => result,
        _ = shutdown_signal() => Ok(()),
    };

    sequencer.destroy().await;
    info!("Playback shutdown complete");
    played
}

/// Build the track list from explicit sources or a verse range
fn track_list(args: &Args, config: &TomlConfig) -> Result<Vec<TrackSource>> {
    if let Some(verses) = args.verses.clone() {
        let locator = VerseAudioLocator::from_config(config)
            .context("Invalid audio_base for verse lookup")?;
        return locator
            .playlist(verses)
            .context("Failed to resolve verse range");
    }

    if args.sources.is_empty() {
        bail!("Nothing to play: give --verses FIRST..=LAST or one or more sources");
    }
    args.sources
        .iter()
        .map(|s| s.parse::<TrackSource>().with_context(|| format!("Invalid source '{}'", s)))
        .collect()
}

/// Initialize, play, and wait until the list finishes or playback faults
async fn play_through(sequencer: &Sequencer, tracks: Vec<TrackSource>) -> Result<()> {
    sequencer
        .initialize(tracks)
        .await
        .context("Failed to load first track")?;

    let settled = sequencer
        .play_to_end()
        .await
        .context("Playback interrupted")?;

    if settled == SequencerState::Faulted {
        bail!("Playback stopped on an output fault");
    }
    info!("Finished playing track list");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
