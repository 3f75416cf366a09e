//! Application entry point: read-aloud.
//!
//! # Startup sequence
//!
//! 1. Initialise logging.
//! 2. Parse the command line.
//! 3. Open the settings store (`--config` or the platform default).
//! 4. Create the tokio runtime.
//! 5. For `page` / `text`: open the audio output, build the synthesis
//!    client, playback engine, context host and coordinator, start the read
//!    and relay stdin control lines until the session ends.

use std::io::Read as _;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context as _, Result};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{broadcast, mpsc};

use read_aloud::config::{AppConfig, FileSettingsStore, SettingsStore};
use read_aloud::coordinator::{Coordinator, LocalContextHost, StateSnapshot};
use read_aloud::extract::{ContentExtractor, Document, Extraction};
use read_aloud::playback::{PlaybackEngine, RodioOutput};
use read_aloud::session::SessionStatus;
use read_aloud::synth::ElevenLabsClient;

/// Speed change per `+` / `-` control line.
const SPEED_STEP: f32 = 0.25;

// ---------------------------------------------------------------------------
// Command line
// ---------------------------------------------------------------------------

#[derive(Parser)]
#[command(name = "read-aloud")]
#[command(about = "Read web pages and text aloud with ElevenLabs voices")]
#[command(version)]
struct Cli {
    /// Use this settings file instead of the default location
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Read the main content of an HTML file aloud
    Page { file: PathBuf },

    /// Read text aloud (from stdin when omitted)
    Text { text: Option<String> },

    /// Print the text that would be read from an HTML file
    Extract { file: PathBuf },

    /// List the voices available to the configured API key
    Voices,

    /// Show or change persisted settings
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Store the ElevenLabs API key
    SetKey { key: String },
    /// Choose the voice used for new sessions
    SetVoice { voice_id: String },
    /// Set the default playback speed (0.5 - 2.0)
    SetSpeed { speed: f32 },
    /// Print the current settings with the key masked
    Show,
}

/// What a read command starts from.
enum ReadSource {
    Page(Document),
    Text(String),
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    // 1. Logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // 2. Command line
    let cli = Cli::parse();

    // 3. Settings
    let settings: Arc<dyn SettingsStore> = Arc::new(match &cli.config {
        Some(path) => FileSettingsStore::new(path),
        None => FileSettingsStore::default_location(),
    });

    // 4. Runtime
    let rt = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .context("failed to create tokio runtime")?;

    rt.block_on(run(cli.command, settings))
}

async fn run(command: Command, settings: Arc<dyn SettingsStore>) -> Result<()> {
    match command {
        Command::Page { file } => {
            let html = std::fs::read_to_string(&file)
                .with_context(|| format!("failed to read {}", file.display()))?;
            let document = Document::new(html).with_url(file.display().to_string());
            read(settings, ReadSource::Page(document)).await
        }
        Command::Text { text } => {
            let text = match text {
                Some(text) => text,
                None => {
                    let mut buf = String::new();
                    std::io::stdin()
                        .read_to_string(&mut buf)
                        .context("failed to read stdin")?;
                    buf
                }
            };
            read(settings, ReadSource::Text(text)).await
        }
        Command::Extract { file } => extract(&file),
        Command::Voices => voices(settings.load()?).await,
        Command::Config { action } => configure(settings.as_ref(), action),
    }
}

// ---------------------------------------------------------------------------
// Reading
// ---------------------------------------------------------------------------

async fn read(settings: Arc<dyn SettingsStore>, source: ReadSource) -> Result<()> {
    let config = settings.load()?;

    let output = Arc::new(RodioOutput::new()?);
    let synthesizer = Arc::new(ElevenLabsClient::from_config(&config.synthesis));
    let engine = Arc::new(PlaybackEngine::new(
        synthesizer,
        output,
        config.playback.failure_policy,
    ));

    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let host = Arc::new(LocalContextHost::new(engine, events_tx));
    let coordinator = Coordinator::new(host.clone(), Arc::clone(&settings), config.coordinator);
    coordinator.spawn_event_pump(events_rx);
    let mut updates = coordinator.subscribe();

    // Stdin carries the text itself in `text` mode without an argument.
    let mut control_open = true;
    match source {
        ReadSource::Page(document) => {
            host.open_context(document);
            coordinator.start_by_page().await?;
        }
        ReadSource::Text(text) => {
            host.open_context(Document::default());
            coordinator.start_by_selection(&text).await?;
            control_open = std::io::IsTerminal::is_terminal(&std::io::stdin());
        }
    }

    log::info!("controls: p = pause, r = resume, + / - = speed, s = stop, q = quit");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    let last = loop {
        tokio::select! {
            update = updates.recv() => match update {
                Ok(snapshot) => {
                    log::info!(
                        "status: {} (playing: {}, paused: {})",
                        snapshot.status_label,
                        snapshot.is_playing,
                        snapshot.is_paused
                    );
                    if is_done(&snapshot) {
                        break snapshot;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    log::debug!("status: skipped {n} updates");
                }
                Err(broadcast::error::RecvError::Closed) => break coordinator.get_state(),
            },
            line = lines.next_line(), if control_open => match line {
                Ok(Some(line)) => {
                    if control(&coordinator, settings.as_ref(), line.trim()).await? {
                        break coordinator.get_state();
                    }
                }
                Ok(None) => control_open = false,
                Err(e) => {
                    log::warn!("stdin: {e}");
                    control_open = false;
                }
            },
        }
    };

    coordinator.stop().await;
    if last.status_label.starts_with("Error:") {
        bail!("{}", last.status_label);
    }
    Ok(())
}

/// A snapshot that ends the read: any terminal status, or the idle reset
/// after the owner went away.
fn is_done(snapshot: &StateSnapshot) -> bool {
    if snapshot.is_playing {
        return false;
    }
    snapshot.owner.is_none() || snapshot.status_label != SessionStatus::Idle.label()
}

/// Apply one control line.  Returns `true` when the read should end.
async fn control(
    coordinator: &Coordinator,
    settings: &dyn SettingsStore,
    line: &str,
) -> Result<bool> {
    match line {
        "p" => coordinator.pause(),
        "r" => coordinator.resume(),
        "+" | "-" => {
            let current = settings.load()?.playback.speed;
            let delta = if line == "+" { SPEED_STEP } else { -SPEED_STEP };
            let speed = coordinator.set_speed(current + delta)?;
            log::info!("speed: {speed:.2}x");
        }
        "s" | "q" => return Ok(true),
        "" => {}
        other => log::warn!("unknown control `{other}`"),
    }
    Ok(false)
}

// ---------------------------------------------------------------------------
// Other commands
// ---------------------------------------------------------------------------

fn extract(file: &std::path::Path) -> Result<()> {
    let html = std::fs::read_to_string(file)
        .with_context(|| format!("failed to read {}", file.display()))?;
    let document = Document::new(html).with_url(file.display().to_string());

    match ContentExtractor::new().extract(&document) {
        Extraction::Content(article) => {
            if let Some(title) = article.title {
                println!("# {title}\n");
            }
            println!("{}", article.text);
            Ok(())
        }
        Extraction::Empty => bail!("No content to read"),
    }
}

async fn voices(config: AppConfig) -> Result<()> {
    let Some(key) = config.synthesis.credential() else {
        bail!("No API key configured");
    };
    let client = ElevenLabsClient::from_config(&config.synthesis);
    for voice in client.list_voices(key).await? {
        let marker = if voice.voice_id == config.synthesis.voice_id { "*" } else { " " };
        match voice.category {
            Some(category) => println!("{marker} {}  {} ({category})", voice.voice_id, voice.name),
            None => println!("{marker} {}  {}", voice.voice_id, voice.name),
        }
    }
    Ok(())
}

fn configure(settings: &dyn SettingsStore, action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::SetKey { key } => {
            settings.update(&mut |c| c.synthesis.api_key = Some(key.trim().to_string()))?;
            println!("API key saved");
        }
        ConfigAction::SetVoice { voice_id } => {
            settings.update(&mut |c| c.synthesis.voice_id = voice_id.clone())?;
            println!("voice set to {voice_id}");
        }
        ConfigAction::SetSpeed { speed } => {
            let speed = read_aloud::config::clamp_speed(speed);
            settings.update(&mut |c| c.playback.speed = speed)?;
            println!("speed set to {speed:.2}x");
        }
        ConfigAction::Show => {
            let mut config = settings.load()?;
            if config.synthesis.api_key.is_some() {
                config.synthesis.api_key = Some("********".into());
            }
            print!("{}", toml::to_string_pretty(&config)?);
        }
    }
    Ok(())
}
