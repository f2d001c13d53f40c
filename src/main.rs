#![deny(clippy::all)]

mod app;
mod capture;
mod notes;
mod permission;
mod preferences;

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use tracing::info;

/// Application configuration
#[derive(serde::Deserialize)]
struct Config {
    capture: CaptureConfig,
}

#[derive(serde::Deserialize)]
struct CaptureConfig {
    locale: String,
}

/// Load configuration from embedded config.toml
fn load_config() -> Result<Config, toml::de::Error> {
    const CONFIG_TOML: &str = include_str!("../config.toml");
    toml::from_str(CONFIG_TOML)
}

/// Terminal voice note-taking app
#[derive(Parser)]
#[command(name = "voicenote", version, about)]
struct Cli {
    /// Recognition locale override (e.g. "en-US")
    #[arg(long)]
    locale: Option<String>,

    /// Replay a transcript file through the capture pipeline instead of a
    /// live recognizer (one utterance per line)
    #[arg(long, value_name = "FILE")]
    replay: Option<PathBuf>,

    /// Store notes at this path instead of the platform data directory
    #[arg(long, value_name = "FILE")]
    notes_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing for structured logging
    tracing_subscriber::fmt::init();

    let config = load_config().context("invalid embedded configuration")?;
    let cli = Cli::parse();

    let locale = cli
        .locale
        .or_else(preferences::get_language_code)
        .unwrap_or(config.capture.locale);
    info!("Recognition locale: {}", locale);

    let store = match cli.notes_file {
        Some(path) => notes::NoteStore::with_path(path),
        None => notes::NoteStore::open_default().context("could not resolve a notes location")?,
    };

    // no recognizer ships with the app; without a replay script the capture
    // session reports UnsupportedCapability and note entry falls back to
    // typing
    let (capability, gate): (
        Option<Box<dyn capture::SpeechCapability>>,
        permission::PermissionGate,
    ) = match &cli.replay {
        Some(path) => {
            let capability = capture::ReplayCapability::load(path)
                .with_context(|| format!("could not read replay script {}", path.display()))?;
            (
                Some(Box::new(capability)),
                permission::PermissionGate::new(Box::new(permission::TrustedProbe)),
            )
        }
        None => (None, permission::PermissionGate::with_default_probe()),
    };

    app::App::new(store, capability, gate, locale).run().await
}
