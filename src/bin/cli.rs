use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use radiofx::audio::render::{Renderer, render_file};
use radiofx::audio::wav::{timestamped_path, write_wav};
use radiofx::settings::RadioSettings;
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(name = "radiofx")]
#[command(version)]
#[command(about = "Turn a voice clip into a dispatch radio transmission.")]
struct Args {
    #[arg(help = "Voice WAV file to process")]
    input: Option<PathBuf>,
    #[arg(short, long, help = "Output WAV path (defaults to a timestamped file)")]
    output: Option<PathBuf>,
    #[arg(long, help = "Play the priority tone with this transmission")]
    priority: bool,
    #[arg(long, env = "RADIOFX_SETTINGS", help = "Settings file to use")]
    settings: Option<PathBuf>,
    #[arg(long, help = "Override the static bed WAV")]
    static_bed: Option<PathBuf>,
    #[arg(long, help = "Override the priority tone WAV")]
    tone: Option<PathBuf>,
    #[arg(long, help = "Write the default settings file and exit")]
    write_default_settings: bool,
}

fn load_settings(path: Option<&Path>) -> Result<RadioSettings> {
    match path {
        Some(path) => RadioSettings::load_from(path),
        None => RadioSettings::load(),
    }
}

fn main() -> Result<()> {
    dotenv::dotenv().ok();
    env_logger::init();

    let args = Args::parse();
    info!("radiofx v{}", env!("CARGO_PKG_VERSION"));
    info!("Args: {args:?}");

    if args.write_default_settings {
        let path = args
            .settings
            .clone()
            .unwrap_or_else(RadioSettings::settings_path);
        RadioSettings::default().save_to(&path)?;
        info!("Default settings written to {}", path.display());
        return Ok(());
    }

    let input = args
        .input
        .as_deref()
        .context("an INPUT voice file is required")?;

    let mut settings = load_settings(args.settings.as_deref())?;
    if let Some(path) = args.static_bed {
        settings.beds.static_bed = Some(path);
    }
    if let Some(path) = args.tone {
        settings.beds.priority_tone = Some(path);
    }
    info!("Settings:\n{settings}");

    let output = args
        .output
        .unwrap_or_else(|| timestamped_path(&settings.output_dir));
    let sample_rate = settings.working_sample_rate;

    let renderer = Renderer::new(settings);
    let samples = render_file(&renderer, input, args.priority)
        .with_context(|| format!("failed to render '{}'", input.display()))?;
    write_wav(&output, &samples, sample_rate)
        .with_context(|| format!("failed to write '{}'", output.display()))?;

    Ok(())
}
