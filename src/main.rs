// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::error::Error;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{crate_version, Parser, Subcommand};
use crossterm::event::{
    DisableFocusChange, EnableFocusChange, KeyboardEnhancementFlags,
    PopKeyboardEnhancementFlags, PushKeyboardEnhancementFlags,
};
use crossterm::{execute, terminal};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use slicepad::audio::{self, AssetLoader};
use slicepad::config::SamplerConfig;
use slicepad::controller::{keyboard, Controller};
use slicepad::engine::{EngineOptions, PerformanceEngine};
use slicepad::scheduler::SystemClock;
use slicepad::slices::{SliceRegion, MAX_SLICES};

const KEY_HELP: &str = "\
Keys: 1-9 slices | D F G drums | H J K mapped sequences (Shift to map) | L loop
      Space stop all | Enter sequencer | Up/Down tempo | P replay | Backspace clear pattern
      R record | E export take | S save pattern | Esc quit";

#[derive(Parser)]
#[clap(
    author = "Michael Wilson",
    version = crate_version!(),
    about = "A slice sampler, drum sequencer and looper."
)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Lists the available audio output devices.
    Devices {},
    /// Loads an audio file and plays it from the keyboard.
    Play {
        /// The audio file to slice.
        file: PathBuf,
        /// The path to the sampler config.
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// The device name to play through. Overrides the config.
        #[arg(short, long)]
        device: Option<String>,
        /// Splits the file into this many equal slices.
        #[arg(short, long, default_value_t = 4)]
        slices: u8,
    },
}

/// Restores the terminal when the session ends.
struct RawModeGuard {
    enhanced: bool,
}

impl RawModeGuard {
    fn enter() -> io::Result<RawModeGuard> {
        terminal::enable_raw_mode()?;
        let enhanced = terminal::supports_keyboard_enhancement().unwrap_or(false);
        if enhanced {
            execute!(
                io::stdout(),
                PushKeyboardEnhancementFlags(KeyboardEnhancementFlags::REPORT_EVENT_TYPES)
            )?;
        }
        execute!(io::stdout(), EnableFocusChange)?;
        Ok(RawModeGuard { enhanced })
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        if self.enhanced {
            let _ = execute!(io::stdout(), PopKeyboardEnhancementFlags);
        }
        let _ = execute!(io::stdout(), DisableFocusChange);
        let _ = terminal::disable_raw_mode();
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Devices {} => {
            let devices = audio::list_devices()?;

            if devices.is_empty() {
                println!("No devices found.");
                return Ok(());
            }

            println!("Devices:");
            for device in devices {
                println!("- {}", device);
            }
        }
        Commands::Play {
            file,
            config,
            device,
            slices,
        } => {
            let mut config = match config {
                Some(path) => SamplerConfig::deserialize(&path)?,
                None => SamplerConfig::default(),
            };
            if let Some(device) = device {
                config.audio_mut().set_device(&device);
            }
            play(&file, &config, slices).await?;
        }
    }

    Ok(())
}

async fn play(file: &Path, config: &SamplerConfig, slices: u8) -> Result<(), Box<dyn Error>> {
    let device = audio::get_device(config.audio())?;
    let mixer = audio::AudioMixer::new(device.channels(), device.sample_rate());
    let _stream = device.open(mixer.clone())?;

    let clock = Arc::new(SystemClock::new());
    let mut engine = PerformanceEngine::new(
        mixer,
        clock.clone(),
        EngineOptions {
            max_voices: config.audio().max_voices(),
            drum_tracks: config.sequencer().tracks(),
            drum_gain_db: config.drums().gain_db(),
            bpm: config.sequencer().bpm(),
            capture_supported: config.audio().capture() && device.supports_capture(),
            export_gate: Box::new(config.export().gate()),
        },
    );

    let loader = AssetLoader::new();
    let asset = loader
        .load(tokio::fs::read(file).await?, extension(file))
        .await?;
    let seconds = asset.duration().as_secs_f64();
    engine.load_asset(asset);

    let count = slices.clamp(1, MAX_SLICES);
    let length = seconds / count as f64;
    for index in 0..count {
        let start = index as f64 * length;
        engine.create_slice(SliceRegion::new(start, start + length)?)?;
    }

    for (track, drum) in config.drums().tracks().iter().enumerate() {
        if let Some(name) = drum.name() {
            engine.set_drum_name(track, name)?;
        }
        engine.set_drum_eq(track, drum.eq())?;
        let Some(path) = drum.file(config.base_dir()) else {
            continue;
        };
        match loader
            .load(tokio::fs::read(&path).await?, extension(&path))
            .await
        {
            Ok(sample) => engine.set_drum_sample(track, sample)?,
            Err(e) => warn!(path = %path.display(), err = %e, "Failed to load drum sample"),
        }
    }

    info!(
        file = %file.display(),
        device = %device,
        slices = engine.slices().len(),
        "Ready"
    );
    eprintln!("{}\r", KEY_HELP.replace('\n', "\r\n"));

    let guard = RawModeGuard::enter()?;
    let driver = Arc::new(keyboard::Driver::new(guard.enhanced));
    let controller = Controller::new(engine, clock, driver, config.export().directory());
    controller.join().await?;
    drop(guard);
    Ok(())
}

fn extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|extension| extension.to_str())
        .map(str::to_string)
}
