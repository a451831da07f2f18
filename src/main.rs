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
use clap::{crate_version, Parser, Subcommand};
use duration_string::DurationString;
use hound::{SampleFormat, WavSpec, WavWriter};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use mtick::audio;
use mtick::config::{Settings, Subdivision, TempoConfig};
use mtick::metronome::Metronome;
use mtick::synth::{self, SoundKind};

#[derive(Parser)]
#[clap(
    author = "Michael Wilson",
    version = crate_version!(),
    about = "A metronome for live practice and performance."
)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Lists the available audio output devices.
    Devices {},
    /// Starts the metronome.
    Start {
        /// The device name to play through.
        device_name: String,
        /// The path to an optional YAML settings file.
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// The tempo in beats per minute.
        #[arg(short, long)]
        bpm: Option<u32>,
        /// The number of beats per bar: 2, 3, 4, or 6.
        #[arg(long)]
        subdivision: Option<u32>,
        /// The click sound: click, beep, or wood.
        #[arg(long)]
        sound: Option<String>,
        /// The playback volume, from 0 to 1.
        #[arg(short, long)]
        volume: Option<f32>,
        /// Disables the downbeat accent.
        #[arg(long)]
        no_accent: bool,
        /// How long to run, e.g. 30s or 5m. Runs until interrupted when
        /// unset.
        #[arg(short, long)]
        duration: Option<String>,
    },
    /// Renders a click sound to a WAV file.
    Render {
        /// The sound to render: click, beep, or wood.
        sound: String,
        /// The path of the WAV file to write.
        output: PathBuf,
        /// The sample rate to render at.
        #[arg(long, default_value_t = 44100)]
        sample_rate: u32,
        /// Seeds the synthesizer randomness for reproducible output.
        #[arg(long)]
        seed: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt::init();

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
        Commands::Start {
            device_name,
            config,
            bpm,
            subdivision,
            sound,
            volume,
            no_accent,
            duration,
        } => {
            let tempo = Arc::new(TempoConfig::new());
            if let Some(path) = config {
                Settings::from_file(&path)?.apply(&tempo);
            }

            // Flags override the settings file.
            if let Some(bpm) = bpm {
                tempo.set_bpm(bpm);
            }
            if let Some(subdivision) = subdivision {
                tempo.set_subdivision(Subdivision::try_from(subdivision)?);
            }
            if let Some(sound) = sound {
                tempo.set_sound(sound.parse()?);
            }
            if let Some(volume) = volume {
                tempo.set_volume(volume);
            }
            if no_accent {
                tempo.set_accent(false);
            }

            let device = audio::get_device(&device_name)?;
            let metronome = Metronome::new(device, Arc::clone(&tempo));
            metronome.start()?;

            match duration {
                Some(duration) => {
                    let duration: Duration = DurationString::from_string(duration)?.into();
                    tokio::time::sleep(duration).await;
                }
                None => {
                    tokio::signal::ctrl_c().await?;
                }
            }

            metronome.stop();
        }
        Commands::Render {
            sound,
            output,
            sample_rate,
            seed,
        } => {
            let kind: SoundKind = sound.parse()?;
            let mut rng = match seed {
                Some(seed) => StdRng::seed_from_u64(seed),
                None => StdRng::from_entropy(),
            };
            let buffer = synth::render(kind, sample_rate, &mut rng);

            let mut writer = WavWriter::create(
                &output,
                WavSpec {
                    channels: 1,
                    sample_rate,
                    bits_per_sample: 32,
                    sample_format: SampleFormat::Float,
                },
            )?;
            for sample in buffer.samples() {
                writer.write_sample(*sample)?;
            }
            writer.finalize()?;

            println!("Wrote {} samples to {}.", buffer.len(), output.display());
        }
    }

    Ok(())
}
