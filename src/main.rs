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
mod audio;
mod config;
mod playsync;
mod score;
mod sequencer;
#[cfg(test)]
mod testutil;
mod voice;
mod waveform;

use std::error::Error;
use std::path::Path;
use std::sync::Arc;

use clap::{crate_version, Parser, Subcommand};

use score::{Pitch, Score};
use sequencer::{Options, Sequencer};
use waveform::Catalog;

#[derive(Parser)]
#[clap(
    author = "Michael Wilson",
    version = crate_version!(),
    about = "A concurrent bell-choir player."
)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Plays a score through the audio interface.
    Play {
        /// The path to the score file. Missing paths are retried under
        /// songs/ and with a .txt extension.
        score_path: String,
        /// The audio device to play through.
        #[arg(short, long, default_value = "default")]
        device: String,
    },
    /// Parses and summarizes a score without playing it.
    Verify {
        /// The path to the score file.
        score_path: String,
    },
    /// Lists the pitches the choir can play.
    Pitches {},
    /// Lists the available audio output devices.
    Devices {},
    /// Start will play a score using a player configuration file.
    Start {
        /// The path to the player config.
        config_path: String,
        /// The path to the score file.
        score_path: String,
    },
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Play { score_path, device } => {
            let score = Score::from_file(Path::new(&score_path))?;
            play(score, &device, Options::default())?;
        }
        Commands::Verify { score_path } => {
            let score = Score::from_file(Path::new(&score_path))?;
            println!("Score {} is valid:", score_path);
            println!("- Notes: {}", score.len());
            println!("- Voices: {}", score.distinct_pitches());
            println!("- Duration: {:.1}s", score.duration().as_secs_f64());
        }
        Commands::Pitches {} => {
            println!("Pitches:");
            for pitch in Pitch::ALL {
                match pitch.frequency() {
                    Some(frequency) => println!("- {} ({:.2}Hz)", pitch, frequency),
                    None => println!("- {} (silence)", pitch),
                }
            }
        }
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
            config_path,
            score_path,
        } => {
            let player = config::Player::load(Path::new(&config_path))?;
            let score = Score::from_file(Path::new(&score_path))?;
            play(score, player.device(), player.options())?;
        }
    }

    Ok(())
}

/// Plays the score through the named device and waits for it to finish.
fn play(score: Score, device: &str, options: Options) -> Result<(), Box<dyn Error>> {
    let sink = audio::get_sink(device)?;
    let catalog = Arc::new(Catalog::new());

    let sequencer = Sequencer::new(score, sink, catalog, options);
    sequencer.play();
    sequencer.wait();
    sequencer.stop();

    Ok(())
}
