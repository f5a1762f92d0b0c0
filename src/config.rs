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
use std::{fs, path::Path, time::Duration};

use serde::Deserialize;

use crate::sequencer::{self, Options};

/// Typed error for config load/parse failures so callers can distinguish
/// file-not-found from parse errors without string matching.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Config read error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config parse error: {0}")]
    Parse(#[from] serde_yml::Error),
}

/// A YAML representation of the player configuration.
#[derive(Deserialize, Clone)]
pub struct Player {
    /// The audio device to play through.
    device: String,

    /// The pause between consecutive notes, in milliseconds.
    staccato_pause_ms: Option<u64>,
}

impl Player {
    /// Loads the player configuration from a YAML file.
    pub fn load(path: &Path) -> Result<Player, ConfigError> {
        Ok(serde_yml::from_str(&fs::read_to_string(path)?)?)
    }

    /// Returns the device from the configuration.
    pub fn device(&self) -> &str {
        &self.device
    }

    /// Returns the pause applied between notes.
    pub fn staccato_pause(&self) -> Duration {
        self.staccato_pause_ms
            .map(Duration::from_millis)
            .unwrap_or(sequencer::DEFAULT_STACCATO_PAUSE)
    }

    /// Converts this configuration into sequencer options.
    pub fn options(&self) -> Options {
        Options {
            staccato_pause: self.staccato_pause(),
        }
    }
}

#[cfg(test)]
mod test {
    use std::{fs, time::Duration};

    use super::{ConfigError, Player};

    #[test]
    fn test_parse_full_config() {
        let config: Player = serde_yml::from_str("device: pipewire\nstaccato_pause_ms: 120\n")
            .expect("valid config");

        assert_eq!("pipewire", config.device());
        assert_eq!(Duration::from_millis(120), config.staccato_pause());
        assert_eq!(Duration::from_millis(120), config.options().staccato_pause);
    }

    #[test]
    fn test_staccato_pause_defaults() {
        let config: Player = serde_yml::from_str("device: default\n").expect("valid config");

        assert_eq!("default", config.device());
        assert_eq!(Duration::from_millis(80), config.staccato_pause());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("player.yaml");
        fs::write(&path, "device: mock-config\n").expect("write config");

        let config = Player::load(&path).expect("config loads");
        assert_eq!("mock-config", config.device());

        assert!(matches!(
            Player::load(&dir.path().join("missing.yaml")),
            Err(ConfigError::Io(_))
        ));
        fs::write(&path, "device: [not, a, string\n").expect("write config");
        assert!(matches!(Player::load(&path), Err(ConfigError::Parse(_))));
    }
}
