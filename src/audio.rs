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
use std::{fmt, sync::Arc};

pub mod cpal;
pub mod mock;

/// Typed error for sink operations. Sink failures are fatal to a playback
/// attempt; there are no retries.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("audio sink unavailable: {0}")]
    Unavailable(String),

    #[error("audio sink is closed")]
    Closed,
}

/// The shared audio output. All voices write to one sink; access is
/// serialized by the sequencer's rendezvous protocol, not by a sink-level
/// lock, so implementations may assume at most one writer at a time.
pub trait Sink: fmt::Display + Send + Sync {
    /// Writes signed 8-bit mono PCM samples, blocking until the sink has
    /// played them down to a small lookahead.
    fn write(&self, samples: &[i8]) -> Result<(), SinkError>;

    /// Blocks until every written sample has been physically emitted.
    fn drain(&self) -> Result<(), SinkError>;

    #[cfg(test)]
    fn to_mock(&self) -> Result<Arc<mock::Sink>, SinkError>;
}

/// Lists the audio output devices known to cpal.
pub fn list_devices() -> Result<Vec<String>, SinkError> {
    cpal::list_devices()
}

/// Gets the sink with the given device name. Names starting with "mock"
/// produce a recording sink that emits no sound.
pub fn get_sink(device: &str) -> Result<Arc<dyn Sink>, SinkError> {
    if device.starts_with("mock") {
        return Ok(Arc::new(mock::Sink::get(device)));
    }

    Ok(Arc::new(cpal::Sink::open(device)?))
}
