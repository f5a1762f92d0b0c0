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
use std::{
    fmt,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    thread,
    time::Duration,
};

use parking_lot::Mutex;
use tracing::debug;

use crate::audio::SinkError;

/// A mock sink. Doesn't actually emit any sound; records every write so tests
/// can verify exactly what was played and that writes never overlapped.
#[derive(Clone)]
pub struct Sink {
    name: String,
    /// Every write, in the order it arrived.
    writes: Arc<Mutex<Vec<Vec<i8>>>>,
    /// How many writers are inside write() right now.
    writers: Arc<AtomicUsize>,
    /// The highest concurrent writer count ever observed.
    max_writers: Arc<AtomicUsize>,
    /// How many times drain() has been called.
    drains: Arc<AtomicUsize>,
}

impl Sink {
    /// Gets the given mock sink.
    pub fn get(name: &str) -> Sink {
        Sink {
            name: name.to_string(),
            writes: Arc::new(Mutex::new(Vec::new())),
            writers: Arc::new(AtomicUsize::new(0)),
            max_writers: Arc::new(AtomicUsize::new(0)),
            drains: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Returns a copy of everything written so far, in order.
    pub fn writes(&self) -> Vec<Vec<i8>> {
        self.writes.lock().clone()
    }

    /// Returns the number of writes so far.
    pub fn write_count(&self) -> usize {
        self.writes.lock().len()
    }

    /// The highest number of simultaneous writers ever observed. The
    /// rendezvous protocol guarantees this never exceeds one.
    pub fn max_concurrent_writers(&self) -> usize {
        self.max_writers.load(Ordering::Relaxed)
    }

    /// How many times the sink has been drained.
    pub fn drain_count(&self) -> usize {
        self.drains.load(Ordering::Relaxed)
    }
}

impl crate::audio::Sink for Sink {
    fn write(&self, samples: &[i8]) -> Result<(), SinkError> {
        let writers = self.writers.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_writers.fetch_max(writers, Ordering::SeqCst);

        // Hold the "device" briefly so overlapping writers would actually be
        // observed as concurrent rather than racing past each other.
        thread::sleep(Duration::from_micros(200));
        self.writes.lock().push(samples.to_vec());

        self.writers.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }

    fn drain(&self) -> Result<(), SinkError> {
        debug!(sink = self.name, "Draining mock sink.");
        self.drains.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    #[cfg(test)]
    fn to_mock(&self) -> Result<Arc<Sink>, SinkError> {
        Ok(Arc::new(self.clone()))
    }
}

impl fmt::Display for Sink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (Mock)", self.name)
    }
}
