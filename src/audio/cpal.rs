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
    collections::VecDeque,
    fmt,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
    thread,
    time::{Duration, Instant},
};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use tracing::{error, info};

use crate::audio::SinkError;
use crate::waveform::SAMPLE_RATE;

/// How much queued audio write() leaves in flight before returning, so the
/// caller paces itself against real playback the way a hardware line would.
const LOOKAHEAD: Duration = Duration::from_millis(100);

/// Grace period after the queue empties for the device's own buffer to play
/// out during drain().
const DRAIN_GRACE: Duration = Duration::from_millis(150);

/// A sink backed by a cpal output device. cpal streams aren't Send, so a
/// dedicated output thread owns the stream and consumes sample chunks from a
/// channel; this handle is freely shareable across voice threads.
pub struct Sink {
    name: String,
    /// Chunks of mono samples at the device rate, headed for the callback.
    chunk_tx: crossbeam_channel::Sender<Vec<f32>>,
    /// Device-rate samples queued but not yet consumed by the callback.
    queued: Arc<AtomicUsize>,
    /// Cleared when the sink is dropped or the output thread dies.
    alive: Arc<AtomicBool>,
    /// The sample rate the device is actually running at.
    device_rate: u32,
    /// Handle to the output thread (keeps the stream alive).
    output_thread: Option<thread::JoinHandle<()>>,
}

impl Sink {
    /// Opens the named output device, or the system default for "default".
    pub fn open(device_name: &str) -> Result<Sink, SinkError> {
        let host = cpal::default_host();
        let device = if device_name == "default" {
            host.default_output_device()
                .ok_or_else(|| SinkError::Unavailable("no default output device".to_string()))?
        } else {
            host.output_devices()
                .map_err(|e| SinkError::Unavailable(e.to_string()))?
                .find(|device| {
                    device
                        .name()
                        .map(|name| name == device_name)
                        .unwrap_or(false)
                })
                .ok_or_else(|| {
                    SinkError::Unavailable(format!("no output device named {device_name}"))
                })?
        };

        let supported = device
            .default_output_config()
            .map_err(|e| SinkError::Unavailable(e.to_string()))?;
        let device_rate = supported.sample_rate();
        let channels = supported.channels();

        let (chunk_tx, chunk_rx) = crossbeam_channel::unbounded::<Vec<f32>>();
        let queued = Arc::new(AtomicUsize::new(0));
        let alive = Arc::new(AtomicBool::new(true));

        // The output thread reports whether stream creation succeeded so
        // open() can fail synchronously.
        let (ready_tx, ready_rx) = crossbeam_channel::bounded::<Result<(), SinkError>>(1);

        let output_thread = {
            let queued = queued.clone();
            let alive = alive.clone();
            thread::spawn(move || {
                let config = cpal::StreamConfig {
                    channels,
                    sample_rate: device_rate,
                    buffer_size: cpal::BufferSize::Default,
                };

                let mut pending: VecDeque<f32> = VecDeque::new();
                let callback_queued = queued.clone();
                let stream = device.build_output_stream(
                    &config,
                    move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                        for frame in data.chunks_mut(channels as usize) {
                            if pending.is_empty() {
                                while let Ok(chunk) = chunk_rx.try_recv() {
                                    pending.extend(chunk);
                                }
                            }
                            let sample = match pending.pop_front() {
                                Some(sample) => {
                                    callback_queued.fetch_sub(1, Ordering::Release);
                                    sample
                                }
                                None => 0.0,
                            };
                            frame.fill(sample);
                        }
                    },
                    |e| error!(err = e.to_string(), "cpal output stream error"),
                    None,
                );

                let stream = match stream {
                    Ok(stream) => stream,
                    Err(e) => {
                        let _ = ready_tx.send(Err(SinkError::Unavailable(e.to_string())));
                        alive.store(false, Ordering::Release);
                        return;
                    }
                };
                if let Err(e) = stream.play() {
                    let _ = ready_tx.send(Err(SinkError::Unavailable(e.to_string())));
                    alive.store(false, Ordering::Release);
                    return;
                }
                let _ = ready_tx.send(Ok(()));

                // Keep the stream alive until the sink goes away.
                while alive.load(Ordering::Acquire) {
                    thread::sleep(Duration::from_millis(50));
                }
            })
        };

        match ready_rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(e),
            Err(_) => return Err(SinkError::Unavailable("output thread died".to_string())),
        }

        info!(
            device = device_name,
            device_rate, channels, "Opened cpal output stream."
        );

        Ok(Sink {
            name: device_name.to_string(),
            chunk_tx,
            queued,
            alive,
            device_rate,
            output_thread: Some(output_thread),
        })
    }

    /// Converts signed 8-bit samples at the synthesis rate to f32 samples at
    /// the device rate by nearest-sample selection.
    fn convert(&self, samples: &[i8]) -> Vec<f32> {
        let ratio = f64::from(self.device_rate) / f64::from(SAMPLE_RATE);
        let out_len = (samples.len() as f64 * ratio) as usize;

        let mut out = Vec::with_capacity(out_len);
        for i in 0..out_len {
            let src = ((i as f64 / ratio) as usize).min(samples.len() - 1);
            out.push(f32::from(samples[src]) / 128.0);
        }
        out
    }

    fn queued_duration(&self) -> Duration {
        let queued = self.queued.load(Ordering::Acquire) as u64;
        Duration::from_millis(queued * 1000 / u64::from(self.device_rate))
    }
}

/// Lists the names of the available cpal output devices.
pub fn list_devices() -> Result<Vec<String>, SinkError> {
    let host = cpal::default_host();
    let devices = host
        .output_devices()
        .map_err(|e| SinkError::Unavailable(e.to_string()))?;

    Ok(devices
        .map(|device| {
            device
                .name()
                .unwrap_or_else(|_| "unreadable device name".to_string())
        })
        .collect())
}

impl crate::audio::Sink for Sink {
    fn write(&self, samples: &[i8]) -> Result<(), SinkError> {
        if samples.is_empty() {
            return Ok(());
        }

        let converted = self.convert(samples);
        self.queued.fetch_add(converted.len(), Ordering::Release);
        self.chunk_tx.send(converted).map_err(|_| SinkError::Closed)?;

        // Block like a hardware line: return once the queue has played down
        // to the lookahead, so callers experience real note durations.
        loop {
            if !self.alive.load(Ordering::Acquire) {
                return Err(SinkError::Closed);
            }
            if self.queued_duration() <= LOOKAHEAD {
                return Ok(());
            }
            thread::sleep(Duration::from_millis(2));
        }
    }

    fn drain(&self) -> Result<(), SinkError> {
        let deadline = Instant::now() + self.queued_duration() + Duration::from_secs(1);
        while self.queued.load(Ordering::Acquire) > 0 {
            if !self.alive.load(Ordering::Acquire) {
                return Err(SinkError::Closed);
            }
            if Instant::now() > deadline {
                return Err(SinkError::Unavailable("drain timed out".to_string()));
            }
            thread::sleep(Duration::from_millis(10));
        }

        // The callback has consumed everything; let the device buffer empty.
        thread::sleep(DRAIN_GRACE);
        Ok(())
    }

    #[cfg(test)]
    fn to_mock(&self) -> Result<Arc<crate::audio::mock::Sink>, SinkError> {
        Err(SinkError::Unavailable(
            "cpal sinks cannot be mocked".to_string(),
        ))
    }
}

impl Drop for Sink {
    fn drop(&mut self) {
        self.alive.store(false, Ordering::Release);
        if let Some(thread) = self.output_thread.take() {
            if thread.join().is_err() {
                error!(sink = self.name, "Error joining cpal output thread.");
            }
        }
    }
}

impl fmt::Display for Sink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}Hz)", self.name, self.device_rate)
    }
}
