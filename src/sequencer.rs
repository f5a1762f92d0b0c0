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
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
    time::Duration,
};

use parking_lot::Mutex;
use tracing::{error, info, span, warn, Level};

use crate::{
    audio::{Sink, SinkError},
    playsync::{Baton, WaitOutcome},
    score::{Pitch, Score},
    voice::Voice,
    waveform::Catalog,
};

/// How long to pause between notes, adding a staccato effect.
pub const DEFAULT_STACCATO_PAUSE: Duration = Duration::from_millis(80);

/// How long to wait for a voice's acknowledgement before re-checking that it
/// is still alive. A safety net against a dead voice, not playback timing.
const ACK_TIMEOUT: Duration = Duration::from_secs(1);

/// Playback options for the sequencer.
#[derive(Clone, Copy, Debug)]
pub struct Options {
    /// The pause between consecutive notes.
    pub staccato_pause: Duration,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            staccato_pause: DEFAULT_STACCATO_PAUSE,
        }
    }
}

/// Drives a score through a choir of per-pitch voices. The sequencer walks
/// the score in order and rendezvouses with the owning voice at each step, so
/// notes play in exactly score order and at most one voice writes to the
/// shared sink at any instant.
pub struct Sequencer {
    inner: Arc<Inner>,
    /// The sequencer's own thread when started via play().
    thread: Mutex<Option<thread::JoinHandle<()>>>,
}

struct Inner {
    score: Score,
    sink: Arc<dyn Sink>,
    catalog: Arc<Catalog>,
    staccato_pause: Duration,
    /// The voice registry, keyed by pitch. Populated by assign_parts before
    /// any voice starts; never mutated concurrently with run.
    choir: Mutex<HashMap<Pitch, Voice>>,
    /// Set once playback has been kicked off; a score plays at most once.
    played: AtomicBool,
    /// Set by stop(). Playback never begins, and never advances to another
    /// note, once this is set.
    stopped: AtomicBool,
}

impl Sequencer {
    /// Creates a new sequencer for the given score and sink.
    pub fn new(
        score: Score,
        sink: Arc<dyn Sink>,
        catalog: Arc<Catalog>,
        options: Options,
    ) -> Sequencer {
        Sequencer {
            inner: Arc::new(Inner {
                score,
                sink,
                catalog,
                staccato_pause: options.staccato_pause,
                choir: Mutex::new(HashMap::new()),
                played: AtomicBool::new(false),
                stopped: AtomicBool::new(false),
            }),
            thread: Mutex::new(None),
        }
    }

    /// Walks the score in order and assigns each note's length to the voice
    /// for its pitch, creating voices lazily the first time a pitch is seen.
    pub fn assign_parts(&self) {
        self.inner.assign_parts();
    }

    /// Starts every voice in the choir.
    pub fn start(&self) {
        self.inner.start();
    }

    /// Plays the score to completion, blocking the calling thread. Use
    /// play() to run the sequencer on its own thread instead.
    pub fn run(&self) -> Result<(), SinkError> {
        self.inner.run()
    }

    /// Starts playing the score on the sequencer's own thread. Callers wait
    /// for completion with wait() and clean up with stop().
    pub fn play(&self) {
        if self.inner.played.swap(true, Ordering::SeqCst) {
            info!("Score has already been played.");
            return;
        }

        let mut thread = self.thread.lock();
        let inner = self.inner.clone();
        *thread = Some(thread::spawn(move || {
            // stop() may have won the race before the choir existed; in that
            // case there is nothing to deactivate, so playback must not begin.
            if inner.stopped.load(Ordering::SeqCst) {
                info!("Sequencer was stopped before playback began.");
                return;
            }

            inner.assign_parts();
            inner.start();
            if let Err(e) = inner.run() {
                error!(err = e.to_string(), "Error while playing score.");
            }
        }));
    }

    /// Waits for the score to finish playing naturally. Voices stay parked
    /// until stop() is called.
    pub fn wait(&self) {
        if let Some(thread) = self.thread.lock().take() {
            if thread.join().is_err() {
                error!("Error joining sequencer thread.");
            }
        }
    }

    /// Stops playback: marks every voice inactive, wakes them all, then joins
    /// every voice thread and the sequencer thread. Idempotent and safe to
    /// call whether or not run() has completed.
    pub fn stop(&self) {
        // Raise the flag before touching the choir so a play thread that has
        // not yet built its voices still observes the stop.
        self.inner.stopped.store(true, Ordering::SeqCst);

        {
            let mut choir = self.inner.choir.lock();

            // Deactivate everything first so all voices wind down in
            // parallel, then join them.
            for voice in choir.values() {
                voice.deactivate();
            }
            for voice in choir.values_mut() {
                voice.join();
            }
        }

        self.wait();
    }
}

impl Drop for Sequencer {
    fn drop(&mut self) {
        self.stop();
    }
}

impl Inner {
    fn assign_parts(&self) {
        let mut choir = self.choir.lock();
        for note in self.score.notes() {
            choir
                .entry(note.pitch)
                .or_insert_with(|| Voice::new(note.pitch))
                .assign_part(note.length);
        }
    }

    fn start(&self) {
        let mut choir = self.choir.lock();
        for voice in choir.values_mut() {
            voice.start(self.sink.clone(), self.catalog.clone());
        }
    }

    fn run(&self) -> Result<(), SinkError> {
        let span = span!(Level::INFO, "play score");
        let _enter = span.enter();

        info!(
            sink = self.sink.to_string(),
            notes = self.score.len(),
            voices = self.score.distinct_pitches(),
            duration = format!("{:?}", self.score.duration()),
            "Playing score."
        );

        // Clone the batons out so the registry lock isn't held while
        // playing; stop() needs it to wind the choir down.
        let batons: HashMap<Pitch, Baton> = {
            let choir = self.choir.lock();
            choir
                .iter()
                .map(|(pitch, voice)| (*pitch, voice.baton().clone()))
                .collect()
        };

        let total = self.score.len();
        'score: for (i, note) in self.score.notes().iter().enumerate() {
            if self.stopped.load(Ordering::SeqCst) {
                info!(step = i, "Stop requested, ending playback.");
                break;
            }

            let Some(baton) = batons.get(&note.pitch) else {
                error!(
                    pitch = note.pitch.name(),
                    "No voice for pitch; were parts assigned?"
                );
                break;
            };

            // A stopped voice means playback as a whole is winding down.
            if !baton.is_active() {
                info!(
                    pitch = note.pitch.name(),
                    step = i,
                    "Voice is inactive, stopping playback early."
                );
                break;
            }

            if baton.cue().is_err() {
                warn!(
                    pitch = note.pitch.name(),
                    step = i,
                    "Voice is gone, stopping playback early."
                );
                break;
            }

            // Wait until the voice acknowledges the note. The timeout only
            // guards against a voice dying mid-note; on expiry we re-check
            // and keep waiting.
            loop {
                match baton.wait_done(ACK_TIMEOUT) {
                    WaitOutcome::Done => break,
                    WaitOutcome::TimedOut => {
                        if !baton.is_active() {
                            // Stopped mid-wait: the pending note is
                            // abandoned, not flushed.
                            info!(
                                pitch = note.pitch.name(),
                                step = i,
                                "Stop observed mid-wait, abandoning pending note."
                            );
                            break 'score;
                        }
                    }
                    WaitOutcome::Disconnected => {
                        warn!(
                            pitch = note.pitch.name(),
                            step = i,
                            "Voice exited with a note pending, skipping."
                        );
                        break;
                    }
                }
            }

            // The staccato pause separates consecutive notes; there is
            // nothing to separate after the final one.
            if i + 1 < total {
                thread::sleep(self.staccato_pause);
            }
        }

        // Make sure all written samples are physically emitted.
        self.sink.drain()?;

        info!("Finished playing score.");
        Ok(())
    }
}
