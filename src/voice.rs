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
use std::{collections::VecDeque, sync::Arc, thread, time::Duration};

use tracing::{debug, error, warn};

use crate::{
    audio::Sink,
    playsync::{self, Baton, CueOutcome, VoicePort},
    score::{NoteLength, Pitch, MEASURE_LENGTH_MS},
    waveform::{Catalog, SAMPLE_RATE, TONE_SEPARATOR_SAMPLES},
};

/// How often an idle voice re-checks its active flag while waiting for a cue,
/// so a stop issued with no note pending is still observed promptly.
const LIVENESS_TIMEOUT: Duration = Duration::from_millis(500);

/// One voice of the choir: the worker responsible for every occurrence of a
/// single pitch in the score. Idle until started, then alternates between
/// waiting for a cue and rendering one note, until stopped.
pub struct Voice {
    /// The pitch this voice plays.
    pitch: Pitch,
    /// The note lengths assigned to this voice, in score-relative order.
    /// Drained into the worker thread when the voice starts.
    parts: Vec<NoteLength>,
    /// The sequencer's side of the rendezvous.
    baton: Baton,
    /// The voice's side of the rendezvous. Taken by start().
    port: Option<VoicePort>,
    /// The worker thread once running.
    thread: Option<thread::JoinHandle<()>>,
}

impl Voice {
    /// Creates a new idle voice for the given pitch.
    pub fn new(pitch: Pitch) -> Voice {
        let (baton, port) = playsync::pair();
        Voice {
            pitch,
            parts: Vec::new(),
            baton,
            port: Some(port),
            thread: None,
        }
    }

    /// The pitch this voice plays.
    pub fn pitch(&self) -> Pitch {
        self.pitch
    }

    /// Queues a note length for this voice to play when cued.
    pub fn assign_part(&mut self, length: NoteLength) {
        self.parts.push(length);
    }

    /// The number of parts assigned but not yet handed to the worker.
    pub fn parts_remaining(&self) -> usize {
        self.parts.len()
    }

    /// The sequencer's rendezvous handle for this voice.
    pub fn baton(&self) -> &Baton {
        &self.baton
    }

    /// Returns true if this voice has not been stopped.
    pub fn is_active(&self) -> bool {
        self.baton.is_active()
    }

    /// Starts the worker thread. Does nothing if the voice already started.
    pub fn start(&mut self, sink: Arc<dyn Sink>, catalog: Arc<Catalog>) {
        let Some(port) = self.port.take() else {
            warn!(pitch = self.pitch.name(), "Voice has already been started.");
            return;
        };

        let pitch = self.pitch;
        let parts: VecDeque<NoteLength> = self.parts.drain(..).collect();
        self.thread = Some(thread::spawn(move || {
            Voice::run(pitch, parts, port, sink, catalog)
        }));
    }

    /// The worker loop: wait for a cue, render one note, acknowledge, repeat.
    fn run(
        pitch: Pitch,
        mut parts: VecDeque<NoteLength>,
        port: VoicePort,
        sink: Arc<dyn Sink>,
        catalog: Arc<Catalog>,
    ) {
        let waveform = catalog.waveform(pitch).clone();
        let separator = catalog.silence().clone();

        loop {
            match port.wait_for_cue(LIVENESS_TIMEOUT) {
                CueOutcome::Play => {
                    let Some(length) = parts.pop_front() else {
                        // Internal defect: the sequencer only cues a voice at
                        // steps it assigned a part for. Fatal to this voice,
                        // not to the rest of the choir.
                        error!(
                            pitch = pitch.name(),
                            "Voice was cued to play with no parts left."
                        );
                        break;
                    };

                    Voice::play_note(pitch, length, &waveform, &separator, sink.as_ref());

                    if !port.done() {
                        debug!(pitch = pitch.name(), "Sequencer went away, stopping.");
                        break;
                    }
                }
                CueOutcome::Stop => break,
                CueOutcome::TimedOut => continue,
            }
        }

        port.deactivate();
        debug!(pitch = pitch.name(), "Voice stopped.");
    }

    /// Renders a single note: a slice of the precomputed waveform sized to
    /// the note length, followed by a short silent separator. A sink failure
    /// skips the note; the voice carries on.
    fn play_note(
        pitch: Pitch,
        length: NoteLength,
        waveform: &[i8],
        separator: &[i8],
        sink: &dyn Sink,
    ) {
        let ms = length.time_ms().min(MEASURE_LENGTH_MS);
        let samples = (u64::from(SAMPLE_RATE) * ms / 1000) as usize;

        if let Err(e) = sink.write(&waveform[..samples]) {
            warn!(
                err = e.to_string(),
                pitch = pitch.name(),
                "Error writing note to sink, skipping."
            );
            return;
        }
        if let Err(e) = sink.write(&separator[..TONE_SEPARATOR_SAMPLES]) {
            warn!(
                err = e.to_string(),
                pitch = pitch.name(),
                "Error writing tone separator to sink."
            );
        }
    }

    /// Marks the voice inactive and wakes it if it is waiting for a cue.
    pub fn deactivate(&self) {
        self.baton.deactivate();
    }

    /// Waits for the worker thread to finish.
    pub fn join(&mut self) {
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!(pitch = self.pitch.name(), "Error joining voice thread.");
            }
        }
    }

    /// Stops the voice and waits for its thread to finish. Idempotent.
    pub fn stop(&mut self) {
        self.deactivate();
        self.join();
    }
}

#[cfg(test)]
mod test {
    use std::{
        fmt,
        sync::Arc,
        time::{Duration, Instant},
    };

    use crate::{
        audio::{mock, Sink, SinkError},
        playsync::WaitOutcome,
        score::{NoteLength, Pitch},
        waveform::{Catalog, SAMPLE_RATE, TONE_SEPARATOR_SAMPLES},
    };

    use super::Voice;

    const ACK_TIMEOUT: Duration = Duration::from_secs(3);

    /// A sink that always fails.
    struct BrokenSink {}

    impl Sink for BrokenSink {
        fn write(&self, _: &[i8]) -> Result<(), SinkError> {
            Err(SinkError::Closed)
        }

        fn drain(&self) -> Result<(), SinkError> {
            Err(SinkError::Closed)
        }

        fn to_mock(&self) -> Result<Arc<mock::Sink>, SinkError> {
            Err(SinkError::Closed)
        }
    }

    impl fmt::Display for BrokenSink {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "broken sink")
        }
    }

    #[test]
    fn test_voice_plays_assigned_parts_in_order() {
        let sink = Arc::new(mock::Sink::get("mock-voice"));
        let catalog = Arc::new(Catalog::new());

        let mut voice = Voice::new(Pitch::A4);
        voice.assign_part(NoteLength::Quarter);
        voice.assign_part(NoteLength::Half);
        assert_eq!(2, voice.parts_remaining());

        voice.start(sink.clone(), catalog.clone());

        for expected_ms in [250u64, 500] {
            assert!(voice.baton().cue().is_ok());
            assert_eq!(WaitOutcome::Done, voice.baton().wait_done(ACK_TIMEOUT));

            let writes = sink.writes();
            let tone = &writes[writes.len() - 2];
            let separator = &writes[writes.len() - 1];

            let expected_samples = (u64::from(SAMPLE_RATE) * expected_ms / 1000) as usize;
            assert_eq!(expected_samples, tone.len());
            assert_eq!(
                catalog.waveform(Pitch::A4)[..expected_samples],
                tone[..],
                "tone should be a prefix of the A4 waveform"
            );
            assert_eq!(TONE_SEPARATOR_SAMPLES, separator.len());
            assert!(separator.iter().all(|sample| *sample == 0));
        }

        voice.stop();
        assert!(!voice.is_active());
    }

    #[test]
    fn test_voice_underflow_is_fatal_to_voice_only() {
        let sink = Arc::new(mock::Sink::get("mock-underflow"));
        let catalog = Arc::new(Catalog::new());

        // No parts assigned: cueing is an internal defect that kills this
        // voice but must not hang the caller.
        let mut voice = Voice::new(Pitch::C4);
        voice.start(sink.clone(), catalog);

        assert!(voice.baton().cue().is_ok());
        assert_eq!(
            WaitOutcome::Disconnected,
            voice.baton().wait_done(ACK_TIMEOUT)
        );
        assert!(!voice.is_active());
        assert_eq!(0, sink.write_count());

        voice.stop();
    }

    #[test]
    fn test_voice_stop_while_idle_is_prompt() {
        let sink = Arc::new(mock::Sink::get("mock-idle"));
        let catalog = Arc::new(Catalog::new());

        let mut voice = Voice::new(Pitch::E4);
        voice.assign_part(NoteLength::Quarter);
        voice.start(sink, catalog);

        // The stop wake must beat the liveness timeout.
        let start = Instant::now();
        voice.stop();
        assert!(start.elapsed() < Duration::from_millis(400));
    }

    #[test]
    fn test_voice_skips_note_on_sink_error() {
        let catalog = Arc::new(Catalog::new());

        let mut voice = Voice::new(Pitch::G4);
        voice.assign_part(NoteLength::Quarter);
        voice.assign_part(NoteLength::Quarter);
        voice.start(Arc::new(BrokenSink {}), catalog);

        // Both notes fail to write, but the voice still acknowledges and
        // keeps going.
        for _ in 0..2 {
            assert!(voice.baton().cue().is_ok());
            assert_eq!(WaitOutcome::Done, voice.baton().wait_done(ACK_TIMEOUT));
        }

        voice.stop();
    }

    #[test]
    fn test_voice_double_start_is_harmless() {
        let sink = Arc::new(mock::Sink::get("mock-double"));
        let catalog = Arc::new(Catalog::new());

        let mut voice = Voice::new(Pitch::B4);
        voice.assign_part(NoteLength::Eighth);
        voice.start(sink.clone(), catalog.clone());
        voice.start(sink, catalog);

        assert!(voice.baton().cue().is_ok());
        assert_eq!(WaitOutcome::Done, voice.baton().wait_done(ACK_TIMEOUT));
        voice.stop();
    }
}
