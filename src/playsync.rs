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
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};

/// A cue from the sequencer to a voice.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Cue {
    /// Play the next queued note.
    Play,
    /// Stop without playing anything further.
    Stop,
}

/// The outcome of waiting for a voice to acknowledge a cue.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WaitOutcome {
    /// The voice finished playing the cued note.
    Done,
    /// The bounded wait elapsed; the caller should re-check liveness.
    TimedOut,
    /// The voice is gone and will never acknowledge.
    Disconnected,
}

/// The outcome of a voice waiting for its next cue.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CueOutcome {
    /// A note is ready to play.
    Play,
    /// The voice should stop. Also produced when the sequencer side has gone
    /// away, since there is nothing left to coordinate with.
    Stop,
    /// The bounded wait elapsed with the voice still active.
    TimedOut,
}

/// Creates a linked rendezvous pair. The `Baton` is held by the sequencer and
/// the `VoicePort` by the voice; together they implement the exactly-once,
/// in-order request/acknowledge handshake for one voice.
pub fn pair() -> (Baton, VoicePort) {
    let active = Arc::new(AtomicBool::new(true));
    // Capacity one: the sequencer never has more than one outstanding cue,
    // and a voice never has more than one unconsumed acknowledgement.
    let (cue_tx, cue_rx) = bounded(1);
    let (done_tx, done_rx) = bounded(1);

    (
        Baton {
            cue_tx,
            done_rx,
            active: active.clone(),
        },
        VoicePort {
            cue_rx,
            done_tx,
            active,
        },
    )
}

/// The sequencer's side of the rendezvous.
#[derive(Clone)]
pub struct Baton {
    cue_tx: Sender<Cue>,
    done_rx: Receiver<()>,
    active: Arc<AtomicBool>,
}

impl Baton {
    /// Returns true if the voice has not been stopped.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Cues the voice to play its next note. Fails if the voice is gone.
    pub fn cue(&self) -> Result<(), ()> {
        self.cue_tx.send(Cue::Play).map_err(|_| ())
    }

    /// Waits for the voice to acknowledge the cued note. The timeout is a
    /// deadlock-avoidance bound, not expected playback timing; on timeout the
    /// caller re-checks `is_active` and waits again.
    pub fn wait_done(&self, timeout: Duration) -> WaitOutcome {
        match self.done_rx.recv_timeout(timeout) {
            Ok(()) => WaitOutcome::Done,
            Err(RecvTimeoutError::Timeout) => WaitOutcome::TimedOut,
            Err(RecvTimeoutError::Disconnected) => WaitOutcome::Disconnected,
        }
    }

    /// Marks the voice inactive and wakes it if it is blocked waiting for a
    /// cue. If a cue is already pending the voice will observe the inactive
    /// flag instead, so the wake is never lost.
    pub fn deactivate(&self) {
        self.active.store(false, Ordering::Release);
        let _ = self.cue_tx.try_send(Cue::Stop);
    }
}

/// The voice's side of the rendezvous.
pub struct VoicePort {
    cue_rx: Receiver<Cue>,
    done_tx: Sender<()>,
    active: Arc<AtomicBool>,
}

impl VoicePort {
    /// Returns true if this voice has not been stopped.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Marks this voice inactive, e.g. after an unrecoverable voice-local
    /// failure, so the sequencer stops cueing it.
    pub fn deactivate(&self) {
        self.active.store(false, Ordering::Release);
    }

    /// Blocks until the next cue arrives. The timeout bounds the wait so a
    /// stop requested while no note is pending is still observed promptly.
    pub fn wait_for_cue(&self, timeout: Duration) -> CueOutcome {
        match self.cue_rx.recv_timeout(timeout) {
            Ok(Cue::Play) if self.is_active() => CueOutcome::Play,
            Ok(Cue::Play) | Ok(Cue::Stop) => CueOutcome::Stop,
            Err(RecvTimeoutError::Timeout) => {
                if self.is_active() {
                    CueOutcome::TimedOut
                } else {
                    CueOutcome::Stop
                }
            }
            Err(RecvTimeoutError::Disconnected) => CueOutcome::Stop,
        }
    }

    /// Acknowledges the current cue. Returns false if the sequencer is gone.
    pub fn done(&self) -> bool {
        self.done_tx.send(()).is_ok()
    }
}
