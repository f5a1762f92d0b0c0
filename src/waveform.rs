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
use std::{f64::consts::TAU, sync::Arc};

use crate::score::Pitch;

/// The audio sample rate in samples per second (~48KHz).
pub const SAMPLE_RATE: u32 = 48 * 1024;

/// The length of a measure in seconds.
pub const MEASURE_LENGTH_SEC: u32 = 1;

/// How many samples of silence separate consecutive tones acoustically.
pub const TONE_SEPARATOR_SAMPLES: usize = 50;

/// Peak amplitude of generated samples.
const MAX_VOLUME: f64 = 127.0;

/// Precomputed pure-tone PCM buffers, one full measure per pitch. Built once
/// at startup; read-only and shareable across any number of voices without
/// synchronization.
pub struct Catalog {
    /// One waveform per pitch, indexed by ordinal. REST is all zeroes.
    waveforms: Vec<Arc<[i8]>>,
}

impl Catalog {
    /// Computes the waveform for every pitch.
    pub fn new() -> Catalog {
        let samples_per_measure = (MEASURE_LENGTH_SEC * SAMPLE_RATE) as usize;
        let step_alpha = TAU / f64::from(SAMPLE_RATE);

        let mut waveforms: Vec<Arc<[i8]>> = Vec::with_capacity(Pitch::ALL.len());
        for pitch in Pitch::ALL {
            let mut samples = vec![0i8; samples_per_measure];
            if let Some(frequency) = pitch.frequency() {
                let sin_step = frequency * step_alpha;
                for (i, sample) in samples.iter_mut().enumerate() {
                    *sample = ((i as f64 * sin_step).sin() * MAX_VOLUME) as i8;
                }
            }
            waveforms.push(samples.into());
        }

        Catalog { waveforms }
    }

    /// The precomputed waveform for the given pitch: one measure of signed
    /// 8-bit mono PCM.
    pub fn waveform(&self, pitch: Pitch) -> &Arc<[i8]> {
        &self.waveforms[pitch as usize]
    }

    /// A measure of silence, used for the inter-tone separator.
    pub fn silence(&self) -> &Arc<[i8]> {
        self.waveform(Pitch::REST)
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Catalog::new()
    }
}
