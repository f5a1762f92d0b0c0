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
    collections::HashSet,
    fmt, fs,
    path::{Path, PathBuf},
    time::Duration,
};

/// How long a full measure takes to play.
pub const MEASURE_LENGTH_MS: u64 = 1000;

/// Typed error for score load/parse failures. A score is accepted whole or
/// rejected whole; there are no partial results.
#[derive(Debug, thiserror::Error)]
pub enum ScoreError {
    #[error("line {line}: expected '<PITCH> <LENGTH>', got '{text}'")]
    MalformedLine { line: usize, text: String },

    #[error("line {line}: unknown pitch '{name}'")]
    UnknownPitch { line: usize, name: String },

    #[error("line {line}: no note length with code '{code}'")]
    BadLengthCode { line: usize, code: String },

    #[error("score file not found: {0}")]
    NotFound(String),

    #[error("{0} is a directory, not a score file")]
    IsDirectory(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

macro_rules! pitches {
    ($($name:ident),+ $(,)?) => {
        /// A named bell pitch, or REST for silence. Declaration order is
        /// significant: a pitch's frequency is derived from its ordinal as an
        /// equal-tempered semitone offset from A3 (220 Hz).
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
        #[repr(u8)]
        pub enum Pitch {
            $($name,)+
        }

        impl Pitch {
            /// Every pitch, in ordinal order.
            pub const ALL: &'static [Pitch] = &[$(Pitch::$name,)+];

            /// The name of this pitch as it appears in score files.
            pub fn name(&self) -> &'static str {
                match self {
                    $(Pitch::$name => stringify!($name),)+
                }
            }

            /// Looks up a pitch by its exact score-file name.
            pub fn from_name(name: &str) -> Option<Pitch> {
                match name {
                    $(stringify!($name) => Some(Pitch::$name),)+
                    _ => None,
                }
            }
        }
    };
}

pitches!(
    REST, A3, A3S, B3, C3, C3S, D3, D3S, E3, F3, F3S, G3, G3S, A4, A4S, B4, C4, C4S, D4, D4S, E4,
    F4, F4S, G4, G4S, A5, A5S, B5, C5, C5S, D5, D5S, E5, F5, F5S, G5, G5S, A6, A6S, B6,
);

impl Pitch {
    /// The frequency of this pitch in Hz, or None for REST.
    pub fn frequency(&self) -> Option<f64> {
        let ordinal = *self as u8;
        if ordinal == 0 {
            return None;
        }

        let half_steps_up_from_a = f64::from(ordinal - 1);
        Some(220.0 * f64::powf(2.0, half_steps_up_from_a / 12.0))
    }
}

impl std::str::FromStr for Pitch {
    type Err = ();

    fn from_str(name: &str) -> Result<Pitch, ()> {
        Pitch::from_name(name).ok_or(())
    }
}

impl fmt::Display for Pitch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// The length of a note as a fraction of one measure.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NoteLength {
    Whole,
    DottedHalf,
    Half,
    DottedQuarter,
    Quarter,
    Eighth,
}

impl NoteLength {
    /// The fraction of a measure this length occupies.
    pub fn fraction(&self) -> f64 {
        match self {
            NoteLength::Whole => 1.0,
            NoteLength::DottedHalf => 0.75,
            NoteLength::Half => 0.5,
            NoteLength::DottedQuarter => 0.375,
            NoteLength::Quarter => 0.25,
            NoteLength::Eighth => 0.125,
        }
    }

    /// How long this note plays for in milliseconds.
    pub fn time_ms(&self) -> u64 {
        (self.fraction() * MEASURE_LENGTH_MS as f64) as u64
    }

    /// Maps a numeric score-file code to a note length. The code n normally
    /// selects the 1/n fraction; 3 and 6 are irregular codes for the dotted
    /// half and dotted quarter. Any other code is invalid.
    pub fn from_code(code: u32) -> Option<NoteLength> {
        match code {
            1 => Some(NoteLength::Whole),
            2 => Some(NoteLength::Half),
            3 => Some(NoteLength::DottedHalf),
            4 => Some(NoteLength::Quarter),
            6 => Some(NoteLength::DottedQuarter),
            8 => Some(NoteLength::Eighth),
            _ => None,
        }
    }
}

/// A single note: a pitch played for a length.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Note {
    pub pitch: Pitch,
    pub length: NoteLength,
}

/// An ordered sequence of notes. The order is playback order. Built once from
/// input text and immutable thereafter.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Score {
    notes: Vec<Note>,
}

impl Score {
    /// Parses a score from text lines of the form `<PITCH> <LENGTH>`. Every
    /// line must independently parse; the first bad line fails the whole
    /// score.
    pub fn parse_lines<'a, I>(lines: I) -> Result<Score, ScoreError>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut notes = Vec::new();

        for (i, text) in lines.into_iter().enumerate() {
            let line = i + 1;
            let mut elements = text.split_whitespace();
            let (Some(pitch_name), Some(length_code)) = (elements.next(), elements.next()) else {
                return Err(ScoreError::MalformedLine {
                    line,
                    text: text.to_string(),
                });
            };

            let pitch = Pitch::from_name(pitch_name).ok_or_else(|| ScoreError::UnknownPitch {
                line,
                name: pitch_name.to_string(),
            })?;
            let length = length_code
                .parse::<u32>()
                .ok()
                .and_then(NoteLength::from_code)
                .ok_or_else(|| ScoreError::BadLengthCode {
                    line,
                    code: length_code.to_string(),
                })?;

            notes.push(Note { pitch, length });
        }

        Ok(Score { notes })
    }

    /// Loads and parses a score file, retrying under the conventional score
    /// locations if the path doesn't exist as given.
    pub fn from_file(path: &Path) -> Result<Score, ScoreError> {
        let resolved = resolve(path)?;
        let contents = fs::read_to_string(&resolved)?;
        Score::parse_lines(contents.lines())
    }

    /// The notes of this score, in playback order.
    pub fn notes(&self) -> &[Note] {
        &self.notes
    }

    /// The number of notes in this score.
    pub fn len(&self) -> usize {
        self.notes.len()
    }

    /// Returns true if the score has no notes.
    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    /// The number of distinct pitches in this score, which is the number of
    /// voices needed to play it.
    pub fn distinct_pitches(&self) -> usize {
        self.notes
            .iter()
            .map(|note| note.pitch)
            .collect::<HashSet<Pitch>>()
            .len()
    }

    /// The total playing time of this score, excluding inter-note pauses.
    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.notes.iter().map(|note| note.length.time_ms()).sum())
    }
}

/// The locations tried when loading a score: the path as given, then under
/// songs/, then with a .txt extension.
fn candidates(path: &Path) -> Vec<PathBuf> {
    let mut chain = vec![path.to_path_buf()];

    loop {
        let next = {
            let last = chain.last().expect("chain is never empty");
            if last.is_relative() && !last.starts_with("songs") {
                Some(Path::new("songs").join(last))
            } else if last.extension().is_none() {
                Some(last.with_extension("txt"))
            } else {
                None
            }
        };

        match next {
            Some(next) => chain.push(next),
            None => break,
        }
    }

    chain
}

/// Resolves a score path to the first existing candidate location.
fn resolve(path: &Path) -> Result<PathBuf, ScoreError> {
    for candidate in candidates(path) {
        if candidate.is_dir() {
            return Err(ScoreError::IsDirectory(candidate.display().to_string()));
        }
        if candidate.exists() {
            return Ok(candidate);
        }
    }

    Err(ScoreError::NotFound(path.display().to_string()))
}

#[cfg(test)]
mod test {
    use std::{fs, path::Path, time::Duration};

    use super::{candidates, NoteLength, Pitch, Score, ScoreError};

    #[test]
    fn test_pitch_names_round_trip() {
        for pitch in Pitch::ALL {
            assert_eq!(Some(*pitch), Pitch::from_name(pitch.name()));
        }
        assert_eq!(None, Pitch::from_name("Z9"));
        assert_eq!(None, Pitch::from_name("a4"));
        assert_eq!(Ok(Pitch::A4S), "A4S".parse());
        assert_eq!(Err(()), "H2".parse::<Pitch>());
    }

    #[test]
    fn test_pitch_frequencies() {
        assert_eq!(None, Pitch::REST.frequency());
        let a3 = Pitch::A3.frequency().expect("A3 has a frequency");
        assert!((a3 - 220.0).abs() < 1e-9);
        // A4 is twelve semitones above A3.
        let a4 = Pitch::A4.frequency().expect("A4 has a frequency");
        assert!((a4 - 440.0).abs() < 1e-9);
        let b6 = Pitch::B6.frequency().expect("B6 has a frequency");
        assert!((b6 - 220.0 * 2.0f64.powf(38.0 / 12.0)).abs() < 1e-9);
    }

    #[test]
    fn test_note_length_codes() {
        assert_eq!(Some(NoteLength::Whole), NoteLength::from_code(1));
        assert_eq!(Some(NoteLength::Half), NoteLength::from_code(2));
        assert_eq!(Some(NoteLength::DottedHalf), NoteLength::from_code(3));
        assert_eq!(Some(NoteLength::Quarter), NoteLength::from_code(4));
        assert_eq!(Some(NoteLength::DottedQuarter), NoteLength::from_code(6));
        assert_eq!(Some(NoteLength::Eighth), NoteLength::from_code(8));
        assert_eq!(None, NoteLength::from_code(0));
        assert_eq!(None, NoteLength::from_code(5));
        assert_eq!(None, NoteLength::from_code(7));
        assert_eq!(None, NoteLength::from_code(16));
    }

    #[test]
    fn test_note_length_times() {
        assert_eq!(1000, NoteLength::Whole.time_ms());
        assert_eq!(750, NoteLength::DottedHalf.time_ms());
        assert_eq!(375, NoteLength::DottedQuarter.time_ms());
        assert_eq!(250, NoteLength::Quarter.time_ms());
        assert_eq!(125, NoteLength::Eighth.time_ms());
    }

    #[test]
    fn test_parse_valid_score() {
        let score = Score::parse_lines(["A4 4", "B4 4", "REST 8", "A4 2"]).expect("valid score");

        assert_eq!(4, score.len());
        assert_eq!(3, score.distinct_pitches());
        assert_eq!(Pitch::A4, score.notes()[0].pitch);
        assert_eq!(NoteLength::Quarter, score.notes()[0].length);
        assert_eq!(Pitch::B4, score.notes()[1].pitch);
        assert_eq!(Pitch::REST, score.notes()[2].pitch);
        assert_eq!(NoteLength::Half, score.notes()[3].length);
        assert_eq!(Duration::from_millis(1125), score.duration());
    }

    #[test]
    fn test_parse_unknown_pitch() {
        let err = Score::parse_lines(["A4 4", "Z9 4"]).expect_err("unknown pitch must fail");
        match err {
            ScoreError::UnknownPitch { line, name } => {
                assert_eq!(2, line);
                assert_eq!("Z9", name);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_parse_bad_length_code() {
        let err = Score::parse_lines(["A4 5"]).expect_err("unmapped code must fail");
        match err {
            ScoreError::BadLengthCode { line, code } => {
                assert_eq!(1, line);
                assert_eq!("5", code);
            }
            other => panic!("unexpected error: {other}"),
        }

        // Negative and non-numeric codes are rejected the same way.
        assert!(matches!(
            Score::parse_lines(["A4 -1"]),
            Err(ScoreError::BadLengthCode { .. })
        ));
        assert!(matches!(
            Score::parse_lines(["A4 four"]),
            Err(ScoreError::BadLengthCode { .. })
        ));
    }

    #[test]
    fn test_parse_malformed_line() {
        let err = Score::parse_lines(["A4 4", "B4"]).expect_err("short line must fail");
        match err {
            ScoreError::MalformedLine { line, text } => {
                assert_eq!(2, line);
                assert_eq!("B4", text);
            }
            other => panic!("unexpected error: {other}"),
        }

        assert!(matches!(
            Score::parse_lines([""]),
            Err(ScoreError::MalformedLine { .. })
        ));
    }

    #[test]
    fn test_candidate_paths() {
        assert_eq!(
            vec![
                Path::new("mary").to_path_buf(),
                Path::new("songs/mary").to_path_buf(),
                Path::new("songs/mary.txt").to_path_buf(),
            ],
            candidates(Path::new("mary"))
        );
        assert_eq!(
            vec![
                Path::new("songs/mary").to_path_buf(),
                Path::new("songs/mary.txt").to_path_buf(),
            ],
            candidates(Path::new("songs/mary"))
        );
        assert_eq!(
            vec![Path::new("songs/mary.txt").to_path_buf()],
            candidates(Path::new("songs/mary.txt"))
        );
        assert_eq!(
            vec![
                Path::new("/abs/mary").to_path_buf(),
                Path::new("/abs/mary.txt").to_path_buf(),
            ],
            candidates(Path::new("/abs/mary"))
        );
    }

    #[test]
    fn test_from_file_with_extension_retry() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("mary.txt");
        fs::write(&path, "A4 4\nB4 4\nA4 2\n").expect("write score");

        // Loading without the extension should find the .txt file.
        let score = Score::from_file(&dir.path().join("mary")).expect("score resolves");
        assert_eq!(3, score.len());
        assert_eq!(2, score.distinct_pitches());
    }

    #[test]
    fn test_from_file_missing_and_directory() {
        let dir = tempfile::tempdir().expect("tempdir");

        assert!(matches!(
            Score::from_file(&dir.path().join("nope.txt")),
            Err(ScoreError::NotFound(_))
        ));
        assert!(matches!(
            Score::from_file(dir.path()),
            Err(ScoreError::IsDirectory(_))
        ));
    }
}
