// Music theory lookups: keys, scales, chord qualities, named progressions.
//
// Everything here is a read-only table or a pure function over one. A key is
// a tonic pitch class plus a mode; each mode has a seven-note interval pattern
// from the tonic. Chord qualities are interval sets from the chord root.
// Progressions are static (degree, quality) sequences looked up by name.
//
// This module provides:
// - Mode / Key definitions, scale membership, degree <-> pitch mapping
// - Chord quality interval sets
// - The named progression table
// - Snapping pitches to the nearest in-scale note
//
// Unknown key or quality names fail with `ConfigError::InvalidKey` /
// `ConfigError::InvalidQuality`. Used by every generator and by config.rs
// while resolving presets.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};

/// Scale modes, each defined by its interval pattern from the tonic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Mode {
    /// Ionian: C D E F G A B
    Major,
    /// Aeolian / natural minor: A B C D E F G
    Minor,
    /// Natural minor with raised 6th.
    Dorian,
    /// Half step from 1 to 2.
    Phrygian,
    /// Raised 4th.
    Lydian,
    /// Major with lowered 7th.
    Mixolydian,
    /// Diminished 5th above the tonic.
    Locrian,
    /// Natural minor with raised 7th.
    HarmonicMinor,
    /// Ascending melodic minor: raised 6th and 7th.
    MelodicMinor,
}

impl Mode {
    pub const ALL: [Mode; 9] = [
        Mode::Major,
        Mode::Minor,
        Mode::Dorian,
        Mode::Phrygian,
        Mode::Lydian,
        Mode::Mixolydian,
        Mode::Locrian,
        Mode::HarmonicMinor,
        Mode::MelodicMinor,
    ];

    /// Semitone intervals from the tonic to each scale degree.
    pub fn intervals(self) -> [u8; 7] {
        match self {
            Mode::Major => [0, 2, 4, 5, 7, 9, 11],
            Mode::Minor => [0, 2, 3, 5, 7, 8, 10],
            Mode::Dorian => [0, 2, 3, 5, 7, 9, 10],
            Mode::Phrygian => [0, 1, 3, 5, 7, 8, 10],
            Mode::Lydian => [0, 2, 4, 6, 7, 9, 11],
            Mode::Mixolydian => [0, 2, 4, 5, 7, 9, 10],
            Mode::Locrian => [0, 1, 3, 5, 6, 8, 10],
            Mode::HarmonicMinor => [0, 2, 3, 5, 7, 8, 11],
            Mode::MelodicMinor => [0, 2, 3, 5, 7, 9, 11],
        }
    }

    /// Upper-case name used in key strings ("C_MAJOR", "D_DORIAN").
    pub fn name(self) -> &'static str {
        match self {
            Mode::Major => "MAJOR",
            Mode::Minor => "MINOR",
            Mode::Dorian => "DORIAN",
            Mode::Phrygian => "PHRYGIAN",
            Mode::Lydian => "LYDIAN",
            Mode::Mixolydian => "MIXOLYDIAN",
            Mode::Locrian => "LOCRIAN",
            Mode::HarmonicMinor => "HARMONIC_MINOR",
            Mode::MelodicMinor => "MELODIC_MINOR",
        }
    }

    /// True for modes with a minor third above the tonic.
    pub fn is_minor(self) -> bool {
        self.intervals()[2] == 3
    }
}

/// A tonal center: tonic pitch class plus mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Key {
    /// Pitch class of the tonic (0 = C, 2 = D, ... 11 = B).
    pub tonic_pc: u8,
    pub mode: Mode,
}

const PC_NAMES: [&str; 12] = [
    "C", "C_SHARP", "D", "E_FLAT", "E", "F", "F_SHARP", "G", "A_FLAT", "A", "B_FLAT", "B",
];

impl Key {
    pub fn new(tonic_pc: u8, mode: Mode) -> Self {
        Key {
            tonic_pc: tonic_pc % 12,
            mode,
        }
    }

    pub fn c_major() -> Self {
        Key::new(0, Mode::Major)
    }

    /// Parse a key name.
    ///
    /// Accepts the long form `<NOTE>_<MODE>` ("C_MAJOR", "F_SHARP_MINOR",
    /// "B_FLAT_MIXOLYDIAN") and the short chord-symbol form ("C", "Am",
    /// "F#m", "Bb").
    pub fn from_name(name: &str) -> Result<Key, ConfigError> {
        let invalid = || ConfigError::InvalidKey(name.to_string());
        let trimmed = name.trim();
        if trimmed.is_empty() {
            return Err(invalid());
        }

        if trimmed.contains('_') {
            let upper = trimmed.to_ascii_uppercase();
            // Longest suffix first so "_HARMONIC_MINOR" wins over "_MINOR".
            let mut modes = Mode::ALL;
            modes.sort_by_key(|m| std::cmp::Reverse(m.name().len()));
            for mode in modes {
                let suffix = format!("_{}", mode.name());
                if let Some(note) = upper.strip_suffix(&suffix) {
                    let pc = parse_long_note(note).ok_or_else(invalid)?;
                    return Ok(Key::new(pc, mode));
                }
            }
            return Err(invalid());
        }

        let mut chars = trimmed.chars();
        let letter = chars.next().ok_or_else(invalid)?;
        let mut pc = letter_pc(letter.to_ascii_uppercase()).ok_or_else(invalid)? as i32;
        let rest: String = chars.collect();
        let rest = match rest.strip_prefix('#') {
            Some(r) => {
                pc += 1;
                r
            }
            None => match rest.strip_prefix('b') {
                Some(r) => {
                    pc -= 1;
                    r
                }
                None => rest.as_str(),
            },
        };
        let mode = match rest {
            "" => Mode::Major,
            "m" => Mode::Minor,
            _ => return Err(invalid()),
        };
        Ok(Key::new(pc.rem_euclid(12) as u8, mode))
    }

    /// Canonical long-form name, e.g. "C_MAJOR".
    pub fn name(&self) -> String {
        format!("{}_{}", PC_NAMES[self.tonic_pc as usize], self.mode.name())
    }

    /// The seven scale pitch classes in degree order.
    pub fn scale(&self) -> [u8; 7] {
        self.mode.intervals().map(|iv| (self.tonic_pc + iv) % 12)
    }

    /// Check if a MIDI pitch belongs to the scale.
    pub fn is_in_scale(&self, pitch: u8) -> bool {
        self.scale_degree(pitch).is_some()
    }

    /// Scale degree (0-6) of a pitch, or None if it is outside the scale.
    pub fn scale_degree(&self, pitch: u8) -> Option<u8> {
        let pc = (pitch % 12 + 12 - self.tonic_pc) % 12;
        self.mode
            .intervals()
            .iter()
            .position(|&iv| iv == pc)
            .map(|d| d as u8)
    }

    /// Absolute pitch of a degree. Degrees outside 0..7 wrap into the
    /// neighbouring octaves (7 = tonic an octave up, -1 = 7th degree below).
    /// Octave numbering puts C4 at 60.
    pub fn resolve(&self, degree: i32, octave: i32) -> i32 {
        let intervals = self.mode.intervals();
        let step = intervals[degree.rem_euclid(7) as usize] as i32;
        (octave + 1) * 12 + self.tonic_pc as i32 + step + 12 * degree.div_euclid(7)
    }

    /// Absolute degree index of an in-scale pitch: `degree + 7 * octave`,
    /// so that `pitch_at_index(index_of(p)) == p`.
    pub fn index_of(&self, pitch: u8) -> Option<i32> {
        let degree = self.scale_degree(pitch)?;
        let step = self.mode.intervals()[degree as usize] as i32;
        let octave = (pitch as i32 - 12 - self.tonic_pc as i32 - step).div_euclid(12);
        Some(degree as i32 + 7 * octave)
    }

    /// Pitch of an absolute degree index (see `index_of`).
    pub fn pitch_at_index(&self, index: i32) -> i32 {
        self.resolve(index, 0)
    }

    /// All in-scale pitches in `[low, high]`, ascending.
    pub fn pitches_in_range(&self, low: u8, high: u8) -> Vec<u8> {
        (low..=high).filter(|&p| self.is_in_scale(p)).collect()
    }

    /// Snap a pitch to the nearest in-scale pitch, preferring the lower
    /// neighbour on ties.
    pub fn snap_to_scale(&self, pitch: u8) -> u8 {
        if self.is_in_scale(pitch) {
            return pitch;
        }
        for offset in 1u8..=6 {
            if pitch >= offset && self.is_in_scale(pitch - offset) {
                return pitch - offset;
            }
            if pitch as u16 + offset as u16 <= 127 && self.is_in_scale(pitch + offset) {
                return pitch + offset;
            }
        }
        pitch
    }
}

fn letter_pc(letter: char) -> Option<u8> {
    match letter {
        'C' => Some(0),
        'D' => Some(2),
        'E' => Some(4),
        'F' => Some(5),
        'G' => Some(7),
        'A' => Some(9),
        'B' => Some(11),
        _ => None,
    }
}

fn parse_long_note(note: &str) -> Option<u8> {
    let (letter, accidental) = match note.split_once('_') {
        Some((l, a)) => (l, Some(a)),
        None => (note, None),
    };
    let mut chars = letter.chars();
    let base = letter_pc(chars.next()?)? as i32;
    if chars.next().is_some() {
        return None;
    }
    let pc = match accidental {
        None => base,
        Some("SHARP") => base + 1,
        Some("FLAT") => base - 1,
        Some(_) => return None,
    };
    Some(pc.rem_euclid(12) as u8)
}

/// The ordered seven pitch classes of a key's scale.
pub fn scale_pitches(key: &Key) -> [u8; 7] {
    key.scale()
}

/// Absolute pitch of `degree` in `key` at `octave` (C4 = 60).
pub fn resolve_pitch(key: &Key, degree: i32, octave: i32) -> i32 {
    key.resolve(degree, octave)
}

/// Chord qualities with their interval sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChordQuality {
    Major,
    Minor,
    Diminished,
    Augmented,
    Sus2,
    Sus4,
    MajorSeventh,
    MinorSeventh,
    DominantSeventh,
    DiminishedSeventh,
    HalfDiminishedSeventh,
    MinorMajorSeventh,
    AugmentedMajorSeventh,
    AugmentedSeventh,
    MajorNinth,
    MinorNinth,
    DominantNinth,
}

impl ChordQuality {
    /// Semitone offsets from the chord root.
    pub fn intervals(self) -> &'static [u8] {
        match self {
            ChordQuality::Major => &[0, 4, 7],
            ChordQuality::Minor => &[0, 3, 7],
            ChordQuality::Diminished => &[0, 3, 6],
            ChordQuality::Augmented => &[0, 4, 8],
            ChordQuality::Sus2 => &[0, 2, 7],
            ChordQuality::Sus4 => &[0, 5, 7],
            ChordQuality::MajorSeventh => &[0, 4, 7, 11],
            ChordQuality::MinorSeventh => &[0, 3, 7, 10],
            ChordQuality::DominantSeventh => &[0, 4, 7, 10],
            ChordQuality::DiminishedSeventh => &[0, 3, 6, 9],
            ChordQuality::HalfDiminishedSeventh => &[0, 3, 6, 10],
            ChordQuality::MinorMajorSeventh => &[0, 3, 7, 11],
            ChordQuality::AugmentedMajorSeventh => &[0, 4, 8, 11],
            ChordQuality::AugmentedSeventh => &[0, 4, 8, 10],
            ChordQuality::MajorNinth => &[0, 4, 7, 11, 14],
            ChordQuality::MinorNinth => &[0, 3, 7, 10, 14],
            ChordQuality::DominantNinth => &[0, 4, 7, 10, 14],
        }
    }

    pub fn from_name(name: &str) -> Result<Self, ConfigError> {
        let quality = match name.trim().to_ascii_lowercase().as_str() {
            "major" | "maj" => ChordQuality::Major,
            "minor" | "min" | "m" => ChordQuality::Minor,
            "diminished" | "dim" => ChordQuality::Diminished,
            "augmented" | "aug" => ChordQuality::Augmented,
            "sus2" => ChordQuality::Sus2,
            "sus4" => ChordQuality::Sus4,
            "maj7" | "major_seventh" => ChordQuality::MajorSeventh,
            "min7" | "m7" | "minor_seventh" => ChordQuality::MinorSeventh,
            "dom7" | "7" | "dominant_seventh" => ChordQuality::DominantSeventh,
            "dim7" | "diminished_seventh" => ChordQuality::DiminishedSeventh,
            "half_dim7" | "m7b5" => ChordQuality::HalfDiminishedSeventh,
            "min_maj7" | "mmaj7" => ChordQuality::MinorMajorSeventh,
            "aug_maj7" => ChordQuality::AugmentedMajorSeventh,
            "aug7" => ChordQuality::AugmentedSeventh,
            "maj9" => ChordQuality::MajorNinth,
            "min9" | "m9" => ChordQuality::MinorNinth,
            "dom9" | "9" => ChordQuality::DominantNinth,
            _ => return Err(ConfigError::InvalidQuality(name.to_string())),
        };
        Ok(quality)
    }

    /// True if the chord has a seventh (four or more tones).
    pub fn has_seventh(self) -> bool {
        self.intervals().len() >= 4
    }
}

/// The semitone offsets of a chord quality.
pub fn chord_intervals(quality: ChordQuality) -> &'static [u8] {
    quality.intervals()
}

/// A named chord progression: scale degrees (0-based) with qualities.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progression {
    pub name: &'static str,
    pub style: &'static str,
    pub steps: &'static [(u8, ChordQuality)],
}

use ChordQuality as Q;

/// Built-in progressions.
pub const PROGRESSIONS: &[Progression] = &[
    Progression {
        name: "pop_basic",
        style: "pop",
        steps: &[(0, Q::Major), (4, Q::Major), (5, Q::Minor), (3, Q::Major)],
    },
    Progression {
        name: "pop_50s",
        style: "pop",
        steps: &[(0, Q::Major), (5, Q::Minor), (3, Q::Major), (4, Q::Major)],
    },
    Progression {
        name: "jazz_251",
        style: "jazz",
        steps: &[
            (1, Q::Minor),
            (4, Q::DominantSeventh),
            (0, Q::MajorSeventh),
        ],
    },
    Progression {
        name: "jazz_rhythm",
        style: "jazz",
        steps: &[
            (0, Q::MajorSeventh),
            (5, Q::MinorSeventh),
            (1, Q::MinorSeventh),
            (4, Q::DominantSeventh),
        ],
    },
    Progression {
        name: "rock_basic",
        style: "rock",
        steps: &[(0, Q::Major), (3, Q::Major), (4, Q::Major)],
    },
    Progression {
        name: "blues_basic",
        style: "blues",
        steps: &[
            (0, Q::DominantSeventh),
            (3, Q::DominantSeventh),
            (0, Q::DominantSeventh),
            (4, Q::DominantSeventh),
            (3, Q::DominantSeventh),
            (0, Q::DominantSeventh),
        ],
    },
    Progression {
        name: "classical_authentic",
        style: "classical",
        steps: &[(4, Q::Major), (0, Q::Major)],
    },
    Progression {
        name: "classical_plagal",
        style: "classical",
        steps: &[(3, Q::Major), (0, Q::Major)],
    },
    Progression {
        name: "modern_trending",
        style: "pop",
        steps: &[(5, Q::Minor), (3, Q::Major), (0, Q::Major), (4, Q::Major)],
    },
    Progression {
        name: "complex_cycle",
        style: "jazz",
        steps: &[
            (0, Q::MajorSeventh),
            (3, Q::DominantSeventh),
            (6, Q::DiminishedSeventh),
            (2, Q::MinorSeventh),
            (5, Q::MinorSeventh),
            (1, Q::MinorSeventh),
            (4, Q::DominantSeventh),
            (0, Q::MajorSeventh),
        ],
    },
];

/// Look up a progression by name.
pub fn progression(name: &str) -> Result<&'static Progression, ConfigError> {
    PROGRESSIONS
        .iter()
        .find(|p| p.name == name)
        .ok_or_else(|| ConfigError::UnknownProgression(name.to_string()))
}

/// All progressions tagged with a style.
pub fn progressions_by_style(style: &str) -> Vec<&'static Progression> {
    PROGRESSIONS.iter().filter(|p| p.style == style).collect()
}

/// The triad quality that occurs naturally on a degree of the key's scale.
pub fn diatonic_triad(key: &Key, degree: u8) -> ChordQuality {
    let scale = key.mode.intervals();
    let at = |d: u8| scale[(d % 7) as usize] as i32 + 12 * (d / 7) as i32;
    let root = at(degree);
    let third = (at(degree + 2) - root).rem_euclid(12);
    let fifth = (at(degree + 4) - root).rem_euclid(12);
    match (third, fifth) {
        (4, 7) => ChordQuality::Major,
        (3, 7) => ChordQuality::Minor,
        (3, 6) => ChordQuality::Diminished,
        (4, 8) => ChordQuality::Augmented,
        _ => ChordQuality::Major,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_c_major_scale() {
        let key = Key::from_name("C_MAJOR").unwrap();
        assert_eq!(scale_pitches(&key), [0, 2, 4, 5, 7, 9, 11]);
        assert_eq!(resolve_pitch(&key, 0, 4), 60);
        assert_eq!(resolve_pitch(&key, 4, 4), 67);
        assert_eq!(resolve_pitch(&key, 7, 4), 72);
        assert_eq!(resolve_pitch(&key, -1, 4), 59);
    }

    #[test]
    fn test_key_name_forms() {
        let a_minor = Key::from_name("A_MINOR").unwrap();
        assert_eq!(a_minor, Key::new(9, Mode::Minor));
        assert_eq!(Key::from_name("Am").unwrap(), a_minor);
        assert_eq!(
            Key::from_name("F_SHARP_MAJOR").unwrap(),
            Key::from_name("F#").unwrap()
        );
        assert_eq!(Key::from_name("Bbm").unwrap(), Key::new(10, Mode::Minor));
        assert_eq!(
            Key::from_name("D_HARMONIC_MINOR").unwrap().mode,
            Mode::HarmonicMinor
        );
        assert_eq!(Key::from_name("d_dorian").unwrap(), Key::new(2, Mode::Dorian));
        assert_eq!(Key::new(10, Mode::Major).name(), "B_FLAT_MAJOR");
    }

    #[test]
    fn test_invalid_names() {
        assert!(matches!(
            Key::from_name("H_MAJOR"),
            Err(ConfigError::InvalidKey(_))
        ));
        assert!(matches!(
            Key::from_name("C_BEBOP"),
            Err(ConfigError::InvalidKey(_))
        ));
        assert!(matches!(Key::from_name(""), Err(ConfigError::InvalidKey(_))));
        assert!(matches!(
            ChordQuality::from_name("hyperchord"),
            Err(ConfigError::InvalidQuality(_))
        ));
    }

    #[test]
    fn test_scale_degree_and_snap() {
        let key = Key::new(2, Mode::Dorian);
        assert_eq!(key.scale_degree(62), Some(0));
        assert_eq!(key.scale_degree(69), Some(4));
        assert_eq!(key.scale_degree(63), None);
        assert_eq!(key.snap_to_scale(63), 62);
        assert_eq!(key.snap_to_scale(66), 65);
    }

    #[test]
    fn test_degree_index_roundtrip() {
        let key = Key::new(11, Mode::Major);
        for pitch in key.pitches_in_range(40, 90) {
            let index = key.index_of(pitch).unwrap();
            assert_eq!(key.pitch_at_index(index), pitch as i32);
        }
        assert_eq!(Key::c_major().index_of(60), Some(28));
        assert_eq!(Key::c_major().index_of(61), None);
    }

    #[test]
    fn test_chord_intervals() {
        assert_eq!(chord_intervals(ChordQuality::Major), &[0, 4, 7]);
        assert_eq!(chord_intervals(ChordQuality::DominantSeventh), &[0, 4, 7, 10]);
        assert!(ChordQuality::MinorSeventh.has_seventh());
        assert!(!ChordQuality::Minor.has_seventh());
    }

    #[test]
    fn test_progression_lookup() {
        let pop = progression("pop_basic").unwrap();
        assert_eq!(pop.steps[0], (0, ChordQuality::Major));
        assert_eq!(pop.steps.len(), 4);
        assert!(matches!(
            progression("nope"),
            Err(ConfigError::UnknownProgression(_))
        ));
        assert_eq!(progressions_by_style("jazz").len(), 3);
    }

    #[test]
    fn test_diatonic_triads_in_major() {
        let key = Key::c_major();
        let qualities: Vec<ChordQuality> = (0..7).map(|d| diatonic_triad(&key, d)).collect();
        assert_eq!(
            qualities,
            vec![
                ChordQuality::Major,
                ChordQuality::Minor,
                ChordQuality::Minor,
                ChordQuality::Major,
                ChordQuality::Major,
                ChordQuality::Minor,
                ChordQuality::Diminished,
            ]
        );
    }
}
