// Shared generation context: chords, the chord timeline, and the read-only
// per-composition context every generator receives.
//
// A `Chord` stores only relative information (scale degree, quality,
// inversion, octave shift). Absolute pitches are computed on demand from a
// key and octave so the same timeline can be transposed by swapping the key.
//
// The `ChordTimeline` is built once by the harmony generator (harmony.rs) and
// then only read: melody strategies ask it which chord sounds at a tick, the
// bass derivation reads chord roots, and the Arranger realizes it as the
// accompaniment track.

use crate::error::GenerationError;
use crate::score::{TICKS_PER_BEAT, bar_ticks, piece_ticks};
use crate::theory::{ChordQuality, Key};
use serde::{Deserialize, Serialize};

/// How chord tones are laid out when realized as pitches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Voicing {
    /// All tones within one octave above the root.
    #[default]
    Close,
    /// Alternate voices raised an octave, spanning two octaves.
    Open,
}

impl Voicing {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "close" => Some(Voicing::Close),
            "open" => Some(Voicing::Open),
            _ => None,
        }
    }
}

/// A chord as a scale degree plus quality, with voicing offsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Chord {
    /// Scale degree of the root, 0-6.
    pub degree: u8,
    pub quality: ChordQuality,
    /// Number of lowest tones moved up an octave (0 = root position).
    pub inversion: u8,
    /// Whole-chord octave transposition applied after inversion.
    pub octave_shift: i8,
}

impl Chord {
    /// Root-position chord on a degree.
    pub fn new(degree: u8, quality: ChordQuality) -> Self {
        Chord {
            degree: degree % 7,
            quality,
            inversion: 0,
            octave_shift: 0,
        }
    }

    /// Root pitch at the given octave, ignoring inversion and shift.
    pub fn root_pitch(&self, key: &Key, octave: i32) -> i32 {
        key.resolve(self.degree as i32, octave)
    }

    /// Pitch classes of the chord tones.
    pub fn pitch_classes(&self, key: &Key) -> Vec<u8> {
        let root = self.root_pitch(key, 4);
        self.quality
            .intervals()
            .iter()
            .map(|&iv| ((root + iv as i32).rem_euclid(12)) as u8)
            .collect()
    }

    /// True if `pitch` (any octave) is a chord tone.
    pub fn contains(&self, key: &Key, pitch: u8) -> bool {
        self.pitch_classes(key).contains(&(pitch % 12))
    }

    /// Realize the chord as ascending absolute pitches.
    ///
    /// Close voicing keeps every tone within an octave of the root (a 9th is
    /// folded down to a 2nd). Open voicing raises every other tone by an
    /// octave; with `extensions`, seventh chords also get the 9th on top.
    /// Inversion and octave shift are applied last. Tones that would fall
    /// outside the MIDI range are dropped.
    pub fn pitches(&self, key: &Key, octave: i32, voicing: Voicing, extensions: bool) -> Vec<u8> {
        let root = self.root_pitch(key, octave);
        let mut tones: Vec<i32> = self
            .quality
            .intervals()
            .iter()
            .map(|&iv| root + (iv as i32 % 12))
            .collect();
        tones.sort_unstable();
        tones.dedup();

        if voicing == Voicing::Open {
            for (i, tone) in tones.iter_mut().enumerate() {
                if i % 2 == 1 {
                    *tone += 12;
                }
            }
            if extensions && self.quality.has_seventh() {
                tones.push(root + 14);
            }
            tones.sort_unstable();
            tones.dedup();
        }

        let inversions = (self.inversion as usize).min(tones.len().saturating_sub(1));
        for _ in 0..inversions {
            tones[0] += 12;
            tones.sort_unstable();
        }

        let shift = self.octave_shift as i32 * 12;
        tones
            .into_iter()
            .map(|t| t + shift)
            .filter(|t| (0..=127).contains(t))
            .map(|t| t as u8)
            .collect()
    }
}

/// One chord held over a span of bars.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelineEntry {
    pub chord: Chord,
    pub start_bar: u32,
    pub duration_bars: u32,
}

impl TimelineEntry {
    pub fn end_bar(&self) -> u32 {
        self.start_bar + self.duration_bars
    }
}

/// The piece-wide chord sequence. Entries are contiguous from bar 0 and
/// cover exactly `bars` bars.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChordTimeline {
    pub key: Key,
    pub voicing: Voicing,
    pub extensions: bool,
    /// Octave the accompaniment is voiced around.
    pub octave: i32,
    entries: Vec<TimelineEntry>,
}

impl ChordTimeline {
    /// Build a timeline, checking that entries start at bar 0, are
    /// contiguous, have positive length and cover exactly `bars` bars.
    pub fn new(
        key: Key,
        voicing: Voicing,
        extensions: bool,
        octave: i32,
        entries: Vec<TimelineEntry>,
        bars: u32,
    ) -> Result<Self, GenerationError> {
        if entries.is_empty() {
            return Err(GenerationError::NoCandidates(
                "chord timeline has no entries".to_string(),
            ));
        }
        let mut expected_start = 0;
        for entry in &entries {
            if entry.start_bar != expected_start || entry.duration_bars == 0 {
                return Err(GenerationError::InvalidEvent(format!(
                    "timeline entry at bar {} (expected bar {}, length {})",
                    entry.start_bar, expected_start, entry.duration_bars
                )));
            }
            expected_start = entry.end_bar();
        }
        if expected_start != bars {
            return Err(GenerationError::InvalidEvent(format!(
                "timeline covers {expected_start} bars, expected {bars}"
            )));
        }
        Ok(ChordTimeline {
            key,
            voicing,
            extensions,
            octave,
            entries,
        })
    }

    pub fn entries(&self) -> &[TimelineEntry] {
        &self.entries
    }

    pub fn entries_mut(&mut self) -> &mut [TimelineEntry] {
        &mut self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn total_bars(&self) -> u32 {
        self.entries.last().map(TimelineEntry::end_bar).unwrap_or(0)
    }

    /// The entry sounding at `bar`. Bars past the end map to the last entry.
    pub fn entry_at_bar(&self, bar: u32) -> &TimelineEntry {
        let idx = self
            .entries
            .partition_point(|e| e.start_bar <= bar)
            .saturating_sub(1);
        &self.entries[idx]
    }

    pub fn chord_at_bar(&self, bar: u32) -> &Chord {
        &self.entry_at_bar(bar).chord
    }

    /// The chord sounding at an absolute tick.
    pub fn chord_at_tick(&self, tick: u32, beats_per_bar: u8) -> &Chord {
        self.chord_at_bar(tick / bar_ticks(beats_per_bar))
    }

    /// Realized pitches of one entry using the timeline's voicing.
    pub fn voiced(&self, entry: &TimelineEntry) -> Vec<u8> {
        entry
            .chord
            .pitches(&self.key, self.octave, self.voicing, self.extensions)
    }
}

/// Style parameters shared by all generators.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StyleParams {
    /// Swing factor, 0.0 (straight) to 1.0.
    pub swing: f64,
    /// Maximum random accent deviation for groove rhythms.
    pub accent_jitter: u8,
    /// Style name, if the preset selected one.
    pub style: Option<String>,
}

/// Read-only per-composition context. Generators borrow it; none mutate it.
#[derive(Debug, Clone)]
pub struct GenerationContext {
    pub key: Key,
    pub tempo_bpm: u16,
    pub bars: u32,
    pub beats_per_bar: u8,
    pub timeline: ChordTimeline,
    pub style: StyleParams,
}

impl GenerationContext {
    pub fn total_ticks(&self) -> u32 {
        piece_ticks(self.bars, self.beats_per_bar)
    }

    pub fn bar_ticks(&self) -> u32 {
        bar_ticks(self.beats_per_bar)
    }

    pub fn beat_ticks(&self) -> u32 {
        TICKS_PER_BEAT
    }

    /// The chord active at an absolute tick.
    pub fn chord_at_tick(&self, tick: u32) -> &Chord {
        self.timeline.chord_at_tick(tick, self.beats_per_bar)
    }
}

/// Four-beat context over `bars` bars cycling I-V-vi-IV, for unit tests.
#[cfg(test)]
pub(crate) fn test_context(key: Key, bars: u32) -> GenerationContext {
    let degrees = [0u8, 4, 5, 3];
    let entries = (0..bars)
        .map(|b| {
            let degree = degrees[b as usize % degrees.len()];
            TimelineEntry {
                chord: Chord::new(degree, crate::theory::diatonic_triad(&key, degree)),
                start_bar: b,
                duration_bars: 1,
            }
        })
        .collect();
    GenerationContext {
        key,
        tempo_bpm: 120,
        bars,
        beats_per_bar: 4,
        timeline: ChordTimeline::new(key, Voicing::Close, false, 4, entries, bars)
            .expect("valid test timeline"),
        style: StyleParams::default(),
    }
}
