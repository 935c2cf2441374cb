// Phrase assembly from motifs, variations and cadences.
//
// `PhraseBuilder` keeps an ordered pitch buffer. Generators push motifs
// (optionally repeated), transformed variations of a motif, and cadences onto
// it, then call `build(max_length)` to take a prefix of the requested length.
//
// `build` truncates and never pads: a buffer shorter than `max_length` comes
// back as-is, so callers that need an exact length keep appending phrases
// until `len()` is large enough. The builder does not check the musical
// result of a transform, only the buffer bookkeeping.
//
// The stock transforms below return closures, so they can be handed straight
// to `add_variation`. Used by the structured melody strategy (motif.rs).

use crate::theory::Key;

/// Ordered pitch buffer for building phrases.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PhraseBuilder {
    buffer: Vec<u8>,
}

impl PhraseBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `notes` `repeat` times. A repeat of 0 appends nothing.
    pub fn add_motif(&mut self, notes: &[u8], repeat: usize) -> &mut Self {
        for _ in 0..repeat {
            self.buffer.extend_from_slice(notes);
        }
        self
    }

    /// Append `transform(motif)`.
    pub fn add_variation<F>(&mut self, motif: &[u8], transform: F) -> &mut Self
    where
        F: Fn(&[u8]) -> Vec<u8>,
    {
        let varied = transform(motif);
        self.buffer.extend(varied);
        self
    }

    /// Append a cadence: the tonic of `key` at `octave`, twice.
    pub fn add_cadence(&mut self, key: &Key, octave: i32) -> &mut Self {
        let tonic = key.resolve(0, octave).clamp(0, 127) as u8;
        self.buffer.push(tonic);
        self.buffer.push(tonic);
        self
    }

    /// The first `max_length` pitches, in order.
    pub fn build(&self, max_length: usize) -> Vec<u8> {
        self.buffer.iter().take(max_length).copied().collect()
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buffer
    }
}

/// Shift every pitch by a fixed number of semitones, clamped to MIDI range.
pub fn transpose(semitones: i32) -> impl Fn(&[u8]) -> Vec<u8> {
    move |notes: &[u8]| {
        notes
            .iter()
            .map(|&p| (p as i32 + semitones).clamp(0, 127) as u8)
            .collect()
    }
}

/// Shift every pitch by `steps` scale degrees within `key`. Out-of-scale
/// pitches are snapped to the scale first.
pub fn transpose_in_key(key: Key, steps: i32) -> impl Fn(&[u8]) -> Vec<u8> {
    move |notes: &[u8]| {
        notes
            .iter()
            .map(|&p| {
                let snapped = key.snap_to_scale(p);
                match key.index_of(snapped) {
                    Some(index) => key.pitch_at_index(index + steps).clamp(0, 127) as u8,
                    None => snapped,
                }
            })
            .collect()
    }
}

/// Mirror every pitch around `axis`.
pub fn invert(axis: u8) -> impl Fn(&[u8]) -> Vec<u8> {
    move |notes: &[u8]| {
        notes
            .iter()
            .map(|&p| (2 * axis as i32 - p as i32).clamp(0, 127) as u8)
            .collect()
    }
}

/// Reverse the order of the notes.
pub fn retrograde(notes: &[u8]) -> Vec<u8> {
    notes.iter().rev().copied().collect()
}
