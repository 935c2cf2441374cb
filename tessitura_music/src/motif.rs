// Structured melody: phrases built from a short motif.
//
// Each phrase draws a fresh motif of `motif_length` scale pitches, weighted
// toward tones of the chord sounding where the phrase begins and toward
// small intervals from the previous motif note. The phrase is then
//
//   motif, motif, motif moved up one scale degree, cadence on the tonic
//
// assembled with the PhraseBuilder (structure.rs). Phrases are appended
// until the buffer holds at least `length` notes, and `build(length)` cuts
// the result to size. Any pitch a transform pushes out of range is folded
// back by octaves.

use crate::context::GenerationContext;
use crate::error::GenerationError;
use crate::melody::{MelodyOptions, MelodyStrategy, nearest_in};
use crate::score::NoteEvent;
use crate::structure::{PhraseBuilder, transpose_in_key};
use rand::RngCore;
use rand::seq::IndexedRandom;

/// Weight of a chord tone relative to other scale tones in a motif draw.
const CHORD_TONE_WEIGHT: f64 = 3.0;

#[derive(Debug, Clone)]
pub struct Structured {
    opts: MelodyOptions,
}

impl Structured {
    pub fn new(opts: MelodyOptions) -> Self {
        Structured { opts }
    }

    /// Draw one motif for a phrase starting at note `start`.
    pub fn draw_motif(
        &self,
        ctx: &GenerationContext,
        start: usize,
        pool: &[u8],
        rng: &mut dyn RngCore,
    ) -> Result<Vec<u8>, GenerationError> {
        let chord = ctx.chord_at_tick(start as u32 * self.opts.note_ticks());
        let mut motif = Vec::with_capacity(self.opts.motif_length);
        let mut previous = self.opts.middle();
        for _ in 0..self.opts.motif_length {
            let &pitch = pool
                .choose_weighted(rng, |&p| {
                    let tone = if chord.contains(&ctx.key, p) {
                        CHORD_TONE_WEIGHT
                    } else {
                        1.0
                    };
                    let distance = (p as i32 - previous as i32).unsigned_abs() as f64;
                    tone / (1.0 + distance / 2.0)
                })
                .map_err(|e| GenerationError::NoCandidates(format!("motif draw: {e}")))?;
            motif.push(pitch);
            previous = pitch;
        }
        Ok(motif)
    }

    /// Pitches of a structured melody of `length` notes.
    pub fn compose(
        &self,
        ctx: &GenerationContext,
        length: usize,
        rng: &mut dyn RngCore,
    ) -> Result<Vec<u8>, GenerationError> {
        let key = ctx.key;
        let pool = self.opts.scale_pool(&key)?;
        if length == 0 {
            return Ok(Vec::new());
        }

        // Cadence octave: the one holding the in-range tonic nearest the middle.
        let tonics: Vec<u8> = pool
            .iter()
            .copied()
            .filter(|&p| key.scale_degree(p) == Some(0))
            .collect();
        let cadence_tonic = nearest_in(&tonics, self.opts.middle())
            .unwrap_or_else(|| key.resolve(0, 4).clamp(0, 127) as u8);
        let cadence_octave = (cadence_tonic as i32 - key.tonic_pc as i32) / 12 - 1;

        let mut builder = PhraseBuilder::new();
        while builder.len() < length {
            let motif = self.draw_motif(ctx, builder.len(), &pool, rng)?;
            builder
                .add_motif(&motif, 2)
                .add_variation(&motif, transpose_in_key(key, 1))
                .add_cadence(&key, cadence_octave);
        }

        Ok(builder
            .build(length)
            .into_iter()
            .map(|p| self.opts.fit_to_range(p, &key))
            .collect())
    }
}

impl MelodyStrategy for Structured {
    fn name(&self) -> &'static str {
        "structured"
    }

    fn generate(
        &self,
        ctx: &GenerationContext,
        length: usize,
        rng: &mut dyn RngCore,
    ) -> Result<Vec<NoteEvent>, GenerationError> {
        let pitches = self.compose(ctx, length, rng)?;
        self.opts.realize(&pitches, rng)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::test_context;
    use crate::theory::{Key, Mode};
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn test_phrase_shape() {
        let ctx = test_context(Key::c_major(), 4);
        let strategy = Structured::new(MelodyOptions::default());
        let mut rng = StdRng::seed_from_u64(5);
        let pitches = strategy.compose(&ctx, 14, &mut rng).unwrap();
        assert_eq!(pitches.len(), 14);
        // Motif stated twice, then the variation, then the cadence.
        assert_eq!(pitches[0..4], pitches[4..8]);
        assert_eq!(pitches[12], 72);
        assert_eq!(pitches[13], 72);
        for i in 0..4 {
            let motif_index = ctx.key.index_of(pitches[i]).unwrap();
            let varied = pitches[8 + i];
            let expected = ctx.key.pitch_at_index(motif_index + 1);
            if expected <= 84 {
                assert_eq!(varied as i32, expected);
            }
        }
    }

    #[test]
    fn test_exact_length_and_range() {
        let ctx = test_context(Key::new(4, Mode::Phrygian), 8);
        let strategy = Structured::new(MelodyOptions {
            motif_length: 3,
            low: 55,
            high: 70,
            ..MelodyOptions::default()
        });
        for length in [0, 1, 7, 32, 33] {
            let mut rng = StdRng::seed_from_u64(length as u64);
            let events = strategy.generate(&ctx, length, &mut rng).unwrap();
            assert_eq!(events.len(), length);
            assert!(events.iter().all(|e| (55..=70).contains(&e.pitch)));
        }
    }

    #[test]
    fn test_motif_favours_chord_tones() {
        let ctx = test_context(Key::c_major(), 1);
        let strategy = Structured::new(MelodyOptions {
            motif_length: 400,
            ..MelodyOptions::default()
        });
        let mut rng = StdRng::seed_from_u64(21);
        let pool = ctx.key.pitches_in_range(60, 84);
        let motif = strategy.draw_motif(&ctx, 0, &pool, &mut rng).unwrap();
        let chord = ctx.timeline.chord_at_bar(0);
        let tones = motif.iter().filter(|&&p| chord.contains(&ctx.key, p)).count();
        // Three of seven pitch classes are chord tones; weighting pushes the
        // share well above 3/7.
        assert!(tones * 2 > motif.len(), "{tones} of {}", motif.len());
    }
}
