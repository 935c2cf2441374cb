// Random-walk melody: a Markov walk over scale degrees.
//
// The walk's state is an absolute degree index in the key (see
// `Key::index_of`). Each note samples a step from the `DegreeStepModel`,
// with candidates that land on a tone of the chord sounding at that onset
// weighted up by `CHORD_TONE_BIAS`. Steps that would leave the pitch range
// are resampled up to `MAX_RESAMPLES` times; after that the target is
// clamped to the nearest in-range degree, which is never farther from the
// current degree than the sampled step was.
//
// With probability `chromatic_probability` a note is instead a chromatic
// passing tone: the out-of-scale semitone neighbour of the current pitch.
// The degree state does not move for a passing tone, so the next scale step
// is still measured from the last scale note.
//
// The walk starts on the tonic nearest the middle of the range.

use crate::context::GenerationContext;
use crate::error::GenerationError;
use crate::markov::DegreeStepModel;
use crate::melody::{MelodyOptions, MelodyStrategy, nearest_in};
use crate::score::NoteEvent;
use crate::theory::Key;
use rand::{Rng, RngCore};
use tracing::debug;

/// Out-of-range resamples before clamping.
pub const MAX_RESAMPLES: usize = 8;

/// Weight multiplier for steps landing on a chord tone.
pub const CHORD_TONE_BIAS: f64 = 1.5;

/// One note of a walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WalkStep {
    pub pitch: u8,
    /// Degree index of the walk state after this note.
    pub index: i32,
    /// Degree step taken from the previous state (0 for passing tones).
    pub step: i32,
    /// True for a chromatic passing tone.
    pub chromatic: bool,
    /// True if the step was clamped after exhausting resamples.
    pub clamped: bool,
}

#[derive(Debug, Clone)]
pub struct RandomWalk {
    opts: MelodyOptions,
    model: DegreeStepModel,
}

impl RandomWalk {
    pub fn new(opts: MelodyOptions) -> Self {
        let model = DegreeStepModel::new(opts.max_jump);
        RandomWalk { opts, model }
    }

    pub fn model(&self) -> &DegreeStepModel {
        &self.model
    }

    /// Run the walk, returning every note with its step bookkeeping.
    pub fn walk(
        &self,
        ctx: &GenerationContext,
        length: usize,
        rng: &mut dyn RngCore,
    ) -> Result<Vec<WalkStep>, GenerationError> {
        let key = ctx.key;
        let pool = self.opts.scale_pool(&key)?;
        let mut steps = Vec::with_capacity(length);
        if length == 0 {
            return Ok(steps);
        }

        let indices: Vec<i32> = pool.iter().filter_map(|&p| key.index_of(p)).collect();
        let (lo, hi) = match (indices.first(), indices.last()) {
            (Some(&lo), Some(&hi)) => (lo, hi),
            _ => return Err(GenerationError::NoCandidates("empty degree range".into())),
        };

        let tonics: Vec<u8> = pool
            .iter()
            .copied()
            .filter(|&p| key.scale_degree(p) == Some(0))
            .collect();
        let start = nearest_in(&tonics, self.opts.middle())
            .or_else(|| nearest_in(&pool, self.opts.middle()))
            .unwrap_or(pool[0]);
        let mut state = key.index_of(start).unwrap_or(lo);
        steps.push(WalkStep {
            pitch: start,
            index: state,
            step: 0,
            chromatic: false,
            clamped: false,
        });

        let note_ticks = self.opts.note_ticks();
        let mut previous_step: Option<i8> = None;

        for i in 1..length {
            let chord = ctx.chord_at_tick(i as u32 * note_ticks);
            let current = key.pitch_at_index(state);

            if rng.random::<f64>() < self.opts.chromatic_probability {
                if let Some(pitch) = self.passing_tone(&key, current, rng) {
                    steps.push(WalkStep {
                        pitch,
                        index: state,
                        step: 0,
                        chromatic: true,
                        clamped: false,
                    });
                    continue;
                }
            }

            let bias = |step: i8| {
                let target = key.pitch_at_index(state + step as i32);
                if (0..=127).contains(&target) && chord.contains(&key, target as u8) {
                    CHORD_TONE_BIAS
                } else {
                    1.0
                }
            };

            let mut chosen = None;
            let mut last_step = 0i32;
            for _ in 0..MAX_RESAMPLES {
                let step = self
                    .model
                    .sample_weighted(previous_step, rng.random::<f64>(), bias)
                    .unwrap_or(0) as i32;
                last_step = step;
                if (lo..=hi).contains(&(state + step)) {
                    chosen = Some(step);
                    break;
                }
            }

            let (step, clamped) = match chosen {
                Some(step) => (step, false),
                None => {
                    let target = (state + last_step).clamp(lo, hi);
                    debug!(
                        note = i,
                        sampled = last_step,
                        clamped_to = target - state,
                        "random walk exhausted resamples, clamping to range"
                    );
                    (target - state, true)
                }
            };

            state += step;
            previous_step = Some(step as i8);
            steps.push(WalkStep {
                pitch: key.pitch_at_index(state) as u8,
                index: state,
                step,
                chromatic: false,
                clamped,
            });
        }

        Ok(steps)
    }

    /// An out-of-scale semitone neighbour of `pitch` inside the range.
    fn passing_tone(&self, key: &Key, pitch: i32, rng: &mut dyn RngCore) -> Option<u8> {
        let order = if rng.random_bool(0.5) { [1, -1] } else { [-1, 1] };
        order
            .iter()
            .map(|d| pitch + d)
            .filter(|&p| p >= self.opts.low as i32 && p <= self.opts.high as i32)
            .map(|p| p as u8)
            .find(|&p| !key.is_in_scale(p))
    }
}

impl MelodyStrategy for RandomWalk {
    fn name(&self) -> &'static str {
        "random"
    }

    fn generate(
        &self,
        ctx: &GenerationContext,
        length: usize,
        rng: &mut dyn RngCore,
    ) -> Result<Vec<NoteEvent>, GenerationError> {
        let pitches: Vec<u8> = self.walk(ctx, length, rng)?.iter().map(|s| s.pitch).collect();
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

    fn walker(max_jump: u8, chromatic: f64) -> RandomWalk {
        RandomWalk::new(MelodyOptions {
            max_jump,
            chromatic_probability: chromatic,
            ..MelodyOptions::default()
        })
    }

    #[test]
    fn test_steps_never_exceed_max_jump() {
        let ctx = test_context(Key::new(2, Mode::Dorian), 8);
        for max_jump in 1..=4 {
            let walk = walker(max_jump, 0.2);
            for seed in 0..20 {
                let mut rng = StdRng::seed_from_u64(seed);
                let steps = walk.walk(&ctx, 64, &mut rng).unwrap();
                assert_eq!(steps.len(), 64);
                for s in steps.iter().filter(|s| !s.chromatic) {
                    assert!(s.step.unsigned_abs() <= max_jump as u32, "{s:?}");
                }
                // Consecutive scale notes differ by at most max_jump degrees.
                let scale_notes: Vec<&WalkStep> = steps.iter().filter(|s| !s.chromatic).collect();
                for pair in scale_notes.windows(2) {
                    assert!((pair[1].index - pair[0].index).unsigned_abs() <= max_jump as u32);
                }
            }
        }
    }

    #[test]
    fn test_walk_stays_in_range_and_starts_on_tonic() {
        let ctx = test_context(Key::c_major(), 4);
        let walk = walker(3, 0.3);
        let mut rng = StdRng::seed_from_u64(7);
        let steps = walk.walk(&ctx, 200, &mut rng).unwrap();
        assert_eq!(steps[0].pitch, 72);
        assert!(steps.iter().all(|s| (60..=84).contains(&s.pitch)));
        for s in &steps {
            assert_eq!(s.chromatic, !ctx.key.is_in_scale(s.pitch));
        }
    }

    #[test]
    fn test_no_chromatic_tones_at_zero_probability() {
        let ctx = test_context(Key::c_major(), 4);
        let walk = walker(2, 0.0);
        let mut rng = StdRng::seed_from_u64(3);
        let events = walk.generate(&ctx, 16, &mut rng).unwrap();
        assert_eq!(events.len(), 16);
        assert!(events.iter().all(|e| ctx.key.is_in_scale(e.pitch)));
        assert_eq!(events[15].start, 15 * 480);
    }

    #[test]
    fn test_narrow_range_clamps_instead_of_failing() {
        let ctx = test_context(Key::c_major(), 2);
        let walk = RandomWalk::new(MelodyOptions {
            low: 60,
            high: 62,
            max_jump: 4,
            chromatic_probability: 0.0,
            ..MelodyOptions::default()
        });
        let mut rng = StdRng::seed_from_u64(11);
        let steps = walk.walk(&ctx, 50, &mut rng).unwrap();
        assert!(steps.iter().all(|s| s.pitch == 60 || s.pitch == 62));
    }

    #[test]
    fn test_same_seed_same_walk() {
        let ctx = test_context(Key::new(7, Mode::Mixolydian), 4);
        let walk = walker(2, 0.1);
        let a = walk.generate(&ctx, 32, &mut StdRng::seed_from_u64(99)).unwrap();
        let b = walk.generate(&ctx, 32, &mut StdRng::seed_from_u64(99)).unwrap();
        assert_eq!(a, b);
    }
}
