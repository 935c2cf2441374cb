// Melody generation: the strategy interface and the pieces every strategy
// shares.
//
// A melody strategy turns the generation context plus a note count into a
// sequence of `NoteEvent`s. All built-in strategies lay notes on a fixed grid
// (note i starts at `i * note_ticks`, lasting `note_ticks`), choose pitches
// from the key's scale within the configured range, and consult the chord
// timeline for the chord sounding at each onset. Velocity is a separate
// post-pass (`VelocityCurve`) over the finished pitch sequence.
//
// Strategies:
// - random_walk.rs: Markov random walk over scale-degree steps
// - motif.rs: motif + variation + cadence phrases via the PhraseBuilder
// - genetic.rs: genetic algorithm over pitch sequences
// - mcts.rs: Monte-Carlo rollouts per note position
//
// Strategies are constructed by the registry (registry.rs) from
// `MelodyOptions`; new strategies implement `MelodyStrategy` and register a
// factory under a new name.

use crate::context::GenerationContext;
use crate::error::GenerationError;
use crate::genetic::GeneticParams;
use crate::mcts::MctsParams;
use crate::score::{NoteEvent, TICKS_PER_BEAT};
use crate::theory::Key;
use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};

/// A melody generation strategy.
pub trait MelodyStrategy {
    /// Registry name of the strategy.
    fn name(&self) -> &'static str;

    /// Produce `length` notes against `ctx`, drawing randomness from `rng`.
    fn generate(
        &self,
        ctx: &GenerationContext,
        length: usize,
        rng: &mut dyn RngCore,
    ) -> Result<Vec<NoteEvent>, GenerationError>;
}

/// Grid value of each melody note.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoteValue {
    Whole,
    Half,
    #[default]
    Quarter,
    Eighth,
    Sixteenth,
}

impl NoteValue {
    pub fn ticks(self) -> u32 {
        match self {
            NoteValue::Whole => TICKS_PER_BEAT * 4,
            NoteValue::Half => TICKS_PER_BEAT * 2,
            NoteValue::Quarter => TICKS_PER_BEAT,
            NoteValue::Eighth => TICKS_PER_BEAT / 2,
            NoteValue::Sixteenth => TICKS_PER_BEAT / 4,
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "whole" => Some(NoteValue::Whole),
            "half" => Some(NoteValue::Half),
            "quarter" => Some(NoteValue::Quarter),
            "eighth" => Some(NoteValue::Eighth),
            "sixteenth" => Some(NoteValue::Sixteenth),
            _ => None,
        }
    }
}

/// Velocity shape applied across a melody by note index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VelocityCurve {
    /// Constant 80.
    #[default]
    Flat,
    /// 50 at the ends, 127 in the middle.
    Arch,
    /// 64 up to 127.
    Rising,
    /// 127 down to 64.
    Falling,
    /// Uniform in 60..=120.
    Random,
}

impl VelocityCurve {
    pub const NAMES: [&'static str; 5] = ["flat", "arch", "rising", "falling", "random"];

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "flat" => Some(VelocityCurve::Flat),
            "arch" => Some(VelocityCurve::Arch),
            "rising" => Some(VelocityCurve::Rising),
            "falling" => Some(VelocityCurve::Falling),
            "random" => Some(VelocityCurve::Random),
            _ => None,
        }
    }

    /// Velocities for a sequence of `len` notes. Only `Random` draws from
    /// the rng.
    pub fn apply(self, len: usize, rng: &mut dyn RngCore) -> Vec<u8> {
        let position = |i: usize| {
            if len <= 1 {
                0.0
            } else {
                i as f64 / (len - 1) as f64
            }
        };
        let lerp = |from: f64, to: f64, t: f64| (from + (to - from) * t).round() as u8;

        (0..len)
            .map(|i| match self {
                VelocityCurve::Flat => 80,
                VelocityCurve::Arch => {
                    if len <= 1 {
                        127
                    } else {
                        let t = 1.0 - (2.0 * position(i) - 1.0).abs();
                        lerp(50.0, 127.0, t)
                    }
                }
                VelocityCurve::Rising => lerp(64.0, 127.0, position(i)),
                VelocityCurve::Falling => lerp(127.0, 64.0, position(i)),
                VelocityCurve::Random => rng.random_range(60..=120),
            })
            .collect()
    }
}

/// Options shared by every melody strategy, plus the per-strategy blocks.
#[derive(Debug, Clone, PartialEq)]
pub struct MelodyOptions {
    /// Lowest allowed pitch.
    pub low: u8,
    /// Highest allowed pitch.
    pub high: u8,
    pub note_value: NoteValue,
    pub velocity_curve: VelocityCurve,
    pub channel: u8,
    pub motif_length: usize,
    pub chromatic_probability: f64,
    /// Largest random-walk step, in scale degrees.
    pub max_jump: u8,
    pub genetic: GeneticParams,
    pub mcts: MctsParams,
}

impl Default for MelodyOptions {
    fn default() -> Self {
        MelodyOptions {
            low: 60,
            high: 84,
            note_value: NoteValue::Quarter,
            velocity_curve: VelocityCurve::Flat,
            channel: 0,
            motif_length: 4,
            chromatic_probability: 0.1,
            max_jump: 2,
            genetic: GeneticParams::default(),
            mcts: MctsParams::default(),
        }
    }
}

impl MelodyOptions {
    pub fn note_ticks(&self) -> u32 {
        self.note_value.ticks()
    }

    /// Number of whole notes that fit in the piece.
    pub fn length_for(&self, ctx: &GenerationContext) -> usize {
        (ctx.total_ticks() / self.note_ticks()) as usize
    }

    /// Midpoint of the pitch range.
    pub fn middle(&self) -> u8 {
        ((self.low as u16 + self.high as u16) / 2) as u8
    }

    /// In-scale pitches within the range, ascending. Fails if there are none.
    pub fn scale_pool(&self, key: &Key) -> Result<Vec<u8>, GenerationError> {
        let pool = key.pitches_in_range(self.low, self.high);
        if pool.is_empty() {
            return Err(GenerationError::NoCandidates(format!(
                "no {} scale pitches in range {}..={}",
                key.name(),
                self.low,
                self.high
            )));
        }
        Ok(pool)
    }

    /// Bring a pitch into range by octaves, then to the nearest in-scale
    /// pitch of the range if the range is narrower than an octave.
    pub fn fit_to_range(&self, pitch: u8, key: &Key) -> u8 {
        let mut p = pitch as i32;
        while p > self.high as i32 {
            p -= 12;
        }
        while p < self.low as i32 {
            p += 12;
        }
        if p <= self.high as i32 {
            return p as u8;
        }
        nearest_in(&key.pitches_in_range(self.low, self.high), pitch).unwrap_or(self.low)
    }

    /// Lay `pitches` on the note grid with the configured velocity curve.
    pub fn realize(
        &self,
        pitches: &[u8],
        rng: &mut dyn RngCore,
    ) -> Result<Vec<NoteEvent>, GenerationError> {
        let ticks = self.note_ticks();
        let velocities = self.velocity_curve.apply(pitches.len(), rng);
        pitches
            .iter()
            .zip(velocities)
            .enumerate()
            .map(|(i, (&pitch, velocity))| {
                NoteEvent::new(pitch, velocity, i as u32 * ticks, ticks, self.channel)
            })
            .collect()
    }
}

/// The pitch in `pool` closest to `target`; lower pitch on ties.
pub fn nearest_in(pool: &[u8], target: u8) -> Option<u8> {
    pool.iter()
        .copied()
        .min_by_key(|&p| ((p as i32 - target as i32).abs(), p))
}
