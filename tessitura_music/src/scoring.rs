// Melody fitness heuristics shared by the genetic and tree-search strategies.
//
// A candidate melody is a pitch sequence laid on the note grid (note i starts
// at i * note_ticks). Three terms, each averaged to [0, 1]:
//
// - consonance: 1.0 for a tone of the chord active at the note's onset, 0.5
//   for another scale tone, 0.0 for anything chromatic.
// - smoothness: 1 - min(|leap|, 12) / 12 per consecutive pair, so steps score
//   near 1 and octave-or-larger leaps score 0.
// - scale: 1.0 in the key's scale, 0.0 otherwise.
//
// Fitness is the weighted sum of the three. `score_window` scores a slice
// that starts mid-melody (the tree search's rollouts) with the note before
// it taken into account for smoothness.

use crate::context::GenerationContext;
use serde::{Deserialize, Serialize};

/// Relative weight of each fitness term.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FitnessWeights {
    pub consonance: f64,
    pub smoothness: f64,
    pub scale: f64,
}

impl Default for FitnessWeights {
    fn default() -> Self {
        FitnessWeights {
            consonance: 0.5,
            smoothness: 0.3,
            scale: 0.2,
        }
    }
}

/// Per-term averages plus the weighted total.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FitnessBreakdown {
    pub consonance: f64,
    pub smoothness: f64,
    pub scale: f64,
    pub total: f64,
}

/// Scores pitch sequences against a generation context.
#[derive(Debug, Clone, Copy)]
pub struct MelodyScorer<'a> {
    ctx: &'a GenerationContext,
    weights: FitnessWeights,
    note_ticks: u32,
}

impl<'a> MelodyScorer<'a> {
    pub fn new(ctx: &'a GenerationContext, weights: FitnessWeights, note_ticks: u32) -> Self {
        MelodyScorer {
            ctx,
            weights,
            note_ticks,
        }
    }

    /// Consonance of `pitch` against the chord sounding at note `index`.
    pub fn consonance(&self, index: usize, pitch: u8) -> f64 {
        let tick = index as u32 * self.note_ticks;
        let chord = self.ctx.chord_at_tick(tick);
        if chord.contains(&self.ctx.key, pitch) {
            1.0
        } else if self.ctx.key.is_in_scale(pitch) {
            0.5
        } else {
            0.0
        }
    }

    pub fn scale(&self, pitch: u8) -> f64 {
        if self.ctx.key.is_in_scale(pitch) { 1.0 } else { 0.0 }
    }

    /// Fitness of a whole melody starting at note 0.
    pub fn score(&self, pitches: &[u8]) -> f64 {
        self.breakdown(0, None, pitches).total
    }

    /// Fitness of `pitches` placed at note `start`, preceded by `previous`.
    pub fn score_window(&self, start: usize, previous: Option<u8>, pitches: &[u8]) -> f64 {
        self.breakdown(start, previous, pitches).total
    }

    pub fn breakdown(&self, start: usize, previous: Option<u8>, pitches: &[u8]) -> FitnessBreakdown {
        if pitches.is_empty() {
            return FitnessBreakdown::default();
        }
        let n = pitches.len() as f64;
        let consonance = pitches
            .iter()
            .enumerate()
            .map(|(i, &p)| self.consonance(start + i, p))
            .sum::<f64>()
            / n;
        let scale = pitches.iter().map(|&p| self.scale(p)).sum::<f64>() / n;

        let mut leaps = Vec::with_capacity(pitches.len());
        if let Some(prev) = previous {
            leaps.push(smoothness(prev, pitches[0]));
        }
        leaps.extend(pitches.windows(2).map(|w| smoothness(w[0], w[1])));
        let smooth = if leaps.is_empty() {
            1.0
        } else {
            leaps.iter().sum::<f64>() / leaps.len() as f64
        };

        let w = &self.weights;
        FitnessBreakdown {
            consonance,
            smoothness: smooth,
            scale,
            total: w.consonance * consonance + w.smoothness * smooth + w.scale * scale,
        }
    }
}

/// Smoothness of one melodic interval, in [0, 1].
pub fn smoothness(from: u8, to: u8) -> f64 {
    let leap = (to as i32 - from as i32).unsigned_abs().min(12);
    1.0 - leap as f64 / 12.0
}
