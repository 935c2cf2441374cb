// Monte-Carlo tree-search melody.
//
// The melody is built one note at a time. At each position the candidate
// next pitches are the in-range scale pitches within `max_leap` semitones of
// the previous note, capped at the MAX_CANDIDATES nearest it (for the first
// note: chord tones nearest the middle of the range). Every candidate is evaluated by `rollouts` random playouts of
// `min(rollout_depth, notes remaining)` further notes, each scored with the
// same heuristic as the genetic strategy (scoring.rs) over the candidate
// plus its playout. The candidate with the best mean score is kept; ties go
// to the lower pitch.
//
// Work is bounded: at most `length * MAX_CANDIDATES * rollouts` playouts.

use crate::context::GenerationContext;
use crate::error::GenerationError;
use crate::melody::{MelodyOptions, MelodyStrategy, nearest_in};
use crate::score::NoteEvent;
use crate::scoring::{FitnessWeights, MelodyScorer};
use rand::RngCore;
use rand::seq::IndexedRandom;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Upper bound on candidates expanded per position.
pub const MAX_CANDIDATES: usize = 16;

/// Candidates for the opening note.
const OPENING_CANDIDATES: usize = 4;

/// Search parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MctsParams {
    /// Playouts per candidate.
    pub rollouts: usize,
    /// Notes simulated past the candidate.
    pub rollout_depth: usize,
    /// Largest leap between consecutive notes, in semitones.
    pub max_leap: u8,
    pub weights: FitnessWeights,
}

impl Default for MctsParams {
    fn default() -> Self {
        MctsParams {
            rollouts: 16,
            rollout_depth: 4,
            max_leap: 7,
            weights: FitnessWeights::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MctsStats {
    pub rollouts_run: usize,
    pub positions: usize,
    /// Largest candidate set seen at any position.
    pub widest: usize,
}

#[derive(Debug, Clone)]
pub struct TreeSearch {
    opts: MelodyOptions,
}

impl TreeSearch {
    pub fn new(opts: MelodyOptions) -> Self {
        TreeSearch { opts }
    }

    pub fn params(&self) -> &MctsParams {
        &self.opts.mcts
    }

    pub fn search(
        &self,
        ctx: &GenerationContext,
        length: usize,
        rng: &mut dyn RngCore,
    ) -> Result<(Vec<u8>, MctsStats), GenerationError> {
        let params = &self.opts.mcts;
        let pool = self.opts.scale_pool(&ctx.key)?;
        let scorer = MelodyScorer::new(ctx, params.weights, self.opts.note_ticks());
        let mut stats = MctsStats::default();
        let mut melody: Vec<u8> = Vec::with_capacity(length);

        for position in 0..length {
            let previous = melody.last().copied();
            let candidates = match previous {
                None => self.opening_candidates(ctx, &pool),
                Some(prev) => self.step_candidates(&pool, prev),
            };
            stats.widest = stats.widest.max(candidates.len());

            let depth = params.rollout_depth.min(length - position - 1);
            let mut best: Option<(u8, f64)> = None;
            for &candidate in &candidates {
                let mut total = 0.0;
                for _ in 0..params.rollouts {
                    let playout = self.playout(&pool, candidate, depth, rng);
                    total += scorer.score_window(position, previous, &playout);
                    stats.rollouts_run += 1;
                }
                let mean = total / params.rollouts.max(1) as f64;
                if best.is_none_or(|(_, score)| mean > score) {
                    best = Some((candidate, mean));
                }
            }

            let chosen = match best {
                Some((pitch, _)) => pitch,
                None => {
                    return Err(GenerationError::NoCandidates(format!(
                        "no tree-search candidates at note {position}"
                    )));
                }
            };
            melody.push(chosen);
            stats.positions += 1;
        }

        debug!(
            positions = stats.positions,
            rollouts = stats.rollouts_run,
            widest = stats.widest,
            "tree-search melody finished"
        );
        Ok((melody, stats))
    }

    /// Chord tones of the opening chord nearest the middle of the range.
    fn opening_candidates(&self, ctx: &GenerationContext, pool: &[u8]) -> Vec<u8> {
        let chord = ctx.chord_at_tick(0);
        let mut tones: Vec<u8> = pool
            .iter()
            .copied()
            .filter(|&p| chord.contains(&ctx.key, p))
            .collect();
        if tones.is_empty() {
            tones = pool.to_vec();
        }
        let middle = self.opts.middle() as i32;
        tones.sort_by_key(|&p| ((p as i32 - middle).abs(), p));
        tones.truncate(OPENING_CANDIDATES);
        tones.sort_unstable();
        tones
    }

    /// The `MAX_CANDIDATES` in-range scale pitches within `max_leap` of
    /// `previous` that lie nearest it, ascending. Falls back to the nearest
    /// scale pitch when the leap limit excludes all.
    fn step_candidates(&self, pool: &[u8], previous: u8) -> Vec<u8> {
        let max_leap = self.opts.mcts.max_leap as i32;
        let mut candidates: Vec<u8> = pool
            .iter()
            .copied()
            .filter(|&p| (p as i32 - previous as i32).abs() <= max_leap)
            .collect();
        if candidates.is_empty() {
            debug!(previous, max_leap, "no candidate within leap limit, using nearest");
            candidates.extend(nearest_in(pool, previous));
        }
        if candidates.len() > MAX_CANDIDATES {
            candidates.sort_by_key(|&p| ((p as i32 - previous as i32).abs(), p));
            candidates.truncate(MAX_CANDIDATES);
            candidates.sort_unstable();
        }
        candidates
    }

    /// `candidate` followed by `depth` random leap-limited steps.
    fn playout(&self, pool: &[u8], candidate: u8, depth: usize, rng: &mut dyn RngCore) -> Vec<u8> {
        let mut notes = Vec::with_capacity(depth + 1);
        notes.push(candidate);
        let mut current = candidate;
        for _ in 0..depth {
            let options = self.step_candidates(pool, current);
            match options.choose(rng) {
                Some(&next) => {
                    notes.push(next);
                    current = next;
                }
                None => break,
            }
        }
        notes
    }
}

impl MelodyStrategy for TreeSearch {
    fn name(&self) -> &'static str {
        "mcts"
    }

    fn generate(
        &self,
        ctx: &GenerationContext,
        length: usize,
        rng: &mut dyn RngCore,
    ) -> Result<Vec<NoteEvent>, GenerationError> {
        let (pitches, _) = self.search(ctx, length, rng)?;
        self.opts.realize(&pitches, rng)
    }
}
