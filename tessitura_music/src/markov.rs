// Markov transition model over scale-degree steps.
//
// The random-walk melody strategy moves through the scale one step at a
// time. The step is sampled from a table keyed by signed degree step
// (`-max_jump..=max_jump`). Weights decay geometrically with the size of the
// step, so the walk favours neighbouring degrees over jumps, and the repeat
// step (0) is halved so the line keeps moving.
//
// The table is first-order: after a leap (|step| >= 2), steps in the opposite
// direction get a recovery boost, the usual "leap then step back" contour.
// With no previous step the unconditioned table is used.
//
// Callers can further reweight candidates per sample (the random walk uses
// this for chord-tone bias) through `sample_weighted`.

use std::collections::BTreeMap;

/// Degree step -> unnormalized weight.
pub type TransitionTable = BTreeMap<i8, f64>;

/// Default geometric decay per degree of step size.
pub const DEFAULT_DECAY: f64 = 0.5;

/// Boost applied to contrary steps after a leap.
const LEAP_RECOVERY: f64 = 1.5;

#[derive(Debug, Clone, PartialEq)]
pub struct DegreeStepModel {
    max_jump: u8,
    table: TransitionTable,
}

impl DegreeStepModel {
    /// Model over steps `-max_jump..=max_jump` with the default decay.
    pub fn new(max_jump: u8) -> Self {
        Self::with_decay(max_jump, DEFAULT_DECAY)
    }

    pub fn with_decay(max_jump: u8, decay: f64) -> Self {
        let max_jump = max_jump.clamp(1, 7);
        let mut table = TransitionTable::new();
        for step in -(max_jump as i8)..=(max_jump as i8) {
            let mut weight = decay.powi(step.unsigned_abs() as i32);
            if step == 0 {
                weight *= 0.5;
            }
            table.insert(step, weight);
        }
        DegreeStepModel { max_jump, table }
    }

    pub fn max_jump(&self) -> u8 {
        self.max_jump
    }

    /// Unconditioned weight of a step; 0.0 outside the table.
    pub fn weight(&self, step: i8) -> f64 {
        self.table.get(&step).copied().unwrap_or(0.0)
    }

    pub fn table(&self) -> &TransitionTable {
        &self.table
    }

    /// Transition table given the previous step.
    pub fn conditioned(&self, previous: Option<i8>) -> TransitionTable {
        let mut table = self.table.clone();
        if let Some(prev) = previous.filter(|p| p.unsigned_abs() >= 2) {
            for (&step, weight) in table.iter_mut() {
                if step != 0 && step.signum() == -prev.signum() {
                    *weight *= LEAP_RECOVERY;
                }
            }
        }
        table
    }

    /// Sample a step. `rng_val` is uniform in [0, 1).
    pub fn sample(&self, previous: Option<i8>, rng_val: f64) -> Option<i8> {
        sample_from_table(&self.conditioned(previous), rng_val)
    }

    /// Sample a step after multiplying each weight by `bias(step)`.
    pub fn sample_weighted<F>(&self, previous: Option<i8>, rng_val: f64, bias: F) -> Option<i8>
    where
        F: Fn(i8) -> f64,
    {
        let mut table = self.conditioned(previous);
        for (&step, weight) in table.iter_mut() {
            *weight *= bias(step).max(0.0);
        }
        sample_from_table(&table, rng_val)
    }
}

/// Roulette sample over an unnormalized table. `rng_val` is uniform in
/// [0, 1). Returns None for an empty or all-zero table.
pub fn sample_from_table(table: &TransitionTable, rng_val: f64) -> Option<i8> {
    if table.is_empty() {
        return None;
    }
    let total: f64 = table.values().sum();
    if total <= 0.0 {
        return None;
    }

    let target = rng_val * total;
    let mut cumulative = 0.0;
    for (&step, &weight) in table {
        cumulative += weight;
        if cumulative > target {
            return Some(step);
        }
    }
    // Float rounding can leave target == total.
    table
        .iter()
        .rev()
        .find(|(_, w)| **w > 0.0)
        .map(|(&step, _)| step)
}
