// Genetic-algorithm melody.
//
// Individuals are pitch sequences over the in-range scale pitches; fitness
// is the weighted heuristic from scoring.rs. Each generation keeps the best
// individual unchanged (one elite) and fills the rest of the population with
// children of roulette-selected parents: single-point crossover with
// probability `crossover_rate`, then per-gene mutation to a random scale
// pitch with probability `mutation_rate`.
//
// Termination is bounded: the loop runs at most `generations` times and
// stops early once the best fitness has not improved for `plateau`
// consecutive generations. The best individual ever seen is returned.

use crate::context::GenerationContext;
use crate::error::GenerationError;
use crate::melody::{MelodyOptions, MelodyStrategy};
use crate::score::NoteEvent;
use crate::scoring::{FitnessWeights, MelodyScorer};
use rand::seq::IndexedRandom;
use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Evolution parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GeneticParams {
    pub population: usize,
    /// Hard cap on generations.
    pub generations: usize,
    /// Generations without improvement before stopping early.
    pub plateau: usize,
    pub mutation_rate: f64,
    pub crossover_rate: f64,
    pub weights: FitnessWeights,
}

impl Default for GeneticParams {
    fn default() -> Self {
        GeneticParams {
            population: 40,
            generations: 100,
            plateau: 20,
            mutation_rate: 0.1,
            crossover_rate: 0.7,
            weights: FitnessWeights::default(),
        }
    }
}

/// What a run did, for logging and bound checks.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct GeneticStats {
    pub generations_run: usize,
    pub best_fitness: f64,
    /// Fitness evaluations performed.
    pub evaluations: usize,
}

#[derive(Debug, Clone)]
pub struct Genetic {
    opts: MelodyOptions,
}

struct Scored {
    genes: Vec<u8>,
    fitness: f64,
}

impl Genetic {
    pub fn new(opts: MelodyOptions) -> Self {
        Genetic { opts }
    }

    pub fn params(&self) -> &GeneticParams {
        &self.opts.genetic
    }

    /// Evolve a melody of `length` notes.
    pub fn evolve(
        &self,
        ctx: &GenerationContext,
        length: usize,
        rng: &mut dyn RngCore,
    ) -> Result<(Vec<u8>, GeneticStats), GenerationError> {
        let params = &self.opts.genetic;
        let pool = self.opts.scale_pool(&ctx.key)?;
        let mut stats = GeneticStats::default();
        if length == 0 {
            return Ok((Vec::new(), stats));
        }

        let scorer = MelodyScorer::new(ctx, params.weights, self.opts.note_ticks());
        let size = params.population.max(2);
        let evaluate = |genes: Vec<u8>, stats: &mut GeneticStats| {
            stats.evaluations += 1;
            let fitness = scorer.score(&genes);
            Scored { genes, fitness }
        };

        let mut population: Vec<Scored> = (0..size)
            .map(|_| {
                let genes = random_genes(&pool, length, rng);
                evaluate(genes, &mut stats)
            })
            .collect();

        let mut best = fittest(&population).genes.clone();
        let mut best_fitness = fittest(&population).fitness;
        let mut stale = 0;

        for _ in 0..params.generations {
            let elite = fittest(&population).genes.clone();
            let elite_fitness = fittest(&population).fitness;

            let mut next = Vec::with_capacity(size);
            next.push(Scored {
                genes: elite,
                fitness: elite_fitness,
            });
            while next.len() < size {
                let a = roulette(&population, rng);
                let b = roulette(&population, rng);
                let mut child = if length >= 2 && rng.random_bool(params.crossover_rate) {
                    let point = rng.random_range(1..length);
                    let mut genes = population[a].genes[..point].to_vec();
                    genes.extend_from_slice(&population[b].genes[point..]);
                    genes
                } else {
                    population[a].genes.clone()
                };
                for gene in child.iter_mut() {
                    if rng.random_bool(params.mutation_rate) {
                        if let Some(&pitch) = pool.choose(rng) {
                            *gene = pitch;
                        }
                    }
                }
                next.push(evaluate(child, &mut stats));
            }
            population = next;
            stats.generations_run += 1;

            let leader = fittest(&population);
            if leader.fitness > best_fitness {
                best_fitness = leader.fitness;
                best = leader.genes.clone();
                stale = 0;
            } else {
                stale += 1;
                if stale >= params.plateau {
                    break;
                }
            }
        }

        stats.best_fitness = best_fitness;
        debug!(
            generations = stats.generations_run,
            evaluations = stats.evaluations,
            best_fitness = stats.best_fitness,
            "genetic melody finished"
        );
        Ok((best, stats))
    }
}

fn random_genes(pool: &[u8], length: usize, rng: &mut dyn RngCore) -> Vec<u8> {
    (0..length)
        .map(|_| pool[rng.random_range(0..pool.len())])
        .collect()
}

/// Highest-fitness individual; the earliest wins ties.
fn fittest(population: &[Scored]) -> &Scored {
    let mut best = &population[0];
    for candidate in &population[1..] {
        if candidate.fitness > best.fitness {
            best = candidate;
        }
    }
    best
}

/// Fitness-proportional selection. Falls back to a uniform pick when every
/// fitness is zero.
fn roulette(population: &[Scored], rng: &mut dyn RngCore) -> usize {
    let total: f64 = population.iter().map(|s| s.fitness).sum();
    if total <= 0.0 {
        return rng.random_range(0..population.len());
    }
    let target = rng.random::<f64>() * total;
    let mut cumulative = 0.0;
    for (i, s) in population.iter().enumerate() {
        cumulative += s.fitness;
        if cumulative > target {
            return i;
        }
    }
    population.len() - 1
}

impl MelodyStrategy for Genetic {
    fn name(&self) -> &'static str {
        "genetic"
    }

    fn generate(
        &self,
        ctx: &GenerationContext,
        length: usize,
        rng: &mut dyn RngCore,
    ) -> Result<Vec<NoteEvent>, GenerationError> {
        let (pitches, _) = self.evolve(ctx, length, rng)?;
        self.opts.realize(&pitches, rng)
    }
}
