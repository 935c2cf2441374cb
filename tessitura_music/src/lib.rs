// Tessitura: procedural multi-track music generation.
//
// Produces a melody, harmonic accompaniment, bass line and percussion track
// from a named style preset. Each role is served by an interchangeable
// strategy looked up by name in a registry, so presets pick algorithms
// without the arranger knowing their types.
//
// Architecture:
// - error.rs: Error taxonomy (config, generation, assembly, sink)
// - theory.rs: Keys, modes, chord qualities, named progressions
// - score.rs: Tick grid, NoteEvent, Track, Composition
// - context.rs: Chords, voicings, the chord timeline, GenerationContext
// - structure.rs: PhraseBuilder and motif transforms
// - markov.rs: Degree-step Markov model for melodic motion
// - scoring.rs: Melody fitness heuristic shared by genetic and MCTS
// - melody.rs: MelodyStrategy trait, note values, velocity curves
// - random_walk.rs, motif.rs, genetic.rs, mcts.rs: melody strategies
// - harmony.rs: Harmony strategies, voice leading, accompaniment
// - rhythm.rs: Patterns, styles, swing, rhythm strategies
// - bass.rs: Bass line derived from the timeline
// - registry.rs: Name -> strategy factory tables
// - config.rs: JSON presets, validation and resolution
// - arranger.rs: State machine that builds the Composition
// - midi.rs: Composition sinks and SMF encoding
//
// Every random choice draws from one seeded StdRng passed down explicitly,
// so output is deterministic given a preset and seed.

pub mod arranger;
pub mod bass;
pub mod config;
pub mod context;
pub mod error;
pub mod genetic;
pub mod harmony;
pub mod markov;
pub mod mcts;
pub mod melody;
pub mod midi;
pub mod motif;
pub mod random_walk;
pub mod registry;
pub mod rhythm;
pub mod score;
pub mod scoring;
pub mod structure;
pub mod theory;

pub use arranger::{Arranger, ArrangerState, compose};
pub use config::{Preset, ResolvedPreset};
pub use error::{Error, Result};
pub use registry::StrategyRegistry;
pub use score::Composition;
