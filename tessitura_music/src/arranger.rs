// The Arranger: drives one composition from resolved preset to output.
//
// States move strictly forward:
//
//   Initialized -> HarmonyResolved -> TracksGenerated -> Assembled
//
// - resolve_harmony: runs the harmony strategy (plus voice leading) and
//   builds the read-only GenerationContext every other generator borrows.
// - generate_tracks: melody, harmony accompaniment, bass, rhythm, in that
//   order, each skipped when its preset section is absent. Any generator
//   error aborts the run, wrapped with the role and strategy name.
// - assemble: sorts each track's events, checks them against the bar grid,
//   pads short tracks so every track ends exactly at the piece length, and
//   produces the Composition.
//
// Calling a step out of order is an AssemblyError::BadTransition. Output is
// only handed to a sink once the state is Assembled.
//
// Rhythm hits pass through `drop_rests` before they become drum notes.
//
// One StdRng seeded from the run's seed is threaded through every generator
// call in the order above, so a (preset, seed) pair always produces the same
// composition.

use crate::bass::derive_bass;
use crate::config::ResolvedPreset;
use crate::context::{ChordTimeline, GenerationContext};
use crate::error::{AssemblyError, Error, GenerationError, Result, Role};
use crate::harmony::{accompaniment, harmonize};
use crate::midi::CompositionSink;
use crate::registry::StrategyRegistry;
use crate::rhythm::{drop_rests, drum_for};
use crate::score::{Composition, NoteEvent, Track, TrackRole};
use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ArrangerState {
    Initialized,
    HarmonyResolved,
    TracksGenerated,
    Assembled,
}

impl ArrangerState {
    pub fn name(self) -> &'static str {
        match self {
            ArrangerState::Initialized => "initialized",
            ArrangerState::HarmonyResolved => "harmony_resolved",
            ArrangerState::TracksGenerated => "tracks_generated",
            ArrangerState::Assembled => "assembled",
        }
    }

    fn next(self) -> Option<ArrangerState> {
        match self {
            ArrangerState::Initialized => Some(ArrangerState::HarmonyResolved),
            ArrangerState::HarmonyResolved => Some(ArrangerState::TracksGenerated),
            ArrangerState::TracksGenerated => Some(ArrangerState::Assembled),
            ArrangerState::Assembled => None,
        }
    }
}

pub struct Arranger<'a> {
    preset: &'a ResolvedPreset,
    registry: &'a StrategyRegistry,
    rng: StdRng,
    state: ArrangerState,
    context: Option<GenerationContext>,
    tracks: Vec<Track>,
    composition: Option<Composition>,
}

impl<'a> Arranger<'a> {
    pub fn new(preset: &'a ResolvedPreset, registry: &'a StrategyRegistry, seed: u64) -> Self {
        info!(seed, "arranger initialized");
        Arranger {
            preset,
            registry,
            rng: StdRng::seed_from_u64(seed),
            state: ArrangerState::Initialized,
            context: None,
            tracks: Vec::new(),
            composition: None,
        }
    }

    pub fn state(&self) -> ArrangerState {
        self.state
    }

    /// The generation context, once harmony is resolved.
    pub fn context(&self) -> Option<&GenerationContext> {
        self.context.as_ref()
    }

    /// Tracks generated so far (empty after `assemble` moves them out).
    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn composition(&self) -> Option<&Composition> {
        self.composition.as_ref()
    }

    pub fn into_composition(self) -> Option<Composition> {
        self.composition
    }

    fn advance(&mut self, to: ArrangerState) -> Result<()> {
        if self.state.next() != Some(to) {
            return Err(AssemblyError::BadTransition {
                from: self.state.name(),
                to: to.name(),
            }
            .into());
        }
        debug!(from = self.state.name(), to = to.name(), "arranger transition");
        self.state = to;
        Ok(())
    }

    fn require(&self, state: ArrangerState, to: ArrangerState) -> Result<()> {
        if self.state != state {
            return Err(AssemblyError::BadTransition {
                from: self.state.name(),
                to: to.name(),
            }
            .into());
        }
        Ok(())
    }

    /// Build the chord timeline and the generation context.
    pub fn resolve_harmony(&mut self) -> Result<&ChordTimeline> {
        self.require(ArrangerState::Initialized, ArrangerState::HarmonyResolved)?;
        let preset = self.preset;
        let settings = &preset.harmony;
        let strategy = self.registry.harmony(&settings.strategy)?;
        let timeline = harmonize(strategy.as_ref(), &settings.request, &mut self.rng)
            .map_err(|source| generation(Role::Harmony, &settings.strategy, source))?;
        info!(
            strategy = %settings.strategy,
            chords = timeline.len(),
            "harmony resolved"
        );

        self.context = Some(GenerationContext {
            key: preset.key,
            tempo_bpm: preset.tempo_bpm,
            bars: preset.bars,
            beats_per_bar: preset.beats_per_bar,
            timeline,
            style: preset.style.clone(),
        });
        self.advance(ArrangerState::HarmonyResolved)?;
        match &self.context {
            Some(ctx) => Ok(&ctx.timeline),
            None => Err(unresolved()),
        }
    }

    /// Run every configured generator, in role order.
    pub fn generate_tracks(&mut self) -> Result<&[Track]> {
        self.require(ArrangerState::HarmonyResolved, ArrangerState::TracksGenerated)?;
        let preset = self.preset;
        let ctx = self.context.as_ref().ok_or_else(unresolved)?;
        let end_tick = ctx.total_ticks();
        let mut tracks = Vec::new();

        if let Some(melody) = &preset.melody {
            let strategy = self.registry.melody(&melody.strategy, &melody.options)?;
            let length = melody.options.length_for(ctx);
            let events = strategy
                .generate(ctx, length, &mut self.rng)
                .map_err(|source| generation(Role::Melody, &melody.strategy, source))?;
            tracks.push(track(
                Role::Melody,
                melody.options.channel,
                melody.program,
                events,
                end_tick,
            ));
        }

        let harmony = &preset.harmony;
        if harmony.emit_track {
            let events = accompaniment(ctx, harmony.comping, harmony.channel)
                .map_err(|source| generation(Role::Harmony, &harmony.strategy, source))?;
            tracks.push(track(
                Role::Harmony,
                harmony.channel,
                harmony.program,
                events,
                end_tick,
            ));
        }

        if let Some(bass) = &preset.bass {
            let events = derive_bass(ctx, &bass.options)
                .map_err(|source| generation(Role::Bass, bass.options.style.name(), source))?;
            tracks.push(track(
                Role::Bass,
                bass.options.channel,
                bass.program,
                events,
                end_tick,
            ));
        }

        if let Some(rhythm) = &preset.rhythm {
            let strategy = self.registry.rhythm(&rhythm.strategy, &rhythm.options)?;
            let hits = strategy
                .generate(ctx, &mut self.rng)
                .map_err(|source| generation(Role::Rhythm, &rhythm.strategy, source))?;
            let hits = drop_rests(hits, rhythm.rest_probability, &mut self.rng);
            let bar = ctx.bar_ticks();
            let events = hits
                .iter()
                .map(|hit| {
                    NoteEvent::new(
                        drum_for(hit.onset % bar),
                        hit.accent,
                        hit.onset,
                        hit.duration,
                        rhythm.channel,
                    )
                })
                .collect::<Result<Vec<_>, GenerationError>>()
                .map_err(|source| generation(Role::Rhythm, &rhythm.strategy, source))?;
            tracks.push(track(
                Role::Rhythm,
                rhythm.channel,
                rhythm.program,
                events,
                end_tick,
            ));
        }

        for t in &tracks {
            info!(track = %t.name, events = t.events.len(), "track generated");
        }
        self.tracks = tracks;
        self.advance(ArrangerState::TracksGenerated)?;
        Ok(&self.tracks)
    }

    /// Validate, pad and package the tracks.
    pub fn assemble(&mut self) -> Result<&Composition> {
        self.require(ArrangerState::TracksGenerated, ArrangerState::Assembled)?;
        let preset = self.preset;
        let expected = crate::score::piece_ticks(preset.bars, preset.beats_per_bar);

        let mut tracks = std::mem::take(&mut self.tracks);
        for t in tracks.iter_mut() {
            t.events.sort_by_key(|e| (e.start, e.pitch));
            for event in &t.events {
                event.validate().map_err(|source| AssemblyError::InvalidEvent {
                    track: t.name.clone(),
                    source,
                })?;
            }
            let last = t.last_event_end();
            if last > expected {
                return Err(AssemblyError::EventPastEnd {
                    track: t.name.clone(),
                    end: last,
                    limit: expected,
                }
                .into());
            }
            if t.end_tick < expected {
                debug!(track = %t.name, from = t.end_tick, to = expected, "padding track");
                t.end_tick = expected;
            }
            if t.duration() != expected {
                return Err(AssemblyError::DurationMismatch {
                    track: t.name.clone(),
                    expected,
                    actual: t.duration(),
                }
                .into());
            }
        }

        let composition = Composition {
            tempo_bpm: preset.tempo_bpm,
            beats_per_bar: preset.beats_per_bar,
            bars: preset.bars,
            tracks,
        };
        info!(
            tracks = composition.tracks.len(),
            ticks = expected,
            seconds = composition.duration_seconds(),
            "composition assembled"
        );
        self.composition = Some(composition);
        self.advance(ArrangerState::Assembled)?;
        self.composition.as_ref().ok_or_else(unresolved)
    }

    /// Hand the assembled composition to a sink.
    pub fn emit(&self, sink: &mut dyn CompositionSink) -> Result<()> {
        match (&self.composition, self.state) {
            (Some(composition), ArrangerState::Assembled) => Ok(sink.write(composition)?),
            _ => Err(AssemblyError::BadTransition {
                from: self.state.name(),
                to: "emitted",
            }
            .into()),
        }
    }

    /// Run every step and return the composition.
    pub fn arrange(mut self) -> Result<Composition> {
        self.resolve_harmony()?;
        self.generate_tracks()?;
        self.assemble()?;
        self.into_composition().ok_or_else(unresolved)
    }
}

/// Resolve and arrange in one call.
pub fn compose(
    preset: &ResolvedPreset,
    registry: &StrategyRegistry,
    seed: u64,
) -> Result<Composition> {
    Arranger::new(preset, registry, seed).arrange()
}

fn generation(role: Role, strategy: &str, source: GenerationError) -> Error {
    Error::Generation {
        role,
        strategy: strategy.to_string(),
        source,
    }
}

/// A step's output was missing even though the state said it ran.
fn unresolved() -> Error {
    AssemblyError::BadTransition {
        from: "unknown",
        to: "unknown",
    }
    .into()
}

fn track(role: Role, channel: u8, program: u8, events: Vec<NoteEvent>, end_tick: u32) -> Track {
    let end = events.iter().map(NoteEvent::end).max().unwrap_or(0);
    Track {
        name: role.as_str().to_string(),
        role: TrackRole::from(role),
        channel,
        program,
        events,
        // Generators that under-produce are padded in `assemble`.
        end_tick: end.min(end_tick),
    }
}
