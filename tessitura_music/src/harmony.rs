// Harmony generation: the chord timeline, voice leading, and the
// accompaniment track realized from it.
//
// A harmony strategy turns a `HarmonyRequest` (key, bar count, progression,
// chord rate, voicing) into a `ChordTimeline`. Three built-ins:
//
// - progression: cycle the named progression, one chord every
//   `bars_per_chord` bars; the last chord is clipped to the bar count.
// - functional: tonic / subdominant / dominant / tonic cycles, with the
//   subdominant (ii or IV) and dominant (V or vii) chosen at random, ending
//   on I.
// - diatonic: random diatonic triads with no immediate repeats, ending on an
//   authentic V-I cadence.
// - hybrid: the named progression over the first `split_ratio` of the bars
//   (rounded down), diatonic chords over the rest. Each part is built as a
//   piece of its own, so the diatonic tail ends on its own cadence.
//
// Voice leading runs after the strategy (`harmonize`). For each chord after
// the first it tries every inversion and an octave shift of -1, 0 or +1,
// keeping the option with the least voice movement from the previous
// (already re-voiced) chord. Ties keep root position, then the smaller
// shift. Movement between two chords pairs voices in sorted order when both
// have the same number of voices, and otherwise measures each new voice to
// its nearest old voice.
//
// `accompaniment` realizes the timeline as block chords, one per entry, or
// re-attacked on the hits of a comping pattern.

use crate::context::{Chord, ChordTimeline, GenerationContext, TimelineEntry, Voicing};
use crate::error::GenerationError;
use crate::rhythm::{RhythmPattern, tile_pattern};
use crate::score::{NoteEvent, bar_ticks};
use crate::theory::{Key, PROGRESSIONS, Progression, diatonic_triad};
use rand::{Rng, RngCore};
use tracing::debug;

/// Velocity of sustained block chords.
const BLOCK_VELOCITY: u8 = 72;

/// Everything a harmony strategy needs to build a timeline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HarmonyRequest {
    pub key: Key,
    pub bars: u32,
    pub progression: &'static Progression,
    pub bars_per_chord: u32,
    pub voicing: Voicing,
    pub voice_leading: bool,
    pub extensions: bool,
    /// Octave the chords are voiced around.
    pub octave: i32,
    /// Share of the bars the hybrid strategy gives to the progression.
    pub split_ratio: f64,
}

impl HarmonyRequest {
    /// Defaults: pop_basic, one chord per bar, close voicing with voice
    /// leading, octave 4.
    pub fn new(key: Key, bars: u32) -> Self {
        HarmonyRequest {
            key,
            bars,
            progression: &PROGRESSIONS[0],
            bars_per_chord: 1,
            voicing: Voicing::Close,
            voice_leading: true,
            extensions: false,
            octave: 4,
            split_ratio: 0.7,
        }
    }

    /// Number of chords needed to cover the piece.
    pub fn chord_count(&self) -> u32 {
        self.bars.div_ceil(self.bars_per_chord.max(1))
    }

    /// Bar where the hybrid strategy hands over to diatonic chords.
    pub fn split_bar(&self) -> u32 {
        (self.bars as f64 * self.split_ratio.clamp(0.0, 1.0)).floor() as u32
    }

    /// Lay `chords` on consecutive slots of `bars_per_chord` bars, clipping
    /// the final slot to the bar count.
    pub fn timeline(&self, chords: &[Chord]) -> Result<ChordTimeline, GenerationError> {
        let per = self.bars_per_chord.max(1);
        let entries = chords
            .iter()
            .enumerate()
            .map(|(i, &chord)| {
                let start_bar = i as u32 * per;
                TimelineEntry {
                    chord,
                    start_bar,
                    duration_bars: per.min(self.bars.saturating_sub(start_bar)),
                }
            })
            .collect();
        ChordTimeline::new(
            self.key,
            self.voicing,
            self.extensions,
            self.octave,
            entries,
            self.bars,
        )
    }
}

/// A harmony generation strategy.
pub trait HarmonyStrategy {
    fn name(&self) -> &'static str;

    fn generate(
        &self,
        request: &HarmonyRequest,
        rng: &mut dyn RngCore,
    ) -> Result<ChordTimeline, GenerationError>;
}

/// Cycles the requested named progression.
#[derive(Debug, Clone, Default)]
pub struct ProgressionHarmony;

impl HarmonyStrategy for ProgressionHarmony {
    fn name(&self) -> &'static str {
        "progression"
    }

    fn generate(
        &self,
        request: &HarmonyRequest,
        _rng: &mut dyn RngCore,
    ) -> Result<ChordTimeline, GenerationError> {
        let steps = request.progression.steps;
        if steps.is_empty() {
            return Err(GenerationError::NoCandidates(format!(
                "progression '{}' has no chords",
                request.progression.name
            )));
        }
        let chords: Vec<Chord> = (0..request.chord_count() as usize)
            .map(|i| {
                let (degree, quality) = steps[i % steps.len()];
                Chord::new(degree, quality)
            })
            .collect();
        request.timeline(&chords)
    }
}

/// Tonic-subdominant-dominant-tonic cycles.
#[derive(Debug, Clone, Default)]
pub struct FunctionalHarmony;

impl HarmonyStrategy for FunctionalHarmony {
    fn name(&self) -> &'static str {
        "functional"
    }

    fn generate(
        &self,
        request: &HarmonyRequest,
        rng: &mut dyn RngCore,
    ) -> Result<ChordTimeline, GenerationError> {
        let count = request.chord_count() as usize;
        let mut degrees: Vec<u8> = (0..count)
            .map(|i| match i % 4 {
                1 => {
                    if rng.random_bool(0.5) {
                        1
                    } else {
                        3
                    }
                }
                2 => {
                    if rng.random_bool(0.5) {
                        4
                    } else {
                        6
                    }
                }
                _ => 0,
            })
            .collect();
        if let Some(last) = degrees.last_mut() {
            *last = 0;
        }
        let chords: Vec<Chord> = degrees
            .iter()
            .map(|&d| Chord::new(d, diatonic_triad(&request.key, d)))
            .collect();
        request.timeline(&chords)
    }
}

/// Random diatonic triads with a closing V-I.
#[derive(Debug, Clone, Default)]
pub struct DiatonicHarmony;

impl HarmonyStrategy for DiatonicHarmony {
    fn name(&self) -> &'static str {
        "diatonic"
    }

    fn generate(
        &self,
        request: &HarmonyRequest,
        rng: &mut dyn RngCore,
    ) -> Result<ChordTimeline, GenerationError> {
        let count = request.chord_count() as usize;
        let mut degrees: Vec<u8> = Vec::with_capacity(count);
        for i in 0..count {
            let degree = if i + 1 == count {
                0
            } else if count >= 2 && i + 2 == count {
                4
            } else if i == 0 {
                0
            } else {
                let previous = degrees[i - 1];
                let before_cadence = count >= 3 && i + 3 == count;
                let options: Vec<u8> = (1..7)
                    .filter(|&d| d != previous && !(before_cadence && d == 4))
                    .collect();
                options[rng.random_range(0..options.len())]
            };
            degrees.push(degree);
        }
        let chords: Vec<Chord> = degrees
            .iter()
            .map(|&d| Chord::new(d, diatonic_triad(&request.key, d)))
            .collect();
        request.timeline(&chords)
    }
}

/// A named progression followed by random diatonic chords.
#[derive(Debug, Clone, Default)]
pub struct HybridHarmony;

impl HarmonyStrategy for HybridHarmony {
    fn name(&self) -> &'static str {
        "hybrid"
    }

    fn generate(
        &self,
        request: &HarmonyRequest,
        rng: &mut dyn RngCore,
    ) -> Result<ChordTimeline, GenerationError> {
        let split = request.split_bar();
        let mut entries = Vec::new();
        if split > 0 {
            let head = HarmonyRequest {
                bars: split,
                ..*request
            };
            entries.extend_from_slice(ProgressionHarmony.generate(&head, rng)?.entries());
        }
        if split < request.bars {
            let tail = HarmonyRequest {
                bars: request.bars - split,
                ..*request
            };
            let timeline = DiatonicHarmony.generate(&tail, rng)?;
            entries.extend(timeline.entries().iter().map(|e| TimelineEntry {
                start_bar: e.start_bar + split,
                ..*e
            }));
        }
        ChordTimeline::new(
            request.key,
            request.voicing,
            request.extensions,
            request.octave,
            entries,
            request.bars,
        )
    }
}

/// Run a strategy and apply voice leading if the request asks for it.
pub fn harmonize(
    strategy: &dyn HarmonyStrategy,
    request: &HarmonyRequest,
    rng: &mut dyn RngCore,
) -> Result<ChordTimeline, GenerationError> {
    let mut timeline = strategy.generate(request, rng)?;
    if request.voice_leading {
        let before = total_movement(&timeline);
        apply_voice_leading(&mut timeline);
        debug!(
            strategy = strategy.name(),
            before,
            after = total_movement(&timeline),
            "voice leading applied"
        );
    }
    Ok(timeline)
}

/// Re-voice every chord after the first to minimize movement.
pub fn apply_voice_leading(timeline: &mut ChordTimeline) {
    let key = timeline.key;
    let (octave, voicing, extensions) = (timeline.octave, timeline.voicing, timeline.extensions);
    let voiced = |chord: &Chord| chord.pitches(&key, octave, voicing, extensions);

    let entries = timeline.entries_mut();
    for i in 1..entries.len() {
        let previous = voiced(&entries[i - 1].chord);
        let base = entries[i].chord;
        let voices = voiced(&Chord {
            inversion: 0,
            octave_shift: 0,
            ..base
        })
        .len();

        let mut best = base;
        let mut best_movement = u32::MAX;
        for inversion in 0..voices.max(1) as u8 {
            for shift in [0i8, -1, 1] {
                let candidate = Chord {
                    inversion,
                    octave_shift: shift,
                    ..base
                };
                let pitches = voiced(&candidate);
                if pitches.is_empty() {
                    continue;
                }
                let movement = voice_movement(&previous, &pitches);
                if movement < best_movement {
                    best = candidate;
                    best_movement = movement;
                }
            }
        }
        entries[i].chord = best;
    }
}

/// Semitone movement from one voicing to the next.
pub fn voice_movement(from: &[u8], to: &[u8]) -> u32 {
    let mut a = from.to_vec();
    let mut b = to.to_vec();
    a.sort_unstable();
    b.sort_unstable();
    if a.len() == b.len() {
        return a
            .iter()
            .zip(&b)
            .map(|(&x, &y)| (x as i32 - y as i32).unsigned_abs())
            .sum();
    }
    b.iter()
        .map(|&y| {
            a.iter()
                .map(|&x| (x as i32 - y as i32).unsigned_abs())
                .min()
                .unwrap_or(0)
        })
        .sum()
}

/// Summed voice movement across every chord change of the timeline.
pub fn total_movement(timeline: &ChordTimeline) -> u32 {
    let voiced: Vec<Vec<u8>> = timeline.entries().iter().map(|e| timeline.voiced(e)).collect();
    voiced.windows(2).map(|w| voice_movement(&w[0], &w[1])).sum()
}

/// Realize the timeline as accompaniment notes.
///
/// Without a comping pattern every entry is one sustained block chord.
/// With one, the chord sounding at each pattern hit is re-attacked for the
/// hit's duration, at three quarters of the hit's accent.
pub fn accompaniment(
    ctx: &GenerationContext,
    comping: Option<&RhythmPattern>,
    channel: u8,
) -> Result<Vec<NoteEvent>, GenerationError> {
    let timeline = &ctx.timeline;
    let bar = bar_ticks(ctx.beats_per_bar);
    let mut events = Vec::new();
    match comping {
        None => {
            for entry in timeline.entries() {
                let start = entry.start_bar * bar;
                let duration = entry.duration_bars * bar;
                for pitch in timeline.voiced(entry) {
                    events.push(NoteEvent::new(pitch, BLOCK_VELOCITY, start, duration, channel)?);
                }
            }
        }
        Some(pattern) => {
            for hit in tile_pattern(pattern, ctx.beats_per_bar, ctx.bars) {
                let entry = timeline.entry_at_bar(hit.onset / bar);
                let velocity = (hit.accent as u16 * 3 / 4) as u8;
                for pitch in timeline.voiced(entry) {
                    events.push(NoteEvent::new(pitch, velocity, hit.onset, hit.duration, channel)?);
                }
            }
        }
    }
    Ok(events)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rhythm::pattern;
    use crate::theory::{ChordQuality, Mode, progression};
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn pop_request(bars: u32, voice_leading: bool) -> HarmonyRequest {
        HarmonyRequest {
            voice_leading,
            ..HarmonyRequest::new(Key::c_major(), bars)
        }
    }

    #[test]
    fn test_progression_cycles_and_clips() {
        let mut request = pop_request(10, false);
        request.bars_per_chord = 3;
        let mut rng = StdRng::seed_from_u64(0);
        let tl = ProgressionHarmony.generate(&request, &mut rng).unwrap();
        let degrees: Vec<u8> = tl.entries().iter().map(|e| e.chord.degree).collect();
        assert_eq!(degrees, vec![0, 4, 5, 3]);
        let lengths: Vec<u32> = tl.entries().iter().map(|e| e.duration_bars).collect();
        assert_eq!(lengths, vec![3, 3, 3, 1]);
        assert_eq!(tl.total_bars(), 10);

        let request = pop_request(6, false);
        let tl = ProgressionHarmony.generate(&request, &mut rng).unwrap();
        let degrees: Vec<u8> = tl.entries().iter().map(|e| e.chord.degree).collect();
        assert_eq!(degrees, vec![0, 4, 5, 3, 0, 4]);
    }

    #[test]
    fn test_voice_leading_reduces_movement_for_pop_basic() {
        let mut rng = StdRng::seed_from_u64(0);
        let plain = harmonize(&ProgressionHarmony, &pop_request(4, false), &mut rng).unwrap();
        let led = harmonize(&ProgressionHarmony, &pop_request(4, true), &mut rng).unwrap();
        assert_eq!(total_movement(&plain), 37);
        assert_eq!(total_movement(&led), 9);
        // The first chord is untouched and roots are unchanged.
        assert_eq!(led.entries()[0].chord, plain.entries()[0].chord);
        for (a, b) in plain.entries().iter().zip(led.entries()) {
            assert_eq!(a.chord.degree, b.chord.degree);
        }
    }

    #[test]
    fn test_voice_leading_steps_beat_root_position() {
        let mut rng = StdRng::seed_from_u64(1);
        for name in ["pop_basic", "jazz_251", "blues_basic", "complex_cycle"] {
            for voicing in [Voicing::Close, Voicing::Open] {
                let mut request = pop_request(8, true);
                request.progression = progression(name).unwrap();
                request.voicing = voicing;
                let led = harmonize(&ProgressionHarmony, &request, &mut rng).unwrap();
                let entries = led.entries();
                for i in 1..entries.len() {
                    let previous = led.voiced(&entries[i - 1]);
                    let chosen = led.voiced(&entries[i]);
                    let root = TimelineEntry {
                        chord: Chord {
                            inversion: 0,
                            octave_shift: 0,
                            ..entries[i].chord
                        },
                        ..entries[i]
                    };
                    assert!(
                        voice_movement(&previous, &chosen)
                            <= voice_movement(&previous, &led.voiced(&root)),
                        "{name} {voicing:?} chord {i}"
                    );
                }
            }
        }
    }

    #[test]
    fn test_voice_leading_prefers_root_position_on_ties() {
        let key = Key::c_major();
        let chord = Chord::new(0, ChordQuality::Major);
        let entries = vec![
            TimelineEntry {
                chord,
                start_bar: 0,
                duration_bars: 1,
            },
            TimelineEntry {
                chord,
                start_bar: 1,
                duration_bars: 1,
            },
        ];
        let mut tl = ChordTimeline::new(key, Voicing::Close, false, 4, entries, 2).unwrap();
        apply_voice_leading(&mut tl);
        assert_eq!(tl.entries()[1].chord, chord);
    }

    #[test]
    fn test_functional_shape() {
        let request = HarmonyRequest::new(Key::new(9, Mode::Minor), 8);
        let mut rng = StdRng::seed_from_u64(5);
        let tl = FunctionalHarmony.generate(&request, &mut rng).unwrap();
        let degrees: Vec<u8> = tl.entries().iter().map(|e| e.chord.degree).collect();
        assert_eq!(degrees.len(), 8);
        assert_eq!(degrees[0], 0);
        assert!(matches!(degrees[1], 1 | 3));
        assert!(matches!(degrees[2], 4 | 6));
        assert_eq!(degrees[4], 0);
        assert_eq!(*degrees.last().unwrap(), 0);
        // Qualities are diatonic to A minor: i is minor.
        assert_eq!(tl.entries()[0].chord.quality, ChordQuality::Minor);
    }

    #[test]
    fn test_diatonic_ends_with_authentic_cadence() {
        for seed in 0..10 {
            let request = HarmonyRequest::new(Key::c_major(), 9);
            let mut rng = StdRng::seed_from_u64(seed);
            let tl = DiatonicHarmony.generate(&request, &mut rng).unwrap();
            let degrees: Vec<u8> = tl.entries().iter().map(|e| e.chord.degree).collect();
            assert_eq!(degrees[0], 0);
            assert_eq!(&degrees[7..], &[4, 0]);
            for w in degrees.windows(2) {
                assert_ne!(w[0], w[1], "{degrees:?}");
            }
        }
        let mut rng = StdRng::seed_from_u64(0);
        let short = DiatonicHarmony
            .generate(&HarmonyRequest::new(Key::c_major(), 2), &mut rng)
            .unwrap();
        let degrees: Vec<u8> = short.entries().iter().map(|e| e.chord.degree).collect();
        assert_eq!(degrees, vec![4, 0]);
    }

    #[test]
    fn test_hybrid_splits_progression_and_diatonic() {
        let mut rng = StdRng::seed_from_u64(4);
        let tl = HybridHarmony
            .generate(&pop_request(10, false), &mut rng)
            .unwrap();
        let degrees: Vec<u8> = tl.entries().iter().map(|e| e.chord.degree).collect();
        // Seven bars of pop_basic, then a three-chord diatonic tail.
        assert_eq!(degrees, vec![0, 4, 5, 3, 0, 4, 5, 0, 4, 0]);
        assert_eq!(tl.total_bars(), 10);

        let mut request = pop_request(5, false);
        request.bars_per_chord = 2;
        request.split_ratio = 0.5;
        let tl = HybridHarmony.generate(&request, &mut rng).unwrap();
        let spans: Vec<(u32, u32)> = tl
            .entries()
            .iter()
            .map(|e| (e.start_bar, e.duration_bars))
            .collect();
        assert_eq!(spans, vec![(0, 2), (2, 2), (4, 1)]);
        assert_eq!(tl.entries()[1].chord.degree, 4);
    }

    #[test]
    fn test_hybrid_split_extremes() {
        let mut rng = StdRng::seed_from_u64(0);
        let mut request = pop_request(4, false);
        request.split_ratio = 1.0;
        let all_progression = HybridHarmony.generate(&request, &mut rng).unwrap();
        let plain = ProgressionHarmony.generate(&request, &mut rng).unwrap();
        assert_eq!(all_progression.entries(), plain.entries());

        request.split_ratio = 0.0;
        let all_diatonic = HybridHarmony.generate(&request, &mut rng).unwrap();
        let degrees: Vec<u8> = all_diatonic.entries().iter().map(|e| e.chord.degree).collect();
        assert_eq!(degrees[0], 0);
        assert_eq!(&degrees[2..], &[4, 0]);
    }

    #[test]
    fn test_block_and_comped_accompaniment() {
        let mut ctx = crate::context::test_context(Key::c_major(), 2);
        let block = accompaniment(&ctx, None, 1).unwrap();
        assert_eq!(block.len(), 6);
        assert!(block.iter().all(|e| e.duration == 1920 && e.channel == 1));
        assert_eq!(block[0].pitch, 60);

        ctx.timeline = ProgressionHarmony
            .generate(&pop_request(2, false), &mut StdRng::seed_from_u64(0))
            .unwrap();
        let comped = accompaniment(&ctx, Some(pattern("steady_quarters").unwrap()), 1).unwrap();
        assert_eq!(comped.len(), 2 * 4 * 3);
        assert_eq!(comped[0].velocity, 82);
        assert!(comped.iter().all(|e| e.end() <= 2 * 1920));
    }
}
