// Rhythm generation: onset/duration/accent patterns, independent of pitch.
//
// A named pattern is one 4/4 bar of (onset, duration) pairs in ticks. It is
// tiled across each bar of the piece (repeated inside bars longer than four
// beats, cut at the bar line in shorter ones). Accents come from metric
// position: 110 on the downbeat, 90 on other beats, 75 off the beat.
//
// Swing delays every off-beat eighth (onset half a beat past a beat) by
// `round(swing * TICKS_PER_BEAT / 4)` ticks and shortens it by the same
// amount, so note ends stay on the grid. At 0.67 that is 80 ticks, close to
// a triplet shuffle.
//
// Strategies:
// - pattern: the configured pattern, plain.
// - groove: a style's pattern with accents jittered by up to
//   `accent_jitter`, onsets untouched.
// - random: each bar filled exactly with eighth, quarter, dotted-quarter and
//   half durations.
// - hybrid: the first half of the bars (rounded down) from the pattern (the
//   style's pattern when one is set), the rest filled like `random`.
//
// The Arranger turns hits into percussion notes with `drum_for`, after
// `drop_rests` has removed each hit with the configured rest probability.
// The harmony accompaniment can re-attack chords on a pattern's hits.

use crate::context::GenerationContext;
use crate::error::{ConfigError, GenerationError};
use crate::score::{TICKS_PER_BEAT, bar_ticks};
use rand::seq::IndexedRandom;
use rand::{Rng, RngCore};
use std::ops::Range;

/// Ticks covered by one pattern bar (4/4).
pub const PATTERN_TICKS: u32 = 4 * TICKS_PER_BEAT;

pub const DOWNBEAT_ACCENT: u8 = 110;
pub const BEAT_ACCENT: u8 = 90;
pub const OFFBEAT_ACCENT: u8 = 75;

/// General MIDI percussion channel (10, zero-based).
pub const PERCUSSION_CHANNEL: u8 = 9;
pub const KICK: u8 = 36;
pub const SNARE: u8 = 38;
pub const CLOSED_HAT: u8 = 42;

/// A fixed onset template for one 4/4 bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RhythmPattern {
    pub name: &'static str,
    /// (onset, duration) in ticks from the bar start, ascending.
    pub hits: &'static [(u32, u32)],
}

/// Built-in patterns.
pub const PATTERNS: &[RhythmPattern] = &[
    RhythmPattern {
        name: "steady_quarters",
        hits: &[(0, 480), (480, 480), (960, 480), (1440, 480)],
    },
    RhythmPattern {
        name: "steady_eighths",
        hits: &[
            (0, 240),
            (240, 240),
            (480, 240),
            (720, 240),
            (960, 240),
            (1200, 240),
            (1440, 240),
            (1680, 240),
        ],
    },
    RhythmPattern {
        name: "half_quarter",
        hits: &[(0, 960), (960, 480), (1440, 480)],
    },
    RhythmPattern {
        name: "syncopated_8",
        hits: &[(0, 240), (240, 480), (720, 240), (960, 240), (1200, 480), (1680, 240)],
    },
    RhythmPattern {
        name: "syncopated_16",
        hits: &[
            (0, 240),
            (360, 240),
            (600, 120),
            (720, 240),
            (960, 240),
            (1320, 240),
            (1560, 120),
            (1680, 240),
        ],
    },
    RhythmPattern {
        name: "anticipation",
        hits: &[(0, 480), (480, 480), (960, 720), (1680, 240)],
    },
    RhythmPattern {
        name: "rock_beat",
        hits: &[(0, 480), (480, 240), (720, 240), (960, 480), (1440, 240), (1680, 240)],
    },
    RhythmPattern {
        name: "disco",
        hits: &[
            (0, 240),
            (240, 120),
            (360, 120),
            (480, 240),
            (720, 120),
            (840, 120),
            (960, 240),
            (1200, 120),
            (1320, 120),
            (1440, 240),
            (1680, 120),
            (1800, 120),
        ],
    },
    RhythmPattern {
        name: "hip_hop",
        hits: &[
            (0, 240),
            (360, 120),
            (480, 480),
            (960, 120),
            (1080, 120),
            (1200, 240),
            (1440, 480),
        ],
    },
    RhythmPattern {
        name: "house",
        hits: &[
            (0, 120),
            (240, 240),
            (480, 120),
            (720, 240),
            (960, 120),
            (1200, 240),
            (1440, 120),
            (1680, 240),
        ],
    },
    RhythmPattern {
        name: "swing_eighths",
        hits: &[
            (0, 320),
            (320, 160),
            (480, 320),
            (800, 160),
            (960, 320),
            (1280, 160),
            (1440, 320),
            (1760, 160),
        ],
    },
    RhythmPattern {
        name: "jazz_comp",
        hits: &[(0, 360), (720, 240), (1200, 240), (1680, 240)],
    },
    RhythmPattern {
        name: "bossa_nova",
        hits: &[(0, 360), (360, 360), (720, 240), (960, 360), (1320, 360), (1680, 240)],
    },
    RhythmPattern {
        name: "samba",
        hits: &[
            (0, 120),
            (240, 120),
            (360, 120),
            (480, 120),
            (720, 120),
            (840, 120),
            (960, 120),
            (1200, 120),
            (1320, 120),
            (1440, 120),
            (1680, 120),
            (1800, 120),
        ],
    },
    RhythmPattern {
        name: "salsa",
        hits: &[(0, 360), (360, 360), (720, 480), (1200, 240), (1440, 480)],
    },
    RhythmPattern {
        name: "techno",
        hits: &[
            (0, 240),
            (240, 240),
            (480, 240),
            (720, 240),
            (960, 240),
            (1200, 240),
            (1440, 240),
            (1680, 120),
            (1800, 120),
        ],
    },
    RhythmPattern {
        name: "trance",
        hits: &[
            (0, 120),
            (120, 120),
            (240, 120),
            (360, 120),
            (480, 120),
            (600, 120),
            (720, 120),
            (840, 120),
            (960, 120),
            (1080, 120),
            (1200, 120),
            (1320, 120),
            (1440, 120),
            (1560, 120),
            (1680, 120),
            (1800, 120),
        ],
    },
    RhythmPattern {
        name: "dubstep",
        hits: &[(0, 720), (720, 240), (960, 960)],
    },
];

/// Look up a pattern by name.
pub fn pattern(name: &str) -> Result<&'static RhythmPattern, ConfigError> {
    PATTERNS
        .iter()
        .find(|p| p.name == name)
        .ok_or_else(|| ConfigError::UnknownPattern(name.to_string()))
}

/// Named groove styles, each mapped to a pattern family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Style {
    Rock,
    Disco,
    HipHop,
    House,
    Techno,
    Trance,
    Jazz,
    Bossa,
    Samba,
    Salsa,
    Dubstep,
}

impl Style {
    pub const ALL: [Style; 11] = [
        Style::Rock,
        Style::Disco,
        Style::HipHop,
        Style::House,
        Style::Techno,
        Style::Trance,
        Style::Jazz,
        Style::Bossa,
        Style::Samba,
        Style::Salsa,
        Style::Dubstep,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Style::Rock => "rock",
            Style::Disco => "disco",
            Style::HipHop => "hiphop",
            Style::House => "house",
            Style::Techno => "techno",
            Style::Trance => "trance",
            Style::Jazz => "jazz",
            Style::Bossa => "bossa",
            Style::Samba => "samba",
            Style::Salsa => "salsa",
            Style::Dubstep => "dubstep",
        }
    }

    pub fn from_name(name: &str) -> Result<Style, ConfigError> {
        Style::ALL
            .into_iter()
            .find(|s| s.name() == name)
            .ok_or_else(|| ConfigError::UnknownStyle(name.to_string()))
    }

    fn pattern_name(self) -> &'static str {
        match self {
            Style::Rock => "rock_beat",
            Style::Disco => "disco",
            Style::HipHop => "hip_hop",
            Style::House => "house",
            Style::Techno => "techno",
            Style::Trance => "trance",
            Style::Jazz => "swing_eighths",
            Style::Bossa => "bossa_nova",
            Style::Samba => "samba",
            Style::Salsa => "salsa",
            Style::Dubstep => "dubstep",
        }
    }

    /// The style's pattern.
    pub fn pattern(self) -> &'static RhythmPattern {
        let name = self.pattern_name();
        PATTERNS
            .iter()
            .find(|p| p.name == name)
            .unwrap_or(&PATTERNS[0])
    }
}

/// One rhythmic onset: absolute onset and duration in ticks, accent velocity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RhythmHit {
    pub onset: u32,
    pub duration: u32,
    pub accent: u8,
}

/// Metric accent for an onset measured from its bar start.
pub fn base_accent(onset_in_bar: u32) -> u8 {
    if onset_in_bar == 0 {
        DOWNBEAT_ACCENT
    } else if onset_in_bar % TICKS_PER_BEAT == 0 {
        BEAT_ACCENT
    } else {
        OFFBEAT_ACCENT
    }
}

/// Repeat a pattern over `bars` bars of `beats_per_bar` beats.
pub fn tile_pattern(pattern: &RhythmPattern, beats_per_bar: u8, bars: u32) -> Vec<RhythmHit> {
    let bar = bar_ticks(beats_per_bar);
    let mut hits = Vec::new();
    for b in 0..bars {
        let bar_start = b * bar;
        let mut offset = 0;
        while offset < bar {
            for &(onset, duration) in pattern.hits {
                let in_bar = offset + onset;
                if in_bar >= bar {
                    break;
                }
                let duration = duration.min(bar - in_bar);
                hits.push(RhythmHit {
                    onset: bar_start + in_bar,
                    duration,
                    accent: base_accent(in_bar),
                });
            }
            offset += PATTERN_TICKS;
        }
    }
    hits
}

/// Swing delay in ticks for a swing factor in [0, 1].
pub fn swing_delay(swing: f64) -> u32 {
    (swing.clamp(0.0, 1.0) * TICKS_PER_BEAT as f64 / 4.0).round() as u32
}

/// Delay off-beat eighths by the swing amount, keeping their ends fixed.
pub fn apply_swing(hits: &mut [RhythmHit], swing: f64) {
    let delay = swing_delay(swing);
    if delay == 0 {
        return;
    }
    for hit in hits.iter_mut() {
        if hit.onset % TICKS_PER_BEAT == TICKS_PER_BEAT / 2 {
            let shift = delay.min(hit.duration.saturating_sub(1));
            hit.onset += shift;
            hit.duration -= shift;
        }
    }
}

/// Drop each hit with probability `rest_probability`. Draws nothing from
/// the rng when the probability is zero.
pub fn drop_rests(
    hits: Vec<RhythmHit>,
    rest_probability: f64,
    rng: &mut dyn RngCore,
) -> Vec<RhythmHit> {
    if rest_probability <= 0.0 {
        return hits;
    }
    let p = rest_probability.min(1.0);
    hits.into_iter().filter(|_| !rng.random_bool(p)).collect()
}

/// General MIDI drum for a hit at `onset_in_bar`: kick on the downbeat,
/// snare on beats 2 and 4, closed hi-hat elsewhere.
pub fn drum_for(onset_in_bar: u32) -> u8 {
    if onset_in_bar == 0 {
        KICK
    } else if onset_in_bar % TICKS_PER_BEAT == 0 && matches!(onset_in_bar / TICKS_PER_BEAT, 1 | 3)
    {
        SNARE
    } else {
        CLOSED_HAT
    }
}

/// Resolved rhythm configuration handed to strategy factories.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RhythmOptions {
    pub pattern: &'static RhythmPattern,
    pub style: Option<Style>,
}

impl Default for RhythmOptions {
    fn default() -> Self {
        RhythmOptions {
            pattern: &PATTERNS[0],
            style: None,
        }
    }
}

/// A rhythm generation strategy.
pub trait RhythmStrategy {
    fn name(&self) -> &'static str;

    /// Hits covering the whole piece, ascending by onset.
    fn generate(
        &self,
        ctx: &GenerationContext,
        rng: &mut dyn RngCore,
    ) -> Result<Vec<RhythmHit>, GenerationError>;
}

/// The configured pattern, tiled and swung.
#[derive(Debug, Clone)]
pub struct PatternRhythm {
    pattern: &'static RhythmPattern,
}

impl PatternRhythm {
    pub fn new(opts: &RhythmOptions) -> Self {
        PatternRhythm {
            pattern: opts.pattern,
        }
    }
}

impl RhythmStrategy for PatternRhythm {
    fn name(&self) -> &'static str {
        "pattern"
    }

    fn generate(
        &self,
        ctx: &GenerationContext,
        _rng: &mut dyn RngCore,
    ) -> Result<Vec<RhythmHit>, GenerationError> {
        let mut hits = tile_pattern(self.pattern, ctx.beats_per_bar, ctx.bars);
        apply_swing(&mut hits, ctx.style.swing);
        Ok(hits)
    }
}

/// A style's pattern with randomized accents.
#[derive(Debug, Clone)]
pub struct GrooveRhythm {
    pattern: &'static RhythmPattern,
}

impl GrooveRhythm {
    pub fn new(opts: &RhythmOptions) -> Self {
        GrooveRhythm {
            pattern: opts.style.map(Style::pattern).unwrap_or(opts.pattern),
        }
    }
}

impl RhythmStrategy for GrooveRhythm {
    fn name(&self) -> &'static str {
        "groove"
    }

    fn generate(
        &self,
        ctx: &GenerationContext,
        rng: &mut dyn RngCore,
    ) -> Result<Vec<RhythmHit>, GenerationError> {
        let mut hits = tile_pattern(self.pattern, ctx.beats_per_bar, ctx.bars);
        let jitter = ctx.style.accent_jitter as i32;
        if jitter > 0 {
            for hit in hits.iter_mut() {
                let offset = rng.random_range(-jitter..=jitter);
                hit.accent = (hit.accent as i32 + offset).clamp(1, 127) as u8;
            }
        }
        apply_swing(&mut hits, ctx.style.swing);
        Ok(hits)
    }
}

/// Bars filled with randomly chosen note lengths.
#[derive(Debug, Clone, Default)]
pub struct RandomRhythm;

const RANDOM_DURATIONS: [u32; 4] = [
    TICKS_PER_BEAT / 2,
    TICKS_PER_BEAT,
    TICKS_PER_BEAT * 3 / 2,
    TICKS_PER_BEAT * 2,
];

/// Fill each bar in `bars` exactly with random note lengths.
fn fill_bars(
    bar: u32,
    bars: Range<u32>,
    rng: &mut dyn RngCore,
) -> Result<Vec<RhythmHit>, GenerationError> {
    let mut hits = Vec::new();
    for b in bars {
        let mut position = 0;
        while position < bar {
            let remaining = bar - position;
            let fitting: Vec<u32> = RANDOM_DURATIONS
                .iter()
                .copied()
                .filter(|&d| d <= remaining)
                .collect();
            let &duration = fitting.choose(rng).ok_or_else(|| {
                GenerationError::NoCandidates(format!("{remaining} ticks left in bar {b}"))
            })?;
            hits.push(RhythmHit {
                onset: b * bar + position,
                duration,
                accent: base_accent(position),
            });
            position += duration;
        }
    }
    Ok(hits)
}

impl RhythmStrategy for RandomRhythm {
    fn name(&self) -> &'static str {
        "random"
    }

    fn generate(
        &self,
        ctx: &GenerationContext,
        rng: &mut dyn RngCore,
    ) -> Result<Vec<RhythmHit>, GenerationError> {
        let mut hits = fill_bars(ctx.bar_ticks(), 0..ctx.bars, rng)?;
        apply_swing(&mut hits, ctx.style.swing);
        Ok(hits)
    }
}

/// A pattern for the first half of the piece, random fills for the rest.
#[derive(Debug, Clone)]
pub struct HybridRhythm {
    pattern: &'static RhythmPattern,
}

impl HybridRhythm {
    pub fn new(opts: &RhythmOptions) -> Self {
        HybridRhythm {
            pattern: opts.style.map(Style::pattern).unwrap_or(opts.pattern),
        }
    }
}

impl RhythmStrategy for HybridRhythm {
    fn name(&self) -> &'static str {
        "hybrid"
    }

    fn generate(
        &self,
        ctx: &GenerationContext,
        rng: &mut dyn RngCore,
    ) -> Result<Vec<RhythmHit>, GenerationError> {
        let split = ctx.bars / 2;
        let bar = ctx.bar_ticks();
        let mut hits: Vec<RhythmHit> = tile_pattern(self.pattern, ctx.beats_per_bar, split);
        hits.extend(fill_bars(bar, split..ctx.bars, rng)?);
        apply_swing(&mut hits, ctx.style.swing);
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::test_context;
    use crate::theory::Key;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn test_patterns_fit_one_bar() {
        for p in PATTERNS {
            assert!(!p.hits.is_empty(), "{}", p.name);
            for w in p.hits.windows(2) {
                assert!(w[0].0 < w[1].0, "{} not ascending", p.name);
                assert!(w[0].0 + w[0].1 <= w[1].0, "{} overlaps", p.name);
            }
            for &(onset, duration) in p.hits {
                assert!(duration > 0 && onset + duration <= PATTERN_TICKS, "{}", p.name);
            }
        }
        for style in Style::ALL {
            assert_eq!(Style::from_name(style.name()).unwrap(), style);
            assert!(pattern(style.pattern().name).is_ok());
        }
        assert!(matches!(pattern("polka"), Err(ConfigError::UnknownPattern(_))));
        assert!(matches!(Style::from_name("polka"), Err(ConfigError::UnknownStyle(_))));
    }

    #[test]
    fn test_steady_quarters_accents() {
        let hits = tile_pattern(pattern("steady_quarters").unwrap(), 4, 2);
        assert_eq!(hits.len(), 8);
        let accents: Vec<u8> = hits.iter().map(|h| h.accent).collect();
        assert_eq!(accents, vec![110, 90, 90, 90, 110, 90, 90, 90]);
        assert_eq!(hits[4].onset, 1920);
    }

    #[test]
    fn test_tiling_clips_short_bars_and_repeats_long_ones() {
        let p = pattern("half_quarter").unwrap();
        // 3/4: the half note and the quarter on beat 3 fit; beat 4 is cut.
        let three = tile_pattern(p, 3, 1);
        assert_eq!(three.len(), 2);
        assert!(three.iter().all(|h| h.onset + h.duration <= 1440));
        // 6/4: the pattern restarts after four beats.
        let six = tile_pattern(p, 6, 1);
        assert_eq!(six.len(), 4);
        assert_eq!(six[3].onset, 1920);
        assert_eq!(six[3].duration, 960);
    }

    #[test]
    fn test_swing_delays_offbeat_eighths() {
        assert_eq!(swing_delay(0.67), 80);
        assert_eq!(swing_delay(0.0), 0);

        let mut straight = tile_pattern(pattern("steady_eighths").unwrap(), 4, 1);
        let grid = straight.clone();
        apply_swing(&mut straight, 0.0);
        assert_eq!(straight, grid);

        let mut swung = grid.clone();
        apply_swing(&mut swung, 0.67);
        for (before, after) in grid.iter().zip(&swung) {
            if before.onset % 480 == 240 {
                assert_eq!(after.onset, before.onset + 80);
                assert_eq!(after.duration, 160);
            } else {
                assert_eq!(after, before);
            }
            assert_eq!(after.onset + after.duration, before.onset + before.duration);
        }
    }

    #[test]
    fn test_groove_preserves_onsets() {
        let mut ctx = test_context(Key::c_major(), 4);
        ctx.style.accent_jitter = 12;
        let opts = RhythmOptions {
            style: Some(Style::Bossa),
            ..RhythmOptions::default()
        };
        let groove = GrooveRhythm::new(&opts);
        let mut rng = StdRng::seed_from_u64(3);
        let hits = groove.generate(&ctx, &mut rng).unwrap();
        let plain = tile_pattern(Style::Bossa.pattern(), 4, 4);
        assert_eq!(hits.len(), plain.len());
        for (h, p) in hits.iter().zip(&plain) {
            assert_eq!(h.onset, p.onset);
            assert!((h.accent as i32 - p.accent as i32).abs() <= 12);
            assert!((1..=127).contains(&h.accent));
        }
    }

    #[test]
    fn test_random_rhythm_fills_bars_exactly() {
        let ctx = test_context(Key::c_major(), 6);
        let mut rng = StdRng::seed_from_u64(17);
        let hits = RandomRhythm.generate(&ctx, &mut rng).unwrap();
        let total: u32 = hits.iter().map(|h| h.duration).sum();
        assert_eq!(total, 6 * 1920);
        for w in hits.windows(2) {
            assert_eq!(w[0].onset + w[0].duration, w[1].onset);
        }
    }

    #[test]
    fn test_hybrid_pattern_then_random() {
        let ctx = test_context(Key::c_major(), 5);
        let hybrid = HybridRhythm::new(&RhythmOptions::default());
        let mut rng = StdRng::seed_from_u64(9);
        let hits = hybrid.generate(&ctx, &mut rng).unwrap();
        let split = 2 * 1920;
        let (head, tail): (Vec<RhythmHit>, Vec<RhythmHit>) =
            hits.into_iter().partition(|h| h.onset < split);
        assert_eq!(head, tile_pattern(pattern("steady_quarters").unwrap(), 4, 2));
        assert_eq!(tail[0].onset, split);
        assert_eq!(tail.iter().map(|h| h.duration).sum::<u32>(), 3 * 1920);
        for w in tail.windows(2) {
            assert_eq!(w[0].onset + w[0].duration, w[1].onset);
        }

        // A single bar is all random fill.
        let one = test_context(Key::c_major(), 1);
        let hits = hybrid.generate(&one, &mut rng).unwrap();
        assert_eq!(hits.iter().map(|h| h.duration).sum::<u32>(), 1920);
    }

    #[test]
    fn test_rests_drop_hits() {
        let hits = tile_pattern(pattern("steady_eighths").unwrap(), 4, 16);
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(drop_rests(hits.clone(), 0.0, &mut rng), hits);
        assert!(drop_rests(hits.clone(), 1.0, &mut rng).is_empty());

        let kept = drop_rests(hits.clone(), 0.5, &mut rng);
        assert!(kept.len() > 16 && kept.len() < 112, "{}", kept.len());
        assert!(kept.iter().all(|h| hits.contains(h)));
        let again = drop_rests(hits.clone(), 0.5, &mut StdRng::seed_from_u64(1));
        let first = drop_rests(hits, 0.5, &mut StdRng::seed_from_u64(1));
        assert_eq!(again, first);
    }

    #[test]
    fn test_jazz_style_swings_eighths() {
        assert_eq!(Style::Jazz.pattern().name, "swing_eighths");
        assert_eq!(Style::Bossa.pattern().name, "bossa_nova");
    }

    #[test]
    fn test_drum_mapping() {
        assert_eq!(drum_for(0), KICK);
        assert_eq!(drum_for(480), SNARE);
        assert_eq!(drum_for(960), CLOSED_HAT);
        assert_eq!(drum_for(1440), SNARE);
        assert_eq!(drum_for(240), CLOSED_HAT);
    }
}
