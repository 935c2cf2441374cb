// Style presets: the JSON mapping that drives a composition.
//
// A `Preset` mirrors the JSON one to one. Every field has a default, so an
// empty object is a valid preset (16 bars of C major with harmony only).
// Unknown keys are rejected (`deny_unknown_fields`) so a typo surfaces as a
// config error instead of being silently ignored. Integer fields are
// deserialized as wide types and range-checked in `resolve`, so an
// out-of-range value is reported as `OutOfRange` naming the parameter.
//
// `Preset::resolve` turns names into typed values (key, progression,
// patterns, strategy names checked against the registry) and validates
// every numeric range. Nothing is generated until this succeeds.
//
// Role sections are optional: a missing `melody`, `bass` or `rhythm` means
// no such track. A missing `harmony` means no harmony track, but the chord
// timeline is still built from the default progression since melody and
// bass follow it.
//
// See also: `arranger.rs` which consumes `ResolvedPreset`, `registry.rs`
// for strategy names, and `presets/*.json` for the bundled presets.

use crate::bass::{BassOptions, BassStyle};
use crate::context::{StyleParams, Voicing};
use crate::error::{ConfigError, Role};
use crate::genetic::GeneticParams;
use crate::harmony::HarmonyRequest;
use crate::mcts::MctsParams;
use crate::melody::{MelodyOptions, NoteValue, VelocityCurve};
use crate::registry::StrategyRegistry;
use crate::rhythm::{RhythmOptions, RhythmPattern, Style, pattern};
use crate::theory::{Key, progression};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

/// Presets shipped with the crate, by name.
pub const BUILTIN_PRESETS: &[(&str, &str)] = &[
    ("pop", include_str!("../presets/pop.json")),
    ("jazz", include_str!("../presets/jazz.json")),
    ("rock", include_str!("../presets/rock.json")),
    ("blues", include_str!("../presets/blues.json")),
    ("ambient", include_str!("../presets/ambient.json")),
    ("bossa", include_str!("../presets/bossa.json")),
    ("techno", include_str!("../presets/techno.json")),
];

// ---------------------------------------------------------------------------
// Raw preset
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Preset {
    /// Free-form text shown by `--list`.
    pub description: Option<String>,
    /// Beats per minute, 1..=400.
    pub tempo: u32,
    /// Key name, long ("D_DORIAN") or short ("F#m") form.
    pub key: String,
    /// Seed for the composition's rng. Overridden by the CLI `--seed`.
    pub seed: Option<u64>,
    pub structure: StructureConfig,
    pub melody: Option<MelodyConfig>,
    pub harmony: Option<HarmonyConfig>,
    pub bass: Option<BassConfig>,
    pub rhythm: Option<RhythmConfig>,
}

impl Default for Preset {
    fn default() -> Self {
        Preset {
            description: None,
            tempo: 120,
            key: "C_MAJOR".to_string(),
            seed: None,
            structure: StructureConfig::default(),
            melody: None,
            harmony: None,
            bass: None,
            rhythm: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StructureConfig {
    pub bars: u32,
    pub beats_per_bar: u32,
}

impl Default for StructureConfig {
    fn default() -> Self {
        StructureConfig {
            bars: 16,
            beats_per_bar: 4,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MelodyConfig {
    pub strategy: String,
    pub velocity_curve: String,
    pub program: u32,
    pub channel: u32,
    pub motif_length: u32,
    pub chromatic_probability: f64,
    /// Largest random-walk step, in scale degrees.
    pub max_jump: u32,
    pub note_value: String,
    /// [low, high] MIDI pitches.
    pub range: [u32; 2],
    pub genetic: GeneticParams,
    pub mcts: MctsParams,
}

impl Default for MelodyConfig {
    fn default() -> Self {
        MelodyConfig {
            strategy: "structured".to_string(),
            velocity_curve: "flat".to_string(),
            program: 0,
            channel: 0,
            motif_length: 4,
            chromatic_probability: 0.1,
            max_jump: 2,
            note_value: "quarter".to_string(),
            range: [60, 84],
            genetic: GeneticParams::default(),
            mcts: MctsParams::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HarmonyConfig {
    pub strategy: String,
    pub progression: String,
    pub voicing: String,
    pub voice_leading: bool,
    /// Open voicing adds the 9th to seventh chords.
    pub extensions: bool,
    pub bars_per_chord: u32,
    pub octave: i32,
    pub program: u32,
    pub channel: u32,
    /// Rhythm pattern to re-attack chords on; sustained block chords if unset.
    pub comping: Option<String>,
    /// Share of the bars the hybrid strategy gives to the progression.
    pub split_ratio: f64,
}

impl Default for HarmonyConfig {
    fn default() -> Self {
        HarmonyConfig {
            strategy: "progression".to_string(),
            progression: "pop_basic".to_string(),
            voicing: "close".to_string(),
            voice_leading: true,
            extensions: false,
            bars_per_chord: 1,
            octave: 4,
            program: 0,
            channel: 1,
            comping: None,
            split_ratio: 0.7,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BassConfig {
    pub style: String,
    pub octave: i32,
    pub program: u32,
    pub channel: u32,
}

impl Default for BassConfig {
    fn default() -> Self {
        BassConfig {
            style: "root".to_string(),
            octave: 2,
            program: 33,
            channel: 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RhythmConfig {
    /// Defaults to "groove" when a style is given, else "pattern".
    pub strategy: Option<String>,
    pub pattern: String,
    pub style: Option<String>,
    pub swing: f64,
    pub accent_jitter: u32,
    /// Chance that any single hit is dropped as a rest.
    pub rest_probability: f64,
    pub channel: u32,
    pub program: u32,
}

impl Default for RhythmConfig {
    fn default() -> Self {
        RhythmConfig {
            strategy: None,
            pattern: "steady_quarters".to_string(),
            style: None,
            swing: 0.0,
            accent_jitter: 12,
            rest_probability: 0.0,
            channel: 9,
            program: 0,
        }
    }
}

// ---------------------------------------------------------------------------
// Resolved preset
// ---------------------------------------------------------------------------

/// A validated preset with every name resolved.
#[derive(Debug, Clone)]
pub struct ResolvedPreset {
    pub tempo_bpm: u16,
    pub key: Key,
    pub seed: Option<u64>,
    pub bars: u32,
    pub beats_per_bar: u8,
    pub style: StyleParams,
    pub melody: Option<MelodySettings>,
    pub harmony: HarmonySettings,
    pub bass: Option<BassSettings>,
    pub rhythm: Option<RhythmSettings>,
}

#[derive(Debug, Clone)]
pub struct MelodySettings {
    pub strategy: String,
    pub options: MelodyOptions,
    pub program: u8,
}

#[derive(Debug, Clone)]
pub struct HarmonySettings {
    pub strategy: String,
    pub request: HarmonyRequest,
    /// False when the preset has no harmony section.
    pub emit_track: bool,
    pub program: u8,
    pub channel: u8,
    pub comping: Option<&'static RhythmPattern>,
}

#[derive(Debug, Clone)]
pub struct BassSettings {
    pub options: BassOptions,
    pub program: u8,
}

#[derive(Debug, Clone)]
pub struct RhythmSettings {
    pub strategy: String,
    pub options: RhythmOptions,
    pub rest_probability: f64,
    pub channel: u8,
    pub program: u8,
}

// ---------------------------------------------------------------------------
// Loading and validation
// ---------------------------------------------------------------------------

fn in_range<T>(
    param: &'static str,
    value: T,
    lo: T,
    hi: T,
    expected: &'static str,
) -> Result<T, ConfigError>
where
    T: PartialOrd + std::fmt::Display + Copy,
{
    if value < lo || value > hi {
        return Err(ConfigError::out_of_range(param, value, expected));
    }
    Ok(value)
}

fn unit_interval(param: &'static str, value: f64) -> Result<f64, ConfigError> {
    if !(0.0..=1.0).contains(&value) {
        return Err(ConfigError::out_of_range(param, value, "0.0..=1.0"));
    }
    Ok(value)
}

fn byte(
    param: &'static str,
    value: u32,
    hi: u32,
    expected: &'static str,
) -> Result<u8, ConfigError> {
    in_range(param, value, 0, hi, expected).map(|v| v as u8)
}

fn named<T>(kind: &'static str, name: &str, parsed: Option<T>) -> Result<T, ConfigError> {
    parsed.ok_or_else(|| ConfigError::UnknownName {
        kind,
        name: name.to_string(),
    })
}

impl Preset {
    /// Deserialize an already-parsed JSON mapping.
    pub fn from_value(value: serde_json::Value) -> Result<Preset, ConfigError> {
        Ok(serde_json::from_value(value)?)
    }

    pub fn from_json_str(json: &str) -> Result<Preset, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Preset, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&text)
    }

    /// One of the bundled presets, by name.
    pub fn builtin(name: &str) -> Option<Result<Preset, ConfigError>> {
        BUILTIN_PRESETS
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, json)| Self::from_json_str(json))
    }

    /// Validate every field and resolve names against `registry`.
    pub fn resolve(&self, registry: &StrategyRegistry) -> Result<ResolvedPreset, ConfigError> {
        let tempo_bpm = in_range("tempo", self.tempo, 1, 400, "1..=400")? as u16;
        let key = Key::from_name(&self.key)?;
        let bars = in_range("structure.bars", self.structure.bars, 1, 1024, "1..=1024")?;
        let beats_per_bar =
            in_range("structure.beats_per_bar", self.structure.beats_per_bar, 1, 12, "1..=12")?
                as u8;

        let melody = self
            .melody
            .as_ref()
            .map(|m| resolve_melody(m, &key, registry))
            .transpose()?;
        let harmony = resolve_harmony(self.harmony.as_ref(), key, bars, registry)?;
        let bass = self.bass.as_ref().map(resolve_bass).transpose()?;

        let mut style = StyleParams::default();
        let rhythm = match &self.rhythm {
            Some(r) => {
                let settings = resolve_rhythm(r, registry)?;
                style = StyleParams {
                    swing: r.swing,
                    accent_jitter: r.accent_jitter as u8,
                    style: settings.options.style.map(|s| s.name().to_string()),
                };
                Some(settings)
            }
            None => None,
        };

        info!(
            key = %key.name(),
            tempo_bpm,
            bars,
            beats_per_bar,
            melody = melody.as_ref().map(|m| m.strategy.as_str()).unwrap_or("-"),
            harmony = %harmony.strategy,
            bass = bass.is_some(),
            rhythm = rhythm.as_ref().map(|r| r.strategy.as_str()).unwrap_or("-"),
            "preset resolved"
        );

        Ok(ResolvedPreset {
            tempo_bpm,
            key,
            seed: self.seed,
            bars,
            beats_per_bar,
            style,
            melody,
            harmony,
            bass,
            rhythm,
        })
    }
}

fn resolve_melody(
    m: &MelodyConfig,
    key: &Key,
    registry: &StrategyRegistry,
) -> Result<MelodySettings, ConfigError> {
    registry.check(Role::Melody, &m.strategy)?;
    let [low, high] = m.range;
    if low > 127 || high > 127 || low >= high {
        return Err(ConfigError::out_of_range(
            "melody.range",
            format!("[{low}, {high}]"),
            "low < high <= 127",
        ));
    }
    if key.pitches_in_range(low as u8, high as u8).is_empty() {
        return Err(ConfigError::out_of_range(
            "melody.range",
            format!("[{low}, {high}]"),
            "a range containing a scale pitch",
        ));
    }

    let g = &m.genetic;
    in_range("melody.genetic.population", g.population, 2, 1000, "2..=1000")?;
    in_range("melody.genetic.generations", g.generations, 0, 10_000, "0..=10000")?;
    in_range("melody.genetic.plateau", g.plateau, 1, usize::MAX, ">= 1")?;
    unit_interval("melody.genetic.mutation_rate", g.mutation_rate)?;
    unit_interval("melody.genetic.crossover_rate", g.crossover_rate)?;
    let w = g.weights;
    for (param, value) in [
        ("melody.genetic.weights.consonance", w.consonance),
        ("melody.genetic.weights.smoothness", w.smoothness),
        ("melody.genetic.weights.scale", w.scale),
    ] {
        in_range(param, value, 0.0, f64::MAX, ">= 0.0")?;
    }
    in_range("melody.mcts.rollouts", m.mcts.rollouts, 1, 1000, "1..=1000")?;
    in_range("melody.mcts.rollout_depth", m.mcts.rollout_depth, 0, 64, "0..=64")?;
    in_range("melody.mcts.max_leap", m.mcts.max_leap, 1, 24, "1..=24")?;

    let options = MelodyOptions {
        low: low as u8,
        high: high as u8,
        note_value: named("note value", &m.note_value, NoteValue::from_name(&m.note_value))?,
        velocity_curve: named(
            "velocity curve",
            &m.velocity_curve,
            VelocityCurve::from_name(&m.velocity_curve),
        )?,
        channel: byte("melody.channel", m.channel, 15, "0..=15")?,
        motif_length: in_range("melody.motif_length", m.motif_length, 1, 16, "1..=16")? as usize,
        chromatic_probability: unit_interval(
            "melody.chromatic_probability",
            m.chromatic_probability,
        )?,
        max_jump: in_range("melody.max_jump", m.max_jump, 1, 7, "1..=7")? as u8,
        genetic: m.genetic,
        mcts: m.mcts,
    };
    Ok(MelodySettings {
        strategy: m.strategy.clone(),
        options,
        program: byte("melody.program", m.program, 127, "0..=127")?,
    })
}

fn resolve_harmony(
    h: Option<&HarmonyConfig>,
    key: Key,
    bars: u32,
    registry: &StrategyRegistry,
) -> Result<HarmonySettings, ConfigError> {
    let emit_track = h.is_some();
    let defaults = HarmonyConfig::default();
    let h = h.unwrap_or(&defaults);
    registry.check(Role::Harmony, &h.strategy)?;

    let request = HarmonyRequest {
        key,
        bars,
        progression: progression(&h.progression)?,
        bars_per_chord: in_range("harmony.bars_per_chord", h.bars_per_chord, 1, 8, "1..=8")?,
        voicing: named("voicing", &h.voicing, Voicing::from_name(&h.voicing))?,
        voice_leading: h.voice_leading,
        extensions: h.extensions,
        octave: in_range("harmony.octave", h.octave, 2, 6, "2..=6")?,
        split_ratio: unit_interval("harmony.split_ratio", h.split_ratio)?,
    };
    let comping = h.comping.as_deref().map(pattern).transpose()?;
    Ok(HarmonySettings {
        strategy: h.strategy.clone(),
        request,
        emit_track,
        program: byte("harmony.program", h.program, 127, "0..=127")?,
        channel: byte("harmony.channel", h.channel, 15, "0..=15")?,
        comping,
    })
}

fn resolve_bass(b: &BassConfig) -> Result<BassSettings, ConfigError> {
    Ok(BassSettings {
        options: BassOptions {
            style: BassStyle::from_name(&b.style)?,
            octave: in_range("bass.octave", b.octave, 1, 4, "1..=4")?,
            channel: byte("bass.channel", b.channel, 15, "0..=15")?,
        },
        program: byte("bass.program", b.program, 127, "0..=127")?,
    })
}

fn resolve_rhythm(
    r: &RhythmConfig,
    registry: &StrategyRegistry,
) -> Result<RhythmSettings, ConfigError> {
    let style = r.style.as_deref().map(Style::from_name).transpose()?;
    let strategy = match &r.strategy {
        Some(name) => name.clone(),
        None if style.is_some() => "groove".to_string(),
        None => "pattern".to_string(),
    };
    registry.check(Role::Rhythm, &strategy)?;
    unit_interval("rhythm.swing", r.swing)?;
    in_range("rhythm.accent_jitter", r.accent_jitter, 0, 32, "0..=32")?;
    Ok(RhythmSettings {
        strategy,
        options: RhythmOptions {
            pattern: pattern(&r.pattern)?,
            style,
        },
        rest_probability: unit_interval("rhythm.rest_probability", r.rest_probability)?,
        channel: byte("rhythm.channel", r.channel, 15, "0..=15")?,
        program: byte("rhythm.program", r.program, 127, "0..=127")?,
    })
}
