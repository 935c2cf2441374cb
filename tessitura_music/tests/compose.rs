// End-to-end composition tests: presets in, validated compositions and MIDI
// bytes out.

use rand::RngCore;
use serde_json::json;
use tessitura_music::config::{BUILTIN_PRESETS, Preset, ResolvedPreset};
use tessitura_music::context::GenerationContext;
use tessitura_music::error::{ConfigError, Error, GenerationError};
use tessitura_music::harmony::total_movement;
use tessitura_music::melody::{MelodyOptions, MelodyStrategy};
use tessitura_music::midi::{CompositionSink, MidiFileSink, composition_to_smf_bytes};
use tessitura_music::score::{Composition, NoteEvent, TrackRole};
use tessitura_music::{Arranger, StrategyRegistry, compose};

fn resolve(value: serde_json::Value) -> ResolvedPreset {
    Preset::from_value(value)
        .unwrap()
        .resolve(&StrategyRegistry::with_builtins())
        .unwrap()
}

fn check_invariants(composition: &Composition) {
    let total = composition.total_ticks();
    for track in &composition.tracks {
        assert_eq!(track.duration(), total, "track {}", track.name);
        for e in &track.events {
            assert!(e.pitch <= 127 && e.velocity <= 127, "{e:?}");
            assert!(e.duration > 0, "{e:?}");
            assert!(e.channel <= 15, "{e:?}");
            assert!(e.end() <= total, "{} {e:?}", track.name);
        }
        for w in track.events.windows(2) {
            assert!(w[0].start <= w[1].start, "track {} unsorted", track.name);
        }
    }
}

#[test]
fn test_random_walk_pop_end_to_end() {
    let preset = resolve(json!({
        "tempo": 120,
        "key": "C_MAJOR",
        "structure": {"bars": 8, "beats_per_bar": 4},
        "melody": {"strategy": "random"},
        "harmony": {"strategy": "progression", "progression": "pop_basic"},
        "rhythm": {"strategy": "pattern", "pattern": "steady_quarters"}
    }));
    let registry = StrategyRegistry::with_builtins();
    let mut arranger = Arranger::new(&preset, &registry, 42);
    let timeline = arranger.resolve_harmony().unwrap();
    assert_eq!(timeline.entries()[0].chord.degree, 0);
    arranger.generate_tracks().unwrap();
    let composition = arranger.assemble().unwrap().clone();

    assert_eq!(composition.tracks.len(), 3);
    assert_eq!(composition.bars, 8);
    assert_eq!(composition.tempo_bpm, 120);
    assert_eq!(composition.total_ticks(), 8 * 4 * 480);
    assert!((composition.duration_seconds() - 16.0).abs() < 1e-9);
    let roles: Vec<TrackRole> = composition.tracks.iter().map(|t| t.role).collect();
    assert_eq!(
        roles,
        vec![TrackRole::Melody, TrackRole::Harmony, TrackRole::Rhythm]
    );
    assert_eq!(composition.track("melody").unwrap().events.len(), 32);
    assert_eq!(composition.track("rhythm").unwrap().events.len(), 32);
    check_invariants(&composition);
}

#[test]
fn test_structured_pop_preset_end_to_end() {
    let preset = resolve(json!({
        "tempo": 120,
        "key": "C_MAJOR",
        "structure": {"bars": 8, "beats_per_bar": 4},
        "melody": {"strategy": "structured"},
        "harmony": {"strategy": "progression", "progression": "pop_basic", "voicing": "close"},
        "rhythm": {"strategy": "pattern", "pattern": "steady_quarters"}
    }));
    let registry = StrategyRegistry::with_builtins();
    let mut arranger = Arranger::new(&preset, &registry, 2024);
    let timeline = arranger.resolve_harmony().unwrap();
    assert_eq!(timeline.entries()[0].chord.degree, 0);
    arranger.generate_tracks().unwrap();
    arranger.assemble().unwrap();
    let composition = arranger.into_composition().unwrap();

    assert_eq!(composition.tracks.len(), 3);
    for track in &composition.tracks {
        assert_eq!(track.duration(), 15_360, "track {}", track.name);
    }
    let melody = composition.track("melody").unwrap();
    assert_eq!(melody.events.len(), 32);
    assert!(melody.events.iter().all(|e| (60..=84).contains(&e.pitch)));
    assert_eq!(composition.track("rhythm").unwrap().events.len(), 32);
    check_invariants(&composition);
}

#[test]
fn test_hybrid_strategies_and_rests() {
    let registry = StrategyRegistry::with_builtins();
    let rhythm_notes = |rest_probability: f64| {
        let preset = resolve(json!({
            "structure": {"bars": 8},
            "harmony": {"strategy": "hybrid", "split_ratio": 0.5},
            "rhythm": {
                "strategy": "hybrid",
                "pattern": "steady_eighths",
                "rest_probability": rest_probability
            }
        }));
        let composition = compose(&preset, &registry, 5).unwrap();
        check_invariants(&composition);
        composition.track("rhythm").unwrap().events.len()
    };
    let full = rhythm_notes(0.0);
    // Four bars of eighths plus at least one random hit per bar.
    assert!(full >= 4 * 8 + 4, "{full}");
    assert!(rhythm_notes(0.4) < full);
    assert_eq!(rhythm_notes(1.0), 0);

    let preset = resolve(json!({
        "structure": {"bars": 8},
        "harmony": {"strategy": "hybrid", "split_ratio": 0.5}
    }));
    let mut arranger = Arranger::new(&preset, &registry, 5);
    let degrees: Vec<u8> = arranger
        .resolve_harmony()
        .unwrap()
        .entries()
        .iter()
        .map(|e| e.chord.degree)
        .collect();
    assert_eq!(&degrees[..4], &[0, 4, 5, 3]);
    assert_eq!(degrees[4], 0);
    assert_eq!(&degrees[6..], &[4, 0]);
}

#[test]
fn test_same_seed_same_composition() {
    let registry = StrategyRegistry::with_builtins();
    for (name, _) in BUILTIN_PRESETS {
        let mut preset = Preset::builtin(name).unwrap().unwrap();
        preset.structure.bars = 4;
        let resolved = preset.resolve(&registry).unwrap();
        let a = compose(&resolved, &registry, 7).unwrap();
        let b = compose(&resolved, &registry, 7).unwrap();
        assert_eq!(a.tracks.len(), b.tracks.len(), "{name}");
        for (ta, tb) in a.tracks.iter().zip(&b.tracks) {
            assert_eq!(ta.events, tb.events, "{name} {}", ta.name);
        }
        assert_eq!(
            composition_to_smf_bytes(&a).unwrap(),
            composition_to_smf_bytes(&b).unwrap()
        );
    }
}

#[test]
fn test_different_seeds_differ() {
    let preset = resolve(json!({
        "structure": {"bars": 8},
        "melody": {"strategy": "random"}
    }));
    let registry = StrategyRegistry::with_builtins();
    let a = compose(&preset, &registry, 1).unwrap();
    let b = compose(&preset, &registry, 2).unwrap();
    assert_ne!(a.tracks[0].events, b.tracks[0].events);
}

#[test]
fn test_every_strategy_respects_event_invariants() {
    let registry = StrategyRegistry::with_builtins();
    let melodies = registry.melody_names();
    let harmonies = registry.harmony_names();
    let rhythms = registry.rhythm_names();
    for (i, melody) in melodies.iter().enumerate() {
        for (j, harmony) in harmonies.iter().enumerate() {
            let rhythm = rhythms[(i + j) % rhythms.len()];
            let preset = resolve(json!({
                "key": "E_FLAT_DORIAN",
                "structure": {"bars": 4, "beats_per_bar": 3},
                "melody": {
                    "strategy": melody,
                    "velocity_curve": "arch",
                    "note_value": "eighth",
                    "range": [55, 79],
                    "genetic": {"population": 10, "generations": 10},
                    "mcts": {"rollouts": 3}
                },
                "harmony": {"strategy": harmony, "voicing": "open", "extensions": true},
                "bass": {"style": "walking"},
                "rhythm": {"strategy": rhythm, "style": "samba", "swing": 0.5}
            }));
            let composition = compose(&preset, &registry, (i * 10 + j) as u64).unwrap();
            assert_eq!(composition.tracks.len(), 4);
            check_invariants(&composition);
            let melody_track = composition.track("melody").unwrap();
            assert_eq!(melody_track.events.len(), 4 * 3 * 2);
            assert!(
                melody_track
                    .events
                    .iter()
                    .all(|e| (55..=79).contains(&e.pitch))
            );
        }
    }
}

#[test]
fn test_durations_match_for_all_role_combinations() {
    let registry = StrategyRegistry::with_builtins();
    for mask in 0u8..16 {
        let mut value = json!({"structure": {"bars": 5, "beats_per_bar": 6}});
        if mask & 1 != 0 {
            value["melody"] = json!({"strategy": "structured", "note_value": "half"});
        }
        if mask & 2 != 0 {
            value["harmony"] = json!({"bars_per_chord": 2, "comping": "anticipation"});
        }
        if mask & 4 != 0 {
            value["bass"] = json!({"style": "root"});
        }
        if mask & 8 != 0 {
            value["rhythm"] = json!({"strategy": "random"});
        }
        let preset = resolve(value);
        let composition = compose(&preset, &registry, mask as u64).unwrap();
        assert_eq!(composition.tracks.len(), mask.count_ones() as usize);
        check_invariants(&composition);
    }
}

#[test]
fn test_voice_leading_lowers_total_movement() {
    let registry = StrategyRegistry::with_builtins();
    let movement = |voice_leading: bool| {
        let preset = resolve(json!({
            "structure": {"bars": 4},
            "harmony": {"progression": "pop_basic", "voice_leading": voice_leading}
        }));
        let mut arranger = Arranger::new(&preset, &registry, 0);
        total_movement(arranger.resolve_harmony().unwrap())
    };
    assert_eq!(movement(false), 37);
    assert_eq!(movement(true), 9);
}

#[test]
fn test_midi_file_round_trips_through_midly() {
    let registry = StrategyRegistry::with_builtins();
    let preset = Preset::builtin("jazz").unwrap().unwrap();
    let resolved = preset.resolve(&registry).unwrap();
    let composition = compose(&resolved, &registry, 11).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("jazz.mid");
    MidiFileSink::new(&path).write(&composition).unwrap();
    let bytes = std::fs::read(&path).unwrap();
    let smf = midly::Smf::parse(&bytes).unwrap();
    assert_eq!(smf.tracks.len(), 1 + composition.tracks.len());

    let note_ons = smf.tracks[1..]
        .iter()
        .flatten()
        .filter(|e| {
            matches!(
                e.kind,
                midly::TrackEventKind::Midi {
                    message: midly::MidiMessage::NoteOn { .. },
                    ..
                }
            )
        })
        .count();
    let notes: usize = composition.tracks.iter().map(|t| t.events.len()).sum();
    assert_eq!(note_ons, notes);
}

/// A melody that plays the tonic on every note.
struct Drone;

impl MelodyStrategy for Drone {
    fn name(&self) -> &'static str {
        "drone"
    }

    fn generate(
        &self,
        ctx: &GenerationContext,
        length: usize,
        _rng: &mut dyn RngCore,
    ) -> Result<Vec<NoteEvent>, GenerationError> {
        let tonic = ctx.key.resolve(0, 4) as u8;
        (0..length)
            .map(|i| NoteEvent::new(tonic, 70, i as u32 * 480, 480, 0))
            .collect()
    }
}

#[test]
fn test_custom_strategy_plugs_into_arranger() {
    let mut registry = StrategyRegistry::with_builtins();
    registry
        .register_melody("drone", |_: &MelodyOptions| Box::new(Drone))
        .unwrap();
    assert!(matches!(
        registry.register_melody("drone", |_: &MelodyOptions| Box::new(Drone)),
        Err(ConfigError::DuplicateStrategy { .. })
    ));

    let preset = Preset::from_value(json!({
        "key": "G_MAJOR",
        "structure": {"bars": 2},
        "melody": {"strategy": "drone"}
    }))
    .unwrap()
    .resolve(&registry)
    .unwrap();
    let composition = compose(&preset, &registry, 0).unwrap();
    let melody = composition.track("melody").unwrap();
    assert_eq!(melody.events.len(), 8);
    assert!(melody.events.iter().all(|e| e.pitch == 67));
}

#[test]
fn test_config_errors_surface_before_generation() {
    let registry = StrategyRegistry::with_builtins();
    let cases = [
        json!({"tempo": 0}),
        json!({"key": "X_MAJOR"}),
        json!({"melody": {"strategy": "lstm"}}),
        json!({"rhythm": {"swing": -0.1}}),
        json!({"bass": {"style": "fretless"}}),
    ];
    for value in cases {
        let err = Preset::from_value(value.clone())
            .and_then(|p| p.resolve(&registry))
            .unwrap_err();
        let top: Error = err.into();
        assert!(matches!(top, Error::Config(_)), "{value}");
    }
    assert!(matches!(
        Preset::from_json_str(r#"{"tempo": 120, "colour": "blue"}"#),
        Err(ConfigError::Malformed(_))
    ));
    assert!(matches!(
        Preset::from_json_str("not json"),
        Err(ConfigError::Malformed(_))
    ));
}
