// Strategy registry: name -> factory tables for the three pluggable roles.
//
// The Arranger never names a concrete strategy type. It asks the registry
// for `melody(name, &options)`, `harmony(name)` or `rhythm(name, &options)`
// and gets back a boxed trait object. `with_builtins()` registers the stock
// strategies; callers may add their own with `register_*` before composing.
// Registration is append-only: re-registering a name is an error, so a
// built-in can't be silently shadowed.
//
// Tables are BTreeMaps so `*_names()` lists strategies in a stable order.

use crate::error::{ConfigError, Role};
use crate::genetic::Genetic;
use crate::harmony::{
    DiatonicHarmony, FunctionalHarmony, HarmonyStrategy, HybridHarmony, ProgressionHarmony,
};
use crate::mcts::TreeSearch;
use crate::melody::{MelodyOptions, MelodyStrategy};
use crate::motif::Structured;
use crate::random_walk::RandomWalk;
use crate::rhythm::{
    GrooveRhythm, HybridRhythm, PatternRhythm, RandomRhythm, RhythmOptions, RhythmStrategy,
};
use std::collections::BTreeMap;

pub type MelodyFactory = Box<dyn Fn(&MelodyOptions) -> Box<dyn MelodyStrategy>>;
pub type HarmonyFactory = Box<dyn Fn() -> Box<dyn HarmonyStrategy>>;
pub type RhythmFactory = Box<dyn Fn(&RhythmOptions) -> Box<dyn RhythmStrategy>>;

#[derive(Default)]
pub struct StrategyRegistry {
    melody: BTreeMap<String, MelodyFactory>,
    harmony: BTreeMap<String, HarmonyFactory>,
    rhythm: BTreeMap<String, RhythmFactory>,
}

impl std::fmt::Debug for StrategyRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StrategyRegistry")
            .field("melody", &self.melody_names())
            .field("harmony", &self.harmony_names())
            .field("rhythm", &self.rhythm_names())
            .finish()
    }
}

/// Insert into a table unless the name is taken.
fn insert_unique<F>(
    table: &mut BTreeMap<String, F>,
    role: Role,
    name: &str,
    factory: F,
) -> Result<(), ConfigError> {
    if table.contains_key(name) {
        return Err(ConfigError::DuplicateStrategy {
            role,
            name: name.to_string(),
        });
    }
    table.insert(name.to_string(), factory);
    Ok(())
}

fn unknown<F>(table: &BTreeMap<String, F>, role: Role, name: &str) -> ConfigError {
    ConfigError::UnknownStrategy {
        role,
        name: name.to_string(),
        available: table.keys().cloned().collect::<Vec<_>>().join(", "),
    }
}

fn melody_factory<S, F>(make: F) -> MelodyFactory
where
    S: MelodyStrategy + 'static,
    F: Fn(&MelodyOptions) -> S + 'static,
{
    Box::new(move |opts: &MelodyOptions| -> Box<dyn MelodyStrategy> { Box::new(make(opts)) })
}

fn harmony_factory<S, F>(make: F) -> HarmonyFactory
where
    S: HarmonyStrategy + 'static,
    F: Fn() -> S + 'static,
{
    Box::new(move || -> Box<dyn HarmonyStrategy> { Box::new(make()) })
}

fn rhythm_factory<S, F>(make: F) -> RhythmFactory
where
    S: RhythmStrategy + 'static,
    F: Fn(&RhythmOptions) -> S + 'static,
{
    Box::new(move |opts: &RhythmOptions| -> Box<dyn RhythmStrategy> { Box::new(make(opts)) })
}

impl StrategyRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding every built-in strategy.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        let melody = &mut registry.melody;
        melody.insert("random".into(), melody_factory(|o| RandomWalk::new(o.clone())));
        melody.insert("structured".into(), melody_factory(|o| Structured::new(o.clone())));
        melody.insert("genetic".into(), melody_factory(|o| Genetic::new(o.clone())));
        melody.insert("mcts".into(), melody_factory(|o| TreeSearch::new(o.clone())));

        let harmony = &mut registry.harmony;
        harmony.insert("progression".into(), harmony_factory(|| ProgressionHarmony));
        harmony.insert("functional".into(), harmony_factory(|| FunctionalHarmony));
        harmony.insert("diatonic".into(), harmony_factory(|| DiatonicHarmony));
        harmony.insert("hybrid".into(), harmony_factory(|| HybridHarmony));

        let rhythm = &mut registry.rhythm;
        rhythm.insert("pattern".into(), rhythm_factory(PatternRhythm::new));
        rhythm.insert("groove".into(), rhythm_factory(GrooveRhythm::new));
        rhythm.insert("random".into(), rhythm_factory(|_| RandomRhythm));
        rhythm.insert("hybrid".into(), rhythm_factory(HybridRhythm::new));
        registry
    }

    pub fn register_melody<F>(&mut self, name: &str, factory: F) -> Result<(), ConfigError>
    where
        F: Fn(&MelodyOptions) -> Box<dyn MelodyStrategy> + 'static,
    {
        let factory: MelodyFactory = Box::new(factory);
        insert_unique(&mut self.melody, Role::Melody, name, factory)
    }

    pub fn register_harmony<F>(&mut self, name: &str, factory: F) -> Result<(), ConfigError>
    where
        F: Fn() -> Box<dyn HarmonyStrategy> + 'static,
    {
        let factory: HarmonyFactory = Box::new(factory);
        insert_unique(&mut self.harmony, Role::Harmony, name, factory)
    }

    pub fn register_rhythm<F>(&mut self, name: &str, factory: F) -> Result<(), ConfigError>
    where
        F: Fn(&RhythmOptions) -> Box<dyn RhythmStrategy> + 'static,
    {
        let factory: RhythmFactory = Box::new(factory);
        insert_unique(&mut self.rhythm, Role::Rhythm, name, factory)
    }

    pub fn melody(
        &self,
        name: &str,
        opts: &MelodyOptions,
    ) -> Result<Box<dyn MelodyStrategy>, ConfigError> {
        self.melody
            .get(name)
            .map(|factory| factory(opts))
            .ok_or_else(|| unknown(&self.melody, Role::Melody, name))
    }

    pub fn harmony(&self, name: &str) -> Result<Box<dyn HarmonyStrategy>, ConfigError> {
        self.harmony
            .get(name)
            .map(|factory| factory())
            .ok_or_else(|| unknown(&self.harmony, Role::Harmony, name))
    }

    pub fn rhythm(
        &self,
        name: &str,
        opts: &RhythmOptions,
    ) -> Result<Box<dyn RhythmStrategy>, ConfigError> {
        self.rhythm
            .get(name)
            .map(|factory| factory(opts))
            .ok_or_else(|| unknown(&self.rhythm, Role::Rhythm, name))
    }

    /// Fail with `UnknownStrategy` unless `name` is registered for `role`.
    /// Used while resolving a preset, before any strategy is built.
    pub fn check(&self, role: Role, name: &str) -> Result<(), ConfigError> {
        let known = match role {
            Role::Melody => self.melody.contains_key(name),
            Role::Harmony => self.harmony.contains_key(name),
            Role::Rhythm => self.rhythm.contains_key(name),
            Role::Bass => true,
        };
        if known {
            return Ok(());
        }
        Err(match role {
            Role::Melody => unknown(&self.melody, role, name),
            Role::Harmony => unknown(&self.harmony, role, name),
            _ => unknown(&self.rhythm, role, name),
        })
    }

    pub fn melody_names(&self) -> Vec<&str> {
        self.melody.keys().map(String::as_str).collect()
    }

    pub fn harmony_names(&self) -> Vec<&str> {
        self.harmony.keys().map(String::as_str).collect()
    }

    pub fn rhythm_names(&self) -> Vec<&str> {
        self.rhythm.keys().map(String::as_str).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtins_listed_in_order() {
        let registry = StrategyRegistry::with_builtins();
        assert_eq!(
            registry.melody_names(),
            vec!["genetic", "mcts", "random", "structured"]
        );
        assert_eq!(
            registry.harmony_names(),
            vec!["diatonic", "functional", "hybrid", "progression"]
        );
        assert_eq!(
            registry.rhythm_names(),
            vec!["groove", "hybrid", "pattern", "random"]
        );
    }

    #[test]
    fn test_lookup_builds_named_strategy() {
        let registry = StrategyRegistry::with_builtins();
        let opts = MelodyOptions::default();
        for name in registry.melody_names() {
            assert_eq!(registry.melody(name, &opts).unwrap().name(), name);
        }
        for name in registry.harmony_names() {
            assert_eq!(registry.harmony(name).unwrap().name(), name);
        }
        for name in registry.rhythm_names() {
            let strategy = registry.rhythm(name, &RhythmOptions::default()).unwrap();
            assert_eq!(strategy.name(), name);
        }
    }

    #[test]
    fn test_unknown_strategy_lists_alternatives() {
        let registry = StrategyRegistry::with_builtins();
        let err = registry.harmony("serial").err().unwrap();
        match err {
            ConfigError::UnknownStrategy {
                role,
                name,
                available,
            } => {
                assert_eq!(role, Role::Harmony);
                assert_eq!(name, "serial");
                assert_eq!(available, "diatonic, functional, hybrid, progression");
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert!(registry.check(Role::Melody, "genetic").is_ok());
        assert!(registry.check(Role::Rhythm, "polka").is_err());
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let mut registry = StrategyRegistry::with_builtins();
        let err = registry
            .register_rhythm("groove", |opts| Box::new(PatternRhythm::new(opts)))
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::DuplicateStrategy {
                role: Role::Rhythm,
                ..
            }
        ));
        registry
            .register_harmony("static", || Box::new(ProgressionHarmony))
            .unwrap();
        assert!(registry.harmony_names().contains(&"static"));
    }
}
