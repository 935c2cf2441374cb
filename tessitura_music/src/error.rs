// Error taxonomy for the generation engine.
//
// Three families, matching how each failure is handled:
// - ConfigError: anything wrong with the preset (unknown names, bad ranges,
//   malformed mapping). Always raised while resolving the preset, before any
//   note is generated.
// - GenerationError: a strategy could not produce a sequence at all. Bounded
//   searches that merely run out of retries do NOT raise this; they clamp to
//   the nearest valid pitch and log a debug message instead.
// - AssemblyError: the Arranger found a track that violates the bar grid or
//   the NoteEvent invariants. Fatal, since the output would be invalid.
//
// `Error` is the top-level type returned by `Arranger::arrange` and wraps the
// three families plus sink failures.

use thiserror::Error;

/// Which musical role a track or strategy serves.
///
/// Used in error messages so a failure names the role it came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Role {
    Melody,
    Harmony,
    Bass,
    Rhythm,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Melody => "melody",
            Role::Harmony => "harmony",
            Role::Bass => "bass",
            Role::Rhythm => "rhythm",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Preset / configuration errors. Fatal to the run.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid key name '{0}'")]
    InvalidKey(String),

    #[error("invalid chord quality '{0}'")]
    InvalidQuality(String),

    #[error("unknown {role} strategy '{name}' (available: {available})")]
    UnknownStrategy {
        role: Role,
        name: String,
        available: String,
    },

    #[error("{role} strategy '{name}' is already registered")]
    DuplicateStrategy { role: Role, name: String },

    #[error("unknown progression '{0}'")]
    UnknownProgression(String),

    #[error("unknown rhythm pattern '{0}'")]
    UnknownPattern(String),

    #[error("unknown rhythm style '{0}'")]
    UnknownStyle(String),

    #[error("unknown {kind} '{name}'")]
    UnknownName { kind: &'static str, name: String },

    #[error("parameter {param} = {value} is out of range (expected {expected})")]
    OutOfRange {
        param: &'static str,
        value: String,
        expected: &'static str,
    },

    #[error("malformed preset: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("failed to read preset {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl ConfigError {
    /// Shorthand for building an `OutOfRange` error from any displayable value.
    pub fn out_of_range(
        param: &'static str,
        value: impl std::fmt::Display,
        expected: &'static str,
    ) -> Self {
        ConfigError::OutOfRange {
            param,
            value: value.to_string(),
            expected,
        }
    }
}

/// A strategy failed outright.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("no candidate pitches available: {0}")]
    NoCandidates(String),

    #[error("invalid note event: {0}")]
    InvalidEvent(String),
}

/// The assembled composition breaks the bar grid or event invariants.
#[derive(Debug, Error)]
pub enum AssemblyError {
    #[error("track '{track}' spans {actual} ticks, expected {expected}")]
    DurationMismatch {
        track: String,
        expected: u32,
        actual: u32,
    },

    #[error("track '{track}' has an event ending at tick {end}, past the piece end {limit}")]
    EventPastEnd { track: String, end: u32, limit: u32 },

    #[error("track '{track}' has an invalid event: {source}")]
    InvalidEvent {
        track: String,
        #[source]
        source: GenerationError,
    },

    #[error("arranger transition {from} -> {to} is not allowed")]
    BadTransition {
        from: &'static str,
        to: &'static str,
    },
}

/// Output sink failures.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("I/O error writing {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("MIDI encoding failed: {0}")]
    Encode(String),
}

/// Top-level engine error.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("{role} generation with strategy '{strategy}' failed: {source}")]
    Generation {
        role: Role,
        strategy: String,
        #[source]
        source: GenerationError,
    },

    #[error(transparent)]
    Assembly(#[from] AssemblyError),

    #[error(transparent)]
    Sink(#[from] SinkError),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
