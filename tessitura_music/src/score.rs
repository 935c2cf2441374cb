// The score model: timed note events, tracks, and the assembled composition.
//
// Every generator's output is a sequence of `NoteEvent`s on an integer tick
// grid (`TICKS_PER_BEAT` per quarter-note beat). Integer ticks keep the bar
// arithmetic exact: a piece of N bars always spans
// `N * beats_per_bar * TICKS_PER_BEAT` ticks, with no float drift.
//
// `Track` and `Composition` are owned by the Arranger; generators only ever
// return plain `Vec<NoteEvent>`. MIDI is derived from the composition
// (midi.rs), never the other way around.

use crate::error::{GenerationError, Role};
use serde::{Deserialize, Serialize};

/// Ticks per quarter-note beat. Also the MIDI file resolution.
pub const TICKS_PER_BEAT: u32 = 480;

/// A single timed note. The common output unit of every generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NoteEvent {
    /// MIDI pitch, 0-127.
    pub pitch: u8,
    /// MIDI velocity, 0-127.
    pub velocity: u8,
    /// Onset in ticks from the start of the piece.
    pub start: u32,
    /// Length in ticks. Always > 0.
    pub duration: u32,
    /// MIDI channel, 0-15.
    pub channel: u8,
}

impl NoteEvent {
    /// Build an event, checking pitch/velocity range, duration > 0 and
    /// channel range.
    pub fn new(
        pitch: u8,
        velocity: u8,
        start: u32,
        duration: u32,
        channel: u8,
    ) -> Result<Self, GenerationError> {
        let event = NoteEvent {
            pitch,
            velocity,
            start,
            duration,
            channel,
        };
        event.validate()?;
        Ok(event)
    }

    pub fn validate(&self) -> Result<(), GenerationError> {
        if self.pitch > 127 {
            return Err(GenerationError::InvalidEvent(format!(
                "pitch {} out of MIDI range",
                self.pitch
            )));
        }
        if self.velocity > 127 {
            return Err(GenerationError::InvalidEvent(format!(
                "velocity {} out of MIDI range",
                self.velocity
            )));
        }
        if self.duration == 0 {
            return Err(GenerationError::InvalidEvent(format!(
                "zero-length note at tick {}",
                self.start
            )));
        }
        if self.channel > 15 {
            return Err(GenerationError::InvalidEvent(format!(
                "channel {} out of range",
                self.channel
            )));
        }
        Ok(())
    }

    /// Tick at which the note stops sounding.
    pub fn end(&self) -> u32 {
        self.start + self.duration
    }
}

/// A named, channel-tagged event sequence with an instrument program.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Track {
    pub name: String,
    pub role: TrackRole,
    pub channel: u8,
    pub program: u8,
    /// Events ordered by start tick.
    pub events: Vec<NoteEvent>,
    /// Tick at which the track ends. Trailing silence is represented by an
    /// `end_tick` beyond the last event.
    pub end_tick: u32,
}

/// Serializable mirror of `Role` used in tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrackRole {
    Melody,
    Harmony,
    Bass,
    Rhythm,
}

impl From<Role> for TrackRole {
    fn from(role: Role) -> Self {
        match role {
            Role::Melody => TrackRole::Melody,
            Role::Harmony => TrackRole::Harmony,
            Role::Bass => TrackRole::Bass,
            Role::Rhythm => TrackRole::Rhythm,
        }
    }
}

impl Track {
    /// Total duration of the track in ticks.
    pub fn duration(&self) -> u32 {
        self.end_tick
    }

    /// Tick of the last sounding note-off, or 0 for an empty track.
    pub fn last_event_end(&self) -> u32 {
        self.events.iter().map(NoteEvent::end).max().unwrap_or(0)
    }
}

/// The assembled multi-track piece handed to the output sink.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Composition {
    pub tempo_bpm: u16,
    pub beats_per_bar: u8,
    pub bars: u32,
    pub tracks: Vec<Track>,
}

impl Composition {
    /// Length of the piece in ticks.
    pub fn total_ticks(&self) -> u32 {
        piece_ticks(self.bars, self.beats_per_bar)
    }

    /// Length of the piece in seconds at its tempo.
    pub fn duration_seconds(&self) -> f64 {
        let beats = self.total_ticks() as f64 / TICKS_PER_BEAT as f64;
        beats * 60.0 / self.tempo_bpm as f64
    }

    pub fn track(&self, name: &str) -> Option<&Track> {
        self.tracks.iter().find(|t| t.name == name)
    }

    /// Compact per-track summary for logging.
    pub fn summary(&self) -> String {
        let mut out = String::new();
        for track in &self.tracks {
            let preview: Vec<&str> = track
                .events
                .iter()
                .take(8)
                .map(|e| pitch_name(e.pitch))
                .collect();
            out.push_str(&format!(
                "{:>8}: ch{:<2} prog{:<3} {:>4} notes  {} ...\n",
                track.name,
                track.channel,
                track.program,
                track.events.len(),
                preview.join(" ")
            ));
        }
        out
    }
}

/// Ticks in one bar.
pub fn bar_ticks(beats_per_bar: u8) -> u32 {
    beats_per_bar as u32 * TICKS_PER_BEAT
}

/// Ticks in a piece of `bars` bars.
pub fn piece_ticks(bars: u32, beats_per_bar: u8) -> u32 {
    bars * bar_ticks(beats_per_bar)
}

/// Convert a MIDI pitch to a compact note name (e.g., "C4", "F#3").
pub fn pitch_name(pitch: u8) -> &'static str {
    const NAMES: &[&str] = &[
        "C-1", "C#-1", "D-1", "Eb-1", "E-1", "F-1", "F#-1", "G-1", "Ab-1", "A-1", "Bb-1", "B-1",
        "C0", "C#0", "D0", "Eb0", "E0", "F0", "F#0", "G0", "Ab0", "A0", "Bb0", "B0", "C1", "C#1",
        "D1", "Eb1", "E1", "F1", "F#1", "G1", "Ab1", "A1", "Bb1", "B1", "C2", "C#2", "D2", "Eb2",
        "E2", "F2", "F#2", "G2", "Ab2", "A2", "Bb2", "B2", "C3", "C#3", "D3", "Eb3", "E3", "F3",
        "F#3", "G3", "Ab3", "A3", "Bb3", "B3", "C4", "C#4", "D4", "Eb4", "E4", "F4", "F#4", "G4",
        "Ab4", "A4", "Bb4", "B4", "C5", "C#5", "D5", "Eb5", "E5", "F5", "F#5", "G5", "Ab5", "A5",
        "Bb5", "B5", "C6", "C#6", "D6", "Eb6", "E6", "F6", "F#6", "G6", "Ab6", "A6", "Bb6", "B6",
        "C7", "C#7", "D7", "Eb7", "E7", "F7", "F#7", "G7", "Ab7", "A7", "Bb7", "B7", "C8", "C#8",
        "D8", "Eb8", "E8", "F8", "F#8", "G8", "Ab8", "A8", "Bb8", "B8", "C9", "C#9", "D9", "Eb9",
        "E9", "F9", "F#9", "G9",
    ];
    if (pitch as usize) < NAMES.len() {
        NAMES[pitch as usize]
    } else {
        "??"
    }
}

/// Clamp an arbitrary integer pitch into `[low, high]` and the MIDI range.
pub fn clamp_pitch(pitch: i32, low: u8, high: u8) -> u8 {
    pitch.clamp(low as i32, high as i32).clamp(0, 127) as u8
}
