// Bass line derived from the chord timeline.
//
// Two styles:
// - root: the chord root at the bass octave, held for the whole entry.
// - walking: one note per beat. The first beat of an entry is the root, the
//   middle beats cycle through the other chord tones (third, fifth, ...),
//   and the last beat is an approach tone: the scale neighbour of the next
//   entry's root, from below when the line rises to it and from above
//   otherwise. The final entry has no next chord and ends on its fifth.
//
// The bass draws nothing from the rng; it is a pure function of the
// timeline.

use crate::context::{Chord, GenerationContext, Voicing};
use crate::error::{ConfigError, GenerationError};
use crate::score::{NoteEvent, clamp_pitch};
use crate::theory::Key;

const ROOT_VELOCITY: u8 = 96;
const WALK_VELOCITY: u8 = 84;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BassStyle {
    #[default]
    Root,
    Walking,
}

impl BassStyle {
    pub fn from_name(name: &str) -> Result<Self, ConfigError> {
        match name.to_ascii_lowercase().as_str() {
            "root" => Ok(BassStyle::Root),
            "walking" => Ok(BassStyle::Walking),
            _ => Err(ConfigError::UnknownName {
                kind: "bass style",
                name: name.to_string(),
            }),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            BassStyle::Root => "root",
            BassStyle::Walking => "walking",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BassOptions {
    pub style: BassStyle,
    pub octave: i32,
    pub channel: u8,
}

impl Default for BassOptions {
    fn default() -> Self {
        BassOptions {
            style: BassStyle::Root,
            octave: 2,
            channel: 2,
        }
    }
}

/// Derive the bass line for the whole piece.
pub fn derive_bass(
    ctx: &GenerationContext,
    opts: &BassOptions,
) -> Result<Vec<NoteEvent>, GenerationError> {
    let bar = ctx.bar_ticks();
    let beat = ctx.beat_ticks();
    let entries = ctx.timeline.entries();
    let mut events = Vec::new();

    for (i, entry) in entries.iter().enumerate() {
        let start = entry.start_bar * bar;
        let root = root_at(&ctx.key, &entry.chord, opts.octave);
        match opts.style {
            BassStyle::Root => {
                events.push(NoteEvent::new(
                    root,
                    ROOT_VELOCITY,
                    start,
                    entry.duration_bars * bar,
                    opts.channel,
                )?);
            }
            BassStyle::Walking => {
                let beats = entry.duration_bars * ctx.beats_per_bar as u32;
                let upper = upper_tones(&ctx.key, &entry.chord, opts.octave);
                let approach = match entries.get(i + 1) {
                    Some(next) => approach_tone(&ctx.key, root, &next.chord, opts.octave),
                    None => upper.get(1).or(upper.first()).copied().unwrap_or(root),
                };
                for b in 0..beats {
                    let (pitch, velocity) = if b == 0 {
                        (root, ROOT_VELOCITY)
                    } else if b + 1 == beats {
                        (approach, WALK_VELOCITY)
                    } else if upper.is_empty() {
                        (root, WALK_VELOCITY)
                    } else {
                        (upper[(b as usize - 1) % upper.len()], WALK_VELOCITY)
                    };
                    events.push(NoteEvent::new(
                        pitch,
                        velocity,
                        start + b * beat,
                        beat,
                        opts.channel,
                    )?);
                }
            }
        }
    }
    Ok(events)
}

fn root_at(key: &Key, chord: &Chord, octave: i32) -> u8 {
    clamp_pitch(chord.root_pitch(key, octave), 0, 127)
}

/// Close-voiced chord tones above the root.
fn upper_tones(key: &Key, chord: &Chord, octave: i32) -> Vec<u8> {
    let plain = Chord::new(chord.degree, chord.quality);
    plain
        .pitches(key, octave, Voicing::Close, false)
        .into_iter()
        .skip(1)
        .collect()
}

/// Scale neighbour of the next chord's root, approached from the side the
/// line is coming from.
fn approach_tone(key: &Key, current_root: u8, next: &Chord, octave: i32) -> u8 {
    let target = next.root_pitch(key, octave);
    let neighbour = if target > current_root as i32 {
        key.resolve(next.degree as i32 - 1, octave)
    } else {
        key.resolve(next.degree as i32 + 1, octave)
    };
    clamp_pitch(neighbour, 0, 127)
}
