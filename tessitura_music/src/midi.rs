// MIDI output for assembled compositions.
//
// Converts a Composition into a Standard MIDI File (SMF) Format 1: a tempo
// track (tempo and time signature) followed by one track per composition
// track carrying its name, program change and note on/off pairs. Note-offs
// sort before note-ons at the same tick so a repeated pitch re-attacks
// cleanly. Tracks on the percussion channel skip the program change.
//
// Uses the `midly` crate for MIDI writing. The composition's tick grid is
// the file's grid (TICKS_PER_BEAT per quarter note), so no rescaling.

use crate::error::SinkError;
use crate::rhythm::PERCUSSION_CHANNEL;
use crate::score::{Composition, TICKS_PER_BEAT, Track};
use midly::{
    Format, Header, MetaMessage, MidiMessage, Smf, Timing, TrackEvent, TrackEventKind,
    num::{u4, u7, u15, u24, u28},
};
use std::path::{Path, PathBuf};
use tracing::info;

/// Destination for a finished composition.
pub trait CompositionSink {
    fn write(&mut self, composition: &Composition) -> Result<(), SinkError>;
}

/// Writes each composition to a `.mid` file, replacing any existing file.
#[derive(Debug, Clone)]
pub struct MidiFileSink {
    path: PathBuf,
}

impl MidiFileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        MidiFileSink { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CompositionSink for MidiFileSink {
    fn write(&mut self, composition: &Composition) -> Result<(), SinkError> {
        let bytes = composition_to_smf_bytes(composition)?;
        std::fs::write(&self.path, &bytes).map_err(|source| SinkError::Io {
            path: self.path.display().to_string(),
            source,
        })?;
        info!(
            path = %self.path.display(),
            bytes = bytes.len(),
            tracks = composition.tracks.len(),
            "wrote MIDI file"
        );
        Ok(())
    }
}

/// Keeps the encoded bytes of the last composition in memory.
#[derive(Debug, Clone, Default)]
pub struct MidiBufferSink {
    pub bytes: Vec<u8>,
}

impl CompositionSink for MidiBufferSink {
    fn write(&mut self, composition: &Composition) -> Result<(), SinkError> {
        self.bytes = composition_to_smf_bytes(composition)?;
        Ok(())
    }
}

/// Encode a composition as SMF bytes.
pub fn composition_to_smf_bytes(composition: &Composition) -> Result<Vec<u8>, SinkError> {
    let smf = composition_to_smf(composition);
    let mut buf = Vec::new();
    smf.write_std(&mut buf)
        .map_err(|e| SinkError::Encode(e.to_string()))?;
    Ok(buf)
}

/// Convert a Composition to an in-memory SMF borrowing its track names.
pub fn composition_to_smf(composition: &Composition) -> Smf<'_> {
    let mut smf = Smf::new(Header::new(
        Format::Parallel,
        Timing::Metrical(u15::new(TICKS_PER_BEAT as u16)),
    ));

    // Track 0: tempo and meter
    let tempo_microseconds = 60_000_000 / composition.tempo_bpm.max(1) as u32;
    smf.tracks.push(vec![
        TrackEvent {
            delta: u28::new(0),
            kind: TrackEventKind::Meta(MetaMessage::Tempo(u24::new(tempo_microseconds))),
        },
        TrackEvent {
            delta: u28::new(0),
            kind: TrackEventKind::Meta(MetaMessage::TimeSignature(
                composition.beats_per_bar,
                2,
                24,
                8,
            )),
        },
        TrackEvent {
            delta: u28::new(0),
            kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
        },
    ]);

    for track in &composition.tracks {
        smf.tracks.push(track_events(track));
    }
    smf
}

/// A note boundary on the absolute tick grid.
struct Edge {
    tick: u32,
    on: bool,
    pitch: u8,
    velocity: u8,
    channel: u8,
}

fn track_events(track: &Track) -> Vec<TrackEvent<'_>> {
    let mut events = vec![TrackEvent {
        delta: u28::new(0),
        kind: TrackEventKind::Meta(MetaMessage::TrackName(track.name.as_bytes())),
    }];
    if track.channel != PERCUSSION_CHANNEL {
        events.push(TrackEvent {
            delta: u28::new(0),
            kind: TrackEventKind::Midi {
                channel: u4::new(track.channel),
                message: MidiMessage::ProgramChange {
                    program: u7::new(track.program),
                },
            },
        });
    }

    let mut edges: Vec<Edge> = Vec::with_capacity(track.events.len() * 2);
    for note in &track.events {
        edges.push(Edge {
            tick: note.start,
            on: true,
            pitch: note.pitch,
            velocity: note.velocity,
            channel: note.channel,
        });
        edges.push(Edge {
            tick: note.end(),
            on: false,
            pitch: note.pitch,
            velocity: 0,
            channel: note.channel,
        });
    }
    // Offs (false) before ons (true) at the same tick.
    edges.sort_by_key(|e| (e.tick, e.on, e.pitch));

    let mut last_tick = 0;
    for edge in &edges {
        let key = u7::new(edge.pitch);
        let message = if edge.on {
            MidiMessage::NoteOn {
                key,
                vel: u7::new(edge.velocity),
            }
        } else {
            MidiMessage::NoteOff { key, vel: u7::new(0) }
        };
        events.push(TrackEvent {
            delta: u28::new(edge.tick - last_tick),
            kind: TrackEventKind::Midi {
                channel: u4::new(edge.channel),
                message,
            },
        });
        last_tick = edge.tick;
    }

    let end = track.end_tick.max(last_tick);
    events.push(TrackEvent {
        delta: u28::new(end - last_tick),
        kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
    });
    events
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::score::{NoteEvent, TrackRole};

    fn note(pitch: u8, start: u32, duration: u32, channel: u8) -> NoteEvent {
        NoteEvent::new(pitch, 90, start, duration, channel).unwrap()
    }

    fn composition() -> Composition {
        Composition {
            tempo_bpm: 100,
            beats_per_bar: 3,
            bars: 1,
            tracks: vec![
                Track {
                    name: "melody".to_string(),
                    role: TrackRole::Melody,
                    channel: 0,
                    program: 0,
                    events: vec![note(60, 0, 480, 0), note(60, 480, 480, 0)],
                    end_tick: 1440,
                },
                Track {
                    name: "rhythm".to_string(),
                    role: TrackRole::Rhythm,
                    channel: 9,
                    program: 0,
                    events: vec![note(36, 0, 240, 9)],
                    end_tick: 1440,
                },
            ],
        }
    }

    #[test]
    fn test_tracks_and_header() {
        let c = composition();
        let smf = composition_to_smf(&c);
        assert_eq!(smf.tracks.len(), 3);
        assert_eq!(smf.header.format, Format::Parallel);
        assert_eq!(smf.header.timing, Timing::Metrical(u15::new(480)));
        assert_eq!(
            smf.tracks[0][0].kind,
            TrackEventKind::Meta(MetaMessage::Tempo(u24::new(600_000)))
        );
    }

    #[test]
    fn test_note_off_precedes_reattack() {
        let c = composition();
        let smf = composition_to_smf(&c);
        let melody = &smf.tracks[1];
        // name, program, on, off, on, off, end
        assert_eq!(melody.len(), 7);
        assert!(matches!(
            melody[3].kind,
            TrackEventKind::Midi {
                message: MidiMessage::NoteOff { .. },
                ..
            }
        ));
        assert_eq!(melody[3].delta, u28::new(480));
        assert!(matches!(
            melody[4].kind,
            TrackEventKind::Midi {
                message: MidiMessage::NoteOn { .. },
                ..
            }
        ));
        assert_eq!(melody[4].delta, u28::new(0));
        // End of track padded to the piece length.
        assert_eq!(melody[6].delta, u28::new(480));
    }

    #[test]
    fn test_percussion_track_has_no_program_change() {
        let c = composition();
        let smf = composition_to_smf(&c);
        let rhythm = &smf.tracks[2];
        assert!(!rhythm.iter().any(|e| matches!(
            e.kind,
            TrackEventKind::Midi {
                message: MidiMessage::ProgramChange { .. },
                ..
            }
        )));
        assert!(matches!(
            rhythm[1].kind,
            TrackEventKind::Midi { channel, .. } if channel == u4::new(9)
        ));
    }

    #[test]
    fn test_bytes_parse_back() {
        let c = composition();
        let bytes = composition_to_smf_bytes(&c).unwrap();
        let parsed = Smf::parse(&bytes).unwrap();
        assert_eq!(parsed.tracks.len(), 1 + c.tracks.len());
        let mut sink = MidiBufferSink::default();
        sink.write(&c).unwrap();
        assert_eq!(sink.bytes, bytes);
    }

    #[test]
    fn test_file_sink_writes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.mid");
        let mut sink = MidiFileSink::new(&path);
        sink.write(&composition()).unwrap();
        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(&bytes[..4], b"MThd");

        let mut bad = MidiFileSink::new(dir.path().join("missing/out.mid"));
        assert!(matches!(
            bad.write(&composition()),
            Err(SinkError::Io { .. })
        ));
    }
}
