// Note pairing check for decoded MIDI files.
//
// Reads an SMF with `midly`, turns each track into a list of `NoteEvent`s
// with absolute ticks, and pairs every note-on with the next note-off on the
// same key and channel. A note-on with velocity 0 counts as a note-off.
// Anything that does not pair up cleanly becomes an issue in the report.
// Used by the CLI's `check` subcommand and by tests that read back written
// files.
//
// `check_note_events` takes events in the order given. Decoded tracks are
// always in tick order, so `InvalidTiming` only shows up for event lists
// assembled by hand or merged from several sources.

use crate::error::Result;
use midly::{MidiMessage, Smf, Timing, TrackEventKind};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    /// A second note-on while the key was already sounding.
    MissingNoteOff,
    /// A note-off for a key that was not sounding.
    MissingNoteOn,
    /// A note-off earlier than its note-on. Never produced for a decoded
    /// SMF track, whose ticks only increase.
    InvalidTiming,
    /// A note-on that never received a note-off.
    UnclosedNote,
}

impl fmt::Display for IssueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            IssueKind::MissingNoteOff => "missing_note_off",
            IssueKind::MissingNoteOn => "missing_note_on",
            IssueKind::InvalidTiming => "invalid_timing",
            IssueKind::UnclosedNote => "unclosed_note",
        })
    }
}

/// A note-on or note-off at an absolute tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct NoteEvent {
    pub track: usize,
    pub tick: u64,
    pub channel: u8,
    pub key: u8,
    pub is_on: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NoteIssue {
    pub kind: IssueKind,
    pub track: usize,
    pub channel: u8,
    pub key: u8,
    /// Absolute tick where the problem was noticed.
    pub tick: u64,
}

impl fmt::Display for NoteIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] track {} channel {} note {} at tick {}",
            self.kind, self.track, self.channel, self.key, self.tick
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SmfReport {
    pub track_count: usize,
    /// `None` for timecode-based files.
    pub ticks_per_beat: Option<u16>,
    pub note_ons: usize,
    pub note_offs: usize,
    pub issues: Vec<NoteIssue>,
}

impl SmfReport {
    pub fn is_valid(&self) -> bool {
        self.issues.is_empty()
    }
}

impl fmt::Display for SmfReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} tracks, {} note-ons, {} note-offs",
            self.track_count, self.note_ons, self.note_offs
        )?;
        if self.is_valid() {
            return write!(f, "; no pairing issues");
        }
        write!(f, "; {} issue(s):", self.issues.len())?;
        for (i, issue) in self.issues.iter().enumerate() {
            write!(f, "\n  {}. {issue}", i + 1)?;
        }
        Ok(())
    }
}

/// Pair note-ons with note-offs, one track at a time, in the order given.
///
/// Returns the issues plus the note-on and note-off counts.
pub fn check_note_events(events: &[NoteEvent]) -> (Vec<NoteIssue>, usize, usize) {
    let mut issues = Vec::new();
    let (mut ons, mut offs) = (0, 0);
    // (track, channel, key) -> tick of the sounding note-on
    let mut active: BTreeMap<(usize, u8, u8), u64> = BTreeMap::new();

    for event in events {
        let issue = |kind, tick| NoteIssue {
            kind,
            track: event.track,
            channel: event.channel,
            key: event.key,
            tick,
        };
        let slot = (event.track, event.channel, event.key);

        if event.is_on {
            ons += 1;
            if let Some(started) = active.insert(slot, event.tick) {
                issues.push(issue(IssueKind::MissingNoteOff, started));
            }
        } else {
            offs += 1;
            match active.remove(&slot) {
                None => issues.push(issue(IssueKind::MissingNoteOn, event.tick)),
                Some(started) if started > event.tick => {
                    issues.push(issue(IssueKind::InvalidTiming, started));
                }
                Some(_) => {}
            }
        }
    }

    for ((track, channel, key), started) in active {
        issues.push(NoteIssue {
            kind: IssueKind::UnclosedNote,
            track,
            channel,
            key,
            tick: started,
        });
    }

    (issues, ons, offs)
}

/// Note events of a decoded SMF, track by track, with absolute ticks.
pub fn note_events(smf: &Smf<'_>) -> Vec<NoteEvent> {
    let mut events = Vec::new();
    for (track_idx, track) in smf.tracks.iter().enumerate() {
        let mut tick: u64 = 0;
        for event in track {
            tick += event.delta.as_int() as u64;
            let TrackEventKind::Midi { channel, message } = event.kind else {
                continue;
            };
            let (key, is_on) = match message {
                MidiMessage::NoteOn { key, vel } => (key.as_int(), vel.as_int() > 0),
                MidiMessage::NoteOff { key, .. } => (key.as_int(), false),
                _ => continue,
            };
            events.push(NoteEvent {
                track: track_idx,
                tick,
                channel: channel.as_int(),
                key,
                is_on,
            });
        }
    }
    events
}

/// Check an in-memory SMF.
pub fn check_smf(bytes: &[u8]) -> Result<SmfReport> {
    let smf = Smf::parse(bytes)?;
    let ticks_per_beat = match smf.header.timing {
        Timing::Metrical(tpb) => Some(tpb.as_int()),
        Timing::Timecode(..) => None,
    };
    let (issues, note_ons, note_offs) = check_note_events(&note_events(&smf));

    Ok(SmfReport {
        track_count: smf.tracks.len(),
        ticks_per_beat,
        note_ons,
        note_offs,
        issues,
    })
}

/// Read and check a `.mid` file.
pub fn check_file(path: &Path) -> Result<SmfReport> {
    let bytes = std::fs::read(path)?;
    check_smf(&bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::midi::{NoteSink, SmfWriter};
    use midly::num::{u4, u7, u28};
    use midly::{Format, Header, MetaMessage, TrackEvent};

    fn event(delta: u32, on: bool, key: u8, vel: u8) -> TrackEvent<'static> {
        let message = if on {
            MidiMessage::NoteOn {
                key: u7::new(key),
                vel: u7::new(vel),
            }
        } else {
            MidiMessage::NoteOff {
                key: u7::new(key),
                vel: u7::new(vel),
            }
        };
        TrackEvent {
            delta: u28::new(delta),
            kind: TrackEventKind::Midi {
                channel: u4::new(0),
                message,
            },
        }
    }

    fn encode(events: Vec<TrackEvent<'static>>) -> Vec<u8> {
        let mut smf = Smf::new(Header::new(
            Format::SingleTrack,
            Timing::Metrical(midly::num::u15::new(96)),
        ));
        let mut track = events;
        track.push(TrackEvent {
            delta: u28::new(0),
            kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
        });
        smf.tracks.push(track);
        let mut buf = Vec::new();
        smf.write_std(&mut buf).unwrap();
        buf
    }

    #[test]
    fn written_files_are_clean() {
        let mut writer = SmfWriter::new(120);
        for i in 0..8 {
            writer.add_note(0, 0, 60 + i, i as f64 * 0.5, 0.75, 100);
        }
        let report = check_smf(&writer.to_bytes().unwrap()).unwrap();
        assert!(report.is_valid(), "{report}");
        assert_eq!(report.track_count, 2);
        assert_eq!(report.ticks_per_beat, Some(480));
        assert_eq!(report.note_ons, 8);
        assert_eq!(report.note_offs, 8);
    }

    #[test]
    fn zero_velocity_note_on_closes_a_note() {
        let bytes = encode(vec![event(0, true, 60, 100), event(96, true, 60, 0)]);
        let report = check_smf(&bytes).unwrap();
        assert!(report.is_valid(), "{report}");
        assert_eq!(report.note_offs, 1);
    }

    #[test]
    fn detects_each_issue_kind() {
        let bytes = encode(vec![
            event(0, true, 60, 100),
            event(10, true, 60, 100),
            event(10, false, 60, 0),
            event(10, false, 62, 0),
            event(0, true, 64, 100),
        ]);
        let report = check_smf(&bytes).unwrap();
        let kinds: Vec<IssueKind> = report.issues.iter().map(|i| i.kind).collect();
        assert_eq!(
            kinds,
            vec![
                IssueKind::MissingNoteOff,
                IssueKind::MissingNoteOn,
                IssueKind::UnclosedNote
            ]
        );
        assert_eq!(report.issues[0].tick, 0);
        assert_eq!(report.issues[1].key, 62);
        assert_eq!(report.issues[2].tick, 30);
        assert!(report.to_string().contains("unclosed_note"));
    }

    #[test]
    fn note_off_before_its_note_on_is_invalid_timing() {
        let on = NoteEvent {
            track: 1,
            tick: 480,
            channel: 0,
            key: 60,
            is_on: true,
        };
        let off = NoteEvent {
            tick: 240,
            is_on: false,
            ..on
        };
        let (issues, ons, offs) = check_note_events(&[on, off]);
        assert_eq!((ons, offs), (1, 1));
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].kind, IssueKind::InvalidTiming);
        assert_eq!(issues[0].tick, 480);
    }

    #[test]
    fn same_key_on_other_tracks_pairs_separately() {
        let event = |track, tick, is_on| NoteEvent {
            track,
            tick,
            channel: 0,
            key: 64,
            is_on,
        };
        let events = [
            event(1, 0, true),
            event(2, 0, true),
            event(1, 96, false),
            event(2, 96, false),
        ];
        let (issues, _, _) = check_note_events(&events);
        assert!(issues.is_empty(), "{issues:?}");
    }

    #[test]
    fn garbage_is_an_error() {
        assert!(check_smf(b"not a midi file").is_err());
    }
}
