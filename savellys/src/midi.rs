// MIDI file output.
//
// Songs are handed to a `NoteSink` one note at a time as
// `(track, channel, pitch, onset, duration, velocity)`, with onset and
// duration in quarter-note beats. `SmfWriter` is the sink that produces a
// Standard MIDI File through the `midly` crate: SMF format 1, track 0 holds
// the tempo, tracks 1.. hold notes.
//
// Within a track, events are sorted by tick with note-offs ahead of
// note-ons at the same tick, so a note that ends exactly where the next one
// on the same key begins does not swallow it. Overlapping notes on the same
// key and channel are cut at the next note's start (a note starting on the
// same tick as a later-added one is dropped), so every note-on is closed
// before the key sounds again. Notes that round to zero ticks, and notes
// with velocity 0 (which a reader would take as a note-off), are left out.

use crate::error::Result;
use crate::song::Song;
use midly::{
    Format, Header, MetaMessage, MidiMessage, Smf, Timing, Track, TrackEvent, TrackEventKind,
    num::{u4, u7, u15, u24, u28},
};
use std::path::Path;

/// Ticks per quarter note in written files.
pub const TICKS_PER_QUARTER: u16 = 480;

/// Tempo used when none is configured.
pub const DEFAULT_TEMPO_BPM: u16 = 120;

/// Largest value a 24-bit tempo field holds.
const MAX_TEMPO_MICROS: u32 = 0x00FF_FFFF;

/// Largest value a 28-bit delta holds.
const MAX_DELTA: u32 = 0x0FFF_FFFF;

/// Anything that accepts timed notes.
pub trait NoteSink {
    fn add_note(
        &mut self,
        track: usize,
        channel: u8,
        pitch: u8,
        onset: f64,
        duration: f64,
        velocity: u8,
    );
}

/// Convert beats to ticks, rounding to nearest and clamping at zero.
pub fn beats_to_ticks(beats: f64) -> u32 {
    if !beats.is_finite() || beats <= 0.0 {
        return 0;
    }
    (beats * TICKS_PER_QUARTER as f64)
        .round()
        .min(MAX_DELTA as f64) as u32
}

#[derive(Debug, Clone, Copy)]
struct TimedEvent {
    tick: u32,
    /// Note-offs sort before note-ons at the same tick.
    is_on: bool,
    channel: u8,
    key: u8,
    vel: u8,
}

#[derive(Debug, Clone, Copy)]
struct TickNote {
    start: u32,
    end: u32,
    channel: u8,
    key: u8,
    vel: u8,
}

#[derive(Debug, Clone, Default)]
struct TrackBuffer {
    name: Option<String>,
    notes: Vec<TickNote>,
}

/// Collects notes and renders them as a format-1 SMF.
#[derive(Debug, Clone)]
pub struct SmfWriter {
    tempo_bpm: u16,
    tracks: Vec<TrackBuffer>,
    skipped: usize,
}

impl SmfWriter {
    pub fn new(tempo_bpm: u16) -> Self {
        SmfWriter {
            tempo_bpm: tempo_bpm.max(1),
            tracks: Vec::new(),
            skipped: 0,
        }
    }

    fn track_mut(&mut self, track: usize) -> &mut TrackBuffer {
        if self.tracks.len() <= track {
            self.tracks.resize_with(track + 1, TrackBuffer::default);
        }
        &mut self.tracks[track]
    }

    pub fn set_track_name(&mut self, track: usize, name: &str) {
        self.track_mut(track).name = Some(name.to_string());
    }

    /// Number of notes left out because they could not sound.
    pub fn skipped_notes(&self) -> usize {
        self.skipped
    }

    pub fn to_smf(&self) -> Smf<'_> {
        let mut smf = Smf::new(Header::new(
            Format::Parallel,
            Timing::Metrical(u15::new(TICKS_PER_QUARTER)),
        ));

        let tempo_micros = (60_000_000 / self.tempo_bpm as u32).min(MAX_TEMPO_MICROS);
        let tempo_track: Track<'_> = vec![
            TrackEvent {
                delta: u28::new(0),
                kind: TrackEventKind::Meta(MetaMessage::Tempo(u24::new(tempo_micros))),
            },
            TrackEvent {
                delta: u28::new(0),
                kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
            },
        ];
        smf.tracks.push(tempo_track);

        for buffer in &self.tracks {
            smf.tracks.push(render_track(buffer));
        }
        smf
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        self.to_smf().write_std(&mut buf)?;
        Ok(buf)
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.to_bytes()?)?;
        Ok(())
    }
}

impl NoteSink for SmfWriter {
    fn add_note(
        &mut self,
        track: usize,
        channel: u8,
        pitch: u8,
        onset: f64,
        duration: f64,
        velocity: u8,
    ) {
        let start = beats_to_ticks(onset);
        let end = beats_to_ticks(onset + duration);
        if end <= start || velocity == 0 {
            log::warn!(
                "skipping silent note: pitch {pitch} onset {onset:.3} duration {duration:.3} \
                 velocity {velocity}"
            );
            self.skipped += 1;
            return;
        }
        let channel = channel & 0x0F;
        let key = pitch.min(127);
        let vel = velocity.min(127);
        self.track_mut(track).notes.push(TickNote {
            start,
            end,
            channel,
            key,
            vel,
        });
    }
}

fn render_track(buffer: &TrackBuffer) -> Track<'_> {
    let mut track: Track<'_> = Vec::with_capacity(buffer.notes.len() * 2 + 2);
    if let Some(name) = &buffer.name {
        track.push(TrackEvent {
            delta: u28::new(0),
            kind: TrackEventKind::Meta(MetaMessage::TrackName(name.as_bytes())),
        });
    }

    let mut events: Vec<TimedEvent> = Vec::with_capacity(buffer.notes.len() * 2);
    for note in deinterleave(&buffer.notes) {
        events.push(TimedEvent {
            tick: note.start,
            is_on: true,
            channel: note.channel,
            key: note.key,
            vel: note.vel,
        });
        events.push(TimedEvent {
            tick: note.end,
            is_on: false,
            channel: note.channel,
            key: note.key,
            vel: 0,
        });
    }
    events.sort_by_key(|e| (e.tick, e.is_on));

    let mut last_tick = 0u32;
    for e in events {
        let message = if e.is_on {
            MidiMessage::NoteOn {
                key: u7::new(e.key),
                vel: u7::new(e.vel),
            }
        } else {
            MidiMessage::NoteOff {
                key: u7::new(e.key),
                vel: u7::new(0),
            }
        };
        track.push(TrackEvent {
            delta: u28::new((e.tick - last_tick).min(MAX_DELTA)),
            kind: TrackEventKind::Midi {
                channel: u4::new(e.channel),
                message,
            },
        });
        last_tick = e.tick;
    }

    track.push(TrackEvent {
        delta: u28::new(0),
        kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
    });
    track
}

/// Remove same-key overlaps: each note ends no later than the next note on
/// its key and channel starts. Of two notes starting on the same tick, the
/// one added last is kept.
fn deinterleave(notes: &[TickNote]) -> Vec<TickNote> {
    let mut order: Vec<usize> = (0..notes.len()).collect();
    order.sort_by_key(|&i| (notes[i].channel, notes[i].key, notes[i].start, i));

    let mut kept: Vec<TickNote> = Vec::with_capacity(notes.len());
    for i in order {
        let note = notes[i];
        match kept.last_mut() {
            Some(prev)
                if prev.channel == note.channel
                    && prev.key == note.key
                    && prev.start == note.start =>
            {
                log::debug!("dropping note {} at tick {}: restruck", prev.key, prev.start);
                *prev = note;
            }
            Some(prev)
                if prev.channel == note.channel
                    && prev.key == note.key
                    && prev.end > note.start =>
            {
                prev.end = note.start;
                kept.push(note);
            }
            _ => kept.push(note),
        }
    }
    kept
}

/// Feed every note of `song` into `sink` on the given track and channel.
pub fn emit_song(song: &Song, sink: &mut impl NoteSink, track: usize, channel: u8) {
    for note in song.notes() {
        sink.add_note(
            track,
            channel,
            note.pitch,
            note.onset,
            note.duration,
            note.velocity,
        );
    }
}

/// Encode a song as a single-voice SMF.
pub fn song_to_bytes(song: &Song, tempo_bpm: u16) -> Result<Vec<u8>> {
    let mut writer = SmfWriter::new(tempo_bpm);
    writer.set_track_name(0, song.name());
    emit_song(song, &mut writer, 0, 0);
    if writer.skipped_notes() > 0 {
        log::warn!(
            "{} of {} notes in {:?} were not written",
            writer.skipped_notes(),
            song.note_count(),
            song.name()
        );
    }
    writer.to_bytes()
}

/// Write a song to a `.mid` file.
pub fn write_song(song: &Song, path: &Path, tempo_bpm: u16) -> Result<()> {
    let bytes = song_to_bytes(song, tempo_bpm)?;
    std::fs::write(path, &bytes)?;
    log::info!("wrote {} bytes to {}", bytes.len(), path.display());
    Ok(())
}
