// Timing check for assembled songs.
//
// A note is playable when its duration is positive. Aggressive duration
// modulation can push durations to the 0 floor, and such notes become
// zero-length in the MIDI file, so this check runs before export. It only
// inspects; repairing is up to the caller.

use crate::song::{Note, Song};
use serde::Serialize;
use std::fmt;

/// How many violations a report keeps for display.
pub const MAX_REPORTED: usize = 5;

/// Where an unplayable note sits and what it looks like.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimingViolation {
    pub bar: usize,
    pub index: usize,
    pub pitch: u8,
    pub onset: f64,
    pub duration: f64,
}

impl fmt::Display for TimingViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "bar {} note {} (pitch {}, onset {:.3}): duration {:.3}",
            self.bar, self.index, self.pitch, self.onset, self.duration
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimingReport {
    pub total_notes: usize,
    pub invalid_notes: usize,
    /// The first `MAX_REPORTED` violations, in song order.
    pub violations: Vec<TimingViolation>,
}

impl TimingReport {
    pub fn is_valid(&self) -> bool {
        self.invalid_notes == 0
    }
}

impl fmt::Display for TimingReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_valid() {
            return write!(f, "all {} notes have positive duration", self.total_notes);
        }
        write!(
            f,
            "{} of {} notes have non-positive duration",
            self.invalid_notes, self.total_notes
        )?;
        for v in &self.violations {
            write!(f, "\n  {v}")?;
        }
        let hidden = self.invalid_notes - self.violations.len();
        if hidden > 0 {
            write!(f, "\n  ... and {hidden} more")?;
        }
        Ok(())
    }
}

pub fn validate_note(note: &Note) -> bool {
    note.duration > 0.0 && note.duration.is_finite()
}

pub fn inspect_song_timing(song: &Song) -> TimingReport {
    let mut report = TimingReport {
        total_notes: 0,
        invalid_notes: 0,
        violations: Vec::new(),
    };
    for (bar_idx, bar) in song.bars().iter().enumerate() {
        for (idx, note) in bar.notes.iter().enumerate() {
            report.total_notes += 1;
            if validate_note(note) {
                continue;
            }
            report.invalid_notes += 1;
            if report.violations.len() < MAX_REPORTED {
                report.violations.push(TimingViolation {
                    bar: bar_idx,
                    index: idx,
                    pitch: note.pitch,
                    onset: note.onset,
                    duration: note.duration,
                });
            }
        }
    }
    report
}

/// `(valid, human-readable summary)`.
pub fn validate_song_timing(song: &Song) -> (bool, String) {
    let report = inspect_song_timing(song);
    (report.is_valid(), report.to_string())
}
