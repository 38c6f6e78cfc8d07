// Sinusoidal modulation of note fields.
//
// A modulation adds `amplitude * sin(phase_argument)` to one field of every
// note. The phase argument depends on the convention:
//
// - `ContinuousRaw`:     frequency * onset
// - `ContinuousRadians`: 2π * frequency * onset (frequency in cycles/beat)
// - `BarRelative`:       frequency * (onset - bar.onset)
//
// Continuous conventions run one wave across the whole song. `BarRelative`
// restarts the wave at each bar's onset, so bars with the same note count
// and ioi receive the same sequence of offsets.
//
// The onset used is the note's current onset, read before the update.
// Results are clamped: pitch and velocity are rounded and held in 0..=127,
// duration and onset are floored at 0. A non-finite offset leaves the field
// alone. The note count and order never change.

use crate::song::{Bar, Note, Song, clamp_midi};
use serde::{Deserialize, Serialize};
use std::f64::consts::TAU;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoteField {
    Pitch,
    Duration,
    Velocity,
    Onset,
}

impl fmt::Display for NoteField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            NoteField::Pitch => "pitch",
            NoteField::Duration => "duration",
            NoteField::Velocity => "velocity",
            NoteField::Onset => "onset",
        })
    }
}

/// How the sine argument is derived from a note's position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseConvention {
    #[default]
    ContinuousRaw,
    ContinuousRadians,
    BarRelative,
}

impl PhaseConvention {
    /// Sine argument for a note at `onset` inside a bar starting at
    /// `bar_onset`.
    pub fn argument(self, frequency: f64, onset: f64, bar_onset: f64) -> f64 {
        match self {
            PhaseConvention::ContinuousRaw => frequency * onset,
            PhaseConvention::ContinuousRadians => TAU * frequency * onset,
            PhaseConvention::BarRelative => frequency * (onset - bar_onset),
        }
    }
}

/// One sinusoidal perturbation of one note field.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Modulation {
    pub field: NoteField,
    pub frequency: f64,
    pub amplitude: f64,
    #[serde(default)]
    pub phase: PhaseConvention,
}

impl Modulation {
    pub fn new(field: NoteField, frequency: f64, amplitude: f64, phase: PhaseConvention) -> Self {
        Modulation {
            field,
            frequency,
            amplitude,
            phase,
        }
    }

    /// Offset this modulation adds at the given position.
    pub fn offset(&self, onset: f64, bar_onset: f64) -> f64 {
        self.amplitude * self.phase.argument(self.frequency, onset, bar_onset).sin()
    }

    pub fn apply_to_note(&self, note: &mut Note, bar_onset: f64) {
        let offset = self.offset(note.onset, bar_onset);
        if !offset.is_finite() {
            return;
        }
        match self.field {
            NoteField::Pitch => note.pitch = clamp_midi(note.pitch as f64 + offset),
            NoteField::Velocity => note.velocity = clamp_midi(note.velocity as f64 + offset),
            NoteField::Duration => note.duration = (note.duration + offset).max(0.0),
            NoteField::Onset => note.onset = (note.onset + offset).max(0.0),
        }
    }

    pub fn apply_to_bars(&self, bars: &mut [Bar]) {
        for bar in bars {
            let bar_onset = bar.onset;
            for note in &mut bar.notes {
                self.apply_to_note(note, bar_onset);
            }
        }
    }
}

impl Song {
    /// Apply a modulation to every note of the song.
    pub fn modulate(&mut self, modulation: &Modulation) {
        log::debug!(
            "modulating {} of {:?}: freq {} amp {} ({:?})",
            modulation.field,
            self.name(),
            modulation.frequency,
            modulation.amplitude,
            modulation.phase
        );
        modulation.apply_to_bars(self.bars_mut());
    }

    fn modulate_field(&mut self, field: NoteField, freq: f64, amp: f64, phase: PhaseConvention) {
        self.modulate(&Modulation::new(field, freq, amp, phase));
    }

    pub fn modulate_pitch_with_sin(&mut self, freq: f64, amp: f64) {
        self.modulate_field(NoteField::Pitch, freq, amp, PhaseConvention::ContinuousRaw);
    }

    pub fn modulate_duration_with_sin(&mut self, freq: f64, amp: f64) {
        self.modulate_field(NoteField::Duration, freq, amp, PhaseConvention::ContinuousRaw);
    }

    pub fn modulate_velocity_with_sin(&mut self, freq: f64, amp: f64) {
        self.modulate_field(NoteField::Velocity, freq, amp, PhaseConvention::ContinuousRaw);
    }

    pub fn modulate_onset_with_sin(&mut self, freq: f64, amp: f64) {
        self.modulate_field(NoteField::Onset, freq, amp, PhaseConvention::ContinuousRaw);
    }

    pub fn modulate_pitch_with_sin_phase_by_bar(&mut self, freq: f64, amp: f64) {
        self.modulate_field(NoteField::Pitch, freq, amp, PhaseConvention::BarRelative);
    }

    pub fn modulate_duration_with_sin_phase_by_bar(&mut self, freq: f64, amp: f64) {
        self.modulate_field(NoteField::Duration, freq, amp, PhaseConvention::BarRelative);
    }

    pub fn modulate_velocity_with_sin_phase_by_bar(&mut self, freq: f64, amp: f64) {
        self.modulate_field(NoteField::Velocity, freq, amp, PhaseConvention::BarRelative);
    }

    pub fn modulate_onset_with_sin_phase_by_bar(&mut self, freq: f64, amp: f64) {
        self.modulate_field(NoteField::Onset, freq, amp, PhaseConvention::BarRelative);
    }
}
