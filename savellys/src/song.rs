// Note, bar and song model.
//
// A song is built from three parallel parameter lists (pitch, duration,
// velocity). Each bar takes the lists index-wise, one note per index,
// spaced `ioi` beats apart from the bar's onset; bars follow each other
// with no gap, so a bar's onset is the sum of `ioi * note_count` over the
// bars before it. Lists come either from grammar-backed `ListGenerator`s
// or, when a generator is missing, from a constant default list.
//
// Lists are passed into each bar explicitly. With `generate_every_bar` the
// song draws fresh lists before each bar; otherwise it draws them once and
// every bar repeats the same material.
//
// Besides assembly, this module holds the structural transforms
// (transpose, retrograde, shuffle, jitter). Sinusoidal modulation lives in
// `modulate.rs`.

use crate::error::{Error, Result};
use crate::list_gen::{ListGenerator, ParameterValues, ValueKind};
use savellys_prng::SongRng;
use serde::{Deserialize, Serialize};

/// Highest valid MIDI pitch / velocity.
pub const MIDI_MAX: u8 = 127;

/// Length of the constant lists used when a generator is absent.
pub const DEFAULT_LIST_LENGTH: usize = 8;
pub const DEFAULT_PITCH: u8 = 60;
pub const DEFAULT_DURATION: f64 = 1.0;
pub const DEFAULT_VELOCITY: u8 = 100;

/// A single note. Times are in beats.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Note {
    pub pitch: u8,
    pub onset: f64,
    pub duration: f64,
    pub velocity: u8,
}

impl Default for Note {
    fn default() -> Self {
        Note {
            pitch: DEFAULT_PITCH,
            onset: 0.0,
            duration: DEFAULT_DURATION,
            velocity: DEFAULT_VELOCITY,
        }
    }
}

/// Round and clamp a value into the MIDI data byte range.
pub fn clamp_midi(value: f64) -> u8 {
    if value.is_nan() {
        return 0;
    }
    value.round().clamp(0.0, MIDI_MAX as f64) as u8
}

/// A run of notes starting at `onset`, spaced `ioi` apart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub onset: f64,
    pub ioi: f64,
    pub notes: Vec<Note>,
}

impl Bar {
    /// Build a bar index-wise from aligned parameter lists. Trailing values
    /// of a longer list are ignored.
    pub fn from_lists(onset: f64, ioi: f64, lists: &ParameterLists) -> Self {
        let notes = lists
            .pitches
            .iter()
            .zip(&lists.durations)
            .zip(&lists.velocities)
            .enumerate()
            .map(|(k, ((&pitch, &duration), &velocity))| Note {
                pitch,
                onset: onset + k as f64 * ioi,
                duration,
                velocity,
            })
            .collect();
        Bar { onset, ioi, notes }
    }

    /// Time span the bar occupies in the note grid.
    pub fn span(&self) -> f64 {
        self.ioi * self.notes.len() as f64
    }

    pub fn transpose(&mut self, semitones: i32) {
        for note in &mut self.notes {
            note.pitch = clamp_midi(note.pitch as f64 + semitones as f64);
        }
    }

    pub fn set_durations(&mut self, duration: f64) {
        for note in &mut self.notes {
            note.duration = duration.max(0.0);
        }
    }

    /// Retrograde: the notes play in reverse order on the same onset grid.
    pub fn reverse(&mut self) {
        let onsets: Vec<f64> = self.notes.iter().map(|n| n.onset).collect();
        self.notes.reverse();
        for (note, onset) in self.notes.iter_mut().zip(onsets) {
            note.onset = onset;
        }
    }

    /// Move the bar and all its notes so that it starts at `onset`.
    fn shift_to(&mut self, onset: f64) {
        let delta = onset - self.onset;
        self.onset = onset;
        for note in &mut self.notes {
            note.onset = (note.onset + delta).max(0.0);
        }
    }

    /// Shift each pitch by a uniform amount in `-max..=max` semitones. Only
    /// the magnitude of `max_semitones` matters.
    pub fn jitter_pitch(&mut self, max_semitones: i64, rng: &mut SongRng) {
        let bound = midi_bound(max_semitones);
        for note in &mut self.notes {
            let delta = rng.range_i64_inclusive(-bound, bound);
            note.pitch = clamp_midi(note.pitch as f64 + delta as f64);
        }
    }

    pub fn jitter_velocity(&mut self, max_delta: i64, rng: &mut SongRng) {
        let bound = midi_bound(max_delta);
        for note in &mut self.notes {
            let delta = rng.range_i64_inclusive(-bound, bound);
            note.velocity = clamp_midi(note.velocity as f64 + delta as f64);
        }
    }

    pub fn jitter_onset(&mut self, max_delta: f64, rng: &mut SongRng) {
        for note in &mut self.notes {
            note.onset = (note.onset + symmetric(max_delta, rng)).max(0.0);
        }
    }

    pub fn jitter_duration(&mut self, max_delta: f64, rng: &mut SongRng) {
        for note in &mut self.notes {
            note.duration = (note.duration + symmetric(max_delta, rng)).max(0.0);
        }
    }
}

/// Magnitude of an integer jitter bound, capped at the MIDI data range.
fn midi_bound(max: i64) -> i64 {
    max.unsigned_abs().min(MIDI_MAX as u64) as i64
}

/// Uniform value in `[-|max|, |max|)`, or zero when `max` is zero or not
/// finite.
fn symmetric(max: f64, rng: &mut SongRng) -> f64 {
    let max = max.abs();
    if max > 0.0 && max.is_finite() {
        rng.range_f64(-max, max)
    } else {
        0.0
    }
}

/// How three lists of different lengths are made to line up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LengthPolicy {
    /// Cut every list to the shortest one.
    #[default]
    Truncate,
    /// Repeat the shorter lists cyclically up to the longest one.
    LoopToLongest,
}

/// Three aligned parameter lists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterLists {
    pub pitches: Vec<u8>,
    pub durations: Vec<f64>,
    pub velocities: Vec<u8>,
}

impl Default for ParameterLists {
    fn default() -> Self {
        ParameterLists {
            pitches: vec![DEFAULT_PITCH; DEFAULT_LIST_LENGTH],
            durations: vec![DEFAULT_DURATION; DEFAULT_LIST_LENGTH],
            velocities: vec![DEFAULT_VELOCITY; DEFAULT_LIST_LENGTH],
        }
    }
}

impl ParameterLists {
    /// Align three raw lists according to `policy`.
    pub fn reconciled(
        pitches: Vec<u8>,
        durations: Vec<f64>,
        velocities: Vec<u8>,
        policy: LengthPolicy,
    ) -> Self {
        let lens = [pitches.len(), durations.len(), velocities.len()];
        let shortest = lens.iter().copied().min().unwrap_or(0);
        let target = match policy {
            LengthPolicy::Truncate => shortest,
            // A list with nothing in it cannot be looped.
            LengthPolicy::LoopToLongest if shortest == 0 => 0,
            LengthPolicy::LoopToLongest => lens.iter().copied().max().unwrap_or(0),
        };
        ParameterLists {
            pitches: fit_length(pitches, target),
            durations: fit_length(durations, target),
            velocities: fit_length(velocities, target),
        }
    }

    /// Common length of the three lists.
    pub fn len(&self) -> usize {
        self.pitches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pitches.is_empty()
    }
}

fn fit_length<T: Clone>(mut values: Vec<T>, target: usize) -> Vec<T> {
    if values.len() >= target {
        values.truncate(target);
        values
    } else {
        values.iter().cloned().cycle().take(target).collect()
    }
}

/// Optional generator per note parameter.
#[derive(Debug, Clone, Default)]
pub struct ParameterGenerators {
    pub pitch: Option<ListGenerator>,
    pub duration: Option<ListGenerator>,
    pub velocity: Option<ListGenerator>,
}

/// Shape of a song, independent of where its material comes from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SongParams {
    pub name: String,
    pub num_bars: usize,
    /// Inter-onset interval in beats.
    pub ioi: f64,
    /// Draw fresh parameter lists before every bar.
    pub generate_every_bar: bool,
    pub length_policy: LengthPolicy,
}

impl Default for SongParams {
    fn default() -> Self {
        SongParams {
            name: "Untitled".to_string(),
            num_bars: 4,
            ioi: 1.0,
            generate_every_bar: false,
            length_policy: LengthPolicy::Truncate,
        }
    }
}

impl SongParams {
    pub fn validate(&self) -> Result<()> {
        if self.num_bars == 0 {
            return Err(Error::InvalidSongConfiguration(
                "a song needs at least one bar".to_string(),
            ));
        }
        if !self.ioi.is_finite() || self.ioi <= 0.0 {
            return Err(Error::InvalidSongConfiguration(format!(
                "inter-onset interval must be positive, got {}",
                self.ioi
            )));
        }
        Ok(())
    }
}

/// A sequence of bars plus the generators that fill them.
#[derive(Debug, Clone)]
pub struct Song {
    pub params: SongParams,
    generators: ParameterGenerators,
    lists: Option<ParameterLists>,
    bars: Vec<Bar>,
}

impl Song {
    pub fn new(params: SongParams, generators: ParameterGenerators) -> Result<Self> {
        params.validate()?;
        Ok(Song {
            params,
            generators,
            lists: None,
            bars: Vec::new(),
        })
    }

    /// A song whose every bar uses the given lists. Regeneration keeps
    /// returning them since there are no generators.
    pub fn from_lists(mut params: SongParams, lists: ParameterLists) -> Result<Self> {
        params.validate()?;
        params.generate_every_bar = false;
        let lists = ParameterLists::reconciled(
            lists.pitches,
            lists.durations,
            lists.velocities,
            params.length_policy,
        );
        Ok(Song {
            params,
            generators: ParameterGenerators::default(),
            lists: Some(lists),
            bars: Vec::new(),
        })
    }

    pub fn name(&self) -> &str {
        &self.params.name
    }

    pub fn ioi(&self) -> f64 {
        self.params.ioi
    }

    pub fn bars(&self) -> &[Bar] {
        &self.bars
    }

    pub fn bars_mut(&mut self) -> &mut [Bar] {
        &mut self.bars
    }

    /// The lists most recently used for bar assembly, if any.
    pub fn parameter_lists(&self) -> Option<&ParameterLists> {
        self.lists.as_ref()
    }

    pub fn notes(&self) -> impl Iterator<Item = &Note> {
        self.bars.iter().flat_map(|b| b.notes.iter())
    }

    pub fn note_count(&self) -> usize {
        self.bars.iter().map(|b| b.notes.len()).sum()
    }

    /// End of the last sounding note, in beats.
    pub fn end_time(&self) -> f64 {
        self.notes()
            .map(|n| n.onset + n.duration)
            .fold(0.0, f64::max)
    }

    /// Draw new parameter lists, replacing the current ones.
    ///
    /// A song built with `from_lists` keeps its lists.
    pub fn generate_parameter_lists(&mut self, rng: &mut SongRng) -> Result<&ParameterLists> {
        let gens = &self.generators;
        if gens.pitch.is_none() && gens.duration.is_none() && gens.velocity.is_none() {
            if self.lists.is_none() {
                self.lists = Some(ParameterLists::default());
            }
        } else {
            let pitches = match &gens.pitch {
                Some(g) => to_midi_bytes(g.generate_list(rng)?, ValueKind::Pitch),
                None => vec![DEFAULT_PITCH; DEFAULT_LIST_LENGTH],
            };
            let durations = match &gens.duration {
                Some(g) => g.generate_list(rng)?.to_floats(),
                None => vec![DEFAULT_DURATION; DEFAULT_LIST_LENGTH],
            };
            let velocities = match &gens.velocity {
                Some(g) => to_midi_bytes(g.generate_list(rng)?, ValueKind::Velocity),
                None => vec![DEFAULT_VELOCITY; DEFAULT_LIST_LENGTH],
            };
            self.lists = Some(ParameterLists::reconciled(
                pitches,
                durations,
                velocities,
                self.params.length_policy,
            ));
        }
        Ok(&*self.lists.get_or_insert_with(ParameterLists::default))
    }

    /// Rebuild every bar from the parameter lists.
    pub fn make_bar_list(&mut self, rng: &mut SongRng) -> Result<()> {
        self.bars.clear();
        if !self.params.generate_every_bar && self.lists.is_none() {
            self.generate_parameter_lists(rng)?;
        }

        let ioi = self.params.ioi;
        let mut onset = 0.0;
        for _ in 0..self.params.num_bars {
            let lists = if self.params.generate_every_bar {
                self.generate_parameter_lists(rng)?
            } else {
                &*self.lists.get_or_insert_with(ParameterLists::default)
            };
            let bar = Bar::from_lists(onset, ioi, lists);
            onset += bar.span();
            self.bars.push(bar);
        }

        log::info!(
            "song {:?}: {} bars, {} notes, {:.2} beats",
            self.params.name,
            self.bars.len(),
            self.note_count(),
            onset
        );
        Ok(())
    }

    pub fn transpose(&mut self, semitones: i32) {
        for bar in &mut self.bars {
            bar.transpose(semitones);
        }
    }

    pub fn set_durations(&mut self, duration: f64) {
        for bar in &mut self.bars {
            bar.set_durations(duration);
        }
    }

    /// Retrograde of the whole song: bars in reverse order, each bar's
    /// notes in reverse order, laid out again from time zero.
    pub fn reverse(&mut self) {
        self.bars.reverse();
        for bar in &mut self.bars {
            bar.reverse();
        }
        self.relayout_bars();
    }

    /// Random bar order, laid out again from time zero.
    pub fn shuffle_bars(&mut self, rng: &mut SongRng) {
        rng.shuffle(&mut self.bars);
        self.relayout_bars();
    }

    pub fn jitter_pitch(&mut self, max_semitones: i64, rng: &mut SongRng) {
        for bar in &mut self.bars {
            bar.jitter_pitch(max_semitones, rng);
        }
    }

    pub fn jitter_velocity(&mut self, max_delta: i64, rng: &mut SongRng) {
        for bar in &mut self.bars {
            bar.jitter_velocity(max_delta, rng);
        }
    }

    pub fn jitter_onset(&mut self, max_delta: f64, rng: &mut SongRng) {
        for bar in &mut self.bars {
            bar.jitter_onset(max_delta, rng);
        }
    }

    pub fn jitter_duration(&mut self, max_delta: f64, rng: &mut SongRng) {
        for bar in &mut self.bars {
            bar.jitter_duration(max_delta, rng);
        }
    }

    /// Place bars back to back in their current order. Offsets of notes
    /// within a bar are preserved.
    fn relayout_bars(&mut self) {
        let mut onset = 0.0;
        for bar in &mut self.bars {
            bar.shift_to(onset);
            onset += bar.span();
        }
    }
}

/// Integer lists from a generator, clamped into 0..=127.
fn to_midi_bytes(values: ParameterValues, kind: ValueKind) -> Vec<u8> {
    values
        .to_integers()
        .into_iter()
        .map(|v| {
            let clamped = v.clamp(0, MIDI_MAX as i64) as u8;
            if clamped as i64 != v {
                log::warn!("{kind} value {v} outside 0..=127, clamped to {clamped}");
            }
            clamped
        })
        .collect()
}
