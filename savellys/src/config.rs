// Data-driven song description.
//
// A `SongConfig` is everything needed to reproduce a piece: the song shape
// (`SongParams` fields), one optional grammar section per note parameter,
// the seed, the playback tempo, and two ordered post-processing lists.
// `modulations` run first, then `transforms`. Every field has a default so a
// config file only names what it changes; `{}` is a valid config that plays
// four bars of the constant default lists.
//
// Grammars are stored as a list of rule lines, one rule per entry, so JSON
// files stay readable without embedded newlines.
//
// See also: `song.rs` for `Song::new` and the transforms, `modulate.rs` for
// `Modulation`, and `main.rs` for the `render` subcommand that drives this.

use crate::error::{Error, Result};
use crate::grammar::parse_grammar;
use crate::list_gen::{LengthConstraint, ListGenerator, ValueKind};
use crate::midi::DEFAULT_TEMPO_BPM;
use crate::modulate::Modulation;
use crate::song::{LengthPolicy, ParameterGenerators, Song, SongParams};
use savellys_prng::SongRng;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Grammar section for one note parameter.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GeneratorConfig {
    /// Rule lines, e.g. `"S -> A A | A"`.
    pub grammar: Vec<String>,
    #[serde(default = "default_min_length")]
    pub min_length: usize,
    #[serde(default)]
    pub constraint: LengthConstraint,
    /// Defaults to the first rule's left-hand side.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_symbol: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub depth: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_attempts: Option<usize>,
}

fn default_min_length() -> usize {
    1
}

impl GeneratorConfig {
    pub fn to_generator(&self, kind: ValueKind) -> Result<ListGenerator> {
        let grammar = parse_grammar(&self.grammar)?;
        let mut generator = ListGenerator::from_grammar(grammar, self.min_length, kind)?
            .with_constraint(self.constraint);
        if let Some(symbol) = &self.start_symbol {
            generator = generator.with_start_symbol(symbol.clone());
        }
        if let Some(depth) = self.depth {
            generator = generator.with_depth(depth);
        }
        if let Some(max_attempts) = self.max_attempts {
            generator = generator.with_max_attempts(max_attempts);
        }
        Ok(generator)
    }
}

/// Post-generation edits, applied in list order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Transform {
    Transpose {
        semitones: i32,
    },
    SetDurations {
        duration: f64,
    },
    Reverse,
    ShuffleBars,
    JitterPitch {
        #[serde(default = "default_pitch_jitter")]
        max_semitones: i64,
    },
    JitterVelocity {
        #[serde(default = "default_velocity_jitter")]
        max_delta: i64,
    },
    JitterOnset {
        #[serde(default = "default_time_jitter")]
        max_delta: f64,
    },
    JitterDuration {
        #[serde(default = "default_time_jitter")]
        max_delta: f64,
    },
}

fn default_pitch_jitter() -> i64 {
    3
}

fn default_velocity_jitter() -> i64 {
    20
}

fn default_time_jitter() -> f64 {
    0.4
}

impl Transform {
    pub fn apply(&self, song: &mut Song, rng: &mut SongRng) {
        match *self {
            Transform::Transpose { semitones } => song.transpose(semitones),
            Transform::SetDurations { duration } => song.set_durations(duration),
            Transform::Reverse => song.reverse(),
            Transform::ShuffleBars => song.shuffle_bars(rng),
            Transform::JitterPitch { max_semitones } => song.jitter_pitch(max_semitones, rng),
            Transform::JitterVelocity { max_delta } => song.jitter_velocity(max_delta, rng),
            Transform::JitterOnset { max_delta } => song.jitter_onset(max_delta, rng),
            Transform::JitterDuration { max_delta } => song.jitter_duration(max_delta, rng),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SongConfig {
    pub name: String,
    pub num_bars: usize,
    /// Inter-onset interval in beats.
    pub ioi: f64,
    pub generate_every_bar: bool,
    pub length_policy: LengthPolicy,
    pub tempo_bpm: u16,
    pub seed: u64,

    pub pitch: Option<GeneratorConfig>,
    pub duration: Option<GeneratorConfig>,
    pub velocity: Option<GeneratorConfig>,

    pub modulations: Vec<Modulation>,
    pub transforms: Vec<Transform>,
}

impl Default for SongConfig {
    fn default() -> Self {
        let params = SongParams::default();
        SongConfig {
            name: params.name,
            num_bars: params.num_bars,
            ioi: params.ioi,
            generate_every_bar: params.generate_every_bar,
            length_policy: params.length_policy,
            tempo_bpm: DEFAULT_TEMPO_BPM,
            seed: 0,
            pitch: None,
            duration: None,
            velocity: None,
            modulations: Vec::new(),
            transforms: Vec::new(),
        }
    }
}

impl SongConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config = Self::from_json(&text)?;
        log::debug!("loaded song config {:?} from {}", config.name, path.display());
        Ok(config)
    }

    pub fn params(&self) -> SongParams {
        SongParams {
            name: self.name.clone(),
            num_bars: self.num_bars,
            ioi: self.ioi,
            generate_every_bar: self.generate_every_bar,
            length_policy: self.length_policy,
        }
    }

    pub fn generators(&self) -> Result<ParameterGenerators> {
        let build = |section: &Option<GeneratorConfig>, kind| {
            section.as_ref().map(|g| g.to_generator(kind)).transpose()
        };
        Ok(ParameterGenerators {
            pitch: build(&self.pitch, ValueKind::Pitch)?,
            duration: build(&self.duration, ValueKind::Duration)?,
            velocity: build(&self.velocity, ValueKind::Velocity)?,
        })
    }

    /// A generator seeded from `seed`.
    pub fn rng(&self) -> SongRng {
        SongRng::new(self.seed)
    }

    /// Generate the bars, then apply modulations and transforms in order.
    pub fn build(&self, rng: &mut SongRng) -> Result<Song> {
        if self.tempo_bpm == 0 {
            return Err(Error::InvalidSongConfiguration(
                "tempo must be at least 1 BPM".to_string(),
            ));
        }
        let mut song = Song::new(self.params(), self.generators()?)?;
        song.make_bar_list(rng)?;
        for modulation in &self.modulations {
            song.modulate(modulation);
        }
        for transform in &self.transforms {
            transform.apply(&mut song, rng);
        }
        Ok(song)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modulate::{NoteField, PhaseConvention};

    #[test]
    fn empty_object_is_the_default_config() {
        let config = SongConfig::from_json("{}").unwrap();
        assert_eq!(config, SongConfig::default());
        let song = config.build(&mut config.rng()).unwrap();
        assert_eq!(song.bars().len(), 4);
        assert!(song.notes().all(|n| n.pitch == 60 && n.velocity == 100));
    }

    #[test]
    fn config_loads_from_json_string() {
        let json = r#"{
            "name": "walking",
            "num_bars": 2,
            "ioi": 0.5,
            "seed": 7,
            "pitch": {
                "grammar": ["S -> A A | A", "A -> 60 62"],
                "min_length": 4,
                "constraint": "even",
                "depth": 10
            },
            "modulations": [
                {"field": "velocity", "frequency": 0.5, "amplitude": 10.0,
                 "phase": "bar_relative"}
            ],
            "transforms": [
                {"op": "transpose", "semitones": -12},
                {"op": "jitter_pitch"}
            ]
        }"#;
        let config = SongConfig::from_json(json).unwrap();
        assert_eq!(config.name, "walking");
        assert_eq!(config.tempo_bpm, DEFAULT_TEMPO_BPM);
        let pitch = config.pitch.as_ref().unwrap();
        assert_eq!(pitch.constraint, LengthConstraint::Even);
        assert_eq!(pitch.max_attempts, None);
        assert_eq!(
            config.modulations[0],
            Modulation::new(NoteField::Velocity, 0.5, 10.0, PhaseConvention::BarRelative)
        );
        assert_eq!(config.transforms[1], Transform::JitterPitch { max_semitones: 3 });
    }

    #[test]
    fn generated_pitches_follow_the_grammar() {
        let config = SongConfig {
            num_bars: 3,
            pitch: Some(GeneratorConfig {
                grammar: vec!["S -> A A | A".to_string(), "A -> 60 62".to_string()],
                min_length: 2,
                constraint: LengthConstraint::Even,
                start_symbol: None,
                depth: Some(10),
                max_attempts: None,
            }),
            ..Default::default()
        };
        let song = config.build(&mut SongRng::new(11)).unwrap();
        assert_eq!(song.bars().len(), 3);
        assert!(song.notes().all(|n| n.pitch == 60 || n.pitch == 62));
    }

    #[test]
    fn same_seed_same_song() {
        let config = SongConfig {
            generate_every_bar: true,
            pitch: Some(GeneratorConfig {
                grammar: vec!["S -> N S | N".to_string(), "N -> 48 | 50 | 53 | 55".to_string()],
                min_length: 4,
                constraint: LengthConstraint::Any,
                start_symbol: None,
                depth: Some(6),
                max_attempts: None,
            }),
            transforms: vec![Transform::ShuffleBars, Transform::JitterVelocity { max_delta: 20 }],
            ..Default::default()
        };
        let a = config.build(&mut config.rng()).unwrap();
        let b = config.build(&mut config.rng()).unwrap();
        assert_eq!(a.bars(), b.bars());
    }

    #[test]
    fn left_recursive_section_is_rejected() {
        let config = SongConfig {
            velocity: Some(GeneratorConfig {
                grammar: vec!["S -> S 80".to_string()],
                min_length: 1,
                constraint: LengthConstraint::Any,
                start_symbol: None,
                depth: None,
                max_attempts: None,
            }),
            ..Default::default()
        };
        let err = config.build(&mut SongRng::new(0)).unwrap_err();
        assert!(matches!(err, Error::LeftRecursion { line: 1, .. }), "{err}");
    }

    #[test]
    fn zero_tempo_and_zero_bars_are_rejected() {
        let config = SongConfig {
            tempo_bpm: 0,
            ..Default::default()
        };
        assert!(matches!(
            config.build(&mut SongRng::new(0)),
            Err(Error::InvalidSongConfiguration(_))
        ));
        let config = SongConfig {
            num_bars: 0,
            ..Default::default()
        };
        assert!(matches!(
            config.build(&mut SongRng::new(0)),
            Err(Error::InvalidSongConfiguration(_))
        ));
    }

    #[test]
    fn negative_jitter_bounds_build() {
        let config = SongConfig::from_json(
            r#"{"transforms": [
                {"op": "jitter_pitch", "max_semitones": -3},
                {"op": "jitter_velocity", "max_delta": -9223372036854775808}
            ]}"#,
        )
        .unwrap();
        let song = config.build(&mut config.rng()).unwrap();
        assert!(song.notes().all(|n| (57..=63).contains(&n.pitch)));
    }

    #[test]
    fn bundled_example_builds() {
        let config = SongConfig::from_json(include_str!("../data/example_song.json")).unwrap();
        let song = config.build(&mut config.rng()).unwrap();
        assert_eq!(song.bars().len(), config.num_bars);
        assert!(song.note_count() > 0);
    }

    #[test]
    fn default_config_serializes() {
        let config = SongConfig {
            transforms: vec![Transform::Reverse, Transform::SetDurations { duration: 0.5 }],
            ..Default::default()
        };
        let json = serde_json::to_string_pretty(&config).unwrap();
        let restored: SongConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config, restored);
    }
}
