// End-to-end checks: grammar text in, MIDI bytes out.

use savellys::config::{GeneratorConfig, SongConfig, Transform};
use savellys::generator::generate;
use savellys::grammar::Grammar;
use savellys::list_gen::{LengthConstraint, ListGenerator, ValueKind};
use savellys::midi::{song_to_bytes, write_song};
use savellys::midi_check::{check_file, check_smf};
use savellys::modulate::{Modulation, NoteField, PhaseConvention};
use savellys::song::{ParameterGenerators, ParameterLists, Song, SongParams};
use savellys::validate::validate_song_timing;
use savellys::{Error, SongRng};

fn section(lines: &[&str], min_length: usize) -> GeneratorConfig {
    GeneratorConfig {
        grammar: lines.iter().map(|l| l.to_string()).collect(),
        min_length,
        constraint: LengthConstraint::Any,
        start_symbol: None,
        depth: Some(12),
        max_attempts: None,
    }
}

fn bass_config() -> SongConfig {
    SongConfig {
        name: "bass".to_string(),
        num_bars: 4,
        ioi: 0.5,
        generate_every_bar: true,
        seed: 99,
        pitch: Some(section(&["S -> A A A A", "A -> 48 | 50 | 52 A"], 4)),
        duration: Some(section(&["S -> D D D D", "D -> 0.25 | 0.5"], 4)),
        velocity: Some(section(&["S -> V V V V", "V -> 70 | 90 | 110"], 4)),
        modulations: vec![Modulation::new(
            NoteField::Velocity,
            1.0,
            8.0,
            PhaseConvention::BarRelative,
        )],
        transforms: vec![Transform::Transpose { semitones: 12 }],
        ..Default::default()
    }
}

#[test]
fn same_seed_gives_identical_midi() {
    let config = bass_config();
    let a = config.build(&mut config.rng()).unwrap();
    let b = config.build(&mut config.rng()).unwrap();
    assert_eq!(a.bars(), b.bars());
    assert_eq!(song_to_bytes(&a, 120).unwrap(), song_to_bytes(&b, 120).unwrap());
}

#[test]
fn rendered_file_passes_the_checker() {
    let config = bass_config();
    let song = config.build(&mut config.rng()).unwrap();
    let (valid, message) = validate_song_timing(&song);
    assert!(valid, "{message}");

    let path = std::env::temp_dir().join(format!("savellys_pipeline_{}.mid", std::process::id()));
    write_song(&song, &path, config.tempo_bpm).unwrap();
    let report = check_file(&path).unwrap();
    let _ = std::fs::remove_file(&path);

    assert!(report.is_valid(), "{report}");
    assert_eq!(report.note_ons, song.note_count());
    assert_eq!(report.note_offs, song.note_count());
}

#[test]
fn scenario_a_even_lists_of_two_pitches() {
    let generator = ListGenerator::new("S -> A A | A\nA -> 60 62", 2, ValueKind::Pitch)
        .unwrap()
        .with_constraint(LengthConstraint::Even)
        .with_depth(10);
    let mut rng = SongRng::new(3);
    for _ in 0..20 {
        let values = generator.generate_list(&mut rng).unwrap().to_integers();
        assert!(values.len() >= 2 && values.len() % 2 == 0);
        assert!(values.iter().all(|v| *v == 60 || *v == 62));
    }
}

#[test]
fn scenario_b_left_recursion_fails_before_generation() {
    let err = "S -> S".parse::<Grammar>().unwrap_err();
    assert!(matches!(err, Error::LeftRecursion { ref symbol, .. } if symbol == "S"));
}

#[test]
fn scenario_c_bar_layout() {
    let params = SongParams {
        num_bars: 2,
        ioi: 1.0,
        ..Default::default()
    };
    let lists = ParameterLists {
        pitches: vec![60, 62, 64, 65],
        durations: vec![1.0; 4],
        velocities: vec![100; 4],
    };
    let mut song = Song::from_lists(params, lists).unwrap();
    song.make_bar_list(&mut SongRng::new(0)).unwrap();

    let bar_onsets: Vec<f64> = song.bars().iter().map(|b| b.onset).collect();
    assert_eq!(bar_onsets, vec![0.0, 4.0]);
    let onsets: Vec<f64> = song.notes().map(|n| n.onset).collect();
    assert_eq!(onsets, vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0]);
}

#[test]
fn scenario_d_zero_duration_is_reported() {
    let mut song = Song::new(SongParams::default(), ParameterGenerators::default()).unwrap();
    song.make_bar_list(&mut SongRng::new(0)).unwrap();
    song.bars_mut()[0].notes[0].duration = 0.0;
    let (valid, message) = validate_song_timing(&song);
    assert!(!valid);
    assert!(message.starts_with("1 of 32"), "{message}");
}

#[test]
fn expansion_is_reproducible() {
    let grammar: Grammar = "S -> A S | A\nA -> 60 | 62 | 64".parse().unwrap();
    let a = generate(&grammar, "S", 8, &mut SongRng::new(5));
    let b = generate(&grammar, "S", 8, &mut SongRng::new(5));
    assert_eq!(a, b);
    assert_eq!(generate(&grammar, "S", 0, &mut SongRng::new(5)), "S");
}

#[test]
fn modulated_song_still_writes_a_clean_file() {
    let mut song = Song::new(
        SongParams {
            num_bars: 3,
            ioi: 0.25,
            ..Default::default()
        },
        ParameterGenerators::default(),
    )
    .unwrap();
    song.make_bar_list(&mut SongRng::new(1)).unwrap();
    song.set_durations(0.1);
    song.modulate_pitch_with_sin(0.3, 200.0);
    song.modulate_velocity_with_sin_phase_by_bar(2.0, 90.0);
    song.modulate_onset_with_sin(0.5, 0.1);

    assert!(song.notes().all(|n| n.pitch <= 127 && n.velocity <= 127));
    let report = check_smf(&song_to_bytes(&song, 100).unwrap()).unwrap();
    assert!(report.is_valid(), "{report}");
}
