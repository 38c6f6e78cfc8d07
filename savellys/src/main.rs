// Savellys CLI entry point.
//
// Usage:
//   savellys render <config.json> [-o out.mid] [--seed N]
//   savellys expand <grammar-file> [--depth N] [--start SYM] [--seed N]
//   savellys list <grammar-file> --kind pitch|duration|velocity
//     [--min-length N] [--constraint any|even|power-of-two] [--seed N]
//   savellys check <file.mid>
//
// `render` builds the configured song, reports its timing check, and writes
// MIDI. `check` exits non-zero when the file has pairing issues. Set
// RUST_LOG=debug for generator detail.

use clap::{Parser, Subcommand, ValueEnum};
use savellys::config::SongConfig;
use savellys::generator::generate;
use savellys::grammar::Grammar;
use savellys::list_gen::{LengthConstraint, ListGenerator, ParameterValues, ValueKind};
use savellys::midi::write_song;
use savellys::midi_check::check_file;
use savellys::validate::inspect_song_timing;
use savellys::{Error, Result, SongRng};
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(name = "savellys", version, about = "Grammar-driven melody generator")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build a song from a JSON config and write it as MIDI.
    Render {
        config: PathBuf,
        #[arg(short, long, default_value = "output.mid")]
        output: PathBuf,
        /// Overrides the config's seed.
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Print one expansion of a grammar.
    Expand {
        grammar: PathBuf,
        #[arg(long, default_value_t = 10)]
        depth: usize,
        /// Defaults to the first rule's left-hand side.
        #[arg(long)]
        start: Option<String>,
        #[arg(long, default_value_t = 0)]
        seed: u64,
    },
    /// Print one generated parameter list.
    List {
        grammar: PathBuf,
        #[arg(long, value_enum)]
        kind: KindArg,
        #[arg(long, default_value_t = 1)]
        min_length: usize,
        #[arg(long, value_enum, default_value_t = ConstraintArg::Any)]
        constraint: ConstraintArg,
        #[arg(long, default_value_t = 0)]
        seed: u64,
    },
    /// Check note-on/note-off pairing in a MIDI file.
    Check { file: PathBuf },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum KindArg {
    Pitch,
    Duration,
    Velocity,
}

impl From<KindArg> for ValueKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Pitch => ValueKind::Pitch,
            KindArg::Duration => ValueKind::Duration,
            KindArg::Velocity => ValueKind::Velocity,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum ConstraintArg {
    Any,
    Even,
    PowerOfTwo,
}

impl From<ConstraintArg> for LengthConstraint {
    fn from(constraint: ConstraintArg) -> Self {
        match constraint {
            ConstraintArg::Any => LengthConstraint::Any,
            ConstraintArg::Even => LengthConstraint::Even,
            ConstraintArg::PowerOfTwo => LengthConstraint::PowerOfTwo,
        }
    }
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let outcome = match cli.command {
        Command::Render {
            config,
            output,
            seed,
        } => render(&config, &output, seed),
        Command::Expand {
            grammar,
            depth,
            start,
            seed,
        } => expand(&grammar, depth, start.as_deref(), seed),
        Command::List {
            grammar,
            kind,
            min_length,
            constraint,
            seed,
        } => list(&grammar, kind.into(), min_length, constraint.into(), seed),
        Command::Check { file } => check(&file),
    };

    match outcome {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(1);
        }
    }
}

fn load_grammar(path: &Path) -> Result<Grammar> {
    std::fs::read_to_string(path)?.parse()
}

fn render(config_path: &Path, output: &Path, seed: Option<u64>) -> Result<bool> {
    let mut config = SongConfig::load(config_path)?;
    if let Some(seed) = seed {
        config.seed = seed;
    }
    println!("Song: {} (seed {})", config.name, config.seed);

    let song = config.build(&mut config.rng())?;
    println!(
        "  {} bars, {} notes, {:.2} beats",
        song.bars().len(),
        song.note_count(),
        song.end_time()
    );

    let report = inspect_song_timing(&song);
    if report.is_valid() {
        println!("  Timing: {report}");
    } else {
        eprintln!("  Timing: {report}");
    }

    write_song(&song, output, config.tempo_bpm)?;
    println!("  Wrote {}", output.display());
    Ok(true)
}

fn expand(path: &Path, depth: usize, start: Option<&str>, seed: u64) -> Result<bool> {
    let grammar = load_grammar(path)?;
    let start = match start {
        Some(symbol) => symbol,
        None => grammar.start_symbol().ok_or_else(|| {
            Error::InvalidSongConfiguration(format!("{} has no rules", path.display()))
        })?,
    };
    println!("{}", generate(&grammar, start, depth, &mut SongRng::new(seed)));
    Ok(true)
}

fn list(
    path: &Path,
    kind: ValueKind,
    min_length: usize,
    constraint: LengthConstraint,
    seed: u64,
) -> Result<bool> {
    let generator = ListGenerator::from_grammar(load_grammar(path)?, min_length, kind)?
        .with_constraint(constraint);
    let values = generator.generate_list(&mut SongRng::new(seed))?;
    let rendered: Vec<String> = match &values {
        ParameterValues::Integers(v) => v.iter().map(|x| x.to_string()).collect(),
        ParameterValues::Floats(v) => v.iter().map(|x| x.to_string()).collect(),
    };
    println!("{}", rendered.join(" "));
    Ok(true)
}

fn check(path: &Path) -> Result<bool> {
    let report = check_file(path)?;
    println!("{}: {report}", path.display());
    Ok(report.is_valid())
}
