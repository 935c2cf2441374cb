// Tessitura CLI entry point.
//
// Loads a style preset, composes it and writes a MIDI file.
// The pipeline: preset lookup -> resolve -> arrange -> MIDI sink.
//
// Usage:
//   cargo run -p tessitura_music --bin generate -- [--preset NAME|PATH]
//     [--output FILE.mid] [--seed N] [--bars N] [--tempo BPM] [--list]
//     [--verbose]
//
// A preset argument that is not an existing path is looked up as
// presets/NAME.json in the working directory, then next to the crate, then
// among the bundled presets.

use anyhow::{Context, Result, bail};
use clap::Parser;
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tessitura_music::config::BUILTIN_PRESETS;
use tessitura_music::midi::MidiFileSink;
use tessitura_music::rhythm::{PATTERNS, Style};
use tessitura_music::theory::{PROGRESSIONS, progressions_by_style};
use tessitura_music::{Arranger, Preset, StrategyRegistry};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "generate")]
#[command(about = "Generate a multi-track MIDI piece from a style preset")]
#[command(version)]
struct Cli {
    /// Preset name (pop, jazz, ...) or path to a preset JSON file
    #[arg(short, long, default_value = "pop")]
    preset: String,

    /// Output MIDI file
    #[arg(short, long, default_value = "output.mid")]
    output: PathBuf,

    /// Seed for reproducible output (overrides the preset's seed)
    #[arg(short, long)]
    seed: Option<u64>,

    /// Number of bars (overrides the preset)
    #[arg(short, long)]
    bars: Option<u32>,

    /// Tempo in BPM (overrides the preset)
    #[arg(short, long)]
    tempo: Option<u32>,

    /// List strategies, progressions, patterns, styles and presets
    #[arg(long)]
    list: bool,

    /// Debug-level logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)),
        )
        .init();

    let registry = StrategyRegistry::with_builtins();
    if cli.list {
        print_listing(&registry);
        return Ok(());
    }

    let mut preset = find_preset(&cli.preset)?;
    if let Some(bars) = cli.bars {
        preset.structure.bars = bars;
    }
    if let Some(tempo) = cli.tempo {
        preset.tempo = tempo;
    }
    let resolved = preset
        .resolve(&registry)
        .with_context(|| format!("invalid preset '{}'", cli.preset))?;

    let seed = match cli.seed.or(resolved.seed) {
        Some(seed) => seed,
        None => {
            let seed = StdRng::from_os_rng().next_u64();
            info!(seed, "no seed given, drew one from the OS (pass --seed to reproduce)");
            seed
        }
    };

    let output = midi_path(&cli.output);
    let mut arranger = Arranger::new(&resolved, &registry, seed);
    arranger.resolve_harmony()?;
    arranger.generate_tracks()?;
    let composition = arranger.assemble()?;
    println!("=== Tessitura ===");
    println!("Preset: {}", cli.preset);
    println!("Key: {}", resolved.key.name());
    println!("Tempo: {} BPM, {} bars", resolved.tempo_bpm, resolved.bars);
    println!("Seed: {}", seed);
    println!("Duration: {:.1}s", composition.duration_seconds());
    print!("{}", composition.summary());

    let mut sink = MidiFileSink::new(&output);
    arranger.emit(&mut sink)?;
    println!("Wrote {}", output.display());
    Ok(())
}

/// Resolve a preset argument to a loaded preset.
fn find_preset(arg: &str) -> Result<Preset> {
    let path = Path::new(arg);
    if path.is_file() {
        return Ok(Preset::load(path)?);
    }
    let file = format!("{arg}.json");
    let candidates = [
        PathBuf::from("presets").join(&file),
        Path::new(env!("CARGO_MANIFEST_DIR")).join("presets").join(&file),
    ];
    for candidate in &candidates {
        if candidate.is_file() {
            info!(path = %candidate.display(), "loading preset");
            return Ok(Preset::load(candidate)?);
        }
    }
    match Preset::builtin(arg) {
        Some(preset) => Ok(preset?),
        None => {
            let known: Vec<&str> = BUILTIN_PRESETS.iter().map(|(n, _)| *n).collect();
            bail!(
                "preset '{arg}' is neither a file nor a known preset ({})",
                known.join(", ")
            )
        }
    }
}

/// Append `.mid` unless the path already has it.
fn midi_path(path: &Path) -> PathBuf {
    match path.extension() {
        Some(ext) if ext.eq_ignore_ascii_case("mid") => path.to_path_buf(),
        _ => {
            let mut name = path.as_os_str().to_owned();
            name.push(".mid");
            PathBuf::from(name)
        }
    }
}

fn print_listing(registry: &StrategyRegistry) {
    println!("Melody strategies:  {}", registry.melody_names().join(", "));
    println!("Harmony strategies: {}", registry.harmony_names().join(", "));
    println!("Rhythm strategies:  {}", registry.rhythm_names().join(", "));
    println!();
    println!("Progressions:");
    let families: BTreeSet<&str> = PROGRESSIONS.iter().map(|p| p.style).collect();
    for family in families {
        let names: Vec<&str> = progressions_by_style(family)
            .iter()
            .map(|p| p.name)
            .collect();
        println!("  {:<10} {}", family, names.join(", "));
    }
    println!();
    let patterns: Vec<&str> = PATTERNS.iter().map(|p| p.name).collect();
    println!("Patterns: {}", patterns.join(", "));
    let styles: Vec<&str> = Style::ALL.iter().map(|s| s.name()).collect();
    println!("Styles:   {}", styles.join(", "));
    println!();
    println!("Presets:");
    for (name, _) in BUILTIN_PRESETS {
        let description = Preset::builtin(name)
            .and_then(|p| p.ok())
            .and_then(|p| p.description)
            .unwrap_or_default();
        println!("  {:<10} {}", name, description);
    }
}
