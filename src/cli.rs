// ============================================================================
// ColorSplash CLI: headless puzzle conversion via command-line arguments
// ============================================================================
//
// Usage examples:
//   colorsplash --input lion.png --output lion.csp
//   colorsplash -i lion.png -o lion_solution.png --grid-size 48 --colors 16
//   colorsplash -i "art/*.jpg" --output-dir puzzles/ --format csp
//   colorsplash -i saved.csp -o solution.png --cell-size 24
//
// No window is opened in CLI mode. Quantization still uses the rayon pool.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;

use clap::Parser;

use crate::components::gesture::Difficulty;
use crate::grid::PuzzleGrid;
use crate::io::{read_record, save_solution_png, write_record, SavedPuzzle, RECORD_EXTENSION};
use crate::ops::quantize::quantize_bytes;
use crate::puzzle::{Puzzle, PuzzleMeta};
use crate::settings::{AppSettings, MAX_COLOR_COUNT, MAX_GRID_SIZE, MIN_COLOR_COUNT, MIN_GRID_SIZE};

// ============================================================================
// CLI argument definition (clap Derive)
// ============================================================================

/// ColorSplash headless puzzle converter.
///
/// Turn images into color-by-number puzzle records or rendered solutions.
#[derive(Parser, Debug)]
#[command(
    name = "colorsplash",
    about = "ColorSplash headless color-by-number converter",
    long_about = "Convert images into ColorSplash puzzle records (.csp) or render the\n\
                  solved puzzle as a PNG, without opening the GUI. Existing .csp records\n\
                  are accepted as input too.\n\n\
                  Example:\n  \
                  colorsplash --input lion.png --output lion.csp\n  \
                  colorsplash -i \"art/*.jpg\" --output-dir puzzles/ --format png"
)]
pub struct CliArgs {
    /// Input file(s). Glob patterns accepted (e.g. "*.png", "art/*.jpg").
    #[arg(short, long, required = true, num_args = 1..)]
    pub input: Vec<String>,

    /// Output file path. Only valid for single-file input.
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Output directory for batch processing.
    #[arg(long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Output format: csp (puzzle record) or png (rendered solution).
    /// When omitted, inferred from --output's extension, defaulting to csp.
    #[arg(short, long, value_enum, ignore_case = true, value_name = "FORMAT")]
    pub format: Option<OutputFormat>,

    /// Cells per side (8-128). Defaults to the saved setting.
    #[arg(short, long, value_name = "N")]
    pub grid_size: Option<u32>,

    /// Palette size (2-100). Defaults to the saved setting.
    #[arg(short, long, value_name = "K")]
    pub colors: Option<usize>,

    /// Pixels per cell in rendered PNG output (1-64).
    #[arg(
        long,
        default_value_t = 16,
        value_name = "PX",
        value_parser = clap::value_parser!(u32).range(MIN_CELL_SIZE_PX as i64..=MAX_CELL_SIZE_PX as i64)
    )]
    pub cell_size: u32,

    /// Brush difficulty stored in the record: easy, medium, hard.
    #[arg(long, value_name = "LEVEL")]
    pub difficulty: Option<String>,

    /// Print per-file palette details and timing.
    #[arg(short, long)]
    pub verbose: bool,
}

impl CliArgs {
    /// Returns `true` when any CLI-mode flag is present in the real process arguments.
    /// Used by `main()` to route before creating an eframe window.
    pub fn is_cli_mode() -> bool {
        std::env::args().any(|a| a == "--input" || a == "-i")
    }
}

/// Bounds for `--cell-size`.
pub const MIN_CELL_SIZE_PX: u32 = 1;
pub const MAX_CELL_SIZE_PX: u32 = 64;

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Csp,
    Png,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Csp => RECORD_EXTENSION,
            OutputFormat::Png => "png",
        }
    }
}

/// Resolved conversion options shared by every input file.
struct Job {
    format: OutputFormat,
    grid_size: u32,
    colors: usize,
    cell_size: u32,
    difficulty: Difficulty,
    verbose: bool,
}

// ============================================================================
// Public entry point
// ============================================================================

/// Run all CLI processing and return an OS exit code.
/// `0` = all files succeeded, `1` = one or more files failed.
pub fn run(args: CliArgs) -> ExitCode {
    run_with_settings(args, &AppSettings::load())
}

/// [`run`] with explicit defaults instead of the user's settings file.
pub fn run_with_settings(args: CliArgs, settings: &AppSettings) -> ExitCode {
    crate::logger::set_echo(args.verbose);

    let inputs = resolve_inputs(&args.input);
    if inputs.is_empty() {
        eprintln!("error: no input files matched the given pattern(s).");
        return ExitCode::FAILURE;
    }

    if inputs.len() > 1 && args.output.is_some() && args.output_dir.is_none() {
        eprintln!(
            "error: {} input files given but --output only accepts a single file path.\n\
             Use --output-dir to specify a destination directory for batch processing.",
            inputs.len()
        );
        return ExitCode::FAILURE;
    }

    let difficulty = match args.difficulty.as_deref() {
        Some(s) => match Difficulty::parse(s) {
            Some(d) => d,
            None => {
                eprintln!("error: unknown difficulty '{}' (expected easy, medium or hard).", s);
                return ExitCode::FAILURE;
            }
        },
        None => settings.difficulty,
    };

    let job = Job {
        format: parse_format(args.format, args.output.as_deref()),
        grid_size: args
            .grid_size
            .unwrap_or(settings.grid_size)
            .clamp(MIN_GRID_SIZE, MAX_GRID_SIZE),
        colors: args
            .colors
            .unwrap_or(settings.color_count)
            .clamp(MIN_COLOR_COUNT, MAX_COLOR_COUNT),
        cell_size: args.cell_size.clamp(MIN_CELL_SIZE_PX, MAX_CELL_SIZE_PX),
        difficulty,
        verbose: args.verbose,
    };

    if let Some(dir) = &args.output_dir
        && let Err(e) = std::fs::create_dir_all(dir)
    {
        eprintln!("error: could not create output directory '{}': {}", dir.display(), e);
        return ExitCode::FAILURE;
    }

    let total = inputs.len();
    let multi = total > 1;
    let mut any_failure = false;

    for (idx, input_path) in inputs.iter().enumerate() {
        if multi || args.verbose {
            println!("[{}/{}] {}", idx + 1, total, input_path.display());
        }

        let file_start = Instant::now();

        let Some(output_path) =
            build_output_path(input_path, args.output.as_deref(), args.output_dir.as_deref(), job.format)
        else {
            eprintln!("  error: cannot determine output path for '{}'.", input_path.display());
            any_failure = true;
            continue;
        };

        match run_one(input_path, &output_path, &job) {
            Ok(()) => {
                if args.verbose || multi {
                    println!(
                        "  → {} ({:.0}ms)",
                        output_path.display(),
                        file_start.elapsed().as_secs_f64() * 1000.0
                    );
                }
            }
            Err(e) => {
                eprintln!("  error: {}", e);
                crate::log_err!("CLI conversion of {} failed: {}", input_path.display(), e);
                any_failure = true;
            }
        }
    }

    if any_failure { ExitCode::FAILURE } else { ExitCode::SUCCESS }
}

// ============================================================================
// Per-file processing pipeline
// ============================================================================

fn run_one(input: &Path, output: &Path, job: &Job) -> Result<(), String> {
    // -- Step 1: Load or build the puzzle ---------------------------------
    let is_record = input
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(RECORD_EXTENSION));

    let saved = if is_record {
        read_record(input).map_err(|e| format!("load failed: {}", e))?
    } else {
        let bytes = std::fs::read(input).map_err(|e| format!("load failed: {}", e))?;
        let quantized =
            quantize_bytes(&bytes, job.grid_size, job.colors, None).map_err(|e| format!("quantize failed: {}", e))?;

        if job.verbose {
            println!(
                "  palette: {} of {} requested ({} distinct, {} relaxed)",
                quantized.palette.len(),
                job.colors,
                quantized.relaxed_from,
                quantized.palette.len() - quantized.relaxed_from
            );
        }

        let grid = PuzzleGrid::from_quantized(quantized).map_err(|e| e.to_string())?;
        let meta = PuzzleMeta {
            prompt: input
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default(),
            difficulty: job.difficulty,
            color_count: job.colors,
            ..PuzzleMeta::default()
        };
        SavedPuzzle::from_puzzle(&Puzzle::new(grid, meta, None))
    };

    // -- Step 2: Write ------------------------------------------------------
    match job.format {
        OutputFormat::Csp => write_record(&saved, output).map_err(|e| format!("save failed: {}", e))?,
        OutputFormat::Png => {
            let grid = PuzzleGrid::from_parts(saved.grid_size, saved.palette, saved.cells)
                .map_err(|e| e.to_string())?;
            save_solution_png(&grid, job.cell_size, output).map_err(|e| format!("save failed: {}", e))?;
        }
    }

    Ok(())
}

// ============================================================================
// Helpers
// ============================================================================

/// Expand glob patterns and literal paths into a deduplicated, ordered list.
fn resolve_inputs(patterns: &[String]) -> Vec<PathBuf> {
    let mut result: Vec<PathBuf> = Vec::new();

    for pattern in patterns {
        let as_path = Path::new(pattern);

        if as_path.exists() {
            if !result.iter().any(|p| p.as_path() == as_path) {
                result.push(as_path.to_path_buf());
            }
            continue;
        }

        match glob::glob(pattern) {
            Ok(entries) => {
                let mut matched = false;
                for entry in entries.flatten() {
                    if !result.contains(&entry) {
                        result.push(entry);
                    }
                    matched = true;
                }
                if !matched {
                    eprintln!("warning: pattern '{}' matched no files.", pattern);
                }
            }
            Err(e) => {
                eprintln!("warning: invalid glob '{}': {}", pattern, e);
            }
        }
    }

    result
}

/// `--format` wins; otherwise a `.png` output extension selects png; default csp.
fn parse_format(format_arg: Option<OutputFormat>, output: Option<&Path>) -> OutputFormat {
    if let Some(f) = format_arg {
        return f;
    }
    let ext = output.and_then(|o| o.extension()).and_then(|e| e.to_str());
    if ext.is_some_and(|e| e.eq_ignore_ascii_case("png")) {
        OutputFormat::Png
    } else {
        OutputFormat::Csp
    }
}

/// Compute the output path for a single input file.
///
/// Priority:
/// 1. `--output` (explicit path, used for single-file input)
/// 2. `--output-dir` (batch directory, derives filename from input stem)
/// 3. Fallback: same directory as input, same stem, new extension
///    (appends `_out` to stem if it would collide with the input path)
fn build_output_path(input: &Path, output: Option<&Path>, output_dir: Option<&Path>, format: OutputFormat) -> Option<PathBuf> {
    if let Some(out) = output {
        return Some(out.to_path_buf());
    }

    let ext = format.extension();
    let stem = input.file_stem()?.to_string_lossy().into_owned();

    if let Some(dir) = output_dir {
        return Some(dir.join(format!("{}.{}", stem, ext)));
    }

    let parent = input.parent().unwrap_or(Path::new("."));
    let candidate = parent.join(format!("{}.{}", stem, ext));

    if candidate == input {
        Some(parent.join(format!("{}_out.{}", stem, ext)))
    } else {
        Some(candidate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_flag_beats_extension() {
        assert_eq!(parse_format(Some(OutputFormat::Png), Some(Path::new("x.csp"))), OutputFormat::Png);
        assert_eq!(parse_format(None, Some(Path::new("x.PNG"))), OutputFormat::Png);
        assert_eq!(parse_format(None, Some(Path::new("x.png"))), OutputFormat::Png);
        assert_eq!(parse_format(None, Some(Path::new("x.bin"))), OutputFormat::Csp);
        assert_eq!(parse_format(None, None), OutputFormat::Csp);
    }

    #[test]
    fn output_path_never_overwrites_input() {
        let input = Path::new("dir/puzzle.csp");
        assert_eq!(
            build_output_path(input, None, None, OutputFormat::Csp),
            Some(PathBuf::from("dir/puzzle_out.csp"))
        );
        assert_eq!(
            build_output_path(input, None, Some(Path::new("out")), OutputFormat::Png),
            Some(PathBuf::from("out/puzzle.png"))
        );
    }

    #[test]
    fn converts_image_to_record_then_record_to_png() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("tiles.png");
        image::RgbImage::from_fn(16, 16, |x, _| {
            if x < 8 { image::Rgb([200, 10, 10]) } else { image::Rgb([10, 10, 200]) }
        })
        .save(&input)
        .unwrap();

        let args = CliArgs::parse_from([
            "colorsplash",
            "-i",
            input.to_str().unwrap(),
            "--grid-size",
            "8",
            "--colors",
            "2",
        ]);
        assert_eq!(run_with_settings(args, &AppSettings::default()), ExitCode::SUCCESS);

        let record = dir.path().join("tiles.csp");
        let saved = read_record(&record).unwrap();
        assert_eq!(saved.grid_size, 8);
        assert_eq!(saved.palette.len(), 2);
        assert_eq!(saved.meta.prompt, "tiles");

        let solution = dir.path().join("solution.png");
        let args = CliArgs::parse_from([
            "colorsplash",
            "-i",
            record.to_str().unwrap(),
            "-o",
            solution.to_str().unwrap(),
            "--cell-size",
            "4",
        ]);
        assert_eq!(run_with_settings(args, &AppSettings::default()), ExitCode::SUCCESS);
        let img = image::open(&solution).unwrap();
        assert_eq!((img.width(), img.height()), (32, 32));
    }

    #[test]
    fn format_flag_accepts_only_known_formats() {
        let args = CliArgs::try_parse_from(["colorsplash", "-i", "a.png", "--format", "PNG"]).unwrap();
        assert_eq!(args.format, Some(OutputFormat::Png));
        assert!(CliArgs::try_parse_from(["colorsplash", "-i", "a.png", "--format", "jpg"]).is_err());
    }

    #[test]
    fn cell_size_outside_range_is_rejected() {
        assert!(CliArgs::try_parse_from(["colorsplash", "-i", "a.png", "--cell-size", "1500000000"]).is_err());
        assert!(CliArgs::try_parse_from(["colorsplash", "-i", "a.png", "--cell-size", "65"]).is_err());
        assert!(CliArgs::try_parse_from(["colorsplash", "-i", "a.png", "--cell-size", "0"]).is_err());
        let args = CliArgs::try_parse_from(["colorsplash", "-i", "a.png", "--cell-size", "64"]).unwrap();
        assert_eq!(args.cell_size, MAX_CELL_SIZE_PX);
    }

    #[test]
    fn unknown_difficulty_fails() {
        let args = CliArgs::parse_from(["colorsplash", "-i", "Cargo.toml", "--difficulty", "extreme"]);
        assert_eq!(run_with_settings(args, &AppSettings::default()), ExitCode::FAILURE);
    }

    #[test]
    fn args_parse_with_short_flags() {
        let args = CliArgs::parse_from(["colorsplash", "-i", "a.png", "b.png", "-g", "16", "-c", "4"]);
        assert_eq!(args.input, vec!["a.png", "b.png"]);
        assert_eq!(args.grid_size, Some(16));
        assert_eq!(args.colors, Some(4));
        assert_eq!(args.cell_size, 16);
    }
}
