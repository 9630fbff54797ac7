// ============================================================================
// LineFill CLI - headless coloring via command-line arguments
// ============================================================================
//
// Usage examples:
//   linefill --input owl.png --fill 120,80,#E53935 --output owl_colored.png
//   linefill -i pages/*.png --fill 10,10,#29B6F6 --output-dir colored/
//   linefill --artwork owl.json --fill 50,50,#43A047 --fill 200,40,#FDD835
//
// No GUI is opened in CLI mode. Fills run through the same engine as the
// interactive app; fades are completed immediately.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;

use clap::Parser;

use crate::components::colors::Rgb;
use crate::engine::{ColoringEngine, FillOutcome};
use crate::io::{self, Artwork, ImageSource};
use crate::settings::EngineSettings;
use crate::logger;
use crate::{log_info, log_warn};

// ============================================================================
// CLI argument definition (clap Derive)
// ============================================================================

/// LineFill headless colorer.
///
/// Flood-fill regions of line-art images and export the result as PNG.
#[derive(Parser, Debug)]
#[command(
    name = "linefill",
    about = "LineFill headless line-art colorer",
    long_about = "Apply boundary-aware flood fills to line-art images without opening\n\
                  the GUI. Each --fill seeds one region; regions are bounded by the\n\
                  dark lines of the artwork. Output is always PNG.\n\n\
                  Example:\n  \
                  linefill --input owl.png --fill 120,80,#E53935 --output owl_colored.png\n  \
                  linefill -i pages/*.png --fill 10,10,#29B6F6 --output-dir colored/"
)]
pub struct CliArgs {
    /// Input image(s). Glob patterns accepted (e.g. "*.png", "pages/*.jpg").
    /// http(s) URLs are downloaded.
    #[arg(short, long, num_args = 1.., required_unless_present = "artwork")]
    pub input: Vec<String>,

    /// Artwork manifest (JSON with id, title, rasterImageUrl, suggestedColors).
    #[arg(short, long, value_name = "MANIFEST.json", conflicts_with = "input")]
    pub artwork: Option<PathBuf>,

    /// Fill seed and colour as X,Y,#RRGGBB. Repeat for several regions;
    /// fills are applied in order.
    #[arg(short, long = "fill", value_name = "X,Y,#RRGGBB", value_parser = parse_fill_spec)]
    pub fills: Vec<FillSpec>,

    /// Output file path. Only valid for single-file input.
    /// For batch input use --output-dir instead.
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Output directory for batch processing.
    /// Files are written here with the original stem and a .png extension.
    #[arg(long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Settings file to use instead of the one in the data directory.
    #[arg(long, value_name = "FILE")]
    pub settings: Option<PathBuf>,

    /// Print per-fill results and per-file timing information.
    #[arg(short, long)]
    pub verbose: bool,
}

impl CliArgs {
    /// Returns `true` when any CLI-mode flag is present in the real process arguments.
    /// Used by `main()` to route before creating an eframe window.
    pub fn is_cli_mode() -> bool {
        std::env::args().any(|a| a == "--input" || a == "-i" || a == "--artwork" || a == "-a")
    }
}

/// One `--fill` argument.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FillSpec {
    pub x: i64,
    pub y: i64,
    pub color: Rgb,
}

pub fn parse_fill_spec(s: &str) -> Result<FillSpec, String> {
    let parts: Vec<&str> = s.split(',').map(str::trim).collect();
    let [x, y, hex] = parts.as_slice() else {
        return Err(format!("expected X,Y,#RRGGBB, got '{}'", s));
    };
    let x = x.parse::<i64>().map_err(|e| format!("bad x '{}': {}", x, e))?;
    let y = y.parse::<i64>().map_err(|e| format!("bad y '{}': {}", y, e))?;
    let color = Rgb::from_hex(hex).map_err(|e| format!("bad colour '{}': {}", hex, e))?;
    Ok(FillSpec { x, y, color })
}

// ============================================================================
// Public entry point
// ============================================================================

/// Run all CLI processing and return an OS exit code.
/// `0` = all files succeeded, `1` = one or more files failed.
pub fn run(args: CliArgs) -> ExitCode {
    // Engine log lines go to stderr in verbose mode; there is no log file
    logger::set_stderr_echo(args.verbose);

    let settings = match &args.settings {
        Some(path) => EngineSettings::load_from(path),
        None => EngineSettings::load(),
    };

    if let Some(manifest) = &args.artwork {
        return run_artwork(manifest, &args, settings);
    }

    // Resolve glob patterns / literal paths / URLs
    let inputs = resolve_inputs(&args.input);
    if inputs.is_empty() {
        eprintln!("error: no input files matched the given pattern(s).");
        return ExitCode::FAILURE;
    }

    // Multiple inputs require --output-dir, not --output
    if inputs.len() > 1 && args.output.is_some() && args.output_dir.is_none() {
        eprintln!(
            "error: {} input files given but --output only accepts a single file path.\n\
             Use --output-dir to specify a destination directory for batch processing.",
            inputs.len()
        );
        return ExitCode::FAILURE;
    }

    if !ensure_output_dir(args.output_dir.as_deref()) {
        return ExitCode::FAILURE;
    }

    let total = inputs.len();
    let multi = total > 1;
    let mut any_failure = false;
    let mut engine = ColoringEngine::new(settings);

    for (idx, source) in inputs.iter().enumerate() {
        let name = source.display_name();
        if multi || args.verbose {
            println!("[{}/{}] {}", idx + 1, total, name);
        }
        let file_start = Instant::now();

        let Some(output_path) = build_output_path(
            source,
            args.output.as_deref(),
            args.output_dir.as_deref(),
        ) else {
            eprintln!("  error: cannot determine output path for '{}'.", name);
            any_failure = true;
            continue;
        };

        let result = engine
            .load_source(source)
            .map_err(|e| format!("load failed: {}", e))
            .and_then(|_| color_and_save(&mut engine, &args.fills, &output_path, args.verbose));

        match result {
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
                any_failure = true;
            }
        }
    }

    if any_failure { ExitCode::FAILURE } else { ExitCode::SUCCESS }
}

fn run_artwork(manifest: &Path, args: &CliArgs, settings: EngineSettings) -> ExitCode {
    let artwork = match Artwork::from_file(manifest) {
        Ok(a) => a,
        Err(e) => {
            eprintln!("error: could not read artwork '{}': {}", manifest.display(), e);
            return ExitCode::FAILURE;
        }
    };
    if !ensure_output_dir(args.output_dir.as_deref()) {
        return ExitCode::FAILURE;
    }
    let output_path = match (&args.output, &args.output_dir) {
        (Some(out), _) => out.clone(),
        (None, Some(dir)) => dir.join(format!("{}.png", artwork.id)),
        (None, None) => manifest.with_file_name(format!("{}_colored.png", artwork.id)),
    };

    let mut engine = ColoringEngine::new(settings);
    if let Err(e) = engine.load_artwork(&artwork) {
        eprintln!("error: load failed: {}", e);
        return ExitCode::FAILURE;
    }
    if args.verbose
        && let Some(session) = engine.session()
    {
        let swatches: Vec<String> = session
            .palette
            .iter()
            .map(|(name, c)| format!("{} {}", name, c.to_hex()))
            .collect();
        println!("'{}' palette: {}", artwork.title, swatches.join(", "));
    }
    match color_and_save(&mut engine, &args.fills, &output_path, args.verbose) {
        Ok(()) => {
            if args.verbose {
                println!("  → {}", output_path.display());
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

// ============================================================================
// Per-image pipeline
// ============================================================================

/// Apply every fill in order, then export the composite.
fn color_and_save(
    engine: &mut ColoringEngine,
    fills: &[FillSpec],
    output: &Path,
    verbose: bool,
) -> Result<(), String> {
    // Step a synthetic clock past the debounce window between fills
    let step = engine.settings().fill_debounce();
    let mut clock = Instant::now();

    for spec in fills {
        engine.set_color_rgb(spec.color);
        let outcome = engine.fill_at(spec.x, spec.y, clock);
        engine.finish_pending();
        clock += step;

        match outcome {
            FillOutcome::Started { pixels, .. } => {
                if verbose {
                    println!("  fill ({}, {}) {} → {} px", spec.x, spec.y, spec.color.to_hex(), pixels);
                }
            }
            FillOutcome::Unchanged { pixels, .. } => {
                if verbose {
                    println!("  fill ({}, {}) already {} ({} px)", spec.x, spec.y, spec.color.to_hex(), pixels);
                }
            }
            FillOutcome::Skipped(reason) => {
                log_warn!("CLI fill ({}, {}) skipped: {:?}", spec.x, spec.y, reason);
                eprintln!("  warning: fill ({}, {}) skipped: {:?}", spec.x, spec.y, reason);
            }
        }
    }

    let image = engine
        .export_composite()
        .map_err(|e| format!("export failed: {}", e))?;
    io::write_png(&image, output).map_err(|e| format!("save failed: {}", e))?;
    log_info!("CLI export written to {}", output.display());
    Ok(())
}

// ============================================================================
// Helpers
// ============================================================================

fn ensure_output_dir(dir: Option<&Path>) -> bool {
    let Some(dir) = dir else { return true };
    match std::fs::create_dir_all(dir) {
        Ok(()) => true,
        Err(e) => {
            eprintln!(
                "error: could not create output directory '{}': {}",
                dir.display(),
                e
            );
            false
        }
    }
}

/// Expand glob patterns and literal paths into a deduplicated, ordered list.
/// URLs pass through untouched.
fn resolve_inputs(patterns: &[String]) -> Vec<ImageSource> {
    let mut result: Vec<ImageSource> = Vec::new();
    let mut push = |source: ImageSource| {
        if !result.contains(&source) {
            result.push(source);
        }
    };

    for pattern in patterns {
        if let remote @ ImageSource::Remote(_) = ImageSource::parse(pattern) {
            push(remote);
            continue;
        }

        let as_path = Path::new(pattern);
        if as_path.exists() {
            push(ImageSource::File(as_path.to_path_buf()));
            continue;
        }

        // Treat as glob pattern
        match glob::glob(pattern) {
            Ok(entries) => {
                let mut matched = false;
                for entry in entries.flatten() {
                    push(ImageSource::File(entry));
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

/// Compute the output path for a single input.
///
/// Priority:
/// 1. `--output` (explicit path, used for single-file input)
/// 2. `--output-dir` (batch directory, derives filename from the input name)
/// 3. Fallback: next to a local input as `<stem>_colored.png`, or in the
///    working directory for a URL
fn build_output_path(
    source: &ImageSource,
    output: Option<&Path>,
    output_dir: Option<&Path>,
) -> Option<PathBuf> {
    if let Some(out) = output {
        return Some(out.to_path_buf());
    }

    let stem = match source {
        ImageSource::File(path) => path.file_stem()?.to_string_lossy().into_owned(),
        ImageSource::Remote(_) => {
            let name = source.display_name();
            Path::new(&name).file_stem()?.to_string_lossy().into_owned()
        }
    };

    if let Some(dir) = output_dir {
        return Some(dir.join(format!("{}.png", stem)));
    }

    let parent = match source {
        ImageSource::File(path) => path.parent().unwrap_or(Path::new(".")).to_path_buf(),
        ImageSource::Remote(_) => PathBuf::from("."),
    };
    Some(parent.join(format!("{}_colored.png", stem)))
}
