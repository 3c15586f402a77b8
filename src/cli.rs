// ============================================================================
// SizeMarks CLI: headless batch size marks via command-line arguments
// ============================================================================
//
// Usage examples:
//   sizemarks -i board.png --select 40,40,640,200 -o board_marked.png
//   sizemarks -i plan.tif --resolution 300 --units cm --select 0,0,1181,600 -o plan.smk
//   sizemarks -i shots/*.png --script mark_all.rhai --output-dir marked/
//
// All processing runs synchronously on the current thread.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;

use clap::Parser;

use crate::app::SizeMarksApp;
use crate::config::SizeMarkSettings;
use crate::host::HostDriver;
use crate::io::{SaveFormat, TiffCompression, load_image, save_canvas};
use crate::ops::scripting::{compile_script, execute_script_sync, parse_hex_color};
use crate::ops::size_mark;
use crate::units::RulerUnit;

// ============================================================================
// CLI argument definition (clap Derive)
// ============================================================================

/// SizeMarks headless batch tool.
///
/// Adds size marks (dimension line, end ticks and a measurement label) to
/// rectangular selections in image files.
#[derive(Parser, Debug)]
#[command(
    name = "sizemarks",
    about = "Add size marks to image selections without a GUI",
    long_about = "Draw a dimension line with end ticks and a size label for a rectangular\n\
                  selection, merged into one named layer. Supports PNG, JPEG, WEBP, BMP,\n\
                  TGA, TIFF and SMK project files.\n\n\
                  Example:\n  \
                  sizemarks -i board.png --select 40,40,640,200 -o marked.png\n  \
                  sizemarks -i *.png --script mark.rhai --output-dir out/ --format smk"
)]
pub struct CliArgs {
    /// Input file(s). Glob patterns accepted (e.g. "*.png", "shots/*.jpg").
    /// SMK project files retain all layers; all other formats load as one layer.
    #[arg(short, long, required = true, num_args = 1..)]
    pub input: Vec<String>,

    /// Rectangular selection as pixel edges "x1,y1,x2,y2".
    #[arg(long, value_name = "X1,Y1,X2,Y2", value_parser = parse_selection)]
    pub select: Option<[u32; 4]>,

    /// Document resolution in pixels per inch (overrides the stored value).
    #[arg(short, long, value_name = "DPI")]
    pub resolution: Option<f64>,

    /// Ruler unit used for the label: px, in, cm, mm, pt, pc.
    #[arg(short, long, value_name = "UNIT")]
    pub units: Option<RulerUnit>,

    /// Rhai script run on each document instead of a single size mark.
    #[arg(short, long, value_name = "SCRIPT.rhai")]
    pub script: Option<PathBuf>,

    /// Foreground colour used for the mark, as RRGGBB.
    #[arg(short, long, value_name = "RRGGBB", value_parser = parse_color_arg)]
    pub color: Option<image::Rgba<u8>>,

    /// Font file used for labels instead of the installed font lookup.
    #[arg(long, value_name = "FILE")]
    pub font: Option<PathBuf>,

    /// Settings file (defaults to the per-user settings file).
    #[arg(long, value_name = "FILE")]
    pub settings: Option<PathBuf>,

    /// Output file path. Only valid for single-file input.
    /// For batch input use --output-dir instead.
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Output directory for batch processing.
    /// Files are written here with the original stem and the target format's extension.
    #[arg(long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Output format: png, jpeg, webp, bmp, tga, tiff, smk.
    /// When omitted, the format is inferred from --output's extension, defaulting to png.
    #[arg(short, long, value_name = "FORMAT")]
    pub format: Option<SaveFormat>,

    /// JPEG quality (1–100, default 90).
    #[arg(short, long, default_value_t = 90, value_name = "1-100")]
    pub quality: u8,

    /// TIFF compression mode: none, lzw, deflate (default: none).
    #[arg(long, default_value = "none", value_name = "MODE")]
    pub tiff_compression: TiffCompression,

    /// Echo log output, script console output and per-file timing.
    #[arg(short, long)]
    pub verbose: bool,
}

fn parse_selection(s: &str) -> Result<[u32; 4], String> {
    let parts: Vec<&str> = s.split(',').map(str::trim).collect();
    let [x1, y1, x2, y2] = parts.as_slice() else {
        return Err(format!("expected four comma-separated values, got '{}'", s));
    };
    let num = |v: &str| v.parse::<u32>().map_err(|e| format!("'{}': {}", v, e));
    let rect = [num(x1)?, num(y1)?, num(x2)?, num(y2)?];
    if rect[0] >= rect[2] || rect[1] >= rect[3] {
        return Err(format!("selection '{}' is empty", s));
    }
    Ok(rect)
}

fn parse_color_arg(s: &str) -> Result<image::Rgba<u8>, String> {
    parse_hex_color(s).ok_or_else(|| format!("invalid colour '{}', expected RRGGBB", s))
}

/// Per-run options shared by every input file.
struct BatchOptions<'a> {
    settings: &'a SizeMarkSettings,
    script: Option<&'a str>,
    format: SaveFormat,
    args: &'a CliArgs,
}

// ============================================================================
// Public entry point
// ============================================================================

/// Run all CLI processing and return an OS exit code.
/// `0` = all files succeeded, `1` = one or more files failed or alerted.
pub fn run(args: CliArgs) -> ExitCode {
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

    let mut settings = match &args.settings {
        Some(path) => SizeMarkSettings::load_from(path),
        None => SizeMarkSettings::load(),
    };
    if let Some(font) = &args.font {
        settings.font_file = Some(font.clone());
    }

    let script_source: Option<String> = match &args.script {
        Some(path) => match std::fs::read_to_string(path) {
            Ok(src) => {
                // Syntax errors stop the batch before any file is touched
                if let Err(e) = compile_script(&src) {
                    eprintln!("error: script '{}': {}", path.display(), e.friendly_message());
                    return ExitCode::FAILURE;
                }
                Some(src)
            }
            Err(e) => {
                eprintln!("error: could not read script '{}': {}", path.display(), e);
                return ExitCode::FAILURE;
            }
        },
        None => None,
    };

    if let Some(dir) = &args.output_dir
        && let Err(e) = std::fs::create_dir_all(dir)
    {
        eprintln!("error: could not create output directory '{}': {}", dir.display(), e);
        return ExitCode::FAILURE;
    }

    let options = BatchOptions {
        settings: &settings,
        script: script_source.as_deref(),
        format: args
            .format
            .or_else(|| args.output.as_deref().and_then(SaveFormat::from_path))
            .unwrap_or_default(),
        args: &args,
    };

    if args.quality != 90 && !options.format.supports_quality() {
        eprintln!("warning: --quality has no effect for {} output.", options.format.extension());
    }

    let total = inputs.len();
    let multi = total > 1;
    let mut any_failure = false;

    for (idx, input_path) in inputs.iter().enumerate() {
        if multi || args.verbose {
            println!("[{}/{}] {}", idx + 1, total, input_path.display());
        }
        let file_start = Instant::now();

        let Some(output_path) = build_output_path(
            input_path,
            args.output.as_deref(),
            args.output_dir.as_deref(),
            options.format,
        ) else {
            eprintln!("  error: cannot determine output path for '{}'.", input_path.display());
            any_failure = true;
            continue;
        };

        match run_one(input_path, &output_path, &options) {
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
                tracing::error!(input = %input_path.display(), error = %e, "file failed");
                eprintln!("  error: {}", e);
                any_failure = true;
            }
        }
    }

    if any_failure { ExitCode::FAILURE } else { ExitCode::SUCCESS }
}

// ============================================================================
// Per-file processing pipeline
// ============================================================================

fn run_one(input: &Path, output: &Path, options: &BatchOptions<'_>) -> Result<(), String> {
    let args = options.args;

    // -- Step 1: Load ----------------------------------------------------
    let canvas = load_image(input).map_err(|e| format!("load failed: {}", e))?;
    let mut app = SizeMarksApp::new(options.settings);
    app.open_canvas(input, canvas);

    // -- Step 2: Document setup -------------------------------------------
    if let Some(dpi) = args.resolution {
        app.set_resolution(dpi).map_err(|e| e.to_string())?;
    }
    if let Some(unit) = args.units {
        app.set_ruler_units(unit);
    }
    if let Some(color) = args.color {
        app.set_foreground(color);
    }
    if let Some([x1, y1, x2, y2]) = args.select {
        app.select_rect(x1, y1, x2, y2).map_err(|e| e.to_string())?;
    }

    // -- Step 3: Mark (script or single operation) -----------------------
    match options.script {
        Some(src) => {
            let console = execute_script_sync(src, &mut app, options.settings)
                .map_err(|e| format!("script error: {}", e.friendly_message()))?;
            if args.verbose {
                for line in &console {
                    println!("  [script] {}", line);
                }
            }
        }
        None => {
            if let Some(outcome) = size_mark::run(&mut app, options.settings)
                && args.verbose
            {
                println!("  added '{}'", outcome.layer_name);
            }
        }
    }

    let alerts = app.take_alerts();
    if !alerts.is_empty() {
        let joined: Vec<String> = alerts.iter().map(|a| a.replace('\n', " | ")).collect();
        return Err(format!("alert: {}", joined.join("; ")));
    }

    // -- Step 4: Save ----------------------------------------------------
    let canvas = app.canvas().map_err(|e| e.to_string())?;
    save_canvas(canvas, output, options.format, args.quality, args.tiff_compression)
        .map_err(|e| format!("save failed: {}", e))
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

/// Compute the output path for a single input file.
///
/// Priority:
/// 1. `--output` (explicit path, used for single-file input)
/// 2. `--output-dir` (batch directory, derives filename from input stem)
/// 3. Fallback: same directory as input, same stem, new extension
///    (appends `_marked` to stem if it would collide with the input path)
fn build_output_path(
    input: &Path,
    output: Option<&Path>,
    output_dir: Option<&Path>,
    format: SaveFormat,
) -> Option<PathBuf> {
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

    // Avoid silent overwrite of the input
    if candidate == input {
        Some(parent.join(format!("{}_marked.{}", stem, ext)))
    } else {
        Some(candidate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[rstest]
    #[case("0,0,200,50", Ok([0, 0, 200, 50]))]
    #[case(" 10, 20 ,30,40", Ok([10, 20, 30, 40]))]
    fn selection_parses(#[case] arg: &str, #[case] expected: Result<[u32; 4], String>) {
        assert_eq!(parse_selection(arg), expected);
    }

    #[rstest]
    #[case("1,2,3")]
    #[case("a,b,c,d")]
    #[case("50,0,10,10")]
    #[case("0,0,10,0")]
    fn bad_selections_are_rejected(#[case] arg: &str) {
        assert!(parse_selection(arg).is_err());
    }

    #[test]
    fn args_parse_typed_values() {
        let args = CliArgs::try_parse_from([
            "sizemarks", "-i", "a.png", "--select", "0,0,20,10", "--units", "cm", "--color", "#102030",
            "--format", "tiff", "--tiff-compression", "lzw", "-r", "300",
        ])
        .unwrap();
        assert_eq!(args.select, Some([0, 0, 20, 10]));
        assert_eq!(args.units, Some(RulerUnit::Centimeters));
        assert_eq!(args.color, Some(image::Rgba([0x10, 0x20, 0x30, 255])));
        assert_eq!(args.format, Some(SaveFormat::Tiff));
        assert_eq!(args.tiff_compression, TiffCompression::Lzw);
        assert_eq!(args.resolution, Some(300.0));

        assert!(CliArgs::try_parse_from(["sizemarks", "-i", "a.png", "--units", "furlong"]).is_err());
    }

    #[test]
    fn output_path_rules() {
        let input = Path::new("/data/shots/board.png");
        assert_eq!(
            build_output_path(input, Some(Path::new("/tmp/x.jpg")), None, SaveFormat::Jpeg),
            Some(PathBuf::from("/tmp/x.jpg"))
        );
        assert_eq!(
            build_output_path(input, None, Some(Path::new("/out")), SaveFormat::Smk),
            Some(PathBuf::from("/out/board.smk"))
        );
        assert_eq!(
            build_output_path(input, None, None, SaveFormat::Png),
            Some(PathBuf::from("/data/shots/board_marked.png"))
        );
    }
}
