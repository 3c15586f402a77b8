use std::path::Path;
use std::process::ExitCode;

use clap::Parser;
use image::{Rgba, RgbaImage};
use pretty_assertions::assert_eq;

use sizemarks::cli::{CliArgs, run};

fn write_png(path: &Path) {
    RgbaImage::from_pixel(120, 80, Rgba([255, 255, 255, 255]))
        .save(path)
        .unwrap();
}

fn args(list: &[&str]) -> CliArgs {
    let mut full = vec!["sizemarks"];
    full.extend_from_slice(list);
    CliArgs::try_parse_from(full).unwrap()
}

#[test]
fn unreadable_font_fails_without_writing_output() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("board.png");
    let output = dir.path().join("board_marked.png");
    write_png(&input);

    let code = run(args(&[
        "-i",
        input.to_str().unwrap(),
        "--select",
        "10,10,90,30",
        "--font",
        dir.path().join("missing.ttf").to_str().unwrap(),
        "--settings",
        dir.path().join("none.cfg").to_str().unwrap(),
        "-o",
        output.to_str().unwrap(),
    ]));

    assert_eq!(code, ExitCode::FAILURE);
    assert!(!output.exists());
}

#[test]
fn missing_selection_is_reported_as_failure() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("board.png");
    write_png(&input);

    let code = run(args(&[
        "-i",
        input.to_str().unwrap(),
        "--output-dir",
        dir.path().join("out").to_str().unwrap(),
    ]));

    assert_eq!(code, ExitCode::FAILURE);
    assert!(!dir.path().join("out").join("board.png").exists());
}

#[test]
fn script_runs_per_file_and_saves_each_output() {
    let dir = tempfile::tempdir().unwrap();
    write_png(&dir.path().join("a.png"));
    write_png(&dir.path().join("b.png"));
    let script = dir.path().join("setup.rhai");
    std::fs::write(&script, "set_resolution(300);\nselect_rect(0, 0, 40, 20);\nprint(width());\n").unwrap();
    let out_dir = dir.path().join("out");
    let pattern = dir.path().join("*.png");

    let code = run(args(&[
        "-i",
        pattern.to_str().unwrap(),
        "--script",
        script.to_str().unwrap(),
        "--output-dir",
        out_dir.to_str().unwrap(),
        "--format",
        "smk",
    ]));

    assert_eq!(code, ExitCode::SUCCESS);
    for stem in ["a", "b"] {
        let loaded = sizemarks::io::load_project(&out_dir.join(format!("{}.smk", stem))).unwrap();
        assert_eq!(loaded.resolution, 300.0);
        assert_eq!(loaded.layers.len(), 1);
    }
}

#[test]
fn script_syntax_error_stops_before_any_output() {
    let dir = tempfile::tempdir().unwrap();
    write_png(&dir.path().join("a.png"));
    let script = dir.path().join("broken.rhai");
    std::fs::write(&script, "select_rect(0, 0, 40, 20);\nlet x = ;\n").unwrap();
    let out_dir = dir.path().join("out");

    let code = run(args(&[
        "-i",
        dir.path().join("a.png").to_str().unwrap(),
        "--script",
        script.to_str().unwrap(),
        "--output-dir",
        out_dir.to_str().unwrap(),
    ]));

    assert_eq!(code, ExitCode::FAILURE);
    assert!(!out_dir.join("a.png").exists());
}

#[test]
fn oversized_resolution_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("board.png");
    let output = dir.path().join("board_marked.png");
    write_png(&input);

    let code = run(args(&[
        "-i",
        input.to_str().unwrap(),
        "--resolution",
        "1000000",
        "--select",
        "10,10,90,30",
        "-o",
        output.to_str().unwrap(),
    ]));

    assert_eq!(code, ExitCode::FAILURE);
    assert!(!output.exists());
}

#[test]
fn single_output_path_rejects_batches() {
    let dir = tempfile::tempdir().unwrap();
    write_png(&dir.path().join("a.png"));
    write_png(&dir.path().join("b.png"));
    let pattern = dir.path().join("*.png");

    let code = run(args(&[
        "-i",
        pattern.to_str().unwrap(),
        "-o",
        dir.path().join("x.png").to_str().unwrap(),
    ]));

    assert_eq!(code, ExitCode::FAILURE);
    assert!(!dir.path().join("x.png").exists());
}
