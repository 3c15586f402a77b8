// ============================================================================
// SizeMarks Scripting System: Rhai-based sandboxed batch automation
// ============================================================================
//
// Exposes the active document and the size-mark operation to Rhai scripts so
// a batch of documents can be measured without a UI. Scripts run on the
// calling thread against a borrowed `SizeMarksApp`.

use std::sync::{Arc, Mutex};

use image::Rgba;
use rhai::{Engine, EvalAltResult, ImmutableString, Position, Scope};
use thiserror::Error;

use crate::app::SizeMarksApp;
use crate::config::SizeMarkSettings;
use crate::error::HostError;
use crate::host::HostDriver;
use crate::ops::size_mark;
use crate::units::RulerUnit;

/// Operation budget for one script run.
pub const MAX_OPERATIONS: u64 = 50_000_000;

// ============================================================================
// Error type
// ============================================================================

#[derive(Error, Debug, Clone, PartialEq)]
#[error("{}", describe(.line, .column, .message))]
pub struct ScriptError {
    pub message: String,
    pub line: Option<usize>,
    pub column: Option<usize>,
}

fn describe(line: &Option<usize>, column: &Option<usize>, message: &str) -> String {
    match (line, column) {
        (Some(line), Some(col)) => format!("Line {}, Col {}: {}", line, col, message),
        (Some(line), None) => format!("Line {}: {}", line, message),
        _ => message.to_string(),
    }
}

impl ScriptError {
    fn at(message: String, pos: Position) -> Self {
        Self {
            message,
            line: pos.line().filter(|l| *l > 0),
            column: pos.position().filter(|c| *c > 0),
        }
    }

    /// Error explanation with a hint for the common failure kinds.
    pub fn friendly_message(&self) -> String {
        let raw = &self.message;
        let cleaned = raw.split(" (line ").next().unwrap_or(raw);
        let mut parts = vec![match (self.line, self.column) {
            (Some(line), Some(col)) => format!("Error on line {}, column {}:", line, col),
            (Some(line), None) => format!("Error on line {}:", line),
            _ => "Script error:".to_string(),
        }];
        parts.push(format!("  {}", cleaned));

        if raw.contains("Function not found:") {
            parts.push(String::new());
            parts.push("  Tip: check the function name and the argument types.".to_string());
        } else if raw.contains("Too many operations") {
            parts.push(String::new());
            parts.push(format!(
                "  Tip: scripts may run at most {} operations; look for an endless loop.",
                MAX_OPERATIONS
            ));
        } else if raw.contains("no open document") {
            parts.push(String::new());
            parts.push("  Tip: scripts run against the input document; pass one with -i.".to_string());
        }
        parts.join("\n")
    }
}

// ============================================================================
// Script context: shared mutable state between engine and host functions
// ============================================================================

struct ScriptContext {
    app: SizeMarksApp,
    settings: SizeMarkSettings,
    console_output: Vec<String>,
}

type SharedContext = Arc<Mutex<ScriptContext>>;

fn host_err(e: HostError) -> Box<EvalAltResult> {
    e.to_string().into()
}

/// Parse `RRGGBB` or `#RRGGBB` into an opaque colour.
pub fn parse_hex_color(s: &str) -> Option<Rgba<u8>> {
    let hex = s.trim().trim_start_matches('#');
    if hex.len() != 6 || !hex.is_ascii() {
        return None;
    }
    let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
    Some(Rgba([channel(0)?, channel(2)?, channel(4)?, 255]))
}

// ============================================================================
// Engine construction with sandbox + API registration
// ============================================================================

fn create_engine(ctx: SharedContext) -> Engine {
    let mut engine = Engine::new();

    // ── Sandbox limits ──
    engine.set_max_operations(MAX_OPERATIONS);
    engine.set_max_call_levels(64);
    engine.set_max_expr_depths(64, 64);
    engine.set_max_string_size(10_000);
    engine.set_max_array_size(10_000);
    engine.set_max_map_size(1_000);

    register_document_api(&mut engine, ctx.clone());
    register_mark_api(&mut engine, ctx.clone());
    register_utility_api(&mut engine, ctx);

    engine
}

// ============================================================================
// Document API
// ============================================================================

fn register_document_api(engine: &mut Engine, ctx: SharedContext) {
    let c = ctx.clone();
    engine.register_fn(
        "new_document",
        move |w: i64, h: i64, dpi: f64| -> Result<(), Box<EvalAltResult>> {
            let dim = |v: i64| u32::try_from(v).unwrap_or(0);
            c_lock(&c).app.new_document(dim(w), dim(h), dpi).map_err(host_err)
        },
    );

    let c = ctx.clone();
    engine.register_fn("width", move || -> Result<i64, Box<EvalAltResult>> {
        let lock = c.lock().unwrap_or_else(|e| e.into_inner());
        Ok(lock.app.canvas().map_err(host_err)?.width as i64)
    });

    let c = ctx.clone();
    engine.register_fn("height", move || -> Result<i64, Box<EvalAltResult>> {
        let lock = c.lock().unwrap_or_else(|e| e.into_inner());
        Ok(lock.app.canvas().map_err(host_err)?.height as i64)
    });

    let c = ctx.clone();
    engine.register_fn("resolution", move || -> Result<f64, Box<EvalAltResult>> {
        let lock = c.lock().unwrap_or_else(|e| e.into_inner());
        lock.app.resolution().map_err(host_err)
    });

    let c = ctx.clone();
    engine.register_fn("set_resolution", move |dpi: f64| -> Result<(), Box<EvalAltResult>> {
        let mut lock = c.lock().unwrap_or_else(|e| e.into_inner());
        lock.app.set_resolution(dpi).map_err(host_err)
    });
    let c = ctx.clone();
    engine.register_fn("set_resolution", move |dpi: i64| -> Result<(), Box<EvalAltResult>> {
        let mut lock = c.lock().unwrap_or_else(|e| e.into_inner());
        lock.app.set_resolution(dpi as f64).map_err(host_err)
    });

    let c = ctx.clone();
    engine.register_fn(
        "select_rect",
        move |x1: i64, y1: i64, x2: i64, y2: i64| -> Result<(), Box<EvalAltResult>> {
            let clamp = |v: i64| v.clamp(0, u32::MAX as i64) as u32;
            let mut lock = c.lock().unwrap_or_else(|e| e.into_inner());
            lock.app
                .select_rect(clamp(x1), clamp(y1), clamp(x2), clamp(y2))
                .map_err(host_err)
        },
    );

    let c = ctx.clone();
    engine.register_fn("deselect", move || -> Result<(), Box<EvalAltResult>> {
        let mut lock = c.lock().unwrap_or_else(|e| e.into_inner());
        lock.app.deselect().map_err(host_err)
    });

    let c = ctx.clone();
    engine.register_fn("has_selection", move || -> Result<bool, Box<EvalAltResult>> {
        let lock = c.lock().unwrap_or_else(|e| e.into_inner());
        Ok(lock.app.selection_bounds().map_err(host_err)?.is_some())
    });

    let c = ctx.clone();
    engine.register_fn("ruler_units", move || -> ImmutableString {
        let lock = c.lock().unwrap_or_else(|e| e.into_inner());
        lock.app.ruler_units().abbreviation().into()
    });

    let c = ctx.clone();
    engine.register_fn(
        "set_ruler_units",
        move |unit: ImmutableString| -> Result<(), Box<EvalAltResult>> {
            let unit: RulerUnit = unit.parse().map_err(|e: String| -> Box<EvalAltResult> { e.into() })?;
            let mut lock = c.lock().unwrap_or_else(|e| e.into_inner());
            lock.app.set_ruler_units(unit);
            Ok(())
        },
    );

    let c = ctx.clone();
    engine.register_fn(
        "set_foreground",
        move |hex: ImmutableString| -> Result<(), Box<EvalAltResult>> {
            let color = parse_hex_color(&hex)
                .ok_or_else(|| -> Box<EvalAltResult> { format!("invalid colour '{}'", hex).into() })?;
            let mut lock = c.lock().unwrap_or_else(|e| e.into_inner());
            lock.app.set_foreground(color);
            Ok(())
        },
    );
    let c = ctx.clone();
    engine.register_fn("set_foreground", move |r: i64, g: i64, b: i64| {
        let channel = |v: i64| v.clamp(0, 255) as u8;
        let mut lock = c.lock().unwrap_or_else(|e| e.into_inner());
        lock.app.set_foreground(Rgba([channel(r), channel(g), channel(b), 255]));
    });

    let c = ctx.clone();
    engine.register_fn("layer_count", move || -> Result<i64, Box<EvalAltResult>> {
        let lock = c.lock().unwrap_or_else(|e| e.into_inner());
        Ok(lock.app.layer_count().map_err(host_err)? as i64)
    });

    let c = ctx.clone();
    engine.register_fn(
        "layer_name",
        move |index: i64| -> Result<ImmutableString, Box<EvalAltResult>> {
            let lock = c.lock().unwrap_or_else(|e| e.into_inner());
            let index = usize::try_from(index)
                .map_err(|_| -> Box<EvalAltResult> { format!("layer index {} out of range", index).into() })?;
            Ok(lock.app.layer_name(index).map_err(host_err)?.into())
        },
    );

    let c = ctx.clone();
    engine.register_fn("undo", move || -> Result<bool, Box<EvalAltResult>> {
        let mut lock = c.lock().unwrap_or_else(|e| e.into_inner());
        Ok(lock.app.undo().map_err(host_err)?.is_some())
    });
    let c = ctx.clone();
    engine.register_fn("redo", move || -> Result<bool, Box<EvalAltResult>> {
        Ok(c_lock(&c).app.redo().map_err(host_err)?.is_some())
    });
    let c = ctx;
    engine.register_fn("undo_steps", move || -> Result<i64, Box<EvalAltResult>> {
        Ok(c_lock(&c).app.undo_steps().map_err(host_err)? as i64)
    });
}

// ============================================================================
// Size-mark API
// ============================================================================

fn register_mark_api(engine: &mut Engine, ctx: SharedContext) {
    // size_mark(): final layer name, or "" when the operation alerted
    engine.register_fn("size_mark", move || -> ImmutableString {
        let mut lock = c_lock(&ctx);
        let ScriptContext { app, settings, .. } = &mut *lock;
        size_mark::run(app, settings)
            .map(|outcome| outcome.layer_name)
            .unwrap_or_default()
            .into()
    });
}

fn c_lock(ctx: &SharedContext) -> std::sync::MutexGuard<'_, ScriptContext> {
    ctx.lock().unwrap_or_else(|e| e.into_inner())
}

// ============================================================================
// Utility API
// ============================================================================

fn register_utility_api(engine: &mut Engine, ctx: SharedContext) {
    let c = ctx.clone();
    engine.register_fn("print_line", move |msg: ImmutableString| {
        tracing::info!(target: "script", "{}", msg);
        c_lock(&c).console_output.push(msg.to_string());
    });
    // Also override built-in print
    let c = ctx;
    engine.on_print(move |msg| {
        tracing::info!(target: "script", "{}", msg);
        c_lock(&c).console_output.push(msg.to_string());
    });
}

// ============================================================================
// Public execution API
// ============================================================================

/// Compile a script without running it.
pub fn compile_script(source: &str) -> Result<(), ScriptError> {
    let engine = Engine::new();
    engine
        .compile(source)
        .map(|_| ())
        .map_err(|e| ScriptError::at(e.to_string(), e.position()))
}

/// Execute a script synchronously against `app`.
///
/// The app is lent to the script for the duration of the run and handed back
/// afterwards, whether the script succeeds or not. Returns the console output.
pub fn execute_script_sync(
    source: &str,
    app: &mut SizeMarksApp,
    settings: &SizeMarkSettings,
) -> Result<Vec<String>, ScriptError> {
    let ctx = Arc::new(Mutex::new(ScriptContext {
        app: std::mem::take(app),
        settings: settings.clone(),
        console_output: Vec::new(),
    }));

    let result = {
        let engine = create_engine(ctx.clone());
        let mut scope = Scope::new();
        engine
            .compile(source)
            .map_err(|e| ScriptError::at(e.to_string(), e.position()))
            .and_then(|ast| {
                engine
                    .run_ast_with_scope(&mut scope, &ast)
                    .map_err(|e| ScriptError::at(e.to_string(), e.position()))
            })
    };

    let mut lock = c_lock(&ctx);
    std::mem::swap(app, &mut lock.app);
    let console = std::mem::take(&mut lock.console_output);

    match result {
        Ok(()) => Ok(console),
        Err(e) => {
            tracing::warn!(error = %e, "script failed");
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::path::PathBuf;

    fn app_with_doc() -> SizeMarksApp {
        let mut app = SizeMarksApp::default();
        app.new_document(320, 200, 72.0).unwrap();
        app
    }

    #[test]
    fn script_reads_and_edits_the_document() {
        let mut app = app_with_doc();
        let out = execute_script_sync(
            r#"
                print_line(`${width()}x${height()} @ ${resolution()}`);
                select_rect(10, 10, 110, 60);
                print(has_selection());
                set_ruler_units("cm");
                set_resolution(144);
                print_line(ruler_units());
            "#,
            &mut app,
            &SizeMarkSettings::default(),
        )
        .unwrap();

        assert_eq!(out, vec!["320x200 @ 72.0", "true", "cm"]);
        assert_eq!(app.ruler_units(), RulerUnit::Centimeters);
        assert_eq!(app.resolution().unwrap(), 144.0);
        assert!(app.selection_bounds().unwrap().is_some());
    }

    #[test]
    fn script_can_open_documents_and_walk_history() {
        let mut app = SizeMarksApp::default();
        let out = execute_script_sync(
            r#"
                new_document(50, 30, 96.0);
                print_line(`${width()}x${height()} ${undo_steps()} ${undo()} ${redo()}`);
            "#,
            &mut app,
            &SizeMarkSettings::default(),
        )
        .unwrap();

        assert_eq!(out, vec!["50x30 0 false false"]);
        assert_eq!(app.resolution().unwrap(), 96.0);

        let err = execute_script_sync("new_document(0, 10, 72.0);", &mut app, &SizeMarkSettings::default())
            .unwrap_err();
        assert!(err.message.contains("document size"));
    }

    #[test]
    fn syntax_errors_carry_a_line() {
        let err = compile_script("let a = 1;\nlet b = ;\n").unwrap_err();
        assert_eq!(err.line, Some(2));
        assert!(err.to_string().starts_with("Line 2"));
    }

    #[test]
    fn host_errors_surface_with_position_and_app_is_returned() {
        let mut app = SizeMarksApp::default();
        let err = execute_script_sync("print(1);\nlet w = width();", &mut app, &SizeMarkSettings::default())
            .unwrap_err();
        assert_eq!(err.line, Some(2));
        assert!(err.message.contains("no open document"));
        assert!(err.friendly_message().contains("Tip"));
        // the app survives the failed run
        app.new_document(4, 4, 72.0).unwrap();
        assert!(app.has_active_document());
    }

    #[test]
    fn size_mark_returns_empty_name_when_it_alerts() {
        let settings = SizeMarkSettings {
            font_file: Some(PathBuf::from("/nonexistent/font.ttf")),
            ..SizeMarkSettings::default()
        };
        let mut app = SizeMarksApp::new(&settings);
        app.new_document(100, 40, 72.0).unwrap();

        let out = execute_script_sync(
            r#"
                print_line(size_mark());
                select_rect(0, 0, 80, 20);
                let name = size_mark();
                print_line(`[${name}] ${layer_count()}`);
            "#,
            &mut app,
            &settings,
        )
        .unwrap();

        assert_eq!(out, vec!["", "[] 1"]);
        assert_eq!(app.alerts().len(), 2);
        assert!(app.alerts()[0].contains("no selection"));
        assert!(app.alerts()[1].contains("rasterize label"));
    }

    #[test]
    fn hex_colours_parse() {
        assert_eq!(parse_hex_color("#ff8000"), Some(Rgba([255, 128, 0, 255])));
        assert_eq!(parse_hex_color("00FF00"), Some(Rgba([0, 255, 0, 255])));
        assert_eq!(parse_hex_color("fff"), None);
        assert_eq!(parse_hex_color("zzzzzz"), None);
    }
}
