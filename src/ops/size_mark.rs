//! The size-mark operation.
//!
//! Draws a dimension line with end ticks along the selection's longer side,
//! labels it with the selection size in the user's ruler unit and merges the
//! result into a single named layer. All work goes through a [`HostDriver`].

use crate::config::SizeMarkSettings;
use crate::error::{SizeMarkError, StepContext};
use crate::host::{HostDriver, LayerId, TextItem, ToolKind};
use crate::ops::geometry::{MarkPlan, Orientation, Scale};
use crate::ops::measure::RealValues;
use crate::preferences::{Preferences, UnitScope};
use crate::units::POINTS_PER_INCH;

/// Name of the undo step a mark is recorded under.
pub const HISTORY_NAME: &str = "Add Size Mark";

/// What a successful run left in the document.
#[derive(Clone, Debug, PartialEq)]
pub struct SizeMarkOutcome {
    pub layer: LayerId,
    pub layer_name: String,
    pub orientation: Orientation,
    pub label: String,
}

/// Add a size mark for the current selection.
///
/// Fails before touching the document when there is no document or no
/// selection. A driver failure part way through aborts the undo group, so the
/// document is left as it was. Unit preferences are restored on every path.
pub fn make_size_mark<H: HostDriver + ?Sized>(
    host: &mut H,
    settings: &SizeMarkSettings,
) -> Result<SizeMarkOutcome, SizeMarkError> {
    if !host.has_active_document() {
        return Err(SizeMarkError::NoDocument);
    }
    let Some(user_bounds) = host.selection_bounds().step("read selection")? else {
        return Err(SizeMarkError::NoSelection);
    };
    let real = RealValues::capture(host.ruler_units(), &user_bounds);

    let mut host = UnitScope::enter(host, Preferences::WORKING);
    let bounds = host
        .selection_bounds()
        .step("read selection")?
        .ok_or(SizeMarkError::NoSelection)?;
    let resolution = host.resolution().step("read resolution")?;
    let plan = MarkPlan::compute(
        &bounds,
        resolution,
        settings.base_resolution,
        &real,
        settings.label_separator,
    );
    tracing::debug!(?bounds, resolution, ?plan, "planned size mark");

    host.begin_history_group(HISTORY_NAME).step("open undo group")?;
    match draw_mark(&mut *host, &plan, resolution, settings) {
        Ok(outcome) => {
            host.end_history_group(true).step("close undo group")?;
            Ok(outcome)
        }
        Err(e) => {
            if let Err(abort) = host.end_history_group(false) {
                tracing::error!(error = %abort, "could not roll back size mark");
            }
            Err(e)
        }
    }
}

/// Run [`make_size_mark`] and report any failure through the host's alert.
pub fn run<H: HostDriver + ?Sized>(host: &mut H, settings: &SizeMarkSettings) -> Option<SizeMarkOutcome> {
    match make_size_mark(host, settings) {
        Ok(outcome) => {
            tracing::info!(layer = %outcome.layer_name, "added size mark");
            Some(outcome)
        }
        Err(e) => {
            tracing::warn!(error = %e, "size mark aborted");
            host.alert(&e.alert_message());
            None
        }
    }
}

fn draw_mark<H: HostDriver + ?Sized>(
    host: &mut H,
    plan: &MarkPlan,
    resolution: f64,
    settings: &SizeMarkSettings,
) -> Result<SizeMarkOutcome, SizeMarkError> {
    // path coordinates are always points
    let scale = Scale::new(resolution, POINTS_PER_INCH);

    let stored = host.active_layer().step("read active layer")?;
    host.deselect().step("deselect")?;
    let mark = host.add_layer().step("add mark layer")?;
    host.set_active_tool(ToolKind::Pencil).step("select pencil tool")?;
    host.set_tool_size(plan.metrics.line_width).step("set pencil size")?;
    for segment in plan.segments() {
        host.stroke_path(mark, &[scale.point(segment.start), scale.point(segment.end)])
            .step("stroke mark")?;
    }
    host.set_layer_opacity(mark, settings.mark_opacity).step("set mark opacity")?;
    host.move_layer_above(mark, stored).step("arrange mark layer")?;

    host.set_artboard_auto_nest(false).step("disable artboard nesting")?;
    let labelled = add_label(host, mark, plan, settings);
    let nest = host.set_artboard_auto_nest(true).step("enable artboard nesting");
    let layer = labelled?;
    nest?;

    host.set_layer_name(layer, &plan.layer_name).step("rename layer")?;
    host.set_layer_opacity(layer, settings.final_opacity).step("set layer opacity")?;
    host.set_active_tool(ToolKind::RectangularMarquee).step("select marquee tool")?;

    Ok(SizeMarkOutcome {
        layer,
        layer_name: plan.layer_name.clone(),
        orientation: plan.orientation,
        label: plan.label.clone(),
    })
}

/// Create the label text, rasterize it and merge it into the mark layer.
fn add_label<H: HostDriver + ?Sized>(
    host: &mut H,
    mark: LayerId,
    plan: &MarkPlan,
    settings: &SizeMarkSettings,
) -> Result<LayerId, SizeMarkError> {
    let text = host.create_text_layer().step("create text layer")?;
    let item = TextItem {
        contents: plan.label.clone(),
        size: settings.font_size,
        font: settings.font_name.clone(),
        justification: plan.justification,
        color: host.foreground_color().0,
        optical_kerning: true,
    };
    host.set_text_item(text, &item).step("set label text")?;
    host.translate_layer(text, plan.label_anchor.x, plan.label_anchor.y)
        .step("position label")?;
    host.rasterize_layer(text).step("rasterize label")?;
    host.move_layer_above(text, mark).step("arrange label layer")?;
    host.merge_down(text).step("merge label")
}
