//! In-memory host application.
//!
//! `SizeMarksApp` keeps a list of open projects and the application-wide
//! state a host editor carries (unit preferences, foreground colour, active
//! tool) and answers [`HostDriver`] calls against the active project.

use image::Rgba;

use crate::canvas::{CanvasState, DEFAULT_RESOLUTION, Layer, MAX_CANVAS_DIM, MAX_RESOLUTION, TextLayer};
use crate::components::history::HistoryManager;
use crate::config::SizeMarkSettings;
use crate::error::{HostError, HostResult};
use crate::host::{HostDriver, LayerId, Point, SelectionBounds, TextItem, ToolKind};
use crate::ops::stroke::pencil_polyline;
use crate::ops::text::{FontBook, rasterize_text};
use crate::preferences::Preferences;
use crate::project::Project;
use crate::units::{POINTS_PER_INCH, RulerUnit, TypeUnit};

const TRANSPARENT: Rgba<u8> = Rgba([0, 0, 0, 0]);

pub struct SizeMarksApp {
    // Multi-Document State
    projects: Vec<Project>,
    active_project_index: usize,
    untitled_counter: usize,
    history_steps: usize,
    history_memory_bytes: usize,

    // Application state
    prefs: Preferences,
    foreground: Rgba<u8>,
    active_tool: ToolKind,
    tool_size: f64,
    artboard_auto_nest: bool,
    fonts: FontBook,

    /// Every message passed to `alert`, oldest first.
    alerts: Vec<String>,
}

impl Default for SizeMarksApp {
    fn default() -> Self {
        Self::new(&SizeMarkSettings::default())
    }
}

impl SizeMarksApp {
    pub fn new(settings: &SizeMarkSettings) -> Self {
        Self {
            projects: Vec::new(),
            active_project_index: 0,
            untitled_counter: 0,
            history_steps: settings.max_undo_steps,
            history_memory_bytes: settings.max_undo_memory_mb.saturating_mul(1024 * 1024),
            prefs: Preferences::default(),
            foreground: Rgba([0, 0, 0, 255]),
            active_tool: ToolKind::RectangularMarquee,
            tool_size: 1.0,
            artboard_auto_nest: true,
            fonts: FontBook::new(settings.font_file.clone()),
            alerts: Vec::new(),
        }
    }

    // ---- projects -----------------------------------------------------------

    pub fn active_project(&self) -> Option<&Project> {
        self.projects.get(self.active_project_index)
    }

    pub fn active_project_mut(&mut self) -> Option<&mut Project> {
        self.projects.get_mut(self.active_project_index)
    }

    /// Create a new untitled document and switch to it.
    pub fn new_document(&mut self, width: u32, height: u32, resolution: f64) -> HostResult<()> {
        check_dimensions(width, height)?;
        check_resolution(resolution)?;
        self.untitled_counter += 1;
        let mut canvas = CanvasState::new(width, height);
        canvas.resolution = resolution;
        let project = Project::new_untitled(self.untitled_counter, canvas, self.new_history());
        self.open_project(project);
        Ok(())
    }

    /// Open a document built from a loaded canvas.
    pub fn open_canvas(&mut self, path: &std::path::Path, canvas: CanvasState) {
        let project = Project::from_file(path, canvas, self.new_history());
        self.open_project(project);
    }

    fn new_history(&self) -> HistoryManager {
        HistoryManager::new(self.history_steps, Some(self.history_memory_bytes))
    }

    pub fn open_project(&mut self, project: Project) {
        tracing::info!(name = %project.name, "opened document");
        self.projects.push(project);
        self.active_project_index = self.projects.len() - 1;
    }

    fn project(&self) -> HostResult<&Project> {
        self.active_project().ok_or(HostError::NoDocument)
    }

    fn project_mut(&mut self) -> HostResult<&mut Project> {
        self.active_project_mut().ok_or(HostError::NoDocument)
    }

    pub fn canvas(&self) -> HostResult<&CanvasState> {
        self.project().map(|p| &p.canvas_state)
    }

    fn canvas_mut(&mut self) -> HostResult<&mut CanvasState> {
        Ok(&mut self.project_mut()?.canvas_state)
    }

    fn layer_index(&self, id: LayerId) -> HostResult<usize> {
        self.canvas()?.layer_index(id).ok_or(HostError::UnknownLayer(id))
    }

    fn layer_mut(&mut self, id: LayerId) -> HostResult<&mut Layer> {
        let idx = self.layer_index(id)?;
        Ok(&mut self.canvas_mut()?.layers[idx])
    }

    // ---- document editing outside the driver ---------------------------------

    /// Replace the selection with the pixel-edge rectangle `[x1, x2) × [y1, y2)`.
    pub fn select_rect(&mut self, x1: u32, y1: u32, x2: u32, y2: u32) -> HostResult<()> {
        self.canvas_mut()?.select_rect(x1, y1, x2, y2);
        Ok(())
    }

    pub fn set_resolution(&mut self, resolution: f64) -> HostResult<()> {
        check_resolution(resolution)?;
        self.canvas_mut()?.resolution = resolution;
        Ok(())
    }

    pub fn layer_name(&self, index: usize) -> HostResult<String> {
        let canvas = self.canvas()?;
        canvas
            .layers
            .get(index)
            .map(|l| l.name.clone())
            .ok_or_else(|| HostError::InvalidValue(format!("layer index {} out of range", index)))
    }

    /// Step back one history entry. Returns its description.
    pub fn undo(&mut self) -> HostResult<Option<String>> {
        let project = self.project_mut()?;
        let step = project.history.undo(&mut project.canvas_state);
        if let Some(ref name) = step {
            tracing::debug!(step = %name, "undo");
        }
        Ok(step)
    }

    /// Undo steps recorded for the active document.
    pub fn undo_steps(&self) -> HostResult<usize> {
        Ok(self.project()?.history.undo_count())
    }

    pub fn redo(&mut self) -> HostResult<Option<String>> {
        let project = self.project_mut()?;
        Ok(project.history.redo(&mut project.canvas_state))
    }

    // ---- application state ---------------------------------------------------

    pub fn set_foreground(&mut self, color: Rgba<u8>) {
        self.foreground = color;
    }

    pub fn active_tool(&self) -> ToolKind {
        self.active_tool
    }

    pub fn tool_size(&self) -> f64 {
        self.tool_size
    }

    pub fn artboard_auto_nest(&self) -> bool {
        self.artboard_auto_nest
    }

    pub fn alerts(&self) -> &[String] {
        &self.alerts
    }

    pub fn take_alerts(&mut self) -> Vec<String> {
        std::mem::take(&mut self.alerts)
    }
}

fn check_resolution(resolution: f64) -> HostResult<()> {
    if resolution > 0.0 && resolution <= MAX_RESOLUTION {
        Ok(())
    } else {
        Err(HostError::InvalidValue(format!(
            "resolution {} (must be above 0 and at most {} ppi)",
            resolution, MAX_RESOLUTION
        )))
    }
}

fn check_dimensions(width: u32, height: u32) -> HostResult<()> {
    if (1..=MAX_CANVAS_DIM).contains(&width) && (1..=MAX_CANVAS_DIM).contains(&height) {
        Ok(())
    } else {
        Err(HostError::InvalidValue(format!(
            "document size {}x{} (each side must be 1 to {} px)",
            width, height, MAX_CANVAS_DIM
        )))
    }
}

fn check_finite(points: &[Point]) -> HostResult<()> {
    if points.iter().all(|p| p.x.is_finite() && p.y.is_finite()) {
        Ok(())
    } else {
        Err(HostError::InvalidPath("non-finite coordinate".to_string()))
    }
}

impl HostDriver for SizeMarksApp {
    fn has_active_document(&self) -> bool {
        self.active_project().is_some()
    }

    fn ruler_units(&self) -> RulerUnit {
        self.prefs.ruler_units
    }

    fn set_ruler_units(&mut self, unit: RulerUnit) {
        self.prefs.ruler_units = unit;
    }

    fn type_units(&self) -> TypeUnit {
        self.prefs.type_units
    }

    fn set_type_units(&mut self, unit: TypeUnit) {
        self.prefs.type_units = unit;
    }

    fn foreground_color(&self) -> Rgba<u8> {
        self.foreground
    }

    fn set_active_tool(&mut self, tool: ToolKind) -> HostResult<()> {
        self.active_tool = tool;
        Ok(())
    }

    fn set_tool_size(&mut self, diameter: f64) -> HostResult<()> {
        if !(diameter.is_finite() && diameter > 0.0) {
            return Err(HostError::InvalidValue(format!("tool size {}", diameter)));
        }
        self.tool_size = diameter;
        Ok(())
    }

    fn set_artboard_auto_nest(&mut self, enabled: bool) -> HostResult<()> {
        self.artboard_auto_nest = enabled;
        Ok(())
    }

    fn alert(&mut self, message: &str) {
        tracing::warn!(message, "alert");
        self.alerts.push(message.to_string());
    }

    fn resolution(&self) -> HostResult<f64> {
        Ok(self.canvas()?.resolution)
    }

    fn selection_bounds(&self) -> HostResult<Option<SelectionBounds>> {
        let canvas = self.canvas()?;
        let unit = self.prefs.ruler_units;
        let res = canvas.resolution;
        Ok(canvas.selection_bounds().map(|(x1, y1, x2, y2)| {
            SelectionBounds::new(
                unit.from_pixels(x1 as f64, res),
                unit.from_pixels(y1 as f64, res),
                unit.from_pixels(x2 as f64, res),
                unit.from_pixels(y2 as f64, res),
            )
        }))
    }

    fn deselect(&mut self) -> HostResult<()> {
        self.canvas_mut()?.clear_selection();
        Ok(())
    }

    fn active_layer(&self) -> HostResult<LayerId> {
        self.canvas()?
            .get_active_layer()
            .map(|l| l.id)
            .ok_or_else(|| HostError::Command("document has no layers".to_string()))
    }

    fn layer_count(&self) -> HostResult<usize> {
        Ok(self.canvas()?.layers.len())
    }

    fn add_layer(&mut self) -> HostResult<LayerId> {
        let canvas = self.canvas_mut()?;
        let name = format!("Layer {}", canvas.layers.len() + 1);
        let layer = Layer::new(name, canvas.width, canvas.height, TRANSPARENT);
        let id = layer.id;
        canvas.insert_above_active(layer);
        Ok(id)
    }

    fn stroke_path(&mut self, layer: LayerId, points: &[Point]) -> HostResult<()> {
        if points.is_empty() {
            return Err(HostError::InvalidPath("path has no points".to_string()));
        }
        check_finite(points)?;
        let ratio = self.resolution()? / POINTS_PER_INCH;
        let px: Vec<(f64, f64)> = points.iter().map(|p| (p.x * ratio, p.y * ratio)).collect();
        let (size, color) = (self.tool_size, self.foreground);

        let target = self.layer_mut(layer)?;
        if target.is_text() {
            return Err(HostError::Command(format!("cannot paint on text layer {}", layer)));
        }
        pencil_polyline(&mut target.pixels, &px, size, color);
        Ok(())
    }

    fn create_text_layer(&mut self) -> HostResult<LayerId> {
        let canvas = self.canvas_mut()?;
        let mut layer = Layer::new("Text".to_string(), canvas.width, canvas.height, TRANSPARENT);
        let item = TextItem {
            contents: String::new(),
            ..TextItem::default()
        };
        let size_px = TypeUnit::Points.to_pixels(item.size, canvas.resolution);
        layer.text = Some(TextLayer {
            item,
            size_px,
            origin: (0.0, 0.0),
        });
        let id = layer.id;
        canvas.insert_above_active(layer);
        Ok(id)
    }

    fn set_text_item(&mut self, layer: LayerId, item: &TextItem) -> HostResult<()> {
        if !(item.size.is_finite() && item.size > 0.0) {
            return Err(HostError::InvalidValue(format!("text size {}", item.size)));
        }
        let size_px = self.prefs.type_units.to_pixels(item.size, self.resolution()?);
        let target = self.layer_mut(layer)?;
        let Some(text) = target.text.as_mut() else {
            return Err(HostError::NotATextLayer(layer));
        };
        text.item = item.clone();
        text.size_px = size_px;
        if !item.contents.is_empty() {
            target.name = item.contents.clone();
        }
        Ok(())
    }

    fn translate_layer(&mut self, layer: LayerId, dx: f64, dy: f64) -> HostResult<()> {
        if !(dx.is_finite() && dy.is_finite()) {
            return Err(HostError::InvalidValue(format!("offset ({}, {})", dx, dy)));
        }
        let target = self.layer_mut(layer)?;
        if let Some(text) = target.text.as_mut() {
            text.origin.0 += dx;
            text.origin.1 += dy;
        }
        if target.pixels.chunk_count() > 0 {
            target.pixels = target.pixels.translated(dx.round() as i32, dy.round() as i32);
        }
        Ok(())
    }

    fn rasterize_layer(&mut self, layer: LayerId) -> HostResult<()> {
        let idx = self.layer_index(layer)?;
        let Some(text) = self.canvas()?.layers[idx].text.clone() else {
            return Ok(());
        };
        let font = self.fonts.resolve(&text.item.font)?;

        let canvas = self.canvas_mut()?;
        let (w, h) = (canvas.width, canvas.height);
        let raster = rasterize_text(
            &font,
            &text.item.contents,
            text.size_px as f32,
            text.item.justification,
            text.item.optical_kerning,
            text.origin.0 as f32,
            text.origin.1 as f32,
            text.item.color,
            w,
            h,
        );
        let target = &mut canvas.layers[idx];
        if !raster.is_empty() {
            target
                .pixels
                .blit_rgba_at(raster.off_x, raster.off_y, raster.buf_w, raster.buf_h, &raster.buf);
        }
        target.text = None;
        tracing::debug!(layer = %layer, text = %text.item.contents, "rasterized text layer");
        Ok(())
    }

    fn move_layer_above(&mut self, layer: LayerId, target: LayerId) -> HostResult<()> {
        let from = self.layer_index(layer)?;
        let to = self.layer_index(target)?;
        self.canvas_mut()?
            .move_layer_above(from, to)
            .map(|_| ())
            .ok_or(HostError::UnknownLayer(layer))
    }

    fn merge_down(&mut self, layer: LayerId) -> HostResult<LayerId> {
        let idx = self.layer_index(layer)?;
        if idx == 0 {
            return Err(HostError::NothingToMerge(layer));
        }
        let canvas = self.canvas_mut()?;
        if canvas.layers[idx].is_text() || canvas.layers[idx - 1].is_text() {
            return Err(HostError::Command("text layers must be rasterized before merging".to_string()));
        }
        let merged = canvas.merge_down(idx).ok_or(HostError::NothingToMerge(layer))?;
        Ok(canvas.layers[merged].id)
    }

    fn set_layer_name(&mut self, layer: LayerId, name: &str) -> HostResult<()> {
        self.layer_mut(layer)?.name = name.to_string();
        Ok(())
    }

    fn set_layer_opacity(&mut self, layer: LayerId, percent: f64) -> HostResult<()> {
        if !(0.0..=100.0).contains(&percent) {
            return Err(HostError::InvalidValue(format!("opacity {}%", percent)));
        }
        self.layer_mut(layer)?.opacity = (percent / 100.0) as f32;
        Ok(())
    }

    fn begin_history_group(&mut self, name: &str) -> HostResult<()> {
        let project = self.project_mut()?;
        if !project.history.begin_group(name, &project.canvas_state) {
            return Err(HostError::Command("a history group is already open".to_string()));
        }
        Ok(())
    }

    fn end_history_group(&mut self, commit: bool) -> HostResult<()> {
        let project = self.project_mut()?;
        let closed = if commit {
            project.history.commit_group(&project.canvas_state)
        } else {
            project.history.abort_group(&mut project.canvas_state)
        };
        if !closed {
            return Err(HostError::NoOpenGroup);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn app_with_doc(w: u32, h: u32, res: f64) -> SizeMarksApp {
        let mut app = SizeMarksApp::default();
        app.new_document(w, h, res).unwrap();
        app
    }

    #[test]
    fn document_calls_fail_without_a_document() {
        let mut app = SizeMarksApp::default();
        assert!(!app.has_active_document());
        assert_eq!(app.resolution(), Err(HostError::NoDocument));
        assert_eq!(app.add_layer(), Err(HostError::NoDocument));
        assert_eq!(app.selection_bounds(), Err(HostError::NoDocument));
    }

    #[test]
    fn selection_bounds_follow_ruler_units() {
        let mut app = app_with_doc(600, 400, 300.0);
        assert_eq!(app.selection_bounds().unwrap(), None);

        app.select_rect(0, 0, 300, 150).unwrap();
        assert_eq!(
            app.selection_bounds().unwrap(),
            Some(SelectionBounds::new(0.0, 0.0, 300.0, 150.0))
        );

        app.set_ruler_units(RulerUnit::Inches);
        assert_eq!(
            app.selection_bounds().unwrap(),
            Some(SelectionBounds::new(0.0, 0.0, 1.0, 0.5))
        );
    }

    #[test]
    fn stroke_path_takes_points() {
        let mut app = app_with_doc(100, 100, 144.0);
        let layer = app.add_layer().unwrap();
        app.set_tool_size(2.0).unwrap();
        // 10pt at 144 dpi is 20px
        app.stroke_path(layer, &[Point::new(5.0, 10.0), Point::new(20.0, 10.0)])
            .unwrap();

        let canvas = app.canvas().unwrap();
        let pixels = &canvas.layers[canvas.layer_index(layer).unwrap()].pixels;
        assert_eq!(pixels.get_pixel(10, 19)[3], 255);
        assert_eq!(pixels.get_pixel(40, 20)[3], 255);
        assert_eq!(pixels.get_pixel(5, 19)[3], 0);
    }

    #[test]
    fn text_items_only_apply_to_text_layers() {
        let mut app = app_with_doc(50, 50, 72.0);
        let raster = app.add_layer().unwrap();
        let item = TextItem {
            contents: "12 px".into(),
            ..TextItem::default()
        };
        assert_eq!(app.set_text_item(raster, &item), Err(HostError::NotATextLayer(raster)));

        let text = app.create_text_layer().unwrap();
        app.set_type_units(TypeUnit::Pixels);
        app.set_text_item(text, &item).unwrap();
        app.translate_layer(text, 10.0, 20.0).unwrap();

        let canvas = app.canvas().unwrap();
        let layer = &canvas.layers[canvas.layer_index(text).unwrap()];
        let live = layer.text.as_ref().unwrap();
        assert_eq!(live.size_px, 12.0);
        assert_eq!(live.origin, (10.0, 20.0));
        assert_eq!(layer.name, "12 px");
    }

    #[test]
    fn unrasterized_text_cannot_be_merged() {
        let mut app = app_with_doc(20, 20, 72.0);
        let text = app.create_text_layer().unwrap();
        assert!(matches!(app.merge_down(text), Err(HostError::Command(_))));

        let background = app.canvas().unwrap().layers[0].id;
        assert_eq!(app.merge_down(background), Err(HostError::NothingToMerge(background)));
    }

    #[test]
    fn history_group_commit_and_abort() {
        let mut app = app_with_doc(20, 20, 72.0);

        app.begin_history_group("Add Size Mark").unwrap();
        app.add_layer().unwrap();
        app.end_history_group(true).unwrap();
        assert_eq!(app.layer_count().unwrap(), 2);

        app.begin_history_group("Add Size Mark").unwrap();
        app.add_layer().unwrap();
        app.end_history_group(false).unwrap();
        assert_eq!(app.layer_count().unwrap(), 2);

        assert_eq!(app.end_history_group(true), Err(HostError::NoOpenGroup));
        assert_eq!(app.undo().unwrap().as_deref(), Some("Add Size Mark"));
        assert_eq!(app.layer_count().unwrap(), 1);
    }

    #[test]
    fn opacity_is_validated() {
        let mut app = app_with_doc(8, 8, 72.0);
        let layer = app.add_layer().unwrap();
        assert!(app.set_layer_opacity(layer, 120.0).is_err());
        app.set_layer_opacity(layer, 65.0).unwrap();
        let canvas = app.canvas().unwrap();
        assert!((canvas.layers[1].opacity - 0.65).abs() < 1e-6);
    }

    #[test]
    fn document_size_and_resolution_are_bounded() {
        let mut app = SizeMarksApp::default();
        assert!(matches!(app.new_document(0, 10, 72.0), Err(HostError::InvalidValue(_))));
        assert!(matches!(app.new_document(10, MAX_CANVAS_DIM + 1, 72.0), Err(HostError::InvalidValue(_))));
        assert!(matches!(app.new_document(10, 10, 1_000_000.0), Err(HostError::InvalidValue(_))));
        assert!(matches!(app.new_document(10, 10, f64::NAN), Err(HostError::InvalidValue(_))));
        assert!(!app.has_active_document());

        app.new_document(10, 10, MAX_RESOLUTION).unwrap();
        assert!(matches!(app.set_resolution(MAX_RESOLUTION * 2.0), Err(HostError::InvalidValue(_))));
        assert!(matches!(app.set_resolution(0.0), Err(HostError::InvalidValue(_))));
        assert_eq!(app.resolution(), Ok(MAX_RESOLUTION));
    }

    #[test]
    fn alerts_are_collected() {
        let mut app = SizeMarksApp::default();
        app.alert("first");
        app.alert("second");
        assert_eq!(app.take_alerts(), vec!["first".to_string(), "second".to_string()]);
        assert!(app.alerts().is_empty());
    }
}
