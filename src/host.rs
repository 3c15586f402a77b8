//! Host document driver interface.
//!
//! The size-mark operation never touches pixels itself; it issues commands
//! through [`HostDriver`]. [`SizeMarksApp`](crate::app::SizeMarksApp) is the
//! in-process implementation, and tests drive the operation with recording
//! doubles.

use std::fmt;

use image::Rgba;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::HostResult;
use crate::units::{RulerUnit, TypeUnit};

/// Stable identity of a layer inside one document.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LayerId(pub Uuid);

impl LayerId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for LayerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for LayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A point in document space.
#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Rectangular selection edges in the active ruler unit.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SelectionBounds {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
}

impl SelectionBounds {
    pub const fn new(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn width(&self) -> f64 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f64 {
        self.y2 - self.y1
    }
}

/// Horizontal alignment of point text relative to its anchor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Justification {
    #[default]
    Left,
    Center,
    Right,
}

/// Tools the driver can activate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ToolKind {
    #[default]
    RectangularMarquee,
    Pencil,
}

/// Contents and style of a point-text layer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TextItem {
    pub contents: String,
    /// Size in the host's current type unit.
    pub size: f64,
    /// PostScript font name.
    pub font: String,
    pub justification: Justification,
    pub color: [u8; 4],
    pub optical_kerning: bool,
}

impl Default for TextItem {
    fn default() -> Self {
        Self {
            contents: String::new(),
            size: 12.0,
            font: "ArialMT".to_string(),
            justification: Justification::Left,
            color: [0, 0, 0, 255],
            optical_kerning: false,
        }
    }
}

/// Capability interface of a host image editor.
///
/// Document-level methods fail with [`HostError::NoDocument`](crate::error::HostError::NoDocument)
/// when no document is open.
pub trait HostDriver {
    // -- application -----------------------------------------------------

    fn has_active_document(&self) -> bool;

    fn ruler_units(&self) -> RulerUnit;
    fn set_ruler_units(&mut self, unit: RulerUnit);

    fn type_units(&self) -> TypeUnit;
    fn set_type_units(&mut self, unit: TypeUnit);

    fn foreground_color(&self) -> Rgba<u8>;

    fn set_active_tool(&mut self, tool: ToolKind) -> HostResult<()>;

    /// Diameter of the pencil used by [`stroke_path`](Self::stroke_path), in pixels.
    fn set_tool_size(&mut self, diameter: f64) -> HostResult<()>;

    fn set_artboard_auto_nest(&mut self, enabled: bool) -> HostResult<()>;

    /// Show a modal message to the user.
    fn alert(&mut self, message: &str);

    // -- document --------------------------------------------------------

    /// Pixels per inch of the active document.
    fn resolution(&self) -> HostResult<f64>;

    /// Selection edges in the current ruler unit, `None` without a selection.
    fn selection_bounds(&self) -> HostResult<Option<SelectionBounds>>;

    fn deselect(&mut self) -> HostResult<()>;

    fn active_layer(&self) -> HostResult<LayerId>;

    fn layer_count(&self) -> HostResult<usize>;

    /// Add an empty raster layer above the active one and make it active.
    fn add_layer(&mut self) -> HostResult<LayerId>;

    /// Stroke an open path with the pencil. Coordinates are in points
    /// (1/72 inch), independent of the document resolution.
    fn stroke_path(&mut self, layer: LayerId, points: &[Point]) -> HostResult<()>;

    /// Add an empty point-text layer above the active one and make it active.
    fn create_text_layer(&mut self) -> HostResult<LayerId>;

    fn set_text_item(&mut self, layer: LayerId, item: &TextItem) -> HostResult<()>;

    /// Move a layer's content by `(dx, dy)` pixels.
    fn translate_layer(&mut self, layer: LayerId, dx: f64, dy: f64) -> HostResult<()>;

    /// Convert a text layer into plain pixels.
    fn rasterize_layer(&mut self, layer: LayerId) -> HostResult<()>;

    /// Reorder `layer` so it sits directly above `target`.
    fn move_layer_above(&mut self, layer: LayerId, target: LayerId) -> HostResult<()>;

    /// Merge `layer` into the layer directly below it and return the result.
    fn merge_down(&mut self, layer: LayerId) -> HostResult<LayerId>;

    fn set_layer_name(&mut self, layer: LayerId, name: &str) -> HostResult<()>;

    /// Layer opacity in percent (0–100).
    fn set_layer_opacity(&mut self, layer: LayerId, percent: f64) -> HostResult<()>;

    /// Start a named undo group. Everything until the matching
    /// [`end_history_group`](Self::end_history_group) becomes one undo step.
    fn begin_history_group(&mut self, name: &str) -> HostResult<()>;

    /// Close the open group. `commit == false` reverts everything done
    /// inside the group.
    fn end_history_group(&mut self, commit: bool) -> HostResult<()>;
}
