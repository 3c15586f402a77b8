//! Mark geometry: where the line, ticks and label go for a selection.
//!
//! Everything here is in document pixels. The driver's path API works in
//! points, so segment coordinates pass through [`Scale`] on the way out.

use crate::host::{Justification, Point, SelectionBounds};
use crate::ops::measure::{RealValues, format_label, round};
use crate::units::POINTS_PER_INCH;

/// Resolution the nominal mark sizes are designed for.
pub const BASE_RESOLUTION: f64 = POINTS_PER_INCH;

/// Unscaled pixel nudge that centers a vertical mark's label on the line.
pub const VERTICAL_LABEL_NUDGE: f64 = 4.0;

const LINE_WIDTH_UNITS: f64 = 1.0;
const HALF_MARK_UNITS: f64 = 3.0;
const TEXT_MARGIN_UNITS: f64 = 6.0;

/// Maps pixel coordinates to path coordinates for a given resolution.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Scale {
    ratio: f64,
}

impl Scale {
    pub fn new(resolution: f64, base_resolution: f64) -> Self {
        Self {
            ratio: resolution / base_resolution,
        }
    }

    pub fn ratio(&self) -> f64 {
        self.ratio
    }

    pub fn apply(&self, value: f64) -> f64 {
        value / self.ratio
    }

    pub fn point(&self, p: Point) -> Point {
        Point::new(self.apply(p.x), self.apply(p.y))
    }
}

/// Resolution-dependent sizes of a mark, in pixels.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MarkMetrics {
    pub scale_ratio: f64,
    pub line_width: f64,
    pub half_mark: f64,
    pub text_margin: f64,
}

impl MarkMetrics {
    pub fn for_resolution(resolution: f64, base_resolution: f64) -> Self {
        let scale_ratio = resolution / base_resolution;
        // below 48 dpi the ratio would round to zero and nothing gets drawn
        let unit = round(scale_ratio, 0).max(1.0);
        Self {
            scale_ratio,
            line_width: LINE_WIDTH_UNITS * unit,
            half_mark: HALF_MARK_UNITS * unit,
            text_margin: TEXT_MARGIN_UNITS * unit,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Orientation {
    Horizontal,
    Vertical,
}

impl Orientation {
    /// Landscape selections get a horizontal mark; portrait and square ones
    /// a vertical mark.
    pub fn of(bounds: &SelectionBounds) -> Self {
        if bounds.width() > bounds.height() {
            Orientation::Horizontal
        } else {
            Orientation::Vertical
        }
    }

    /// Single-letter axis prefix of the final layer name.
    pub fn prefix(&self) -> &'static str {
        match self {
            Orientation::Horizontal => "W",
            Orientation::Vertical => "H",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Segment {
    pub start: Point,
    pub end: Point,
}

impl Segment {
    pub const fn new(start: Point, end: Point) -> Self {
        Self { start, end }
    }
}

/// Everything needed to draw one size mark.
#[derive(Clone, Debug, PartialEq)]
pub struct MarkPlan {
    pub orientation: Orientation,
    pub metrics: MarkMetrics,
    pub main_line: Segment,
    pub ticks: [Segment; 2],
    /// Baseline origin of the label text.
    pub label_anchor: Point,
    pub justification: Justification,
    pub label: String,
    pub layer_name: String,
}

impl MarkPlan {
    /// Plan a mark for `bounds` (in pixels). `real` supplies the label value.
    pub fn compute(
        bounds: &SelectionBounds,
        resolution: f64,
        base_resolution: f64,
        real: &RealValues,
        separator: char,
    ) -> Self {
        let metrics = MarkMetrics::for_resolution(resolution, base_resolution);
        let orientation = Orientation::of(bounds);
        let inset = metrics.line_width / 2.0;
        let half = metrics.half_mark;

        let (main_line, ticks, label_anchor, justification, real_value) = match orientation {
            Orientation::Horizontal => {
                let y = bounds.y1;
                let x1 = bounds.x1 + inset;
                let x2 = bounds.x2 - inset;
                (
                    Segment::new(Point::new(x1, y), Point::new(x2, y)),
                    [
                        Segment::new(Point::new(x1, y - half), Point::new(x1, y + half)),
                        Segment::new(Point::new(x2, y - half), Point::new(x2, y + half)),
                    ],
                    Point::new(bounds.x1 + bounds.width() / 2.0, y - metrics.text_margin),
                    Justification::Center,
                    real.width,
                )
            }
            Orientation::Vertical => {
                let x = bounds.x1;
                let y1 = bounds.y1 + inset;
                let y2 = bounds.y2 - inset;
                (
                    Segment::new(Point::new(x, y1), Point::new(x, y2)),
                    [
                        Segment::new(Point::new(x - half, y1), Point::new(x + half, y1)),
                        Segment::new(Point::new(x - half, y2), Point::new(x + half, y2)),
                    ],
                    Point::new(
                        x + metrics.text_margin,
                        bounds.y1 + bounds.height() / 2.0 + VERTICAL_LABEL_NUDGE,
                    ),
                    Justification::Left,
                    real.height,
                )
            }
        };

        let label = format_label(real_value, real.unit_label(), separator);
        let layer_name = format!("{} {}", orientation.prefix(), label);

        Self {
            orientation,
            metrics,
            main_line,
            ticks,
            label_anchor,
            justification,
            label,
            layer_name,
        }
    }

    /// Main line first, then both ticks.
    pub fn segments(&self) -> [Segment; 3] {
        [self.main_line, self.ticks[0], self.ticks[1]]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::measure::LABEL_SEPARATOR;
    use crate::units::RulerUnit;
    use pretty_assertions::assert_eq;

    fn plan_px(bounds: SelectionBounds, resolution: f64) -> MarkPlan {
        let real = RealValues::capture(RulerUnit::Pixels, &bounds);
        MarkPlan::compute(&bounds, resolution, BASE_RESOLUTION, &real, LABEL_SEPARATOR)
    }

    #[test]
    fn landscape_selection_gets_horizontal_mark() {
        let plan = plan_px(SelectionBounds::new(0.0, 0.0, 200.0, 50.0), 72.0);

        assert_eq!(plan.orientation, Orientation::Horizontal);
        assert_eq!(
            plan.main_line,
            Segment::new(Point::new(0.5, 0.0), Point::new(199.5, 0.0))
        );
        assert_eq!(
            plan.ticks,
            [
                Segment::new(Point::new(0.5, -3.0), Point::new(0.5, 3.0)),
                Segment::new(Point::new(199.5, -3.0), Point::new(199.5, 3.0)),
            ]
        );
        assert_eq!(plan.label_anchor, Point::new(100.0, -6.0));
        assert_eq!(plan.justification, Justification::Center);
        assert_eq!(plan.label, "200\u{200A}px");
        assert_eq!(plan.layer_name, "W 200\u{200A}px");
    }

    #[test]
    fn portrait_and_square_selections_get_vertical_mark() {
        let tall = plan_px(SelectionBounds::new(10.0, 20.0, 40.0, 120.0), 72.0);
        assert_eq!(tall.orientation, Orientation::Vertical);
        assert_eq!(
            tall.main_line,
            Segment::new(Point::new(10.0, 20.5), Point::new(10.0, 119.5))
        );
        assert_eq!(
            tall.ticks[1],
            Segment::new(Point::new(7.0, 119.5), Point::new(13.0, 119.5))
        );
        assert_eq!(tall.label_anchor, Point::new(16.0, 74.0));
        assert_eq!(tall.justification, Justification::Left);
        assert_eq!(tall.layer_name, "H 100\u{200A}px");

        let square = plan_px(SelectionBounds::new(0.0, 0.0, 64.0, 64.0), 72.0);
        assert_eq!(square.orientation, Orientation::Vertical);
    }

    #[test]
    fn sizes_scale_linearly_with_resolution() {
        let base = MarkMetrics::for_resolution(72.0, BASE_RESOLUTION);
        let double = MarkMetrics::for_resolution(144.0, BASE_RESOLUTION);
        assert_eq!(double.line_width, base.line_width * 2.0);
        assert_eq!(double.half_mark, base.half_mark * 2.0);
        assert_eq!(double.text_margin, base.text_margin * 2.0);

        // 300 dpi: ratio 4.1666… rounds to 4
        let print = MarkMetrics::for_resolution(300.0, BASE_RESOLUTION);
        assert_eq!(print.line_width, 4.0);
        assert_eq!(print.half_mark, 12.0);
    }

    #[test]
    fn low_resolution_keeps_a_visible_line() {
        let metrics = MarkMetrics::for_resolution(30.0, BASE_RESOLUTION);
        assert_eq!(metrics.line_width, 1.0);
        assert_eq!(metrics.half_mark, 3.0);
    }

    #[test]
    fn high_resolution_insets_by_half_stroke() {
        let plan = plan_px(SelectionBounds::new(0.0, 0.0, 400.0, 100.0), 144.0);
        assert_eq!(plan.metrics.line_width, 2.0);
        assert_eq!(plan.main_line.start, Point::new(1.0, 0.0));
        assert_eq!(plan.main_line.end, Point::new(399.0, 0.0));
        assert_eq!(plan.label_anchor, Point::new(200.0, -12.0));
    }

    #[test]
    fn label_uses_real_values_not_pixels() {
        let bounds_px = SelectionBounds::new(0.0, 0.0, 720.0, 72.0);
        let bounds_in = SelectionBounds::new(0.0, 0.0, 10.0, 1.0);
        let real = RealValues::capture(RulerUnit::Inches, &bounds_in);
        let plan = MarkPlan::compute(&bounds_px, 72.0, BASE_RESOLUTION, &real, LABEL_SEPARATOR);
        assert_eq!(plan.label, "10\u{200A}in");
    }

    #[test]
    fn scale_maps_pixels_to_points() {
        let scale = Scale::new(144.0, BASE_RESOLUTION);
        assert_eq!(scale.ratio(), 2.0);
        assert_eq!(scale.point(Point::new(100.0, -6.0)), Point::new(50.0, -3.0));
    }
}
