//! Ruler and type measurement units.
//!
//! Documents store everything in pixels; the host reports selection bounds in
//! whichever ruler unit the user picked, using the document resolution
//! (pixels per inch) for the physical units.

use std::fmt;
use std::str::FromStr;

/// Points per inch. Also the resolution at which one pixel equals one point.
pub const POINTS_PER_INCH: f64 = 72.0;

/// Unit used for rulers and selection bounds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Hash)]
pub enum RulerUnit {
    #[default]
    Pixels,
    Inches,
    Centimeters,
    Millimeters,
    Points,
    Picas,
}

impl RulerUnit {
    pub fn all() -> &'static [RulerUnit] {
        &[
            RulerUnit::Pixels,
            RulerUnit::Inches,
            RulerUnit::Centimeters,
            RulerUnit::Millimeters,
            RulerUnit::Points,
            RulerUnit::Picas,
        ]
    }

    /// Abbreviation used in measurement labels.
    pub fn abbreviation(&self) -> &'static str {
        match self {
            RulerUnit::Pixels => "px",
            RulerUnit::Inches => "in",
            RulerUnit::Centimeters => "cm",
            RulerUnit::Millimeters => "mm",
            RulerUnit::Points => "pt",
            RulerUnit::Picas => "pc",
        }
    }

    /// Decimal places shown for a measurement in this unit.
    pub fn label_decimals(&self) -> u32 {
        match self {
            RulerUnit::Pixels => 0,
            RulerUnit::Inches => 3,
            RulerUnit::Centimeters => 1,
            RulerUnit::Millimeters => 0,
            RulerUnit::Points => 1,
            RulerUnit::Picas => 2,
        }
    }

    /// How many of this unit make up one inch (`None` for pixels, which
    /// depend on resolution).
    fn per_inch(&self) -> Option<f64> {
        match self {
            RulerUnit::Pixels => None,
            RulerUnit::Inches => Some(1.0),
            RulerUnit::Centimeters => Some(2.54),
            RulerUnit::Millimeters => Some(25.4),
            RulerUnit::Points => Some(POINTS_PER_INCH),
            RulerUnit::Picas => Some(6.0),
        }
    }

    /// Convert a pixel distance into this unit.
    pub fn from_pixels(&self, px: f64, resolution: f64) -> f64 {
        match self.per_inch() {
            None => px,
            Some(per_inch) => px / resolution * per_inch,
        }
    }

    /// Convert a distance in this unit into pixels.
    pub fn to_pixels(&self, value: f64, resolution: f64) -> f64 {
        match self.per_inch() {
            None => value,
            Some(per_inch) => value / per_inch * resolution,
        }
    }
}

impl fmt::Display for RulerUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.abbreviation())
    }
}

impl FromStr for RulerUnit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "px" | "pixel" | "pixels" => Ok(RulerUnit::Pixels),
            "in" | "inch" | "inches" => Ok(RulerUnit::Inches),
            "cm" | "centimeters" | "centimetres" => Ok(RulerUnit::Centimeters),
            "mm" | "millimeters" | "millimetres" => Ok(RulerUnit::Millimeters),
            "pt" | "point" | "points" => Ok(RulerUnit::Points),
            "pc" | "pica" | "picas" => Ok(RulerUnit::Picas),
            other => Err(format!("unknown ruler unit '{}'", other)),
        }
    }
}

/// Unit used for text sizes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Hash)]
pub enum TypeUnit {
    Pixels,
    #[default]
    Points,
}

impl TypeUnit {
    /// Convert a text size in this unit to pixels.
    pub fn to_pixels(&self, size: f64, resolution: f64) -> f64 {
        match self {
            TypeUnit::Pixels => size,
            TypeUnit::Points => size * resolution / POINTS_PER_INCH,
        }
    }
}

impl FromStr for TypeUnit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "px" | "pixels" => Ok(TypeUnit::Pixels),
            "pt" | "points" => Ok(TypeUnit::Points),
            other => Err(format!("unknown type unit '{}'", other)),
        }
    }
}
