use crate::host::SelectionBounds;
use crate::units::RulerUnit;

/// Hair space placed between a measurement and its unit.
pub const LABEL_SEPARATOR: char = '\u{200A}';

/// Round `value` to `decimals` places, halves away from zero.
///
/// The value is shifted through its decimal text form (`"1.005e2"`), not
/// multiplied, so inputs such as `1.005` that are stored as `1.00499…` still
/// round up like they read.
pub fn round(value: f64, decimals: u32) -> f64 {
    if !value.is_finite() {
        return value;
    }
    let shifted = match format!("{}e{}", value, decimals).parse::<f64>() {
        Ok(v) => v.round(),
        Err(_) => return value,
    };
    format!("{}e-{}", shifted, decimals)
        .parse::<f64>()
        .unwrap_or(value)
}

/// Selection size in the user's own ruler unit, captured before the working
/// units are forced to pixels.
#[derive(Clone, Debug, PartialEq)]
pub struct RealValues {
    pub unit: RulerUnit,
    pub decimals: u32,
    pub width: f64,
    pub height: f64,
}

impl RealValues {
    pub fn capture(unit: RulerUnit, bounds: &SelectionBounds) -> Self {
        let decimals = unit.label_decimals();
        Self {
            unit,
            decimals,
            width: round(bounds.width(), decimals),
            height: round(bounds.height(), decimals),
        }
    }

    pub fn unit_label(&self) -> &'static str {
        self.unit.abbreviation()
    }
}

/// `"{value}{separator}{unit}"`, with the value in its shortest form.
pub fn format_label(value: f64, unit: &str, separator: char) -> String {
    format!("{}{}{}", value, separator, unit)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[rstest]
    #[case(2.5, 0, 3.0)]
    #[case(1.25, 1, 1.3)]
    #[case(1.005, 2, 1.01)]
    #[case(0.5, 0, 1.0)]
    #[case(199.49, 0, 199.0)]
    #[case(3.14159, 3, 3.142)]
    #[case(7.0, 2, 7.0)]
    #[case(-2.5, 0, -3.0)]
    fn rounds_half_away_from_zero(#[case] value: f64, #[case] decimals: u32, #[case] expected: f64) {
        assert_eq!(round(value, decimals), expected);
    }

    #[test]
    fn round_leaves_non_finite_values_alone() {
        assert!(round(f64::NAN, 2).is_nan());
        assert_eq!(round(f64::INFINITY, 1), f64::INFINITY);
    }

    #[test]
    fn integral_values_are_not_padded() {
        assert_eq!(format_label(10.0, "in", LABEL_SEPARATOR), "10\u{200A}in");
        assert_eq!(format_label(3.5, "cm", LABEL_SEPARATOR), "3.5\u{200A}cm");
        assert_eq!(format_label(120.0, "px", LABEL_SEPARATOR), "120\u{200A}px");
    }

    #[test]
    fn real_values_round_in_the_unit() {
        // 100 px at 72 dpi = 3.5277… cm
        let bounds = SelectionBounds::new(0.0, 0.0, 3.527_777, 1.0);
        let real = RealValues::capture(RulerUnit::Centimeters, &bounds);
        assert_eq!(
            real,
            RealValues {
                unit: RulerUnit::Centimeters,
                decimals: 1,
                width: 3.5,
                height: 1.0,
            }
        );
        assert_eq!(real.unit_label(), "cm");
    }
}
