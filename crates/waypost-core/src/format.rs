//! Human-readable distance strings.
//!
//! Each unit system has a rounding table: the first threshold whose
//! maximum distance exceeds the value decides the display unit, the
//! rounding increment and the number of fraction digits. The last
//! threshold is used for anything longer.

use serde::{Deserialize, Serialize};

use crate::route::MeasurementSystem;

pub const METERS_PER_MILE: f64 = 1609.344;
pub const FEET_PER_METER: f64 = 3.28084;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LengthUnit {
    Meter,
    Kilometer,
    Foot,
    Yard,
    Mile,
}

impl LengthUnit {
    pub fn symbol(self) -> &'static str {
        match self {
            LengthUnit::Meter => "m",
            LengthUnit::Kilometer => "km",
            LengthUnit::Foot => "ft",
            LengthUnit::Yard => "yd",
            LengthUnit::Mile => "mi",
        }
    }

    /// Convert a distance in meters into this unit.
    pub fn from_meters(self, meters: f64) -> f64 {
        match self {
            LengthUnit::Meter => meters,
            LengthUnit::Kilometer => meters / 1000.0,
            LengthUnit::Foot => meters * FEET_PER_METER,
            LengthUnit::Yard => meters * FEET_PER_METER / 3.0,
            LengthUnit::Mile => meters / METERS_PER_MILE,
        }
    }
}

/// Which rounding table to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitSystem {
    #[default]
    Metric,
    Imperial,
    /// Yards for short distances, miles beyond.
    UnitedKingdom,
}

impl UnitSystem {
    /// Pick the table for a route's measurement system and locale. Imperial
    /// routes in the `en-GB` locale use the UK table.
    pub fn for_route(system: MeasurementSystem, locale: Option<&str>) -> Self {
        match system {
            MeasurementSystem::Metric => UnitSystem::Metric,
            MeasurementSystem::Imperial => match locale {
                Some(l) if l.eq_ignore_ascii_case("en-GB") || l.eq_ignore_ascii_case("en_GB") => {
                    UnitSystem::UnitedKingdom
                }
                _ => UnitSystem::Imperial,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Threshold {
    /// Exclusive upper bound, in meters.
    maximum_distance: f64,
    /// Zero disables rounding beyond the fraction digits.
    rounding_increment: f64,
    unit: LengthUnit,
    maximum_fraction_digits: usize,
}

const fn threshold(
    maximum_distance: f64,
    rounding_increment: f64,
    unit: LengthUnit,
    maximum_fraction_digits: usize,
) -> Threshold {
    Threshold {
        maximum_distance,
        rounding_increment,
        unit,
        maximum_fraction_digits,
    }
}

const METRIC: [Threshold; 5] = [
    threshold(25.0, 5.0, LengthUnit::Meter, 0),
    threshold(100.0, 25.0, LengthUnit::Meter, 0),
    threshold(999.0, 50.0, LengthUnit::Meter, 0),
    threshold(3000.0, 0.0, LengthUnit::Kilometer, 1),
    threshold(5000.0, 0.0, LengthUnit::Kilometer, 0),
];

// The first two bounds are 20 and 100 scaled by yards-per-meter.
const UNITED_KINGDOM: [Threshold; 5] = [
    threshold(20.0 * FEET_PER_METER / 3.0, 10.0, LengthUnit::Yard, 0),
    threshold(100.0 * FEET_PER_METER / 3.0, 25.0, LengthUnit::Yard, 0),
    threshold(0.1 * METERS_PER_MILE, 50.0, LengthUnit::Yard, 1),
    threshold(3.0 * METERS_PER_MILE, 0.1, LengthUnit::Mile, 1),
    threshold(5.0 * METERS_PER_MILE, 0.0, LengthUnit::Mile, 0),
];

const IMPERIAL: [Threshold; 3] = [
    threshold(0.1 * METERS_PER_MILE, 50.0, LengthUnit::Foot, 0),
    threshold(3.0 * METERS_PER_MILE, 0.1, LengthUnit::Mile, 1),
    threshold(5.0 * METERS_PER_MILE, 0.0, LengthUnit::Mile, 0),
];

#[derive(Debug, Clone, Copy, Default)]
pub struct DistanceFormatter {
    system: UnitSystem,
}

impl DistanceFormatter {
    pub fn new(system: UnitSystem) -> Self {
        Self { system }
    }

    pub fn system(&self) -> UnitSystem {
        self.system
    }

    fn table(&self) -> &'static [Threshold] {
        match self.system {
            UnitSystem::Metric => &METRIC,
            UnitSystem::Imperial => &IMPERIAL,
            UnitSystem::UnitedKingdom => &UNITED_KINGDOM,
        }
    }

    fn threshold(&self, meters: f64) -> Threshold {
        let table = self.table();
        table
            .iter()
            .find(|t| meters < t.maximum_distance)
            .copied()
            .unwrap_or(table[table.len() - 1])
    }

    /// The unit a distance would be displayed in.
    pub fn unit(&self, meters: f64) -> LengthUnit {
        self.threshold(meters).unit
    }

    /// The rounded quantity and its unit, e.g. `(2.5, Kilometer)`.
    pub fn measurement(&self, meters: f64) -> (f64, LengthUnit) {
        let t = self.threshold(meters);
        let value = t.unit.from_meters(meters.max(0.0));
        let rounded = if t.rounding_increment > 0.0 {
            // Trim float noise so 7.4999999 steps count as 7.5.
            let steps = (value / t.rounding_increment * 1e9).round() / 1e9;
            steps.round() * t.rounding_increment
        } else {
            value
        };
        (rounded, t.unit)
    }

    /// Format `meters` as e.g. `"250 m"`, `"1.2 km"`, `"0.3 mi"`.
    pub fn string(&self, meters: f64) -> String {
        let t = self.threshold(meters);
        let (value, unit) = self.measurement(meters);
        format!("{} {}", quantity(value, t.maximum_fraction_digits), unit.symbol())
    }
}

/// Render with at most `digits` fraction digits, dropping trailing zeros.
fn quantity(value: f64, digits: usize) -> String {
    let text = format!("{:.*}", digits, value);
    if !text.contains('.') {
        return text;
    }
    let trimmed = text.trim_end_matches('0').trim_end_matches('.');
    if trimmed == "-0" {
        "0".into()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ONE_MILE: f64 = METERS_PER_MILE;
    const ONE_YARD: f64 = 0.9144;
    const ONE_FOOT: f64 = 0.3048;

    fn assert_distances(formatter: DistanceFormatter, cases: &[(f64, &str)]) {
        for &(meters, expected) in cases {
            assert_eq!(formatter.string(meters), expected, "for {meters} m");
        }
    }

    #[test]
    fn metric_table() {
        assert_distances(
            DistanceFormatter::new(UnitSystem::Metric),
            &[
                (0.0, "0 m"),
                (4.0, "5 m"),
                (11.0, "10 m"),
                (15.0, "15 m"),
                (24.0, "25 m"),
                (89.0, "100 m"),
                (226.0, "250 m"),
                (275.0, "300 m"),
                (500.0, "500 m"),
                (949.0, "950 m"),
                (951.0, "950 m"),
                (999.0, "1 km"),
                (1000.0, "1 km"),
                (1001.0, "1 km"),
                (2500.0, "2.5 km"),
                (2900.0, "2.9 km"),
                (3000.0, "3 km"),
                (3500.0, "4 km"),
            ],
        );
    }

    #[test]
    fn imperial_table() {
        assert_distances(
            DistanceFormatter::new(UnitSystem::Imperial),
            &[
                (0.0, "0 ft"),
                (ONE_FOOT * 50.0, "50 ft"),
                (ONE_FOOT * 100.0, "100 ft"),
                (ONE_FOOT * 249.0, "250 ft"),
                (ONE_FOOT * 305.0, "300 ft"),
                (ONE_MILE * 0.1, "0.1 mi"),
                (ONE_MILE * 0.24, "0.2 mi"),
                (ONE_MILE * 0.251, "0.3 mi"),
                (ONE_MILE * 0.75, "0.8 mi"),
                (ONE_MILE, "1 mi"),
                (ONE_MILE * 2.5, "2.5 mi"),
                (ONE_MILE * 2.9, "2.9 mi"),
                (ONE_MILE * 3.0, "3 mi"),
                (ONE_MILE * 5.4, "5 mi"),
            ],
        );
    }

    #[test]
    fn united_kingdom_table() {
        assert_distances(
            DistanceFormatter::new(UnitSystem::UnitedKingdom),
            &[
                (0.0, "0 yd"),
                (ONE_YARD * 4.0, "0 yd"),
                (ONE_YARD * 5.0, "10 yd"),
                (ONE_YARD * 12.0, "10 yd"),
                (ONE_YARD * 24.0, "25 yd"),
                (ONE_YARD * 25.0, "25 yd"),
                (ONE_YARD * 38.0, "50 yd"),
                (ONE_YARD * 126.0, "150 yd"),
                (ONE_YARD * 150.0, "150 yd"),
                (ONE_YARD * 174.0, "150 yd"),
                (ONE_YARD * 175.0, "200 yd"),
                (ONE_MILE / 2.0, "0.5 mi"),
                (ONE_MILE, "1 mi"),
                (ONE_MILE * 2.5, "2.5 mi"),
                (ONE_MILE * 3.0, "3 mi"),
            ],
        );
    }

    #[test]
    fn measurement_reports_unit() {
        let formatter = DistanceFormatter::default();
        assert_eq!(formatter.measurement(2500.0), (2.5, LengthUnit::Kilometer));
        assert_eq!(formatter.unit(20.0), LengthUnit::Meter);
    }

    #[test]
    fn inches_per_meter() {
        let inches = LengthUnit::Foot.from_meters(1.0) * 12.0;
        assert!((inches - 39.3700787).abs() < 1e-5);
    }

    #[test]
    fn unit_system_follows_route_locale() {
        assert_eq!(
            UnitSystem::for_route(MeasurementSystem::Imperial, Some("en-GB")),
            UnitSystem::UnitedKingdom
        );
        assert_eq!(
            UnitSystem::for_route(MeasurementSystem::Imperial, Some("en-US")),
            UnitSystem::Imperial
        );
        assert_eq!(
            UnitSystem::for_route(MeasurementSystem::Metric, Some("en-GB")),
            UnitSystem::Metric
        );
    }
}
