use serde::{Deserialize, Serialize};

use crate::geo::{is_qualified_direction, Coordinate};

/// Largest horizontal accuracy, in meters, still trusted for navigation.
pub const MAX_QUALIFIED_HORIZONTAL_ACCURACY: f64 = 100.0;

/// A single position fix from a location provider.
///
/// Negative `course`, `speed` or accuracy values mean "unknown", matching
/// what platform location services report.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    #[serde(flatten)]
    pub coordinate: Coordinate,
    #[serde(default)]
    pub altitude: f64,
    #[serde(default = "unknown", alias = "accuracy")]
    pub horizontal_accuracy: f64,
    #[serde(default = "unknown")]
    pub vertical_accuracy: f64,
    #[serde(default = "unknown")]
    pub course: f64,
    #[serde(default = "unknown")]
    pub speed: f64,
    /// Seconds since an arbitrary epoch shared by all fixes of a session.
    #[serde(default)]
    pub timestamp: f64,
}

fn unknown() -> f64 {
    -1.0
}

impl Location {
    /// A fix at `coordinate` with 5 m accuracy and unknown motion.
    pub fn new(coordinate: Coordinate, timestamp: f64) -> Self {
        Self {
            coordinate,
            altitude: 0.0,
            horizontal_accuracy: 5.0,
            vertical_accuracy: unknown(),
            course: unknown(),
            speed: unknown(),
            timestamp,
        }
    }

    pub fn with_course(mut self, course: f64) -> Self {
        self.course = course;
        self
    }

    pub fn with_speed(mut self, speed: f64) -> Self {
        self.speed = speed;
        self
    }

    pub fn with_horizontal_accuracy(mut self, accuracy: f64) -> Self {
        self.horizontal_accuracy = accuracy;
        self
    }

    /// Whether the fix is accurate enough to drive route progress.
    pub fn is_qualified(&self) -> bool {
        (0.0..=MAX_QUALIFIED_HORIZONTAL_ACCURACY).contains(&self.horizontal_accuracy)
    }

    pub fn has_course(&self) -> bool {
        is_qualified_direction(self.course)
    }

    pub fn distance_to(&self, other: &Location) -> f64 {
        self.coordinate.distance_to(&other.coordinate)
    }

    /// Copy of this fix moved to `coordinate` and pointing along `course`.
    pub fn relocated(&self, coordinate: Coordinate, course: f64) -> Location {
        Location {
            coordinate,
            course,
            ..*self
        }
    }
}

/// A compass reading.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Heading {
    /// Degrees clockwise from true north, negative when unknown.
    pub true_heading: f64,
    /// Maximum deviation in degrees, negative when invalid.
    pub accuracy: f64,
}

impl Heading {
    pub fn new(true_heading: f64, accuracy: f64) -> Self {
        Self {
            true_heading,
            accuracy,
        }
    }

    pub fn is_qualified(&self) -> bool {
        is_qualified_direction(self.true_heading) && self.accuracy >= 0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn qualification_follows_horizontal_accuracy() {
        let base = Location::new(Coordinate::new(0.0, 0.0), 0.0);
        assert!(base.is_qualified());
        assert!(base.with_horizontal_accuracy(100.0).is_qualified());
        assert!(!base.with_horizontal_accuracy(100.5).is_qualified());
        assert!(!base.with_horizontal_accuracy(-1.0).is_qualified());
    }

    #[test]
    fn unknown_course_is_reported() {
        let loc = Location::new(Coordinate::new(0.0, 0.0), 0.0);
        assert!(!loc.has_course());
        assert!(loc.with_course(0.0).has_course());
    }

    #[test]
    fn relocated_keeps_motion_fields() {
        let loc = Location::new(Coordinate::new(1.0, 2.0), 9.0).with_speed(12.0);
        let moved = loc.relocated(Coordinate::new(3.0, 4.0), 45.0);
        assert_eq!(moved.coordinate, Coordinate::new(3.0, 4.0));
        assert_eq!(moved.course, 45.0);
        assert_eq!(moved.speed, 12.0);
        assert_eq!(moved.timestamp, 9.0);
    }

    #[test]
    fn deserializes_flat_trace_entries() {
        let loc: Location = serde_json::from_str(
            r#"{"lat": 37.0, "lng": -122.0, "accuracy": 8.0, "speed": 4.5, "timestamp": 12.0}"#,
        )
        .unwrap();
        assert_eq!(loc.coordinate, Coordinate::new(37.0, -122.0));
        assert_eq!(loc.horizontal_accuracy, 8.0);
        assert_eq!(loc.speed, 4.5);
        assert_eq!(loc.course, -1.0);
    }

    #[test]
    fn heading_requires_valid_accuracy() {
        assert!(Heading::new(10.0, 5.0).is_qualified());
        assert!(!Heading::new(10.0, -1.0).is_qualified());
        assert!(!Heading::new(-1.0, 5.0).is_qualified());
    }
}
