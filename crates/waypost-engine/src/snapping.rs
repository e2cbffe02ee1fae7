//! Matching raw fixes onto the route line.
//!
//! A fix is snapped to the closest point of the nearby route geometry and
//! given a course interpolated from the line around that point, unless the
//! fix disagrees with the route too much to be trusted.

use waypost_config::NavigationSettings;
use waypost_core::geo::{angle_difference, wrap};
use waypost_core::line::Polyline;
use waypost_core::{Coordinate, Location, RouteLegProgress, RouteStep};

/// Thresholds for snapping, taken from [`NavigationSettings`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SnappingRules {
    pub snapping_distance: f64,
    pub min_speed: f64,
    pub min_horizontal_accuracy: f64,
    pub max_manipulated_course_angle: f64,
    pub maneuver_zone_radius: f64,
    pub max_degree_offset_for_turn_completion: f64,
    pub dead_reckoning_interval: f64,
}

impl SnappingRules {
    pub fn from_settings(settings: &NavigationSettings) -> Self {
        Self {
            snapping_distance: settings.snapping.user_location_snapping_distance,
            min_speed: settings.snapping.min_speed,
            min_horizontal_accuracy: settings.snapping.min_horizontal_accuracy,
            max_manipulated_course_angle: settings.snapping.max_manipulated_course_angle,
            maneuver_zone_radius: settings.maneuver.zone_radius,
            max_degree_offset_for_turn_completion: settings
                .maneuver
                .max_degree_offset_for_turn_completion,
            dead_reckoning_interval: settings.dead_reckoning.interval,
        }
    }

    /// `location` moved onto the route with an interpolated course, or
    /// `None` when it is too far away or heading somewhere else.
    pub fn snapped(&self, location: &Location, leg: &RouteLegProgress) -> Option<Location> {
        let coordinates = self.coordinates_for(location, leg);
        let closest = Polyline::new(&coordinates).closest_coordinate(&location.coordinate)?;
        let course = self.interpolated_course(location, &coordinates)?;

        let first = leg.leg().steps.first()?.coordinates.first()?;
        if !self.should_snap_course(location, course, location.coordinate.distance_to(first)) {
            return None;
        }
        if closest.distance > self.snapping_distance + location.horizontal_accuracy {
            return None;
        }
        Some(location.relocated(closest.coordinate, course))
    }

    /// Geometry to snap against.
    ///
    /// Only the current step is used ahead of a sharp turn, when the course
    /// does not yet match the upcoming step, or at low speed. Otherwise the
    /// prior and upcoming steps are included as well.
    pub fn coordinates_for(&self, location: &Location, leg: &RouteLegProgress) -> Vec<Coordinate> {
        let step_coordinates = leg.current_step().coordinates.clone();

        if let Some(upcoming) = leg.upcoming_step() {
            if let (Some(initial), Some(final_heading)) =
                (upcoming.initial_heading, upcoming.final_heading)
            {
                // 180 is a U-turn.
                let sharpest = 180.0 - self.max_manipulated_course_angle;
                if angle_difference(initial, final_heading) > sharpest {
                    return step_coordinates;
                }
                if angle_difference(final_heading, location.course)
                    > self.max_degree_offset_for_turn_completion
                {
                    return step_coordinates;
                }
            }
        }

        if location.speed <= self.min_speed {
            return step_coordinates;
        }
        leg.nearby_coordinates()
    }

    /// The direction of `coordinates` around the point closest to
    /// `location`, blended with the fix's own course.
    pub fn interpolated_course(
        &self,
        location: &Location,
        coordinates: &[Coordinate],
    ) -> Option<f64> {
        let line = Polyline::new(coordinates);
        let closest = line.closest_coordinate(&location.coordinate)?;

        let reversed: Vec<Coordinate> = coordinates.iter().rev().copied().collect();
        let behind = Polyline::new(&reversed).sliced(Some(&closest.coordinate), None);
        let ahead = line.sliced(Some(&closest.coordinate), None);

        let buffer = (location.speed * self.dead_reckoning_interval / 2.0)
            .max(self.snapping_distance / 2.0);
        let point_behind = Polyline::new(&behind).coordinate_from_start(buffer)?;
        let point_ahead = Polyline::new(&ahead).coordinate_from_start(buffer)?;
        let behind_closest = line.closest_coordinate(&point_behind)?.coordinate;
        let ahead_closest = line.closest_coordinate(&point_ahead)?.coordinate;

        let course = wrap(location.course, -180.0, 180.0);
        let relative =
            |direction: f64| wrap(wrap(direction, -180.0, 180.0) - course, -180.0, 180.0);

        let has_behind = behind_closest != closest.coordinate;
        let has_ahead = ahead_closest != closest.coordinate;
        let average = match (has_behind, has_ahead) {
            (false, false) => return None,
            (false, true) => relative(closest.coordinate.direction_to(&ahead_closest)),
            (true, false) => relative(behind_closest.direction_to(&closest.coordinate)),
            (true, true) => {
                let behind = relative(behind_closest.direction_to(&closest.coordinate));
                let ahead = relative(closest.coordinate.direction_to(&ahead_closest));
                behind + wrap(ahead - behind, -180.0, 180.0) / 2.0
            }
        };

        Some(wrap(course + average, 0.0, 360.0))
    }

    /// Whether replacing the fix's course with `calculated` is acceptable.
    ///
    /// Fast, accurate fixes keep their own course when it differs from the
    /// route by more than the manipulation limit. Near the start of the leg
    /// speed and accuracy are not required. A fix without a course has
    /// nothing to disagree with.
    pub fn should_snap_course(
        &self,
        location: &Location,
        calculated: f64,
        distance_to_first_coordinate: f64,
    ) -> bool {
        let departing = distance_to_first_coordinate < self.maneuver_zone_radius;
        !(location.has_course()
            && (location.speed >= self.min_speed || departing)
            && (location.horizontal_accuracy < self.min_horizontal_accuracy || departing)
            && angle_difference(calculated, location.course) > self.max_manipulated_course_angle)
    }
}

/// Whether `location` lies closer than `radius` meters to `step`'s line.
pub fn is_within(location: &Location, radius: f64, step: &RouteStep) -> bool {
    Polyline::new(&step.coordinates)
        .closest_coordinate(&location.coordinate)
        .map_or(false, |closest| closest.distance < radius)
}
