use std::sync::Arc;
use std::time::Duration;

use waypost_core::geo::{angle_difference, wrap, Coordinate};
use waypost_core::line::Polyline;
use waypost_core::{Location, Route, RouteProgress};

use crate::LocationSource;

/// Top speed in m/s, about 108 km/h.
pub const MAXIMUM_SPEED: f64 = 30.0;
/// Speed in m/s through the sharpest turns, about 21 km/h.
pub const MINIMUM_SPEED: f64 = 6.0;
/// Lowest speed derived from segment travel times.
const MINIMUM_SEGMENT_SPEED: f64 = 2.0;
const HORIZONTAL_ACCURACY: f64 = 40.0;
const VERTICAL_ACCURACY: f64 = 10.0;
/// Turn penalty at which the minimum speed applies.
const MAXIMUM_TURN_PENALTY: f64 = 90.0;
const MINIMUM_TURN_PENALTY: f64 = 0.0;
/// Full speed when at least this far from the nearest vertex.
const SAFE_DISTANCE: f64 = 50.0;
const LOOK_AHEAD_DISTANCE: f64 = 10.0;
const NEARBY_DISTANCE: f64 = 100.0;
/// Roundabouts and similar shapes pack at least this many vertices into
/// the nearby stretch.
const COMPLEX_SHAPE_VERTICES: usize = 10;
const TICK_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq)]
struct SimulatedVertex {
    coordinate: Coordinate,
    turn_penalty: f64,
}

/// Replaces each simulated fix before it is handed out.
pub type LocationOverride = Box<dyn FnMut(Location) -> Location>;

/// Drives along a route, one fix per second.
///
/// Speed drops before sharp turns and in tight geometry and follows the
/// leg's expected segment travel times when progress reports them.
pub struct SimulatedLocationSource {
    route_line: Vec<Coordinate>,
    vertices: Vec<SimulatedVertex>,
    current_distance: f64,
    current_speed: f64,
    speed_multiplier: f64,
    leg_coordinates: Vec<Coordinate>,
    segment_travel_times: Option<Vec<f64>>,
    location_override: Option<LocationOverride>,
    clock: f64,
    finished: bool,
    last_location: Option<Location>,
}

impl SimulatedLocationSource {
    /// Start at the beginning of `route`.
    pub fn new(route: &Route) -> Self {
        let mut source = Self {
            route_line: Vec::new(),
            vertices: Vec::new(),
            current_distance: 0.0,
            current_speed: MAXIMUM_SPEED,
            speed_multiplier: 1.0,
            leg_coordinates: Vec::new(),
            segment_travel_times: None,
            location_override: None,
            clock: 0.0,
            finished: false,
            last_location: None,
        };
        source.reset(route);
        source
    }

    /// Continue from where `progress` left off, one full-speed tick ahead.
    pub fn from_progress(progress: &RouteProgress) -> Self {
        let mut source = Self::new(progress.route());
        source.current_distance = progress.distance_traveled() + MAXIMUM_SPEED;
        source.current_speed = 0.0;
        source.progress_did_change(progress);
        source
    }

    /// Scale the distance covered per tick. Only positive, finite
    /// multipliers are accepted; anything else keeps the current one.
    pub fn with_speed_multiplier(mut self, multiplier: f64) -> Self {
        if multiplier.is_finite() && multiplier > 0.0 {
            self.speed_multiplier = multiplier;
        } else {
            tracing::warn!(multiplier, "ignoring non-positive speed multiplier");
        }
        self
    }

    /// Timestamp of the first fix; each later fix is one second later.
    pub fn with_start_time(mut self, timestamp: f64) -> Self {
        self.clock = timestamp;
        self
    }

    /// Rewrite every fix before it is returned, e.g. to leave the route.
    pub fn with_location_override(
        mut self,
        hook: impl FnMut(Location) -> Location + 'static,
    ) -> Self {
        self.location_override = Some(Box::new(hook));
        self
    }

    pub fn current_distance(&self) -> f64 {
        self.current_distance
    }

    pub fn current_speed(&self) -> f64 {
        self.current_speed
    }

    pub fn speed_multiplier(&self) -> f64 {
        self.speed_multiplier
    }

    fn reset(&mut self, route: &Route) {
        self.route_line = route.coordinates();
        self.vertices = vertices_with_turn_penalties(&self.route_line);
        self.finished = false;
    }

    fn tick(&mut self) -> Option<Location> {
        let line = Polyline::new(&self.route_line);
        let coordinate = line.coordinate_from_start(self.current_distance)?;
        let look_ahead = line.coordinate_from_start(self.current_distance + LOOK_AHEAD_DISTANCE)?;
        let closest = line.closest_coordinate(&coordinate)?;
        let vertex = self.vertices.get(closest.index)?;

        let distance = vertex
            .coordinate
            .distance_to(&coordinate)
            .clamp(LOOK_AHEAD_DISTANCE, SAFE_DISTANCE);
        let nearby = line.trimmed(&coordinate, NEARBY_DISTANCE);

        self.current_speed = match self.segment_speed(&coordinate) {
            Some(speed) => speed,
            None => speed_for(distance, nearby.len(), vertex.turn_penalty),
        };

        let mut location = Location {
            coordinate,
            altitude: 0.0,
            horizontal_accuracy: HORIZONTAL_ACCURACY,
            vertical_accuracy: VERTICAL_ACCURACY,
            course: wrap(coordinate.direction_to(&look_ahead), 0.0, 360.0),
            speed: self.current_speed,
            timestamp: self.clock,
        };
        if let Some(hook) = self.location_override.as_mut() {
            location = hook(location);
        }

        if self.current_distance >= line.length() {
            self.finished = true;
        }
        self.current_distance += self.current_speed * self.speed_multiplier;
        self.clock += TICK_INTERVAL.as_secs_f64();
        Some(location)
    }

    /// Speed implied by the expected travel time of the current leg's
    /// segment nearest to `coordinate`.
    fn segment_speed(&self, coordinate: &Coordinate) -> Option<f64> {
        let times = self.segment_travel_times.as_ref()?;
        let closest = Polyline::new(&self.leg_coordinates).closest_coordinate(coordinate)?;
        let start = self.leg_coordinates.get(closest.index)?;
        let next = self.leg_coordinates.get(closest.index + 1)?;
        let time = *times.get(closest.index)?;
        if time <= 0.0 {
            return None;
        }
        Some((start.distance_to(next) / time).max(MINIMUM_SEGMENT_SPEED))
    }
}

impl LocationSource for SimulatedLocationSource {
    fn next_location(&mut self) -> Option<Location> {
        if self.finished {
            return None;
        }
        let location = self.tick()?;
        self.last_location = Some(location);
        Some(location)
    }

    fn next_delay(&self) -> Duration {
        TICK_INTERVAL
    }

    fn last_location(&self) -> Option<Location> {
        self.last_location
    }

    /// Follow `route` from the point closest to the last fix handed out.
    fn route_did_change(&mut self, route: &Arc<Route>) {
        tracing::debug!(distance = route.distance, "simulation following new route");
        self.reset(route);
        if let Some(closest) = self
            .last_location
            .and_then(|last| Polyline::new(&self.route_line).closest_coordinate(&last.coordinate))
        {
            self.current_distance = closest.distance_along;
        }
    }

    fn progress_did_change(&mut self, progress: &RouteProgress) {
        let leg = progress.current_leg();
        self.segment_travel_times = leg.expected_segment_travel_times.clone();
        if self.segment_travel_times.is_some() {
            self.leg_coordinates = leg.coordinates();
        }
    }
}

/// Pick a speed from the distance to the nearest vertex, the number of
/// vertices nearby and that vertex's turn penalty.
fn speed_for(distance: f64, nearby_vertices: usize, turn_penalty: f64) -> f64 {
    if nearby_vertices >= COMPLEX_SHAPE_VERTICES {
        MINIMUM_SPEED
    } else if distance >= SAFE_DISTANCE {
        MAXIMUM_SPEED
    } else {
        let reversed = MAXIMUM_TURN_PENALTY - turn_penalty;
        scale(
            reversed,
            (MINIMUM_TURN_PENALTY, MAXIMUM_TURN_PENALTY),
            (MINIMUM_SPEED, MAXIMUM_SPEED),
        )
    }
}

fn scale(value: f64, input: (f64, f64), output: (f64, f64)) -> f64 {
    (output.1 - output.0) * (value - input.0) / (input.1 - input.0) + output.0
}

/// Each vertex's turn penalty is the change in bearing between the segment
/// arriving at it and the segment leaving it, capped at the maximum.
fn vertices_with_turn_penalties(line: &[Coordinate]) -> Vec<SimulatedVertex> {
    line.iter()
        .enumerate()
        .map(|(i, coordinate)| {
            let incoming = i.checked_sub(1).map(|p| line[p].direction_to(coordinate));
            let outgoing = line.get(i + 1).map(|next| coordinate.direction_to(next));
            let turn_penalty = match (incoming, outgoing) {
                (Some(a), Some(b)) => angle_difference(a, b),
                _ => 0.0,
            };
            SimulatedVertex {
                coordinate: *coordinate,
                turn_penalty: turn_penalty.clamp(MINIMUM_TURN_PENALTY, MAXIMUM_TURN_PENALTY),
            }
        })
        .collect()
}
