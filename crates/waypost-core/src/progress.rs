//! Progress bookkeeping along a route, a leg and a step.
//!
//! The three progress types share the route through an [`Arc`] and address
//! their leg and step by index. Changing an index through the owning progress
//! (`set_leg_index`, `set_step_index`) replaces the nested progress with a
//! fresh one, so per-step state never leaks into the next step.

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{bail, Result};

use crate::geo::Coordinate;
use crate::line::Polyline;
use crate::location::Location;
use crate::route::{
    CongestionLevel, Intersection, ManeuverType, Route, RouteLeg, RouteOptions, RouteStep,
    SpokenInstruction, VisualInstructionBanner, Waypoint,
};

/// Heading accuracy, in degrees, attached to the user waypoint of a reroute
/// request when the course is known.
pub const REROUTING_HEADING_ACCURACY: f64 = 90.0;

/// Below this many seconds left the remaining congestion is reported unknown.
const MIN_DURATION_FOR_CONGESTION: f64 = 60.0;

/// Expected travel time of one geometry segment with its congestion level.
pub type TimedCongestionLevel = (CongestionLevel, f64);

/// The user's progress along a whole route.
#[derive(Debug, Clone)]
pub struct RouteProgress {
    route: Arc<Route>,
    leg_index: usize,
    pub current_leg_progress: RouteLegProgress,
    congestion_segments_by_step: Vec<Vec<Vec<TimedCongestionLevel>>>,
    congestion_times_per_step: Vec<Vec<BTreeMap<CongestionLevel, f64>>>,
}

impl RouteProgress {
    /// Start tracking `route` on `leg_index`.
    ///
    /// Fails when the route has no legs, a leg has no steps, or the leg index
    /// is out of range.
    pub fn new(route: Arc<Route>, leg_index: usize, spoken_instruction_index: usize) -> Result<Self> {
        if route.legs.is_empty() {
            bail!("route has no legs");
        }
        if let Some(index) = route.legs.iter().position(|leg| leg.steps.is_empty()) {
            bail!("route leg {index} has no steps");
        }
        if leg_index >= route.legs.len() {
            bail!(
                "leg index {leg_index} out of range for route with {} legs",
                route.legs.len()
            );
        }

        let (congestion_segments_by_step, congestion_times_per_step) = congestion_tables(&route);
        let current_leg_progress =
            RouteLegProgress::new(Arc::clone(&route), leg_index, 0, spoken_instruction_index);

        Ok(Self {
            route,
            leg_index,
            current_leg_progress,
            congestion_segments_by_step,
            congestion_times_per_step,
        })
    }

    pub fn route(&self) -> &Arc<Route> {
        &self.route
    }

    pub fn leg_index(&self) -> usize {
        self.leg_index
    }

    /// Move to another leg, resetting leg progress. Out of range indices are
    /// ignored.
    pub fn set_leg_index(&mut self, index: usize) {
        if index >= self.route.legs.len() {
            return;
        }
        self.leg_index = index;
        self.current_leg_progress = RouteLegProgress::new(Arc::clone(&self.route), index, 0, 0);
    }

    pub fn current_leg(&self) -> &RouteLeg {
        &self.route.legs[self.leg_index]
    }

    pub fn is_final_leg(&self) -> bool {
        self.leg_index + 1 == self.route.legs.len()
    }

    pub fn distance_traveled(&self) -> f64 {
        self.route.legs[..self.leg_index]
            .iter()
            .map(|leg| leg.distance)
            .sum::<f64>()
            + self.current_leg_progress.distance_traveled()
    }

    pub fn duration_remaining(&self) -> f64 {
        self.route.legs[self.leg_index + 1..]
            .iter()
            .map(|leg| leg.expected_travel_time)
            .sum::<f64>()
            + self.current_leg_progress.duration_remaining()
    }

    pub fn fraction_traveled(&self) -> f64 {
        fraction(self.distance_traveled(), self.route.distance)
    }

    pub fn distance_remaining(&self) -> f64 {
        self.route.distance - self.distance_traveled()
    }

    /// Destinations of the current and all following legs.
    pub fn remaining_waypoints(&self) -> Vec<Waypoint> {
        self.route.legs[self.leg_index..]
            .iter()
            .map(|leg| leg.destination.clone())
            .collect()
    }

    /// Timed congestion per segment, grouped by leg then step.
    pub fn congestion_travel_times_segments_by_step(&self) -> &[Vec<Vec<TimedCongestionLevel>>] {
        &self.congestion_segments_by_step
    }

    /// Seconds spent per congestion level, grouped by leg then step.
    pub fn congestion_times_per_step(&self) -> &[Vec<BTreeMap<CongestionLevel, f64>>] {
        &self.congestion_times_per_step
    }

    /// The congestion level the user will spend the most time in on the rest
    /// of the current leg.
    pub fn average_congestion_level_remaining_on_leg(&self) -> CongestionLevel {
        let step_progress = &self.current_leg_progress.current_step_progress;
        let step_index = self.current_leg_progress.step_index();
        let passed = (step_progress.step().coordinate_count() as f64
            * step_progress.fraction_traveled())
        .floor();
        if passed < 0.0 {
            return CongestionLevel::Unknown;
        }
        let passed = passed as usize;

        let Some(step_segments) = self
            .congestion_segments_by_step
            .get(self.leg_index)
            .and_then(|leg| leg.get(step_index))
        else {
            return CongestionLevel::Unknown;
        };
        if passed > step_segments.len() {
            return CongestionLevel::Unknown;
        }

        let mut totals: BTreeMap<CongestionLevel, f64> = BTreeMap::new();
        if let Some(leg_times) = self.congestion_times_per_step.get(self.leg_index) {
            for step_times in leg_times.iter().skip(step_index + 1) {
                for (level, time) in step_times {
                    *totals.entry(*level).or_insert(0.0) += time;
                }
            }
        }
        for (level, time) in &step_segments[passed..] {
            *totals.entry(*level).or_insert(0.0) += time;
        }

        if self.duration_remaining() < MIN_DURATION_FOR_CONGESTION {
            return CongestionLevel::Unknown;
        }
        totals
            .into_iter()
            .max_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(level, _)| level)
            .unwrap_or(CongestionLevel::Unknown)
    }

    /// Request options for a new route from `location` through the remaining
    /// waypoints.
    pub fn rerouting_options(&self, location: &Location) -> RouteOptions {
        let mut user = Waypoint::new(location.coordinate);
        if location.course >= 0.0 {
            user.heading = Some(location.course);
            user.heading_accuracy = Some(REROUTING_HEADING_ACCURACY);
        }

        let mut waypoints = vec![user];
        waypoints.extend(self.remaining_waypoints());
        RouteOptions {
            waypoints,
            ..self.route.options.clone()
        }
    }
}

type CongestionTables = (
    Vec<Vec<Vec<TimedCongestionLevel>>>,
    Vec<Vec<BTreeMap<CongestionLevel, f64>>>,
);

fn congestion_tables(route: &Route) -> CongestionTables {
    let mut segments_by_step = Vec::with_capacity(route.legs.len());
    let mut times_per_step = Vec::with_capacity(route.legs.len());

    for leg in &route.legs {
        let mut leg_segments = Vec::new();
        let mut leg_times = Vec::new();

        if let (Some(levels), Some(times)) = (
            leg.segment_congestion_levels.as_ref(),
            leg.expected_segment_travel_times.as_ref(),
        ) {
            let mut start = 0;
            for step in &leg.steps {
                let count = match step.maneuver_type {
                    ManeuverType::Arrive => 0,
                    _ => step.coordinate_count().saturating_sub(1),
                };
                let end = start + count;
                if end > levels.len() || end > times.len() {
                    continue;
                }

                let timed: Vec<TimedCongestionLevel> = levels[start..end]
                    .iter()
                    .copied()
                    .zip(times[start..end].iter().copied())
                    .collect();
                let mut totals = BTreeMap::new();
                for (level, time) in &timed {
                    *totals.entry(*level).or_insert(0.0) += time;
                }

                leg_segments.push(timed);
                leg_times.push(totals);
                start = end;
            }
        }

        segments_by_step.push(leg_segments);
        times_per_step.push(leg_times);
    }

    (segments_by_step, times_per_step)
}

fn fraction(part: f64, whole: f64) -> f64 {
    if whole > 0.0 {
        part / whole
    } else {
        1.0
    }
}

/// A step index together with the user's distance from that step's line.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepIndexDistance {
    pub index: usize,
    pub distance: f64,
}

/// The user's progress along the current leg.
#[derive(Debug, Clone)]
pub struct RouteLegProgress {
    route: Arc<Route>,
    leg_index: usize,
    step_index: usize,
    pub user_has_arrived_at_waypoint: bool,
    pub current_step_progress: RouteStepProgress,
}

impl RouteLegProgress {
    fn new(
        route: Arc<Route>,
        leg_index: usize,
        step_index: usize,
        spoken_instruction_index: usize,
    ) -> Self {
        let current_step_progress =
            RouteStepProgress::new(Arc::clone(&route), leg_index, step_index, spoken_instruction_index);
        Self {
            route,
            leg_index,
            step_index,
            user_has_arrived_at_waypoint: false,
            current_step_progress,
        }
    }

    pub fn leg(&self) -> &RouteLeg {
        &self.route.legs[self.leg_index]
    }

    pub fn step_index(&self) -> usize {
        self.step_index
    }

    /// Move to another step, resetting step progress. Out of range indices
    /// are ignored.
    pub fn set_step_index(&mut self, index: usize) {
        if index >= self.leg().steps.len() {
            return;
        }
        self.step_index = index;
        self.current_step_progress =
            RouteStepProgress::new(Arc::clone(&self.route), self.leg_index, index, 0);
    }

    /// Steps after the current one.
    pub fn remaining_steps(&self) -> &[RouteStep] {
        &self.leg().steps[self.step_index + 1..]
    }

    pub fn distance_traveled(&self) -> f64 {
        self.leg().steps[..self.step_index]
            .iter()
            .map(|step| step.distance)
            .sum::<f64>()
            + self.current_step_progress.distance_traveled
    }

    pub fn duration_remaining(&self) -> f64 {
        self.remaining_steps()
            .iter()
            .map(|step| step.expected_travel_time)
            .sum::<f64>()
            + self.current_step_progress.duration_remaining()
    }

    pub fn distance_remaining(&self) -> f64 {
        self.remaining_steps()
            .iter()
            .map(|step| step.distance)
            .sum::<f64>()
            + self.current_step_progress.distance_remaining()
    }

    pub fn fraction_traveled(&self) -> f64 {
        fraction(self.distance_traveled(), self.leg().distance)
    }

    pub fn step_before(&self, step: &RouteStep) -> Option<&RouteStep> {
        let steps = &self.leg().steps;
        let index = steps.iter().position(|s| s == step)?;
        index.checked_sub(1).map(|i| &steps[i])
    }

    pub fn step_after(&self, step: &RouteStep) -> Option<&RouteStep> {
        let steps = &self.leg().steps;
        let index = steps.iter().position(|s| s == step)?;
        steps.get(index + 1)
    }

    pub fn prior_step(&self) -> Option<&RouteStep> {
        self.step_index
            .checked_sub(1)
            .map(|i| &self.leg().steps[i])
    }

    pub fn current_step(&self) -> &RouteStep {
        &self.leg().steps[self.step_index]
    }

    pub fn upcoming_step(&self) -> Option<&RouteStep> {
        self.leg().steps.get(self.step_index + 1)
    }

    pub fn follow_on_step(&self) -> Option<&RouteStep> {
        self.leg().steps.get(self.step_index + 2)
    }

    pub fn is_current_step(&self, step: &RouteStep) -> bool {
        self.current_step() == step
    }

    /// Geometry of the prior, current and upcoming steps.
    pub fn nearby_coordinates(&self) -> Vec<Coordinate> {
        let mut nearby = Vec::new();
        if let Some(prior) = self.prior_step() {
            nearby.extend_from_slice(&prior.coordinates);
        }
        nearby.extend_from_slice(&self.current_step().coordinates);
        if let Some(upcoming) = self.upcoming_step() {
            nearby.extend_from_slice(&upcoming.coordinates);
        }
        nearby
    }

    /// The current or a later step whose line passes closest to
    /// `coordinate`. Earlier steps win ties.
    pub fn closest_step(&self, coordinate: &Coordinate) -> Option<StepIndexDistance> {
        let mut closest: Option<StepIndexDistance> = None;
        for (offset, step) in self.leg().steps[self.step_index..].iter().enumerate() {
            let Some(on_step) = Polyline::new(&step.coordinates).closest_coordinate(coordinate)
            else {
                continue;
            };
            let distance = on_step.coordinate.distance_to(coordinate);
            if closest.map_or(true, |c| distance < c.distance) {
                closest = Some(StepIndexDistance {
                    index: self.step_index + offset,
                    distance,
                });
            }
        }
        closest
    }
}

/// The user's progress along the current step.
#[derive(Debug, Clone)]
pub struct RouteStepProgress {
    route: Arc<Route>,
    leg_index: usize,
    step_index: usize,
    /// Meters traveled along the step.
    pub distance_traveled: f64,
    /// Straight-line distance to the maneuver at the last update.
    pub user_distance_to_maneuver_location: f64,
    /// The step's intersections followed by the first intersection of the
    /// upcoming step.
    pub intersections_including_upcoming_maneuver_intersection: Option<Vec<Intersection>>,
    pub intersection_index: usize,
    /// Distance from the start of the step to each of its intersections.
    pub intersection_distances: Option<Vec<f64>>,
    pub user_distance_to_upcoming_intersection: Option<f64>,
    pub visual_instruction_index: usize,
    pub spoken_instruction_index: usize,
}

impl RouteStepProgress {
    fn new(
        route: Arc<Route>,
        leg_index: usize,
        step_index: usize,
        spoken_instruction_index: usize,
    ) -> Self {
        Self {
            route,
            leg_index,
            step_index,
            distance_traveled: 0.0,
            user_distance_to_maneuver_location: f64::INFINITY,
            intersections_including_upcoming_maneuver_intersection: None,
            intersection_index: 0,
            intersection_distances: None,
            user_distance_to_upcoming_intersection: None,
            visual_instruction_index: 0,
            spoken_instruction_index,
        }
    }

    pub fn step(&self) -> &RouteStep {
        &self.route.legs[self.leg_index].steps[self.step_index]
    }

    pub fn distance_remaining(&self) -> f64 {
        self.step().distance - self.distance_traveled
    }

    pub fn fraction_traveled(&self) -> f64 {
        fraction(self.distance_traveled, self.step().distance)
    }

    pub fn duration_remaining(&self) -> f64 {
        (1.0 - self.fraction_traveled()) * self.step().expected_travel_time
    }

    /// The intersection the user will pass through next.
    pub fn upcoming_intersection(&self) -> Option<&Intersection> {
        let intersections = self
            .intersections_including_upcoming_maneuver_intersection
            .as_ref()?;
        if self.intersection_index + 1 < intersections.len() {
            intersections.get(self.intersection_index + 1)
        } else {
            None
        }
    }

    /// The intersection the user passed through most recently.
    pub fn current_intersection(&self) -> Option<&Intersection> {
        self.intersections_including_upcoming_maneuver_intersection
            .as_ref()?
            .get(self.intersection_index)
    }

    pub fn remaining_visual_instructions(&self) -> Option<&[VisualInstructionBanner]> {
        let instructions = self.step().instructions_displayed_along_step.as_ref()?;
        instructions.get(self.visual_instruction_index..)
    }

    pub fn remaining_spoken_instructions(&self) -> Option<&[SpokenInstruction]> {
        let instructions = self.step().instructions_spoken_along_step.as_ref()?;
        instructions.get(self.spoken_instruction_index..)
    }

    pub fn current_spoken_instruction(&self) -> Option<&SpokenInstruction> {
        self.step()
            .instructions_spoken_along_step
            .as_ref()?
            .get(self.spoken_instruction_index)
    }

    pub fn current_visual_instruction(&self) -> Option<&VisualInstructionBanner> {
        self.step()
            .instructions_displayed_along_step
            .as_ref()?
            .get(self.visual_instruction_index)
    }
}
