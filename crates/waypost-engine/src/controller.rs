use std::sync::Arc;

use anyhow::{Context, Result};
use waypost_config::NavigationSettings;
use waypost_core::bus::EventBus;
use waypost_core::geo::{angle_difference, wrap};
use waypost_core::line::Polyline;
use waypost_core::{
    Heading, Location, NavigationEvent, Route, RouteProgress, RouteStep, RoutingError, Waypoint,
};

use crate::delegate::{DefaultDelegate, RouteControllerDelegate};
use crate::reroute::{evaluate_candidates, select_route, Directions, RerouteReason};
use crate::session::SessionState;
use crate::snapping::{is_within, SnappingRules};
use crate::tunnel::{TunnelIntersectionManager, TunnelTransition};

/// Fixes are interpolated once the last real one is this many dead
/// reckoning intervals old.
const DEAD_RECKONING_DELAY_FACTOR: f64 = 1.1;

/// Follows the user along a route.
///
/// Feed it fixes with [`update_locations`](Self::update_locations) and
/// compass readings with [`update_heading`](Self::update_heading); it keeps
/// [`RouteProgress`] current, detects leaving the route, fetches new routes
/// from its [`Directions`] and publishes what happened as
/// [`NavigationEvent`]s. Drain them with
/// [`drain_events`](Self::drain_events) after each update.
pub struct RouteController {
    settings: NavigationSettings,
    rules: SnappingRules,
    directions: Box<dyn Directions>,
    delegate: Box<dyn RouteControllerDelegate>,
    route_progress: RouteProgress,
    bus: EventBus,
    tunnel: TunnelIntersectionManager,
    session: SessionState,
    raw_location: Option<Location>,
    heading: Option<Heading>,
    /// Distance along the current step from the raw location's closest
    /// point to the maneuver.
    user_snap_to_step_distance_from_maneuver: Option<f64>,
    has_found_one_qualified_location: bool,
    movements_away_from_route: u32,
    previous_arrival_waypoint: Option<Waypoint>,
    is_rerouting: bool,
    last_reroute_location: Option<Location>,
    is_finding_faster_route: bool,
    last_proactive_check: Option<f64>,
    did_find_faster_route: bool,
}

impl RouteController {
    pub fn new(
        route: Route,
        directions: impl Directions + 'static,
        settings: NavigationSettings,
    ) -> Result<Self> {
        let route = Arc::new(route);
        let route_progress = RouteProgress::new(Arc::clone(&route), 0, 0)
            .context("route cannot be navigated")?;
        tracing::info!(
            distance = route.distance,
            expected_travel_time = route.expected_travel_time,
            legs = route.legs.len(),
            "starting navigation"
        );

        Ok(Self {
            rules: SnappingRules::from_settings(&settings),
            tunnel: TunnelIntersectionManager::new(settings.tunnel.clone()),
            session: SessionState::new(route, settings.session.past_location_capacity),
            settings,
            directions: Box::new(directions),
            delegate: Box::new(DefaultDelegate),
            route_progress,
            bus: EventBus::new(),
            raw_location: None,
            heading: None,
            user_snap_to_step_distance_from_maneuver: None,
            has_found_one_qualified_location: false,
            movements_away_from_route: 0,
            previous_arrival_waypoint: None,
            is_rerouting: false,
            last_reroute_location: None,
            is_finding_faster_route: false,
            last_proactive_check: None,
            did_find_faster_route: false,
        })
    }

    pub fn with_delegate(mut self, delegate: impl RouteControllerDelegate + 'static) -> Self {
        self.delegate = Box::new(delegate);
        self
    }

    pub fn route_progress(&self) -> &RouteProgress {
        &self.route_progress
    }

    pub fn settings(&self) -> &NavigationSettings {
        &self.settings
    }

    pub fn session(&self) -> &SessionState {
        &self.session
    }

    pub fn raw_location(&self) -> Option<Location> {
        self.raw_location
    }

    pub fn heading(&self) -> Option<Heading> {
        self.heading
    }

    pub fn is_ended(&self) -> bool {
        self.session.terminated
    }

    /// Remove and return the events published so far.
    pub fn drain_events(&mut self) -> Vec<NavigationEvent> {
        self.bus.drain()
    }

    /// The raw location snapped onto the route, when it is close enough and
    /// heading the right way.
    pub fn snapped_location(&self) -> Option<Location> {
        let raw = self.raw_location?;
        self.rules
            .snapped(&raw, &self.route_progress.current_leg_progress)
    }

    /// Best estimate of where the user is and which way they face.
    ///
    /// Prefers the snapped location. An unsnapped fix without a course
    /// borrows the compass heading when one is available.
    pub fn location(&self) -> Option<Location> {
        if let Some(snapped) = self.snapped_location() {
            return Some(snapped);
        }
        let raw = self.raw_location?;
        match self.heading {
            Some(heading) if !raw.has_course() && heading.is_qualified() => {
                Some(raw.relocated(raw.coordinate, heading.true_heading))
            }
            _ => Some(raw),
        }
    }

    pub fn update_heading(&mut self, heading: Heading) {
        self.heading = Some(heading);
    }

    pub fn set_tunnel_simulation_enabled(&mut self, enabled: bool) {
        self.tunnel.set_simulation_enabled(enabled);
    }

    pub fn is_animating_tunnel(&self) -> bool {
        self.tunnel.is_animating()
    }

    /// The next simulated fix while driving through a tunnel. Feed it back
    /// through [`update_locations`](Self::update_locations).
    pub fn next_tunnel_location(&mut self) -> Option<Location> {
        self.tunnel.next_animated_location()
    }

    /// Stop reacting to updates and mark the session as finished.
    pub fn end_navigation(&mut self) {
        if self.session.terminated {
            return;
        }
        self.session.terminated = true;
        self.tunnel.set_simulation_enabled(false);
        tracing::info!(
            reroutes = self.session.number_of_reroutes,
            distance_completed = self.session.total_distance_completed
                + self.route_progress.distance_traveled(),
            "navigation ended"
        );
    }

    /// Process a batch of fixes from a location provider, oldest first.
    pub fn update_locations(&mut self, locations: &[Location]) {
        if self.session.terminated {
            return;
        }

        let location = match locations.iter().rev().find(|l| l.is_qualified()) {
            Some(qualified) => {
                self.has_found_one_qualified_location = true;
                *qualified
            }
            None => {
                let Some(last) = locations.last().copied() else {
                    return;
                };
                if self.has_found_one_qualified_location {
                    if self.delegate.should_discard(&last) {
                        tracing::debug!(
                            horizontal_accuracy = last.horizontal_accuracy,
                            "discarding inaccurate location"
                        );
                        self.set_raw_location(last);
                        self.check_for_tunnel_intersection(&last);
                    }
                    // an inaccurate fix never moves progress once a good one was seen
                    return;
                }
                last
            }
        };

        self.set_raw_location(location);
        self.delegate.did_update(&[location]);
        self.update_intersection_index();

        let step = self.route_progress.current_leg_progress.current_step();
        let line = Polyline::new(&step.coordinates);
        if let Some(closest) = line.closest_coordinate(&location.coordinate) {
            let remaining = line.distance_from(&closest.coordinate);
            let distance_traveled = step.distance - remaining;
            self.route_progress
                .current_leg_progress
                .current_step_progress
                .distance_traveled = distance_traveled;
            self.bus.publish(NavigationEvent::ProgressChanged {
                progress: Box::new(self.route_progress.clone()),
                location: self.location().unwrap_or(location),
                raw_location: location,
            });
            self.check_for_tunnel_intersection(&location);
        }

        self.update_distance_to_intersection(&location);
        self.update_route_step_progress(&location);
        self.update_route_leg_progress(&location);
        self.update_visual_instruction_progress();

        if !self.user_is_on_route(&location) && self.delegate.should_reroute_from(&location) {
            self.reroute(&location);
            return;
        }

        self.update_spoken_instruction_progress();

        if self.settings.rerouting.reroutes_proactively {
            let medium_alert = self.settings.instructions.medium_alert_interval;
            let step_remaining = self
                .route_progress
                .current_leg_progress
                .current_step_progress
                .duration_remaining();
            if self.route_progress.duration_remaining()
                > self.settings.rerouting.min_duration_remaining_for_proactive
                && step_remaining > medium_alert
            {
                self.check_for_new_route(&location);
            }
        }
    }

    /// Meters the user may stray from the current step before counting as
    /// off route. Halved near intersections.
    pub fn rerouting_tolerance(&self) -> f64 {
        let tolerance = self.settings.rerouting.max_distance_before_recalculating;
        let (Some(intersections), Some(raw)) = (
            self.route_progress
                .current_leg_progress
                .current_step_progress
                .intersections_including_upcoming_maneuver_intersection
                .as_ref(),
            self.raw_location,
        ) else {
            return tolerance;
        };
        let near_intersection = intersections.iter().any(|intersection| {
            raw.coordinate.distance_to(&intersection.location) <= self.settings.maneuver.zone_radius
        });
        if near_intersection {
            tolerance / 2.0
        } else {
            tolerance
        }
    }

    /// Whether `location` still follows the route.
    ///
    /// Being close to a later step of the leg counts too and moves progress
    /// to that step.
    pub fn user_is_on_route(&mut self, location: &Location) -> bool {
        if self.route_progress.current_leg_progress.user_has_arrived_at_waypoint {
            let destination = self.route_progress.current_leg().destination.clone();
            if self
                .delegate
                .should_prevent_reroutes_when_arriving_at(&destination)
            {
                return true;
            }
        }

        let radius = self
            .rerouting_tolerance()
            .max(self.settings.maneuver.zone_radius);
        let is_close_to_current_step = is_within(
            location,
            radius,
            self.route_progress.current_leg_progress.current_step(),
        );
        if is_close_to_current_step && self.user_course_is_on_route(location) {
            return true;
        }

        let Some(nearest) = self
            .route_progress
            .current_leg_progress
            .closest_step(&location.coordinate)
        else {
            return false;
        };
        if nearest.distance < self.rules.snapping_distance {
            if nearest.index != self.route_progress.current_leg_progress.step_index() {
                tracing::debug!(step = nearest.index, "user skipped ahead to a later step");
                self.advance_step_index(Some(nearest.index));
            }
            return true;
        }
        false
    }

    /// Request a new route after the user left the current one at
    /// `location`.
    ///
    /// Skipped while a request is in flight or when the previous request
    /// started nearby.
    pub fn reroute(&mut self, location: &Location) {
        let recalculation_distance = self.settings.rerouting.max_distance_before_recalculating;
        if let Some(last) = self.last_reroute_location {
            if location.distance_to(&last) < recalculation_distance {
                return;
            }
        }
        if self.is_rerouting {
            return;
        }

        self.is_rerouting = true;
        self.delegate.will_reroute_from(location);
        self.bus.publish(NavigationEvent::WillReroute {
            location: self.location().unwrap_or(*location),
        });
        tracing::info!(
            latitude = location.coordinate.latitude,
            longitude = location.coordinate.longitude,
            "user left the route, rerouting"
        );

        let result = self.get_directions(location).and_then(|(route, _)| {
            self.install_route(route, 0, RerouteReason::DivertedFromRoute, location)
        });
        self.is_rerouting = false;

        if let Err(error) = result {
            tracing::warn!(%error, "reroute failed");
            self.delegate.did_fail_to_reroute(&error);
            self.bus.publish(NavigationEvent::RerouteFailed { error });
        }
    }

    /// Look for a better route than the current one, at most once per
    /// proactive interval.
    pub fn check_for_new_route(&mut self, location: &Location) {
        if self.is_finding_faster_route {
            return;
        }
        let Some(upcoming) = self
            .route_progress
            .current_leg_progress
            .upcoming_step()
            .cloned()
        else {
            return;
        };
        let Some(last_check) = self.last_proactive_check else {
            self.last_proactive_check = Some(location.timestamp);
            return;
        };
        if location.timestamp - last_check < self.settings.rerouting.proactive_interval {
            return;
        }

        let duration_remaining = self.route_progress.duration_remaining();
        self.is_finding_faster_route = true;
        let result = self.get_directions(location);
        self.last_proactive_check = None;
        self.is_finding_faster_route = false;

        match result {
            Ok((preferred, routes)) => self.apply_new_route_if_needed(
                &preferred,
                &routes,
                &upcoming,
                duration_remaining,
                location,
            ),
            Err(error) => tracing::debug!(%error, "proactive route check failed"),
        }
    }

    /// Where dead reckoning puts the user at `timestamp`: the last fix
    /// carried forward along the route at its speed for one second.
    pub fn interpolated_location(&self, timestamp: f64) -> Option<Location> {
        let last = self.raw_location?;
        let coordinates = self.route_progress.route().coordinates();
        let line = Polyline::new(&coordinates);
        let distance = last.speed.max(0.0);
        let traveled = self.route_progress.distance_traveled();

        let coordinate = line.coordinate_from_start(traveled + distance)?;
        let course = line
            .coordinate_from_start(traveled + distance * 2.0)
            .filter(|next| *next != coordinate)
            .map(|next| coordinate.direction_to(&next))
            .unwrap_or(last.course);

        Some(Location {
            coordinate,
            course,
            timestamp,
            ..last
        })
    }

    /// An interpolated fix when real ones stopped arriving, `None` while
    /// they are still fresh or dead reckoning is disabled.
    pub fn dead_reckoning_location(&self, now: f64) -> Option<Location> {
        let reckoning = &self.settings.dead_reckoning;
        if !reckoning.enabled || self.session.terminated {
            return None;
        }
        let last = self.raw_location?;
        if now - last.timestamp < reckoning.interval * DEAD_RECKONING_DELAY_FACTOR {
            return None;
        }
        self.interpolated_location(now)
    }

    fn set_raw_location(&mut self, location: Location) {
        self.raw_location = Some(location);
        self.session.record_location(location);
        self.update_distance_to_maneuver();
    }

    fn update_distance_to_maneuver(&mut self) {
        self.user_snap_to_step_distance_from_maneuver = self.raw_location.map(|raw| {
            let step = self.route_progress.current_leg_progress.current_step();
            Polyline::new(&step.coordinates).distance_from(&raw.coordinate)
        });
    }

    fn check_for_tunnel_intersection(&mut self, location: &Location) {
        let transition = self
            .tunnel
            .check_for_tunnel_intersection(location, &self.route_progress);
        if transition == TunnelTransition::Exited {
            self.set_raw_location(*location);
        }
    }

    fn update_intersection_index(&mut self) {
        let step_progress = &mut self.route_progress.current_leg_progress.current_step_progress;
        let Some(distances) = step_progress.intersection_distances.as_ref() else {
            return;
        };
        let upcoming = distances
            .iter()
            .position(|distance| *distance > step_progress.distance_traveled)
            .unwrap_or(distances.len());
        step_progress.intersection_index = upcoming.saturating_sub(1);
    }

    fn update_distance_to_intersection(&mut self, location: &Location) {
        let leg_progress = &self.route_progress.current_leg_progress;
        let step = leg_progress.current_step();
        let Some(mut intersections) = step.intersections.clone() else {
            return;
        };
        if let Some(first) = leg_progress
            .upcoming_step()
            .and_then(|upcoming| upcoming.intersections.as_ref())
            .and_then(|upcoming| upcoming.first())
        {
            intersections.push(first.clone());
        }
        let coordinates = step.coordinates.clone();

        let step_progress = &mut self.route_progress.current_leg_progress.current_step_progress;
        step_progress.intersections_including_upcoming_maneuver_intersection = Some(intersections);
        if let Some(upcoming) = step_progress.upcoming_intersection() {
            let distance = Polyline::new(&coordinates)
                .distance_between(&location.coordinate, &upcoming.location);
            step_progress.user_distance_to_upcoming_intersection = Some(distance);
        }
        if step_progress.intersection_distances.is_none() {
            self.update_intersection_distances();
        }
    }

    fn update_intersection_distances(&mut self) {
        let step = self.route_progress.current_leg_progress.current_step();
        let line = Polyline::new(&step.coordinates);
        let distances: Vec<f64> = match (&step.intersections, step.coordinates.first()) {
            (Some(intersections), Some(first)) => intersections
                .iter()
                .map(|intersection| line.distance_between(first, &intersection.location))
                .collect(),
            _ => Vec::new(),
        };
        self.route_progress
            .current_leg_progress
            .current_step_progress
            .intersection_distances = Some(distances);
    }

    /// Move to the next step (or `forced`) once the maneuver is done.
    fn update_route_step_progress(&mut self, location: &Location) {
        let leg_progress = &self.route_progress.current_leg_progress;
        if leg_progress.remaining_steps().is_empty() {
            return;
        }
        let Some(snap_distance) = self.user_snap_to_step_distance_from_maneuver else {
            return;
        };

        let turn_offset = self.settings.maneuver.max_degree_offset_for_turn_completion;
        let zone_radius = self.settings.maneuver.zone_radius;
        let mut course_matches_final_heading = false;
        if let Some((initial, final_heading)) = leg_progress
            .upcoming_step()
            .and_then(|step| Some((step.initial_heading?, step.final_heading?)))
        {
            let initial = wrap(initial, 0.0, 360.0);
            let final_heading = wrap(final_heading, 0.0, 360.0);
            let course = wrap(location.course, 0.0, 360.0);
            let expected_turning_angle = angle_difference(initial, final_heading);
            course_matches_final_heading = if expected_turning_angle <= turn_offset {
                snap_distance == 0.0
            } else {
                angle_difference(final_heading, course) <= turn_offset
            };
        }

        let maneuver = leg_progress
            .upcoming_step()
            .unwrap_or_else(|| leg_progress.current_step())
            .maneuver_location;
        let absolute_distance = maneuver.distance_to(&location.coordinate);
        let last_absolute_distance = leg_progress
            .current_step_progress
            .user_distance_to_maneuver_location;
        let moving_away =
            absolute_distance > last_absolute_distance && last_absolute_distance > zone_radius;

        if snap_distance <= zone_radius && (course_matches_final_heading || moving_away) {
            self.advance_step_index(None);
        }
        self.route_progress
            .current_leg_progress
            .current_step_progress
            .user_distance_to_maneuver_location = absolute_distance;
    }

    fn advance_step_index(&mut self, forced: Option<usize>) {
        let leg_progress = &mut self.route_progress.current_leg_progress;
        let index = match forced {
            Some(index) if index >= leg_progress.leg().steps.len() => return,
            Some(index) => index,
            None => leg_progress.step_index() + 1,
        };
        leg_progress.set_step_index(index);
        tracing::debug!(step = index, "advanced to step");
        self.update_intersection_distances();
        self.update_distance_to_maneuver();
    }

    fn update_route_leg_progress(&mut self, location: &Location) {
        let leg_progress = &self.route_progress.current_leg_progress;
        let Some(remaining_spoken) = leg_progress
            .current_step_progress
            .remaining_spoken_instructions()
        else {
            return;
        };
        let destination = self.route_progress.current_leg().destination.clone();
        if leg_progress.remaining_steps().len() > 1
            || !remaining_spoken.is_empty()
            || self.previous_arrival_waypoint.as_ref() == Some(&destination)
        {
            return;
        }

        self.previous_arrival_waypoint = Some(destination.clone());
        self.route_progress.current_leg_progress.user_has_arrived_at_waypoint = true;
        let is_final_leg = self.route_progress.is_final_leg();
        if is_final_leg {
            self.session.arrival_timestamp = Some(location.timestamp);
        }
        tracing::info!(
            leg = self.route_progress.leg_index(),
            waypoint = destination.name.as_deref().unwrap_or("unnamed"),
            "arrived at waypoint"
        );

        let advance = self.delegate.did_arrive_at(&destination);
        if advance && !is_final_leg {
            let next = self.route_progress.leg_index() + 1;
            self.route_progress.set_leg_index(next);
            self.update_distance_to_maneuver();
        }
    }

    fn update_visual_instruction_progress(&mut self) {
        let Some(snap_distance) = self.user_snap_to_step_distance_from_maneuver else {
            return;
        };
        let leg_progress = &self.route_progress.current_leg_progress;
        let step_progress = &leg_progress.current_step_progress;
        let Some(remaining) = step_progress.remaining_visual_instructions() else {
            return;
        };
        let first_on_first_step =
            leg_progress.step_index() == 0 && step_progress.visual_instruction_index == 0;
        if remaining
            .iter()
            .any(|banner| snap_distance <= banner.distance_along_step || first_on_first_step)
        {
            self.bus.publish(NavigationEvent::PassedVisualInstructionPoint {
                progress: Box::new(self.route_progress.clone()),
            });
            self.route_progress
                .current_leg_progress
                .current_step_progress
                .visual_instruction_index += 1;
        }
    }

    fn update_spoken_instruction_progress(&mut self) {
        let Some(snap_distance) = self.user_snap_to_step_distance_from_maneuver else {
            return;
        };
        let leg_progress = &self.route_progress.current_leg_progress;
        let step_progress = &leg_progress.current_step_progress;
        let Some(remaining) = step_progress.remaining_spoken_instructions() else {
            return;
        };
        let first_on_first_step = self.settings.instructions.speak_first_instruction
            && leg_progress.step_index() == 0
            && step_progress.spoken_instruction_index == 0;
        if remaining
            .iter()
            .any(|spoken| snap_distance <= spoken.distance_along_step || first_on_first_step)
        {
            self.bus.publish(NavigationEvent::PassedSpokenInstructionPoint {
                progress: Box::new(self.route_progress.clone()),
            });
            self.route_progress
                .current_leg_progress
                .current_step_progress
                .spoken_instruction_index += 1;
        }
    }

    /// Count consecutive fixes whose course disagrees with the route.
    /// Returns `false` once there were too many.
    fn user_course_is_on_route(&mut self, location: &Location) -> bool {
        let nearby = self.route_progress.current_leg_progress.nearby_coordinates();
        let Some(calculated) = self.rules.interpolated_course(location, &nearby) else {
            return true;
        };

        let rerouting = &self.settings.rerouting;
        let allowed_by_accuracy =
            (location.horizontal_accuracy / rerouting.incorrect_course_multiplier).floor();
        let allowed = rerouting
            .min_incorrect_courses
            .max(allowed_by_accuracy.max(0.0) as u32);

        if self.movements_away_from_route >= allowed {
            return false;
        }
        if self.rules.should_snap_course(location, calculated, f64::MAX) {
            self.movements_away_from_route = 0;
        } else {
            self.movements_away_from_route += 1;
        }
        true
    }

    /// Routes for a request from `location`: the delegate's, or the
    /// directions backend's. Returns the one to install and all of them.
    fn get_directions(&mut self, location: &Location) -> Result<(Route, Vec<Route>), RoutingError> {
        self.last_reroute_location = Some(*location);
        let routes = match self.delegate.get_directions(location, &self.route_progress) {
            Some(routes) => routes?,
            None => {
                let options = self.route_progress.rerouting_options(location);
                tracing::debug!(waypoints = options.waypoints.len(), "requesting directions");
                self.directions.calculate(&options)?
            }
        };
        let preferred = select_route(&routes, self.route_progress.route())?;
        Ok((preferred, routes))
    }

    fn apply_new_route_if_needed(
        &mut self,
        preferred: &Route,
        routes: &[Route],
        upcoming: &RouteStep,
        duration_remaining: f64,
        location: &Location,
    ) {
        let Some((route, reason)) = evaluate_candidates(
            &self.route_progress,
            preferred,
            routes,
            upcoming,
            duration_remaining,
            &self.settings,
        ) else {
            return;
        };
        let route = route.clone();
        let spoken_index = self
            .route_progress
            .current_leg_progress
            .current_step_progress
            .spoken_instruction_index;

        self.did_find_faster_route = reason == RerouteReason::FasterRoute;
        if let Err(error) = self.install_route(route, spoken_index, reason, location) {
            tracing::warn!(%error, "ignoring unusable proactive route");
        }
        self.did_find_faster_route = false;
    }

    /// Replace the route, publish did-reroute and tell the delegate.
    fn install_route(
        &mut self,
        route: Route,
        spoken_instruction_index: usize,
        reason: RerouteReason,
        origin: &Location,
    ) -> Result<(), RoutingError> {
        let route = Arc::new(route);
        let progress = RouteProgress::new(Arc::clone(&route), 0, spoken_instruction_index)
            .map_err(|err| RoutingError::InvalidResponse(format!("{err:#}")))?;

        let distance_traveled = self.route_progress.distance_traveled();
        self.route_progress = progress;
        self.movements_away_from_route = 0;
        self.session
            .record_reroute(Arc::clone(&route), distance_traveled, origin.timestamp);

        tracing::info!(
            %reason,
            distance = route.distance,
            expected_travel_time = route.expected_travel_time,
            "installed new route"
        );
        self.bus.publish(NavigationEvent::DidReroute {
            location: self.location().unwrap_or(*origin),
            proactive: self.did_find_faster_route,
        });
        self.delegate.did_reroute_along(&route, reason);
        Ok(())
    }
}
