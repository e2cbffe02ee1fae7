use std::fmt;

use waypost_config::NavigationSettings;
use waypost_core::route::{best_match, most_similar};
use waypost_core::{Route, RouteOptions, RouteProgress, RouteStep, RoutingError};

/// A source of routes for reroute requests.
///
/// Implementations answer synchronously; the controller does not poll or
/// retry.
pub trait Directions {
    fn calculate(&mut self, options: &RouteOptions) -> Result<Vec<Route>, RoutingError>;
}

impl<F> Directions for F
where
    F: FnMut(&RouteOptions) -> Result<Vec<Route>, RoutingError>,
{
    fn calculate(&mut self, options: &RouteOptions) -> Result<Vec<Route>, RoutingError> {
        self(options)
    }
}

/// Why the controller replaced its route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RerouteReason {
    /// Same geometry, different expected arrival time.
    EtaUpdate,
    DivertedFromRoute,
    FasterRoute,
}

impl RerouteReason {
    pub fn as_str(self) -> &'static str {
        match self {
            RerouteReason::EtaUpdate => "eta_update",
            RerouteReason::DivertedFromRoute => "diverted_from_route",
            RerouteReason::FasterRoute => "faster_route",
        }
    }
}

impl fmt::Display for RerouteReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The route to install from a directions answer: the one most similar to
/// `current`, falling back to the first.
///
/// An empty answer is reported as [`RoutingError::NoRoute`].
pub fn select_route(routes: &[Route], current: &Route) -> Result<Route, RoutingError> {
    most_similar(routes, current)
        .or_else(|| routes.first())
        .cloned()
        .ok_or(RoutingError::NoRoute)
}

/// Decide whether a proactive check turned up a route worth installing.
///
/// `preferred` is the candidate [`select_route`] picked. `duration_remaining`
/// and `upcoming` describe the trip when the request was sent. A candidate
/// replaces the current route when it keeps the upcoming maneuver and has a
/// first step long enough to matter, and is either clearly faster or a close
/// geometric match whose ETA moved.
pub fn evaluate_candidates<'a>(
    progress: &RouteProgress,
    preferred: &'a Route,
    candidates: &'a [Route],
    upcoming: &RouteStep,
    duration_remaining: f64,
    settings: &NavigationSettings,
) -> Option<(&'a Route, RerouteReason)> {
    let rules = &settings.rerouting;
    let medium_alert = settings.instructions.medium_alert_interval;
    let step_progress = &progress.current_leg_progress.current_step_progress;

    let first_leg = preferred.legs.first()?;
    let first_step = first_leg.steps.first()?;
    let is_significant = first_step.expected_travel_time >= medium_alert
        && step_progress.duration_remaining() > medium_alert;
    let same_maneuver = first_leg.steps.get(1) == Some(upcoming);
    let is_faster =
        preferred.expected_travel_time <= rules.faster_route_factor * duration_remaining;
    let enough_time_left =
        progress.duration_remaining() > rules.min_duration_remaining_for_proactive;

    if is_significant && same_maneuver && is_faster && enough_time_left {
        return Some((preferred, RerouteReason::FasterRoute));
    }

    if is_significant && same_maneuver {
        let (matched, percentage) =
            best_match(progress.route(), candidates, rules.match_percentage_threshold)?;
        let eta_change = (duration_remaining - matched.expected_travel_time).abs();
        tracing::debug!(percentage, eta_change, "evaluated matching route");
        if eta_change > rules.eta_change_threshold {
            return Some((matched, RerouteReason::EtaUpdate));
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use waypost_core::fixtures;

    fn progress() -> RouteProgress {
        RouteProgress::new(Arc::new(fixtures::sample_route()), 0, 0).unwrap()
    }

    fn evaluate(candidates: &[Route]) -> Option<RerouteReason> {
        let progress = progress();
        let upcoming = progress.current_leg_progress.upcoming_step().unwrap().clone();
        let duration = progress.duration_remaining();
        let best = select_route(candidates, progress.route()).unwrap();
        let best = candidates.iter().find(|r| **r == best).unwrap();
        evaluate_candidates(
            &progress,
            best,
            candidates,
            &upcoming,
            duration,
            &NavigationSettings::default(),
        )
        .map(|(_, reason)| reason)
    }

    #[test]
    fn closures_are_directions() {
        let mut calls = 0;
        let mut directions = |_: &RouteOptions| -> Result<Vec<Route>, RoutingError> {
            calls += 1;
            Err(RoutingError::NoRoute)
        };
        let options = RouteOptions::default();
        assert_eq!(directions.calculate(&options), Err(RoutingError::NoRoute));
        drop(directions);
        assert_eq!(calls, 1);
    }

    #[test]
    fn select_prefers_most_similar_description() {
        let current = fixtures::sample_route();
        let routes = vec![fixtures::detour_route(), fixtures::slower_route()];
        let chosen = select_route(&routes, &current).unwrap();
        assert_eq!(chosen, routes[1]);
    }

    #[test]
    fn select_from_nothing_is_no_route() {
        let current = fixtures::sample_route();
        assert_eq!(select_route(&[], &current), Err(RoutingError::NoRoute));
    }

    #[test]
    fn faster_route_is_applied() {
        assert_eq!(
            evaluate(&[fixtures::faster_route()]),
            Some(RerouteReason::FasterRoute)
        );
    }

    #[test]
    fn identical_route_is_ignored() {
        assert_eq!(evaluate(&[fixtures::sample_route()]), None);
    }

    #[test]
    fn slower_matching_route_updates_eta() {
        assert_eq!(
            evaluate(&[fixtures::slower_route()]),
            Some(RerouteReason::EtaUpdate)
        );
    }

    #[test]
    fn different_upcoming_maneuver_is_ignored() {
        assert_eq!(evaluate(&[fixtures::detour_route()]), None);
    }

    #[test]
    fn reasons_render_snake_case() {
        assert_eq!(RerouteReason::DivertedFromRoute.to_string(), "diverted_from_route");
    }
}
