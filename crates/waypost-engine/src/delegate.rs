use waypost_core::{Location, Route, RouteProgress, RoutingError, Waypoint};

use crate::reroute::RerouteReason;

/// Hooks that let the embedding application steer the route controller.
///
/// Every method has a default, so implementors only override what they care
/// about. Methods returning `bool` are questions; the defaults give the
/// controller's standard behavior.
pub trait RouteControllerDelegate {
    /// Whether to reroute after the user left the route at `location`.
    fn should_reroute_from(&mut self, _location: &Location) -> bool {
        true
    }

    /// A reroute from `location` is about to be requested.
    fn will_reroute_from(&mut self, _location: &Location) {}

    /// Whether to throw away an inaccurate fix received after a good one.
    ///
    /// Discarded fixes still move the raw location (and feed tunnel
    /// detection) but never advance progress. Returning `false` processes
    /// the fix as if it were accurate.
    fn should_discard(&mut self, _location: &Location) -> bool {
        true
    }

    fn did_reroute_along(&mut self, _route: &Route, _reason: RerouteReason) {}

    fn did_fail_to_reroute(&mut self, _error: &RoutingError) {}

    /// Called with the fixes that are about to update progress.
    fn did_update(&mut self, _locations: &[Location]) {}

    /// The user reached the destination of the current leg. Return `true`
    /// to continue with the next leg, if any.
    fn did_arrive_at(&mut self, _waypoint: &Waypoint) -> bool {
        true
    }

    /// Whether leaving the route after arriving at `waypoint` should be
    /// ignored instead of triggering a reroute.
    fn should_prevent_reroutes_when_arriving_at(&mut self, _waypoint: &Waypoint) -> bool {
        true
    }

    /// Supply routes for a reroute from `location` instead of asking the
    /// directions backend. `None` falls through to the backend.
    fn get_directions(
        &mut self,
        _location: &Location,
        _progress: &RouteProgress,
    ) -> Option<Result<Vec<Route>, RoutingError>> {
        None
    }
}

/// A delegate that keeps every default.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultDelegate;

impl RouteControllerDelegate for DefaultDelegate {}
