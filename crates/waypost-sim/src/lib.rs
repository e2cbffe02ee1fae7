//! Location sources that drive the route controller without a GPS.
//!
//! [`SimulatedLocationSource`] drives along a route at plausible speeds,
//! [`ReplayLocationSource`] plays back a recorded trace loaded with
//! [`load_trace`].

pub mod replay;
pub mod simulated;
pub mod trace;

use std::sync::Arc;
use std::time::Duration;

use waypost_core::{Location, Route, RouteProgress};

pub use replay::ReplayLocationSource;
pub use simulated::SimulatedLocationSource;
pub use trace::{load_trace, parse_trace};

/// Something that produces location fixes, one at a time.
pub trait LocationSource {
    /// Produce the next fix, or `None` once the source is exhausted.
    fn next_location(&mut self) -> Option<Location>;

    /// How long a real-time consumer should wait before asking again.
    fn next_delay(&self) -> Duration;

    /// The most recent fix handed out.
    fn last_location(&self) -> Option<Location>;

    /// Called when the controller installs a new route.
    fn route_did_change(&mut self, _route: &Arc<Route>) {}

    /// Called on every progress update.
    fn progress_did_change(&mut self, _progress: &RouteProgress) {}
}
