//! Core building blocks for the waypost navigation engine.
//!
//! This crate holds everything the route controller and its consumers share:
//! coordinate geometry, the route model, route progress bookkeeping, the typed
//! navigation event protocol with its bus and observer registry, plus a few
//! small utilities (MD5 digests, frame-render statistics, distance formatting
//! and the logging subsystem).

pub mod bus;
pub mod digest;
pub mod error;
pub mod event;
pub mod format;
pub mod frame;
pub mod geo;
pub mod line;
pub mod location;
pub mod logging;
pub mod observer;
pub mod progress;
pub mod route;

#[cfg(any(test, feature = "fixtures"))]
pub mod fixtures;

pub use error::RoutingError;
pub use event::{EventKind, NavigationEvent};
pub use geo::Coordinate;
pub use location::{Heading, Location};
pub use progress::{RouteLegProgress, RouteProgress, RouteStepProgress};
pub use route::{Route, RouteLeg, RouteOptions, RouteStep, Waypoint};
