//! The route controller and the policies it is built from.
//!
//! [`RouteController`] turns location fixes into route progress, snaps
//! fixes onto the route, detects when the user leaves it, asks a
//! [`Directions`] source for a new one and publishes what happened on the
//! navigation event bus. Host applications customize its decisions through
//! [`RouteControllerDelegate`].

pub mod controller;
pub mod delegate;
pub mod reroute;
pub mod session;
pub mod snapping;
pub mod tunnel;

pub use controller::RouteController;
pub use delegate::{DefaultDelegate, RouteControllerDelegate};
pub use reroute::{Directions, RerouteReason};
pub use session::SessionState;
pub use snapping::SnappingRules;
pub use tunnel::{TunnelIntersectionManager, TunnelTransition};
