use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::RoutingError;
use crate::location::Location;
use crate::progress::RouteProgress;

/// Something observable that happened while following a route.
///
/// Progress payloads are snapshots taken when the event was published.
#[derive(Debug, Clone)]
pub enum NavigationEvent {
    /// A location update consistent with the expected route.
    ProgressChanged {
        progress: Box<RouteProgress>,
        /// Idealized (snapped when possible) location.
        location: Location,
        raw_location: Location,
    },
    /// Divergence was detected and a new route is about to be requested.
    WillReroute { location: Location },
    /// A new route is in place. `proactive` is true when it replaced a
    /// slower route rather than correcting a divergence.
    DidReroute { location: Location, proactive: bool },
    RerouteFailed { error: RoutingError },
    /// The point for an audible instruction has been passed.
    PassedSpokenInstructionPoint { progress: Box<RouteProgress> },
    /// The point for a visual instruction update has been passed.
    PassedVisualInstructionPoint { progress: Box<RouteProgress> },
}

impl NavigationEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            NavigationEvent::ProgressChanged { .. } => EventKind::ProgressChanged,
            NavigationEvent::WillReroute { .. } => EventKind::WillReroute,
            NavigationEvent::DidReroute { .. } => EventKind::DidReroute,
            NavigationEvent::RerouteFailed { .. } => EventKind::RerouteFailed,
            NavigationEvent::PassedSpokenInstructionPoint { .. } => {
                EventKind::PassedSpokenInstructionPoint
            }
            NavigationEvent::PassedVisualInstructionPoint { .. } => {
                EventKind::PassedVisualInstructionPoint
            }
        }
    }

    /// The progress snapshot carried by the event, if any.
    pub fn progress(&self) -> Option<&RouteProgress> {
        match self {
            NavigationEvent::ProgressChanged { progress, .. }
            | NavigationEvent::PassedSpokenInstructionPoint { progress }
            | NavigationEvent::PassedVisualInstructionPoint { progress } => Some(progress),
            _ => None,
        }
    }
}

/// Payload-free discriminant of [`NavigationEvent`], used for subscriptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    ProgressChanged,
    WillReroute,
    DidReroute,
    RerouteFailed,
    PassedSpokenInstructionPoint,
    PassedVisualInstructionPoint,
}

impl EventKind {
    /// Every event kind the controller publishes.
    pub const ALL: [EventKind; 6] = [
        EventKind::ProgressChanged,
        EventKind::WillReroute,
        EventKind::DidReroute,
        EventKind::RerouteFailed,
        EventKind::PassedSpokenInstructionPoint,
        EventKind::PassedVisualInstructionPoint,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::ProgressChanged => "progress_changed",
            EventKind::WillReroute => "will_reroute",
            EventKind::DidReroute => "did_reroute",
            EventKind::RerouteFailed => "reroute_failed",
            EventKind::PassedSpokenInstructionPoint => "passed_spoken_instruction_point",
            EventKind::PassedVisualInstructionPoint => "passed_visual_instruction_point",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::Coordinate;

    #[test]
    fn kind_matches_variant() {
        let location = Location::new(Coordinate::new(0.0, 0.0), 0.0);
        assert_eq!(
            NavigationEvent::WillReroute { location }.kind(),
            EventKind::WillReroute
        );
        assert_eq!(
            NavigationEvent::DidReroute {
                location,
                proactive: true
            }
            .kind(),
            EventKind::DidReroute
        );
        assert_eq!(
            NavigationEvent::RerouteFailed {
                error: RoutingError::NoRoute
            }
            .kind(),
            EventKind::RerouteFailed
        );
    }

    #[test]
    fn kind_names_match_serde() {
        for kind in EventKind::ALL {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{}\"", kind.as_str()));
        }
    }

    #[test]
    fn all_kinds_are_distinct() {
        let names: std::collections::HashSet<_> =
            EventKind::ALL.iter().map(|k| k.as_str()).collect();
        assert_eq!(names.len(), EventKind::ALL.len());
    }

    #[test]
    fn reroute_events_carry_no_progress() {
        let location = Location::new(Coordinate::new(0.0, 0.0), 0.0);
        assert!(NavigationEvent::WillReroute { location }.progress().is_none());
    }
}
