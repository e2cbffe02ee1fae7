use std::collections::VecDeque;
use std::sync::Arc;

use waypost_core::{Location, Route};

/// Bookkeeping for one navigation session, from the first fix to the end.
#[derive(Debug, Clone)]
pub struct SessionState {
    pub departure_timestamp: Option<f64>,
    pub arrival_timestamp: Option<f64>,
    /// Distance covered on routes that were since replaced.
    pub total_distance_completed: f64,
    pub number_of_reroutes: u32,
    pub last_reroute_timestamp: Option<f64>,
    pub original_route: Arc<Route>,
    pub current_route: Arc<Route>,
    pub terminated: bool,
    past_locations: VecDeque<Location>,
    capacity: usize,
}

impl SessionState {
    pub fn new(route: Arc<Route>, capacity: usize) -> Self {
        Self {
            departure_timestamp: None,
            arrival_timestamp: None,
            total_distance_completed: 0.0,
            number_of_reroutes: 0,
            last_reroute_timestamp: None,
            original_route: Arc::clone(&route),
            current_route: route,
            terminated: false,
            past_locations: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    /// Remember `location`, dropping the oldest once full.
    pub fn record_location(&mut self, location: Location) {
        if self.departure_timestamp.is_none() {
            self.departure_timestamp = Some(location.timestamp);
        }
        if self.past_locations.len() == self.capacity {
            self.past_locations.pop_front();
        }
        self.past_locations.push_back(location);
    }

    /// Recent fixes, oldest first.
    pub fn past_locations(&self) -> impl Iterator<Item = &Location> {
        self.past_locations.iter()
    }

    pub fn past_location_count(&self) -> usize {
        self.past_locations.len()
    }

    /// Account for a route replacement after `distance_traveled` meters on
    /// the old route.
    pub fn record_reroute(&mut self, route: Arc<Route>, distance_traveled: f64, timestamp: f64) {
        self.total_distance_completed += distance_traveled;
        self.number_of_reroutes += 1;
        self.last_reroute_timestamp = Some(timestamp);
        self.current_route = route;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use waypost_core::fixtures;

    fn session(capacity: usize) -> SessionState {
        SessionState::new(Arc::new(fixtures::sample_route()), capacity)
    }

    fn at(timestamp: f64) -> Location {
        fixtures::fix(fixtures::ORIGIN, 90.0, timestamp)
    }

    #[test]
    fn first_location_sets_departure() {
        let mut session = session(4);
        session.record_location(at(3.0));
        session.record_location(at(4.0));
        assert_eq!(session.departure_timestamp, Some(3.0));
    }

    #[test]
    fn past_locations_are_bounded() {
        let mut session = session(3);
        for t in 0..5 {
            session.record_location(at(t as f64));
        }
        assert_eq!(session.past_location_count(), 3);
        let stamps: Vec<f64> = session.past_locations().map(|l| l.timestamp).collect();
        assert_eq!(stamps, vec![2.0, 3.0, 4.0]);
    }

    #[test]
    fn reroutes_accumulate_distance() {
        let mut session = session(1);
        let detour = Arc::new(fixtures::detour_route());
        session.record_reroute(Arc::clone(&detour), 120.0, 10.0);
        session.record_reroute(Arc::clone(&detour), 30.0, 20.0);
        assert_eq!(session.number_of_reroutes, 2);
        assert_eq!(session.total_distance_completed, 150.0);
        assert_eq!(session.last_reroute_timestamp, Some(20.0));
        assert_eq!(*session.current_route, *detour);
        assert_ne!(*session.original_route, *detour);
    }
}
