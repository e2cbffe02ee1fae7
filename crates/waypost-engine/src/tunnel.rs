use waypost_config::settings::TunnelSettings;
use waypost_core::route::RoadClass;
use waypost_core::{Location, RouteProgress};
use waypost_sim::{LocationSource, SimulatedLocationSource};

/// What a tunnel check changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TunnelTransition {
    Unchanged,
    /// Entered a tunnel; fixes are now simulated along the route.
    Entered,
    /// Enough good fixes arrived after the tunnel; simulation stopped.
    Exited,
}

/// Detects tunnels from intersection road classes and bridges the GPS gap
/// inside them with a simulated drive along the route.
pub struct TunnelIntersectionManager {
    settings: TunnelSettings,
    simulation_enabled: bool,
    animated_source: Option<SimulatedLocationSource>,
    exit_locations: Vec<Location>,
}

impl TunnelIntersectionManager {
    pub fn new(settings: TunnelSettings) -> Self {
        Self {
            settings,
            simulation_enabled: true,
            animated_source: None,
            exit_locations: Vec::new(),
        }
    }

    pub fn set_simulation_enabled(&mut self, enabled: bool) {
        self.simulation_enabled = enabled;
        if !enabled {
            self.stop_animation();
        }
    }

    pub fn is_animating(&self) -> bool {
        self.animated_source.is_some()
    }

    pub fn exit_location_count(&self) -> usize {
        self.exit_locations.len()
    }

    /// The user is inside a tunnel or about to drive into one.
    ///
    /// When the intersection just passed lists outlet road classes, they
    /// alone decide. Otherwise the user must be close to an upcoming tunnel
    /// intersection and either moving fast enough or reporting bad fixes.
    pub fn did_detect_tunnel(&self, location: &Location, progress: &RouteProgress) -> bool {
        let step_progress = &progress.current_leg_progress.current_step_progress;
        if let Some(classes) = step_progress
            .current_intersection()
            .and_then(|i| i.outlet_road_classes.as_ref())
        {
            return classes.contains(&RoadClass::Tunnel);
        }
        self.user_within_tunnel_entrance_radius(location, progress)
    }

    pub fn user_within_tunnel_entrance_radius(
        &self,
        location: &Location,
        progress: &RouteProgress,
    ) -> bool {
        let step_progress = &progress.current_leg_progress.current_step_progress;
        let Some(upcoming) = step_progress.upcoming_intersection() else {
            return false;
        };
        if !upcoming.has_road_class(RoadClass::Tunnel) {
            return false;
        }
        if location.speed < self.settings.min_speed && location.is_qualified() {
            return false;
        }
        step_progress
            .user_distance_to_upcoming_intersection
            .map_or(false, |distance| distance < self.settings.min_distance_to_entrance)
    }

    /// Start or stop the tunnel simulation for the fix at `location`.
    pub fn check_for_tunnel_intersection(
        &mut self,
        location: &Location,
        progress: &RouteProgress,
    ) -> TunnelTransition {
        if !self.simulation_enabled {
            return TunnelTransition::Unchanged;
        }

        if self.did_detect_tunnel(location, progress) {
            if self.enable_animation(location, progress) {
                return TunnelTransition::Entered;
            }
        } else if self.is_animating() && self.suspend_animation(location) {
            return TunnelTransition::Exited;
        }
        TunnelTransition::Unchanged
    }

    /// The next simulated fix while inside a tunnel.
    pub fn next_animated_location(&mut self) -> Option<Location> {
        self.animated_source.as_mut()?.next_location()
    }

    fn enable_animation(&mut self, location: &Location, progress: &RouteProgress) -> bool {
        if self.is_animating() {
            return false;
        }
        tracing::info!(
            distance_traveled = progress.distance_traveled(),
            "tunnel detected, simulating location"
        );
        self.animated_source = Some(
            SimulatedLocationSource::from_progress(progress)
                .with_start_time(location.timestamp + 1.0),
        );
        self.exit_locations.clear();
        true
    }

    /// Count `location` towards leaving the tunnel. Returns `true` once the
    /// simulation was stopped.
    fn suspend_animation(&mut self, location: &Location) -> bool {
        if !self.is_animating() {
            return false;
        }
        if location.is_qualified() {
            self.exit_locations.push(*location);
        }
        if self.exit_locations.len() < self.settings.valid_exit_locations as usize {
            return false;
        }
        tracing::info!(
            exit_locations = self.exit_locations.len(),
            "left tunnel, resuming location updates"
        );
        self.stop_animation();
        true
    }

    fn stop_animation(&mut self) {
        self.animated_source = None;
        self.exit_locations.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use waypost_core::fixtures::{self, fix, point_along_step};

    fn manager() -> TunnelIntersectionManager {
        TunnelIntersectionManager::new(TunnelSettings::default())
    }

    /// Progress on the tunnel route, `distance_to_entrance` meters before
    /// the tunnel intersection.
    fn approaching(distance_to_entrance: f64) -> RouteProgress {
        let route = Arc::new(fixtures::tunnel_route());
        let mut progress = RouteProgress::new(Arc::clone(&route), 0, 0).unwrap();
        let step = &route.legs[0].steps[0];
        let mut intersections = step.intersections.clone().unwrap();
        intersections.extend(route.legs[0].steps[1].intersections.clone().unwrap());

        let step_progress = &mut progress.current_leg_progress.current_step_progress;
        step_progress.intersections_including_upcoming_maneuver_intersection = Some(intersections);
        step_progress.intersection_distances = Some(vec![0.0, 200.0]);
        step_progress.distance_traveled = 200.0 - distance_to_entrance;
        step_progress.intersection_index = 0;
        step_progress.user_distance_to_upcoming_intersection = Some(distance_to_entrance);
        progress
    }

    fn inside() -> RouteProgress {
        let mut progress = approaching(0.0);
        let step_progress = &mut progress.current_leg_progress.current_step_progress;
        step_progress.intersection_index = 1;
        step_progress.distance_traveled = 250.0;
        step_progress.user_distance_to_upcoming_intersection = Some(150.0);
        progress
    }

    fn fast_fix(progress: &RouteProgress, distance: f64, timestamp: f64) -> Location {
        fix(point_along_step(progress, 0, distance), 90.0, timestamp).with_speed(10.0)
    }

    #[test]
    fn detects_tunnel_entrance_when_close_and_fast() {
        let progress = approaching(10.0);
        let manager = manager();
        assert!(manager.did_detect_tunnel(&fast_fix(&progress, 190.0, 0.0), &progress));
    }

    #[test]
    fn slow_accurate_fix_is_not_a_tunnel_entrance() {
        let progress = approaching(10.0);
        let slow = fast_fix(&progress, 190.0, 0.0).with_speed(2.0);
        assert!(!manager().did_detect_tunnel(&slow, &progress));
    }

    #[test]
    fn slow_inaccurate_fix_counts_as_entrance() {
        let progress = approaching(10.0);
        let noisy = fast_fix(&progress, 190.0, 0.0)
            .with_speed(2.0)
            .with_horizontal_accuracy(300.0);
        assert!(manager().did_detect_tunnel(&noisy, &progress));
    }

    #[test]
    fn far_from_entrance_is_not_a_tunnel() {
        let progress = approaching(80.0);
        assert!(!manager().did_detect_tunnel(&fast_fix(&progress, 120.0, 0.0), &progress));
    }

    #[test]
    fn current_tunnel_intersection_is_detected() {
        let progress = inside();
        let slow = fast_fix(&progress, 250.0, 0.0).with_speed(0.0);
        assert!(manager().did_detect_tunnel(&slow, &progress));
    }

    #[test]
    fn animation_starts_in_tunnel_and_stops_after_exit_fixes() {
        let mut manager = manager();
        let tunnel = inside();
        let location = fast_fix(&tunnel, 250.0, 10.0);

        assert_eq!(
            manager.check_for_tunnel_intersection(&location, &tunnel),
            TunnelTransition::Entered
        );
        assert!(manager.is_animating());
        assert_eq!(
            manager.check_for_tunnel_intersection(&location, &tunnel),
            TunnelTransition::Unchanged
        );

        let animated = manager.next_animated_location().unwrap();
        assert_eq!(animated.timestamp, 11.0);

        let outside = approaching(80.0);
        let exit = fast_fix(&outside, 120.0, 20.0);
        let unqualified = exit.with_horizontal_accuracy(-1.0);
        assert_eq!(
            manager.check_for_tunnel_intersection(&unqualified, &outside),
            TunnelTransition::Unchanged
        );
        assert_eq!(manager.exit_location_count(), 0);

        for _ in 0..2 {
            assert_eq!(
                manager.check_for_tunnel_intersection(&exit, &outside),
                TunnelTransition::Unchanged
            );
        }
        assert_eq!(
            manager.check_for_tunnel_intersection(&exit, &outside),
            TunnelTransition::Exited
        );
        assert!(!manager.is_animating());
        assert_eq!(manager.exit_location_count(), 0);
        assert!(manager.next_animated_location().is_none());
    }

    #[test]
    fn disabled_simulation_ignores_tunnels() {
        let mut manager = manager();
        manager.set_simulation_enabled(false);
        let tunnel = inside();
        let location = fast_fix(&tunnel, 250.0, 0.0);
        assert_eq!(
            manager.check_for_tunnel_intersection(&location, &tunnel),
            TunnelTransition::Unchanged
        );
        assert!(!manager.is_animating());
    }
}
