use std::path::Path;

use anyhow::Result;
use waypost_core::route::load_routes;
use waypost_core::{Route, RouteOptions, RoutingError};
use waypost_engine::Directions;

/// Answers every reroute request with the same set of routes, loaded from a
/// JSON file up front.
#[derive(Debug, Clone, Default)]
pub struct FileDirections {
    routes: Vec<Route>,
    requests: usize,
}

impl FileDirections {
    pub fn new(routes: Vec<Route>) -> Self {
        Self { routes, requests: 0 }
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let routes = load_routes(path)?;
        tracing::info!(
            path = %path.display(),
            routes = routes.len(),
            "loaded alternative routes"
        );
        Ok(Self::new(routes))
    }

    pub fn request_count(&self) -> usize {
        self.requests
    }
}

impl Directions for FileDirections {
    fn calculate(&mut self, options: &RouteOptions) -> Result<Vec<Route>, RoutingError> {
        self.requests += 1;
        if options.waypoints.len() < 2 {
            return Err(RoutingError::InvalidRequest(format!(
                "expected at least 2 waypoints, got {}",
                options.waypoints.len()
            )));
        }
        if self.routes.is_empty() {
            return Err(RoutingError::NoRoute);
        }
        tracing::debug!(
            request = self.requests,
            candidates = self.routes.len(),
            "serving routes from file"
        );
        Ok(self.routes.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use waypost_core::fixtures;
    use waypost_core::Waypoint;

    fn request() -> RouteOptions {
        let [a, .., d] = fixtures::sample_coordinates();
        RouteOptions::navigation(vec![Waypoint::new(a), Waypoint::new(d)])
    }

    #[test]
    fn serves_every_loaded_route() {
        let mut directions =
            FileDirections::new(vec![fixtures::detour_route(), fixtures::faster_route()]);
        let routes = directions.calculate(&request()).unwrap();
        assert_eq!(routes.len(), 2);
        assert_eq!(routes[0], fixtures::detour_route());
        assert_eq!(directions.request_count(), 1);
    }

    #[test]
    fn without_routes_there_is_no_route() {
        let mut directions = FileDirections::default();
        assert_eq!(directions.calculate(&request()), Err(RoutingError::NoRoute));
        assert_eq!(directions.request_count(), 1);
    }

    #[test]
    fn rejects_single_waypoint_requests() {
        let mut directions = FileDirections::new(vec![fixtures::sample_route()]);
        let options = RouteOptions::navigation(vec![Waypoint::new(fixtures::ORIGIN)]);
        assert!(matches!(
            directions.calculate(&options),
            Err(RoutingError::InvalidRequest(_))
        ));
    }

    #[test]
    fn loads_routes_from_a_directions_response() {
        let dir = std::env::temp_dir().join("waypost-test-directions");
        let _ = std::fs::create_dir_all(&dir);
        let path = dir.join("alternatives.json");
        let body = serde_json::json!({ "routes": [fixtures::detour_route()] });
        std::fs::write(&path, body.to_string()).unwrap();

        let mut directions = FileDirections::from_path(&path).unwrap();
        assert_eq!(
            directions.calculate(&request()).unwrap(),
            vec![fixtures::detour_route()]
        );

        let _ = std::fs::remove_dir_all(&dir);
    }
}
