//! The route model consumed by the controller.
//!
//! Routes are plain serde structs so they can be loaded from JSON files or
//! produced by any directions backend. Collections the
//! directions service may omit (intersections, instructions, congestion
//! annotations) are `Option`s so "absent" and "empty" stay distinguishable.

use std::collections::HashSet;
use std::fmt;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::digest::md5_hex;
use crate::geo::Coordinate;

/// Separator used when joining leg names into a route description.
pub const DESCRIPTION_SEPARATOR: &str = " – ";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Route {
    pub distance: f64,
    pub expected_travel_time: f64,
    pub legs: Vec<RouteLeg>,
    #[serde(default)]
    pub options: RouteOptions,
}

impl Route {
    /// Build a route whose totals are the sums of its legs.
    pub fn new(legs: Vec<RouteLeg>, options: RouteOptions) -> Self {
        let distance = legs.iter().map(|l| l.distance).sum();
        let expected_travel_time = legs.iter().map(|l| l.expected_travel_time).sum();
        Self {
            distance,
            expected_travel_time,
            legs,
            options,
        }
    }

    pub fn from_json_str(input: &str) -> Result<Self> {
        serde_json::from_str(input).context("failed to parse route JSON")
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let input = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read route file {}", path.display()))?;
        Self::from_json_str(&input)
            .with_context(|| format!("invalid route file {}", path.display()))
    }

    /// Full route geometry with step joins deduplicated.
    pub fn coordinates(&self) -> Vec<Coordinate> {
        joined(self.legs.iter().flat_map(|leg| leg.steps.iter()))
    }

    /// Leg names joined into a single human readable summary.
    pub fn description(&self) -> String {
        self.legs
            .iter()
            .map(|leg| leg.name.as_str())
            .collect::<Vec<_>>()
            .join(DESCRIPTION_SEPARATOR)
    }
}

/// Load one or more routes from a JSON file.
///
/// Accepts a single route object, an array of routes, or a directions style
/// response of the form `{"routes": [...]}`.
pub fn load_routes(path: &Path) -> Result<Vec<Route>> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Document {
        Response { routes: Vec<Route> },
        Many(Vec<Route>),
        One(Box<Route>),
    }

    let input = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read routes file {}", path.display()))?;
    let document: Document = serde_json::from_str(&input)
        .with_context(|| format!("failed to parse routes file {}", path.display()))?;
    Ok(match document {
        Document::Response { routes } | Document::Many(routes) => routes,
        Document::One(route) => vec![*route],
    })
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteLeg {
    #[serde(default)]
    pub name: String,
    pub source: Waypoint,
    pub destination: Waypoint,
    pub steps: Vec<RouteStep>,
    pub distance: f64,
    pub expected_travel_time: f64,
    /// One entry per geometry segment across the leg's steps.
    #[serde(default)]
    pub segment_congestion_levels: Option<Vec<CongestionLevel>>,
    #[serde(default)]
    pub expected_segment_travel_times: Option<Vec<f64>>,
}

impl RouteLeg {
    pub fn new(
        name: impl Into<String>,
        source: Waypoint,
        destination: Waypoint,
        steps: Vec<RouteStep>,
    ) -> Self {
        let distance = steps.iter().map(|s| s.distance).sum();
        let expected_travel_time = steps.iter().map(|s| s.expected_travel_time).sum();
        Self {
            name: name.into(),
            source,
            destination,
            steps,
            distance,
            expected_travel_time,
            segment_congestion_levels: None,
            expected_segment_travel_times: None,
        }
    }

    /// The leg's geometry, the frame its per-segment tables are indexed in.
    pub fn coordinates(&self) -> Vec<Coordinate> {
        joined(self.steps.iter())
    }
}

/// Step geometries end to end, without repeating the shared vertex.
fn joined<'a>(steps: impl Iterator<Item = &'a RouteStep>) -> Vec<Coordinate> {
    let mut out: Vec<Coordinate> = Vec::new();
    for coordinate in steps.flat_map(|step| step.coordinates.iter()) {
        if out.last() != Some(coordinate) {
            out.push(*coordinate);
        }
    }
    out
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteStep {
    pub maneuver_type: ManeuverType,
    pub maneuver_location: Coordinate,
    #[serde(default)]
    pub instructions: String,
    #[serde(default)]
    pub names: Vec<String>,
    pub distance: f64,
    pub expected_travel_time: f64,
    pub coordinates: Vec<Coordinate>,
    #[serde(default)]
    pub initial_heading: Option<f64>,
    #[serde(default)]
    pub final_heading: Option<f64>,
    #[serde(default)]
    pub intersections: Option<Vec<Intersection>>,
    #[serde(default)]
    pub instructions_spoken_along_step: Option<Vec<SpokenInstruction>>,
    #[serde(default)]
    pub instructions_displayed_along_step: Option<Vec<VisualInstructionBanner>>,
}

impl RouteStep {
    pub fn coordinate_count(&self) -> usize {
        self.coordinates.len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ManeuverType {
    #[serde(rename = "depart")]
    Depart,
    #[serde(rename = "turn")]
    Turn,
    #[serde(rename = "continue")]
    Continue,
    #[serde(rename = "new name")]
    NewName,
    #[serde(rename = "merge")]
    Merge,
    #[serde(rename = "on ramp")]
    OnRamp,
    #[serde(rename = "off ramp")]
    OffRamp,
    #[serde(rename = "fork")]
    Fork,
    #[serde(rename = "end of road")]
    EndOfRoad,
    #[serde(rename = "use lane")]
    UseLane,
    #[serde(rename = "roundabout")]
    Roundabout,
    #[serde(rename = "rotary")]
    Rotary,
    #[serde(rename = "exit roundabout")]
    ExitRoundabout,
    #[serde(rename = "notification")]
    Notification,
    #[serde(rename = "arrive")]
    Arrive,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Intersection {
    pub location: Coordinate,
    #[serde(default)]
    pub outlet_road_classes: Option<Vec<RoadClass>>,
}

impl Intersection {
    pub fn has_road_class(&self, class: RoadClass) -> bool {
        self.outlet_road_classes
            .as_ref()
            .is_some_and(|classes| classes.contains(&class))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoadClass {
    Toll,
    Restricted,
    Motorway,
    Ferry,
    Tunnel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CongestionLevel {
    Unknown,
    Low,
    Moderate,
    Heavy,
    Severe,
}

impl fmt::Display for CongestionLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CongestionLevel::Unknown => "unknown",
            CongestionLevel::Low => "low",
            CongestionLevel::Moderate => "moderate",
            CongestionLevel::Heavy => "heavy",
            CongestionLevel::Severe => "severe",
        };
        f.write_str(name)
    }
}

/// An announcement to be spoken once the user is `distance_along_step`
/// meters from the end of the step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpokenInstruction {
    pub distance_along_step: f64,
    pub text: String,
    #[serde(default)]
    pub ssml_text: Option<String>,
}

impl SpokenInstruction {
    /// Stable key for caching synthesized audio of this instruction.
    pub fn cache_key(&self) -> String {
        md5_hex(self.ssml_text.as_deref().unwrap_or(&self.text))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisualInstructionBanner {
    pub distance_along_step: f64,
    pub primary_text: String,
    #[serde(default)]
    pub secondary_text: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Waypoint {
    pub coordinate: Coordinate,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub heading: Option<f64>,
    #[serde(default)]
    pub heading_accuracy: Option<f64>,
    #[serde(default)]
    pub coordinate_accuracy: Option<f64>,
}

impl Waypoint {
    pub fn new(coordinate: Coordinate) -> Self {
        Self {
            coordinate,
            name: None,
            heading: None,
            heading_accuracy: None,
            coordinate_accuracy: None,
        }
    }

    pub fn named(coordinate: Coordinate, name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::new(coordinate)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Profile {
    AutomobileAvoidingTraffic,
    Automobile,
    Cycling,
    Walking,
}

/// Location provider tuning that matches the travel profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityType {
    AutomotiveNavigation,
    Fitness,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeasurementSystem {
    Metric,
    Imperial,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeOption {
    CongestionLevel,
    ExpectedTravelTime,
    Distance,
    Speed,
}

/// Parameters of a directions request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouteOptions {
    pub waypoints: Vec<Waypoint>,
    pub profile: Profile,
    pub include_alternative_routes: bool,
    pub include_steps: bool,
    pub attribute_options: Vec<AttributeOption>,
    pub include_spoken_instructions: bool,
    pub include_visual_instructions: bool,
    pub include_exit_roundabout_maneuver: bool,
    pub distance_measurement_system: MeasurementSystem,
    pub locale: String,
}

impl Default for RouteOptions {
    fn default() -> Self {
        Self {
            waypoints: Vec::new(),
            profile: Profile::AutomobileAvoidingTraffic,
            include_alternative_routes: false,
            include_steps: false,
            attribute_options: Vec::new(),
            include_spoken_instructions: false,
            include_visual_instructions: false,
            include_exit_roundabout_maneuver: false,
            distance_measurement_system: MeasurementSystem::Metric,
            locale: "en-US".to_string(),
        }
    }
}

impl RouteOptions {
    /// Options tuned for turn-by-turn guidance between `waypoints`.
    pub fn navigation(waypoints: Vec<Waypoint>) -> Self {
        let waypoints = waypoints
            .into_iter()
            .map(|w| Waypoint {
                coordinate_accuracy: Some(-1.0),
                ..w
            })
            .collect();
        Self {
            waypoints,
            profile: Profile::AutomobileAvoidingTraffic,
            include_alternative_routes: true,
            include_steps: true,
            attribute_options: vec![
                AttributeOption::CongestionLevel,
                AttributeOption::ExpectedTravelTime,
            ],
            include_spoken_instructions: true,
            include_visual_instructions: true,
            include_exit_roundabout_maneuver: true,
            ..Self::default()
        }
    }

    pub fn activity_type(&self) -> ActivityType {
        match self.profile {
            Profile::Cycling | Profile::Walking => ActivityType::Fitness,
            Profile::Automobile | Profile::AutomobileAvoidingTraffic => {
                ActivityType::AutomotiveNavigation
            }
        }
    }

    /// Copy of these options with `waypoint` removed.
    pub fn without(&self, waypoint: &Waypoint) -> RouteOptions {
        RouteOptions {
            waypoints: self
                .waypoints
                .iter()
                .filter(|w| *w != waypoint)
                .cloned()
                .collect(),
            ..self.clone()
        }
    }

    pub fn has_attribute(&self, attribute: AttributeOption) -> bool {
        self.attribute_options.contains(&attribute)
    }
}

/// Minimum number of single character edits turning `from` into `to`.
pub fn minimum_edit_distance(from: &str, to: &str) -> usize {
    let from: Vec<char> = from.chars().collect();
    let to: Vec<char> = to.chars().collect();
    if from.is_empty() {
        return to.len();
    }
    if to.is_empty() {
        return from.len();
    }

    let mut previous: Vec<usize> = (0..=to.len()).collect();
    let mut current = vec![0; to.len() + 1];
    for (i, a) in from.iter().enumerate() {
        current[0] = i + 1;
        for (j, b) in to.iter().enumerate() {
            current[j + 1] = if a == b {
                previous[j]
            } else {
                1 + previous[j].min(previous[j + 1]).min(current[j])
            };
        }
        std::mem::swap(&mut previous, &mut current);
    }
    previous[to.len()]
}

/// The candidate whose description is closest to `target`'s.
///
/// Ties keep the earliest candidate.
pub fn most_similar<'a>(candidates: &'a [Route], target: &Route) -> Option<&'a Route> {
    let description = target.description();
    candidates
        .iter()
        .min_by_key(|route| minimum_edit_distance(&route.description(), &description))
}

/// Percentage of `other`'s coordinates that also appear in `route`, compared
/// at four decimal places.
///
/// Returns `None` when `other` has no geometry.
pub fn match_percentage(route: &Route, other: &Route) -> Option<f64> {
    let key = |c: &Coordinate| format!("{:.4},{:.4}", c.latitude, c.longitude);
    let own: HashSet<String> = route.coordinates().iter().map(key).collect();
    let theirs: Vec<String> = other.coordinates().iter().map(key).collect();
    if own.is_empty() || theirs.is_empty() {
        return None;
    }
    let matched = theirs.iter().filter(|c| own.contains(*c)).count();
    Some(100.0 / theirs.len() as f64 * matched as f64)
}

/// The candidate with the highest geometry match at or above `threshold`
/// percent.
pub fn best_match<'a>(
    route: &Route,
    candidates: &'a [Route],
    threshold: f64,
) -> Option<(&'a Route, f64)> {
    candidates
        .iter()
        .filter_map(|candidate| match_percentage(route, candidate).map(|p| (candidate, p)))
        .filter(|(_, percentage)| *percentage >= threshold)
        .fold(None, |best: Option<(&Route, f64)>, item| match best {
            Some(b) if b.1 >= item.1 => Some(b),
            _ => Some(item),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;

    #[test]
    fn totals_are_summed_from_legs() {
        let route = fixtures::sample_route();
        assert!((route.distance - 900.0).abs() < 1e-6);
        assert!((route.expected_travel_time - 650.0).abs() < 1e-6);
    }

    #[test]
    fn coordinates_skip_duplicate_step_joins() {
        let route = fixtures::sample_route();
        let coords = route.coordinates();
        assert_eq!(coords.len(), 4);
        assert!(coords.windows(2).all(|w| w[0] != w[1]));
    }

    #[test]
    fn leg_coordinates_cover_only_that_leg() {
        let route = fixtures::two_leg_route();
        let [a, b, c, d] = fixtures::sample_coordinates();
        assert_eq!(route.legs[0].coordinates(), vec![a, b, c]);
        assert_eq!(route.legs[1].coordinates(), vec![c, d]);
        assert_eq!(route.coordinates(), vec![a, b, c, d]);
    }

    #[test]
    fn description_joins_leg_names() {
        let mut route = fixtures::sample_route();
        let mut second = route.legs[0].clone();
        second.name = "Harbor Way".into();
        route.legs.push(second);
        assert_eq!(route.description(), "Market Street – Harbor Way");
    }

    #[test]
    fn route_json_round_trips() {
        let route = fixtures::sample_route();
        let json = serde_json::to_string(&route).unwrap();
        let parsed = Route::from_json_str(&json).unwrap();
        assert_eq!(parsed, route);
    }

    #[test]
    fn invalid_route_json_reports_context() {
        let err = Route::from_json_str("{").unwrap_err();
        assert!(err.to_string().contains("failed to parse route JSON"));
    }

    #[test]
    fn load_routes_accepts_response_envelope() {
        let dir = std::env::temp_dir().join("waypost-test-load-routes");
        let _ = std::fs::create_dir_all(&dir);
        let path = dir.join("routes.json");
        let route = fixtures::sample_route();
        let body = serde_json::json!({ "routes": [route.clone(), route] });
        std::fs::write(&path, body.to_string()).unwrap();

        let routes = load_routes(&path).unwrap();
        assert_eq!(routes.len(), 2);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn maneuver_types_use_wire_names() {
        let json = serde_json::to_string(&ManeuverType::EndOfRoad).unwrap();
        assert_eq!(json, "\"end of road\"");
        let parsed: ManeuverType = serde_json::from_str("\"off ramp\"").unwrap();
        assert_eq!(parsed, ManeuverType::OffRamp);
    }

    #[test]
    fn navigation_options_enable_guidance() {
        let options = RouteOptions::navigation(vec![Waypoint::new(Coordinate::new(1.0, 2.0))]);
        assert!(options.include_steps);
        assert!(options.include_spoken_instructions);
        assert!(options.has_attribute(AttributeOption::CongestionLevel));
        assert_eq!(options.waypoints[0].coordinate_accuracy, Some(-1.0));
        assert_eq!(options.activity_type(), ActivityType::AutomotiveNavigation);
    }

    #[test]
    fn without_removes_matching_waypoint() {
        let a = Waypoint::new(Coordinate::new(1.0, 1.0));
        let b = Waypoint::new(Coordinate::new(2.0, 2.0));
        let options = RouteOptions {
            waypoints: vec![a.clone(), b.clone()],
            ..RouteOptions::default()
        };
        assert_eq!(options.without(&a).waypoints, vec![b]);
    }

    #[test]
    fn edit_distance_examples() {
        assert_eq!(minimum_edit_distance("kitten", "sitting"), 3);
        assert_eq!(minimum_edit_distance("", "abc"), 3);
        assert_eq!(minimum_edit_distance("abc", ""), 3);
        assert_eq!(minimum_edit_distance("same", "same"), 0);
    }

    #[test]
    fn most_similar_prefers_closest_description() {
        let target = fixtures::sample_route();
        let mut far = target.clone();
        far.legs[0].name = "Completely Different Road".into();
        let mut near = target.clone();
        near.legs[0].name = "Market Streets".into();
        let candidates = vec![far, near.clone()];
        assert_eq!(most_similar(&candidates, &target), Some(&candidates[1]));
    }

    #[test]
    fn identical_routes_match_fully() {
        let route = fixtures::sample_route();
        assert_eq!(match_percentage(&route, &route), Some(100.0));
    }

    #[test]
    fn diverging_route_matches_partially() {
        let route = fixtures::sample_route();
        let detour = fixtures::detour_route();
        let percentage = match_percentage(&route, &detour).unwrap();
        assert!(percentage < 90.0, "percentage was {percentage}");
        assert!(best_match(&route, std::slice::from_ref(&detour), 90.0).is_none());
    }

    #[test]
    fn best_match_picks_highest_percentage() {
        let route = fixtures::sample_route();
        let candidates = vec![fixtures::detour_route(), route.clone()];
        let (best, percentage) = best_match(&route, &candidates, 90.0).unwrap();
        assert_eq!(best, &candidates[1]);
        assert_eq!(percentage, 100.0);
    }

    #[test]
    fn spoken_cache_key_prefers_ssml() {
        let plain = SpokenInstruction {
            distance_along_step: 10.0,
            text: "Turn left".into(),
            ssml_text: None,
        };
        let ssml = SpokenInstruction {
            ssml_text: Some("<speak>Turn left</speak>".into()),
            ..plain.clone()
        };
        assert_eq!(plain.cache_key(), md5_hex("Turn left"));
        assert_eq!(ssml.cache_key(), md5_hex("<speak>Turn left</speak>"));
    }
}
