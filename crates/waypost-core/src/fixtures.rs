//! Hand-built routes shared by the workspace's tests.
//!
//! The sample route starts in San Francisco and forms a staircase:
//! 400 m east, 300 m north, 200 m east, then an arrive step.

use crate::geo::Coordinate;
use crate::line::Polyline;
use crate::location::Location;
use crate::progress::RouteProgress;
use crate::route::{
    CongestionLevel, Intersection, ManeuverType, Route, RouteLeg, RouteOptions, RouteStep,
    SpokenInstruction, VisualInstructionBanner, Waypoint,
};

pub const ORIGIN: Coordinate = Coordinate::new(37.7749, -122.4194);

/// Vertices of the sample route: origin, first turn, second turn, destination.
pub fn sample_coordinates() -> [Coordinate; 4] {
    let a = ORIGIN;
    let b = a.coordinate_at(400.0, 90.0);
    let c = b.coordinate_at(300.0, 0.0);
    let d = c.coordinate_at(200.0, 90.0);
    [a, b, c, d]
}

/// A step along `coordinates` with one spoken instruction at the start of
/// the step, one 50 m before its end, and a single visual banner.
pub fn step(
    maneuver_type: ManeuverType,
    coordinates: Vec<Coordinate>,
    distance: f64,
    expected_travel_time: f64,
    initial_heading: f64,
    final_heading: f64,
    name: &str,
) -> RouteStep {
    let spoken = if maneuver_type == ManeuverType::Arrive {
        vec![spoken_instruction(0.0, "You have arrived")]
    } else {
        vec![
            spoken_instruction(distance, &format!("Continue on {name}")),
            spoken_instruction(50.0, &format!("Prepare to leave {name}")),
        ]
    };

    RouteStep {
        maneuver_type,
        maneuver_location: coordinates[0],
        instructions: format!("{maneuver_type:?} onto {name}"),
        names: vec![name.to_string()],
        distance,
        expected_travel_time,
        coordinates,
        initial_heading: Some(initial_heading),
        final_heading: Some(final_heading),
        intersections: None,
        instructions_spoken_along_step: Some(spoken),
        instructions_displayed_along_step: Some(vec![VisualInstructionBanner {
            distance_along_step: distance,
            primary_text: name.to_string(),
            secondary_text: None,
        }]),
    }
}

fn spoken_instruction(distance_along_step: f64, text: &str) -> SpokenInstruction {
    SpokenInstruction {
        distance_along_step,
        text: text.to_string(),
        ssml_text: Some(format!("<speak>{text}</speak>")),
    }
}

fn route_from_steps(steps: Vec<RouteStep>, name: &str) -> Route {
    let [a, .., d] = sample_coordinates();
    let source = Waypoint::named(a, "Start");
    let destination = Waypoint::named(d, "Finish");
    let leg = RouteLeg::new(name, source.clone(), destination.clone(), steps);
    Route::new(vec![leg], RouteOptions::navigation(vec![source, destination]))
}

fn sample_steps() -> Vec<RouteStep> {
    let [a, b, c, d] = sample_coordinates();
    vec![
        step(ManeuverType::Depart, vec![a, b], 400.0, 300.0, 0.0, 90.0, "Market Street"),
        step(ManeuverType::Turn, vec![b, c], 300.0, 200.0, 90.0, 0.0, "Kearny Street"),
        step(ManeuverType::Turn, vec![c, d], 200.0, 150.0, 0.0, 90.0, "Post Street"),
        step(ManeuverType::Arrive, vec![d, d], 0.0, 0.0, 90.0, 90.0, "Post Street"),
    ]
}

/// The staircase route: 900 m, 650 s.
pub fn sample_route() -> Route {
    route_from_steps(sample_steps(), "Market Street")
}

/// The sample route with per-segment congestion: low on the first step,
/// heavy on the second and severe on the third.
pub fn congested_route() -> Route {
    let mut route = sample_route();
    let leg = &mut route.legs[0];
    leg.segment_congestion_levels = Some(vec![
        CongestionLevel::Low,
        CongestionLevel::Heavy,
        CongestionLevel::Severe,
    ]);
    leg.expected_segment_travel_times = Some(vec![300.0, 200.0, 150.0]);
    route
}

/// The sample route with a tunnel starting 200 m into the first step.
pub fn tunnel_route() -> Route {
    let mut route = sample_route();
    let [a, b, ..] = sample_coordinates();
    let entrance = a.coordinate_at(200.0, 90.0);
    let steps = &mut route.legs[0].steps;
    steps[0].coordinates = vec![a, entrance, b];
    steps[0].intersections = Some(vec![
        Intersection {
            location: a,
            outlet_road_classes: None,
        },
        Intersection {
            location: entrance,
            outlet_road_classes: Some(vec![crate::route::RoadClass::Tunnel]),
        },
    ]);
    steps[1].intersections = Some(vec![Intersection {
        location: b,
        outlet_road_classes: None,
    }]);
    route
}

/// The staircase split at the second turn: leg one ends at the stop after
/// 700 m, leg two covers the last 200 m east.
pub fn two_leg_route() -> Route {
    let [a, b, c, d] = sample_coordinates();
    let start = Waypoint::named(a, "Start");
    let stop = Waypoint::named(c, "Stop");
    let finish = Waypoint::named(d, "Finish");
    let first = RouteLeg::new(
        "Market Street",
        start.clone(),
        stop.clone(),
        vec![
            step(ManeuverType::Depart, vec![a, b], 400.0, 300.0, 0.0, 90.0, "Market Street"),
            step(ManeuverType::Turn, vec![b, c], 300.0, 200.0, 90.0, 0.0, "Kearny Street"),
            step(ManeuverType::Arrive, vec![c, c], 0.0, 0.0, 0.0, 0.0, "Kearny Street"),
        ],
    );
    let second = RouteLeg::new(
        "Post Street",
        stop.clone(),
        finish.clone(),
        vec![
            step(ManeuverType::Depart, vec![c, d], 200.0, 150.0, 0.0, 90.0, "Post Street"),
            step(ManeuverType::Arrive, vec![d, d], 0.0, 0.0, 90.0, 90.0, "Post Street"),
        ],
    );
    Route::new(
        vec![first, second],
        RouteOptions::navigation(vec![start, stop, finish]),
    )
}

/// Same geometry as the sample route with a first step that takes 150 s
/// instead of 300 s, ending up 150 s faster overall.
pub fn faster_route() -> Route {
    let [a, b, ..] = sample_coordinates();
    let bend = a.coordinate_at(200.0, 90.0).coordinate_at(5.0, 0.0);
    let mut steps = sample_steps();
    steps[0] = step(ManeuverType::Depart, vec![a, bend, b], 400.0, 150.0, 0.0, 90.0, "Market Street");
    route_from_steps(steps, "Market Street")
}

/// Same geometry as the sample route with a traffic jam on the third step,
/// ending up 250 s slower overall.
pub fn slower_route() -> Route {
    let mut steps = sample_steps();
    steps[2].expected_travel_time = 400.0;
    route_from_steps(steps, "Market Street")
}

/// A route to the same destination that heads north first.
pub fn detour_route() -> Route {
    let [a, .., d] = sample_coordinates();
    let corner = a.coordinate_at(300.0, 0.0);
    let east = corner.distance_to(&d);
    let steps = vec![
        step(ManeuverType::Depart, vec![a, corner], 300.0, 240.0, 0.0, 0.0, "Mason Street"),
        step(ManeuverType::Turn, vec![corner, d], east, 400.0, 0.0, 90.0, "Post Street"),
        step(ManeuverType::Arrive, vec![d, d], 0.0, 0.0, 90.0, 90.0, "Post Street"),
    ];
    route_from_steps(steps, "Mason Street")
}

/// The point `distance` meters along step `step_index` of the current leg.
pub fn point_along_step(progress: &RouteProgress, step_index: usize, distance: f64) -> Coordinate {
    let step = &progress.current_leg().steps[step_index];
    Polyline::new(&step.coordinates)
        .coordinate_from_start(distance)
        .unwrap_or(step.maneuver_location)
}

/// A good quality fix: 10 m accuracy, moving at 4 m/s along `course`.
pub fn fix(coordinate: Coordinate, course: f64, timestamp: f64) -> Location {
    Location::new(coordinate, timestamp)
        .with_horizontal_accuracy(10.0)
        .with_course(course)
        .with_speed(4.0)
}
