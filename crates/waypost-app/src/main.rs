mod directions;
mod protocol;

use std::cell::RefCell;
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};

use waypost_config::NavigationSettings;
use waypost_core::digest::md5_hex;
use waypost_core::format::{DistanceFormatter, UnitSystem};
use waypost_core::geo::wrap;
use waypost_core::logging;
use waypost_core::observer::{FnObserver, ObserverRegistry};
use waypost_core::route::load_routes;
use waypost_core::{EventKind, Location, NavigationEvent, Route, RoutingError, Waypoint};
use waypost_engine::{RerouteReason, RouteController, RouteControllerDelegate};
use waypost_sim::{load_trace, LocationSource, ReplayLocationSource, SimulatedLocationSource};

use crate::directions::FileDirections;
use crate::protocol::{EventPrinter, OutputFormat};

/// Follow a route with recorded or simulated locations and print what the
/// route controller reports.
#[derive(Parser, Debug)]
#[command(name = "waypost", version)]
#[command(about = "Turn-by-turn route following from the command line", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Replay a recorded location trace against a route
    Replay {
        #[command(flatten)]
        drive: DriveArgs,

        /// JSON array of recorded locations
        #[arg(long)]
        trace: PathBuf,

        /// Play back this many times faster than recorded (with --realtime)
        #[arg(long, default_value_t = 1.0, value_parser = positive_multiplier)]
        speed_multiplier: f64,
    },
    /// Drive along the route with simulated locations
    Simulate {
        #[command(flatten)]
        drive: DriveArgs,

        /// Distance covered per simulated second, as a multiple of the
        /// simulated speed
        #[arg(long, default_value_t = 1.0, value_parser = positive_multiplier)]
        speed_multiplier: f64,

        /// Leave the route after this many fixes
        #[arg(long)]
        divert_after: Option<usize>,

        /// How far to the right of the route diverted fixes are placed
        #[arg(long, default_value_t = 150.0)]
        divert_meters: f64,

        /// Number of diverted fixes before the drive returns to the route
        #[arg(long, default_value_t = 3)]
        divert_fixes: usize,
    },
    /// Print the MD5 digest of TEXT
    Digest { text: String },
}

#[derive(Args, Debug)]
struct DriveArgs {
    /// Route JSON: a route, an array of routes or a directions response
    #[arg(long)]
    route: PathBuf,

    /// Navigation settings TOML (default: $WAYPOST_CONFIG, then the user
    /// config directory)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Routes served to reroute requests
    #[arg(long)]
    alternatives: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    /// Wait between fixes as long as the source asks instead of running
    /// as fast as possible
    #[arg(long)]
    realtime: bool,
}

fn positive_multiplier(value: &str) -> Result<f64, String> {
    let multiplier: f64 = value
        .parse()
        .map_err(|_| format!("`{value}` is not a number"))?;
    if multiplier.is_finite() && multiplier > 0.0 {
        Ok(multiplier)
    } else {
        Err(format!("speed multiplier must be greater than zero, got {value}"))
    }
}

/// Moves simulated fixes off the route for a while.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Divert {
    after: usize,
    meters: f64,
    fixes: usize,
}

impl Divert {
    /// `location`, the `number`th fix of the drive, shifted to the right of
    /// its course while inside the divert window.
    fn apply(&self, number: usize, location: Location) -> Location {
        if number <= self.after || number > self.after + self.fixes {
            return location;
        }
        let bearing = wrap(location.course + 90.0, 0.0, 360.0);
        location.relocated(
            location.coordinate.coordinate_at(self.meters, bearing),
            location.course,
        )
    }
}

/// Logs the controller's decisions.
struct CliDelegate;

impl RouteControllerDelegate for CliDelegate {
    fn did_reroute_along(&mut self, route: &Route, reason: RerouteReason) {
        tracing::info!(
            %reason,
            distance = route.distance,
            expected_travel_time = route.expected_travel_time,
            "new route installed"
        );
    }

    fn did_fail_to_reroute(&mut self, error: &RoutingError) {
        tracing::warn!(%error, "reroute failed");
    }

    fn did_arrive_at(&mut self, waypoint: &Waypoint) -> bool {
        tracing::info!(
            waypoint = waypoint.name.as_deref().unwrap_or("unnamed"),
            "arrived at waypoint"
        );
        true
    }
}

/// A controller wired to its observers and the source feeding it.
struct Drive {
    controller: RouteController,
    observers: ObserverRegistry,
    tally: Rc<RefCell<HashMap<EventKind, usize>>>,
}

impl Drive {
    fn new(args: &DriveArgs, route: Route, settings: NavigationSettings) -> Result<Self> {
        let directions = match &args.alternatives {
            Some(path) => FileDirections::from_path(path)?,
            None => FileDirections::default(),
        };
        let units = settings.units.system.unwrap_or_else(|| {
            UnitSystem::for_route(
                route.options.distance_measurement_system,
                Some(route.options.locale.as_str()),
            )
        });

        let controller =
            RouteController::new(route, directions, settings)?.with_delegate(CliDelegate);

        let mut observers = ObserverRegistry::new();
        observers.register(Box::new(EventPrinter::new(
            args.format,
            DistanceFormatter::new(units),
            io::stdout(),
        )))?;
        let tally = Rc::new(RefCell::new(HashMap::new()));
        let counts = Rc::clone(&tally);
        observers.register(Box::new(FnObserver::new(
            "tally",
            move |event: &NavigationEvent| {
                *counts.borrow_mut().entry(event.kind()).or_insert(0) += 1;
            },
        )))?;

        Ok(Self {
            controller,
            observers,
            tally,
        })
    }

    fn run(&mut self, source: &mut dyn LocationSource, realtime: bool) {
        let interval = self.controller.settings().dead_reckoning.interval;
        let mut previous: Option<Location> = None;

        while let Some(location) = source.next_location() {
            if let Some(previous) = previous {
                self.fill_gap(source, previous.timestamp, location.timestamp, interval);
            }
            self.feed(source, location);
            if let Some(simulated) = self.controller.next_tunnel_location() {
                self.feed(source, simulated);
            }
            previous = Some(location);

            if realtime {
                std::thread::sleep(source.next_delay());
            }
        }
        self.controller.end_navigation();
    }

    /// Hand `location` to the controller and deliver what it published.
    fn feed(&mut self, source: &mut dyn LocationSource, location: Location) {
        self.controller.update_locations(&[location]);
        for event in self.controller.drain_events() {
            match &event {
                NavigationEvent::DidReroute { .. } => {
                    source.route_did_change(self.controller.route_progress().route());
                }
                NavigationEvent::ProgressChanged { progress, .. } => {
                    source.progress_did_change(progress);
                }
                _ => {}
            }
            self.observers.broadcast(&event);
        }
    }

    /// Dead-reckoned fixes for the time between two real ones.
    fn fill_gap(&mut self, source: &mut dyn LocationSource, from: f64, until: f64, interval: f64) {
        if interval <= 0.0 {
            return;
        }
        let mut now = from + interval;
        while now < until {
            if let Some(reckoned) = self.controller.dead_reckoning_location(now) {
                tracing::debug!(timestamp = now, "no fix, dead reckoning");
                self.feed(source, reckoned);
            }
            now += interval;
        }
    }

    fn count(&self, kind: EventKind) -> usize {
        self.tally.borrow().get(&kind).copied().unwrap_or(0)
    }

    fn report(&self) {
        let session = self.controller.session();
        tracing::info!(
            reroutes = session.number_of_reroutes,
            reroute_failures = self.count(EventKind::RerouteFailed),
            progress_updates = self.count(EventKind::ProgressChanged),
            spoken = self.count(EventKind::PassedSpokenInstructionPoint),
            arrived = session.arrival_timestamp.is_some(),
            "drive finished"
        );
    }
}

fn load_route(path: &Path) -> Result<Route> {
    load_routes(path)?
        .into_iter()
        .next()
        .with_context(|| format!("no route in {}", path.display()))
}

fn drive(
    args: &DriveArgs,
    source: impl FnOnce(&Route) -> Result<Box<dyn LocationSource>>,
) -> Result<()> {
    let settings = NavigationSettings::load(args.config.as_deref())?;
    let route = load_route(&args.route)?;
    let mut source = source(&route)?;

    let mut drive = Drive::new(args, route, settings)?;
    drive.run(source.as_mut(), args.realtime);
    drive.report();
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    if let Err(err) = logging::init() {
        eprintln!("warning: logging unavailable: {err:#}");
    }

    match cli.command {
        Command::Replay {
            drive: args,
            trace,
            speed_multiplier,
        } => drive(&args, |_| {
            let source = ReplayLocationSource::new(load_trace(&trace)?)
                .with_speed_multiplier(speed_multiplier);
            tracing::info!(fixes = source.remaining(), speed_multiplier, "replaying trace");
            let source: Box<dyn LocationSource> = Box::new(source);
            Ok(source)
        }),
        Command::Simulate {
            drive: args,
            speed_multiplier,
            divert_after,
            divert_meters,
            divert_fixes,
        } => drive(&args, |route| {
            let mut source =
                SimulatedLocationSource::new(route).with_speed_multiplier(speed_multiplier);
            if let Some(after) = divert_after {
                let divert = Divert {
                    after,
                    meters: divert_meters,
                    fixes: divert_fixes,
                };
                let mut number = 0;
                source = source.with_location_override(move |location| {
                    number += 1;
                    divert.apply(number, location)
                });
            }
            let source: Box<dyn LocationSource> = Box::new(source);
            Ok(source)
        }),
        Command::Digest { text } => {
            println!("{}", md5_hex(&text));
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use waypost_core::fixtures;

    #[test]
    fn cli_parses_simulate_with_divert() {
        let cli = Cli::try_parse_from([
            "waypost",
            "simulate",
            "--route",
            "route.json",
            "--divert-after",
            "5",
            "--format",
            "json",
        ])
        .unwrap();
        match cli.command {
            Command::Simulate {
                drive,
                speed_multiplier,
                divert_after,
                divert_meters,
                ..
            } => {
                assert_eq!(drive.route, PathBuf::from("route.json"));
                assert_eq!(drive.format, OutputFormat::Json);
                assert_eq!(speed_multiplier, 1.0);
                assert_eq!(divert_after, Some(5));
                assert_eq!(divert_meters, 150.0);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn cli_requires_trace_for_replay() {
        assert!(Cli::try_parse_from(["waypost", "replay", "--route", "r.json"]).is_err());
    }

    #[test]
    fn cli_parses_replay_speed_multiplier() {
        let cli = Cli::try_parse_from([
            "waypost",
            "replay",
            "--route",
            "r.json",
            "--trace",
            "t.json",
            "--speed-multiplier",
            "4",
        ])
        .unwrap();
        assert!(matches!(
            cli.command,
            Command::Replay { speed_multiplier, .. } if speed_multiplier == 4.0
        ));
    }

    #[test]
    fn cli_rejects_non_positive_speed_multiplier() {
        for value in ["0", "-1", "fast", "NaN"] {
            let result = Cli::try_parse_from([
                "waypost",
                "simulate",
                "--route",
                "r.json",
                "--speed-multiplier",
                value,
            ]);
            assert!(result.is_err(), "accepted {value}");
        }
        assert!(Cli::try_parse_from([
            "waypost",
            "replay",
            "--route",
            "r.json",
            "--trace",
            "t.json",
            "--speed-multiplier",
            "0",
        ])
        .is_err());
    }

    #[test]
    fn cli_parses_digest() {
        let cli = Cli::try_parse_from(["waypost", "digest", "hello"]).unwrap();
        assert!(matches!(cli.command, Command::Digest { text } if text == "hello"));
    }

    #[test]
    fn divert_shifts_only_inside_window() {
        let divert = Divert {
            after: 2,
            meters: 100.0,
            fixes: 2,
        };
        let location = fixtures::fix(fixtures::ORIGIN, 0.0, 0.0);
        assert_eq!(divert.apply(2, location), location);
        assert_eq!(divert.apply(5, location), location);

        let shifted = divert.apply(3, location);
        assert!((shifted.coordinate.distance_to(&fixtures::ORIGIN) - 100.0).abs() < 0.5);
        // course 0 shifts east
        assert!(shifted.coordinate.longitude > fixtures::ORIGIN.longitude);
        assert_eq!(shifted.course, location.course);
    }

    #[test]
    fn simulated_drive_reaches_the_destination() {
        let route = fixtures::sample_route();
        let settings = NavigationSettings::default();
        let mut controller =
            RouteController::new(route.clone(), FileDirections::default(), settings).unwrap();
        let mut source = SimulatedLocationSource::new(&route);

        while let Some(location) = source.next_location() {
            controller.update_locations(&[location]);
            for event in controller.drain_events() {
                assert!(
                    !matches!(event, NavigationEvent::WillReroute { .. }),
                    "simulated drive left the route at {}",
                    location.timestamp
                );
            }
        }
        // parked at the destination
        let last = source.last_location().unwrap();
        controller.update_locations(&[Location {
            timestamp: last.timestamp + 1.0,
            ..last
        }]);
        assert!(controller.session().arrival_timestamp.is_some());
    }
}
