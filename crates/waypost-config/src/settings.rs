use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use semver::{Version, VersionReq};
use serde::{Deserialize, Serialize};
use waypost_core::format::UnitSystem;

/// Settings files must declare a schema version matching this requirement.
pub const SCHEMA_REQUIREMENT: &str = "^1";

const CURRENT_SCHEMA: &str = "1.0.0";

/// Tunable thresholds for the route controller, loaded from `settings.toml`.
///
/// Every field has a default, so an empty file (or no file) is valid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NavigationSettings {
    pub version: String,
    pub rerouting: ReroutingSettings,
    pub maneuver: ManeuverSettings,
    pub snapping: SnappingSettings,
    pub instructions: InstructionSettings,
    pub tunnel: TunnelSettings,
    pub dead_reckoning: DeadReckoningSettings,
    pub session: SessionSettings,
    pub units: UnitSettings,
}

impl Default for NavigationSettings {
    fn default() -> Self {
        Self {
            version: CURRENT_SCHEMA.to_string(),
            rerouting: ReroutingSettings::default(),
            maneuver: ManeuverSettings::default(),
            snapping: SnappingSettings::default(),
            instructions: InstructionSettings::default(),
            tunnel: TunnelSettings::default(),
            dead_reckoning: DeadReckoningSettings::default(),
            session: SessionSettings::default(),
            units: UnitSettings::default(),
        }
    }
}

/// Off-route detection and reroute requests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReroutingSettings {
    /// Meters off the route before a reroute; also the minimum distance
    /// between two reroute origins.
    pub max_distance_before_recalculating: f64,
    pub min_incorrect_courses: u32,
    /// Horizontal accuracy is divided by this to scale the incorrect course
    /// budget for noisy fixes.
    pub incorrect_course_multiplier: f64,
    pub reroutes_proactively: bool,
    /// Seconds between proactive route checks.
    pub proactive_interval: f64,
    /// Proactive checks stop once less than this many seconds remain.
    pub min_duration_remaining_for_proactive: f64,
    /// A candidate counts as faster when its travel time is at most this
    /// share of the remaining duration.
    pub faster_route_factor: f64,
    /// Percentage of shared coordinates needed to treat a candidate as the
    /// current route.
    pub match_percentage_threshold: f64,
    /// Seconds of ETA difference that justify installing a matching route.
    pub eta_change_threshold: f64,
}

impl Default for ReroutingSettings {
    fn default() -> Self {
        Self {
            max_distance_before_recalculating: 50.0,
            min_incorrect_courses: 4,
            incorrect_course_multiplier: 4.0,
            reroutes_proactively: false,
            proactive_interval: 120.0,
            min_duration_remaining_for_proactive: 600.0,
            faster_route_factor: 0.9,
            match_percentage_threshold: 90.0,
            eta_change_threshold: 30.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ManeuverSettings {
    /// Meters around a maneuver within which the step may complete.
    pub zone_radius: f64,
    /// Degrees between the course and the step's final heading still
    /// counting as having made the turn.
    pub max_degree_offset_for_turn_completion: f64,
}

impl Default for ManeuverSettings {
    fn default() -> Self {
        Self {
            zone_radius: 40.0,
            max_degree_offset_for_turn_completion: 30.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SnappingSettings {
    /// Meters, added to the fix's accuracy, within which a location snaps.
    pub user_location_snapping_distance: f64,
    /// m/s below which snapping follows the current step only.
    pub min_speed: f64,
    /// Meters; fixes less accurate than this keep their raw course.
    pub min_horizontal_accuracy: f64,
    /// Degrees the snapped course may differ from the raw course.
    pub max_manipulated_course_angle: f64,
}

impl Default for SnappingSettings {
    fn default() -> Self {
        Self {
            user_location_snapping_distance: 15.0,
            min_speed: 3.0,
            min_horizontal_accuracy: 20.0,
            max_manipulated_course_angle: 45.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct InstructionSettings {
    /// Speak the first instruction of a leg as soon as guidance starts.
    pub speak_first_instruction: bool,
    /// Seconds before a maneuver treated as "approaching"; proactive
    /// reroutes are not installed inside it.
    pub medium_alert_interval: f64,
}

impl Default for InstructionSettings {
    fn default() -> Self {
        Self {
            speak_first_instruction: true,
            medium_alert_interval: 70.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TunnelSettings {
    /// m/s needed to assume the user is entering a tunnel.
    pub min_speed: f64,
    /// Meters from the tunnel entrance intersection.
    pub min_distance_to_entrance: f64,
    /// Qualified fixes needed after a tunnel before animation stops.
    pub valid_exit_locations: u32,
}

impl Default for TunnelSettings {
    fn default() -> Self {
        Self {
            min_speed: 5.0,
            min_distance_to_entrance: 15.0,
            valid_exit_locations: 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DeadReckoningSettings {
    pub enabled: bool,
    /// Seconds without a fix before an interpolated location is produced.
    pub interval: f64,
}

impl Default for DeadReckoningSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SessionSettings {
    /// Raw locations kept for reroute feedback.
    pub past_location_capacity: usize,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            past_location_capacity: 40,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct UnitSettings {
    /// Forces a unit system; otherwise the route's options decide.
    pub system: Option<UnitSystem>,
}

impl NavigationSettings {
    /// Parse and validate settings TOML.
    pub fn from_toml_str(input: &str) -> Result<Self> {
        let settings: Self =
            toml::from_str(input).context("failed to parse navigation settings TOML")?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load and validate settings from disk.
    pub fn from_path(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read settings at {}", path.display()))?;

        Self::from_toml_str(&raw)
            .with_context(|| format!("invalid settings at {}", path.display()))
    }

    /// Load settings from `explicit` if given, otherwise from
    /// [`config_path`] when that file exists, otherwise defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            tracing::info!(path = %path.display(), "loading navigation settings");
            return Self::from_path(path);
        }

        match config_path() {
            Some(path) if path.exists() => {
                tracing::info!(path = %path.display(), "loading navigation settings");
                Self::from_path(&path)
            }
            Some(path) if std::env::var_os("WAYPOST_CONFIG").is_some() => {
                bail!("WAYPOST_CONFIG points at missing file {}", path.display())
            }
            _ => {
                tracing::debug!("no settings file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Validate the schema version and numeric ranges.
    pub fn validate(&self) -> Result<()> {
        let requirement = VersionReq::parse(SCHEMA_REQUIREMENT)
            .context("schema requirement must be a valid semver requirement")?;
        let version = Version::parse(&self.version)
            .with_context(|| format!("version must be valid semver: {}", self.version))?;
        if !requirement.matches(&version) {
            bail!(
                "settings version {} is not supported (expected {})",
                version,
                SCHEMA_REQUIREMENT
            );
        }

        let r = &self.rerouting;
        validate_positive(
            "rerouting.max_distance_before_recalculating",
            r.max_distance_before_recalculating,
        )?;
        validate_positive(
            "rerouting.incorrect_course_multiplier",
            r.incorrect_course_multiplier,
        )?;
        validate_positive("rerouting.proactive_interval", r.proactive_interval)?;
        validate_non_negative(
            "rerouting.min_duration_remaining_for_proactive",
            r.min_duration_remaining_for_proactive,
        )?;
        validate_non_negative("rerouting.eta_change_threshold", r.eta_change_threshold)?;
        if !(r.faster_route_factor > 0.0 && r.faster_route_factor <= 1.0) {
            bail!(
                "rerouting.faster_route_factor must be in (0, 1], got {}",
                r.faster_route_factor
            );
        }
        if !(r.match_percentage_threshold > 0.0 && r.match_percentage_threshold <= 100.0) {
            bail!(
                "rerouting.match_percentage_threshold must be in (0, 100], got {}",
                r.match_percentage_threshold
            );
        }

        validate_positive("maneuver.zone_radius", self.maneuver.zone_radius)?;
        validate_angle(
            "maneuver.max_degree_offset_for_turn_completion",
            self.maneuver.max_degree_offset_for_turn_completion,
        )?;

        let s = &self.snapping;
        validate_non_negative(
            "snapping.user_location_snapping_distance",
            s.user_location_snapping_distance,
        )?;
        validate_non_negative("snapping.min_speed", s.min_speed)?;
        validate_positive("snapping.min_horizontal_accuracy", s.min_horizontal_accuracy)?;
        validate_angle(
            "snapping.max_manipulated_course_angle",
            s.max_manipulated_course_angle,
        )?;

        validate_non_negative(
            "instructions.medium_alert_interval",
            self.instructions.medium_alert_interval,
        )?;

        validate_non_negative("tunnel.min_speed", self.tunnel.min_speed)?;
        validate_positive(
            "tunnel.min_distance_to_entrance",
            self.tunnel.min_distance_to_entrance,
        )?;
        if self.tunnel.valid_exit_locations == 0 {
            bail!("tunnel.valid_exit_locations must be at least 1");
        }

        validate_positive("dead_reckoning.interval", self.dead_reckoning.interval)?;

        if self.session.past_location_capacity == 0 {
            bail!("session.past_location_capacity must be at least 1");
        }

        Ok(())
    }
}

/// Where settings are looked up when no path is given on the command line.
///
/// Precedence: `WAYPOST_CONFIG` env var > `<config dir>/waypost/settings.toml`.
pub fn config_path() -> Option<PathBuf> {
    if let Some(path) = std::env::var_os("WAYPOST_CONFIG") {
        return Some(PathBuf::from(path));
    }
    dirs::config_dir().map(|dir| dir.join("waypost").join("settings.toml"))
}

fn validate_positive(field: &str, value: f64) -> Result<()> {
    if !(value.is_finite() && value > 0.0) {
        bail!("{field} must be a positive number, got {value}");
    }
    Ok(())
}

fn validate_non_negative(field: &str, value: f64) -> Result<()> {
    if !(value.is_finite() && value >= 0.0) {
        bail!("{field} must not be negative, got {value}");
    }
    Ok(())
}

fn validate_angle(field: &str, value: f64) -> Result<()> {
    if !(value > 0.0 && value <= 180.0) {
        bail!("{field} must be in (0, 180] degrees, got {value}");
    }
    Ok(())
}
