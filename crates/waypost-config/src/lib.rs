//! Configuration types and loaders for waypost.
//!
//! This crate owns the on-disk navigation settings schema so the engine, the
//! simulator and the binary share a single source of truth.

pub mod settings;

pub use settings::{
    config_path, DeadReckoningSettings, InstructionSettings, ManeuverSettings,
    NavigationSettings, ReroutingSettings, SessionSettings, SnappingSettings, TunnelSettings,
    UnitSettings, SCHEMA_REQUIREMENT,
};
