use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use waypost_core::Location;

#[derive(Deserialize)]
#[serde(untagged)]
enum TraceFile {
    Wrapped { locations: Vec<Location> },
    Bare(Vec<Location>),
}

/// Parse a JSON trace: either an array of fixes or `{"locations": [...]}`.
///
/// Fixes accept `lat`/`lng`/`lon` and `accuracy` shorthands and come back
/// sorted by timestamp.
pub fn parse_trace(input: &str) -> Result<Vec<Location>> {
    let file: TraceFile = serde_json::from_str(input).context("failed to parse trace JSON")?;
    let mut locations = match file {
        TraceFile::Wrapped { locations } | TraceFile::Bare(locations) => locations,
    };
    if locations.is_empty() {
        bail!("trace contains no locations");
    }
    locations.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));
    Ok(locations)
}

/// Load and parse a trace file from disk.
pub fn load_trace(path: &Path) -> Result<Vec<Location>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read trace at {}", path.display()))?;
    let locations =
        parse_trace(&raw).with_context(|| format!("invalid trace at {}", path.display()))?;
    tracing::debug!(path = %path.display(), count = locations.len(), "loaded trace");
    Ok(locations)
}
