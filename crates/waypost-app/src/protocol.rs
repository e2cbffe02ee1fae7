//! Rendering of navigation events for the terminal.
//!
//! Events are written either as one JSON object per line, tagged with the
//! event kind, or as short human-readable lines.

use std::io::Write;

use anyhow::Result;
use serde::Serialize;
use waypost_core::format::DistanceFormatter;
use waypost_core::observer::Observer;
use waypost_core::{Location, NavigationEvent, RouteProgress};

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Json,
    Text,
}

/// The parts of a progress snapshot worth printing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressSummary {
    pub leg_index: usize,
    pub step_index: usize,
    pub distance_traveled: f64,
    pub distance_remaining: f64,
    pub duration_remaining: f64,
    pub fraction_traveled: f64,
    pub distance_to_maneuver: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub road: Option<String>,
}

impl From<&RouteProgress> for ProgressSummary {
    fn from(progress: &RouteProgress) -> Self {
        let leg_progress = &progress.current_leg_progress;
        let step = leg_progress.current_step();
        Self {
            leg_index: progress.leg_index(),
            step_index: leg_progress.step_index(),
            distance_traveled: progress.distance_traveled(),
            distance_remaining: progress.distance_remaining(),
            duration_remaining: progress.duration_remaining(),
            fraction_traveled: progress.fraction_traveled(),
            distance_to_maneuver: leg_progress.current_step_progress.distance_remaining(),
            road: step.names.first().filter(|name| !name.is_empty()).cloned(),
        }
    }
}

/// One line of JSON output.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EventRecord {
    ProgressChanged {
        progress: ProgressSummary,
        location: Location,
        raw_location: Location,
    },
    WillReroute {
        location: Location,
    },
    DidReroute {
        location: Location,
        proactive: bool,
    },
    RerouteFailed {
        error: String,
    },
    PassedSpokenInstructionPoint {
        progress: ProgressSummary,
        #[serde(skip_serializing_if = "Option::is_none")]
        text: Option<String>,
        /// MD5 of the SSML (or plain) text, for audio caches.
        #[serde(skip_serializing_if = "Option::is_none")]
        cache_key: Option<String>,
    },
    PassedVisualInstructionPoint {
        progress: ProgressSummary,
        #[serde(skip_serializing_if = "Option::is_none")]
        text: Option<String>,
    },
}

impl From<&NavigationEvent> for EventRecord {
    fn from(event: &NavigationEvent) -> Self {
        match event {
            NavigationEvent::ProgressChanged {
                progress,
                location,
                raw_location,
            } => EventRecord::ProgressChanged {
                progress: progress.as_ref().into(),
                location: *location,
                raw_location: *raw_location,
            },
            NavigationEvent::WillReroute { location } => EventRecord::WillReroute {
                location: *location,
            },
            NavigationEvent::DidReroute {
                location,
                proactive,
            } => EventRecord::DidReroute {
                location: *location,
                proactive: *proactive,
            },
            NavigationEvent::RerouteFailed { error } => EventRecord::RerouteFailed {
                error: error.to_string(),
            },
            NavigationEvent::PassedSpokenInstructionPoint { progress } => {
                let spoken = progress
                    .current_leg_progress
                    .current_step_progress
                    .current_spoken_instruction();
                EventRecord::PassedSpokenInstructionPoint {
                    progress: progress.as_ref().into(),
                    text: spoken.map(|s| s.text.clone()),
                    cache_key: spoken.map(|s| s.cache_key()),
                }
            }
            NavigationEvent::PassedVisualInstructionPoint { progress } => {
                let banner = progress
                    .current_leg_progress
                    .current_step_progress
                    .current_visual_instruction();
                EventRecord::PassedVisualInstructionPoint {
                    progress: progress.as_ref().into(),
                    text: banner.map(|b| b.primary_text.clone()),
                }
            }
        }
    }
}

/// A human-readable line for `event`, distances rendered with `formatter`.
pub fn text_line(event: &NavigationEvent, formatter: &DistanceFormatter) -> String {
    match EventRecord::from(event) {
        EventRecord::ProgressChanged {
            progress,
            raw_location,
            ..
        } => format!(
            "[{:>7.1}s] leg {} step {}: {} to maneuver, {} left{}",
            raw_location.timestamp,
            progress.leg_index + 1,
            progress.step_index + 1,
            formatter.string(progress.distance_to_maneuver),
            formatter.string(progress.distance_remaining),
            progress.road.map(|road| format!(" on {road}")).unwrap_or_default()
        ),
        EventRecord::WillReroute { location } => format!(
            "off route at {:.5}, {:.5}, rerouting",
            location.coordinate.latitude, location.coordinate.longitude
        ),
        EventRecord::DidReroute { proactive: true, .. } => "switched to a faster route".into(),
        EventRecord::DidReroute { .. } => "rerouted".into(),
        EventRecord::RerouteFailed { error } => format!("reroute failed: {error}"),
        EventRecord::PassedSpokenInstructionPoint { text, .. } => {
            format!("say: {}", text.as_deref().unwrap_or("-"))
        }
        EventRecord::PassedVisualInstructionPoint { text, .. } => {
            format!("show: {}", text.as_deref().unwrap_or("-"))
        }
    }
}

/// Observer that prints every event it receives to a writer.
pub struct EventPrinter<W> {
    format: OutputFormat,
    formatter: DistanceFormatter,
    out: W,
}

impl<W: Write> EventPrinter<W> {
    pub fn new(format: OutputFormat, formatter: DistanceFormatter, out: W) -> Self {
        Self {
            format,
            formatter,
            out,
        }
    }

    pub fn render(&self, event: &NavigationEvent) -> Result<String> {
        Ok(match self.format {
            OutputFormat::Json => serde_json::to_string(&EventRecord::from(event))?,
            OutputFormat::Text => text_line(event, &self.formatter),
        })
    }

    fn print(&mut self, event: &NavigationEvent) -> Result<()> {
        let line = self.render(event)?;
        writeln!(self.out, "{line}")?;
        Ok(())
    }
}

impl<W: Write> Observer for EventPrinter<W> {
    fn id(&self) -> &str {
        "printer"
    }

    fn handle_event(&mut self, event: &NavigationEvent) {
        if let Err(err) = self.print(event) {
            tracing::warn!(error = %err, kind = %event.kind(), "failed to print event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use waypost_core::fixtures;
    use waypost_core::format::UnitSystem;
    use waypost_core::RoutingError;

    fn progress() -> RouteProgress {
        RouteProgress::new(Arc::new(fixtures::sample_route()), 0, 0).unwrap()
    }

    fn printer(format: OutputFormat) -> EventPrinter<Vec<u8>> {
        EventPrinter::new(format, DistanceFormatter::new(UnitSystem::Metric), Vec::new())
    }

    fn origin() -> Location {
        fixtures::fix(fixtures::ORIGIN, 90.0, 12.0)
    }

    #[test]
    fn json_records_are_tagged_by_event() {
        let event = NavigationEvent::DidReroute {
            location: origin(),
            proactive: true,
        };
        let line = printer(OutputFormat::Json).render(&event).unwrap();
        let value: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["event"], "did_reroute");
        assert_eq!(value["proactive"], true);
        assert_eq!(value["location"]["timestamp"], 12.0);
    }

    #[test]
    fn progress_is_summarized() {
        let event = NavigationEvent::ProgressChanged {
            progress: Box::new(progress()),
            location: origin(),
            raw_location: origin(),
        };
        let value = serde_json::to_value(EventRecord::from(&event)).unwrap();
        assert_eq!(value["event"], "progress_changed");
        assert_eq!(value["progress"]["step_index"], 0);
        assert_eq!(value["progress"]["distance_traveled"], 0.0);
    }

    #[test]
    fn spoken_record_carries_text_and_cache_key() {
        let progress = progress();
        let spoken = progress
            .current_leg_progress
            .current_step_progress
            .current_spoken_instruction()
            .unwrap()
            .clone();
        let event = NavigationEvent::PassedSpokenInstructionPoint {
            progress: Box::new(progress),
        };
        match EventRecord::from(&event) {
            EventRecord::PassedSpokenInstructionPoint { text, cache_key, .. } => {
                assert_eq!(text.as_deref(), Some(spoken.text.as_str()));
                assert_eq!(cache_key, Some(spoken.cache_key()));
            }
            other => panic!("unexpected record {other:?}"),
        }
    }

    #[test]
    fn failure_text_includes_error() {
        let event = NavigationEvent::RerouteFailed {
            error: RoutingError::Request("offline".into()),
        };
        let line = printer(OutputFormat::Text).render(&event).unwrap();
        assert_eq!(line, "reroute failed: directions request failed: offline");
    }

    #[test]
    fn progress_text_formats_distances() {
        let event = NavigationEvent::ProgressChanged {
            progress: Box::new(progress()),
            location: origin(),
            raw_location: origin(),
        };
        let line = text_line(&event, &DistanceFormatter::new(UnitSystem::Metric));
        assert!(line.contains("leg 1 step 1"), "{line}");
        assert!(line.contains("400 m to maneuver"), "{line}");
        assert!(line.contains("900 m left"), "{line}");
    }

    #[test]
    fn printer_writes_one_line_per_event() {
        let mut printer = printer(OutputFormat::Text);
        printer.handle_event(&NavigationEvent::WillReroute { location: origin() });
        printer.handle_event(&NavigationEvent::DidReroute {
            location: origin(),
            proactive: false,
        });
        let output = String::from_utf8(printer.out).unwrap();
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("off route at"));
        assert_eq!(lines[1], "rerouted");
    }
}
