use std::time::Duration;

use waypost_core::Location;

use crate::LocationSource;

/// Plays back recorded fixes in timestamp order.
///
/// Fixes are returned exactly as recorded; only the delay between them is
/// scaled by the speed multiplier.
#[derive(Debug, Clone)]
pub struct ReplayLocationSource {
    locations: Vec<Location>,
    next_index: usize,
    speed_multiplier: f64,
}

impl ReplayLocationSource {
    pub fn new(mut locations: Vec<Location>) -> Self {
        locations.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));
        Self {
            locations,
            next_index: 0,
            speed_multiplier: 1.0,
        }
    }

    /// Play back `multiplier` times faster than recorded.
    pub fn with_speed_multiplier(mut self, multiplier: f64) -> Self {
        if multiplier.is_finite() && multiplier > 0.0 {
            self.speed_multiplier = multiplier;
        } else {
            tracing::warn!(multiplier, "ignoring non-positive speed multiplier");
        }
        self
    }

    pub fn remaining(&self) -> usize {
        self.locations.len() - self.next_index
    }
}

impl LocationSource for ReplayLocationSource {
    fn next_location(&mut self) -> Option<Location> {
        let location = *self.locations.get(self.next_index)?;
        self.next_index += 1;
        Some(location)
    }

    /// Recorded gap between the last returned fix and the next one, divided
    /// by the speed multiplier.
    fn next_delay(&self) -> Duration {
        let (Some(current), Some(next)) = (
            self.next_index
                .checked_sub(1)
                .and_then(|i| self.locations.get(i)),
            self.locations.get(self.next_index),
        ) else {
            return Duration::ZERO;
        };
        let seconds = (next.timestamp - current.timestamp) / self.speed_multiplier;
        Duration::try_from_secs_f64(seconds.max(0.0)).unwrap_or(Duration::ZERO)
    }

    fn last_location(&self) -> Option<Location> {
        self.next_index
            .checked_sub(1)
            .and_then(|i| self.locations.get(i))
            .copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use waypost_core::Coordinate;

    fn at(timestamp: f64) -> Location {
        Location::new(Coordinate::new(37.0, -122.0 + timestamp / 1000.0), timestamp)
    }

    #[test]
    fn replays_in_timestamp_order() {
        let mut source = ReplayLocationSource::new(vec![at(3.0), at(1.0), at(2.0)]);
        let stamps: Vec<f64> = std::iter::from_fn(|| source.next_location())
            .map(|l| l.timestamp)
            .collect();
        assert_eq!(stamps, vec![1.0, 2.0, 3.0]);
        assert_eq!(source.next_location(), None);
        assert_eq!(source.remaining(), 0);
    }

    #[test]
    fn delay_follows_recorded_gaps() {
        let mut source = ReplayLocationSource::new(vec![at(0.0), at(2.0), at(2.5)]);
        assert_eq!(source.next_delay(), Duration::ZERO);
        source.next_location();
        assert_eq!(source.next_delay(), Duration::from_secs(2));
        source.next_location();
        assert_eq!(source.next_delay(), Duration::from_millis(500));
        source.next_location();
        assert_eq!(source.next_delay(), Duration::ZERO);
    }

    #[test]
    fn speed_multiplier_shortens_delay() {
        let mut source =
            ReplayLocationSource::new(vec![at(0.0), at(4.0)]).with_speed_multiplier(4.0);
        source.next_location();
        assert_eq!(source.next_delay(), Duration::from_secs(1));
    }

    #[test]
    fn non_positive_speed_multiplier_keeps_recorded_pace() {
        let mut source =
            ReplayLocationSource::new(vec![at(0.0), at(3.0)]).with_speed_multiplier(0.0);
        source.next_location();
        assert_eq!(source.next_delay(), Duration::from_secs(3));
        assert_eq!(source.last_location().map(|l| l.timestamp), Some(0.0));
        assert_eq!(source.remaining(), 1);
    }
}
