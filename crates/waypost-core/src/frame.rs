use std::collections::VecDeque;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

/// Completion report for one rendered map frame.
///
/// Times are in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FrameRender {
    pub fully_rendered: bool,
    pub encoding_time: f64,
    pub rendering_time: f64,
}

impl FrameRender {
    pub fn new(fully_rendered: bool, encoding_time: f64, rendering_time: f64) -> Self {
        Self {
            fully_rendered,
            encoding_time,
            rendering_time,
        }
    }
}

/// Extension point for whatever draws the map. Implementors are told each
/// time a frame finishes rendering.
pub trait FrameRenderObserver {
    fn frame_rendered(&mut self, frame: &FrameRender);
}

/// Aggregates frame reports over a sliding time window.
///
/// Call [`record`](FrameStats::record) for each finished frame, then read
/// [`fps`](FrameStats::fps) and the averages. Reports older than the window
/// are pruned on every record.
pub struct FrameStats {
    frames: VecDeque<(Instant, FrameRender)>,
    window: Duration,
}

impl Default for FrameStats {
    fn default() -> Self {
        Self::new(Duration::from_secs(1))
    }
}

impl FrameStats {
    pub fn new(window: Duration) -> Self {
        Self {
            frames: VecDeque::new(),
            window,
        }
    }

    /// Record a frame finished at `now` and prune expired reports.
    pub fn record(&mut self, now: Instant, frame: FrameRender) {
        self.frames.push_back((now, frame));
        self.prune(now);
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Frames per second over the window.
    ///
    /// Returns `0.0` if fewer than two frames have been recorded.
    pub fn fps(&self) -> f64 {
        if self.frames.len() < 2 {
            return 0.0;
        }
        self.frames.len() as f64 / self.window.as_secs_f64()
    }

    /// Share of frames in the window that rendered completely, in `[0, 1]`.
    pub fn fully_rendered_fraction(&self) -> f64 {
        if self.frames.is_empty() {
            return 0.0;
        }
        let full = self.frames.iter().filter(|(_, f)| f.fully_rendered).count();
        full as f64 / self.frames.len() as f64
    }

    pub fn mean_encoding_time(&self) -> f64 {
        self.mean(|f| f.encoding_time)
    }

    pub fn mean_rendering_time(&self) -> f64 {
        self.mean(|f| f.rendering_time)
    }

    fn mean(&self, value: impl Fn(&FrameRender) -> f64) -> f64 {
        if self.frames.is_empty() {
            return 0.0;
        }
        let total: f64 = self.frames.iter().map(|(_, f)| value(f)).sum();
        total / self.frames.len() as f64
    }

    fn prune(&mut self, now: Instant) {
        let Some(cutoff) = now.checked_sub(self.window) else {
            return;
        };
        while let Some(&(front, _)) = self.frames.front() {
            if front < cutoff {
                self.frames.pop_front();
            } else {
                break;
            }
        }
    }
}

impl FrameRenderObserver for FrameStats {
    fn frame_rendered(&mut self, frame: &FrameRender) {
        self.record(Instant::now(), *frame);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_stats_return_zero() {
        let stats = FrameStats::default();
        assert_eq!(stats.fps(), 0.0);
        assert_eq!(stats.fully_rendered_fraction(), 0.0);
        assert_eq!(stats.mean_encoding_time(), 0.0);
    }

    #[test]
    fn single_frame_has_no_rate() {
        let mut stats = FrameStats::default();
        stats.record(Instant::now(), FrameRender::new(true, 0.002, 0.010));
        assert_eq!(stats.fps(), 0.0);
        assert_eq!(stats.len(), 1);
    }

    #[test]
    fn rate_and_averages_over_window() {
        let mut stats = FrameStats::new(Duration::from_secs(1));
        let base = Instant::now();
        for i in 0..10 {
            let full = i % 2 == 0;
            stats.record(
                base + Duration::from_millis(i * 100),
                FrameRender::new(full, 0.002, 0.010),
            );
        }
        let fps = stats.fps();
        assert!(fps > 9.0 && fps < 11.0, "fps was {}", fps);
        assert!((stats.fully_rendered_fraction() - 0.5).abs() < 1e-9);
        assert!((stats.mean_encoding_time() - 0.002).abs() < 1e-9);
        assert!((stats.mean_rendering_time() - 0.010).abs() < 1e-9);
    }

    #[test]
    fn old_frames_pruned() {
        let mut stats = FrameStats::new(Duration::from_secs(1));
        let base = Instant::now();
        for i in 0..5 {
            stats.record(
                base + Duration::from_millis(i * 200),
                FrameRender::new(false, 0.5, 0.5),
            );
        }
        for i in 0..3 {
            stats.record(
                base + Duration::from_millis(2000 + i * 300),
                FrameRender::new(true, 0.1, 0.1),
            );
        }
        assert_eq!(stats.len(), 3);
        assert_eq!(stats.fully_rendered_fraction(), 1.0);
    }

    #[test]
    fn observer_records_frames() {
        let mut stats = FrameStats::default();
        let observer: &mut dyn FrameRenderObserver = &mut stats;
        observer.frame_rendered(&FrameRender::new(true, 0.0, 0.0));
        assert_eq!(stats.len(), 1);
    }
}
