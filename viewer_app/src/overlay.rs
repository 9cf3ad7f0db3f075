//! Frame time reporting hooked into the UI pass

use ash::vk;
use render_engine::render::deferred::UiOverlay;
use render_engine::render::vulkan::CommandRecorder;
use std::time::{Duration, Instant};

const REPORT_INTERVAL: Duration = Duration::from_secs(1);

/// Averages frame times and logs them once per second
#[derive(Debug)]
pub struct PerformanceOverlay {
    last_frame: Option<Instant>,
    accumulated: Duration,
    frames: u32,
    last_average: Option<Duration>,
}

impl PerformanceOverlay {
    /// No frames recorded yet
    pub const fn new() -> Self {
        Self {
            last_frame: None,
            accumulated: Duration::ZERO,
            frames: 0,
            last_average: None,
        }
    }

    /// Add one frame time; returns the average once a full interval has accumulated
    pub fn add_frame_time(&mut self, frame_time: Duration) -> Option<Duration> {
        self.accumulated += frame_time;
        self.frames += 1;
        if self.accumulated < REPORT_INTERVAL {
            return None;
        }

        let average = self.accumulated / self.frames;
        self.accumulated = Duration::ZERO;
        self.frames = 0;
        self.last_average = Some(average);
        Some(average)
    }

    /// Average reported at the end of the last full interval
    pub const fn last_average(&self) -> Option<Duration> {
        self.last_average
    }
}

impl Default for PerformanceOverlay {
    fn default() -> Self {
        Self::new()
    }
}

impl UiOverlay for PerformanceOverlay {
    fn record(&mut self, _recorder: &mut dyn CommandRecorder, extent: vk::Extent2D) {
        let now = Instant::now();
        if let Some(last) = self.last_frame.replace(now) {
            if let Some(average) = self.add_frame_time(now - last) {
                log::info!(
                    "Frame time {:.3} ms ({:.0} fps) at {}x{}",
                    average.as_secs_f64() * 1000.0,
                    1.0 / average.as_secs_f64(),
                    extent.width,
                    extent.height
                );
            }
        }
    }
}
