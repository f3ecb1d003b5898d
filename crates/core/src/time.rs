use std::time::{Duration, Instant};

/// Timing of one pumped frame.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct FrameTime {
    /// Seconds since the previous frame, as fed to the update step.
    pub dt: f64,

    /// Seconds since the pump started, summed from `dt`.
    pub elapsed: f64,

    /// Zero-based frame counter.
    pub frame_index: u64,
}

/// Wall-clock source of frame deltas.
///
/// Deltas are clamped so a stall (debugger break, minimized window) does not
/// turn into one huge animation step, and a tight loop never reports zero.
#[derive(Debug, Clone)]
pub struct FrameClock {
    last: Instant,
    frame_index: u64,
    elapsed: f64,
    dt_min: Duration,
    dt_max: Duration,
}

impl FrameClock {
    /// A clock clamping deltas to 100µs..250ms.
    pub fn new() -> Self {
        Self::with_clamps(Duration::from_micros(100), Duration::from_millis(250))
    }

    pub fn with_clamps(dt_min: Duration, dt_max: Duration) -> Self {
        debug_assert!(dt_min <= dt_max);
        Self {
            last: Instant::now(),
            frame_index: 0,
            elapsed: 0.0,
            dt_min,
            dt_max,
        }
    }

    /// Restarts delta measurement from now, e.g. after a long load.
    pub fn reset(&mut self) {
        self.last = Instant::now();
    }

    pub fn tick(&mut self) -> FrameTime {
        let now = Instant::now();
        let dt = now
            .saturating_duration_since(self.last)
            .clamp(self.dt_min, self.dt_max);
        self.last = now;
        self.advance(dt.as_secs_f64())
    }

    /// Records a frame of exactly `dt` seconds without reading the wall clock.
    pub fn advance(&mut self, dt: f64) -> FrameTime {
        self.elapsed += dt;
        let ft = FrameTime {
            dt,
            elapsed: self.elapsed,
            frame_index: self.frame_index,
        };
        self.frame_index = self.frame_index.wrapping_add(1);
        ft
    }
}

impl Default for FrameClock {
    fn default() -> Self {
        Self::new()
    }
}
