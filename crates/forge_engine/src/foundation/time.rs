//! Frame clock for the render loop
//!
//! Deltas are clamped to [`MAX_FRAME_DELTA`], so a frame that follows a stall
//! moves the camera by at most that many seconds' worth.

use std::time::{Duration, Instant};

/// Longest frame delta handed to per-frame updates, in seconds
pub const MAX_FRAME_DELTA: f32 = 0.1;

/// Measures frame deltas and the average frame rate
#[derive(Debug, Clone)]
pub struct FrameClock {
    started: Instant,
    last_tick: Instant,
    paused: Duration,
    delta: f32,
    frames: u64,
}

impl Default for FrameClock {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameClock {
    /// Start a clock now
    pub fn new() -> Self {
        Self::starting_at(Instant::now())
    }

    /// Start a clock at `now`
    pub fn starting_at(now: Instant) -> Self {
        Self {
            started: now,
            last_tick: now,
            paused: Duration::ZERO,
            delta: 0.0,
            frames: 0,
        }
    }

    /// Count a frame and return its clamped delta in seconds
    pub fn tick(&mut self) -> f32 {
        self.tick_at(Instant::now())
    }

    /// Count a frame ending at `now`
    pub fn tick_at(&mut self, now: Instant) -> f32 {
        let raw = now.saturating_duration_since(self.last_tick).as_secs_f32();
        self.delta = raw.min(MAX_FRAME_DELTA);
        self.last_tick = now;
        self.frames += 1;
        self.delta
    }

    /// Skip the time spent blocked (e.g. waiting on events while minimised)
    ///
    /// The skipped span counts neither towards the next delta nor the average rate.
    pub fn resume(&mut self) {
        self.resume_at(Instant::now());
    }

    /// Skip the time between the last tick and `now`
    pub fn resume_at(&mut self, now: Instant) {
        self.paused += now.saturating_duration_since(self.last_tick);
        self.last_tick = now;
    }

    /// Delta returned by the last tick
    pub fn delta(&self) -> f32 {
        self.delta
    }

    /// Frames counted so far
    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Frames per second over the running (unpaused) time up to the last tick
    #[allow(clippy::cast_precision_loss)]
    pub fn average_fps(&self) -> f32 {
        let running = self
            .last_tick
            .saturating_duration_since(self.started)
            .saturating_sub(self.paused)
            .as_secs_f32();
        if running > 0.0 {
            self.frames as f32 / running
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_delta_follows_frame_time() {
        let start = Instant::now();
        let mut clock = FrameClock::starting_at(start);

        assert_relative_eq!(clock.tick_at(start + Duration::from_millis(16)), 0.016, epsilon = 1e-6);
        assert_relative_eq!(clock.tick_at(start + Duration::from_millis(50)), 0.034, epsilon = 1e-6);
        assert_eq!(clock.frames(), 2);
    }

    #[test]
    fn test_long_frames_are_clamped() {
        let start = Instant::now();
        let mut clock = FrameClock::starting_at(start);

        assert_eq!(clock.tick_at(start + Duration::from_secs(3)), MAX_FRAME_DELTA);
        assert_eq!(clock.delta(), MAX_FRAME_DELTA);
    }

    #[test]
    fn test_resume_skips_blocked_time() {
        let start = Instant::now();
        let mut clock = FrameClock::starting_at(start);
        clock.tick_at(start + Duration::from_millis(450));

        clock.resume_at(start + Duration::from_secs(10));
        let delta = clock.tick_at(start + Duration::from_millis(10_050));
        assert_relative_eq!(delta, 0.05, epsilon = 1e-6);

        // Two frames over half a second of running time
        assert_relative_eq!(clock.average_fps(), 4.0, epsilon = 1e-3);
    }

    #[test]
    fn test_fresh_clock_reports_zero_fps() {
        assert_eq!(FrameClock::new().average_fps(), 0.0);
    }
}
