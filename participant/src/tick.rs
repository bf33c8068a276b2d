use std::time::Duration;

/// Converts elapsed frame time into a number of fixed ticks, carrying the
/// remainder over to the next frame.
#[derive(Clone, Debug)]
pub struct FixedTimestep {
    interval: Duration,
    accumulated: Duration,
    max_ticks_per_frame: u32,
}

impl FixedTimestep {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            accumulated: Duration::ZERO,
            max_ticks_per_frame: u32::MAX,
        }
    }

    /// Caps the ticks a single frame may run. Time beyond the cap is
    /// dropped rather than carried, so a long stall does not cause a burst.
    pub fn with_max_ticks_per_frame(mut self, max_ticks_per_frame: u32) -> Self {
        self.max_ticks_per_frame = max_ticks_per_frame.max(1);
        self
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Adds `elapsed` and returns how many fixed ticks are due
    pub fn advance(&mut self, elapsed: Duration) -> u32 {
        if self.interval.is_zero() {
            return 1;
        }
        self.accumulated += elapsed;
        let mut due = 0;
        while self.accumulated >= self.interval {
            self.accumulated -= self.interval;
            due += 1;
            if due == self.max_ticks_per_frame {
                self.accumulated = Duration::ZERO;
                break;
            }
        }
        due
    }

    /// Fraction of the next tick already accumulated, in `[0, 1)`
    pub fn alpha(&self) -> f32 {
        if self.interval.is_zero() {
            return 0.0;
        }
        self.accumulated.as_secs_f32() / self.interval.as_secs_f32()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::FixedTimestep;

    #[test]
    fn carries_remainder_between_frames() {
        let mut timestep = FixedTimestep::new(Duration::from_millis(20));

        assert_eq!(timestep.advance(Duration::from_millis(15)), 0);
        assert_eq!(timestep.advance(Duration::from_millis(15)), 1);
        assert_eq!(timestep.advance(Duration::from_millis(50)), 2);
        assert!(timestep.alpha() > 0.49 && timestep.alpha() < 0.51);
    }

    #[test]
    fn caps_ticks_per_frame() {
        let mut timestep =
            FixedTimestep::new(Duration::from_millis(10)).with_max_ticks_per_frame(3);

        assert_eq!(timestep.advance(Duration::from_secs(1)), 3);
        assert_eq!(timestep.advance(Duration::from_millis(5)), 0);
    }
}
