// fixed-rate pacing: frames that miss their slot are dropped, not replayed

use std::thread;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct FrameClock {
    interval: Option<Duration>,
    deadline: Instant,
}

impl FrameClock {
    pub fn new(target_fps: u32, start: Instant) -> Self {
        let interval = match target_fps {
            0 => None,
            fps => Some(Duration::from_nanos(1_000_000_000 / u64::from(fps))),
        };
        FrameClock {
            interval,
            deadline: start,
        }
    }

    pub fn interval(&self) -> Option<Duration> {
        self.interval
    }

    /// Advances to the next frame slot and returns how long to wait for it.
    pub fn tick(&mut self, now: Instant) -> Duration {
        let interval = match self.interval {
            Some(interval) => interval,
            None => return Duration::default(),
        };

        let next = self.deadline + interval;
        self.deadline = if next < now { now } else { next };
        self.deadline - now
    }

    pub fn wait(&mut self) {
        let remaining = self.tick(Instant::now());
        if remaining > Duration::default() {
            thread::sleep(remaining);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn uncapped_never_waits() {
        let start = Instant::now();
        let mut clock = FrameClock::new(0, start);
        assert_eq!(clock.interval(), None);
        assert_eq!(clock.tick(start), Duration::default());
        assert_eq!(clock.tick(start + ms(1)), Duration::default());
    }

    #[test]
    fn sixty_fps_interval() {
        let clock = FrameClock::new(60, Instant::now());
        assert_eq!(clock.interval(), Some(Duration::from_nanos(16_666_666)));
    }

    #[test]
    fn fast_frame_waits_for_the_rest_of_its_slot() {
        let start = Instant::now();
        let mut clock = FrameClock::new(100, start);
        assert_eq!(clock.tick(start + ms(4)), ms(6));
    }

    #[test]
    fn slow_frame_drops_the_missed_slot() {
        let start = Instant::now();
        let mut clock = FrameClock::new(100, start);

        assert_eq!(clock.tick(start + ms(35)), Duration::default());
        // rebased on the late frame, not on the original schedule
        assert_eq!(clock.tick(start + ms(36)), ms(9));
    }

    #[test]
    fn steady_state_keeps_the_schedule() {
        let start = Instant::now();
        let mut clock = FrameClock::new(100, start);

        assert_eq!(clock.tick(start + ms(2)), ms(8));
        assert_eq!(clock.tick(start + ms(13)), ms(7));
        assert_eq!(clock.tick(start + ms(30)), ms(0));
    }
}
