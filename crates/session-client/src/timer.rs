use rand::rngs::StdRng;
use rand::Rng;

/// A tick-driven timer: `now` is the client's own tick counter, not wall
/// clock time, so tests can drive it deterministically without sleeping.
#[derive(Debug, Clone, Copy)]
pub struct Timer {
    pub after: u64,
    pub attempts: u32,
    pub ticking: bool,
    pub start_tick: u64,
}

impl Timer {
    pub fn new(after: u64) -> Self {
        Self {
            after,
            attempts: 0,
            ticking: false,
            start_tick: 0,
        }
    }

    pub fn fired(&self, now: u64) -> bool {
        self.ticking && now.saturating_sub(self.start_tick) >= self.after
    }

    pub fn start(&mut self, now: u64) {
        self.ticking = true;
        self.start_tick = now;
    }

    pub fn stop(&mut self) {
        self.ticking = false;
        self.attempts = 0;
    }

    /// Doubles `after` (capped at `max_after`) with +/-12.5% jitter and bumps
    /// `attempts`, then restarts the timer at `now`. Used for the
    /// request_timeout's exponential backoff; `ping_timeout` never calls this.
    pub fn backoff(&mut self, now: u64, max_after: u64, rng: &mut StdRng) {
        self.attempts += 1;
        let doubled = self.after.saturating_mul(2).min(max_after);
        let jitter_span = (doubled / 8).max(1);
        let jitter = rng.gen_range(0..=jitter_span * 2) as i64 - jitter_span as i64;
        self.after = (doubled as i64 + jitter).clamp(1, max_after as i64) as u64;
        self.start(now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn not_fired_until_started() {
        let t = Timer::new(10);
        assert!(!t.fired(100));
    }

    #[test]
    fn fires_after_elapsed_ticks() {
        let mut t = Timer::new(10);
        t.start(5);
        assert!(!t.fired(14));
        assert!(t.fired(15));
        assert!(t.fired(100));
    }

    #[test]
    fn stop_resets_attempts_and_clears_ticking() {
        let mut t = Timer::new(10);
        t.start(0);
        t.attempts = 3;
        t.stop();
        assert!(!t.ticking);
        assert_eq!(t.attempts, 0);
        assert!(!t.fired(1000));
    }

    #[test]
    fn backoff_roughly_doubles_and_caps() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut t = Timer::new(100);
        t.start(0);
        t.backoff(0, 1000, &mut rng);
        assert_eq!(t.attempts, 1);
        assert!(t.after >= 175 && t.after <= 225, "after={}", t.after);

        for _ in 0..10 {
            t.backoff(0, 1000, &mut rng);
        }
        assert!(t.after <= 1000);
    }
}
