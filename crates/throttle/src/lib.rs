//! Adaptive HTTP concurrency controller.
//!
//! Watches response latency in bursts and steers the permitted number of
//! concurrent requests toward the highest value the target server tolerates
//! without visible strain. The ceiling is single-writer: only the throttle's
//! observer mutates it; the HTTP layer just reads it to bound outstanding
//! requests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::debug;

/// Tunables for the adjustment rule.
///
/// Back off aggressively on signs of server strain, recover cautiously to
/// avoid oscillation.
#[derive(Clone, Debug)]
pub struct ThrottleConfig {
    /// Mean burst response time at or above which the ceiling is lowered.
    pub threshold: Duration,
    /// How much to lower the ceiling on a slow burst.
    pub step_down: usize,
    /// How much to raise the ceiling on a fast burst.
    pub step_up: usize,
    /// Floor the ceiling never drops below.
    pub minimum: usize,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            threshold: Duration::from_secs(1),
            step_down: 2,
            step_up: 1,
            minimum: 1,
        }
    }
}

/// The shared concurrency ceiling.
///
/// Read by the HTTP layer, written only by [`AdaptiveThrottle::observe`].
#[derive(Debug)]
pub struct Ceiling {
    current: AtomicUsize,
    maximum: usize,
    minimum: usize,
}

impl Ceiling {
    fn new(initial: usize, minimum: usize) -> Self {
        let minimum = minimum.max(1);
        Self {
            current: AtomicUsize::new(initial.max(minimum)),
            maximum: initial.max(minimum),
            minimum,
        }
    }

    /// Currently permitted number of concurrent requests.
    pub fn current(&self) -> usize {
        self.current.load(Ordering::Relaxed)
    }

    /// Operator-configured maximum (the original ceiling).
    pub fn maximum(&self) -> usize {
        self.maximum
    }

    /// Operator-configured minimum.
    pub fn minimum(&self) -> usize {
        self.minimum
    }

    fn store(&self, value: usize) {
        self.current.store(value, Ordering::Relaxed);
    }
}

#[derive(Debug, Default)]
struct Burst {
    count: usize,
    total: Duration,
}

/// Latency-driven controller for the request ceiling.
pub struct AdaptiveThrottle {
    ceiling: Arc<Ceiling>,
    config: ThrottleConfig,
    burst: Mutex<Burst>,
}

impl AdaptiveThrottle {
    /// `initial` becomes both the starting ceiling and the hard maximum.
    pub fn new(initial: usize, config: ThrottleConfig) -> Self {
        let ceiling = Arc::new(Ceiling::new(initial, config.minimum));
        Self {
            ceiling,
            config,
            burst: Mutex::new(Burst::default()),
        }
    }

    /// Handle the HTTP layer reads its request bound from.
    pub fn ceiling(&self) -> Arc<Ceiling> {
        Arc::clone(&self.ceiling)
    }

    /// Completed responses observed in the burst window so far.
    pub fn burst_response_count(&self) -> usize {
        self.burst.lock().count
    }

    /// Mean response time of the burst window so far.
    pub fn burst_average_response_time(&self) -> Duration {
        let burst = self.burst.lock();
        if burst.count == 0 {
            Duration::ZERO
        } else {
            burst.total / burst.count as u32
        }
    }

    /// Completion hook the HTTP client invokes once per finished request.
    ///
    /// Every `current ceiling` completions close a burst; the burst's mean
    /// response time decides the adjustment.
    pub fn observe(&self, response_time: Duration) {
        let mean = {
            let mut burst = self.burst.lock();
            burst.count += 1;
            burst.total += response_time;
            if burst.count < self.ceiling.current().max(1) {
                return;
            }
            let mean = burst.total / burst.count as u32;
            *burst = Burst::default();
            mean
        };
        self.adjust(mean);
    }

    /// Observer closure to hand to the HTTP client's `on_complete` hook.
    pub fn observer(self: &Arc<Self>) -> impl Fn(Duration) + Send + Sync + 'static {
        let throttle = Arc::clone(self);
        move |response_time| throttle.observe(response_time)
    }

    fn adjust(&self, mean: Duration) {
        let current = self.ceiling.current();
        if current > self.config.minimum && mean >= self.config.threshold {
            let next = current
                .saturating_sub(self.config.step_down)
                .max(self.config.minimum);
            self.ceiling.store(next);
            debug!(
                target: "throttle",
                mean_ms = mean.as_millis() as u64,
                from = current,
                to = next,
                "server strained, lowering concurrency"
            );
        } else if current < self.ceiling.maximum() && mean < self.config.threshold {
            let next = (current + self.config.step_up).min(self.ceiling.maximum());
            self.ceiling.store(next);
            debug!(
                target: "throttle",
                mean_ms = mean.as_millis() as u64,
                from = current,
                to = next,
                "server healthy, raising concurrency"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast() -> Duration {
        Duration::from_millis(100)
    }

    fn slow() -> Duration {
        Duration::from_millis(1500)
    }

    fn run_burst(throttle: &AdaptiveThrottle, response_time: Duration) {
        let size = throttle.ceiling().current();
        for _ in 0..size {
            throttle.observe(response_time);
        }
    }

    #[test]
    fn fast_bursts_raise_the_ceiling_stepwise() {
        let throttle = AdaptiveThrottle::new(10, ThrottleConfig::default());
        // Pin the starting point below the maximum the way an earlier
        // slow phase would.
        throttle.ceiling.store(2);

        let mut seen = vec![throttle.ceiling().current()];
        for _ in 0..5 {
            run_burst(&throttle, fast());
            seen.push(throttle.ceiling().current());
        }
        assert_eq!(seen, vec![2, 3, 4, 5, 6, 7]);
    }

    #[test]
    fn slow_bursts_lower_the_ceiling_by_the_larger_step() {
        let throttle = AdaptiveThrottle::new(10, ThrottleConfig::default());
        run_burst(&throttle, slow());
        assert_eq!(throttle.ceiling().current(), 8);
        run_burst(&throttle, slow());
        assert_eq!(throttle.ceiling().current(), 6);
    }

    #[test]
    fn ceiling_never_leaves_configured_bounds() {
        let config = ThrottleConfig {
            minimum: 3,
            ..ThrottleConfig::default()
        };
        let throttle = AdaptiveThrottle::new(4, config);

        for _ in 0..10 {
            run_burst(&throttle, slow());
            let current = throttle.ceiling().current();
            assert!(current >= 3);
        }
        assert_eq!(throttle.ceiling().current(), 3);

        for _ in 0..10 {
            run_burst(&throttle, fast());
            let current = throttle.ceiling().current();
            assert!(current <= 4);
        }
        assert_eq!(throttle.ceiling().current(), 4);
    }

    #[test]
    fn burst_resets_after_each_adjustment() {
        let throttle = AdaptiveThrottle::new(2, ThrottleConfig::default());
        throttle.observe(fast());
        assert_eq!(throttle.burst_response_count(), 1);
        assert_eq!(throttle.burst_average_response_time(), fast());
        throttle.observe(fast());
        assert_eq!(throttle.burst_response_count(), 0);
    }

    #[test]
    fn observer_closure_feeds_the_throttle() {
        let throttle = Arc::new(AdaptiveThrottle::new(4, ThrottleConfig::default()));
        throttle.ceiling.store(2);
        let on_complete = throttle.observer();
        for _ in 0..2 {
            on_complete(fast());
        }
        assert_eq!(throttle.ceiling().current(), 3);
    }

    #[test]
    fn at_the_boundary_nothing_changes() {
        // At minimum with slow traffic and at maximum with fast traffic the
        // ceiling holds still.
        let config = ThrottleConfig {
            minimum: 2,
            ..ThrottleConfig::default()
        };
        let throttle = AdaptiveThrottle::new(2, config);
        run_burst(&throttle, slow());
        assert_eq!(throttle.ceiling().current(), 2);
        run_burst(&throttle, fast());
        assert_eq!(throttle.ceiling().current(), 2);
    }
}
