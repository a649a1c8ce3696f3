//! Fixed-timestep pacing for Tether's loops.
//!
//! The simulation loop and every connection driver run at a fixed rate.
//! A [`Ticker`] owns the deadline arithmetic: it sleeps until the next
//! tick is due, detects overruns, and skips ahead rather than replaying
//! missed ticks — a loop that falls behind must not death-spiral.
//!
//! ```ignore
//! let mut ticker = Ticker::new(TickConfig::with_rate(30));
//! loop {
//!     let tick = ticker.wait().await;
//!     dispatcher.run_pending(&mut world, MAX_JOBS_PER_TICK);
//!     update(&mut world, tick.dt);
//! }
//! ```

use std::time::Duration;

use rand::Rng;
use tokio::time::{self, Instant};
use tracing::{debug, warn};

/// Highest supported tick rate.
pub const MAX_RATE_HZ: u32 = 240;

/// Configuration for a [`Ticker`].
#[derive(Debug, Clone)]
pub struct TickConfig {
    /// Tick rate in Hz, clamped to `1..=MAX_RATE_HZ`.
    pub rate_hz: u32,
    /// Random delay (0–max µs) added before the first tick so loops
    /// started in the same instant don't all fire together.
    pub initial_jitter_us: u64,
}

impl Default for TickConfig {
    fn default() -> Self {
        Self {
            rate_hz: 30,
            initial_jitter_us: 2_000,
        }
    }
}

impl TickConfig {
    /// Config for a specific rate with default jitter.
    pub fn with_rate(rate_hz: u32) -> Self {
        Self {
            rate_hz,
            ..Default::default()
        }
    }

    /// Clamps out-of-range values so the config is safe to use.
    pub fn validated(mut self) -> Self {
        if self.rate_hz == 0 {
            warn!("tick rate 0 is not supported, using 1 Hz");
            self.rate_hz = 1;
        }
        if self.rate_hz > MAX_RATE_HZ {
            warn!(rate = self.rate_hz, max = MAX_RATE_HZ, "tick rate clamped");
            self.rate_hz = MAX_RATE_HZ;
        }
        self
    }

    /// Duration of one tick.
    pub fn tick_duration(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.rate_hz))
    }
}

/// One completed wait, returned by [`Ticker::wait`].
#[derive(Debug, Clone)]
pub struct TickInfo {
    /// Monotonically increasing tick number, starting at 1.
    pub tick: u64,
    /// Fixed timestep — always `1 / rate_hz`, never wall-clock elapsed.
    pub dt: Duration,
    /// Whether this tick fired noticeably late.
    pub overrun: bool,
    /// Ticks skipped to catch up after the overrun.
    pub skipped: u64,
}

/// Fixed-timestep pacer. One per loop.
pub struct Ticker {
    dt: Duration,
    count: u64,
    skipped_total: u64,
    next: Instant,
}

impl Ticker {
    /// Creates a pacer; the first tick fires one period (plus jitter)
    /// from now.
    pub fn new(config: TickConfig) -> Self {
        let config = config.validated();
        let dt = config.tick_duration();
        let jitter = if config.initial_jitter_us > 0 {
            Duration::from_micros(rand::rng().random_range(0..config.initial_jitter_us))
        } else {
            Duration::ZERO
        };
        debug!(rate_hz = config.rate_hz, "ticker created");
        Self {
            dt,
            count: 0,
            skipped_total: 0,
            next: Instant::now() + dt + jitter,
        }
    }

    /// Sleeps until the next tick is due.
    pub async fn wait(&mut self) -> TickInfo {
        time::sleep_until(self.next).await;

        let now = Instant::now();
        self.count += 1;

        let late_by = now.saturating_duration_since(self.next);
        let overrun = late_by > self.dt / 10;
        let mut skipped = 0u64;
        if overrun {
            skipped = (late_by.as_nanos() / self.dt.as_nanos()) as u64;
            if skipped > 0 {
                self.skipped_total += skipped;
                warn!(
                    tick = self.count,
                    skipped,
                    late_ms = late_by.as_secs_f64() * 1000.0,
                    "tick overrun, skipping ahead"
                );
            }
            // Reschedule from now, not from the missed deadline.
            self.next = now + self.dt;
        } else {
            self.next += self.dt;
        }

        TickInfo {
            tick: self.count,
            dt: self.dt,
            overrun,
            skipped,
        }
    }

    /// Ticks completed so far.
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Total ticks skipped over the pacer's lifetime.
    pub fn skipped_total(&self) -> u64 {
        self.skipped_total
    }

    /// The fixed timestep.
    pub fn dt(&self) -> Duration {
        self.dt
    }
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_clamps_rate() {
        assert_eq!(TickConfig::with_rate(0).validated().rate_hz, 1);
        assert_eq!(TickConfig::with_rate(999).validated().rate_hz, MAX_RATE_HZ);
        assert_eq!(TickConfig::with_rate(60).validated().rate_hz, 60);
    }

    #[test]
    fn test_tick_duration() {
        let cfg = TickConfig::with_rate(50);
        assert_eq!(cfg.tick_duration(), Duration::from_millis(20));
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticks_are_numbered_and_fixed_dt() {
        let mut ticker = Ticker::new(TickConfig {
            rate_hz: 20,
            initial_jitter_us: 0,
        });
        let a = ticker.wait().await;
        let b = ticker.wait().await;
        assert_eq!(a.tick, 1);
        assert_eq!(b.tick, 2);
        assert_eq!(a.dt, Duration::from_millis(50));
        assert_eq!(b.dt, Duration::from_millis(50));
        assert!(!a.overrun);
    }

    #[tokio::test(start_paused = true)]
    async fn test_overrun_skips_ahead() {
        let mut ticker = Ticker::new(TickConfig {
            rate_hz: 100,
            initial_jitter_us: 0,
        });
        ticker.wait().await;

        // Simulate a stall three ticks long.
        tokio::time::advance(Duration::from_millis(35)).await;
        let info = ticker.wait().await;
        assert!(info.overrun);
        assert!(info.skipped >= 2, "skipped {}", info.skipped);
        assert_eq!(ticker.skipped_total(), info.skipped);

        // The pacer recovers: the next tick is on time again.
        let next = ticker.wait().await;
        assert!(!next.overrun);
    }
}
