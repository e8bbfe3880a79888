//! Stall watchdog for the tuned stream.
//!
//! Live streams sometimes wedge in a buffering loop without erroring: the
//! player keeps "playing" but the position stops moving, or snaps backward
//! when the buffer resets. The watchdog polls the playback position on a
//! fixed tick and reports exactly one trip per stall so the scanner can
//! resynchronize the same station instead of waiting out the auto-advance.

use std::time::{Duration, Instant};

/// Timing knobs, constructor-injected so tests can run at millisecond scale.
#[derive(Debug, Clone, Copy)]
pub struct WatchdogConfig {
    /// Poll cadence once armed.
    pub poll: Duration,
    /// Extra delay before the first poll, to let startup buffering finish.
    pub first_delay: Duration,
    /// Wall-clock time without forward progress that counts as a stall.
    pub stall_after: Duration,
    /// Minimum positional advance (seconds) that counts as progress.
    pub epsilon: f64,
    /// Backward jump (seconds) treated as an immediate buffer reset.
    pub backward: f64,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        WatchdogConfig {
            poll: Duration::from_millis(500),
            first_delay: Duration::from_millis(800),
            stall_after: Duration::from_millis(2500),
            epsilon: 0.05,
            backward: 0.25,
        }
    }
}

/// Last observed progress point.
#[derive(Debug, Clone, Copy)]
struct WatchdogSample {
    at: Instant,
    position: f64,
}

/// One monitor per active tuning; dropped (disarmed) on every station switch
/// or power-off so a stale instance can never fire against a new stream.
pub struct WatchdogMonitor {
    cfg: WatchdogConfig,
    station: usize,
    last: WatchdogSample,
    next_poll: Instant,
    tripped: bool,
}

impl WatchdogMonitor {
    /// Arm for the station at `station_index`, starting the clock at `now`.
    pub fn arm(cfg: WatchdogConfig, station_index: usize, now: Instant) -> Self {
        WatchdogMonitor {
            cfg,
            station: station_index,
            last: WatchdogSample {
                at: now,
                position: 0.0,
            },
            next_poll: now + cfg.first_delay,
            tripped: false,
        }
    }

    /// The station index this monitor was armed against. Callers must check
    /// it still matches the current tuning before acting on a trip.
    pub fn station(&self) -> usize {
        self.station
    }

    /// Feed the current playback position. Returns `true` exactly once, when
    /// a stall or backward jump is detected.
    pub fn tick(&mut self, now: Instant, position: f64) -> bool {
        if self.tripped || now < self.next_poll {
            return false;
        }
        self.next_poll = now + self.cfg.poll;

        if position > self.last.position + self.cfg.epsilon {
            self.last = WatchdogSample { at: now, position };
            return false;
        }
        if position < self.last.position - self.cfg.backward {
            self.tripped = true;
            return true;
        }
        if now.duration_since(self.last.at) > self.cfg.stall_after {
            self.tripped = true;
            return true;
        }
        false
    }
}
