//! Squelch gate — defers scanning while the tuned signal sounds like speech.
//!
//! The audio thread feeds window RMS readings into a shared `SquelchMonitor`
//! (an atomic, like the level meters elsewhere); the control thread polls the
//! smoothed envelope against a sensitivity-derived threshold and maintains a
//! hold-until deadline the scheduler consults before every advance.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};

/// Exponential smoothing: 90% previous envelope, 10% new window.
const ENVELOPE_DECAY: f32 = 0.9;

/// Shared decaying energy envelope of the post-filter tuned signal.
/// Updated on the audio thread, read by the control thread.
#[derive(Clone)]
pub struct SquelchMonitor {
    envelope: Arc<AtomicU32>,
}

impl SquelchMonitor {
    pub fn new() -> Self {
        SquelchMonitor {
            envelope: Arc::new(AtomicU32::new(0)),
        }
    }

    /// Fold one analysis-window RMS value into the envelope.
    pub fn update(&self, rms: f32) {
        let prev = f32::from_bits(self.envelope.load(Ordering::Relaxed));
        let next = prev * ENVELOPE_DECAY + rms * (1.0 - ENVELOPE_DECAY);
        self.envelope.store(next.to_bits(), Ordering::Relaxed);
    }

    pub fn envelope(&self) -> f32 {
        f32::from_bits(self.envelope.load(Ordering::Relaxed))
    }

    /// Zero the envelope (station switch, power off).
    pub fn reset(&self) {
        self.envelope.store(0, Ordering::Relaxed);
    }
}

impl Default for SquelchMonitor {
    fn default() -> Self {
        Self::new()
    }
}

/// RMS threshold for a sensitivity control value: higher sensitivity listens
/// harder, i.e. trips at a lower level.
pub fn threshold_for(sensitivity: f32) -> f32 {
    0.02 + (1.0 - sensitivity.clamp(0.0, 1.0)) * 0.18
}

/// Hold duration for a hold-length control value (0.4–3.5 s).
pub fn hold_for(hold: f32) -> Duration {
    Duration::from_secs_f32(0.4 + hold.clamp(0.0, 1.0) * 3.1)
}

/// Control-side gate state: the hold-until deadline.
pub struct SquelchGate {
    monitor: SquelchMonitor,
    hold_until: Option<Instant>,
}

impl SquelchGate {
    pub fn new(monitor: SquelchMonitor) -> Self {
        SquelchGate {
            monitor,
            hold_until: None,
        }
    }

    pub fn monitor(&self) -> &SquelchMonitor {
        &self.monitor
    }

    /// Poll the envelope. `active` is false when squelch is switched off or
    /// the signal path has no analyzable tap (unshaped mode) — the gate is
    /// then inert and any pending hold is dropped.
    pub fn poll(&mut self, now: Instant, sensitivity: f32, hold: f32, active: bool) {
        if !active {
            self.hold_until = None;
            return;
        }
        if self.monitor.envelope() > threshold_for(sensitivity) {
            self.hold_until = Some(now + hold_for(hold));
        }
    }

    /// True while an advance should be deferred.
    pub fn holding(&self, now: Instant) -> bool {
        self.hold_until.map(|t| now < t).unwrap_or(false)
    }

    /// Drop any pending hold (power off, station switch).
    pub fn clear(&mut self) {
        self.hold_until = None;
    }
}
