//! Shared control parameters.
//!
//! One `EffectParameters` instance is created per session and shared between
//! the control surface (the only writer), the control thread, and the audio
//! thread. Continuous values are stored as f32 bits in `AtomicU32`, toggles
//! as `AtomicBool`, so readers on the audio thread never see torn values.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

macro_rules! level_field {
    ($get:ident, $set:ident) => {
        pub fn $get(&self) -> f32 {
            f32::from_bits(self.$get.load(Ordering::Relaxed))
        }

        pub fn $set(&self, v: f32) {
            self.$get
                .store(v.clamp(0.0, 1.0).to_bits(), Ordering::Relaxed);
        }
    };
}

/// Continuous controls are all normalized to `[0, 1]`; each component derives
/// its own engineering units from them at the point of use.
pub struct EffectParameters {
    speed: AtomicU32,
    volume: AtomicU32,
    echo: AtomicU32,
    burst: AtomicU32,
    ringmod_level: AtomicU32,
    squelch_sensitivity: AtomicU32,
    squelch_hold: AtomicU32,
    advance_jitter: AtomicU32,
    auto_scan: AtomicBool,
    slow_scan: AtomicBool,
    squelch_enabled: AtomicBool,
    ringmod_enabled: AtomicBool,
}

impl EffectParameters {
    pub fn new() -> Self {
        EffectParameters {
            speed: AtomicU32::new(0.45f32.to_bits()),
            volume: AtomicU32::new(0.9f32.to_bits()),
            echo: AtomicU32::new(0.3f32.to_bits()),
            burst: AtomicU32::new(0.4f32.to_bits()),
            ringmod_level: AtomicU32::new(0.5f32.to_bits()),
            squelch_sensitivity: AtomicU32::new(0.5f32.to_bits()),
            squelch_hold: AtomicU32::new(0.5f32.to_bits()),
            advance_jitter: AtomicU32::new(0.0f32.to_bits()),
            auto_scan: AtomicBool::new(false),
            slow_scan: AtomicBool::new(false),
            squelch_enabled: AtomicBool::new(false),
            ringmod_enabled: AtomicBool::new(false),
        }
    }

    level_field!(speed, set_speed);
    level_field!(volume, set_volume);
    level_field!(echo, set_echo);
    level_field!(burst, set_burst);
    level_field!(ringmod_level, set_ringmod_level);
    level_field!(squelch_sensitivity, set_squelch_sensitivity);
    level_field!(squelch_hold, set_squelch_hold);
    level_field!(advance_jitter, set_advance_jitter);

    pub fn auto_scan(&self) -> bool {
        self.auto_scan.load(Ordering::Relaxed)
    }

    pub fn set_auto_scan(&self, on: bool) {
        self.auto_scan.store(on, Ordering::Relaxed);
    }

    pub fn slow_scan(&self) -> bool {
        self.slow_scan.load(Ordering::Relaxed)
    }

    pub fn set_slow_scan(&self, on: bool) {
        self.slow_scan.store(on, Ordering::Relaxed);
    }

    pub fn squelch_enabled(&self) -> bool {
        self.squelch_enabled.load(Ordering::Relaxed)
    }

    pub fn set_squelch_enabled(&self, on: bool) {
        self.squelch_enabled.store(on, Ordering::Relaxed);
    }

    pub fn ringmod_enabled(&self) -> bool {
        self.ringmod_enabled.load(Ordering::Relaxed)
    }

    pub fn set_ringmod_enabled(&self, on: bool) {
        self.ringmod_enabled.store(on, Ordering::Relaxed);
    }
}

impl Default for EffectParameters {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn defaults_match_reference_panel() {
        let p = EffectParameters::new();
        assert_eq!(p.speed(), 0.45);
        assert_eq!(p.volume(), 0.9);
        assert_eq!(p.echo(), 0.3);
        assert_eq!(p.burst(), 0.4);
        assert!(!p.auto_scan());
        assert!(!p.squelch_enabled());
    }

    #[test]
    fn values_clamp_to_unit_range() {
        let p = EffectParameters::new();
        p.set_volume(1.7);
        assert_eq!(p.volume(), 1.0);
        p.set_speed(-0.5);
        assert_eq!(p.speed(), 0.0);
    }

    #[test]
    fn readable_across_threads() {
        let p = Arc::new(EffectParameters::new());
        p.set_burst(0.8);
        let p2 = p.clone();
        let handle = std::thread::spawn(move || p2.burst());
        assert_eq!(handle.join().unwrap(), 0.8);
    }

    #[test]
    fn toggles_flip() {
        let p = EffectParameters::new();
        p.set_squelch_enabled(true);
        assert!(p.squelch_enabled());
        p.set_squelch_enabled(false);
        assert!(!p.squelch_enabled());
    }
}
