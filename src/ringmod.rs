//! Parallel ring-modulation branch.
//!
//! Two additive paths, both scaled by one intensity control and toggled
//! independently of the scan logic: the summed signal ring-modulated against
//! a fixed 5.5 kHz carrier then smoothed by a one-pole low-pass, and a small
//! bank of slow amplitude-modulated sine oscillators that add a faint beating
//! texture underneath.

use std::f32::consts::TAU;

/// Fixed carrier for the primary path.
const CARRIER_HZ: f32 = 5500.0;
/// One-pole smoothing cutoff applied to the modulated signal.
const SMOOTH_HZ: f32 = 2300.0;
/// Wet level of the primary path at full intensity.
const WET_MAX: f32 = 0.5;
/// Per-oscillator level of the tone bed at full intensity.
const BANK_OSC_LEVEL: f32 = 0.0045;

/// Reference oscillator-bank frequencies.
const BANK_HZ: [f32; 5] = [1700.0, 2300.0, 3100.0, 5000.0, 8500.0];

struct BankOsc {
    phase: f32,
    step: f32,
    lfo_phase: f32,
    lfo_step: f32,
}

pub struct RingModEffect {
    sample_rate: f32,
    enabled: bool,
    carrier_phase: f32,
    carrier_step: f32,
    smooth_a: f32,
    smooth_l: f32,
    smooth_r: f32,
    bank: Vec<BankOsc>,
    // Current block levels, eased toward their targets each block so toggling
    // never clicks.
    wet: f32,
    bank_level: f32,
}

impl RingModEffect {
    pub fn new(sample_rate: u32) -> Self {
        let sample_rate = sample_rate as f32;
        let bank = BANK_HZ
            .iter()
            .map(|&hz| BankOsc {
                phase: fastrand::f32() * TAU,
                step: TAU * hz / sample_rate,
                // Each oscillator breathes at its own rate in 0.2–1.8 Hz.
                lfo_phase: fastrand::f32() * TAU,
                lfo_step: TAU * (0.2 + fastrand::f32() * 1.6) / sample_rate,
            })
            .collect();
        RingModEffect {
            sample_rate,
            enabled: false,
            carrier_phase: 0.0,
            carrier_step: TAU * CARRIER_HZ / sample_rate,
            smooth_a: 1.0 - (-TAU * SMOOTH_HZ / sample_rate).exp(),
            smooth_l: 0.0,
            smooth_r: 0.0,
            bank,
            wet: 0.0,
            bank_level: 0.0,
        }
    }

    /// Toggle the branch. Disabling only starts the wet ramp toward zero;
    /// the oscillators keep running until the ramp lands, then reset.
    pub fn set_enabled(&mut self, on: bool) {
        self.enabled = on;
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// True once a disable has fully faded and the oscillators are parked.
    pub fn is_silent(&self) -> bool {
        !self.enabled && self.wet <= 1e-5 && self.bank_level <= 1e-5
    }

    /// Ease block levels toward the intensity-derived targets.
    pub fn begin_block(&mut self, intensity: f32, dt: f64) {
        let i = intensity.clamp(0.0, 1.0);
        let (wet_target, bank_target) = if self.enabled {
            (i * WET_MAX, i)
        } else {
            (0.0, 0.0)
        };
        // ~40 ms ease, independent of block size.
        let k = 1.0 - (-(dt as f32) / 0.04).exp();
        self.wet += (wet_target - self.wet) * k;
        self.bank_level += (bank_target - self.bank_level) * k;
        if self.is_silent() {
            self.park();
        }
    }

    fn park(&mut self) {
        self.wet = 0.0;
        self.bank_level = 0.0;
        self.smooth_l = 0.0;
        self.smooth_r = 0.0;
        self.carrier_phase = 0.0;
    }

    /// Process one frame of the summed signal, returning the frame with both
    /// wet paths added in.
    pub fn process(&mut self, l: f32, r: f32) -> (f32, f32) {
        if self.wet <= 1e-5 && self.bank_level <= 1e-5 {
            return (l, r);
        }

        let carrier = self.carrier_phase.sin();
        self.carrier_phase += self.carrier_step;
        if self.carrier_phase >= TAU {
            self.carrier_phase -= TAU;
        }
        self.smooth_l += self.smooth_a * (l * carrier - self.smooth_l);
        self.smooth_r += self.smooth_a * (r * carrier - self.smooth_r);

        let mut bed = 0.0;
        for osc in &mut self.bank {
            let am = 0.35 + 0.65 * (osc.lfo_phase.sin() * 0.5 + 0.5);
            bed += osc.phase.sin() * am * BANK_OSC_LEVEL;
            osc.phase += osc.step;
            if osc.phase >= TAU {
                osc.phase -= TAU;
            }
            osc.lfo_phase += osc.lfo_step;
            if osc.lfo_phase >= TAU {
                osc.lfo_phase -= TAU;
            }
        }
        bed *= self.bank_level;

        (
            l + self.smooth_l * self.wet + bed,
            r + self.smooth_r * self.wet + bed,
        )
    }

    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_blocks(fx: &mut RingModEffect, intensity: f32, blocks: usize) -> f32 {
        let mut peak_delta = 0.0f32;
        for _ in 0..blocks {
            fx.begin_block(intensity, 0.005);
            for n in 0..240 {
                let x = (TAU * 440.0 * n as f32 / 48_000.0).sin() * 0.5;
                let (l, _) = fx.process(x, x);
                peak_delta = peak_delta.max((l - x).abs());
            }
        }
        peak_delta
    }

    #[test]
    fn disabled_branch_is_transparent() {
        let mut fx = RingModEffect::new(48_000);
        let delta = run_blocks(&mut fx, 1.0, 20);
        assert_eq!(delta, 0.0);
    }

    #[test]
    fn enabled_branch_adds_signal() {
        let mut fx = RingModEffect::new(48_000);
        fx.set_enabled(true);
        let delta = run_blocks(&mut fx, 1.0, 40);
        assert!(delta > 0.001, "wet path added nothing (delta {})", delta);
    }

    #[test]
    fn zero_intensity_is_nearly_silent() {
        let mut fx = RingModEffect::new(48_000);
        fx.set_enabled(true);
        let delta = run_blocks(&mut fx, 0.0, 40);
        assert!(delta < 1e-3, "delta {} at zero intensity", delta);
    }

    #[test]
    fn disable_ramps_down_then_parks() {
        let mut fx = RingModEffect::new(48_000);
        fx.set_enabled(true);
        run_blocks(&mut fx, 1.0, 40);
        assert!(!fx.is_silent());

        fx.set_enabled(false);
        // First blocks after disable still carry a decaying wet tail.
        let early = run_blocks(&mut fx, 1.0, 2);
        assert!(early > 0.0);
        run_blocks(&mut fx, 1.0, 200);
        assert!(fx.is_silent());
        let after = run_blocks(&mut fx, 1.0, 5);
        assert_eq!(after, 0.0);
    }

    #[test]
    fn reenable_recovers() {
        let mut fx = RingModEffect::new(48_000);
        fx.set_enabled(true);
        run_blocks(&mut fx, 1.0, 40);
        fx.set_enabled(false);
        run_blocks(&mut fx, 1.0, 200);
        fx.set_enabled(true);
        let delta = run_blocks(&mut fx, 1.0, 40);
        assert!(delta > 0.001);
    }
}
