//! Broadband noise source and scan-burst synthesis.
//!
//! A looping buffer of uniform noise feeds a high-pass → band-pass → low-pass
//! shaping chain and a smoothed gain stage. Between stations the gain and the
//! band-pass center frequency follow a `BurstEnvelope` — a short swept swell
//! that masks the dead air of the actual stream change — then ease back down
//! to the quiet noise bed.

use crate::dsp::{Biquad, Coeffs, ParamRamp};

/// Resting gain of the noise bed while a station plays.
pub const NOISE_BED: f32 = 0.006;

/// Time constant used when the burst gain eases back to the bed.
pub const SETTLE_TC: f32 = 0.12;

/// Burst length in milliseconds for a given intensity control value.
pub fn burst_ms(intensity: f32) -> u64 {
    (120.0 + intensity.clamp(0.0, 1.0) * 520.0).round() as u64
}

/// Peak-gain ceiling for a given intensity control value.
pub fn burst_gain(intensity: f32) -> f32 {
    (0.08 + intensity.clamp(0.0, 1.0) * 0.32).min(0.40)
}

/// Everything one scan transition needs: shaping-filter settings, the
/// three-point frequency glissando, and the attack/wobble gain breakpoints.
/// Created per transition, consumed by `NoiseGenerator::schedule_burst`,
/// then discarded.
#[derive(Debug, Clone)]
pub struct BurstEnvelope {
    pub duration: f32,
    pub target_gain: f32,
    pub bandpass_q: f32,
    pub lowpass_hz: f32,
    pub highpass_hz: f32,
    /// (offset seconds, band-pass center Hz), ascending.
    pub freq_points: Vec<(f64, f32)>,
    /// (offset seconds, gain), ascending. Never exceeds `target_gain`.
    pub gain_points: Vec<(f64, f32)>,
}

impl BurstEnvelope {
    /// Synthesize a randomized envelope for the given intensity in `[0, 1]`.
    ///
    /// Higher intensity means a longer, louder, narrower-band burst with less
    /// per-step frequency jitter; low intensity gives a short wide hiss that
    /// wanders more.
    pub fn synthesize(intensity: f32) -> Self {
        let i = intensity.clamp(0.0, 1.0);
        let duration = burst_ms(i) as f32 / 1000.0;
        let target_gain = burst_gain(i);

        let f_start = 800.0 + fastrand::f32() * 800.0;
        let f_mid = 1300.0 + fastrand::f32() * 1500.0;
        let f_end = 1800.0 + fastrand::f32() * 1800.0;
        let steps = ((duration * 10.0) as usize).max(4);
        let jitter_span = 80.0 + 380.0 * (1.0 - i);

        let mut freq_points = Vec::with_capacity(steps + 1);
        for n in 0..=steps {
            let t = (duration * n as f32 / steps as f32) as f64;
            let x = n as f32 / steps as f32;
            let f = if x < 0.6 {
                f_start + (f_mid - f_start) * (x / 0.6)
            } else {
                f_mid + (f_end - f_mid) * ((x - 0.6) / 0.4)
            };
            let jitter = (fastrand::f32() * 2.0 - 1.0) * jitter_span;
            freq_points.push((t, (f + jitter).max(300.0)));
        }

        let attack = (duration * 0.22).min(0.05);
        let mut gain_points = vec![(
            attack as f64,
            target_gain * (0.42 + 0.12 * fastrand::f32()),
        )];
        let wobbles = ((duration / 0.1) as usize).max(2);
        for n in 1..=wobbles {
            let t = attack + (duration - attack) * n as f32 / wobbles as f32;
            let level = target_gain * (0.38 + 0.22 * fastrand::f32());
            gain_points.push((t as f64, level));
        }

        BurstEnvelope {
            duration,
            target_gain,
            bandpass_q: 0.35 + i * 0.45,
            lowpass_hz: 4200.0 + i * 1600.0,
            highpass_hz: 160.0 + i * 180.0,
            freq_points,
            gain_points,
        }
    }
}

/// The noise source itself: loop buffer, shaping chain, smoothed gain.
pub struct NoiseGenerator {
    sample_rate: f32,
    buffer: Vec<f32>,
    pos: usize,
    hp: Biquad,
    bp: Biquad,
    lp: Biquad,
    bp_freq: ParamRamp,
    bp_q: f32,
    lp_freq: ParamRamp,
    hp_freq: ParamRamp,
    gain: ParamRamp,
    block_gain: f32,
}

impl NoiseGenerator {
    pub fn new(sample_rate: u32) -> Self {
        let sample_rate = sample_rate as f32;
        // Two seconds of uniform noise, looped; long enough that the loop
        // point is not audible under the shaping chain.
        let len = (sample_rate * 2.0) as usize;
        let mut buffer = Vec::with_capacity(len);
        for _ in 0..len {
            buffer.push((fastrand::f32() * 2.0 - 1.0) * 0.9);
        }
        NoiseGenerator {
            sample_rate,
            buffer,
            pos: 0,
            hp: Biquad::new(Coeffs::highpass(160.0, 0.7, sample_rate)),
            bp: Biquad::new(Coeffs::bandpass(1800.0, 0.55, sample_rate)),
            lp: Biquad::new(Coeffs::lowpass(5200.0, 0.3, sample_rate)),
            bp_freq: ParamRamp::new(1800.0),
            bp_q: 0.55,
            lp_freq: ParamRamp::new(5200.0),
            hp_freq: ParamRamp::new(160.0),
            gain: ParamRamp::new(0.0),
            block_gain: 0.0,
        }
    }

    /// Jump the gain straight to a bed level. Only used while the graph is
    /// suspended (power on/off), where a step cannot click.
    pub fn set_bed(&mut self, level: f32) {
        self.gain.set(level);
    }

    pub fn gain_value(&self) -> f32 {
        self.gain.value()
    }

    /// Queue a burst starting at graph time `now`.
    pub fn schedule_burst(&mut self, env: &BurstEnvelope, now: f64) {
        self.bp_q = env.bandpass_q;
        self.lp_freq.set_target_at(env.lowpass_hz, 0.08, now);
        self.hp_freq.set_target_at(env.highpass_hz, 0.08, now);

        self.bp_freq.cancel_scheduled(now);
        for &(t, f) in &env.freq_points {
            self.bp_freq.linear_ramp_to(f, now + t, now);
        }

        self.gain.cancel_scheduled(now);
        for &(t, g) in &env.gain_points {
            self.gain.linear_ramp_to(g, now + t, now);
        }
    }

    /// From graph time `at` onward, ease the gain back to the noise bed.
    pub fn settle(&mut self, at: f64) {
        self.gain.set_target_at(NOISE_BED, SETTLE_TC, at);
    }

    /// Advance ramps and refresh filter coefficients for the next block.
    pub fn begin_block(&mut self, now: f64, dt: f64) {
        let bp_f = self.bp_freq.advance(now, dt);
        let lp_f = self.lp_freq.advance(now, dt);
        let hp_f = self.hp_freq.advance(now, dt);
        self.bp
            .set_coeffs(Coeffs::bandpass(bp_f, self.bp_q, self.sample_rate));
        self.lp
            .set_coeffs(Coeffs::lowpass(lp_f, 0.3, self.sample_rate));
        self.hp
            .set_coeffs(Coeffs::highpass(hp_f, 0.7, self.sample_rate));
        self.block_gain = self.gain.advance(now, dt);
    }

    /// One mono sample of shaped noise at the current block gain.
    pub fn sample(&mut self) -> f32 {
        let raw = self.buffer[self.pos];
        self.pos = (self.pos + 1) % self.buffer.len();
        let x = self.hp.process_mono(raw);
        let x = self.bp.process_mono(x);
        let x = self.lp.process_mono(x);
        x * self.block_gain
    }
}

/// Precomputed percussive click played when the tuner steps — 12 ms of noise
/// under a 12th-power decay at the reference level.
pub fn click_transient(sample_rate: u32) -> Vec<f32> {
    let len = ((sample_rate as f32 * 0.012) as usize).max(1);
    let mut out = Vec::with_capacity(len);
    for n in 0..len {
        let decay = (1.0 - n as f32 / len as f32).powi(12);
        out.push((fastrand::f32() * 2.0 - 1.0) * decay * 0.28);
    }
    out
}
