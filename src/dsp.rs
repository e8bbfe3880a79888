//! DSP primitives for the signal path — biquad filters, smoothed/automated
//! parameters, a feedback delay line, and a soft-drive waveshaper.
//!
//! Every audible gain or frequency move in the graph goes through `ParamRamp`
//! so values never jump discontinuously between blocks.

use std::collections::VecDeque;
use std::f32::consts::PI;

// ── Automated parameter ──────────────────────────────────────────────────────

/// A control value that can be set immediately, ramped linearly to a value at
/// an absolute time, or eased exponentially toward a target with a time
/// constant. Times are in seconds on the owning graph's sample clock.
#[derive(Debug, Clone)]
pub struct ParamRamp {
    value: f32,
    /// Pending linear breakpoints: (end_time, end_value), ascending.
    events: VecDeque<(f64, f32)>,
    /// Anchor of the current linear segment.
    seg_time: f64,
    seg_value: f32,
    /// Exponential approach: (start_time, target, time_constant).
    target: Option<(f64, f32, f32)>,
}

impl ParamRamp {
    pub fn new(initial: f32) -> Self {
        ParamRamp {
            value: initial,
            events: VecDeque::new(),
            seg_time: 0.0,
            seg_value: initial,
            target: None,
        }
    }

    /// Current value (as of the last `advance`).
    pub fn value(&self) -> f32 {
        self.value
    }

    /// Set immediately, discarding anything scheduled.
    pub fn set(&mut self, v: f32) {
        self.value = v;
        self.seg_value = v;
        self.events.clear();
        self.target = None;
    }

    /// Drop all scheduled moves, holding the current value.
    pub fn cancel_scheduled(&mut self, now: f64) {
        self.events.clear();
        self.target = None;
        self.seg_time = now;
        self.seg_value = self.value;
    }

    /// Ramp linearly from wherever the schedule leaves off to `v` at `end`.
    /// Ramps scheduled out of order are clamped to run after the last one.
    pub fn linear_ramp_to(&mut self, v: f32, end: f64, now: f64) {
        self.target = None;
        if self.events.is_empty() {
            self.seg_time = now;
            self.seg_value = self.value;
        }
        let last = self.events.back().map(|&(t, _)| t).unwrap_or(self.seg_time);
        self.events.push_back((end.max(last), v));
    }

    /// From `start` onward, ease toward `target` with time constant `tc`.
    /// Linear breakpoints already scheduled keep running until `start`.
    pub fn set_target_at(&mut self, target: f32, tc: f32, start: f64) {
        self.target = Some((start, target, tc.max(1e-4)));
    }

    /// Advance the schedule to `now` (block boundary), integrating over `dt`
    /// seconds, and return the new value.
    pub fn advance(&mut self, now: f64, dt: f64) -> f32 {
        if let Some((start, target, tc)) = self.target {
            if now >= start {
                // Target mode takes over; drop stale breakpoints.
                self.events.clear();
                let k = 1.0 - (-(dt as f32) / tc).exp();
                self.value += (target - self.value) * k;
                self.seg_time = now;
                self.seg_value = self.value;
                return self.value;
            }
        }

        while let Some(&(end, v)) = self.events.front() {
            if now >= end {
                self.seg_time = end;
                self.seg_value = v;
                self.value = v;
                self.events.pop_front();
            } else {
                let span = end - self.seg_time;
                if span <= 0.0 {
                    self.value = v;
                } else {
                    let x = ((now - self.seg_time) / span).clamp(0.0, 1.0) as f32;
                    self.value = self.seg_value + (v - self.seg_value) * x;
                }
                return self.value;
            }
        }
        self.value
    }

    /// True if any ramp or target is still pending.
    pub fn is_scheduled(&self) -> bool {
        !self.events.is_empty() || self.target.is_some()
    }
}

// ── Biquad filters ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default)]
struct BiquadState {
    x1: f32,
    x2: f32,
    y1: f32,
    y2: f32,
}

impl BiquadState {
    fn process(&mut self, x: f32, c: &Coeffs) -> f32 {
        let y = c.b0 * x + c.b1 * self.x1 + c.b2 * self.x2 - c.a1 * self.y1 - c.a2 * self.y2;
        self.x2 = self.x1;
        self.x1 = x;
        self.y2 = self.y1;
        self.y1 = y;
        y
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Coeffs {
    b0: f32,
    b1: f32,
    b2: f32,
    a1: f32,
    a2: f32,
}

impl Coeffs {
    pub fn lowpass(freq: f32, q: f32, sample_rate: f32) -> Self {
        let (_, cos_w0, alpha) = prewarp(freq, q, sample_rate);
        let b1 = 1.0 - cos_w0;
        let b0 = b1 / 2.0;
        normalize(b0, b1, b0, 1.0 + alpha, -2.0 * cos_w0, 1.0 - alpha)
    }

    pub fn highpass(freq: f32, q: f32, sample_rate: f32) -> Self {
        let (_, cos_w0, alpha) = prewarp(freq, q, sample_rate);
        let b0 = (1.0 + cos_w0) / 2.0;
        normalize(
            b0,
            -(1.0 + cos_w0),
            b0,
            1.0 + alpha,
            -2.0 * cos_w0,
            1.0 - alpha,
        )
    }

    pub fn bandpass(freq: f32, q: f32, sample_rate: f32) -> Self {
        let (_, cos_w0, alpha) = prewarp(freq, q, sample_rate);
        normalize(alpha, 0.0, -alpha, 1.0 + alpha, -2.0 * cos_w0, 1.0 - alpha)
    }

    pub fn highshelf(freq: f32, gain_db: f32, sample_rate: f32) -> Self {
        let a = 10f32.powf(gain_db / 40.0);
        let (w0, cos_w0, _) = prewarp(freq, 0.707, sample_rate);
        // Shelf slope S = 1.
        let alpha = w0.sin() / 2.0 * (2.0f32).sqrt();
        let two_sqrt_a_alpha = 2.0 * a.sqrt() * alpha;
        let b0 = a * ((a + 1.0) + (a - 1.0) * cos_w0 + two_sqrt_a_alpha);
        let b1 = -2.0 * a * ((a - 1.0) + (a + 1.0) * cos_w0);
        let b2 = a * ((a + 1.0) + (a - 1.0) * cos_w0 - two_sqrt_a_alpha);
        let a0 = (a + 1.0) - (a - 1.0) * cos_w0 + two_sqrt_a_alpha;
        let a1 = 2.0 * ((a - 1.0) - (a + 1.0) * cos_w0);
        let a2 = (a + 1.0) - (a - 1.0) * cos_w0 - two_sqrt_a_alpha;
        normalize(b0, b1, b2, a0, a1, a2)
    }
}

fn prewarp(freq: f32, q: f32, sample_rate: f32) -> (f32, f32, f32) {
    let w0 = 2.0 * PI * freq.clamp(10.0, sample_rate * 0.45) / sample_rate;
    let cos_w0 = w0.cos();
    let alpha = w0.sin() / (2.0 * q.max(0.001));
    (w0, cos_w0, alpha)
}

fn normalize(b0: f32, b1: f32, b2: f32, a0: f32, a1: f32, a2: f32) -> Coeffs {
    Coeffs {
        b0: b0 / a0,
        b1: b1 / a0,
        b2: b2 / a0,
        a1: a1 / a0,
        a2: a2 / a0,
    }
}

/// A stereo biquad. Coefficients are shared, filter state is per channel.
#[derive(Debug, Clone)]
pub struct Biquad {
    coeffs: Coeffs,
    left: BiquadState,
    right: BiquadState,
}

impl Biquad {
    pub fn new(coeffs: Coeffs) -> Self {
        Biquad {
            coeffs,
            left: BiquadState::default(),
            right: BiquadState::default(),
        }
    }

    pub fn set_coeffs(&mut self, coeffs: Coeffs) {
        self.coeffs = coeffs;
    }

    pub fn process(&mut self, l: f32, r: f32) -> (f32, f32) {
        (
            self.left.process(l, &self.coeffs),
            self.right.process(r, &self.coeffs),
        )
    }

    pub fn process_mono(&mut self, x: f32) -> f32 {
        self.left.process(x, &self.coeffs)
    }
}

// ── One-pole low-pass ────────────────────────────────────────────────────────

/// First-order low-pass smoother, one state per channel.
#[derive(Debug, Clone)]
pub struct OnePole {
    a: f32,
    yl: f32,
    yr: f32,
}

impl OnePole {
    pub fn new(cutoff: f32, sample_rate: f32) -> Self {
        let a = 1.0 - (-2.0 * PI * cutoff / sample_rate).exp();
        OnePole {
            a,
            yl: 0.0,
            yr: 0.0,
        }
    }

    pub fn process(&mut self, l: f32, r: f32) -> (f32, f32) {
        self.yl += self.a * (l - self.yl);
        self.yr += self.a * (r - self.yr);
        (self.yl, self.yr)
    }
}

// ── Delay line ───────────────────────────────────────────────────────────────

/// Stereo feedback delay used for the echo send.
#[derive(Debug, Clone)]
pub struct DelayLine {
    buf_l: Vec<f32>,
    buf_r: Vec<f32>,
    pos: usize,
    delay_samples: usize,
}

impl DelayLine {
    pub fn new(max_secs: f32, delay_secs: f32, sample_rate: f32) -> Self {
        let cap = ((max_secs * sample_rate) as usize).max(1);
        let delay = ((delay_secs * sample_rate) as usize).clamp(1, cap);
        DelayLine {
            buf_l: vec![0.0; cap],
            buf_r: vec![0.0; cap],
            pos: 0,
            delay_samples: delay,
        }
    }

    /// Feed one input frame, returning the delayed frame. `feedback` is the
    /// fraction of the delayed output recirculated into the line.
    pub fn process(&mut self, l: f32, r: f32, feedback: f32) -> (f32, f32) {
        let read = (self.pos + self.buf_l.len() - self.delay_samples) % self.buf_l.len();
        let dl = self.buf_l[read];
        let dr = self.buf_r[read];
        self.buf_l[self.pos] = l + dl * feedback;
        self.buf_r[self.pos] = r + dr * feedback;
        self.pos = (self.pos + 1) % self.buf_l.len();
        (dl, dr)
    }

    pub fn clear(&mut self) {
        self.buf_l.fill(0.0);
        self.buf_r.fill(0.0);
    }
}

// ── Soft drive ───────────────────────────────────────────────────────────────

/// Waveshaper `((1+k)x)/(1+k|x|)` with `k = amount * 100`.
pub fn drive_sample(x: f32, amount: f32) -> f32 {
    let k = amount.max(0.0) * 100.0;
    ((1.0 + k) * x) / (1.0 + k * x.abs())
}

// ── Tests ────────────────────────────────────────────────────────────────────
