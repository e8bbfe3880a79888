//! The signal path — every audio node the scanner touches, in one owned
//! struct.
//!
//! Topology (mirroring the tuner front panel):
//!
//! ```text
//! noise ─ HP ─ BP ─ LP ─ noiseGain ┐
//! stream ─ HP ─ LP ─ shelf ─ drive ─ radioGain ┤→ sum ─ dry ──┐
//! click ───────────────────────────┘   sum ─ echo ─ wet ──────┤→ ring-mod → master
//! ```
//!
//! The graph lives behind an `Arc<Mutex<_>>`; the output thread locks it once
//! per block via `PathSource`, the control thread locks it briefly to
//! schedule ramps. All parameter moves go through `ParamRamp`, so nothing
//! the control thread does can click.

use crate::dsp::{Biquad, Coeffs, DelayLine, ParamRamp, drive_sample};
use crate::noise::{BurstEnvelope, NOISE_BED, NoiseGenerator, click_transient};
use crate::params::EffectParameters;
use crate::ringmod::RingModEffect;
use crate::squelch::SquelchMonitor;
use rodio::Source;
use std::collections::VecDeque;
use std::sync::mpsc::{Receiver, SyncSender, TrySendError};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Frames per processing block (~11 ms at 48 kHz).
pub const BLOCK_FRAMES: usize = 512;

pub struct SignalPath {
    sample_rate: u32,
    clock_frames: u64,
    params: Arc<EffectParameters>,

    noise: NoiseGenerator,

    stream_rx: Option<Receiver<Vec<f32>>>,
    stream_pending: VecDeque<f32>,
    radio_hp: Biquad,
    radio_lp: Biquad,
    radio_shelf: Biquad,
    radio_hp_freq: ParamRamp,
    radio_lp_freq: ParamRamp,
    radio_shelf_db: ParamRamp,
    drive_amount: f32,
    radio_gain: ParamRamp,

    echo: DelayLine,
    click: Option<(Vec<f32>, usize)>,
    ringmod: RingModEffect,

    squelch: SquelchMonitor,
    squelch_sum: f64,
    squelch_count: usize,
    squelch_window: usize,

    record_tx: Option<SyncSender<Vec<f32>>>,
    master_level: f32,
}

impl SignalPath {
    pub fn new(sample_rate: u32, params: Arc<EffectParameters>, squelch: SquelchMonitor) -> Self {
        let sr = sample_rate as f32;
        SignalPath {
            sample_rate,
            clock_frames: 0,
            params,
            noise: NoiseGenerator::new(sample_rate),
            stream_rx: None,
            stream_pending: VecDeque::new(),
            radio_hp: Biquad::new(Coeffs::highpass(320.0, 0.7, sr)),
            radio_lp: Biquad::new(Coeffs::lowpass(3400.0, 0.7, sr)),
            radio_shelf: Biquad::new(Coeffs::highshelf(2500.0, -4.0, sr)),
            radio_hp_freq: ParamRamp::new(320.0),
            radio_lp_freq: ParamRamp::new(3400.0),
            radio_shelf_db: ParamRamp::new(-4.0),
            drive_amount: 0.22,
            radio_gain: ParamRamp::new(1.0),
            echo: DelayLine::new(1.2, 0.34, sr),
            click: None,
            ringmod: RingModEffect::new(sample_rate),
            squelch,
            squelch_sum: 0.0,
            squelch_count: 0,
            // ~50 ms analysis window on the post-filter signal.
            squelch_window: (sr * 0.05) as usize,
            record_tx: None,
            master_level: 0.0,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Graph time in seconds (frames processed so far).
    pub fn now(&self) -> f64 {
        self.clock_frames as f64 / self.sample_rate as f64
    }

    // ── Stream attachment ────────────────────────────────────────────────────

    /// Attach a decoded-frame receiver as the tuned-stream node. The caller
    /// (the scanner) detaches the previous stream first; attach never
    /// silently stacks sources.
    pub fn attach_stream(&mut self, rx: Receiver<Vec<f32>>) {
        self.stream_pending.clear();
        self.stream_rx = Some(rx);
    }

    /// Detach and drop the tuned-stream node, clearing any buffered audio
    /// and the squelch envelope with it.
    pub fn detach_stream(&mut self) {
        self.stream_rx = None;
        self.stream_pending.clear();
        self.squelch.reset();
    }

    /// True while a decoded tap is attached (shaped playback).
    pub fn stream_attached(&self) -> bool {
        self.stream_rx.is_some()
    }

    // ── Scan-burst controls (called by the crossfade sequence) ───────────────

    pub fn trigger_click(&mut self) {
        self.click = Some((click_transient(self.sample_rate), 0));
    }

    /// Ramp the tuned signal to near-silence over ~50 ms.
    pub fn duck_radio(&mut self) {
        let now = self.now();
        self.radio_gain.cancel_scheduled(now);
        self.radio_gain.linear_ramp_to(1e-4, now + 0.05, now);
    }

    /// Ease the tuned signal back to unity starting `delay` seconds from now.
    pub fn restore_radio_after(&mut self, delay: f64) {
        let now = self.now();
        self.radio_gain.set_target_at(1.0, 0.08, now + delay);
    }

    pub fn schedule_burst(&mut self, env: &BurstEnvelope) {
        let now = self.now();
        self.noise.schedule_burst(env, now);
    }

    /// Ease the noise back down to the bed starting `delay` seconds from now.
    pub fn settle_noise_after(&mut self, delay: f64) {
        let now = self.now();
        self.noise.settle(now + delay);
    }

    /// Power transitions only: jump the noise bed on or fully off.
    pub fn set_noise_bed(&mut self, on: bool) {
        self.noise.set_bed(if on { NOISE_BED } else { 0.0 });
    }

    pub fn noise_gain(&self) -> f32 {
        self.noise.gain_value()
    }

    pub fn radio_gain_value(&self) -> f32 {
        self.radio_gain.value()
    }

    /// Small random perturbation of the radio shaping per tuned station, so
    /// every stop on the dial has its own timbre.
    pub fn apply_auto_profile(&mut self) {
        let now = self.now();
        self.radio_hp_freq
            .set_target_at(260.0 + fastrand::f32() * 160.0, 0.08, now);
        self.radio_lp_freq
            .set_target_at(2800.0 + fastrand::f32() * 1400.0, 0.08, now);
        self.radio_shelf_db
            .set_target_at(-(2.0 + fastrand::f32() * 5.0), 0.1, now);
        self.drive_amount = 0.16 + fastrand::f32() * 0.12;
    }

    // ── Recording tap ────────────────────────────────────────────────────────

    pub fn set_record_sink(&mut self, tx: Option<SyncSender<Vec<f32>>>) {
        self.record_tx = tx;
    }

    pub fn recording_tapped(&self) -> bool {
        self.record_tx.is_some()
    }

    // ── Processing ───────────────────────────────────────────────────────────

    /// Render one block of interleaved stereo into `out`.
    pub fn process_block(&mut self, out: &mut Vec<f32>) {
        let frames = BLOCK_FRAMES;
        let now = self.now();
        let dt = frames as f64 / self.sample_rate as f64;
        let sr = self.sample_rate as f32;

        self.noise.begin_block(now, dt);
        let radio_gain = self.radio_gain.advance(now, dt);
        let hp_f = self.radio_hp_freq.advance(now, dt);
        let lp_f = self.radio_lp_freq.advance(now, dt);
        let shelf_db = self.radio_shelf_db.advance(now, dt);
        self.radio_hp.set_coeffs(Coeffs::highpass(hp_f, 0.7, sr));
        self.radio_lp.set_coeffs(Coeffs::lowpass(lp_f, 0.7, sr));
        self.radio_shelf
            .set_coeffs(Coeffs::highshelf(2500.0, shelf_db, sr));

        self.ringmod.set_enabled(self.params.ringmod_enabled());
        self.ringmod
            .begin_block(self.params.ringmod_level(), dt);

        let echo_amount = self.params.echo();
        let echo_wet = echo_amount * 0.9;
        let echo_fb = (echo_amount * 0.6).min(0.6);

        // Master volume eases over ~30 ms so knob moves never zipper.
        let master_target = self.params.volume();
        let master_k = 1.0 - (-(dt as f32) / 0.03).exp();
        self.master_level += (master_target - self.master_level) * master_k;

        self.refill_stream_buffer(frames);
        let shaped = self.stream_rx.is_some();

        out.clear();
        out.reserve(frames * 2);
        for _ in 0..frames {
            let (mut rl, mut rr) = (0.0, 0.0);
            if shaped {
                rl = self.stream_pending.pop_front().unwrap_or(0.0);
                rr = self.stream_pending.pop_front().unwrap_or(0.0);
                let (l, r) = self.radio_hp.process(rl, rr);
                let (l, r) = self.radio_lp.process(l, r);
                let (l, r) = self.radio_shelf.process(l, r);
                rl = drive_sample(l, self.drive_amount);
                rr = drive_sample(r, self.drive_amount);

                // Post-filter energy feeds the squelch envelope; measured
                // before the duck gain so a switch does not read as silence.
                self.squelch_sum += (rl as f64) * (rl as f64);
                self.squelch_count += 1;
                if self.squelch_count >= self.squelch_window {
                    let rms = (self.squelch_sum / self.squelch_count as f64).sqrt() as f32;
                    self.squelch.update(rms);
                    self.squelch_sum = 0.0;
                    self.squelch_count = 0;
                }

                rl *= radio_gain;
                rr *= radio_gain;
            }

            let n = self.noise.sample();
            let mut c = 0.0;
            let mut click_done = false;
            if let Some((buf, pos)) = &mut self.click {
                c = buf[*pos];
                *pos += 1;
                click_done = *pos >= buf.len();
            }
            if click_done {
                self.click = None;
            }

            let sum_l = rl + n + c;
            let sum_r = rr + n + c;
            let (dl, dr) = self.echo.process(sum_l, sum_r, echo_fb);
            let (ml, mr) = self
                .ringmod
                .process(sum_l + dl * echo_wet, sum_r + dr * echo_wet);

            out.push(ml * self.master_level);
            out.push(mr * self.master_level);
        }

        self.clock_frames += frames as u64;

        let mut tap_gone = false;
        if let Some(tx) = &self.record_tx {
            if let Err(TrySendError::Disconnected(_)) = tx.try_send(out.clone()) {
                tap_gone = true;
            }
        }
        if tap_gone {
            self.record_tx = None;
        }
    }

    /// Top the pending stream buffer up to one block, draining the attach
    /// channel. Underruns leave silence; the watchdog deals with stalls.
    fn refill_stream_buffer(&mut self, frames: usize) {
        let Some(rx) = &self.stream_rx else {
            return;
        };
        let wanted = frames * 2;
        while self.stream_pending.len() < wanted {
            match rx.try_recv() {
                Ok(chunk) => self.stream_pending.extend(chunk),
                Err(_) => break,
            }
        }
        // Cap latency: never hold more than ~4 blocks of lookahead.
        let cap = wanted * 4;
        while self.stream_pending.len() > cap {
            self.stream_pending.pop_front();
        }
    }
}

// ── rodio adapter ────────────────────────────────────────────────────────────

/// Pulls blocks from the shared graph on the output thread. Infinite: the
/// graph always renders, even when nothing is tuned (that is the noise bed).
pub struct PathSource {
    shared: Arc<Mutex<SignalPath>>,
    buf: Vec<f32>,
    pos: usize,
    sample_rate: u32,
}

impl PathSource {
    pub fn new(shared: Arc<Mutex<SignalPath>>) -> Self {
        let sample_rate = shared.lock().unwrap().sample_rate();
        PathSource {
            shared,
            buf: Vec::new(),
            pos: 0,
            sample_rate,
        }
    }
}

impl Iterator for PathSource {
    type Item = f32;

    fn next(&mut self) -> Option<f32> {
        if self.pos >= self.buf.len() {
            self.shared.lock().unwrap().process_block(&mut self.buf);
            self.pos = 0;
        }
        let s = self.buf[self.pos];
        self.pos += 1;
        Some(s)
    }
}

impl Source for PathSource {
    fn current_frame_len(&self) -> Option<usize> {
        None
    }

    fn channels(&self) -> u16 {
        2
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn total_duration(&self) -> Option<Duration> {
        None
    }
}
