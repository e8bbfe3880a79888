//! Scan scheduler and station-switch sequencing.
//!
//! One `Scanner` owns the scan state machine, the tuned stream, the stall
//! watchdog, and the squelch gate. It is driven by `tick()` from the control
//! thread's loop; every wait lives in a deadline field alongside the state,
//! so power-off can cancel anything mid-flight.
//!
//! The switch protocol around every station change: click transient, ~50 ms
//! duck of the tuned signal, noise-burst swell, a wait overlapping the swell,
//! hard stop of the old stream, cache-busted reopen racing a fixed timeout,
//! then (on success) graph attach, a randomized filter profile, watchdog
//! arm, and the burst tail ramping noise back down and the signal back up.
//! Failures retry the next station, at most once per station per pass.

use crate::catalog::{StationEntry, with_cache_bust};
use crate::graph::SignalPath;
use crate::noise::BurstEnvelope;
use crate::params::EffectParameters;
use crate::squelch::SquelchGate;
use crate::transport::{OPEN_TIMEOUT, PlaybackMode, StreamTransport, TunedStream};
use crate::watchdog::{WatchdogConfig, WatchdogMonitor};
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// How soon a deferred (squelch-held) advance is re-checked.
const SQUELCH_RECHECK: Duration = Duration::from_millis(180);
/// Settle delay between a watchdog trip's hard stop and the reopen.
const RESYNC_SETTLE: Duration = Duration::from_millis(80);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanState {
    Idle,
    Bursting,
    Connecting,
    Playing,
    Holding,
    Resyncing,
    Stopped,
}

impl fmt::Display for ScanState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ScanState::Idle => "idle",
            ScanState::Bursting => "bursting",
            ScanState::Connecting => "connecting",
            ScanState::Playing => "playing",
            ScanState::Holding => "holding",
            ScanState::Resyncing => "resyncing",
            ScanState::Stopped => "stopped",
        };
        write!(f, "{}", name)
    }
}

pub struct Scanner {
    stations: Vec<StationEntry>,
    state: ScanState,
    status: String,

    current: usize,
    target: usize,
    tries: usize,

    transport: Box<dyn StreamTransport>,
    stream: Option<Box<dyn TunedStream>>,
    graph: Arc<Mutex<SignalPath>>,
    params: Arc<EffectParameters>,
    squelch: SquelchGate,
    watchdog: Option<WatchdogMonitor>,
    watchdog_cfg: WatchdogConfig,

    burst_wait_until: Option<Instant>,
    connect_deadline: Option<Instant>,
    resync_reopen_at: Option<Instant>,
    advance_at: Option<Instant>,
    burst_dur: f64,
}

impl Scanner {
    pub fn new(
        stations: Vec<StationEntry>,
        transport: Box<dyn StreamTransport>,
        graph: Arc<Mutex<SignalPath>>,
        params: Arc<EffectParameters>,
        squelch: SquelchGate,
        watchdog_cfg: WatchdogConfig,
    ) -> Self {
        Scanner {
            stations,
            state: ScanState::Idle,
            status: "ready".to_string(),
            current: 0,
            target: 0,
            tries: 0,
            transport,
            stream: None,
            graph,
            params,
            squelch,
            watchdog: None,
            watchdog_cfg,
            burst_wait_until: None,
            connect_deadline: None,
            resync_reopen_at: None,
            advance_at: None,
            burst_dur: 0.0,
        }
    }

    pub fn state(&self) -> ScanState {
        self.state
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    pub fn current_index(&self) -> usize {
        self.current
    }

    pub fn current_station(&self) -> Option<&StationEntry> {
        self.stations.get(self.current)
    }

    /// True while a switch or resync owns the stream — any other switch
    /// request arriving now is dropped, not queued.
    pub fn in_flight(&self) -> bool {
        matches!(
            self.state,
            ScanState::Bursting | ScanState::Connecting | ScanState::Resyncing
        )
    }

    // ── Commands ─────────────────────────────────────────────────────────────

    /// Power on: raise the noise bed and tune the current station.
    pub fn power_on(&mut self, now: Instant) {
        if !matches!(self.state, ScanState::Idle | ScanState::Stopped) {
            return;
        }
        self.graph.lock().unwrap().set_noise_bed(true);
        let start = self.current;
        self.begin_switch(start, 0, now);
    }

    /// Power off from any state: cancel every pending deadline, release the
    /// stream, and silence the noise bed.
    pub fn power_off(&mut self) {
        self.burst_wait_until = None;
        self.connect_deadline = None;
        self.resync_reopen_at = None;
        self.advance_at = None;
        self.watchdog = None;
        self.squelch.clear();
        self.hard_stop_stream();
        let mut g = self.graph.lock().unwrap();
        g.set_noise_bed(false);
        drop(g);
        self.state = ScanState::Stopped;
        self.status = "stopped".to_string();
    }

    /// Manual advance. A no-op while a switch is already in flight.
    pub fn request_advance(&mut self, now: Instant) {
        if self.in_flight() || self.stations.is_empty() {
            return;
        }
        if matches!(self.state, ScanState::Idle | ScanState::Stopped) {
            return;
        }
        let next = self.next_index();
        self.begin_switch(next, 0, now);
    }

    // ── Tick ─────────────────────────────────────────────────────────────────

    pub fn tick(&mut self, now: Instant) {
        match self.state {
            ScanState::Idle | ScanState::Stopped => {}
            ScanState::Bursting => self.tick_bursting(now),
            ScanState::Connecting => self.tick_connecting(now),
            ScanState::Playing | ScanState::Holding => self.tick_playing(now),
            ScanState::Resyncing => self.tick_resyncing(now),
        }
    }

    fn tick_bursting(&mut self, now: Instant) {
        let due = self.burst_wait_until.map(|t| now >= t).unwrap_or(true);
        if !due {
            return;
        }
        self.burst_wait_until = None;

        // The swell has covered the mute; kill the old stream for real so no
        // residual buffered audio survives the swap.
        self.hard_stop_stream();

        let url = with_cache_bust(&self.stations[self.target].url);
        match self.transport.open(&url) {
            Ok(stream) => {
                self.stream = Some(stream);
                self.connect_deadline = Some(now + OPEN_TIMEOUT);
                self.state = ScanState::Connecting;
                self.status = "buffering…".to_string();
            }
            Err(_) => self.fail_current_try(now),
        }
    }

    fn tick_connecting(&mut self, now: Instant) {
        let started = match &mut self.stream {
            Some(s) => s.started(),
            None => false,
        };
        if started {
            self.connect_deadline = None;
            self.tuned_ok(now);
            return;
        }
        let timed_out = self.connect_deadline.map(|t| now >= t).unwrap_or(true);
        if timed_out {
            self.connect_deadline = None;
            self.hard_stop_stream();
            self.fail_current_try(now);
        }
    }

    fn tick_playing(&mut self, now: Instant) {
        // Watchdog: a trip forces a same-station resync, but only if this
        // monitor still belongs to the current tuning.
        let mut trip_station = None;
        if let (Some(wd), Some(stream)) = (&mut self.watchdog, &self.stream) {
            if let Some(pos) = stream.position_secs() {
                if wd.tick(now, pos) {
                    trip_station = Some(wd.station());
                }
            }
        }
        if let Some(station) = trip_station {
            self.watchdog = None;
            if station == self.current {
                self.start_resync(now);
                return;
            }
        }

        // Squelch: only meaningful with an analyzable tap.
        let shaped = self
            .stream
            .as_ref()
            .map(|s| s.mode() == PlaybackMode::Shaped)
            .unwrap_or(false)
            && self.graph.lock().unwrap().stream_attached();
        self.squelch.poll(
            now,
            self.params.squelch_sensitivity(),
            self.params.squelch_hold(),
            self.params.squelch_enabled() && shaped,
        );

        // Auto-advance.
        if !self.params.auto_scan() {
            self.advance_at = None;
            if self.state == ScanState::Holding {
                self.state = ScanState::Playing;
            }
            return;
        }
        if self.advance_at.is_none() {
            self.advance_at = Some(now + self.advance_interval());
        }
        let due = self.advance_at.map(|t| now >= t).unwrap_or(false);
        if !due {
            return;
        }
        if self.squelch.holding(now) {
            // Defer, re-poll soon; the hold keeps extending while voice
            // energy persists.
            self.state = ScanState::Holding;
            self.status = "holding".to_string();
            self.advance_at = Some(now + SQUELCH_RECHECK);
            return;
        }
        self.advance_at = None;
        let next = self.next_index();
        self.begin_switch(next, 0, now);
    }

    fn tick_resyncing(&mut self, now: Instant) {
        if let Some(at) = self.resync_reopen_at {
            if now < at {
                return;
            }
            self.resync_reopen_at = None;
            let url = with_cache_bust(&self.stations[self.current].url);
            match self.transport.open(&url) {
                Ok(stream) => {
                    self.stream = Some(stream);
                    self.connect_deadline = Some(now + OPEN_TIMEOUT);
                }
                Err(_) => {
                    // Resync failed to open: same recovery as a stream-open
                    // failure, counting this station as already tried.
                    let next = self.next_index();
                    self.begin_switch(next, 1, now);
                }
            }
            return;
        }

        let started = match &mut self.stream {
            Some(s) => s.started(),
            None => false,
        };
        if started {
            self.connect_deadline = None;
            self.target = self.current;
            self.tuned_ok(now);
            return;
        }
        let timed_out = self.connect_deadline.map(|t| now >= t).unwrap_or(true);
        if timed_out {
            self.connect_deadline = None;
            self.hard_stop_stream();
            let next = self.next_index();
            self.begin_switch(next, 1, now);
        }
    }

    // ── Switch protocol ──────────────────────────────────────────────────────

    fn begin_switch(&mut self, target: usize, tries: usize, now: Instant) {
        if self.stations.is_empty() || tries >= self.stations.len() {
            self.exhausted();
            return;
        }
        self.target = target;
        self.tries = tries;
        self.state = ScanState::Bursting;
        self.status = "scanning…".to_string();
        self.advance_at = None;

        // Duck whatever is playing. In unshaped mode the graph has no stream
        // node, so the backend's coarse volume does the job instead.
        if let Some(stream) = &mut self.stream {
            if stream.mode() == PlaybackMode::Unshaped {
                stream.set_native_volume(0.0);
            }
        }

        let env = BurstEnvelope::synthesize(self.params.burst());
        self.burst_dur = env.duration as f64;
        {
            let mut g = self.graph.lock().unwrap();
            g.trigger_click();
            g.duck_radio();
            g.schedule_burst(&env);
        }

        // Overlap the mute with the audible swell before swapping streams.
        let wait = Duration::from_secs_f64((self.burst_dur * 0.6).max(0.1));
        self.burst_wait_until = Some(now + wait);
    }

    fn tuned_ok(&mut self, now: Instant) {
        let Some(stream) = &mut self.stream else {
            return;
        };
        let shaped = stream.mode() == PlaybackMode::Shaped;
        let tail = (self.burst_dur * 0.6).max(0.08);
        {
            let mut g = self.graph.lock().unwrap();
            if shaped {
                if let Some(rx) = stream.take_frames() {
                    g.attach_stream(rx);
                }
                g.restore_radio_after(tail);
            }
            g.apply_auto_profile();
            g.settle_noise_after(tail);
        }
        if !shaped {
            stream.set_native_volume(self.params.volume());
        }

        self.current = self.target;
        self.tries = 0;
        self.watchdog = stream
            .position_secs()
            .map(|_| WatchdogMonitor::arm(self.watchdog_cfg, self.current, now));
        self.squelch.clear();
        self.state = ScanState::Playing;
        self.status = if shaped {
            "playing".to_string()
        } else {
            "playing (limited processing)".to_string()
        };
        if self.params.auto_scan() {
            self.advance_at = Some(now + self.advance_interval());
        } else {
            self.advance_at = None;
        }
    }

    fn fail_current_try(&mut self, now: Instant) {
        self.graph.lock().unwrap().settle_noise_after(0.05);
        let next = (self.target + 1) % self.stations.len();
        let tries = self.tries + 1;
        self.begin_switch(next, tries, now);
    }

    fn exhausted(&mut self) {
        self.hard_stop_stream();
        self.burst_wait_until = None;
        self.connect_deadline = None;
        self.resync_reopen_at = None;
        self.advance_at = None;
        self.graph.lock().unwrap().settle_noise_after(0.05);
        self.state = ScanState::Stopped;
        self.status = "no playable stream".to_string();
    }

    fn start_resync(&mut self, now: Instant) {
        self.hard_stop_stream();
        self.state = ScanState::Resyncing;
        self.resync_reopen_at = Some(now + RESYNC_SETTLE);
    }

    fn hard_stop_stream(&mut self) {
        // Detach first so the reader thread can never block on a full queue
        // nobody drains.
        self.graph.lock().unwrap().detach_stream();
        if let Some(mut stream) = self.stream.take() {
            stream.stop();
        }
        self.watchdog = None;
    }

    fn next_index(&self) -> usize {
        (self.current + 1) % self.stations.len().max(1)
    }

    /// Auto-advance interval from the speed control (~250–2500 ms), scaled
    /// ×2.5 in slow mode and jittered by the configured ± fraction.
    fn advance_interval(&self) -> Duration {
        let mut ms = 250.0 + self.params.speed() as f64 * 2250.0;
        if self.params.slow_scan() {
            ms *= 2.5;
        }
        let jitter = self.params.advance_jitter() as f64;
        if jitter > 0.0 {
            ms *= 1.0 + (fastrand::f64() * 2.0 - 1.0) * jitter;
        }
        Duration::from_millis(ms.max(50.0) as u64)
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::squelch::SquelchMonitor;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc::{SyncSender, sync_channel};

    /// Scripted stand-in for the stream backend: per-station behaviors and
    /// an open counter per station.
    #[derive(Clone, Copy, PartialEq)]
    enum Behavior {
        Fail,
        Ok,
        /// Opens, but playback position never advances.
        Stalls,
    }

    struct SimTransport {
        stations: Vec<StationEntry>,
        behavior: Vec<Behavior>,
        opens: Arc<Vec<AtomicUsize>>,
    }

    struct SimStream {
        opened_at: Instant,
        stalls: bool,
        frames_rx: Option<std::sync::mpsc::Receiver<Vec<f32>>>,
        _keep_tx: SyncSender<Vec<f32>>,
    }

    impl StreamTransport for SimTransport {
        fn can_tap_decoded_signal(&self) -> bool {
            true
        }

        fn open(&mut self, url: &str) -> Result<Box<dyn TunedStream>, String> {
            let idx = self
                .stations
                .iter()
                .position(|s| url.starts_with(&s.url))
                .expect("open() for unknown url");
            self.opens[idx].fetch_add(1, Ordering::SeqCst);
            match self.behavior[idx] {
                Behavior::Fail => Err("connection refused".to_string()),
                ok_or_stall => {
                    let (tx, rx) = sync_channel(4);
                    Ok(Box::new(SimStream {
                        opened_at: Instant::now(),
                        stalls: ok_or_stall == Behavior::Stalls,
                        frames_rx: Some(rx),
                        _keep_tx: tx,
                    }))
                }
            }
        }
    }

    impl TunedStream for SimStream {
        fn mode(&self) -> PlaybackMode {
            PlaybackMode::Shaped
        }

        fn take_frames(&mut self) -> Option<std::sync::mpsc::Receiver<Vec<f32>>> {
            self.frames_rx.take()
        }

        fn started(&mut self) -> bool {
            true
        }

        fn position_secs(&self) -> Option<f64> {
            if self.stalls {
                Some(0.0)
            } else {
                Some(self.opened_at.elapsed().as_secs_f64())
            }
        }

        fn set_native_volume(&mut self, _volume: f32) {}

        fn stop(&mut self) {}
    }

    fn stations(n: usize) -> Vec<StationEntry> {
        (0..n)
            .map(|i| StationEntry {
                name: format!("S{}", i),
                url: format!("https://station-{}.example/stream", i),
            })
            .collect()
    }

    fn fast_watchdog() -> WatchdogConfig {
        WatchdogConfig {
            poll: Duration::from_millis(10),
            first_delay: Duration::from_millis(10),
            stall_after: Duration::from_millis(60),
            epsilon: 0.05,
            backward: 0.25,
        }
    }

    fn make_scanner(
        behavior: Vec<Behavior>,
    ) -> (Scanner, Arc<Vec<AtomicUsize>>, Arc<EffectParameters>, SquelchMonitor) {
        let list = stations(behavior.len());
        let opens: Arc<Vec<AtomicUsize>> =
            Arc::new((0..behavior.len()).map(|_| AtomicUsize::new(0)).collect());
        let transport = SimTransport {
            stations: list.clone(),
            behavior,
            opens: opens.clone(),
        };
        let params = Arc::new(EffectParameters::new());
        params.set_burst(0.0); // shortest bursts: 100 ms switch waits
        let monitor = SquelchMonitor::new();
        let graph = Arc::new(Mutex::new(SignalPath::new(
            48_000,
            params.clone(),
            monitor.clone(),
        )));
        let scanner = Scanner::new(
            list,
            Box::new(transport),
            graph,
            params.clone(),
            SquelchGate::new(monitor.clone()),
            fast_watchdog(),
        );
        (scanner, opens, params, monitor)
    }

    fn pump(scanner: &mut Scanner, millis: u64) {
        let end = Instant::now() + Duration::from_millis(millis);
        while Instant::now() < end {
            scanner.tick(Instant::now());
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    fn pump_until_settled(scanner: &mut Scanner, millis: u64) {
        let end = Instant::now() + Duration::from_millis(millis);
        while Instant::now() < end {
            scanner.tick(Instant::now());
            if matches!(scanner.state(), ScanState::Playing | ScanState::Stopped) {
                return;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn first_failure_advances_to_next_station() {
        let (mut sc, opens, _params, _m) = make_scanner(vec![Behavior::Fail, Behavior::Ok, Behavior::Ok]);
        sc.power_on(Instant::now());
        assert_eq!(sc.state(), ScanState::Bursting);
        pump_until_settled(&mut sc, 2000);

        assert_eq!(sc.state(), ScanState::Playing);
        assert_eq!(sc.current_index(), 1, "should have landed on station B");
        assert_eq!(opens[0].load(Ordering::SeqCst), 1);
        assert_eq!(opens[1].load(Ordering::SeqCst), 1);
        assert_eq!(opens[2].load(Ordering::SeqCst), 0);
        assert_eq!(sc.status(), "playing");
    }

    #[test]
    fn all_failing_stations_exhaust_exactly_once_each() {
        let (mut sc, opens, _params, _m) =
            make_scanner(vec![Behavior::Fail, Behavior::Fail, Behavior::Fail]);
        sc.power_on(Instant::now());
        pump_until_settled(&mut sc, 3000);

        assert_eq!(sc.state(), ScanState::Stopped);
        assert_eq!(sc.status(), "no playable stream");
        for o in opens.iter() {
            assert_eq!(o.load(Ordering::SeqCst), 1, "station retried within one pass");
        }
    }

    #[test]
    fn advance_requests_are_single_flight() {
        let (mut sc, opens, _params, _m) = make_scanner(vec![Behavior::Ok, Behavior::Ok]);
        let t0 = Instant::now();
        sc.power_on(t0);
        assert!(sc.in_flight());
        // Hammer advance while the first switch is still bursting: all drop.
        for _ in 0..20 {
            sc.request_advance(Instant::now());
        }
        pump_until_settled(&mut sc, 2000);
        assert_eq!(sc.state(), ScanState::Playing);
        assert_eq!(sc.current_index(), 0, "queued advances must not run");
        assert_eq!(opens[0].load(Ordering::SeqCst), 1);
        assert_eq!(opens[1].load(Ordering::SeqCst), 0);
    }

    #[test]
    fn manual_advance_moves_forward() {
        let (mut sc, _opens, _params, _m) = make_scanner(vec![Behavior::Ok, Behavior::Ok, Behavior::Ok]);
        sc.power_on(Instant::now());
        pump_until_settled(&mut sc, 2000);
        assert_eq!(sc.current_index(), 0);

        sc.request_advance(Instant::now());
        pump_until_settled(&mut sc, 2000);
        assert_eq!(sc.current_index(), 1);
    }

    #[test]
    fn power_off_cancels_everything() {
        let (mut sc, _opens, _params, _m) = make_scanner(vec![Behavior::Ok]);
        sc.power_on(Instant::now());
        pump_until_settled(&mut sc, 2000);
        assert_eq!(sc.state(), ScanState::Playing);

        sc.power_off();
        assert_eq!(sc.state(), ScanState::Stopped);
        assert_eq!(sc.status(), "stopped");
        // Ticks after power-off must not revive anything.
        pump(&mut sc, 300);
        assert_eq!(sc.state(), ScanState::Stopped);
    }

    #[test]
    fn stalled_stream_resyncs_same_station() {
        let (mut sc, opens, _params, _m) =
            make_scanner(vec![Behavior::Stalls, Behavior::Ok]);
        sc.power_on(Instant::now());
        pump_until_settled(&mut sc, 2000);
        assert_eq!(sc.current_index(), 0);
        assert_eq!(opens[0].load(Ordering::SeqCst), 1);

        // The position never advances; the watchdog trips and the scanner
        // reopens the SAME station, not the next one.
        pump(&mut sc, 600);
        assert!(
            opens[0].load(Ordering::SeqCst) >= 2,
            "no resync reopen happened"
        );
        assert_eq!(sc.current_index(), 0);
        assert_eq!(opens[1].load(Ordering::SeqCst), 0);
    }

    #[test]
    fn auto_scan_advances_on_interval() {
        let (mut sc, _opens, params, _m) = make_scanner(vec![Behavior::Ok, Behavior::Ok, Behavior::Ok]);
        params.set_auto_scan(true);
        params.set_speed(0.0); // 250 ms interval
        sc.power_on(Instant::now());
        pump(&mut sc, 1500);
        assert!(
            sc.current_index() > 0,
            "auto-scan never advanced (still at {})",
            sc.current_index()
        );
    }

    #[test]
    fn squelch_hold_defers_auto_advance() {
        let (mut sc, opens, params, monitor) = make_scanner(vec![Behavior::Ok, Behavior::Ok]);
        params.set_auto_scan(true);
        params.set_speed(0.0);
        params.set_squelch_enabled(true);
        params.set_squelch_sensitivity(1.0); // lowest threshold
        params.set_squelch_hold(0.0); // 0.4 s hold
        sc.power_on(Instant::now());
        pump_until_settled(&mut sc, 2000);
        assert_eq!(sc.current_index(), 0);

        // Simulated speech energy: keep the envelope hot for a while.
        let speech_until = Instant::now() + Duration::from_millis(300);
        while Instant::now() < speech_until {
            monitor.update(0.8);
            sc.tick(Instant::now());
            std::thread::sleep(Duration::from_millis(5));
        }
        assert!(
            matches!(sc.state(), ScanState::Playing | ScanState::Holding),
            "advance ran during hold (state {})",
            sc.state()
        );
        assert_eq!(sc.current_index(), 0, "advance ran during hold");
        assert_eq!(opens[1].load(Ordering::SeqCst), 0);

        // Voice stops: quiet windows decay the envelope, the hold lapses,
        // and the deferred advance finally runs.
        let end = Instant::now() + Duration::from_millis(1500);
        while Instant::now() < end {
            monitor.update(0.0);
            sc.tick(Instant::now());
            std::thread::sleep(Duration::from_millis(5));
        }
        assert!(
            sc.current_index() != 0 || opens[1].load(Ordering::SeqCst) > 0,
            "advance never resumed after hold"
        );
    }

    #[test]
    fn empty_station_list_stops_immediately() {
        let params = Arc::new(EffectParameters::new());
        let monitor = SquelchMonitor::new();
        let graph = Arc::new(Mutex::new(SignalPath::new(
            48_000,
            params.clone(),
            monitor.clone(),
        )));
        let transport = SimTransport {
            stations: Vec::new(),
            behavior: Vec::new(),
            opens: Arc::new(Vec::new()),
        };
        let mut sc = Scanner::new(
            Vec::new(),
            Box::new(transport),
            graph,
            params,
            SquelchGate::new(monitor),
            WatchdogConfig::default(),
        );
        sc.power_on(Instant::now());
        assert_eq!(sc.state(), ScanState::Stopped);
        assert_eq!(sc.status(), "no playable stream");
    }
}
