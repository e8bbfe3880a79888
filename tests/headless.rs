//! Headless integration tests for ghostbox.
//!
//! These exercise the control runtime end-to-end against a scripted stream
//! transport — no audio device, no network, no child processes. On machines
//! without an output device the runtime's fallback pump renders the graph at
//! realtime pace, so recording and analysis behave exactly as in production.

use ghostbox::catalog::{StationEntry, normalize_stations};
use ghostbox::params::EffectParameters;
use ghostbox::recorder::EncoderKind;
use ghostbox::runtime::{RuntimeConfig, RuntimeEvent, RuntimeHandle, spawn_runtime};
use ghostbox::scanner::ScanState;
use ghostbox::transport::{PlaybackMode, StreamTransport, TunedStream};
use ghostbox::watchdog::WatchdogConfig;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{Receiver, SyncSender, sync_channel};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

// ── Scripted transport ───────────────────────────────────────────────────────

#[derive(Clone, Copy, PartialEq)]
enum Behavior {
    Fail,
    Ok,
    Stalls,
}

struct SimTransport {
    stations: Vec<StationEntry>,
    behavior: Vec<Behavior>,
    opens: Arc<Vec<AtomicUsize>>,
}

impl SimTransport {
    fn new(behavior: Vec<Behavior>) -> (Self, Vec<StationEntry>, Arc<Vec<AtomicUsize>>) {
        let stations: Vec<StationEntry> = (0..behavior.len())
            .map(|i| StationEntry {
                name: format!("Sim {}", i),
                url: format!("https://sim-{}.example/stream", i),
            })
            .collect();
        let opens: Arc<Vec<AtomicUsize>> =
            Arc::new((0..behavior.len()).map(|_| AtomicUsize::new(0)).collect());
        (
            SimTransport {
                stations: stations.clone(),
                behavior,
                opens: opens.clone(),
            },
            stations,
            opens,
        )
    }
}

struct SimStream {
    opened_at: Instant,
    stalls: bool,
    frames_rx: Option<Receiver<Vec<f32>>>,
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
            b => {
                let (tx, rx) = sync_channel(4);
                Ok(Box::new(SimStream {
                    opened_at: Instant::now(),
                    stalls: b == Behavior::Stalls,
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

    fn take_frames(&mut self) -> Option<Receiver<Vec<f32>>> {
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

// ── Harness ──────────────────────────────────────────────────────────────────

type Events = Arc<Mutex<Vec<RuntimeEvent>>>;

fn start_runtime(
    behavior: Vec<Behavior>,
    configure: impl FnOnce(&EffectParameters),
) -> (RuntimeHandle, Events, Arc<Vec<AtomicUsize>>, tempfile::TempDir) {
    let (transport, stations, opens) = SimTransport::new(behavior);
    let params = Arc::new(EffectParameters::new());
    params.set_burst(0.0); // 120 ms bursts keep the tests brisk
    configure(&params);

    let dir = tempfile::tempdir().unwrap();
    let mut config = RuntimeConfig::new(dir.path().to_path_buf(), EncoderKind::RawPcmAccumulator);
    config.watchdog = WatchdogConfig {
        poll: Duration::from_millis(20),
        first_delay: Duration::from_millis(20),
        stall_after: Duration::from_millis(120),
        epsilon: 0.05,
        backward: 0.25,
    };

    let events: Events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    let handle = spawn_runtime(stations, Box::new(transport), params, config, move |e| {
        sink.lock().unwrap().push(e);
    });
    (handle, events, opens, dir)
}

fn wait_for<F>(events: &Events, timeout: Duration, pred: F) -> bool
where
    F: Fn(&[RuntimeEvent]) -> bool,
{
    let end = Instant::now() + timeout;
    while Instant::now() < end {
        if pred(&events.lock().unwrap()) {
            return true;
        }
        std::thread::sleep(Duration::from_millis(20));
    }
    false
}

fn played_station(events: &[RuntimeEvent]) -> Option<usize> {
    events.iter().rev().find_map(|e| match e {
        RuntimeEvent::Station { index, .. } => Some(*index),
        _ => None,
    })
}

// ── Scan lifecycle ───────────────────────────────────────────────────────────

#[test]
fn powers_on_and_tunes_first_station() {
    let (handle, events, opens, _dir) = start_runtime(vec![Behavior::Ok, Behavior::Ok], |_| {});
    handle.power_on();

    assert!(
        wait_for(&events, Duration::from_secs(3), |evts| {
            played_station(evts) == Some(0)
        }),
        "never tuned station 0; events: {:?}",
        events.lock().unwrap()
    );
    assert_eq!(opens[0].load(Ordering::SeqCst), 1);
    assert_eq!(opens[1].load(Ordering::SeqCst), 0);

    let evts = events.lock().unwrap();
    assert!(
        evts.iter()
            .any(|e| matches!(e, RuntimeEvent::Status(s) if s == "playing")),
        "no playing status: {:?}",
        *evts
    );
    drop(evts);

    handle.shutdown();
}

#[test]
fn failing_station_falls_through_to_next() {
    // The §8 scenario: A fails, B succeeds, C succeeds — the scan must land
    // on B (index 1), trying A exactly once and never touching C.
    let (handle, events, opens, _dir) =
        start_runtime(vec![Behavior::Fail, Behavior::Ok, Behavior::Ok], |_| {});
    handle.power_on();

    assert!(
        wait_for(&events, Duration::from_secs(3), |evts| {
            played_station(evts) == Some(1)
        }),
        "never landed on station B; events: {:?}",
        events.lock().unwrap()
    );
    assert_eq!(opens[0].load(Ordering::SeqCst), 1);
    assert_eq!(opens[1].load(Ordering::SeqCst), 1);
    assert_eq!(opens[2].load(Ordering::SeqCst), 0);

    handle.shutdown();
}

#[test]
fn exhausted_station_list_terminates_with_status() {
    let (handle, events, opens, _dir) = start_runtime(
        vec![Behavior::Fail, Behavior::Fail, Behavior::Fail],
        |_| {},
    );
    handle.power_on();

    assert!(
        wait_for(&events, Duration::from_secs(4), |evts| {
            evts.iter()
                .any(|e| matches!(e, RuntimeEvent::Status(s) if s == "no playable stream"))
        }),
        "no terminal status; events: {:?}",
        events.lock().unwrap()
    );
    for o in opens.iter() {
        assert_eq!(o.load(Ordering::SeqCst), 1, "a station was retried");
    }
    let evts = events.lock().unwrap();
    assert!(
        evts.iter()
            .any(|e| matches!(e, RuntimeEvent::State(ScanState::Stopped))),
        "scan did not stop: {:?}",
        *evts
    );
    drop(evts);

    handle.shutdown();
}

#[test]
fn manual_advance_steps_through_catalog() {
    let (handle, events, _opens, _dir) =
        start_runtime(vec![Behavior::Ok, Behavior::Ok, Behavior::Ok], |_| {});
    handle.power_on();
    assert!(wait_for(&events, Duration::from_secs(3), |evts| {
        played_station(evts) == Some(0)
    }));

    handle.advance();
    assert!(
        wait_for(&events, Duration::from_secs(3), |evts| {
            played_station(evts) == Some(1)
        }),
        "advance did not reach station 1"
    );

    handle.advance();
    assert!(wait_for(&events, Duration::from_secs(3), |evts| {
        played_station(evts) == Some(2)
    }));

    handle.shutdown();
}

#[test]
fn auto_scan_cycles_stations() {
    let (handle, events, _opens, _dir) =
        start_runtime(vec![Behavior::Ok, Behavior::Ok, Behavior::Ok], |params| {
            params.set_auto_scan(true);
            params.set_speed(0.0); // 250 ms interval
        });
    handle.power_on();

    assert!(
        wait_for(&events, Duration::from_secs(5), |evts| {
            played_station(evts).map(|i| i >= 1).unwrap_or(false)
        }),
        "auto-scan never advanced; events: {:?}",
        events.lock().unwrap()
    );

    handle.shutdown();
}

#[test]
fn stalled_stream_triggers_same_station_resync() {
    let (handle, events, opens, _dir) =
        start_runtime(vec![Behavior::Stalls, Behavior::Ok], |_| {});
    handle.power_on();
    assert!(wait_for(&events, Duration::from_secs(3), |evts| {
        played_station(evts) == Some(0)
    }));

    // The stalled position trips the watchdog; the scanner must reopen the
    // same station rather than advancing.
    let end = Instant::now() + Duration::from_secs(3);
    while Instant::now() < end && opens[0].load(Ordering::SeqCst) < 2 {
        std::thread::sleep(Duration::from_millis(25));
    }
    assert!(
        opens[0].load(Ordering::SeqCst) >= 2,
        "no resync reopen happened"
    );
    assert_eq!(opens[1].load(Ordering::SeqCst), 0, "resync advanced stations");

    handle.shutdown();
}

#[test]
fn power_off_quiesces_the_session() {
    let (handle, events, opens, _dir) = start_runtime(vec![Behavior::Ok], |params| {
        params.set_auto_scan(true);
        params.set_speed(0.0);
    });
    handle.power_on();
    assert!(wait_for(&events, Duration::from_secs(3), |evts| {
        played_station(evts) == Some(0)
    }));

    handle.power_off();
    assert!(wait_for(&events, Duration::from_secs(2), |evts| {
        evts.iter()
            .any(|e| matches!(e, RuntimeEvent::Status(s) if s == "stopped"))
    }));

    // No timer may survive power-off: open count must stay frozen.
    let frozen = opens[0].load(Ordering::SeqCst);
    std::thread::sleep(Duration::from_millis(600));
    assert_eq!(opens[0].load(Ordering::SeqCst), frozen, "a stale timer fired");

    handle.shutdown();
}

// ── Recording ────────────────────────────────────────────────────────────────

#[test]
fn records_the_mix_to_wav() {
    let (handle, events, _opens, dir) = start_runtime(vec![Behavior::Ok], |_| {});
    handle.power_on();
    assert!(wait_for(&events, Duration::from_secs(3), |evts| {
        played_station(evts) == Some(0)
    }));

    handle.start_recording();
    assert!(wait_for(&events, Duration::from_secs(2), |evts| {
        evts.iter()
            .any(|e| matches!(e, RuntimeEvent::RecordingStarted { .. }))
    }));

    std::thread::sleep(Duration::from_millis(600));
    handle.stop_recording();
    assert!(
        wait_for(&events, Duration::from_secs(3), |evts| {
            evts.iter()
                .any(|e| matches!(e, RuntimeEvent::RecordingStopped { .. }))
        }),
        "recording never finished; events: {:?}",
        events.lock().unwrap()
    );

    let (path, frames) = events
        .lock()
        .unwrap()
        .iter()
        .find_map(|e| match e {
            RuntimeEvent::RecordingStopped { path, frames } => Some((path.clone(), *frames)),
            _ => None,
        })
        .unwrap();

    assert!(path.starts_with(dir.path()));
    assert!(path.to_string_lossy().ends_with(".wav"));
    assert!(frames > 0, "no frames captured");

    // Declared WAV sizes must match the captured frame count exactly.
    let bytes = std::fs::read(&path).unwrap();
    assert_eq!(bytes.len() as u64, 44 + frames * 4);
    let riff = u32::from_le_bytes(bytes[4..8].try_into().unwrap()) as u64;
    let data = u32::from_le_bytes(bytes[40..44].try_into().unwrap()) as u64;
    assert_eq!(riff, 36 + frames * 4);
    assert_eq!(data, frames * 4);

    handle.shutdown();
}

#[test]
fn double_record_start_is_a_noop() {
    let (handle, events, _opens, _dir) = start_runtime(vec![Behavior::Ok], |_| {});
    handle.power_on();
    assert!(wait_for(&events, Duration::from_secs(3), |evts| {
        played_station(evts) == Some(0)
    }));

    handle.start_recording();
    handle.start_recording();
    std::thread::sleep(Duration::from_millis(300));
    handle.stop_recording();

    assert!(wait_for(&events, Duration::from_secs(3), |evts| {
        evts.iter()
            .any(|e| matches!(e, RuntimeEvent::RecordingStopped { .. }))
    }));
    let evts = events.lock().unwrap();
    let starts = evts
        .iter()
        .filter(|e| matches!(e, RuntimeEvent::RecordingStarted { .. }))
        .count();
    let stops = evts
        .iter()
        .filter(|e| matches!(e, RuntimeEvent::RecordingStopped { .. }))
        .count();
    assert_eq!(starts, 1, "second start must be a no-op");
    assert_eq!(stops, 1);
    drop(evts);

    handle.shutdown();
}

// ── Catalog plumbing ─────────────────────────────────────────────────────────

#[test]
fn catalog_feeds_the_scanner() {
    let doc = serde_json::json!({
        "Talk": [
            {"name": "Alpha", "url": "https://alpha.example/live.mp3"},
            {"name": "Beta", "urls": ["https://beta.example/a", "https://beta.example/b"]}
        ]
    });
    let list = normalize_stations(&doc);
    assert_eq!(list.len(), 3);

    // Any normalized list is usable as-is by the runtime.
    let behavior = vec![Behavior::Ok; list.len()];
    let opens: Arc<Vec<AtomicUsize>> =
        Arc::new((0..list.len()).map(|_| AtomicUsize::new(0)).collect());
    let transport = SimTransport {
        stations: list.clone(),
        behavior,
        opens: opens.clone(),
    };
    let params = Arc::new(EffectParameters::new());
    params.set_burst(0.0);
    let dir = tempfile::tempdir().unwrap();
    let config = RuntimeConfig::new(dir.path().to_path_buf(), EncoderKind::RawPcmAccumulator);

    let events: Events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    let handle = spawn_runtime(list, Box::new(transport), params, config, move |e| {
        sink.lock().unwrap().push(e);
    });
    handle.power_on();
    assert!(wait_for(&events, Duration::from_secs(3), |evts| {
        played_station(evts).is_some()
    }));
    handle.shutdown();
}
