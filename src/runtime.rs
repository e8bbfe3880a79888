//! Control runtime — dedicated thread with channel-based command dispatch.
//!
//! Owns the audio output, the shared signal path, the scanner, and the
//! recorder on a single thread (nothing audio-facing needs Send/Sync past
//! the graph mutex). External code talks through `RuntimeHandle`, which
//! wraps an `mpsc::Sender<Command>`. Scanner/watchdog/squelch ticks happen
//! in the gaps of the command loop via `recv_timeout`.
//!
//! When no audio device exists (CI, headless boxes) the graph is pumped at
//! realtime pace by a fallback thread instead, so scanning, analysis, and
//! recording keep working without an output.

use crate::catalog::StationEntry;
use crate::graph::{BLOCK_FRAMES, PathSource, SignalPath};
use crate::params::EffectParameters;
use crate::recorder::{EncoderKind, Recorder};
use crate::scanner::{ScanState, Scanner};
use crate::squelch::{SquelchGate, SquelchMonitor};
use crate::transport::StreamTransport;
use crate::watchdog::WatchdogConfig;
use chrono::Local;
use rodio::{OutputStream, Sink};
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

// ── Commands & events ────────────────────────────────────────────────────────

pub enum Command {
    PowerOn,
    PowerOff,
    Advance,
    StartRecording,
    StopRecording,
    Shutdown,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RuntimeEvent {
    State(ScanState),
    Status(String),
    Station { index: usize, name: String },
    RecordingStarted { path: PathBuf, encoder: String },
    RecordingStopped { path: PathBuf, frames: u64 },
    Error(String),
}

// ── Log buffer ───────────────────────────────────────────────────────────────

const LOG_BUFFER_MAX: usize = 500;

#[derive(Debug, Clone)]
pub struct LogEntry {
    pub timestamp: String,
    pub message: String,
}

pub struct LogBuffer {
    entries: VecDeque<LogEntry>,
}

impl LogBuffer {
    pub fn new() -> Self {
        LogBuffer {
            entries: VecDeque::new(),
        }
    }

    pub fn push(&mut self, message: String) {
        self.entries.push_back(LogEntry {
            timestamp: Local::now().format("%H:%M:%S").to_string(),
            message,
        });
        while self.entries.len() > LOG_BUFFER_MAX {
            self.entries.pop_front();
        }
    }

    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for LogBuffer {
    fn default() -> Self {
        Self::new()
    }
}

// ── Handle ───────────────────────────────────────────────────────────────────

/// Thread-safe handle for sending commands to the control runtime.
#[derive(Clone)]
pub struct RuntimeHandle {
    tx: mpsc::Sender<Command>,
    log: Arc<Mutex<LogBuffer>>,
}

impl RuntimeHandle {
    pub fn power_on(&self) {
        let _ = self.tx.send(Command::PowerOn);
    }

    pub fn power_off(&self) {
        let _ = self.tx.send(Command::PowerOff);
    }

    pub fn advance(&self) {
        let _ = self.tx.send(Command::Advance);
    }

    pub fn start_recording(&self) {
        let _ = self.tx.send(Command::StartRecording);
    }

    pub fn stop_recording(&self) {
        let _ = self.tx.send(Command::StopRecording);
    }

    pub fn shutdown(&self) {
        let _ = self.tx.send(Command::Shutdown);
    }

    pub fn logs(&self) -> Vec<LogEntry> {
        self.log.lock().unwrap().entries()
    }
}

// ── Configuration ────────────────────────────────────────────────────────────

pub struct RuntimeConfig {
    pub sample_rate: u32,
    pub recordings_dir: PathBuf,
    pub encoder: EncoderKind,
    pub watchdog: WatchdogConfig,
}

impl RuntimeConfig {
    pub fn new(recordings_dir: PathBuf, encoder: EncoderKind) -> Self {
        RuntimeConfig {
            sample_rate: 48_000,
            recordings_dir,
            encoder,
            watchdog: WatchdogConfig::default(),
        }
    }
}

// ── Output backends ──────────────────────────────────────────────────────────

enum Output {
    Rodio {
        _stream: OutputStream,
        sink: Sink,
    },
    /// No audio device: a pump thread renders blocks at realtime pace so the
    /// rest of the engine behaves identically.
    Headless {
        running: Arc<AtomicBool>,
        alive: Arc<AtomicBool>,
    },
}

impl Output {
    fn open(graph: Arc<Mutex<SignalPath>>, sample_rate: u32) -> Output {
        match OutputStream::try_default() {
            Ok((stream, handle)) => match Sink::try_new(&handle) {
                Ok(sink) => {
                    sink.append(PathSource::new(graph));
                    sink.pause();
                    return Output::Rodio {
                        _stream: stream,
                        sink,
                    };
                }
                Err(e) => eprintln!("Warning: no playback sink ({}), running headless", e),
            },
            Err(e) => eprintln!("Warning: no audio output ({}), running headless", e),
        }

        let running = Arc::new(AtomicBool::new(false));
        let alive = Arc::new(AtomicBool::new(true));
        let run = running.clone();
        let live = alive.clone();
        let block = Duration::from_secs_f64(BLOCK_FRAMES as f64 / sample_rate as f64);
        let _ = std::thread::Builder::new()
            .name("graph-pump".into())
            .spawn(move || {
                let mut buf = Vec::new();
                while live.load(Ordering::Relaxed) {
                    if run.load(Ordering::Relaxed) {
                        graph.lock().unwrap().process_block(&mut buf);
                        std::thread::sleep(block);
                    } else {
                        std::thread::sleep(Duration::from_millis(20));
                    }
                }
            });
        Output::Headless { running, alive }
    }

    fn resume(&self) {
        match self {
            Output::Rodio { sink, .. } => sink.play(),
            Output::Headless { running, .. } => running.store(true, Ordering::Relaxed),
        }
    }

    fn suspend(&self) {
        match self {
            Output::Rodio { sink, .. } => sink.pause(),
            Output::Headless { running, .. } => running.store(false, Ordering::Relaxed),
        }
    }

    fn shutdown(&self) {
        match self {
            Output::Rodio { sink, .. } => sink.stop(),
            Output::Headless { running, alive } => {
                running.store(false, Ordering::Relaxed);
                alive.store(false, Ordering::Relaxed);
            }
        }
    }
}

// ── Runtime ──────────────────────────────────────────────────────────────────

/// Spawn the control runtime. `on_event` is called from the runtime thread
/// whenever observable state changes.
pub fn spawn_runtime<F>(
    stations: Vec<StationEntry>,
    transport: Box<dyn StreamTransport>,
    params: Arc<EffectParameters>,
    config: RuntimeConfig,
    on_event: F,
) -> RuntimeHandle
where
    F: Fn(RuntimeEvent) + Send + 'static,
{
    let (tx, rx) = mpsc::channel::<Command>();
    let log = Arc::new(Mutex::new(LogBuffer::new()));
    let log_thread = log.clone();

    std::thread::Builder::new()
        .name("ghostbox-runtime".into())
        .spawn(move || {
            runtime_loop(rx, stations, transport, params, config, on_event, log_thread);
        })
        .expect("failed to spawn ghostbox-runtime thread");

    RuntimeHandle { tx, log }
}

fn runtime_loop<F>(
    rx: mpsc::Receiver<Command>,
    stations: Vec<StationEntry>,
    transport: Box<dyn StreamTransport>,
    params: Arc<EffectParameters>,
    config: RuntimeConfig,
    on_event: F,
    log: Arc<Mutex<LogBuffer>>,
) where
    F: Fn(RuntimeEvent),
{
    let monitor = SquelchMonitor::new();
    let graph = Arc::new(Mutex::new(SignalPath::new(
        config.sample_rate,
        params.clone(),
        monitor.clone(),
    )));
    let output = Output::open(graph.clone(), config.sample_rate);

    let mut scanner = Scanner::new(
        stations,
        transport,
        graph.clone(),
        params,
        SquelchGate::new(monitor),
        config.watchdog,
    );
    let mut recorder = Recorder::new(
        config.sample_rate,
        config.recordings_dir.clone(),
        config.encoder,
    );

    let emit = |event: RuntimeEvent| {
        log.lock().unwrap().push(match &event {
            RuntimeEvent::State(s) => format!("state: {}", s),
            RuntimeEvent::Status(s) => format!("status: {}", s),
            RuntimeEvent::Station { index, name } => format!("station {}: {}", index, name),
            RuntimeEvent::RecordingStarted { path, encoder } => {
                format!("recording ({}) -> {}", encoder, path.display())
            }
            RuntimeEvent::RecordingStopped { path, frames } => {
                format!("recorded {} frames -> {}", frames, path.display())
            }
            RuntimeEvent::Error(e) => format!("error: {}", e),
        });
        on_event(event);
    };

    let mut last_state = scanner.state();
    let mut last_status = scanner.status().to_string();
    let mut last_station: Option<usize> = None;

    loop {
        match rx.recv_timeout(Duration::from_millis(25)) {
            Ok(cmd) => match cmd {
                Command::PowerOn => {
                    output.resume();
                    scanner.power_on(Instant::now());
                }
                Command::PowerOff => {
                    scanner.power_off();
                    if recorder.is_active() {
                        finish_recording(&mut recorder, &graph, &emit);
                    }
                    output.suspend();
                }
                Command::Advance => {
                    scanner.request_advance(Instant::now());
                }
                Command::StartRecording => match recorder.start() {
                    Ok(Some(tap)) => {
                        graph.lock().unwrap().set_record_sink(Some(tap));
                        let path = recorder
                            .active_path()
                            .map(PathBuf::from)
                            .unwrap_or_default();
                        let encoder = recorder
                            .active_kind()
                            .map(|k| k.to_string())
                            .unwrap_or_default();
                        emit(RuntimeEvent::RecordingStarted { path, encoder });
                    }
                    Ok(None) => {}
                    Err(e) => emit(RuntimeEvent::Error(e)),
                },
                Command::StopRecording => {
                    finish_recording(&mut recorder, &graph, &emit);
                }
                Command::Shutdown => {
                    scanner.power_off();
                    if recorder.is_active() {
                        finish_recording(&mut recorder, &graph, &emit);
                    }
                    output.shutdown();
                    break;
                }
            },
            Err(mpsc::RecvTimeoutError::Timeout) => {
                scanner.tick(Instant::now());
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                scanner.power_off();
                output.shutdown();
                break;
            }
        }

        if scanner.state() != last_state {
            last_state = scanner.state();
            emit(RuntimeEvent::State(last_state));
        }
        if scanner.status() != last_status {
            last_status = scanner.status().to_string();
            emit(RuntimeEvent::Status(last_status.clone()));
        }
        let station = scanner.current_station().map(|_| scanner.current_index());
        if station != last_station && scanner.state() == ScanState::Playing {
            last_station = station;
            if let Some(s) = scanner.current_station() {
                emit(RuntimeEvent::Station {
                    index: scanner.current_index(),
                    name: s.name.clone(),
                });
            }
        }
    }
}

/// Detach the graph tap and finalize the active session, if any.
fn finish_recording(
    recorder: &mut Recorder,
    graph: &Arc<Mutex<SignalPath>>,
    emit: &dyn Fn(RuntimeEvent),
) {
    graph.lock().unwrap().set_record_sink(None);
    match recorder.stop() {
        Ok(Some((path, frames))) => {
            emit(RuntimeEvent::RecordingStopped { path, frames });
        }
        Ok(None) => {}
        Err(e) => emit(RuntimeEvent::Error(e)),
    }
}
