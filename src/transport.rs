//! Stream transport — opening live station URLs for playback.
//!
//! The scanner core only talks to the `StreamTransport`/`TunedStream` traits.
//! The production backend decodes with an `ffmpeg` child process piping raw
//! f32 PCM into the graph ("shaped" mode: the full effects chain applies).
//! When no decoder tap is available it degrades to an `mpv` child playing
//! through the platform's own output ("unshaped" mode: coarse volume only,
//! no analysis taps), and when neither tool exists every open fails — the
//! scanner surfaces that as a normal stream-open failure.

use std::io::Read;
use std::process::{Child, Command, Stdio};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{Receiver, SyncSender, TrySendError, sync_channel};
use std::thread::JoinHandle;
use std::time::Duration;

/// How long a stream open may take before the scanner gives up on it.
pub const OPEN_TIMEOUT: Duration = Duration::from_millis(3500);

/// Frames per chunk delivered to the graph.
const CHUNK_FRAMES: usize = 2048;
/// Bounded chunk queue between the reader thread and the audio thread.
const CHUNK_QUEUE: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackMode {
    /// Decoded PCM flows through the signal path.
    Shaped,
    /// The stream plays through a native output; only coarse volume control.
    Unshaped,
}

/// A single open station stream. Exactly zero or one exists at a time.
pub trait TunedStream: Send {
    fn mode(&self) -> PlaybackMode;

    /// Hand over the decoded-frame receiver for graph attachment.
    /// Returns `Some` at most once, and only in shaped mode.
    fn take_frames(&mut self) -> Option<Receiver<Vec<f32>>>;

    /// True once audio has actually begun arriving/playing.
    fn started(&mut self) -> bool;

    /// Playback position in seconds, when the backend can observe it.
    fn position_secs(&self) -> Option<f64>;

    /// Coarse output volume for unshaped mode; a no-op in shaped mode where
    /// the graph owns all gain staging.
    fn set_native_volume(&mut self, volume: f32);

    /// Hard stop: tear the backend down so no buffered audio continues.
    fn stop(&mut self);
}

pub trait StreamTransport: Send {
    /// Capability probe: can the decoded signal be tapped into the graph?
    fn can_tap_decoded_signal(&self) -> bool;

    fn open(&mut self, url: &str) -> Result<Box<dyn TunedStream>, String>;
}

// ── Production backend ───────────────────────────────────────────────────────

/// Subprocess-based transport. Probes for `ffmpeg` (shaped) and falls back
/// to `mpv` (unshaped) once at startup; `open` branches only on the probe
/// result, never on platform identity.
pub struct ProcessTransport {
    sample_rate: u32,
    tap: bool,
}

impl ProcessTransport {
    /// Probe available tools. Errors only when no backend exists at all.
    pub fn probe(sample_rate: u32) -> Result<Self, String> {
        if tool_available("ffmpeg", "-version") {
            return Ok(ProcessTransport {
                sample_rate,
                tap: true,
            });
        }
        if tool_available("mpv", "--version") {
            return Ok(ProcessTransport {
                sample_rate,
                tap: false,
            });
        }
        Err("No stream backend found: install ffmpeg (preferred) or mpv".to_string())
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

impl StreamTransport for ProcessTransport {
    fn can_tap_decoded_signal(&self) -> bool {
        self.tap
    }

    fn open(&mut self, url: &str) -> Result<Box<dyn TunedStream>, String> {
        if self.tap {
            Ok(Box::new(ShapedStream::open(url, self.sample_rate)?))
        } else {
            Ok(Box::new(UnshapedStream::open(url)?))
        }
    }
}

fn tool_available(name: &str, version_flag: &str) -> bool {
    Command::new(name)
        .arg(version_flag)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

// ── Shaped: ffmpeg PCM pipe ──────────────────────────────────────────────────

struct ShapedStream {
    child: Child,
    reader: Option<JoinHandle<()>>,
    frames_rx: Option<Receiver<Vec<f32>>>,
    frames_received: Arc<AtomicU64>,
    stop_flag: Arc<AtomicBool>,
    sample_rate: u32,
}

impl ShapedStream {
    fn open(url: &str, sample_rate: u32) -> Result<Self, String> {
        let rate = sample_rate.to_string();
        let mut child = Command::new("ffmpeg")
            .args([
                "-hide_banner",
                "-loglevel",
                "error",
                "-nostdin",
                "-i",
                url,
                "-vn",
                "-f",
                "f32le",
                "-ac",
                "2",
                "-ar",
                rate.as_str(),
                "pipe:1",
            ])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| format!("Failed to launch ffmpeg: {}", e))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| "ffmpeg stdout unavailable".to_string())?;

        let (tx, rx) = sync_channel::<Vec<f32>>(CHUNK_QUEUE);
        let frames_received = Arc::new(AtomicU64::new(0));
        let stop_flag = Arc::new(AtomicBool::new(false));
        let counter = frames_received.clone();
        let stopping = stop_flag.clone();

        let reader = std::thread::Builder::new()
            .name("stream-reader".into())
            .spawn(move || pump_pcm(stdout, tx, counter, stopping))
            .map_err(|e| format!("Failed to spawn stream reader: {}", e))?;

        Ok(ShapedStream {
            child,
            reader: Some(reader),
            frames_rx: Some(rx),
            frames_received,
            stop_flag,
            sample_rate,
        })
    }
}

/// Read f32le stereo PCM from the decoder and hand it to the graph in fixed
/// chunks, with backpressure against the bounded queue.
fn pump_pcm(
    mut stdout: impl Read,
    tx: SyncSender<Vec<f32>>,
    counter: Arc<AtomicU64>,
    stopping: Arc<AtomicBool>,
) {
    let mut raw = vec![0u8; CHUNK_FRAMES * 8];
    let mut pending: Vec<u8> = Vec::new();

    loop {
        if stopping.load(Ordering::Relaxed) {
            return;
        }
        let n = match stdout.read(&mut raw) {
            Ok(0) | Err(_) => return,
            Ok(n) => n,
        };
        pending.extend_from_slice(&raw[..n]);

        // Only complete stereo frames (8 bytes) leave the pending buffer.
        let whole = pending.len() - pending.len() % 8;
        if whole == 0 {
            continue;
        }
        let mut chunk = Vec::with_capacity(whole / 4);
        for sample in pending[..whole].chunks_exact(4) {
            chunk.push(f32::from_le_bytes([
                sample[0], sample[1], sample[2], sample[3],
            ]));
        }
        pending.drain(..whole);
        counter.fetch_add((whole / 8) as u64, Ordering::Relaxed);

        let mut item = chunk;
        loop {
            match tx.try_send(item) {
                Ok(()) => break,
                Err(TrySendError::Full(back)) => {
                    if stopping.load(Ordering::Relaxed) {
                        return;
                    }
                    item = back;
                    std::thread::sleep(Duration::from_millis(5));
                }
                Err(TrySendError::Disconnected(_)) => return,
            }
        }
    }
}

impl TunedStream for ShapedStream {
    fn mode(&self) -> PlaybackMode {
        PlaybackMode::Shaped
    }

    fn take_frames(&mut self) -> Option<Receiver<Vec<f32>>> {
        self.frames_rx.take()
    }

    fn started(&mut self) -> bool {
        self.frames_received.load(Ordering::Relaxed) > 0
    }

    fn position_secs(&self) -> Option<f64> {
        Some(self.frames_received.load(Ordering::Relaxed) as f64 / self.sample_rate as f64)
    }

    fn set_native_volume(&mut self, _volume: f32) {}

    fn stop(&mut self) {
        self.stop_flag.store(true, Ordering::Relaxed);
        let _ = self.child.kill();
        let _ = self.child.wait();
        self.frames_rx = None;
        if let Some(reader) = self.reader.take() {
            let _ = reader.join();
        }
    }
}

impl Drop for ShapedStream {
    fn drop(&mut self) {
        if self.reader.is_some() {
            self.stop();
        }
    }
}

// ── Unshaped: mpv native playback ────────────────────────────────────────────

struct UnshapedStream {
    child: Child,
    #[cfg(unix)]
    ipc_path: std::path::PathBuf,
    #[cfg(unix)]
    ipc: Option<std::os::unix::net::UnixStream>,
}

impl UnshapedStream {
    fn open(url: &str) -> Result<Self, String> {
        #[cfg(unix)]
        let ipc_path = std::env::temp_dir().join(format!(
            "ghostbox-mpv-{}-{}.sock",
            std::process::id(),
            fastrand::u32(..)
        ));

        let mut cmd = Command::new("mpv");
        cmd.args(["--no-video", "--really-quiet", "--no-terminal"]);
        #[cfg(unix)]
        cmd.arg(format!("--input-ipc-server={}", ipc_path.display()));
        cmd.arg(url)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        let child = cmd
            .spawn()
            .map_err(|e| format!("Failed to launch mpv: {}", e))?;

        Ok(UnshapedStream {
            child,
            #[cfg(unix)]
            ipc_path,
            #[cfg(unix)]
            ipc: None,
        })
    }

    #[cfg(unix)]
    fn send_ipc(&mut self, line: &str) {
        use std::io::Write;
        if self.ipc.is_none() {
            // The socket appears shortly after mpv starts; retry next call.
            self.ipc = std::os::unix::net::UnixStream::connect(&self.ipc_path).ok();
        }
        if let Some(sock) = &mut self.ipc {
            if sock.write_all(line.as_bytes()).is_err() {
                self.ipc = None;
            }
        }
    }
}

impl TunedStream for UnshapedStream {
    fn mode(&self) -> PlaybackMode {
        PlaybackMode::Unshaped
    }

    fn take_frames(&mut self) -> Option<Receiver<Vec<f32>>> {
        None
    }

    fn started(&mut self) -> bool {
        // mpv exits on an unplayable URL; while it lives, assume playback.
        matches!(self.child.try_wait(), Ok(None))
    }

    fn position_secs(&self) -> Option<f64> {
        // No observable position without a decoder tap; the watchdog stays
        // disarmed in unshaped mode.
        None
    }

    fn set_native_volume(&mut self, volume: f32) {
        let _percent = (volume.clamp(0.0, 1.0) * 100.0).round();
        #[cfg(unix)]
        self.send_ipc(&format!(
            "{{\"command\":[\"set_property\",\"volume\",{}]}}\n",
            _percent
        ));
    }

    fn stop(&mut self) {
        #[cfg(unix)]
        {
            self.send_ipc("{\"command\":[\"quit\"]}\n");
            let _ = std::fs::remove_file(&self.ipc_path);
            self.ipc = None;
        }
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

impl Drop for UnshapedStream {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn pump_delivers_whole_frames_and_counts_them() {
        // 3 stereo frames of known samples, plus 3 trailing bytes of a
        // truncated fourth frame that must never be delivered.
        let mut bytes = Vec::new();
        for v in [0.1f32, -0.1, 0.2, -0.2, 0.3, -0.3] {
            bytes.extend_from_slice(&v.to_le_bytes());
        }
        bytes.extend_from_slice(&[1, 2, 3]);

        let (tx, rx) = sync_channel(4);
        let counter = Arc::new(AtomicU64::new(0));
        let stopping = Arc::new(AtomicBool::new(false));
        pump_pcm(Cursor::new(bytes), tx, counter.clone(), stopping);

        let mut all = Vec::new();
        while let Ok(chunk) = rx.try_recv() {
            all.extend(chunk);
        }
        assert_eq!(all.len(), 6);
        assert!((all[0] - 0.1).abs() < 1e-6);
        assert!((all[5] + 0.3).abs() < 1e-6);
        assert_eq!(counter.load(Ordering::Relaxed), 3);
    }

    #[test]
    fn pump_exits_when_receiver_is_gone() {
        let mut bytes = Vec::new();
        for _ in 0..1024 {
            bytes.extend_from_slice(&0.5f32.to_le_bytes());
        }
        let (tx, rx) = sync_channel(1);
        drop(rx);
        let counter = Arc::new(AtomicU64::new(0));
        let stopping = Arc::new(AtomicBool::new(false));
        // Must return instead of spinning forever.
        pump_pcm(Cursor::new(bytes), tx, counter, stopping);
    }

    #[test]
    fn pump_respects_stop_flag() {
        let mut bytes = Vec::new();
        for _ in 0..64 * 1024 {
            bytes.extend_from_slice(&0.5f32.to_le_bytes());
        }
        let (tx, _rx) = sync_channel(1);
        let counter = Arc::new(AtomicU64::new(0));
        let stopping = Arc::new(AtomicBool::new(true));
        pump_pcm(Cursor::new(bytes), tx, counter, stopping);
    }

    #[test]
    fn open_timeout_matches_documented_value() {
        assert_eq!(OPEN_TIMEOUT, Duration::from_millis(3500));
    }
}
