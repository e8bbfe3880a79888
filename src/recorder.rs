//! Recording pipeline — taps the final mix and encodes it to a file.
//!
//! Three encoder paths, tried in order at record-start: an `ffmpeg` child
//! encoding the piped float mix directly to MP3, a `lame` child fed 16-bit
//! PCM converted in-process, and a dependency-free WAV accumulator that can
//! never fail. A session owns one worker thread draining the graph's tap
//! channel; dropping the tap sender is the stop signal.

use chrono::Local;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::mpsc::{Receiver, SyncSender, sync_channel};
use std::thread::JoinHandle;

/// Queue depth between the audio thread tap and the encoder worker.
const TAP_QUEUE: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncoderKind {
    /// ffmpeg encodes the captured stream straight to MP3.
    NativeCompressed,
    /// lame encodes 16-bit PCM we convert in process.
    SoftwareMp3,
    /// Raw float accumulation, flushed as a canonical WAV container.
    RawPcmAccumulator,
}

impl EncoderKind {
    pub fn extension(&self) -> &'static str {
        match self {
            EncoderKind::NativeCompressed | EncoderKind::SoftwareMp3 => "mp3",
            EncoderKind::RawPcmAccumulator => "wav",
        }
    }
}

impl std::fmt::Display for EncoderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EncoderKind::NativeCompressed => write!(f, "mp3 (ffmpeg)"),
            EncoderKind::SoftwareMp3 => write!(f, "mp3 (lame)"),
            EncoderKind::RawPcmAccumulator => write!(f, "wav"),
        }
    }
}

/// Capability probe, run once at startup: best compressed encoder available,
/// or the WAV accumulator which needs nothing.
pub fn preferred_encoder() -> EncoderKind {
    if tool_runs("ffmpeg", "-version") {
        EncoderKind::NativeCompressed
    } else if tool_runs("lame", "--version") {
        EncoderKind::SoftwareMp3
    } else {
        EncoderKind::RawPcmAccumulator
    }
}

fn tool_runs(name: &str, flag: &str) -> bool {
    Command::new(name)
        .arg(flag)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

/// `ghostbox-YYYYMMDD-HHMMSS.<ext>` in the configured recordings directory.
pub fn timestamped_path(dir: &Path, kind: EncoderKind) -> PathBuf {
    let stamp = Local::now().format("%Y%m%d-%H%M%S");
    dir.join(format!("ghostbox-{}.{}", stamp, kind.extension()))
}

// ── Sample conversion & WAV synthesis ────────────────────────────────────────

/// Float → signed 16-bit with clamping and a small headroom scale.
pub fn sample_to_i16(x: f32) -> i16 {
    let v = x.clamp(-1.0, 1.0) * 0.95;
    if v < 0.0 {
        (v * 0x8000 as f32) as i16
    } else {
        (v * 0x7FFF as f32) as i16
    }
}

/// Build a complete 16-bit stereo PCM WAV file image.
///
/// Layout: 44-byte header (`RIFF` size `36 + frames*4`, `fmt ` PCM/2ch/16-bit,
/// `data` size `frames*4`) followed by interleaved little-endian samples.
pub fn encode_wav(left: &[f32], right: &[f32], sample_rate: u32) -> Vec<u8> {
    let frames = left.len().min(right.len());
    let data_bytes = (frames * 4) as u32;
    let mut out = Vec::with_capacity(44 + frames * 4);

    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&(36 + data_bytes).to_le_bytes());
    out.extend_from_slice(b"WAVE");

    out.extend_from_slice(b"fmt ");
    out.extend_from_slice(&16u32.to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes()); // PCM
    out.extend_from_slice(&2u16.to_le_bytes()); // stereo
    out.extend_from_slice(&sample_rate.to_le_bytes());
    out.extend_from_slice(&(sample_rate * 4).to_le_bytes()); // byte rate
    out.extend_from_slice(&4u16.to_le_bytes()); // block align
    out.extend_from_slice(&16u16.to_le_bytes()); // bits per sample

    out.extend_from_slice(b"data");
    out.extend_from_slice(&data_bytes.to_le_bytes());
    for n in 0..frames {
        out.extend_from_slice(&sample_to_i16(left[n]).to_le_bytes());
        out.extend_from_slice(&sample_to_i16(right[n]).to_le_bytes());
    }
    out
}

// ── Encoder sinks ────────────────────────────────────────────────────────────

enum EncoderSink {
    /// Child process consuming PCM on stdin. `as_i16` selects the sample
    /// format written to the pipe.
    Pipe {
        child: Child,
        stdin: ChildStdin,
        as_i16: bool,
    },
    /// In-memory float accumulation, flushed as WAV on finish.
    Accumulate { left: Vec<f32>, right: Vec<f32> },
}

fn make_sink(kind: EncoderKind, path: &Path, sample_rate: u32) -> Result<EncoderSink, String> {
    match kind {
        EncoderKind::NativeCompressed => {
            let rate = sample_rate.to_string();
            let mut child = Command::new("ffmpeg")
                .args([
                    "-hide_banner",
                    "-loglevel",
                    "error",
                    "-y",
                    "-f",
                    "f32le",
                    "-ac",
                    "2",
                    "-ar",
                    rate.as_str(),
                    "-i",
                    "pipe:0",
                    "-codec:a",
                    "libmp3lame",
                    "-q:a",
                    "2",
                ])
                .arg(path)
                .stdin(Stdio::piped())
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .spawn()
                .map_err(|e| format!("Failed to launch ffmpeg encoder: {}", e))?;
            let stdin = child
                .stdin
                .take()
                .ok_or_else(|| "ffmpeg stdin unavailable".to_string())?;
            Ok(EncoderSink::Pipe {
                child,
                stdin,
                as_i16: false,
            })
        }
        EncoderKind::SoftwareMp3 => {
            let rate = lame_rate_arg(sample_rate);
            let mut child = Command::new("lame")
                .args([
                    "-r",
                    "--little-endian",
                    "--signed",
                    "--bitwidth",
                    "16",
                    "-s",
                    rate.as_str(),
                    "-m",
                    "s",
                    "-",
                ])
                .arg(path)
                .stdin(Stdio::piped())
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .spawn()
                .map_err(|e| format!("Failed to launch lame: {}", e))?;
            let stdin = child
                .stdin
                .take()
                .ok_or_else(|| "lame stdin unavailable".to_string())?;
            Ok(EncoderSink::Pipe {
                child,
                stdin,
                as_i16: true,
            })
        }
        EncoderKind::RawPcmAccumulator => Ok(EncoderSink::Accumulate {
            left: Vec::new(),
            right: Vec::new(),
        }),
    }
}

/// lame expects the sample rate in kHz (`48`, `44.1`, …).
fn lame_rate_arg(sample_rate: u32) -> String {
    if sample_rate % 1000 == 0 {
        format!("{}", sample_rate / 1000)
    } else {
        format!("{:.1}", sample_rate as f64 / 1000.0)
    }
}

// ── Recorder ─────────────────────────────────────────────────────────────────

struct RecordingSession {
    kind: EncoderKind,
    path: PathBuf,
    worker: JoinHandle<Result<u64, String>>,
}

/// Owns the at-most-one recording session.
pub struct Recorder {
    sample_rate: u32,
    output_dir: PathBuf,
    preferred: EncoderKind,
    session: Option<RecordingSession>,
}

impl Recorder {
    pub fn new(sample_rate: u32, output_dir: PathBuf, preferred: EncoderKind) -> Self {
        Recorder {
            sample_rate,
            output_dir,
            preferred,
            session: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.session.is_some()
    }

    pub fn active_path(&self) -> Option<&Path> {
        self.session.as_ref().map(|s| s.path.as_path())
    }

    pub fn active_kind(&self) -> Option<EncoderKind> {
        self.session.as_ref().map(|s| s.kind)
    }

    /// Start a session, walking the fallback chain until an encoder comes
    /// up. Returns the tap sender to install on the graph, or `None` when a
    /// session is already active (a no-op per the front-panel contract).
    pub fn start(&mut self) -> Result<Option<SyncSender<Vec<f32>>>, String> {
        if self.session.is_some() {
            return Ok(None);
        }
        fs::create_dir_all(&self.output_dir).map_err(|e| {
            format!(
                "Cannot create recordings dir '{}': {}",
                self.output_dir.display(),
                e
            )
        })?;

        let chain: &[EncoderKind] = match self.preferred {
            EncoderKind::NativeCompressed => &[
                EncoderKind::NativeCompressed,
                EncoderKind::SoftwareMp3,
                EncoderKind::RawPcmAccumulator,
            ],
            EncoderKind::SoftwareMp3 => {
                &[EncoderKind::SoftwareMp3, EncoderKind::RawPcmAccumulator]
            }
            EncoderKind::RawPcmAccumulator => &[EncoderKind::RawPcmAccumulator],
        };

        let mut last_err = String::new();
        for &kind in chain {
            let path = timestamped_path(&self.output_dir, kind);
            match make_sink(kind, &path, self.sample_rate) {
                Ok(sink) => {
                    let (tx, rx) = sync_channel::<Vec<f32>>(TAP_QUEUE);
                    let out_path = path.clone();
                    let sample_rate = self.sample_rate;
                    let worker = std::thread::Builder::new()
                        .name("recorder".into())
                        .spawn(move || encode_loop(rx, sink, &out_path, sample_rate))
                        .map_err(|e| format!("Failed to spawn recorder thread: {}", e))?;
                    self.session = Some(RecordingSession { kind, path, worker });
                    return Ok(Some(tx));
                }
                Err(e) => last_err = e,
            }
        }
        Err(format!("No encoder available: {}", last_err))
    }

    /// Finish the session. The caller must already have dropped the tap
    /// sender (detached it from the graph) so the worker sees end-of-stream.
    /// Returns the finished file and frame count, or `None` when no session
    /// was active.
    pub fn stop(&mut self) -> Result<Option<(PathBuf, u64)>, String> {
        let Some(session) = self.session.take() else {
            return Ok(None);
        };
        let frames = session
            .worker
            .join()
            .map_err(|_| "Recorder thread panicked".to_string())??;
        Ok(Some((session.path, frames)))
    }
}

/// Worker: drain tap chunks into the sink until the sender disappears, then
/// finalize the file.
fn encode_loop(
    rx: Receiver<Vec<f32>>,
    mut sink: EncoderSink,
    path: &Path,
    sample_rate: u32,
) -> Result<u64, String> {
    let mut frames: u64 = 0;
    let mut byte_buf: Vec<u8> = Vec::new();

    while let Ok(chunk) = rx.recv() {
        frames += (chunk.len() / 2) as u64;
        match &mut sink {
            EncoderSink::Pipe { stdin, as_i16, .. } => {
                byte_buf.clear();
                if *as_i16 {
                    for &s in &chunk {
                        byte_buf.extend_from_slice(&sample_to_i16(s).to_le_bytes());
                    }
                } else {
                    for &s in &chunk {
                        byte_buf.extend_from_slice(&s.to_le_bytes());
                    }
                }
                stdin
                    .write_all(&byte_buf)
                    .map_err(|e| format!("Encoder pipe write failed: {}", e))?;
            }
            EncoderSink::Accumulate { left, right } => {
                for frame in chunk.chunks_exact(2) {
                    left.push(frame[0]);
                    right.push(frame[1]);
                }
            }
        }
    }

    match sink {
        EncoderSink::Pipe {
            mut child, stdin, ..
        } => {
            drop(stdin); // closes the pipe; the encoder flushes and exits
            let status = child
                .wait()
                .map_err(|e| format!("Encoder did not exit cleanly: {}", e))?;
            if !status.success() {
                return Err(format!(
                    "Encoder exited with status {}",
                    status.code().unwrap_or(-1)
                ));
            }
            Ok(frames)
        }
        EncoderSink::Accumulate { left, right } => {
            let wav = encode_wav(&left, &right, sample_rate);
            fs::write(path, &wav)
                .map_err(|e| format!("Cannot write '{}': {}", path.display(), e))?;
            Ok(frames)
        }
    }
}
