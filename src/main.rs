use clap::{Parser, Subcommand};
use ghostbox::catalog;
use ghostbox::params::EffectParameters;
use ghostbox::recorder;
use ghostbox::runtime::{RuntimeConfig, RuntimeEvent, spawn_runtime};
use ghostbox::settings::Settings;
use ghostbox::transport::{ProcessTransport, StreamTransport};
use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "ghostbox", about = "Internet-radio ghostbox scanner CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Power on and scan (interactive: n=next, r=record, q=quit)
    Scan {
        /// Stations JSON file (overrides config)
        #[arg(short, long)]
        stations: Option<PathBuf>,
        /// Start with auto-scan enabled
        #[arg(short, long)]
        auto: bool,
        /// Scan speed 0–1 (0 = fastest, ~250 ms)
        #[arg(long)]
        speed: Option<f32>,
        /// Output level 0–1
        #[arg(long)]
        volume: Option<f32>,
        /// Echo depth 0–1
        #[arg(long)]
        echo: Option<f32>,
        /// Noise-burst intensity 0–1
        #[arg(long)]
        burst: Option<f32>,
        /// Hold on a station while voice is detected
        #[arg(long)]
        squelch: bool,
        /// Squelch sensitivity 0–1
        #[arg(long)]
        sensitivity: Option<f32>,
        /// Squelch hold length 0–1 (0.4–3.5 s)
        #[arg(long)]
        hold: Option<f32>,
        /// Enable the ring-modulation voice at the given level 0–1
        #[arg(long)]
        ringmod: Option<f32>,
        /// Scan interval jitter fraction 0–1
        #[arg(long)]
        jitter: Option<f32>,
        /// Slow mode: scan interval x2.5
        #[arg(long)]
        slow: bool,
        /// Start recording immediately
        #[arg(short, long)]
        record: bool,
        /// Run for a fixed number of seconds instead of interactively
        #[arg(short, long)]
        duration: Option<u64>,
    },
    /// Load and list the station catalog
    Stations {
        /// Stations JSON file (overrides config)
        file: Option<PathBuf>,
    },
    /// Show detected stream/encoder capabilities
    Probe,
    /// Session configuration
    Config {
        #[command(subcommand)]
        action: ConfigCmd,
    },
}

#[derive(Subcommand)]
enum ConfigCmd {
    /// Show current settings
    Show,
    /// Set the default stations file
    Stations { file: PathBuf },
    /// Set the recordings output directory
    RecordingsDir { dir: PathBuf },
}

fn main() {
    let cli = Cli::parse();
    match cli.command {
        Commands::Scan {
            stations,
            auto,
            speed,
            volume,
            echo,
            burst,
            squelch,
            sensitivity,
            hold,
            ringmod,
            jitter,
            slow,
            record,
            duration,
        } => {
            let mut settings = Settings::load();
            if let Some(v) = speed {
                settings.speed = v;
            }
            if let Some(v) = volume {
                settings.volume = v;
            }
            if let Some(v) = echo {
                settings.echo = v;
            }
            if let Some(v) = burst {
                settings.burst = v;
            }
            if let Some(v) = sensitivity {
                settings.squelch_sensitivity = v;
            }
            if let Some(v) = hold {
                settings.squelch_hold = v;
            }
            if let Some(v) = ringmod {
                settings.ringmod_enabled = true;
                settings.ringmod_level = v;
            }
            if let Some(v) = jitter {
                settings.advance_jitter = v;
            }
            settings.auto_scan |= auto;
            settings.slow_scan |= slow;
            settings.squelch_enabled |= squelch;

            let stations_file = stations.or(settings.stations_file.clone());
            run_scan(settings, stations_file, record, duration);
        }
        Commands::Stations { file } => {
            let settings = Settings::load();
            let list = resolve_stations(file.or(settings.stations_file));
            println!("{} station(s):", list.len());
            for (n, s) in list.iter().enumerate() {
                println!("  {:3}. {} — {}", n + 1, s.name, s.url);
            }
        }
        Commands::Probe => {
            match ProcessTransport::probe(48_000) {
                Ok(t) => {
                    let mode = if t.can_tap_decoded_signal() {
                        "shaped (decoded signal tap available)"
                    } else {
                        "unshaped (native playback, limited processing)"
                    };
                    println!("stream backend: {}", mode);
                }
                Err(e) => println!("stream backend: unavailable — {}", e),
            }
            println!("recording encoder: {}", recorder::preferred_encoder());
        }
        Commands::Config { action } => match action {
            ConfigCmd::Show => {
                let settings = Settings::load();
                println!("stations file:  {:?}", settings.stations_file);
                println!(
                    "recordings dir: {}",
                    settings.recordings_dir_or_default().display()
                );
                println!(
                    "speed {:.2}  volume {:.2}  echo {:.2}  burst {:.2}",
                    settings.speed, settings.volume, settings.echo, settings.burst
                );
                println!(
                    "auto {}  slow {}  jitter {:.2}",
                    settings.auto_scan, settings.slow_scan, settings.advance_jitter
                );
                println!(
                    "squelch {} (sensitivity {:.2}, hold {:.2})",
                    settings.squelch_enabled, settings.squelch_sensitivity, settings.squelch_hold
                );
                println!(
                    "ringmod {} (level {:.2})",
                    settings.ringmod_enabled, settings.ringmod_level
                );
            }
            ConfigCmd::Stations { file } => {
                let mut settings = Settings::load();
                settings.stations_file = Some(file);
                exit_on_err(settings.save());
                println!("Stations file saved.");
            }
            ConfigCmd::RecordingsDir { dir } => {
                let mut settings = Settings::load();
                settings.recordings_dir = Some(dir);
                exit_on_err(settings.save());
                println!("Recordings directory saved.");
            }
        },
    }
}

fn resolve_stations(file: Option<PathBuf>) -> Vec<catalog::StationEntry> {
    match file {
        Some(path) => match catalog::load_stations(&path) {
            Ok(list) => list,
            Err(e) => {
                eprintln!("{} — using built-in stations", e);
                catalog::fallback_stations()
            }
        },
        None => catalog::fallback_stations(),
    }
}

fn run_scan(
    settings: Settings,
    stations_file: Option<PathBuf>,
    record: bool,
    duration: Option<u64>,
) {
    let stations = resolve_stations(stations_file);
    if stations.is_empty() {
        eprintln!("No playable stations.");
        std::process::exit(1);
    }

    let transport = match ProcessTransport::probe(48_000) {
        Ok(t) => t,
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    };
    if !transport.can_tap_decoded_signal() {
        println!("Note: no decoder tap available — limited processing mode.");
    }

    let params = Arc::new(EffectParameters::new());
    settings.apply_to(&params);

    let config = RuntimeConfig::new(
        settings.recordings_dir_or_default(),
        recorder::preferred_encoder(),
    );
    let handle = spawn_runtime(
        stations,
        Box::new(transport),
        params.clone(),
        config,
        print_event,
    );

    handle.power_on();
    if record {
        handle.start_recording();
    }

    match duration {
        Some(secs) => std::thread::sleep(Duration::from_secs(secs)),
        None => {
            println!("Commands: n = next station, r = toggle record, a = toggle auto, q = quit");
            let stdin = std::io::stdin();
            let mut recording = record;
            for line in stdin.lock().lines() {
                let line = match line {
                    Ok(l) => l,
                    Err(_) => break,
                };
                match line.trim() {
                    "n" | "next" => handle.advance(),
                    "r" | "record" => {
                        if recording {
                            handle.stop_recording();
                        } else {
                            handle.start_recording();
                        }
                        recording = !recording;
                    }
                    "a" | "auto" => params.set_auto_scan(!params.auto_scan()),
                    "q" | "quit" => break,
                    "" => {}
                    other => println!("Unknown command '{}'", other),
                }
            }
        }
    }

    handle.power_off();
    handle.shutdown();
    // Let the runtime flush any open recording before the process exits.
    std::thread::sleep(Duration::from_millis(200));
}

fn print_event(event: RuntimeEvent) {
    match event {
        RuntimeEvent::State(_) => {}
        RuntimeEvent::Status(status) => println!("  [{}]", status),
        RuntimeEvent::Station { index, name } => println!("> {:3}. {}", index + 1, name),
        RuntimeEvent::RecordingStarted { path, encoder } => {
            println!("* recording ({}) -> {}", encoder, path.display())
        }
        RuntimeEvent::RecordingStopped { path, frames } => {
            println!("* recorded {} frames -> {}", frames, path.display())
        }
        RuntimeEvent::Error(e) => eprintln!("  error: {}", e),
    }
}

fn exit_on_err(result: Result<(), String>) {
    if let Err(e) = result {
        eprintln!("{}", e);
        std::process::exit(1);
    }
}
