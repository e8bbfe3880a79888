//! Session settings — persisted control defaults.
//!
//! The front panel's knob and switch positions survive restarts as a small
//! pretty-printed JSON file next to the working directory, with serde
//! defaults keeping old state files loadable as fields are added.

use crate::params::EffectParameters;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const STATE_FILE: &str = "ghostbox_state.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Stations JSON file to load at startup.
    #[serde(default)]
    pub stations_file: Option<PathBuf>,
    /// Where finished recordings land. Defaults to the platform music
    /// directory, falling back to the working directory.
    #[serde(default)]
    pub recordings_dir: Option<PathBuf>,

    #[serde(default = "default_speed")]
    pub speed: f32,
    #[serde(default = "default_volume")]
    pub volume: f32,
    #[serde(default = "default_echo")]
    pub echo: f32,
    #[serde(default = "default_burst")]
    pub burst: f32,

    #[serde(default)]
    pub auto_scan: bool,
    #[serde(default)]
    pub slow_scan: bool,
    #[serde(default)]
    pub advance_jitter: f32,

    #[serde(default)]
    pub squelch_enabled: bool,
    #[serde(default = "default_half")]
    pub squelch_sensitivity: f32,
    #[serde(default = "default_half")]
    pub squelch_hold: f32,

    #[serde(default)]
    pub ringmod_enabled: bool,
    #[serde(default = "default_half")]
    pub ringmod_level: f32,
}

fn default_speed() -> f32 {
    0.45
}

fn default_volume() -> f32 {
    0.9
}

fn default_echo() -> f32 {
    0.3
}

fn default_burst() -> f32 {
    0.4
}

fn default_half() -> f32 {
    0.5
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            stations_file: None,
            recordings_dir: None,
            speed: default_speed(),
            volume: default_volume(),
            echo: default_echo(),
            burst: default_burst(),
            auto_scan: false,
            slow_scan: false,
            advance_jitter: 0.0,
            squelch_enabled: false,
            squelch_sensitivity: default_half(),
            squelch_hold: default_half(),
            ringmod_enabled: false,
            ringmod_level: default_half(),
        }
    }
}

impl Settings {
    /// Load settings from the state file, or defaults if not found.
    pub fn load() -> Self {
        Self::load_from(Path::new(STATE_FILE))
    }

    pub fn load_from(path: &Path) -> Self {
        if path.exists() {
            match fs::read_to_string(path) {
                Ok(data) => match serde_json::from_str(&data) {
                    Ok(settings) => return settings,
                    Err(e) => eprintln!("Warning: corrupt state file, using defaults: {}", e),
                },
                Err(e) => eprintln!("Warning: could not read state file: {}", e),
            }
        }
        Settings::default()
    }

    /// Persist current settings to the state file.
    pub fn save(&self) -> Result<(), String> {
        self.save_to(Path::new(STATE_FILE))
    }

    pub fn save_to(&self, path: &Path) -> Result<(), String> {
        let json =
            serde_json::to_string_pretty(self).map_err(|e| format!("Serialize error: {}", e))?;
        fs::write(path, json).map_err(|e| format!("Write error: {}", e))?;
        Ok(())
    }

    /// Push every stored control value into a live parameter set.
    pub fn apply_to(&self, params: &EffectParameters) {
        params.set_speed(self.speed);
        params.set_volume(self.volume);
        params.set_echo(self.echo);
        params.set_burst(self.burst);
        params.set_auto_scan(self.auto_scan);
        params.set_slow_scan(self.slow_scan);
        params.set_advance_jitter(self.advance_jitter);
        params.set_squelch_enabled(self.squelch_enabled);
        params.set_squelch_sensitivity(self.squelch_sensitivity);
        params.set_squelch_hold(self.squelch_hold);
        params.set_ringmod_enabled(self.ringmod_enabled);
        params.set_ringmod_level(self.ringmod_level);
    }

    /// The effective recordings directory.
    pub fn recordings_dir_or_default(&self) -> PathBuf {
        self.recordings_dir.clone().unwrap_or_else(|| {
            dirs::audio_dir().unwrap_or_else(|| PathBuf::from("."))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_panel() {
        let s = Settings::default();
        assert_eq!(s.speed, 0.45);
        assert_eq!(s.volume, 0.9);
        assert_eq!(s.echo, 0.3);
        assert_eq!(s.burst, 0.4);
        assert!(!s.auto_scan);
        assert!(!s.squelch_enabled);
    }

    #[test]
    fn roundtrip_preserves_values() {
        let mut s = Settings::default();
        s.speed = 0.8;
        s.squelch_enabled = true;
        s.squelch_hold = 0.75;
        s.stations_file = Some(PathBuf::from("stations.json"));
        let json = serde_json::to_string(&s).unwrap();
        let loaded: Settings = serde_json::from_str(&json).unwrap();
        assert_eq!(loaded.speed, 0.8);
        assert!(loaded.squelch_enabled);
        assert_eq!(loaded.squelch_hold, 0.75);
        assert_eq!(loaded.stations_file, Some(PathBuf::from("stations.json")));
    }

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        // An old state file that predates most knobs.
        let json = r#"{"speed": 0.2}"#;
        let s: Settings = serde_json::from_str(json).unwrap();
        assert_eq!(s.speed, 0.2);
        assert_eq!(s.volume, 0.9);
        assert_eq!(s.squelch_sensitivity, 0.5);
        assert!(!s.ringmod_enabled);
    }

    #[test]
    fn apply_pushes_values_into_params() {
        let mut s = Settings::default();
        s.volume = 0.55;
        s.ringmod_enabled = true;
        s.ringmod_level = 0.9;
        let params = EffectParameters::new();
        s.apply_to(&params);
        assert_eq!(params.volume(), 0.55);
        assert!(params.ringmod_enabled());
        assert_eq!(params.ringmod_level(), 0.9);
    }

    #[test]
    fn load_from_missing_file_gives_defaults() {
        let s = Settings::load_from(Path::new("__no_such_state__.json"));
        assert_eq!(s.speed, 0.45);
    }

    #[test]
    fn save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let mut s = Settings::default();
        s.burst = 0.65;
        s.save_to(&path).unwrap();
        let loaded = Settings::load_from(&path);
        assert_eq!(loaded.burst, 0.65);
    }
}
