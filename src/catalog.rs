//! Station catalog — loads, flattens, and filters the station list.
//!
//! The scanner core only ever sees the flattened result: an ordered list of
//! `StationEntry` values, deduplicated by URL and filtered down to transports
//! the stream backend can open directly.

use serde_json::Value;
use std::fs;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

/// One scannable station. Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StationEntry {
    pub name: String,
    pub url: String,
}

/// Baked-in stations used when no catalog file can be read.
const FALLBACK_URLS: &[&str] = &[
    "https://icecast.radiofrance.fr/fip-midfi.mp3",
    "https://icecast.radiofrance.fr/fiprock-midfi.mp3",
    "https://icecast.radiofrance.fr/fipjazz-midfi.mp3",
    "https://icecast.radiofrance.fr/fipgroove-midfi.mp3",
    "https://stream.srg-ssr.ch/srgssr/rsj/aac/96",
    "https://stream.srg-ssr.ch/srgssr/rsc/aac/96",
    "https://stream.srg-ssr.ch/srgssr/rsp/aac/96",
];

pub fn fallback_stations() -> Vec<StationEntry> {
    FALLBACK_URLS
        .iter()
        .map(|url| StationEntry {
            name: host_of(url).unwrap_or_else(|| url.to_string()),
            url: url.to_string(),
        })
        .collect()
}

/// Load and normalize a stations JSON file. Falls back to the baked-in list
/// when the file is missing or yields no usable entries.
pub fn load_stations(path: &Path) -> Result<Vec<StationEntry>, String> {
    let data = fs::read_to_string(path)
        .map_err(|e| format!("Cannot read stations file '{}': {}", path.display(), e))?;
    let json: Value = serde_json::from_str(&data)
        .map_err(|e| format!("Invalid JSON in '{}': {}", path.display(), e))?;
    let mut list = normalize_stations(&json);
    if list.is_empty() {
        list = fallback_stations();
    }
    Ok(list)
}

/// Flatten a stations document into a deduplicated, shuffled entry list.
///
/// Accepted shapes:
/// - an array of `{name, url}` objects, each optionally carrying an
///   additional `urls: [...]` array of mirrors (expanded to ` #n` entries);
/// - an object mapping a group name to such an array.
pub fn normalize_stations(json: &Value) -> Vec<StationEntry> {
    let mut list: Vec<StationEntry> = Vec::new();

    let mut push = |name: Option<&str>, url: &str, suffix: String| {
        let url = url.trim();
        if !url.to_lowercase().starts_with("https:") {
            return;
        }
        if !is_directish(url) {
            return;
        }
        let nm = match name.map(str::trim).filter(|n| !n.is_empty()) {
            Some(n) => format!("{}{}", n, suffix),
            None => match host_of(url) {
                Some(h) => format!("{}{}", h, suffix),
                None => return,
            },
        };
        list.push(StationEntry {
            name: nm,
            url: url.to_string(),
        });
    };

    let mut push_station = |station: &Value, group: Option<&str>| {
        let name = station
            .get("name")
            .and_then(Value::as_str)
            .or(group);
        if let Some(url) = station.get("url").and_then(Value::as_str) {
            push(name, url, String::new());
        }
        if let Some(urls) = station.get("urls").and_then(Value::as_array) {
            for (k, u) in urls.iter().enumerate() {
                if let Some(u) = u.as_str() {
                    push(name, u, format!(" #{}", k + 1));
                }
            }
        }
    };

    match json {
        Value::Array(stations) => {
            for s in stations {
                push_station(s, None);
            }
        }
        Value::Object(groups) => {
            for (group, arr) in groups {
                if let Some(arr) = arr.as_array() {
                    for s in arr {
                        push_station(s, Some(group));
                    }
                }
            }
        }
        _ => {}
    }

    dedupe_by_url(&mut list);
    shuffle(&mut list);
    list
}

/// Reject playlist containers and aggregator pages — the backend wants a
/// direct audio stream it can open by URL.
pub fn is_directish(url: &str) -> bool {
    let lower = url.to_lowercase();
    let path = lower.split('?').next().unwrap_or(&lower);
    for ext in [".m3u8", ".m3u", ".pls", ".xspf"] {
        if path.ends_with(ext) {
            return false;
        }
    }
    const AGGREGATORS: &[&str] = &[
        "tunein.",
        "radio.garden",
        "streema",
        "radioline.",
        "deezer.",
        "spotify.",
    ];
    !AGGREGATORS.iter().any(|d| lower.contains(d))
}

/// Append a cache-defeating query parameter so live edges are never served
/// from a stale intermediary cache.
pub fn with_cache_bust(url: &str) -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0);
    let sep = if url.contains('?') { '&' } else { '?' };
    format!("{}{}ghostbox_live={}", url, sep, millis)
}

fn dedupe_by_url(list: &mut Vec<StationEntry>) {
    let mut seen = std::collections::HashSet::new();
    list.retain(|s| seen.insert(s.url.clone()));
}

fn shuffle(list: &mut [StationEntry]) {
    for i in (1..list.len()).rev() {
        let j = fastrand::usize(..=i);
        list.swap(i, j);
    }
}

fn host_of(url: &str) -> Option<String> {
    let rest = url.split("://").nth(1)?;
    let host = rest.split(['/', '?']).next()?;
    if host.is_empty() {
        None
    } else {
        Some(host.to_string())
    }
}
