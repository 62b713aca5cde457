use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::engine::controller::ControllerConfig;
use crate::engine::session::EngineConfig;
use crate::engine::window::WindowPolicy;
use crate::modes::{BuiltinModes, JsonModes, ModeSource};
use crate::traces::FreqScale;

pub const BACKEND_URL_ENV: &str = "EQ_CINE_BACKEND_URL";

/// All viewer settings, loaded from INI file or defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    // ── Backend ──
    pub base_url: String,
    pub request_timeout_ms: u64,

    // ── Playback ──
    pub tick_rate_hz: f64,     // 20..=60
    pub fetch_throttle_ms: u64, // 30..=100
    pub base_window_seconds: f64,
    pub max_zoom: f64, // 10..=100
    pub window_policy: WindowPolicy,
    pub max_speed: f64,

    // ── Traces ──
    pub waveform_max_points: usize,
    pub fft_max_points: usize,
    pub fft_scale: FreqScale,

    // ── Equalizer ──
    pub mode: String,
    /// JSON mode file; empty uses the built-in presets.
    pub modes_file: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:5000".to_string(),
            request_timeout_ms: 10_000,

            tick_rate_hz: 30.0,
            fetch_throttle_ms: 50,
            base_window_seconds: 2.0,
            max_zoom: 20.0,
            window_policy: WindowPolicy::Centered,
            max_speed: 4.0,

            waveform_max_points: 2000,
            fft_max_points: 1000,
            fft_scale: FreqScale::Linear,

            mode: "uniform".to_string(),
            modes_file: String::new(),
        }
    }
}

impl Settings {
    pub const FILE_NAME: &'static str = "settings.ini";

    /// Load `settings.ini` from the working directory, writing defaults if
    /// it does not exist, then apply the environment override.
    pub fn load_or_create() -> Self {
        let mut settings = Self::load_from(Path::new(Self::FILE_NAME));
        settings.apply_backend_override(std::env::var(BACKEND_URL_ENV).ok());
        settings
    }

    pub fn load_from(path: &Path) -> Self {
        if path.exists() {
            match fs::read_to_string(path) {
                Ok(content) => Self::from_ini(&content),
                Err(e) => {
                    log::warn!("[Settings] Could not read {}: {}. Using defaults.", path.display(), e);
                    Self::default()
                }
            }
        } else {
            let settings = Self::default();
            settings.save_to(path);
            settings
        }
    }

    pub fn save_to(&self, path: &Path) {
        if let Err(e) = fs::write(path, self.to_ini()) {
            log::warn!("[Settings] Could not save {}: {}", path.display(), e);
        }
    }

    /// Non-empty override replaces `base_url`.
    pub fn apply_backend_override(&mut self, value: Option<String>) {
        if let Some(url) = value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty()) {
            log::info!("[Settings] {} overrides base_url -> {}", BACKEND_URL_ENV, url);
            self.base_url = url;
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            controller: ControllerConfig {
                base_window: self.base_window_seconds,
                max_zoom: self.max_zoom,
                max_speed: self.max_speed,
                policy: self.window_policy,
            },
            tick_rate_hz: self.tick_rate_hz,
            fetch_throttle: Duration::from_millis(self.fetch_throttle_ms),
            waveform_max_points: self.waveform_max_points,
            fft_max_points: self.fft_max_points,
            fft_scale: self.fft_scale,
        }
    }

    pub fn mode_source(&self) -> Box<dyn ModeSource> {
        if self.modes_file.is_empty() {
            Box::new(BuiltinModes)
        } else {
            log::info!("[Settings] loading modes from {}", self.modes_file);
            Box::new(JsonModes::new(&self.modes_file))
        }
    }

    fn to_ini(&self) -> String {
        let mut s = String::new();
        s.push_str("# eqCine Settings\n");
        s.push_str("# Edit values below. Delete this file to reset to defaults.\n\n");

        s.push_str("[Backend]\n");
        s.push_str(&format!("# {} overrides base_url\n", BACKEND_URL_ENV));
        s.push_str(&format!("base_url = {}\n", self.base_url));
        s.push_str(&format!("request_timeout_ms = {}\n", self.request_timeout_ms));
        s.push('\n');

        s.push_str("[Playback]\n");
        s.push_str("# tick_rate_hz: 20-60, fetch_throttle_ms: 30-100\n");
        s.push_str(&format!("tick_rate_hz = {}\n", self.tick_rate_hz));
        s.push_str(&format!("fetch_throttle_ms = {}\n", self.fetch_throttle_ms));
        s.push_str(&format!("base_window_seconds = {}\n", self.base_window_seconds));
        s.push_str(&format!("max_zoom = {}\n", self.max_zoom));
        s.push_str("# window_policy: Centered or Forward\n");
        s.push_str(&format!("window_policy = {}\n", self.window_policy.name()));
        s.push_str(&format!("max_speed = {}\n", self.max_speed));
        s.push('\n');

        s.push_str("[Traces]\n");
        s.push_str(&format!("waveform_max_points = {}\n", self.waveform_max_points));
        s.push_str(&format!("fft_max_points = {}\n", self.fft_max_points));
        s.push_str("# fft_scale: Linear or Audiogram\n");
        s.push_str(&format!("fft_scale = {}\n", self.fft_scale.name()));
        s.push('\n');

        s.push_str("[Equalizer]\n");
        s.push_str("# mode: uniform, musical, animal, ai_stems\n");
        s.push_str(&format!("mode = {}\n", self.mode));
        s.push_str("# modes_file: JSON array of modes; empty uses the built-in set\n");
        s.push_str(&format!("modes_file = {}\n", self.modes_file));

        s
    }

    pub fn from_ini(content: &str) -> Self {
        let mut settings = Self::default();
        settings.parse_ini(content);
        settings
    }

    fn parse_ini(&mut self, content: &str) {
        let map = parse_ini_to_map(content);

        // Backend
        if let Some(v) = map.get("base_url") {
            if !v.is_empty() {
                self.base_url = v.clone();
            }
        }
        parse_into(&map, "request_timeout_ms", &mut self.request_timeout_ms);

        // Playback
        parse_into(&map, "tick_rate_hz", &mut self.tick_rate_hz);
        parse_into(&map, "fetch_throttle_ms", &mut self.fetch_throttle_ms);
        parse_into(&map, "base_window_seconds", &mut self.base_window_seconds);
        parse_into(&map, "max_zoom", &mut self.max_zoom);
        parse_into(&map, "max_speed", &mut self.max_speed);
        if let Some(v) = map.get("window_policy") {
            match WindowPolicy::from_name(v) {
                Some(policy) => self.window_policy = policy,
                None => log::warn!("[Settings] unknown window_policy '{}', keeping {}", v, self.window_policy.name()),
            }
        }

        // Traces
        parse_into(&map, "waveform_max_points", &mut self.waveform_max_points);
        parse_into(&map, "fft_max_points", &mut self.fft_max_points);
        if let Some(v) = map.get("fft_scale") {
            match FreqScale::from_name(v) {
                Some(scale) => self.fft_scale = scale,
                None => log::warn!("[Settings] unknown fft_scale '{}', keeping {}", v, self.fft_scale.name()),
            }
        }

        // Equalizer
        if let Some(v) = map.get("mode") {
            if !v.is_empty() {
                self.mode = v.clone();
            }
        }

        if let Some(v) = map.get("modes_file") {
            self.modes_file = v.clone();
        }

        self.clamp_ranges();
    }

    fn clamp_ranges(&mut self) {
        if !self.tick_rate_hz.is_finite() {
            self.tick_rate_hz = 30.0;
        }
        self.tick_rate_hz = self.tick_rate_hz.clamp(20.0, 60.0);
        self.fetch_throttle_ms = self.fetch_throttle_ms.clamp(30, 100);
        if !self.max_zoom.is_finite() {
            self.max_zoom = 20.0;
        }
        self.max_zoom = self.max_zoom.clamp(10.0, 100.0);
        if !(self.base_window_seconds.is_finite() && self.base_window_seconds > 0.0) {
            log::warn!("[Settings] base_window_seconds must be positive, using 2.0");
            self.base_window_seconds = 2.0;
        }
        if !(self.max_speed.is_finite() && self.max_speed >= 1.0) {
            log::warn!("[Settings] max_speed must be at least 1.0, using 4.0");
            self.max_speed = 4.0;
        }
    }
}

/// Parse INI content into a flat key-value map (section headers are ignored,
/// keys are globally unique in our format).
fn parse_ini_to_map(content: &str) -> HashMap<String, String> {
    let mut map = HashMap::new();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') || line.starts_with('[') {
            continue;
        }
        if let Some((key, val)) = line.split_once('=') {
            map.insert(key.trim().to_string(), val.trim().to_string());
        }
    }
    map
}

fn parse_into<T: std::str::FromStr>(map: &HashMap<String, String>, key: &str, slot: &mut T) {
    if let Some(v) = map.get(key) {
        match v.parse() {
            Ok(n) => *slot = n,
            Err(_) => log::warn!("[Settings] ignoring invalid {} = '{}'", key, v),
        }
    }
}

// ============================================================================
// UNIT TESTS
// ============================================================================
