//! Equalizer mode presets and a small TTL cache in front of them.
//!
//! A mode is a named slider layout. Where the layouts come from (built-in
//! tables, a config file, the backend) is behind `ModeSource`; the cache only
//! knows how to keep the last load around for a while.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::equalizer::{EqualizerSettings, Slider};

pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModeConfig {
    pub name: String,
    pub sliders: Vec<Slider>,
}

impl ModeConfig {
    /// Fresh settings for this mode with every gain at unity.
    pub fn settings(&self) -> EqualizerSettings {
        let mut settings = EqualizerSettings::new(&self.name, self.sliders.clone());
        settings.reset_gains();
        settings
    }
}

pub trait ModeSource {
    fn load(&self) -> Result<Vec<ModeConfig>>;
}

impl<S: ModeSource + ?Sized> ModeSource for Box<S> {
    fn load(&self) -> Result<Vec<ModeConfig>> {
        (**self).load()
    }
}

pub trait Clock {
    fn now(&self) -> Instant;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

// ─── Built-in presets ──────────────────────────────────────────────────────────

/// The four stock modes.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinModes;

impl BuiltinModes {
    pub fn all() -> Vec<ModeConfig> {
        vec![
            ModeConfig {
                name: "uniform".to_string(),
                // Ten equal-width bands up to 10 kHz
                sliders: (0..10)
                    .map(|i| {
                        let lo = i as f32 * 1000.0;
                        let hi = lo + 1000.0;
                        Slider::range(&format!("{}-{} Hz", lo as u32, hi as u32), lo, hi)
                    })
                    .collect(),
            },
            ModeConfig {
                name: "musical".to_string(),
                sliders: vec![
                    Slider::range("Bass", 40.0, 250.0),
                    Slider::range("Piano", 250.0, 1000.0),
                    Slider::range("Guitar", 1000.0, 3000.0),
                    Slider::range("Violin", 3000.0, 8000.0),
                ],
            },
            ModeConfig {
                name: "animal".to_string(),
                sliders: vec![
                    Slider::voice("Dog", "dog"),
                    Slider::voice("Cat", "cat"),
                    Slider::voice("Bird", "bird"),
                    Slider::voice("Cow", "cow"),
                ],
            },
            ModeConfig {
                name: "ai_stems".to_string(),
                sliders: vec![
                    Slider::stem("Vocals", "vocals"),
                    Slider::stem("Drums", "drums"),
                    Slider::stem("Bass", "bass"),
                    Slider::stem("Other", "other"),
                ],
            },
        ]
    }
}

impl ModeSource for BuiltinModes {
    fn load(&self) -> Result<Vec<ModeConfig>> {
        Ok(Self::all())
    }
}

/// Modes from a JSON file holding an array of `ModeConfig`. The file is
/// re-read on every refresh, so edits show up once the cache expires.
pub struct JsonModes {
    path: PathBuf,
}

impl JsonModes {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ModeSource for JsonModes {
    fn load(&self) -> Result<Vec<ModeConfig>> {
        let text = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read mode file {}", self.path.display()))?;
        parse_modes(&text).with_context(|| format!("Invalid mode file {}", self.path.display()))
    }
}

pub fn parse_modes(text: &str) -> Result<Vec<ModeConfig>> {
    let modes: Vec<ModeConfig> = serde_json::from_str(text)?;
    if modes.is_empty() {
        return Err(anyhow!("no modes defined"));
    }
    Ok(modes)
}

// ─── Cache ─────────────────────────────────────────────────────────────────────

struct CacheEntry {
    modes: HashMap<String, ModeConfig>,
    loaded_at: Instant,
}

pub struct ModeCache<S: ModeSource, C: Clock = SystemClock> {
    source: S,
    clock: C,
    ttl: Duration,
    entry: Option<CacheEntry>,
}

impl<S: ModeSource> ModeCache<S, SystemClock> {
    pub fn new(source: S) -> Self {
        Self::with_clock(source, SystemClock, DEFAULT_TTL)
    }
}

impl<S: ModeSource, C: Clock> ModeCache<S, C> {
    pub fn with_clock(source: S, clock: C, ttl: Duration) -> Self {
        Self { source, clock, ttl, entry: None }
    }

    pub fn is_fresh(&self) -> bool {
        self.entry
            .as_ref()
            .is_some_and(|e| self.clock.now().saturating_duration_since(e.loaded_at) < self.ttl)
    }

    pub fn get(&mut self, name: &str) -> Result<ModeConfig> {
        if !self.is_fresh() {
            self.refresh()?;
        }
        self.entry
            .as_ref()
            .and_then(|e| e.modes.get(name))
            .cloned()
            .ok_or_else(|| anyhow!("Unknown mode '{}'", name))
    }

    /// Sorted mode names, loading if needed.
    pub fn names(&mut self) -> Result<Vec<String>> {
        if !self.is_fresh() {
            self.refresh()?;
        }
        let mut names: Vec<String> = self
            .entry
            .as_ref()
            .map(|e| e.modes.keys().cloned().collect())
            .unwrap_or_default();
        names.sort();
        Ok(names)
    }

    pub fn invalidate(&mut self) {
        self.entry = None;
    }

    /// Reload from the source. A failed reload keeps the previous entry.
    pub fn refresh(&mut self) -> Result<()> {
        let modes = self.source.load()?;
        log::info!("[Modes] loaded {} mode(s)", modes.len());
        self.entry = Some(CacheEntry {
            modes: modes.into_iter().map(|m| (m.name.clone(), m)).collect(),
            loaded_at: self.clock.now(),
        });
        Ok(())
    }
}

// ============================================================================
// UNIT TESTS
// ============================================================================
