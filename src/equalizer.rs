use serde::{Deserialize, Serialize};

/// What a slider controls. Serialized with a `kind` tag so the backend can
/// tell a frequency band from a voice or an AI stem.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SliderKind {
    Range { min_hz: f32, max_hz: f32 },
    Voice { voice_key: String },
    Stem { stem_name: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Slider {
    pub label: String,
    /// Linear gain, 1.0 = unchanged.
    pub gain: f32,
    #[serde(flatten)]
    pub kind: SliderKind,
}

impl Slider {
    pub const MIN_GAIN: f32 = 0.0;
    pub const MAX_GAIN: f32 = 2.0;

    pub fn range(label: &str, min_hz: f32, max_hz: f32) -> Self {
        Self { label: label.to_string(), gain: 1.0, kind: SliderKind::Range { min_hz, max_hz } }
    }

    pub fn voice(label: &str, voice_key: &str) -> Self {
        Self {
            label: label.to_string(),
            gain: 1.0,
            kind: SliderKind::Voice { voice_key: voice_key.to_string() },
        }
    }

    pub fn stem(label: &str, stem_name: &str) -> Self {
        Self {
            label: label.to_string(),
            gain: 1.0,
            kind: SliderKind::Stem { stem_name: stem_name.to_string() },
        }
    }
}

/// Slider set plus the mode it belongs to. Sent with every window and
/// equalize request as a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EqualizerSettings {
    pub sliders: Vec<Slider>,
    pub mode: String,
}

impl EqualizerSettings {
    pub fn new(mode: &str, sliders: Vec<Slider>) -> Self {
        Self { sliders, mode: mode.to_string() }
    }

    /// Returns false when the index is out of range or the gain is unchanged.
    pub fn set_gain(&mut self, index: usize, gain: f32) -> bool {
        if !gain.is_finite() {
            return false;
        }
        let Some(slider) = self.sliders.get_mut(index) else { return false; };
        let gain = gain.clamp(Slider::MIN_GAIN, Slider::MAX_GAIN);
        if (slider.gain - gain).abs() < f32::EPSILON {
            return false;
        }
        slider.gain = gain;
        true
    }

    pub fn reset_gains(&mut self) {
        for slider in &mut self.sliders {
            slider.gain = 1.0;
        }
    }

    pub fn is_flat(&self) -> bool {
        self.sliders.iter().all(|s| (s.gain - 1.0).abs() < f32::EPSILON)
    }
}

impl Default for EqualizerSettings {
    fn default() -> Self {
        Self { sliders: Vec::new(), mode: "uniform".to_string() }
    }
}

// ============================================================================
// UNIT TESTS
// ============================================================================
