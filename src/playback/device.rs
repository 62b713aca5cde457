use miniaudio::{Device, DeviceConfig, DeviceType, Format};
use std::sync::{Arc, Mutex};

use anyhow::{Result, anyhow};

use super::listen::AudioOutput;

struct VoiceData {
    samples: Arc<Vec<f32>>,
    position: usize,
    active: bool,
}

/// Mono f32 output on the default playback device.
///
/// The device is created lazily and rebuilt whenever a buffer arrives at a
/// different sample rate.
pub struct MiniaudioOutput {
    device: Option<Device>,
    device_rate: u32,
    voice: Arc<Mutex<VoiceData>>,
}

impl MiniaudioOutput {
    pub fn new() -> Self {
        Self {
            device: None,
            device_rate: 0,
            voice: Arc::new(Mutex::new(VoiceData {
                samples: Arc::new(Vec::new()),
                position: 0,
                active: false,
            })),
        }
    }

    fn init_device(&mut self, sample_rate: u32) -> Result<()> {
        // Dropping the old device stops its callback
        self.device = None;

        let voice = Arc::clone(&self.voice);

        let mut config = DeviceConfig::new(DeviceType::Playback);
        config.playback_mut().set_format(Format::F32);
        config.playback_mut().set_channels(1);
        config.set_sample_rate(sample_rate);

        config.set_data_callback(move |_device, output, _input| {
            let frames = output.as_samples_mut::<f32>();
            let Ok(mut data) = voice.lock() else {
                frames.fill(0.0);
                return;
            };

            if !data.active {
                frames.fill(0.0);
                return;
            }

            for sample in frames {
                if data.position < data.samples.len() {
                    *sample = data.samples[data.position];
                    data.position += 1;
                } else {
                    data.active = false;
                    *sample = 0.0;
                }
            }
        });

        let device = Device::new(None, &config)
            .map_err(|e| anyhow!("Failed to create audio device: {:?}", e))?;
        device.start()
            .map_err(|e| anyhow!("Failed to start audio device: {:?}", e))?;

        log::debug!("[Listen] audio device opened at {} Hz", sample_rate);
        self.device = Some(device);
        self.device_rate = sample_rate;
        Ok(())
    }

    fn with_voice<R>(&self, f: impl FnOnce(&mut VoiceData) -> R) -> Option<R> {
        self.voice.lock().ok().map(|mut data| f(&mut data))
    }
}

impl Default for MiniaudioOutput {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioOutput for MiniaudioOutput {
    fn start(&mut self, samples: Arc<Vec<f32>>, sample_rate: u32) -> Result<()> {
        self.stop();
        if self.device.is_none() || self.device_rate != sample_rate {
            self.init_device(sample_rate)?;
        }
        self.with_voice(|data| {
            data.samples = samples;
            data.position = 0;
            data.active = true;
        })
        .ok_or_else(|| anyhow!("Audio voice lock poisoned"))
    }

    fn stop(&mut self) {
        self.with_voice(|data| {
            data.active = false;
            data.position = 0;
        });
    }

    fn is_active(&self) -> bool {
        self.with_voice(|data| data.active).unwrap_or(false)
    }
}
