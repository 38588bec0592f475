use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::audio::Waveform;
use crate::lifecycle::{Device, LoadedModels, ModelLoader};
use crate::{AcousticModel, BoxError, PhonemeSequence, PhonemizeError, Phonemizer};

pub const STUB_SAMPLE_RATE: u32 = 22_050;

/// One phoneme per non-space character; `#` is unsupported and `@` crashes
/// the converter.
pub struct StubPhonemizer;

impl Phonemizer for StubPhonemizer {
    fn phonemize(&self, text: &str, _voice: &str, _language: &str) -> Result<PhonemeSequence, PhonemizeError> {
        if text.contains('#') {
            return Err(PhonemizeError::Unsupported("unsupported character '#'".into()));
        }
        if text.contains('@') {
            return Err(PhonemizeError::Backend("converter exited with signal 11".into()));
        }
        let phonemes: String = text.chars().filter(|c| !c.is_whitespace()).collect();
        let ids = phonemes.chars().map(|c| (c as i64 % 100) + 1).collect();
        Ok(PhonemeSequence { ids, phonemes })
    }
}

/// Deterministic audio derived from phonemes, voice and speed.
#[derive(Clone)]
pub struct StubModel {
    pub sample_rate: u32,
    pub delay: Duration,
    pub speeds: Arc<Mutex<Vec<f32>>>,
    pub calls: Arc<AtomicUsize>,
    pub released: Arc<AtomicBool>,
}

impl Default for StubModel {
    fn default() -> Self {
        Self {
            sample_rate: STUB_SAMPLE_RATE,
            delay: Duration::ZERO,
            speeds: Arc::default(),
            calls: Arc::default(),
            released: Arc::default(),
        }
    }
}

impl StubModel {
    pub fn with_sample_rate(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            ..Default::default()
        }
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Default::default()
        }
    }
}

impl AcousticModel for StubModel {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn synthesize(&mut self, phonemes: &PhonemeSequence, voice: &str, speed: f32) -> Result<Waveform, BoxError> {
        if self.released.load(Ordering::SeqCst) {
            return Err("model released".into());
        }
        if voice == "broken" {
            return Err(format!("voice '{voice}' not found").into());
        }
        self.calls.fetch_add(1, Ordering::SeqCst);
        std::thread::sleep(self.delay);
        self.speeds.lock().push(speed);

        let voice_gain = voice.bytes().map(u32::from).sum::<u32>() as f32 / 1000.0;
        let samples = phonemes
            .ids
            .iter()
            .flat_map(|&id| (0..10).map(move |i| ((id + i) as f32 / 200.0) * voice_gain * speed))
            .map(|s| s.clamp(-1.0, 1.0))
            .collect();
        Ok(Waveform::new(samples, self.sample_rate))
    }

    fn release(&mut self) {
        self.released.store(true, Ordering::SeqCst);
    }
}

#[derive(Clone, Default)]
pub struct StubLoader {
    pub fail_load: bool,
    pub load_delay: Duration,
    pub model: StubModel,
}

impl ModelLoader for StubLoader {
    fn load(&self, _device: Device) -> Result<LoadedModels, BoxError> {
        std::thread::sleep(self.load_delay);
        if self.fail_load {
            return Err("model weights missing".into());
        }
        Ok(LoadedModels {
            phonemizer: Box::new(StubPhonemizer),
            model: Box::new(self.model.clone()),
        })
    }
}
