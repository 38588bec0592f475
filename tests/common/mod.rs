//! Stub collaborators for driving the HTTP surface without model weights.

#![allow(dead_code)]

use std::sync::Arc;

use kokoro_tts_server::server::{create_router, AppState};
use kokoro_tts_server::{
    AcousticModel, BoxError, Device, EngineConfig, LoadedModels, ModelLoader, ModelManager,
    PhonemeSequence, PhonemizeError, Phonemizer, Waveform,
};

pub const SAMPLE_RATE: u32 = 16_000;

/// Maps each non-space character to one phoneme; `#` has no pronunciation
/// and `@` makes the converter fail.
pub struct CharPhonemizer;

impl Phonemizer for CharPhonemizer {
    fn phonemize(
        &self,
        text: &str,
        _voice: &str,
        _language: &str,
    ) -> Result<PhonemeSequence, PhonemizeError> {
        if text.contains('#') {
            return Err(PhonemizeError::Unsupported("no pronunciation for '#'".into()));
        }
        if text.contains('@') {
            return Err(PhonemizeError::Backend("converter binary not found".into()));
        }
        let phonemes: String = text.chars().filter(|c| !c.is_whitespace()).collect();
        let ids = phonemes.chars().map(|c| (c as i64 % 50) + 1).collect();
        Ok(PhonemeSequence { ids, phonemes })
    }
}

/// Emits a short ramp per phoneme; rejects the voice `missing`.
pub struct RampModel;

impl AcousticModel for RampModel {
    fn sample_rate(&self) -> u32 {
        SAMPLE_RATE
    }

    fn synthesize(
        &mut self,
        phonemes: &PhonemeSequence,
        voice: &str,
        speed: f32,
    ) -> Result<Waveform, BoxError> {
        if voice == "missing" {
            return Err(format!("voice '{voice}' not found").into());
        }
        let samples = phonemes
            .ids
            .iter()
            .flat_map(|&id| (0..32).map(move |i| ((id + i) % 64) as f32 / 128.0 * speed))
            .collect();
        Ok(Waveform::new(samples, SAMPLE_RATE))
    }
}

pub struct StubLoader;

impl ModelLoader for StubLoader {
    fn load(&self, _device: Device) -> Result<LoadedModels, BoxError> {
        Ok(LoadedModels {
            phonemizer: Box::new(CharPhonemizer),
            model: Box::new(RampModel),
        })
    }
}

/// Router over a manager that has not been initialized.
pub fn cold_app() -> (axum::Router, Arc<ModelManager>) {
    let models = Arc::new(ModelManager::new());
    (create_router(AppState::new(Arc::clone(&models))), models)
}

/// Router over a manager loaded with the stub collaborators.
pub fn ready_app(config: EngineConfig) -> (axum::Router, Arc<ModelManager>) {
    let (app, models) = cold_app();
    if let Err(e) = models.initialize(&StubLoader, &config) {
        panic!("stub initialization failed: {e}");
    }
    (app, models)
}
