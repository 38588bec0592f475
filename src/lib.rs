//! # kokoro-tts-server
//!
//! A network text-to-speech service built around the Kokoro engine.
//!
//! ## Features
//!
//! - **Shared model lifecycle**: the G2P converter and acoustic model are loaded
//!   once, published through a [`ModelManager`] and torn down on shutdown
//! - **Length-adaptive speech rate**: long utterances are progressively slowed
//! - **WAV delivery**: waveforms are encoded in memory with `hound`
//! - **HTTP surface**: `GET /`, `GET /voices`, `GET /ready`, `POST /tts/synthesize`
//!
//! ## Quick Start
//!
//! ```toml
//! [dependencies]
//! kokoro-tts-server = { version = "2026.2", features = ["kokoro"] }
//! ```
//!
//! ```ignore
//! use std::sync::Arc;
//! use kokoro_tts_server::{engines::kokoro::KokoroEngine, EngineConfig, ModelManager};
//!
//! let models = Arc::new(ModelManager::new());
//! let engine = KokoroEngine::new("models/kokoro", Default::default());
//! models.initialize(&engine, &EngineConfig::default())?;
//!
//! let app = kokoro_tts_server::server::create_router(models.into());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod audio;
pub mod config;
pub mod engines;
pub mod error;
pub mod lifecycle;
pub mod pipeline;
pub mod registry;
pub mod server;
pub mod speed;

#[cfg(test)]
mod test_support;

pub use audio::{encode_wav, Residency, WavFormat, Waveform};
pub use config::{Cli, EngineConfig, EngineConfigBuilder};
pub use error::{PhonemizeError, TtsError};
pub use lifecycle::{Device, DevicePreference, LoadedModels, ModelLoader, ModelManager, ServiceContext};
pub use pipeline::{SynthesisPipeline, SynthesisRequest};
pub use registry::{VoicePolicy, VoiceRegistry};
pub use speed::SpeedPolicy;

/// Error type returned by the acoustic model and model loaders.
///
/// The pipeline classifies these by the stage they came from, so their concrete
/// type never leaves the crate.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Phonetic units derived from one request's text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PhonemeSequence {
    /// Token ids consumed by the acoustic model
    pub ids: Vec<i64>,
    /// The phoneme string the ids were derived from
    pub phonemes: String,
}

impl PhonemeSequence {
    /// Number of phoneme units, used by the speech-rate policy.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Grapheme-to-phoneme converter.
///
/// Implementations are shared read-only by every in-flight request.
pub trait Phonemizer: Send + Sync {
    /// Convert `text` into phonemes for the given voice.
    ///
    /// `language` is the caller's language tag; implementations may prefer the
    /// language implied by `voice`. [`PhonemizeError::Unsupported`] is reported
    /// to the caller as invalid input, [`PhonemizeError::Backend`] as a
    /// synthesis failure.
    fn phonemize(&self, text: &str, voice: &str, language: &str)
        -> Result<PhonemeSequence, PhonemizeError>;
}

/// Acoustic model / vocoder turning phonemes into audio.
///
/// Invocation takes `&mut self`; the pipeline owns the model behind a single
/// admission slot, so implementations need not be safe for concurrent calls.
pub trait AcousticModel: Send {
    /// Sample rate of every waveform this model returns.
    fn sample_rate(&self) -> u32;

    /// Voices this model can render. Empty when the model cannot tell.
    fn voices(&self) -> Vec<String> {
        Vec::new()
    }

    /// Render `phonemes` with `voice` at the given speed multiplier.
    ///
    /// The returned waveform must be host resident.
    fn synthesize(
        &mut self,
        phonemes: &PhonemeSequence,
        voice: &str,
        speed: f32,
    ) -> Result<Waveform, BoxError>;

    /// Release the model's weights and any device-side memory.
    fn release(&mut self) {}
}
