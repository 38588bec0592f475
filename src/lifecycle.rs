//! Model lifecycle: one-time construction, readiness gating and teardown of
//! the shared G2P converter and acoustic model.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;

use crate::config::EngineConfig;
use crate::error::TtsError;
use crate::pipeline::SynthesisPipeline;
use crate::registry::VoiceRegistry;
use crate::{AcousticModel, BoxError, Phonemizer};

/// Compute device the acoustic model runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Device {
    Cpu,
    Cuda,
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Device::Cpu => f.write_str("cpu"),
            Device::Cuda => f.write_str("cuda"),
        }
    }
}

/// Requested device; resolved to a [`Device`] once at initialization.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum DevicePreference {
    /// CUDA when the runtime reports it available, CPU otherwise
    #[default]
    Auto,
    Cpu,
    Cuda,
}

/// Collaborators produced by a [`ModelLoader`].
pub struct LoadedModels {
    pub phonemizer: Box<dyn Phonemizer>,
    pub model: Box<dyn AcousticModel>,
}

/// Constructs the G2P converter and acoustic model for a backend.
pub trait ModelLoader {
    /// Resolve the device preference. Backends without accelerator support
    /// only accept CPU.
    fn select_device(&self, preference: DevicePreference) -> Result<Device, BoxError> {
        match preference {
            DevicePreference::Cuda => Err("CUDA requested but this backend only runs on CPU".into()),
            DevicePreference::Auto | DevicePreference::Cpu => Ok(Device::Cpu),
        }
    }

    fn load(&self, device: Device) -> Result<LoadedModels, BoxError>;
}

/// Everything a request needs, published once initialization succeeds.
pub struct ServiceContext {
    pipeline: SynthesisPipeline,
    voices: VoiceRegistry,
    device: Device,
    synthesis_timeout: Duration,
}

impl ServiceContext {
    pub fn pipeline(&self) -> &SynthesisPipeline {
        &self.pipeline
    }

    pub fn voices(&self) -> &VoiceRegistry {
        &self.voices
    }

    pub fn device(&self) -> Device {
        self.device
    }

    pub fn synthesis_timeout(&self) -> Duration {
        self.synthesis_timeout
    }
}

enum Readiness {
    Uninitialized,
    Loading,
    Ready(Arc<ServiceContext>),
    TornDown,
}

/// Owns the shared model state for the lifetime of the service.
///
/// Readiness is binary from a request's point of view: either a fully built
/// [`ServiceContext`] is published, or requests get [`TtsError::NotReady`].
pub struct ModelManager {
    state: RwLock<Readiness>,
}

impl Default for ModelManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ModelManager {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(Readiness::Uninitialized),
        }
    }

    /// Load the models and publish the service context.
    ///
    /// Blocks while the backend loads. Any failure leaves the manager not
    /// ready and must be treated as fatal by the caller.
    pub fn initialize(
        &self,
        loader: &dyn ModelLoader,
        config: &EngineConfig,
    ) -> Result<Arc<ServiceContext>, TtsError> {
        {
            let mut state = self.state.write();
            let refusal = match &*state {
                Readiness::Uninitialized => None,
                Readiness::Loading => Some("initialization already in progress"),
                Readiness::Ready(_) => Some("models are already initialized"),
                Readiness::TornDown => Some("service has been torn down"),
            };
            if let Some(reason) = refusal {
                return Err(TtsError::Initialization(reason.to_string()));
            }
            *state = Readiness::Loading;
        }

        let built = build_context(loader, config);
        let mut state = self.state.write();
        if matches!(*state, Readiness::TornDown) {
            drop(state);
            if let Ok(context) = built {
                context.pipeline.release();
            }
            log::warn!("Service was torn down while models were loading; discarding them");
            return Err(TtsError::Initialization(
                "service was torn down while models were loading".to_string(),
            ));
        }

        match built {
            Ok(context) => {
                let context = Arc::new(context);
                *state = Readiness::Ready(Arc::clone(&context));
                drop(state);
                log::info!(
                    "Kokoro TTS model and pipeline loaded successfully on device: {}",
                    context.device
                );
                Ok(context)
            }
            Err(e) => {
                *state = Readiness::Uninitialized;
                drop(state);
                log::error!("{e}");
                Err(e)
            }
        }
    }

    /// The published context, or [`TtsError::NotReady`].
    pub fn context(&self) -> Result<Arc<ServiceContext>, TtsError> {
        match &*self.state.read() {
            Readiness::Ready(context) => Ok(Arc::clone(context)),
            _ => Err(TtsError::NotReady),
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(*self.state.read(), Readiness::Ready(_))
    }

    /// Unpublish the context and release the model.
    ///
    /// Only the first call has any effect.
    pub fn teardown(&self) {
        let previous = std::mem::replace(&mut *self.state.write(), Readiness::TornDown);
        match previous {
            Readiness::Ready(context) => {
                log::info!("Shutting down Kokoro TTS API");
                context.pipeline.release();
                if context.device == Device::Cuda {
                    log::info!("Released device memory on {}", context.device);
                }
            }
            Readiness::TornDown => log::debug!("Teardown already completed"),
            Readiness::Loading => {
                log::warn!("Teardown requested while models are loading; they will be released on arrival")
            }
            Readiness::Uninitialized => log::warn!("Teardown requested before models were loaded"),
        }
    }
}

fn build_context(
    loader: &dyn ModelLoader,
    config: &EngineConfig,
) -> Result<ServiceContext, TtsError> {
    let init_failed = |e: BoxError| TtsError::Initialization(e.to_string());

    let device = loader.select_device(config.device).map_err(init_failed)?;
    log::info!("Selected compute device: {device}");

    let LoadedModels { phonemizer, model } = loader.load(device).map_err(init_failed)?;
    if model.sample_rate() == 0 {
        return Err(TtsError::Initialization(
            "acoustic model reports a zero sample rate".to_string(),
        ));
    }

    let voices = VoiceRegistry::new(config.catalog.clone(), config.voice_policy)?;
    let known = model.voices();
    if !known.is_empty() {
        let missing: Vec<&str> = voices
            .list()
            .iter()
            .filter(|v| !known.contains(v))
            .map(String::as_str)
            .collect();
        if !missing.is_empty() {
            log::warn!(
                "{} catalog voices are not provided by the model: {:?}",
                missing.len(),
                missing
            );
        }
    }
    log::info!(
        "Serving {} voices, default voice for this run: {}",
        voices.list().len(),
        voices.default_voice()
    );

    let pipeline =
        SynthesisPipeline::new(phonemizer, model, config.speed_policy, config.wav_format);
    log::info!(
        "Speed policy: {}, voice policy: {:?}",
        pipeline.speed_policy(),
        voices.policy()
    );

    Ok(ServiceContext {
        pipeline,
        voices,
        device,
        synthesis_timeout: config.synthesis_timeout,
    })
}
