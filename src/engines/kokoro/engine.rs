use std::path::PathBuf;

use ort::execution_providers::{CUDAExecutionProvider, ExecutionProvider};

use super::model::KokoroModel;
use super::phonemizer::{EspeakConfig, EspeakPhonemizer};
use super::vocab::Vocab;
use crate::lifecycle::{Device, DevicePreference, LoadedModels, ModelLoader};
use crate::BoxError;

/// Parameters for configuring Kokoro model loading.
#[derive(Debug, Clone, Default)]
pub struct KokoroModelParams {
    /// Number of CPU threads to use for inference.
    /// `None` uses the ORT default (typically all available cores).
    pub num_threads: Option<usize>,
    /// Path for caching the Level3-optimized ONNX graph.
    ///
    /// Must be writable; the first load writes it, later loads skip the
    /// 5–10 s optimization step.
    pub optimized_model_cache_path: Option<PathBuf>,
    /// espeak-ng binary and data location.
    pub espeak: EspeakConfig,
}

/// Loads the espeak-ng G2P and the Kokoro ONNX model from a model directory.
///
/// # Quick Start
///
/// ```rust,no_run
/// use kokoro_tts_server::{engines::kokoro::KokoroEngine, EngineConfig, ModelManager};
///
/// let models = ModelManager::new();
/// let engine = KokoroEngine::new("models/kokoro", Default::default());
/// let context = models.initialize(&engine, &EngineConfig::default())?;
/// let wav = context.pipeline().run("你好，世界。", "zf_001", "zh")?;
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub struct KokoroEngine {
    model_dir: PathBuf,
    params: KokoroModelParams,
}

impl KokoroEngine {
    pub fn new(model_dir: impl Into<PathBuf>, params: KokoroModelParams) -> Self {
        Self {
            model_dir: model_dir.into(),
            params,
        }
    }
}

impl ModelLoader for KokoroEngine {
    fn select_device(&self, preference: DevicePreference) -> Result<Device, BoxError> {
        match preference {
            DevicePreference::Cpu => Ok(Device::Cpu),
            DevicePreference::Cuda if cuda_available() => Ok(Device::Cuda),
            DevicePreference::Cuda => {
                Err("CUDA requested but the CUDA execution provider is unavailable".into())
            }
            DevicePreference::Auto if cuda_available() => Ok(Device::Cuda),
            DevicePreference::Auto => Ok(Device::Cpu),
        }
    }

    fn load(&self, device: Device) -> Result<LoadedModels, BoxError> {
        let vocab = Vocab::load_or_builtin(&self.model_dir)?;
        let phonemizer = EspeakPhonemizer::new(self.params.espeak.clone(), vocab);
        phonemizer.check_available()?;

        let model = KokoroModel::load(
            &self.model_dir,
            device,
            self.params.num_threads,
            self.params.optimized_model_cache_path.as_deref(),
        )?;

        Ok(LoadedModels {
            phonemizer: Box::new(phonemizer),
            model: Box::new(model),
        })
    }
}

fn cuda_available() -> bool {
    match CUDAExecutionProvider::default().is_available() {
        Ok(available) => available,
        Err(e) => {
            log::debug!("Could not probe CUDA execution provider: {e}");
            false
        }
    }
}
