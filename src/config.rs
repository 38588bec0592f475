//! Process configuration.
//!
//! Command-line flags fall back to `KOKORO_*` environment variables.
//! Everything the model lifecycle needs is collected into [`EngineConfig`].

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use derive_builder::Builder;

use crate::audio::WavFormat;
use crate::lifecycle::DevicePreference;
use crate::registry::{kokoro_zh_catalog, VoicePolicy};
use crate::speed::SpeedPolicy;

/// Default bound on a single model invocation.
pub const DEFAULT_SYNTHESIS_TIMEOUT: Duration = Duration::from_secs(60);

/// Settings consumed by [`ModelManager::initialize`](crate::ModelManager::initialize).
#[derive(Debug, Clone, Builder)]
#[builder(setter(into), default)]
pub struct EngineConfig {
    /// Speed policy applied to every request
    pub speed_policy: SpeedPolicy,
    /// Handling of voice ids outside the catalog
    pub voice_policy: VoicePolicy,
    /// Compute device preference, resolved once at load
    pub device: DevicePreference,
    /// Sample encoding of delivered WAV files
    pub wav_format: WavFormat,
    /// Upper bound on one model invocation
    pub synthesis_timeout: Duration,
    /// Voices exposed through `/voices`, in order
    pub catalog: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            speed_policy: SpeedPolicy::LengthAdaptive,
            voice_policy: VoicePolicy::Permissive,
            device: DevicePreference::Auto,
            wav_format: WavFormat::Pcm16,
            synthesis_timeout: DEFAULT_SYNTHESIS_TIMEOUT,
            catalog: kokoro_zh_catalog(),
        }
    }
}

/// Kokoro TTS API server.
#[derive(Parser, Debug, Clone)]
#[command(name = "kokoro-tts-server", version, about)]
pub struct Cli {
    /// Interface to bind
    #[arg(long, env = "KOKORO_HOST", default_value = "0.0.0.0")]
    pub host: IpAddr,

    /// Port to listen on
    #[arg(long, env = "KOKORO_PORT", default_value_t = 8000)]
    pub port: u16,

    /// Directory holding the ONNX model, voices archive and config.json
    #[arg(long, env = "KOKORO_MODEL_DIR", default_value = "models/kokoro")]
    pub model_dir: PathBuf,

    /// `adaptive`, `constant` or `constant:<speed>`
    #[arg(long, env = "KOKORO_SPEED_POLICY", default_value = "adaptive")]
    pub speed_policy: SpeedPolicy,

    /// Treatment of voice ids outside the catalog
    #[arg(long, env = "KOKORO_VOICE_POLICY", value_enum, default_value_t = VoicePolicy::Permissive)]
    pub voice_policy: VoicePolicy,

    /// Compute device
    #[arg(long, env = "KOKORO_DEVICE", value_enum, default_value_t = DevicePreference::Auto)]
    pub device: DevicePreference,

    /// Sample encoding of returned WAV files
    #[arg(long, env = "KOKORO_WAV_FORMAT", value_enum, default_value_t = WavFormat::Pcm16)]
    pub wav_format: WavFormat,

    /// Seconds a single synthesis may run before it is abandoned
    #[arg(long, env = "KOKORO_SYNTHESIS_TIMEOUT_SECS", default_value_t = 60)]
    pub synthesis_timeout_secs: u64,

    /// ONNX Runtime intra/inter-op threads (runtime default when unset)
    #[arg(long, env = "KOKORO_NUM_THREADS")]
    pub num_threads: Option<usize>,

    /// Where to cache the optimized ONNX graph between runs
    #[arg(long, env = "KOKORO_OPTIMIZED_MODEL_CACHE")]
    pub optimized_model_cache: Option<PathBuf>,

    /// espeak-ng binary (defaults to the one on PATH)
    #[arg(long, env = "KOKORO_ESPEAK_BIN")]
    pub espeak_bin: Option<PathBuf>,

    /// espeak-ng data directory
    #[arg(long, env = "KOKORO_ESPEAK_DATA")]
    pub espeak_data: Option<PathBuf>,
}

impl Cli {
    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    pub fn engine_config(&self) -> Result<EngineConfig, EngineConfigBuilderError> {
        EngineConfigBuilder::default()
            .speed_policy(self.speed_policy)
            .voice_policy(self.voice_policy)
            .device(self.device)
            .wav_format(self.wav_format)
            .synthesis_timeout(Duration::from_secs(self.synthesis_timeout_secs))
            .build()
    }
}
