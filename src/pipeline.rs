//! Per-request synthesis: text → phonemes → waveform → WAV bytes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

use crate::audio::{encode_wav, WavFormat};
use crate::error::{PhonemizeError, TtsError};
use crate::lifecycle::ModelManager;
use crate::speed::SpeedPolicy;
use crate::{AcousticModel, Phonemizer};

/// Language tag assumed when a request does not carry one.
pub const DEFAULT_LANGUAGE: &str = "en";

fn default_language() -> String {
    DEFAULT_LANGUAGE.to_string()
}

/// Body of `POST /tts/synthesize`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SynthesisRequest {
    pub text: String,
    #[serde(default)]
    pub speaker_id: Option<String>,
    #[serde(default = "default_language")]
    pub language: String,
}

impl SynthesisRequest {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            speaker_id: None,
            language: default_language(),
        }
    }

    pub fn with_speaker(mut self, speaker_id: impl Into<String>) -> Self {
        self.speaker_id = Some(speaker_id.into());
        self
    }
}

/// G2P converter and acoustic model wired to a speed policy and encoder.
///
/// The phonemizer is shared freely; the acoustic model sits behind a single
/// admission slot so one invocation runs at a time per model instance.
pub struct SynthesisPipeline {
    phonemizer: Box<dyn Phonemizer>,
    model: Mutex<Box<dyn AcousticModel>>,
    speed_policy: SpeedPolicy,
    wav_format: WavFormat,
}

impl SynthesisPipeline {
    pub fn new(
        phonemizer: Box<dyn Phonemizer>,
        model: Box<dyn AcousticModel>,
        speed_policy: SpeedPolicy,
        wav_format: WavFormat,
    ) -> Self {
        Self {
            phonemizer,
            model: Mutex::new(model),
            speed_policy,
            wav_format,
        }
    }

    pub fn speed_policy(&self) -> SpeedPolicy {
        self.speed_policy
    }

    /// Run G2P, the acoustic model and the encoder for one utterance.
    ///
    /// Blocking: the model invocation is CPU/accelerator bound.
    pub fn run(&self, text: &str, voice: &str, language: &str) -> Result<Vec<u8>, TtsError> {
        self.run_admitted(text, voice, language, &AtomicBool::new(false), || {})
    }

    /// [`run`](Self::run), with hooks around the admission slot.
    ///
    /// `on_admit` fires once the model slot is held. A request whose
    /// `cancelled` flag is set by then gives the slot back without invoking
    /// the model.
    fn run_admitted(
        &self,
        text: &str,
        voice: &str,
        language: &str,
        cancelled: &AtomicBool,
        on_admit: impl FnOnce(),
    ) -> Result<Vec<u8>, TtsError> {
        let phonemes = self
            .phonemizer
            .phonemize(text, voice, language)
            .map_err(|e| match e {
                PhonemizeError::Unsupported(msg) => TtsError::InvalidInput(msg),
                PhonemizeError::Backend(msg) => {
                    TtsError::SynthesisFailure(format!("phonemizer error: {msg}"))
                }
            })?;
        if phonemes.is_empty() {
            return Err(TtsError::InvalidInput(
                "text produced no phonemes".to_string(),
            ));
        }

        let speed = self.speed_policy.speed_for(phonemes.len());
        log::debug!(
            "Synthesizing {} phonemes with voice '{voice}' at speed {speed:.3}",
            phonemes.len()
        );

        let waveform = {
            let mut model = self.model.lock();
            if cancelled.load(Ordering::Acquire) {
                log::debug!("Request abandoned while queued, skipping the model");
                return Err(TtsError::SynthesisFailure(
                    "request abandoned before the model was invoked".to_string(),
                ));
            }
            on_admit();
            model
                .synthesize(&phonemes, voice, speed)
                .map_err(|e| TtsError::SynthesisFailure(e.to_string()))?
        };
        drop(phonemes);

        if waveform.is_empty() {
            return Err(TtsError::SynthesisFailure(
                "model produced no audio".to_string(),
            ));
        }
        log::debug!(
            "Generated {:.2}s of audio ({} samples @ {}Hz)",
            waveform.duration_secs(),
            waveform.samples().len(),
            waveform.sample_rate()
        );

        encode_wav(&waveform, self.wav_format)
    }

    /// Release the acoustic model. Later invocations fail as synthesis errors.
    pub(crate) fn release(&self) {
        self.model.lock().release();
    }
}

/// Sets the flag when the request future goes away.
struct CancelOnDrop(Arc<AtomicBool>);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.store(true, Ordering::Release);
    }
}

/// Synthesize one request against the currently published models.
///
/// The blocking stages run on the blocking thread pool. Time spent queued for
/// the model slot is not counted; the synthesis timeout starts once the slot
/// is held and covers the model invocation and encoding. A request dropped
/// while queued never reaches the model. A timed-out invocation keeps the slot
/// until the model returns; its result is discarded.
pub async fn synthesize(request: SynthesisRequest, models: &ModelManager) -> Result<Vec<u8>, TtsError> {
    let context = models.context()?;

    let voice = context.voices().resolve(request.speaker_id.as_deref())?;
    if request.text.trim().is_empty() {
        return Err(TtsError::InvalidInput("text must not be empty".to_string()));
    }
    let language = match request.language.trim() {
        "" => default_language(),
        tag => tag.to_string(),
    };

    let timeout = context.synthesis_timeout();
    let cancelled = Arc::new(AtomicBool::new(false));
    let _cancel_guard = CancelOnDrop(Arc::clone(&cancelled));
    let (admitted_tx, admitted_rx) = oneshot::channel();

    let mut task = tokio::task::spawn_blocking(move || {
        context.pipeline().run_admitted(
            &request.text,
            &voice,
            &language,
            &cancelled,
            move || {
                let _ = admitted_tx.send(());
            },
        )
    });

    // Queued: wait for the slot, or for an early G2P failure.
    tokio::select! {
        joined = &mut task => return flatten(joined),
        _ = admitted_rx => {}
    }

    match tokio::time::timeout(timeout, &mut task).await {
        Ok(joined) => flatten(joined),
        Err(_) => Err(TtsError::SynthesisTimeout(timeout)),
    }
}

fn flatten(
    joined: Result<Result<Vec<u8>, TtsError>, tokio::task::JoinError>,
) -> Result<Vec<u8>, TtsError> {
    joined.unwrap_or_else(|join_error| {
        Err(TtsError::SynthesisFailure(format!(
            "synthesis task aborted: {join_error}"
        )))
    })
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::config::EngineConfig;
    use crate::speed::adaptive_speed;
    use crate::test_support::{StubLoader, StubModel, StubPhonemizer, STUB_SAMPLE_RATE};

    fn ready_manager(loader: StubLoader, config: EngineConfig) -> ModelManager {
        let models = ModelManager::new();
        models.initialize(&loader, &config).unwrap();
        models
    }

    fn pipeline(model: StubModel, speed_policy: SpeedPolicy) -> SynthesisPipeline {
        SynthesisPipeline::new(
            Box::new(StubPhonemizer),
            Box::new(model),
            speed_policy,
            WavFormat::Pcm16,
        )
    }

    #[tokio::test]
    async fn synthesizes_valid_wav_at_model_rate() {
        let models = ready_manager(StubLoader::default(), EngineConfig::default());
        let request = SynthesisRequest::new("hello").with_speaker("zf_001");

        let bytes = synthesize(request, &models).await.unwrap();
        assert!(!bytes.is_empty());
        let reader = hound::WavReader::new(Cursor::new(bytes)).unwrap();
        assert_eq!(reader.spec().sample_rate, STUB_SAMPLE_RATE);
        assert!(reader.len() > 0);
    }

    #[tokio::test]
    async fn rejects_requests_before_initialization() {
        let models = ModelManager::new();
        let err = synthesize(SynthesisRequest::new("hello"), &models)
            .await
            .unwrap_err();
        assert!(matches!(err, TtsError::NotReady));
    }

    #[tokio::test]
    async fn blank_text_is_invalid_input() {
        let models = ready_manager(StubLoader::default(), EngineConfig::default());
        let err = synthesize(SynthesisRequest::new("   "), &models)
            .await
            .unwrap_err();
        assert!(matches!(err, TtsError::InvalidInput(_)));
    }

    #[test]
    fn g2p_failure_is_invalid_input() {
        let pipeline = pipeline(StubModel::default(), SpeedPolicy::LengthAdaptive);
        let err = pipeline.run("bad # text", "zf_001", "en").unwrap_err();
        assert!(matches!(err, TtsError::InvalidInput(_)));
    }

    #[test]
    fn g2p_backend_failure_is_synthesis_failure() {
        let model = StubModel::default();
        let calls = model.calls.clone();
        let pipeline = pipeline(model, SpeedPolicy::LengthAdaptive);
        let err = pipeline.run("mail@example", "zf_001", "en").unwrap_err();
        assert!(matches!(err, TtsError::SynthesisFailure(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn model_failure_is_synthesis_failure() {
        let pipeline = pipeline(StubModel::default(), SpeedPolicy::LengthAdaptive);
        let err = pipeline.run("hello", "broken", "en").unwrap_err();
        assert!(matches!(err, TtsError::SynthesisFailure(_)));
    }

    #[test]
    fn released_model_fails_as_synthesis_error() {
        let pipeline = pipeline(StubModel::default(), SpeedPolicy::LengthAdaptive);
        pipeline.release();
        let err = pipeline.run("hello", "zf_001", "en").unwrap_err();
        assert!(matches!(err, TtsError::SynthesisFailure(_)));
    }

    #[test]
    fn speed_follows_phoneme_length() {
        let model = StubModel::default();
        let speeds = model.speeds.clone();
        let pipeline = pipeline(model, SpeedPolicy::LengthAdaptive);

        let long_text = "a".repeat(150);
        pipeline.run("hi", "zf_001", "en").unwrap();
        pipeline.run(&long_text, "zf_001", "en").unwrap();

        let speeds = speeds.lock();
        assert_eq!(speeds[0], adaptive_speed(2));
        assert_eq!(speeds[1], adaptive_speed(150));
    }

    #[test]
    fn constant_policy_passes_fixed_speed() {
        let model = StubModel::default();
        let speeds = model.speeds.clone();
        let pipeline = pipeline(model, SpeedPolicy::Constant(1.0));
        pipeline.run(&"a".repeat(300), "zf_001", "en").unwrap();
        assert_eq!(speeds.lock()[0], 1.0);
    }

    #[tokio::test]
    async fn slow_model_times_out() {
        let loader = StubLoader {
            model: StubModel::with_delay(Duration::from_millis(300)),
            ..Default::default()
        };
        let config = EngineConfig {
            synthesis_timeout: Duration::from_millis(20),
            ..Default::default()
        };
        let models = ready_manager(loader, config);
        let err = synthesize(SynthesisRequest::new("hello"), &models)
            .await
            .unwrap_err();
        assert!(matches!(err, TtsError::SynthesisTimeout(_)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn waiting_for_the_model_does_not_count_toward_timeout() {
        let loader = StubLoader {
            model: StubModel::with_delay(Duration::from_millis(100)),
            ..Default::default()
        };
        let calls = loader.model.calls.clone();
        let config = EngineConfig {
            synthesis_timeout: Duration::from_millis(250),
            ..Default::default()
        };
        let models = Arc::new(ready_manager(loader, config));

        let handles: Vec<_> = (0..4)
            .map(|i| {
                let models = Arc::clone(&models);
                tokio::spawn(async move {
                    synthesize(SynthesisRequest::new(format!("queued {i}")), &models).await
                })
            })
            .collect();

        for handle in handles {
            assert!(handle.await.unwrap().is_ok());
        }
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn dropped_queued_requests_never_reach_the_model() {
        let loader = StubLoader {
            model: StubModel::with_delay(Duration::from_millis(300)),
            ..Default::default()
        };
        let calls = loader.model.calls.clone();
        let models = Arc::new(ready_manager(loader, EngineConfig::default()));

        let first = tokio::spawn({
            let models = Arc::clone(&models);
            async move { synthesize(SynthesisRequest::new("first"), &models).await }
        });
        tokio::time::sleep(Duration::from_millis(50)).await;

        let queued: Vec<_> = (0..3)
            .map(|i| {
                let models = Arc::clone(&models);
                tokio::spawn(async move {
                    synthesize(SynthesisRequest::new(format!("queued {i}")), &models).await
                })
            })
            .collect();
        tokio::time::sleep(Duration::from_millis(50)).await;
        for handle in &queued {
            handle.abort();
        }

        assert!(first.await.unwrap().is_ok());
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_requests_match_sequential_results() {
        let models = Arc::new(ready_manager(StubLoader::default(), EngineConfig::default()));
        let requests: Vec<SynthesisRequest> = (0..8)
            .map(|i| {
                SynthesisRequest::new(format!("utterance number {i} {}", "x".repeat(i * 20)))
                    .with_speaker(format!("zf_00{}", i % 8 + 1))
            })
            .collect();

        let mut sequential = Vec::new();
        for request in &requests {
            sequential.push(synthesize(request.clone(), &models).await.unwrap());
        }

        let handles: Vec<_> = requests
            .iter()
            .cloned()
            .map(|request| {
                let models = Arc::clone(&models);
                tokio::spawn(async move { synthesize(request, &models).await })
            })
            .collect();

        for (handle, expected) in handles.into_iter().zip(sequential) {
            assert_eq!(handle.await.unwrap().unwrap(), expected);
        }
    }
}
