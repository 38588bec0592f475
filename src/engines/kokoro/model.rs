use std::path::{Path, PathBuf};

use ndarray::{Array2, ArrayView2};
use ort::execution_providers::{CPUExecutionProvider, CUDAExecutionProvider};
use ort::inputs;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::TensorRef;

use super::voices::{find_voices_file, VoiceStore};
use crate::audio::Waveform;
use crate::lifecycle::Device;
use crate::{AcousticModel, BoxError, PhonemeSequence};

/// Maximum number of phoneme tokens per chunk (before padding).
pub const MAX_PHONEME_LEN: usize = 510;

/// Style vector dimension for Kokoro.
pub const STYLE_DIM: usize = 256;

/// Output sample rate from the Kokoro model.
pub const SAMPLE_RATE: u32 = 24000;

/// Crossfade (in samples) used when concatenating chunk audio.
const CHUNK_CROSSFADE_SAMPLES: usize = 240; // 10ms @ 24kHz

/// Token ids of `; : , . ! ?`, preferred chunk boundaries.
const PUNCT_IDS: &[i64] = &[1, 2, 3, 4, 5, 6];

#[derive(thiserror::Error, Debug)]
pub enum KokoroError {
    #[error("ONNX runtime error: {0}")]
    Ort(#[from] ort::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Array shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),
    #[error(
        "espeak-ng not found. Install: Linux: `sudo apt-get install espeak-ng`, \
         macOS: `brew install espeak-ng`, Windows: https://espeak-ng.org/download"
    )]
    EspeakNotFound,
    #[error("Phonemization failed: {0}")]
    PhonemizerFailed(String),
    #[error("Voice '{0}' not found. GET /voices lists the available voices.")]
    VoiceNotFound(String),
    #[error("Model has been released")]
    ModelReleased,
    #[error("Model produced no output")]
    NoOutput,
    #[error("Invalid config.json: {0}")]
    Config(String),
    #[error("Failed to parse voice file: {0}")]
    VoiceParse(String),
}

/// Kokoro ONNX session plus voice styles.
pub struct KokoroModel {
    session: Option<Session>,
    voice_store: VoiceStore,
    device: Device,
    /// Detected input name: "input_ids" or "tokens"
    tokens_input_name: String,
    /// True if the speed input expects int32, false for float32
    speed_is_int32: bool,
}

impl KokoroModel {
    /// Load the Kokoro model from a directory.
    ///
    /// The directory must contain an `.onnx` file and a `voices*.bin` archive.
    pub fn load(
        model_dir: &Path,
        device: Device,
        num_threads: Option<usize>,
        optimized_cache_path: Option<&Path>,
    ) -> Result<Self, KokoroError> {
        let onnx_path = find_onnx_file(model_dir)?;
        log::info!("Loading Kokoro model from {} on {device}", onnx_path.display());

        let session = init_session(&onnx_path, device, num_threads, optimized_cache_path)?;
        let tokens_input_name = detect_tokens_input(&session);
        let speed_is_int32 = detect_speed_type(&session);
        log::info!(
            "Detected: tokens_input='{}', speed_is_int32={}",
            tokens_input_name,
            speed_is_int32
        );
        if speed_is_int32 {
            log::warn!(
                "Model takes an integer speed; speed multipliers are rounded to whole steps of at least 1"
            );
        }

        let voice_store = VoiceStore::load(&find_voices_file(model_dir)?)?;

        Ok(Self {
            session: Some(session),
            voice_store,
            device,
            tokens_input_name,
            speed_is_int32,
        })
    }

    /// Render phoneme token ids with the given voice and speed.
    ///
    /// Sequences longer than [`MAX_PHONEME_LEN`] are split, preferably at
    /// punctuation, and joined with a short crossfade.
    pub fn synthesize_ids(
        &mut self,
        ids: &[i64],
        voice: &str,
        speed: f32,
    ) -> Result<Vec<f32>, KokoroError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        // One style row for the whole utterance so chunks share prosody.
        let style = *self.voice_store.style(voice, ids.len())?;

        let chunks = split_chunks(ids);
        if chunks.len() > 1 {
            log::debug!(
                "Phoneme sequence exceeded limit ({} > {}), split into {} chunks",
                ids.len(),
                MAX_PHONEME_LEN,
                chunks.len()
            );
        }

        let mut combined = Vec::with_capacity(ids.len() * 300);
        for chunk in chunks {
            let audio = self.synthesize_chunk(chunk, &style, speed)?;
            if combined.is_empty() {
                combined = audio;
            } else {
                append_with_crossfade(&mut combined, &audio, CHUNK_CROSSFADE_SAMPLES);
            }
        }

        Ok(combined)
    }

    /// Run ONNX inference on a single chunk of phoneme token IDs.
    fn synthesize_chunk(
        &mut self,
        tokens: &[i64],
        style: &[f32; STYLE_DIM],
        speed: f32,
    ) -> Result<Vec<f32>, KokoroError> {
        let session = self.session.as_mut().ok_or(KokoroError::ModelReleased)?;

        // [[0, t1..tN, 0]]
        let seq_len = tokens.len() + 2;
        let mut padded = vec![0i64; seq_len];
        padded[1..seq_len - 1].copy_from_slice(tokens);
        let tokens_arr = Array2::from_shape_vec((1, seq_len), padded)?;
        let style_view = ArrayView2::from_shape((1, STYLE_DIM), style.as_slice())?;

        let output = if self.speed_is_int32 {
            let speed_arr = ndarray::arr1(&[int_speed(speed)]);
            session.run(inputs![
                self.tokens_input_name.as_str() => TensorRef::from_array_view(tokens_arr.view())?,
                "style" => TensorRef::from_array_view(style_view)?,
                "speed" => TensorRef::from_array_view(speed_arr.view())?,
            ])?
        } else {
            let speed_arr = ndarray::arr1(&[speed]);
            session.run(inputs![
                self.tokens_input_name.as_str() => TensorRef::from_array_view(tokens_arr.view())?,
                "style" => TensorRef::from_array_view(style_view)?,
                "speed" => TensorRef::from_array_view(speed_arr.view())?,
            ])?
        };

        // First output is the waveform; extraction copies it into host memory.
        let (_, waveform) = output.iter().next().ok_or(KokoroError::NoOutput)?;
        let waveform = waveform.try_extract_array::<f32>()?;
        Ok(waveform.iter().copied().collect())
    }

    pub fn device(&self) -> Device {
        self.device
    }
}

impl AcousticModel for KokoroModel {
    fn sample_rate(&self) -> u32 {
        SAMPLE_RATE
    }

    fn voices(&self) -> Vec<String> {
        self.voice_store.names()
    }

    fn synthesize(
        &mut self,
        phonemes: &PhonemeSequence,
        voice: &str,
        speed: f32,
    ) -> Result<Waveform, BoxError> {
        let samples = self.synthesize_ids(&phonemes.ids, voice, speed)?;
        Ok(Waveform::new(samples, SAMPLE_RATE))
    }

    fn release(&mut self) {
        if self.session.take().is_some() {
            log::info!("Released Kokoro session on {}", self.device);
        }
    }
}

/// Find the ONNX model file in the given directory.
///
/// Prefers the v1.1-zh export, then the quantized v1.0 export, then the first
/// `.onnx` file found.
fn find_onnx_file(model_dir: &Path) -> Result<PathBuf, KokoroError> {
    for preferred in ["kokoro-v1.1-zh.onnx", "kokoro-quant-convinteger.onnx"] {
        let path = model_dir.join(preferred);
        if path.exists() {
            return Ok(path);
        }
    }

    for entry in std::fs::read_dir(model_dir)? {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) == Some("onnx") {
            log::info!("Using ONNX file: {}", path.display());
            return Ok(path);
        }
    }

    Err(KokoroError::Io(std::io::Error::new(
        std::io::ErrorKind::NotFound,
        format!("No .onnx file found in {}", model_dir.display()),
    )))
}

/// Build the ONNX session, optionally caching the Level3-optimized graph.
///
/// With a cache path, the first load optimizes and writes the graph; later
/// loads read it back with optimization disabled.
fn init_session(
    onnx_path: &Path,
    device: Device,
    num_threads: Option<usize>,
    optimized_cache_path: Option<&Path>,
) -> Result<Session, KokoroError> {
    let mut providers = Vec::with_capacity(2);
    if device == Device::Cuda {
        providers.push(CUDAExecutionProvider::default().build());
    }
    providers.push(CPUExecutionProvider::default().build());

    let (load_path, opt_level, cache_out) = match optimized_cache_path {
        Some(cache) if cache.exists() => {
            log::info!("Loading pre-optimized Kokoro graph from {}", cache.display());
            (cache, GraphOptimizationLevel::Disable, None)
        }
        Some(cache) => {
            log::info!(
                "First load: running Level3 optimization; saving graph to {}",
                cache.display()
            );
            (onnx_path, GraphOptimizationLevel::Level3, Some(cache))
        }
        None => (onnx_path, GraphOptimizationLevel::Level3, None),
    };

    let mut builder = Session::builder()?
        .with_optimization_level(opt_level)?
        .with_execution_providers(providers)?
        .with_parallel_execution(true)?;

    if let Some(cache) = cache_out {
        builder = builder.with_optimized_model_path(cache)?;
    }

    if let Some(threads) = num_threads {
        builder = builder
            .with_intra_threads(threads)?
            .with_inter_threads(threads)?;
    }

    Ok(builder.commit_from_file(load_path)?)
}

/// Detect the token input name ("input_ids" or "tokens") from session inputs.
fn detect_tokens_input(session: &Session) -> String {
    session
        .inputs()
        .iter()
        .map(|input| input.name())
        .find(|name| *name == "input_ids" || *name == "tokens")
        .unwrap_or("input_ids")
        .to_string()
}

/// Detect whether the speed input expects int32 (true) or float32 (false).
fn detect_speed_type(session: &Session) -> bool {
    session
        .inputs()
        .iter()
        .find(|input| input.name() == "speed")
        .map(|input| {
            let type_str = format!("{:?}", input.dtype());
            type_str.contains("Int32") || type_str.contains("int32")
        })
        .unwrap_or_else(|| {
            log::warn!("Model declares no 'speed' input; assuming float32");
            false
        })
}

/// Speed for exports with an int32 `speed` input. Never below 1, since 0
/// is not a valid multiplier.
fn int_speed(speed: f32) -> i32 {
    (speed.round() as i32).max(1)
}

/// Split phoneme IDs into chunks of at most `MAX_PHONEME_LEN`, preferring punctuation.
fn split_chunks(ids: &[i64]) -> Vec<&[i64]> {
    let mut chunks = Vec::with_capacity(ids.len() / MAX_PHONEME_LEN + 1);
    let mut rest = ids;

    while rest.len() > MAX_PHONEME_LEN {
        let window = &rest[..MAX_PHONEME_LEN];
        let split = window
            .iter()
            .rposition(|id| PUNCT_IDS.contains(id))
            .map(|i| i + 1)
            .unwrap_or(MAX_PHONEME_LEN);
        let (head, tail) = rest.split_at(split);
        chunks.push(head);
        rest = tail;
    }
    if !rest.is_empty() {
        chunks.push(rest);
    }

    chunks
}

fn append_with_crossfade(dst: &mut Vec<f32>, src: &[f32], crossfade_samples: usize) {
    let overlap = crossfade_samples.min(dst.len()).min(src.len());
    let dst_start = dst.len() - overlap;
    for (i, (left, right)) in dst[dst_start..].iter_mut().zip(&src[..overlap]).enumerate() {
        let t = (i + 1) as f32 / (overlap as f32 + 1.0);
        *left = *left * (1.0 - t) + right * t;
    }
    dst.extend_from_slice(&src[overlap..]);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_sequences_stay_whole() {
        let ids = vec![43i64; 100];
        assert_eq!(split_chunks(&ids), vec![ids.as_slice()]);
    }

    #[test]
    fn long_sequences_split_after_punctuation() {
        let mut ids = vec![43i64; 1000];
        ids[300] = 4;
        let chunks = split_chunks(&ids);
        assert_eq!(chunks[0].len(), 301);
        assert_eq!(chunks[0].last(), Some(&4));
        assert!(chunks.iter().all(|c| c.len() <= MAX_PHONEME_LEN));
        assert_eq!(chunks.iter().map(|c| c.len()).sum::<usize>(), 1000);
    }

    #[test]
    fn long_sequences_without_punctuation_split_at_limit() {
        let ids = vec![43i64; MAX_PHONEME_LEN * 2 + 5];
        let lens: Vec<usize> = split_chunks(&ids).iter().map(|c| c.len()).collect();
        assert_eq!(lens, vec![MAX_PHONEME_LEN, MAX_PHONEME_LEN, 5]);
    }

    #[test]
    fn integer_speed_never_drops_to_zero() {
        for len in [0, 83, 128, 129, 150, 183, 1000] {
            assert_eq!(int_speed(crate::speed::adaptive_speed(len)), 1, "len={len}");
        }
        assert_eq!(int_speed(0.2), 1);
        assert_eq!(int_speed(1.6), 2);
        assert_eq!(int_speed(2.0), 2);
    }

    #[test]
    fn crossfade_blends_overlap() {
        let mut dst = vec![1.0f32; 4];
        append_with_crossfade(&mut dst, &[0.0; 4], 2);
        assert_eq!(dst.len(), 6);
        assert!((dst[2] - 2.0 / 3.0).abs() < 1e-6);
        assert!((dst[3] - 1.0 / 3.0).abs() < 1e-6);
        assert_eq!(&dst[4..], &[0.0, 0.0]);
    }

    #[test]
    fn missing_model_file_is_not_found() {
        let dir = std::env::temp_dir().join("kokoro-model-empty-dir");
        std::fs::create_dir_all(&dir).unwrap();
        let err = find_onnx_file(&dir).unwrap_err();
        assert!(matches!(err, KokoroError::Io(e) if e.kind() == std::io::ErrorKind::NotFound));
    }
}
