//! Waveform type and the WAV encoder adapter.

use std::io::Cursor;

use crate::error::TtsError;
use crate::lifecycle::Device;

/// Where a waveform's samples currently live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Residency {
    Host,
    Device(Device),
}

/// Sample encoding of the delivered WAV container.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum WavFormat {
    /// 16-bit signed PCM, clipped to [-1, 1]
    #[default]
    Pcm16,
    /// 32-bit IEEE float
    Float32,
}

/// Raw mono audio produced by an acoustic model.
///
/// Owned by the request that produced it and dropped once encoded.
#[derive(Debug, Clone, PartialEq)]
pub struct Waveform {
    samples: Vec<f32>,
    sample_rate: u32,
    residency: Residency,
}

impl Waveform {
    /// A host-resident waveform.
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
            residency: Residency::Host,
        }
    }

    /// A waveform whose samples are still staged on an accelerator.
    pub fn on_device(samples: Vec<f32>, sample_rate: u32, device: Device) -> Self {
        Self {
            samples,
            sample_rate,
            residency: Residency::Device(device),
        }
    }

    /// Move the samples into host memory.
    pub fn to_host(mut self) -> Self {
        if let Residency::Device(device) = self.residency {
            log::trace!("Copying {} samples from {device} to host", self.samples.len());
            self.residency = Residency::Host;
        }
        self
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn residency(&self) -> Residency {
        self.residency
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Duration of the audio in seconds.
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

/// Encode a host-resident waveform into an in-memory mono WAV file.
///
/// Output is a pure function of the waveform and format, so identical input
/// always yields byte-identical output.
pub fn encode_wav(waveform: &Waveform, format: WavFormat) -> Result<Vec<u8>, TtsError> {
    if let Residency::Device(device) = waveform.residency {
        return Err(TtsError::EncodingFailure(format!(
            "waveform is still resident on {device}; copy it to host memory first"
        )));
    }
    if waveform.sample_rate == 0 {
        return Err(TtsError::EncodingFailure(
            "sample rate must be non-zero".to_string(),
        ));
    }

    let (bits_per_sample, sample_format) = match format {
        WavFormat::Pcm16 => (16, hound::SampleFormat::Int),
        WavFormat::Float32 => (32, hound::SampleFormat::Float),
    };
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: waveform.sample_rate,
        bits_per_sample,
        sample_format,
    };

    let mut cursor = Cursor::new(Vec::with_capacity(
        44 + waveform.samples.len() * (bits_per_sample as usize / 8),
    ));
    write_samples(&mut cursor, spec, &waveform.samples, format)
        .map_err(|e| TtsError::EncodingFailure(e.to_string()))?;
    Ok(cursor.into_inner())
}

fn write_samples(
    cursor: &mut Cursor<Vec<u8>>,
    spec: hound::WavSpec,
    samples: &[f32],
    format: WavFormat,
) -> Result<(), hound::Error> {
    let mut writer = hound::WavWriter::new(cursor, spec)?;
    match format {
        WavFormat::Pcm16 => {
            for &sample in samples {
                writer.write_sample(to_pcm16(sample))?;
            }
        }
        WavFormat::Float32 => {
            for &sample in samples {
                writer.write_sample(sample)?;
            }
        }
    }
    writer.finalize()
}

fn to_pcm16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16
}
