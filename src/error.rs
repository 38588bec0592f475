use std::time::Duration;

/// Failure classes surfaced by the service.
///
/// Every stage-local failure is mapped to exactly one of these before it
/// reaches a caller; only the message crosses the service boundary.
#[derive(thiserror::Error, Debug)]
pub enum TtsError {
    #[error("TTS model not loaded yet.")]
    NotReady,
    #[error("Invalid input for synthesis: {0}")]
    InvalidInput(String),
    #[error("Speech synthesis failed: {0}")]
    SynthesisFailure(String),
    #[error("Speech synthesis timed out after {}s", .0.as_secs_f32())]
    SynthesisTimeout(Duration),
    #[error("Error writing WAV file: {0}")]
    EncodingFailure(String),
    #[error("Error loading model or pipeline: {0}")]
    Initialization(String),
}

/// Failure reported by a [`Phonemizer`](crate::Phonemizer).
#[derive(thiserror::Error, Debug)]
pub enum PhonemizeError {
    /// The text cannot be converted; the caller is at fault.
    #[error("{0}")]
    Unsupported(String),
    /// The converter itself failed (missing binary, I/O error, crash).
    #[error("{0}")]
    Backend(String),
}

impl TtsError {
    /// True when the caller, not the service, is at fault.
    pub fn is_client_error(&self) -> bool {
        matches!(self, TtsError::InvalidInput(_))
    }
}

#[cfg(test)]
mod tests {
    use super::TtsError;
    use std::time::Duration;

    #[test]
    fn messages_do_not_leak_type_names() {
        let err = TtsError::SynthesisFailure("voice rejected".to_string());
        assert_eq!(err.to_string(), "Speech synthesis failed: voice rejected");

        let err = TtsError::SynthesisTimeout(Duration::from_millis(1500));
        assert_eq!(err.to_string(), "Speech synthesis timed out after 1.5s");
    }

    #[test]
    fn only_invalid_input_is_a_client_error() {
        assert!(TtsError::InvalidInput("empty".into()).is_client_error());
        assert!(!TtsError::NotReady.is_client_error());
        assert!(!TtsError::EncodingFailure("io".into()).is_client_error());
    }
}
