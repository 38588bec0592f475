//! Voice catalog and default-voice selection.

use rand::seq::IndexedRandom;

use crate::error::TtsError;

/// Mandarin voices shipped with Kokoro v1.1-zh, in catalog order.
pub const KOKORO_ZH_VOICES: [&str; 55] = [
    "zf_001", "zf_002", "zf_003", "zf_004", "zf_005", "zf_006", "zf_007", "zf_008", "zf_017",
    "zf_018", "zf_019", "zf_021", "zf_022", "zf_023", "zf_024", "zf_026", "zf_027", "zf_028",
    "zf_032", "zf_036", "zf_038", "zf_039", "zf_040", "zf_042", "zf_043", "zf_044", "zf_046",
    "zf_047", "zf_048", "zf_049", "zf_051", "zf_059", "zf_060", "zf_067", "zf_070", "zf_071",
    "zf_072", "zf_073", "zf_074", "zf_075", "zf_076", "zf_077", "zf_078", "zf_079", "zf_083",
    "zf_084", "zf_085", "zf_086", "zf_087", "zf_088", "zf_090", "zf_092", "zf_093", "zf_094",
    "zf_099",
];

/// How caller-supplied voice ids outside the catalog are treated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum VoicePolicy {
    /// Forward any non-empty id to the acoustic model, which may reject it.
    #[default]
    Permissive,
    /// Reject ids outside the catalog as invalid input.
    Strict,
}

/// Immutable voice catalog plus the default voice picked for this run.
#[derive(Debug, Clone)]
pub struct VoiceRegistry {
    catalog: Vec<String>,
    default_voice: String,
    policy: VoicePolicy,
}

impl VoiceRegistry {
    /// Build a registry whose default voice is drawn uniformly at random.
    ///
    /// The draw happens once; the default stays fixed for the registry's lifetime.
    pub fn new(catalog: Vec<String>, policy: VoicePolicy) -> Result<Self, TtsError> {
        let default_voice = catalog
            .choose(&mut rand::rng())
            .cloned()
            .ok_or_else(|| TtsError::Initialization("voice catalog is empty".to_string()))?;
        Self::with_default(catalog, default_voice, policy)
    }

    /// Build a registry with an explicit default voice.
    pub fn with_default(
        catalog: Vec<String>,
        default_voice: impl Into<String>,
        policy: VoicePolicy,
    ) -> Result<Self, TtsError> {
        let default_voice = default_voice.into();
        if catalog.iter().any(|v| v.is_empty()) {
            return Err(TtsError::Initialization(
                "voice catalog contains an empty id".to_string(),
            ));
        }
        if !catalog.contains(&default_voice) {
            return Err(TtsError::Initialization(format!(
                "default voice '{default_voice}' is not in the catalog"
            )));
        }
        Ok(Self {
            catalog,
            default_voice,
            policy,
        })
    }

    /// The fixed catalog, in order.
    pub fn list(&self) -> &[String] {
        &self.catalog
    }

    pub fn default_voice(&self) -> &str {
        &self.default_voice
    }

    pub fn policy(&self) -> VoicePolicy {
        self.policy
    }

    pub fn contains(&self, voice: &str) -> bool {
        self.catalog.iter().any(|v| v == voice)
    }

    /// Pick the voice a request should use.
    ///
    /// Absent or empty ids fall back to the default voice.
    pub fn resolve(&self, requested: Option<&str>) -> Result<String, TtsError> {
        match requested.map(str::trim).filter(|v| !v.is_empty()) {
            None => Ok(self.default_voice.clone()),
            Some(voice) if self.policy == VoicePolicy::Strict && !self.contains(voice) => Err(
                TtsError::InvalidInput(format!("unknown voice '{voice}'")),
            ),
            Some(voice) => Ok(voice.to_string()),
        }
    }
}

/// The Kokoro v1.1-zh catalog as owned strings.
pub fn kokoro_zh_catalog() -> Vec<String> {
    KOKORO_ZH_VOICES.iter().map(|v| v.to_string()).collect()
}
