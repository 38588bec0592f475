use std::collections::HashMap;
use std::path::Path;

use super::model::KokoroError;

/// Mapping from IPA symbols to Kokoro token ids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vocab(HashMap<char, i64>);

impl Vocab {
    /// Load the vocabulary from the `"vocab"` object of a Kokoro `config.json`.
    pub fn load(config_path: &Path) -> Result<Self, KokoroError> {
        let content = std::fs::read_to_string(config_path)?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self, KokoroError> {
        let json: serde_json::Value = serde_json::from_str(content)
            .map_err(|e| KokoroError::Config(format!("Failed to parse JSON: {e}")))?;

        let entries = json
            .get("vocab")
            .ok_or_else(|| KokoroError::Config("Missing 'vocab' field".to_string()))?
            .as_object()
            .ok_or_else(|| KokoroError::Config("'vocab' must be an object".to_string()))?;

        entries
            .iter()
            .map(|(symbol, id)| {
                let mut chars = symbol.chars();
                let ch = match (chars.next(), chars.next()) {
                    (Some(ch), None) => ch,
                    _ => {
                        return Err(KokoroError::Config(format!(
                            "vocab key {symbol:?} is not a single character"
                        )))
                    }
                };
                let id = id.as_i64().ok_or_else(|| {
                    KokoroError::Config(format!("Non-integer vocab value for key {symbol:?}"))
                })?;
                Ok((ch, id))
            })
            .collect::<Result<HashMap<_, _>, _>>()
            .map(Self)
    }

    /// `config.json` from the model directory, or the built-in table when absent.
    pub fn load_or_builtin(model_dir: &Path) -> Result<Self, KokoroError> {
        let config_path = model_dir.join("config.json");
        if config_path.exists() {
            log::info!("Loading vocab from {}", config_path.display());
            Self::load(&config_path)
        } else {
            log::warn!("config.json not found, using built-in vocab");
            Ok(Self::builtin())
        }
    }

    /// Built-in Kokoro vocabulary, shared by the v1.0 and v1.1 models.
    pub fn builtin() -> Self {
        Self(BUILTIN_VOCAB.iter().copied().collect())
    }

    pub fn id(&self, symbol: char) -> Option<i64> {
        self.0.get(&symbol).copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[rustfmt::skip]
const BUILTIN_VOCAB: &[(char, i64)] = &[
    (';', 1), (':', 2), (',', 3), ('.', 4), ('!', 5), ('?', 6), ('—', 9), ('…', 10),
    ('"', 11), ('(', 12), (')', 13), ('\u{201c}', 14), ('\u{201d}', 15), (' ', 16),
    ('\u{0303}', 17), ('ʣ', 18), ('ʥ', 19), ('ʦ', 20), ('ʨ', 21), ('ᵝ', 22), ('ꭧ', 23),
    ('A', 24), ('I', 25), ('O', 31), ('Q', 33), ('S', 35), ('T', 36), ('W', 39), ('Y', 41),
    ('ᵊ', 42), ('a', 43), ('b', 44), ('c', 45), ('d', 46), ('e', 47), ('f', 48), ('h', 50),
    ('i', 51), ('j', 52), ('k', 53), ('l', 54), ('m', 55), ('n', 56), ('o', 57), ('p', 58),
    ('q', 59), ('r', 60), ('s', 61), ('t', 62), ('u', 63), ('v', 64), ('w', 65), ('x', 66),
    ('y', 67), ('z', 68), ('ɑ', 69), ('ɐ', 70), ('ɒ', 71), ('æ', 72), ('β', 75), ('ɔ', 76),
    ('ɕ', 77), ('ç', 78), ('ɖ', 80), ('ð', 81), ('ʤ', 82), ('ə', 83), ('ɚ', 85), ('ɛ', 86),
    ('ɜ', 87), ('ɟ', 90), ('ɡ', 92), ('ɥ', 99), ('ɨ', 101), ('ɪ', 102), ('ʝ', 103),
    ('ɯ', 110), ('ɰ', 111), ('ŋ', 112), ('ɳ', 113), ('ɲ', 114), ('ɴ', 115), ('ø', 116),
    ('ɸ', 118), ('θ', 119), ('œ', 120), ('ɹ', 123), ('ɾ', 125), ('ɻ', 126), ('ʁ', 128),
    ('ɽ', 129), ('ʂ', 130), ('ʃ', 131), ('ʈ', 132), ('ʧ', 133), ('ʊ', 135), ('ʋ', 136),
    ('ʌ', 138), ('ɣ', 139), ('ɤ', 140), ('χ', 142), ('ʎ', 143), ('ʒ', 147), ('ʔ', 148),
    ('ˈ', 156), ('ˌ', 157), ('ː', 158), ('ʰ', 162), ('ʲ', 164), ('↓', 169), ('→', 171),
    ('↗', 172), ('↘', 173), ('ᵻ', 177),
];
