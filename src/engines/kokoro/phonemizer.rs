use std::borrow::Cow;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;

use super::model::KokoroError;
use super::vocab::Vocab;
use crate::{PhonemeSequence, PhonemizeError, Phonemizer};

/// Location of the espeak-ng binary and its data directory.
///
/// `None` falls back to `espeak-ng` on PATH and its compiled-in data path.
#[derive(Debug, Clone, Default)]
pub struct EspeakConfig {
    pub bin_path: Option<PathBuf>,
    pub data_path: Option<PathBuf>,
}

impl EspeakConfig {
    fn command(&self) -> Command {
        let bin = self
            .bin_path
            .as_deref()
            .unwrap_or_else(|| Path::new("espeak-ng"));
        let mut command = Command::new(bin);
        if let Some(data) = &self.data_path {
            command.env("ESPEAK_DATA_PATH", data);
        }
        command
    }
}

/// espeak-ng backed G2P producing Kokoro token ids.
pub struct EspeakPhonemizer {
    espeak: EspeakConfig,
    vocab: Vocab,
}

impl EspeakPhonemizer {
    pub fn new(espeak: EspeakConfig, vocab: Vocab) -> Self {
        Self { espeak, vocab }
    }

    /// Fail early when espeak-ng cannot be executed.
    pub fn check_available(&self) -> Result<(), KokoroError> {
        let output = self
            .espeak
            .command()
            .arg("--version")
            .output()
            .map_err(spawn_error)?;
        log::info!(
            "Using {}",
            String::from_utf8_lossy(&output.stdout).trim()
        );
        Ok(())
    }
}

impl Phonemizer for EspeakPhonemizer {
    fn phonemize(
        &self,
        text: &str,
        voice: &str,
        language: &str,
    ) -> Result<PhonemeSequence, PhonemizeError> {
        let lang = match voice_lang(voice) {
            Some(lang) => Cow::Borrowed(lang),
            None => espeak_lang(language),
        };
        // Every espeak-ng failure is a fault of the host, not of the text.
        phonemize(text, &lang, &self.espeak, &self.vocab)
            .map_err(|e| PhonemizeError::Backend(e.to_string()))
    }
}

/// espeak-ng language for a voice, from its two-character prefix.
pub fn voice_lang(voice: &str) -> Option<&'static str> {
    let lang = match voice.get(..2)? {
        "af" | "am" => "en-us",
        "bf" | "bm" => "en-gb",
        "ef" | "em" => "es",
        "ff" => "fr",
        "hf" | "hm" => "hi",
        "if" | "im" => "it",
        "jf" | "jm" => "ja",
        "pf" | "pm" => "pt-br",
        "zf" | "zm" => "cmn",
        _ => return None,
    };
    Some(lang)
}

/// espeak-ng language for a request language tag. Unknown tags pass through.
pub fn espeak_lang(tag: &str) -> Cow<'_, str> {
    let lang = match tag.to_ascii_lowercase().as_str() {
        "" | "en" | "en-us" | "en_us" => "en-us",
        "en-gb" | "en_gb" => "en-gb",
        "zh" | "zh-cn" | "zh_cn" | "cmn" => "cmn",
        "pt" | "pt-br" | "pt_br" => "pt-br",
        _ => return Cow::Borrowed(tag),
    };
    Cow::Borrowed(lang)
}

/// Convert text to Kokoro phonemes via espeak-ng.
///
/// Text is split on boundary punctuation; each text run is phonemized and
/// the punctuation is re-inserted as its own token. IPA symbols missing from
/// the vocabulary are dropped.
pub fn phonemize(
    text: &str,
    lang: &str,
    espeak: &EspeakConfig,
    vocab: &Vocab,
) -> Result<PhonemeSequence, KokoroError> {
    let parts = split_text_parts(text);
    let segments: Vec<&str> = parts
        .iter()
        .filter_map(|part| match part {
            TextPart::Text(segment) => Some(segment.as_str()),
            TextPart::Punct(_) => None,
        })
        .collect();

    let segment_ipa = if segments.is_empty() {
        Vec::new()
    } else {
        phonemize_segments(&segments, lang, espeak)?
    };
    let mut segment_ipa = segment_ipa.into_iter();

    let mut sequence = PhonemeSequence::default();
    for part in &parts {
        match part {
            TextPart::Text(_) => {
                if let Some(ipa) = segment_ipa.next() {
                    push_ipa(&mut sequence, &ipa, vocab);
                }
            }
            TextPart::Punct(ch) => push_symbol(&mut sequence, *ch, vocab),
        }
    }

    Ok(sequence)
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum TextPart {
    Text(String),
    Punct(char),
}

fn split_text_parts(text: &str) -> Vec<TextPart> {
    let mut parts = Vec::new();
    let mut current = String::new();

    for (idx, ch) in text.char_indices() {
        if let Some(punct) = boundary_punctuation(ch) {
            if !is_numeric_separator(text, idx, ch) {
                flush_text(&mut parts, &mut current);
                parts.push(TextPart::Punct(punct));
                continue;
            }
        }

        if ch.is_whitespace() {
            if !current.is_empty() && !current.ends_with(' ') {
                current.push(' ');
            }
        } else {
            current.push(ch);
        }
    }

    flush_text(&mut parts, &mut current);
    parts
}

fn flush_text(parts: &mut Vec<TextPart>, current: &mut String) {
    let trimmed = current.trim();
    if !trimmed.is_empty() {
        parts.push(TextPart::Text(trimmed.to_string()));
    }
    current.clear();
}

/// Punctuation Kokoro keeps as prosody tokens. Full-width CJK marks map to
/// their ASCII equivalents.
fn boundary_punctuation(ch: char) -> Option<char> {
    match ch {
        '.' | '!' | '?' | ',' | ';' | ':' | '—' | '…' | '"' | '(' | ')' | '\u{201c}'
        | '\u{201d}' => Some(ch),
        '。' => Some('.'),
        '，' | '、' => Some(','),
        '！' => Some('!'),
        '？' => Some('?'),
        '；' => Some(';'),
        '：' => Some(':'),
        '（' => Some('('),
        '）' => Some(')'),
        '\n' | '\r' => Some('.'),
        _ => None,
    }
}

/// `.` and `,` between two digits belong to a number, not the sentence.
fn is_numeric_separator(text: &str, idx: usize, ch: char) -> bool {
    if !matches!(ch, '.' | ',') {
        return false;
    }
    let prev = text[..idx].chars().next_back();
    let next = text[idx + ch.len_utf8()..].chars().next();
    matches!(
        (prev, next),
        (Some(left), Some(right)) if left.is_ascii_digit() && right.is_ascii_digit()
    )
}

/// Phonemize all segments in one espeak-ng call, one line per segment.
fn phonemize_segments(
    segments: &[&str],
    lang: &str,
    espeak: &EspeakConfig,
) -> Result<Vec<String>, KokoroError> {
    let output = run_espeak(&segments.join("\n"), lang, espeak)?;
    let lines: Vec<String> = output.lines().map(str::to_string).collect();
    if lines.len() == segments.len() {
        return Ok(lines);
    }

    log::debug!(
        "espeak-ng returned {} lines for {} segments, retrying one at a time",
        lines.len(),
        segments.len()
    );
    segments
        .iter()
        .map(|segment| run_espeak(segment, lang, espeak))
        .collect()
}

fn run_espeak(input: &str, lang: &str, espeak: &EspeakConfig) -> Result<String, KokoroError> {
    let mut child = espeak
        .command()
        .args(["--ipa", "--stdin", "-q", "-v", lang])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(spawn_error)?;

    // espeak-ng writes IPA while it is still reading, so stdin is fed from its
    // own thread; otherwise both pipes can fill up and block each other.
    // espeak-ng under-processes a final line without a terminator.
    let stdin = child.stdin.take();
    let payload = newline_terminated(input).into_owned();
    let writer = thread::spawn(move || -> std::io::Result<()> {
        if let Some(mut stdin) = stdin {
            stdin.write_all(payload.as_bytes())?;
        }
        Ok(())
    });

    let output = child.wait_with_output()?;
    let written = writer
        .join()
        .map_err(|_| KokoroError::PhonemizerFailed("espeak-ng stdin writer panicked".into()))?;

    if !output.status.success() {
        return Err(KokoroError::PhonemizerFailed(format!(
            "espeak-ng exited with code {:?}: {}",
            output.status.code(),
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }
    written?;

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

fn spawn_error(e: std::io::Error) -> KokoroError {
    if e.kind() == std::io::ErrorKind::NotFound {
        KokoroError::EspeakNotFound
    } else {
        KokoroError::Io(e)
    }
}

fn newline_terminated(input: &str) -> Cow<'_, str> {
    if input.ends_with('\n') {
        Cow::Borrowed(input)
    } else {
        Cow::Owned(format!("{input}\n"))
    }
}

fn push_ipa(sequence: &mut PhonemeSequence, ipa: &str, vocab: &Vocab) {
    for line in ipa.lines().map(str::trim).filter(|l| !l.is_empty()) {
        for ch in line.chars().filter(|&ch| ch != '_') {
            push_symbol(sequence, ch, vocab);
        }
    }
}

fn push_symbol(sequence: &mut PhonemeSequence, ch: char, vocab: &Vocab) {
    if let Some(id) = vocab.id(ch) {
        sequence.ids.push(id);
        sequence.phonemes.push(ch);
    }
}
