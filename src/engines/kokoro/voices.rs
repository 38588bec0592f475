use std::collections::HashMap;
use std::fs::File;
use std::io::{Read, Seek};
use std::path::{Path, PathBuf};

use super::model::{KokoroError, STYLE_DIM};

type StyleVector = [f32; STYLE_DIM];

/// Voice style vectors, one list per voice.
///
/// A voice's list is indexed by phoneme token count so prosody tracks
/// utterance length.
pub struct VoiceStore {
    voices: HashMap<String, Vec<StyleVector>>,
}

impl VoiceStore {
    /// Load all voices from a `.npz` archive of `<voice>.npy` entries.
    pub fn load(path: &Path) -> Result<Self, KokoroError> {
        let store = Self::from_reader(File::open(path)?)?;
        log::info!("Loaded {} voices from {}", store.voices.len(), path.display());
        Ok(store)
    }

    pub fn from_reader<R: Read + Seek>(reader: R) -> Result<Self, KokoroError> {
        let mut archive = zip::ZipArchive::new(reader)
            .map_err(|e| KokoroError::VoiceParse(format!("Failed to open zip archive: {e}")))?;

        let mut voices = HashMap::with_capacity(archive.len());
        for i in 0..archive.len() {
            let mut entry = archive.by_index(i).map_err(|e| {
                KokoroError::VoiceParse(format!("Failed to read zip entry {i}: {e}"))
            })?;
            if entry.is_dir() {
                continue;
            }

            let entry_name = entry.name().to_string();
            let voice = entry_name.trim_end_matches(".npy");
            if voice.is_empty() {
                continue;
            }

            let mut data = Vec::with_capacity(entry.size() as usize);
            entry.read_to_end(&mut data).map_err(|e| {
                KokoroError::VoiceParse(format!("Failed to read {entry_name}: {e}"))
            })?;
            voices.insert(voice.to_string(), parse_npy(&data, &entry_name)?);
        }

        Ok(Self { voices })
    }

    /// Style vector for `voice` at `idx`, clamped to the last available row.
    pub fn style(&self, voice: &str, idx: usize) -> Result<&StyleVector, KokoroError> {
        let styles = self
            .voices
            .get(voice)
            .filter(|styles| !styles.is_empty())
            .ok_or_else(|| KokoroError::VoiceNotFound(voice.to_string()))?;
        Ok(&styles[idx.min(styles.len() - 1)])
    }

    /// Voice names in sorted order.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.voices.keys().cloned().collect();
        names.sort_unstable();
        names
    }
}

/// Locate the voices archive in a model directory.
///
/// Prefers the v1.1-zh archive, then v1.0, then any `voices*.bin`.
pub fn find_voices_file(model_dir: &Path) -> Result<PathBuf, KokoroError> {
    for preferred in ["voices-v1.1-zh.bin", "voices-v1.0.bin"] {
        let path = model_dir.join(preferred);
        if path.exists() {
            return Ok(path);
        }
    }

    for entry in std::fs::read_dir(model_dir)? {
        let path = entry?.path();
        let is_voices = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with("voices") && n.ends_with(".bin"));
        if is_voices {
            return Ok(path);
        }
    }

    Err(KokoroError::Io(std::io::Error::new(
        std::io::ErrorKind::NotFound,
        format!(
            "No voices archive found in {}. Download it from the Kokoro model repository.",
            model_dir.display()
        ),
    )))
}

/// Parse a little-endian float32 `.npy` array of shape `[N, STYLE_DIM]`
/// (a leading singleton axis such as `[N, 1, STYLE_DIM]` is tolerated).
fn parse_npy(data: &[u8], name: &str) -> Result<Vec<StyleVector>, KokoroError> {
    let fail = |msg: String| KokoroError::VoiceParse(format!("{name}: {msg}"));

    if data.len() < 10 || &data[..6] != b"\x93NUMPY" {
        return Err(fail("not a numpy array".to_string()));
    }

    // v1 stores the header length as u16 at [8..10], v2+ as u32 at [8..12].
    let (header_len, header_start) = match data[6] {
        1 => (u16::from_le_bytes([data[8], data[9]]) as usize, 10),
        _ if data.len() >= 12 => (
            u32::from_le_bytes([data[8], data[9], data[10], data[11]]) as usize,
            12,
        ),
        _ => return Err(fail("header truncated".to_string())),
    };
    let data_offset = header_start + header_len;
    if data.len() < data_offset {
        return Err(fail(format!(
            "header truncated (need {data_offset} bytes, got {})",
            data.len()
        )));
    }

    let header = String::from_utf8_lossy(&data[header_start..data_offset]);
    if !header.contains("<f4") {
        return Err(fail(format!("expected little-endian float32 data, header: {header}")));
    }

    let payload = &data[data_offset..];
    let row_bytes = STYLE_DIM * 4;
    if payload.len() % row_bytes != 0 {
        return Err(fail(format!(
            "payload of {} bytes is not a whole number of {STYLE_DIM}-float rows",
            payload.len()
        )));
    }

    Ok(payload
        .chunks_exact(row_bytes)
        .map(|row| {
            let mut style = [0f32; STYLE_DIM];
            for (value, bytes) in style.iter_mut().zip(row.chunks_exact(4)) {
                *value = f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
            }
            style
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Write};

    fn npy(rows: usize, fill: impl Fn(usize, usize) -> f32) -> Vec<u8> {
        let mut header =
            format!("{{'descr': '<f4', 'fortran_order': False, 'shape': ({rows}, 1, {STYLE_DIM}), }}");
        while (10 + header.len() + 1) % 64 != 0 {
            header.push(' ');
        }
        header.push('\n');

        let mut out = b"\x93NUMPY\x01\x00".to_vec();
        out.extend_from_slice(&(header.len() as u16).to_le_bytes());
        out.extend_from_slice(header.as_bytes());
        for r in 0..rows {
            for c in 0..STYLE_DIM {
                out.extend_from_slice(&fill(r, c).to_le_bytes());
            }
        }
        out
    }

    fn npz(entries: &[(&str, Vec<u8>)]) -> Cursor<Vec<u8>> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        for (name, data) in entries {
            writer
                .start_file(*name, zip::write::SimpleFileOptions::default())
                .unwrap();
            writer.write_all(data).unwrap();
        }
        let mut cursor = writer.finish().unwrap();
        cursor.set_position(0);
        cursor
    }

    #[test]
    fn parses_rows_in_order() {
        let styles = parse_npy(&npy(3, |r, c| (r * 1000 + c) as f32), "zf_001.npy").unwrap();
        assert_eq!(styles.len(), 3);
        assert_eq!(styles[2][5], 2005.0);
    }

    #[test]
    fn rejects_bad_magic_and_ragged_payload() {
        assert!(parse_npy(b"not numpy at all", "x.npy").is_err());

        let mut ragged = npy(1, |_, _| 0.0);
        ragged.extend_from_slice(&[0, 0, 0, 0]);
        assert!(parse_npy(&ragged, "x.npy").is_err());
    }

    #[test]
    fn loads_archive_and_clamps_style_index() {
        let archive = npz(&[
            ("zf_001.npy", npy(2, |r, _| r as f32)),
            ("zf_002.npy", npy(1, |_, _| 7.0)),
        ]);
        let store = VoiceStore::from_reader(archive).unwrap();

        assert_eq!(store.names(), vec!["zf_001".to_string(), "zf_002".to_string()]);
        assert_eq!(store.style("zf_001", 1).unwrap()[0], 1.0);
        assert_eq!(store.style("zf_001", 500).unwrap()[0], 1.0);
        assert!(matches!(
            store.style("af_heart", 0),
            Err(KokoroError::VoiceNotFound(_))
        ));
    }
}
