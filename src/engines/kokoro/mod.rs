//! Kokoro-82M backend.
//!
//! G2P runs through espeak-ng and the acoustic model is the Kokoro ONNX
//! export, executed with ONNX Runtime on CPU or CUDA.
//!
//! # System Requirements
//!
//! **espeak-ng** must be installed on your system:
//! - **Linux**: `sudo apt-get install espeak-ng`
//! - **macOS**: `brew install espeak-ng`
//! - **Windows**: Download installer from <https://espeak-ng.org/download>
//!
//! # Model Directory Layout
//!
//! ```text
//! models/kokoro/
//! ├── kokoro-v1.1-zh.onnx     # any .onnx file is accepted
//! ├── voices-v1.1-zh.bin      # voice archive (.npz format), any voices*.bin
//! └── config.json             # vocabulary; built-in table used when absent
//! ```
//!
//! # Language Selection
//!
//! The voice prefix decides the espeak-ng language:
//!
//! | Voice prefix | Language | espeak-ng code |
//! |---|---|---|
//! | `af_`, `am_` | American English | `en-us` |
//! | `bf_`, `bm_` | British English | `en-gb` |
//! | `ef_`, `em_` | Spanish | `es` |
//! | `ff_` | French | `fr` |
//! | `hf_`, `hm_` | Hindi | `hi` |
//! | `if_`, `im_` | Italian | `it` |
//! | `jf_`, `jm_` | Japanese | `ja` |
//! | `pf_`, `pm_` | Brazilian Portuguese | `pt-br` |
//! | `zf_`, `zm_` | Mandarin Chinese | `cmn` |
//!
//! Voices without a known prefix use the request's `language` tag instead.

pub mod engine;
pub mod model;
pub mod phonemizer;
pub mod vocab;
pub mod voices;

pub use engine::{KokoroEngine, KokoroModelParams};
pub use model::{KokoroError, KokoroModel};
pub use phonemizer::{EspeakConfig, EspeakPhonemizer};
