//! Square fiducial marker detection.
//!
//! The pipeline is:
//! - global Otsu binarization of the gray frame,
//! - one quad candidate per dark connected component,
//! - bit sampling through the quad homography and dictionary matching over
//!   all four rotations.
//!
//! Dictionaries are plain data (`{ name, marker_size, max_correction_bits,
//! codes }`) and load from JSON. Every file under `data/` is compiled in and
//! available through [`builtin_dictionary`].

mod builtins;
mod decode;
mod detector;
mod dictionary;
mod matcher;
mod quads;
mod threshold;

pub use builtins::{builtin_dictionary, BUILTIN_DICTIONARY_NAMES};
pub use decode::DecodeParams;
pub use detector::{ArucoDetector, ArucoDetectorParams};
pub use dictionary::{Dictionary, DictionaryError};
pub use matcher::{rotate_code_u64, Match, Matcher};
pub use quads::QuadParams;
