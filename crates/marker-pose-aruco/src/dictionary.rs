//! Marker dictionaries: metadata plus packed codes.

use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

#[derive(thiserror::Error, Debug)]
pub enum DictionaryError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error("marker_size {marker_size} implies {bits} bits (supported: 1..=64)")]
    UnsupportedBitCount { marker_size: usize, bits: usize },
    #[error("dictionary {0:?} has no codes")]
    Empty(String),
    #[error("code {code:#x} for id {id} does not fit in {bits} bits")]
    CodeOutOfRange { id: usize, code: u64, bits: usize },
}

/// An ArUco-style dictionary.
///
/// Inner bits are stored row-major with **black = 1**, one `u64` per marker
/// id.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dictionary {
    pub name: String,
    /// Inner bits per marker side.
    pub marker_size: usize,
    /// Largest Hamming distance the dictionary can correct.
    pub max_correction_bits: u8,
    pub codes: Vec<u64>,
}

impl Dictionary {
    #[inline]
    pub fn bit_count(&self) -> usize {
        self.marker_size * self.marker_size
    }

    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }

    pub fn validate(&self) -> Result<(), DictionaryError> {
        let bits = self.bit_count();
        if bits == 0 || bits > 64 {
            return Err(DictionaryError::UnsupportedBitCount {
                marker_size: self.marker_size,
                bits,
            });
        }
        if self.codes.is_empty() {
            return Err(DictionaryError::Empty(self.name.clone()));
        }
        if bits < 64 {
            if let Some((id, &code)) = self
                .codes
                .iter()
                .enumerate()
                .find(|(_, &c)| c >> bits != 0)
            {
                return Err(DictionaryError::CodeOutOfRange { id, code, bits });
            }
        }
        Ok(())
    }

    /// Parse and validate a dictionary from a JSON string.
    pub fn from_json_str(s: &str) -> Result<Self, DictionaryError> {
        let dict: Self = serde_json::from_str(s)?;
        dict.validate()?;
        Ok(dict)
    }

    /// Load and validate a dictionary from a JSON file.
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, DictionaryError> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        let dict: Self = serde_json::from_reader(reader)?;
        dict.validate()?;
        Ok(dict)
    }

    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), DictionaryError> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtin_dictionary;

    #[test]
    fn builtin_demo_dictionary_parses() {
        let dict = builtin_dictionary("DEMO_4X4_9").expect("builtin");
        assert_eq!(dict.marker_size, 4);
        assert_eq!(dict.len(), 9);
        assert_eq!(dict.codes[0], 0xB532);
    }

    #[test]
    fn rejects_codes_wider_than_bit_count() {
        let err = Dictionary::from_json_str(
            r#"{"name":"bad","marker_size":3,"max_correction_bits":0,"codes":[1, 1024]}"#,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            DictionaryError::CodeOutOfRange { id: 1, bits: 9, .. }
        ));
    }

    #[test]
    fn rejects_oversized_markers() {
        let dict = Dictionary {
            name: "huge".into(),
            marker_size: 9,
            max_correction_bits: 0,
            codes: vec![0],
        };
        assert!(matches!(
            dict.validate(),
            Err(DictionaryError::UnsupportedBitCount { bits: 81, .. })
        ));
    }

    #[test]
    fn json_file_round_trip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("dict.json");
        let dict = builtin_dictionary("DEMO_4X4_9").expect("builtin");
        dict.write_json(&path).expect("write");
        let loaded = Dictionary::load_json(&path).expect("load");
        assert_eq!(loaded, dict);
    }
}
