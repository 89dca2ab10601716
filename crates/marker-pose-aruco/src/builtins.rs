//! Dictionaries compiled into the crate.
//!
//! The source of truth is `marker-pose-aruco/data/*.json`; `build.rs` turns
//! every file there into one [`BuiltinDictionary`] entry.

#![allow(clippy::unreadable_literal)]

use crate::Dictionary;

pub(crate) struct BuiltinDictionary {
    pub name: &'static str,
    pub marker_size: usize,
    pub max_correction_bits: u8,
    pub codes: &'static [u64],
}

impl BuiltinDictionary {
    fn to_dictionary(&self) -> Dictionary {
        Dictionary {
            name: self.name.to_string(),
            marker_size: self.marker_size,
            max_correction_bits: self.max_correction_bits,
            codes: self.codes.to_vec(),
        }
    }
}

include!(concat!(env!("OUT_DIR"), "/builtins.rs"));

/// Look up a dictionary compiled into this crate by name.
pub fn builtin_dictionary(name: &str) -> Option<Dictionary> {
    BUILTINS
        .iter()
        .find(|b| b.name == name)
        .map(BuiltinDictionary::to_dictionary)
}
