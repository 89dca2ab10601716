//! Code lookup against a dictionary, tolerant to in-plane rotation.

use crate::{Dictionary, DictionaryError};

/// A dictionary match for an observed marker code.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Match {
    pub id: u32,
    /// Rotation `0..=3` such that `observed == rotate_code_u64(dict_code, rotation)`.
    pub rotation: u8,
    /// Hamming distance to the rotated dictionary code.
    pub hamming: u8,
}

/// One rotated dictionary code.
#[derive(Clone, Copy, Debug)]
struct Entry {
    code: u64,
    id: u32,
    rotation: u8,
}

/// Linear scan over every id in all four orientations.
///
/// A corrected read (`hamming > 0`) that is equally close to two different
/// ids is ambiguous and reported as no match.
#[derive(Clone, Debug)]
pub struct Matcher {
    dict: Dictionary,
    max_hamming: u8,
    entries: Vec<Entry>,
}

impl Matcher {
    pub fn new(dict: Dictionary, max_hamming: u8) -> Result<Self, DictionaryError> {
        dict.validate()?;
        let n = dict.marker_size;
        let mut entries = Vec::with_capacity(dict.codes.len() * 4);
        for (id, &base) in dict.codes.iter().enumerate() {
            let mut code = base;
            for rotation in 0..4u8 {
                entries.push(Entry {
                    code,
                    id: id as u32,
                    rotation,
                });
                code = quarter_turn(code, n);
            }
        }

        Ok(Self {
            dict,
            max_hamming,
            entries,
        })
    }

    #[inline]
    pub fn dictionary(&self) -> &Dictionary {
        &self.dict
    }

    #[inline]
    pub fn max_hamming(&self) -> u8 {
        self.max_hamming
    }

    /// Closest entry within `max_hamming`, or `None` when nothing is close
    /// enough or the closest corrected read is ambiguous.
    pub fn match_code(&self, observed: u64) -> Option<Match> {
        let mut best: Option<Match> = None;
        let mut ambiguous = false;

        for e in &self.entries {
            let h = (observed ^ e.code).count_ones() as u8;
            if h > self.max_hamming {
                continue;
            }
            if h == 0 {
                return Some(Match {
                    id: e.id,
                    rotation: e.rotation,
                    hamming: 0,
                });
            }
            match best {
                Some(prev) if h > prev.hamming => {}
                Some(prev) if h == prev.hamming => ambiguous |= prev.id != e.id,
                _ => {
                    best = Some(Match {
                        id: e.id,
                        rotation: e.rotation,
                        hamming: h,
                    });
                    ambiguous = false;
                }
            }
        }

        if ambiguous {
            return None;
        }
        best
    }
}

/// One clockwise quarter turn of an `n`×`n` row-major code.
fn quarter_turn(code: u64, n: usize) -> u64 {
    let mut out = 0u64;
    for y in 0..n {
        for x in 0..n {
            let bit = (code >> ((n - 1 - x) * n + y)) & 1;
            out |= bit << (y * n + x);
        }
    }
    out
}

/// Rotate a row-major code (`idx = y * n + x`) clockwise by `rot` quarter turns.
pub fn rotate_code_u64(code: u64, n: usize, rot: u8) -> u64 {
    (0..rot & 3).fold(code, |c, _| quarter_turn(c, n))
}
