//! Embeds every `data/*.json` dictionary as a static table.

use serde::Deserialize;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::{env, fs};

#[derive(Deserialize)]
struct DictionaryFile {
    name: String,
    marker_size: usize,
    max_correction_bits: u8,
    codes: Vec<u64>,
}

fn data_files(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = fs::read_dir(dir)
        .unwrap_or_else(|e| panic!("reading {}: {e}", dir.display()))
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
        .collect();
    files.sort();
    files
}

fn main() {
    let manifest = PathBuf::from(env::var("CARGO_MANIFEST_DIR").expect("CARGO_MANIFEST_DIR"));
    let data_dir = manifest.join("data");
    println!("cargo:rerun-if-changed={}", data_dir.display());

    let mut tables = String::new();
    let mut names = Vec::new();
    for path in data_files(&data_dir) {
        println!("cargo:rerun-if-changed={}", path.display());
        let raw = fs::read_to_string(&path)
            .unwrap_or_else(|e| panic!("reading {}: {e}", path.display()));
        let dict: DictionaryFile = serde_json::from_str(&raw)
            .unwrap_or_else(|e| panic!("parsing {}: {e}", path.display()));

        let bits = dict.marker_size * dict.marker_size;
        assert!(
            (1..=64).contains(&bits),
            "{}: marker_size {} is out of range",
            dict.name,
            dict.marker_size
        );
        assert!(!dict.codes.is_empty(), "{}: no codes", dict.name);
        if bits < 64 {
            if let Some(code) = dict.codes.iter().find(|&&c| c >> bits != 0) {
                panic!("{}: code {code:#x} does not fit in {bits} bits", dict.name);
            }
        }

        let codes: Vec<String> = dict.codes.iter().map(|c| format!("{c:#x}")).collect();
        let _ = writeln!(
            tables,
            "    BuiltinDictionary {{ name: {:?}, marker_size: {}, max_correction_bits: {}, codes: &[{}] }},",
            dict.name,
            dict.marker_size,
            dict.max_correction_bits,
            codes.join(", ")
        );
        names.push(format!("{:?}", dict.name));
    }

    let out = format!(
        "pub(crate) const BUILTINS: &[BuiltinDictionary] = &[\n{tables}];\n\n\
         /// Names of the dictionaries compiled into this crate.\n\
         pub const BUILTIN_DICTIONARY_NAMES: &[&str] = &[{}];\n",
        names.join(", ")
    );
    let dest = PathBuf::from(env::var("OUT_DIR").expect("OUT_DIR")).join("builtins.rs");
    fs::write(&dest, out).unwrap_or_else(|e| panic!("writing {}: {e}", dest.display()));
}
