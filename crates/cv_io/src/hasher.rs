//! crates/cv_io/src/hasher.rs
//!
//! SHA-256 helpers and the canonical record hash.
//!
//! The canonical hash identifies "the same logical record": it is computed
//! over the node's flattened metadata only (never its usage), with names
//! sorted case-sensitively and values lower-cased, so it is invariant under
//! field order and value capitalization. Hex digests are lowercase.

#![forbid(unsafe_code)]

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use cv_core::value::{flatten, FieldMap};
use sha2::{Digest, Sha256};

use crate::IoResult;

/// Which fields take part in the hash.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum HashVariant {
    /// Everything; duplicate detection.
    Full,
    /// Without `Format`; item-level aggregation.
    WithoutFormat,
    /// Without `Format` and `Section_Type`; title-level aggregation.
    WithoutFormatAndSectionType,
}

impl HashVariant {
    fn excludes(self, name: &str) -> bool {
        let top = name.split('.').next().unwrap_or(name);
        match self {
            HashVariant::Full => false,
            HashVariant::WithoutFormat => top == "Format",
            HashVariant::WithoutFormatAndSectionType => top == "Format" || top == "Section_Type",
        }
    }
}

/// Canonical hash of a node's metadata map.
pub fn canonical_hash(map: &FieldMap, variant: HashVariant) -> String {
    let mut leaves: Vec<(String, String)> =
        flatten(map).into_iter().filter(|(name, _)| !variant.excludes(name)).collect();
    leaves.sort_by(|a, b| a.0.cmp(&b.0));

    // Length prefixes keep free text from imitating another field layout.
    let mut hasher = Sha256::new();
    for (name, value) in &leaves {
        let value = value.to_lowercase();
        hasher.update((name.len() as u64).to_be_bytes());
        hasher.update(name.as_bytes());
        hasher.update((value.len() as u64).to_be_bytes());
        hasher.update(value.as_bytes());
    }
    hex::encode(hasher.finalize())
}

/// SHA-256 over a file's raw bytes (used to fingerprint inputs in logs).
pub fn sha256_file(path: &Path) -> IoResult<String> {
    let mut r = BufReader::new(File::open(path)?);
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; 64 * 1024];
    loop {
        let n = r.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use cv_core::value::FieldValue;

    fn item(title: &str, section: Option<&str>) -> FieldMap {
        let mut m = FieldMap::new();
        m.insert("Title".into(), title.into());
        m.insert("Platform".into(), "Platform X".into());
        if let Some(s) = section {
            m.insert("Section_Type".into(), s.into());
        }
        m
    }

    #[test]
    fn free_text_cannot_imitate_another_layout() {
        let mut one = FieldMap::new();
        one.insert("A".into(), "x\nb => y".into());
        let mut two = FieldMap::new();
        two.insert("A".into(), "x".into());
        two.insert("b".into(), "y".into());
        assert_ne!(canonical_hash(&one, HashVariant::Full), canonical_hash(&two, HashVariant::Full));
    }

    #[test]
    fn value_case_does_not_matter_but_names_do() {
        let a = canonical_hash(&item("Journal of Things", None), HashVariant::Full);
        let b = canonical_hash(&item("JOURNAL OF THINGS", None), HashVariant::Full);
        assert_eq!(a, b);

        let mut renamed = FieldMap::new();
        renamed.insert("title".into(), "Journal of Things".into());
        renamed.insert("Platform".into(), "Platform X".into());
        assert_ne!(a, canonical_hash(&renamed, HashVariant::Full));
    }

    #[test]
    fn variants_drop_section_type_and_descendants() {
        let article = item("T", Some("Article"));
        let chapter = item("T", Some("Chapter"));
        assert_ne!(
            canonical_hash(&article, HashVariant::WithoutFormat),
            canonical_hash(&chapter, HashVariant::WithoutFormat)
        );
        assert_eq!(
            canonical_hash(&article, HashVariant::WithoutFormatAndSectionType),
            canonical_hash(&item("T", None), HashVariant::Full)
        );

        let mut nested = item("T", None);
        let mut fmt = FieldMap::new();
        fmt.insert("Kind".into(), "PDF".into());
        nested.insert("Format".into(), FieldValue::Map(fmt));
        assert_eq!(
            canonical_hash(&nested, HashVariant::WithoutFormat),
            canonical_hash(&item("T", None), HashVariant::Full)
        );
    }

    #[test]
    fn file_digest_matches_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("r.json");
        std::fs::write(&p, b"abc").unwrap();
        assert_eq!(sha256_file(&p).unwrap(), "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad");
    }
}
