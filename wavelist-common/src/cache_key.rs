//! Case-folded, diacritic-stripped cache keys for `(artist, title)` pairs
//! (spec §4.2: "a permanent on-disk cache keyed by `(artist, title)`
//! (case-folded, diacritic-stripped)").
//!
//! Grounded on the NFKD-decomposition diacritic-folding approach used for
//! fuzzy artist matching in the pack's lyrics-metadata extraction tool.

use sha2::{Digest, Sha256};
use unicode_normalization::UnicodeNormalization;

fn fold(s: &str) -> String {
    s.nfkd()
        .filter(|c| !is_combining_mark(*c))
        .collect::<String>()
        .to_lowercase()
        .trim()
        .to_string()
}

fn is_combining_mark(c: char) -> bool {
    matches!(c as u32, 0x0300..=0x036F | 0x1AB0..=0x1AFF | 0x1DC0..=0x1DFF | 0x20D0..=0x20FF)
}

/// A stable, content-addressed key for the metadata cache.
pub fn track_cache_key(artist: &str, title: &str) -> String {
    let folded = format!("{}\u{1}{}", fold(artist), fold(title));
    let mut hasher = Sha256::new();
    hasher.update(folded.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diacritics_and_case_fold_to_the_same_key() {
        let a = track_cache_key("Sigur Rós", "Hoppípolla");
        let b = track_cache_key("sigur ros", "HOPPIPOLLA");
        assert_eq!(a, b);
    }

    #[test]
    fn different_tracks_differ() {
        assert_ne!(
            track_cache_key("Artist A", "Song"),
            track_cache_key("Artist B", "Song")
        );
    }
}
