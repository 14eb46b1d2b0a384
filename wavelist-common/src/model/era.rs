use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Maps an era label (GLOSSARY: "a named window of release years") to the
/// inclusive year bounds it denotes, resolved relative to a reference year
/// (typically the playlist's generation date).
///
/// The source specification names example eras ("Current = last 2 years",
/// "Recent = 2-5 years ago") but does not give a closed table; §9's Open
/// Questions section asks implementers to record such decisions rather
/// than guess silently, so the defaults below are this specification's
/// normative adoption, not a source-derived fact (see DESIGN.md).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EraTable {
    /// label -> (years_ago_min, years_ago_max), both inclusive, counted
    /// back from the reference year.
    offsets: HashMap<String, (i32, i32)>,
}

impl Default for EraTable {
    fn default() -> Self {
        let mut offsets = HashMap::new();
        offsets.insert("Current".to_string(), (0, 2));
        offsets.insert("Recent".to_string(), (2, 5));
        offsets.insert("Classics".to_string(), (5, 20));
        offsets.insert("Oldies".to_string(), (20, 200));
        Self { offsets }
    }
}

impl EraTable {
    pub fn with_offset(mut self, label: impl Into<String>, min_years_ago: i32, max_years_ago: i32) -> Self {
        self.offsets.insert(label.into(), (min_years_ago, max_years_ago));
        self
    }

    /// Resolve `label`'s inclusive `[min_year, max_year]` bounds relative
    /// to `reference_year`. Unknown labels fall back to an unbounded-past
    /// window ending at `reference_year`, so an "Unknown"/fallback era row
    /// (spec §4.1, allowed up to 5%) never hard-fails resolution.
    pub fn resolve(&self, label: &str, reference_year: i32) -> (i32, i32) {
        match self.offsets.get(label) {
            Some((min_ago, max_ago)) => (reference_year - max_ago, reference_year - min_ago),
            None => (1900, reference_year),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_known_labels() {
        let table = EraTable::default();
        assert_eq!(table.resolve("Current", 2026), (2024, 2026));
        assert_eq!(table.resolve("Recent", 2026), (2021, 2024));
    }

    #[test]
    fn unknown_label_is_permissive() {
        let table = EraTable::default();
        let (min, max) = table.resolve("Unknown", 2026);
        assert_eq!(max, 2026);
        assert!(min < 2000);
    }
}
