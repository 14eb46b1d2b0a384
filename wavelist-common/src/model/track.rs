use super::daypart::RotationCategory;
use serde::{Deserialize, Serialize};

/// Where a track's enrichment-eligible field (bpm/genre/year/country) was
/// obtained from (spec §3, §4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetadataSource {
    Library,
    WebEnrichment,
    AudioAnalysis,
}

/// Per-track outcome of scoring against the selection criteria (spec
/// §4.5 "Per-track validation").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ValidationStatus {
    Pass,
    Warning,
    Fail,
}

/// A track as returned by the (external, out-of-core) library accessor,
/// the minimal shape the selector's tools and the enricher operate on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LibraryTrack {
    pub id: String,
    pub title: String,
    pub artist: String,
    pub album: String,
    pub duration_seconds: u32,
    pub is_australian: bool,
    pub rotation_category: RotationCategory,
    pub bpm: Option<f64>,
    pub genre: Option<String>,
    pub year: Option<i32>,
    pub country: Option<String>,
    pub metadata_source: Option<MetadataSource>,
    /// Opaque handle the library accessor understands, passed to the
    /// local audio analyser when BPM is still missing (spec §4.2).
    pub audio_ref: Option<String>,
}

/// A track placed into a finished playlist (spec §3 "Selected Track").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectedTrack {
    pub track_id: String,
    pub title: String,
    pub artist: String,
    pub album: String,
    pub duration_seconds: u32,
    pub is_australian: bool,
    pub rotation_category: RotationCategory,
    pub position_in_playlist: usize,
    pub selection_reasoning: String,
    pub validation_status: ValidationStatus,
    pub bpm: Option<f64>,
    pub genre: Option<String>,
    pub year: Option<i32>,
    pub country: Option<String>,
    pub metadata_source: Option<MetadataSource>,
}

impl SelectedTrack {
    /// §3: `selection_reasoning` must be at least 50 characters.
    pub fn has_sufficient_reasoning(&self) -> bool {
        self.selection_reasoning.chars().count() >= 50
    }
}
