use super::criteria::TrackSelectionCriteria;
use super::track::SelectedTrack;
use super::validation::ValidationResult;
use crate::money::Usd;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A playlist-to-be-generated, derived from a daypart plus a generation
/// date (spec §3 "Playlist Specification").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaylistSpecification {
    pub id: Uuid,
    pub name: String,
    pub daypart_id: Uuid,
    pub min_tracks: usize,
    pub max_tracks: usize,
    pub criteria: TrackSelectionCriteria,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub cost_budget: Option<Usd>,
}

/// Which soft constraint a relaxation step widened (spec §3, §4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelaxedConstraintType {
    Bpm,
    Genre,
    Era,
}

/// A single, logged, irreversible-for-this-run loosening of one soft
/// constraint (spec §3, §4.6). The Australian-content floor and the
/// no-repeat window are never represented here because they are never
/// relaxed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConstraintRelaxation {
    pub step: u32,
    pub constraint_type: RelaxedConstraintType,
    pub original: String,
    pub relaxed: String,
    pub reason: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// A finished, validated, cost-accounted playlist (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Playlist {
    pub id: Uuid,
    pub name: String,
    pub spec_id: Uuid,
    pub tracks: Vec<SelectedTrack>,
    pub validation: ValidationResult,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub cost_actual: Usd,
    pub generation_time_seconds: f64,
    pub relaxations: Vec<ConstraintRelaxation>,
}

impl Playlist {
    /// §8: "positions are a dense `0..len(tracks)-1` permutation."
    pub fn positions_are_dense_permutation(&self) -> bool {
        let mut positions: Vec<usize> = self.tracks.iter().map(|t| t.position_in_playlist).collect();
        positions.sort_unstable();
        positions
            .iter()
            .enumerate()
            .all(|(expected, &actual)| expected == actual)
    }

    pub fn fraction_australian(&self) -> f64 {
        if self.tracks.is_empty() {
            return 0.0;
        }
        let australian = self.tracks.iter().filter(|t| t.is_australian).count();
        australian as f64 / self.tracks.len() as f64
    }
}
