use super::daypart::{BpmRange, RotationCategory};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A target fraction for one genre plus the tolerance band around it
/// (spec §3 "Track Selection Criteria", default tolerance ±0.10).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GenreCriterion {
    pub target: f64,
    pub tolerance: f64,
}

/// A target fraction for one era label plus its resolved inclusive year
/// bounds and tolerance (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EraCriterion {
    pub min_year: i32,
    pub max_year: i32,
    pub target: f64,
    pub tolerance: f64,
}

impl EraCriterion {
    pub fn contains_year(&self, year: i32) -> bool {
        year >= self.min_year && year <= self.max_year
    }
}

/// The three tolerance knobs the relaxer widens in sequence (spec §3,
/// §4.6).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ToleranceKnobs {
    pub bpm: u16,
    pub genre_percent: f64,
    pub era_percent: f64,
}

impl Default for ToleranceKnobs {
    fn default() -> Self {
        Self {
            bpm: 10,
            genre_percent: 0.10,
            era_percent: 0.10,
        }
    }
}

/// Everything the selector needs to pick and score tracks for one
/// daypart, derived once from a `DaypartSpecification` plus a generation
/// date (spec §3 "Track Selection Criteria").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackSelectionCriteria {
    pub bpm_ranges: Vec<BpmRange>,
    pub genre_criteria: HashMap<String, GenreCriterion>,
    pub era_criteria: HashMap<String, EraCriterion>,
    /// Hard floor, never relaxed (spec §4.6, §4.7).
    pub australian_minimum: f64,
    pub mood_includes: Vec<String>,
    pub mood_excludes: Vec<String>,
    pub rotation_distribution: HashMap<RotationCategory, f64>,
    /// Equal to the daypart duration (spec §3, and the Open Question
    /// resolution recorded in DESIGN.md treating the window as
    /// time-based rather than track-count-based).
    pub no_repeat_window_hours: f64,
    pub tolerances: ToleranceKnobs,
    pub specialty_tag: Option<String>,
}
